//! Driver for the RN4871 Bluetooth Low Energy module on the RN4871 Click.
//!
//! Out of command mode the module runs its transparent UART service, forwarding everything
//! written to the UART to the connected peer. `$$$` switches to command mode (prompt `CMD>`),
//! where set commands answer `AOK` or `Err`; `---` switches back.

use hal::blocking::delay::DelayMs;
use hal::digital::v2::OutputPin;
use hal::serial;

use crate::at::{self, AtPort, ModuleError};

const PROMPT_TIMEOUT_MS: u32 = 500;
const RESPONSE_TIMEOUT_MS: u32 = 1_000;
const REBOOT_TIMEOUT_MS: u32 = 2_000;
const RESET_PULSE_MS: u32 = 5;
const BOOT_MS: u32 = 100;
const MAX_NAME: usize = 20;

/// Bits of the `SS` service bitmap.
pub mod services {
    pub const DEVICE_INFORMATION: u8 = 0x80;
    pub const TRANSPARENT_UART: u8 = 0x40;
    pub const BEACON: u8 = 0x20;
}

pub struct Rn4871<UART, D, RST> {
    port: AtPort<UART, D>,
    rst: RST,
}

impl<UART, D, RST, E> Rn4871<UART, D, RST>
where
    UART: serial::Read<u8, Error = E> + serial::Write<u8, Error = E>,
    D: DelayMs<u32>,
    RST: OutputPin,
{
    pub fn new(uart: UART, delay: D, rst: RST) -> Self {
        Self {
            port: AtPort::new(uart, delay),
            rst,
        }
    }

    pub fn release(self) -> (UART, D, RST) {
        let (uart, delay) = self.port.release();
        (uart, delay, self.rst)
    }

    pub fn hw_reset(&mut self) -> Result<(), ModuleError<E, RST::Error>> {
        self.rst.set_low().map_err(ModuleError::Reset)?;
        self.port.delay_ms(RESET_PULSE_MS);
        self.rst.set_high().map_err(ModuleError::Reset)?;
        self.port.delay_ms(BOOT_MS);
        Ok(())
    }

    pub fn enter_command_mode(&mut self) -> Result<(), ModuleError<E, RST::Error>> {
        self.port.drain()?;
        self.port.send_raw(b"$$$")?;
        self.port.wait_for("CMD>", PROMPT_TIMEOUT_MS)?;
        log::debug!("rn4871: command mode");
        Ok(())
    }

    pub fn exit_command_mode(&mut self) -> Result<(), ModuleError<E, RST::Error>> {
        self.port.send_command("", "---", "")?;
        self.port.wait_for("END", PROMPT_TIMEOUT_MS)?;
        Ok(())
    }

    /// Send `command` and `args` and wait for `AOK`.
    pub fn command(&mut self, command: &str, args: &str) -> Result<(), ModuleError<E, RST::Error>> {
        self.port.send_command("", command, args)?;
        self.port.expect("AOK", "Err", RESPONSE_TIMEOUT_MS)?;
        Ok(())
    }

    /// Set the advertised device name (`SN`), at most 20 characters.
    pub fn set_name(&mut self, name: &str) -> Result<(), ModuleError<E, RST::Error>> {
        if name.is_empty() || name.len() > MAX_NAME {
            return Err(ModuleError::Port(at::Error::InvalidArgument));
        }
        self.command("SN,", name)
    }

    /// Select the default services (`SS`) from the [`services`] bits. Takes effect after a
    /// reboot.
    pub fn set_services(&mut self, bitmap: u8) -> Result<(), ModuleError<E, RST::Error>> {
        const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
        let hex = [
            DIGITS[usize::from(bitmap >> 4)],
            DIGITS[usize::from(bitmap & 0x0F)],
        ];
        let hex = core::str::from_utf8(&hex)
            .map_err(|_| ModuleError::Port(at::Error::InvalidArgument))?;
        self.command("SS,", hex)
    }

    fn reboot_with(&mut self, command: &str) -> Result<(), ModuleError<E, RST::Error>> {
        self.port.send_command("", command, "")?;
        self.port.expect("Rebooting", "Err", REBOOT_TIMEOUT_MS)?;
        log::debug!("rn4871: rebooting");
        Ok(())
    }

    /// Restore the factory settings (`SF,1`). The module reboots and leaves command mode.
    pub fn factory_reset(&mut self) -> Result<(), ModuleError<E, RST::Error>> {
        self.reboot_with("SF,1")
    }

    /// Reboot (`R,1`) to apply settings. The module leaves command mode.
    pub fn reboot(&mut self) -> Result<(), ModuleError<E, RST::Error>> {
        self.reboot_with("R,1")
    }

    /// The firmware version line, left in `buf`.
    pub fn version(&mut self, buf: &mut [u8]) -> Result<usize, ModuleError<E, RST::Error>> {
        self.port.send_command("", "V", "")?;
        let n = self.port.read_line(buf, RESPONSE_TIMEOUT_MS)?;
        Ok(n)
    }

    /// Send payload bytes over the transparent UART service.
    pub fn send_data(&mut self, data: &[u8]) -> Result<(), ModuleError<E, RST::Error>> {
        self.port.send_raw(data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockDelay, MockSerial, PinEvent, SpyPin};

    fn module(uart: &MockSerial, rst: &SpyPin) -> Rn4871<MockSerial, MockDelay, SpyPin> {
        Rn4871::new(uart.split(), MockDelay::new(), rst.split())
    }

    #[test]
    fn command_mode_round_trip() {
        let uart = MockSerial::new();
        let rst = SpyPin::new();
        uart.respond(b"$$$", b"CMD> ");
        uart.respond(b"---\r", b"END\r\n");
        let mut m = module(&uart, &rst);
        m.enter_command_mode().unwrap();
        m.exit_command_mode().unwrap();
        assert_eq!(uart.sent_str(), "$$$---\r");
    }

    #[test]
    fn set_name_and_services() {
        let uart = MockSerial::new();
        let rst = SpyPin::new();
        uart.respond(b"SN,Click\r", b"AOK\r\nCMD> ");
        uart.respond(b"SS,C0\r", b"AOK\r\nCMD> ");
        let mut m = module(&uart, &rst);
        m.set_name("Click").unwrap();
        m.set_services(services::DEVICE_INFORMATION | services::TRANSPARENT_UART)
            .unwrap();
        assert_eq!(uart.sent_str(), "SN,Click\rSS,C0\r");
    }

    #[test]
    fn error_answer() {
        let uart = MockSerial::new();
        let rst = SpyPin::new();
        uart.respond(b"SS,FF\r", b"Err\r\nCMD> ");
        let mut m = module(&uart, &rst);
        assert_eq!(
            m.set_services(0xFF),
            Err(ModuleError::Port(at::Error::Rejected))
        );
    }

    #[test]
    fn name_length() {
        let uart = MockSerial::new();
        let rst = SpyPin::new();
        let mut m = module(&uart, &rst);
        assert_eq!(
            m.set_name(""),
            Err(ModuleError::Port(at::Error::InvalidArgument))
        );
        assert_eq!(
            m.set_name("abcdefghijklmnopqrstu"),
            Err(ModuleError::Port(at::Error::InvalidArgument))
        );
    }

    #[test]
    fn reboot_waits_for_banner() {
        let uart = MockSerial::new();
        let rst = SpyPin::new();
        uart.respond(b"R,1\r", b"Rebooting\r\n");
        module(&uart, &rst).reboot().unwrap();
    }

    #[test]
    fn reboot_timeout() {
        let uart = MockSerial::new();
        let rst = SpyPin::new();
        let mut m = module(&uart, &rst);
        assert_eq!(m.reboot(), Err(ModuleError::Port(at::Error::Timeout)));
        let (_, delay, _) = m.release();
        assert_eq!(delay.ms, REBOOT_TIMEOUT_MS);
    }

    #[test]
    fn version_line() {
        let uart = MockSerial::new();
        let rst = SpyPin::new();
        uart.respond(b"V\r", b"RN4871 V1.41 7/9/2019 (c)Microchip\r\nCMD> ");
        let mut buf = [0u8; 64];
        let n = module(&uart, &rst).version(&mut buf).unwrap();
        assert!(buf[..n].starts_with(b"RN4871 V1.41"));
    }

    #[test]
    fn reset_pin_and_data() {
        let uart = MockSerial::new();
        let rst = SpyPin::new();
        let mut m = module(&uart, &rst);
        m.hw_reset().unwrap();
        m.send_data(b"hello").unwrap();
        assert_eq!(rst.events(), vec![PinEvent::Low, PinEvent::High]);
        assert_eq!(uart.sent(), b"hello");
    }
}
