//! Driver for the XBee ZigBee modules on the XBEE Clicks.
//!
//! In transparent mode everything written to the UART is sent over the air. Command mode is
//! entered by the `+++` escape sequence surrounded by silent guard times; it then accepts
//! `AT` commands answered by `OK`, `ERROR` or a value line. In API mode the same commands travel
//! in checksummed frames, encoded by [`encode_api_frame`] and [`encode_at_frame`].

use hal::blocking::delay::DelayMs;
use hal::digital::v2::OutputPin;
use hal::serial;

use crate::at::{self, AtPort, ModuleError};

/// Silence required before and after the escape sequence (default `GT` of one second, plus
/// margin).
pub const GUARD_TIME_MS: u32 = 1_100;
const RESPONSE_TIMEOUT_MS: u32 = 1_000;
const RESET_PULSE_MS: u32 = 10;
const BOOT_MS: u32 = 500;
const MAX_NODE_IDENTIFIER: usize = 20;

pub const START_DELIMITER: u8 = 0x7E;
/// Frame type of a local AT command.
pub const AT_COMMAND_FRAME: u8 = 0x08;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ApiMode {
    Transparent = 0,
    Api = 1,
    /// API mode with control characters escaped.
    ApiEscaped = 2,
}

/// Why a received API frame was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    Delimiter,
    /// The buffer is shorter than the length field says.
    Truncated,
    Checksum,
}

fn checksum(data: &[u8]) -> u8 {
    0xFF - data.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// Wrap `data` (frame type and payload) in an API frame, returning the frame length.
pub fn encode_api_frame(data: &[u8], out: &mut [u8]) -> Option<usize> {
    let len = u16::try_from(data.len()).ok()?;
    let total = data.len() + 4;
    let frame = out.get_mut(..total)?;
    frame[0] = START_DELIMITER;
    frame[1..3].copy_from_slice(&len.to_be_bytes());
    frame[3..total - 1].copy_from_slice(data);
    frame[total - 1] = checksum(data);
    Some(total)
}

/// An AT command frame. `frame_id` 0 suppresses the response frame.
pub fn encode_at_frame(
    frame_id: u8,
    mnemonic: &str,
    param: &[u8],
    out: &mut [u8],
) -> Option<usize> {
    let mnemonic = mnemonic.as_bytes();
    if mnemonic.len() != 2 {
        return None;
    }
    let mut data = [0u8; 64];
    let len = 4 + param.len();
    let body = data.get_mut(..len)?;
    body[0] = AT_COMMAND_FRAME;
    body[1] = frame_id;
    body[2..4].copy_from_slice(mnemonic);
    body[4..].copy_from_slice(param);
    encode_api_frame(body, out)
}

/// Check an API frame and return its frame data.
pub fn decode_api_frame(frame: &[u8]) -> Result<&[u8], FrameError> {
    match frame.first() {
        Some(&START_DELIMITER) => {}
        _ => return Err(FrameError::Delimiter),
    }
    if frame.len() < 4 {
        return Err(FrameError::Truncated);
    }
    let len = usize::from(u16::from_be_bytes([frame[1], frame[2]]));
    let data = frame.get(3..3 + len).ok_or(FrameError::Truncated)?;
    let sum = *frame.get(3 + len).ok_or(FrameError::Truncated)?;
    if checksum(data) != sum {
        return Err(FrameError::Checksum);
    }
    Ok(data)
}

/// Uppercase hex digits of `value` without leading zeros.
fn format_hex(value: u64, buf: &mut [u8; 16]) -> &str {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    let mut i = buf.len();
    let mut v = value;
    loop {
        i -= 1;
        buf[i] = DIGITS[(v & 0xF) as usize];
        v >>= 4;
        if v == 0 {
            break;
        }
    }
    core::str::from_utf8(&buf[i..]).unwrap_or("0")
}

fn parse_hex(text: &[u8]) -> Option<u64> {
    if text.is_empty() || text.len() > 16 {
        return None;
    }
    text.iter().try_fold(0u64, |acc, &c| {
        let digit = char::from(c).to_digit(16)?;
        Some((acc << 4) | u64::from(digit))
    })
}

pub struct XBee<UART, D, RST> {
    port: AtPort<UART, D>,
    rst: RST,
}

impl<UART, D, RST, E> XBee<UART, D, RST>
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

    /// Pulse RST low and wait for the module to boot.
    pub fn hw_reset(&mut self) -> Result<(), ModuleError<E, RST::Error>> {
        self.rst.set_low().map_err(ModuleError::Reset)?;
        self.port.delay_ms(RESET_PULSE_MS);
        self.rst.set_high().map_err(ModuleError::Reset)?;
        self.port.delay_ms(BOOT_MS);
        Ok(())
    }

    /// Send the escape sequence and wait for `OK`.
    pub fn enter_command_mode(&mut self) -> Result<(), ModuleError<E, RST::Error>> {
        self.port.drain()?;
        self.port.delay_ms(GUARD_TIME_MS);
        self.port.send_raw(b"+++")?;
        self.port.delay_ms(GUARD_TIME_MS);
        self.port.expect("OK", "ERROR", RESPONSE_TIMEOUT_MS)?;
        log::debug!("xbee: command mode");
        Ok(())
    }

    /// Leave command mode.
    pub fn exit_command_mode(&mut self) -> Result<(), ModuleError<E, RST::Error>> {
        self.at_command("CN", "")
    }

    /// Run `AT<mnemonic><args>` and wait for `OK`.
    pub fn at_command(
        &mut self,
        mnemonic: &str,
        args: &str,
    ) -> Result<(), ModuleError<E, RST::Error>> {
        self.port.send_command("AT", mnemonic, args)?;
        self.port.expect("OK", "ERROR", RESPONSE_TIMEOUT_MS)?;
        Ok(())
    }

    /// Read a register with `AT<mnemonic>`, leaving the answer line in `buf`.
    pub fn at_query(
        &mut self,
        mnemonic: &str,
        buf: &mut [u8],
    ) -> Result<usize, ModuleError<E, RST::Error>> {
        self.port.send_command("AT", mnemonic, "")?;
        let n = self.port.read_line(buf, RESPONSE_TIMEOUT_MS)?;
        if &buf[..n] == b"ERROR" {
            return Err(ModuleError::Port(at::Error::Rejected));
        }
        Ok(n)
    }

    fn query_hex(&mut self, mnemonic: &str) -> Result<u64, ModuleError<E, RST::Error>> {
        let mut line = [0u8; at::MAX_LINE];
        let n = self.at_query(mnemonic, &mut line)?;
        parse_hex(&line[..n]).ok_or(ModuleError::Port(at::Error::InvalidArgument))
    }

    fn set_hex(&mut self, mnemonic: &str, value: u64) -> Result<(), ModuleError<E, RST::Error>> {
        let mut buf = [0u8; 16];
        let hex = format_hex(value, &mut buf);
        self.at_command(mnemonic, hex)
    }

    /// Set the 64-bit extended PAN ID (`ID`).
    pub fn set_pan_id(&mut self, pan_id: u64) -> Result<(), ModuleError<E, RST::Error>> {
        self.set_hex("ID", pan_id)
    }

    /// Set the node identifier string (`NI`), at most 20 printable characters.
    pub fn set_node_identifier(&mut self, name: &str) -> Result<(), ModuleError<E, RST::Error>> {
        if name.len() > MAX_NODE_IDENTIFIER || name.starts_with(' ') {
            return Err(ModuleError::Port(at::Error::InvalidArgument));
        }
        self.at_command("NI", name)
    }

    /// Set the 64-bit destination address (`DH` and `DL`).
    pub fn set_destination(&mut self, address: u64) -> Result<(), ModuleError<E, RST::Error>> {
        self.set_hex("DH", address >> 32)?;
        self.set_hex("DL", address & 0xFFFF_FFFF)
    }

    /// The 64-bit serial number (`SH` and `SL`).
    pub fn serial_number(&mut self) -> Result<u64, ModuleError<E, RST::Error>> {
        let high = self.query_hex("SH")?;
        let low = self.query_hex("SL")?;
        Ok((high << 32) | (low & 0xFFFF_FFFF))
    }

    pub fn firmware_version(&mut self) -> Result<u16, ModuleError<E, RST::Error>> {
        let v = self.query_hex("VR")?;
        u16::try_from(v).map_err(|_| ModuleError::Port(at::Error::InvalidArgument))
    }

    /// Persist the settings (`WR`).
    pub fn write_settings(&mut self) -> Result<(), ModuleError<E, RST::Error>> {
        self.at_command("WR", "")
    }

    /// Apply queued changes (`AC`).
    pub fn apply_changes(&mut self) -> Result<(), ModuleError<E, RST::Error>> {
        self.at_command("AC", "")
    }

    /// Restore factory settings (`RE`). They are only persisted by a following `WR`.
    pub fn factory_reset(&mut self) -> Result<(), ModuleError<E, RST::Error>> {
        self.at_command("RE", "")
    }

    pub fn set_api_mode(&mut self, mode: ApiMode) -> Result<(), ModuleError<E, RST::Error>> {
        let digit = [b'0' + mode as u8];
        let arg = core::str::from_utf8(&digit).unwrap_or("0");
        self.at_command("AP", arg)
    }

    /// Send payload bytes in transparent mode.
    pub fn send_data(&mut self, data: &[u8]) -> Result<(), ModuleError<E, RST::Error>> {
        self.port.send_raw(data)?;
        Ok(())
    }

    /// Send an AT command frame in API mode.
    pub fn send_at_frame(
        &mut self,
        frame_id: u8,
        mnemonic: &str,
        param: &[u8],
    ) -> Result<(), ModuleError<E, RST::Error>> {
        let mut frame = [0u8; 72];
        let n = encode_at_frame(frame_id, mnemonic, param, &mut frame)
            .ok_or(ModuleError::Port(at::Error::InvalidArgument))?;
        self.port.send_raw(&frame[..n])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockDelay, MockSerial, PinEvent, SpyPin};

    fn xbee(uart: &MockSerial, rst: &SpyPin) -> XBee<MockSerial, MockDelay, SpyPin> {
        XBee::new(uart.split(), MockDelay::new(), rst.split())
    }

    #[test]
    fn at_frame_vector() {
        let mut out = [0u8; 16];
        let n = encode_at_frame(0x52, "NJ", &[], &mut out).unwrap();
        assert_eq!(out[..n], [0x7E, 0x00, 0x04, 0x08, 0x52, 0x4E, 0x4A, 0x0D]);
        assert_eq!(decode_api_frame(&out[..n]), Ok(&[0x08, 0x52, 0x4E, 0x4A][..]));
    }

    #[test]
    fn decode_rejects_bad_frames() {
        assert_eq!(decode_api_frame(&[0x7F, 0, 0, 0xFF]), Err(FrameError::Delimiter));
        assert_eq!(decode_api_frame(&[0x7E, 0, 4, 0x08]), Err(FrameError::Truncated));
        assert_eq!(
            decode_api_frame(&[0x7E, 0x00, 0x04, 0x08, 0x52, 0x4E, 0x4A, 0x0E]),
            Err(FrameError::Checksum)
        );
    }

    #[test]
    fn at_frame_rejects_long_mnemonic() {
        let mut out = [0u8; 16];
        assert_eq!(encode_at_frame(1, "NJX", &[], &mut out), None);
    }

    #[test]
    fn hex_helpers() {
        let mut buf = [0u8; 16];
        assert_eq!(format_hex(0x3332, &mut buf), "3332");
        assert_eq!(format_hex(0, &mut buf), "0");
        assert_eq!(format_hex(u64::MAX, &mut buf), "FFFFFFFFFFFFFFFF");
        assert_eq!(parse_hex(b"13a200"), Some(0x13A200));
        assert_eq!(parse_hex(b"xyz"), None);
        assert_eq!(parse_hex(b""), None);
    }

    #[test]
    fn command_mode_uses_guard_times() {
        let uart = MockSerial::new();
        let rst = SpyPin::new();
        uart.respond(b"+++", b"OK\r");
        let mut x = xbee(&uart, &rst);
        x.enter_command_mode().unwrap();
        assert_eq!(uart.sent_str(), "+++");
        let (_, delay, _) = x.release();
        assert_eq!(delay.ms, 2 * GUARD_TIME_MS);
    }

    #[test]
    fn pan_id_and_settings() {
        let uart = MockSerial::new();
        let rst = SpyPin::new();
        uart.respond(b"ATID3332\r", b"OK\r");
        uart.respond(b"ATWR\r", b"OK\r");
        uart.respond(b"ATCN\r", b"OK\r");
        let mut x = xbee(&uart, &rst);
        x.set_pan_id(0x3332).unwrap();
        x.write_settings().unwrap();
        x.exit_command_mode().unwrap();
        assert_eq!(uart.sent_str(), "ATID3332\rATWR\rATCN\r");
    }

    #[test]
    fn rejected_command() {
        let uart = MockSerial::new();
        let rst = SpyPin::new();
        uart.respond(b"ATAP1\r", b"ERROR\r");
        let mut x = xbee(&uart, &rst);
        assert_eq!(
            x.set_api_mode(ApiMode::Api),
            Err(ModuleError::Port(at::Error::Rejected))
        );
    }

    #[test]
    fn serial_number_joins_halves() {
        let uart = MockSerial::new();
        let rst = SpyPin::new();
        uart.respond(b"ATSH\r", b"13A200\r");
        uart.respond(b"ATSL\r", b"40B5D2F1\r");
        let mut x = xbee(&uart, &rst);
        assert_eq!(x.serial_number(), Ok(0x0013_A200_40B5_D2F1));
    }

    #[test]
    fn destination_split() {
        let uart = MockSerial::new();
        let rst = SpyPin::new();
        uart.respond(b"ATDH13A200\r", b"OK\r");
        uart.respond(b"ATDLFFFF\r", b"OK\r");
        let mut x = xbee(&uart, &rst);
        x.set_destination(0x0013_A200_0000_FFFF).unwrap();
    }

    #[test]
    fn node_identifier_length() {
        let uart = MockSerial::new();
        let rst = SpyPin::new();
        let mut x = xbee(&uart, &rst);
        assert_eq!(
            x.set_node_identifier("a-very-long-node-name"),
            Err(ModuleError::Port(at::Error::InvalidArgument))
        );
        assert!(uart.sent().is_empty());
    }

    #[test]
    fn hardware_reset_pulse() {
        let uart = MockSerial::new();
        let rst = SpyPin::new();
        xbee(&uart, &rst).hw_reset().unwrap();
        assert_eq!(rst.events(), vec![PinEvent::Low, PinEvent::High]);
    }

    #[test]
    fn at_frame_is_sent_raw() {
        let uart = MockSerial::new();
        let rst = SpyPin::new();
        xbee(&uart, &rst).send_at_frame(0x52, "NJ", &[]).unwrap();
        assert_eq!(uart.sent(), [0x7E, 0x00, 0x04, 0x08, 0x52, 0x4E, 0x4A, 0x0D]);
    }
}
