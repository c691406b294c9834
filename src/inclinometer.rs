//! Driver for the Inclinometer Click, a Murata SCL3300 three-axis inclinometer.
//!
//! Every SPI transaction is a 32-bit frame: an operation byte (read/write flag and register
//! address), 16 data bits and a CRC8 over the first three bytes. The protocol is off-frame: the
//! answer to a request is clocked out during the *next* frame. Reads are therefore pipelined,
//! and a sequence of `n` requests costs `n + 1` frames.

use hal::blocking::delay::DelayMs;
use hal::blocking::spi::{Transfer, Write};
use hal::digital::v2::OutputPin;

use crate::crc::crc8_sae_j1850;
use crate::error::Error;
use crate::interface::spi::{ErrorOf, SpiDevice};
use crate::types::Axes;

/// A request frame before CRC.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Command {
    op: u8,
    data: u16,
}

impl Command {
    const fn read(op: u8) -> Self {
        Self { op, data: 0 }
    }

    fn frame(self) -> [u8; 4] {
        let [hi, lo] = self.data.to_be_bytes();
        [self.op, hi, lo, crc8_sae_j1850(&[self.op, hi, lo])]
    }
}

const READ_ACC_X: Command = Command::read(0x04);
const READ_ACC_Y: Command = Command::read(0x08);
const READ_ACC_Z: Command = Command::read(0x0C);
const READ_TEMPERATURE: Command = Command::read(0x14);
const READ_STATUS: Command = Command::read(0x18);
const READ_ERR_FLAG1: Command = Command::read(0x1C);
const READ_ERR_FLAG2: Command = Command::read(0x20);
const READ_ANG_X: Command = Command::read(0x24);
const READ_ANG_Y: Command = Command::read(0x28);
const READ_ANG_Z: Command = Command::read(0x2C);
const READ_MODE: Command = Command::read(0x34);
const READ_WHOAMI: Command = Command::read(0x40);
const READ_SERIAL1: Command = Command::read(0x64);
const READ_SERIAL2: Command = Command::read(0x68);

const OP_ANGLE_CTRL: u8 = 0xB0;
const OP_MODE: u8 = 0xB4;
const OP_BANK: u8 = 0xFC;

const ENABLE_ANGLES: Command = Command {
    op: OP_ANGLE_CTRL,
    data: 0x001F,
};
const SW_RESET: Command = Command {
    op: OP_MODE,
    data: 0x0020,
};
const POWER_DOWN: Command = Command {
    op: OP_MODE,
    data: 0x0004,
};
// Identical to selecting mode 1.
const WAKE_UP: Command = Command {
    op: OP_MODE,
    data: 0x0000,
};
const SELECT_BANK_0: Command = Command {
    op: OP_BANK,
    data: 0x0000,
};
const SELECT_BANK_1: Command = Command {
    op: OP_BANK,
    data: 0x0001,
};

pub const WHOAMI_VALUE: u8 = 0xC1;

const RESET_MS: u32 = 1;
const WAKE_UP_MS: u32 = 1;

/// Return status carried in the two low bits of every response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReturnStatus {
    Startup,
    Normal,
    SelfTest,
    Error,
}

impl From<u8> for ReturnStatus {
    fn from(rs: u8) -> Self {
        match rs & 0b11 {
            0b00 => ReturnStatus::Startup,
            0b01 => ReturnStatus::Normal,
            0b10 => ReturnStatus::SelfTest,
            _ => ReturnStatus::Error,
        }
    }
}

/// Measurement mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// ±1.2 g, 40 Hz.
    Mode1 = 0,
    /// ±2.4 g, 70 Hz.
    Mode2 = 1,
    /// Inclination, ±1.2 g, 10 Hz.
    Mode3 = 2,
    /// Inclination, low noise, 10 Hz.
    Mode4 = 3,
}

impl Mode {
    /// Counts per g.
    pub fn sensitivity(self) -> f32 {
        match self {
            Mode::Mode1 => 6000.0,
            Mode::Mode2 => 3000.0,
            Mode::Mode3 | Mode::Mode4 => 12000.0,
        }
    }

    fn settle_ms(self) -> u32 {
        match self {
            Mode::Mode1 | Mode::Mode2 => 5,
            Mode::Mode3 | Mode::Mode4 => 100,
        }
    }

    fn command(self) -> Command {
        Command {
            op: OP_MODE,
            data: self as u16,
        }
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Mode1
    }
}

/// One decoded response frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Response {
    op: u8,
    status: ReturnStatus,
    data: u16,
}

impl Response {
    fn parse(raw: [u8; 4]) -> Option<Self> {
        if crc8_sae_j1850(&raw[..3]) != raw[3] {
            return None;
        }
        Some(Self {
            op: raw[0] & 0xFC,
            status: ReturnStatus::from(raw[0]),
            data: u16::from_be_bytes([raw[1], raw[2]]),
        })
    }
}

/// An SCL3300 inclinometer.
pub struct Inclinometer<SPI, CS> {
    dev: SpiDevice<SPI, CS>,
    mode: Mode,
}

impl<SPI, CS> Inclinometer<SPI, CS>
where
    SPI: Write<u8> + Transfer<u8>,
    CS: OutputPin,
{
    pub fn new(spi: SPI, cs: CS, mode: Mode) -> Self {
        Self {
            dev: SpiDevice::new(spi, cs),
            mode,
        }
    }

    pub fn release(self) -> (SPI, CS) {
        self.dev.release()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    fn exchange(&mut self, cmd: Command) -> Result<[u8; 4], Error<ErrorOf<SPI, CS>>> {
        let mut frame = cmd.frame();
        self.dev.transfer(&mut frame)?;
        Ok(frame)
    }

    /// Send `cmds` back to back and collect the data of their responses into `out`.
    fn pipeline(
        &mut self,
        cmds: &[Command],
        out: &mut [u16],
    ) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        let last = match cmds.last() {
            Some(cmd) => *cmd,
            None => return Ok(()),
        };
        self.exchange(cmds[0])?;
        for (i, expected) in cmds.iter().enumerate() {
            let next = cmds.get(i + 1).copied().unwrap_or(last);
            let raw = self.exchange(next)?;
            let resp = Response::parse(raw).ok_or_else(|| {
                log::warn!("inclinometer: CRC mismatch in {:02x?}", raw);
                Error::InvalidData
            })?;
            if resp.op != expected.op {
                log::warn!(
                    "inclinometer: response to {:#04x} while expecting {:#04x}",
                    resp.op,
                    expected.op
                );
                return Err(Error::InvalidData);
            }
            if resp.status == ReturnStatus::Error {
                return Err(Error::DeviceStatus);
            }
            out[i] = resp.data;
        }
        Ok(())
    }

    fn read_one(&mut self, cmd: Command) -> Result<u16, Error<ErrorOf<SPI, CS>>> {
        let mut out = [0u16];
        self.pipeline(&[cmd], &mut out)?;
        Ok(out[0])
    }

    /// Reset, select the mode, enable angle outputs, and check that the sensor started
    /// correctly and identifies itself.
    pub fn init<D: DelayMs<u32>>(&mut self, delay: &mut D) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        self.exchange(SW_RESET)?;
        delay.delay_ms(RESET_MS);
        self.exchange(self.mode.command())?;
        self.exchange(ENABLE_ANGLES)?;
        delay.delay_ms(self.mode.settle_ms());

        // The status summary is sticky; reading it clears the start-up flags.
        self.exchange(READ_STATUS)?;
        self.exchange(READ_STATUS)?;
        self.exchange(READ_STATUS)?;
        let raw = self.exchange(READ_WHOAMI)?;
        match Response::parse(raw) {
            Some(r) if r.status == ReturnStatus::Normal => {}
            Some(r) => {
                log::warn!("inclinometer: start-up status {:?}", r.status);
                return Err(Error::DeviceStatus);
            }
            None => return Err(Error::InvalidData),
        }
        self.check_communication()?;
        log::debug!("inclinometer: SCL3300 in {:?}", self.mode);
        Ok(())
    }

    pub fn check_communication(&mut self) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        let id = (self.read_one(READ_WHOAMI)? & 0xFF) as u8;
        if id != WHOAMI_VALUE {
            return Err(Error::WrongDevice(id));
        }
        Ok(())
    }

    /// Switch the measurement mode and wait for the output to settle.
    pub fn set_mode<D: DelayMs<u32>>(
        &mut self,
        mode: Mode,
        delay: &mut D,
    ) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        self.pipeline(&[mode.command()], &mut [0])?;
        self.mode = mode;
        delay.delay_ms(mode.settle_ms());
        Ok(())
    }

    /// The mode reported by the sensor.
    pub fn read_mode(&mut self) -> Result<u16, Error<ErrorOf<SPI, CS>>> {
        Ok(self.read_one(READ_MODE)? & 0x03)
    }

    pub fn read_accel_raw(&mut self) -> Result<Axes<i16>, Error<ErrorOf<SPI, CS>>> {
        let mut out = [0u16; 3];
        self.pipeline(&[READ_ACC_X, READ_ACC_Y, READ_ACC_Z], &mut out)?;
        Ok(Axes::new(out[0] as i16, out[1] as i16, out[2] as i16))
    }

    /// Acceleration in g, scaled for the current mode.
    pub fn read_accel_g(&mut self) -> Result<Axes<f32>, Error<ErrorOf<SPI, CS>>> {
        let sensitivity = self.mode.sensitivity();
        Ok(self.read_accel_raw()?.map(|v| f32::from(v) / sensitivity))
    }

    /// Inclination of each axis in degrees.
    pub fn read_angles_deg(&mut self) -> Result<Axes<f32>, Error<ErrorOf<SPI, CS>>> {
        let mut out = [0u16; 3];
        self.pipeline(&[READ_ANG_X, READ_ANG_Y, READ_ANG_Z], &mut out)?;
        let deg = |raw: u16| f32::from(raw as i16) / 16384.0 * 90.0;
        Ok(Axes::new(deg(out[0]), deg(out[1]), deg(out[2])))
    }

    /// °C.
    pub fn read_temperature(&mut self) -> Result<f32, Error<ErrorOf<SPI, CS>>> {
        let raw = self.read_one(READ_TEMPERATURE)?;
        Ok(-273.0 + f32::from(raw) / 18.9)
    }

    /// The status summary register.
    pub fn read_status(&mut self) -> Result<u16, Error<ErrorOf<SPI, CS>>> {
        self.read_one(READ_STATUS)
    }

    /// `ERR_FLAG1` and `ERR_FLAG2`.
    pub fn read_error_flags(&mut self) -> Result<(u16, u16), Error<ErrorOf<SPI, CS>>> {
        let mut out = [0u16; 2];
        self.pipeline(&[READ_ERR_FLAG1, READ_ERR_FLAG2], &mut out)?;
        Ok((out[0], out[1]))
    }

    /// The 32-bit serial number from register bank 1. Bank 0 is selected again afterwards.
    pub fn read_serial(&mut self) -> Result<u32, Error<ErrorOf<SPI, CS>>> {
        let mut out = [0u16; 4];
        self.pipeline(
            &[SELECT_BANK_1, READ_SERIAL1, READ_SERIAL2, SELECT_BANK_0],
            &mut out,
        )?;
        Ok(u32::from(out[2]) << 16 | u32::from(out[1]))
    }

    pub fn power_down(&mut self) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        self.exchange(POWER_DOWN)?;
        Ok(())
    }

    /// Leave power down and run [`init`](Self::init) again in the current mode.
    pub fn wake_up<D: DelayMs<u32>>(
        &mut self,
        delay: &mut D,
    ) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        self.exchange(WAKE_UP)?;
        delay.delay_ms(WAKE_UP_MS);
        self.init(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockDelay, SpySpi};

    fn resp(op: u8, rs: u8, data: u16) -> [u8; 4] {
        let [hi, lo] = data.to_be_bytes();
        let b0 = op | rs;
        [b0, hi, lo, crc8_sae_j1850(&[b0, hi, lo])]
    }

    fn sensor(spi: &SpySpi, mode: Mode) -> Inclinometer<SpySpi, crate::testing::CsPin> {
        Inclinometer::new(spi.split(), spi.cs(), mode)
    }

    #[test]
    fn command_frames_match_datasheet() {
        assert_eq!(u32::from_be_bytes(READ_ACC_X.frame()), 0x040000F7);
        assert_eq!(u32::from_be_bytes(READ_STATUS.frame()), 0x180000E5);
        assert_eq!(u32::from_be_bytes(READ_WHOAMI.frame()), 0x40000091);
        assert_eq!(u32::from_be_bytes(ENABLE_ANGLES.frame()), 0xB0001F6F);
        assert_eq!(u32::from_be_bytes(SW_RESET.frame()), 0xB4002098);
        assert_eq!(u32::from_be_bytes(Mode::Mode4.command().frame()), 0xB4000338);
        assert_eq!(u32::from_be_bytes(POWER_DOWN.frame()), 0xB400046B);
        assert_eq!(u32::from_be_bytes(SELECT_BANK_1.frame()), 0xFC00016E);
        assert_eq!(u32::from_be_bytes(READ_ANG_Z.frame()), 0x2C0000CB);
    }

    #[test]
    fn init_checks_startup_and_identity() {
        let spi = SpySpi::new();
        spi.queue_miso(&[0u8; 24]);
        spi.queue_miso(&resp(0x18, 0b01, 0x0012));
        spi.queue_miso(&[0u8; 4]);
        spi.queue_miso(&resp(0x40, 0b01, 0x00C1));
        let mut inc = sensor(&spi, Mode::Mode3);
        let mut delay = MockDelay::new();
        assert_eq!(inc.init(&mut delay), Ok(()));
        assert_eq!(delay.ms, RESET_MS + 100);

        let mosi = spi.mosi();
        let frames: Vec<u32> = mosi
            .chunks(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(
            frames,
            vec![
                0xB4002098, 0xB4000225, 0xB0001F6F, 0x180000E5, 0x180000E5, 0x180000E5,
                0x40000091, 0x40000091, 0x40000091,
            ]
        );
    }

    #[test]
    fn init_rejects_error_status() {
        let spi = SpySpi::new();
        spi.queue_miso(&[0u8; 24]);
        spi.queue_miso(&resp(0x18, 0b11, 0x0000));
        let mut inc = sensor(&spi, Mode::Mode1);
        assert_eq!(inc.init(&mut MockDelay::new()), Err(Error::DeviceStatus));
    }

    #[test]
    fn wrong_whoami() {
        let spi = SpySpi::new();
        spi.queue_miso(&[0u8; 4]);
        spi.queue_miso(&resp(0x40, 0b01, 0x00C2));
        let mut inc = sensor(&spi, Mode::Mode1);
        assert_eq!(inc.check_communication(), Err(Error::WrongDevice(0xC2)));
    }

    #[test]
    fn angles_are_pipelined() {
        let spi = SpySpi::new();
        spi.queue_miso(&[0u8; 4]);
        spi.queue_miso(&resp(0x24, 0b01, 0x2000));
        spi.queue_miso(&resp(0x28, 0b01, 0x0000));
        spi.queue_miso(&resp(0x2C, 0b01, 0xC000));
        let mut inc = sensor(&spi, Mode::Mode1);
        assert_eq!(inc.read_angles_deg(), Ok(Axes::new(45.0, 0.0, -90.0)));
        assert_eq!(spi.mosi().len(), 16);
    }

    #[test]
    fn accel_scaled_by_mode() {
        let spi = SpySpi::new();
        spi.queue_miso(&[0u8; 4]);
        spi.queue_miso(&resp(0x04, 0b01, 3000));
        spi.queue_miso(&resp(0x08, 0b01, (-3000i16) as u16));
        spi.queue_miso(&resp(0x0C, 0b01, 6000));
        let mut inc = sensor(&spi, Mode::Mode2);
        assert_eq!(inc.read_accel_g(), Ok(Axes::new(1.0, -1.0, 2.0)));
    }

    #[test]
    fn crc_mismatch_is_invalid_data() {
        let spi = SpySpi::new();
        spi.queue_miso(&[0u8; 4]);
        let mut bad = resp(0x14, 0b01, 5600);
        bad[3] ^= 0x01;
        spi.queue_miso(&bad);
        let mut inc = sensor(&spi, Mode::Mode1);
        assert_eq!(inc.read_temperature(), Err(Error::InvalidData));
    }

    #[test]
    fn temperature_conversion() {
        let spi = SpySpi::new();
        spi.queue_miso(&[0u8; 4]);
        spi.queue_miso(&resp(0x14, 0b01, 5670));
        let mut inc = sensor(&spi, Mode::Mode1);
        let t = inc.read_temperature().unwrap();
        assert!((t - 27.0).abs() < 1e-3);
    }

    #[test]
    fn error_status_in_read() {
        let spi = SpySpi::new();
        spi.queue_miso(&[0u8; 4]);
        spi.queue_miso(&resp(0x18, 0b11, 0x0001));
        let mut inc = sensor(&spi, Mode::Mode1);
        assert_eq!(inc.read_status(), Err(Error::DeviceStatus));
    }

    #[test]
    fn serial_number_from_bank_1() {
        let spi = SpySpi::new();
        spi.queue_miso(&[0u8; 4]);
        spi.queue_miso(&resp(0xFC, 0b01, 0x0001));
        spi.queue_miso(&resp(0x64, 0b01, 0x5678));
        spi.queue_miso(&resp(0x68, 0b01, 0x1234));
        spi.queue_miso(&resp(0xFC, 0b01, 0x0000));
        let mut inc = sensor(&spi, Mode::Mode1);
        assert_eq!(inc.read_serial(), Ok(0x1234_5678));
    }
}
