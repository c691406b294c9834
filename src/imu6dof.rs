//! Driver for the 6DOF IMU Click, an LSM6DSL accelerometer and gyroscope.

use hal::blocking::delay::DelayMs;
use hal::blocking::i2c;

use crate::error::Error;
use crate::interface::i2c::I2cInterface;
use crate::interface::RegisterInterface;
use crate::types::Axes;

pub mod registers {
    pub const WHO_AM_I: u8 = 0x0F;
    pub const CTRL1_XL: u8 = 0x10;
    pub const CTRL2_G: u8 = 0x11;
    pub const CTRL3_C: u8 = 0x12;
    pub const STATUS_REG: u8 = 0x1E;
    /// Temperature, then gyroscope X/Y/Z, then accelerometer X/Y/Z, all 16-bit little-endian.
    pub const OUT_TEMP_L: u8 = 0x20;
    pub const OUTX_L_G: u8 = 0x22;
    pub const OUTX_L_XL: u8 = 0x28;

    pub const WHO_AM_I_VALUE: u8 = 0x6A;

    pub mod ctrl3_c {
        pub const BDU: u8 = 1 << 6;
        pub const IF_INC: u8 = 1 << 2;
        pub const SW_RESET: u8 = 1 << 0;
    }

    pub mod status {
        pub const XLDA: u8 = 1 << 0;
        pub const GDA: u8 = 1 << 1;
        pub const TDA: u8 = 1 << 2;
    }
}

use self::registers as reg;

/// I2C address, selected by SA0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Address {
    /// SA0 low: 0x6A.
    Primary,
    /// SA0 high: 0x6B.
    Secondary,
}

impl From<Address> for u8 {
    fn from(a: Address) -> u8 {
        match a {
            Address::Primary => 0x6A,
            Address::Secondary => 0x6B,
        }
    }
}

/// Output data rate, shared by both sensors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputDataRate {
    PowerDown = 0x0,
    Hz12_5 = 0x1,
    Hz26 = 0x2,
    Hz52 = 0x3,
    Hz104 = 0x4,
    Hz208 = 0x5,
    Hz416 = 0x6,
    Hz833 = 0x7,
    Hz1660 = 0x8,
    Hz3330 = 0x9,
    Hz6660 = 0xA,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AccelRange {
    G2,
    G4,
    G8,
    G16,
}

impl AccelRange {
    fn bits(self) -> u8 {
        match self {
            AccelRange::G2 => 0b00,
            AccelRange::G16 => 0b01,
            AccelRange::G4 => 0b10,
            AccelRange::G8 => 0b11,
        }
    }

    /// mg per count.
    pub fn sensitivity(self) -> f32 {
        match self {
            AccelRange::G2 => 0.061,
            AccelRange::G4 => 0.122,
            AccelRange::G8 => 0.244,
            AccelRange::G16 => 0.488,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GyroRange {
    Dps125,
    Dps250,
    Dps500,
    Dps1000,
    Dps2000,
}

impl GyroRange {
    /// FS_G and FS_125 as they sit in CTRL2_G.
    fn bits(self) -> u8 {
        match self {
            GyroRange::Dps125 => 0b0010,
            GyroRange::Dps250 => 0b0000,
            GyroRange::Dps500 => 0b0100,
            GyroRange::Dps1000 => 0b1000,
            GyroRange::Dps2000 => 0b1100,
        }
    }

    /// mdps per count.
    pub fn sensitivity(self) -> f32 {
        match self {
            GyroRange::Dps125 => 4.375,
            GyroRange::Dps250 => 8.75,
            GyroRange::Dps500 => 17.5,
            GyroRange::Dps1000 => 35.0,
            GyroRange::Dps2000 => 70.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub address: Address,
    pub accel_odr: OutputDataRate,
    pub accel_range: AccelRange,
    pub gyro_odr: OutputDataRate,
    pub gyro_range: GyroRange,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: Address::Secondary,
            accel_odr: OutputDataRate::Hz104,
            accel_range: AccelRange::G2,
            gyro_odr: OutputDataRate::Hz104,
            gyro_range: GyroRange::Dps250,
        }
    }
}

impl Config {
    #[must_use]
    pub fn with_address(mut self, address: Address) -> Self {
        self.address = address;
        self
    }

    #[must_use]
    pub fn with_accel(mut self, odr: OutputDataRate, range: AccelRange) -> Self {
        self.accel_odr = odr;
        self.accel_range = range;
        self
    }

    #[must_use]
    pub fn with_gyro(mut self, odr: OutputDataRate, range: GyroRange) -> Self {
        self.gyro_odr = odr;
        self.gyro_range = range;
        self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    pub accel_ready: bool,
    pub gyro_ready: bool,
    pub temperature_ready: bool,
}

/// Everything from one burst read.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reading {
    /// °C.
    pub temperature: f32,
    /// °/s.
    pub gyro: Axes<f32>,
    /// g.
    pub accel: Axes<f32>,
}

const RESET_MS: u32 = 1;

fn temperature_from_raw(raw: i16) -> f32 {
    f32::from(raw) / 256.0 + 25.0
}

/// An LSM6DSL inertial module.
pub struct Imu6Dof<T> {
    iface: T,
    config: Config,
}

impl<I2C> Imu6Dof<I2cInterface<I2C>>
where
    I2C: i2c::Write + i2c::WriteRead,
{
    /// Use the I2C bus, at the address in `config`.
    pub fn new(i2c: I2C, config: Config) -> Self {
        let address = config.address.into();
        Self::with_interface(I2cInterface::new(i2c, address), config)
    }
}

impl<T: RegisterInterface> Imu6Dof<T> {
    /// Use any register interface, such as SPI. `config.address` is ignored.
    pub fn with_interface(iface: T, config: Config) -> Self {
        Self { iface, config }
    }

    pub fn release(self) -> T {
        self.iface
    }

    /// Check the identity, reset and apply the configuration.
    pub fn init<D: DelayMs<u32>>(&mut self, delay: &mut D) -> Result<(), Error<T::Error>> {
        self.check_communication()?;
        self.iface.write_register(reg::CTRL3_C, reg::ctrl3_c::SW_RESET)?;
        delay.delay_ms(RESET_MS);
        self.iface.write_register(reg::CTRL3_C, reg::ctrl3_c::BDU | reg::ctrl3_c::IF_INC)?;
        let cfg = self.config;
        self.set_accel(cfg.accel_odr, cfg.accel_range)?;
        self.set_gyro(cfg.gyro_odr, cfg.gyro_range)
    }

    pub fn check_communication(&mut self) -> Result<(), Error<T::Error>> {
        let id = self.iface.read_register(reg::WHO_AM_I)?;
        if id != reg::WHO_AM_I_VALUE {
            log::warn!("imu6dof: unexpected WHO_AM_I {:#04x}", id);
            return Err(Error::WrongDevice(id));
        }
        log::debug!("imu6dof: LSM6DSL found");
        Ok(())
    }

    pub fn set_accel(
        &mut self,
        odr: OutputDataRate,
        range: AccelRange,
    ) -> Result<(), Error<T::Error>> {
        self.config.accel_odr = odr;
        self.config.accel_range = range;
        let value = (odr as u8) << 4 | range.bits() << 2;
        Ok(self.iface.write_register(reg::CTRL1_XL, value)?)
    }

    pub fn set_gyro(
        &mut self,
        odr: OutputDataRate,
        range: GyroRange,
    ) -> Result<(), Error<T::Error>> {
        self.config.gyro_odr = odr;
        self.config.gyro_range = range;
        let value = (odr as u8) << 4 | range.bits();
        Ok(self.iface.write_register(reg::CTRL2_G, value)?)
    }

    pub fn status(&mut self) -> Result<Status, Error<T::Error>> {
        let s = self.iface.read_register(reg::STATUS_REG)?;
        Ok(Status {
            accel_ready: s & reg::status::XLDA != 0,
            gyro_ready: s & reg::status::GDA != 0,
            temperature_ready: s & reg::status::TDA != 0,
        })
    }

    fn read_axes(&mut self, start: u8) -> Result<Axes<i16>, Error<T::Error>> {
        let mut buf = [0u8; 6];
        self.iface.read_registers(start, &mut buf)?;
        Ok(Axes::from_le_bytes(&buf))
    }

    pub fn read_accel_raw(&mut self) -> Result<Axes<i16>, Error<T::Error>> {
        self.read_axes(reg::OUTX_L_XL)
    }

    pub fn read_gyro_raw(&mut self) -> Result<Axes<i16>, Error<T::Error>> {
        self.read_axes(reg::OUTX_L_G)
    }

    pub fn read_accel_g(&mut self) -> Result<Axes<f32>, Error<T::Error>> {
        let raw = self.read_accel_raw()?;
        Ok(self.accel_to_g(raw))
    }

    pub fn read_gyro_dps(&mut self) -> Result<Axes<f32>, Error<T::Error>> {
        let raw = self.read_gyro_raw()?;
        Ok(self.gyro_to_dps(raw))
    }

    /// °C.
    pub fn read_temperature(&mut self) -> Result<f32, Error<T::Error>> {
        let mut buf = [0u8; 2];
        self.iface.read_registers(reg::OUT_TEMP_L, &mut buf)?;
        Ok(temperature_from_raw(i16::from_le_bytes(buf)))
    }

    /// Temperature, gyroscope and accelerometer in one burst, so they belong to the same sample.
    pub fn read_all(&mut self) -> Result<Reading, Error<T::Error>> {
        let mut buf = [0u8; 14];
        self.iface.read_registers(reg::OUT_TEMP_L, &mut buf)?;
        let mut gyro = [0u8; 6];
        let mut accel = [0u8; 6];
        gyro.copy_from_slice(&buf[2..8]);
        accel.copy_from_slice(&buf[8..14]);
        Ok(Reading {
            temperature: temperature_from_raw(i16::from_le_bytes([buf[0], buf[1]])),
            gyro: self.gyro_to_dps(Axes::from_le_bytes(&gyro)),
            accel: self.accel_to_g(Axes::from_le_bytes(&accel)),
        })
    }

    fn accel_to_g(&self, raw: Axes<i16>) -> Axes<f32> {
        let mg = self.config.accel_range.sensitivity();
        raw.map(|v| f32::from(v) * mg / 1000.0)
    }

    fn gyro_to_dps(&self, raw: Axes<i16>) -> Axes<f32> {
        let mdps = self.config.gyro_range.sensitivity();
        raw.map(|v| f32::from(v) * mdps / 1000.0)
    }
}
