//! Driver for the Accel 11 Click, a BMA456 three-axis accelerometer reachable over I2C or SPI.
//!
//! The driver is generic over any [`RegisterInterface`]. Use [`Accel11::new_i2c`] or
//! [`Accel11::new_spi`] when the bus is known at compile time, or wrap either interface in a
//! [`Transport`] to pick one at run time.
//!
//! ```
//! # use click_drivers::interface::noop::NoopInterface;
//! # use click_drivers::accel11::Accel11;
//! # struct Delay;
//! # impl embedded_hal::blocking::delay::DelayMs<u32> for Delay {
//! #     fn delay_ms(&mut self, _: u32) {}
//! # }
//! let mut accel = Accel11::new(NoopInterface);
//! // The no-op interface reads zeros, so the chip id check fails.
//! assert!(accel.init(&mut Delay).is_err());
//! ```

mod config;
pub mod registers;

use hal::blocking::delay::DelayMs;
use hal::blocking::{i2c, spi};
use hal::digital::v2::OutputPin;

pub use self::config::{Bandwidth, Configurator, OutputDataRate, Range};
use self::config::{AccConf, AccelConfig};
use self::registers as reg;
use crate::error::{poll, Error};
use crate::interface::i2c::I2cInterface;
use crate::interface::spi::{SpiConfig, SpiInterface};
use crate::interface::RegisterInterface;
use crate::types::Axes;

/// I2C slave address, selected by the SDO pin (the ADDR SEL jumper on the Click).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Address {
    /// SDO low: 0x18.
    Primary,
    /// SDO high: 0x19.
    Secondary,
}

impl From<Address> for u8 {
    fn from(a: Address) -> u8 {
        match a {
            Address::Primary => 0x18,
            Address::Secondary => 0x19,
        }
    }
}

impl Default for Address {
    fn default() -> Self {
        Address::Secondary
    }
}

/// The SPI framing of the BMA456: read flag in the MSB and one dummy byte before read data.
pub const SPI_CONFIG: SpiConfig = SpiConfig::new().with_dummy_bytes(1);

const DATA_READY_POLLS: u32 = 20;
const DATA_READY_INTERVAL_MS: u32 = 10;
const SOFT_RESET_MS: u32 = 2;
// 450 µs, rounded up.
const POWER_SAVE_SETTLE_MS: u32 = 1;

/// One of the two interfaces, chosen at run time.
pub enum Transport<I2C, SPI, CS> {
    I2c(I2cInterface<I2C>),
    Spi(SpiInterface<SPI, CS>),
}

/// Error of whichever interface a [`Transport`] holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError<IE, SE> {
    I2c(IE),
    Spi(SE),
}

impl<I2C, SPI, CS> RegisterInterface for Transport<I2C, SPI, CS>
where
    I2C: i2c::Write + i2c::WriteRead,
    SPI: spi::Write<u8> + spi::Transfer<u8>,
    CS: OutputPin,
{
    type Error = TransportError<
        <I2cInterface<I2C> as RegisterInterface>::Error,
        <SpiInterface<SPI, CS> as RegisterInterface>::Error,
    >;

    fn write_registers(&mut self, reg: u8, data: &[u8]) -> Result<(), Self::Error> {
        match self {
            Transport::I2c(iface) => iface.write_registers(reg, data).map_err(TransportError::I2c),
            Transport::Spi(iface) => iface.write_registers(reg, data).map_err(TransportError::Spi),
        }
    }

    fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
        match self {
            Transport::I2c(iface) => iface.read_registers(reg, buf).map_err(TransportError::I2c),
            Transport::Spi(iface) => iface.read_registers(reg, buf).map_err(TransportError::Spi),
        }
    }
}

/// A BMA456 accelerometer.
pub struct Accel11<T> {
    iface: T,
    pub(crate) config: AccelConfig,
}

impl<I2C> Accel11<I2cInterface<I2C>>
where
    I2C: i2c::Write + i2c::WriteRead,
{
    /// Talk to the accelerometer over I2C.
    pub fn new_i2c(i2c: I2C, address: Address) -> Self {
        Self::new(I2cInterface::new(i2c, address.into()))
    }
}

impl<SPI, CS> Accel11<SpiInterface<SPI, CS>>
where
    SPI: spi::Write<u8> + spi::Transfer<u8>,
    CS: OutputPin,
{
    /// Talk to the accelerometer over SPI with `cs` as chip select.
    pub fn new_spi(spi: SPI, cs: CS) -> Self {
        Self::new(SpiInterface::new(spi, cs, SPI_CONFIG))
    }
}

impl<T: RegisterInterface> Accel11<T> {
    /// Create a driver over an already configured interface. For SPI the interface must use
    /// [`SPI_CONFIG`].
    pub fn new(iface: T) -> Self {
        Self {
            iface,
            config: AccelConfig::default(),
        }
    }

    /// Give back the interface.
    pub fn release(self) -> T {
        self.iface
    }

    /// Reset the chip, verify its identity and apply [`default_cfg`](Self::default_cfg).
    pub fn init<D: DelayMs<u32>>(&mut self, delay: &mut D) -> Result<(), Error<T::Error>> {
        // A rising CSB edge switches the chip to SPI; over I2C the read is harmless.
        self.iface.read_register(reg::CHIP_ID)?;
        self.soft_reset(delay)?;
        self.iface.read_register(reg::CHIP_ID)?;
        self.check_communication()?;
        self.default_cfg(delay)
    }

    /// Power save off, accelerometer on at 100 Hz, averaging over 4 samples in performance
    /// mode, ±2 g.
    pub fn default_cfg<D: DelayMs<u32>>(&mut self, delay: &mut D) -> Result<(), Error<T::Error>> {
        self.set_advanced_power_save(false, delay)?;
        self.configure()
            .odr(OutputDataRate::Hz100)
            .bandwidth(Bandwidth::NormalAvg4)
            .performance_mode(true)
            .range(Range::G2)
            .enable(true)
            .commit()
    }

    /// Start a configuration change.
    pub fn configure(&mut self) -> Configurator<'_, T> {
        Configurator::new(self)
    }

    /// Check the chip id.
    pub fn check_communication(&mut self) -> Result<(), Error<T::Error>> {
        let id = self.iface.read_register(reg::CHIP_ID)?;
        if id != reg::CHIP_ID_VALUE {
            log::warn!("accel11: unexpected chip id {:#04x}", id);
            return Err(Error::WrongDevice(id));
        }
        log::debug!("accel11: BMA456 found");
        Ok(())
    }

    /// Issue a soft reset and wait for the chip to come back. The cached configuration returns
    /// to its power-on values.
    pub fn soft_reset<D: DelayMs<u32>>(&mut self, delay: &mut D) -> Result<(), Error<T::Error>> {
        self.iface.write_register(reg::CMD, reg::CMD_SOFT_RESET)?;
        delay.delay_ms(SOFT_RESET_MS);
        self.config = AccelConfig::default();
        Ok(())
    }

    /// Turn advanced power save on or off, waiting for the interface to settle.
    pub fn set_advanced_power_save<D: DelayMs<u32>>(
        &mut self,
        enable: bool,
        delay: &mut D,
    ) -> Result<(), Error<T::Error>> {
        let mut cfg = self.config;
        cfg.advanced_power_save = enable;
        self.write_pwr_conf(cfg.pwr_conf())?;
        self.config = cfg;
        delay.delay_ms(POWER_SAVE_SETTLE_MS);
        Ok(())
    }

    /// The range the driver scales readings with.
    pub fn range(&self) -> Range {
        self.config.range
    }

    /// Whether a new sample is waiting.
    pub fn data_ready(&mut self) -> Result<bool, Error<T::Error>> {
        let status = self.iface.read_register(reg::STATUS)?;
        Ok(status & reg::status::DRDY_ACC != 0)
    }

    /// Poll [`data_ready`](Self::data_ready) for up to 200 ms.
    pub fn wait_data_ready<D: DelayMs<u32>>(
        &mut self,
        delay: &mut D,
    ) -> Result<(), Error<T::Error>> {
        let result = poll(
            DATA_READY_POLLS,
            || self.data_ready(),
            || delay.delay_ms(DATA_READY_INTERVAL_MS),
        );
        if matches!(result, Err(Error::Timeout)) {
            log::warn!("accel11: no data ready");
        }
        result
    }

    /// Read the three axes as raw counts.
    pub fn read_raw_axes(&mut self) -> Result<Axes<i16>, Error<T::Error>> {
        let mut buf = [0u8; 6];
        self.iface.read_registers(reg::DATA_X_LSB, &mut buf)?;
        Ok(Axes::from_le_bytes(&buf))
    }

    /// Read the three axes in g, scaled by the configured range.
    pub fn read_axes_g(&mut self) -> Result<Axes<f32>, Error<T::Error>> {
        let lsb_per_g = self.config.range.lsb_per_g();
        Ok(self.read_raw_axes()?.map(|v| f32::from(v) / lsb_per_g))
    }

    /// Die temperature in °C, with 1 K resolution.
    pub fn read_temperature(&mut self) -> Result<f32, Error<T::Error>> {
        let raw = self.iface.read_register(reg::TEMPERATURE)?;
        if raw == reg::TEMPERATURE_INVALID {
            return Err(Error::InvalidData);
        }
        Ok(f32::from(raw as i8) + 23.0)
    }

    /// The free-running 24-bit sensor time, 39.0625 µs per count.
    pub fn sensor_time(&mut self) -> Result<u32, Error<T::Error>> {
        let mut buf = [0u8; 3];
        self.iface.read_registers(reg::SENSOR_TIME_0, &mut buf)?;
        Ok(u32::from_le_bytes([buf[0], buf[1], buf[2], 0]))
    }

    /// The `ERR_REG` contents.
    pub fn read_error_flags(&mut self) -> Result<u8, Error<T::Error>> {
        Ok(self.iface.read_register(reg::ERR_REG)?)
    }

    /// Read any register.
    pub fn read_register(&mut self, address: u8) -> Result<u8, Error<T::Error>> {
        Ok(self.iface.read_register(address)?)
    }

    /// Write any register. The cached configuration is not updated.
    pub fn write_register(&mut self, address: u8, value: u8) -> Result<(), Error<T::Error>> {
        Ok(self.iface.write_register(address, value)?)
    }

    pub(crate) fn write_acc_conf(&mut self, cfg: AccConf) -> Result<(), Error<T::Error>> {
        Ok(self.iface.write_register(reg::ACC_CONF, cfg.into())?)
    }

    pub(crate) fn write_range(&mut self, range: Range) -> Result<(), Error<T::Error>> {
        Ok(self.iface.write_register(reg::ACC_RANGE, range.into())?)
    }

    pub(crate) fn write_pwr_ctrl(&mut self, value: u8) -> Result<(), Error<T::Error>> {
        Ok(self.iface.write_register(reg::PWR_CTRL, value)?)
    }

    pub(crate) fn write_pwr_conf(&mut self, value: u8) -> Result<(), Error<T::Error>> {
        Ok(self.iface.write_register(reg::PWR_CONF, value)?)
    }
}
