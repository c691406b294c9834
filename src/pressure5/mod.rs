//! Driver for the Pressure 5 Click, a BMP388 barometric pressure and temperature sensor.
//!
//! The trimming coefficients are read from the sensor's NVM once and kept in the driver, so
//! several sensors can be used side by side.

mod calibration;
pub mod registers;

use hal::blocking::delay::DelayMs;
use hal::blocking::i2c;

pub use self::calibration::Calibration;
use self::registers as reg;
use crate::error::{poll, Error};
use crate::interface::i2c::I2cInterface;
use crate::interface::RegisterInterface;

/// I2C address, selected by the SDO pin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Address {
    /// SDO low: 0x76.
    Primary,
    /// SDO high: 0x77.
    Secondary,
}

impl From<Address> for u8 {
    fn from(a: Address) -> u8 {
        match a {
            Address::Primary => 0x76,
            Address::Secondary => 0x77,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Oversampling {
    X1 = 0,
    X2 = 1,
    X4 = 2,
    X8 = 3,
    X16 = 4,
    X32 = 5,
}

/// Output data rate in normal mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputDataRate {
    Hz200 = 0x00,
    Hz100 = 0x01,
    Hz50 = 0x02,
    Hz25 = 0x03,
    Hz12_5 = 0x04,
    Hz6_25 = 0x05,
    Hz3_1 = 0x06,
    Hz1_5 = 0x07,
    Hz0_78 = 0x08,
    Hz0_39 = 0x09,
    Hz0_2 = 0x0A,
    Hz0_1 = 0x0B,
    Hz0_05 = 0x0C,
    Hz0_02 = 0x0D,
    Hz0_01 = 0x0E,
    Hz0_006 = 0x0F,
    Hz0_003 = 0x10,
    Hz0_0015 = 0x11,
}

/// IIR filter coefficient.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IirFilter {
    Bypass = 0,
    Coef1 = 1,
    Coef3 = 2,
    Coef7 = 3,
    Coef15 = 4,
    Coef31 = 5,
    Coef63 = 6,
    Coef127 = 7,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerMode {
    Sleep = 0b00,
    Forced = 0b01,
    Normal = 0b11,
}

/// Settings applied by [`Pressure5::default_cfg`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub pressure_oversampling: Oversampling,
    pub temperature_oversampling: Oversampling,
    pub odr: OutputDataRate,
    pub iir: IirFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pressure_oversampling: Oversampling::X8,
            temperature_oversampling: Oversampling::X1,
            odr: OutputDataRate::Hz50,
            iir: IirFilter::Coef3,
        }
    }
}

impl Config {
    #[must_use]
    pub fn with_oversampling(mut self, pressure: Oversampling, temperature: Oversampling) -> Self {
        self.pressure_oversampling = pressure;
        self.temperature_oversampling = temperature;
        self
    }

    #[must_use]
    pub fn with_odr(mut self, odr: OutputDataRate) -> Self {
        self.odr = odr;
        self
    }

    #[must_use]
    pub fn with_iir_filter(mut self, iir: IirFilter) -> Self {
        self.iir = iir;
        self
    }
}

/// A compensated reading.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Measurement {
    /// °C.
    pub temperature: f32,
    /// Pa.
    pub pressure: f32,
}

/// Contents of `ERR_REG`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorFlags {
    pub fatal: bool,
    pub command: bool,
    pub configuration: bool,
}

impl From<u8> for ErrorFlags {
    fn from(v: u8) -> Self {
        Self {
            fatal: v & reg::err_reg::FATAL != 0,
            command: v & reg::err_reg::CMD != 0,
            configuration: v & reg::err_reg::CONF != 0,
        }
    }
}

const SOFT_RESET_MS: u32 = 2;
const DATA_READY_POLLS: u32 = 20;
const DATA_READY_INTERVAL_MS: u32 = 10;

/// A BMP388 sensor.
pub struct Pressure5<T> {
    iface: T,
    config: Config,
    calibration: Option<Calibration>,
}

impl<I2C> Pressure5<I2cInterface<I2C>>
where
    I2C: i2c::Write + i2c::WriteRead,
{
    pub fn new_i2c(i2c: I2C, address: Address, config: Config) -> Self {
        Self::new(I2cInterface::new(i2c, address.into()), config)
    }
}

impl<T: RegisterInterface> Pressure5<T> {
    pub fn new(iface: T, config: Config) -> Self {
        Self {
            iface,
            config,
            calibration: None,
        }
    }

    pub fn release(self) -> T {
        self.iface
    }

    /// Reset the sensor, check its identity, load the calibration and apply the configuration.
    pub fn init<D: DelayMs<u32>>(&mut self, delay: &mut D) -> Result<(), Error<T::Error>> {
        self.soft_reset(delay)?;
        self.check_communication()?;
        self.load_calibration()?;
        self.default_cfg()
    }

    /// Write the configuration passed to `new`, with both measurements enabled and the sensor
    /// asleep.
    pub fn default_cfg(&mut self) -> Result<(), Error<T::Error>> {
        let cfg = self.config;
        self.set_oversampling(cfg.pressure_oversampling, cfg.temperature_oversampling)?;
        self.set_odr(cfg.odr)?;
        self.set_iir_filter(cfg.iir)?;
        self.iface.write_register(
            reg::PWR_CTRL,
            reg::pwr_ctrl::PRESS_EN | reg::pwr_ctrl::TEMP_EN,
        )?;
        Ok(())
    }

    pub fn check_communication(&mut self) -> Result<(), Error<T::Error>> {
        let id = self.iface.read_register(reg::CHIP_ID)?;
        if id != reg::CHIP_ID_VALUE {
            log::warn!("pressure5: unexpected chip id {:#04x}", id);
            return Err(Error::WrongDevice(id));
        }
        Ok(())
    }

    pub fn soft_reset<D: DelayMs<u32>>(&mut self, delay: &mut D) -> Result<(), Error<T::Error>> {
        self.iface.write_register(reg::CMD, reg::CMD_SOFT_RESET)?;
        delay.delay_ms(SOFT_RESET_MS);
        Ok(())
    }

    /// Read the trimming coefficients from NVM.
    pub fn load_calibration(&mut self) -> Result<Calibration, Error<T::Error>> {
        let mut nvm = [0u8; reg::CALIB_LEN];
        self.iface.read_registers(reg::CALIB_DATA, &mut nvm)?;
        let cal = Calibration::from_nvm(&nvm);
        log::debug!("pressure5: calibration loaded");
        self.calibration = Some(cal);
        Ok(cal)
    }

    fn calibration(&mut self) -> Result<Calibration, Error<T::Error>> {
        match self.calibration {
            Some(cal) => Ok(cal),
            None => self.load_calibration(),
        }
    }

    pub fn set_oversampling(
        &mut self,
        pressure: Oversampling,
        temperature: Oversampling,
    ) -> Result<(), Error<T::Error>> {
        self.config.pressure_oversampling = pressure;
        self.config.temperature_oversampling = temperature;
        let osr = (temperature as u8) << 3 | pressure as u8;
        Ok(self.iface.write_register(reg::OSR, osr)?)
    }

    pub fn set_odr(&mut self, odr: OutputDataRate) -> Result<(), Error<T::Error>> {
        self.config.odr = odr;
        Ok(self.iface.write_register(reg::ODR, odr as u8)?)
    }

    pub fn set_iir_filter(&mut self, iir: IirFilter) -> Result<(), Error<T::Error>> {
        self.config.iir = iir;
        Ok(self.iface.write_register(reg::CONFIG, (iir as u8) << 1)?)
    }

    /// Change the power mode, keeping the measurement enables.
    pub fn set_power_mode(&mut self, mode: PowerMode) -> Result<(), Error<T::Error>> {
        self.iface.modify_register(reg::PWR_CTRL, |v| {
            v & !reg::pwr_ctrl::MODE_MASK | (mode as u8) << reg::pwr_ctrl::MODE_SHIFT
        })?;
        Ok(())
    }

    pub fn read_error_flags(&mut self) -> Result<ErrorFlags, Error<T::Error>> {
        Ok(self.iface.read_register(reg::ERR_REG)?.into())
    }

    /// The raw 24-bit pressure and temperature.
    pub fn read_raw(&mut self) -> Result<(u32, u32), Error<T::Error>> {
        let mut b = [0u8; 6];
        self.iface.read_registers(reg::DATA_0, &mut b)?;
        let pressure = u32::from_le_bytes([b[0], b[1], b[2], 0]);
        let temperature = u32::from_le_bytes([b[3], b[4], b[5], 0]);
        Ok((pressure, temperature))
    }

    /// Trigger one forced conversion, wait for it and compensate the result.
    pub fn read_measurement<D: DelayMs<u32>>(
        &mut self,
        delay: &mut D,
    ) -> Result<Measurement, Error<T::Error>> {
        let cal = self.calibration()?;
        self.iface.write_register(
            reg::PWR_CTRL,
            reg::pwr_ctrl::PRESS_EN
                | reg::pwr_ctrl::TEMP_EN
                | (PowerMode::Forced as u8) << reg::pwr_ctrl::MODE_SHIFT,
        )?;
        let ready = reg::status::DRDY_PRESS | reg::status::DRDY_TEMP;
        poll(
            DATA_READY_POLLS,
            || Ok(self.iface.read_register(reg::STATUS)? & ready == ready),
            || delay.delay_ms(DATA_READY_INTERVAL_MS),
        )?;
        let (raw_p, raw_t) = self.read_raw()?;
        let t_lin = cal.compensate_temperature(raw_t);
        let pressure = cal.compensate_pressure(raw_p, t_lin);
        Ok(Measurement {
            temperature: t_lin as f32,
            pressure: pressure as f32,
        })
    }
}
