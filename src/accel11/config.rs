//! Abstractions used to configure the BMA456 accelerometer.

use super::registers::{pwr_conf, pwr_ctrl};
use super::Accel11;
use crate::error::Error;
use crate::interface::RegisterInterface;

/// Measurement range of the accelerometer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Range {
    /// ±2 g.
    G2,
    /// ±4 g.
    G4,
    /// ±8 g.
    G8,
    /// ±16 g.
    G16,
}

impl Range {
    /// Counts per g at this range.
    pub fn lsb_per_g(self) -> f32 {
        match self {
            Range::G2 => 16384.0,
            Range::G4 => 8192.0,
            Range::G8 => 4096.0,
            Range::G16 => 2048.0,
        }
    }
}

impl From<Range> for u8 {
    fn from(range: Range) -> u8 {
        match range {
            Range::G2 => 0x00,
            Range::G4 => 0x01,
            Range::G8 => 0x02,
            Range::G16 => 0x03,
        }
    }
}

/// Output data rate, in the `acc_odr` encoding of `ACC_CONF`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputDataRate {
    Hz0_78 = 0x01,
    Hz1_56 = 0x02,
    Hz3_12 = 0x03,
    Hz6_25 = 0x04,
    Hz12_5 = 0x05,
    Hz25 = 0x06,
    Hz50 = 0x07,
    Hz100 = 0x08,
    Hz200 = 0x09,
    Hz400 = 0x0A,
    Hz800 = 0x0B,
    Hz1600 = 0x0C,
}

/// Filter setting, in the `acc_bwp` encoding of `ACC_CONF`. In performance mode the first four
/// select the oversampling ratio; in low-power mode the averaging depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bandwidth {
    Osr4Avg1 = 0x00,
    Osr2Avg2 = 0x01,
    NormalAvg4 = 0x02,
    CicAvg8 = 0x03,
    ResAvg16 = 0x04,
    ResAvg32 = 0x05,
    ResAvg64 = 0x06,
    ResAvg128 = 0x07,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct AccConf {
    pub(crate) odr: OutputDataRate,
    pub(crate) bandwidth: Bandwidth,
    pub(crate) performance: bool,
}

impl Default for AccConf {
    // Power-on value 0xA8.
    fn default() -> Self {
        Self {
            odr: OutputDataRate::Hz100,
            bandwidth: Bandwidth::NormalAvg4,
            performance: true,
        }
    }
}

impl From<AccConf> for u8 {
    fn from(cfg: AccConf) -> u8 {
        let perf = if cfg.performance { 0x80 } else { 0 };
        perf | (cfg.bandwidth as u8) << 4 | cfg.odr as u8
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct AccelConfig {
    pub(crate) acc_conf: AccConf,
    pub(crate) range: Range,
    pub(crate) enabled: bool,
    pub(crate) advanced_power_save: bool,
}

impl Default for AccelConfig {
    fn default() -> Self {
        Self {
            acc_conf: AccConf::default(),
            range: Range::G4,
            enabled: false,
            advanced_power_save: true,
        }
    }
}

impl AccelConfig {
    pub(crate) fn pwr_ctrl(&self) -> u8 {
        if self.enabled {
            pwr_ctrl::ACC_EN
        } else {
            0
        }
    }

    pub(crate) fn pwr_conf(&self) -> u8 {
        if self.advanced_power_save {
            pwr_conf::ADV_POWER_SAVE
        } else {
            0
        }
    }
}

/// A `Configurator` provides methods to build a list of accelerometer configuration changes and
/// commit them to the device. You obtain one from `Accel11::configure()`, chain method calls on
/// it, and then end the chain with `commit()` to transmit them to the BMA456.
///
/// ```
/// # use click_drivers::interface::noop::NoopInterface;
/// # use click_drivers::accel11::{Accel11, OutputDataRate, Range};
/// let mut accel = Accel11::new(NoopInterface);
/// accel
///     .configure()
///     .range(Range::G8)
///     .odr(OutputDataRate::Hz200)
///     .enable(true)
///     .commit()
///     .unwrap();
/// ```
///
/// While advanced power save is on, the BMA456 needs 450 µs between register writes. `commit`
/// does not wait, so turn power save off with
/// [`set_advanced_power_save`](Accel11::set_advanced_power_save) before reconfiguring.
/// Turning it on from here is fine: `PWR_CONF` is written last.
#[must_use = "Configuration changes are not applied unless committed"]
pub struct Configurator<'a, T: RegisterInterface> {
    accel: &'a mut Accel11<T>,
    staged: AccelConfig,
    acc_conf_dirty: bool,
    range_dirty: bool,
    pwr_ctrl_dirty: bool,
    pwr_conf_dirty: bool,
}

impl<'a, T: RegisterInterface> Configurator<'a, T> {
    pub(crate) fn new(accel: &'a mut Accel11<T>) -> Self {
        let staged = accel.config;
        Self {
            accel,
            staged,
            acc_conf_dirty: false,
            range_dirty: false,
            pwr_ctrl_dirty: false,
            pwr_conf_dirty: false,
        }
    }

    /// Set the measurement range.
    pub fn range(mut self, range: Range) -> Self {
        self.staged.range = range;
        self.range_dirty = true;
        self
    }

    /// Set the output data rate.
    pub fn odr(mut self, odr: OutputDataRate) -> Self {
        self.staged.acc_conf.odr = odr;
        self.acc_conf_dirty = true;
        self
    }

    /// Set the filter bandwidth parameter.
    pub fn bandwidth(mut self, bandwidth: Bandwidth) -> Self {
        self.staged.acc_conf.bandwidth = bandwidth;
        self.acc_conf_dirty = true;
        self
    }

    /// Select continuous filter (performance) mode when `true`, averaging mode when `false`.
    pub fn performance_mode(mut self, enable: bool) -> Self {
        self.staged.acc_conf.performance = enable;
        self.acc_conf_dirty = true;
        self
    }

    /// Switch the accelerometer on or off.
    pub fn enable(mut self, enable: bool) -> Self {
        self.staged.enabled = enable;
        self.pwr_ctrl_dirty = true;
        self
    }

    /// Set the advanced power save bit.
    pub fn advanced_power_save(mut self, enable: bool) -> Self {
        self.staged.advanced_power_save = enable;
        self.pwr_conf_dirty = true;
        self
    }

    /// Commit the configuration changes to the BMA456. Registers that were not changed are not
    /// written. The first failing write aborts the commit; the driver keeps tracking the
    /// registers written before it.
    pub fn commit(self) -> Result<(), Error<T::Error>> {
        let staged = self.staged;
        if self.acc_conf_dirty {
            self.accel.write_acc_conf(staged.acc_conf)?;
            self.accel.config.acc_conf = staged.acc_conf;
        }
        if self.range_dirty {
            self.accel.write_range(staged.range)?;
            self.accel.config.range = staged.range;
        }
        if self.pwr_ctrl_dirty {
            self.accel.write_pwr_ctrl(staged.pwr_ctrl())?;
            self.accel.config.enabled = staged.enabled;
        }
        if self.pwr_conf_dirty {
            self.accel.write_pwr_conf(staged.pwr_conf())?;
            self.accel.config.advanced_power_save = staged.advanced_power_save;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acc_conf_default_is_power_on_value() {
        assert_eq!(u8::from(AccConf::default()), 0xA8);
    }

    #[test]
    fn acc_conf_low_power_fast() {
        let cfg = AccConf {
            odr: OutputDataRate::Hz1600,
            bandwidth: Bandwidth::ResAvg128,
            performance: false,
        };
        assert_eq!(u8::from(cfg), 0x7C);
    }

    #[test]
    fn range_encoding() {
        assert_eq!(u8::from(Range::G2), 0);
        assert_eq!(u8::from(Range::G16), 3);
        assert_eq!(Range::G8.lsb_per_g(), 4096.0);
    }

    #[test]
    fn power_bits() {
        let mut cfg = AccelConfig::default();
        assert_eq!(cfg.pwr_conf(), 0x01);
        assert_eq!(cfg.pwr_ctrl(), 0x00);
        cfg.enabled = true;
        cfg.advanced_power_save = false;
        assert_eq!(cfg.pwr_conf(), 0x00);
        assert_eq!(cfg.pwr_ctrl(), 0x04);
    }
}
