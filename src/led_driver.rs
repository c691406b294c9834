//! Driver for the PCA9685 16-channel, 12-bit PWM LED controller.
//!
//! Every channel has an ON and an OFF counter value in a 4096-step period; the output goes
//! high when the counter reaches ON and low when it reaches OFF. Bit 4 of the high byte of
//! either value forces the output fully on or fully off.

use hal::blocking::delay::DelayMs;
use hal::blocking::i2c;

use crate::error::Error;
use crate::interface::i2c::I2cInterface;
use crate::interface::RegisterInterface;

pub mod registers {
    pub const MODE1: u8 = 0x00;
    pub const MODE2: u8 = 0x01;
    /// LED0_ON_L. Each channel has four registers: ON_L, ON_H, OFF_L, OFF_H.
    pub const LED0: u8 = 0x06;
    pub const ALL_LED: u8 = 0xFA;
    pub const PRE_SCALE: u8 = 0xFE;

    pub mod mode1 {
        pub const RESTART: u8 = 1 << 7;
        pub const AI: u8 = 1 << 5;
        pub const SLEEP: u8 = 1 << 4;
        pub const ALLCALL: u8 = 1 << 0;
    }

    pub mod mode2 {
        pub const INVRT: u8 = 1 << 4;
        pub const OUTDRV: u8 = 1 << 2;
    }

    /// Full on / full off flag in the high byte of ON or OFF.
    pub const FULL: u8 = 1 << 4;
}

use self::registers as reg;

pub const DEFAULT_ADDRESS: u8 = 0x40;
pub const CHANNELS: u8 = 16;
/// Highest counter value and duty cycle.
pub const MAX_VALUE: u16 = 4095;

const OSCILLATOR_HZ: u32 = 25_000_000;
const MIN_PRESCALE: u32 = 3;
const MAX_PRESCALE: u32 = 255;
const OSCILLATOR_SETTLE_MS: u32 = 1;

/// Prescaler value for an output frequency, or `None` when out of reach of the internal
/// oscillator (about 24 Hz to 1526 Hz).
pub fn prescale_for(hz: u32) -> Option<u8> {
    if hz == 0 {
        return None;
    }
    let divisor = hz.checked_mul(4096)?;
    let rounded = (OSCILLATOR_HZ + divisor / 2) / divisor;
    let prescale = rounded.checked_sub(1)?;
    if (MIN_PRESCALE..=MAX_PRESCALE).contains(&prescale) {
        Some(prescale as u8)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputDriver {
    OpenDrain,
    TotemPole,
}

pub struct LedDriver<T> {
    iface: T,
}

impl<I2C> LedDriver<I2cInterface<I2C>>
where
    I2C: i2c::Write + i2c::WriteRead,
{
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self::with_interface(I2cInterface::new(i2c, address))
    }
}

impl<T: RegisterInterface> LedDriver<T> {
    pub fn with_interface(iface: T) -> Self {
        Self { iface }
    }

    pub fn release(self) -> T {
        self.iface
    }

    /// Auto-increment and all-call on, oscillator running, totem-pole outputs, every channel
    /// off.
    pub fn init(&mut self) -> Result<(), Error<T::Error>> {
        self.iface
            .write_register(reg::MODE1, reg::mode1::AI | reg::mode1::ALLCALL)?;
        self.iface.write_register(reg::MODE2, reg::mode2::OUTDRV)?;
        self.set_all_off()
    }

    /// Change the PWM frequency. The prescaler can only be written while the oscillator is
    /// stopped, so the chip is put to sleep and restarted around the write.
    pub fn set_pwm_frequency<D: DelayMs<u32>>(
        &mut self,
        hz: u32,
        delay: &mut D,
    ) -> Result<(), Error<T::Error>> {
        let prescale = prescale_for(hz).ok_or(Error::InvalidArgument)?;
        let mode1 = self.iface.read_register(reg::MODE1)? & !reg::mode1::RESTART;
        self.iface
            .write_register(reg::MODE1, mode1 | reg::mode1::SLEEP)?;
        self.iface.write_register(reg::PRE_SCALE, prescale)?;
        let awake = mode1 & !reg::mode1::SLEEP;
        self.iface.write_register(reg::MODE1, awake)?;
        delay.delay_ms(OSCILLATOR_SETTLE_MS);
        self.iface
            .write_register(reg::MODE1, awake | reg::mode1::RESTART)?;
        log::debug!("pca9685: {} Hz, prescale {}", hz, prescale);
        Ok(())
    }

    pub fn prescale(&mut self) -> Result<u8, Error<T::Error>> {
        Ok(self.iface.read_register(reg::PRE_SCALE)?)
    }

    fn write_counters(
        &mut self,
        first: u8,
        on: [u8; 2],
        off: [u8; 2],
    ) -> Result<(), Error<T::Error>> {
        self.iface
            .write_registers(first, &[on[0], on[1], off[0], off[1]])?;
        Ok(())
    }

    fn channel_register(channel: u8) -> Result<u8, Error<T::Error>> {
        if channel >= CHANNELS {
            return Err(Error::InvalidArgument);
        }
        Ok(reg::LED0 + 4 * channel)
    }

    /// Set the raw ON and OFF counter values of `channel`.
    pub fn set_channel(&mut self, channel: u8, on: u16, off: u16) -> Result<(), Error<T::Error>> {
        let first = Self::channel_register(channel)?;
        if on > MAX_VALUE || off > MAX_VALUE {
            return Err(Error::InvalidArgument);
        }
        self.write_counters(first, on.to_le_bytes(), off.to_le_bytes())
    }

    /// Set the duty cycle of `channel` in 4096ths. 0 and [`MAX_VALUE`] use the full off and
    /// full on flags.
    pub fn set_duty(&mut self, channel: u8, duty: u16) -> Result<(), Error<T::Error>> {
        let first = Self::channel_register(channel)?;
        match duty {
            0 => self.write_counters(first, [0, 0], [0, reg::FULL]),
            MAX_VALUE => self.write_counters(first, [0, reg::FULL], [0, 0]),
            d if d < MAX_VALUE => self.write_counters(first, [0, 0], d.to_le_bytes()),
            _ => Err(Error::InvalidArgument),
        }
    }

    /// Set the ON and OFF values of every channel at once.
    pub fn set_all(&mut self, on: u16, off: u16) -> Result<(), Error<T::Error>> {
        if on > MAX_VALUE || off > MAX_VALUE {
            return Err(Error::InvalidArgument);
        }
        self.write_counters(reg::ALL_LED, on.to_le_bytes(), off.to_le_bytes())
    }

    pub fn set_all_off(&mut self) -> Result<(), Error<T::Error>> {
        self.write_counters(reg::ALL_LED, [0, 0], [0, reg::FULL])
    }

    /// Stop the oscillator. Outputs are off while asleep.
    pub fn sleep(&mut self) -> Result<(), Error<T::Error>> {
        self.iface
            .modify_register(reg::MODE1, |m| (m & !reg::mode1::RESTART) | reg::mode1::SLEEP)?;
        Ok(())
    }

    /// Restart the oscillator and resume the PWM outputs where they left off.
    pub fn wake<D: DelayMs<u32>>(&mut self, delay: &mut D) -> Result<(), Error<T::Error>> {
        let mode1 = self.iface.read_register(reg::MODE1)?;
        let awake = mode1 & !(reg::mode1::SLEEP | reg::mode1::RESTART);
        self.iface.write_register(reg::MODE1, awake)?;
        delay.delay_ms(OSCILLATOR_SETTLE_MS);
        if mode1 & reg::mode1::RESTART != 0 {
            self.iface
                .write_register(reg::MODE1, awake | reg::mode1::RESTART)?;
        }
        Ok(())
    }

    /// Invert the output logic, for LEDs driven through an external inverter.
    pub fn set_output_invert(&mut self, invert: bool) -> Result<(), Error<T::Error>> {
        self.iface.modify_register(reg::MODE2, |m| {
            if invert {
                m | reg::mode2::INVRT
            } else {
                m & !reg::mode2::INVRT
            }
        })?;
        Ok(())
    }

    pub fn set_output_driver(&mut self, driver: OutputDriver) -> Result<(), Error<T::Error>> {
        self.iface.modify_register(reg::MODE2, |m| match driver {
            OutputDriver::TotemPole => m | reg::mode2::OUTDRV,
            OutputDriver::OpenDrain => m & !reg::mode2::OUTDRV,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockDelay, RegisterFileI2c};

    fn driver() -> (RegisterFileI2c, LedDriver<I2cInterface<RegisterFileI2c>>) {
        let i2c = RegisterFileI2c::new(DEFAULT_ADDRESS);
        let drv = LedDriver::new(i2c.split(), DEFAULT_ADDRESS);
        (i2c, drv)
    }

    #[test]
    fn init_writes_modes_and_turns_all_off() {
        let (i2c, mut drv) = driver();
        drv.init().unwrap();
        assert_eq!(i2c.peek(0x00), 0x21);
        assert_eq!(i2c.peek(0x01), 0x04);
        assert_eq!(i2c.writes()[2], vec![0xFA, 0x00, 0x00, 0x00, 0x10]);
    }

    #[test]
    fn prescale_values() {
        assert_eq!(prescale_for(200), Some(30));
        assert_eq!(prescale_for(50), Some(121));
        assert_eq!(prescale_for(1526), Some(3));
        assert_eq!(prescale_for(2000), None);
        assert_eq!(prescale_for(20), None);
        assert_eq!(prescale_for(0), None);
    }

    #[test]
    fn frequency_written_asleep_then_restarted() {
        let (i2c, mut drv) = driver();
        i2c.poke(0x00, 0x21);
        let mut delay = MockDelay::new();
        drv.set_pwm_frequency(200, &mut delay).unwrap();
        assert_eq!(
            i2c.writes(),
            vec![
                vec![0x00, 0x31],
                vec![0xFE, 30],
                vec![0x00, 0x21],
                vec![0x00, 0xA1],
            ]
        );
        assert_eq!(delay.ms, 1);
    }

    #[test]
    fn frequency_out_of_range() {
        let (i2c, mut drv) = driver();
        assert_eq!(
            drv.set_pwm_frequency(2000, &mut MockDelay::new()),
            Err(Error::InvalidArgument)
        );
        assert!(i2c.writes().is_empty());
    }

    #[test]
    fn duty_extremes_use_full_flags() {
        let (i2c, mut drv) = driver();
        drv.set_duty(0, 0).unwrap();
        drv.set_duty(15, MAX_VALUE).unwrap();
        drv.set_duty(2, 1024).unwrap();
        assert_eq!(
            i2c.writes(),
            vec![
                vec![0x06, 0x00, 0x00, 0x00, 0x10],
                vec![0x42, 0x00, 0x10, 0x00, 0x00],
                vec![0x0E, 0x00, 0x00, 0x00, 0x04],
            ]
        );
    }

    #[test]
    fn channel_and_value_ranges() {
        let (_, mut drv) = driver();
        assert_eq!(drv.set_duty(16, 1), Err(Error::InvalidArgument));
        assert_eq!(drv.set_duty(0, 4096), Err(Error::InvalidArgument));
        assert_eq!(drv.set_channel(0, 4096, 0), Err(Error::InvalidArgument));
        assert_eq!(drv.set_all(0, 5000), Err(Error::InvalidArgument));
    }

    #[test]
    fn set_channel_raw_counters() {
        let (i2c, mut drv) = driver();
        drv.set_channel(1, 0x123, 0x456).unwrap();
        assert_eq!(i2c.peek(0x0A), 0x23);
        assert_eq!(i2c.peek(0x0B), 0x01);
        assert_eq!(i2c.peek(0x0C), 0x56);
        assert_eq!(i2c.peek(0x0D), 0x04);
    }

    #[test]
    fn sleep_and_wake() {
        let (i2c, mut drv) = driver();
        i2c.poke(0x00, 0xA1);
        drv.sleep().unwrap();
        assert_eq!(i2c.peek(0x00), 0x31);
        // The chip flags RESTART while asleep with PWM active.
        i2c.poke(0x00, 0xB1);
        drv.wake(&mut MockDelay::new()).unwrap();
        assert_eq!(i2c.peek(0x00), 0xA1);
    }

    #[test]
    fn output_modes() {
        let (i2c, mut drv) = driver();
        drv.init().unwrap();
        drv.set_output_invert(true).unwrap();
        assert_eq!(i2c.peek(0x01), 0x14);
        drv.set_output_driver(OutputDriver::OpenDrain).unwrap();
        assert_eq!(i2c.peek(0x01), 0x10);
    }
}
