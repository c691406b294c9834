//! Driver for the Magneto 6 Click, a TLV493D 3D Hall-effect sensor.
//!
//! The TLV493D has no register pointer: a read always starts at the first data byte and a write
//! always updates all four mode bytes. The Click is often wired to GPIOs rather than a hardware
//! I2C peripheral, in which case [`SoftI2c`](crate::bitbang::SoftI2c) can be passed as the bus.

use hal::blocking::i2c::{Read, Write};

use crate::error::Error;

/// I2C address, selected by the level of SDA at power-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Address {
    /// SDA high at power-up: 0x5E.
    Primary,
    /// SDA low at power-up: 0x1F.
    Secondary,
}

impl From<Address> for u8 {
    fn from(a: Address) -> u8 {
        match a {
            Address::Primary => 0x5E,
            Address::Secondary => 0x1F,
        }
    }
}

/// Measurement mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    PowerDown,
    /// Continuous conversions at about 3.3 kHz.
    Fast,
    /// One conversion every 12 ms.
    LowPower,
    /// One conversion every 100 ms.
    UltraLowPower,
    /// Conversions triggered by reads.
    MasterControlled,
}

impl Mode {
    /// The (FAST, LOW, LP) bits for this mode.
    fn bits(self) -> (bool, bool, bool) {
        match self {
            Mode::PowerDown => (false, false, false),
            Mode::Fast => (true, false, false),
            Mode::LowPower => (false, true, true),
            Mode::UltraLowPower => (false, true, false),
            Mode::MasterControlled => (true, true, true),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub mode: Mode,
    /// Measure temperature alongside the field.
    pub temperature: bool,
    /// Pulse SCL low after every conversion.
    pub interrupt: bool,
    /// Let the sensor check the parity of written configuration.
    pub parity_test: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::LowPower,
            temperature: true,
            interrupt: false,
            parity_test: true,
        }
    }
}

impl Config {
    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, enable: bool) -> Self {
        self.temperature = enable;
        self
    }

    #[must_use]
    pub fn with_interrupt(mut self, enable: bool) -> Self {
        self.interrupt = enable;
        self
    }

    #[must_use]
    pub fn with_parity_test(mut self, enable: bool) -> Self {
        self.parity_test = enable;
        self
    }
}

/// Raw 12-bit two's complement readings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawData {
    pub x: i16,
    pub y: i16,
    pub z: i16,
    pub temperature: i16,
    /// Incremented by the sensor on every conversion, modulo 4.
    pub frame: u8,
}

/// Field in mT and temperature in °C.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Data {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub temperature: f32,
}

pub const MT_PER_LSB: f32 = 0.098;
const TEMPERATURE_OFFSET: i16 = 340;
const TEMPERATURE_SCALE: f32 = 1.1;
const TEMPERATURE_AT_OFFSET: f32 = 25.0;

const READ_LEN: usize = 10;
const DATA_LEN: usize = 7;

/// Factory settings read back at init which must be rewritten unchanged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct FactoryBits {
    mod1: u8,
    reserved: u8,
    mod2: u8,
}

impl FactoryBits {
    fn from_read_registers(regs: &[u8; READ_LEN]) -> Self {
        Self {
            mod1: regs[7] & 0x18,
            reserved: regs[8],
            mod2: regs[9] & 0x1F,
        }
    }
}

/// The four bytes written to the sensor, odd parity over all of them in bit 7 of MOD1.
fn encode_config(config: &Config, factory: &FactoryBits) -> [u8; 4] {
    let (fast, low, lp) = config.mode.bits();
    let mut mod1 = factory.mod1;
    if config.interrupt {
        mod1 |= 0x04;
    }
    if fast {
        mod1 |= 0x02;
    }
    if low {
        mod1 |= 0x01;
    }
    let mut mod2 = factory.mod2;
    if !config.temperature {
        mod2 |= 0x80;
    }
    if lp {
        mod2 |= 0x40;
    }
    if config.parity_test {
        mod2 |= 0x20;
    }
    let mut frame = [0x00, mod1, factory.reserved, mod2];
    let ones: u32 = frame.iter().map(|b| b.count_ones()).sum();
    if ones % 2 == 0 {
        frame[1] |= 0x80;
    }
    frame
}

fn sign_extend_12(v: u16) -> i16 {
    ((v << 4) as i16) >> 4
}

fn decode(regs: &[u8; DATA_LEN]) -> Option<RawData> {
    if regs[3] & 0x03 != 0 {
        return None;
    }
    let x = u16::from(regs[0]) << 4 | u16::from(regs[4] >> 4);
    let y = u16::from(regs[1]) << 4 | u16::from(regs[4] & 0x0F);
    let z = u16::from(regs[2]) << 4 | u16::from(regs[5] & 0x0F);
    let t = u16::from(regs[3] & 0xF0) << 4 | u16::from(regs[6]);
    Some(RawData {
        x: sign_extend_12(x),
        y: sign_extend_12(y),
        z: sign_extend_12(z),
        temperature: sign_extend_12(t),
        frame: (regs[3] >> 2) & 0x03,
    })
}

impl From<RawData> for Data {
    fn from(raw: RawData) -> Self {
        Self {
            x: f32::from(raw.x) * MT_PER_LSB,
            y: f32::from(raw.y) * MT_PER_LSB,
            z: f32::from(raw.z) * MT_PER_LSB,
            temperature: f32::from(raw.temperature - TEMPERATURE_OFFSET) * TEMPERATURE_SCALE
                + TEMPERATURE_AT_OFFSET,
        }
    }
}

/// A TLV493D magnetic sensor.
pub struct Magneto6<I2C> {
    i2c: I2C,
    address: u8,
    config: Config,
    factory: FactoryBits,
}

impl<I2C, E> Magneto6<I2C>
where
    I2C: Read<Error = E> + Write<Error = E>,
{
    pub fn new(i2c: I2C, address: Address, config: Config) -> Self {
        Self {
            i2c,
            address: address.into(),
            config,
            factory: FactoryBits::default(),
        }
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    /// Read the factory settings and write the configuration.
    pub fn init(&mut self) -> Result<(), Error<E>> {
        let mut regs = [0u8; READ_LEN];
        self.i2c.read(self.address, &mut regs)?;
        self.factory = FactoryBits::from_read_registers(&regs);
        log::debug!("magneto6: factory bits {:?}", self.factory);
        self.write_config()
    }

    pub fn config(&self) -> Config {
        self.config
    }

    /// Replace the whole configuration.
    pub fn set_config(&mut self, config: Config) -> Result<(), Error<E>> {
        self.config = config;
        self.write_config()
    }

    pub fn set_mode(&mut self, mode: Mode) -> Result<(), Error<E>> {
        self.set_config(self.config.with_mode(mode))
    }

    fn write_config(&mut self) -> Result<(), Error<E>> {
        let frame = encode_config(&self.config, &self.factory);
        log::trace!("magneto6: config {:02x?}", frame);
        self.i2c.write(self.address, &frame)?;
        Ok(())
    }

    /// Read the latest conversion. Returns `Error::NotReady` if the sensor was mid-conversion.
    pub fn read_raw(&mut self) -> Result<RawData, Error<E>> {
        let mut regs = [0u8; DATA_LEN];
        self.i2c.read(self.address, &mut regs)?;
        decode(&regs).ok_or(Error::NotReady)
    }

    pub fn read_data(&mut self) -> Result<Data, Error<E>> {
        self.read_raw().map(Data::from)
    }
}
