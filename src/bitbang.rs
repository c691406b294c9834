//! A software I2C master over two GPIO pins.
//!
//! Some Click boards (Magneto 6 among them) route their I2C lines to mikroBUS pins that have no
//! hardware I2C peripheral behind them on common host boards. [`SoftI2c`] drives such lines by
//! hand and implements the `embedded-hal` blocking I2C traits, so any driver in this crate can
//! run on top of it unchanged.
//!
//! Both pins must behave as open-drain lines: `set_low` pulls the line down, `set_high` releases
//! it to the pull-up, and `is_high` reads the actual line level (needed for clock stretching,
//! acknowledge bits and read data).
//!
//! The protocol is written as an explicit state machine. Every call to `step` performs one
//! [`Phase`] of the bus and returns the next one; a byte is `Data(7) .. Data(0)`, then `Ack`,
//! then `Idle`. Waiting for a slave that stretches the clock is bounded by a deadline counted in
//! microsecond delays, never an unbounded loop.

use hal::blocking::delay::DelayUs;
use hal::blocking::i2c::{Read, Write, WriteRead};
use hal::digital::v2::{InputPin, OutputPin};

/// Errors from the software I2C master.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// A GPIO operation failed.
    Pin(E),
    /// SCL stayed low past the clock-stretching deadline.
    Timeout,
    /// SDA was held low by another device when a start condition was due.
    BusBusy,
    /// No device acknowledged the address byte.
    AddressNack,
    /// The device did not acknowledge a data byte.
    DataNack,
}

/// The bus phases stepped through by the master.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Between bytes or transactions; nothing to do.
    Idle,
    /// (Repeated) start condition.
    Start,
    /// One data bit, numbered 7 (MSB, sent first) down to 0.
    Data(u8),
    /// The ninth clock: acknowledge from the receiver.
    Ack,
    /// Stop condition.
    Stop,
}

/// The byte currently being shifted.
#[derive(Clone, Copy, Debug)]
struct Shift {
    byte: u8,
    reading: bool,
    /// When reading: whether to acknowledge the byte. When writing: whether it was acknowledged.
    ack: bool,
}

impl Shift {
    fn write(byte: u8) -> Self {
        Self {
            byte,
            reading: false,
            ack: false,
        }
    }

    fn read(ack: bool) -> Self {
        Self {
            byte: 0,
            reading: true,
            ack,
        }
    }
}

/// Default SCL half period: 5 µs, about 100 kHz.
pub const DEFAULT_HALF_PERIOD_US: u32 = 5;
/// Default clock stretching budget.
pub const DEFAULT_TIMEOUT_US: u32 = 1_000;

/// Software I2C master. See the module documentation.
pub struct SoftI2c<SCL, SDA, D> {
    scl: SCL,
    sda: SDA,
    delay: D,
    half_period_us: u32,
    timeout_us: u32,
}

impl<SCL, SDA, D, E> SoftI2c<SCL, SDA, D>
where
    SCL: OutputPin<Error = E> + InputPin<Error = E>,
    SDA: OutputPin<Error = E> + InputPin<Error = E>,
    D: DelayUs<u32>,
{
    /// Create a master on `scl`/`sda` at roughly 100 kHz. Both lines are released.
    pub fn new(scl: SCL, sda: SDA, delay: D) -> Result<Self, Error<E>> {
        let mut bus = Self {
            scl,
            sda,
            delay,
            half_period_us: DEFAULT_HALF_PERIOD_US,
            timeout_us: DEFAULT_TIMEOUT_US,
        };
        bus.sda.set_high().map_err(Error::Pin)?;
        bus.scl.set_high().map_err(Error::Pin)?;
        Ok(bus)
    }

    /// Set the SCL half period in microseconds (minimum 1).
    pub fn with_half_period_us(mut self, us: u32) -> Self {
        self.half_period_us = us.max(1);
        self
    }

    /// Set how long a slave may stretch the clock, in microseconds.
    pub fn with_timeout_us(mut self, us: u32) -> Self {
        self.timeout_us = us;
        self
    }

    /// Give back the pins and the delay.
    pub fn release(self) -> (SCL, SDA, D) {
        (self.scl, self.sda, self.delay)
    }

    /// Clock SCL until a slave stuck mid-byte lets go of SDA (at most nine pulses), then issue
    /// a stop condition.
    pub fn recover(&mut self) -> Result<(), Error<E>> {
        self.sda.set_high().map_err(Error::Pin)?;
        for _ in 0..9 {
            if self.sda.is_high().map_err(Error::Pin)? {
                break;
            }
            self.scl.set_low().map_err(Error::Pin)?;
            self.half_delay();
            self.release_scl()?;
            self.half_delay();
        }
        self.scl.set_low().map_err(Error::Pin)?;
        self.half_delay();
        self.step(Phase::Stop, &mut Shift::write(0)).map(|_| ())
    }

    fn half_delay(&mut self) {
        self.delay.delay_us(self.half_period_us);
    }

    /// Release SCL and wait for it to actually go high.
    fn release_scl(&mut self) -> Result<(), Error<E>> {
        self.scl.set_high().map_err(Error::Pin)?;
        let mut remaining = self.timeout_us;
        while !self.scl.is_high().map_err(Error::Pin)? {
            if remaining == 0 {
                log::warn!("soft i2c: clock held low past {} us", self.timeout_us);
                return Err(Error::Timeout);
            }
            remaining -= 1;
            self.delay.delay_us(1);
        }
        Ok(())
    }

    fn set_sda(&mut self, high: bool) -> Result<(), Error<E>> {
        if high {
            self.sda.set_high().map_err(Error::Pin)
        } else {
            self.sda.set_low().map_err(Error::Pin)
        }
    }

    /// Perform one phase of the bus and return the next one.
    fn step(&mut self, phase: Phase, shift: &mut Shift) -> Result<Phase, Error<E>> {
        match phase {
            Phase::Idle => Ok(Phase::Idle),
            Phase::Start => {
                // SCL may be low here when this is a repeated start.
                self.sda.set_high().map_err(Error::Pin)?;
                self.half_delay();
                self.release_scl()?;
                self.half_delay();
                if self.sda.is_low().map_err(Error::Pin)? {
                    return Err(Error::BusBusy);
                }
                self.sda.set_low().map_err(Error::Pin)?;
                self.half_delay();
                self.scl.set_low().map_err(Error::Pin)?;
                self.half_delay();
                Ok(Phase::Data(7))
            }
            Phase::Data(bit) => {
                if shift.reading {
                    self.sda.set_high().map_err(Error::Pin)?;
                } else {
                    self.set_sda(shift.byte & (1 << bit) != 0)?;
                }
                self.half_delay();
                self.release_scl()?;
                if shift.reading && self.sda.is_high().map_err(Error::Pin)? {
                    shift.byte |= 1 << bit;
                }
                self.half_delay();
                self.scl.set_low().map_err(Error::Pin)?;
                Ok(if bit == 0 {
                    Phase::Ack
                } else {
                    Phase::Data(bit - 1)
                })
            }
            Phase::Ack => {
                if shift.reading {
                    self.set_sda(!shift.ack)?;
                } else {
                    self.sda.set_high().map_err(Error::Pin)?;
                }
                self.half_delay();
                self.release_scl()?;
                if !shift.reading {
                    shift.ack = self.sda.is_low().map_err(Error::Pin)?;
                }
                self.half_delay();
                self.scl.set_low().map_err(Error::Pin)?;
                self.sda.set_high().map_err(Error::Pin)?;
                Ok(Phase::Idle)
            }
            Phase::Stop => {
                self.sda.set_low().map_err(Error::Pin)?;
                self.half_delay();
                self.release_scl()?;
                self.half_delay();
                self.sda.set_high().map_err(Error::Pin)?;
                self.half_delay();
                Ok(Phase::Idle)
            }
        }
    }

    fn run_byte(&mut self, mut shift: Shift) -> Result<Shift, Error<E>> {
        let mut phase = Phase::Data(7);
        while phase != Phase::Idle {
            phase = self.step(phase, &mut shift)?;
        }
        Ok(shift)
    }

    fn write_byte(&mut self, byte: u8) -> Result<bool, Error<E>> {
        self.run_byte(Shift::write(byte)).map(|s| s.ack)
    }

    fn read_byte(&mut self, ack: bool) -> Result<u8, Error<E>> {
        self.run_byte(Shift::read(ack)).map(|s| s.byte)
    }

    fn start(&mut self) -> Result<(), Error<E>> {
        self.step(Phase::Start, &mut Shift::write(0)).map(|_| ())
    }

    fn stop(&mut self) -> Result<(), Error<E>> {
        self.step(Phase::Stop, &mut Shift::write(0)).map(|_| ())
    }

    fn write_frame(&mut self, address: u8, bytes: &[u8]) -> Result<(), Error<E>> {
        if !self.write_byte(address << 1)? {
            return Err(Error::AddressNack);
        }
        for byte in bytes {
            if !self.write_byte(*byte)? {
                return Err(Error::DataNack);
            }
        }
        Ok(())
    }

    fn read_frame(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Error<E>> {
        if !self.write_byte((address << 1) | 1)? {
            return Err(Error::AddressNack);
        }
        let last = buffer.len().saturating_sub(1);
        for (i, slot) in buffer.iter_mut().enumerate() {
            *slot = self.read_byte(i != last)?;
        }
        Ok(())
    }

    /// Run `body` between a start and a stop condition. The stop is attempted even if the start
    /// or `body` fails, unless the bus was never taken; the first error is returned.
    fn framed<F>(&mut self, body: F) -> Result<(), Error<E>>
    where
        F: FnOnce(&mut Self) -> Result<(), Error<E>>,
    {
        if let Err(e) = self.start() {
            // SDA may already be driven low.
            if !matches!(e, Error::BusBusy) {
                let _ = self.stop();
            }
            return Err(e);
        }
        let result = body(self);
        let stopped = self.stop();
        result.and(stopped)
    }
}

impl<SCL, SDA, D, E> Write for SoftI2c<SCL, SDA, D>
where
    SCL: OutputPin<Error = E> + InputPin<Error = E>,
    SDA: OutputPin<Error = E> + InputPin<Error = E>,
    D: DelayUs<u32>,
{
    type Error = Error<E>;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        self.framed(|bus| bus.write_frame(address, bytes))
    }
}

impl<SCL, SDA, D, E> Read for SoftI2c<SCL, SDA, D>
where
    SCL: OutputPin<Error = E> + InputPin<Error = E>,
    SDA: OutputPin<Error = E> + InputPin<Error = E>,
    D: DelayUs<u32>,
{
    type Error = Error<E>;

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.framed(|bus| bus.read_frame(address, buffer))
    }
}

impl<SCL, SDA, D, E> WriteRead for SoftI2c<SCL, SDA, D>
where
    SCL: OutputPin<Error = E> + InputPin<Error = E>,
    SDA: OutputPin<Error = E> + InputPin<Error = E>,
    D: DelayUs<u32>,
{
    type Error = Error<E>;

    fn write_read(
        &mut self,
        address: u8,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.framed(|bus| {
            bus.write_frame(address, bytes)?;
            bus.start()?;
            bus.read_frame(address, buffer)
        })
    }
}
