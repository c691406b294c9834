//! Driver for the MAX31855 cold-junction compensated thermocouple converter on the Thermo Click.
//!
//! The chip has no registers and no MOSI line: lowering CS stops conversions and it then shifts
//! out a 32-bit word holding the last thermocouple temperature, the cold junction temperature
//! and the fault bits.

use hal::blocking::spi::{Transfer, Write};
use hal::digital::v2::OutputPin;

use crate::interface::spi::{ErrorOf, SpiDevice};

const FAULT: u32 = 1 << 16;
const SHORT_TO_VCC: u32 = 1 << 2;
const SHORT_TO_GND: u32 = 1 << 1;
const OPEN_CIRCUIT: u32 = 1 << 0;

/// °C per LSB of the thermocouple reading.
pub const THERMOCOUPLE_RESOLUTION: f32 = 0.25;
/// °C per LSB of the cold junction reading.
pub const INTERNAL_RESOLUTION: f32 = 0.0625;

/// Thermocouple fault flags. The thermocouple temperature is invalid while any is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Fault {
    pub open_circuit: bool,
    pub short_to_gnd: bool,
    pub short_to_vcc: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    Bus(E),
    /// The converter flagged a thermocouple fault.
    Fault(Fault),
}

impl<E> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::Bus(e)
    }
}

/// One decoded conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reading {
    /// Thermocouple (hot junction) temperature in °C.
    pub thermocouple: f32,
    /// Cold junction (die) temperature in °C.
    pub internal: f32,
    pub fault: Option<Fault>,
}

impl Reading {
    pub fn from_raw(raw: u32) -> Self {
        let thermocouple = (raw as i32 >> 18) as f32 * THERMOCOUPLE_RESOLUTION;
        let internal = ((raw << 16) as i32 >> 20) as f32 * INTERNAL_RESOLUTION;
        let fault = if raw & FAULT != 0 {
            Some(Fault {
                open_circuit: raw & OPEN_CIRCUIT != 0,
                short_to_gnd: raw & SHORT_TO_GND != 0,
                short_to_vcc: raw & SHORT_TO_VCC != 0,
            })
        } else {
            None
        };
        Self {
            thermocouple,
            internal,
            fault,
        }
    }
}

pub struct Thermo<SPI, CS> {
    dev: SpiDevice<SPI, CS>,
}

impl<SPI, CS> Thermo<SPI, CS>
where
    SPI: Write<u8> + Transfer<u8>,
    CS: OutputPin,
{
    pub fn new(spi: SPI, cs: CS) -> Self {
        Self {
            dev: SpiDevice::new(spi, cs),
        }
    }

    pub fn release(self) -> (SPI, CS) {
        self.dev.release()
    }

    pub fn read_raw(&mut self) -> Result<u32, Error<ErrorOf<SPI, CS>>> {
        let mut word = [0u8; 4];
        self.dev.transfer(&mut word)?;
        Ok(u32::from_be_bytes(word))
    }

    /// Read and decode a conversion. Faults are reported in the reading, not as an error.
    pub fn read(&mut self) -> Result<Reading, Error<ErrorOf<SPI, CS>>> {
        let reading = Reading::from_raw(self.read_raw()?);
        if let Some(fault) = reading.fault {
            log::warn!("max31855: {:?}", fault);
        }
        Ok(reading)
    }

    /// Thermocouple temperature in °C, failing if a fault is flagged.
    pub fn read_temperature(&mut self) -> Result<f32, Error<ErrorOf<SPI, CS>>> {
        let reading = self.read()?;
        match reading.fault {
            Some(fault) => Err(Error::Fault(fault)),
            None => Ok(reading.thermocouple),
        }
    }

    pub fn read_internal_temperature(&mut self) -> Result<f32, Error<ErrorOf<SPI, CS>>> {
        Ok(self.read()?.internal)
    }
}
