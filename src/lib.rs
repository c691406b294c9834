//! Driver library for a family of MikroElektronika Click boards.
//!
//! Click boards are small add-on modules that plug into a mikroBUS socket, which carries an I2C
//! bus, an SPI bus, a UART and a handful of GPIOs. This crate provides drivers for:
//!
//! - sensors: [`accel11`] (BMA456), [`magneto6`] (TLV493D), [`pressure5`] (BMP388),
//!   [`imu6dof`] (LSM6DSL), [`inclinometer`] (SCL3300) and [`thermo`] (MAX31855);
//! - memories: [`flash13`] (SPI NOR flash) and [`eeprom`] (24-series I2C EEPROM);
//! - output drivers: [`led_matrix`] (MAX7219), [`led_driver`] (PCA9685) and [`bldc_gate`]
//!   (DRV8323S gate driver);
//! - radios: [`xbee`] and [`rn4871`] (Bluetooth LE), both driven through the line-oriented
//!   command framer in [`at`];
//! - the [`se051`] secure element, spoken to with ISO 7816-4 APDUs over T=1-over-I2C.
//!
//! The drivers are intended to work on embedded platforms using any implementation of the
//! `embedded-hal` 0.2 trait library. Each driver takes ownership of the bus and pins it needs and
//! gives them back from `release`.
//!
//! # Construction
//!
//! Register-mapped chips are reached through a [`RegisterInterface`]. Drivers that only come in
//! one bus flavour construct their interface themselves; the Accel 11 Click can be jumpered for
//! either bus, so it has one constructor per bus:
//!
//! ```ignore
//! let i2c = /* something implementing embedded_hal::blocking::i2c::{Write, WriteRead} */
//! let mut accel = click_drivers::accel11::Accel11::new_i2c(i2c, Default::default());
//!
//! let spi = /* something implementing embedded_hal::blocking::spi::{Write, Transfer} */
//! let cs = /* something implementing embedded_hal::digital::v2::OutputPin */
//! let mut accel = click_drivers::accel11::Accel11::new_spi(spi, cs);
//! ```
//!
//! Any driver generic over the interface can also be built from a custom one:
//!
//! ```
//! # struct Delay;
//! # impl embedded_hal::blocking::delay::DelayMs<u32> for Delay {
//! #     fn delay_ms(&mut self, _: u32) {}
//! # }
//! # let iface = click_drivers::interface::noop::NoopInterface;
//! let mut accel = click_drivers::accel11::Accel11::new(iface);
//! // Nothing answers on the no-op interface, so the chip id does not match.
//! assert!(matches!(
//!     accel.init(&mut Delay),
//!     Err(click_drivers::Error::WrongDevice(0x00))
//! ));
//! ```
//!
//! # Device configuration
//!
//! *See [`accel11::Accel11::configure`] and [`accel11::Configurator`].*
//!
//! Chips with several configuration registers offer a builder that only writes the registers
//! whose fields were changed:
//!
//! ```
//! # fn main() -> Result<(), click_drivers::Error<core::convert::Infallible>> {
//! # use click_drivers::accel11::{Accel11, OutputDataRate, Range};
//! # let mut accel = Accel11::new(click_drivers::interface::noop::NoopInterface);
//! accel
//!     .configure()
//!     .range(Range::G8)
//!     .odr(OutputDataRate::Hz50)
//!     .enable(true)
//!     .commit()?;
//! assert_eq!(accel.range(), Range::G8);
//! # Ok(())
//! # }
//! ```
//!
//! # Errors
//!
//! Register-mapped drivers report [`Error`], which wraps the interface's own error in
//! [`Error::Bus`] and adds the device-level failures (wrong chip id, timeouts, bad data).
//! Drivers that also own a control pin wrap the bus and pin errors in a per-driver union, and the
//! command-protocol drivers ([`at`], [`se051`], [`thermo`]) have their own error enums. A
//! multi-step operation stops at the first failing transfer and returns that error.
//!
//! Every wait on the hardware is bounded: busy flags, ready bits and module answers are polled
//! a fixed number of times with the caller's delay in between, and give up with a timeout error.
//!
//! # Sharing a bus
//!
//! *See [`bus`].*
//!
//! Several Click boards on the same I2C or SPI bus can each be handed a proxy from a
//! [`bus::BusManager`], synchronized with any [`IOMutex`]. [`DefaultMutex`] is
//! `std::sync::Mutex` with the `std` feature, a critical-section mutex with `cortexm`, and a
//! plain `RefCell` otherwise.
//!
//! # Features
//!
//! - `std` (default): `std::sync::Mutex` as the default bus mutex.
//! - `unproven` (default): enables `embedded-hal`'s `unproven` traits, needed by the bit-banged
//!   I2C master in [`bitbang`].
//! - `cortexm`: `cortex_m::interrupt::Mutex` as the default bus mutex.
//! - `defmt`: `defmt::Format` for the public error and value types.
//!
//! Diagnostics go through the `log` facade at `debug` and `trace` level.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(test)]
extern crate proptest;

extern crate embedded_hal as hal;

pub mod at;
#[cfg(feature = "unproven")]
pub mod bitbang;
pub mod bus;
pub mod crc;
pub mod error;
pub mod interface;
pub mod mutex;
pub mod types;

pub mod accel11;
pub mod bldc_gate;
pub mod eeprom;
pub mod flash13;
pub mod imu6dof;
pub mod inclinometer;
pub mod led_driver;
pub mod led_matrix;
pub mod magneto6;
pub mod pressure5;
pub mod rn4871;
pub mod se051;
pub mod thermo;
pub mod xbee;

#[cfg(test)]
mod testing;

pub use error::Error;
pub use interface::i2c::I2cInterface;
pub use interface::spi::SpiInterface;
pub use interface::RegisterInterface;
pub use mutex::{DefaultMutex, IOMutex};
