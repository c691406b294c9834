//! Sharing one physical bus between several Click drivers.
//!
//! A mikroBUS socket exposes a single I2C and a single SPI bus, and boards with several sockets
//! usually route all of them to the same peripheral. Every driver in this crate takes its bus by
//! value, so to put two Click boards on one bus, hand each driver a [`BusProxy`] obtained from a
//! [`BusManager`] instead of the bus itself. Each proxy call locks the bus for exactly one
//! `embedded-hal` transaction.
//!
//! ```
//! # use click_drivers::{bus::BusManager, DefaultMutex};
//! # struct FakeI2c;
//! # impl embedded_hal::blocking::i2c::Write for FakeI2c {
//! #     type Error = ();
//! #     fn write(&mut self, _: u8, _: &[u8]) -> Result<(), ()> { Ok(()) }
//! # }
//! # impl embedded_hal::blocking::i2c::WriteRead for FakeI2c {
//! #     type Error = ();
//! #     fn write_read(&mut self, _: u8, _: &[u8], b: &mut [u8]) -> Result<(), ()> {
//! #         b.fill(0x6A);
//! #         Ok(())
//! #     }
//! # }
//! let manager: BusManager<DefaultMutex<_>, _> = BusManager::new(FakeI2c);
//! let imu = click_drivers::imu6dof::Imu6Dof::new(manager.acquire(), Default::default());
//! let leds = click_drivers::led_driver::LedDriver::new(manager.acquire(), 0x40);
//! # drop((imu, leds));
//! ```

use core::marker::PhantomData;

use hal::blocking::{i2c, spi};

use crate::mutex::IOMutex;

/// Owns a bus behind an [`IOMutex`] and hands out proxies to it.
pub struct BusManager<M, BUS> {
    mutex: M,
    _bus: PhantomData<BUS>,
}

impl<M, BUS> BusManager<M, BUS>
where
    M: IOMutex<BUS>,
{
    /// Take ownership of `bus`.
    pub fn new(bus: BUS) -> Self {
        Self {
            mutex: M::new(bus),
            _bus: PhantomData,
        }
    }

    /// Create a new proxy to the bus. Any number of proxies may exist at once.
    pub fn acquire(&self) -> BusProxy<'_, M, BUS> {
        BusProxy {
            mutex: &self.mutex,
            _bus: PhantomData,
        }
    }
}

/// A handle to a shared bus implementing the same blocking traits as the bus itself.
pub struct BusProxy<'a, M, BUS> {
    mutex: &'a M,
    _bus: PhantomData<BUS>,
}

impl<'a, M, BUS> i2c::Write for BusProxy<'a, M, BUS>
where
    M: IOMutex<BUS>,
    BUS: i2c::Write,
{
    type Error = BUS::Error;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        self.mutex.lock(|bus| bus.write(address, bytes))
    }
}

impl<'a, M, BUS> i2c::Read for BusProxy<'a, M, BUS>
where
    M: IOMutex<BUS>,
    BUS: i2c::Read,
{
    type Error = BUS::Error;

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.mutex.lock(|bus| bus.read(address, buffer))
    }
}

impl<'a, M, BUS> i2c::WriteRead for BusProxy<'a, M, BUS>
where
    M: IOMutex<BUS>,
    BUS: i2c::WriteRead,
{
    type Error = BUS::Error;

    fn write_read(
        &mut self,
        address: u8,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.mutex.lock(|bus| bus.write_read(address, bytes, buffer))
    }
}

impl<'a, M, BUS> spi::Write<u8> for BusProxy<'a, M, BUS>
where
    M: IOMutex<BUS>,
    BUS: spi::Write<u8>,
{
    type Error = BUS::Error;

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        self.mutex.lock(|bus| bus.write(words))
    }
}

impl<'a, M, BUS> spi::Transfer<u8> for BusProxy<'a, M, BUS>
where
    M: IOMutex<BUS>,
    BUS: spi::Transfer<u8>,
{
    type Error = BUS::Error;

    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], Self::Error> {
        self.mutex
            .lock(|bus| bus.transfer(&mut *words).map(|_| ()))?;
        Ok(words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::i2c::I2cInterface;
    use crate::interface::RegisterInterface;
    use crate::mutex::DefaultMutex;
    use crate::testing::RegisterFileI2c;

    #[test]
    fn proxies_share_one_bus() {
        let dev = RegisterFileI2c::new(0x40);
        let manager: BusManager<DefaultMutex<_>, _> = BusManager::new(dev.split());
        let mut a = I2cInterface::new(manager.acquire(), 0x40);
        let mut b = I2cInterface::new(manager.acquire(), 0x40);

        assert!(a.write_register(0x10, 0x55).is_ok());
        assert_eq!(b.read_register(0x10), Ok(0x55));
        assert_eq!(dev.writes(), vec![vec![0x10, 0x55]]);
    }

    #[test]
    fn proxy_passes_errors_through() {
        let dev = RegisterFileI2c::new(0x40);
        let manager: BusManager<DefaultMutex<_>, _> = BusManager::new(dev.split());
        let mut wrong = I2cInterface::new(manager.acquire(), 0x41);
        assert!(wrong.read_register(0x00).is_err());
    }
}
