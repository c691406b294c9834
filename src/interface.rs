//! This module provides shims between `embedded-hal` buses and the register maps of the Click
//! devices. Every register-mapped driver in the crate talks to its chip through a
//! [`RegisterInterface`], so the same driver logic works over I2C and SPI.

/// A bus interface to a register-mapped device implements this trait, which provides the basic
/// operations for reading and writing runs of consecutive registers.
pub trait RegisterInterface {
    /// The type of error that register reads and writes may return.
    type Error;

    /// Write `data` into consecutive registers starting at `reg`.
    fn write_registers(&mut self, reg: u8, data: &[u8]) -> Result<(), Self::Error>;

    /// Fill `buf` from consecutive registers starting at `reg`.
    fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Write a single register.
    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), Self::Error> {
        self.write_registers(reg, &[value])
    }

    /// Read a single register.
    fn read_register(&mut self, reg: u8) -> Result<u8, Self::Error> {
        let mut buf = [0u8];
        self.read_registers(reg, &mut buf)?;
        Ok(buf[0])
    }

    /// Read `reg`, apply `f` to its value, and write the result back.
    fn modify_register<F>(&mut self, reg: u8, f: F) -> Result<(), Self::Error>
    where
        F: FnOnce(u8) -> u8,
    {
        let current = self.read_register(reg)?;
        self.write_register(reg, f(current))
    }
}

// This is here (and has to be pub) for doctests only. It's useless otherwise.
#[doc(hidden)]
pub mod noop {
    use super::RegisterInterface;
    pub struct NoopInterface;
    impl RegisterInterface for NoopInterface {
        type Error = core::convert::Infallible;
        fn write_registers(&mut self, _reg: u8, _data: &[u8]) -> Result<(), Self::Error> {
            Ok(())
        }
        fn read_registers(&mut self, _reg: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
            buf.iter_mut().for_each(|b| *b = 0);
            Ok(())
        }
    }
}

pub mod i2c {
    //! The I2C interface addresses a device by its 7-bit slave address. A register write is a
    //! single bus write of `[reg, data...]`; a register read writes `reg` and reads the reply
    //! after a repeated start.

    use hal::blocking::i2c::{Write, WriteRead};

    use super::RegisterInterface;

    /// The longest register burst that can be written in one transaction. The register address
    /// and the data are staged in a stack buffer, so this bounds its size.
    pub const MAX_WRITE_BURST: usize = 32;

    /// The union of all errors that may occur on the I2C interface.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub enum I2cInterfaceError<WE, RE> {
        /// An error occurred during a bus write.
        WriteError(WE),
        /// An error occurred during a write-then-read.
        WriteReadError(RE),
        /// The requested write burst is longer than [`MAX_WRITE_BURST`].
        Overflow,
    }

    /// A configured `RegisterInterface` for a device on an I2C bus.
    #[derive(Debug)]
    pub struct I2cInterface<I2C> {
        i2c: I2C,
        address: u8,
    }

    impl<I2C> I2cInterface<I2C> {
        /// Create a new I2C interface talking to the device at the 7-bit `address`.
        pub fn new(i2c: I2C, address: u8) -> Self {
            Self { i2c, address }
        }

        /// The 7-bit slave address in use.
        pub fn address(&self) -> u8 {
            self.address
        }

        /// Change the 7-bit slave address, e.g. after reprogramming it on the device.
        pub fn set_address(&mut self, address: u8) {
            self.address = address;
        }

        /// Give back the I2C bus.
        pub fn release(self) -> I2C {
            self.i2c
        }
    }

    impl<I2C> RegisterInterface for I2cInterface<I2C>
    where
        I2C: Write + WriteRead,
    {
        type Error = I2cInterfaceError<<I2C as Write>::Error, <I2C as WriteRead>::Error>;

        fn write_registers(&mut self, reg: u8, data: &[u8]) -> Result<(), Self::Error> {
            if data.is_empty() {
                return Ok(());
            }
            if data.len() > MAX_WRITE_BURST {
                return Err(I2cInterfaceError::Overflow);
            }
            let mut buf = [0u8; MAX_WRITE_BURST + 1];
            buf[0] = reg;
            buf[1..=data.len()].copy_from_slice(data);
            self.i2c
                .write(self.address, &buf[..=data.len()])
                .map_err(I2cInterfaceError::WriteError)
        }

        fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
            if buf.is_empty() {
                return Ok(());
            }
            self.i2c
                .write_read(self.address, &[reg], buf)
                .map_err(I2cInterfaceError::WriteReadError)
        }
    }
}

pub mod spi {
    //! The SPI interface controls a device via a 4-wire interface (SCK, MOSI, MISO, CS). The
    //! first byte of every transaction is the register address with a read or write flag
    //! folded in; which bit carries the flag varies per chip and is described by [`SpiConfig`].

    use hal::blocking::spi::{Transfer, Write};
    use hal::digital::v2::OutputPin;

    use super::RegisterInterface;

    /// The union of all errors that may occur on the SPI interface. This primarily consists of
    /// variants for each of the error types for the chip select GPIO, SPI write, and SPI transfer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub enum SpiInterfaceError<CSE, WE, TE> {
        /// The chip select GPIO threw an error.
        CSError(CSE),
        /// An error occurred during SPI write.
        WriteError(WE),
        /// An error occurred during SPI transfer.
        TransferError(TE),
    }

    impl<CSE, WE, TE> SpiInterfaceError<CSE, WE, TE> {
        fn from_cs(e: CSE) -> Self {
            Self::CSError(e)
        }
        fn from_write(e: WE) -> Self {
            Self::WriteError(e)
        }
        fn from_transfer(e: TE) -> Self {
            Self::TransferError(e)
        }
    }

    /// How register addresses are encoded in the command byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct SpiConfig {
        pub(crate) read_mask: u8,
        pub(crate) write_mask: u8,
        pub(crate) dummy_bytes: u8,
    }

    impl SpiConfig {
        /// The common convention: MSB set for reads, cleared for writes, no dummy cycles.
        pub const fn new() -> Self {
            Self {
                read_mask: 0x80,
                write_mask: 0x7F,
                dummy_bytes: 0,
            }
        }

        /// OR-ed into the register address for reads.
        #[must_use]
        pub const fn with_read_mask(mut self, mask: u8) -> Self {
            self.read_mask = mask;
            self
        }

        /// AND-ed with the register address for writes.
        #[must_use]
        pub const fn with_write_mask(mut self, mask: u8) -> Self {
            self.write_mask = mask;
            self
        }

        /// Number of bytes the device clocks out before the register data on reads.
        #[must_use]
        pub const fn with_dummy_bytes(mut self, count: u8) -> Self {
            self.dummy_bytes = count;
            self
        }
    }

    impl Default for SpiConfig {
        fn default() -> Self {
            Self::new()
        }
    }

    /// A configured `RegisterInterface` for a device on an SPI bus with its own chip select.
    #[derive(Debug)]
    pub struct SpiInterface<SPI, CS> {
        /// The SPI master device connected to the chip.
        spi: SPI,
        /// A GPIO output pin connected to the CS pin of the chip.
        cs: CS,
        config: SpiConfig,
    }

    impl<SPI, CS> SpiInterface<SPI, CS>
    where
        SPI: Write<u8> + Transfer<u8>,
        CS: OutputPin,
    {
        /// Create a new SPI interface. `spi` is the SPI master device, and `cs` is the GPIO
        /// output pin connected to the chip select of the device.
        pub fn new(spi: SPI, cs: CS, config: SpiConfig) -> Self {
            Self { spi, cs, config }
        }

        /// Give back the SPI bus and the chip select pin.
        pub fn release(self) -> (SPI, CS) {
            (self.spi, self.cs)
        }
    }

    /// The error type of SPI transactions on `SPI` framed by the chip select `CS`.
    pub type ErrorOf<SPI, CS> = SpiInterfaceError<
        <CS as OutputPin>::Error,
        <SPI as Write<u8>>::Error,
        <SPI as Transfer<u8>>::Error,
    >;

    /// A device on an SPI bus that does not follow the address-byte register convention:
    /// command frames, 16- or 32-bit words, read-only streams. Only the chip select framing is
    /// handled here; every method is one transaction with CS held low throughout.
    #[derive(Debug)]
    pub struct SpiDevice<SPI, CS> {
        spi: SPI,
        cs: CS,
    }

    impl<SPI, CS> SpiDevice<SPI, CS>
    where
        SPI: Write<u8> + Transfer<u8>,
        CS: OutputPin,
    {
        pub fn new(spi: SPI, cs: CS) -> Self {
            Self { spi, cs }
        }

        pub fn release(self) -> (SPI, CS) {
            (self.spi, self.cs)
        }

        fn framed<F>(&mut self, f: F) -> Result<(), ErrorOf<SPI, CS>>
        where
            F: FnOnce(&mut SPI) -> Result<(), ErrorOf<SPI, CS>>,
        {
            self.cs.set_low().map_err(ErrorOf::<SPI, CS>::from_cs)?;
            let result = f(&mut self.spi);
            let released = self.cs.set_high().map_err(ErrorOf::<SPI, CS>::from_cs);
            result.and(released)
        }

        /// Full-duplex exchange of `buf`.
        pub fn transfer(&mut self, buf: &mut [u8]) -> Result<(), ErrorOf<SPI, CS>> {
            self.framed(|spi| {
                spi.transfer(buf)
                    .map(|_| ())
                    .map_err(ErrorOf::<SPI, CS>::from_transfer)
            })
        }

        /// Send `cmd` followed by `data`.
        pub fn write(&mut self, cmd: &[u8], data: &[u8]) -> Result<(), ErrorOf<SPI, CS>> {
            self.framed(|spi| {
                spi.write(cmd)
                    .and_then(|_| spi.write(data))
                    .map_err(ErrorOf::<SPI, CS>::from_write)
            })
        }

        /// Send `cmd`, then clock in `buf` while sending zeros.
        pub fn write_read(&mut self, cmd: &[u8], buf: &mut [u8]) -> Result<(), ErrorOf<SPI, CS>> {
            self.framed(|spi| {
                spi.write(cmd).map_err(ErrorOf::<SPI, CS>::from_write)?;
                if buf.is_empty() {
                    return Ok(());
                }
                buf.iter_mut().for_each(|b| *b = 0);
                spi.transfer(buf)
                    .map(|_| ())
                    .map_err(ErrorOf::<SPI, CS>::from_transfer)
            })
        }
    }

    impl<SPI, CS> RegisterInterface for SpiInterface<SPI, CS>
    where
        SPI: Write<u8> + Transfer<u8>,
        CS: OutputPin,
    {
        type Error = ErrorOf<SPI, CS>;

        fn write_registers(&mut self, reg: u8, data: &[u8]) -> Result<(), Self::Error> {
            if data.is_empty() {
                return Ok(());
            }
            let cmd = [reg & self.config.write_mask];

            // Select chip and do bus write. CS is released whatever the outcome.
            self.cs.set_low().map_err(Self::Error::from_cs)?;
            let result = self
                .spi
                .write(&cmd)
                .and_then(|_| self.spi.write(data));
            let released = self.cs.set_high().map_err(Self::Error::from_cs);
            result.map_err(Self::Error::from_write).and(released)
        }

        fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
            if buf.is_empty() {
                return Ok(());
            }
            let cmd = [reg | self.config.read_mask];
            let dummy = [0u8; 4];
            let dummy_len = usize::from(self.config.dummy_bytes).min(dummy.len());

            self.cs.set_low().map_err(Self::Error::from_cs)?;
            let addr_result = self
                .spi
                .write(&cmd)
                .and_then(|_| self.spi.write(&dummy[..dummy_len]));
            let data_result = match addr_result {
                Ok(()) => {
                    buf.iter_mut().for_each(|b| *b = 0);
                    Some(self.spi.transfer(buf).map(|_| ()))
                }
                Err(_) => None,
            };
            let released = self.cs.set_high().map_err(Self::Error::from_cs);
            addr_result.map_err(Self::Error::from_write)?;
            if let Some(r) = data_result {
                r.map_err(Self::Error::from_transfer)?;
            }
            released
        }
    }
}


#[cfg(test)]
mod tests {
    use super::i2c::{I2cInterface, I2cInterfaceError, MAX_WRITE_BURST};
    use super::spi::{SpiConfig, SpiDevice, SpiInterface};
    use super::test_spy::{TestRegister as TR, TestSpyInterface};
    use super::RegisterInterface;
    use proptest::prelude::*;
    use crate::testing::{PinEvent, RegisterFileI2c, SpiEvent, SpySpi};

    #[test]
    fn i2c_write_prefixes_register() {
        let dev = RegisterFileI2c::new(0x18);
        let mut iface = I2cInterface::new(dev.split(), 0x18);
        assert!(iface.write_registers(0x40, &[0xA8, 0x01]).is_ok());
        assert_eq!(dev.writes(), vec![vec![0x40, 0xA8, 0x01]]);
        assert_eq!(dev.peek(0x40), 0xA8);
        assert_eq!(dev.peek(0x41), 0x01);
    }

    #[test]
    fn i2c_read_uses_write_read() {
        let dev = RegisterFileI2c::new(0x18);
        dev.poke(0x12, 0x34);
        dev.poke(0x13, 0x12);
        let mut iface = I2cInterface::new(dev.split(), 0x18);
        let mut buf = [0u8; 2];
        assert!(iface.read_registers(0x12, &mut buf).is_ok());
        assert_eq!(buf, [0x34, 0x12]);
    }

    #[test]
    fn i2c_burst_too_long() {
        let dev = RegisterFileI2c::new(0x18);
        let mut iface = I2cInterface::new(dev.split(), 0x18);
        let data = [0u8; MAX_WRITE_BURST + 1];
        assert_eq!(
            iface.write_registers(0x00, &data),
            Err(I2cInterfaceError::Overflow)
        );
        assert!(dev.writes().is_empty());
    }

    #[test]
    fn empty_writes_stay_off_the_bus() {
        let dev = RegisterFileI2c::new(0x18);
        let mut iface = I2cInterface::new(dev.split(), 0x18);
        assert_eq!(iface.write_registers(0x40, &[]), Ok(()));
        assert!(dev.writes().is_empty());

        let spi = SpySpi::new();
        let mut iface = SpiInterface::new(spi.split(), spi.cs(), SpiConfig::new());
        assert_eq!(iface.write_registers(0x05, &[]), Ok(()));
        assert!(spi.events().is_empty());
    }

    #[test]
    fn i2c_wrong_address_is_error() {
        let dev = RegisterFileI2c::new(0x18);
        let mut iface = I2cInterface::new(dev.split(), 0x19);
        assert!(iface.read_register(0x00).is_err());
    }

    #[test]
    fn spi_write_frames_with_cs() {
        let spi = SpySpi::new();
        let mut iface = SpiInterface::new(spi.split(), spi.cs(), SpiConfig::new());
        assert!(iface.write_register(0x85, 0x11).is_ok());
        assert_eq!(
            spi.events(),
            vec![
                SpiEvent::Cs(PinEvent::Low),
                SpiEvent::Write(vec![0x05]),
                SpiEvent::Write(vec![0x11]),
                SpiEvent::Cs(PinEvent::High),
            ]
        );
    }

    #[test]
    fn spi_read_sets_flag_and_skips_dummy() {
        let spi = SpySpi::new();
        spi.queue_miso(&[0xAB]);
        let cfg = SpiConfig::new().with_dummy_bytes(1);
        let mut iface = SpiInterface::new(spi.split(), spi.cs(), cfg);
        assert_eq!(iface.read_register(0x00), Ok(0xAB));
        assert_eq!(
            spi.events(),
            vec![
                SpiEvent::Cs(PinEvent::Low),
                SpiEvent::Write(vec![0x80]),
                SpiEvent::Write(vec![0x00]),
                SpiEvent::Transfer(vec![0x00]),
                SpiEvent::Cs(PinEvent::High),
            ]
        );
    }

    #[test]
    fn spi_device_frames_each_call() {
        let spi = SpySpi::new();
        spi.queue_miso(&[0xEF, 0x14]);
        let mut dev = SpiDevice::new(spi.split(), spi.cs());
        let mut id = [0u8; 2];
        assert!(dev.write_read(&[0x90, 0, 0, 0], &mut id).is_ok());
        assert_eq!(id, [0xEF, 0x14]);
        assert!(dev.write(&[0x02, 0x00, 0x01, 0x00], &[0xAA]).is_ok());
        assert_eq!(
            spi.events(),
            vec![
                SpiEvent::Cs(PinEvent::Low),
                SpiEvent::Write(vec![0x90, 0, 0, 0]),
                SpiEvent::Transfer(vec![0x00, 0x00]),
                SpiEvent::Cs(PinEvent::High),
                SpiEvent::Cs(PinEvent::Low),
                SpiEvent::Write(vec![0x02, 0x00, 0x01, 0x00]),
                SpiEvent::Write(vec![0xAA]),
                SpiEvent::Cs(PinEvent::High),
            ]
        );
    }

    #[test]
    fn spy_modify_register() {
        let mut ei = TestSpyInterface::new();
        ei.set(0x10, TR::ResetValue(0b1010_0000));
        let mut iface = ei.split();
        assert!(iface.modify_register(0x10, |v| v | 0x01).is_ok());
        assert_eq!(ei.get(0x10), TR::WrittenValue(0b1010_0001));
        assert_eq!(ei.reads(), vec![0x10]);
    }

    proptest! {
        #[test]
        fn i2c_register_round_trip(
            reg in 0u8..=0xE0,
            data in proptest::collection::vec(any::<u8>(), 1..MAX_WRITE_BURST),
        ) {
            let dev = RegisterFileI2c::new(0x40);
            let mut iface = I2cInterface::new(dev.split(), 0x40);
            iface.write_registers(reg, &data).unwrap();
            let mut back = vec![0u8; data.len()];
            iface.read_registers(reg, &mut back).unwrap();
            prop_assert_eq!(back, data);
        }
    }
}
