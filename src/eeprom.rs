//! Driver for the 24-series I2C EEPROMs on the EEPROM Clicks.
//!
//! The memory is addressed with a big-endian 16-bit word address. Writes may not cross a page
//! boundary, so longer writes are split; after each page the chip goes through an internal
//! write cycle during which it NACKs its address. The driver polls for the ACK before moving on.

use core::convert::Infallible;

use hal::blocking::delay::DelayMs;
use hal::blocking::i2c::{Write, WriteRead};
use hal::digital::v2::OutputPin;

use crate::error::{poll, Error};

/// Base address with A2..A0 tied low.
pub const BASE_ADDRESS: u8 = 0x50;

const WRITE_CYCLE_POLLS: u32 = 10;
const WRITE_CYCLE_POLL_MS: u32 = 1;
const MAX_PAGE_SIZE: usize = 256;
/// Bytes reachable through the 16-bit word address.
const WORD_SPACE: u32 = 0x1_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// 7-bit slave address.
    pub address: u8,
    /// Size of the memory in bytes.
    pub capacity: u32,
    /// Write page size in bytes, a power of two up to 256.
    pub page_size: u16,
}

impl Config {
    /// A 256 Kbit part (32 KiB, 64-byte pages) at the base address.
    pub const fn new() -> Self {
        Self {
            address: BASE_ADDRESS,
            capacity: 32 * 1024,
            page_size: 64,
        }
    }

    /// Select the address from the A2..A0 straps.
    pub const fn with_address_pins(mut self, pins: u8) -> Self {
        self.address = BASE_ADDRESS | (pins & 0x07);
        self
    }

    /// Set the memory size. Only the first 64 KiB are reachable with a 16-bit word address;
    /// accesses beyond that are rejected.
    pub const fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    pub const fn with_page_size(mut self, page_size: u16) -> Self {
        self.page_size = page_size;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors from the bus or from the write-protect pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EepromError<IE, PE> {
    I2c(IE),
    WriteProtect(PE),
}

/// Stands in for the write-protect pin when it is strapped low on the board.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWriteProtect;

impl OutputPin for NoWriteProtect {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

pub type ErrorOf<I2C, WP> = Error<EepromError<<I2C as Write>::Error, <WP as OutputPin>::Error>>;

pub struct Eeprom<I2C, WP = NoWriteProtect> {
    i2c: I2C,
    wp: WP,
    config: Config,
}

impl<I2C, E> Eeprom<I2C, NoWriteProtect>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
{
    pub fn new(i2c: I2C, config: Config) -> Self {
        Self {
            i2c,
            wp: NoWriteProtect,
            config,
        }
    }
}

impl<I2C, WP, E> Eeprom<I2C, WP>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
    WP: OutputPin,
{
    /// Use `wp` as the write-protect pin. It is driven high now and only released low while a
    /// write is in progress.
    pub fn with_write_protect(
        i2c: I2C,
        mut wp: WP,
        config: Config,
    ) -> Result<Self, ErrorOf<I2C, WP>> {
        wp.set_high()
            .map_err(|e| Error::Bus(EepromError::WriteProtect(e)))?;
        Ok(Self { i2c, wp, config })
    }

    pub fn release(self) -> (I2C, WP) {
        (self.i2c, self.wp)
    }

    pub fn config(&self) -> Config {
        self.config
    }

    fn check_range(&self, addr: u32, len: usize) -> Result<(), ErrorOf<I2C, WP>> {
        let end = u32::try_from(len)
            .ok()
            .and_then(|len| addr.checked_add(len));
        match end {
            Some(end) if end <= self.config.capacity.min(WORD_SPACE) => Ok(()),
            _ => Err(Error::InvalidArgument),
        }
    }

    /// Sequential read of `buf.len()` bytes from `addr`.
    pub fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), ErrorOf<I2C, WP>> {
        self.check_range(addr, buf.len())?;
        if buf.is_empty() {
            return Ok(());
        }
        let word = (addr as u16).to_be_bytes();
        self.i2c
            .write_read(self.config.address, &word, buf)
            .map_err(|e| Error::Bus(EepromError::I2c(e)))
    }

    /// Write `data` at `addr`, page by page, waiting out each write cycle.
    pub fn write<D: DelayMs<u32>>(
        &mut self,
        addr: u32,
        data: &[u8],
        delay: &mut D,
    ) -> Result<(), ErrorOf<I2C, WP>> {
        self.check_range(addr, data.len())?;
        let page = usize::from(self.config.page_size);
        if page == 0 || page > MAX_PAGE_SIZE {
            return Err(Error::InvalidArgument);
        }

        self.wp
            .set_low()
            .map_err(|e| Error::Bus(EepromError::WriteProtect(e)))?;
        let result = self.write_pages(addr, data, page, delay);
        let protected = self
            .wp
            .set_high()
            .map_err(|e| Error::Bus(EepromError::WriteProtect(e)));
        result.and(protected)
    }

    fn write_pages<D: DelayMs<u32>>(
        &mut self,
        mut addr: u32,
        data: &[u8],
        page: usize,
        delay: &mut D,
    ) -> Result<(), ErrorOf<I2C, WP>> {
        let mut buf = [0u8; MAX_PAGE_SIZE + 2];
        let mut rest = data;
        while !rest.is_empty() {
            let room = page - addr as usize % page;
            let (chunk, tail) = rest.split_at(room.min(rest.len()));
            let word = (addr as u16).to_be_bytes();
            buf[..2].copy_from_slice(&word);
            buf[2..2 + chunk.len()].copy_from_slice(chunk);
            self.i2c
                .write(self.config.address, &buf[..2 + chunk.len()])
                .map_err(|e| Error::Bus(EepromError::I2c(e)))?;
            self.wait_write_cycle(word, delay)?;
            addr += chunk.len() as u32;
            rest = tail;
        }
        Ok(())
    }

    /// ACK polling: the address is NACKed until the write cycle ends. Any bus error counts as
    /// a NACK here.
    fn wait_write_cycle<D: DelayMs<u32>>(
        &mut self,
        word: [u8; 2],
        delay: &mut D,
    ) -> Result<(), ErrorOf<I2C, WP>> {
        let address = self.config.address;
        let i2c = &mut self.i2c;
        let result = poll(
            WRITE_CYCLE_POLLS,
            || Ok(i2c.write(address, &word).is_ok()),
            || delay.delay_ms(WRITE_CYCLE_POLL_MS),
        );
        if result.is_err() {
            log::warn!("eeprom: no ACK {} ms after a page write", WRITE_CYCLE_POLLS);
        }
        result
    }
}
