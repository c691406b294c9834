//! Driver for the Flash 13 Click, an 8 Mbit SPI NOR flash.
//!
//! Commands are a single opcode, optionally followed by a 24-bit big-endian address. Program and
//! erase operations need a preceding write enable and leave the chip busy; every such method
//! polls the status register until the operation completes or its time budget runs out.

use hal::blocking::delay::DelayMs;
use hal::blocking::spi::{Transfer, Write};
use hal::digital::v2::OutputPin;

use crate::error::{poll, Error};
use crate::interface::spi::{ErrorOf, SpiDevice};

mod cmd {
    pub const WRITE_ENABLE: u8 = 0x06;
    pub const WRITE_DISABLE: u8 = 0x04;
    pub const READ_STATUS: u8 = 0x05;
    pub const READ_DATA: u8 = 0x03;
    pub const PAGE_PROGRAM: u8 = 0x02;
    pub const SECTOR_ERASE: u8 = 0x20;
    pub const BLOCK_ERASE_32K: u8 = 0x52;
    pub const BLOCK_ERASE_64K: u8 = 0xD8;
    pub const CHIP_ERASE: u8 = 0xC7;
    pub const POWER_DOWN: u8 = 0xB9;
    pub const RELEASE_POWER_DOWN: u8 = 0xAB;
    pub const MANUFACTURER_DEVICE_ID: u8 = 0x90;
    pub const JEDEC_ID: u8 = 0x9F;
    pub const ENABLE_RESET: u8 = 0x66;
    pub const RESET: u8 = 0x99;
}

pub mod status {
    /// Write in progress.
    pub const WIP: u8 = 1 << 0;
    /// Write enable latch.
    pub const WEL: u8 = 1 << 1;
}

pub const MANUFACTURER_ID: u8 = 0x68;
pub const DEVICE_ID: u8 = 0x14;

pub const CAPACITY: u32 = 0x10_0000;
pub const PAGE_SIZE: u32 = 256;
pub const SECTOR_SIZE: u32 = 4 * 1024;

// Status polls at 1 ms intervals, a margin above the datasheet maxima.
const PROGRAM_POLLS: u32 = 10;
const SECTOR_ERASE_POLLS: u32 = 500;
const BLOCK_32K_ERASE_POLLS: u32 = 2_000;
const BLOCK_64K_ERASE_POLLS: u32 = 3_000;
const CHIP_ERASE_POLLS: u32 = 30_000;
const WAKE_MS: u32 = 1;
const RESET_MS: u32 = 1;

fn command_with_address(op: u8, addr: u32) -> [u8; 4] {
    let [_, a2, a1, a0] = addr.to_be_bytes();
    [op, a2, a1, a0]
}

/// The flash chip.
pub struct Flash13<SPI, CS> {
    dev: SpiDevice<SPI, CS>,
}

impl<SPI, CS> Flash13<SPI, CS>
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

    fn command(&mut self, op: u8) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        self.dev.write(&[op], &[])?;
        Ok(())
    }

    /// Check the manufacturer and device id.
    pub fn check_communication(&mut self) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        let mut id = [0u8; 2];
        self.dev
            .write_read(&command_with_address(cmd::MANUFACTURER_DEVICE_ID, 0), &mut id)?;
        if id[0] != MANUFACTURER_ID {
            log::warn!("flash13: manufacturer {:#04x}", id[0]);
            return Err(Error::WrongDevice(id[0]));
        }
        if id[1] != DEVICE_ID {
            log::warn!("flash13: device {:#04x}", id[1]);
            return Err(Error::WrongDevice(id[1]));
        }
        Ok(())
    }

    /// Manufacturer, memory type and capacity bytes.
    pub fn read_jedec_id(&mut self) -> Result<[u8; 3], Error<ErrorOf<SPI, CS>>> {
        let mut id = [0u8; 3];
        self.dev.write_read(&[cmd::JEDEC_ID], &mut id)?;
        Ok(id)
    }

    pub fn read_status(&mut self) -> Result<u8, Error<ErrorOf<SPI, CS>>> {
        let mut s = [0u8];
        self.dev.write_read(&[cmd::READ_STATUS], &mut s)?;
        Ok(s[0])
    }

    pub fn write_enable(&mut self) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        self.command(cmd::WRITE_ENABLE)
    }

    pub fn write_disable(&mut self) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        self.command(cmd::WRITE_DISABLE)
    }

    /// Poll the busy flag every millisecond, at most `timeout_ms` times.
    pub fn wait_busy<D: DelayMs<u32>>(
        &mut self,
        delay: &mut D,
        timeout_ms: u32,
    ) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        let result = poll(
            timeout_ms,
            || Ok(self.read_status()? & status::WIP == 0),
            || delay.delay_ms(1),
        );
        if matches!(result, Err(Error::Timeout)) {
            log::warn!("flash13: still busy after {} ms", timeout_ms);
        }
        result
    }

    fn check_range(addr: u32, len: usize) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        let end = u32::try_from(len)
            .ok()
            .and_then(|len| addr.checked_add(len));
        match end {
            Some(end) if end <= CAPACITY => Ok(()),
            _ => Err(Error::InvalidArgument),
        }
    }

    /// Read `buf.len()` bytes starting at `addr`.
    pub fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        Self::check_range(addr, buf.len())?;
        self.dev
            .write_read(&command_with_address(cmd::READ_DATA, addr), buf)?;
        Ok(())
    }

    /// Program `data` at `addr`, one page at a time. The target must have been erased.
    pub fn program<D: DelayMs<u32>>(
        &mut self,
        addr: u32,
        data: &[u8],
        delay: &mut D,
    ) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        Self::check_range(addr, data.len())?;
        let mut addr = addr;
        let mut rest = data;
        while !rest.is_empty() {
            let room = (PAGE_SIZE - addr % PAGE_SIZE) as usize;
            let (chunk, tail) = rest.split_at(room.min(rest.len()));
            self.write_enable()?;
            self.dev
                .write(&command_with_address(cmd::PAGE_PROGRAM, addr), chunk)?;
            self.wait_busy(delay, PROGRAM_POLLS)?;
            addr += chunk.len() as u32;
            rest = tail;
        }
        Ok(())
    }

    fn erase<D: DelayMs<u32>>(
        &mut self,
        op: u8,
        addr: u32,
        polls: u32,
        delay: &mut D,
    ) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        if addr >= CAPACITY {
            return Err(Error::InvalidArgument);
        }
        self.write_enable()?;
        self.dev.write(&command_with_address(op, addr), &[])?;
        self.wait_busy(delay, polls)
    }

    /// Erase the 4 KiB sector containing `addr`.
    pub fn erase_sector<D: DelayMs<u32>>(
        &mut self,
        addr: u32,
        delay: &mut D,
    ) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        self.erase(cmd::SECTOR_ERASE, addr, SECTOR_ERASE_POLLS, delay)
    }

    /// Erase the 32 KiB block containing `addr`.
    pub fn erase_block_32k<D: DelayMs<u32>>(
        &mut self,
        addr: u32,
        delay: &mut D,
    ) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        self.erase(cmd::BLOCK_ERASE_32K, addr, BLOCK_32K_ERASE_POLLS, delay)
    }

    /// Erase the 64 KiB block containing `addr`.
    pub fn erase_block_64k<D: DelayMs<u32>>(
        &mut self,
        addr: u32,
        delay: &mut D,
    ) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        self.erase(cmd::BLOCK_ERASE_64K, addr, BLOCK_64K_ERASE_POLLS, delay)
    }

    pub fn erase_chip<D: DelayMs<u32>>(
        &mut self,
        delay: &mut D,
    ) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        self.write_enable()?;
        self.command(cmd::CHIP_ERASE)?;
        self.wait_busy(delay, CHIP_ERASE_POLLS)
    }

    /// Enter deep power down. Only [`release_power_down`](Self::release_power_down) is accepted
    /// afterwards.
    pub fn power_down(&mut self) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        self.command(cmd::POWER_DOWN)
    }

    pub fn release_power_down<D: DelayMs<u32>>(
        &mut self,
        delay: &mut D,
    ) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        self.command(cmd::RELEASE_POWER_DOWN)?;
        delay.delay_ms(WAKE_MS);
        Ok(())
    }

    pub fn software_reset<D: DelayMs<u32>>(
        &mut self,
        delay: &mut D,
    ) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        self.command(cmd::ENABLE_RESET)?;
        self.command(cmd::RESET)?;
        delay.delay_ms(RESET_MS);
        Ok(())
    }
}
