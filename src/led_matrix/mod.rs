//! Driver for the 8x8 LED matrix Clicks built on the MAX7219 display driver.
//!
//! Each SPI transaction is one 16-bit frame: the register address followed by its value.
//!
//! ```
//! # use click_drivers::led_matrix::LedMatrix;
//! # struct Spi;
//! # impl embedded_hal::blocking::spi::Write<u8> for Spi {
//! #     type Error = ();
//! #     fn write(&mut self, _: &[u8]) -> Result<(), ()> { Ok(()) }
//! # }
//! # impl embedded_hal::blocking::spi::Transfer<u8> for Spi {
//! #     type Error = ();
//! #     fn transfer<'w>(&mut self, w: &'w mut [u8]) -> Result<&'w [u8], ()> { Ok(w) }
//! # }
//! # struct Cs;
//! # impl embedded_hal::digital::v2::OutputPin for Cs {
//! #     type Error = ();
//! #     fn set_low(&mut self) -> Result<(), ()> { Ok(()) }
//! #     fn set_high(&mut self) -> Result<(), ()> { Ok(()) }
//! # }
//! let mut matrix = LedMatrix::new(Spi, Cs);
//! matrix.init().unwrap();
//! matrix.draw_char('A').unwrap();
//! ```

pub mod font;
pub mod registers;

use hal::blocking::spi::{Transfer, Write};
use hal::digital::v2::OutputPin;

use self::registers::{Register, RegisterAddress};
use crate::error::Error;
use crate::interface::spi::{ErrorOf, SpiDevice};

pub const MAX_INTENSITY: u8 = 15;
const DEFAULT_INTENSITY: u8 = 7;
const ALL_DIGITS: u8 = 7;

/// A MAX7219 driving an 8x8 matrix.
pub struct LedMatrix<SPI, CS> {
    dev: SpiDevice<SPI, CS>,
}

impl<SPI, CS> LedMatrix<SPI, CS>
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

    /// Write one register.
    pub fn write_register(
        &mut self,
        reg: Register,
        value: u8,
    ) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        let addr: u8 = RegisterAddress::from(reg).into();
        self.dev.write(&[addr, value], &[])?;
        Ok(())
    }

    /// Test mode off, raw segment data, all eight rows scanned, medium brightness, blank, and
    /// out of shutdown.
    pub fn init(&mut self) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        self.display_test(false)?;
        self.write_register(Register::DecodeMode, 0x00)?;
        self.write_register(Register::ScanLimit, ALL_DIGITS)?;
        self.set_intensity(DEFAULT_INTENSITY)?;
        self.clear()?;
        self.shutdown(false)
    }

    /// Brightness from 0 to [`MAX_INTENSITY`].
    pub fn set_intensity(&mut self, level: u8) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        if level > MAX_INTENSITY {
            return Err(Error::InvalidArgument);
        }
        self.write_register(Register::Intensity, level)
    }

    /// Blank the display (`true`) or resume normal operation. Row data is retained.
    pub fn shutdown(&mut self, enable: bool) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        self.write_register(Register::Shutdown, if enable { 0x00 } else { 0x01 })
    }

    /// Light every LED at full brightness while enabled.
    pub fn display_test(&mut self, enable: bool) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        self.write_register(Register::DisplayTest, u8::from(enable))
    }

    /// Set the LEDs of one row, bit 7 the leftmost. Panics if `row` is not in 0-7.
    pub fn set_row(&mut self, row: u8, bits: u8) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        self.write_register(Register::Digit(row), bits)
    }

    pub fn clear(&mut self) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        self.draw(&[0; 8])
    }

    /// Show eight rows, top first.
    pub fn draw(&mut self, rows: &[u8; 8]) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        for (row, bits) in (0u8..).zip(rows.iter()) {
            self.set_row(row, *bits)?;
        }
        Ok(())
    }

    /// Show a printable ASCII character from the built-in font.
    pub fn draw_char(&mut self, c: char) -> Result<(), Error<ErrorOf<SPI, CS>>> {
        let glyph = font::glyph(c).ok_or(Error::InvalidArgument)?;
        self.draw(&font::rows(glyph))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CsPin, PinEvent, SpiEvent, SpySpi};

    fn matrix(spi: &SpySpi) -> LedMatrix<SpySpi, CsPin> {
        LedMatrix::new(spi.split(), spi.cs())
    }

    fn frames(spi: &SpySpi) -> Vec<[u8; 2]> {
        spi.mosi().chunks(2).map(|c| [c[0], c[1]]).collect()
    }

    #[test]
    fn frame_is_one_chip_select_cycle() {
        let spi = SpySpi::new();
        let mut m = matrix(&spi);
        m.write_register(Register::Intensity, 3).unwrap();
        assert_eq!(
            spi.events(),
            vec![
                SpiEvent::Cs(PinEvent::Low),
                SpiEvent::Write(vec![0x0A, 0x03]),
                SpiEvent::Cs(PinEvent::High),
            ]
        );
    }

    #[test]
    fn init_sequence() {
        let spi = SpySpi::new();
        let mut m = matrix(&spi);
        m.init().unwrap();
        let mut expected = vec![[0x0F, 0x00], [0x09, 0x00], [0x0B, 0x07], [0x0A, 0x07]];
        expected.extend((1..=8).map(|d| [d, 0x00]));
        expected.push([0x0C, 0x01]);
        assert_eq!(frames(&spi), expected);
    }

    #[test]
    fn intensity_out_of_range() {
        let spi = SpySpi::new();
        let mut m = matrix(&spi);
        assert_eq!(m.set_intensity(16), Err(Error::InvalidArgument));
        assert!(spi.events().is_empty());
    }

    #[test]
    #[should_panic]
    fn row_out_of_range_panics() {
        let spi = SpySpi::new();
        let _ = matrix(&spi).set_row(8, 0xFF);
    }

    #[test]
    fn draw_char_uses_font() {
        let spi = SpySpi::new();
        let mut m = matrix(&spi);
        m.draw_char('I').unwrap();
        let f = frames(&spi);
        assert_eq!(f.len(), 8);
        assert_eq!(f[0], [0x01, 0b0011_1000]);
        assert_eq!(f[7], [0x08, 0x00]);
    }

    #[test]
    fn draw_char_rejects_non_ascii() {
        let spi = SpySpi::new();
        let mut m = matrix(&spi);
        assert_eq!(m.draw_char('\n'), Err(Error::InvalidArgument));
    }
}
