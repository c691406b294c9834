//! The register addresses within the MAX7219.

/// A register address within the MAX7219. These are created by conversion from `Register`. It is
/// a newtype around `u8` that prevents invalid addresses from being forged and shifted out to the
/// device.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct RegisterAddress(pub(crate) u8);

impl From<RegisterAddress> for u8 {
    /// Convert a `RegisterAddress` into a `u8` corresponding to the hardware address.
    fn from(addr: RegisterAddress) -> u8 {
        addr.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    /// The no-op register, used to pass data through to the next chip in a cascade.
    Noop,

    /// Digit register `Digit(d)` for `d` in 0-7. On the 8x8 matrix each digit drives one row,
    /// with the segment bits selecting the lit columns.
    Digit(u8),

    /// Per-digit enable of the BCD Code B font. The matrix uses no decoding.
    DecodeMode,

    /// Display brightness, 0-15.
    Intensity,

    /// Number of scanned digits minus one.
    ScanLimit,

    /// Bit 0 cleared shuts the display down; set resumes normal operation.
    Shutdown,

    /// Bit 0 set lights every LED regardless of the other registers.
    DisplayTest,
}

fn valid_digit(digit: u8) -> u8 {
    match digit {
        0..=7 => digit,
        _ => panic!("MAX7219 does not have digit {}", digit),
    }
}

impl From<Register> for RegisterAddress {
    /// Convert a `Register` into a `RegisterAddress`.
    fn from(reg: Register) -> RegisterAddress {
        use self::Register::*;
        match reg {
            Noop => RegisterAddress(0x00),
            Digit(d) => RegisterAddress(valid_digit(d) + 0x01),
            DecodeMode => RegisterAddress(0x09),
            Intensity => RegisterAddress(0x0A),
            ScanLimit => RegisterAddress(0x0B),
            Shutdown => RegisterAddress(0x0C),
            DisplayTest => RegisterAddress(0x0F),
        }
    }
}
