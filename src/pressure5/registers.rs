//! BMP388 register map.

pub const CHIP_ID: u8 = 0x00;
pub const ERR_REG: u8 = 0x02;
pub const STATUS: u8 = 0x03;
/// Pressure XLSB; LSB, MSB, then temperature XLSB, LSB, MSB follow.
pub const DATA_0: u8 = 0x04;
pub const PWR_CTRL: u8 = 0x1B;
pub const OSR: u8 = 0x1C;
pub const ODR: u8 = 0x1D;
pub const CONFIG: u8 = 0x1F;
/// First of the 21 trimming coefficient bytes.
pub const CALIB_DATA: u8 = 0x31;
pub const CMD: u8 = 0x7E;

pub const CHIP_ID_VALUE: u8 = 0x50;
pub const CALIB_LEN: usize = 21;

pub const CMD_SOFT_RESET: u8 = 0xB6;

pub mod status {
    pub const CMD_RDY: u8 = 1 << 4;
    pub const DRDY_PRESS: u8 = 1 << 5;
    pub const DRDY_TEMP: u8 = 1 << 6;
}

pub mod pwr_ctrl {
    pub const PRESS_EN: u8 = 1 << 0;
    pub const TEMP_EN: u8 = 1 << 1;
    pub const MODE_SHIFT: u8 = 4;
    pub const MODE_MASK: u8 = 0b11 << MODE_SHIFT;
}

pub mod err_reg {
    pub const FATAL: u8 = 1 << 0;
    pub const CMD: u8 = 1 << 1;
    pub const CONF: u8 = 1 << 2;
}
