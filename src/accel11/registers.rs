//! BMA456 register map.

pub const CHIP_ID: u8 = 0x00;
pub const ERR_REG: u8 = 0x02;
pub const STATUS: u8 = 0x03;
/// X LSB; X MSB, Y LSB, Y MSB, Z LSB, Z MSB follow.
pub const DATA_X_LSB: u8 = 0x12;
/// Three bytes, little-endian, 39.0625 µs per count.
pub const SENSOR_TIME_0: u8 = 0x18;
pub const TEMPERATURE: u8 = 0x22;
pub const ACC_CONF: u8 = 0x40;
pub const ACC_RANGE: u8 = 0x41;
pub const PWR_CONF: u8 = 0x7C;
pub const PWR_CTRL: u8 = 0x7D;
pub const CMD: u8 = 0x7E;

pub const CHIP_ID_VALUE: u8 = 0x16;

pub const CMD_SOFT_RESET: u8 = 0xB6;

pub mod status {
    pub const DRDY_ACC: u8 = 1 << 7;
    pub const CMD_RDY: u8 = 1 << 4;
}

pub mod pwr_conf {
    pub const ADV_POWER_SAVE: u8 = 1 << 0;
}

pub mod pwr_ctrl {
    pub const ACC_EN: u8 = 1 << 2;
}

pub mod err_reg {
    pub const FATAL: u8 = 1 << 0;
    pub const CMD: u8 = 1 << 1;
}

/// Temperature register value meaning "no valid reading".
pub const TEMPERATURE_INVALID: u8 = 0x80;
