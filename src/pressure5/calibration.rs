//! Trimming coefficients and the floating-point compensation formulas of the BMP388.

const TWO_POW_8: f64 = 256.0;
const TWO_POW_14: f64 = 16384.0;
const TWO_POW_15: f64 = 32768.0;
const TWO_POW_20: f64 = 1_048_576.0;
const TWO_POW_29: f64 = 536_870_912.0;
const TWO_POW_30: f64 = 1_073_741_824.0;
const TWO_POW_32: f64 = 4_294_967_296.0;
const TWO_POW_37: f64 = 137_438_953_472.0;
const TWO_POW_48: f64 = 281_474_976_710_656.0;
const TWO_POW_65: f64 = 36_893_488_147_419_103_232.0;

/// The NVM coefficients, already scaled for the floating-point formulas.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Calibration {
    pub t1: f64,
    pub t2: f64,
    pub t3: f64,
    pub p1: f64,
    pub p2: f64,
    pub p3: f64,
    pub p4: f64,
    pub p5: f64,
    pub p6: f64,
    pub p7: f64,
    pub p8: f64,
    pub p9: f64,
    pub p10: f64,
    pub p11: f64,
}

fn u16_at(b: &[u8], i: usize) -> f64 {
    f64::from(u16::from_le_bytes([b[i], b[i + 1]]))
}

fn i16_at(b: &[u8], i: usize) -> f64 {
    f64::from(i16::from_le_bytes([b[i], b[i + 1]]))
}

fn i8_at(b: &[u8], i: usize) -> f64 {
    f64::from(b[i] as i8)
}

impl Calibration {
    /// Scale the raw coefficient block read from `CALIB_DATA`.
    pub fn from_nvm(b: &[u8; super::registers::CALIB_LEN]) -> Self {
        Self {
            t1: u16_at(b, 0) * TWO_POW_8,
            t2: u16_at(b, 2) / TWO_POW_30,
            t3: i8_at(b, 4) / TWO_POW_48,
            p1: (i16_at(b, 5) - TWO_POW_14) / TWO_POW_20,
            p2: (i16_at(b, 7) - TWO_POW_14) / TWO_POW_29,
            p3: i8_at(b, 9) / TWO_POW_32,
            p4: i8_at(b, 10) / TWO_POW_37,
            p5: u16_at(b, 11) * 8.0,
            p6: u16_at(b, 13) / 64.0,
            p7: i8_at(b, 15) / TWO_POW_8,
            p8: i8_at(b, 16) / TWO_POW_15,
            p9: i16_at(b, 17) / TWO_POW_48,
            p10: i8_at(b, 19) / TWO_POW_48,
            p11: i8_at(b, 20) / TWO_POW_65,
        }
    }

    /// Linearised temperature in °C from the raw 24-bit temperature.
    pub fn compensate_temperature(&self, raw: u32) -> f64 {
        let d1 = f64::from(raw) - self.t1;
        let d2 = d1 * self.t2;
        d2 + d1 * d1 * self.t3
    }

    /// Pressure in Pa from the raw 24-bit pressure and the compensated temperature.
    pub fn compensate_pressure(&self, raw: u32, t_lin: f64) -> f64 {
        let up = f64::from(raw);
        let t2 = t_lin * t_lin;
        let t3 = t2 * t_lin;

        let offset = self.p5 + self.p6 * t_lin + self.p7 * t2 + self.p8 * t3;
        let sensitivity = up * (self.p1 + self.p2 * t_lin + self.p3 * t2 + self.p4 * t3);
        let up2 = up * up;
        let quadratic = up2 * (self.p9 + self.p10 * t_lin) + up2 * up * self.p11;

        offset + sensitivity + quadratic
    }
}
