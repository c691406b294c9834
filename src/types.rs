//! Measurement types shared by the motion sensors.

/// A three-axis reading. Raw drivers return `Axes<i16>`, scaled readings `Axes<f32>`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Axes<T> {
    /// X axis.
    pub x: T,
    /// Y axis.
    pub y: T,
    /// Z axis.
    pub z: T,
}

impl<T> Axes<T> {
    /// Build a reading from its components.
    pub const fn new(x: T, y: T, z: T) -> Self {
        Self { x, y, z }
    }

    /// Apply `f` to every component.
    pub fn map<U, F: Fn(T) -> U>(self, f: F) -> Axes<U> {
        Axes {
            x: f(self.x),
            y: f(self.y),
            z: f(self.z),
        }
    }
}

impl Axes<i16> {
    /// Decode three consecutive little-endian `i16`s.
    pub fn from_le_bytes(b: &[u8; 6]) -> Self {
        Self {
            x: i16::from_le_bytes([b[0], b[1]]),
            y: i16::from_le_bytes([b[2], b[3]]),
            z: i16::from_le_bytes([b[4], b[5]]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_little_endian() {
        let axes = Axes::from_le_bytes(&[0x00, 0x40, 0xFF, 0xFF, 0x00, 0x80]);
        assert_eq!(axes, Axes::new(16384, -1, -32768));
    }

    #[test]
    fn map_scales() {
        let g = Axes::new(16384i16, -8192, 0).map(|v| f32::from(v) / 16384.0);
        assert_eq!(g, Axes::new(1.0, -0.5, 0.0));
    }
}
