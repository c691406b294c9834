//! Checksums used by the framed protocols in this crate.

use crc::{Crc, CRC_16_IBM_SDLC, CRC_8_SAE_J1850};

const J1850: Crc<u8> = Crc::<u8>::new(&CRC_8_SAE_J1850);
// CRC-16/IBM-SDLC is the catalog name of CRC-16/X.25.
const X25: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);

/// CRC-8 with polynomial 0x1D, initial value 0xFF and final inversion (SAE J1850), MSB first.
/// Murata's SCL3300 protects every 32-bit SPI frame with it, computed over the first three
/// bytes.
pub fn crc8_sae_j1850(data: &[u8]) -> u8 {
    J1850.checksum(data)
}

/// CRC-16/X.25: reflected polynomial 0x1021, initial value 0xFFFF, final XOR 0xFFFF. Used by
/// the T=1 over I2C block protocol of the SE05x secure elements, transmitted LSB first.
pub fn crc16_x25(data: &[u8]) -> u16 {
    X25.checksum(data)
}
