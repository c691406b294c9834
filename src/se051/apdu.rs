//! ISO 7816-4 command APDUs and response status words.

/// Normal completion.
pub const SW_OK: u16 = 0x9000;

/// A command APDU borrowing its data field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Apdu<'a> {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: &'a [u8],
    /// Maximum expected response length. 256 (short) and 65536 (extended) are encoded as zero.
    pub le: Option<usize>,
}

impl<'a> Apdu<'a> {
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: &[],
            le: None,
        }
    }

    pub const fn with_data(mut self, data: &'a [u8]) -> Self {
        self.data = data;
        self
    }

    pub const fn with_le(mut self, le: usize) -> Self {
        self.le = Some(le);
        self
    }

    /// Whether the lengths need the three-byte extended encoding.
    pub fn is_extended(&self) -> bool {
        self.data.len() > 0xFF || self.le.map_or(false, |le| le > 0x100)
    }

    /// Serialize into `out`, returning the encoded length, or `None` if a length is out of
    /// range or `out` is too small.
    pub fn encode(&self, out: &mut [u8]) -> Option<usize> {
        if self.data.len() > 0xFFFF || self.le.map_or(false, |le| le > 0x1_0000) {
            return None;
        }
        let mut n = 0;
        let mut put = |bytes: &[u8]| -> Option<()> {
            out.get_mut(n..n + bytes.len())?.copy_from_slice(bytes);
            n += bytes.len();
            Some(())
        };
        put(&[self.cla, self.ins, self.p1, self.p2])?;
        if self.is_extended() {
            if !self.data.is_empty() {
                put(&[0x00])?;
                put(&(self.data.len() as u16).to_be_bytes())?;
                put(self.data)?;
            }
            if let Some(le) = self.le {
                if self.data.is_empty() {
                    put(&[0x00])?;
                }
                put(&(le as u16).to_be_bytes())?;
            }
        } else {
            if !self.data.is_empty() {
                put(&[self.data.len() as u8])?;
                put(self.data)?;
            }
            if let Some(le) = self.le {
                put(&[le as u8])?;
            }
        }
        Some(n)
    }
}

/// Split a response APDU into its data and status word.
pub fn split_response(resp: &[u8]) -> Option<(&[u8], u16)> {
    let split = resp.len().checked_sub(2)?;
    let (data, sw) = resp.split_at(split);
    Some((data, u16::from_be_bytes([sw[0], sw[1]])))
}
