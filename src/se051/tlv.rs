//! Tag-length-value coding of the IoT applet command and response fields.
//!
//! Tags are one byte. Lengths below 0x80 take one byte; longer values use `0x81 len` or
//! `0x82 len_hi len_lo`.

/// Object identifier, or the first argument of a command.
pub const TAG_1: u8 = 0x41;
pub const TAG_2: u8 = 0x42;
pub const TAG_3: u8 = 0x43;
pub const TAG_4: u8 = 0x44;

/// Encode `len` at the start of `out`, returning the number of bytes used.
pub fn encode_length(len: usize, out: &mut [u8]) -> Option<usize> {
    let (bytes, n): ([u8; 3], usize) = match len {
        0..=0x7F => ([len as u8, 0, 0], 1),
        0x80..=0xFF => ([0x81, len as u8, 0], 2),
        0x100..=0xFFFF => ([0x82, (len >> 8) as u8, len as u8], 3),
        _ => return None,
    };
    out.get_mut(..n)?.copy_from_slice(&bytes[..n]);
    Some(n)
}

/// Decode a length field, returning the length and the size of the field.
pub fn decode_length(buf: &[u8]) -> Option<(usize, usize)> {
    match *buf.first()? {
        first @ 0..=0x7F => Some((usize::from(first), 1)),
        0x81 => Some((usize::from(*buf.get(1)?), 2)),
        0x82 => {
            let hi = usize::from(*buf.get(1)?);
            let lo = usize::from(*buf.get(2)?);
            Some(((hi << 8) | lo, 3))
        }
        _ => None,
    }
}

/// Split the first TLV off `buf`: its tag, its value and everything after it.
pub fn parse(buf: &[u8]) -> Option<(u8, &[u8], &[u8])> {
    let (&tag, rest) = buf.split_first()?;
    let (len, n) = decode_length(rest)?;
    let rest = &rest[n..];
    if rest.len() < len {
        return None;
    }
    let (value, rest) = rest.split_at(len);
    Some((tag, value, rest))
}

/// The value of the first TLV tagged `tag`.
pub fn find(buf: &[u8], tag: u8) -> Option<&[u8]> {
    let mut rest = buf;
    while !rest.is_empty() {
        let (t, value, tail) = parse(rest)?;
        if t == tag {
            return Some(value);
        }
        rest = tail;
    }
    None
}

/// Appends TLVs to a caller-provided buffer.
pub struct Writer<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> Writer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, len: 0 }
    }

    /// Append one TLV. Returns `None` and leaves the buffer unchanged if it does not fit.
    pub fn push(&mut self, tag: u8, value: &[u8]) -> Option<()> {
        let mut header = [0u8; 4];
        header[0] = tag;
        let n = 1 + encode_length(value.len(), &mut header[1..])?;
        let end = self.len.checked_add(n)?.checked_add(value.len())?;
        let out = self.buf.get_mut(self.len..end)?;
        out[..n].copy_from_slice(&header[..n]);
        out[n..].copy_from_slice(value);
        self.len = end;
        Some(())
    }

    pub fn push_u8(&mut self, tag: u8, value: u8) -> Option<()> {
        self.push(tag, &[value])
    }

    pub fn push_u16(&mut self, tag: u8, value: u16) -> Option<()> {
        self.push(tag, &value.to_be_bytes())
    }

    pub fn push_u32(&mut self, tag: u8, value: u32) -> Option<()> {
        self.push(tag, &value.to_be_bytes())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}
