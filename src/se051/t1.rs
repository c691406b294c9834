//! The T=1 block protocol over I2C, as spoken by the SE05x family.
//!
//! A block is `NAD PCB LEN INF CRC`, with the CRC-16/X.25 of everything before it sent least
//! significant byte first. The secure element NACKs its address while it is busy, so receiving
//! a block polls the header until the device answers.

use hal::blocking::delay::DelayMs;
use hal::blocking::i2c::{Read, Write};

use super::Error;
use crate::crc::crc16_x25;

/// Node address of blocks sent by the host.
pub const NAD_HOST: u8 = 0x5A;
/// Node address of blocks sent by the secure element.
pub const NAD_SE: u8 = 0xA5;

pub const HEADER_LEN: usize = 3;
pub const CRC_LEN: usize = 2;
/// Largest information field.
pub const MAX_INF: usize = 254;
pub const MAX_BLOCK: usize = HEADER_LEN + MAX_INF + CRC_LEN;

const POLL_ATTEMPTS: u32 = 50;
const POLL_MS: u32 = 2;

/// Supervisory block types. The request PCB is `0xC0 | code`, the response `0xE0 | code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SBlock {
    Resync,
    Ifs,
    Abort,
    /// Waiting time extension.
    Wtx,
    EndSession,
    ChipReset,
    GetAtr,
    SoftReset,
}

impl SBlock {
    fn code(self) -> u8 {
        match self {
            SBlock::Resync => 0x00,
            SBlock::Ifs => 0x01,
            SBlock::Abort => 0x02,
            SBlock::Wtx => 0x03,
            SBlock::EndSession => 0x05,
            SBlock::ChipReset => 0x06,
            SBlock::GetAtr => 0x07,
            SBlock::SoftReset => 0x0F,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x00 => SBlock::Resync,
            0x01 => SBlock::Ifs,
            0x02 => SBlock::Abort,
            0x03 => SBlock::Wtx,
            0x05 => SBlock::EndSession,
            0x06 => SBlock::ChipReset,
            0x07 => SBlock::GetAtr,
            0x0F => SBlock::SoftReset,
            _ => return None,
        })
    }
}

/// The protocol control byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Pcb {
    /// Information block with send sequence number and chaining flag.
    I { ns: bool, more: bool },
    /// Receive-ready block acknowledging a chained block; `error` is 0 when the last block was
    /// accepted, 1 for a CRC error, 2 for another error.
    R { nr: bool, error: u8 },
    SRequest(SBlock),
    SResponse(SBlock),
}

impl Pcb {
    pub fn encode(self) -> u8 {
        match self {
            Pcb::I { ns, more } => (u8::from(ns) << 6) | (u8::from(more) << 5),
            Pcb::R { nr, error } => 0x80 | (u8::from(nr) << 4) | (error & 0x03),
            Pcb::SRequest(s) => 0xC0 | s.code(),
            Pcb::SResponse(s) => 0xE0 | s.code(),
        }
    }

    pub fn decode(pcb: u8) -> Option<Self> {
        if pcb & 0x80 == 0 {
            Some(Pcb::I {
                ns: pcb & 0x40 != 0,
                more: pcb & 0x20 != 0,
            })
        } else if pcb & 0xC0 == 0x80 {
            Some(Pcb::R {
                nr: pcb & 0x10 != 0,
                error: pcb & 0x03,
            })
        } else {
            let s = SBlock::from_code(pcb & 0x1F)?;
            if pcb & 0x20 != 0 {
                Some(Pcb::SResponse(s))
            } else {
                Some(Pcb::SRequest(s))
            }
        }
    }
}

/// Frame one block into `out`, returning its length.
pub fn encode_block(nad: u8, pcb: Pcb, inf: &[u8], out: &mut [u8]) -> Option<usize> {
    if inf.len() > MAX_INF {
        return None;
    }
    let len = HEADER_LEN + inf.len();
    let frame = out.get_mut(..len + CRC_LEN)?;
    frame[0] = nad;
    frame[1] = pcb.encode();
    frame[2] = inf.len() as u8;
    frame[HEADER_LEN..len].copy_from_slice(inf);
    let crc = crc16_x25(&frame[..len]).to_le_bytes();
    frame[len..].copy_from_slice(&crc);
    Some(len + CRC_LEN)
}

/// A T=1 session with one secure element.
pub struct T1<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
    ns: bool,
    nr: bool,
    ifsc: usize,
}

impl<I2C, D, E> T1<I2C, D>
where
    I2C: Read<Error = E> + Write<Error = E>,
    D: DelayMs<u32>,
{
    pub fn new(i2c: I2C, delay: D, address: u8) -> Self {
        Self {
            i2c,
            delay,
            address,
            ns: false,
            nr: false,
            ifsc: MAX_INF,
        }
    }

    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    /// Largest information field the secure element accepts.
    pub fn ifsc(&self) -> usize {
        self.ifsc
    }

    pub fn set_ifsc(&mut self, ifsc: usize) {
        self.ifsc = ifsc.clamp(1, MAX_INF);
    }

    fn reset_sequence(&mut self) {
        self.ns = false;
        self.nr = false;
    }

    pub fn send_block(&mut self, pcb: Pcb, inf: &[u8]) -> Result<(), Error<E>> {
        let mut frame = [0u8; MAX_BLOCK];
        let n = encode_block(NAD_HOST, pcb, inf, &mut frame).ok_or(Error::Overflow)?;
        log::trace!("t1 > {:02x?}", &frame[..n]);
        self.i2c.write(self.address, &frame[..n]).map_err(Error::Bus)
    }

    /// Receive one block into `buf`, returning its PCB and the length of its information
    /// field, which starts at `buf[HEADER_LEN]`.
    pub fn receive_block(&mut self, buf: &mut [u8; MAX_BLOCK]) -> Result<(Pcb, usize), Error<E>> {
        let mut attempts = 0;
        while self.i2c.read(self.address, &mut buf[..HEADER_LEN]).is_err() {
            attempts += 1;
            if attempts >= POLL_ATTEMPTS {
                log::warn!("se051: no answer after {} polls", POLL_ATTEMPTS);
                return Err(Error::Timeout);
            }
            self.delay.delay_ms(POLL_MS);
        }
        if buf[0] != NAD_SE {
            return Err(Error::Protocol);
        }
        let len = usize::from(buf[2]);
        if len > MAX_INF {
            return Err(Error::Protocol);
        }
        let end = HEADER_LEN + len;
        self.i2c
            .read(self.address, &mut buf[HEADER_LEN..end + CRC_LEN])
            .map_err(Error::Bus)?;
        log::trace!("t1 < {:02x?}", &buf[..end + CRC_LEN]);

        let crc = u16::from_le_bytes([buf[end], buf[end + 1]]);
        if crc != crc16_x25(&buf[..end]) {
            return Err(Error::Crc);
        }
        let pcb = Pcb::decode(buf[1]).ok_or(Error::Protocol)?;
        Ok((pcb, len))
    }

    /// Receive a block, answering waiting time extension requests on the way.
    fn receive_skipping_wtx(
        &mut self,
        buf: &mut [u8; MAX_BLOCK],
    ) -> Result<(Pcb, usize), Error<E>> {
        loop {
            let (pcb, len) = self.receive_block(buf)?;
            if pcb != Pcb::SRequest(SBlock::Wtx) {
                return Ok((pcb, len));
            }
            let mut inf = [0u8; 4];
            let n = len.min(inf.len());
            inf[..n].copy_from_slice(&buf[HEADER_LEN..HEADER_LEN + n]);
            log::warn!("se051: waiting time extension {:02x?}", &inf[..n]);
            self.send_block(Pcb::SResponse(SBlock::Wtx), &inf[..n])?;
        }
    }

    /// Send a command APDU, chained into IFSC-sized I-blocks if needed, and collect the
    /// (possibly chained) response into `resp`. Returns the response length.
    pub fn transceive(&mut self, apdu: &[u8], resp: &mut [u8]) -> Result<usize, Error<E>> {
        if apdu.is_empty() {
            return Err(Error::InvalidArgument);
        }
        let mut rx = [0u8; MAX_BLOCK];

        let mut chunks = apdu.chunks(self.ifsc).peekable();
        while let Some(chunk) = chunks.next() {
            let more = chunks.peek().is_some();
            self.send_block(Pcb::I { ns: self.ns, more }, chunk)?;
            self.ns = !self.ns;
            if more {
                match self.receive_skipping_wtx(&mut rx)? {
                    (Pcb::R { nr, error: 0 }, _) if nr == self.ns => {}
                    (pcb, _) => {
                        log::warn!("se051: chained block not acknowledged: {:?}", pcb);
                        return Err(Error::Protocol);
                    }
                }
            }
        }

        let mut total = 0;
        loop {
            let (pcb, len) = self.receive_skipping_wtx(&mut rx)?;
            let more = match pcb {
                Pcb::I { ns, more } if ns == self.nr => more,
                other => {
                    log::warn!("se051: expected I-block, got {:?}", other);
                    return Err(Error::Protocol);
                }
            };
            self.nr = !self.nr;
            let end = total + len;
            resp.get_mut(total..end)
                .ok_or(Error::Overflow)?
                .copy_from_slice(&rx[HEADER_LEN..HEADER_LEN + len]);
            total = end;
            if !more {
                return Ok(total);
            }
            self.send_block(Pcb::R { nr: self.nr, error: 0 }, &[])?;
        }
    }

    /// Send an S-block request and wait for its response, copying the response INF into
    /// `resp`. Resets the sequence numbers after a resync or a reset.
    pub fn supervisory(
        &mut self,
        block: SBlock,
        inf: &[u8],
        resp: &mut [u8],
    ) -> Result<usize, Error<E>> {
        self.send_block(Pcb::SRequest(block), inf)?;
        let mut rx = [0u8; MAX_BLOCK];
        let (pcb, len) = self.receive_skipping_wtx(&mut rx)?;
        if pcb != Pcb::SResponse(block) {
            log::warn!("se051: expected {:?} response, got {:?}", block, pcb);
            return Err(Error::Protocol);
        }
        resp.get_mut(..len)
            .ok_or(Error::Overflow)?
            .copy_from_slice(&rx[HEADER_LEN..HEADER_LEN + len]);
        match block {
            SBlock::Resync | SBlock::SoftReset | SBlock::ChipReset => self.reset_sequence(),
            SBlock::Ifs => {
                if let Some(&ifs) = resp.first().filter(|_| len == 1) {
                    self.set_ifsc(usize::from(ifs));
                }
            }
            _ => {}
        }
        Ok(len)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::testing::{I2cTxn, MockDelay, ScriptedI2c};

    pub const ADDR: u8 = 0x48;

    pub fn frame(nad: u8, pcb: Pcb, inf: &[u8]) -> Vec<u8> {
        let mut out = [0u8; MAX_BLOCK];
        let n = encode_block(nad, pcb, inf, &mut out).unwrap();
        out[..n].to_vec()
    }

    /// The host sends `pcb`/`inf`.
    pub fn expect_sent(i2c: &ScriptedI2c, pcb: Pcb, inf: &[u8]) {
        i2c.push(I2cTxn::Write(ADDR, frame(NAD_HOST, pcb, inf)));
    }

    /// The secure element answers with `pcb`/`inf`, read in two parts.
    pub fn answer(i2c: &ScriptedI2c, pcb: Pcb, inf: &[u8]) {
        let f = frame(NAD_SE, pcb, inf);
        i2c.push(I2cTxn::Read(ADDR, f[..HEADER_LEN].to_vec()));
        i2c.push(I2cTxn::Read(ADDR, f[HEADER_LEN..].to_vec()));
    }

    fn session(i2c: &ScriptedI2c) -> T1<ScriptedI2c, MockDelay> {
        T1::new(i2c.split(), MockDelay::new(), ADDR)
    }

    #[test]
    fn soft_reset_frame() {
        assert_eq!(
            frame(NAD_HOST, Pcb::SRequest(SBlock::SoftReset), &[]),
            [0x5A, 0xCF, 0x00, 0x37, 0x7F]
        );
    }

    #[test]
    fn pcb_codes() {
        for pcb in [
            Pcb::I { ns: true, more: false },
            Pcb::I { ns: false, more: true },
            Pcb::R { nr: true, error: 0 },
            Pcb::R { nr: false, error: 1 },
            Pcb::SRequest(SBlock::Wtx),
            Pcb::SResponse(SBlock::SoftReset),
        ] {
            assert_eq!(Pcb::decode(pcb.encode()), Some(pcb));
        }
        assert_eq!(Pcb::I { ns: true, more: true }.encode(), 0x60);
        assert_eq!(Pcb::R { nr: true, error: 0 }.encode(), 0x90);
        assert_eq!(Pcb::SRequest(SBlock::Wtx).encode(), 0xC3);
        assert_eq!(Pcb::SResponse(SBlock::EndSession).encode(), 0xE5);
        assert_eq!(Pcb::decode(0xC4), None);
    }

    #[test]
    fn simple_exchange_toggles_sequence() {
        let i2c = ScriptedI2c::new(vec![]);
        expect_sent(&i2c, Pcb::I { ns: false, more: false }, &[1, 2]);
        answer(&i2c, Pcb::I { ns: false, more: false }, &[0x90, 0x00]);
        expect_sent(&i2c, Pcb::I { ns: true, more: false }, &[3]);
        answer(&i2c, Pcb::I { ns: true, more: false }, &[0x90, 0x00]);

        let mut t1 = session(&i2c);
        let mut resp = [0u8; 8];
        assert_eq!(t1.transceive(&[1, 2], &mut resp), Ok(2));
        assert_eq!(t1.transceive(&[3], &mut resp), Ok(2));
        i2c.done();
    }

    #[test]
    fn busy_device_is_polled() {
        let i2c = ScriptedI2c::new(vec![]);
        expect_sent(&i2c, Pcb::I { ns: false, more: false }, &[1]);
        i2c.push(I2cTxn::Nack(ADDR));
        i2c.push(I2cTxn::Nack(ADDR));
        answer(&i2c, Pcb::I { ns: false, more: false }, &[0x90, 0x00]);

        let mut t1 = session(&i2c);
        let mut resp = [0u8; 8];
        assert_eq!(t1.transceive(&[1], &mut resp), Ok(2));
        let (_, delay) = t1.release();
        assert_eq!(delay.ms, 4);
        i2c.done();
    }

    #[test]
    fn poll_budget_runs_out() {
        let i2c = ScriptedI2c::new(vec![]);
        for _ in 0..POLL_ATTEMPTS {
            i2c.push(I2cTxn::Nack(ADDR));
        }
        let mut t1 = session(&i2c);
        let mut rx = [0u8; MAX_BLOCK];
        assert_eq!(t1.receive_block(&mut rx), Err(Error::Timeout));
        i2c.done();
    }

    #[test]
    fn crc_mismatch() {
        let i2c = ScriptedI2c::new(vec![]);
        let mut f = frame(NAD_SE, Pcb::I { ns: false, more: false }, &[0x90, 0x00]);
        f[3] ^= 0x01;
        i2c.push(I2cTxn::Read(ADDR, f[..3].to_vec()));
        i2c.push(I2cTxn::Read(ADDR, f[3..].to_vec()));
        let mut rx = [0u8; MAX_BLOCK];
        assert_eq!(session(&i2c).receive_block(&mut rx), Err(Error::Crc));
    }

    #[test]
    fn wrong_nad() {
        let i2c = ScriptedI2c::new(vec![I2cTxn::Read(ADDR, vec![0x5A, 0x00, 0x00])]);
        let mut rx = [0u8; MAX_BLOCK];
        assert_eq!(session(&i2c).receive_block(&mut rx), Err(Error::Protocol));
    }

    #[test]
    fn wtx_is_answered() {
        let i2c = ScriptedI2c::new(vec![]);
        expect_sent(&i2c, Pcb::I { ns: false, more: false }, &[1]);
        answer(&i2c, Pcb::SRequest(SBlock::Wtx), &[0x02]);
        expect_sent(&i2c, Pcb::SResponse(SBlock::Wtx), &[0x02]);
        answer(&i2c, Pcb::I { ns: false, more: false }, &[0x90, 0x00]);

        let mut resp = [0u8; 8];
        assert_eq!(session(&i2c).transceive(&[1], &mut resp), Ok(2));
        i2c.done();
    }

    #[test]
    fn command_chaining() {
        let i2c = ScriptedI2c::new(vec![]);
        let apdu: Vec<u8> = (0..10).collect();
        expect_sent(&i2c, Pcb::I { ns: false, more: true }, &apdu[..4]);
        answer(&i2c, Pcb::R { nr: true, error: 0 }, &[]);
        expect_sent(&i2c, Pcb::I { ns: true, more: true }, &apdu[4..8]);
        answer(&i2c, Pcb::R { nr: false, error: 0 }, &[]);
        expect_sent(&i2c, Pcb::I { ns: false, more: false }, &apdu[8..]);
        answer(&i2c, Pcb::I { ns: false, more: false }, &[0x90, 0x00]);

        let mut t1 = session(&i2c);
        t1.set_ifsc(4);
        let mut resp = [0u8; 8];
        assert_eq!(t1.transceive(&apdu, &mut resp), Ok(2));
        i2c.done();
    }

    #[test]
    fn chained_block_rejected() {
        let i2c = ScriptedI2c::new(vec![]);
        expect_sent(&i2c, Pcb::I { ns: false, more: true }, &[0, 1]);
        answer(&i2c, Pcb::R { nr: false, error: 1 }, &[]);

        let mut t1 = session(&i2c);
        t1.set_ifsc(2);
        let mut resp = [0u8; 8];
        assert_eq!(t1.transceive(&[0, 1, 2], &mut resp), Err(Error::Protocol));
    }

    #[test]
    fn response_chaining() {
        let i2c = ScriptedI2c::new(vec![]);
        expect_sent(&i2c, Pcb::I { ns: false, more: false }, &[7]);
        answer(&i2c, Pcb::I { ns: false, more: true }, &[1, 2, 3]);
        expect_sent(&i2c, Pcb::R { nr: true, error: 0 }, &[]);
        answer(&i2c, Pcb::I { ns: true, more: false }, &[4, 0x90, 0x00]);

        let mut resp = [0u8; 8];
        assert_eq!(session(&i2c).transceive(&[7], &mut resp), Ok(6));
        assert_eq!(resp[..6], [1, 2, 3, 4, 0x90, 0x00]);
        i2c.done();
    }

    #[test]
    fn response_overflow() {
        let i2c = ScriptedI2c::new(vec![]);
        expect_sent(&i2c, Pcb::I { ns: false, more: false }, &[7]);
        answer(&i2c, Pcb::I { ns: false, more: false }, &[1, 2, 3, 0x90, 0x00]);
        let mut resp = [0u8; 4];
        assert_eq!(session(&i2c).transceive(&[7], &mut resp), Err(Error::Overflow));
    }

    #[test]
    fn ifs_negotiation() {
        let i2c = ScriptedI2c::new(vec![]);
        expect_sent(&i2c, Pcb::SRequest(SBlock::Ifs), &[0x20]);
        answer(&i2c, Pcb::SResponse(SBlock::Ifs), &[0x20]);
        let mut t1 = session(&i2c);
        let mut resp = [0u8; 1];
        assert_eq!(t1.supervisory(SBlock::Ifs, &[0x20], &mut resp), Ok(1));
        assert_eq!(t1.ifsc(), 0x20);
    }
}
