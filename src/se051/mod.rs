//! Driver for the SE051 secure element on the Secure 5 / Plug'n'Trust Clicks.
//!
//! Commands to the IoT applet are APDUs whose arguments are TLV-coded; the APDUs travel over
//! I2C inside T=1 blocks. The layers live in [`tlv`], [`apdu`] and [`t1`]; [`Se051`] wraps them
//! into one call per applet command.
//!
//! ```
//! # use click_drivers::se051::Se051;
//! # struct I2c;
//! # impl embedded_hal::blocking::i2c::Read for I2c {
//! #     type Error = ();
//! #     fn read(&mut self, _: u8, _: &mut [u8]) -> Result<(), ()> { Err(()) }
//! # }
//! # impl embedded_hal::blocking::i2c::Write for I2c {
//! #     type Error = ();
//! #     fn write(&mut self, _: u8, _: &[u8]) -> Result<(), ()> { Ok(()) }
//! # }
//! # struct Delay;
//! # impl embedded_hal::blocking::delay::DelayMs<u32> for Delay {
//! #     fn delay_ms(&mut self, _: u32) {}
//! # }
//! let mut se = Se051::new(I2c, Delay);
//! let mut random = [0u8; 16];
//! if se.select_applet().is_ok() {
//!     se.get_random(&mut random).unwrap();
//! }
//! ```

pub mod apdu;
pub mod t1;
pub mod tlv;

use hal::blocking::delay::DelayMs;
use hal::blocking::i2c::{Read, Write};

use self::apdu::{Apdu, SW_OK};
use self::t1::{SBlock, T1};
use self::tlv::{Writer, TAG_1, TAG_2, TAG_3, TAG_4};

/// Errors from the secure element stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The I2C bus reported an error outside of busy polling.
    Bus(E),
    /// The secure element stayed busy for the whole polling budget.
    Timeout,
    /// A received block failed its CRC check.
    Crc,
    /// A block, APDU or TLV did not have the expected shape.
    Protocol,
    /// A command or response did not fit its buffer.
    Overflow,
    /// The applet answered with a status word other than 0x9000.
    Status(u16),
    /// An argument does not fit the command encoding, such as a length above 65535 bytes.
    InvalidArgument,
}

pub const DEFAULT_ADDRESS: u8 = 0x48;

/// Largest command and response APDU handled.
pub const MAX_APDU: usize = 892;

/// Application identifier of the IoT applet.
pub const IOT_APPLET_AID: [u8; 16] = [
    0xA0, 0x00, 0x00, 0x03, 0x96, 0x54, 0x53, 0x00, 0x00, 0x00, 0x01, 0x03, 0x00, 0x00, 0x00,
    0x00,
];

const CLA: u8 = 0x80;

mod ins {
    pub const WRITE: u8 = 0x01;
    pub const READ: u8 = 0x02;
    pub const MGMT: u8 = 0x04;
}

mod p1 {
    pub const DEFAULT: u8 = 0x00;
    pub const BINARY: u8 = 0x06;
}

mod p2 {
    pub const DEFAULT: u8 = 0x00;
    pub const VERSION: u8 = 0x20;
    pub const MEMORY: u8 = 0x22;
    pub const LIST: u8 = 0x25;
    pub const EXIST: u8 = 0x27;
    pub const DELETE_OBJECT: u8 = 0x28;
    pub const RANDOM: u8 = 0x49;
}

const RESULT_SUCCESS: u8 = 0x01;
const RESULT_FAILURE: u8 = 0x02;
const ID_FILTER_ALL: u8 = 0xFF;

/// Applet version, as returned by select and GetVersion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
    /// Bitmap of the features the applet was built with.
    pub applet_config: u16,
}

impl Version {
    fn from_bytes(b: &[u8]) -> Option<Self> {
        match *b {
            [major, minor, patch, c0, c1, ..] => Some(Self {
                major,
                minor,
                patch,
                applet_config: u16::from_be_bytes([c0, c1]),
            }),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MemoryKind {
    Persistent = 0x01,
    TransientReset = 0x02,
    TransientDeselect = 0x03,
}

pub struct Se051<I2C, D> {
    t1: T1<I2C, D>,
}

impl<I2C, D, E> Se051<I2C, D>
where
    I2C: Read<Error = E> + Write<Error = E>,
    D: DelayMs<u32>,
{
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self::with_address(i2c, delay, DEFAULT_ADDRESS)
    }

    pub fn with_address(i2c: I2C, delay: D, address: u8) -> Self {
        Self {
            t1: T1::new(i2c, delay, address),
        }
    }

    pub fn release(self) -> (I2C, D) {
        self.t1.release()
    }

    /// Reset the T=1 layer and return the answer-to-reset in `atr`.
    pub fn soft_reset(&mut self, atr: &mut [u8]) -> Result<usize, Error<E>> {
        let n = self.t1.supervisory(SBlock::SoftReset, &[], atr)?;
        log::debug!("se051: soft reset, {} byte ATR", n);
        Ok(n)
    }

    /// Close the applet session.
    pub fn end_session(&mut self) -> Result<(), Error<E>> {
        self.t1.supervisory(SBlock::EndSession, &[], &mut [])?;
        Ok(())
    }

    /// Resynchronize the block sequence numbers after a protocol error.
    pub fn resync(&mut self) -> Result<(), Error<E>> {
        self.t1.supervisory(SBlock::Resync, &[], &mut [])?;
        Ok(())
    }

    /// Send `apdu` and leave the response data in `resp`, returning its length. The status
    /// word must be 0x9000.
    pub fn transmit(&mut self, apdu: &Apdu, resp: &mut [u8; MAX_APDU]) -> Result<usize, Error<E>> {
        let mut tx = [0u8; MAX_APDU];
        let n = apdu.encode(&mut tx).ok_or(Error::Overflow)?;
        let len = self.t1.transceive(&tx[..n], resp)?;
        let (data, sw) = apdu::split_response(&resp[..len]).ok_or(Error::Protocol)?;
        if sw != SW_OK {
            log::debug!("se051: INS {:#04x} status {:#06x}", apdu.ins, sw);
            return Err(Error::Status(sw));
        }
        Ok(data.len())
    }

    /// Run an applet command whose arguments are built by `args`, returning the length of the
    /// response data left in `resp`.
    fn command<F>(
        &mut self,
        ins: u8,
        p1: u8,
        p2: u8,
        args: F,
        resp: &mut [u8; MAX_APDU],
    ) -> Result<usize, Error<E>>
    where
        F: FnOnce(&mut Writer) -> Option<()>,
    {
        let mut data = [0u8; MAX_APDU];
        let mut w = Writer::new(&mut data);
        args(&mut w).ok_or(Error::Overflow)?;
        let len = w.len();
        let apdu = Apdu::new(CLA, ins, p1, p2)
            .with_data(&data[..len])
            .with_le(0x100);
        self.transmit(&apdu, resp)
    }

    fn tag_1(resp: &[u8]) -> Result<&[u8], Error<E>> {
        tlv::find(resp, TAG_1).ok_or(Error::Protocol)
    }

    /// Select the IoT applet and return its version.
    pub fn select_applet(&mut self) -> Result<Version, Error<E>> {
        let apdu = Apdu::new(0x00, 0xA4, 0x04, 0x00)
            .with_data(&IOT_APPLET_AID)
            .with_le(0x100);
        let mut resp = [0u8; MAX_APDU];
        let n = self.transmit(&apdu, &mut resp)?;
        let version = Version::from_bytes(&resp[..n]).ok_or(Error::Protocol)?;
        log::debug!(
            "se051: applet {}.{}.{}",
            version.major,
            version.minor,
            version.patch
        );
        Ok(version)
    }

    pub fn get_version(&mut self) -> Result<Version, Error<E>> {
        let mut resp = [0u8; MAX_APDU];
        let n = self.command(ins::MGMT, p1::DEFAULT, p2::VERSION, |_| Some(()), &mut resp)?;
        Version::from_bytes(Self::tag_1(&resp[..n])?).ok_or(Error::Protocol)
    }

    /// Fill `buf` from the secure element's random number generator.
    pub fn get_random(&mut self, buf: &mut [u8]) -> Result<(), Error<E>> {
        let count = u16::try_from(buf.len()).map_err(|_| Error::InvalidArgument)?;
        let mut resp = [0u8; MAX_APDU];
        let n = self.command(
            ins::MGMT,
            p1::DEFAULT,
            p2::RANDOM,
            |w| w.push_u16(TAG_1, count),
            &mut resp,
        )?;
        let random = Self::tag_1(&resp[..n])?;
        if random.len() != buf.len() {
            return Err(Error::Protocol);
        }
        buf.copy_from_slice(random);
        Ok(())
    }

    /// Free memory of `kind` in bytes, saturated at 0x7FFF.
    pub fn get_free_memory(&mut self, kind: MemoryKind) -> Result<u16, Error<E>> {
        let mut resp = [0u8; MAX_APDU];
        let n = self.command(
            ins::MGMT,
            p1::DEFAULT,
            p2::MEMORY,
            |w| w.push_u8(TAG_1, kind as u8),
            &mut resp,
        )?;
        match *Self::tag_1(&resp[..n])? {
            [hi, lo] => Ok(u16::from_be_bytes([hi, lo])),
            _ => Err(Error::Protocol),
        }
    }

    pub fn check_object_exists(&mut self, id: u32) -> Result<bool, Error<E>> {
        let mut resp = [0u8; MAX_APDU];
        let n = self.command(
            ins::MGMT,
            p1::DEFAULT,
            p2::EXIST,
            |w| w.push_u32(TAG_1, id),
            &mut resp,
        )?;
        match *Self::tag_1(&resp[..n])? {
            [RESULT_SUCCESS] => Ok(true),
            [RESULT_FAILURE] => Ok(false),
            _ => Err(Error::Protocol),
        }
    }

    /// Read the content of object `id` into `buf`, returning its length.
    pub fn read_object(&mut self, id: u32, buf: &mut [u8]) -> Result<usize, Error<E>> {
        let mut resp = [0u8; MAX_APDU];
        let n = self.command(
            ins::READ,
            p1::DEFAULT,
            p2::DEFAULT,
            |w| w.push_u32(TAG_1, id),
            &mut resp,
        )?;
        let value = Self::tag_1(&resp[..n])?;
        buf.get_mut(..value.len())
            .ok_or(Error::Overflow)?
            .copy_from_slice(value);
        Ok(value.len())
    }

    /// Create binary object `id` holding `data`.
    pub fn write_binary(&mut self, id: u32, data: &[u8]) -> Result<(), Error<E>> {
        let len = u16::try_from(data.len()).map_err(|_| Error::InvalidArgument)?;
        let mut resp = [0u8; MAX_APDU];
        self.command(
            ins::WRITE,
            p1::BINARY,
            p2::DEFAULT,
            |w| {
                w.push_u32(TAG_1, id)?;
                w.push_u16(TAG_3, len)?;
                w.push(TAG_4, data)
            },
            &mut resp,
        )?;
        Ok(())
    }

    pub fn delete_object(&mut self, id: u32) -> Result<(), Error<E>> {
        let mut resp = [0u8; MAX_APDU];
        self.command(
            ins::MGMT,
            p1::DEFAULT,
            p2::DELETE_OBJECT,
            |w| w.push_u32(TAG_1, id),
            &mut resp,
        )?;
        Ok(())
    }

    /// List the object identifiers starting at `offset` into `ids`. Returns how many were
    /// stored and whether the applet has more.
    pub fn read_id_list(
        &mut self,
        offset: u16,
        ids: &mut [u32],
    ) -> Result<(usize, bool), Error<E>> {
        let mut resp = [0u8; MAX_APDU];
        let n = self.command(
            ins::READ,
            p1::DEFAULT,
            p2::LIST,
            |w| {
                w.push_u16(TAG_1, offset)?;
                w.push_u8(TAG_2, ID_FILTER_ALL)
            },
            &mut resp,
        )?;
        let resp = &resp[..n];
        let more = match tlv::find(resp, TAG_1) {
            Some([flag]) => *flag == RESULT_SUCCESS,
            _ => return Err(Error::Protocol),
        };
        let list = tlv::find(resp, TAG_2).ok_or(Error::Protocol)?;
        if list.len() % 4 != 0 {
            return Err(Error::Protocol);
        }
        let mut count = 0;
        for (slot, id) in ids.iter_mut().zip(list.chunks_exact(4)) {
            *slot = u32::from_be_bytes([id[0], id[1], id[2], id[3]]);
            count += 1;
        }
        if count < list.len() / 4 {
            return Err(Error::Overflow);
        }
        Ok((count, more))
    }
}
