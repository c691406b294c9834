//! Spies and fakes for the `embedded-hal` traits, shared by the driver unit tests.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::vec::Vec;

use hal::blocking::delay::{DelayMs, DelayUs};
use hal::blocking::i2c;
use hal::blocking::spi;
#[cfg(feature = "unproven")]
use hal::digital::v2::InputPin;
use hal::digital::v2::OutputPin;
use hal::serial;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MockI2cError {
    Nack,
}

/// An I2C device with a flat memory and an auto-incrementing address pointer, like most
/// register-mapped sensors and the 24-series EEPROMs.
pub struct RegisterFileI2c {
    address: u8,
    word_address: bool,
    memory: Arc<Mutex<Vec<u8>>>,
    pointer: Arc<Mutex<usize>>,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    busy_after_write: Arc<Mutex<(u32, u32)>>,
}

impl RegisterFileI2c {
    /// 256 byte-addressed registers.
    pub fn new(address: u8) -> Self {
        Self::build(address, false, 256)
    }

    /// `size` bytes addressed with a big-endian 16-bit word address.
    pub fn with_word_address(address: u8, size: usize) -> Self {
        Self::build(address, true, size)
    }

    fn build(address: u8, word_address: bool, size: usize) -> Self {
        Self {
            address,
            word_address,
            memory: Arc::new(Mutex::new(vec![0; size])),
            pointer: Arc::new(Mutex::new(0)),
            writes: Arc::new(Mutex::new(Vec::new())),
            busy_after_write: Arc::new(Mutex::new((0, 0))),
        }
    }

    pub fn split(&self) -> Self {
        Self {
            address: self.address,
            word_address: self.word_address,
            memory: self.memory.clone(),
            pointer: self.pointer.clone(),
            writes: self.writes.clone(),
            busy_after_write: self.busy_after_write.clone(),
        }
    }

    pub fn peek(&self, addr: usize) -> u8 {
        self.memory.lock().unwrap()[addr]
    }

    pub fn poke(&self, addr: usize, value: u8) {
        self.memory.lock().unwrap()[addr] = value;
    }

    pub fn poke_all(&self, addr: usize, values: &[u8]) {
        let mut mem = self.memory.lock().unwrap();
        mem[addr..addr + values.len()].copy_from_slice(values);
    }

    /// Every write transaction, address bytes included.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }

    /// NACK the next `count` transactions after every data write, like an EEPROM in its
    /// internal write cycle.
    pub fn busy_after_write(&self, count: u32) {
        *self.busy_after_write.lock().unwrap() = (count, 0);
    }

    fn check(&self, address: u8) -> Result<(), MockI2cError> {
        if address != self.address {
            return Err(MockI2cError::Nack);
        }
        let mut busy = self.busy_after_write.lock().unwrap();
        if busy.1 > 0 {
            busy.1 -= 1;
            return Err(MockI2cError::Nack);
        }
        Ok(())
    }

    fn set_pointer<'b>(&self, bytes: &'b [u8]) -> &'b [u8] {
        let (ptr, rest) = if self.word_address && bytes.len() >= 2 {
            ((usize::from(bytes[0]) << 8) | usize::from(bytes[1]), &bytes[2..])
        } else if !bytes.is_empty() {
            (usize::from(bytes[0]), &bytes[1..])
        } else {
            return bytes;
        };
        *self.pointer.lock().unwrap() = ptr;
        rest
    }

    fn read_from_pointer(&self, buffer: &mut [u8]) {
        let mem = self.memory.lock().unwrap();
        let mut ptr = self.pointer.lock().unwrap();
        for slot in buffer.iter_mut() {
            *slot = mem[*ptr % mem.len()];
            *ptr = (*ptr + 1) % mem.len();
        }
    }
}

impl i2c::Write for RegisterFileI2c {
    type Error = MockI2cError;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        self.check(address)?;
        self.writes.lock().unwrap().push(bytes.to_vec());
        let data = self.set_pointer(bytes);
        if !data.is_empty() {
            let mut mem = self.memory.lock().unwrap();
            let mut ptr = self.pointer.lock().unwrap();
            for b in data {
                let len = mem.len();
                mem[*ptr % len] = *b;
                *ptr = (*ptr + 1) % len;
            }
            let mut busy = self.busy_after_write.lock().unwrap();
            busy.1 = busy.0;
        }
        Ok(())
    }
}

impl i2c::WriteRead for RegisterFileI2c {
    type Error = MockI2cError;

    fn write_read(
        &mut self,
        address: u8,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.check(address)?;
        self.set_pointer(bytes);
        self.read_from_pointer(buffer);
        Ok(())
    }
}

impl i2c::Read for RegisterFileI2c {
    type Error = MockI2cError;

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.check(address)?;
        self.read_from_pointer(buffer);
        Ok(())
    }
}

/// One expected I2C transaction for [`ScriptedI2c`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum I2cTxn {
    Write(u8, Vec<u8>),
    Read(u8, Vec<u8>),
    WriteRead(u8, Vec<u8>, Vec<u8>),
    /// The next read (or write) is NACKed.
    Nack(u8),
}

/// An I2C bus that checks each transaction against a script, in order.
pub struct ScriptedI2c {
    script: Arc<Mutex<VecDeque<I2cTxn>>>,
}

impl ScriptedI2c {
    pub fn new(script: Vec<I2cTxn>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
        }
    }

    pub fn split(&self) -> Self {
        Self {
            script: self.script.clone(),
        }
    }

    pub fn push(&self, txn: I2cTxn) {
        self.script.lock().unwrap().push_back(txn);
    }

    pub fn done(&self) {
        let rest = self.script.lock().unwrap();
        assert!(rest.is_empty(), "unconsumed I2C script: {:?}", rest);
    }

    fn next(&self) -> I2cTxn {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .expect("I2C transaction beyond end of script")
    }
}

impl i2c::Write for ScriptedI2c {
    type Error = MockI2cError;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        match self.next() {
            I2cTxn::Write(a, expected) => {
                assert_eq!((a, expected.as_slice()), (address, bytes));
                Ok(())
            }
            I2cTxn::Nack(a) => {
                assert_eq!(a, address);
                Err(MockI2cError::Nack)
            }
            other => panic!("expected {:?}, got write {:02x?}", other, bytes),
        }
    }
}

impl i2c::Read for ScriptedI2c {
    type Error = MockI2cError;

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
        match self.next() {
            I2cTxn::Read(a, data) => {
                assert_eq!(a, address);
                assert_eq!(data.len(), buffer.len(), "read length");
                buffer.copy_from_slice(&data);
                Ok(())
            }
            I2cTxn::Nack(a) => {
                assert_eq!(a, address);
                Err(MockI2cError::Nack)
            }
            other => panic!("expected {:?}, got read of {}", other, buffer.len()),
        }
    }
}

impl i2c::WriteRead for ScriptedI2c {
    type Error = MockI2cError;

    fn write_read(
        &mut self,
        address: u8,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<(), Self::Error> {
        match self.next() {
            I2cTxn::WriteRead(a, expected, data) => {
                assert_eq!((a, expected.as_slice()), (address, bytes));
                buffer.copy_from_slice(&data);
                Ok(())
            }
            I2cTxn::Nack(a) => {
                assert_eq!(a, address);
                Err(MockI2cError::Nack)
            }
            other => panic!("expected {:?}, got write_read {:02x?}", other, bytes),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinEvent {
    Low,
    High,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpiEvent {
    Cs(PinEvent),
    Write(Vec<u8>),
    /// The bytes shifted out during a transfer.
    Transfer(Vec<u8>),
}

/// An SPI bus recording everything sent, answering transfers from a MISO queue (0x00 when
/// the queue is empty).
pub struct SpySpi {
    events: Arc<Mutex<Vec<SpiEvent>>>,
    miso: Arc<Mutex<VecDeque<u8>>>,
}

impl SpySpi {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            miso: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn split(&self) -> Self {
        Self {
            events: self.events.clone(),
            miso: self.miso.clone(),
        }
    }

    /// A chip select pin logging into the same event stream.
    pub fn cs(&self) -> CsPin {
        CsPin {
            events: self.events.clone(),
        }
    }

    pub fn queue_miso(&self, bytes: &[u8]) {
        self.miso.lock().unwrap().extend(bytes.iter().copied());
    }

    pub fn events(&self) -> Vec<SpiEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Bytes sent by writes and transfers, chip select ignored.
    pub fn mosi(&self) -> Vec<u8> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .flat_map(|e| match e {
                SpiEvent::Write(b) | SpiEvent::Transfer(b) => b.clone(),
                SpiEvent::Cs(_) => Vec::new(),
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl spi::Write<u8> for SpySpi {
    type Error = Infallible;

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        if !words.is_empty() {
            self.events.lock().unwrap().push(SpiEvent::Write(words.to_vec()));
        }
        Ok(())
    }
}

impl spi::Transfer<u8> for SpySpi {
    type Error = Infallible;

    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], Self::Error> {
        self.events
            .lock()
            .unwrap()
            .push(SpiEvent::Transfer(words.to_vec()));
        let mut miso = self.miso.lock().unwrap();
        for w in words.iter_mut() {
            *w = miso.pop_front().unwrap_or(0x00);
        }
        Ok(words)
    }
}

pub struct CsPin {
    events: Arc<Mutex<Vec<SpiEvent>>>,
}

impl OutputPin for CsPin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.events.lock().unwrap().push(SpiEvent::Cs(PinEvent::Low));
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.events.lock().unwrap().push(SpiEvent::Cs(PinEvent::High));
        Ok(())
    }
}

/// A standalone GPIO recording its transitions. Reading it returns the last level set (or the
/// level forced with `drive`).
pub struct SpyPin {
    events: Arc<Mutex<Vec<PinEvent>>>,
    level: Arc<Mutex<bool>>,
}

impl SpyPin {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            level: Arc::new(Mutex::new(false)),
        }
    }

    pub fn split(&self) -> Self {
        Self {
            events: self.events.clone(),
            level: self.level.clone(),
        }
    }

    pub fn events(&self) -> Vec<PinEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn drive(&self, high: bool) {
        *self.level.lock().unwrap() = high;
    }
}

impl OutputPin for SpyPin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.events.lock().unwrap().push(PinEvent::Low);
        *self.level.lock().unwrap() = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.events.lock().unwrap().push(PinEvent::High);
        *self.level.lock().unwrap() = true;
        Ok(())
    }
}

#[cfg(feature = "unproven")]
impl InputPin for SpyPin {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Self::Error> {
        Ok(*self.level.lock().unwrap())
    }

    fn is_low(&self) -> Result<bool, Self::Error> {
        Ok(!*self.level.lock().unwrap())
    }
}

/// A UART fake. Bytes queued with `respond` are delivered once the transmitted stream ends
/// with the trigger, in script order.
pub struct MockSerial {
    rx: Arc<Mutex<VecDeque<u8>>>,
    tx: Arc<Mutex<Vec<u8>>>,
    script: Arc<Mutex<VecDeque<(Vec<u8>, Vec<u8>)>>>,
}

impl MockSerial {
    pub fn new() -> Self {
        Self {
            rx: Arc::new(Mutex::new(VecDeque::new())),
            tx: Arc::new(Mutex::new(Vec::new())),
            script: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn split(&self) -> Self {
        Self {
            rx: self.rx.clone(),
            tx: self.tx.clone(),
            script: self.script.clone(),
        }
    }

    pub fn respond(&self, trigger: &[u8], response: &[u8]) {
        self.script
            .lock()
            .unwrap()
            .push_back((trigger.to_vec(), response.to_vec()));
    }

    pub fn inject(&self, bytes: &[u8]) {
        self.rx.lock().unwrap().extend(bytes.iter().copied());
    }

    pub fn sent(&self) -> Vec<u8> {
        self.tx.lock().unwrap().clone()
    }

    pub fn sent_str(&self) -> String {
        String::from_utf8_lossy(&self.sent()).into_owned()
    }
}

impl serial::Write<u8> for MockSerial {
    type Error = Infallible;

    fn write(&mut self, word: u8) -> nb::Result<(), Self::Error> {
        let mut tx = self.tx.lock().unwrap();
        tx.push(word);
        let mut script = self.script.lock().unwrap();
        let fire = match script.front() {
            Some((trigger, _)) => tx.ends_with(trigger),
            None => false,
        };
        if fire {
            if let Some((_, response)) = script.pop_front() {
                self.rx.lock().unwrap().extend(response);
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> nb::Result<(), Self::Error> {
        Ok(())
    }
}

impl serial::Read<u8> for MockSerial {
    type Error = Infallible;

    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        self.rx
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(nb::Error::WouldBlock)
    }
}

/// A delay that only counts.
#[derive(Default, Debug)]
pub struct MockDelay {
    pub ms: u32,
    pub us: u32,
    pub calls: u32,
}

impl MockDelay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DelayMs<u32> for MockDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.ms += ms;
        self.calls += 1;
    }
}

impl DelayUs<u32> for MockDelay {
    fn delay_us(&mut self, us: u32) {
        self.us += us;
        self.calls += 1;
    }
}
