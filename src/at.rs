//! A line-oriented command framer for the UART radio modules.
//!
//! The XBee and RN4871 modules both speak an ASCII command protocol: a command is a mnemonic
//! plus arguments terminated by `\r`, and the module answers with one or more lines, the last of
//! which carries a success or failure token. [`AtPort`] owns the UART and a millisecond delay
//! and provides the framing and the bounded waiting; the drivers supply the tokens.

use hal::blocking::delay::DelayMs;
use hal::serial;

/// Errors from the command framer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The UART reported an error.
    Serial(E),
    /// No complete answer arrived before the deadline.
    Timeout,
    /// The module answered with its failure token.
    Rejected,
    /// An answer line did not fit the caller's buffer.
    Overflow,
    /// An argument contained the command terminator or was otherwise unusable.
    InvalidArgument,
}

/// Errors of a module driver: its command port or its reset pin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModuleError<E, PE> {
    Port(Error<E>),
    Reset(PE),
}

impl<E, PE> From<Error<E>> for ModuleError<E, PE> {
    fn from(e: Error<E>) -> Self {
        ModuleError::Port(e)
    }
}

/// Command terminator.
pub const CR: u8 = b'\r';
/// Optional line feed following the terminator in answers.
pub const LF: u8 = b'\n';

/// Longest answer line the drivers expect.
pub const MAX_LINE: usize = 64;

/// A UART carrying an ASCII command protocol.
pub struct AtPort<UART, D> {
    uart: UART,
    delay: D,
}

impl<UART, D, E> AtPort<UART, D>
where
    UART: serial::Read<u8, Error = E> + serial::Write<u8, Error = E>,
    D: DelayMs<u32>,
{
    /// Wrap `uart`, using `delay` for timeouts.
    pub fn new(uart: UART, delay: D) -> Self {
        Self { uart, delay }
    }

    /// Give back the UART and the delay.
    pub fn release(self) -> (UART, D) {
        (self.uart, self.delay)
    }

    /// Wait `ms` milliseconds.
    pub fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    /// Send `bytes` as they are.
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<(), Error<E>> {
        for byte in bytes {
            nb::block!(self.uart.write(*byte)).map_err(Error::Serial)?;
        }
        nb::block!(self.uart.flush()).map_err(Error::Serial)
    }

    /// Send `prefix`, `mnemonic` and `args` followed by the terminator. None of them may
    /// contain the terminator.
    pub fn send_command(
        &mut self,
        prefix: &str,
        mnemonic: &str,
        args: &str,
    ) -> Result<(), Error<E>> {
        if [prefix, mnemonic, args]
            .iter()
            .any(|part| part.as_bytes().contains(&CR))
        {
            return Err(Error::InvalidArgument);
        }
        log::trace!("at > {}{}{}", prefix, mnemonic, args);
        self.send_raw(prefix.as_bytes())?;
        self.send_raw(mnemonic.as_bytes())?;
        self.send_raw(args.as_bytes())?;
        self.send_raw(&[CR])
    }

    /// Drop everything waiting in the receive buffer.
    pub fn drain(&mut self) -> Result<(), Error<E>> {
        loop {
            match self.uart.read() {
                Ok(_) => {}
                Err(nb::Error::WouldBlock) => return Ok(()),
                Err(nb::Error::Other(e)) => return Err(Error::Serial(e)),
            }
        }
    }

    /// Poll for one byte, waiting at most `budget_ms` in 1 ms steps. The budget is shared by the
    /// caller across bytes.
    fn read_byte(&mut self, budget_ms: &mut u32) -> Result<u8, Error<E>> {
        loop {
            match self.uart.read() {
                Ok(byte) => return Ok(byte),
                Err(nb::Error::Other(e)) => return Err(Error::Serial(e)),
                Err(nb::Error::WouldBlock) => {
                    if *budget_ms == 0 {
                        return Err(Error::Timeout);
                    }
                    *budget_ms -= 1;
                    self.delay.delay_ms(1);
                }
            }
        }
    }

    /// Read one line into `buf` and return its length, terminator excluded. Lines end at `\r`
    /// or `\n`; empty lines (such as the `\n` of a `\r\n` pair) are skipped.
    pub fn read_line(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, Error<E>> {
        let mut budget = timeout_ms;
        self.read_line_budget(buf, &mut budget)
    }

    /// Read lines until one contains `ok` (returns `Ok`) or `err` (returns
    /// `Error::Rejected`). Other lines are discarded.
    pub fn expect(&mut self, ok: &str, err: &str, timeout_ms: u32) -> Result<(), Error<E>> {
        let mut line = [0u8; MAX_LINE];
        self.expect_line(ok, err, &mut line, timeout_ms).map(|_| ())
    }

    /// Like [`expect`](Self::expect), but leaves the matching line in `line` and returns its
    /// length.
    pub fn expect_line(
        &mut self,
        ok: &str,
        err: &str,
        line: &mut [u8],
        timeout_ms: u32,
    ) -> Result<usize, Error<E>> {
        let mut budget = timeout_ms;
        loop {
            let len = self.read_line_budget(line, &mut budget)?;
            let text = &line[..len];
            if contains(text, ok.as_bytes()) {
                return Ok(len);
            }
            if contains(text, err.as_bytes()) {
                log::debug!("at: module rejected command");
                return Err(Error::Rejected);
            }
        }
    }

    fn read_line_budget(&mut self, buf: &mut [u8], budget: &mut u32) -> Result<usize, Error<E>> {
        let mut len = 0;
        loop {
            let byte = self.read_byte(budget)?;
            if byte == CR || byte == LF {
                if len == 0 {
                    continue;
                }
                log::trace!("at < {:?}", core::str::from_utf8(&buf[..len]));
                return Ok(len);
            }
            if len == buf.len() {
                return Err(Error::Overflow);
            }
            buf[len] = byte;
            len += 1;
        }
    }

    /// Wait until `token` appears anywhere in the received stream, for prompts that are not
    /// terminated by a line ending (`CMD>`, `OK` after `+++`).
    pub fn wait_for(&mut self, token: &str, timeout_ms: u32) -> Result<(), Error<E>> {
        let token = token.as_bytes();
        if token.is_empty() {
            return Ok(());
        }
        let mut budget = timeout_ms;
        let mut window = [0u8; MAX_LINE];
        let n = token.len().min(MAX_LINE);
        let token = &token[..n];
        let mut filled = 0;
        loop {
            let byte = self.read_byte(&mut budget)?;
            if filled == n {
                window.copy_within(1..n, 0);
                window[n - 1] = byte;
            } else {
                window[filled] = byte;
                filled += 1;
            }
            if filled == n && &window[..n] == token {
                return Ok(());
            }
        }
    }
}

/// Substring search on bytes.
pub(crate) fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockDelay, MockSerial};

    fn port() -> (MockSerial, AtPort<MockSerial, MockDelay>) {
        let uart = MockSerial::new();
        let port = AtPort::new(uart.split(), MockDelay::new());
        (uart, port)
    }

    #[test]
    fn command_is_terminated() {
        let (uart, mut port) = port();
        assert_eq!(port.send_command("AT", "ID", "3332"), Ok(()));
        assert_eq!(uart.sent_str(), "ATID3332\r");
    }

    #[test]
    fn command_rejects_embedded_terminator() {
        let (uart, mut port) = port();
        assert_eq!(
            port.send_command("AT", "NI", "bad\rname"),
            Err(Error::InvalidArgument)
        );
        assert!(uart.sent().is_empty());
    }

    #[test]
    fn read_line_skips_crlf() {
        let (uart, mut port) = port();
        uart.inject(b"\r\nAOK\r\n");
        let mut buf = [0u8; 8];
        assert_eq!(port.read_line(&mut buf, 10), Ok(3));
        assert_eq!(&buf[..3], b"AOK");
    }

    #[test]
    fn read_line_times_out() {
        let (uart, mut port) = port();
        uart.inject(b"partial");
        let mut buf = [0u8; 16];
        assert_eq!(port.read_line(&mut buf, 5), Err(Error::Timeout));
        let (_, delay) = port.release();
        assert_eq!(delay.ms, 5);
    }

    #[test]
    fn read_line_overflow() {
        let (uart, mut port) = port();
        uart.inject(b"0123456789\r");
        let mut buf = [0u8; 4];
        assert_eq!(port.read_line(&mut buf, 5), Err(Error::Overflow));
    }

    #[test]
    fn expect_skips_unrelated_lines() {
        let (uart, mut port) = port();
        uart.inject(b"13A200\rOK\r");
        assert_eq!(port.expect("OK", "ERROR", 10), Ok(()));
    }

    #[test]
    fn expect_reports_rejection() {
        let (uart, mut port) = port();
        uart.inject(b"ERROR\r");
        assert_eq!(port.expect("OK", "ERROR", 10), Err(Error::Rejected));
    }

    #[test]
    fn wait_for_prompt_without_terminator() {
        let (uart, mut port) = port();
        uart.inject(b"xxCMD> ");
        assert_eq!(port.wait_for("CMD>", 10), Ok(()));
    }

    #[test]
    fn scripted_response_arrives_after_command() {
        let (uart, mut port) = port();
        uart.respond(b"ATVR\r", b"10EF\rOK\r");
        port.send_command("AT", "VR", "").unwrap();
        let mut line = [0u8; 16];
        assert_eq!(port.read_line(&mut line, 10), Ok(4));
        assert_eq!(&line[..4], b"10EF");
        assert_eq!(port.expect("OK", "ERROR", 10), Ok(()));
    }

    #[test]
    fn substring_search() {
        assert!(contains(b"Rebooting", b"boot"));
        assert!(!contains(b"OK", b"ERROR"));
        assert!(contains(b"", b""));
    }
}
