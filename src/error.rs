//! The error type shared by the register-mapped drivers.

/// Errors returned by the register-mapped Click drivers. `E` is the error type of the
/// underlying [`RegisterInterface`](crate::interface::RegisterInterface) or HAL bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The bus or one of the control pins reported an error.
    Bus(E),
    /// The identification register held an unexpected value, carried here.
    WrongDevice(u8),
    /// The device did not become ready within the polling budget.
    Timeout,
    /// A conversion was still in progress; the reading should be retried.
    NotReady,
    /// The device returned data that failed validation (checksum, framing, reserved value).
    InvalidData,
    /// The device reported an internal error in its status.
    DeviceStatus,
    /// An argument was outside the range accepted by the device.
    InvalidArgument,
}

impl<E> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::Bus(e)
    }
}

/// Poll `ready` up to `attempts` times, calling `wait` between attempts. Returns
/// `Error::Timeout` if the condition never holds.
pub(crate) fn poll<E, F, W>(attempts: u32, mut ready: F, mut wait: W) -> Result<(), Error<E>>
where
    F: FnMut() -> Result<bool, Error<E>>,
    W: FnMut(),
{
    for _ in 0..attempts {
        if ready()? {
            return Ok(());
        }
        wait();
    }
    Err(Error::Timeout)
}
