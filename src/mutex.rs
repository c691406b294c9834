//! Locks for a bus shared between drivers.

use core::cell::RefCell;

/// A lock guarding one bus inside a [`BusManager`](crate::bus::BusManager).
///
/// Implementations exist for:
///
/// - `core::cell::RefCell<T>`, always. It is enough when every driver sharing the bus runs in
///   the same thread and none of them is used from an interrupt handler.
/// - `std::sync::Mutex<T>` with the `std` feature.
/// - `cortex_m::interrupt::Mutex<RefCell<T>>` with the `cortexm` feature. The `RefCell` supplies
///   the mutability the interrupt mutex lacks.
///
/// [`DefaultMutex<T>`] names the strongest of these the enabled features allow.
pub trait IOMutex<T> {
    /// Wrap `v`.
    fn new(v: T) -> Self;

    /// Run `f` with exclusive access to the guarded value and return its result.
    fn lock<R, F: FnOnce(&mut T) -> R>(&self, f: F) -> R;
}

#[cfg(feature = "std")]
pub type DefaultMutex<T> = std::sync::Mutex<T>;

#[cfg(all(feature = "cortexm", not(feature = "std")))]
pub type DefaultMutex<T> = cortex_m::interrupt::Mutex<RefCell<T>>;

#[cfg(not(any(feature = "std", feature = "cortexm")))]
pub type DefaultMutex<T> = RefCell<T>;

impl<T> IOMutex<T> for RefCell<T> {
    fn new(v: T) -> Self {
        RefCell::new(v)
    }

    fn lock<R, F: FnOnce(&mut T) -> R>(&self, f: F) -> R {
        // Panics on re-entry, which only a driver calling into the bus from inside `f` can cause.
        f(&mut self.borrow_mut())
    }
}

#[cfg(feature = "std")]
impl<T> IOMutex<T> for std::sync::Mutex<T> {
    fn new(v: T) -> Self {
        std::sync::Mutex::new(v)
    }

    fn lock<R, F: FnOnce(&mut T) -> R>(&self, f: F) -> R {
        // A panic mid-transaction leaves nothing half-done on the bus: the next transaction
        // starts with its own start condition or chip select.
        let mut guard = match self.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[cfg(feature = "cortexm")]
impl<T> IOMutex<T> for cortex_m::interrupt::Mutex<RefCell<T>> {
    fn new(v: T) -> Self {
        cortex_m::interrupt::Mutex::new(RefCell::new(v))
    }

    fn lock<R, F: FnOnce(&mut T) -> R>(&self, f: F) -> R {
        cortex_m::interrupt::free(|cs| f(&mut self.borrow(cs).borrow_mut()))
    }
}
