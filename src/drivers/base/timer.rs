//! Timer event facility contract
//!
//! The platform timer driver maintains the event list and the hardware
//! comparator; the scheduling core only needs to register one named periodic
//! event per physical CPU, start it, and re-arm it from its own callback.
//! Callbacks fire in interrupt context on the CPU that owns the event.

use alloc::boxed::Box;

use crate::arch::RegisterFrame;
use crate::Result;

/// Opaque handle to a registered timer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle(usize);

impl TimerHandle {
    /// Wrap a raw event slot. Intended for facility implementations.
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    /// Raw event slot.
    pub const fn raw(self) -> usize {
        self.0
    }
}

/// A fired timer event, as seen by its callback.
pub struct TimerEvent {
    /// Handle of the event that fired
    pub handle: TimerHandle,
    /// Name given at registration
    pub name: &'static str,
}

/// Callback invoked in interrupt context when a timer event fires.
///
/// Receives the event and the register frame trapped by the timer interrupt.
pub type TimerCallback = Box<dyn Fn(&TimerEvent, &mut RegisterFrame) + Send + Sync>;

/// Contract with the platform timer-event facility.
pub trait TimerFacility: Send + Sync {
    /// Register a named periodic event.
    ///
    /// Fails with `Error::ResourceUnavailable` when the event list is full.
    fn create_periodic_event(&self, name: &'static str, callback: TimerCallback)
        -> Result<TimerHandle>;

    /// Arm the event to fire `period_ns` nanoseconds from now.
    fn start(&self, handle: TimerHandle, period_ns: u64);

    /// Re-arm the event with its previously programmed period.
    fn restart(&self, handle: TimerHandle);
}
