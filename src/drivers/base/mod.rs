//! Base device driver framework
//!
//! Common driver-facing interfaces shared across platforms.

pub mod timer;

pub use timer::{TimerCallback, TimerEvent, TimerFacility, TimerHandle};
