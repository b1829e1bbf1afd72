//! Oxvisor - CPU scheduling core for a Rust-based Type-1 hypervisor
//!
//! This crate implements the per-physical-CPU scheduling core of the Oxvisor
//! hypervisor: round-robin VCPU selection, tick-driven time slicing and
//! preemption arbitration during interrupt handling. Everything here runs in
//! interrupt context and never blocks; the collaborating subsystems (VCPU
//! directory, context-switch primitive, timer facility, VCPU interrupt
//! delivery) are reached through trait seams so a scheduler instance can be
//! driven deterministically in tests.

#![no_std]

extern crate alloc;

// Core modules
pub mod config;

// Architecture-specific code
pub mod arch;

// Core hypervisor modules
pub mod core;

// Device driver contracts
pub mod drivers;

// Re-export key types for convenience
pub use crate::core::sched::{Scheduler, SchedulerStats};
pub use crate::core::vmm::{Guest, Vcpu, VcpuDirectory, VcpuManager, VcpuState};

/// Oxvisor version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common error type for Oxvisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Invalid argument
    InvalidArgument,
    /// Not found
    NotFound,
    /// Resource unavailable
    ResourceUnavailable,
    /// Not initialized
    NotInitialized,
    /// Invalid state
    InvalidState,
}

/// Result type alias
pub type Result<T> = ::core::result::Result<T, Error>;
