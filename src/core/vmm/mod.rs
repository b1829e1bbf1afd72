//! Virtual machine management
//!
//! VCPU and guest objects plus the directory interface the scheduler resolves
//! them through. The directory owns lifecycle; the scheduler only reads and
//! mutates the scheduling fields of whatever VCPUs the directory exposes.

pub mod guest;
pub mod manager;
pub mod vcpu;

pub use guest::Guest;
pub use manager::VcpuManager;
pub use vcpu::{TickFn, Vcpu, VcpuState};

use alloc::sync::Arc;

/// Stable identifier of a VCPU within its directory.
pub type VcpuId = usize;

/// Stable identifier of a guest.
pub type GuestId = usize;

/// Lookup interface the scheduler uses to resolve VCPUs.
///
/// Identifiers are dense: every id in `0..vcpu_count()` resolves for as long
/// as the VCPU exists. The directory's placement policy must guarantee that a
/// VCPU is scheduled by at most one physical CPU.
pub trait VcpuDirectory: Send + Sync {
    /// Number of VCPUs currently registered.
    fn vcpu_count(&self) -> usize;

    /// Resolve a VCPU by id.
    fn vcpu(&self, id: VcpuId) -> Option<Arc<Vcpu>>;
}
