//! Interrupt handling contracts
//!
//! The scheduling core does not deliver interrupts itself; when the
//! preemption gate decides the current VCPU really is running, it hands the
//! trapped frame to the interrupt subsystem through [`VcpuIrq`], which routes
//! it into the guest's virtualized interrupt state.

use crate::arch::RegisterFrame;
use crate::core::vmm::Vcpu;

/// Delivery of a trapped physical interrupt into a VCPU.
pub trait VcpuIrq: Send + Sync {
    /// Deliver the interrupt described by `frame` into `vcpu`.
    ///
    /// Invoked only while `vcpu` is RUNNING on the local physical CPU;
    /// must not block or suspend.
    fn process(&self, vcpu: &Vcpu, frame: &mut RegisterFrame);
}
