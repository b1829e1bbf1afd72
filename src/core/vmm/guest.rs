//! Guest objects
//!
//! A guest is the owner of a set of VCPUs. The scheduling core only ever
//! follows the back-reference from a VCPU to its guest; everything else about
//! a guest (address space, devices) lives elsewhere in the hypervisor.

use alloc::string::String;
use alloc::vec::Vec;

use crate::core::sync::SpinLock;
use crate::core::vmm::{GuestId, VcpuId};

/// A guest virtual machine, as far as the scheduler is concerned.
pub struct Guest {
    /// Guest ID
    id: GuestId,
    /// Guest name
    name: String,
    /// IDs of the VCPUs belonging to this guest
    vcpus: SpinLock<Vec<VcpuId>>,
}

impl Guest {
    pub(crate) fn new(id: GuestId, name: String) -> Self {
        Self {
            id,
            name,
            vcpus: SpinLock::new(Vec::new()),
        }
    }

    /// Get the guest ID
    pub fn id(&self) -> GuestId {
        self.id
    }

    /// Get the guest name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of VCPUs attached to this guest
    pub fn vcpu_count(&self) -> usize {
        self.vcpus.lock().len()
    }

    /// IDs of the VCPUs attached to this guest
    pub fn vcpu_ids(&self) -> Vec<VcpuId> {
        self.vcpus.lock().clone()
    }

    pub(crate) fn attach_vcpu(&self, id: VcpuId) {
        self.vcpus.lock().push(id);
    }
}
