//! VCPU and guest directory
//!
//! The concrete [`VcpuDirectory`] used by the rest of the hypervisor: creates
//! guests and VCPUs, hands out dense stable ids and resolves lookups from the
//! scheduler. Creation happens at guest-configuration time, never from
//! interrupt context.

use alloc::string::ToString;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::config::{DEFAULT_TICK_COUNT, MAX_VCPUS};
use crate::core::sync::SpinLock;
use crate::core::vmm::{Guest, GuestId, TickFn, Vcpu, VcpuDirectory, VcpuId};
use crate::{Error, Result};

/// Directory of all guests and VCPUs known to this hypervisor instance.
pub struct VcpuManager {
    /// Registered guests, indexed by [`GuestId`]
    guests: SpinLock<Vec<Arc<Guest>>>,
    /// Registered VCPUs, indexed by [`VcpuId`]
    vcpus: SpinLock<Vec<Arc<Vcpu>>>,
}

impl VcpuManager {
    /// Create an empty directory
    pub fn new() -> Self {
        Self {
            guests: SpinLock::new(Vec::new()),
            vcpus: SpinLock::new(Vec::new()),
        }
    }

    /// Register a new guest.
    pub fn create_guest(&self, name: &str) -> Result<Arc<Guest>> {
        if name.is_empty() {
            return Err(Error::InvalidArgument);
        }

        let mut guests = self.guests.lock();
        let guest = Arc::new(Guest::new(guests.len(), name.to_string()));
        guests.push(Arc::clone(&guest));

        log::debug!("created guest{} ({})", guest.id(), name);
        Ok(guest)
    }

    /// Register a new VCPU, orphan or guest-owned.
    ///
    /// The VCPU starts in RESET and must be activated before the scheduler
    /// will pick it. A zero `tick_count` selects the configured default
    /// slice budget.
    pub fn create_vcpu(
        &self,
        name: &str,
        guest: Option<&Arc<Guest>>,
        tick_count: u32,
        tick_func: Option<TickFn>,
    ) -> Result<Arc<Vcpu>> {
        if name.is_empty() {
            return Err(Error::InvalidArgument);
        }

        let tick_count = if tick_count == 0 {
            DEFAULT_TICK_COUNT
        } else {
            tick_count
        };

        let mut vcpus = self.vcpus.lock();
        if vcpus.len() >= MAX_VCPUS {
            return Err(Error::ResourceUnavailable);
        }

        let id = vcpus.len();
        let vcpu = Arc::new(Vcpu::new(
            id,
            name.to_string(),
            guest.map(Arc::clone),
            tick_count,
            tick_func,
        ));
        vcpus.push(Arc::clone(&vcpu));
        drop(vcpus);

        if let Some(guest) = guest {
            guest.attach_vcpu(id);
        }

        log::debug!("created vcpu{} ({}), {} ticks/slice", id, name, tick_count);
        Ok(vcpu)
    }

    /// Number of registered guests
    pub fn guest_count(&self) -> usize {
        self.guests.lock().len()
    }

    /// Resolve a guest by id
    pub fn guest(&self, id: GuestId) -> Option<Arc<Guest>> {
        self.guests.lock().get(id).cloned()
    }
}

impl Default for VcpuManager {
    fn default() -> Self {
        Self::new()
    }
}

impl VcpuDirectory for VcpuManager {
    fn vcpu_count(&self) -> usize {
        self.vcpus.lock().len()
    }

    fn vcpu(&self, id: VcpuId) -> Option<Arc<Vcpu>> {
        self.vcpus.lock().get(id).cloned()
    }
}
