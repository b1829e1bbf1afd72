//! Virtual CPU state and scheduling fields
//!
//! The scheduler's view of a VCPU: its state machine, time-slice accounting,
//! preemption counter and saved register frame. Scheduling fields are only
//! ever mutated by the physical CPU hosting the VCPU, which is what makes the
//! plain load/store accessors below race-free; lifecycle transitions coming
//! from other contexts go through the compare-and-swap helpers instead.

use core::sync::atomic::{AtomicU32, Ordering};

use alloc::string::String;
use alloc::sync::Arc;
use bitflags::bitflags;

use crate::arch::RegisterFrame;
use crate::core::sync::SpinLock;
use crate::core::vmm::{Guest, VcpuId};
use crate::{Error, Result};

bitflags! {
    /// VCPU scheduling state.
    ///
    /// Exactly one state bit is set at a time. `SAVEABLE` is the mask of
    /// states in which the saved register frame is valid and may legally be
    /// captured; a freshly created VCPU is `RESET` and carries nothing worth
    /// saving until it has run once.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VcpuState: u32 {
        /// Created, never run
        const RESET = 0x01;
        /// Runnable, waiting for a physical CPU
        const READY = 0x02;
        /// Executing on a physical CPU
        const RUNNING = 0x04;
        /// Halted/blocked, skipped by the selector
        const HALTED = 0x08;
        /// States whose register context may be saved
        const SAVEABLE = Self::READY.bits() | Self::RUNNING.bits() | Self::HALTED.bits();
    }
}

impl VcpuState {
    /// Runnable and eligible for selection.
    pub fn is_ready(self) -> bool {
        self == VcpuState::READY
    }

    /// Currently executing.
    pub fn is_running(self) -> bool {
        self == VcpuState::RUNNING
    }

    /// Register context may be saved on switch-away.
    pub fn is_saveable(self) -> bool {
        self.intersects(VcpuState::SAVEABLE)
    }
}

/// Per-tick hook invoked while a VCPU runs, with the trapped register frame
/// and the remaining tick count after the decrement.
pub type TickFn = fn(&mut RegisterFrame, u32);

/// A virtual CPU.
///
/// Owned by the VCPU directory; shared with the scheduler as `Arc<Vcpu>`.
pub struct Vcpu {
    /// VCPU ID, the round-robin ordering key
    id: VcpuId,
    /// VCPU name
    name: String,
    /// Current state, one bit of [`VcpuState`]
    state: AtomicU32,
    /// Configured ticks per time slice
    tick_count: u32,
    /// Ticks left in the current slice
    tick_pending: AtomicU32,
    /// Non-zero while preemption is disabled
    preempt_count: AtomicU32,
    /// Optional per-tick hook
    tick_func: Option<TickFn>,
    /// Saved register frame, valid in any saveable state
    regs: SpinLock<RegisterFrame>,
    /// Owning guest, `None` for orphan VCPUs
    guest: Option<Arc<Guest>>,
}

impl Vcpu {
    pub(crate) fn new(
        id: VcpuId,
        name: String,
        guest: Option<Arc<Guest>>,
        tick_count: u32,
        tick_func: Option<TickFn>,
    ) -> Self {
        Self {
            id,
            name,
            state: AtomicU32::new(VcpuState::RESET.bits()),
            tick_count,
            tick_pending: AtomicU32::new(0),
            preempt_count: AtomicU32::new(0),
            tick_func,
            regs: SpinLock::new(RegisterFrame::zeroed()),
            guest,
        }
    }

    /// Get the VCPU ID
    pub fn id(&self) -> VcpuId {
        self.id
    }

    /// Get the VCPU name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the owning guest, if any
    pub fn guest(&self) -> Option<Arc<Guest>> {
        self.guest.clone()
    }

    /// Get the current state
    pub fn state(&self) -> VcpuState {
        VcpuState::from_bits_truncate(self.state.load(Ordering::Acquire))
    }

    /// Set the state unconditionally.
    ///
    /// Reserved for the physical CPU hosting this VCPU (the scheduler's
    /// RUNNING/READY transitions); other contexts use the guarded
    /// transitions below.
    pub fn set_state(&self, state: VcpuState) {
        self.state.store(state.bits(), Ordering::Release);
    }

    fn try_transition(&self, from: VcpuState, to: VcpuState) -> Result<()> {
        self.state
            .compare_exchange(
                from.bits(),
                to.bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|_| Error::InvalidState)
    }

    /// Make a freshly created VCPU runnable (RESET -> READY).
    pub fn activate(&self) -> Result<()> {
        self.try_transition(VcpuState::RESET, VcpuState::READY)
    }

    /// Halt a runnable or running VCPU (READY|RUNNING -> HALTED).
    pub fn halt(&self) -> Result<()> {
        self.try_transition(VcpuState::READY, VcpuState::HALTED)
            .or_else(|_| self.try_transition(VcpuState::RUNNING, VcpuState::HALTED))
    }

    /// Make a halted VCPU runnable again (HALTED -> READY).
    ///
    /// The scheduling core never un-halts a VCPU on its own; this is the
    /// external intervention path.
    pub fn resume(&self) -> Result<()> {
        self.try_transition(VcpuState::HALTED, VcpuState::READY)
    }

    /// Configured ticks per time slice
    pub fn tick_count(&self) -> u32 {
        self.tick_count
    }

    /// Ticks left in the current slice
    pub fn tick_pending(&self) -> u32 {
        self.tick_pending.load(Ordering::Relaxed)
    }

    /// Refill the slice to the configured budget
    pub fn reset_tick_pending(&self) {
        self.tick_pending.store(self.tick_count, Ordering::Relaxed);
    }

    /// Consume one tick, returning the remaining count.
    pub fn dec_tick_pending(&self) -> u32 {
        let left = self.tick_pending().saturating_sub(1);
        self.tick_pending.store(left, Ordering::Relaxed);
        left
    }

    /// Current preemption-disable depth
    pub fn preempt_count(&self) -> u32 {
        self.preempt_count.load(Ordering::Relaxed)
    }

    /// Increment the preemption-disable depth.
    ///
    /// Caller masks local interrupts around the call.
    pub fn preempt_inc(&self) {
        self.preempt_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement the preemption-disable depth.
    ///
    /// Caller checks for a non-zero count and masks local interrupts.
    pub fn preempt_dec(&self) {
        self.preempt_count.fetch_sub(1, Ordering::Relaxed);
    }

    /// Per-tick hook, if registered
    pub fn tick_func(&self) -> Option<TickFn> {
        self.tick_func
    }

    /// Capture the trapped frame as this VCPU's saved context
    pub fn save_regs(&self, frame: &RegisterFrame) {
        *self.regs.lock() = frame.clone();
    }

    /// Replace the trapped frame with this VCPU's saved context
    pub fn restore_regs(&self, frame: &mut RegisterFrame) {
        *frame = self.regs.lock().clone();
    }

    /// Set the boot entry point and stack of a VCPU that has not run yet.
    pub fn set_entry(&self, pc: u64, sp: u64) {
        let mut regs = self.regs.lock();
        regs.pc = pc;
        regs.sp = sp;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    fn vcpu(tick_count: u32) -> Vcpu {
        Vcpu::new(0, "test".to_string(), None, tick_count, None)
    }

    #[test]
    fn test_reset_is_not_saveable() {
        assert!(!VcpuState::RESET.is_saveable());
        assert!(VcpuState::READY.is_saveable());
        assert!(VcpuState::RUNNING.is_saveable());
        assert!(VcpuState::HALTED.is_saveable());
    }

    #[test]
    fn test_lifecycle_transitions() {
        let vcpu = vcpu(5);
        assert_eq!(vcpu.state(), VcpuState::RESET);
        assert_eq!(vcpu.resume(), Err(Error::InvalidState));

        vcpu.activate().unwrap();
        assert_eq!(vcpu.state(), VcpuState::READY);
        assert_eq!(vcpu.activate(), Err(Error::InvalidState));

        vcpu.halt().unwrap();
        assert_eq!(vcpu.state(), VcpuState::HALTED);

        vcpu.resume().unwrap();
        assert_eq!(vcpu.state(), VcpuState::READY);
    }

    #[test]
    fn test_halt_from_running() {
        let vcpu = vcpu(5);
        vcpu.set_state(VcpuState::RUNNING);
        vcpu.halt().unwrap();
        assert_eq!(vcpu.state(), VcpuState::HALTED);
    }

    #[test]
    fn test_tick_accounting() {
        let vcpu = vcpu(3);
        assert_eq!(vcpu.tick_pending(), 0);

        vcpu.reset_tick_pending();
        assert_eq!(vcpu.tick_pending(), 3);

        assert_eq!(vcpu.dec_tick_pending(), 2);
        assert_eq!(vcpu.dec_tick_pending(), 1);
        assert_eq!(vcpu.dec_tick_pending(), 0);
        assert_eq!(vcpu.tick_pending(), 0);
    }

    #[test]
    fn test_preempt_depth() {
        let vcpu = vcpu(1);
        vcpu.preempt_inc();
        vcpu.preempt_inc();
        assert_eq!(vcpu.preempt_count(), 2);
        vcpu.preempt_dec();
        assert_eq!(vcpu.preempt_count(), 1);
    }

    #[test]
    fn test_saved_regs_roundtrip() {
        let vcpu = vcpu(1);
        vcpu.set_entry(0x8020_0000, 0x8400_0000);

        let mut frame = RegisterFrame::zeroed();
        vcpu.restore_regs(&mut frame);
        assert_eq!(frame.pc, 0x8020_0000);
        assert_eq!(frame.sp, 0x8400_0000);

        frame.gpr[1] = 0xdead_beef;
        vcpu.save_regs(&frame);
        let mut other = RegisterFrame::zeroed();
        vcpu.restore_regs(&mut other);
        assert_eq!(other.gpr[1], 0xdead_beef);
    }
}
