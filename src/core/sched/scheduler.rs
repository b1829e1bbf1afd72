//! Scheduler control block
//!
//! One [`Scheduler`] per physical CPU. All entry points run in interrupt
//! context on the owning CPU and never block: the spinlock around the
//! current-VCPU field only guards against reentrant access from a nested
//! interrupt, since no other CPU touches this control block. Collaborators
//! are injected, so an instance can be driven tick by tick in tests without
//! hardware.

use alloc::boxed::Box;
use alloc::sync::Arc;

use crate::arch::{CpuOps, RegisterFrame};
use crate::config::{SchedConfig, MAX_VCPUS};
use crate::core::irq::VcpuIrq;
use crate::core::sched::rr;
use crate::core::sync::SpinLock;
use crate::core::vmm::{Guest, Vcpu, VcpuDirectory, VcpuId, VcpuState};
use crate::drivers::base::timer::{TimerEvent, TimerFacility, TimerHandle};
use crate::Result;

/// Scheduling counters, one set per physical CPU.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerStats {
    /// Timer ticks processed
    pub ticks: u64,
    /// Context switches performed
    pub context_switches: u64,
    /// Ticks ignored because preemption was disabled
    pub preempt_suppressed: u64,
    /// Interrupts redirected into a reselection
    pub irq_redirects: u64,
}

/// Per-physical-CPU scheduler.
pub struct Scheduler {
    /// Hosting physical CPU
    pcpu: usize,
    /// Timing configuration
    config: SchedConfig,
    /// VCPU currently assigned to this CPU
    current: SpinLock<Option<VcpuId>>,
    /// Periodic tick event owned by this CPU
    timer_handle: SpinLock<Option<TimerHandle>>,
    /// Counters
    stats: SpinLock<SchedulerStats>,
    /// VCPU directory
    vcpus: Arc<dyn VcpuDirectory>,
    /// Context-switch and IRQ-mask port
    cpu: Arc<dyn CpuOps>,
    /// Timer event facility
    timers: Arc<dyn TimerFacility>,
    /// Interrupt delivery into the running VCPU
    vcpu_irq: Arc<dyn VcpuIrq>,
}

impl Scheduler {
    /// Bring up the scheduler for one physical CPU.
    ///
    /// Registers the periodic tick event and starts it with the configured
    /// period. Runs once per physical CPU at boot, before any VCPU is
    /// scheduled; fails only if the timer facility cannot take the event.
    pub fn init(
        pcpu: usize,
        config: SchedConfig,
        vcpus: Arc<dyn VcpuDirectory>,
        cpu: Arc<dyn CpuOps>,
        timers: Arc<dyn TimerFacility>,
        vcpu_irq: Arc<dyn VcpuIrq>,
    ) -> Result<Arc<Self>> {
        let sched = Arc::new(Self {
            pcpu,
            config,
            current: SpinLock::new(None),
            timer_handle: SpinLock::new(None),
            stats: SpinLock::new(SchedulerStats::default()),
            vcpus,
            cpu,
            timers,
            vcpu_irq,
        });

        let callback = {
            let sched = Arc::clone(&sched);
            Box::new(move |event: &TimerEvent, frame: &mut RegisterFrame| {
                sched.timer_event(event, frame)
            })
        };
        let handle = sched.timers.create_periodic_event("sched", callback)?;
        *sched.timer_handle.lock() = Some(handle);
        sched.timers.start(handle, sched.config.tick_period_ns);

        log::info!(
            "pcpu{}: scheduler online, tick period {} ns",
            pcpu,
            sched.config.tick_period_ns
        );
        Ok(sched)
    }

    /// Hosting physical CPU
    pub fn pcpu(&self) -> usize {
        self.pcpu
    }

    /// Snapshot of the scheduling counters
    pub fn stats(&self) -> SchedulerStats {
        *self.stats.lock()
    }

    /// Select and switch to the next READY VCPU.
    ///
    /// `frame` is the trapped register frame of the context executing when
    /// the scheduling decision was taken; on return it holds the selected
    /// VCPU's execution state.
    pub fn next(&self, frame: &mut RegisterFrame) {
        let cur_id = *self.current.lock();
        let cur = cur_id.and_then(|id| self.vcpus.vcpu(id));

        // Immutable snapshot of every VCPU's state for the selection step
        let mut states: heapless::Vec<VcpuState, MAX_VCPUS> = heapless::Vec::new();
        for id in 0..self.vcpus.vcpu_count().min(MAX_VCPUS) {
            let state = self.vcpus.vcpu(id).map_or(VcpuState::RESET, |v| v.state());
            let _ = states.push(state);
        }

        let next_id = match rr::select_next(&states, cur_id) {
            Some(id) => id,
            None => {
                // No VCPU to run: idle this physical CPU
                *self.current.lock() = None;
                log::trace!("pcpu{}: nothing runnable, idling", self.pcpu);
                return;
            }
        };
        let next = match self.vcpus.vcpu(next_id) {
            Some(vcpu) => vcpu,
            None => return,
        };

        // Context switch unless the current VCPU reselected itself
        if cur_id != Some(next_id) {
            match cur {
                Some(ref outgoing) if outgoing.state().is_saveable() => {
                    if outgoing.state().is_running() {
                        outgoing.set_state(VcpuState::READY);
                    }
                    self.cpu.switch_context(Some(outgoing.as_ref()), &next, frame);
                }
                _ => self.cpu.switch_context(None, &next, frame),
            }
            self.stats.lock().context_switches += 1;
            log::debug!("pcpu{}: switch {:?} -> vcpu{}", self.pcpu, cur_id, next_id);
        }

        next.reset_tick_pending();
        next.set_state(VcpuState::RUNNING);
        *self.current.lock() = Some(next_id);
    }

    /// Periodic tick handler, registered as the timer event callback.
    ///
    /// Charges one tick against the running VCPU's slice and reselects when
    /// the slice is exhausted. The event is re-armed unconditionally; slice
    /// accounting keeps running while preemption is disabled, only the
    /// reselection is held back.
    pub fn timer_event(&self, event: &TimerEvent, frame: &mut RegisterFrame) {
        self.stats.lock().ticks += 1;

        match self.current_vcpu() {
            Some(vcpu) => {
                if vcpu.preempt_count() != 0 {
                    self.stats.lock().preempt_suppressed += 1;
                } else if vcpu.tick_pending() == 0 {
                    self.next(frame);
                } else {
                    let left = vcpu.dec_tick_pending();
                    // Re-check after the decrement: an interrupt handler may
                    // have raised the count since this tick began, and the
                    // hook must never observe a preempted slice.
                    if let Some(tick_func) = vcpu.tick_func() {
                        if vcpu.preempt_count() == 0 {
                            tick_func(frame, left);
                        }
                    }
                }
            }
            None => self.next(frame),
        }

        self.timers.restart(event.handle);
    }

    /// Interrupt-path entry point.
    ///
    /// When the current VCPU was descheduled between the trap and this call,
    /// the interrupt is redirected into a reselection instead of being
    /// delivered to stale state.
    pub fn irq_process(&self, frame: &mut RegisterFrame) {
        let vcpu = match self.current_vcpu() {
            Some(vcpu) => vcpu,
            None => return,
        };

        if !vcpu.state().is_running() {
            self.stats.lock().irq_redirects += 1;
            log::debug!("pcpu{}: irq for descheduled vcpu{}, reselecting", self.pcpu, vcpu.id());
            self.next(frame);
            return;
        }

        self.vcpu_irq.process(&vcpu, frame);
    }

    /// VCPU currently assigned to this physical CPU.
    ///
    /// The only sanctioned cross-context read path; safe from interrupt
    /// context.
    pub fn current_vcpu(&self) -> Option<Arc<Vcpu>> {
        let current = self.current.lock();
        current.and_then(|id| self.vcpus.vcpu(id))
    }

    /// Guest owning the current VCPU, if any.
    pub fn current_guest(&self) -> Option<Arc<Guest>> {
        self.current_vcpu().and_then(|vcpu| vcpu.guest())
    }

    /// Disable preemption of the current VCPU.
    ///
    /// Nests; callers balance with [`Scheduler::preempt_enable`].
    pub fn preempt_disable(&self) {
        if let Some(vcpu) = self.current_vcpu() {
            let flags = self.cpu.irq_save();
            vcpu.preempt_inc();
            self.cpu.irq_restore(flags);
        }
    }

    /// Re-enable preemption of the current VCPU.
    pub fn preempt_enable(&self) {
        if let Some(vcpu) = self.current_vcpu() {
            if vcpu.preempt_count() != 0 {
                let flags = self.cpu.irq_save();
                vcpu.preempt_dec();
                self.cpu.irq_restore(flags);
            }
        }
    }
}
