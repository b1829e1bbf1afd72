//! Architecture support
//!
//! The scheduling core touches the hardware through two narrow seams: the
//! trapped register frame it shuffles between VCPUs, and local interrupt
//! masking around preemption-counter updates. Both are defined here, together
//! with [`LocalCpu`], the implementation backed by the hosting core.

use cfg_if::cfg_if;

use crate::core::vmm::Vcpu;

cfg_if! {
    if #[cfg(target_arch = "riscv64")] {
        /// General purpose registers captured in a trap frame.
        pub const NR_GPRS: usize = 32;
    } else if #[cfg(target_arch = "aarch64")] {
        /// General purpose registers captured in a trap frame (x0-x30).
        pub const NR_GPRS: usize = 31;
    } else {
        /// General purpose registers captured in a trap frame.
        pub const NR_GPRS: usize = 16;
    }
}

/// Register state of a trapped execution context.
///
/// This is the frame the trap entry path spills on the stack; the scheduler
/// treats it as opaque storage that the context-switch primitive copies in
/// and out of a VCPU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFrame {
    /// General purpose registers.
    pub gpr: [u64; NR_GPRS],
    /// Program counter at the trap site.
    pub pc: u64,
    /// Stack pointer at the trap site.
    pub sp: u64,
    /// Saved processor status word.
    pub status: u64,
}

impl RegisterFrame {
    /// An all-zero frame, the state of a freshly created VCPU.
    pub const fn zeroed() -> Self {
        Self {
            gpr: [0; NR_GPRS],
            pc: 0,
            sp: 0,
            status: 0,
        }
    }
}

impl Default for RegisterFrame {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Saved local-interrupt state returned by [`CpuOps::irq_save`].
///
/// Opaque to callers; only the arch port that produced it may interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqFlags(u64);

impl IrqFlags {
    /// Wrap a raw flags value. Intended for arch ports and test doubles.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw flags value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Low-level CPU operations the scheduler relies on.
///
/// All operations are infallible and non-suspending; they execute on the
/// physical CPU that owns the calling scheduler instance.
pub trait CpuOps: Send + Sync {
    /// Switch execution state from `from` (if any) to `to`.
    ///
    /// Saves the trapped `frame` into `from` and replaces it with `to`'s
    /// saved state, so that returning from the trap resumes `to`.
    fn switch_context(&self, from: Option<&Vcpu>, to: &Vcpu, frame: &mut RegisterFrame);

    /// Mask local interrupts, returning the previous state.
    fn irq_save(&self) -> IrqFlags;

    /// Restore local interrupts to a state returned by [`CpuOps::irq_save`].
    fn irq_restore(&self, flags: IrqFlags);
}

/// PSTATE.I bit within the aarch64 DAIF register.
#[cfg(target_arch = "aarch64")]
const DAIF_I: u64 = 1 << 7;

/// [`CpuOps`] backed by the hosting hart/core.
///
/// Context switching is a frame copy: the trap entry path has already spilled
/// the guest registers, so moving a VCPU on or off the CPU only moves data
/// between the trap frame and the VCPU's saved frame.
pub struct LocalCpu;

impl CpuOps for LocalCpu {
    fn switch_context(&self, from: Option<&Vcpu>, to: &Vcpu, frame: &mut RegisterFrame) {
        if let Some(vcpu) = from {
            vcpu.save_regs(frame);
        }
        to.restore_regs(frame);
    }

    fn irq_save(&self) -> IrqFlags {
        #[cfg(target_arch = "riscv64")]
        {
            let sie = riscv::register::sstatus::read().sie();
            unsafe { riscv::register::sstatus::clear_sie() };
            IrqFlags::from_raw(sie as u64)
        }

        #[cfg(target_arch = "aarch64")]
        {
            use tock_registers::interfaces::{Readable, Writeable};
            let daif = aarch64_cpu::registers::DAIF.get();
            aarch64_cpu::registers::DAIF.set(daif | DAIF_I);
            IrqFlags::from_raw(daif)
        }

        #[cfg(target_arch = "x86_64")]
        {
            let enabled = x86_64::instructions::interrupts::are_enabled();
            x86_64::instructions::interrupts::disable();
            IrqFlags::from_raw(enabled as u64)
        }

        #[cfg(not(any(
            target_arch = "riscv64",
            target_arch = "aarch64",
            target_arch = "x86_64"
        )))]
        {
            IrqFlags::from_raw(0)
        }
    }

    fn irq_restore(&self, flags: IrqFlags) {
        #[cfg(target_arch = "riscv64")]
        {
            if flags.raw() != 0 {
                unsafe { riscv::register::sstatus::set_sie() };
            }
        }

        #[cfg(target_arch = "aarch64")]
        {
            use tock_registers::interfaces::Writeable;
            aarch64_cpu::registers::DAIF.set(flags.raw());
        }

        #[cfg(target_arch = "x86_64")]
        {
            if flags.raw() != 0 {
                x86_64::instructions::interrupts::enable();
            }
        }

        #[cfg(not(any(
            target_arch = "riscv64",
            target_arch = "aarch64",
            target_arch = "x86_64"
        )))]
        {
            let _ = flags;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_frame() {
        let frame = RegisterFrame::zeroed();
        assert_eq!(frame.gpr, [0; NR_GPRS]);
        assert_eq!(frame.pc, 0);
        assert_eq!(frame, RegisterFrame::default());
    }

    #[test]
    fn test_irq_flags_roundtrip() {
        let flags = IrqFlags::from_raw(0x80);
        assert_eq!(flags.raw(), 0x80);
    }

    #[test]
    fn test_local_cpu_frame_switch() {
        use alloc::string::ToString;

        let from = Vcpu::new(0, "from".to_string(), None, 1, None);
        let to = Vcpu::new(1, "to".to_string(), None, 1, None);
        to.set_entry(0x4000, 0x8000);

        let mut frame = RegisterFrame::zeroed();
        frame.pc = 0x1234;
        LocalCpu.switch_context(Some(&from), &to, &mut frame);

        // incoming state replaced the trap frame
        assert_eq!(frame.pc, 0x4000);
        assert_eq!(frame.sp, 0x8000);

        // outgoing state was captured first
        let mut saved = RegisterFrame::zeroed();
        from.restore_regs(&mut saved);
        assert_eq!(saved.pc, 0x1234);
    }
}
