//! Configuration management
//!
//! Build-time defaults and the injectable runtime configuration for the
//! scheduling core. There is no ambient global configuration: callers pass a
//! [`SchedConfig`] to `Scheduler::init` explicitly, once per physical CPU.

/// Maximum number of VCPUs a directory may expose.
///
/// Bounds the fixed-capacity state snapshot taken on the tick path, so it is
/// a hard cap rather than a tunable.
pub const MAX_VCPUS: usize = 64;

/// Default scheduler tick period in nanoseconds (10 ms).
pub const TIMER_TICK_NS: u64 = 10_000_000;

/// Default ticks per time slice for a VCPU created without an explicit budget.
pub const DEFAULT_TICK_COUNT: u32 = 10;

/// Scheduler timing configuration, one per physical CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedConfig {
    /// Period of the scheduling tick in nanoseconds.
    pub tick_period_ns: u64,
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self {
            tick_period_ns: TIMER_TICK_NS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedConfig::default();
        assert_eq!(config.tick_period_ns, TIMER_TICK_NS);
    }
}
