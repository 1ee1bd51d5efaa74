// Bounded-failure monitor for misbehaving hubs.
//
// Malformed inbound calls are never fatal. This only counts them and raises
// one error-level alarm per run of consecutive violations.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::error;

use hmccu_api::ProtocolViolation;

#[derive(Debug)]
pub(crate) struct ViolationMonitor {
    threshold: u64,
    total: AtomicU64,
    consecutive: AtomicU64,
    alarmed: AtomicBool,
}

impl ViolationMonitor {
    pub(crate) fn new(threshold: u32) -> Self {
        Self {
            threshold: u64::from(threshold.max(1)),
            total: AtomicU64::new(0),
            consecutive: AtomicU64::new(0),
            alarmed: AtomicBool::new(false),
        }
    }

    /// Count one violation; returns `true` if this one raised the alarm.
    pub(crate) fn record(&self, violation: &ProtocolViolation) -> bool {
        self.total.fetch_add(1, Ordering::Relaxed);
        let run = self.consecutive.fetch_add(1, Ordering::AcqRel) + 1;

        if run >= self.threshold && !self.alarmed.swap(true, Ordering::AcqRel) {
            error!(
                consecutive = run,
                last = %violation,
                "hub keeps sending malformed calls"
            );
            return true;
        }
        false
    }

    /// A well-formed event arrived; the current run is over.
    pub(crate) fn reset(&self) {
        self.consecutive.store(0, Ordering::Release);
        self.alarmed.store(false, Ordering::Release);
    }

    pub(crate) fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub(crate) fn consecutive(&self) -> u64 {
        self.consecutive.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation() -> ProtocolViolation {
        ProtocolViolation::Undecodable("junk".into())
    }

    #[test]
    fn alarms_once_per_run() {
        let monitor = ViolationMonitor::new(3);
        assert!(!monitor.record(&violation()));
        assert!(!monitor.record(&violation()));
        assert!(monitor.record(&violation()));
        assert!(!monitor.record(&violation()));
        assert_eq!(monitor.consecutive(), 4);

        monitor.reset();
        assert_eq!(monitor.consecutive(), 0);
        assert_eq!(monitor.total(), 4);

        monitor.record(&violation());
        monitor.record(&violation());
        assert!(monitor.record(&violation()));
    }
}
