//! Component I: the clock capability seam. Production code never calls
//! `SystemTime::now()` directly — every timestamp flows through a `Clock`
//! so the simulation harness (`betrace-sim`) can substitute a virtual
//! clock and drive the exact same code paths deterministically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    /// Nanoseconds since the Unix epoch.
    fn now_ns(&self) -> u64;
}

/// Wires to the OS clock. The only production implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ns(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the Unix epoch")
            .as_nanos() as u64
    }
}

/// A clock whose value is set explicitly, used by unit tests that need a
/// fixed `now` without pulling in the full simulation harness.
#[derive(Debug, Default)]
pub struct FixedClock {
    now_ns: AtomicU64,
}

impl FixedClock {
    pub fn new(now_ns: u64) -> Self {
        Self {
            now_ns: AtomicU64::new(now_ns),
        }
    }

    pub fn set(&self, now_ns: u64) {
        self.now_ns.store(now_ns, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ns: u64) {
        self.now_ns.fetch_add(delta_ns, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
}
