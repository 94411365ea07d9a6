use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use gridbatch::domain::clock::SystemClock;

/// A clock the test advances by hand. Scenarios that would take minutes of
/// wall time run instantly against it.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Arc<ManualClock> {
        Arc::new(ManualClock { now: AtomicI64::new(start) })
    }

    #[allow(dead_code)]
    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl SystemClock for ManualClock {
    fn now_s(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
