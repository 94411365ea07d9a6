use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of "now" for every time read in the server.
///
/// Job end times, reservation windows and run-eligibility checks all go
/// through this trait, so a test can drive a whole scenario from a manual
/// clock instead of sleeping through it.
pub trait SystemClock: std::fmt::Debug + Send + Sync {
    /// Current time in whole seconds since the Unix epoch.
    fn now_s(&self) -> i64;
}

pub type SharedClock = Arc<dyn SystemClock>;

/// The real wall clock. The production implementation and the default for
/// the demo binary.
#[derive(Debug, Clone, Default)]
pub struct WallClock;

impl WallClock {
    pub fn shared() -> SharedClock {
        Arc::new(WallClock)
    }
}

impl SystemClock for WallClock {
    fn now_s(&self) -> i64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_secs() as i64
    }
}
