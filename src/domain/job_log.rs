use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::ids::JobName;

/// One sequenced, job-correlated server-log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Global sequence number; the only ordering tests may rely on.
    pub seq: u64,
    pub job: JobName,
    pub message: String,
}

/// The queryable server log.
///
/// Append-only and process-local: every record is correlated to one job id,
/// globally sequenced, and mirrored to the `log` facade. Hook dispatch
/// writes its started/finished brackets here, and the scenario tests match
/// against it the way an operator would grep the real server log.
#[derive(Debug)]
pub struct ServerLog {
    records: RwLock<Vec<LogRecord>>,
    next_seq: AtomicU64,
}

impl ServerLog {
    pub fn new() -> Self {
        ServerLog { records: RwLock::new(Vec::new()), next_seq: AtomicU64::new(0) }
    }

    /// Appends one record for `job` and returns its sequence number.
    pub fn append(&self, job: &JobName, message: impl Into<String>) -> u64 {
        let message = message.into();
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        log::info!("{};{}", job, message);

        let mut guard = self.records.write().expect("RwLock poisoned");
        guard.push(LogRecord { seq, job: job.clone(), message });
        seq
    }

    /// All records for one job id, in sequence order.
    pub fn records_for(&self, job: &JobName) -> Vec<LogRecord> {
        let guard = self.records.read().expect("RwLock poisoned");
        guard.iter().filter(|r| &r.job == job).cloned().collect()
    }

    /// Sequence number of the first record for `job` containing `needle`.
    pub fn first_match(&self, job: &JobName, needle: &str) -> Option<u64> {
        let guard = self.records.read().expect("RwLock poisoned");
        guard.iter().find(|r| &r.job == job && r.message.contains(needle)).map(|r| r.seq)
    }

    pub fn has_match(&self, job: &JobName, needle: &str) -> bool {
        self.first_match(job, needle).is_some()
    }

    /// How many records for `job` contain `needle`.
    pub fn match_count(&self, job: &JobName, needle: &str) -> usize {
        let guard = self.records.read().expect("RwLock poisoned");
        guard.iter().filter(|r| &r.job == job && r.message.contains(needle)).count()
    }

    pub fn len(&self) -> usize {
        let guard = self.records.read().expect("RwLock poisoned");
        guard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ServerLog {
    fn default() -> Self {
        Self::new()
    }
}
