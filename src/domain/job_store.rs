use slotmap::{SlotMap, new_key_type};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::domain::ids::JobName;
use crate::domain::job::Job;

new_key_type! {
    pub struct JobKey;
}

#[derive(Debug)]
struct StoreInner {
    /// Job storage. Each entry carries its own lock: taking a job's write
    /// lock is what serializes transitions on that job.
    slots: SlotMap<JobKey, Arc<RwLock<Job>>>,

    /// Lookup of the internal key by external job id.
    name_index: HashMap<JobName, JobKey>,

    /// Keys in submission order, for FIFO dispatch scans.
    submit_order: Vec<JobKey>,
}

/// Shared store of every job the server knows about, array parents and
/// subjobs included. Jobs are never removed; the history-visibility rule is
/// applied at query time instead.
#[derive(Debug, Clone)]
pub struct JobStore {
    /// Both indexes are protected with a single lock. The per-job locks
    /// live inside the entries.
    inner: Arc<RwLock<StoreInner>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner {
                slots: SlotMap::with_key(),
                name_index: HashMap::new(),
                submit_order: Vec::new(),
            })),
        }
    }

    /// Adds one job.
    pub fn add(&self, job: Job) -> JobKey {
        self.add_all(vec![job])[0]
    }

    /// Adds a batch of jobs in one step, under one write lock. Array
    /// submission uses this so the parent and every subjob become visible
    /// atomically.
    pub fn add_all(&self, jobs: Vec<Job>) -> Vec<JobKey> {
        let mut guard = self.inner.write().expect("RwLock poisoned");
        let mut keys = Vec::with_capacity(jobs.len());
        for job in jobs {
            let name = job.name.clone();
            let key = guard.slots.insert(Arc::new(RwLock::new(job)));
            guard.name_index.insert(name, key);
            guard.submit_order.push(key);
            keys.push(key);
        }
        keys
    }

    pub fn get(&self, key: JobKey) -> Option<Arc<RwLock<Job>>> {
        let guard = self.inner.read().expect("RwLock poisoned");
        guard.slots.get(key).cloned()
    }

    pub fn get_by_name(&self, name: &JobName) -> Option<Arc<RwLock<Job>>> {
        let guard = self.inner.read().expect("RwLock poisoned");
        let key = guard.name_index.get(name)?;
        guard.slots.get(*key).cloned()
    }

    pub fn contains(&self, name: &JobName) -> bool {
        let guard = self.inner.read().expect("RwLock poisoned");
        guard.name_index.contains_key(name)
    }

    /// Names of all jobs in submission order.
    pub fn names_in_submit_order(&self) -> Vec<JobName> {
        let guard = self.inner.read().expect("RwLock poisoned");
        guard
            .submit_order
            .iter()
            .filter_map(|key| guard.slots.get(*key))
            .map(|entry| entry.read().expect("RwLock poisoned").name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        let guard = self.inner.read().expect("RwLock poisoned");
        guard.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}
