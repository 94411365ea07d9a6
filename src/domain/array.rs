use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::ids::JobName;
use crate::domain::job_store::JobStore;
use crate::error::{Error, Result};

/// Observable aggregate state of an array job.
///
/// Never stored: always derived from the subjobs, so it cannot drift from
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayState {
    /// No subjob has started yet.
    Queued,
    /// At least one subjob has reached `Running` and not all are settled.
    Begun,
    /// Every subjob is settled.
    Finished,
}

impl ArrayState {
    pub fn code(&self) -> char {
        match self {
            ArrayState::Queued => 'Q',
            ArrayState::Begun => 'B',
            ArrayState::Finished => 'F',
        }
    }
}

/// Owns the one-to-many relationship between an array parent and its
/// subjobs.
///
/// Membership is created atomically at array submission and immutable
/// afterwards. The aggregate state is a pure projection over the member
/// jobs' current states, recomputed on demand.
#[derive(Debug)]
pub struct JobArrayCoordinator {
    members: RwLock<HashMap<JobName, Vec<JobName>>>,
}

impl JobArrayCoordinator {
    pub fn new() -> Self {
        JobArrayCoordinator { members: RwLock::new(HashMap::new()) }
    }

    /// Records the fixed membership of a freshly submitted array.
    pub fn register(&self, parent: JobName, subjobs: Vec<JobName>) {
        let mut guard = self.members.write().expect("RwLock poisoned");
        guard.insert(parent, subjobs);
    }

    pub fn is_array(&self, parent: &JobName) -> bool {
        let guard = self.members.read().expect("RwLock poisoned");
        guard.contains_key(parent)
    }

    /// The ordered subjob ids of `parent`.
    pub fn subjobs(&self, parent: &JobName) -> Result<Vec<JobName>> {
        let guard = self.members.read().expect("RwLock poisoned");
        guard
            .get(parent)
            .cloned()
            .ok_or_else(|| Error::UnknownEntity(format!("array '{}'", parent)))
    }

    /// Derives the aggregate state from the member jobs as they are right
    /// now.
    ///
    /// Members are read one at a time; a member transitioning concurrently
    /// is observed either before or after its transition, never mid-way.
    pub fn aggregate_state(&self, parent: &JobName, store: &JobStore) -> Result<ArrayState> {
        let subjobs = self.subjobs(parent)?;

        let mut all_settled = true;
        let mut any_started = false;
        for name in &subjobs {
            let entry = store
                .get_by_name(name)
                .ok_or_else(|| Error::UnknownEntity(format!("subjob '{}'", name)))?;
            let job = entry.read().expect("RwLock poisoned");
            if !job.is_settled() {
                all_settled = false;
            }
            if job.has_started {
                any_started = true;
            }
        }

        if all_settled {
            Ok(ArrayState::Finished)
        } else if any_started {
            Ok(ArrayState::Begun)
        } else {
            Ok(ArrayState::Queued)
        }
    }
}

impl Default for JobArrayCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
