use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::ids::{JobName, QueueName, ReservationName};
use crate::domain::job::JobState;
use crate::domain::job_log::ServerLog;
use crate::domain::reservation::ReservationState;

/// Scheduler events a hook can subscribe to. Only end-of-job exists today;
/// the enum keeps registration and dispatch honest about which event a hook
/// was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEventKind {
    EndJob,
}

impl fmt::Display for HookEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookEventKind::EndJob => write!(f, "endjob"),
        }
    }
}

/// Terminal outcome of one hook body run. For the end-of-job event a
/// rejection is observational: it is recorded against the job but never
/// blocks finalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    Accepted,
    Rejected(String),
}

/// Read-only snapshot of the job at the firing transition.
#[derive(Debug, Clone)]
pub struct JobView {
    pub id: JobName,
    pub state: JobState,
    pub substate: Option<u16>,
    pub owner: String,
    pub queue: QueueName,
    /// The end time the terminal transition is about to record.
    pub end_time: i64,
    /// Array parent id and ordinal, when the job is a subjob.
    pub array: Option<JobName>,
    pub subjob_index: Option<u32>,
    pub reservation: Option<ReservationName>,
}

/// Read-only snapshot of the reservation a job is bound to, if any.
#[derive(Debug, Clone)]
pub struct ReservationView {
    pub id: ReservationName,
    pub queue: QueueName,
    pub state: ReservationState,
    pub start_time: i64,
    pub end_time: i64,
}

/// The ephemeral context handed to a hook body.
///
/// Created fresh per dispatch. The body sees the job (and reservation) as
/// they were at the firing transition, may append its own job-correlated
/// log records, and settles exactly one `accept`/`reject` outcome; calls
/// after the first are ignored.
pub struct HookEvent {
    pub event_id: String,
    pub kind: HookEventKind,
    pub job: JobView,
    pub reservation: Option<ReservationView>,
    log: Arc<ServerLog>,
    outcome: Option<HookOutcome>,
}

impl HookEvent {
    pub(crate) fn new(kind: HookEventKind, job: JobView, reservation: Option<ReservationView>, log: Arc<ServerLog>) -> Self {
        HookEvent { event_id: Uuid::new_v4().to_string(), kind, job, reservation, log, outcome: None }
    }

    /// Settles the outcome as accepted. A no-op if already settled.
    pub fn accept(&mut self) {
        if self.outcome.is_some() {
            log::debug!("hook event {} already settled, ignoring accept()", self.event_id);
            return;
        }
        self.outcome = Some(HookOutcome::Accepted);
    }

    /// Settles the outcome as rejected. A no-op if already settled.
    pub fn reject(&mut self, reason: impl Into<String>) {
        if self.outcome.is_some() {
            log::debug!("hook event {} already settled, ignoring reject()", self.event_id);
            return;
        }
        self.outcome = Some(HookOutcome::Rejected(reason.into()));
    }

    /// Appends a record correlated to the event's job, the way hook code in
    /// the real scheduler writes to the server log.
    pub fn log_job_msg(&self, message: impl Into<String>) {
        self.log.append(&self.job.id, message);
    }

    pub fn outcome(&self) -> Option<&HookOutcome> {
        self.outcome.as_ref()
    }

    pub(crate) fn into_outcome(self) -> Option<HookOutcome> {
        self.outcome
    }
}

impl fmt::Debug for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookEvent")
            .field("event_id", &self.event_id)
            .field("kind", &self.kind)
            .field("job", &self.job.id)
            .field("outcome", &self.outcome)
            .finish()
    }
}
