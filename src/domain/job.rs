use crate::domain::ids::{JobName, QueueName, ReservationName};

/// Primary lifecycle state of a job or subjob.
///
/// The forward path is `Transit -> Queued -> Running -> Exiting -> Finished`,
/// with `Held` and `Waiting` as parking positions between admission and the
/// first run. `Finished` is terminal; nothing ever leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Submission accepted, not yet routed to a queue.
    Transit,
    /// Eligible for dispatch as soon as resources (and a bound reservation
    /// window, if any) allow it.
    Queued,
    /// Parked by an explicit hold; released back to `Queued`.
    Held,
    /// Parked until a requested start time arrives.
    Waiting,
    /// Executing.
    Running,
    /// Terminal bookkeeping in progress; end-of-job hooks run here.
    Exiting,
    /// Settled. Visible to queries only when history retention is on.
    Finished,
}

impl JobState {
    /// Single-character state code as reported to external queries.
    pub fn code(&self) -> char {
        match self {
            JobState::Transit => 'T',
            JobState::Queued => 'Q',
            JobState::Held => 'H',
            JobState::Waiting => 'W',
            JobState::Running => 'R',
            JobState::Exiting => 'E',
            JobState::Finished => 'F',
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Finished)
    }
}

/// Secondary refinement of how the primary state was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Substate {
    /// Nothing unusual; tracks the primary state.
    Normal,
    /// A requeue was issued and the job has not been restarted yet.
    RequeuePending,
    /// The job was terminated by a delete rather than by its own exit.
    Terminated,
}

impl Substate {
    /// Numeric code reported to external queries. `Normal` reports none.
    pub fn numeric(&self) -> Option<u16> {
        match self {
            Substate::Normal => None,
            Substate::RequeuePending => Some(42),
            Substate::Terminated => Some(91),
        }
    }
}

/// Whether a job stands alone, fronts an array, or is one array member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    Single,
    /// The array-level job. Never runs itself; its observable state is a
    /// projection of its subjobs.
    ArrayParent,
    Subjob { array: JobName, index: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    pub ncpus: u32,
    /// Requested run duration in seconds; the execution driver completes the
    /// job once this much time has passed after the run began.
    pub walltime_s: i64,
}

/// One job or subjob. Array parents are jobs too, with `JobKind::ArrayParent`.
///
/// Every `Job` lives behind its own lock in the store, which is what makes
/// transitions mutually exclusive per job.
#[derive(Debug)]
pub struct Job {
    pub name: JobName,
    pub kind: JobKind,
    pub state: JobState,
    pub substate: Substate,
    pub owner: String,
    pub queue: QueueName,
    pub request: ResourceRequest,

    /// Back-reference to the reservation whose queue this job was routed to.
    /// Non-owning; the binding is looked up by id at eligibility checks.
    pub reservation: Option<ReservationName>,

    /// Stamped exactly once, when the job settles into `Finished`.
    pub end_time: Option<i64>,

    /// Whether `Running` was ever reached. Feeds the array `Begun`
    /// derivation and survives a requeue.
    pub has_started: bool,

    /// How many times a run began. Lets the execution driver tell a live
    /// run apart from one that was interrupted by a requeue.
    pub run_count: u32,

    /// A requeue may only be forced past this when the caller says so.
    pub rerunnable: bool,

    /// Requested earliest start time; the job waits until it passes.
    pub start_after: Option<i64>,

    /// Set while an array delete fans out over the subjobs, so the
    /// aggregate recomputation does not finalize the parent out from under
    /// the fan-out.
    pub pending_delete: bool,
}

impl Job {
    pub fn new(name: JobName, kind: JobKind, owner: String, queue: QueueName, request: ResourceRequest) -> Self {
        Job {
            name,
            kind,
            state: JobState::Transit,
            substate: Substate::Normal,
            owner,
            queue,
            request,
            reservation: None,
            end_time: None,
            has_started: false,
            run_count: 0,
            rerunnable: true,
            start_after: None,
            pending_delete: false,
        }
    }

    /// True once the job can never transition again.
    pub fn is_settled(&self) -> bool {
        self.state.is_terminal()
    }
}
