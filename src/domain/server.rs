use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::domain::array::JobArrayCoordinator;
use crate::domain::clock::SharedClock;
use crate::domain::hook::dispatcher::HookDispatcher;
use crate::domain::hook::event::HookEventKind;
use crate::domain::hook::registry::HookRegistry;
use crate::domain::hook::HookBody;
use crate::domain::ids::{
    HookName, Id, JobName, QueueName, ReservationName, array_parent_name, claim_reservation_name,
    single_job_name, subjob_name,
};
use crate::domain::job::{Job, JobKind, JobState, ResourceRequest};
use crate::domain::job_log::ServerLog;
use crate::domain::job_store::JobStore;
use crate::domain::lifecycle::JobLifecycle;
use crate::domain::reservation::{Reservation, ReservationBinding, ReservationState};
use crate::error::{Error, Result};

/// The queue jobs land on when the submission names none.
const DEFAULT_QUEUE: &str = "workq";

/// Server-wide knobs, the subset of the real scheduler's attributes this
/// core consumes.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Suffix of every job and reservation id handed out.
    pub server_name: String,
    /// When off, settled jobs answer queries as unknown, like a scheduler
    /// with history retention disabled.
    pub job_history_enable: bool,
    /// Execution budget per hook body.
    pub hook_budget_ms: u64,
    /// Capacity of the single node the execution driver simulates.
    pub node_ncpus: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            server_name: "batch".to_string(),
            job_history_enable: false,
            hook_budget_ms: 5_000,
            node_ncpus: 1,
        }
    }
}

/// A validated job submission request.
#[derive(Debug, Clone)]
pub struct JobSubmission {
    pub owner: String,
    /// Destination queue; `None` routes to the default queue. Naming a
    /// confirmed reservation's queue binds the job to that reservation.
    pub queue: Option<String>,
    pub ncpus: u32,
    pub walltime_s: i64,
    pub rerunnable: bool,
    pub hold: bool,
    pub start_after: Option<i64>,
}

impl JobSubmission {
    pub fn new(owner: impl Into<String>, walltime_s: i64) -> Self {
        JobSubmission {
            owner: owner.into(),
            queue: None,
            ncpus: 1,
            walltime_s,
            rerunnable: true,
            hold: false,
            start_after: None,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.owner.is_empty() {
            return Err(Error::ValidationError("job owner must not be empty".to_string()));
        }
        if self.ncpus == 0 {
            return Err(Error::ValidationError("job must request at least one cpu".to_string()));
        }
        if self.walltime_s < 0 {
            return Err(Error::ValidationError("job walltime must not be negative".to_string()));
        }
        Ok(())
    }
}

/// A validated reservation submission request.
#[derive(Debug, Clone)]
pub struct ReservationSubmission {
    /// Caller-suggested identity; honored when unused, replaced otherwise.
    pub name: Option<String>,
    pub owner: String,
    pub ncpus: u32,
    pub start_time: i64,
    pub end_time: i64,
}

impl ReservationSubmission {
    pub fn new(owner: impl Into<String>, start_time: i64, end_time: i64) -> Self {
        ReservationSubmission { name: None, owner: owner.into(), ncpus: 1, start_time, end_time }
    }

    fn validate(&self) -> Result<()> {
        if self.owner.is_empty() {
            return Err(Error::ValidationError("reservation owner must not be empty".to_string()));
        }
        if self.ncpus == 0 {
            return Err(Error::ValidationError("reservation must carve out at least one cpu".to_string()));
        }
        if self.start_time >= self.end_time {
            return Err(Error::ValidationError("reservation window must end after it starts".to_string()));
        }
        Ok(())
    }
}

/// The batch server core: owns the job store, the array coordinator, the
/// reservation binding, the hook registry and the server log, and exposes
/// the administrative surface the surrounding scheduler service drives.
pub struct Server {
    config: ServerConfig,
    clock: SharedClock,
    store: JobStore,
    arrays: Arc<JobArrayCoordinator>,
    reservations: Arc<ReservationBinding>,
    registry: Arc<HookRegistry>,
    log: Arc<ServerLog>,
    lifecycle: JobLifecycle,
    job_seq: AtomicU64,
    resv_seq: AtomicU64,
}

impl Server {
    pub fn new(config: ServerConfig, clock: SharedClock) -> Self {
        let store = JobStore::new();
        let arrays = Arc::new(JobArrayCoordinator::new());
        let reservations = Arc::new(ReservationBinding::new());
        let registry = Arc::new(HookRegistry::new());
        let log = Arc::new(ServerLog::new());
        let dispatcher = Arc::new(HookDispatcher::new(
            registry.clone(),
            log.clone(),
            Duration::from_millis(config.hook_budget_ms),
        ));
        let lifecycle = JobLifecycle::new(
            store.clone(),
            arrays.clone(),
            reservations.clone(),
            dispatcher,
            log.clone(),
            clock.clone(),
        );

        log::info!("batch server '{}' up", config.server_name);
        Server {
            config,
            clock,
            store,
            arrays,
            reservations,
            registry,
            log,
            lifecycle,
            job_seq: AtomicU64::new(1),
            resv_seq: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn clock_now(&self) -> i64 {
        self.clock.now_s()
    }

    /// The queryable server log.
    pub fn log(&self) -> Arc<ServerLog> {
        self.log.clone()
    }

    // ---- hook administration ----

    pub fn create_hook(&self, name: &str, event: HookEventKind, enabled: bool) -> Result<()> {
        self.registry.create(Id::new(name), event, enabled)
    }

    pub fn import_hook(&self, name: &str, body: Arc<dyn HookBody>) -> Result<()> {
        self.registry.import(&HookName::new(name), body)
    }

    pub fn delete_hook(&self, name: &str) -> Result<()> {
        self.registry.delete(&HookName::new(name))
    }

    pub fn enable_hook(&self, name: &str) -> Result<()> {
        self.registry.set_enabled(&HookName::new(name), true)
    }

    pub fn disable_hook(&self, name: &str) -> Result<()> {
        self.registry.set_enabled(&HookName::new(name), false)
    }

    // ---- submission ----

    /// Admits a single job and returns its id.
    pub fn submit_job(&self, submission: JobSubmission) -> Result<JobName> {
        submission.validate()?;
        let seq = self.job_seq.fetch_add(1, Ordering::SeqCst);
        let name = single_job_name(seq, &self.config.server_name);
        let job = self.build_job(name.clone(), JobKind::Single, &submission);
        let names = self.lifecycle.admit_batch(vec![job], submission.hold);
        Ok(names.into_iter().next().unwrap_or(name))
    }

    /// Admits an array of `subjob_count` subjobs in one atomic step.
    /// Returns the array id and the subjob ids in ordinal order.
    pub fn submit_array(&self, submission: JobSubmission, subjob_count: u32) -> Result<(JobName, Vec<JobName>)> {
        submission.validate()?;
        if subjob_count == 0 {
            return Err(Error::ValidationError("array must have at least one subjob".to_string()));
        }

        let seq = self.job_seq.fetch_add(1, Ordering::SeqCst);
        let parent_name = array_parent_name(seq, &self.config.server_name);

        let mut jobs = Vec::with_capacity(subjob_count as usize + 1);
        jobs.push(self.build_job(parent_name.clone(), JobKind::ArrayParent, &submission));
        let mut subjob_names = Vec::with_capacity(subjob_count as usize);
        for index in 0..subjob_count {
            let name = subjob_name(seq, index, &self.config.server_name);
            subjob_names.push(name.clone());
            jobs.push(self.build_job(name, JobKind::Subjob { array: parent_name.clone(), index }, &submission));
        }

        self.lifecycle.admit_batch(jobs, submission.hold);
        self.arrays.register(parent_name.clone(), subjob_names.clone());
        Ok((parent_name, subjob_names))
    }

    fn build_job(&self, name: JobName, kind: JobKind, submission: &JobSubmission) -> Job {
        let queue: QueueName = Id::new(submission.queue.clone().unwrap_or_else(|| DEFAULT_QUEUE.to_string()));
        let request = ResourceRequest { ncpus: submission.ncpus, walltime_s: submission.walltime_s };
        let mut job = Job::new(name, kind, submission.owner.clone(), queue.clone(), request);
        job.rerunnable = submission.rerunnable;
        job.start_after = submission.start_after;
        job.reservation = self.reservations.reservation_for_queue(&queue);
        job
    }

    /// Registers a reservation; it stays `Unconfirmed` until the external
    /// carve-out collaborator confirms it.
    pub fn submit_reservation(&self, submission: ReservationSubmission) -> Result<ReservationName> {
        submission.validate()?;
        let seq = self.resv_seq.fetch_add(1, Ordering::SeqCst);
        let name = claim_reservation_name(submission.name.clone(), seq, &self.config.server_name);
        self.reservations.add(Reservation {
            name: name.clone(),
            state: ReservationState::Unconfirmed,
            owner: submission.owner,
            ncpus: submission.ncpus,
            start_time: submission.start_time,
            end_time: submission.end_time,
            queue: None,
        });
        log::info!("reservation {} submitted", name);
        Ok(name)
    }

    // ---- reservation notifications from the carve-out collaborator ----

    /// Confirms the carve-out; the returned queue is now open for job
    /// submission.
    pub fn confirm_reservation(&self, name: &ReservationName) -> Result<QueueName> {
        self.reservations.confirm(name)
    }

    pub fn begin_reservation(&self, name: &ReservationName) -> Result<()> {
        self.reservations.begin(name)
    }

    pub fn end_reservation(&self, name: &ReservationName) -> Result<()> {
        self.reservations.end(name)
    }

    pub fn degrade_reservation(&self, name: &ReservationName) -> Result<()> {
        self.reservations.degrade(name)
    }

    // ---- lifecycle operations ----

    pub fn begin_run(&self, name: &JobName) -> Result<()> {
        self.lifecycle.begin_run(name)
    }

    pub fn natural_exit(&self, name: &JobName, end_time: i64) -> Result<()> {
        self.lifecycle.natural_exit(name, end_time)
    }

    /// Requeues a running job. `force` overrides the job's no-rerun
    /// attribute; it does not touch the hook-skip rule, which belongs to
    /// forced deletion only.
    pub fn rerunjob(&self, name: &JobName, force: bool) -> Result<()> {
        self.lifecycle.requeue(name, force)
    }

    /// Deletes a job or a whole array. Graceful deletion finalizes with
    /// hooks; `force` bypasses them.
    pub fn delete(&self, name: &JobName, force: bool) -> Result<()> {
        if self.arrays.is_array(name) {
            self.lifecycle.delete_array(name, force)
        } else {
            self.lifecycle.delete(name, force)
        }
    }

    pub fn hold(&self, name: &JobName) -> Result<()> {
        self.lifecycle.hold(name)
    }

    pub fn release(&self, name: &JobName) -> Result<()> {
        self.lifecycle.release(name)
    }

    // ---- queries ----

    /// Observable single-character state of a job or array.
    ///
    /// Array states are derived from the subjobs on every call. A settled
    /// job is only visible when history retention is configured on and the
    /// caller asked for history, as with the real scheduler's `-x` queries.
    pub fn job_state_code(&self, name: &JobName, include_history: bool) -> Result<char> {
        if self.arrays.is_array(name) {
            let aggregate = self.arrays.aggregate_state(name, &self.store)?;
            if aggregate.code() == 'F' {
                self.check_history_visible(name, include_history)?;
            }
            return Ok(aggregate.code());
        }

        let entry = self
            .store
            .get_by_name(name)
            .ok_or_else(|| Error::UnknownEntity(format!("job '{}'", name)))?;
        let state = entry.read().expect("RwLock poisoned").state;
        if state == JobState::Finished {
            self.check_history_visible(name, include_history)?;
        }
        Ok(state.code())
    }

    fn check_history_visible(&self, name: &JobName, include_history: bool) -> Result<()> {
        if include_history && self.config.job_history_enable {
            Ok(())
        } else {
            Err(Error::UnknownEntity(format!("job '{}' has finished", name)))
        }
    }

    /// Numeric substate code, e.g. 91 once a job was deleted. `None` while
    /// nothing unusual happened.
    pub fn job_substate(&self, name: &JobName) -> Result<Option<u16>> {
        let entry = self
            .store
            .get_by_name(name)
            .ok_or_else(|| Error::UnknownEntity(format!("job '{}'", name)))?;
        Ok(entry.read().expect("RwLock poisoned").substate.numeric())
    }

    /// How many runs a job has begun. A requeue plus restart counts twice.
    pub fn job_run_count(&self, name: &JobName) -> Result<u32> {
        let entry = self
            .store
            .get_by_name(name)
            .ok_or_else(|| Error::UnknownEntity(format!("job '{}'", name)))?;
        Ok(entry.read().expect("RwLock poisoned").run_count)
    }

    pub fn job_end_time(&self, name: &JobName) -> Result<Option<i64>> {
        let entry = self
            .store
            .get_by_name(name)
            .ok_or_else(|| Error::UnknownEntity(format!("job '{}'", name)))?;
        Ok(entry.read().expect("RwLock poisoned").end_time)
    }

    pub fn reservation_state(&self, name: &ReservationName) -> Result<ReservationState> {
        self.reservations.state(name)
    }

    pub fn job_names(&self) -> Vec<JobName> {
        self.store.names_in_submit_order()
    }

    // ---- execution-driver support ----

    /// Queued, directly runnable jobs (array parents never run themselves)
    /// with their cpu and walltime requests, in submission order.
    pub fn runnable_queued(&self) -> Vec<(JobName, u32, i64)> {
        let mut runnable = Vec::new();
        for name in self.store.names_in_submit_order() {
            let Some(entry) = self.store.get_by_name(&name) else { continue };
            let job = entry.read().expect("RwLock poisoned");
            if job.state == JobState::Queued && job.kind != JobKind::ArrayParent {
                runnable.push((name.clone(), job.request.ncpus, job.request.walltime_s));
            }
        }
        runnable
    }

    /// True once every job, array parents included, has settled.
    pub fn all_jobs_settled(&self) -> bool {
        for name in self.store.names_in_submit_order() {
            let Some(entry) = self.store.get_by_name(&name) else { continue };
            if !entry.read().expect("RwLock poisoned").is_settled() {
                return false;
            }
        }
        true
    }

    /// Reservation window transitions due at `now`.
    pub fn reservations_due(&self, now: i64) -> (Vec<ReservationName>, Vec<ReservationName>) {
        self.reservations.due_transitions(now)
    }

    /// Releases `Waiting` jobs whose requested start time has passed.
    pub fn release_waiting_due(&self, now: i64) -> usize {
        self.lifecycle.release_waiting_due(now)
    }
}
