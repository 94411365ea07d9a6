use std::sync::Arc;

use crate::domain::array::{ArrayState, JobArrayCoordinator};
use crate::domain::clock::SharedClock;
use crate::domain::hook::dispatcher::HookDispatcher;
use crate::domain::hook::event::{HookEventKind, JobView, ReservationView};
use crate::domain::ids::JobName;
use crate::domain::job::{Job, JobKind, JobState, Substate};
use crate::domain::job_log::ServerLog;
use crate::domain::job_store::JobStore;
use crate::domain::reservation::ReservationBinding;
use crate::error::{Error, Result};

/// How a job is being finalized. Decides the recorded substate and whether
/// the end-of-job hooks fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FinalizeMode {
    /// The job ran to completion on its own. Requires `Running`.
    Exit,
    /// All subjobs of an array settled; the parent follows them.
    ArrayComplete,
    /// Graceful delete: terminate now, with full bookkeeping.
    Delete,
    /// Emergency bypass: terminate without running any end-of-job hook.
    ForceDelete,
}

impl FinalizeMode {
    fn substate(&self) -> Substate {
        match self {
            FinalizeMode::Exit | FinalizeMode::ArrayComplete => Substate::Normal,
            FinalizeMode::Delete | FinalizeMode::ForceDelete => Substate::Terminated,
        }
    }
}

/// The per-job state machine, shared across all jobs.
///
/// Each operation takes the target job's own write lock for the state
/// change, so transitions on one job are mutually exclusive while distinct
/// jobs proceed independently. No job lock is ever held across hook
/// execution of another job, and the terminal transition is the single
/// choke point where the end-of-job hooks run.
pub struct JobLifecycle {
    store: JobStore,
    arrays: Arc<JobArrayCoordinator>,
    reservations: Arc<ReservationBinding>,
    dispatcher: Arc<HookDispatcher>,
    log: Arc<ServerLog>,
    clock: SharedClock,
}

impl JobLifecycle {
    pub fn new(
        store: JobStore,
        arrays: Arc<JobArrayCoordinator>,
        reservations: Arc<ReservationBinding>,
        dispatcher: Arc<HookDispatcher>,
        log: Arc<ServerLog>,
        clock: SharedClock,
    ) -> Self {
        JobLifecycle { store, arrays, reservations, dispatcher, log, clock }
    }

    fn entry(&self, name: &JobName) -> Result<Arc<std::sync::RwLock<Job>>> {
        self.store
            .get_by_name(name)
            .ok_or_else(|| Error::UnknownEntity(format!("job '{}'", name)))
    }

    /// Admits freshly constructed jobs: `Transit -> Queued`, then into
    /// `Held` or `Waiting` when the submission asked for it. One store
    /// insertion, so an array parent and its subjobs appear atomically.
    pub fn admit_batch(&self, mut jobs: Vec<Job>, hold: bool) -> Vec<JobName> {
        let now = self.clock.now_s();
        for job in &mut jobs {
            debug_assert_eq!(job.state, JobState::Transit);
            job.state = if hold {
                JobState::Held
            } else if job.start_after.is_some_and(|t| t > now) {
                JobState::Waiting
            } else {
                JobState::Queued
            };
        }

        let names: Vec<JobName> = jobs.iter().map(|j| j.name.clone()).collect();
        self.store.add_all(jobs);
        for name in &names {
            self.log.append(name, "Job submitted");
        }
        names
    }

    /// `Queued -> Running`. Fails with `NotYetEligible` while a bound
    /// reservation's window has not opened yet; the caller retries later.
    pub fn begin_run(&self, name: &JobName) -> Result<()> {
        let entry = self.entry(name)?;
        {
            let mut job = entry.write().expect("RwLock poisoned");
            if job.kind == JobKind::ArrayParent {
                return Err(invalid("begin_run", name, "array parent"));
            }
            if job.state != JobState::Queued {
                return Err(invalid_state("begin_run", name, job.state));
            }
            if let Some(resv) = job.reservation.clone() {
                self.reservations.check_run_eligibility(&resv)?;
            }
            job.state = JobState::Running;
            job.substate = Substate::Normal;
            job.has_started = true;
            job.run_count += 1;
        }
        self.log.append(name, "Job run");
        Ok(())
    }

    /// `Running -> Exiting -> Finished`, with the end-of-job hooks firing in
    /// between. The hook outcome is advisory: a rejection is recorded but
    /// never blocks the transition.
    pub fn natural_exit(&self, name: &JobName, end_time: i64) -> Result<()> {
        self.finalize(name, FinalizeMode::Exit, Some(end_time))?;
        self.settle_parent_if_complete(name);
        Ok(())
    }

    /// `Running -> Queued` with substate marking the requeue window. Not an
    /// end of job: no hook fires, and the job keeps its identity for the
    /// next run.
    pub fn requeue(&self, name: &JobName, force: bool) -> Result<()> {
        let entry = self.entry(name)?;
        {
            let mut job = entry.write().expect("RwLock poisoned");
            if job.state != JobState::Running {
                return Err(invalid_state("requeue", name, job.state));
            }
            if !job.rerunnable && !force {
                return Err(Error::ValidationError(format!("job '{}' is marked not rerunnable", name)));
            }
            job.substate = Substate::RequeuePending;
            job.state = JobState::Queued;
        }
        self.log.append(name, "Job requeued");
        Ok(())
    }

    /// Terminates a job now.
    ///
    /// Graceful deletion walks the same finalization path as a natural
    /// exit, hooks included; `force` bypasses the hooks entirely. Deleting
    /// a job that already settled is a no-op success.
    pub fn delete(&self, name: &JobName, force: bool) -> Result<()> {
        let mode = if force { FinalizeMode::ForceDelete } else { FinalizeMode::Delete };
        self.finalize(name, mode, None)?;
        self.settle_parent_if_complete(name);
        Ok(())
    }

    /// Deletes an array: fans the delete out to every subjob not already
    /// settled, best-effort, then finalizes the parent itself. Subjob
    /// failures are recorded and do not stop the fan-out; only a forced
    /// deletion escalates them, since no fallback path is left then.
    pub fn delete_array(&self, parent: &JobName, force: bool) -> Result<()> {
        let parent_entry = self.entry(parent)?;
        {
            let mut p = parent_entry.write().expect("RwLock poisoned");
            if p.is_settled() {
                return Ok(());
            }
            p.pending_delete = true;
        }

        let mode = if force { FinalizeMode::ForceDelete } else { FinalizeMode::Delete };
        let mut first_failure = None;
        for subjob in self.arrays.subjobs(parent)? {
            if let Err(e) = self.finalize(&subjob, mode, None) {
                log::warn!("delete of subjob {} failed: {}", subjob, e);
                self.log.append(&subjob, format!("delete failed: {}", e));
                if first_failure.is_none() {
                    first_failure = Some(e);
                }
            }
        }

        self.finalize(parent, mode, None)?;
        {
            let mut p = parent_entry.write().expect("RwLock poisoned");
            p.pending_delete = false;
        }

        match (force, first_failure) {
            (true, Some(e)) => Err(e),
            _ => Ok(()),
        }
    }

    /// `Queued/Waiting -> Held`.
    pub fn hold(&self, name: &JobName) -> Result<()> {
        let entry = self.entry(name)?;
        {
            let mut job = entry.write().expect("RwLock poisoned");
            match job.state {
                JobState::Queued | JobState::Waiting => job.state = JobState::Held,
                state => return Err(invalid_state("hold", name, state)),
            }
        }
        self.log.append(name, "Job held");
        Ok(())
    }

    /// `Held -> Queued`.
    pub fn release(&self, name: &JobName) -> Result<()> {
        let entry = self.entry(name)?;
        {
            let mut job = entry.write().expect("RwLock poisoned");
            if job.state != JobState::Held {
                return Err(invalid_state("release", name, job.state));
            }
            job.state = JobState::Queued;
        }
        self.log.append(name, "Job released");
        Ok(())
    }

    /// Moves `Waiting` jobs whose requested start time has passed back to
    /// `Queued`. Returns how many were released.
    pub fn release_waiting_due(&self, now: i64) -> usize {
        let mut released = 0;
        for name in self.store.names_in_submit_order() {
            let Some(entry) = self.store.get_by_name(&name) else { continue };
            let mut job = entry.write().expect("RwLock poisoned");
            if job.state == JobState::Waiting && job.start_after.is_some_and(|t| t <= now) {
                job.state = JobState::Queued;
                released += 1;
            }
        }
        released
    }

    /// The terminal transition. All four termination paths funnel through
    /// here, which is what makes the hook contract per terminal transition
    /// exactly-once-unless-bypassed.
    fn finalize(&self, name: &JobName, mode: FinalizeMode, end_time: Option<i64>) -> Result<()> {
        let entry = self.entry(name)?;

        if mode == FinalizeMode::ForceDelete {
            // Emergency path: straight to settled, no hooks, no Exiting
            // window.
            let mut job = entry.write().expect("RwLock poisoned");
            if job.is_settled() || job.state == JobState::Exiting {
                return Ok(());
            }
            job.substate = Substate::Terminated;
            if job.end_time.is_none() {
                job.end_time = Some(end_time.unwrap_or_else(|| self.clock.now_s()));
            }
            job.state = JobState::Finished;
            drop(job);
            // Worded without "hook": the bypass leaves no hook trace at all.
            self.log.append(name, "Job deleted (forced)");
            return Ok(());
        }

        // Phase 1: claim the terminal transition. Entering `Exiting` under
        // the job's lock is what keeps dispatch from ever running twice for
        // the same termination.
        let (job_view, resv_view, stamped_end) = {
            let mut job = entry.write().expect("RwLock poisoned");
            match (job.state, mode) {
                (JobState::Running, _) => {}
                // A natural exit is only ever valid from Running.
                (state, FinalizeMode::Exit) => return Err(invalid_state("natural_exit", name, state)),
                // Delete paths racing an in-flight finalization are
                // idempotent no-ops.
                (JobState::Finished | JobState::Exiting, _) => return Ok(()),
                (_, _) => {}
            }
            let stamped_end = end_time.unwrap_or_else(|| self.clock.now_s());
            job.state = JobState::Exiting;

            let (array, subjob_index) = match &job.kind {
                JobKind::Subjob { array, index } => (Some(array.clone()), Some(*index)),
                _ => (None, None),
            };
            let view = JobView {
                id: job.name.clone(),
                state: JobState::Exiting,
                substate: mode.substate().numeric(),
                owner: job.owner.clone(),
                queue: job.queue.clone(),
                end_time: stamped_end,
                array,
                subjob_index,
                reservation: job.reservation.clone(),
            };
            let resv_view: Option<ReservationView> =
                job.reservation.as_ref().and_then(|r| self.reservations.view(r));
            (view, resv_view, stamped_end)
        };

        // Phase 2: hooks, with no job lock held. Blocking only this job's
        // finalization; everyone else keeps transitioning.
        self.dispatcher.dispatch(HookEventKind::EndJob, job_view, resv_view);

        // Phase 3: settle.
        {
            let mut job = entry.write().expect("RwLock poisoned");
            job.substate = mode.substate();
            if job.end_time.is_none() {
                job.end_time = Some(stamped_end);
            }
            job.state = JobState::Finished;
        }
        self.log.append(
            name,
            match mode {
                FinalizeMode::Delete => "Job deleted",
                _ => "Job finished",
            },
        );
        Ok(())
    }

    /// After a subjob settles, derive the parent's aggregate and finalize
    /// the parent once every member is done. Skipped while an array delete
    /// is fanning out; `delete_array` finalizes the parent itself.
    fn settle_parent_if_complete(&self, name: &JobName) {
        let Some(entry) = self.store.get_by_name(name) else { return };
        let parent = {
            let job = entry.read().expect("RwLock poisoned");
            match &job.kind {
                JobKind::Subjob { array, .. } => array.clone(),
                _ => return,
            }
        };

        let Some(parent_entry) = self.store.get_by_name(&parent) else { return };
        {
            let p = parent_entry.read().expect("RwLock poisoned");
            if p.is_settled() || p.pending_delete {
                return;
            }
        }

        if let Ok(ArrayState::Finished) = self.arrays.aggregate_state(&parent, &self.store) {
            let _ = self.finalize(&parent, FinalizeMode::ArrayComplete, None);
        }
    }
}

fn invalid_state(op: &'static str, name: &JobName, state: JobState) -> Error {
    Error::InvalidTransition { op, id: name.to_string(), state: format!("{:?}", state) }
}

fn invalid(op: &'static str, name: &JobName, state: &str) -> Error {
    Error::InvalidTransition { op, id: name.to_string(), state: state.to_string() }
}
