use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crate::domain::hook::event::{HookEvent, HookEventKind, HookOutcome, JobView, ReservationView};
use crate::domain::hook::registry::{HookRegistry, RegisteredHook};
use crate::domain::ids::HookName;
use crate::domain::job_log::ServerLog;

/// Why a hook body produced no usable outcome. Recorded as a rejection and
/// never escalated: a broken hook must not break job finalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookFailure {
    /// The body panicked before settling an outcome.
    Panicked(String),
    /// The body exceeded the execution budget, in milliseconds.
    TimedOut(u64),
}

impl fmt::Display for HookFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookFailure::Panicked(msg) => write!(f, "raised: {}", msg),
            HookFailure::TimedOut(ms) => write!(f, "timed out after {}ms", ms),
        }
    }
}

/// How one hook run resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookResolution {
    Accepted,
    Rejected(String),
    Failed(HookFailure),
}

impl HookResolution {
    /// Failures count as rejections for reporting.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, HookResolution::Accepted)
    }
}

/// Outcome summary of one dispatch, per hook in invocation order.
#[derive(Debug)]
pub struct DispatchReport {
    pub event: HookEventKind,
    pub results: Vec<(HookName, HookResolution)>,
}

impl DispatchReport {
    pub fn rejection_count(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_rejection()).count()
    }

    pub fn is_clean(&self) -> bool {
        self.rejection_count() == 0
    }
}

/// Runs the hooks subscribed to an event against one job's terminal
/// transition.
///
/// Dispatch blocks the issuing job's finalization, nothing else: each body
/// runs on its own worker thread and the dispatcher waits at most the
/// budget for it. A hung body leaks only its thread and is recorded as a
/// timeout rejection.
pub struct HookDispatcher {
    registry: Arc<HookRegistry>,
    log: Arc<ServerLog>,
    budget: Duration,
}

impl HookDispatcher {
    pub fn new(registry: Arc<HookRegistry>, log: Arc<ServerLog>, budget: Duration) -> Self {
        HookDispatcher { registry, log, budget }
    }

    /// Invokes every enabled hook for `kind`, in registration order, against
    /// the given job snapshot.
    ///
    /// Per hook, the job's log receives a "started" record, the optional
    /// reservation-context record, any records the body writes, a
    /// diagnostic when the run did not accept, and a "finished" record. The
    /// started record always precedes the finished one, and both land
    /// before the caller marks the job settled.
    pub fn dispatch(&self, kind: HookEventKind, job: JobView, reservation: Option<ReservationView>) -> DispatchReport {
        let hooks = self.registry.snapshot(kind);
        let mut results = Vec::with_capacity(hooks.len());

        for hook in hooks {
            self.log.append(&job.id, format!("{} hook '{}' started", kind, hook.name));
            if let Some(view) = &reservation {
                self.log.append(&job.id, format!("{} hook, resv:{}", kind, view.id));
                self.log.append(&job.id, format!("{} hook, resv_state:{:?}", kind, view.state));
            }

            let resolution = self.run_one(&hook, kind, &job, &reservation);
            match &resolution {
                HookResolution::Accepted => {}
                HookResolution::Rejected(reason) => {
                    self.log.append(&job.id, format!("{} hook '{}' rejected: {}", kind, hook.name, reason));
                }
                HookResolution::Failed(failure) => {
                    log::warn!("hook '{}' failed for {}: {}", hook.name, job.id, failure);
                    self.log.append(&job.id, format!("{} hook '{}' rejected: {}", kind, hook.name, failure));
                }
            }
            self.log.append(&job.id, format!("{} hook '{}' finished", kind, hook.name));

            results.push((hook.name.clone(), resolution));
        }

        DispatchReport { event: kind, results }
    }

    /// Runs one body under the execution budget.
    fn run_one(&self, hook: &RegisteredHook, kind: HookEventKind, job: &JobView, reservation: &Option<ReservationView>) -> HookResolution {
        let (tx, rx) = mpsc::channel();
        let body = hook.body.clone();
        let mut event = HookEvent::new(kind, job.clone(), reservation.clone(), self.log.clone());

        thread::spawn(move || {
            let run = panic::catch_unwind(AssertUnwindSafe(move || {
                body.execute(&mut event);
                event.into_outcome()
            }));
            // The receiver may have given up already; nothing to do then.
            let _ = tx.send(run.map_err(|payload| panic_message(payload.as_ref())));
        });

        match rx.recv_timeout(self.budget) {
            // A body that returned cleanly without settling the event falls
            // through to accept.
            Ok(Ok(None)) | Ok(Ok(Some(HookOutcome::Accepted))) => HookResolution::Accepted,
            Ok(Ok(Some(HookOutcome::Rejected(reason)))) => HookResolution::Rejected(reason),
            Ok(Err(panic_msg)) => HookResolution::Failed(HookFailure::Panicked(panic_msg)),
            Err(_) => HookResolution::Failed(HookFailure::TimedOut(self.budget.as_millis() as u64)),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unidentified panic payload".to_string()
    }
}
