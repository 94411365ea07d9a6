use std::sync::{Arc, Mutex};
use tokio::time::{Duration, sleep};

use crate::domain::ids::JobName;
use crate::domain::server::Server;

#[derive(Debug)]
struct RunningJob {
    name: JobName,
    ncpus: u32,
    ends_at: i64,
    /// The run ordinal this entry belongs to. A requeue bumps the job's
    /// counter, which invalidates the entry.
    run_id: u32,
}

/// What one driver step did, mostly for logging and assertions.
#[derive(Debug, Default)]
pub struct StepReport {
    pub started: Vec<JobName>,
    pub finished: Vec<JobName>,
    pub reservations_opened: usize,
    pub reservations_closed: usize,
}

/// Minimal stand-in for the run-and-reap side of the scheduler.
///
/// One node, `ncpus` capacity, FIFO over the queued jobs: starts what fits,
/// finishes what has used up its walltime, opens and closes reservation
/// windows on the way. It only ever calls the server's lifecycle
/// operations; the lifecycle stays the single source of truth.
pub struct ExecutionDriver {
    server: Arc<Server>,
    ncpus_total: u32,
    running: Mutex<Vec<RunningJob>>,
}

impl ExecutionDriver {
    pub fn new(server: Arc<Server>) -> Self {
        let ncpus_total = server.config().node_ncpus;
        ExecutionDriver { server, ncpus_total, running: Mutex::new(Vec::new()) }
    }

    /// Advances everything that is due at `now`.
    ///
    /// Order matters: windows first, then completions (freeing cpus), then
    /// waiting releases, then new starts.
    pub fn step(&self, now: i64) -> StepReport {
        let mut report = StepReport::default();

        let (to_begin, to_end) = self.server.reservations_due(now);
        for resv in to_begin {
            if self.server.begin_reservation(&resv).is_ok() {
                report.reservations_opened += 1;
            }
        }
        for resv in to_end {
            if self.server.end_reservation(&resv).is_ok() {
                report.reservations_closed += 1;
            }
        }

        self.finish_due(now, &mut report);
        self.server.release_waiting_due(now);
        self.start_runnable(now, &mut report);

        report
    }

    /// Completes running jobs whose walltime has elapsed. Jobs that were
    /// requeued or deleted behind the driver's back are simply dropped from
    /// the running set; the lifecycle already knows better than we do.
    fn finish_due(&self, now: i64, report: &mut StepReport) {
        let due: Vec<RunningJob> = {
            let mut running = self.running.lock().expect("Mutex poisoned");
            let (done, keep): (Vec<_>, Vec<_>) = running.drain(..).partition(|r| r.ends_at <= now);
            *running = keep;
            done
        };

        for entry in due {
            let stale = self.server.job_run_count(&entry.name).map(|count| count != entry.run_id).unwrap_or(true);
            if stale {
                log::debug!("dropping stale run of {}", entry.name);
                continue;
            }
            match self.server.natural_exit(&entry.name, now) {
                Ok(()) => report.finished.push(entry.name),
                Err(e) => log::debug!("skipping completion of {}: {}", entry.name, e),
            }
        }
    }

    /// Starts queued jobs FIFO while cpus remain. Jobs that are not yet
    /// eligible (reservation window closed) stay queued for a later step.
    fn start_runnable(&self, now: i64, report: &mut StepReport) {
        let mut running = self.running.lock().expect("Mutex poisoned");
        let mut free = self.ncpus_total.saturating_sub(running.iter().map(|r| r.ncpus).sum());

        for (name, ncpus, walltime_s) in self.server.runnable_queued() {
            if ncpus > free {
                continue;
            }
            match self.server.begin_run(&name) {
                Ok(()) => {
                    free -= ncpus;
                    let run_id = self.server.job_run_count(&name).unwrap_or(0);
                    running.push(RunningJob { name: name.clone(), ncpus, ends_at: now + walltime_s, run_id });
                    report.started.push(name);
                }
                Err(e) if e.is_transient() => log::debug!("{} not eligible yet: {}", name, e),
                Err(e) => log::debug!("not starting {}: {}", name, e),
            }
        }
    }

    /// Wall-clock loop: steps once a second until every job settled or
    /// `max_wait_s` elapsed. Returns whether the system drained.
    pub async fn run_until_idle(&self, max_wait_s: u64) -> bool {
        let deadline = self.server.clock_now() + max_wait_s as i64;
        loop {
            let now = self.server.clock_now();
            self.step(now);

            if self.server.all_jobs_settled() {
                return true;
            }
            if now >= deadline {
                log::warn!("execution driver giving up with unsettled jobs after {}s", max_wait_s);
                return false;
            }
            sleep(Duration::from_millis(1_000)).await;
        }
    }
}
