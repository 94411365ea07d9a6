use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::domain::hook::event::ReservationView;
use crate::domain::ids::{QueueName, ReservationName, reservation_queue};
use crate::error::{Error, Result};

/// Lifecycle state of a reservation window.
///
/// `Unconfirmed` is the submission state, before the external resource
/// carve-out succeeds. The dedicated queue exists only from `Confirmed`
/// onward, and jobs bound to it may run only while the reservation is
/// `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationState {
    Unconfirmed,
    Confirmed,
    Running,
    Ended,
    /// Confirmed resources became partially unavailable. No new runs are
    /// admitted while degraded.
    Degraded,
}

#[derive(Debug)]
pub struct Reservation {
    pub name: ReservationName,
    pub state: ReservationState,
    pub owner: String,
    pub ncpus: u32,
    /// Window bounds in epoch seconds.
    pub start_time: i64,
    pub end_time: i64,
    /// Dedicated queue, assigned at confirmation.
    pub queue: Option<QueueName>,
}

#[derive(Debug)]
struct BindingInner {
    reservations: HashMap<ReservationName, Arc<RwLock<Reservation>>>,
    /// Confirmed queue name back to the owning reservation.
    queue_index: HashMap<QueueName, ReservationName>,
}

/// Tracks reservation windows and the queue each confirmed reservation
/// binds, and answers the one question the job lifecycle asks: may a job
/// bound to this reservation begin running right now?
#[derive(Debug)]
pub struct ReservationBinding {
    inner: RwLock<BindingInner>,
}

impl ReservationBinding {
    pub fn new() -> Self {
        ReservationBinding {
            inner: RwLock::new(BindingInner { reservations: HashMap::new(), queue_index: HashMap::new() }),
        }
    }

    /// Registers a newly submitted, still unconfirmed reservation.
    pub fn add(&self, reservation: Reservation) {
        let mut guard = self.inner.write().expect("RwLock poisoned");
        let name = reservation.name.clone();
        guard.reservations.insert(name, Arc::new(RwLock::new(reservation)));
    }

    fn entry(&self, name: &ReservationName) -> Result<Arc<RwLock<Reservation>>> {
        let guard = self.inner.read().expect("RwLock poisoned");
        guard
            .reservations
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownEntity(format!("reservation '{}'", name)))
    }

    /// Confirms the carve-out and binds the dedicated queue. The queue name
    /// becomes observable to job submission from here on.
    pub fn confirm(&self, name: &ReservationName) -> Result<QueueName> {
        let entry = self.entry(name)?;
        let queue = {
            let mut resv = entry.write().expect("RwLock poisoned");
            if resv.state != ReservationState::Unconfirmed {
                return Err(invalid(resv.state, "confirm", name));
            }
            let queue = reservation_queue(name);
            resv.state = ReservationState::Confirmed;
            resv.queue = Some(queue.clone());
            queue
        };

        let mut guard = self.inner.write().expect("RwLock poisoned");
        guard.queue_index.insert(queue.clone(), name.clone());
        log::info!("reservation {} confirmed, queue {}", name, queue);
        Ok(queue)
    }

    /// Opens the window: `Confirmed -> Running`.
    pub fn begin(&self, name: &ReservationName) -> Result<()> {
        let entry = self.entry(name)?;
        let mut resv = entry.write().expect("RwLock poisoned");
        if resv.state != ReservationState::Confirmed {
            return Err(invalid(resv.state, "begin", name));
        }
        resv.state = ReservationState::Running;
        log::info!("reservation {} running", name);
        Ok(())
    }

    /// Closes the window: `Running -> Ended`. Jobs still running inside the
    /// window are left alone; eviction is someone else's policy. No new run
    /// may bind to the queue afterwards.
    pub fn end(&self, name: &ReservationName) -> Result<()> {
        let entry = self.entry(name)?;
        let mut resv = entry.write().expect("RwLock poisoned");
        if resv.state != ReservationState::Running {
            return Err(invalid(resv.state, "end", name));
        }
        resv.state = ReservationState::Ended;
        log::info!("reservation {} ended", name);
        Ok(())
    }

    /// Marks confirmed resources as (partially) lost.
    pub fn degrade(&self, name: &ReservationName) -> Result<()> {
        let entry = self.entry(name)?;
        let mut resv = entry.write().expect("RwLock poisoned");
        match resv.state {
            ReservationState::Confirmed | ReservationState::Running => {
                resv.state = ReservationState::Degraded;
                log::warn!("reservation {} degraded", name);
                Ok(())
            }
            state => Err(invalid(state, "degrade", name)),
        }
    }

    pub fn state(&self, name: &ReservationName) -> Result<ReservationState> {
        Ok(self.entry(name)?.read().expect("RwLock poisoned").state)
    }

    /// The reservation owning `queue`, if that queue belongs to one.
    pub fn reservation_for_queue(&self, queue: &QueueName) -> Option<ReservationName> {
        let guard = self.inner.read().expect("RwLock poisoned");
        guard.queue_index.get(queue).cloned()
    }

    /// Whether a job bound to this reservation may begin running now.
    ///
    /// Not-yet-open windows are transient (`NotYetEligible`, retry later);
    /// ended or degraded reservations refuse permanently.
    pub fn check_run_eligibility(&self, name: &ReservationName) -> Result<()> {
        let entry = self.entry(name)?;
        let resv = entry.read().expect("RwLock poisoned");
        match resv.state {
            ReservationState::Running => Ok(()),
            ReservationState::Unconfirmed | ReservationState::Confirmed => Err(Error::NotYetEligible(
                name.to_string(),
                "reservation window has not opened".to_string(),
            )),
            ReservationState::Ended | ReservationState::Degraded => Err(invalid(resv.state, "begin_run under", name)),
        }
    }

    /// Snapshot for a hook event.
    pub fn view(&self, name: &ReservationName) -> Option<ReservationView> {
        let entry = self.entry(name).ok()?;
        let resv = entry.read().expect("RwLock poisoned");
        Some(ReservationView {
            id: resv.name.clone(),
            queue: resv.queue.clone().unwrap_or_else(|| reservation_queue(&resv.name)),
            state: resv.state,
            start_time: resv.start_time,
            end_time: resv.end_time,
        })
    }

    /// Window transitions that are due at `now`: reservations to begin and
    /// reservations to end. The execution driver applies them.
    pub fn due_transitions(&self, now: i64) -> (Vec<ReservationName>, Vec<ReservationName>) {
        let guard = self.inner.read().expect("RwLock poisoned");
        let mut to_begin = Vec::new();
        let mut to_end = Vec::new();
        for entry in guard.reservations.values() {
            let resv = entry.read().expect("RwLock poisoned");
            match resv.state {
                ReservationState::Confirmed if resv.start_time <= now => to_begin.push(resv.name.clone()),
                ReservationState::Running if resv.end_time <= now => to_end.push(resv.name.clone()),
                _ => {}
            }
        }
        (to_begin, to_end)
    }
}

impl Default for ReservationBinding {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid(state: ReservationState, op: &'static str, name: &ReservationName) -> Error {
    Error::InvalidTransition { op, id: name.to_string(), state: format!("{:?}", state) }
}
