use lazy_static::lazy_static;
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Mutex;
use uuid::Uuid;

// All reservation names handed out in this process. Caller-suggested names
// are claimed here so that two reservations can never share an identity,
// even across server instances living in the same process.
lazy_static! {
    static ref CLAIMED_RESERVATION_NAMES: Mutex<HashSet<String>> = Mutex::new(HashSet::new());
}

/// A typed identifier. The phantom tag keeps a job name from being passed
/// where a hook or reservation name is expected.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Hash)]
pub struct Id<T> {
    pub id: String,
    _marker: PhantomData<T>,
}

impl<T> Id<T> {
    pub fn new(id: impl Into<String>) -> Self {
        Id { id: id.into(), _marker: PhantomData }
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl<T> From<Id<T>> for String {
    fn from(id_wrapper: Id<T>) -> Self {
        id_wrapper.id
    }
}

// "JobId: \"12.batch\"" reads better in dumps than the derived two-field
// struct output.
impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full_name = std::any::type_name::<T>();
        let clean_name = full_name.split("::").last().unwrap_or(full_name);
        write!(f, "{}: {:?}", clean_name.replace("Tag", "Id"), self.id)
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct JobTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct ReservationTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct HookTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct QueueTag;

pub type JobName = Id<JobTag>;
pub type ReservationName = Id<ReservationTag>;
pub type HookName = Id<HookTag>;
pub type QueueName = Id<QueueTag>;

/// Job id for a plain (non-array) job: `<seq>.<server>`.
pub fn single_job_name(seq: u64, server: &str) -> JobName {
    Id::new(format!("{}.{}", seq, server))
}

/// Job id for an array parent: `<seq>[].<server>`.
pub fn array_parent_name(seq: u64, server: &str) -> JobName {
    Id::new(format!("{}[].{}", seq, server))
}

/// Job id for one member of an array: `<seq>[<index>].<server>`.
pub fn subjob_name(seq: u64, index: u32, server: &str) -> JobName {
    Id::new(format!("{}[{}].{}", seq, index, server))
}

/// The dedicated queue a confirmed reservation binds: the leading component
/// of the reservation id (`R12.batch` -> `R12`).
pub fn reservation_queue(reservation: &ReservationName) -> QueueName {
    let head = reservation.as_str().split('.').next().unwrap_or(reservation.as_str());
    Id::new(head)
}

/// Picks the identity for a new reservation.
///
/// A caller-suggested name is honored when nobody claimed it yet. A taken
/// suggestion falls back to the generated `R<seq>.<server>` form, and if even
/// that collides (several servers in one process) a uuid-derived suffix is
/// appended until the name is free.
pub fn claim_reservation_name(suggested: Option<String>, seq: u64, server: &str) -> ReservationName {
    let mut claimed = match CLAIMED_RESERVATION_NAMES.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Reservation name set was poisoned, recovering data.");
            poisoned.into_inner()
        }
    };

    if let Some(name) = suggested {
        if !claimed.contains(&name) {
            claimed.insert(name.clone());
            return Id::new(name);
        }
        log::warn!("Reservation name '{}' is already in use, generating a new one.", name);
    }

    let mut candidate = format!("R{}.{}", seq, server);
    while claimed.contains(&candidate) {
        let suffix = Uuid::new_v4().to_string();
        candidate = format!("R{}-{}.{}", seq, &suffix[..8], server);
    }

    claimed.insert(candidate.clone());
    Id::new(candidate)
}
