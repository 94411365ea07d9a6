use serde::Deserialize;

use crate::domain::server::{JobSubmission, ReservationSubmission};
use crate::error::{Error, Result};

/// One job request as it arrives from the outside, before validation.
/// `arrayCount` > 0 turns the request into an array submission.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSubmissionDto {
    pub owner: String,
    pub queue: Option<String>,
    pub ncpus: Option<u32>,
    pub walltime_s: Option<i64>,
    pub rerunnable: Option<bool>,
    pub hold: Option<bool>,
    pub start_after: Option<i64>,
    pub array_count: Option<u32>,
}

impl JobSubmissionDto {
    pub fn into_submission(self) -> Result<JobSubmission> {
        let walltime_s = self
            .walltime_s
            .ok_or_else(|| Error::ValidationError(format!("job for '{}' is missing walltimeS", self.owner)))?;
        Ok(JobSubmission {
            owner: self.owner,
            queue: self.queue,
            ncpus: self.ncpus.unwrap_or(1),
            walltime_s,
            rerunnable: self.rerunnable.unwrap_or(true),
            hold: self.hold.unwrap_or(false),
            start_after: self.start_after,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationSubmissionDto {
    pub name: Option<String>,
    pub owner: String,
    pub ncpus: Option<u32>,
    pub start_time: i64,
    pub end_time: i64,
}

impl ReservationSubmissionDto {
    pub fn into_submission(self) -> ReservationSubmission {
        ReservationSubmission {
            name: self.name,
            owner: self.owner,
            ncpus: self.ncpus.unwrap_or(1),
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }
}

/// A whole submission file: reservations first (so jobs can name their
/// queues), then jobs.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionBatchDto {
    #[serde(default)]
    pub reservations: Vec<ReservationSubmissionDto>,
    #[serde(default)]
    pub jobs: Vec<JobSubmissionDto>,
}
