mod clock_mock;

use std::sync::Arc;

use clock_mock::ManualClock;
use gridbatch::domain::exec_driver::ExecutionDriver;
use gridbatch::domain::server::{JobSubmission, Server, ServerConfig};
use gridbatch::error::Error;

const T0: i64 = 1_000;

fn test_server(clock: Arc<ManualClock>) -> Arc<Server> {
    let config = ServerConfig { job_history_enable: true, node_ncpus: 2, ..ServerConfig::default() };
    Arc::new(Server::new(config, clock))
}

#[test]
fn test_single_job_runs_to_completion() {
    let clock = ManualClock::new(T0);
    let server = test_server(clock.clone());
    let driver = ExecutionDriver::new(server.clone());

    let job = server.submit_job(JobSubmission::new("user1", 3)).unwrap();
    assert_eq!(server.job_state_code(&job, false).unwrap(), 'Q');

    driver.step(server.clock_now());
    assert_eq!(server.job_state_code(&job, false).unwrap(), 'R');

    // Not done yet after two of three seconds.
    clock.advance(2);
    driver.step(server.clock_now());
    assert_eq!(server.job_state_code(&job, false).unwrap(), 'R');

    clock.advance(1);
    driver.step(server.clock_now());
    assert_eq!(server.job_state_code(&job, true).unwrap(), 'F');
    assert_eq!(server.job_substate(&job).unwrap(), None);
    assert_eq!(server.job_end_time(&job).unwrap(), Some(T0 + 3));
}

#[test]
fn test_unknown_job_queries_fail() {
    let clock = ManualClock::new(T0);
    let server = test_server(clock.clone());
    let ghost = gridbatch::domain::ids::Id::new("999.batch");
    assert!(matches!(server.job_state_code(&ghost, true), Err(Error::UnknownEntity(_))));
    assert!(matches!(server.delete(&ghost, true), Err(Error::UnknownEntity(_))));
}

#[test]
fn test_delete_races_with_natural_exit_idempotently() {
    let clock = ManualClock::new(T0);
    let server = test_server(clock.clone());

    let job = server.submit_job(JobSubmission::new("user1", 1)).unwrap();
    server.begin_run(&job).unwrap();
    server.natural_exit(&job, T0 + 1).unwrap();

    // Both delete flavors are no-op successes on a settled job.
    server.delete(&job, false).unwrap();
    server.delete(&job, true).unwrap();
    assert_eq!(server.job_substate(&job).unwrap(), None);
    assert_eq!(server.job_end_time(&job).unwrap(), Some(T0 + 1));
}

#[test]
fn test_held_job_is_skipped_until_released() {
    let clock = ManualClock::new(T0);
    let server = test_server(clock.clone());
    let driver = ExecutionDriver::new(server.clone());

    let mut submission = JobSubmission::new("user1", 1);
    submission.hold = true;
    let job = server.submit_job(submission).unwrap();
    assert_eq!(server.job_state_code(&job, false).unwrap(), 'H');

    driver.step(server.clock_now());
    assert_eq!(server.job_state_code(&job, false).unwrap(), 'H');

    server.release(&job).unwrap();
    driver.step(server.clock_now());
    assert_eq!(server.job_state_code(&job, false).unwrap(), 'R');
}

#[test]
fn test_waiting_job_starts_once_its_time_arrives() {
    let clock = ManualClock::new(T0);
    let server = test_server(clock.clone());
    let driver = ExecutionDriver::new(server.clone());

    let mut submission = JobSubmission::new("user1", 1);
    submission.start_after = Some(T0 + 40);
    let job = server.submit_job(submission).unwrap();
    assert_eq!(server.job_state_code(&job, false).unwrap(), 'W');

    driver.step(server.clock_now());
    assert_eq!(server.job_state_code(&job, false).unwrap(), 'W');

    clock.set(T0 + 40);
    driver.step(server.clock_now());
    assert_eq!(server.job_state_code(&job, false).unwrap(), 'R');
}

/// Graceful delete of a parked job completes finalization without needing a
/// run first, for each of the parked states.
#[test]
fn test_graceful_delete_of_parked_jobs_finalizes() {
    let clock = ManualClock::new(T0);
    let server = test_server(clock.clone());

    let queued = server.submit_job(JobSubmission::new("user1", 1)).unwrap();

    let mut held = JobSubmission::new("user1", 1);
    held.hold = true;
    let held = server.submit_job(held).unwrap();

    let mut waiting = JobSubmission::new("user1", 1);
    waiting.start_after = Some(T0 + 500);
    let waiting = server.submit_job(waiting).unwrap();

    for job in [&queued, &held, &waiting] {
        server.delete(job, false).unwrap();
        assert_eq!(server.job_state_code(job, true).unwrap(), 'F');
        assert_eq!(server.job_substate(job).unwrap(), Some(91));
    }
}

#[test]
fn test_job_ids_carry_the_server_name() {
    let clock = ManualClock::new(T0);
    let server = test_server(clock.clone());

    let first = server.submit_job(JobSubmission::new("user1", 1)).unwrap();
    let second = server.submit_job(JobSubmission::new("user1", 1)).unwrap();
    assert!(first.to_string().ends_with(".batch"));
    assert!(second.to_string().ends_with(".batch"));
    assert_ne!(first, second);

    let (parent, subjobs) = server.submit_array(JobSubmission::new("user1", 1), 2).unwrap();
    assert!(parent.to_string().contains("[]"));
    assert!(subjobs[0].to_string().contains("[0]"));
    assert!(subjobs[1].to_string().contains("[1]"));
}
