/// Unit tests for the job state machine, the hook registry and the array
/// aggregate derivation. The end-to-end scenarios live in `tests/`; here we
/// pin the transition rules in isolation.
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::domain::clock::SystemClock;
    use crate::domain::hook::event::{HookEventKind, HookOutcome, JobView};
    use crate::domain::hook::registry::HookRegistry;
    use crate::domain::hook::{FnHook, HookEvent};
    use crate::domain::ids::{HookName, Id, claim_reservation_name};
    use crate::domain::job::{JobState, Substate};
    use crate::domain::job_log::ServerLog;
    use crate::domain::server::{JobSubmission, ReservationSubmission, Server, ServerConfig};
    use crate::error::Error;

    /// A clock pinned to a fixed instant; enough for transition tests that
    /// never wait.
    #[derive(Debug)]
    struct FixedClock(i64);

    impl SystemClock for FixedClock {
        fn now_s(&self) -> i64 {
            self.0
        }
    }

    fn test_server() -> Server {
        let config = ServerConfig { job_history_enable: true, ..ServerConfig::default() };
        Server::new(config, Arc::new(FixedClock(1_000)))
    }

    #[test]
    fn test_state_and_substate_codes() {
        assert_eq!(JobState::Queued.code(), 'Q');
        assert_eq!(JobState::Running.code(), 'R');
        assert_eq!(JobState::Finished.code(), 'F');
        assert!(JobState::Finished.is_terminal());
        assert!(!JobState::Exiting.is_terminal());

        assert_eq!(Substate::Normal.numeric(), None);
        assert_eq!(Substate::RequeuePending.numeric(), Some(42));
        assert_eq!(Substate::Terminated.numeric(), Some(91));
    }

    #[test]
    fn test_submit_lands_in_queued() {
        let server = test_server();
        let job = server.submit_job(JobSubmission::new("user1", 3)).unwrap();
        assert_eq!(server.job_state_code(&job, false).unwrap(), 'Q');
        assert_eq!(server.job_substate(&job).unwrap(), None);
    }

    #[test]
    fn test_submit_rejects_malformed_requests() {
        let server = test_server();

        let mut no_cpus = JobSubmission::new("user1", 3);
        no_cpus.ncpus = 0;
        assert!(matches!(server.submit_job(no_cpus), Err(Error::ValidationError(_))));

        let negative = JobSubmission::new("user1", -1);
        assert!(matches!(server.submit_job(negative), Err(Error::ValidationError(_))));

        assert!(matches!(server.submit_job(JobSubmission::new("", 3)), Err(Error::ValidationError(_))));
    }

    #[test]
    fn test_invalid_transitions_leave_state_untouched() {
        let server = test_server();
        let job = server.submit_job(JobSubmission::new("user1", 3)).unwrap();

        // Not running yet: neither exit nor requeue applies.
        assert!(matches!(server.natural_exit(&job, 1_000), Err(Error::InvalidTransition { .. })));
        assert!(matches!(server.rerunjob(&job, false), Err(Error::InvalidTransition { .. })));
        assert_eq!(server.job_state_code(&job, false).unwrap(), 'Q');

        server.begin_run(&job).unwrap();
        server.natural_exit(&job, 1_003).unwrap();

        // Settled jobs refuse everything.
        assert!(matches!(server.begin_run(&job), Err(Error::InvalidTransition { .. })));
        assert!(matches!(server.natural_exit(&job, 1_004), Err(Error::InvalidTransition { .. })));
        assert_eq!(server.job_state_code(&job, true).unwrap(), 'F');
    }

    #[test]
    fn test_end_time_is_stamped_once() {
        let server = test_server();
        let job = server.submit_job(JobSubmission::new("user1", 3)).unwrap();
        server.begin_run(&job).unwrap();
        server.natural_exit(&job, 1_003).unwrap();
        assert_eq!(server.job_end_time(&job).unwrap(), Some(1_003));

        // A racing delete is an idempotent no-op and must not restamp.
        server.delete(&job, false).unwrap();
        assert_eq!(server.job_end_time(&job).unwrap(), Some(1_003));
        assert_eq!(server.job_substate(&job).unwrap(), None);
    }

    #[test]
    fn test_hold_and_release() {
        let server = test_server();
        let job = server.submit_job(JobSubmission::new("user1", 3)).unwrap();

        server.hold(&job).unwrap();
        assert_eq!(server.job_state_code(&job, false).unwrap(), 'H');
        assert!(matches!(server.begin_run(&job), Err(Error::InvalidTransition { .. })));

        server.release(&job).unwrap();
        assert_eq!(server.job_state_code(&job, false).unwrap(), 'Q');
        assert!(matches!(server.release(&job), Err(Error::InvalidTransition { .. })));
    }

    #[test]
    fn test_requeue_honors_the_no_rerun_attribute() {
        let server = test_server();
        let mut submission = JobSubmission::new("user1", 3);
        submission.rerunnable = false;
        let job = server.submit_job(submission).unwrap();
        server.begin_run(&job).unwrap();

        assert!(matches!(server.rerunjob(&job, false), Err(Error::ValidationError(_))));
        assert_eq!(server.job_state_code(&job, false).unwrap(), 'R');

        // force overrides the attribute, not the state machine.
        server.rerunjob(&job, true).unwrap();
        assert_eq!(server.job_state_code(&job, false).unwrap(), 'Q');
        assert_eq!(server.job_substate(&job).unwrap(), Some(42));
    }

    #[test]
    fn test_begin_run_refuses_array_parents() {
        let server = test_server();
        let (parent, _) = server.submit_array(JobSubmission::new("user1", 3), 2).unwrap();
        assert!(matches!(server.begin_run(&parent), Err(Error::InvalidTransition { .. })));
    }

    #[test]
    fn test_array_aggregate_is_derived_from_subjobs() {
        let server = test_server();
        let (parent, subjobs) = server.submit_array(JobSubmission::new("user1", 3), 2).unwrap();
        assert_eq!(server.job_state_code(&parent, false).unwrap(), 'Q');

        server.begin_run(&subjobs[0]).unwrap();
        assert_eq!(server.job_state_code(&parent, false).unwrap(), 'B');

        // A requeued subjob has still begun; the array stays begun.
        server.rerunjob(&subjobs[0], false).unwrap();
        assert_eq!(server.job_state_code(&parent, false).unwrap(), 'B');

        server.begin_run(&subjobs[0]).unwrap();
        server.natural_exit(&subjobs[0], 1_001).unwrap();
        server.begin_run(&subjobs[1]).unwrap();
        server.natural_exit(&subjobs[1], 1_002).unwrap();
        assert_eq!(server.job_state_code(&parent, true).unwrap(), 'F');
    }

    #[test]
    fn test_finished_jobs_hide_without_history() {
        let server = Server::new(ServerConfig::default(), Arc::new(FixedClock(1_000)));
        let job = server.submit_job(JobSubmission::new("user1", 3)).unwrap();
        server.begin_run(&job).unwrap();
        server.natural_exit(&job, 1_003).unwrap();

        assert!(matches!(server.job_state_code(&job, false), Err(Error::UnknownEntity(_))));
        // Even the history query fails while retention is off.
        assert!(matches!(server.job_state_code(&job, true), Err(Error::UnknownEntity(_))));
    }

    #[test]
    fn test_registry_administration() {
        let registry = HookRegistry::new();
        let name = HookName::new("audit");

        registry.create(name.clone(), HookEventKind::EndJob, true).unwrap();
        assert!(matches!(
            registry.create(name.clone(), HookEventKind::EndJob, true),
            Err(Error::AlreadyExists(_))
        ));

        // Created but not imported: invisible to dispatch.
        assert!(registry.snapshot(HookEventKind::EndJob).is_empty());

        registry.import(&name, Arc::new(FnHook::new(|e: &mut HookEvent| e.accept()))).unwrap();
        assert_eq!(registry.snapshot(HookEventKind::EndJob).len(), 1);

        registry.set_enabled(&name, false).unwrap();
        assert!(registry.snapshot(HookEventKind::EndJob).is_empty());
        registry.set_enabled(&name, true).unwrap();
        assert_eq!(registry.snapshot(HookEventKind::EndJob).len(), 1);

        registry.delete(&name).unwrap();
        assert!(matches!(registry.delete(&name), Err(Error::UnknownEntity(_))));
        assert!(matches!(
            registry.import(&name, Arc::new(FnHook::new(|e: &mut HookEvent| e.accept()))),
            Err(Error::UnknownEntity(_))
        ));
    }

    #[test]
    fn test_snapshot_preserves_registration_order() {
        let registry = HookRegistry::new();
        for hook in ["first", "second", "third"] {
            let name = HookName::new(hook);
            registry.create(name.clone(), HookEventKind::EndJob, true).unwrap();
            registry.import(&name, Arc::new(FnHook::new(|e: &mut HookEvent| e.accept()))).unwrap();
        }
        let order: Vec<String> = registry
            .snapshot(HookEventKind::EndJob)
            .iter()
            .map(|h| h.name.to_string())
            .collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_event_outcome_settles_once() {
        let log = Arc::new(ServerLog::new());
        let view = JobView {
            id: Id::new("1.batch"),
            state: JobState::Exiting,
            substate: None,
            owner: "user1".to_string(),
            queue: Id::new("workq"),
            end_time: 1_003,
            array: None,
            subjob_index: None,
            reservation: None,
        };
        let mut event = HookEvent::new(HookEventKind::EndJob, view, None, log);

        assert!(event.outcome().is_none());
        event.accept();
        event.reject("too late");
        assert_eq!(event.outcome(), Some(&HookOutcome::Accepted));
    }

    #[test]
    fn test_reservation_submission_validation() {
        let server = test_server();
        let backwards = ReservationSubmission::new("alice", 2_000, 1_000);
        assert!(matches!(server.submit_reservation(backwards), Err(Error::ValidationError(_))));
    }

    #[test]
    fn test_suggested_reservation_names_are_claimed_once() {
        let first = claim_reservation_name(Some("window-unit-test".to_string()), 900, "batch");
        assert_eq!(first.to_string(), "window-unit-test");

        let second = claim_reservation_name(Some("window-unit-test".to_string()), 901, "batch");
        assert_ne!(second.to_string(), "window-unit-test");
    }
}
