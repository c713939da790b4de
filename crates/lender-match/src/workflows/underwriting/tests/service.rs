use super::common::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::config::UnderwritingConfig;
use crate::workflows::underwriting::domain::{LenderProgramId, LoanRequestId, MatchRunId};
use crate::workflows::underwriting::evaluation::{EngineFault, FaultKind, MatchResult};
use crate::workflows::underwriting::repository::{MatchRun, RepositoryError, RunStatus};
use crate::workflows::underwriting::{UnderwritingService, UnderwritingServiceError};

fn program_ids(run: &MatchRun) -> Vec<u64> {
    run.results
        .iter()
        .map(|result| result.lender_program_id.0)
        .collect()
}

#[tokio::test]
async fn run_completes_with_results_ordered_by_program() {
    let directory = standard_directory()
        .with_program(program(9, 1_000.0, 90_000.0), Some(standard_policy(9)))
        .with_program(program(5, 1_000.0, 90_000.0), Some(standard_policy(5)));
    let (service, _, runs) = build_service(directory);

    let run = service.run_match(LOAN).await.expect("run completes");

    assert_eq!(run.status, RunStatus::Complete);
    assert_eq!(program_ids(&run), vec![1, 2, 5, 9]);
    assert!(run.completed_at.is_some());
    assert!(run
        .results
        .iter()
        .all(|result| result.eligible && result.fit_score == 85.0));

    let stored = service.get_match_run(run.id).expect("run stored");
    assert_eq!(stored, run);
    assert_eq!(runs.runs.lock().expect("repository mutex poisoned").len(), 1);
}

#[tokio::test]
async fn pre_gate_excludes_programs_entirely() {
    let directory = MemoryDirectory::default()
        .with_application(LOAN, application_with_amount(5_000.0))
        .with_program(program(1, 10_000.0, 100_000.0), Some(standard_policy(1)))
        .with_program(program(2, 1_000.0, 50_000.0), Some(standard_policy(2)));
    let (service, _, _) = build_service(directory);

    let run = service.run_match(LOAN).await.expect("run completes");

    assert_eq!(run.status, RunStatus::Complete);
    assert_eq!(program_ids(&run), vec![2]);
}

#[tokio::test]
async fn term_outside_program_window_is_excluded() {
    let mut long_term = program(3, 1_000.0, 100_000.0);
    long_term.min_term_months = 60;
    let directory = standard_directory().with_program(long_term, Some(standard_policy(3)));
    let (service, _, _) = build_service(directory);

    let run = service.run_match(LOAN).await.expect("run completes");

    assert_eq!(program_ids(&run), vec![1, 2]);
}

#[tokio::test]
async fn malformed_policy_faults_only_its_program() {
    let broken = policy(
        3,
        vec![hard(
            "collections",
            "BOOLEAN_IS_TRUE",
            "borrower.has_collections_3yr",
            json!({}),
        )],
        Vec::new(),
        &[],
    );
    let directory = standard_directory().with_program(program(3, 1_000.0, 100_000.0), Some(broken));
    let (service, _, _) = build_service(directory);

    let run = service.run_match(LOAN).await.expect("run completes");

    assert_eq!(run.status, RunStatus::Complete);
    assert_eq!(program_ids(&run), vec![1, 2, 3]);
    let faulted = &run.results[2];
    assert!(!faulted.eligible);
    assert_eq!(faulted.fit_score, 0.0);
    let fault = faulted.fault.as_ref().expect("fault recorded");
    assert_eq!(fault.kind, FaultKind::PolicyConfiguration);
    assert!(fault.message.contains("has_collections_3yr"));
    assert!(faulted.rule_results.hard.is_empty());
    assert!(run.results[..2].iter().all(|result| result.fault.is_none()));
}

#[tokio::test]
async fn missing_or_mismatched_policy_is_a_configuration_fault() {
    let directory = standard_directory()
        .with_program(program(3, 1_000.0, 100_000.0), None)
        .with_program(program(4, 1_000.0, 100_000.0), None);
    directory.policies.lock().expect("directory mutex poisoned").insert(
        LenderProgramId(4),
        standard_policy(1),
    );
    let (service, _, _) = build_service(directory);

    let run = service.run_match(LOAN).await.expect("run completes");

    let missing = run.results[2].fault.as_ref().expect("missing policy fault");
    assert_eq!(missing.kind, FaultKind::PolicyConfiguration);
    assert!(missing.message.contains("no active policy for program 3"));
    let mismatched = run.results[3].fault.as_ref().expect("mismatch fault");
    assert!(mismatched.message.contains("targets program 1"));
}

#[tokio::test]
async fn inactive_policy_is_treated_as_missing() {
    let mut retired = standard_policy(3);
    retired.is_active = false;
    let directory = standard_directory().with_program(program(3, 1_000.0, 100_000.0), Some(retired));
    let (service, _, _) = build_service(directory);

    let run = service.run_match(LOAN).await.expect("run completes");

    assert!(run.results[2].fault.is_some());
    assert!(!run.results[2].eligible);
}

#[tokio::test]
async fn policy_store_failure_faults_only_that_program() {
    let directory = FlakyPolicyDirectory {
        inner: standard_directory(),
        failing: LenderProgramId(2),
    };
    let service = UnderwritingService::new(
        Arc::new(directory),
        Arc::new(MemoryRuns::default()),
        underwriting_config(),
    );

    let run = service.run_match(LOAN).await.expect("run completes");

    assert_eq!(run.status, RunStatus::Complete);
    assert!(run.results[0].fault.is_none());
    let fault = run.results[1].fault.as_ref().expect("load fault");
    assert_eq!(fault.kind, FaultKind::PolicyConfiguration);
    assert!(fault.message.contains("policy store timeout"));
}

#[tokio::test]
async fn unknown_application_fails_the_run() {
    let (service, _, _) = build_service(standard_directory());

    let run = service
        .run_match(LoanRequestId(404))
        .await
        .expect("run recorded");

    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.results.is_empty());
    let failure = run.failure.as_ref().expect("failure recorded");
    assert_eq!(failure.kind, FaultKind::RunPrecondition);
    assert_eq!(failure.message, "loan request 404 not found");
}

#[tokio::test]
async fn no_surviving_program_fails_the_run() {
    let directory = MemoryDirectory::default()
        .with_application(LOAN, application_with_amount(500.0))
        .with_program(program(1, 5_000.0, 100_000.0), Some(standard_policy(1)));
    let (service, _, _) = build_service(directory);

    let run = service.run_match(LOAN).await.expect("run recorded");

    assert_eq!(run.status, RunStatus::Failed);
    let failure = run.failure.expect("failure recorded");
    assert!(failure.message.contains("no lender program accepts amount 500"));
}

#[tokio::test]
async fn unavailable_directory_fails_the_run() {
    let service = UnderwritingService::new(
        Arc::new(UnavailableDirectory),
        Arc::new(MemoryRuns::default()),
        underwriting_config(),
    );

    let run = service.run_match(LOAN).await.expect("run recorded");

    assert_eq!(run.status, RunStatus::Failed);
    assert!(run
        .failure
        .expect("failure recorded")
        .message
        .contains("directory offline"));
}

#[tokio::test]
async fn unavailable_run_store_propagates() {
    let service = UnderwritingService::new(
        Arc::new(standard_directory()),
        Arc::new(UnavailableRuns),
        underwriting_config(),
    );

    match service.run_match(LOAN).await {
        Err(UnderwritingServiceError::Repository(RepositoryError::Unavailable(_))) => {}
        other => panic!("expected unavailable repository, got {other:?}"),
    }
}

#[tokio::test]
async fn evaluation_uses_the_snapshot_taken_at_run_start() {
    let (service, directory, _) = build_service(standard_directory());

    let plan = service.prepare(LOAN).expect("snapshot loads");

    let mut changed = application();
    changed.guarantors[0].fico_score = 810;
    changed.loan_request.amount = 1_000.0;
    directory.set_application(LOAN, changed);
    directory.set_policy(policy(1, Vec::new(), Vec::new(), &[]));

    let results = service.evaluate_plan(plan).await;

    assert_eq!(results.len(), 2);
    assert!(results
        .iter()
        .all(|result| result.fit_score == 85.0 && result.rule_results.hard.len() == 1));
}

#[tokio::test]
async fn single_permit_still_evaluates_every_program() {
    let directory = Arc::new(
        standard_directory()
            .with_program(program(3, 1_000.0, 100_000.0), Some(standard_policy(3)))
            .with_program(program(4, 1_000.0, 100_000.0), Some(standard_policy(4))),
    );
    let service = UnderwritingService::new(
        directory,
        Arc::new(MemoryRuns::default()),
        UnderwritingConfig {
            program_budget: Duration::from_secs(5),
            max_concurrency: 1,
        },
    );

    let run = service.run_match(LOAN).await.expect("run completes");

    assert_eq!(program_ids(&run), vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn overrunning_program_faults_while_others_complete() {
    let directory = standard_directory()
        .with_program(program(3, 1_000.0, 100_000.0), Some(standard_policy(3)));
    let evaluator = Arc::new(StallingEvaluator::new(
        LenderProgramId(2),
        Duration::from_millis(400),
    ));
    let service = service_with_evaluator(
        directory,
        UnderwritingConfig {
            program_budget: Duration::from_millis(50),
            max_concurrency: 4,
        },
        evaluator,
    );

    let run = service.run_match(LOAN).await.expect("run completes");

    assert_eq!(run.status, RunStatus::Complete);
    assert_eq!(program_ids(&run), vec![1, 2, 3]);

    let stalled = &run.results[1];
    let fault = stalled.fault.as_ref().expect("overrun recorded");
    assert_eq!(fault.kind, FaultKind::EvaluationTimeout);
    assert_eq!(fault.message, "policy evaluation exceeded its 50 ms budget");
    assert!(!stalled.eligible);
    assert!(stalled.rule_results.hard.is_empty());

    for result in [&run.results[0], &run.results[2]] {
        assert!(result.fault.is_none());
        assert!(result.eligible);
        assert_eq!(result.fit_score, 85.0);
    }
}

#[tokio::test]
async fn overrun_evaluation_keeps_its_permit_until_it_returns() {
    let evaluator = Arc::new(StallingEvaluator::new(
        LenderProgramId(1),
        Duration::from_millis(300),
    ));
    let service = service_with_evaluator(
        standard_directory(),
        UnderwritingConfig {
            program_budget: Duration::from_millis(50),
            max_concurrency: 1,
        },
        evaluator.clone(),
    );

    let run = service.run_match(LOAN).await.expect("run completes");

    assert_eq!(program_ids(&run), vec![1, 2]);
    assert_eq!(
        run.results[0].fault.as_ref().map(|fault| fault.kind),
        Some(FaultKind::EvaluationTimeout)
    );
    assert!(run.results[1].fault.is_none());
    assert_eq!(evaluator.peak.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn oversized_pool_width_still_reaches_a_terminal_state() {
    let service = Arc::new(UnderwritingService::new(
        Arc::new(standard_directory()),
        Arc::new(MemoryRuns::default()),
        UnderwritingConfig {
            program_budget: Duration::from_secs(5),
            max_concurrency: usize::MAX,
        },
    ));

    let run = service.start_match_run(LOAN).expect("run opens");
    let mut latest = run.clone();
    for _ in 0..200 {
        latest = service.get_match_run(run.id).expect("run stored");
        if latest.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(latest.status, RunStatus::Complete);
    assert_eq!(program_ids(&latest), vec![1, 2]);
}

#[tokio::test]
async fn started_run_is_running_then_completes() {
    let (service, _, _) = build_service(standard_directory());

    let run = service.start_match_run(LOAN).expect("run opens");
    assert_eq!(run.status, RunStatus::Running);
    assert!(run.results.is_empty());

    let mut latest = run.clone();
    for _ in 0..200 {
        latest = service.get_match_run(run.id).expect("run stored");
        if latest.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(latest.status, RunStatus::Complete);
    assert_eq!(program_ids(&latest), vec![1, 2]);
}

#[tokio::test]
async fn run_ids_are_unique_per_invocation() {
    let (service, _, _) = build_service(standard_directory());

    let first = service.run_match(LOAN).await.expect("first run");
    let second = service.run_match(LOAN).await.expect("second run");

    assert_ne!(first.id, second.id);
}

#[test]
fn get_propagates_not_found() {
    let (service, _, _) = build_service(MemoryDirectory::default());

    match service.get_match_run(MatchRunId(99)) {
        Err(UnderwritingServiceError::Repository(RepositoryError::NotFound)) => {}
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn terminal_runs_are_immutable() {
    let mut run = MatchRun::new(MatchRunId(1), LOAN);
    run.complete(Vec::new()).expect("first transition");

    let error = run.complete(Vec::new()).expect_err("already complete");
    assert_eq!(error.to_string(), "match run 1 is already COMPLETE");
    assert!(run
        .fail(EngineFault::new(FaultKind::RunPrecondition, "late"))
        .is_err());
    assert_eq!(run.status, RunStatus::Complete);
    assert!(run.failure.is_none());

    let mut failed = MatchRun::new(MatchRunId(2), LOAN);
    failed
        .fail(EngineFault::new(FaultKind::RunPrecondition, "gone"))
        .expect("first transition");
    assert!(failed.complete(Vec::new()).is_err());
}

#[test]
fn ranked_lists_eligible_results_best_fit_first() {
    let scored = |id: u64, eligible: bool, fit_score: f64| {
        let mut result = MatchResult::faulted(
            &program(id, 0.0, 1.0),
            EngineFault::new(FaultKind::PolicyConfiguration, "placeholder"),
        );
        result.fault = None;
        result.eligible = eligible;
        result.fit_score = fit_score;
        result
    };
    let mut run = MatchRun::new(MatchRunId(1), LOAN);
    run.complete(vec![
        scored(3, true, 70.0),
        scored(1, false, 100.0),
        scored(4, true, 90.0),
        scored(2, true, 90.0),
    ])
    .expect("run completes");

    let ranked: Vec<u64> = run
        .ranked()
        .iter()
        .map(|result| result.lender_program_id.0)
        .collect();

    assert_eq!(ranked, vec![2, 4, 3]);
    assert_eq!(
        run.results
            .iter()
            .map(|result| result.lender_program_id.0)
            .collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
}

#[test]
fn timeout_fault_names_the_budget() {
    let result = MatchResult::faulted(
        &program(1, 0.0, 1.0),
        EngineFault::timeout(Duration::from_millis(250)),
    );

    let fault = result.fault.expect("fault recorded");
    assert_eq!(fault.kind, FaultKind::EvaluationTimeout);
    assert_eq!(fault.message, "policy evaluation exceeded its 250 ms budget");
    assert!(!result.eligible);
    assert_eq!(result.reasons, vec![fault.message.clone()]);
}
