//! Races between concurrent requests: overselling, double verification and
//! double check-in.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use eventpass_core::types::{RegistrationStatus, Role, TicketStatus};
use eventpass_core::WorkflowError;
use eventpass_testing::TestHarness;
use futures::future::join_all;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_ticket_is_sold_exactly_once() {
    let h = TestHarness::new();
    let event = h.seed_event(1, 500).await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let user = h.seed_user(Role::User).await;
        let submission = h.submission(&event, 1);
        let h = h.clone();
        tasks.push(tokio::spawn(async move {
            h.workflow
                .submit(&TestHarness::actor(&user), submission)
                .await
        }));
    }

    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, WorkflowError::OutOfStock { available: 0, .. })));
    assert_eq!(h.available(event.id), 0);
    assert_eq!(h.store.registrations().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_never_oversell() {
    let h = TestHarness::new();
    let event = h.seed_event(10, 100).await;

    let mut tasks = Vec::new();
    for _ in 0..12 {
        let user = h.seed_user(Role::User).await;
        let submission = h.submission(&event, 3);
        let h = h.clone();
        tasks.push(tokio::spawn(async move {
            h.workflow
                .submit(&TestHarness::actor(&user), submission)
                .await
        }));
    }

    let successes = join_all(tasks)
        .await
        .into_iter()
        .filter(|joined| joined.as_ref().is_ok_and(Result::is_ok))
        .count();

    // 10 tickets in lots of 3: three lots fit, one ticket stays unsold.
    assert_eq!(successes, 3);
    assert_eq!(h.available(event.id), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_user_racing_gets_one_registration() {
    let h = TestHarness::new();
    let event = h.seed_event(10, 100).await;
    let user = h.seed_user(Role::User).await;

    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let submission = h.submission(&event, 1);
            let h = h.clone();
            let actor = TestHarness::actor(&user);
            tokio::spawn(async move { h.workflow.submit(&actor, submission).await })
        })
        .collect();

    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| *e == WorkflowError::DuplicateRegistration));
    assert_eq!(h.available(event.id), 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_verification_issues_one_ticket() {
    let h = TestHarness::new();
    let event = h.seed_event(10, 100).await;
    let user = h.seed_user(Role::User).await;
    let admin = h.admin().await;
    let registration = h
        .workflow
        .submit(&TestHarness::actor(&user), h.submission(&event, 2))
        .await
        .unwrap();

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let h = h.clone();
            tokio::spawn(async move { h.workflow.verify(&admin, registration.id).await })
        })
        .collect();
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for error in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(
                error,
                WorkflowError::InvalidTransition {
                    status: RegistrationStatus::Verified,
                    ..
                } | WorkflowError::AlreadyIssued
            ),
            "unexpected error: {error:?}"
        );
    }
    assert_eq!(h.store.tickets().len(), 1);
    assert_eq!(h.store.event(event.id).unwrap().registered_count, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn double_scan_checks_in_once() {
    let h = TestHarness::new();
    let event = h.seed_event(10, 100).await;
    let user = h.seed_user(Role::User).await;
    let admin = h.admin().await;
    let registration = h
        .workflow
        .submit(&TestHarness::actor(&user), h.submission(&event, 1))
        .await
        .unwrap();
    h.workflow.verify(&admin, registration.id).await.unwrap();
    let code = h.store.tickets().remove(0).qr_code;

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let h = h.clone();
            let code = code.clone();
            tokio::spawn(async move { h.tickets.check_in(&admin, &code).await })
        })
        .collect();
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(WorkflowError::AlreadyUsed {
            status: TicketStatus::Used
        })
    )));
    let check_ins = h
        .store
        .audit_entries()
        .into_iter()
        .filter(|e| e.action == eventpass_core::audit::AuditAction::CheckIn)
        .count();
    assert_eq!(check_ins, 1);
}
