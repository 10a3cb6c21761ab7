//! End-to-end exercises of the approval service against a real SQLite pool:
//! submission, step-by-step approval with quiz gating, ledger commit and
//! revert, bulk approval, and the audited admin adjustment path.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use staffly_core::config::VacationConfig;
use staffly_core::domain::employee::UserId;
use staffly_core::domain::request::{
    ApprovalStep, Request, RequestId, RequestStatus, StepId, StepStatus,
};
use staffly_core::domain::template::{RequestKind, TemplateId};
use staffly_core::domain::vacation::ScheduleStatus;
use staffly_core::errors::{EngineError, ErrorKind};
use staffly_core::notify::InMemoryNotificationDispatcher;
use staffly_core::workflow::{BulkOutcome, QuizAnswer, VacationDates};
use staffly_db::repositories::{
    RequestRepository, SqlRequestRepository, SqlVacationRepository, VacationRepository,
};
use staffly_db::{connect_with_settings, migrations, seed_demo_data, ApprovalService, ServiceError};

fn vacation_config() -> VacationConfig {
    VacationConfig {
        annual_entitlement_days: 26,
        on_demand_cap: 4,
        circumstantial_event_cap: 2,
        carried_over_expiry_month: 9,
        carried_over_expiry_day: 30,
    }
}

async fn setup() -> (sqlx::SqlitePool, ApprovalService, InMemoryNotificationDispatcher) {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    seed_demo_data(&pool).await.expect("seed");

    let dispatcher = InMemoryNotificationDispatcher::default();
    let service =
        ApprovalService::new(pool.clone(), &vacation_config(), Arc::new(dispatcher.clone()));
    (pool, service, dispatcher)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn user(id: &str) -> UserId {
    UserId(id.to_string())
}

/// Monday..Wednesday, three business days, no seeded holidays in range.
fn june_span() -> VacationDates {
    VacationDates { start_date: date(2026, 6, 1), end_date: date(2026, 6, 3) }
}

async fn submit_vacation(service: &ApprovalService) -> Request {
    let request_id = service
        .submit_request(
            &TemplateId("tpl-vacation-standard".to_string()),
            &user("u-ada"),
            serde_json::json!({"note": "summer break"}),
            Some(june_span()),
        )
        .await
        .expect("submit");
    service.get_request(&request_id).await.expect("load")
}

fn step_for_order(request: &Request, order: u32) -> &ApprovalStep {
    request
        .steps
        .iter()
        .find(|step| step.step_order == order)
        .expect("step exists")
}

fn passing_answers() -> Vec<QuizAnswer> {
    vec![
        QuizAnswer {
            question_id: staffly_core::domain::template::QuestionId(
                "q-on-demand-cap".to_string(),
            ),
            selected_option: 1,
        },
        QuizAnswer {
            question_id: staffly_core::domain::template::QuestionId("q-weekends".to_string()),
            selected_option: 1,
        },
    ]
}

#[tokio::test]
async fn submission_routes_to_manager_then_hr() {
    let (_pool, service, dispatcher) = setup().await;
    let request = submit_vacation(&service).await;

    assert_eq!(request.status, RequestStatus::Submitted);
    assert_eq!(request.steps.len(), 2);

    let first = step_for_order(&request, 1);
    assert_eq!(first.status, StepStatus::InReview);
    assert_eq!(first.approver_id, user("u-grace"));

    let second = step_for_order(&request, 2);
    assert_eq!(second.status, StepStatus::Pending);
    assert_eq!(second.approver_id, user("u-hedy"));
    assert!(second.requires_quiz);

    assert_eq!(request.vacation.as_ref().map(|span| span.days_count), Some(3));

    let sent = dispatcher.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].user_id, user("u-grace"));
}

#[tokio::test]
async fn full_chain_approves_and_commits_the_ledger() {
    let (pool, service, dispatcher) = setup().await;
    let request = submit_vacation(&service).await;
    let first = step_for_order(&request, 1).id.clone();
    let second = step_for_order(&request, 2).id.clone();

    let decision = service
        .approve_step(&request.id, &first, &user("u-grace"), Some("enjoy".to_string()), Vec::new())
        .await
        .expect("manager approval");
    assert!(decision.step_approved);
    assert_eq!(decision.request_status, RequestStatus::InReview);

    let midway = service.get_request(&request.id).await.expect("load");
    assert_eq!(step_for_order(&midway, 2).status, StepStatus::InReview);

    let decision = service
        .approve_step(&request.id, &second, &user("u-hedy"), None, passing_answers())
        .await
        .expect("hr approval");
    assert!(decision.step_approved);
    assert_eq!(decision.request_status, RequestStatus::Approved);
    assert_eq!(decision.quiz.map(|quiz| quiz.passed), Some(true));

    let done = service.get_request(&request.id).await.expect("load");
    assert_eq!(done.status, RequestStatus::Approved);
    assert!(done.completed_at.is_some());

    let counters = SqlVacationRepository::new(pool.clone())
        .counters(&user("u-ada"))
        .await
        .expect("counters")
        .expect("exists");
    assert_eq!(counters.used, 3);

    let schedules = SqlVacationRepository::new(pool.clone())
        .schedules_for_user(&user("u-ada"))
        .await
        .expect("schedules");
    assert_eq!(schedules.len(), 1);
    assert_eq!(schedules[0].status, ScheduleStatus::Active);
    assert_eq!(schedules[0].days_count, 3);

    // Submitter is told about the final approval.
    let sent = dispatcher.sent();
    assert_eq!(sent.last().map(|n| n.user_id.clone()), Some(user("u-ada")));

    let outbox: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notification_outbox")
        .fetch_one(&pool)
        .await
        .expect("count");
    assert_eq!(outbox as usize, sent.len());
}

#[tokio::test]
async fn repeated_approval_fails_without_double_commit() {
    let (pool, service, _dispatcher) = setup().await;
    let request = submit_vacation(&service).await;
    let first = step_for_order(&request, 1).id.clone();
    let second = step_for_order(&request, 2).id.clone();

    service
        .approve_step(&request.id, &first, &user("u-grace"), None, Vec::new())
        .await
        .expect("manager approval");
    service
        .approve_step(&request.id, &second, &user("u-hedy"), None, passing_answers())
        .await
        .expect("hr approval");

    let error = service
        .approve_step(&request.id, &second, &user("u-hedy"), None, passing_answers())
        .await
        .expect_err("second decision must fail");
    assert!(matches!(
        error,
        ServiceError::Engine(EngineError::InvalidState(_))
    ));

    let counters = SqlVacationRepository::new(pool)
        .counters(&user("u-ada"))
        .await
        .expect("counters")
        .expect("exists");
    assert_eq!(counters.used, 3, "retry must not produce a second ledger commit");
}

#[tokio::test]
async fn rejection_at_the_second_step_terminates_the_request() {
    let (_pool, service, dispatcher) = setup().await;
    let request = submit_vacation(&service).await;
    let first = step_for_order(&request, 1).id.clone();
    let second = step_for_order(&request, 2).id.clone();

    service
        .approve_step(&request.id, &first, &user("u-grace"), None, Vec::new())
        .await
        .expect("manager approval");

    let error = service
        .reject_step(&request.id, &second, &user("u-hedy"), "no".to_string())
        .await
        .expect_err("reason below minimum length");
    assert!(matches!(
        error,
        ServiceError::Engine(EngineError::Validation(_))
    ));

    service
        .reject_step(
            &request.id,
            &second,
            &user("u-hedy"),
            "Insufficient documentation provided".to_string(),
        )
        .await
        .expect("reject");

    let done = service.get_request(&request.id).await.expect("load");
    assert_eq!(done.status, RequestStatus::Rejected);
    assert!(done.completed_at.is_some());
    assert_eq!(step_for_order(&done, 2).status, StepStatus::Rejected);

    let last = dispatcher.sent().last().cloned().expect("notification");
    assert_eq!(last.user_id, user("u-ada"));
    assert!(last.message.contains("Insufficient documentation provided"));
}

#[tokio::test]
async fn quiz_failure_is_committed_as_a_rejection() {
    let (_pool, service, _dispatcher) = setup().await;
    let request = submit_vacation(&service).await;
    let first = step_for_order(&request, 1).id.clone();
    let second = step_for_order(&request, 2).id.clone();

    service
        .approve_step(&request.id, &first, &user("u-grace"), None, Vec::new())
        .await
        .expect("manager approval");

    let decision = service
        .approve_step(&request.id, &second, &user("u-hedy"), None, Vec::new())
        .await
        .expect("quiz failure is a committed outcome");
    assert!(!decision.step_approved);
    assert_eq!(decision.request_status, RequestStatus::Rejected);

    let done = service.get_request(&request.id).await.expect("load");
    assert_eq!(done.status, RequestStatus::Rejected);
    assert_eq!(step_for_order(&done, 2).quiz_passed, Some(false));
}

#[tokio::test]
async fn insufficient_balance_is_reported_at_submission() {
    let (pool, service, _dispatcher) = setup().await;

    let vacation_repo = SqlVacationRepository::new(pool);
    let mut counters = vacation_repo
        .counters(&user("u-ada"))
        .await
        .expect("counters")
        .expect("exists");
    counters.used = 24;
    vacation_repo.save_counters(&counters).await.expect("save");

    let error = service
        .submit_request(
            &TemplateId("tpl-vacation-standard".to_string()),
            &user("u-ada"),
            serde_json::json!({}),
            Some(june_span()),
        )
        .await
        .expect_err("three days against a balance of two");

    match error {
        ServiceError::SubmissionInvalid(issues) => {
            let combined =
                issues.iter().map(|issue| issue.message()).collect::<Vec<_>>().join("; ");
            assert!(combined.contains("short by 1"), "issues: {combined}");
        }
        other => panic!("expected SubmissionInvalid, got {other}"),
    }
}

#[tokio::test]
async fn structural_and_balance_issues_are_reported_together() {
    let (pool, service, _dispatcher) = setup().await;

    sqlx::query("UPDATE employee SET active = 0 WHERE id = 'u-grace'")
        .execute(&pool)
        .await
        .expect("deactivate manager");
    let vacation_repo = SqlVacationRepository::new(pool);
    let mut counters = vacation_repo
        .counters(&user("u-ada"))
        .await
        .expect("counters")
        .expect("exists");
    counters.used = 24;
    vacation_repo.save_counters(&counters).await.expect("save");

    let error = service
        .submit_request(
            &TemplateId("tpl-vacation-standard".to_string()),
            &user("u-ada"),
            serde_json::json!({}),
            Some(june_span()),
        )
        .await
        .expect_err("both failures expected");

    match error {
        ServiceError::SubmissionInvalid(issues) => {
            assert!(issues.len() >= 2, "expected combined report, got {issues:?}");
        }
        other => panic!("expected SubmissionInvalid, got {other}"),
    }
}

#[tokio::test]
async fn bulk_approval_reports_per_step_results() {
    let (pool, service, _dispatcher) = setup().await;

    let mut owned_requests = Vec::new();
    let mut step_ids = Vec::new();
    for _ in 0..2 {
        let request_id = service
            .submit_request(
                &TemplateId("tpl-equipment".to_string()),
                &user("u-ada"),
                serde_json::json!({"item": "monitor"}),
                None,
            )
            .await
            .expect("submit equipment");
        let request = service.get_request(&request_id).await.expect("load");
        step_ids.push(step_for_order(&request, 1).id.clone());
        owned_requests.push(request_id);
    }

    // A third step assigned to someone else entirely.
    let foreign = Request {
        id: RequestId("REQ-foreign".to_string()),
        template_id: TemplateId("tpl-equipment".to_string()),
        kind: RequestKind::Equipment,
        submitted_by: user("u-linus"),
        form_data: serde_json::json!({}),
        status: RequestStatus::Submitted,
        steps: vec![ApprovalStep {
            id: StepId("step-foreign".to_string()),
            request_id: RequestId("REQ-foreign".to_string()),
            step_order: 1,
            approver_id: user("u-linus"),
            requires_quiz: false,
            status: StepStatus::InReview,
            started_at: Some(Utc::now()),
            finished_at: None,
            comment: None,
            quiz_score: None,
            quiz_passed: None,
        }],
        vacation: None,
        submitted_at: Utc::now(),
        completed_at: None,
    };
    SqlRequestRepository::new(pool).save(&foreign).await.expect("save foreign");
    step_ids.push(StepId("step-foreign".to_string()));

    let results = service
        .bulk_approve(&user("u-grace"), &step_ids, Some("batch approved".to_string()))
        .await
        .expect("bulk");

    assert_eq!(results.len(), 3);
    let approved = results.iter().filter(|result| result.is_approved()).count();
    assert_eq!(approved, 2);
    let forbidden = results
        .iter()
        .filter(|result| {
            matches!(
                &result.outcome,
                BulkOutcome::Failed { kind: ErrorKind::Forbidden, .. }
            )
        })
        .count();
    assert_eq!(forbidden, 1);

    // The two owned steps are fully committed despite the failure.
    for request_id in &owned_requests {
        let owner = service.get_request(request_id).await.expect("load");
        assert_eq!(owner.status, RequestStatus::Approved);
    }
}

#[tokio::test]
async fn bulk_approval_enforces_the_cap() {
    let (_pool, service, _dispatcher) = setup().await;

    let step_ids: Vec<StepId> =
        (0..51).map(|index| StepId(format!("step-{index}"))).collect();
    let error = service
        .bulk_approve(&user("u-grace"), &step_ids, None)
        .await
        .expect_err("51 steps exceed the cap");
    assert!(matches!(
        error,
        ServiceError::Engine(EngineError::Validation(_))
    ));
}

#[tokio::test]
async fn admin_cancel_of_an_approved_vacation_restores_the_balance() {
    let (pool, service, _dispatcher) = setup().await;
    let request = submit_vacation(&service).await;
    let first = step_for_order(&request, 1).id.clone();
    let second = step_for_order(&request, 2).id.clone();

    service
        .approve_step(&request.id, &first, &user("u-grace"), None, Vec::new())
        .await
        .expect("manager approval");
    service
        .approve_step(&request.id, &second, &user("u-hedy"), None, passing_answers())
        .await
        .expect("hr approval");

    // The submitter may not undo an approved vacation.
    let denied = service
        .cancel_request(&request.id, &user("u-ada"), None)
        .await
        .expect_err("submitter cancel of approved request");
    assert!(matches!(
        denied,
        ServiceError::Engine(EngineError::Forbidden { .. })
    ));

    service
        .cancel_request(&request.id, &user("u-hedy"), Some("entered in error".to_string()))
        .await
        .expect("admin cancel");

    let done = service.get_request(&request.id).await.expect("load");
    assert_eq!(done.status, RequestStatus::Cancelled);

    let repo = SqlVacationRepository::new(pool);
    let counters = repo.counters(&user("u-ada")).await.expect("counters").expect("exists");
    assert_eq!(counters.used, 0, "revert must restore the balance");

    let schedules = repo.schedules_for_user(&user("u-ada")).await.expect("schedules");
    assert_eq!(schedules.len(), 1);
    assert_eq!(schedules[0].status, ScheduleStatus::Cancelled);

    // A second cancellation attempt finds a terminal request.
    let repeat = service
        .cancel_request(&request.id, &user("u-hedy"), None)
        .await
        .expect_err("already cancelled");
    assert!(matches!(
        repeat,
        ServiceError::Engine(EngineError::InvalidState(_))
    ));
}

#[tokio::test]
async fn summary_reflects_commits_and_admin_adjustments() {
    let (_pool, service, _dispatcher) = setup().await;
    let request = submit_vacation(&service).await;
    let first = step_for_order(&request, 1).id.clone();
    let second = step_for_order(&request, 2).id.clone();

    service
        .approve_step(&request.id, &first, &user("u-grace"), None, Vec::new())
        .await
        .expect("manager approval");
    service
        .approve_step(&request.id, &second, &user("u-hedy"), None, passing_answers())
        .await
        .expect("hr approval");

    let summary = service.vacation_summary(&user("u-ada")).await.expect("summary");
    assert_eq!(summary.entitlement, 26);
    assert_eq!(summary.used, 3);
    assert_eq!(summary.remaining, 23);
    assert_eq!(summary.on_demand_remaining, 4);
    assert_eq!(summary.counter_drift, 0);

    // A correction bypasses the schedule projection and surfaces as drift.
    let denied = service
        .admin_adjust_vacation(&user("u-ada"), 2, "migration correction", &user("u-ada"))
        .await
        .expect_err("non-admin actor");
    assert!(matches!(
        denied,
        ServiceError::Engine(EngineError::Forbidden { .. })
    ));

    service
        .admin_adjust_vacation(&user("u-ada"), 2, "migration correction", &user("u-hedy"))
        .await
        .expect("admin adjust");

    let adjusted = service.vacation_summary(&user("u-ada")).await.expect("summary");
    assert_eq!(adjusted.used, 3, "schedules stay authoritative for display");
    assert_eq!(adjusted.counter_drift, 2);
}

#[tokio::test]
async fn auto_approved_template_commits_at_submission() {
    let (_pool, service, dispatcher) = setup().await;

    let request_id = service
        .submit_request(
            &TemplateId("tpl-badge-reprint".to_string()),
            &user("u-ada"),
            serde_json::json!({"reason": "badge lost"}),
            None,
        )
        .await
        .expect("submit");

    let request = service.get_request(&request_id).await.expect("load");
    assert_eq!(request.status, RequestStatus::Approved);
    assert!(request.steps.is_empty());
    assert!(request.completed_at.is_some());

    let sent = dispatcher.sent();
    assert_eq!(sent.last().map(|n| n.user_id.clone()), Some(user("u-ada")));
}
