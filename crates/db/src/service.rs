use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use thiserror::Error;
use tracing::{info, warn};

use staffly_core::audit::AuditRecord;
use staffly_core::calendar::{CachedHolidays, FixedHolidayCalendar};
use staffly_core::config::VacationConfig;
use staffly_core::domain::employee::{EmployeeProfile, UserId};
use staffly_core::domain::request::{Request, RequestId, RequestStatus, StepId, StepStatus};
use staffly_core::domain::template::RequestTemplate;
use staffly_core::domain::vacation::{
    ScheduleStatus, VacationCounters, VacationSchedule, VacationSummary,
};
use staffly_core::errors::EngineError;
use staffly_core::ledger::VacationLedger;
use staffly_core::notify::{Notification, NotificationDispatcher};
use staffly_core::workflow::{
    validate_batch_size, ApprovalStepMachine, ApproveCommand, BulkItemResult, CancelCommand,
    LedgerDirective, QuizAnswer, QuizOutcome, RejectCommand, RequestRoutingService,
    RoutingIssue, SubmissionContext, TransitionOutcome, VacationDates,
};

use crate::repositories::employee::row_to_employee;
use crate::repositories::template::load_template;
use crate::repositories::vacation::{row_to_counters, row_to_schedule, SCHEDULE_COLUMNS};
use crate::repositories::{
    EmployeeRepository, RepositoryError, RequestRepository, SqlEmployeeRepository,
    SqlRequestRepository, SqlVacationRepository, VacationRepository,
};
use crate::DbPool;

const HOLIDAY_CACHE_TTL_MINUTES: i64 = 10;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("submission invalid: {}", format_issues(.0))]
    SubmissionInvalid(Vec<RoutingIssue>),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn format_issues(issues: &[RoutingIssue]) -> String {
    issues.iter().map(RoutingIssue::message).collect::<Vec<_>>().join("; ")
}

/// Outcome of a single approve call as seen by callers: either the step was
/// approved, or a failed knowledge check turned the call into a committed
/// rejection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepDecision {
    pub request_status: RequestStatus,
    pub quiz: Option<QuizOutcome>,
    pub step_approved: bool,
}

/// The only mutation path for requests, steps and vacation counters.
///
/// Each operation loads state, runs the pure engines from `staffly-core`,
/// and persists the outcome inside one transaction. Step transitions use
/// guarded updates (`... WHERE status = 'in_review'`) so that of two
/// concurrent actors exactly one wins and the loser observes `InvalidState`.
/// Notifications are written to the outbox inside the transaction and
/// dispatched only after commit; dispatch failures are logged, never rolled
/// back into the approval.
pub struct ApprovalService {
    pool: DbPool,
    routing: RequestRoutingService,
    machine: ApprovalStepMachine,
    ledger: VacationLedger,
    default_entitlement: u32,
    dispatcher: Arc<dyn NotificationDispatcher>,
    holidays: Mutex<Option<CachedHolidays>>,
}

impl ApprovalService {
    pub fn new(
        pool: DbPool,
        vacation: &VacationConfig,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        let ledger = VacationLedger::new(vacation.ledger_policy());
        Self {
            pool,
            routing: RequestRoutingService::new(ledger),
            machine: ApprovalStepMachine::default(),
            ledger,
            default_entitlement: vacation.annual_entitlement_days,
            dispatcher,
            holidays: Mutex::new(None),
        }
    }

    pub async fn submit_request(
        &self,
        template_id: &staffly_core::domain::template::TemplateId,
        submitter_id: &UserId,
        form_data: serde_json::Value,
        vacation_dates: Option<VacationDates>,
    ) -> Result<RequestId, ServiceError> {
        let template = self.load_template_or_not_found(template_id).await?;
        let submitter = self.load_employee(submitter_id).await?;
        let directory =
            SqlEmployeeRepository::new(self.pool.clone()).directory_snapshot().await?;
        let counters = self.load_counters(submitter_id).await?;
        let calendar = self.holiday_calendar().await?;
        let today = Utc::now().date_naive();

        let context = SubmissionContext {
            directory: &directory,
            calendar: &calendar,
            counters: Some(&counters),
            today,
        };
        let plan = self
            .routing
            .plan_submission(&template, &submitter, form_data, vacation_dates, &context)
            .map_err(ServiceError::SubmissionInvalid)?;

        let mut tx = self.pool.begin().await?;
        insert_request(&mut tx, &plan.request).await?;
        for record in &plan.audit {
            insert_audit(&mut tx, record).await?;
        }

        if plan.ledger_commit {
            let mut counters = load_counters_tx(&mut tx, submitter_id)
                .await?
                .unwrap_or_else(|| {
                    VacationCounters::new(submitter_id.clone(), self.default_entitlement)
                });
            let schedule = self.ledger.commit(&mut counters, &plan.request)?;
            save_counters_tx(&mut tx, &counters).await?;
            insert_schedule(&mut tx, &schedule).await?;
            insert_audit(
                &mut tx,
                &AuditRecord::new(
                    "vacation_counters",
                    submitter_id.0.clone(),
                    "ledger.committed",
                    submitter_id.clone(),
                )
                .with_change("", schedule.days_count.to_string()),
            )
            .await?;
        }

        for notification in &plan.notifications {
            insert_outbox(&mut tx, notification).await?;
        }
        tx.commit().await?;

        info!(
            event_name = "workflow.request_submitted",
            request_id = %plan.request.id.0,
            template_id = %template_id.0,
            submitter = %submitter_id.0,
            "request submitted"
        );
        self.dispatch_all(&plan.notifications);
        Ok(plan.request.id)
    }

    pub async fn approve_step(
        &self,
        request_id: &RequestId,
        step_id: &StepId,
        approver_id: &UserId,
        comment: Option<String>,
        quiz_answers: Vec<QuizAnswer>,
    ) -> Result<StepDecision, ServiceError> {
        let request = self.load_request_or_not_found(request_id).await?;
        let template = self.load_template_or_not_found(&request.template_id).await?;
        let prior_status = request.status;

        let outcome = self.machine.approve(
            request,
            &template,
            ApproveCommand {
                step_id: step_id.clone(),
                actor: approver_id.clone(),
                comment,
                quiz_answers,
            },
        )?;

        let decision = StepDecision {
            request_status: outcome.request.status,
            quiz: outcome.quiz,
            step_approved: outcome
                .request
                .step(step_id)
                .map(|step| step.status == StepStatus::Approved)
                .unwrap_or(false),
        };

        self.persist_outcome(prior_status, &outcome).await?;
        info!(
            event_name = "workflow.step_decided",
            request_id = %request_id.0,
            step_id = %step_id.0,
            actor = %approver_id.0,
            approved = decision.step_approved,
            "approval step decided"
        );
        Ok(decision)
    }

    pub async fn reject_step(
        &self,
        request_id: &RequestId,
        step_id: &StepId,
        approver_id: &UserId,
        reason: String,
    ) -> Result<(), ServiceError> {
        let request = self.load_request_or_not_found(request_id).await?;
        let prior_status = request.status;

        let outcome = self.machine.reject(
            request,
            RejectCommand { step_id: step_id.clone(), actor: approver_id.clone(), reason },
        )?;

        self.persist_outcome(prior_status, &outcome).await?;
        info!(
            event_name = "workflow.step_rejected",
            request_id = %request_id.0,
            step_id = %step_id.0,
            actor = %approver_id.0,
            "approval step rejected"
        );
        Ok(())
    }

    pub async fn cancel_request(
        &self,
        request_id: &RequestId,
        actor_id: &UserId,
        reason: Option<String>,
    ) -> Result<(), ServiceError> {
        let request = self.load_request_or_not_found(request_id).await?;
        let actor = self.load_employee(actor_id).await?;
        let prior_status = request.status;

        let outcome = self.machine.cancel(
            request,
            CancelCommand { actor: actor_id.clone(), actor_is_admin: actor.admin, reason },
        )?;

        self.persist_outcome(prior_status, &outcome).await?;
        info!(
            event_name = "workflow.request_cancelled",
            request_id = %request_id.0,
            actor = %actor_id.0,
            "request cancelled"
        );
        Ok(())
    }

    /// Approve many steps on behalf of one approver. Every step runs in its
    /// own transaction; failures of any kind become result entries so the
    /// caller always gets the full per-step report.
    pub async fn bulk_approve(
        &self,
        approver_id: &UserId,
        step_ids: &[StepId],
        comment: Option<String>,
    ) -> Result<Vec<BulkItemResult>, ServiceError> {
        validate_batch_size(step_ids.len())?;

        let mut results = Vec::with_capacity(step_ids.len());
        for step_id in step_ids {
            let request_id = match self.request_id_for_step(step_id).await {
                Ok(Some(request_id)) => request_id,
                Ok(None) => {
                    results.push(BulkItemResult::failed(
                        step_id.clone(),
                        &EngineError::NotFound { entity: "approval step", id: step_id.0.clone() },
                    ));
                    continue;
                }
                Err(error) => {
                    results.push(contained_failure(step_id.clone(), &error));
                    continue;
                }
            };

            match self
                .approve_step(&request_id, step_id, approver_id, comment.clone(), Vec::new())
                .await
            {
                Ok(decision) if decision.step_approved => {
                    results.push(BulkItemResult::approved(step_id.clone()));
                }
                Ok(_) => {
                    // A failed knowledge check was committed as a rejection;
                    // report the step as not approved.
                    results.push(BulkItemResult::failed(
                        step_id.clone(),
                        &EngineError::Business(
                            "knowledge check failed; the step was rejected".to_string(),
                        ),
                    ));
                }
                Err(ServiceError::Engine(error)) => {
                    results.push(BulkItemResult::failed(step_id.clone(), &error));
                }
                Err(error) => {
                    results.push(contained_failure(step_id.clone(), &error));
                }
            }
        }

        Ok(results)
    }

    pub async fn vacation_summary(
        &self,
        user_id: &UserId,
    ) -> Result<VacationSummary, ServiceError> {
        self.load_employee(user_id).await?;
        let counters = self.load_counters(user_id).await?;
        let schedules = SqlVacationRepository::new(self.pool.clone())
            .schedules_for_user(user_id)
            .await?;
        Ok(self.ledger.summary(&counters, &schedules, Utc::now().date_naive()))
    }

    /// Audited correction path that bypasses the normal commit flow. The
    /// actor must be an admin; the delta may drive the counter negative.
    pub async fn admin_adjust_vacation(
        &self,
        user_id: &UserId,
        delta_days: i64,
        reason: &str,
        admin_id: &UserId,
    ) -> Result<(), ServiceError> {
        let admin = self.load_employee(admin_id).await?;
        if !admin.admin {
            return Err(EngineError::Forbidden {
                actor: admin_id.0.clone(),
                entity: "vacation counters",
                id: user_id.0.clone(),
            }
            .into());
        }
        if reason.trim().is_empty() {
            return Err(EngineError::validation("reason", "a reason is required").into());
        }
        self.load_employee(user_id).await?;

        let mut tx = self.pool.begin().await?;
        let mut counters = load_counters_tx(&mut tx, user_id)
            .await?
            .unwrap_or_else(|| VacationCounters::new(user_id.clone(), self.default_entitlement));
        let old_used = counters.used;
        self.ledger.admin_adjust(&mut counters, delta_days);
        save_counters_tx(&mut tx, &counters).await?;
        insert_audit(
            &mut tx,
            &AuditRecord::new(
                "vacation_counters",
                user_id.0.clone(),
                "ledger.admin_adjusted",
                admin_id.clone(),
            )
            .with_change(old_used.to_string(), counters.used.to_string())
            .with_reason(reason.trim().to_string()),
        )
        .await?;
        tx.commit().await?;

        info!(
            event_name = "ledger.admin_adjusted",
            user_id = %user_id.0,
            admin = %admin_id.0,
            delta_days,
            "vacation counters adjusted"
        );
        Ok(())
    }

    pub async fn get_request(&self, request_id: &RequestId) -> Result<Request, ServiceError> {
        self.load_request_or_not_found(request_id).await
    }

    pub async fn list_pending_steps(
        &self,
        approver_id: &UserId,
    ) -> Result<Vec<staffly_core::domain::request::ApprovalStep>, ServiceError> {
        Ok(SqlRequestRepository::new(self.pool.clone())
            .list_pending_steps(approver_id)
            .await?)
    }

    /// Persist a machine outcome as one atomic unit: decided step, activated
    /// step, request status, ledger effect, audit rows, outbox rows.
    async fn persist_outcome(
        &self,
        prior_status: RequestStatus,
        outcome: &TransitionOutcome,
    ) -> Result<(), ServiceError> {
        let request = &outcome.request;
        let mut tx = self.pool.begin().await?;

        if let Some(step_id) = &outcome.decided_step {
            let Some(step) = request.step(step_id) else {
                return Err(EngineError::NotFound {
                    entity: "approval step",
                    id: step_id.0.clone(),
                }
                .into());
            };
            let updated = sqlx::query(
                "UPDATE approval_step
                 SET status = ?, finished_at = ?, comment = ?, quiz_score = ?, quiz_passed = ?
                 WHERE id = ? AND status = 'in_review'",
            )
            .bind(step.status.as_str())
            .bind(step.finished_at.map(|at| at.to_rfc3339()))
            .bind(step.comment.as_deref())
            .bind(step.quiz_score.map(i64::from))
            .bind(step.quiz_passed.map(i64::from))
            .bind(&step_id.0)
            .execute(&mut *tx)
            .await?;
            if updated.rows_affected() != 1 {
                // A concurrent decision won the race; this caller loses with
                // InvalidState, never a silent double-commit.
                return Err(EngineError::InvalidState(format!(
                    "step {} is no longer in review",
                    step_id.0
                ))
                .into());
            }
        }

        if let Some(step_id) = &outcome.activated_step {
            let Some(step) = request.step(step_id) else {
                return Err(EngineError::NotFound {
                    entity: "approval step",
                    id: step_id.0.clone(),
                }
                .into());
            };
            let updated = sqlx::query(
                "UPDATE approval_step SET status = ?, started_at = ?
                 WHERE id = ? AND status = 'pending'",
            )
            .bind(step.status.as_str())
            .bind(step.started_at.map(|at| at.to_rfc3339()))
            .bind(&step_id.0)
            .execute(&mut *tx)
            .await?;
            if updated.rows_affected() != 1 {
                return Err(EngineError::InvalidState(format!(
                    "step {} is no longer pending",
                    step_id.0
                ))
                .into());
            }
        }

        let updated = sqlx::query(
            "UPDATE request SET status = ?, completed_at = ? WHERE id = ? AND status = ?",
        )
        .bind(request.status.as_str())
        .bind(request.completed_at.map(|at| at.to_rfc3339()))
        .bind(&request.id.0)
        .bind(prior_status.as_str())
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() != 1 {
            return Err(EngineError::InvalidState(format!(
                "request {} changed concurrently",
                request.id.0
            ))
            .into());
        }

        match outcome.ledger {
            LedgerDirective::None => {}
            LedgerDirective::Commit => {
                let mut counters = load_counters_tx(&mut tx, &request.submitted_by)
                    .await?
                    .unwrap_or_else(|| {
                        VacationCounters::new(
                            request.submitted_by.clone(),
                            self.default_entitlement,
                        )
                    });
                let schedule = self.ledger.commit(&mut counters, request)?;
                save_counters_tx(&mut tx, &counters).await?;
                insert_schedule(&mut tx, &schedule).await?;
                insert_audit(
                    &mut tx,
                    &AuditRecord::new(
                        "vacation_counters",
                        request.submitted_by.0.clone(),
                        "ledger.committed",
                        request.submitted_by.clone(),
                    )
                    .with_change("", schedule.days_count.to_string()),
                )
                .await?;
            }
            LedgerDirective::Revert => {
                let Some(mut schedule) = load_schedule_tx(&mut tx, &request.id).await? else {
                    return Err(EngineError::InvalidState(format!(
                        "request {} has no committed vacation schedule to revert",
                        request.id.0
                    ))
                    .into());
                };
                let mut counters = load_counters_tx(&mut tx, &request.submitted_by)
                    .await?
                    .unwrap_or_else(|| {
                        VacationCounters::new(
                            request.submitted_by.clone(),
                            self.default_entitlement,
                        )
                    });
                self.ledger.revert(&mut counters, &mut schedule)?;
                save_counters_tx(&mut tx, &counters).await?;
                update_schedule_status(&mut tx, &schedule).await?;
                insert_audit(
                    &mut tx,
                    &AuditRecord::new(
                        "vacation_counters",
                        request.submitted_by.0.clone(),
                        "ledger.reverted",
                        request.submitted_by.clone(),
                    )
                    .with_change(schedule.days_count.to_string(), ""),
                )
                .await?;
            }
        }

        for record in &outcome.audit {
            insert_audit(&mut tx, record).await?;
        }
        for notification in &outcome.notifications {
            insert_outbox(&mut tx, notification).await?;
        }
        tx.commit().await?;

        self.dispatch_all(&outcome.notifications);
        Ok(())
    }

    fn dispatch_all(&self, notifications: &[Notification]) {
        for notification in notifications {
            self.dispatcher.dispatch(notification.clone());
        }
    }

    async fn holiday_calendar(&self) -> Result<FixedHolidayCalendar, ServiceError> {
        let now = Utc::now();
        {
            let cached = self.holidays.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(cached) = cached.as_ref() {
                if !cached.is_stale(now) {
                    return Ok(cached.calendar().clone());
                }
            }
        }

        let days = SqlVacationRepository::new(self.pool.clone()).holidays().await?;
        let cached = CachedHolidays::new(days, now, Duration::minutes(HOLIDAY_CACHE_TTL_MINUTES));
        let calendar = cached.calendar().clone();
        *self.holidays.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(cached);
        Ok(calendar)
    }

    async fn load_request_or_not_found(
        &self,
        request_id: &RequestId,
    ) -> Result<Request, ServiceError> {
        SqlRequestRepository::new(self.pool.clone())
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound { entity: "request", id: request_id.0.clone() }.into()
            })
    }

    async fn load_template_or_not_found(
        &self,
        template_id: &staffly_core::domain::template::TemplateId,
    ) -> Result<RequestTemplate, ServiceError> {
        load_template(&self.pool, template_id).await?.ok_or_else(|| {
            EngineError::NotFound { entity: "request template", id: template_id.0.clone() }.into()
        })
    }

    async fn load_employee(&self, user_id: &UserId) -> Result<EmployeeProfile, ServiceError> {
        let row = sqlx::query(
            "SELECT id, full_name, department_id, role, supervisor_id, active, admin
             FROM employee WHERE id = ?",
        )
        .bind(&user_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref row) => Ok(row_to_employee(row)?),
            None => {
                Err(EngineError::NotFound { entity: "user", id: user_id.0.clone() }.into())
            }
        }
    }

    async fn load_counters(&self, user_id: &UserId) -> Result<VacationCounters, ServiceError> {
        let stored =
            SqlVacationRepository::new(self.pool.clone()).counters(user_id).await?;
        Ok(stored
            .unwrap_or_else(|| VacationCounters::new(user_id.clone(), self.default_entitlement)))
    }

    async fn request_id_for_step(
        &self,
        step_id: &StepId,
    ) -> Result<Option<RequestId>, ServiceError> {
        Ok(SqlRequestRepository::new(self.pool.clone())
            .request_id_for_step(step_id)
            .await?)
    }
}

fn contained_failure(step_id: StepId, error: &dyn std::fmt::Display) -> BulkItemResult {
    // The coordinator is the one place infrastructure failures are contained
    // as entries instead of propagating; the batch report must stay complete.
    warn!(
        event_name = "workflow.bulk_item_contained",
        step_id = %step_id.0,
        error = %error,
        "bulk approval item failed outside the engine taxonomy"
    );
    BulkItemResult::failed(
        step_id,
        &EngineError::Business(format!("step could not be processed: {error}")),
    )
}

type Tx<'t> = sqlx::Transaction<'t, sqlx::Sqlite>;

async fn insert_request(tx: &mut Tx<'_>, request: &Request) -> Result<(), ServiceError> {
    let kind_raw = serde_json::to_string(&request.kind)
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;
    let form_data_raw = serde_json::to_string(&request.form_data)
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    sqlx::query(
        "INSERT INTO request (id, template_id, kind, submitted_by, form_data, status,
                              leave_type, start_date, end_date, days_count,
                              submitted_at, completed_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&request.id.0)
    .bind(&request.template_id.0)
    .bind(&kind_raw)
    .bind(&request.submitted_by.0)
    .bind(&form_data_raw)
    .bind(request.status.as_str())
    .bind(request.vacation.as_ref().map(|span| span.leave_type.as_str()))
    .bind(request.vacation.as_ref().map(|span| span.start_date.to_string()))
    .bind(request.vacation.as_ref().map(|span| span.end_date.to_string()))
    .bind(request.vacation.as_ref().map(|span| i64::from(span.days_count)))
    .bind(request.submitted_at.to_rfc3339())
    .bind(request.completed_at.map(|at| at.to_rfc3339()))
    .execute(&mut **tx)
    .await?;

    for step in &request.steps {
        sqlx::query(
            "INSERT INTO approval_step (id, request_id, step_order, approver_id, requires_quiz,
                                        status, started_at, finished_at, comment,
                                        quiz_score, quiz_passed)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&step.id.0)
        .bind(&step.request_id.0)
        .bind(i64::from(step.step_order))
        .bind(&step.approver_id.0)
        .bind(i64::from(step.requires_quiz))
        .bind(step.status.as_str())
        .bind(step.started_at.map(|at| at.to_rfc3339()))
        .bind(step.finished_at.map(|at| at.to_rfc3339()))
        .bind(step.comment.as_deref())
        .bind(step.quiz_score.map(i64::from))
        .bind(step.quiz_passed.map(i64::from))
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

async fn load_counters_tx(
    tx: &mut Tx<'_>,
    user_id: &UserId,
) -> Result<Option<VacationCounters>, ServiceError> {
    let row = sqlx::query(
        "SELECT user_id, annual_entitlement, used, on_demand_used, circumstantial_used,
                carried_over, carried_over_expiry
         FROM vacation_counters WHERE user_id = ?",
    )
    .bind(&user_id.0)
    .fetch_optional(&mut **tx)
    .await?;

    match row {
        Some(ref row) => Ok(Some(row_to_counters(row)?)),
        None => Ok(None),
    }
}

async fn save_counters_tx(
    tx: &mut Tx<'_>,
    counters: &VacationCounters,
) -> Result<(), ServiceError> {
    sqlx::query(
        "INSERT INTO vacation_counters (user_id, annual_entitlement, used, on_demand_used,
                                        circumstantial_used, carried_over, carried_over_expiry)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(user_id) DO UPDATE SET
             annual_entitlement = excluded.annual_entitlement,
             used = excluded.used,
             on_demand_used = excluded.on_demand_used,
             circumstantial_used = excluded.circumstantial_used,
             carried_over = excluded.carried_over,
             carried_over_expiry = excluded.carried_over_expiry",
    )
    .bind(&counters.user_id.0)
    .bind(i64::from(counters.annual_entitlement))
    .bind(counters.used)
    .bind(counters.on_demand_used)
    .bind(counters.circumstantial_used)
    .bind(i64::from(counters.carried_over))
    .bind(counters.carried_over_expiry.map(|date| date.to_string()))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_schedule(tx: &mut Tx<'_>, schedule: &VacationSchedule) -> Result<(), ServiceError> {
    sqlx::query(
        "INSERT INTO vacation_schedule (id, request_id, user_id, leave_type, start_date,
                                        end_date, days_count, status, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&schedule.id.0)
    .bind(&schedule.request_id.0)
    .bind(&schedule.user_id.0)
    .bind(schedule.leave_type.as_str())
    .bind(schedule.start_date.to_string())
    .bind(schedule.end_date.to_string())
    .bind(i64::from(schedule.days_count))
    .bind(schedule.status.as_str())
    .bind(schedule.created_at.to_rfc3339())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn load_schedule_tx(
    tx: &mut Tx<'_>,
    request_id: &RequestId,
) -> Result<Option<VacationSchedule>, ServiceError> {
    let row = sqlx::query(&format!(
        "SELECT {SCHEDULE_COLUMNS} FROM vacation_schedule WHERE request_id = ?"
    ))
    .bind(&request_id.0)
    .fetch_optional(&mut **tx)
    .await?;

    match row {
        Some(ref row) => Ok(Some(row_to_schedule(row)?)),
        None => Ok(None),
    }
}

async fn update_schedule_status(
    tx: &mut Tx<'_>,
    schedule: &VacationSchedule,
) -> Result<(), ServiceError> {
    let updated = sqlx::query(
        "UPDATE vacation_schedule SET status = ? WHERE id = ? AND status = ?",
    )
    .bind(schedule.status.as_str())
    .bind(&schedule.id.0)
    .bind(ScheduleStatus::Active.as_str())
    .execute(&mut **tx)
    .await?;
    if updated.rows_affected() != 1 {
        return Err(EngineError::InvalidState(format!(
            "vacation schedule {} is not active",
            schedule.id.0
        ))
        .into());
    }
    Ok(())
}

async fn insert_audit(tx: &mut Tx<'_>, record: &AuditRecord) -> Result<(), ServiceError> {
    sqlx::query(
        "INSERT INTO audit_record (id, entity_type, entity_id, action, actor_id,
                                   old_value, new_value, reason, occurred_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.id)
    .bind(&record.entity_type)
    .bind(&record.entity_id)
    .bind(&record.action)
    .bind(&record.actor_id.0)
    .bind(record.old_value.as_deref())
    .bind(record.new_value.as_deref())
    .bind(record.reason.as_deref())
    .bind(record.occurred_at.to_rfc3339())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_outbox(tx: &mut Tx<'_>, notification: &Notification) -> Result<(), ServiceError> {
    sqlx::query(
        "INSERT INTO notification_outbox (id, user_id, kind, title, message, related_entity, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&notification.id)
    .bind(&notification.user_id.0)
    .bind(notification.kind.as_str())
    .bind(&notification.title)
    .bind(&notification.message)
    .bind(notification.related_entity.as_deref())
    .bind(notification.created_at.to_rfc3339())
    .execute(&mut **tx)
    .await?;
    Ok(())
}
