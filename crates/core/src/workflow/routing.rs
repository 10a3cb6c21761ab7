use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::AuditRecord;
use crate::calendar::HolidayCalendar;
use crate::directory::DirectorySnapshot;
use crate::domain::employee::{EmployeeProfile, UserId};
use crate::domain::request::{
    ApprovalStep, Request, RequestId, RequestStatus, StepId, StepStatus, VacationSpan,
};
use crate::domain::template::{ApprovalStepTemplate, RequestTemplate};
use crate::domain::vacation::VacationCounters;
use crate::ledger::VacationLedger;
use crate::notify::{Notification, NotificationKind};
use crate::workflow::resolver::{resolve_approver, ResolveError};

/// One problem found while validating a submission. Routing collects every
/// issue before failing so the submitter gets a single combined report
/// instead of a fix-one-resubmit loop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoutingIssue {
    Approver { ordinal: u32, detail: String },
    Template { detail: String },
    Field { field: String, detail: String },
    Vacation { detail: String },
}

impl RoutingIssue {
    fn approver(ordinal: u32, error: &ResolveError) -> Self {
        Self::Approver { ordinal, detail: error.to_string() }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Approver { ordinal, detail } => format!("step {ordinal}: {detail}"),
            Self::Template { detail } | Self::Vacation { detail } => detail.clone(),
            Self::Field { field, detail } => format!("{field}: {detail}"),
        }
    }
}

/// Everything routing needs besides the template and submitter. Snapshots and
/// collaborators come in by injection so planning stays deterministic.
pub struct SubmissionContext<'a> {
    pub directory: &'a DirectorySnapshot,
    pub calendar: &'a dyn HolidayCalendar,
    /// The submitter's balances; required for vacation-kind templates.
    pub counters: Option<&'a VacationCounters>,
    pub today: NaiveDate,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VacationDates {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// A step template bound to its concrete approver.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedStep {
    pub ordinal: u32,
    pub approver_id: UserId,
    pub requires_quiz: bool,
}

/// The fully planned submission: the request to persist plus the side
/// effects to run with it. `ledger_commit` is set on the approval-free fast
/// path, where the request is born approved.
#[derive(Clone, Debug)]
pub struct SubmissionPlan {
    pub request: Request,
    pub ledger_commit: bool,
    pub notifications: Vec<Notification>,
    pub audit: Vec<AuditRecord>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RequestRoutingService {
    ledger: VacationLedger,
}

impl RequestRoutingService {
    pub fn new(ledger: VacationLedger) -> Self {
        Self { ledger }
    }

    /// Resolve every step template, accumulating all failures instead of
    /// stopping at the first.
    pub fn validate_approval_structure(
        &self,
        submitter: &EmployeeProfile,
        steps: &[ApprovalStepTemplate],
        directory: &DirectorySnapshot,
    ) -> Result<Vec<ResolvedStep>, Vec<RoutingIssue>> {
        let mut resolved = Vec::with_capacity(steps.len());
        let mut issues = Vec::new();

        for step in steps {
            match resolve_approver(&step.approver, submitter, directory) {
                Ok(approver_id) => resolved.push(ResolvedStep {
                    ordinal: step.ordinal,
                    approver_id,
                    requires_quiz: step.requires_quiz,
                }),
                Err(error) => issues.push(RoutingIssue::approver(step.ordinal, &error)),
            }
        }

        if issues.is_empty() {
            Ok(resolved)
        } else {
            Err(issues)
        }
    }

    /// Validate and materialize a submission. Returns the request plus its
    /// side effects, or the full list of problems found.
    pub fn plan_submission(
        &self,
        template: &RequestTemplate,
        submitter: &EmployeeProfile,
        form_data: serde_json::Value,
        vacation_dates: Option<VacationDates>,
        context: &SubmissionContext<'_>,
    ) -> Result<SubmissionPlan, Vec<RoutingIssue>> {
        let mut issues = Vec::new();

        let resolved = if template.requires_approval {
            if template.steps.is_empty() {
                issues.push(RoutingIssue::Template {
                    detail: "template requires approval but defines no steps".to_string(),
                });
            } else if !template.has_independent_approver() {
                issues.push(RoutingIssue::Template {
                    detail: "template routes every step to the submitter; at least one \
                             independent approver is required"
                        .to_string(),
                });
            }

            match self.validate_approval_structure(submitter, &template.steps, context.directory) {
                Ok(resolved) => resolved,
                Err(mut approver_issues) => {
                    issues.append(&mut approver_issues);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let vacation = self.plan_vacation_span(template, vacation_dates, context, &mut issues);

        if !issues.is_empty() {
            return Err(issues);
        }

        let now = Utc::now();
        let request_id = RequestId(Uuid::new_v4().to_string());
        let mut notifications = Vec::new();
        let mut audit = Vec::new();

        audit.push(
            AuditRecord::new("request", request_id.0.clone(), "request.submitted", submitter.id.clone())
                .with_change("", RequestStatus::Submitted.as_str()),
        );

        let request = if template.requires_approval {
            let steps = build_steps(&request_id, &resolved);
            if let Some(first) = steps.first() {
                notifications.push(Notification::new(
                    first.approver_id.clone(),
                    NotificationKind::StepAssigned,
                    format!("Approval needed: {}", template.name),
                    format!(
                        "{} submitted a {} request that is waiting for your decision.",
                        submitter.full_name, template.name
                    ),
                    Some(request_id.0.clone()),
                ));
            }

            Request {
                id: request_id,
                template_id: template.id.clone(),
                kind: template.kind.clone(),
                submitted_by: submitter.id.clone(),
                form_data,
                status: RequestStatus::Submitted,
                steps,
                vacation,
                submitted_at: now,
                completed_at: None,
            }
        } else {
            // No approval chain: the request is born approved and, for
            // vacation kinds, committed in the same unit.
            audit.push(
                AuditRecord::new(
                    "request",
                    request_id.0.clone(),
                    "request.approved",
                    submitter.id.clone(),
                )
                .with_change(RequestStatus::Submitted.as_str(), RequestStatus::Approved.as_str())
                .with_reason("template does not require approval"),
            );
            notifications.push(Notification::new(
                submitter.id.clone(),
                NotificationKind::RequestApproved,
                format!("{} approved", template.name),
                format!("Your {} request was approved automatically.", template.name),
                Some(request_id.0.clone()),
            ));

            Request {
                id: request_id,
                template_id: template.id.clone(),
                kind: template.kind.clone(),
                submitted_by: submitter.id.clone(),
                form_data,
                status: RequestStatus::Approved,
                steps: Vec::new(),
                vacation,
                submitted_at: now,
                completed_at: Some(now),
            }
        };

        let ledger_commit =
            request.status == RequestStatus::Approved && request.kind.consumes_vacation_days();

        Ok(SubmissionPlan { request, ledger_commit, notifications, audit })
    }

    fn plan_vacation_span(
        &self,
        template: &RequestTemplate,
        vacation_dates: Option<VacationDates>,
        context: &SubmissionContext<'_>,
        issues: &mut Vec<RoutingIssue>,
    ) -> Option<VacationSpan> {
        let leave_type = template.kind.leave_type()?;

        let Some(dates) = vacation_dates else {
            issues.push(RoutingIssue::Field {
                field: "start_date".to_string(),
                detail: "vacation requests require a start and end date".to_string(),
            });
            return None;
        };

        let days = match self.ledger.business_days_between(
            dates.start_date,
            dates.end_date,
            context.calendar,
        ) {
            Ok(days) => days,
            Err(_) => {
                issues.push(RoutingIssue::Field {
                    field: "end_date".to_string(),
                    detail: "end date must not be before start date".to_string(),
                });
                return None;
            }
        };

        if days == 0 {
            issues.push(RoutingIssue::Field {
                field: "end_date".to_string(),
                detail: "the requested span contains no business days".to_string(),
            });
            return None;
        }

        match context.counters {
            Some(counters) => {
                let availability =
                    self.ledger.validate_availability(counters, leave_type, days, context.today);
                if !availability.can_take {
                    issues.push(RoutingIssue::Vacation {
                        detail: availability
                            .reason
                            .unwrap_or_else(|| "vacation balance exhausted".to_string()),
                    });
                    return None;
                }
            }
            None => {
                issues.push(RoutingIssue::Vacation {
                    detail: "no vacation balance on record for the submitter".to_string(),
                });
                return None;
            }
        }

        Some(VacationSpan {
            leave_type,
            start_date: dates.start_date,
            end_date: dates.end_date,
            days_count: days,
        })
    }
}

/// Materialize step records from resolved approvers: `step_order` 1..N, all
/// pending except the first, which is immediately actionable.
pub fn build_steps(request_id: &RequestId, resolved: &[ResolvedStep]) -> Vec<ApprovalStep> {
    let now = Utc::now();
    resolved
        .iter()
        .enumerate()
        .map(|(index, step)| {
            let first = index == 0;
            ApprovalStep {
                id: StepId(Uuid::new_v4().to_string()),
                request_id: request_id.clone(),
                step_order: index as u32 + 1,
                approver_id: step.approver_id.clone(),
                requires_quiz: step.requires_quiz,
                status: if first { StepStatus::InReview } else { StepStatus::Pending },
                started_at: first.then_some(now),
                finished_at: None,
                comment: None,
                quiz_score: None,
                quiz_passed: None,
            }
        })
        .collect()
}
