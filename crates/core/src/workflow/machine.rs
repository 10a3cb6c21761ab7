use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::audit::AuditRecord;
use crate::domain::employee::UserId;
use crate::domain::request::{Request, RequestStatus, StepId, StepStatus};
use crate::domain::template::RequestTemplate;
use crate::errors::EngineError;
use crate::notify::{Notification, NotificationKind};
use crate::workflow::quiz::{self, QuizAnswer, QuizOutcome};

/// Limits applied to approver-supplied text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MachinePolicy {
    pub min_reason_len: usize,
    pub max_comment_len: usize,
}

impl Default for MachinePolicy {
    fn default() -> Self {
        Self { min_reason_len: 10, max_comment_len: 2000 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveCommand {
    pub step_id: StepId,
    pub actor: UserId,
    pub comment: Option<String>,
    pub quiz_answers: Vec<QuizAnswer>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectCommand {
    pub step_id: StepId,
    pub actor: UserId,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelCommand {
    pub actor: UserId,
    pub actor_is_admin: bool,
    pub reason: Option<String>,
}

/// What the persistence layer must do with the ledger inside the same
/// transaction that stores the transitioned request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedgerDirective {
    None,
    Commit,
    Revert,
}

/// Result of one accepted transition: the mutated request plus the side
/// effects the caller persists and dispatches atomically with it.
#[derive(Clone, Debug)]
pub struct TransitionOutcome {
    pub request: Request,
    pub decided_step: Option<StepId>,
    pub activated_step: Option<StepId>,
    pub quiz: Option<QuizOutcome>,
    pub ledger: LedgerDirective,
    pub notifications: Vec<Notification>,
    pub audit: Vec<AuditRecord>,
}

/// The per-request approval state machine. Pure: it owns no storage and
/// performs no I/O; callers load the request, apply one transition, and
/// persist the outcome as a single atomic unit.
///
/// Step states move `Pending -> InReview -> {Approved, Rejected}` and are
/// terminal once decided. Preconditions are checked in a fixed order
/// (missing step, wrong approver, wrong state) so callers see stable error
/// kinds, and repeating a decision on a terminal step always fails
/// `InvalidState` rather than silently succeeding.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApprovalStepMachine {
    policy: MachinePolicy,
}

impl ApprovalStepMachine {
    pub fn new(policy: MachinePolicy) -> Self {
        Self { policy }
    }

    pub fn approve(
        &self,
        mut request: Request,
        template: &RequestTemplate,
        command: ApproveCommand,
    ) -> Result<TransitionOutcome, EngineError> {
        let (step_order, requires_quiz) =
            self.check_actionable(&request, &command.step_id, &command.actor)?;

        if let Some(comment) = &command.comment {
            if comment.len() > self.policy.max_comment_len {
                return Err(EngineError::validation(
                    "comment",
                    format!("must be at most {} characters", self.policy.max_comment_len),
                ));
            }
        }

        // Quiz gate: a failed knowledge check rejects the step outright and
        // is not retryable within this step.
        let mut quiz_outcome = None;
        if requires_quiz {
            if template.quiz_bank.is_empty() {
                return Err(EngineError::validation(
                    "quiz",
                    "step requires a quiz but the template has no questions",
                ));
            }

            let outcome =
                quiz::evaluate(&template.quiz_bank, template.quiz_passing_score, &command.quiz_answers);
            quiz_outcome = Some(outcome);

            if !outcome.passed {
                let system_comment = format!(
                    "Knowledge check failed: scored {}% (required {}%)",
                    outcome.score_pct, template.quiz_passing_score
                );
                return self.reject_step(
                    request,
                    command.step_id,
                    command.actor,
                    system_comment,
                    quiz_outcome,
                    "step.quiz_failed",
                );
            }
        }

        let now = Utc::now();
        let Some(step) = request.step_mut(&command.step_id) else {
            return Err(EngineError::NotFound {
                entity: "approval step",
                id: command.step_id.0.clone(),
            });
        };
        step.status = StepStatus::Approved;
        step.finished_at = Some(now);
        step.comment = command.comment;
        if let Some(outcome) = quiz_outcome {
            step.quiz_score = Some(outcome.score_pct);
            step.quiz_passed = Some(true);
        }

        let mut audit = vec![AuditRecord::new(
            "approval_step",
            command.step_id.0.clone(),
            "step.approved",
            command.actor.clone(),
        )
        .with_change(StepStatus::InReview.as_str(), StepStatus::Approved.as_str())];
        let mut notifications = Vec::new();
        let mut activated_step = None;
        let mut ledger = LedgerDirective::None;

        let next_id = request.next_pending_after(step_order).map(|step| step.id.clone());
        if let Some(next_step_id) = next_id {
            // Advance the pointer: completing this step and activating the
            // next are one atomic unit, which is what keeps exactly one step
            // in review per request.
            let Some(next) = request.step_mut(&next_step_id) else {
                return Err(EngineError::NotFound {
                    entity: "approval step",
                    id: next_step_id.0.clone(),
                });
            };
            next.status = StepStatus::InReview;
            next.started_at = Some(now);
            let next_approver = next.approver_id.clone();

            if request.status == RequestStatus::Submitted {
                request.status = RequestStatus::InReview;
            }

            audit.push(
                AuditRecord::new(
                    "approval_step",
                    next_step_id.0.clone(),
                    "step.activated",
                    command.actor.clone(),
                )
                .with_change(StepStatus::Pending.as_str(), StepStatus::InReview.as_str()),
            );
            notifications.push(Notification::new(
                next_approver,
                NotificationKind::StepAssigned,
                "Approval needed".to_string(),
                format!("Request {} is waiting for your decision.", request.id.0),
                Some(request.id.0.clone()),
            ));
            activated_step = Some(next_step_id);
        } else {
            let old_status = request.status;
            request.status = RequestStatus::Approved;
            request.completed_at = Some(now);
            if request.kind.consumes_vacation_days() {
                ledger = LedgerDirective::Commit;
            }

            audit.push(
                AuditRecord::new(
                    "request",
                    request.id.0.clone(),
                    "request.approved",
                    command.actor.clone(),
                )
                .with_change(old_status.as_str(), RequestStatus::Approved.as_str()),
            );
            notifications.push(Notification::new(
                request.submitted_by.clone(),
                NotificationKind::RequestApproved,
                "Request approved".to_string(),
                format!("Your request {} was approved.", request.id.0),
                Some(request.id.0.clone()),
            ));
        }

        Ok(TransitionOutcome {
            request,
            decided_step: Some(command.step_id),
            activated_step,
            quiz: quiz_outcome,
            ledger,
            notifications,
            audit,
        })
    }

    pub fn reject(
        &self,
        request: Request,
        command: RejectCommand,
    ) -> Result<TransitionOutcome, EngineError> {
        self.check_actionable(&request, &command.step_id, &command.actor)?;

        let reason = command.reason.trim().to_string();
        if reason.len() < self.policy.min_reason_len {
            return Err(EngineError::validation(
                "reason",
                format!("must be at least {} characters", self.policy.min_reason_len),
            ));
        }
        if reason.len() > self.policy.max_comment_len {
            return Err(EngineError::validation(
                "reason",
                format!("must be at most {} characters", self.policy.max_comment_len),
            ));
        }

        self.reject_step(request, command.step_id, command.actor, reason, None, "step.rejected")
    }

    /// Cancel an open request (submitter or admin), or revert an approved
    /// vacation request (admin only).
    pub fn cancel(
        &self,
        mut request: Request,
        command: CancelCommand,
    ) -> Result<TransitionOutcome, EngineError> {
        let old_status = request.status;

        let ledger = match request.status {
            RequestStatus::Submitted | RequestStatus::InReview => {
                if request.submitted_by != command.actor && !command.actor_is_admin {
                    return Err(EngineError::Forbidden {
                        actor: command.actor.0.clone(),
                        entity: "request",
                        id: request.id.0.clone(),
                    });
                }
                LedgerDirective::None
            }
            RequestStatus::Approved if request.kind.consumes_vacation_days() => {
                if !command.actor_is_admin {
                    return Err(EngineError::Forbidden {
                        actor: command.actor.0.clone(),
                        entity: "request",
                        id: request.id.0.clone(),
                    });
                }
                LedgerDirective::Revert
            }
            _ => {
                return Err(EngineError::InvalidState(format!(
                    "request {} is {} and cannot be cancelled",
                    request.id.0,
                    request.status.as_str()
                )));
            }
        };

        let now = Utc::now();
        request.status = RequestStatus::Cancelled;
        request.completed_at = Some(now);

        let mut audit_record = AuditRecord::new(
            "request",
            request.id.0.clone(),
            "request.cancelled",
            command.actor.clone(),
        )
        .with_change(old_status.as_str(), RequestStatus::Cancelled.as_str());
        if let Some(reason) = &command.reason {
            audit_record = audit_record.with_reason(reason.clone());
        }

        let notifications = vec![Notification::new(
            request.submitted_by.clone(),
            NotificationKind::RequestCancelled,
            "Request cancelled".to_string(),
            format!("Request {} was cancelled.", request.id.0),
            Some(request.id.0.clone()),
        )];

        Ok(TransitionOutcome {
            request,
            decided_step: None,
            activated_step: None,
            quiz: None,
            ledger,
            notifications,
            audit: vec![audit_record],
        })
    }

    /// Shared precondition ladder: missing step -> wrong approver -> wrong
    /// state. Returns the step's order and quiz flag on success.
    fn check_actionable(
        &self,
        request: &Request,
        step_id: &StepId,
        actor: &UserId,
    ) -> Result<(u32, bool), EngineError> {
        let Some(step) = request.step(step_id) else {
            return Err(EngineError::NotFound { entity: "approval step", id: step_id.0.clone() });
        };

        if &step.approver_id != actor {
            return Err(EngineError::Forbidden {
                actor: actor.0.clone(),
                entity: "approval step",
                id: step_id.0.clone(),
            });
        }

        if request.status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "request {} is already {}",
                request.id.0,
                request.status.as_str()
            )));
        }

        if step.status != StepStatus::InReview {
            return Err(EngineError::InvalidState(format!(
                "step {} is {} and cannot be decided",
                step_id.0,
                step.status.as_str()
            )));
        }

        Ok((step.step_order, step.requires_quiz))
    }

    fn reject_step(
        &self,
        mut request: Request,
        step_id: StepId,
        actor: UserId,
        reason: String,
        quiz_outcome: Option<QuizOutcome>,
        step_action: &str,
    ) -> Result<TransitionOutcome, EngineError> {
        let now = Utc::now();
        let old_status = request.status;

        let Some(step) = request.step_mut(&step_id) else {
            return Err(EngineError::NotFound { entity: "approval step", id: step_id.0.clone() });
        };
        step.status = StepStatus::Rejected;
        step.finished_at = Some(now);
        step.comment = Some(reason.clone());
        if let Some(outcome) = quiz_outcome {
            step.quiz_score = Some(outcome.score_pct);
            step.quiz_passed = Some(false);
        }

        // Rejection at any step terminates the whole request; later steps
        // are never independently retried.
        request.status = RequestStatus::Rejected;
        request.completed_at = Some(now);

        let audit = vec![
            AuditRecord::new("approval_step", step_id.0.clone(), step_action, actor.clone())
                .with_change(StepStatus::InReview.as_str(), StepStatus::Rejected.as_str())
                .with_reason(reason.clone()),
            AuditRecord::new("request", request.id.0.clone(), "request.rejected", actor.clone())
                .with_change(old_status.as_str(), RequestStatus::Rejected.as_str())
                .with_reason(reason.clone()),
        ];
        let notifications = vec![Notification::new(
            request.submitted_by.clone(),
            NotificationKind::RequestRejected,
            "Request rejected".to_string(),
            format!("Your request {} was rejected: {reason}", request.id.0),
            Some(request.id.0.clone()),
        )];

        Ok(TransitionOutcome {
            request,
            decided_step: Some(step_id),
            activated_step: None,
            quiz: quiz_outcome,
            ledger: LedgerDirective::None,
            notifications,
            audit,
        })
    }
}
