use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::employee::UserId;
use crate::domain::template::{RequestKind, TemplateId};
use crate::domain::vacation::LeaveType;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Submitted,
    InReview,
    Approved,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::InReview => "in_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "submitted" => Some(Self::Submitted),
            "in_review" => Some(Self::InReview),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Cancelled)
    }

    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InReview,
    Approved,
    Rejected,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InReview => "in_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in_review" => Some(Self::InReview),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

/// One ordinal position in a request's approval chain, bound to a concrete
/// approver at submission time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub id: StepId,
    pub request_id: RequestId,
    /// 1-based, unique per request, defines the sequence.
    pub step_order: u32,
    pub approver_id: UserId,
    pub requires_quiz: bool,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub comment: Option<String>,
    pub quiz_score: Option<u32>,
    pub quiz_passed: Option<bool>,
}

/// Dates attached to a vacation-kind request at submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VacationSpan {
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days_count: u32,
}

/// One submitted instance of a template. The step sequence is frozen at
/// submission; steps transition strictly in order and the request becomes
/// immutable once terminal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub template_id: TemplateId,
    pub kind: RequestKind,
    pub submitted_by: UserId,
    pub form_data: serde_json::Value,
    pub status: RequestStatus,
    pub steps: Vec<ApprovalStep>,
    pub vacation: Option<VacationSpan>,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Request {
    pub fn step(&self, step_id: &StepId) -> Option<&ApprovalStep> {
        self.steps.iter().find(|step| &step.id == step_id)
    }

    pub fn step_mut(&mut self, step_id: &StepId) -> Option<&mut ApprovalStep> {
        self.steps.iter_mut().find(|step| &step.id == step_id)
    }

    /// The single step currently awaiting a decision, if any.
    pub fn active_step(&self) -> Option<&ApprovalStep> {
        self.steps.iter().find(|step| step.status == StepStatus::InReview)
    }

    pub fn next_pending_after(&self, order: u32) -> Option<&ApprovalStep> {
        self.steps
            .iter()
            .filter(|step| step.status == StepStatus::Pending && step.step_order > order)
            .min_by_key(|step| step.step_order)
    }

    pub fn is_last_step(&self, order: u32) -> bool {
        self.next_pending_after(order).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::{RequestStatus, StepStatus};

    #[test]
    fn request_status_round_trips_from_storage_encoding() {
        let cases = [
            RequestStatus::Submitted,
            RequestStatus::InReview,
            RequestStatus::Approved,
            RequestStatus::Rejected,
            RequestStatus::Cancelled,
        ];

        for status in cases {
            assert_eq!(RequestStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn step_status_round_trips_from_storage_encoding() {
        let cases = [
            StepStatus::Pending,
            StepStatus::InReview,
            StepStatus::Approved,
            StepStatus::Rejected,
        ];

        for status in cases {
            assert_eq!(StepStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn terminal_statuses_are_closed() {
        assert!(RequestStatus::Approved.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
        assert!(RequestStatus::Cancelled.is_terminal());
        assert!(RequestStatus::Submitted.is_open());
        assert!(RequestStatus::InReview.is_open());
    }
}
