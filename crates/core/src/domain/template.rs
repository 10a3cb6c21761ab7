use serde::{Deserialize, Serialize};

use crate::domain::employee::{GroupId, UserId};
use crate::domain::vacation::LeaveType;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuestionId(pub String);

/// What kind of thing a template produces. Only vacation kinds engage the
/// vacation ledger on final approval.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestKind {
    Vacation { leave_type: LeaveType },
    Equipment,
    Access,
    Other { label: String },
}

impl RequestKind {
    pub fn leave_type(&self) -> Option<LeaveType> {
        match self {
            Self::Vacation { leave_type } => Some(*leave_type),
            _ => None,
        }
    }

    pub fn consumes_vacation_days(&self) -> bool {
        matches!(self, Self::Vacation { .. })
    }
}

/// How one approval step's approver is resolved against the directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApproverSpec {
    Role { role: String },
    SpecificUser { user_id: UserId },
    UserGroup { group_id: GroupId },
    Submitter,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStepTemplate {
    /// 1-based position in the chain.
    pub ordinal: u32,
    pub approver: ApproverSpec,
    pub requires_quiz: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: QuestionId,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_option: u32,
}

/// Immutable definition of a request type. Once a request references a
/// template, the template may no longer be deleted or edited.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestTemplate {
    pub id: TemplateId,
    pub name: String,
    pub kind: RequestKind,
    pub requires_approval: bool,
    pub steps: Vec<ApprovalStepTemplate>,
    pub quiz_bank: Vec<QuizQuestion>,
    /// Percent score required on quiz-gated steps.
    pub quiz_passing_score: u32,
}

impl RequestTemplate {
    /// A template that requires approval must route to at least one approver
    /// who is not the submitter themself.
    pub fn has_independent_approver(&self) -> bool {
        self.steps.iter().any(|step| !matches!(step.approver, ApproverSpec::Submitter))
    }
}
