use serde::{Deserialize, Serialize};

use crate::domain::request::StepId;
use crate::errors::{EngineError, ErrorKind};

/// Upper bound on step ids accepted by one bulk call.
pub const BULK_APPROVAL_CAP: usize = 50;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BulkOutcome {
    Approved,
    Failed { kind: ErrorKind, message: String },
}

/// Per-step result of a bulk approval. Failures are entries, not exceptions:
/// one bad step never aborts or rolls back its siblings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemResult {
    pub step_id: StepId,
    pub outcome: BulkOutcome,
}

impl BulkItemResult {
    pub fn approved(step_id: StepId) -> Self {
        Self { step_id, outcome: BulkOutcome::Approved }
    }

    pub fn failed(step_id: StepId, error: &EngineError) -> Self {
        Self {
            step_id,
            outcome: BulkOutcome::Failed { kind: error.kind(), message: error.to_string() },
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self.outcome, BulkOutcome::Approved)
    }
}

pub fn validate_batch_size(count: usize) -> Result<(), EngineError> {
    if count == 0 {
        return Err(EngineError::validation("step_ids", "at least one step id is required"));
    }
    if count > BULK_APPROVAL_CAP {
        return Err(EngineError::validation(
            "step_ids",
            format!("at most {BULK_APPROVAL_CAP} steps may be approved per call, got {count}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{validate_batch_size, BulkItemResult, BulkOutcome, BULK_APPROVAL_CAP};
    use crate::domain::request::StepId;
    use crate::errors::{EngineError, ErrorKind};

    #[test]
    fn batch_size_cap_is_enforced() {
        assert!(validate_batch_size(1).is_ok());
        assert!(validate_batch_size(BULK_APPROVAL_CAP).is_ok());
        assert!(validate_batch_size(BULK_APPROVAL_CAP + 1).is_err());
        assert!(validate_batch_size(0).is_err());
    }

    #[test]
    fn failed_entries_carry_the_error_kind() {
        let error = EngineError::Forbidden {
            actor: "u-other".to_string(),
            entity: "approval step",
            id: "step-2".to_string(),
        };
        let result = BulkItemResult::failed(StepId("step-2".to_string()), &error);

        assert!(!result.is_approved());
        assert!(matches!(
            result.outcome,
            BulkOutcome::Failed { kind: ErrorKind::Forbidden, .. }
        ));
    }
}
