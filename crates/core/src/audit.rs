use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::employee::UserId;

/// One committed change as seen by the audit sink. Emitted for every state
/// transition: submission, approve, reject, cancel, ledger commit/revert, and
/// admin adjustments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub actor_id: UserId,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        action: impl Into<String>,
        actor_id: UserId,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            action: action.into(),
            actor_id,
            old_value: None,
            new_value: None,
            reason: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_change(
        mut self,
        old_value: impl Into<String>,
        new_value: impl Into<String>,
    ) -> Self {
        self.old_value = Some(old_value.into());
        self.new_value = Some(new_value.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl InMemoryAuditSink {
    pub fn records(&self) -> Vec<AuditRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AuditRecord, AuditSink, InMemoryAuditSink};
    use crate::domain::employee::UserId;

    #[test]
    fn in_memory_sink_records_change_fields() {
        let sink = InMemoryAuditSink::default();
        sink.record(
            AuditRecord::new("request", "REQ-1", "step.approved", UserId("u-mgr".to_string()))
                .with_change("in_review", "approved")
                .with_reason("looks good"),
        );

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].entity_id, "REQ-1");
        assert_eq!(records[0].old_value.as_deref(), Some("in_review"));
        assert_eq!(records[0].new_value.as_deref(), Some("approved"));
        assert_eq!(records[0].reason.as_deref(), Some("looks good"));
    }
}
