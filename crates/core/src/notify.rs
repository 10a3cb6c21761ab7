use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::employee::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    StepAssigned,
    RequestApproved,
    RequestRejected,
    RequestCancelled,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StepAssigned => "step_assigned",
            Self::RequestApproved => "request_approved",
            Self::RequestRejected => "request_rejected",
            Self::RequestCancelled => "request_cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "step_assigned" => Some(Self::StepAssigned),
            "request_approved" => Some(Self::RequestApproved),
            "request_rejected" => Some(Self::RequestRejected),
            "request_cancelled" => Some(Self::RequestCancelled),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related_entity: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: UserId,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        related_entity: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            kind,
            title: title.into(),
            message: message.into(),
            related_entity,
            created_at: Utc::now(),
        }
    }
}

/// Fire-and-forget dispatch contract. Delivery failures are the dispatcher's
/// problem to log; they must never roll back the transition that produced
/// the notification.
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, notification: Notification);
}

#[derive(Clone, Default)]
pub struct InMemoryNotificationDispatcher {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl InMemoryNotificationDispatcher {
    pub fn sent(&self) -> Vec<Notification> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl NotificationDispatcher for InMemoryNotificationDispatcher {
    fn dispatch(&self, notification: Notification) {
        match self.sent.lock() {
            Ok(mut sent) => sent.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        InMemoryNotificationDispatcher, Notification, NotificationDispatcher, NotificationKind,
    };
    use crate::domain::employee::UserId;

    #[test]
    fn in_memory_dispatcher_captures_notifications() {
        let dispatcher = InMemoryNotificationDispatcher::default();
        dispatcher.dispatch(Notification::new(
            UserId("u-hr".to_string()),
            NotificationKind::StepAssigned,
            "Approval needed",
            "A vacation request is waiting for your decision.",
            Some("REQ-1".to_string()),
        ));

        let sent = dispatcher.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NotificationKind::StepAssigned);
        assert_eq!(sent[0].related_entity.as_deref(), Some("REQ-1"));
    }
}
