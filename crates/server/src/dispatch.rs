use staffly_core::notify::{Notification, NotificationDispatcher};
use tracing::info;

/// Dispatcher used by the server runtime. Delivery mechanics live behind the
/// notification gateway; here every outbox entry is surfaced as a structured
/// log line, and failures cannot exist to roll anything back.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingDispatcher;

impl NotificationDispatcher for TracingDispatcher {
    fn dispatch(&self, notification: Notification) {
        info!(
            event_name = "notify.dispatched",
            notification_id = %notification.id,
            user_id = %notification.user_id.0,
            kind = notification.kind.as_str(),
            related_entity = notification.related_entity.as_deref().unwrap_or("-"),
            "{}",
            notification.title
        );
    }
}
