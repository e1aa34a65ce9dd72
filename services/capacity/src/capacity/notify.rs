//! Building, storing and pushing overflow notifications.
//!
//! Notifications are built from the overflowed tasks themselves, not from
//! the remediation results: the owner hears about every overflowed task,
//! including ones that could not be moved.

use laterq_id::UserId;
use tracing::{info, warn};

use super::model::{DeviceToken, Notification, NotificationTemplate, Task};
use crate::push::{MulticastMessage, PushSender};

/// One notification per overflowed task, addressed to `owner_id`.
pub fn build_notifications(
    owner_id: UserId,
    overflowed: &[Task],
    template: &NotificationTemplate,
) -> Vec<Notification> {
    overflowed
        .iter()
        .map(|task| Notification::for_overflowed_task(owner_id, task, template))
        .collect()
}

/// Outcome of pushing a pool's notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Messages the push provider accepted (possibly partially).
    pub messages_sent: usize,
    /// Messages that could not be sent at all.
    pub messages_failed: usize,
    /// Individual device deliveries that failed.
    pub device_failures: usize,
}

/// Sends one multicast per notification to all of `devices`.
///
/// Each message is independent: a failed send is logged and the rest still
/// go out. Nothing is sent when `devices` is empty.
pub async fn dispatch(
    push: &dyn PushSender,
    notifications: &[Notification],
    devices: &[DeviceToken],
) -> DispatchSummary {
    let mut summary = DispatchSummary::default();
    if notifications.is_empty() || devices.is_empty() {
        return summary;
    }

    let tokens: Vec<String> = devices
        .iter()
        .map(|d| d.registration_token.clone())
        .collect();

    for notification in notifications {
        let message = MulticastMessage::for_notification(notification, tokens.clone());
        match push.send_multicast(&message).await {
            Ok(batch) => {
                info!(
                    notification_id = %notification.id,
                    task_id = %notification.task_id,
                    success = batch.success_count(),
                    failure = batch.failure_count(),
                    "Sent overflow push"
                );
                summary.messages_sent += 1;
                summary.device_failures += batch.failure_count();
            }
            Err(e) => {
                warn!(
                    notification_id = %notification.id,
                    task_id = %notification.task_id,
                    error = %e,
                    "Failed to send overflow push"
                );
                summary.messages_failed += 1;
            }
        }
    }

    summary
}
