//! Push notification transport.
//!
//! The capacity checker only needs "send this message to these devices and
//! tell me how it went"; [`PushSender`] is that seam. [`FcmSender`] talks to
//! Firebase Cloud Messaging, [`LogSender`] just logs for local runs.

mod fcm;
mod logging;
mod token;

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::capacity::model::Notification;

pub use fcm::{FcmConfig, FcmSender};
pub use logging::LogSender;
pub use token::{TokenSource, METADATA_TOKEN_URL};

/// FCM refuses multicast batches larger than this.
pub const MAX_MULTICAST_TOKENS: usize = 500;

/// Errors that prevent a multicast from being attempted at all.
///
/// Failures for individual devices are reported in [`BatchResponse`] instead.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("multicast message has no registration tokens")]
    EmptyTokens,

    #[error("multicast message has {0} registration tokens; at most {MAX_MULTICAST_TOKENS} allowed")]
    TooManyTokens(usize),

    #[error("access token unavailable: {0}")]
    Token(String),

    #[error("push client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Visible part of a push notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayNotification {
    pub title: String,
    pub body: String,
}

/// One payload addressed to several device registrations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulticastMessage {
    pub tokens: Vec<String>,
    pub data: BTreeMap<String, String>,
    pub notification: DisplayNotification,
    /// APNs sound name.
    pub apns_sound: String,
}

impl MulticastMessage {
    /// Push for a stored overflow notification: deep link in the data
    /// payload, default alert sound on Apple devices.
    pub fn for_notification(notification: &Notification, tokens: Vec<String>) -> Self {
        let mut data = BTreeMap::new();
        data.insert("url".to_string(), notification.url.clone());
        Self {
            tokens,
            data,
            notification: DisplayNotification {
                title: notification.title.clone(),
                body: notification.body.clone(),
            },
            apns_sound: "default".to_string(),
        }
    }

    /// Rejects token lists FCM would refuse.
    pub fn validate(&self) -> Result<(), PushError> {
        if self.tokens.is_empty() {
            return Err(PushError::EmptyTokens);
        }
        if self.tokens.len() > MAX_MULTICAST_TOKENS {
            return Err(PushError::TooManyTokens(self.tokens.len()));
        }
        Ok(())
    }
}

/// Delivery result for one registration token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResponse {
    pub token: String,
    /// Provider message name on success, error description otherwise.
    pub result: Result<String, String>,
}

impl SendResponse {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-token report for one multicast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResponse {
    pub responses: Vec<SendResponse>,
}

impl BatchResponse {
    pub fn success_count(&self) -> usize {
        self.responses.iter().filter(|r| r.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.responses.len() - self.success_count()
    }
}

/// Sends multicast push messages.
#[async_trait]
pub trait PushSender: Send + Sync {
    /// Sends `message` to every token in it.
    ///
    /// An `Err` means nothing was attempted; per-device failures come back in
    /// the [`BatchResponse`].
    async fn send_multicast(&self, message: &MulticastMessage) -> Result<BatchResponse, PushError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::model::{NotificationTemplate, Task};
    use chrono::Utc;
    use laterq_id::{TaskId, UserId};

    fn notification() -> Notification {
        let task = Task {
            id: TaskId::new(),
            pool_id: None,
            created_at: Utc::now(),
        };
        Notification::for_overflowed_task(UserId::new(), &task, &NotificationTemplate::default())
    }

    #[test]
    fn test_message_carries_link_and_default_sound() {
        let n = notification();
        let msg = MulticastMessage::for_notification(&n, vec!["a".into(), "b".into()]);
        assert_eq!(msg.data.get("url"), Some(&n.url));
        assert_eq!(msg.data.len(), 1);
        assert_eq!(msg.notification.title, n.title);
        assert_eq!(msg.notification.body, n.body);
        assert_eq!(msg.apns_sound, "default");
        assert_eq!(msg.tokens, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_validate_token_count() {
        let n = notification();
        assert!(matches!(
            MulticastMessage::for_notification(&n, vec![]).validate(),
            Err(PushError::EmptyTokens)
        ));
        let many = vec!["t".to_string(); MAX_MULTICAST_TOKENS + 1];
        assert!(matches!(
            MulticastMessage::for_notification(&n, many).validate(),
            Err(PushError::TooManyTokens(501))
        ));
        let max = vec!["t".to_string(); MAX_MULTICAST_TOKENS];
        assert!(MulticastMessage::for_notification(&n, max).validate().is_ok());
    }

    #[test]
    fn test_batch_counts() {
        let batch = BatchResponse {
            responses: vec![
                SendResponse {
                    token: "a".into(),
                    result: Ok("projects/p/messages/1".into()),
                },
                SendResponse {
                    token: "b".into(),
                    result: Err("UNREGISTERED".into()),
                },
            ],
        };
        assert_eq!(batch.success_count(), 1);
        assert_eq!(batch.failure_count(), 1);
    }
}
