use async_trait::async_trait;
use tracing::info;

use super::{BatchResponse, MulticastMessage, PushError, PushSender, SendResponse};

/// Logs messages instead of delivering them. Every token counts as delivered.
#[derive(Debug, Clone, Default)]
pub struct LogSender;

#[async_trait]
impl PushSender for LogSender {
    async fn send_multicast(&self, message: &MulticastMessage) -> Result<BatchResponse, PushError> {
        message.validate()?;
        info!(
            tokens = message.tokens.len(),
            title = %message.notification.title,
            url = message.data.get("url").map(String::as_str).unwrap_or_default(),
            "Push delivery disabled; logging message"
        );
        Ok(BatchResponse {
            responses: message
                .tokens
                .iter()
                .map(|token| SendResponse {
                    token: token.clone(),
                    result: Ok("logged".to_string()),
                })
                .collect(),
        })
    }
}
