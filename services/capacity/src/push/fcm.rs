//! Firebase Cloud Messaging (HTTP v1) sender.
//!
//! HTTP v1 has no multicast endpoint, so a multicast is sent as one request
//! per registration token, concurrently, and the per-token outcomes are
//! collected into a [`BatchResponse`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::token::AccessTokens;
use super::{BatchResponse, MulticastMessage, PushError, PushSender, SendResponse, TokenSource};

/// FCM connection settings.
#[derive(Debug, Clone)]
pub struct FcmConfig {
    /// Firebase project that owns the registrations.
    pub project_id: String,
    /// Source of OAuth2 bearer tokens with the `firebase.messaging` scope.
    pub token_source: TokenSource,
    /// API base URL.
    pub endpoint: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl FcmConfig {
    pub const DEFAULT_ENDPOINT: &'static str = "https://fcm.googleapis.com";

    pub fn new(project_id: impl Into<String>, token_source: TokenSource) -> Self {
        Self {
            project_id: project_id.into(),
            token_source,
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Serialize)]
struct SendRequest<'a> {
    message: FcmMessage<'a>,
}

#[derive(Serialize)]
struct FcmMessage<'a> {
    token: &'a str,
    data: &'a BTreeMap<String, String>,
    notification: FcmNotification<'a>,
    apns: ApnsConfig<'a>,
}

#[derive(Serialize)]
struct FcmNotification<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Serialize)]
struct ApnsConfig<'a> {
    payload: ApnsPayload<'a>,
}

#[derive(Serialize)]
struct ApnsPayload<'a> {
    aps: Aps<'a>,
}

#[derive(Serialize)]
struct Aps<'a> {
    sound: &'a str,
}

#[derive(Deserialize)]
struct SendResult {
    name: String,
}

/// Sends through the FCM HTTP v1 API.
pub struct FcmSender {
    client: reqwest::Client,
    send_url: String,
    tokens: AccessTokens,
}

impl FcmSender {
    /// Create a sender for `config`.
    pub fn new(config: &FcmConfig) -> Result<Self, PushError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        let send_url = format!(
            "{}/v1/projects/{}/messages:send",
            config.endpoint.trim_end_matches('/'),
            config.project_id
        );

        Ok(Self {
            tokens: AccessTokens::new(config.token_source.clone(), client.clone()),
            client,
            send_url,
        })
    }

    async fn send_one(
        &self,
        bearer: &str,
        message: &MulticastMessage,
        token: &str,
    ) -> SendResponse {
        let request = SendRequest {
            message: FcmMessage {
                token,
                data: &message.data,
                notification: FcmNotification {
                    title: &message.notification.title,
                    body: &message.notification.body,
                },
                apns: ApnsConfig {
                    payload: ApnsPayload {
                        aps: Aps {
                            sound: &message.apns_sound,
                        },
                    },
                },
            },
        };

        let result = self.post(bearer, &request).await;
        if let Err(error) = &result {
            warn!(error = %error, "FCM send failed for token");
        }

        SendResponse {
            token: token.to_string(),
            result,
        }
    }

    async fn post(&self, bearer: &str, request: &SendRequest<'_>) -> Result<String, String> {
        let response = self
            .client
            .post(&self.send_url)
            .bearer_auth(bearer)
            .json(request)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("{status} - {body}"));
        }

        let result: SendResult = response.json().await.map_err(|e| e.to_string())?;
        Ok(result.name)
    }
}

#[async_trait]
impl PushSender for FcmSender {
    async fn send_multicast(&self, message: &MulticastMessage) -> Result<BatchResponse, PushError> {
        message.validate()?;
        let bearer = self.tokens.bearer().await?;

        let responses = join_all(
            message
                .tokens
                .iter()
                .map(|token| self.send_one(&bearer, message, token)),
        )
        .await;

        let batch = BatchResponse { responses };
        debug!(
            success = batch.success_count(),
            failure = batch.failure_count(),
            "FCM multicast sent"
        );
        Ok(batch)
    }
}
