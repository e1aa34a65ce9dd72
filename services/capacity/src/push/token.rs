//! OAuth2 bearer tokens for the FCM API.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::PushError;

/// Token endpoint of the GCE/GKE metadata server.
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens are refreshed this long before they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Where the sender gets its bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// Fixed token. Google access tokens expire after about an hour, so this
    /// must be rotated externally (restart with a fresh value) on long runs.
    Static(String),
    /// Service-account token from the metadata server, cached until shortly
    /// before expiry.
    MetadataServer { url: String },
}

impl TokenSource {
    pub fn metadata_server() -> Self {
        Self::MetadataServer {
            url: METADATA_TOKEN_URL.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Resolves bearer tokens from a [`TokenSource`].
pub(crate) struct AccessTokens {
    source: TokenSource,
    client: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl AccessTokens {
    pub(crate) fn new(source: TokenSource, client: reqwest::Client) -> Self {
        Self {
            source,
            client,
            cached: Mutex::new(None),
        }
    }

    /// Current bearer token, fetching a new one when the cached one is stale.
    pub(crate) async fn bearer(&self) -> Result<String, PushError> {
        let url = match &self.source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::MetadataServer { url } => url,
        };

        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .client
            .get(url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::Token(format!("{status} - {body}")));
        }
        let token: TokenResponse = response.json().await?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(REFRESH_MARGIN);
        debug!(expires_in = token.expires_in, "Fetched FCM access token");
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }
}
