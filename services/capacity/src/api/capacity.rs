//! Capacity check trigger.

use axum::{extract::State, http::StatusCode, routing::post, Router};
use tracing::{error, info};

use super::error::ApiError;
use crate::state::AppState;

/// Create capacity routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/capacity/check", post(check_capacity))
}

/// Run one capacity check.
///
/// Returns 204 when the pass completed (or another pass was already running)
/// and 500 with `{"message": ...}` otherwise. Which pool or task failed is only
/// logged.
async fn check_capacity(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let timeout = state.job_timeout();
    let report = match tokio::time::timeout(timeout, state.checker().run()).await {
        Ok(Ok(report)) => report,
        Ok(Err(e)) => {
            error!(error = %e, "Capacity check failed");
            return Err(ApiError::internal(e.to_string()));
        }
        Err(_) => {
            error!(timeout_secs = timeout.as_secs(), "Capacity check timed out");
            return Err(ApiError::internal(format!(
                "capacity check did not finish within {}s",
                timeout.as_secs()
            )));
        }
    };

    if let Some(first) = report.persist_errors().first() {
        return Err(ApiError::internal(format!(
            "failed to store notifications: {first}"
        )));
    }

    if report.skipped {
        info!("Capacity check trigger coalesced into the running pass");
    }
    Ok(StatusCode::NO_CONTENT)
}
