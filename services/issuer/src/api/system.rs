use crate::api::error::{ApiError, api_internal};
use crate::api::types::HealthStatus;
use crate::app::AppState;
use axum::Json;
use axum::extract::State;

/// Probe the key store by resolving the CURRENT alias.
///
/// # Errors
/// - Returns 500 if the key store cannot be reached.
pub(crate) async fn system_health(
    State(state): State<AppState>,
) -> Result<Json<HealthStatus>, ApiError> {
    let current = state
        .keys
        .describe_key(&state.rotator.aliases().current)
        .await
        .map_err(|err| api_internal("key store unavailable", &err))?;
    Ok(Json(HealthStatus {
        status: "ok".to_string(),
        key_backend: state.keys.backend_name().to_string(),
        current_key_bound: current.is_some(),
    }))
}
