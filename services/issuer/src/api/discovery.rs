//! Serves the published JWKS and OpenID configuration from the artifact store.
use crate::api::error::{ApiError, api_internal, api_not_found};
use crate::app::AppState;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use sts_jose::{JWKS_PATH, OPENID_CONFIGURATION_PATH};

pub(crate) async fn jwks(State(state): State<AppState>) -> Result<Response, ApiError> {
    published(&state, JWKS_PATH).await
}

pub(crate) async fn openid_configuration(
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    published(&state, OPENID_CONFIGURATION_PATH).await
}

async fn published(state: &AppState, key: &str) -> Result<Response, ApiError> {
    let body = state
        .artifacts
        .get(key)
        .await
        .map_err(|err| api_internal("failed to load artifact", &err))?
        .ok_or_else(|| api_not_found("artifact not published yet"))?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}
