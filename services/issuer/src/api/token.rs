//! Public token endpoint.
//!
//! The caller ARN is read from the configured identity header, which must be
//! set (and stripped from client input) by the authenticating gateway in front
//! of this service.
use crate::api::error::sign_error_response;
use crate::api::types::{TokenQuery, TokenResponse};
use crate::app::AppState;
use axum::Json;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};

pub(crate) async fn issue_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> Response {
    let user_arn = headers
        .get(state.identity_header.as_str())
        .and_then(|value| value.to_str().ok());
    match state.signer.sign(user_arn, query.aud.as_deref()).await {
        Ok(signed) => Json(TokenResponse {
            token: signed.token,
        })
        .into_response(),
        Err(err) => sign_error_response(&err),
    }
}
