//! Internal invocation handlers.
//!
//! # Purpose
//! Expose the rotation engine and the signer through their invocation
//! contracts: a `{"step"}` event per rotation step, a whole-cycle trigger, and
//! a platform-shaped sign event answered with `{statusCode, body}`.
//!
//! # Security considerations
//! - These routes are mounted on the internal listener only. The sign event
//!   carries its own caller identity and must never be accepted from clients.
use crate::api::error::{ApiError, api_internal_message};
use crate::api::types::{CycleResponse, RotateRequest, RotateResponse, SignEvent, SignResult};
use crate::app::AppState;
use crate::rotation::workflow::WorkflowOutcome;
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;

/// Run one rotation step. Unknown or malformed steps succeed without doing
/// anything, whatever the body or content type.
///
/// # Errors
/// - Returns 500 when the step fails; the caller owns retry and alerting.
pub(crate) async fn rotate_step(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<RotateResponse>, ApiError> {
    let request = RotateRequest::from_body(&body);
    let step_name = request.step_name();
    let handled = state
        .rotator
        .handle(&step_name)
        .await
        .map_err(|err| api_internal_message(&format!("{step_name} failed: {err}")))?;
    Ok(Json(RotateResponse {
        step: request.step,
        handled: handled.is_some(),
    }))
}

/// Run a full rotation cycle now, under the rotation lease.
///
/// # Errors
/// - Returns 500 if the lease store is unavailable. A failed step is reported
///   in the body with status 200, after the failure notification went out.
pub(crate) async fn rotate_cycle(
    State(state): State<AppState>,
) -> Result<Json<CycleResponse>, ApiError> {
    let outcome = state.workflow.run().await.map_err(|err| {
        tracing::error!(error = %err, "rotation cycle could not start");
        api_internal_message("rotation lease unavailable")
    })?;
    let (failed_step, error) = match &outcome {
        WorkflowOutcome::Failed { step, error } => (Some(step.to_string()), Some(error.clone())),
        _ => (None, None),
    };
    Ok(Json(CycleResponse {
        outcome: outcome.as_str().to_string(),
        failed_step,
        error,
    }))
}

pub(crate) async fn sign_event(
    State(state): State<AppState>,
    Json(event): Json<SignEvent>,
) -> Json<SignResult> {
    let result = match state.signer.sign(event.user_arn(), event.audience()).await {
        Ok(signed) => match serde_json::to_string(&serde_json::json!({ "token": signed.token })) {
            Ok(body) => SignResult {
                status_code: 200,
                body,
            },
            Err(err) => {
                tracing::error!(error = %err, "failed to encode token response");
                SignResult {
                    status_code: 500,
                    body: "Token could not be signed".to_string(),
                }
            }
        },
        Err(err) => SignResult {
            status_code: err.status_code(),
            body: err.to_string(),
        },
    };
    Json(result)
}
