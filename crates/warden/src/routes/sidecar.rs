//! Out-of-process gate hooks.
//!
//! An upstream that cannot embed the middleware calls `/gate/admit` with the
//! request's fields before running the action, and `/gate/report` with the
//! same fields plus `Outcome` afterwards. Both require the shared secret in
//! `X-Warden-Token`; a report moves failure counters, so it must never be
//! reachable by the callers being gated.

use axum::{
    Json,
    extract::{RawForm, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;

use warden_common::constants::{fields as field, headers};
use warden_common::{ActionOutcome, WardenError};

use crate::error::ApiError;
use crate::gate::FormFields;
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AdmitResponse {
    allowed: bool,
    tracked: bool,
    verified: bool,
}

/// Reject hook calls that do not carry the configured token
pub async fn require_token(State(token): State<Arc<str>>, request: Request, next: Next) -> Response {
    let presented = request
        .headers()
        .get(headers::SIDECAR_TOKEN)
        .and_then(|v| v.to_str().ok());
    if presented != Some(&*token) {
        tracing::warn!(path = %request.uri().path(), "Rejected sidecar call without a valid token");
        return ApiError(WardenError::Unauthorized("missing or invalid sidecar token".to_string()))
            .into_response();
    }
    next.run(request).await
}

fn parse_fields(raw: &[u8]) -> Result<(FormFields, String), ApiError> {
    let fields = FormFields::parse(&String::from_utf8_lossy(raw));
    let action = fields
        .non_empty(field::ACTION)
        .ok_or_else(|| WardenError::InvalidInput("missing Action".to_string()))?
        .to_string();
    Ok((fields, action))
}

/// Before hook
pub async fn admit(
    State(state): State<AppState>,
    RawForm(raw): RawForm,
) -> Result<Json<AdmitResponse>, ApiError> {
    let (fields, action) = parse_fields(&raw)?;
    let admission = state.gate.admit(&action, &fields).await?;

    Ok(Json(AdmitResponse {
        allowed: true,
        tracked: admission.ticket().is_some(),
        verified: admission.verified(),
    }))
}

/// After hook
pub async fn report(
    State(state): State<AppState>,
    RawForm(raw): RawForm,
) -> Result<StatusCode, ApiError> {
    let (fields, action) = parse_fields(&raw)?;
    let outcome = fields
        .non_empty(field::OUTCOME)
        .and_then(ActionOutcome::parse)
        .ok_or_else(|| WardenError::InvalidInput("Outcome must be success or failure".to_string()))?;

    if let Some(ticket) = state.gate.ticket_for(&action, &fields) {
        state.gate.report(&ticket, outcome);
    }
    Ok(StatusCode::NO_CONTENT)
}
