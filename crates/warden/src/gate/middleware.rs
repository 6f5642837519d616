//! axum middleware running the gate around a downstream service.
//!
//! Downstream handlers report their outcome by attaching an
//! `ActionOutcome` response extension:
//!
//! ```ignore
//! (StatusCode::UNAUTHORIZED, Extension(ActionOutcome::Failure), "bad password")
//! ```
//!
//! Without one, client and server error statuses count as failures.

use axum::{
    Json,
    body::Body,
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use warden_common::constants::fields as field;
use warden_common::{ActionOutcome, WardenError};

use super::controller::{Gate, Route};
use super::form::FormFields;
use crate::error::ApiError;

/// Issuance response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IssueResponse {
    pub challenge_id: String,
}

/// Gate middleware, for use with `axum::middleware::from_fn_with_state`
pub async fn captcha_gate(State(gate): State<Arc<Gate>>, request: Request, next: Next) -> Response {
    if gate.is_disabled() {
        return next.run(request).await;
    }

    let (request, fields) = match read_fields(request, gate.settings().max_form_bytes).await {
        Ok(parsed) => parsed,
        Err(err) => return ApiError(err).into_response(),
    };
    let action = fields.get(field::ACTION).unwrap_or_default().to_string();

    match gate.route(&action) {
        Route::Issue => match gate.issue().await {
            Ok(challenge_id) => Json(IssueResponse { challenge_id }).into_response(),
            Err(err) => ApiError(err).into_response(),
        },
        Route::Show => match gate.render(&fields).await {
            Ok(image) => (
                [
                    (header::CONTENT_TYPE, "image/png"),
                    (header::CACHE_CONTROL, "no-store"),
                ],
                image,
            )
                .into_response(),
            Err(err) => ApiError(err).into_response(),
        },
        Route::Action => {
            let admission = match gate.admit(&action, &fields).await {
                Ok(admission) => admission,
                Err(err) => return ApiError(err).into_response(),
            };

            let response = next.run(request).await;

            if let Some(ticket) = admission.ticket() {
                gate.report(ticket, outcome_of(&response));
            }
            response
        }
    }
}

/// Downstream outcome: the explicit marker, else derived from the status
pub fn outcome_of(response: &Response) -> ActionOutcome {
    if let Some(outcome) = response.extensions().get::<ActionOutcome>() {
        return *outcome;
    }
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        ActionOutcome::Failure
    } else {
        ActionOutcome::Success
    }
}

/// Collect form fields from an urlencoded body and the query string,
/// handing the buffered body back to the downstream service.
async fn read_fields(request: Request, limit: usize) -> Result<(Request, FormFields), WardenError> {
    let is_form = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
    let query = request.uri().query().unwrap_or_default().to_string();

    let mut fields = FormFields::new();
    let request = if is_form {
        let (parts, body) = request.into_parts();
        let bytes = axum::body::to_bytes(body, limit)
            .await
            .map_err(|_| WardenError::InvalidInput("form body too large or unreadable".to_string()))?;
        fields.merge(&String::from_utf8_lossy(&bytes));
        Request::from_parts(parts, Body::from(bytes))
    } else {
        request
    };
    fields.merge(&query);

    Ok((request, fields))
}
