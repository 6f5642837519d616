//! HTTP route handlers for Warden.

use axum::{
    Json, Router,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{any, get, post},
};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::gate::captcha_gate;
use crate::state::AppState;

mod health;
mod sidecar;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    // Gated API surface: issuance and rendering are served by the gate itself
    let api = Router::new()
        .route("/api", any(unknown_action))
        .route_layer(middleware::from_fn_with_state(state.gate.clone(), captcha_gate));

    let mut router = Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/metrics", get(health::metrics));

    // Hooks for upstreams that run the gate out of process
    if let Some(token) = state.config.sidecar.token().map(Arc::<str>::from) {
        let hooks = Router::new()
            .route("/gate/admit", post(sidecar::admit))
            .route("/gate/report", post(sidecar::report))
            .route_layer(middleware::from_fn_with_state(token, sidecar::require_token));
        router = router.merge(hooks);
    } else {
        tracing::info!("Sidecar hooks disabled, no token configured");
    }

    router
        .merge(api)
        .layer(TraceLayer::new_for_http())

        // Add shared state
        .with_state(state)
}

/// Fallback for actions this service does not implement
async fn unknown_action() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "Code": "UnknownAction", "Message": "Unknown action" })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, header};
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::captcha::ChallengeEngine;
    use crate::config::{ActionConfig, AppConfig};
    use crate::gate::Gate;
    use warden_common::FailureKey;

    const TOKEN: &str = "s3cret";

    fn app() -> (Arc<Gate>, Router) {
        app_with_token(Some(TOKEN))
    }

    fn app_with_token(token: Option<&str>) -> (Arc<Gate>, Router) {
        let mut config = AppConfig::default();
        config.sidecar.token = token.map(str::to_string);
        config.captcha.actions = vec![ActionConfig {
            name: "User.Login".to_string(),
            identifier: Some("User".to_string()),
            max_fail_count: 1,
        }];
        let engine = ChallengeEngine::in_memory(Duration::from_secs(600), 4);
        let gate = Arc::new(Gate::from_config(&config.captcha, engine).unwrap());
        let router = create_router(AppState::with_gate(config, gate.clone()));
        (gate, router)
    }

    fn form_post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn hook_post(uri: &str, body: &str) -> Request<Body> {
        let mut request = form_post(uri, body);
        request
            .headers_mut()
            .insert("x-warden-token", header::HeaderValue::from_static(TOKEN));
        request
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (_, app) = app();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready_with_memory_store() {
        let (_, app) = app();
        let response = app
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_issue_and_unknown_action() {
        let (_, app) = app();
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/api?Action=GetCaptcha").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert!(body["ChallengeId"].as_str().is_some_and(|id| !id.is_empty()));

        let response = app
            .oneshot(Request::builder().uri("/api?Action=Nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["Code"], "UnknownAction");
    }

    #[tokio::test]
    async fn test_sidecar_round_trip() {
        let (gate, app) = app();

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(hook_post("/gate/admit", "Action=User.Login&User=alice"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = json_body(response).await;
            assert_eq!(body["Allowed"], true);
            assert_eq!(body["Tracked"], true);

            let response = app
                .clone()
                .oneshot(hook_post("/gate/report", "Action=User.Login&User=alice&Outcome=failure"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NO_CONTENT);
        }

        let response = app
            .clone()
            .oneshot(hook_post("/gate/admit", "Action=User.Login&User=alice"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["Code"], "MissingCaptcha");

        let response = app
            .clone()
            .oneshot(hook_post("/gate/report", "Action=User.Login&User=alice&Outcome=bogus"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["stats"]["failures_recorded"], 2);
        assert_eq!(body["stats"]["rejected_missing"], 1);
        assert_eq!(gate.stats().tracked_keys, 1);
    }

    #[tokio::test]
    async fn test_report_without_token_is_rejected() {
        let (gate, app) = app();
        let key = FailureKey::new("User.Login", "alice");
        gate.tracker().set(key.clone(), 3);

        let response = app
            .clone()
            .oneshot(form_post("/gate/report", "Action=User.Login&User=alice&Outcome=success"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["Code"], "Unauthorized");

        let mut wrong = form_post("/gate/report", "Action=User.Login&User=alice&Outcome=success");
        wrong
            .headers_mut()
            .insert("x-warden-token", header::HeaderValue::from_static("guess"));
        let response = app.clone().oneshot(wrong).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(gate.tracker().get(&key), Some(3));

        // The gated API still demands a challenge
        let response = app
            .oneshot(form_post("/api", "Action=User.Login&User=alice"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["Code"], "MissingCaptcha");
    }

    #[tokio::test]
    async fn test_hooks_not_served_without_token() {
        let (gate, app) = app_with_token(None);
        let key = FailureKey::new("User.Login", "alice");
        gate.tracker().set(key.clone(), 3);

        let response = app
            .oneshot(hook_post("/gate/report", "Action=User.Login&User=alice&Outcome=success"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(gate.tracker().get(&key), Some(3));
    }
}
