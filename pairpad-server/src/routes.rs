use std::sync::Arc;

use axum::extract::State;
use axum::http::header::InvalidHeaderValue;
use axum::http::{header, HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::exec::{ExecError, ExecutionProxy, RunRequest};

/// Shared state for HTTP handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub proxy: Arc<ExecutionProxy>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

impl IntoResponse for ExecError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.body() }))).into_response()
    }
}

/// Build the HTTP router with credentialed CORS for `cors_origin`.
pub fn create_routes(state: AppState, cors_origin: &str) -> Result<Router, InvalidHeaderValue> {
    let cors = CorsLayer::new()
        .allow_origin(cors_origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    Ok(Router::new()
        .route("/health", get(health_check))
        .route("/token", get(issue_token))
        .route("/api/run", post(run_code))
        .layer(cors)
        .with_state(state))
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    log::debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Server is running".to_string(),
    })
}

/// Fresh random room token: 16 random bytes as 32 hex characters.
pub async fn issue_token() -> Json<TokenResponse> {
    Json(TokenResponse {
        token: uuid::Uuid::new_v4().simple().to_string(),
    })
}

/// Forward a snippet to the judge.
pub async fn run_code(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> Result<Json<Value>, ExecError> {
    match state.proxy.run(&request).await {
        Ok(answer) => Ok(Json(answer)),
        Err(e) => {
            log::error!("Code execution failed: {e}");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::exec::tests::{echo_judge, spawn_judge};

    fn app(endpoint: &str, key: Option<&str>) -> Router {
        let proxy = ExecutionProxy::new(endpoint, "judge.test", key.map(str::to_string), Duration::from_secs(5)).unwrap();
        create_routes(AppState { proxy: Arc::new(proxy) }, "http://localhost:5173").unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn run_request(body: Value) -> Request<Body> {
        Request::post("/api/run")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app("http://127.0.0.1:9/submissions", None)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_token_is_32_hex_chars() {
        let response = app("http://127.0.0.1:9/submissions", None)
            .oneshot(Request::get("/token").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        let token = body["token"].as_str().unwrap();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_run_without_key_is_500() {
        let response = app("http://127.0.0.1:9/submissions", None)
            .oneshot(run_request(json!({"source_code": "1", "language_id": 71})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await, json!({"error": "RAPIDAPI_KEY is not set"}));
    }

    #[tokio::test]
    async fn test_run_returns_judge_answer() {
        let url = spawn_judge(echo_judge()).await;
        let response = app(&url, Some("k"))
            .oneshot(run_request(json!({"source_code": "print(42)", "language_id": 71})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["stdout"], "42\n");
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin() {
        let request = Request::get("/health")
            .header("origin", "http://localhost:5173")
            .body(Body::empty())
            .unwrap();
        let response = app("http://127.0.0.1:9/submissions", None).oneshot(request).await.unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "http://localhost:5173"
        );
        assert_eq!(
            response.headers().get("access-control-allow-credentials").unwrap(),
            "true"
        );
    }

    #[tokio::test]
    async fn test_invalid_cors_origin_is_refused() {
        let proxy = ExecutionProxy::new("http://127.0.0.1:9/submissions", "judge.test", None, Duration::from_secs(5)).unwrap();
        let state = AppState { proxy: Arc::new(proxy) };
        assert!(create_routes(state, "http://bad\norigin").is_err());
    }

    #[tokio::test]
    async fn test_other_origin_is_not_echoed() {
        let request = Request::get("/health")
            .header("origin", "http://evil.test")
            .body(Body::empty())
            .unwrap();
        let response = app("http://127.0.0.1:9/submissions", None).oneshot(request).await.unwrap();
        let allowed = response.headers().get("access-control-allow-origin");
        assert_ne!(allowed.and_then(|v| v.to_str().ok()), Some("http://evil.test"));
    }
}
