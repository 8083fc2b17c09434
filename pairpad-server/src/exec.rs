//! Code-execution proxy.
//!
//! Forwards a snippet to a judge0-compatible submission endpoint and hands
//! back whatever it answers. The call is bounded by a client-wide timeout
//! and never touches relay state.

use std::time::Duration;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Body of `POST /api/run`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub source_code: String,
    pub language_id: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("RAPIDAPI_KEY is not set")]
    MissingKey,
    #[error("judge answered {status}")]
    Upstream { status: u16, body: Value },
    #[error("judge did not answer within the timeout: {0}")]
    Timeout(String),
    #[error("judge request failed: {0}")]
    Transport(String),
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl ExecError {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ExecError::Timeout(e.to_string())
        } else {
            ExecError::Transport(e.to_string())
        }
    }

    /// HTTP status reported to the caller.
    pub fn status(&self) -> StatusCode {
        match self {
            ExecError::MissingKey | ExecError::Client(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ExecError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            ExecError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ExecError::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Value of the `error` field in the response body.
    pub fn body(&self) -> Value {
        match self {
            ExecError::Upstream { body, .. } => body.clone(),
            other => Value::String(other.to_string()),
        }
    }
}

/// Stateless forwarder to the judge.
#[derive(Debug, Clone)]
pub struct ExecutionProxy {
    client: reqwest::Client,
    endpoint: String,
    host: String,
    api_key: Option<String>,
}

impl ExecutionProxy {
    /// A blank `api_key` counts as unset.
    pub fn new(
        endpoint: impl Into<String>,
        host: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ExecError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExecError::Client(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            host: host.into(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    pub fn has_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Submit `request` and wait for the verdict.
    pub async fn run(&self, request: &RunRequest) -> Result<Value, ExecError> {
        let key = self.api_key.as_deref().ok_or(ExecError::MissingKey)?;

        let body = json!({
            "source_code": request.source_code,
            "language_id": request.language_id,
            "stdin": "",
        });
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("base64_encoded", "false"), ("wait", "true")])
            .header("x-rapidapi-host", &self.host)
            .header("x-rapidapi-key", key)
            .json(&body)
            .send()
            .await
            .map_err(ExecError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
            return Err(ExecError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        log::debug!("Judge answered {status} for language {}", request.language_id);
        response.json::<Value>().await.map_err(ExecError::from_reqwest)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    use axum::extract::Query;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};

    /// Serve `router` on a free port and return its submission URL.
    pub(crate) async fn spawn_judge(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}/submissions")
    }

    /// A judge that echoes back what it was sent.
    pub(crate) fn echo_judge() -> Router {
        async fn submit(
            Query(query): Query<HashMap<String, String>>,
            headers: HeaderMap,
            Json(body): Json<Value>,
        ) -> Json<Value> {
            let header = |name: &str| {
                headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string()
            };
            Json(json!({
                "query": query,
                "host": header("x-rapidapi-host"),
                "key": header("x-rapidapi-key"),
                "body": body,
                "stdout": "42\n",
            }))
        }
        Router::new().route("/submissions", post(submit))
    }

    fn request() -> RunRequest {
        RunRequest {
            source_code: "print(42)".into(),
            language_id: 71,
        }
    }

    fn proxy(endpoint: String, key: Option<&str>, timeout: Duration) -> ExecutionProxy {
        ExecutionProxy::new(endpoint, "judge.test", key.map(str::to_string), timeout).unwrap()
    }

    #[tokio::test]
    async fn test_forwards_body_query_and_headers() {
        let url = spawn_judge(echo_judge()).await;
        let proxy = proxy(url, Some("k-123"), Duration::from_secs(5));

        let answer = proxy.run(&request()).await.unwrap();
        assert_eq!(answer["stdout"], "42\n");
        assert_eq!(answer["host"], "judge.test");
        assert_eq!(answer["key"], "k-123");
        assert_eq!(answer["query"]["base64_encoded"], "false");
        assert_eq!(answer["query"]["wait"], "true");
        assert_eq!(
            answer["body"],
            json!({"source_code": "print(42)", "language_id": 71, "stdin": ""})
        );
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        // Nothing listens here; the key check must come first.
        let proxy = proxy("http://127.0.0.1:9/submissions".into(), None, Duration::from_secs(5));
        let err = proxy.run(&request()).await.unwrap_err();
        assert!(matches!(err, ExecError::MissingKey));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.body(), json!("RAPIDAPI_KEY is not set"));
    }

    #[tokio::test]
    async fn test_blank_key_counts_as_missing() {
        let config: crate::config::Config =
            envy::from_iter(vec![("RAPIDAPI_KEY".to_string(), String::new())]).unwrap();
        let from_env = ExecutionProxy::new(
            "http://127.0.0.1:9/submissions",
            "judge.test",
            config.rapidapi_key,
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(!from_env.has_key());

        let blank = proxy("http://127.0.0.1:9/submissions".into(), Some("  "), Duration::from_secs(5));
        assert!(!blank.has_key());
        let err = blank.run(&request()).await.unwrap_err();
        assert!(matches!(err, ExecError::MissingKey), "{err:?}");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_upstream_status_forwarded() {
        let router = Router::new().route(
            "/submissions",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, Json(json!({"message": "quota exceeded"}))) }),
        );
        let url = spawn_judge(router).await;
        let err = proxy(url, Some("k"), Duration::from_secs(5)).run(&request()).await.unwrap_err();

        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.body(), json!({"message": "quota exceeded"}));
    }

    #[tokio::test]
    async fn test_slow_judge_times_out() {
        let router = Router::new().route(
            "/submissions",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({}))
            }),
        );
        let url = spawn_judge(router).await;
        let err = proxy(url, Some("k"), Duration::from_millis(100)).run(&request()).await.unwrap_err();

        assert!(matches!(err, ExecError::Timeout(_)), "{err:?}");
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_unreachable_judge_is_bad_gateway() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("http://{addr}/submissions");
        let err = proxy(url, Some("k"), Duration::from_secs(5)).run(&request()).await.unwrap_err();
        assert!(matches!(err, ExecError::Transport(_)), "{err:?}");
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }
}
