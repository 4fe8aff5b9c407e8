// HTTP query backend - calls the broker `/exec` endpoint
use crate::application::error::BackendError;
use crate::application::query_backend::{ExecRequest, QueryBackend};
use crate::domain::result_set::ResultSet;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpQueryBackend {
    client: reqwest::Client,
    exec_url: String,
}

/// Error body returned by the backend alongside a non-success status.
#[derive(Debug, Deserialize)]
struct ErrorPayload {
    data: String,
}

impl HttpQueryBackend {
    pub fn new(base_url: &str, exec_path: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            exec_url: format!(
                "{}/{}",
                base_url.trim_end_matches('/'),
                exec_path.trim_start_matches('/')
            ),
        })
    }

    pub fn exec_url(&self) -> &str {
        &self.exec_url
    }
}

#[async_trait]
impl QueryBackend for HttpQueryBackend {
    async fn exec(&self, request: &ExecRequest) -> Result<ResultSet, BackendError> {
        tracing::debug!(sql = %request.sql, db = ?request.db, "executing query");

        let response = self
            .client
            .post(&self.exec_url)
            .header("Accept", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(BackendError::NotFound);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorPayload>(&body)
                .map(|payload| payload.data)
                .unwrap_or(body);
            return Err(BackendError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<ResultSet>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode as AxumStatus, response::IntoResponse, routing::post};

    async fn exec_handler(Json(req): Json<ExecRequest>) -> axum::response::Response {
        match req.sql.as_str() {
            "select ok" => Json(serde_json::json!({
                "metricName": "cpu",
                "startTime": 0,
                "endTime": 200,
                "interval": 100,
                "series": [{"tags": {"db": req.db.unwrap_or_default()}, "fields": {"f": {"100": 1.5}}}]
            }))
            .into_response(),
            "select missing" => AxumStatus::NOT_FOUND.into_response(),
            "select bad" => (
                AxumStatus::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"data": "field not found"})),
            )
                .into_response(),
            "select plain" => (AxumStatus::BAD_REQUEST, "syntax error").into_response(),
            _ => "not json".into_response(),
        }
    }

    async fn spawn_backend() -> String {
        let router = Router::new().route("/api/exec", post(exec_handler));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/api/", addr)
    }

    fn request(sql: &str) -> ExecRequest {
        ExecRequest {
            sql: sql.to_string(),
            db: Some("_internal".to_string()),
        }
    }

    #[tokio::test]
    async fn test_exec_url_joins_path() {
        let backend = HttpQueryBackend::new("http://broker:9000/api/", "/exec", Duration::from_secs(1)).unwrap();
        assert_eq!(backend.exec_url(), "http://broker:9000/api/exec");
    }

    #[tokio::test]
    async fn test_exec_outcomes() {
        let base = spawn_backend().await;
        let backend = HttpQueryBackend::new(&base, "exec", Duration::from_secs(5)).unwrap();

        let rs = backend.exec(&request("select ok")).await.unwrap();
        assert_eq!(rs.series[0].tags["db"], "_internal");
        assert_eq!(rs.series[0].fields["f"].get(&100), Some(&1.5));

        assert!(matches!(
            backend.exec(&request("select missing")).await,
            Err(BackendError::NotFound)
        ));

        match backend.exec(&request("select bad")).await {
            Err(BackendError::Status { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "field not found");
            }
            other => panic!("unexpected: {:?}", other),
        }

        match backend.exec(&request("select plain")).await {
            Err(BackendError::Status { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "syntax error");
            }
            other => panic!("unexpected: {:?}", other),
        }

        assert!(matches!(
            backend.exec(&request("select other")).await,
            Err(BackendError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let backend = HttpQueryBackend::new(&format!("http://{}", addr), "/exec", Duration::from_secs(1)).unwrap();
        assert!(matches!(
            backend.exec(&request("select ok")).await,
            Err(BackendError::Transport(_))
        ));
    }
}
