// Query backend trait - the seam between the pipeline and the `/exec` endpoint
use crate::application::error::BackendError;
use crate::domain::result_set::ResultSet;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Body of an `/exec` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecRequest {
    pub sql: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db: Option<String>,
}

#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Execute one final query string and return its result set.
    async fn exec(&self, request: &ExecRequest) -> Result<ResultSet, BackendError>;
}
