use crate::core::Result;
use crate::facade::StagingEngine;
use crate::result::{QueryResponse, StageResponse};
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// The two calls a tool layer makes into a staging engine.
///
/// Lets the front end hold `Arc<dyn StagingBackend>` and swap in a fake in
/// its own tests.
#[async_trait]
pub trait StagingBackend: Send + Sync {
    /// Stage a document into a fresh session and report what was created.
    async fn stage(&self, raw: &JsonValue) -> Result<StageResponse>;

    /// Run a read-only query against a staged session.
    async fn query(&self, access_id: &str, sql: &str) -> QueryResponse;
}

#[async_trait]
impl StagingBackend for StagingEngine {
    async fn stage(&self, raw: &JsonValue) -> Result<StageResponse> {
        StagingEngine::stage(self, raw).await
    }

    async fn query(&self, access_id: &str, sql: &str) -> QueryResponse {
        StagingEngine::query(self, access_id, sql).await
    }
}
