use crate::config::EngineConfig;
use crate::core::{DbError, Result};
use crate::executor::QueryExecutor;
use crate::json::{InferenceLimits, SchemaInferenceEngine};
use crate::result::{
    ProcessingMetadata, ProcessingResult, QueryResponse, QueryResult, SchemaInfo, StageResponse,
    optimization_hints,
};
use crate::storage::{SessionRegistry, SessionStore, StagedTable, TableMaterializer};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Staging and query engine
///
/// `stage` turns a JSON document into tables of a session store and
/// answers with the session's access id; `query` runs read-only SQL against
/// a session. Sessions live in the [`SessionRegistry`] the engine was built
/// with, so several engines (or tests) can share or isolate them.
///
/// ```
/// use gqlstage::StagingEngine;
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> gqlstage::Result<()> {
/// let engine = StagingEngine::new();
/// let staged = engine.stage(&json!({"drugs": [{"name": "Imatinib"}]})).await?;
///
/// let response = engine.query(&staged.access_id, "SELECT name FROM drugs").await;
/// assert!(response.success);
/// assert_eq!(response.rows.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct StagingEngine {
    registry: Arc<SessionRegistry>,
    config: EngineConfig,
    inference: SchemaInferenceEngine,
    executor: Arc<QueryExecutor>,
}

impl StagingEngine {
    /// Engine with default configuration and its own session registry
    pub fn new() -> Self {
        let config = EngineConfig::default();
        Self::build(config, Arc::new(SessionRegistry::new()))
    }

    pub fn with_config(config: EngineConfig) -> Result<Self> {
        Self::with_registry(config, Arc::new(SessionRegistry::new()))
    }

    /// Engine over an existing registry
    pub fn with_registry(config: EngineConfig, registry: Arc<SessionRegistry>) -> Result<Self> {
        config.validate().map_err(DbError::Configuration)?;
        Ok(Self::build(config, registry))
    }

    fn build(config: EngineConfig, registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            inference: SchemaInferenceEngine::with_limits(InferenceLimits::from(&config)),
            executor: Arc::new(QueryExecutor::new(&config)),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Stage a document into a new session.
    pub async fn stage(&self, raw: &JsonValue) -> Result<StageResponse> {
        let access_id = Uuid::new_v4().to_string();
        self.stage_into(&access_id, raw).await
    }

    /// Stage a JSON text into a new session.
    pub async fn stage_str(&self, raw: &str) -> Result<StageResponse> {
        let value: JsonValue = serde_json::from_str(raw)?;
        self.stage(&value).await
    }

    /// Stage a document into the session `access_id`, creating it if needed.
    ///
    /// Loads into an existing session append: matching tables gain rows and
    /// columns, new shapes get new tables. A failed call changes nothing and
    /// leaves no new session behind.
    pub async fn stage_into(&self, access_id: &str, raw: &JsonValue) -> Result<StageResponse> {
        let started = Instant::now();

        let inference = self.inference.clone();
        let document = raw.clone();
        let draft = tokio::task::spawn_blocking(move || inference.infer(&document)).await??;
        debug!(
            access_id,
            tables = draft.tables.len(),
            junctions = draft.junctions.len(),
            rows = draft.total_rows(),
            "Inferred schema"
        );

        let session = self.registry.claim(access_id).await?;
        let handle = Arc::clone(&session);
        let sample_size = self.config.sample_size;
        let loaded = tokio::task::spawn_blocking(move || {
            let mut store = handle.lock()?;
            let report = TableMaterializer::materialize(&mut store, &draft)?;
            handle.mark_loaded();
            let tables = report
                .tables
                .iter()
                .filter_map(|name| store.catalog().get_table(name))
                .map(|table| describe_table(&store, table, sample_size))
                .collect::<Result<Vec<_>>>()?;
            Ok::<_, DbError>((report, tables, draft.pagination))
        })
        .await
        .map_err(DbError::from)
        .and_then(|loaded| loaded);

        let dropped = self.registry.release(&session).await;
        let (report, tables, pagination) = match loaded {
            Ok(loaded) => loaded,
            Err(err) => {
                warn!(access_id, error = %err, dropped_session = dropped, "Staging failed");
                return Err(err);
            }
        };

        let metadata = ProcessingMetadata {
            processing_time_ms: started.elapsed().as_millis() as u64,
            inserted_rows: report.inserted_rows,
            relationship_count: report.relationships.len(),
            optimization_hints: optimization_hints(
                &tables,
                &report.relationships,
                pagination.as_ref(),
                self.config.low_confidence_threshold,
            ),
            pagination,
        };
        let processing_details = ProcessingResult::new(tables, metadata);

        info!(
            access_id,
            tables = processing_details.table_count,
            rows = report.inserted_rows,
            elapsed_ms = processing_details.metadata.processing_time_ms,
            "Staged document"
        );

        Ok(StageResponse {
            access_id: access_id.to_string(),
            processing_details,
        })
    }

    /// Run a read-only query and wrap the outcome for the tool layer.
    pub async fn query(&self, access_id: &str, sql: &str) -> QueryResponse {
        self.try_query(access_id, sql).await.into()
    }

    /// Run a read-only query against a staged session.
    pub async fn try_query(&self, access_id: &str, sql: &str) -> Result<QueryResult> {
        let session = self.registry.get(access_id).await?;
        debug!(access_id, sql, "Running query");

        let executor = Arc::clone(&self.executor);
        let statement = sql.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let store = session.lock()?;
            executor.execute(&store, &statement)
        })
        .await?;

        if let Err(err) = &result {
            warn!(access_id, error = %err, "Query failed");
        }
        result
    }

    /// Current schema of every table in a session, with sample rows.
    pub async fn describe(&self, access_id: &str) -> Result<Vec<SchemaInfo>> {
        let session = self.registry.get(access_id).await?;
        let sample_size = self.config.sample_size;
        tokio::task::spawn_blocking(move || {
            let store = session.lock()?;
            store
                .catalog()
                .tables()
                .map(|table| describe_table(&store, table, sample_size))
                .collect::<Result<Vec<_>>>()
        })
        .await?
    }

    /// Drop a session; later queries against it fail as unknown.
    pub async fn evict(&self, access_id: &str) -> bool {
        self.registry.evict(access_id).await
    }

    /// Access ids of all live sessions.
    pub async fn sessions(&self) -> Vec<String> {
        self.registry.list().await
    }
}

impl Default for StagingEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn describe_table(store: &SessionStore, table: &StagedTable, sample_size: usize) -> Result<SchemaInfo> {
    let sample = store.sample(table, sample_size)?;
    let relationships = store.catalog().relationships_for(table.name());
    Ok(SchemaInfo::new(table, relationships, &sample))
}
