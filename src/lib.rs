// ============================================================================
// gqlstage Library
// ============================================================================
//
// Stages arbitrary (typically GraphQL) JSON responses as relational tables in
// isolated per-session stores and answers read-only SQL against them.

pub mod config;
pub mod core;
pub mod executor;
pub mod facade;
pub mod interface;
pub mod json;
pub mod result;
pub mod storage;

// Re-export main types for convenience
pub use config::EngineConfig;
pub use core::{Column, ColumnType, DbError, Result, Row, Value};
pub use facade::StagingEngine;
pub use interface::StagingBackend;
pub use json::{PaginationInfo, Relationship, RelationshipKind};
pub use result::{
    ColumnInfo, ProcessingMetadata, ProcessingResult, QueryResponse, QueryResult, SchemaInfo,
    StageResponse,
};
pub use storage::SessionRegistry;
