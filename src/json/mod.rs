//! JSON staging front half
//!
//! Everything that happens before rows touch the store: identifier rules,
//! schema inference over the raw document, relationship detection, and the
//! SQL text the materializer and executor run.
//!
//! # Architecture
//!
//! - `schema_inference.rs` - depth-first walk producing a `DraftSchema`
//! - `relationships.rs` - foreign key vs junction table decisions
//! - `draft.rs` - the inferred tables, rows and junctions of one batch
//! - `pagination.rs` - GraphQL connection unwrapping and page info
//! - `naming.rs` - table/column naming and sanitization
//! - `converter.rs` - DDL/DML builders
//! - `validator.rs` - read-only query validation

pub mod converter;
pub mod draft;
pub mod naming;
pub mod pagination;
pub mod relationships;
pub mod schema_inference;
pub mod validator;

pub use draft::{DraftSchema, DraftTable};
pub use pagination::PaginationInfo;
pub use relationships::{Relationship, RelationshipKind};
pub use schema_inference::{InferenceLimits, SchemaInferenceEngine};
pub use validator::QueryValidator;
