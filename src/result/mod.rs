pub mod hints;
#[allow(clippy::module_inception)]
mod result;

pub use hints::optimization_hints;
pub use result::{
    ColumnInfo, ProcessingMetadata, ProcessingResult, QueryResponse, QueryResult, SchemaInfo,
    StageResponse,
};
