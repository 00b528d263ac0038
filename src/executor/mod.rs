pub mod query;

pub use query::QueryExecutor;
