pub mod error;
pub mod types;
pub mod value;

pub use error::{DbError, Result};
pub use types::{Column, ColumnRole, ColumnType, Row, TypeTracker, observe};
pub use value::Value;
