pub mod catalog;
pub mod materializer;
pub mod registry;
pub mod rows;
pub mod session;
pub mod table;

pub use catalog::Catalog;
pub use materializer::{LoadReport, TableMaterializer};
pub use registry::SessionRegistry;
pub use rows::{RowSet, read_rows};
pub use session::{SessionHandle, SessionStore};
pub use table::{StagedTable, TableKind};
