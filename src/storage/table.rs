use crate::core::{Column, ColumnRole, ColumnType};
use crate::json::PaginationInfo;
use crate::json::naming::same_name;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableKind {
    Entity,
    /// Pairs of keys into `parent.id` and `child.id`.
    Junction { parent: String, child: String },
}

/// Catalog entry for one physical table of a session store.
#[derive(Debug, Clone)]
pub struct StagedTable {
    name: String,
    kind: TableKind,
    columns: Vec<Column>,
    row_count: usize,
    max_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pagination: Option<PaginationInfo>,
}

impl StagedTable {
    /// Entity table; starts with its synthetic primary key only.
    pub fn entity(name: impl Into<String>) -> Self {
        Self::with_columns(name, TableKind::Entity, vec![Column::primary_key()])
    }

    pub fn junction(
        name: impl Into<String>,
        parent: impl Into<String>,
        child: impl Into<String>,
        parent_column: impl Into<String>,
        child_column: impl Into<String>,
    ) -> Self {
        let parent = parent.into();
        let child = child.into();
        let columns = vec![
            Column::foreign_key(parent_column, parent.clone()).not_null(),
            Column::foreign_key(child_column, child.clone()).not_null(),
        ];
        Self::with_columns(name, TableKind::Junction { parent, child }, columns)
    }

    fn with_columns(name: impl Into<String>, kind: TableKind, columns: Vec<Column>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            kind,
            columns,
            row_count: 0,
            max_id: 0,
            created_at: now,
            updated_at: now,
            pagination: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &TableKind {
        &self.kind
    }

    pub fn is_junction(&self) -> bool {
        matches!(self.kind, TableKind::Junction { .. })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| same_name(&c.name, name))
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| same_name(&c.name, name))
    }

    pub fn add_column(&mut self, column: Column) {
        self.columns.push(column);
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.column(name).map(Column::column_type)
    }

    /// Lower-cased names of the data columns, compared against incoming
    /// shapes when deciding whether a re-stage extends this table.
    pub fn data_column_names(&self) -> HashSet<String> {
        self.columns
            .iter()
            .filter(|c| c.is_data())
            .map(|c| c.name.to_ascii_lowercase())
            .collect()
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Highest primary key handed out so far; new rows continue after it.
    pub fn max_id(&self) -> i64 {
        self.max_id
    }

    /// Account for rows appended by a load.
    pub fn record_load(&mut self, inserted: usize, max_id: i64) {
        self.row_count += inserted;
        self.max_id = self.max_id.max(max_id);
        self.updated_at = Utc::now();
    }
}
