//! In-memory draft of the relational shape inferred from one staging batch.
//!
//! Tables are addressed by index ([`TableId`]) while the walk is running;
//! references between rows are kept as `(table, row)` pairs and only turn
//! into primary keys when the materializer assigns them.

use super::naming::{self, same_name};
use super::pagination::PaginationInfo;
use super::relationships::Relationship;
use crate::core::{ColumnType, TypeTracker};
use serde_json::{Map, Value as JsonValue};
use std::collections::{HashMap, HashSet};

pub type TableId = usize;

/// Where a draft column's values come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSource {
    /// A scalar (or json-typed) field of the JSON object.
    Field(String),
    /// Synthetic key on a parent row pointing at a nested object's row.
    Reference { field: String, target: TableId },
    /// Synthetic key on a child row pointing back at the row that held it.
    Parent { parent: TableId },
}

#[derive(Debug, Clone)]
pub struct DraftColumn {
    pub name: String,
    pub source: ColumnSource,
    pub tracker: TypeTracker,
}

impl DraftColumn {
    pub fn column_type(&self) -> ColumnType {
        match self.source {
            ColumnSource::Field(_) => self.tracker.column_type(),
            _ => ColumnType::Integer,
        }
    }

    pub fn is_field(&self) -> bool {
        matches!(self.source, ColumnSource::Field(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Value(JsonValue),
    Ref { table: TableId, row: usize },
}

#[derive(Debug, Clone, Default)]
pub struct DraftRow {
    pub cells: Vec<(usize, Cell)>,
}

impl DraftRow {
    pub fn set(&mut self, column: usize, cell: Cell) {
        match self.cells.iter_mut().find(|(c, _)| *c == column) {
            Some((_, existing)) => *existing = cell,
            None => self.cells.push((column, cell)),
        }
    }

    pub fn get(&self, column: usize) -> Option<&Cell> {
        self.cells.iter().find(|(c, _)| *c == column).map(|(_, cell)| cell)
    }
}

#[derive(Debug, Clone)]
pub struct DraftTable {
    pub name: String,
    /// Dotted JSON path of the first place this entity was found.
    pub path: String,
    pub columns: Vec<DraftColumn>,
    pub rows: Vec<DraftRow>,
    pub pagination: Option<PaginationInfo>,
    /// Canonical content of array-held rows -> (row, owning parent row).
    pub(crate) content_index: HashMap<String, (usize, (TableId, usize))>,
}

impl DraftTable {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            pagination: None,
            content_index: HashMap::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn find_column(&self, source: &ColumnSource) -> Option<usize> {
        self.columns.iter().position(|c| &c.source == source)
    }

    pub fn column_named(&self, name: &str) -> Option<&DraftColumn> {
        self.columns.iter().find(|c| same_name(&c.name, name))
    }

    /// Index of the column for `source`, declaring it under a unique name if new.
    pub fn ensure_column(&mut self, source: ColumnSource, preferred: &str) -> usize {
        if let Some(idx) = self.find_column(&source) {
            return idx;
        }
        let name = naming::unique_name(preferred, |candidate| {
            same_name(candidate, naming::PRIMARY_KEY) || self.column_named(candidate).is_some()
        });
        self.columns.push(DraftColumn {
            name,
            source,
            tracker: TypeTracker::new(),
        });
        self.columns.len() - 1
    }

    /// Lower-cased names of the scalar field columns, the shape used for
    /// matching tables against each other.
    pub fn field_names(&self) -> HashSet<String> {
        self.columns
            .iter()
            .filter(|c| c.is_field())
            .map(|c| c.name.to_ascii_lowercase())
            .collect()
    }

    /// Whether a column is missing or null in at least one row.
    pub fn is_nullable(&self, column: usize) -> bool {
        self.rows.iter().any(|row| match row.get(column) {
            None => true,
            Some(Cell::Value(v)) => v.is_null(),
            Some(Cell::Ref { .. }) => false,
        })
    }
}

/// Synthetic many-to-many table linking parent rows to shared child rows.
#[derive(Debug, Clone)]
pub struct DraftJunction {
    pub name: String,
    pub parent: TableId,
    pub child: TableId,
    pub parent_column: String,
    pub child_column: String,
    pub pairs: Vec<(usize, usize)>,
}

/// Everything inferred from one staging batch.
#[derive(Debug, Clone, Default)]
pub struct DraftSchema {
    pub tables: Vec<DraftTable>,
    pub junctions: Vec<DraftJunction>,
    pub relationships: Vec<Relationship>,
    /// Pagination of the first top-level connection, echoed on queries.
    pub pagination: Option<PaginationInfo>,
}

impl DraftSchema {
    pub fn table(&self, id: TableId) -> &DraftTable {
        &self.tables[id]
    }

    pub fn find_table(&self, name: &str) -> Option<TableId> {
        self.tables.iter().position(|t| same_name(&t.name, name))
    }

    pub fn name_taken(&self, name: &str) -> bool {
        self.find_table(name).is_some() || self.junctions.iter().any(|j| same_name(&j.name, name))
    }

    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows.len()).sum::<usize>()
            + self.junctions.iter().map(|j| j.pairs.len()).sum::<usize>()
    }

    /// Canonical form of an object with keys sorted at every level, so
    /// identical content compares equal regardless of key order.
    pub fn canonical(obj: &Map<String, JsonValue>) -> String {
        let mut out = String::new();
        write_object(obj, &mut out);
        out
    }
}

fn write_object(map: &Map<String, JsonValue>, out: &mut String) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    out.push('{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&JsonValue::String(key.clone()).to_string());
        out.push(':');
        write_canonical(&map[key], out);
    }
    out.push('}');
}

fn write_canonical(value: &JsonValue, out: &mut String) {
    match value {
        JsonValue::Object(map) => write_object(map, out),
        JsonValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}
