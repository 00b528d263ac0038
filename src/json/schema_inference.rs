//! Schema Inference Module
//!
//! Walks a staged JSON document depth-first and builds a [`DraftSchema`]:
//! one table per entity shape, one row per JSON object, columns unified with
//! the widening lattice of [`ColumnType`](crate::core::ColumnType).
//!
//! Accepted roots:
//! - a GraphQL envelope `{ "data": {...}, "errors"?, "extensions"? }`
//! - an object of query fields (every value nested), one table family per field
//! - any other object, staged as the single row of table `root`
//! - an array, staged as the rows of table `root`

use super::draft::{Cell, ColumnSource, DraftRow, DraftSchema, DraftTable, TableId};
use super::naming::{self, ROOT_TABLE, same_name};
use super::relationships::{
    ArrayEdge, FieldShape, ObjectEdge, RelationshipDetector, classify_field, fingerprint,
    is_column_shape,
};
use crate::config::EngineConfig;
use crate::core::{ColumnType, DbError, Result};
use serde_json::{Map, Value as JsonValue, json};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

const ENVELOPE_KEYS: [&str; 3] = ["data", "errors", "extensions"];

/// Bounds on the size of a single staging batch.
#[derive(Debug, Clone, Copy)]
pub struct InferenceLimits {
    pub max_depth: usize,
    pub max_rows: usize,
}

impl From<&EngineConfig> for InferenceLimits {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            max_rows: config.max_rows,
        }
    }
}

impl Default for InferenceLimits {
    fn default() -> Self {
        InferenceLimits::from(&EngineConfig::default())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaInferenceEngine {
    limits: InferenceLimits,
}

impl SchemaInferenceEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: InferenceLimits) -> Self {
        Self { limits }
    }

    /// Infer the draft schema (tables, rows, relationships) of one document.
    pub fn infer(&self, root: &JsonValue) -> Result<DraftSchema> {
        let root = unwrap_envelope(root)?;
        let mut walker = Walker::new(self.limits);

        match root {
            JsonValue::Object(map) if map.is_empty() => {}
            JsonValue::Object(map) if map.values().any(is_column_shape) => {
                let table = walker.resolve_table(ROOT_TABLE, ROOT_TABLE, column_keys(map));
                walker.visit_object(table, ROOT_TABLE, map, 1)?;
            }
            JsonValue::Object(map) => walker.visit_query_fields(map)?,
            JsonValue::Array(items) => {
                let wrapped: Vec<JsonValue> = items
                    .iter()
                    .filter(|item| !item.is_null())
                    .map(|item| match item {
                        JsonValue::Object(_) => item.clone(),
                        other => json!({ "value": other }),
                    })
                    .collect();
                let objects: Vec<&Map<String, JsonValue>> =
                    wrapped.iter().filter_map(JsonValue::as_object).collect();

                let keys = objects.iter().flat_map(|o| column_keys(o)).collect();
                let table = walker.resolve_table(ROOT_TABLE, ROOT_TABLE, keys);
                for obj in objects {
                    walker.visit_object(table, ROOT_TABLE, obj, 1)?;
                }
            }
            other => {
                return Err(DbError::SchemaInference(format!(
                    "expected a JSON object or array at the root, got {}",
                    type_label(other)
                )));
            }
        }

        Ok(walker.finish())
    }
}

/// Accept either a whole GraphQL response or its `data` payload.
fn unwrap_envelope(root: &JsonValue) -> Result<&JsonValue> {
    let Some(map) = root.as_object() else {
        return Ok(root);
    };
    if !map.contains_key("data") || !map.keys().all(|k| ENVELOPE_KEYS.contains(&k.as_str())) {
        return Ok(root);
    }

    let data = &map["data"];
    match data {
        JsonValue::Object(_) => Ok(data),
        JsonValue::Null => {
            let errors = map
                .get("errors")
                .map(JsonValue::to_string)
                .unwrap_or_else(|| "no errors reported".to_string());
            Err(DbError::SchemaInference(format!(
                "upstream response carried no data: {}",
                errors
            )))
        }
        _ => Ok(root),
    }
}

fn type_label(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

/// Lower-cased column names an object would contribute to its table.
fn column_keys(obj: &Map<String, JsonValue>) -> HashSet<String> {
    obj.iter()
        .filter(|(_, v)| is_column_shape(v))
        .map(|(k, _)| naming::column_name(k).to_ascii_lowercase())
        .collect()
}

fn child_path(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", path, field)
    }
}

struct Walker {
    limits: InferenceLimits,
    schema: DraftSchema,
    path_tables: HashMap<String, TableId>,
    detector: RelationshipDetector,
    rows: usize,
}

impl Walker {
    fn new(limits: InferenceLimits) -> Self {
        Self {
            limits,
            schema: DraftSchema::default(),
            path_tables: HashMap::new(),
            detector: RelationshipDetector::new(),
            rows: 0,
        }
    }

    fn finish(mut self) -> DraftSchema {
        self.detector.resolve(&mut self.schema);
        self.schema
    }

    /// Table for entities found at `path`, named after `field`.
    ///
    /// A path always maps to the table it first resolved to. Different paths
    /// share a table when the derived names match and the shapes overlap;
    /// a name clash between disjoint shapes is settled with the path name.
    fn resolve_table(&mut self, field: &str, path: &str, keys: HashSet<String>) -> TableId {
        if let Some(&id) = self.path_tables.get(path) {
            return id;
        }

        let candidate = if field == ROOT_TABLE {
            ROOT_TABLE.to_string()
        } else {
            naming::table_name(field)
        };

        let id = match self.schema.find_table(&candidate) {
            Some(existing) if shapes_overlap(&self.schema.tables[existing].field_names(), &keys) => {
                existing
            }
            Some(_) => {
                let by_path = naming::path_name(path);
                let name = naming::unique_name(&by_path, |n| {
                    same_name(n, &candidate) || self.schema.name_taken(n)
                });
                debug!(path, table = %name, clashes_with = %candidate, "Disambiguated table name");
                self.create_table(name, path)
            }
            None => self.create_table(candidate, path),
        };

        self.path_tables.insert(path.to_string(), id);
        id
    }

    fn create_table(&mut self, name: String, path: &str) -> TableId {
        trace!(table = %name, path, "Declaring table");
        self.schema.tables.push(DraftTable::new(name, path));
        self.schema.tables.len() - 1
    }

    /// Root object whose fields are all nested: each field is a query result.
    fn visit_query_fields(&mut self, map: &Map<String, JsonValue>) -> Result<()> {
        for (field, value) in map {
            match classify_field(value) {
                FieldShape::Object(obj) => {
                    let table = self.resolve_table(field, field, column_keys(obj));
                    self.visit_object(table, field, obj, 1)?;
                }
                FieldShape::Connection(connection) => {
                    let child = self.visit_children(None, "", field, &connection.nodes, 1)?;
                    if let Some(page) = connection.pagination {
                        if self.schema.pagination.is_none() {
                            self.schema.pagination = Some(page.clone());
                        }
                        self.schema.tables[child].pagination.get_or_insert(page);
                    }
                }
                FieldShape::Objects(items) => {
                    self.visit_children(None, "", field, &items, 1)?;
                }
                FieldShape::Null | FieldShape::Scalar | FieldShape::Embedded => {}
            }
        }
        Ok(())
    }

    /// Stage one object as a row of `table`; returns the row index.
    fn visit_object(
        &mut self,
        table: TableId,
        path: &str,
        obj: &Map<String, JsonValue>,
        depth: usize,
    ) -> Result<usize> {
        if depth > self.limits.max_depth {
            return Err(DbError::SchemaInference(format!(
                "nesting at '{}' exceeds the maximum depth of {}",
                path, self.limits.max_depth
            )));
        }
        self.rows += 1;
        if self.rows > self.limits.max_rows {
            return Err(DbError::SchemaInference(format!(
                "document expands to more than {} rows",
                self.limits.max_rows
            )));
        }

        self.schema.tables[table].rows.push(DraftRow::default());
        let row = self.schema.tables[table].rows.len() - 1;

        for (key, value) in obj {
            match classify_field(value) {
                FieldShape::Null => {
                    if self.detector.is_relationship_field(table, key) {
                        continue;
                    }
                    let t = &mut self.schema.tables[table];
                    let col = t.ensure_column(ColumnSource::Field(key.clone()), &naming::column_name(key));
                    t.columns[col].tracker.observe(value);
                }
                FieldShape::Scalar | FieldShape::Embedded => {
                    let t = &mut self.schema.tables[table];
                    let col = t.ensure_column(ColumnSource::Field(key.clone()), &naming::column_name(key));
                    t.columns[col].tracker.observe(value);
                    t.rows[row].set(col, Cell::Value(value.clone()));
                }
                FieldShape::Object(child_obj) => {
                    self.visit_reference(table, row, path, key, child_obj, depth)?;
                }
                FieldShape::Connection(connection) => {
                    let child =
                        self.visit_children(Some((table, row)), path, key, &connection.nodes, depth)?;
                    if let Some(page) = connection.pagination {
                        self.schema.tables[child].pagination.get_or_insert(page);
                    }
                }
                FieldShape::Objects(items) => {
                    self.visit_children(Some((table, row)), path, key, &items, depth)?;
                }
            }
        }

        Ok(row)
    }

    /// Nested single object: the child gets its own row, the parent a key to it.
    fn visit_reference(
        &mut self,
        table: TableId,
        row: usize,
        path: &str,
        field: &str,
        obj: &Map<String, JsonValue>,
        depth: usize,
    ) -> Result<()> {
        let path = child_path(path, field);
        let child = self.resolve_table(field, &path, column_keys(obj));
        let child_row = self.visit_object(child, &path, obj, depth + 1)?;

        let parent = &mut self.schema.tables[table];
        let source = ColumnSource::Reference {
            field: field.to_string(),
            target: child,
        };
        let col = parent.ensure_column(source, &naming::reference_column(field));
        parent.columns[col].tracker.record(ColumnType::Integer);
        parent.rows[row].set(
            col,
            Cell::Ref {
                table: child,
                row: child_row,
            },
        );

        self.detector.record_object(ObjectEdge {
            parent: table,
            field: field.to_string(),
            child,
        });
        Ok(())
    }

    /// Array of objects under `field`. Returns the child table.
    ///
    /// Content that already sits under a different parent row is linked
    /// instead of staged again; that marks the edge as many-to-many.
    fn visit_children(
        &mut self,
        parent: Option<(TableId, usize)>,
        path: &str,
        field: &str,
        items: &[&JsonValue],
        depth: usize,
    ) -> Result<TableId> {
        let path = child_path(path, field);
        let objects: Vec<&Map<String, JsonValue>> =
            items.iter().filter_map(|item| item.as_object()).collect();
        let keys = objects.iter().flat_map(|o| column_keys(o)).collect();
        let child = self.resolve_table(field, &path, keys);

        let Some((parent_table, parent_row)) = parent else {
            for obj in objects {
                self.visit_object(child, &path, obj, depth + 1)?;
            }
            return Ok(child);
        };

        let mut edge = ArrayEdge::new(parent_table, field, child);
        if !objects.is_empty() {
            edge.nonempty_parents.insert(parent_row);
        }

        for obj in objects {
            *edge.fingerprints.entry(fingerprint(obj)).or_insert(0) += 1;

            let content = DraftSchema::canonical(obj);
            let known = self.schema.tables[child].content_index.get(&content).copied();
            match known {
                Some((existing, owner)) if owner != (parent_table, parent_row) => {
                    edge.links.push((parent_row, existing));
                    edge.recurrent = true;
                }
                _ => {
                    let child_row = self.visit_object(child, &path, obj, depth + 1)?;
                    self.schema.tables[child]
                        .content_index
                        .entry(content)
                        .or_insert((child_row, (parent_table, parent_row)));
                    edge.links.push((parent_row, child_row));
                }
            }
        }

        self.detector.record_array(edge);
        Ok(child)
    }
}

fn shapes_overlap(existing: &HashSet<String>, incoming: &HashSet<String>) -> bool {
    existing.is_empty() || incoming.is_empty() || !existing.is_disjoint(incoming)
}
