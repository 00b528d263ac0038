//! Relationship detection.
//!
//! The inference walk classifies every field with [`classify_field`] and
//! records the nested-object and array-of-object edges it followed. Once the
//! whole batch has been seen, [`RelationshipDetector::resolve`] decides per
//! edge between a foreign key and a junction table, because both rules
//! (parent tables per child, recurring child content) need global knowledge.

use super::draft::{Cell, ColumnSource, DraftJunction, DraftSchema, TableId};
use super::naming::{self, PRIMARY_KEY, same_name};
use super::pagination::{self, Connection};
use crate::core::ColumnType;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    ForeignKey,
    JunctionTable,
}

/// Directed edge between two staged tables.
///
/// For `foreign_key`, `from_table.from_column` holds the `id` of a row in
/// `to_table`. For `junction_table`, `junction_table` holds
/// `(from_column, to_column)` pairs pointing at `from_table.id` and
/// `to_table.id` respectively.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relationship {
    pub kind: RelationshipKind,
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub junction_table: Option<String>,
    /// JSON field the relationship was discovered under.
    pub field: String,
    pub confidence: f64,
}

impl Relationship {
    pub fn involves(&self, table: &str) -> bool {
        same_name(&self.from_table, table)
            || same_name(&self.to_table, table)
            || self
                .junction_table
                .as_deref()
                .is_some_and(|j| same_name(j, table))
    }

    /// Same edge, ignoring confidence.
    pub fn same_edge(&self, other: &Relationship) -> bool {
        self.kind == other.kind
            && same_name(&self.from_table, &other.from_table)
            && same_name(&self.from_column, &other.from_column)
            && same_name(&self.to_table, &other.to_table)
            && self.junction_table == other.junction_table
    }

    /// Rewrite table names after the materializer picked physical names.
    pub fn rename(&mut self, names: &HashMap<String, String>) {
        let lookup = |name: &mut String| {
            if let Some(physical) = names.get(&name.to_ascii_lowercase()) {
                *name = physical.clone();
            }
        };
        lookup(&mut self.from_table);
        lookup(&mut self.to_table);
        if let Some(junction) = self.junction_table.as_mut() {
            lookup(junction);
        }
    }

    /// SQL join clause a caller can paste into a query.
    pub fn join_hint(&self) -> String {
        match &self.junction_table {
            Some(junction) => format!(
                "{from} JOIN {j} ON {j}.{fc} = {from}.id JOIN {to} ON {to}.id = {j}.{tc}",
                from = self.from_table,
                j = junction,
                fc = self.from_column,
                to = self.to_table,
                tc = self.to_column,
            ),
            None => format!(
                "{from} JOIN {to} ON {from}.{fc} = {to}.{tc}",
                from = self.from_table,
                fc = self.from_column,
                to = self.to_table,
                tc = self.to_column,
            ),
        }
    }
}

/// How one JSON field value is staged.
#[derive(Debug)]
pub enum FieldShape<'a> {
    Null,
    Scalar,
    /// Stored as a single json column: empty objects, scalar arrays.
    Embedded,
    Object(&'a Map<String, JsonValue>),
    Connection(Connection<'a>),
    Objects(Vec<&'a JsonValue>),
}

pub fn classify_field(value: &JsonValue) -> FieldShape<'_> {
    match value {
        JsonValue::Null => FieldShape::Null,
        JsonValue::Bool(_) | JsonValue::Number(_) | JsonValue::String(_) => FieldShape::Scalar,
        JsonValue::Object(map) if map.is_empty() => FieldShape::Embedded,
        JsonValue::Object(map) => match pagination::as_connection(map) {
            Some(connection) => FieldShape::Connection(connection),
            None => FieldShape::Object(map),
        },
        JsonValue::Array(items) => {
            let present: Vec<&JsonValue> = items.iter().filter(|v| !v.is_null()).collect();
            if !items.is_empty() && present.is_empty() {
                return FieldShape::Embedded;
            }
            if present.iter().all(|v| v.is_object()) {
                FieldShape::Objects(present)
            } else {
                FieldShape::Embedded
            }
        }
    }
}

/// Whether a field value becomes a column on the row that holds it.
pub fn is_column_shape(value: &JsonValue) -> bool {
    matches!(
        classify_field(value),
        FieldShape::Null | FieldShape::Scalar | FieldShape::Embedded
    )
}

/// A nested single object followed during the walk.
#[derive(Debug, Clone)]
pub struct ObjectEdge {
    pub parent: TableId,
    pub field: String,
    pub child: TableId,
}

/// An array of objects followed during the walk, aggregated over all parent rows.
#[derive(Debug, Clone)]
pub struct ArrayEdge {
    pub parent: TableId,
    pub field: String,
    pub child: TableId,
    pub nonempty_parents: HashSet<usize>,
    pub links: Vec<(usize, usize)>,
    pub fingerprints: HashMap<String, usize>,
    /// The same child content was found under more than one parent row.
    pub recurrent: bool,
}

impl ArrayEdge {
    pub fn new(parent: TableId, field: impl Into<String>, child: TableId) -> Self {
        Self {
            parent,
            field: field.into(),
            child,
            nonempty_parents: HashSet::new(),
            links: Vec::new(),
            fingerprints: HashMap::new(),
            recurrent: false,
        }
    }

    /// Share of elements that had the most common key set.
    pub fn uniformity(&self) -> f64 {
        let total: usize = self.fingerprints.values().sum();
        if total == 0 {
            return 1.0;
        }
        let modal = self.fingerprints.values().copied().max().unwrap_or(0);
        modal as f64 / total as f64
    }

    pub fn distinct_children(&self) -> usize {
        self.links.iter().map(|(_, c)| *c).collect::<HashSet<_>>().len()
    }
}

/// Sorted key set of an object, used as its structural fingerprint.
pub fn fingerprint(obj: &Map<String, JsonValue>) -> String {
    let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys.join(",")
}

#[derive(Debug, Default)]
pub struct RelationshipDetector {
    objects: Vec<ObjectEdge>,
    arrays: IndexMap<(TableId, String, TableId), ArrayEdge>,
}

impl RelationshipDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_object(&mut self, edge: ObjectEdge) {
        let known = self.objects.iter().any(|e| {
            e.parent == edge.parent && e.field == edge.field && e.child == edge.child
        });
        if !known {
            self.objects.push(edge);
        }
    }

    pub fn record_array(&mut self, edge: ArrayEdge) {
        let key = (edge.parent, edge.field.clone(), edge.child);
        match self.arrays.get_mut(&key) {
            Some(existing) => {
                existing.nonempty_parents.extend(edge.nonempty_parents);
                existing.links.extend(edge.links);
                for (fp, count) in edge.fingerprints {
                    *existing.fingerprints.entry(fp).or_insert(0) += count;
                }
                existing.recurrent |= edge.recurrent;
            }
            None => {
                self.arrays.insert(key, edge);
            }
        }
    }

    /// Whether `field` of `table` was followed as a relationship.
    pub fn is_relationship_field(&self, table: TableId, field: &str) -> bool {
        self.objects.iter().any(|e| e.parent == table && e.field == field)
            || self.arrays.keys().any(|(p, f, _)| *p == table && f == field)
    }

    /// Turn the recorded edges into foreign-key columns, junction tables
    /// and relationship descriptions on `schema`.
    pub fn resolve(self, schema: &mut DraftSchema) {
        self.drop_shadowed_columns(schema);

        for edge in &self.objects {
            let parent = schema.table(edge.parent);
            let source = ColumnSource::Reference {
                field: edge.field.clone(),
                target: edge.child,
            };
            let Some(column) = parent.find_column(&source) else {
                continue;
            };
            let relationship = Relationship {
                kind: RelationshipKind::ForeignKey,
                from_table: parent.name.clone(),
                from_column: parent.columns[column].name.clone(),
                to_table: schema.table(edge.child).name.clone(),
                to_column: PRIMARY_KEY.to_string(),
                junction_table: None,
                field: edge.field.clone(),
                confidence: 1.0,
            };
            schema.relationships.push(relationship);
        }

        let mut parents_per_child: HashMap<TableId, HashSet<TableId>> = HashMap::new();
        let mut recurrent_children: HashSet<TableId> = HashSet::new();
        for edge in self.arrays.values() {
            parents_per_child.entry(edge.child).or_default().insert(edge.parent);
            if edge.recurrent {
                recurrent_children.insert(edge.child);
            }
        }

        for edge in self.arrays.into_values() {
            let shared = recurrent_children.contains(&edge.child)
                || parents_per_child.get(&edge.child).map_or(0, HashSet::len) > 1;

            if shared {
                junction(schema, edge);
            } else {
                one_to_many(schema, edge);
            }
        }
    }

    /// Drop null-only field columns whose field turned out to be nested data
    /// elsewhere in the batch (e.g. `"gene": null` next to `"gene": {...}`).
    fn drop_shadowed_columns(&self, schema: &mut DraftSchema) {
        for (id, table) in schema.tables.iter_mut().enumerate() {
            let shadowed: Vec<usize> = table
                .columns
                .iter()
                .enumerate()
                .filter(|(_, c)| match &c.source {
                    ColumnSource::Field(field) => {
                        c.tracker.non_null() == 0 && self.is_relationship_field(id, field)
                    }
                    _ => false,
                })
                .map(|(idx, _)| idx)
                .collect();

            for idx in shadowed.into_iter().rev() {
                table.columns.remove(idx);
                for row in &mut table.rows {
                    row.cells.retain(|(c, _)| *c != idx);
                    for (c, _) in row.cells.iter_mut() {
                        if *c > idx {
                            *c -= 1;
                        }
                    }
                }
            }
        }
    }
}

fn one_to_many(schema: &mut DraftSchema, edge: ArrayEdge) {
    let parent_name = schema.table(edge.parent).name.clone();
    let parent_rows = schema.table(edge.parent).row_count();
    let preferred = if edge.parent == edge.child {
        "parent_id".to_string()
    } else {
        naming::parent_column(&parent_name)
    };

    let child = &mut schema.tables[edge.child];
    let column = child.ensure_column(ColumnSource::Parent { parent: edge.parent }, &preferred);
    for (parent_row, child_row) in &edge.links {
        child.rows[*child_row].set(
            column,
            Cell::Ref {
                table: edge.parent,
                row: *parent_row,
            },
        );
        child.columns[column].tracker.record(ColumnType::Integer);
    }

    let coverage = if parent_rows == 0 {
        0.0
    } else {
        edge.nonempty_parents.len() as f64 / parent_rows as f64
    };

    schema.relationships.push(Relationship {
        kind: RelationshipKind::ForeignKey,
        from_table: child.name.clone(),
        from_column: child.columns[column].name.clone(),
        to_table: parent_name,
        to_column: PRIMARY_KEY.to_string(),
        junction_table: None,
        field: edge.field.clone(),
        confidence: round(coverage.min(1.0) * edge.uniformity()),
    });
}

fn junction(schema: &mut DraftSchema, edge: ArrayEdge) {
    let parent_name = schema.table(edge.parent).name.clone();
    let child_name = schema.table(edge.child).name.clone();

    let (parent_column, child_column) = if edge.parent == edge.child {
        ("parent_id".to_string(), "child_id".to_string())
    } else {
        (
            naming::parent_column(&parent_name),
            naming::parent_column(&child_name),
        )
    };

    let mut pairs = Vec::with_capacity(edge.links.len());
    let mut seen = HashSet::new();
    for pair in &edge.links {
        if seen.insert(*pair) {
            pairs.push(*pair);
        }
    }

    let duplication = if edge.links.is_empty() {
        1.0
    } else {
        edge.distinct_children() as f64 / edge.links.len() as f64
    };
    let confidence = round(edge.uniformity() * (0.5 + 0.5 * duplication));

    let name = naming::unique_name(&format!("{}_{}", parent_name, child_name), |n| {
        schema.name_taken(n)
    });
    debug!(
        junction = %name,
        parent = %parent_name,
        child = %child_name,
        links = pairs.len(),
        "Detected many-to-many relationship"
    );

    schema.relationships.push(Relationship {
        kind: RelationshipKind::JunctionTable,
        from_table: parent_name,
        from_column: parent_column.clone(),
        to_table: child_name,
        to_column: child_column.clone(),
        junction_table: Some(name.clone()),
        field: edge.field,
        confidence,
    });

    schema.junctions.push(DraftJunction {
        name,
        parent: edge.parent,
        child: edge.child,
        parent_column,
        child_column,
        pairs,
    });
}

fn round(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
