//! Table materialization
//!
//! Turns a [`DraftSchema`] into physical tables of a session store. A load
//! runs in one transaction against a copy of the catalog; the copy replaces
//! the session's catalog only after the commit, so a failed load leaves no
//! trace. Loads are append-only: a draft table whose shape matches an
//! existing table extends it (new columns are added, column types widen),
//! any other shape gets a table of its own. A widened column is never left
//! under its old declared type: the table is rebuilt so stored values and
//! the catalog agree.

use super::{Catalog, SessionStore, StagedTable, TableKind, read_rows};
use crate::core::{Column, ColumnRole, ColumnType, Result, Row, Value};
use crate::json::converter::{CreateTableBuilder, InsertStatementBuilder, add_column_sql};
use crate::json::draft::{Cell, ColumnSource, DraftSchema, DraftTable, TableId};
use crate::json::naming::{self, PRIMARY_KEY, quote_ident, same_name};
use crate::json::{Relationship, RelationshipKind};
use rusqlite::{Transaction, params, params_from_iter};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// What one load changed.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Physical tables written by the load: entity tables in discovery
    /// order, then junction tables.
    pub tables: Vec<String>,
    pub inserted_rows: usize,
    /// Relationships of the load, under physical table and column names.
    pub relationships: Vec<Relationship>,
}

pub struct TableMaterializer;

impl TableMaterializer {
    /// Create or extend the tables of `draft` in `store` and load its rows.
    pub fn materialize(store: &mut SessionStore, draft: &DraftSchema) -> Result<LoadReport> {
        let (conn, catalog) = store.begin_load();
        let tx = conn.transaction()?;

        let mut load = Load::plan(draft, catalog);
        for id in 0..draft.tables.len() {
            load.load_entity(&tx, id)?;
        }
        for index in 0..draft.junctions.len() {
            load.load_junction(&tx, index)?;
        }
        load.attach_relationships();

        tx.commit()?;

        let (catalog, report) = load.finish();
        store.finish_load(catalog, draft.pagination.clone());
        Ok(report)
    }
}

struct Load<'a> {
    draft: &'a DraftSchema,
    catalog: Catalog,
    /// Physical name per draft table.
    tables: Vec<String>,
    /// Physical name per draft junction.
    junctions: Vec<String>,
    /// Key of each draft table's first new row, minus one.
    offsets: Vec<i64>,
    /// Lower-cased draft table/junction name -> physical name.
    renamed: HashMap<String, String>,
    /// Lower-cased (draft table, draft column) -> physical column.
    columns: HashMap<(String, String), String>,
    report: LoadReport,
}

impl<'a> Load<'a> {
    /// Pick a physical table for every draft table and junction.
    fn plan(draft: &'a DraftSchema, catalog: Catalog) -> Self {
        let mut claimed: HashSet<String> = HashSet::new();
        let mut tables = Vec::with_capacity(draft.tables.len());
        let mut offsets = Vec::with_capacity(draft.tables.len());
        let mut renamed = HashMap::new();

        for table in &draft.tables {
            let extendable = catalog.get_table(&table.name).filter(|existing| {
                !existing.is_junction() && shapes_compatible(existing, table)
            });

            let (physical, offset) = match extendable {
                Some(existing) if !claimed.contains(&table.name.to_ascii_lowercase()) => {
                    (existing.name().to_string(), existing.max_id())
                }
                _ => {
                    let name = naming::unique_name(&table.name, |n| {
                        catalog.table_exists(n) || claimed.contains(&n.to_ascii_lowercase())
                    });
                    (name, 0)
                }
            };

            if !same_name(&physical, &table.name) {
                debug!(draft = %table.name, table = %physical, "Staging under a new table name");
            }
            claimed.insert(physical.to_ascii_lowercase());
            renamed.insert(table.name.to_ascii_lowercase(), physical.clone());
            tables.push(physical);
            offsets.push(offset);
        }

        let mut junctions = Vec::with_capacity(draft.junctions.len());
        for junction in &draft.junctions {
            let parent = &tables[junction.parent];
            let child = &tables[junction.child];
            let reusable = catalog.get_table(&junction.name).is_some_and(|existing| {
                *existing.kind()
                    == TableKind::Junction {
                        parent: parent.clone(),
                        child: child.clone(),
                    }
            }) && !claimed.contains(&junction.name.to_ascii_lowercase());

            let physical = if reusable {
                junction.name.clone()
            } else {
                naming::unique_name(&junction.name, |n| {
                    catalog.table_exists(n) || claimed.contains(&n.to_ascii_lowercase())
                })
            };
            claimed.insert(physical.to_ascii_lowercase());
            renamed.insert(junction.name.to_ascii_lowercase(), physical.clone());
            junctions.push(physical);
        }

        Self {
            draft,
            catalog,
            tables,
            junctions,
            offsets,
            renamed,
            columns: HashMap::new(),
            report: LoadReport::default(),
        }
    }

    /// Primary key assigned to a draft row.
    fn key(&self, table: TableId, row: usize) -> i64 {
        self.offsets[table] + row as i64 + 1
    }

    /// Column a draft column would declare in its physical table.
    fn physical_column(&self, table: &DraftTable, index: usize) -> Column {
        let draft = &table.columns[index];
        let mut column = match &draft.source {
            ColumnSource::Field(_) => Column::new(draft.name.clone(), draft.tracker.clone()),
            ColumnSource::Reference { target, .. } => {
                Column::foreign_key(draft.name.clone(), self.tables[*target].clone())
            }
            ColumnSource::Parent { parent } => {
                Column::foreign_key(draft.name.clone(), self.tables[*parent].clone())
            }
        };
        column.nullable = table.is_nullable(index);
        column
    }

    fn load_entity(&mut self, tx: &Transaction<'_>, id: TableId) -> Result<()> {
        let schema = self.draft;
        let draft = &schema.tables[id];
        let physical = self.tables[id].clone();
        let existing = self.catalog.get_table(&physical).cloned();
        let is_new = existing.is_none();
        let mut staged = existing.unwrap_or_else(|| StagedTable::entity(physical.clone()));
        let had_rows = staged.row_count() > 0;

        let mut targets: Vec<String> = Vec::with_capacity(draft.columns.len());
        let mut added: Vec<(String, ColumnType)> = Vec::new();
        let mut widened: HashSet<String> = HashSet::new();

        for index in 0..draft.columns.len() {
            let incoming = self.physical_column(draft, index);
            let reuse = staged
                .column(&incoming.name)
                .is_some_and(|c| roles_compatible(&c.role, &incoming.role));

            let name = if reuse {
                let mut name = incoming.name.clone();
                if let Some(column) = staged.column_mut(&incoming.name) {
                    let before = column.column_type();
                    column.tracker.merge(&incoming.tracker);
                    column.nullable |= incoming.nullable;
                    if column.column_type() != before {
                        widened.insert(column.name.to_ascii_lowercase());
                        debug!(
                            table = %physical,
                            column = %column.name,
                            from = %before,
                            to = %column.column_type(),
                            "Widened column type"
                        );
                    }
                    name = column.name.clone();
                }
                name
            } else {
                let name = naming::unique_name(&incoming.name, |n| {
                    same_name(n, PRIMARY_KEY) || staged.column(n).is_some()
                });
                let column_type = incoming.column_type();
                staged.add_column(Column {
                    name: name.clone(),
                    nullable: incoming.nullable || had_rows,
                    ..incoming
                });
                added.push((name.clone(), column_type));
                name
            };

            self.columns.insert(
                (
                    draft.name.to_ascii_lowercase(),
                    draft.columns[index].name.to_ascii_lowercase(),
                ),
                name.clone(),
            );
            targets.push(name);
        }

        if is_new {
            let builder = added
                .iter()
                .fold(CreateTableBuilder::entity(physical.clone()), |b, (name, column_type)| {
                    b.add_column(name.clone(), *column_type, true)
                });
            tx.execute(&builder.build(), [])?;
        } else if !widened.is_empty() {
            self.rebuild_table(tx, &staged, &widened)?;
        } else {
            for (name, column_type) in &added {
                tx.execute(&add_column_sql(&physical, name, *column_type), [])?;
            }
        }

        let types: Vec<ColumnType> = targets
            .iter()
            .map(|name| staged.column_type(name).unwrap_or(ColumnType::Text))
            .collect();

        let mut names = Vec::with_capacity(targets.len() + 1);
        names.push(PRIMARY_KEY.to_string());
        names.extend(targets.iter().cloned());
        let insert = InsertStatementBuilder::new(physical.clone()).columns(names).build();

        {
            let mut stmt = tx.prepare(&insert)?;
            for (row_index, row) in draft.rows.iter().enumerate() {
                let mut values: Row = Vec::with_capacity(targets.len() + 1);
                values.push(Value::Integer(self.key(id, row_index)));
                for (column, column_type) in types.iter().enumerate() {
                    values.push(match row.get(column) {
                        None => Value::Null,
                        Some(Cell::Value(v)) => Value::from_json(v, *column_type),
                        Some(Cell::Ref { table, row }) => Value::Integer(self.key(*table, *row)),
                    });
                }
                stmt.execute(params_from_iter(values.iter()))?;
            }
        }

        let inserted = draft.row_count();
        staged.record_load(inserted, self.offsets[id] + inserted as i64);
        if let Some(page) = &draft.pagination {
            staged.pagination = Some(page.clone());
        }

        debug!(
            table = %physical,
            rows = inserted,
            new_columns = added.len(),
            created = is_new,
            "Loaded table"
        );
        self.report.inserted_rows += inserted;
        self.report.tables.push(physical);
        self.catalog = std::mem::take(&mut self.catalog).with_table(staged);
        Ok(())
    }

    /// Recreate `staged` under its current column types and copy the stored
    /// rows across, re-encoding the values of the `widened` columns.
    ///
    /// Columns added by this load don't exist in the stored table yet and
    /// come out empty in the copy.
    fn rebuild_table(
        &self,
        tx: &Transaction<'_>,
        staged: &StagedTable,
        widened: &HashSet<String>,
    ) -> Result<()> {
        let name = staged.name();
        let scratch = naming::unique_name(&format!("{}_rebuild", name), |n| {
            self.catalog.table_exists(n)
                || self.tables.iter().chain(&self.junctions).any(|t| same_name(t, n))
        });

        let ddl = staged
            .columns()
            .iter()
            .filter(|c| c.role != ColumnRole::PrimaryKey)
            .fold(CreateTableBuilder::entity(scratch.clone()), |b, c| {
                b.add_column(c.name.clone(), c.column_type(), true)
            });
        tx.execute(&ddl.build(), [])?;

        let stored = {
            let mut stmt = tx.prepare(&format!("SELECT * FROM {}", quote_ident(name)))?;
            read_rows(&mut stmt, None)?
        };
        let conversions: Vec<Option<ColumnType>> = stored
            .columns
            .iter()
            .map(|column| {
                if widened.contains(&column.to_ascii_lowercase()) {
                    staged.column_type(column)
                } else {
                    None
                }
            })
            .collect();

        let insert = InsertStatementBuilder::new(scratch.clone())
            .columns(stored.columns.clone())
            .build();
        {
            let mut stmt = tx.prepare(&insert)?;
            for row in &stored.rows {
                let values: Row = row
                    .iter()
                    .zip(&conversions)
                    .map(|(value, conversion)| match conversion {
                        Some(column_type) => Value::from_json(&value.to_json(), *column_type),
                        None => value.clone(),
                    })
                    .collect();
                stmt.execute(params_from_iter(values.iter()))?;
            }
        }

        tx.execute(&format!("DROP TABLE {}", quote_ident(name)), [])?;
        tx.execute(
            &format!(
                "ALTER TABLE {} RENAME TO {}",
                quote_ident(&scratch),
                quote_ident(name)
            ),
            [],
        )?;

        debug!(
            table = %name,
            widened = widened.len(),
            rows = stored.rows.len(),
            "Rebuilt table under widened column types"
        );
        Ok(())
    }

    fn load_junction(&mut self, tx: &Transaction<'_>, index: usize) -> Result<()> {
        let schema = self.draft;
        let junction = &schema.junctions[index];
        let physical = self.junctions[index].clone();

        let mut staged = match self.catalog.get_table(&physical).cloned() {
            Some(existing) => existing,
            None => {
                let ddl = CreateTableBuilder::junction(
                    physical.clone(),
                    junction.parent_column.clone(),
                    junction.child_column.clone(),
                )
                .build();
                tx.execute(&ddl, [])?;
                StagedTable::junction(
                    physical.clone(),
                    self.tables[junction.parent].clone(),
                    self.tables[junction.child].clone(),
                    junction.parent_column.clone(),
                    junction.child_column.clone(),
                )
            }
        };

        let pair_columns: Vec<String> = staged.columns().iter().map(|c| c.name.clone()).collect();
        let draft_name = junction.name.to_ascii_lowercase();
        for (draft_column, physical_column) in [&junction.parent_column, &junction.child_column]
            .into_iter()
            .zip(pair_columns.iter())
        {
            self.columns.insert(
                (draft_name.clone(), draft_column.to_ascii_lowercase()),
                physical_column.clone(),
            );
        }

        let insert = InsertStatementBuilder::new(physical.clone())
            .columns(pair_columns)
            .ignore_duplicates()
            .build();

        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(&insert)?;
            for (parent_row, child_row) in &junction.pairs {
                inserted += stmt.execute(params![
                    self.key(junction.parent, *parent_row),
                    self.key(junction.child, *child_row)
                ])?;
            }
        }

        staged.record_load(inserted, 0);
        debug!(table = %physical, rows = inserted, "Loaded junction table");
        self.report.inserted_rows += inserted;
        self.report.tables.push(physical);
        self.catalog = std::mem::take(&mut self.catalog).with_table(staged);
        Ok(())
    }

    /// Carry the draft's relationships over under physical names.
    fn attach_relationships(&mut self) {
        let schema = self.draft;
        for relationship in &schema.relationships {
            let mut relationship = relationship.clone();

            let holder = relationship
                .junction_table
                .clone()
                .unwrap_or_else(|| relationship.from_table.clone())
                .to_ascii_lowercase();
            let physical_column = |column: &str| {
                self.columns
                    .get(&(holder.clone(), column.to_ascii_lowercase()))
                    .cloned()
            };

            if let Some(column) = physical_column(&relationship.from_column) {
                relationship.from_column = column;
            }
            if relationship.kind == RelationshipKind::JunctionTable {
                if let Some(column) = physical_column(&relationship.to_column) {
                    relationship.to_column = column;
                }
            }
            relationship.rename(&self.renamed);

            self.catalog = std::mem::take(&mut self.catalog).with_relationship(relationship.clone());
            self.report.relationships.push(relationship);
        }
    }

    fn finish(self) -> (Catalog, LoadReport) {
        (self.catalog, self.report)
    }
}

/// An incoming draft table may extend an existing one when their data
/// columns overlap, or when either side has none to compare.
fn shapes_compatible(existing: &StagedTable, incoming: &DraftTable) -> bool {
    let existing = existing.data_column_names();
    let incoming = incoming.field_names();
    existing.is_empty() || incoming.is_empty() || !existing.is_disjoint(&incoming)
}

fn roles_compatible(existing: &ColumnRole, incoming: &ColumnRole) -> bool {
    match (existing, incoming) {
        (ColumnRole::Data, ColumnRole::Data) => true,
        (
            ColumnRole::ForeignKey { references: a },
            ColumnRole::ForeignKey { references: b },
        ) => same_name(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::SchemaInferenceEngine;
    use serde_json::{Value as JsonValue, json};

    fn stage(store: &mut SessionStore, value: JsonValue) -> LoadReport {
        let draft = SchemaInferenceEngine::new().infer(&value).unwrap();
        TableMaterializer::materialize(store, &draft).unwrap()
    }

    fn count(store: &SessionStore, table: &str) -> i64 {
        store
            .connection()
            .query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_materialize_nested_document() {
        let mut store = SessionStore::open().unwrap();
        let report = stage(
            &mut store,
            json!({"drugs": {"nodes": [{
                "name": "Imatinib",
                "interactions": [{"gene": {"name": "ABL1"}, "interactionScore": 5.2}]
            }]}}),
        );

        assert_eq!(report.tables, vec!["drugs", "interactions", "genes"]);
        assert_eq!(report.inserted_rows, 3);
        assert_eq!(store.catalog().relationships().len(), 2);

        let name: String = store
            .connection()
            .query_row(
                "SELECT g.name FROM drugs d JOIN interactions i ON i.drugs_id = d.id \
                 JOIN genes g ON i.gene_id = g.id",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(name, "ABL1");
    }

    #[test]
    fn test_restage_appends_and_widens() {
        let mut store = SessionStore::open().unwrap();
        stage(&mut store, json!({"items": [{"a": 1}, {"a": 2}]}));
        stage(&mut store, json!({"items": [{"a": "three", "b": true}]}));

        assert_eq!(count(&store, "items"), 3);
        let items = store.catalog().get_table("items").unwrap();
        assert_eq!(items.row_count(), 3);
        assert_eq!(items.max_id(), 3);
        assert_eq!(items.column_type("a"), Some(ColumnType::Text));
        assert!(items.column("b").unwrap().nullable);
        assert_eq!(store.loads(), 2);

        let ids: Vec<i64> = {
            let mut stmt = store.connection().prepare("SELECT id FROM items ORDER BY id").unwrap();
            stmt.query_map([], |r| r.get(0)).unwrap().map(|r| r.unwrap()).collect()
        };
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_widened_column_keeps_text_verbatim() {
        let mut store = SessionStore::open().unwrap();
        stage(&mut store, json!({"items": [{"code": 1, "ok": true}]}));
        stage(&mut store, json!({"items": [{"code": "007", "ok": "maybe", "extra": 2.5}]}));

        let decl: String = store
            .connection()
            .query_row(
                "SELECT type FROM pragma_table_info('items') WHERE name = 'code'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(decl, "TEXT");

        let set = {
            let mut stmt = store
                .connection()
                .prepare("SELECT code, ok, extra FROM items ORDER BY id")
                .unwrap();
            read_rows(&mut stmt, None).unwrap()
        };
        assert_eq!(
            set.rows,
            vec![
                vec![Value::Text("1".into()), Value::Text("true".into()), Value::Null],
                vec![Value::Text("007".into()), Value::Text("maybe".into()), Value::Real(2.5)],
            ]
        );
        assert_eq!(store.catalog().table_count(), 1);
    }

    #[test]
    fn test_incompatible_shape_gets_new_table() {
        let mut store = SessionStore::open().unwrap();
        stage(&mut store, json!({"items": [{"a": 1}]}));
        let report = stage(&mut store, json!({"items": [{"z": 1}]}));

        assert_eq!(report.tables, vec!["items_2"]);
        assert_eq!(count(&store, "items"), 1);
        assert_eq!(count(&store, "items_2"), 1);
    }

    #[test]
    fn test_junction_rows_and_keys() {
        let mut store = SessionStore::open().unwrap();
        let report = stage(
            &mut store,
            json!({"drugs": [
                {"name": "a", "genes": [{"symbol": "ABL1"}]},
                {"name": "b", "genes": [{"symbol": "ABL1"}, {"symbol": "KIT"}]}
            ]}),
        );

        assert!(report.tables.contains(&"drugs_genes".to_string()));
        assert_eq!(count(&store, "drugs_genes"), 3);
        assert_eq!(count(&store, "genes"), 2);

        let shared: i64 = store
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM drugs_genes dg JOIN genes g ON g.id = dg.genes_id \
                 WHERE g.symbol = 'ABL1'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(shared, 2);

        let junction = store.catalog().get_table("drugs_genes").unwrap();
        assert!(junction.is_junction());
    }

    #[test]
    fn test_failed_load_leaves_store_unchanged() {
        let mut store = SessionStore::open().unwrap();
        stage(&mut store, json!({"items": [{"a": 1}]}));

        // A table the catalog doesn't know about makes the second CREATE fail
        // after `items` was already appended to.
        store
            .connection()
            .execute_batch("CREATE TABLE others (x INTEGER)")
            .unwrap();
        let draft = SchemaInferenceEngine::new()
            .infer(&json!({"items": [{"a": 2}], "others": [{"b": 1}]}))
            .unwrap();
        let err = TableMaterializer::materialize(&mut store, &draft).unwrap_err();

        assert!(matches!(err, crate::core::DbError::Storage(_)));
        assert_eq!(count(&store, "items"), 1);
        assert_eq!(store.catalog().get_table("items").unwrap().row_count(), 1);
        assert!(!store.catalog().table_exists("others"));
        assert_eq!(store.loads(), 1);
    }
}
