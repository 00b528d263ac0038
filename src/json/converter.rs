//! SQL statement builders
//!
//! Generates the DDL and parameterized DML the materializer runs against a
//! session store. Identifiers are always quoted; values always go through
//! bound parameters.

use super::naming::{PRIMARY_KEY, quote_ident};
use crate::core::ColumnType;

/// Builder for CREATE TABLE SQL statements
pub struct CreateTableBuilder {
    table_name: String,
    primary_key: bool,
    columns: Vec<(String, ColumnType, bool)>, // (name, type, nullable)
    pair_key: Option<(String, String)>,
}

impl CreateTableBuilder {
    /// Entity table with a synthetic `id INTEGER PRIMARY KEY`.
    pub fn entity(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            primary_key: true,
            columns: Vec::new(),
            pair_key: None,
        }
    }

    /// Junction table: exactly two integer columns keyed by the pair.
    pub fn junction(
        table_name: impl Into<String>,
        parent_column: impl Into<String>,
        child_column: impl Into<String>,
    ) -> Self {
        let parent_column = parent_column.into();
        let child_column = child_column.into();
        Self {
            table_name: table_name.into(),
            primary_key: false,
            columns: vec![
                (parent_column.clone(), ColumnType::Integer, false),
                (child_column.clone(), ColumnType::Integer, false),
            ],
            pair_key: Some((parent_column, child_column)),
        }
    }

    pub fn add_column(mut self, name: impl Into<String>, data_type: ColumnType, nullable: bool) -> Self {
        self.columns.push((name.into(), data_type, nullable));
        self
    }

    pub fn build(self) -> String {
        let mut defs: Vec<String> = Vec::with_capacity(self.columns.len() + 2);
        if self.primary_key {
            defs.push(format!("{} INTEGER PRIMARY KEY", quote_ident(PRIMARY_KEY)));
        }
        defs.extend(self.columns.iter().map(|(name, dtype, nullable)| {
            let null_constraint = if *nullable { "" } else { " NOT NULL" };
            format!("{} {}{}", quote_ident(name), dtype.sql_type(), null_constraint)
        }));
        if let Some((a, b)) = &self.pair_key {
            defs.push(format!("PRIMARY KEY ({}, {})", quote_ident(a), quote_ident(b)));
        }

        format!(
            "CREATE TABLE {} ({})",
            quote_ident(&self.table_name),
            defs.join(", ")
        )
    }
}

/// `ALTER TABLE ... ADD COLUMN` for columns that appear when re-staging.
pub fn add_column_sql(table_name: &str, column: &str, data_type: ColumnType) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        quote_ident(table_name),
        quote_ident(column),
        data_type.sql_type()
    )
}

/// Builder for parameterized INSERT SQL statements
pub struct InsertStatementBuilder {
    table_name: String,
    columns: Vec<String>,
    ignore_duplicates: bool,
}

impl InsertStatementBuilder {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns: Vec::new(),
            ignore_duplicates: false,
        }
    }

    pub fn columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    /// Skip rows that collide with an existing key instead of failing.
    pub fn ignore_duplicates(mut self) -> Self {
        self.ignore_duplicates = true;
        self
    }

    pub fn build(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(|c| quote_ident(c)).collect();
        let placeholders: Vec<String> = (1..=self.columns.len()).map(|i| format!("?{}", i)).collect();
        let verb = if self.ignore_duplicates {
            "INSERT OR IGNORE INTO"
        } else {
            "INSERT INTO"
        };

        format!(
            "{} {} ({}) VALUES ({})",
            verb,
            quote_ident(&self.table_name),
            columns.join(", "),
            placeholders.join(", ")
        )
    }
}

/// First rows of a table in key order, for staging reports.
pub fn sample_sql(table_name: &str, order_by: &[&str], limit: usize) -> String {
    let order: Vec<String> = order_by.iter().map(|c| quote_ident(c)).collect();
    format!(
        "SELECT * FROM {} ORDER BY {} LIMIT {}",
        quote_ident(table_name),
        order.join(", "),
        limit
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_entity_table() {
        let sql = CreateTableBuilder::entity("drugs")
            .add_column("name", ColumnType::Text, true)
            .add_column("approved", ColumnType::Boolean, true)
            .build();

        assert_eq!(
            sql,
            "CREATE TABLE \"drugs\" (\"id\" INTEGER PRIMARY KEY, \"name\" TEXT, \"approved\" BOOLEAN)"
        );
    }

    #[test]
    fn test_create_junction_table() {
        let sql = CreateTableBuilder::junction("drugs_genes", "drugs_id", "genes_id").build();

        assert_eq!(
            sql,
            "CREATE TABLE \"drugs_genes\" (\"drugs_id\" INTEGER NOT NULL, \"genes_id\" INTEGER NOT NULL, PRIMARY KEY (\"drugs_id\", \"genes_id\"))"
        );
    }

    #[test]
    fn test_insert_statement() {
        let insert = InsertStatementBuilder::new("genes")
            .columns(vec!["id".into(), "name".into()]);
        assert_eq!(insert.build(), "INSERT INTO \"genes\" (\"id\", \"name\") VALUES (?1, ?2)");

        let insert = insert.ignore_duplicates();
        assert!(insert.build().starts_with("INSERT OR IGNORE INTO"));
    }

    #[test]
    fn test_alter_and_sample() {
        assert_eq!(
            add_column_sql("drugs", "phase", ColumnType::Integer),
            "ALTER TABLE \"drugs\" ADD COLUMN \"phase\" INTEGER"
        );
        assert_eq!(
            sample_sql("drugs", &["id"], 5),
            "SELECT * FROM \"drugs\" ORDER BY \"id\" LIMIT 5"
        );
    }
}
