use crate::core::{Column, ColumnRole, ColumnType, DbError, Result, Row, Value};
use crate::json::{PaginationInfo, Relationship};
use crate::storage::{RowSet, StagedTable};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::fmt;

/// Rows produced by a read-only query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// The row cap cut the result short.
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationInfo>,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            truncated: false,
            pagination: None,
        }
    }

    pub fn from_rows(set: RowSet, pagination: Option<PaginationInfo>) -> Self {
        Self {
            truncated: set.truncated,
            pagination,
            ..Self::new(set.columns, set.rows)
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value at `row` in the first column called `column`.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(index))
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.columns.is_empty() {
            return writeln!(f, "Empty result set");
        }

        // Calculate column widths
        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.len()).collect();
        for row in &self.rows {
            for (i, value) in row.iter().enumerate() {
                widths[i] = widths[i].max(value.to_string().len());
            }
        }

        let header: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, col)| format!("{:width$}", col, width = widths[i]))
            .collect();
        writeln!(f, "{}", header.join(" | "))?;

        let separator: String = widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-");
        writeln!(f, "{}", separator)?;

        for row in &self.rows {
            let row_str: Vec<String> = row
                .iter()
                .enumerate()
                .map(|(i, val)| format!("{:width$}", val.to_string(), width = widths[i]))
                .collect();
            writeln!(f, "{}", row_str.join(" | "))?;
        }

        write!(f, "\n{} row(s)", self.rows.len())?;
        if self.truncated {
            write!(f, " (truncated)")?;
        }
        Ok(())
    }
}

/// Envelope returned to the tool layer for a query call.
///
/// A failed query carries `success: false`, a message and the error kind,
/// and never any rows.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub success: bool,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

impl QueryResponse {
    pub fn failure(err: &DbError) -> Self {
        Self {
            success: false,
            columns: Vec::new(),
            rows: Vec::new(),
            pagination: None,
            message: Some(err.to_string()),
            error_kind: Some(err.kind().to_string()),
            truncated: false,
        }
    }
}

impl From<QueryResult> for QueryResponse {
    fn from(result: QueryResult) -> Self {
        let message = if result.truncated {
            format!("{} row(s), truncated", result.row_count())
        } else {
            format!("{} row(s)", result.row_count())
        };
        Self {
            success: true,
            columns: result.columns,
            rows: result.rows,
            pagination: result.pagination,
            message: Some(message),
            error_kind: None,
            truncated: result.truncated,
        }
    }
}

impl From<Result<QueryResult>> for QueryResponse {
    fn from(result: Result<QueryResult>) -> Self {
        match result {
            Ok(result) => result.into(),
            Err(err) => Self::failure(&err),
        }
    }
}

/// Column description in a staging report.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub nullable: bool,
    pub confidence: f64,
    #[serde(flatten)]
    pub role: ColumnRole,
}

impl From<&Column> for ColumnInfo {
    fn from(column: &Column) -> Self {
        Self {
            name: column.name.clone(),
            column_type: column.column_type(),
            nullable: column.nullable,
            confidence: (column.confidence() * 1000.0).round() / 1000.0,
            role: column.role.clone(),
        }
    }
}

/// Per-table section of a staging report.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaInfo {
    pub table_name: String,
    pub columns: Vec<ColumnInfo>,
    pub row_count: usize,
    pub sample_data: Vec<Map<String, JsonValue>>,
    pub relationships: Vec<Relationship>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationInfo>,
}

impl SchemaInfo {
    pub fn new(table: &StagedTable, relationships: Vec<Relationship>, sample: &RowSet) -> Self {
        Self {
            table_name: table.name().to_string(),
            columns: table.columns().iter().map(ColumnInfo::from).collect(),
            row_count: table.row_count(),
            sample_data: sample.to_objects(),
            relationships,
            created_at: table.created_at,
            updated_at: table.updated_at,
            pagination: table.pagination.clone(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessingMetadata {
    pub processing_time_ms: u64,
    pub inserted_rows: usize,
    pub relationship_count: usize,
    pub optimization_hints: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationInfo>,
}

/// Report of one staging call.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingResult {
    pub success: bool,
    /// Tables written by the call, keyed by table name.
    pub tables: IndexMap<String, SchemaInfo>,
    pub table_count: usize,
    /// Rows across the reported tables after the load.
    pub total_rows: usize,
    pub metadata: ProcessingMetadata,
}

impl ProcessingResult {
    pub fn new(tables: Vec<SchemaInfo>, metadata: ProcessingMetadata) -> Self {
        let total_rows = tables.iter().map(|t| t.row_count).sum();
        let tables: IndexMap<String, SchemaInfo> = tables
            .into_iter()
            .map(|t| (t.table_name.clone(), t))
            .collect();
        Self {
            success: true,
            table_count: tables.len(),
            total_rows,
            tables,
            metadata,
        }
    }

    pub fn table(&self, name: &str) -> Option<&SchemaInfo> {
        self.tables
            .values()
            .find(|t| t.table_name.eq_ignore_ascii_case(name))
    }
}

/// Answer to a staging call: where the data went and what it looks like.
#[derive(Debug, Clone, Serialize)]
pub struct StageResponse {
    pub access_id: String,
    pub processing_details: ProcessingResult,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_from_error() {
        let response: QueryResponse =
            Err::<QueryResult, _>(DbError::UnknownSession("abc".into())).into();
        assert!(!response.success);
        assert!(response.rows.is_empty());
        assert_eq!(response.error_kind.as_deref(), Some("UnknownSessionError"));

        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("pagination").is_none());
        assert!(value.get("truncated").is_none());
    }

    #[test]
    fn test_response_from_rows() {
        let result = QueryResult::new(
            vec!["name".into(), "score".into()],
            vec![vec![Value::Text("Imatinib".into()), Value::Real(5.2)]],
        );
        assert_eq!(result.get(0, "score"), Some(&Value::Real(5.2)));

        let value = serde_json::to_value(QueryResponse::from(result)).unwrap();
        assert_eq!(value["success"], json!(true));
        assert_eq!(value["rows"], json!([["Imatinib", 5.2]]));
        assert_eq!(value["message"], json!("1 row(s)"));
    }

    #[test]
    fn test_column_info_serialization() {
        let info = ColumnInfo::from(&Column::foreign_key("drugs_id", "drugs"));
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["type"], json!("integer"));
        assert_eq!(value["role"], json!("foreign_key"));
        assert_eq!(value["references"], json!("drugs"));

        let value = serde_json::to_value(ColumnInfo::from(&Column::primary_key())).unwrap();
        assert_eq!(value["role"], json!("primary_key"));
    }

    #[test]
    fn test_display_renders_table() {
        let result = QueryResult::new(vec!["a".into()], vec![vec![Value::Integer(1)]]);
        let text = result.to_string();
        assert!(text.starts_with("a\n-\n1"));
        assert!(text.ends_with("1 row(s)"));
    }
}
