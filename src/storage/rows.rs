use crate::core::{ColumnType, Row, Value};
use rusqlite::Statement;
use serde_json::{Map, Value as JsonValue};

/// Rows read back from a session store, decoded by declared column type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// More rows were available than the read limit allowed.
    pub truncated: bool,
}

impl RowSet {
    /// Rows as JSON objects keyed by column name, in column order.
    pub fn to_objects(&self) -> Vec<Map<String, JsonValue>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row.iter())
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect()
            })
            .collect()
    }
}

/// Run a prepared statement and collect at most `limit` rows.
///
/// Booleans and json documents are stored as integers and text; the
/// declared type of the source column (when the result column has one)
/// turns them back into their staged form.
pub fn read_rows(stmt: &mut Statement<'_>, limit: Option<usize>) -> rusqlite::Result<RowSet> {
    let declared: Vec<Option<ColumnType>> = stmt
        .columns()
        .iter()
        .map(|c| c.decl_type().and_then(ColumnType::from_decl))
        .collect();
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    let mut truncated = false;

    while let Some(row) = rows.next()? {
        if limit.is_some_and(|max| out.len() >= max) {
            truncated = true;
            break;
        }
        let values = declared
            .iter()
            .enumerate()
            .map(|(i, declared)| row.get_ref(i).map(|v| Value::from_sql(v, *declared)))
            .collect::<rusqlite::Result<Row>>()?;
        out.push(values);
    }

    Ok(RowSet {
        columns,
        rows: out,
        truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use serde_json::json;

    fn store() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, ok BOOLEAN, tags JSON, name TEXT);
             INSERT INTO t VALUES (1, 1, '[\"a\",\"b\"]', 'x');
             INSERT INTO t VALUES (2, 0, NULL, 'y');
             INSERT INTO t VALUES (3, NULL, '{}', NULL);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_decodes_declared_types() {
        let conn = store();
        let mut stmt = conn.prepare("SELECT * FROM t ORDER BY id").unwrap();
        let set = read_rows(&mut stmt, None).unwrap();

        assert_eq!(set.columns, vec!["id", "ok", "tags", "name"]);
        assert_eq!(set.rows[0][1], Value::Boolean(true));
        assert_eq!(set.rows[0][2], Value::Json(json!(["a", "b"])));
        assert_eq!(set.rows[1][1], Value::Boolean(false));
        assert!(!set.truncated);

        let objects = set.to_objects();
        assert_eq!(objects[2]["tags"], json!({}));
        assert_eq!(objects[2]["name"], JsonValue::Null);
    }

    #[test]
    fn test_limit_marks_truncation() {
        let conn = store();
        let mut stmt = conn.prepare("SELECT id FROM t ORDER BY id").unwrap();
        let set = read_rows(&mut stmt, Some(2)).unwrap();
        assert_eq!(set.rows.len(), 2);
        assert!(set.truncated);

        let mut stmt = conn.prepare("SELECT id FROM t ORDER BY id").unwrap();
        let set = read_rows(&mut stmt, Some(3)).unwrap();
        assert!(!set.truncated);
    }
}
