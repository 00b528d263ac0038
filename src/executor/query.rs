// ============================================================================
// src/executor/query.rs - read-only query execution against a session store
// ============================================================================

use crate::config::EngineConfig;
use crate::core::{DbError, Result};
use crate::json::QueryValidator;
use crate::result::QueryResult;
use crate::storage::{SessionStore, read_rows};
use rusqlite::{Connection, ErrorCode};
use std::time::{Duration, Instant};
use tracing::debug;

/// Virtual machine steps between two deadline checks.
const DEADLINE_CHECK_INTERVAL: i32 = 1_000;

pub struct QueryExecutor {
    validator: QueryValidator,
    max_result_rows: Option<usize>,
    timeout: Option<Duration>,
}

impl QueryExecutor {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_validator(QueryValidator::new(), config.max_result_rows)
            .with_timeout(config.query_timeout)
    }

    /// Executor with custom validation rules
    pub fn with_validator(validator: QueryValidator, max_result_rows: Option<usize>) -> Self {
        Self {
            validator,
            max_result_rows,
            timeout: None,
        }
    }

    /// Limit the running time of each statement.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validate and run `sql` on the store.
    ///
    /// Two gates guard the store: the statement text must pass the
    /// validator, and the prepared statement must be one the store itself
    /// reports as read-only. The caller holds the store, so the timeout
    /// clock only covers this statement and cancels nothing else.
    pub fn execute(&self, store: &SessionStore, sql: &str) -> Result<QueryResult> {
        self.validator.validate(sql)?;

        let conn = store.connection();
        let _deadline = self.timeout.map(|limit| Deadline::install(conn, limit));
        let failed = |err| execution_error(err, self.timeout);

        let mut stmt = conn.prepare(sql).map_err(failed)?;
        if !stmt.readonly() {
            return Err(DbError::DisallowedStatement(
                "statement would modify the session store".to_string(),
            ));
        }

        let set = read_rows(&mut stmt, self.max_result_rows).map_err(failed)?;
        debug!(
            rows = set.rows.len(),
            columns = set.columns.len(),
            truncated = set.truncated,
            "Query executed"
        );

        Ok(QueryResult::from_rows(set, store.pagination().cloned()))
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

/// Progress handler that aborts statements on `conn` once `limit` has
/// passed; removed again on drop.
struct Deadline<'a> {
    conn: &'a Connection,
}

impl<'a> Deadline<'a> {
    fn install(conn: &'a Connection, limit: Duration) -> Self {
        let deadline = Instant::now() + limit;
        conn.progress_handler(
            DEADLINE_CHECK_INTERVAL,
            Some(move || Instant::now() >= deadline),
        );
        Self { conn }
    }
}

impl Drop for Deadline<'_> {
    fn drop(&mut self) {
        self.conn.progress_handler(0, None::<fn() -> bool>);
    }
}

/// Errors raised while preparing or stepping a query are the caller's SQL
/// failing, not the store. With a timeout set, an interrupted statement is
/// one that ran past it.
fn execution_error(err: rusqlite::Error, timeout: Option<Duration>) -> DbError {
    match (&err, timeout) {
        (rusqlite::Error::SqliteFailure(e, _), Some(limit))
            if e.code == ErrorCode::OperationInterrupted =>
        {
            DbError::QueryTimeout(limit)
        }
        _ => DbError::SqlExecution(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;

    fn store() -> SessionStore {
        let store = SessionStore::open().unwrap();
        store
            .connection()
            .execute_batch(
                "CREATE TABLE drugs (id INTEGER PRIMARY KEY, name TEXT, approved BOOLEAN);
                 INSERT INTO drugs VALUES (1, 'Imatinib', 1), (2, 'Dasatinib', 0), (3, 'Nilotinib', 1);",
            )
            .unwrap();
        store
    }

    #[test]
    fn test_select() {
        let store = store();
        let result = QueryExecutor::default()
            .execute(&store, "SELECT name, approved FROM drugs WHERE id = 1")
            .unwrap();

        assert_eq!(result.columns, vec!["name", "approved"]);
        assert_eq!(result.rows, vec![vec![Value::Text("Imatinib".into()), Value::Boolean(true)]]);
        assert!(!result.truncated);
        assert!(result.pagination.is_none());
    }

    #[test]
    fn test_drop_is_rejected_and_table_survives() {
        let store = store();
        let executor = QueryExecutor::default();

        let err = executor.execute(&store, "DROP TABLE drugs").unwrap_err();
        assert!(matches!(err, DbError::DisallowedStatement(_)));

        let result = executor.execute(&store, "SELECT COUNT(*) AS n FROM drugs").unwrap();
        assert_eq!(result.get(0, "n"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_unknown_table_is_execution_error() {
        let err = QueryExecutor::default()
            .execute(&store(), "SELECT * FROM genes")
            .unwrap_err();
        assert!(matches!(err, DbError::SqlExecution(msg) if msg.contains("genes")));
    }

    #[test]
    fn test_result_cap() {
        let executor = QueryExecutor::new(&EngineConfig::new().max_result_rows(2));
        let result = executor
            .execute(&store(), "SELECT id FROM drugs ORDER BY id")
            .unwrap();
        assert_eq!(result.row_count(), 2);
        assert!(result.truncated);
    }

    #[test]
    fn test_timeout_stops_only_the_running_statement() {
        let store = store();
        let executor = QueryExecutor::default().with_timeout(Some(Duration::from_millis(50)));

        let err = executor
            .execute(
                &store,
                "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n) \
                 SELECT COUNT(*) FROM n",
            )
            .unwrap_err();
        assert!(matches!(err, DbError::QueryTimeout(_)));

        // The deadline is gone once the statement has failed.
        std::thread::sleep(Duration::from_millis(60));
        let result = QueryExecutor::default()
            .execute(&store, "SELECT COUNT(*) AS n FROM drugs")
            .unwrap();
        assert_eq!(result.get(0, "n"), Some(&Value::Integer(3)));
    }
}
