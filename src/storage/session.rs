use super::{Catalog, RowSet, StagedTable, TableKind, read_rows};
use crate::core::{DbError, Result};
use crate::json::PaginationInfo;
use crate::json::converter::sample_sql;
use crate::json::naming::PRIMARY_KEY;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// One isolated embedded store: a private in-memory database plus the
/// catalog describing what has been staged into it.
pub struct SessionStore {
    conn: Connection,
    catalog: Catalog,
    pagination: Option<PaginationInfo>,
    loads: usize,
}

impl SessionStore {
    pub fn open() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn,
            catalog: Catalog::new(),
            pagination: None,
            loads: 0,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Pagination of the most recent load that came from a paginated connection.
    pub fn pagination(&self) -> Option<&PaginationInfo> {
        self.pagination.as_ref()
    }

    /// Number of completed staging loads.
    pub fn loads(&self) -> usize {
        self.loads
    }

    /// First `limit` rows of a staged table in key order.
    pub fn sample(&self, table: &StagedTable, limit: usize) -> Result<RowSet> {
        let order: Vec<&str> = match table.kind() {
            TableKind::Entity => vec![PRIMARY_KEY],
            TableKind::Junction { .. } => table.columns().iter().map(|c| c.name.as_str()).collect(),
        };
        let mut stmt = self.conn.prepare(&sample_sql(table.name(), &order, limit))?;
        Ok(read_rows(&mut stmt, None)?)
    }

    /// Connection to load through and a working copy of the catalog.
    pub(crate) fn begin_load(&mut self) -> (&mut Connection, Catalog) {
        (&mut self.conn, self.catalog.clone())
    }

    /// Publish the catalog of a committed load.
    pub(crate) fn finish_load(&mut self, catalog: Catalog, pagination: Option<PaginationInfo>) {
        self.catalog = catalog;
        if pagination.is_some() {
            self.pagination = pagination;
        }
        self.loads += 1;
    }
}

/// Shared handle to a session store.
///
/// Staging and querying take the store lock in turn, so loads into the same
/// session form a sequential queue. The load bookkeeping lives outside the
/// lock so the registry can decide on eviction without waiting for a store.
pub struct SessionHandle {
    access_id: String,
    store: Mutex<SessionStore>,
    /// Stagers holding a claim on this session.
    pending: AtomicUsize,
    /// Set once any load into the store has committed.
    loaded: AtomicBool,
    created_at: DateTime<Utc>,
}

impl SessionHandle {
    pub fn open(access_id: impl Into<String>) -> Result<Self> {
        let access_id = access_id.into();
        let store = SessionStore::open()?;
        debug!(access_id = %access_id, "Opened session store");

        Ok(Self {
            access_id,
            store: Mutex::new(store),
            pending: AtomicUsize::new(0),
            loaded: AtomicBool::new(false),
            created_at: Utc::now(),
        })
    }

    pub fn access_id(&self) -> &str {
        &self.access_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, SessionStore>> {
        self.store
            .lock()
            .map_err(|e| DbError::LockError(format!("session '{}': {}", self.access_id, e)))
    }

    pub fn has_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Record a committed load.
    pub fn mark_loaded(&self) {
        self.loaded.store(true, Ordering::Release);
    }

    pub(crate) fn begin_claim(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop one claim; returns the number of claims still held.
    pub(crate) fn end_claim(&self) -> usize {
        self.pending.fetch_sub(1, Ordering::AcqRel).saturating_sub(1)
    }
}
