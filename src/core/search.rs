//! Search index mirror
//!
//! A secondary, query-optimized copy of every entity. The mirror is not
//! authoritative: it is written after the primary store commits and may
//! lag behind it; [`crate::core::service::ResourceService::reindex`]
//! rebuilds it from the primary store.
//!
//! The SQLite implementation keeps one FTS5 table per entity type. The
//! rowid is the entity id, `document` holds the serialized entity and the
//! remaining columns hold its searchable fields.

use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::vec;

use miette::{IntoDiagnostic, Result};
use rusqlite::{params_from_iter, Connection, ErrorCode};
use rusqlite::types::Value;
use tracing::{info, warn};

use crate::core::entity::Entity;
use crate::core::error::{ErrorKey, ResourceError, ResourceResult, StoreRole};
use crate::core::identity::EntityKind;

/// Current schema version - the index is dropped and recreated on mismatch
const SCHEMA_VERSION: i32 = 1;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Operations the service needs from a search backend
pub trait SearchIndex: Send + Sync {
    /// Insert or replace the document for `entity`
    fn save<E: Entity>(&self, entity: &E) -> ResourceResult<()>;

    /// Remove the document for `id`; absent documents are not an error
    fn delete_by_id(&self, kind: EntityKind, id: i64) -> ResourceResult<()>;

    /// Run a query expression, best matches first
    fn search<E: Entity>(&self, query: &str) -> ResourceResult<SearchHits<E>>;

    /// Remove every document of `kind`
    fn clear(&self, kind: EntityKind) -> ResourceResult<()>;
}

/// Results of one query: fetched eagerly, decoded lazily
///
/// The matching documents are read before the connection closes, so the
/// hits can cross threads; each document is turned into an entity only
/// when the iterator reaches it. Consumed once; documents that no longer
/// decode are skipped.
pub struct SearchHits<E> {
    documents: vec::IntoIter<String>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> SearchHits<E> {
    pub fn new(documents: Vec<String>) -> Self {
        Self {
            documents: documents.into_iter(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Iterator for SearchHits<E> {
    type Item = E;

    fn next(&mut self) -> Option<E> {
        for document in self.documents.by_ref() {
            match serde_json::from_str(&document) {
                Ok(entity) => return Some(entity),
                Err(e) => warn!(entity = %E::KIND, error = %e, "skipping undecodable search document"),
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.documents.len()))
    }
}

/// FTS5-backed search index in its own SQLite file
#[derive(Debug, Clone)]
pub struct SqliteSearchIndex {
    path: PathBuf,
    reset: bool,
}

impl SqliteSearchIndex {
    /// Open or create the index at `path`
    ///
    /// A missing or outdated index is (re)created empty and
    /// [`SqliteSearchIndex::needs_reindex`] reports it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).into_diagnostic()?;
            }
        }

        let mut index = Self { path, reset: false };
        let conn = index.connection().into_diagnostic()?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .into_diagnostic()?;

        if index.current_version(&conn) != Some(SCHEMA_VERSION) {
            index.reinitialize(&conn)?;
            index.reset = true;
        }
        Ok(index)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the index was created or reset when it was opened
    pub fn needs_reindex(&self) -> bool {
        self.reset
    }

    fn connection(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    fn connect(&self, kind: EntityKind) -> ResourceResult<Connection> {
        self.connection().map_err(mirror(kind))
    }

    fn current_version(&self, conn: &Connection) -> Option<i32> {
        conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok()
    }

    fn reinitialize(&self, conn: &Connection) -> Result<()> {
        let mut sql = String::from("BEGIN;\nDROP TABLE IF EXISTS schema_version;\n");
        for kind in EntityKind::all() {
            sql.push_str(&format!("DROP TABLE IF EXISTS {};\n", kind.index_name()));
            sql.push_str(&format!(
                "CREATE VIRTUAL TABLE {} USING fts5(document UNINDEXED, {});\n",
                kind.index_name(),
                kind.search_fields().join(", ")
            ));
        }
        sql.push_str("CREATE TABLE schema_version (version INTEGER PRIMARY KEY);\n");
        sql.push_str(&format!(
            "INSERT INTO schema_version (version) VALUES ({});\nCOMMIT;",
            SCHEMA_VERSION
        ));
        conn.execute_batch(&sql).into_diagnostic()?;

        info!(path = %self.path.display(), "search index initialized");
        Ok(())
    }

    /// Number of documents of `kind`
    pub fn count(&self, kind: EntityKind) -> ResourceResult<usize> {
        let conn = self.connect(kind)?;
        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", kind.index_name()),
                [],
                |row| row.get(0),
            )
            .map_err(mirror(kind))?;
        Ok(count as usize)
    }
}

impl SearchIndex for SqliteSearchIndex {
    fn save<E: Entity>(&self, entity: &E) -> ResourceResult<()> {
        let id = entity.id().get().ok_or_else(|| {
            ResourceError::invalid(E::KIND, ErrorKey::IdNull, "Cannot index an unsaved entity")
        })?;
        let document = serde_json::to_string(entity).map_err(|e| {
            ResourceError::invalid(E::KIND, ErrorKey::Validation, e.to_string())
        })?;

        let table = E::KIND.index_name();
        let fields = E::KIND.search_fields();
        let placeholders = (3..fields.len() + 3)
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let insert = format!(
            "INSERT INTO {} (rowid, document, {}) VALUES (?1, ?2, {})",
            table,
            fields.join(", "),
            placeholders
        );

        let mut values = vec![Value::Integer(id), Value::Text(document)];
        values.extend(entity.search_values().into_iter().map(Value::Text));

        let mut conn = self.connect(E::KIND)?;
        let tx = conn.transaction().map_err(mirror(E::KIND))?;
        tx.execute(&format!("DELETE FROM {} WHERE rowid = ?1", table), [id])
            .map_err(mirror(E::KIND))?;
        tx.execute(&insert, params_from_iter(values))
            .map_err(mirror(E::KIND))?;
        tx.commit().map_err(mirror(E::KIND))
    }

    fn delete_by_id(&self, kind: EntityKind, id: i64) -> ResourceResult<()> {
        let conn = self.connect(kind)?;
        conn.execute(
            &format!("DELETE FROM {} WHERE rowid = ?1", kind.index_name()),
            [id],
        )
        .map_err(mirror(kind))?;
        Ok(())
    }

    fn search<E: Entity>(&self, query: &str) -> ResourceResult<SearchHits<E>> {
        let table = E::KIND.index_name();
        let query = query.trim();
        let conn = self.connect(E::KIND)?;

        let documents = if query.is_empty() || query == "*" {
            read_documents(
                &conn,
                &format!("SELECT document FROM {} ORDER BY rowid", table),
                None,
            )
        } else {
            read_documents(
                &conn,
                &format!(
                    "SELECT document FROM {table} WHERE {table} MATCH ?1 ORDER BY rank",
                    table = table
                ),
                Some(query),
            )
        }
        .map_err(|e| query_error(E::KIND, query, e))?;

        Ok(SearchHits::new(documents))
    }

    fn clear(&self, kind: EntityKind) -> ResourceResult<()> {
        let conn = self.connect(kind)?;
        conn.execute(&format!("DELETE FROM {}", kind.index_name()), [])
            .map_err(mirror(kind))?;
        Ok(())
    }
}

fn read_documents(
    conn: &Connection,
    sql: &str,
    query: Option<&str>,
) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let documents = stmt
        .query_map(params_from_iter(query), |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>();
    documents
}

fn mirror(kind: EntityKind) -> impl Fn(rusqlite::Error) -> ResourceError {
    move |err| ResourceError::from_sqlite(kind, StoreRole::Mirror, err)
}

/// A generic SQL error from MATCH means the expression did not parse
fn query_error(kind: EntityKind, query: &str, err: rusqlite::Error) -> ResourceError {
    match err {
        rusqlite::Error::SqliteFailure(failure, ref msg) if failure.code == ErrorCode::Unknown => {
            ResourceError::invalid(
                kind,
                ErrorKey::BadQuery,
                format!(
                    "invalid query '{}': {}",
                    query,
                    msg.clone().unwrap_or_else(|| failure.to_string())
                ),
            )
        }
        other => ResourceError::from_sqlite(kind, StoreRole::Mirror, other),
    }
}
