//! Primary store gateway backed by SQLite
//!
//! The primary store is authoritative. Every unit of work opens its own
//! connection; writes run inside `BEGIN IMMEDIATE` transactions so that
//! existence checks and read-modify-write sequences are serialized by
//! SQLite rather than by callers.
//!
//! Identifiers come from the `sequences` table and are never reused.

mod relations;
mod schema;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use miette::{IntoDiagnostic, Result};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use rusqlite::TransactionBehavior;

use crate::core::audit::AuditRecord;
use crate::core::entity::Entity;
use crate::core::error::{ErrorKey, ResourceError, ResourceResult, StoreRole};
use crate::core::graph::{AssociationIndex, Relink};
use crate::core::identity::EntityKind;
use crate::core::links::{self, Association, Cardinality};

/// Current schema version of the primary store
const SCHEMA_VERSION: i32 = 2;

/// How long a writer waits for a competing transaction before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A stored entity together with the other rows the write relinked
#[derive(Debug, Clone)]
pub struct Written<E> {
    pub entity: E,
    pub relinked: Vec<Relink>,
}

/// Outcome of a delete
#[derive(Debug, Clone, Default)]
pub struct Deleted {
    /// Whether a record existed
    pub found: bool,
    /// Children detached from the deleted parent
    pub relinked: Vec<Relink>,
}

/// Which rows a select reads
#[derive(Debug, Clone, Copy)]
pub(crate) enum RowFilter {
    All,
    Id(i64),
    Column(&'static str, i64),
}

/// Handle to the primary SQLite database
#[derive(Debug, Clone)]
pub struct PrimaryStore {
    path: PathBuf,
}

impl PrimaryStore {
    /// Open or create the primary store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).into_diagnostic()?;
            }
        }

        let store = Self { path };
        let conn = store.connection().into_diagnostic()?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .into_diagnostic()?;
        schema::init(&conn)?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A fresh connection for one unit of work
    pub fn connection(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    fn connect(&self, kind: EntityKind) -> ResourceResult<Connection> {
        self.connection().map_err(primary(kind))
    }

    /// Store a new entity and assign its identifier
    ///
    /// The `idexists` and validation checks repeat the service's checks so
    /// the gateway rejects bad input even when called directly.
    pub fn create<E: Entity>(&self, mut entity: E, actor: &str) -> ResourceResult<Written<E>> {
        if entity.id().is_saved() {
            return Err(ResourceError::invalid(
                E::KIND,
                ErrorKey::IdExists,
                format!("A new {} cannot already have an ID", E::KIND),
            ));
        }
        entity.validate()?;

        let mut conn = self.connect(E::KIND)?;
        let tx = begin(&mut conn, E::KIND)?;

        let id = next_id(&tx, E::KIND).map_err(primary(E::KIND))?;
        let relinked = claim_all(&tx, &entity, id, actor)?;

        let columns = E::COLUMNS.join(", ");
        let placeholders = (1..=E::COLUMNS.len() + 5)
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} (id, {}, created_by, created_date, last_modified_by, last_modified_date) VALUES ({})",
            E::KIND.table(),
            columns,
            placeholders
        );

        let now = now();
        let mut values = vec![Value::Integer(id)];
        values.extend(entity.to_row());
        values.push(Value::Text(actor.to_string()));
        values.push(Value::Text(now.clone()));
        values.push(Value::Text(actor.to_string()));
        values.push(Value::Text(now));

        tx.execute(&sql, params_from_iter(values))
            .map_err(primary(E::KIND))?;
        tx.commit().map_err(primary(E::KIND))?;

        entity.assign_id(id);
        Ok(Written { entity, relinked })
    }

    /// Replace every mutable field of the stored record `id`
    pub fn update<E: Entity>(&self, id: i64, entity: E, actor: &str) -> ResourceResult<Written<E>> {
        check_identity(id, &entity)?;
        entity.validate()?;

        let mut conn = self.connect(E::KIND)?;
        let tx = begin(&mut conn, E::KIND)?;

        if !row_exists(&tx, E::KIND, id).map_err(primary(E::KIND))? {
            return Err(id_not_found(E::KIND));
        }
        let relinked = claim_all(&tx, &entity, id, actor)?;
        write_row(&tx, id, &entity, actor)?;
        tx.commit().map_err(primary(E::KIND))?;

        Ok(Written { entity, relinked })
    }

    /// Overwrite only the fields present in `patch`
    ///
    /// The read and the write happen in one immediate transaction, so a
    /// concurrent writer to the same record cannot slip in between.
    pub fn partial_update<E: Entity>(&self, id: i64, patch: E, actor: &str) -> ResourceResult<E> {
        check_identity(id, &patch)?;

        let mut conn = self.connect(E::KIND)?;
        let tx = begin(&mut conn, E::KIND)?;

        let mut current = select::<E>(&tx, RowFilter::Id(id))
            .map_err(primary(E::KIND))?
            .pop()
            .ok_or_else(|| id_not_found(E::KIND))?;
        current.merge(patch);
        current.validate()?;

        write_row(&tx, id, &current, actor)?;
        tx.commit().map_err(primary(E::KIND))?;

        Ok(current)
    }

    /// Delete a record, detaching any children that pointed at it
    ///
    /// Deleting an absent record succeeds and reports `found: false`.
    pub fn delete(&self, kind: EntityKind, id: i64, actor: &str) -> ResourceResult<Deleted> {
        let mut conn = self.connect(kind)?;
        let tx = begin(&mut conn, kind)?;

        let mut relinked = Vec::new();
        for association in links::children_of(kind) {
            let pairs = parent_pairs(&tx, association, id).map_err(primary(association.child))?;
            let mut index = AssociationIndex::load(association, pairs);
            let relinks = index.forget_parent(id);
            write_relinks(&tx, &relinks, actor)?;
            relinked.extend(relinks);
        }

        let removed = tx
            .execute(&format!("DELETE FROM {} WHERE id = ?1", kind.table()), [id])
            .map_err(primary(kind))?;
        tx.commit().map_err(primary(kind))?;

        Ok(Deleted {
            found: removed > 0,
            relinked,
        })
    }

    pub fn find_all<E: Entity>(&self) -> ResourceResult<Vec<E>> {
        let conn = self.connect(E::KIND)?;
        select::<E>(&conn, RowFilter::All).map_err(primary(E::KIND))
    }

    pub fn find_by_id<E: Entity>(&self, id: i64) -> ResourceResult<Option<E>> {
        let conn = self.connect(E::KIND)?;
        Ok(select::<E>(&conn, RowFilter::Id(id))
            .map_err(primary(E::KIND))?
            .pop())
    }

    pub fn exists(&self, kind: EntityKind, id: i64) -> ResourceResult<bool> {
        let conn = self.connect(kind)?;
        row_exists(&conn, kind, id).map_err(primary(kind))
    }

    pub fn count(&self, kind: EntityKind) -> ResourceResult<usize> {
        let conn = self.connect(kind)?;
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", kind.table()), [], |row| {
                row.get(0)
            })
            .map_err(primary(kind))?;
        Ok(count as usize)
    }

    /// Audit columns of a stored record
    pub fn audit_of(&self, kind: EntityKind, id: i64) -> ResourceResult<Option<AuditRecord>> {
        let conn = self.connect(kind)?;
        conn.query_row(
            &format!(
                "SELECT created_by, created_date, last_modified_by, last_modified_date FROM {} WHERE id = ?1",
                kind.table()
            ),
            [id],
            |row| {
                Ok(AuditRecord {
                    created_by: row.get(0)?,
                    created_date: read_timestamp(row, 1)?.unwrap_or_default(),
                    last_modified_by: row.get(2)?,
                    last_modified_date: read_timestamp(row, 3)?,
                })
            },
        )
        .optional()
        .map_err(primary(kind))
    }
}

/// Reject a replacement payload whose identifier is missing or disagrees with `id`
pub fn check_identity<E: Entity>(id: i64, entity: &E) -> ResourceResult<()> {
    match entity.id().get() {
        None => Err(ResourceError::invalid(E::KIND, ErrorKey::IdNull, "Invalid id")),
        Some(own) if own != id => Err(ResourceError::invalid(
            E::KIND,
            ErrorKey::IdInvalid,
            "Invalid ID",
        )),
        Some(_) => Ok(()),
    }
}

fn id_not_found(kind: EntityKind) -> ResourceError {
    ResourceError::not_found(kind, ErrorKey::IdNotFound, "Entity not found")
}

fn primary(kind: EntityKind) -> impl Fn(rusqlite::Error) -> ResourceError {
    move |err| ResourceError::from_sqlite(kind, StoreRole::Primary, err)
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn begin(conn: &mut Connection, kind: EntityKind) -> ResourceResult<Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(primary(kind))
}

/// Advance the per-kind sequence and return the id it pointed at
fn next_id(tx: &Transaction<'_>, kind: EntityKind) -> rusqlite::Result<i64> {
    tx.execute(
        "INSERT INTO sequences (kind, next_id) VALUES (?1, 1) ON CONFLICT(kind) DO NOTHING",
        [kind.table()],
    )?;
    let id: i64 = tx.query_row(
        "SELECT next_id FROM sequences WHERE kind = ?1",
        [kind.table()],
        |row| row.get(0),
    )?;
    tx.execute(
        "UPDATE sequences SET next_id = next_id + 1 WHERE kind = ?1",
        [kind.table()],
    )?;
    Ok(id)
}

fn row_exists(conn: &Connection, kind: EntityKind, id: i64) -> rusqlite::Result<bool> {
    conn.query_row(
        &format!("SELECT 1 FROM {} WHERE id = ?1", kind.table()),
        [id],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

fn write_row<E: Entity>(tx: &Transaction<'_>, id: i64, entity: &E, actor: &str) -> ResourceResult<()> {
    let assignments = E::COLUMNS
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{} = ?{}", column, i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let n = E::COLUMNS.len();
    let sql = format!(
        "UPDATE {} SET {}, last_modified_by = ?{}, last_modified_date = ?{} WHERE id = ?{}",
        E::KIND.table(),
        assignments,
        n + 1,
        n + 2,
        n + 3
    );

    let mut values = entity.to_row();
    values.push(Value::Text(actor.to_string()));
    values.push(Value::Text(now()));
    values.push(Value::Integer(id));

    let changed = tx
        .execute(&sql, params_from_iter(values))
        .map_err(primary(E::KIND))?;
    if changed == 0 {
        return Err(id_not_found(E::KIND));
    }
    Ok(())
}

/// For each one-to-one association `entity` points into, take the parent
/// away from whichever row currently holds it
fn claim_all<E: Entity>(
    tx: &Transaction<'_>,
    entity: &E,
    id: i64,
    actor: &str,
) -> ResourceResult<Vec<Relink>> {
    let mut relinked = Vec::new();
    for association in links::owned_by(E::KIND) {
        if association.cardinality != Cardinality::One {
            continue;
        }
        if let Some(parent) = entity.back_reference(association) {
            relinked.extend(claim(tx, association, id, parent, actor)?);
        }
    }
    Ok(relinked)
}

fn claim(
    tx: &Transaction<'_>,
    association: &'static Association,
    child: i64,
    parent: i64,
    actor: &str,
) -> ResourceResult<Vec<Relink>> {
    let mut stmt = tx
        .prepare(&format!(
            "SELECT id, {col} FROM {table} WHERE {col} = ?1 OR id = ?2",
            col = association.column,
            table = association.child.table()
        ))
        .map_err(primary(association.child))?;
    let pairs = stmt
        .query_map(params![parent, child], |row| Ok((row.get(0)?, row.get(1)?)))
        .map_err(primary(association.child))?
        .collect::<rusqlite::Result<Vec<(i64, Option<i64>)>>>()
        .map_err(primary(association.child))?;

    let mut index = AssociationIndex::load(association, pairs);
    let relinks: Vec<Relink> = index
        .set_back_reference(child, Some(parent))
        .into_iter()
        .filter(|r| r.child != child)
        .collect();
    write_relinks(tx, &relinks, actor)?;
    Ok(relinks)
}

/// `(child, parent)` pairs of every child currently under `parent`
fn parent_pairs(
    conn: &Connection,
    association: &Association,
    parent: i64,
) -> rusqlite::Result<Vec<(i64, Option<i64>)>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, {col} FROM {table} WHERE {col} = ?1",
        col = association.column,
        table = association.child.table()
    ))?;
    let pairs = stmt
        .query_map([parent], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>();
    pairs
}

/// Persist relinks computed by an [`AssociationIndex`]
fn write_relinks(tx: &Transaction<'_>, relinks: &[Relink], actor: &str) -> ResourceResult<()> {
    let now = now();
    for relink in relinks {
        let association = relink.association;
        tx.execute(
            &format!(
                "UPDATE {} SET {} = ?1, last_modified_by = ?2, last_modified_date = ?3 WHERE id = ?4",
                association.child.table(),
                association.column
            ),
            params![relink.after, actor, now, relink.child],
        )
        .map_err(primary(association.child))?;
    }
    Ok(())
}

/// Read entities of type `E`
pub(crate) fn select<E: Entity>(conn: &Connection, filter: RowFilter) -> rusqlite::Result<Vec<E>> {
    let base = format!(
        "SELECT id, {} FROM {}",
        E::COLUMNS.join(", "),
        E::KIND.table()
    );
    let (sql, arg) = match filter {
        RowFilter::All => (format!("{} ORDER BY id", base), None),
        RowFilter::Id(id) => (format!("{} WHERE id = ?1", base), Some(id)),
        RowFilter::Column(column, value) => (
            format!("{} WHERE {} = ?1 ORDER BY id", base, column),
            Some(value),
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(arg), |row| E::from_row(row))?
        .collect::<rusqlite::Result<Vec<E>>>();
    rows
}

fn read_timestamp(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}
