//! Primary store schema initialization

use miette::{miette, IntoDiagnostic, Result};
use rusqlite::{Connection, OptionalExtension};

use super::SCHEMA_VERSION;

/// Create tables on a fresh database, or verify the version of an existing one
pub(super) fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY);",
    )
    .into_diagnostic()?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()
        .into_diagnostic()?;

    match version {
        Some(v) if v == SCHEMA_VERSION => Ok(()),
        Some(v) => Err(miette!(
            code = "spk::store::schema_version",
            help = "this database was written by a different version of spk",
            "primary store has schema version {}, expected {}",
            v,
            SCHEMA_VERSION
        )),
        None => create_tables(conn),
    }
}

fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        BEGIN;

        -- Next identifier per entity type; never decremented
        CREATE TABLE IF NOT EXISTS sequences (
            kind TEXT PRIMARY KEY,
            next_id INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS address (
            id INTEGER PRIMARY KEY,
            street_address TEXT NOT NULL,
            postal_code TEXT,
            city TEXT,
            created_by TEXT NOT NULL,
            created_date TEXT NOT NULL,
            last_modified_by TEXT,
            last_modified_date TEXT
        );

        CREATE TABLE IF NOT EXISTS car_park (
            id INTEGER PRIMARY KEY,
            name TEXT,
            owner TEXT,
            address_id INTEGER REFERENCES address(id),
            created_by TEXT NOT NULL,
            created_date TEXT NOT NULL,
            last_modified_by TEXT,
            last_modified_date TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_car_park_address ON car_park(address_id);

        CREATE TABLE IF NOT EXISTS open_hours (
            id INTEGER PRIMARY KEY,
            weekday TEXT,
            opening_hour TEXT,
            closing_hour TEXT,
            date TEXT,
            car_park_id INTEGER REFERENCES car_park(id),
            created_by TEXT NOT NULL,
            created_date TEXT NOT NULL,
            last_modified_by TEXT,
            last_modified_date TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_open_hours_car_park ON open_hours(car_park_id);

        CREATE TABLE IF NOT EXISTS parking_spot (
            id INTEGER PRIMARY KEY,
            accessible_parking INTEGER,
            available INTEGER NOT NULL,
            floor INTEGER,
            car_park_id INTEGER REFERENCES car_park(id),
            created_by TEXT NOT NULL,
            created_date TEXT NOT NULL,
            last_modified_by TEXT,
            last_modified_date TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_parking_spot_car_park ON parking_spot(car_park_id);

        -- user_id points at an account owned by the identity service; one row per account
        CREATE TABLE IF NOT EXISTS user_extra (
            id INTEGER PRIMARY KEY,
            current_parking_spot TEXT,
            time_of_parking TEXT,
            parking_spot_id INTEGER UNIQUE REFERENCES parking_spot(id),
            user_id INTEGER UNIQUE,
            created_by TEXT NOT NULL,
            created_date TEXT NOT NULL,
            last_modified_by TEXT,
            last_modified_date TEXT
        );

        COMMIT;
        "#,
    )
    .into_diagnostic()?;

    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [SCHEMA_VERSION],
    )
    .into_diagnostic()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_is_repeatable() {
        let tmp = tempdir().unwrap();
        let conn = Connection::open(tmp.path().join("p.db")).unwrap();
        init(&conn).unwrap();
        init(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('address', 'car_park', 'open_hours', 'parking_spot', 'user_extra')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 5);
    }

    #[test]
    fn test_init_rejects_other_version() {
        let tmp = tempdir().unwrap();
        let conn = Connection::open(tmp.path().join("p.db")).unwrap();
        conn.execute_batch(
            "CREATE TABLE schema_version (version INTEGER PRIMARY KEY); INSERT INTO schema_version VALUES (99);",
        )
        .unwrap();
        assert!(init(&conn).is_err());
    }
}
