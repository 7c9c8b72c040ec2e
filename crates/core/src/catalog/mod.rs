//! SQLite catalog for the cross-cutting state that is not an artifact:
//! tags, import history, and collection names.
//!
//! The schema is versioned through `PRAGMA user_version` and migrated forward
//! on open.

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::codec;
use crate::error::EngineError;
use crate::oid::Oid;
use crate::value::Value;

/// Minimum schema version we know how to handle.
///
/// `0` means "no schema yet" (fresh DB).
const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 0;

/// Latest schema version this crate knows about.
pub const CURRENT_SCHEMA_VERSION: i32 = 3;

/// Error type for catalog operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// The database was created with a newer schema version than we support.
    #[error(
        "Unsupported schema version {found}; supported range is {min_supported}..={max_supported}"
    )]
    UnsupportedSchemaVersion { found: i32, min_supported: i32, max_supported: i32 },

    #[error("Stored value could not be decoded: {0}")]
    Value(String),
}

/// Convenience result type for catalog operations.
pub type DbResult<T> = Result<T, DbError>;

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        EngineError::Catalog(err.to_string())
    }
}

/// One import of a file under one name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRecord {
    pub oid: Oid,
    /// Basename at import time.
    pub name: String,
    pub path: String,
    pub size: u64,
    pub mtime: Option<i64>,
    /// RFC 3339 timestamp.
    pub imported_at: String,
}

/// SQLite-backed catalog.
#[derive(Debug)]
pub struct CatalogDb {
    conn: Connection,
}

impl CatalogDb {
    /// Open (or create) a catalog at the given path and ensure the schema exists.
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn schema_version(&self) -> DbResult<i32> {
        current_schema_version(&self.conn)
    }

    /// Tag map of `oid`; empty when nothing was applied.
    pub fn get_tags(&self, oid: &Oid) -> DbResult<BTreeMap<String, Value>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT key, value
            FROM tags
            WHERE oid = ?1
            ORDER BY key
            "#,
        )?;
        let rows = stmt.query_map(params![oid.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let mut out = BTreeMap::new();
        for row in rows {
            let (key, raw) = row?;
            out.insert(key, decode_value(&raw)?);
        }
        Ok(out)
    }

    /// Merge `tags` into the tag map of `oid`; existing keys are overwritten.
    pub fn apply_tags(&self, oid: &Oid, tags: &BTreeMap<String, Value>) -> DbResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR REPLACE INTO tags (oid, key, value)
                VALUES (?1, ?2, ?3)
                "#,
            )?;
            for (key, value) in tags {
                let raw = codec::encode(value).map_err(|e| DbError::Value(e.to_string()))?;
                stmt.execute(params![oid.as_str(), key, raw])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Every OID carrying `key`, with its value.
    pub fn tagged(&self, key: &str) -> DbResult<Vec<(Oid, Value)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT oid, value
            FROM tags
            WHERE key = ?1
            ORDER BY oid
            "#,
        )?;
        let rows = stmt.query_map(params![key], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (oid, raw) = row?;
            if let Some(oid) = Oid::parse(&oid) {
                out.push((oid, decode_value(&raw)?));
            }
        }
        Ok(out)
    }

    pub fn record_import(&self, record: &ImportRecord) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO imports (oid, name, path, size, mtime, imported_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record.oid.as_str(),
                record.name,
                record.path,
                record.size as i64,
                record.mtime,
                record.imported_at
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Import history of `oid`, oldest first.
    pub fn imports_for(&self, oid: &Oid) -> DbResult<Vec<ImportRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT oid, name, path, size, mtime, imported_at
            FROM imports
            WHERE oid = ?1
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map(params![oid.as_str()], |row| {
            let size: i64 = row.get(3)?;
            Ok(ImportRecord {
                oid: oid.clone(),
                name: row.get(1)?,
                path: row.get(2)?,
                size: size.max(0) as u64,
                mtime: row.get(4)?,
                imported_at: row.get(5)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Bind `name` to a collection OID, replacing any previous binding.
    pub fn set_collection_name(&self, name: &str, oid: &Oid) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO collection_names (name, oid)
            VALUES (?1, ?2)
            "#,
            params![name, oid.as_str()],
        )?;
        Ok(())
    }

    pub fn collection_oid(&self, name: &str) -> DbResult<Option<Oid>> {
        let raw: Option<String> = self
            .conn
            .query_row("SELECT oid FROM collection_names WHERE name = ?1", params![name], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(raw.and_then(|r| Oid::parse(&r)))
    }

    /// All named collections, ordered by name.
    pub fn collection_names(&self) -> DbResult<Vec<(String, Oid)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT name, oid
            FROM collection_names
            ORDER BY name
            "#,
        )?;
        let rows =
            stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut out = Vec::new();
        for row in rows {
            let (name, oid) = row?;
            if let Some(oid) = Oid::parse(&oid) {
                out.push((name, oid));
            }
        }
        Ok(out)
    }

    /// Returns whether a binding was removed.
    pub fn delete_collection_name(&self, name: &str) -> DbResult<bool> {
        let n = self.conn.execute("DELETE FROM collection_names WHERE name = ?1", params![name])?;
        Ok(n > 0)
    }
}

fn decode_value(raw: &[u8]) -> DbResult<Value> {
    codec::decode(raw).map_err(|e| DbError::Value(e.to_string()))
}

/// Apply migrations up to [`CURRENT_SCHEMA_VERSION`].
fn apply_migrations(conn: &Connection) -> DbResult<()> {
    let mut current_version = current_schema_version(conn)?;

    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            found: current_version,
            min_supported: MIN_SUPPORTED_SCHEMA_VERSION,
            max_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    if current_version == 0 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS tags (
                oid   TEXT NOT NULL,
                key   TEXT NOT NULL,
                value BLOB NOT NULL,
                PRIMARY KEY (oid, key)
            );
            CREATE INDEX IF NOT EXISTS tags_by_key ON tags (key);

            PRAGMA user_version = 1;
            COMMIT;
            "#,
        )?;
        current_version = 1;
    }

    if current_version < 2 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS imports (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                oid         TEXT NOT NULL,
                name        TEXT NOT NULL,
                path        TEXT NOT NULL,
                size        INTEGER NOT NULL,
                mtime       INTEGER,
                imported_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS imports_by_oid ON imports (oid);

            PRAGMA user_version = 2;
            COMMIT;
            "#,
        )?;
        current_version = 2;
    }

    if current_version < 3 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS collection_names (
                name TEXT PRIMARY KEY,
                oid  TEXT NOT NULL
            );

            PRAGMA user_version = 3;
            COMMIT;
            "#,
        )?;
    }

    Ok(())
}

/// Read the SQLite schema version from `PRAGMA user_version`.
fn current_schema_version(conn: &Connection) -> DbResult<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_merge_per_key() {
        let db = CatalogDb::open_in_memory().expect("open");
        let oid = Oid::from_bytes(b"x");
        db.apply_tags(&oid, &BTreeMap::from([("a".to_string(), Value::Int(1))])).expect("tag");
        db.apply_tags(&oid, &BTreeMap::from([("b".to_string(), Value::Str("two".into()))]))
            .expect("tag");
        db.apply_tags(&oid, &BTreeMap::from([("a".to_string(), Value::Int(3))])).expect("tag");
        let tags = db.get_tags(&oid).expect("get");
        assert_eq!(tags.get("a"), Some(&Value::Int(3)));
        assert_eq!(tags.get("b"), Some(&Value::Str("two".into())));
        assert_eq!(db.tagged("b").expect("tagged").len(), 1);
    }

    #[test]
    fn rejects_newer_schema() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("catalog.db");
        {
            let conn = Connection::open(&path).expect("open raw");
            conn.execute_batch("PRAGMA user_version = 99;").expect("pragma");
        }
        let err = CatalogDb::open(&path).expect_err("newer schema");
        assert!(matches!(err, DbError::UnsupportedSchemaVersion { found: 99, .. }));
    }

    #[test]
    fn collection_names_bind_and_unbind() {
        let db = CatalogDb::open_in_memory().expect("open");
        let oid = Oid::from_bytes(b"members");
        db.set_collection_name("samples", &oid).expect("set");
        assert_eq!(db.collection_oid("samples").expect("get"), Some(oid.clone()));
        assert_eq!(db.collection_names().expect("list"), vec![("samples".to_string(), oid)]);
        assert!(db.delete_collection_name("samples").expect("delete"));
        assert_eq!(db.collection_oid("samples").expect("get"), None);
    }
}
