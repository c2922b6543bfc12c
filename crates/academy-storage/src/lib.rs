use academy_core::ObjectiveType;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;
use thiserror::Error;

mod achievements;
mod admin;
mod courses;
mod curriculum;
mod ordering;
mod progress;
mod seed;
mod users;

pub use achievements::{CompletionEvent, ReconcileReport};
pub use progress::RecordedProgress;
pub use seed::SeedReport;

pub const ACADEMY_SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("timestamp parse error: {0}")]
    Timestamp(String),
    #[error("invalid objective type: {0}")]
    InvalidObjectiveType(String),
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
}

/// SQLite-backed store for the course catalog, progress log and achievements.
///
/// Every mutating operation runs inside one immediate transaction; an error
/// returned mid-operation drops the transaction and rolls back every write.
pub struct AcademyStore {
    conn: Connection,
}

impl AcademyStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn schema_version(&self) -> Result<i64, StorageError> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    pub fn migrate(&self) -> Result<(), StorageError> {
        let current = self.schema_version()?;
        if current > ACADEMY_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedSchemaVersion {
                found: current,
                supported: ACADEMY_SCHEMA_VERSION,
            });
        }

        if current < 1 {
            let sql = include_str!("../migrations/0001_academy_schema.sql");
            self.conn.execute_batch(sql)?;
            self.conn
                .execute("PRAGMA user_version = 1", [])
                .map(|_| ())?;
        }

        Ok(())
    }

    pub fn table_exists(&self, table_name: &str) -> Result<bool, StorageError> {
        let exists = self
            .conn
            .query_row(
                "
                SELECT 1
                FROM sqlite_master
                WHERE type='table' AND name = ?1
                LIMIT 1
                ",
                [table_name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    fn write_tx(&mut self) -> Result<Transaction<'_>, StorageError> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }
}

fn parse_timestamp(value: String) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|err| StorageError::Timestamp(err.to_string()))
}

fn column_timestamp(
    index: usize,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, rusqlite::Error> {
    value
        .map(|value| {
            parse_timestamp(value).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(
                    index,
                    rusqlite::types::Type::Text,
                    Box::new(err),
                )
            })
        })
        .transpose()
}

fn column_objective(index: usize, value: String) -> Result<ObjectiveType, rusqlite::Error> {
    value.parse().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Text,
            Box::new(StorageError::InvalidObjectiveType(err)),
        )
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn migration_creates_academy_tables() {
        let db = AcademyStore::open_in_memory().expect("open db");

        for table in [
            "courses",
            "users",
            "chapters",
            "lessons",
            "lesson_progress",
            "achievements",
            "user_achievements",
        ] {
            assert!(db.table_exists(table).expect("table check"));
        }

        assert_eq!(
            db.schema_version().expect("schema version"),
            ACADEMY_SCHEMA_VERSION
        );
    }

    #[test]
    fn reopening_file_keeps_schema_version() {
        let file = NamedTempFile::new().expect("temp db");
        {
            let db = AcademyStore::open(file.path()).expect("open db");
            assert_eq!(db.schema_version().expect("schema version"), 1);
        }
        let reopened = AcademyStore::open(file.path()).expect("reopen db");
        assert_eq!(
            reopened.schema_version().expect("schema version"),
            ACADEMY_SCHEMA_VERSION
        );
    }

    #[test]
    fn newer_schema_is_rejected() {
        let file = NamedTempFile::new().expect("temp db");
        {
            let conn = Connection::open(file.path()).expect("open raw");
            conn.execute("PRAGMA user_version = 9", []).expect("bump version");
        }
        match AcademyStore::open(file.path()) {
            Err(StorageError::UnsupportedSchemaVersion { found, supported }) => {
                assert_eq!(found, 9);
                assert_eq!(supported, ACADEMY_SCHEMA_VERSION);
            }
            other => panic!("expected unsupported schema, got {:?}", other.map(|_| ())),
        }
    }
}
