/*!
Append-only audit log of mutating operations, kept in a local SQLite file
*/

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{StateError, StateResult};

/// Prefix shared by every identifier-regeneration entry
pub const IDENTIFIER_OPERATION_PREFIX: &str = "ID";

const SQLITE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single logged operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: i64,
    pub operation: String,
    pub timestamp: DateTime<Utc>,
}

pub struct AuditLog {
    conn: Connection,
}

impl AuditLog {
    /// Open (or create) the store at `db_path` and ensure the schema exists
    pub fn open<P: AsRef<Path>>(db_path: P) -> StateResult<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StateError::io(parent, e))?;
        }
        let conn = Connection::open(db_path)?;
        let log = Self { conn };
        log.initialize_schema()?;

        info!("Audit log opened at {:?}", db_path);
        Ok(log)
    }

    pub fn open_in_memory() -> StateResult<Self> {
        let log = Self {
            conn: Connection::open_in_memory()?,
        };
        log.initialize_schema()?;
        Ok(log)
    }

    fn initialize_schema(&self) -> SqliteResult<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS operations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                operation TEXT NOT NULL,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )
    }

    /// Record one operation and return it as stored
    pub fn append(&self, description: &str) -> StateResult<OperationRecord> {
        let mut stmt = self
            .conn
            .prepare("INSERT INTO operations (operation) VALUES (?1)")?;
        let id = stmt.insert([description])?;

        let record = self
            .conn
            .query_row(
                "SELECT id, operation, timestamp FROM operations WHERE id = ?1",
                [id],
                row_to_record,
            )?;

        debug!("Appended operation {}: {}", record.id, record.operation);
        Ok(record)
    }

    /// The most recently appended record, by id
    pub fn last(&self) -> StateResult<Option<OperationRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, operation, timestamp FROM operations ORDER BY id DESC LIMIT 1",
                [],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Records whose description satisfies `predicate`, newest first
    pub fn filter<F>(&self, predicate: F) -> StateResult<Vec<OperationRecord>>
    where
        F: Fn(&str) -> bool,
    {
        let mut stmt = self
            .conn
            .prepare("SELECT id, operation, timestamp FROM operations ORDER BY id DESC")?;
        let rows = stmt.query_map([], row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            let record = row?;
            if predicate(&record.operation) {
                records.push(record);
            }
        }
        Ok(records)
    }

    pub fn identifier_history(&self) -> StateResult<Vec<OperationRecord>> {
        self.filter(|op| op.starts_with(IDENTIFIER_OPERATION_PREFIX))
    }

    #[cfg(test)]
    fn count(&self) -> StateResult<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM operations", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Release the store handle, surfacing any error from closing it
    pub fn close(self) -> StateResult<()> {
        self.conn.close().map_err(|(_, e)| StateError::Store(e))
    }
}

fn row_to_record(row: &Row) -> SqliteResult<OperationRecord> {
    let raw: String = row.get(2)?;
    let timestamp = parse_timestamp(&raw).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(2, "timestamp".to_string(), rusqlite::types::Type::Text)
    })?;

    Ok(OperationRecord {
        id: row.get(0)?,
        operation: row.get(1)?,
        timestamp,
    })
}

/// SQLite's `CURRENT_TIMESTAMP` is UTC text without a zone suffix
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, SQLITE_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_log_has_no_last_record() {
        let log = AuditLog::open_in_memory().unwrap();
        assert!(log.last().unwrap().is_none());
        assert!(log.identifier_history().unwrap().is_empty());
    }

    #[test]
    fn append_assigns_increasing_ids_and_timestamps() {
        let log = AuditLog::open_in_memory().unwrap();
        let before = Utc::now() - chrono::Duration::seconds(2);

        let first = log.append("Updates blocked").unwrap();
        let second = log.append("Updates enabled").unwrap();

        assert!(second.id > first.id);
        assert_eq!(first.operation, "Updates blocked");
        assert!(first.timestamp >= before);
        assert!(first.timestamp <= Utc::now() + chrono::Duration::seconds(2));
    }

    #[test]
    fn filter_returns_matches_newest_first_and_last_tracks_final_append() {
        let log = AuditLog::open_in_memory().unwrap();
        let mut expected = Vec::new();
        let mut final_record = None;

        for n in 0..10 {
            let record = if n % 3 == 0 {
                let r = log.append(&format!("ID regenerated: run {}", n)).unwrap();
                expected.push(r.clone());
                r
            } else {
                log.append("Updates blocked").unwrap()
            };
            final_record = Some(record);
        }

        expected.reverse();
        assert_eq!(log.identifier_history().unwrap(), expected);
        assert_eq!(log.last().unwrap(), final_record);
        assert_eq!(log.count().unwrap(), 10);
    }

    #[test]
    fn records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("operations.db");

        let log = AuditLog::open(&path).unwrap();
        let appended = log.append("Updates enabled").unwrap();
        log.close().unwrap();

        let reopened = AuditLog::open(&path).unwrap();
        assert_eq!(reopened.last().unwrap(), Some(appended));
    }

    #[test]
    fn ids_are_not_reused_after_external_delete() {
        let log = AuditLog::open_in_memory().unwrap();
        let first = log.append("Updates blocked").unwrap();
        log.conn
            .execute("DELETE FROM operations WHERE id = ?1", [first.id])
            .unwrap();

        let second = log.append("Updates enabled").unwrap();
        assert!(second.id > first.id);
    }

    #[test]
    fn parses_sqlite_current_timestamp_text() {
        let ts = parse_timestamp("2024-03-01 12:30:05").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T12:30:05+00:00");
        assert!(parse_timestamp("yesterday").is_none());
    }
}
