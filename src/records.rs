use chrono::{DateTime, Local};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::TestConfig;
use crate::normative::{self, NormativeResult, Sex};
use crate::stats::FinalResult;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("record encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("no record with id {0}")]
    NotFound(i64),
}

/// A finished test as kept by the front end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<i64>,
    pub taken_at: DateTime<Local>,
    pub age: Option<i32>,
    pub sex: Sex,
    pub config: TestConfig,
    pub result: FinalResult,
    pub normative: Option<NormativeResult>,
}

impl TestRecord {
    pub fn new(config: TestConfig, result: FinalResult, age: Option<i32>, sex: Sex) -> Self {
        let normative =
            age.and_then(|a| normative::estimate(result.grand_average_ms as f64, a, sex));
        Self {
            id: None,
            taken_at: Local::now(),
            age,
            sex,
            config,
            result,
            normative,
        }
    }
}

/// Storage the front end hands finished tests to
pub trait RecordStore {
    /// Persist a record and return its new id.
    fn save(&mut self, record: &TestRecord) -> Result<i64, StoreError>;
    /// All records, newest first.
    fn get_all(&self) -> Result<Vec<TestRecord>, StoreError>;
    fn delete(&mut self, id: i64) -> Result<(), StoreError>;
}

#[derive(Debug)]
pub struct SqliteRecordStore {
    conn: Connection,
}

impl SqliteRecordStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "opened record store");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS test_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                taken_at TEXT NOT NULL,
                age INTEGER,
                sex TEXT NOT NULL,
                grand_average_ms INTEGER NOT NULL,
                payload TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_test_records_taken_at ON test_records(taken_at)",
            [],
        )?;

        Ok(Self { conn })
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM test_records", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

impl RecordStore for SqliteRecordStore {
    fn save(&mut self, record: &TestRecord) -> Result<i64, StoreError> {
        let stored = TestRecord {
            id: None,
            ..record.clone()
        };
        let payload = serde_json::to_string(&stored)?;
        self.conn.execute(
            r#"
            INSERT INTO test_records (taken_at, age, sex, grand_average_ms, payload)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                record.taken_at.to_rfc3339(),
                record.age,
                record.sex.to_string(),
                record.result.grand_average_ms as i64,
                payload,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(id, grand_average_ms = record.result.grand_average_ms, "record saved");
        Ok(id)
    }

    fn get_all(&self) -> Result<Vec<TestRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, payload FROM test_records ORDER BY taken_at DESC, id DESC")?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, payload) = row?;
            let mut record: TestRecord = serde_json::from_str(&payload)?;
            record.id = Some(id);
            records.push(record);
        }
        Ok(records)
    }

    fn delete(&mut self, id: i64) -> Result<(), StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM test_records WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(StoreError::NotFound(id));
        }
        info!(id, "record deleted");
        Ok(())
    }
}
