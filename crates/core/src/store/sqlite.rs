//! SQLite-backed case store.
//!
//! Folder allocation runs inside an IMMEDIATE transaction, which takes the
//! database write lock before reading the current maximum sequence. Writers
//! on the same connection are also serialized by the connection mutex, so
//! "read max, insert max + 1" is linearizable both within a process and
//! across processes sharing the database file.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior};
use tracing::{debug, info, warn};

use super::{
    CaseRecord, CaseStore, CaseUpdate, Classification, FolderId, StoreError, UpsertOutcome,
};
use crate::metrics;
use crate::source::Payload;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MAX_RETRIES: u32 = 3;

/// SQLite-backed case store.
pub struct SqliteCaseStore {
    conn: Mutex<Connection>,
    max_retries: u32,
}

fn map_db_error(e: rusqlite::Error) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _) => {
            if err.code == ErrorCode::ConstraintViolation
                && (err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
            {
                return StoreError::Conflict(e.to_string());
            }
            match err.code {
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::DiskFull
                | ErrorCode::SystemIoFailure
                | ErrorCode::ReadOnly => StoreError::Unavailable(e.to_string()),
                _ => StoreError::Database(e.to_string()),
            }
        }
        _ => StoreError::Database(e.to_string()),
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl SqliteCaseStore {
    /// Open (or create) the database file.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        Self::with_options(path, DEFAULT_BUSY_TIMEOUT, DEFAULT_MAX_RETRIES)
    }

    /// Open with an explicit lock wait and allocation retry budget.
    pub fn with_options(
        path: &Path,
        busy_timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(map_db_error)?;
        Self::from_connection(conn, busy_timeout, max_retries)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(map_db_error)?;
        Self::from_connection(conn, DEFAULT_BUSY_TIMEOUT, DEFAULT_MAX_RETRIES)
    }

    fn from_connection(
        conn: Connection,
        busy_timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, StoreError> {
        conn.busy_timeout(busy_timeout).map_err(map_db_error)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            max_retries,
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- One row per case, keyed by its natural id
            CREATE TABLE IF NOT EXISTS cases (
                target_id TEXT PRIMARY KEY,
                folder_id TEXT NOT NULL UNIQUE,
                client_code TEXT NOT NULL,
                module_code TEXT NOT NULL,
                client_name TEXT NOT NULL,
                aggregate_value REAL,
                category TEXT NOT NULL,
                side TEXT NOT NULL,
                risk TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_cases_prefix ON cases(client_code, module_code);

            -- Latest payload per (case, source)
            CREATE TABLE IF NOT EXISTS case_sources (
                target_id TEXT NOT NULL REFERENCES cases(target_id) ON DELETE CASCADE,
                source TEXT NOT NULL,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (target_id, source)
            );
            "#,
        )
        .map_err(map_db_error)?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection mutex poisoned".to_string()))
    }

    /// Largest sequence among folder ids starting with `prefix`.
    fn max_sequence(tx: &Transaction<'_>, prefix: &str) -> Result<Option<u32>, StoreError> {
        let mut stmt = tx
            .prepare("SELECT folder_id FROM cases WHERE substr(folder_id, 1, ?1) = ?2")
            .map_err(map_db_error)?;

        let rows = stmt
            .query_map(params![prefix.len() as i64, prefix], |row| {
                row.get::<_, String>(0)
            })
            .map_err(map_db_error)?;

        let mut max = None;
        for row in rows {
            let folder_id = row.map_err(map_db_error)?;
            match folder_id[prefix.len()..].parse::<u32>() {
                Ok(seq) => max = max.max(Some(seq)),
                Err(_) => warn!(folder_id = %folder_id, "Ignoring malformed folder id"),
            }
        }
        Ok(max)
    }

    fn upsert_once(conn: &mut Connection, update: &CaseUpdate) -> Result<UpsertOutcome, StoreError> {
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_db_error)?;
        let now = Utc::now().to_rfc3339();

        let existing: Option<String> = tx
            .query_row(
                "SELECT folder_id FROM cases WHERE target_id = ?",
                params![&update.target_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_db_error)?;

        let outcome = match existing {
            Some(folder_id) => {
                tx.execute(
                    "UPDATE cases SET
                        client_name = ?,
                        aggregate_value = COALESCE(?, aggregate_value),
                        category = COALESCE(?, category),
                        side = COALESCE(?, side),
                        risk = COALESCE(?, risk),
                        updated_at = ?
                     WHERE target_id = ?",
                    params![
                        &update.client_name,
                        update.aggregate_value,
                        &update.classification.category,
                        &update.classification.side,
                        &update.classification.risk,
                        &now,
                        &update.target_id,
                    ],
                )
                .map_err(map_db_error)?;
                UpsertOutcome {
                    folder_id,
                    created: false,
                }
            }
            None => {
                let prefix = format!("{}.{}.", update.client_code, update.module_code);
                let max = Self::max_sequence(&tx, &prefix)?;
                let folder_id =
                    FolderId::next_after(&update.client_code, &update.module_code, max)?;
                let classification = update
                    .classification
                    .resolve(&update.initial_classification);

                tx.execute(
                    "INSERT INTO cases (target_id, folder_id, client_code, module_code, client_name,
                        aggregate_value, category, side, risk, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        &update.target_id,
                        folder_id.to_string(),
                        &update.client_code,
                        &update.module_code,
                        &update.client_name,
                        update.aggregate_value,
                        &classification.category,
                        &classification.side,
                        &classification.risk,
                        &now,
                        &now,
                    ],
                )
                .map_err(map_db_error)?;
                UpsertOutcome {
                    folder_id: folder_id.to_string(),
                    created: true,
                }
            }
        };

        for (source, payload) in &update.payloads {
            let payload_json =
                serde_json::to_string(payload).map_err(|e| StoreError::Database(e.to_string()))?;
            tx.execute(
                "INSERT INTO case_sources (target_id, source, payload, updated_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(target_id, source) DO UPDATE SET
                    payload = excluded.payload,
                    updated_at = excluded.updated_at",
                params![&update.target_id, source, payload_json, &now],
            )
            .map_err(map_db_error)?;
        }

        tx.commit().map_err(map_db_error)?;
        Ok(outcome)
    }

    fn load_payloads(
        conn: &Connection,
        target_id: &str,
    ) -> Result<BTreeMap<String, Payload>, StoreError> {
        let mut stmt = conn
            .prepare("SELECT source, payload FROM case_sources WHERE target_id = ?")
            .map_err(map_db_error)?;

        let rows = stmt
            .query_map(params![target_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(map_db_error)?;

        let mut payloads = BTreeMap::new();
        for row in rows {
            let (source, json) = row.map_err(map_db_error)?;
            let payload: Payload = serde_json::from_str(&json).map_err(|e| {
                warn!(target_id = %target_id, source = %source, error = %e, "Stored payload is not valid JSON");
                StoreError::Database(format!(
                    "corrupt payload for {}/{}: {}",
                    target_id, source, e
                ))
            })?;
            payloads.insert(source, payload);
        }
        Ok(payloads)
    }

    /// Convert a row to CaseRecord (without payloads).
    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<CaseRecord> {
        let created_at: String = row.get(9)?;
        let updated_at: String = row.get(10)?;

        Ok(CaseRecord {
            target_id: row.get(0)?,
            folder_id: row.get(1)?,
            client_code: row.get(2)?,
            module_code: row.get(3)?,
            client_name: row.get(4)?,
            aggregate_value: row.get(5)?,
            classification: Classification {
                category: row.get(6)?,
                side: row.get(7)?,
                risk: row.get(8)?,
            },
            per_source_payload: BTreeMap::new(), // Loaded separately
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        })
    }
}

const RECORD_COLUMNS: &str = "target_id, folder_id, client_code, module_code, client_name,
    aggregate_value, category, side, risk, created_at, updated_at";

impl CaseStore for SqliteCaseStore {
    fn upsert(&self, update: &CaseUpdate) -> Result<UpsertOutcome, StoreError> {
        let mut conn = self.lock()?;
        let mut attempt = 0;

        loop {
            match Self::upsert_once(&mut conn, update) {
                Ok(outcome) => {
                    if outcome.created {
                        metrics::FOLDERS_ALLOCATED.inc();
                        info!(
                            target_id = %update.target_id,
                            folder_id = %outcome.folder_id,
                            "Allocated folder for new case"
                        );
                    } else {
                        debug!(target_id = %update.target_id, "Updated existing case");
                    }
                    return Ok(outcome);
                }
                Err(StoreError::Conflict(msg)) if attempt < self.max_retries => {
                    attempt += 1;
                    metrics::ALLOCATION_CONFLICTS.inc();
                    warn!(
                        target_id = %update.target_id,
                        attempt,
                        error = %msg,
                        "Folder allocation conflict, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn get(&self, target_id: &str) -> Result<Option<CaseRecord>, StoreError> {
        let conn = self.lock()?;

        let record = conn
            .query_row(
                &format!("SELECT {} FROM cases WHERE target_id = ?", RECORD_COLUMNS),
                params![target_id],
                Self::row_to_record,
            )
            .optional()
            .map_err(map_db_error)?;

        match record {
            Some(mut record) => {
                record.per_source_payload = Self::load_payloads(&conn, target_id)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn list_by_prefix(
        &self,
        client_code: &str,
        module_code: &str,
    ) -> Result<Vec<CaseRecord>, StoreError> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM cases WHERE client_code = ? AND module_code = ? ORDER BY folder_id",
                RECORD_COLUMNS
            ))
            .map_err(map_db_error)?;

        let rows = stmt
            .query_map(params![client_code, module_code], Self::row_to_record)
            .map_err(map_db_error)?;

        let mut records = Vec::new();
        for row in rows {
            let mut record = row.map_err(map_db_error)?;
            record.per_source_payload = Self::load_payloads(&conn, &record.target_id)?;
            records.push(record);
        }
        Ok(records)
    }
}
