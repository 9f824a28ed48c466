//! SQLite-backed record store.
//!
//! Every record is one row, its JSON stored in a BLOB column:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS records (
//!     kind       TEXT    NOT NULL,
//!     id         TEXT    NOT NULL,
//!     version    INTEGER NOT NULL,
//!     data       BLOB    NOT NULL,
//!     updated_at TEXT    NOT NULL,
//!     checksum   TEXT,
//!     PRIMARY KEY (kind, id)
//! );
//! ```
//!
//! - The conditional write is a single `UPDATE ... WHERE version = ?`, so it
//!   stays atomic even with several processes on one file.
//! - WAL mode lets readers proceed while a write is in flight.
//! - Optional CRC-32 of the JSON bytes detects on-disk corruption.
//! - Backups go through SQLite's online-backup API.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{CreateOutcome, PutOutcome, RecordStore, StoreError, StoreResult, Versioned};
use crate::config::PersistenceConfig;
use crate::error::Result;
use crate::types::{RecordKind, RecordRef, Version};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS records (
    kind       TEXT    NOT NULL,
    id         TEXT    NOT NULL,
    version    INTEGER NOT NULL,
    data       BLOB    NOT NULL,
    updated_at TEXT    NOT NULL,
    checksum   TEXT,
    PRIMARY KEY (kind, id)
);";

/// CRC-32 (ISO 3309) of `data` as lowercase hex.
fn crc32_hex(data: &[u8]) -> String {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ POLY } else { crc >> 1 };
        }
    }
    format!("{:08x}", !crc)
}

fn version_to_sql(v: Version) -> StoreResult<i64> {
    i64::try_from(v.0).map_err(|_| StoreError::Query(format!("version {v} out of range")))
}

fn version_from_sql(raw: i64) -> StoreResult<Version> {
    u64::try_from(raw)
        .map(Version)
        .map_err(|_| StoreError::Query(format!("negative version {raw} in store")))
}

/// Durable [`RecordStore`] over one SQLite file.
///
/// The connection sits behind a mutex; async callers reach it through
/// `spawn_blocking` so the runtime never blocks on disk I/O.
///
/// ```no_run
/// # use psyche_core::store::SqliteStore;
/// # use psyche_core::config::PersistenceConfig;
/// let store = SqliteStore::open("psyche.db", &PersistenceConfig::default())?;
/// assert!(store.integrity_check()?);
/// # Ok::<(), psyche_core::PsycheError>(())
/// ```
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure the schema.
    ///
    /// # Errors
    /// [`crate::PsycheError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "Record store opened"
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config: config.clone(),
            db_path,
        })
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// [`crate::PsycheError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &PersistenceConfig) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || f(&conn.lock(), &config))
            .await
            .map_err(|e| StoreError::Unavailable(format!("store task failed: {e}")))?
    }

    // ------------------------------------------------------------------
    // Admin helpers
    // ------------------------------------------------------------------

    /// Delete a record. Returns `true` if a row was removed.
    ///
    /// # Errors
    /// [`crate::PsycheError::Database`] on SQLite failures.
    pub fn delete(&self, record: &RecordRef) -> Result<bool> {
        let deleted = self.conn.lock().execute(
            "DELETE FROM records WHERE kind = ?1 AND id = ?2",
            params![record.kind.as_str(), record.id],
        )?;
        Ok(deleted > 0)
    }

    /// Number of stored records.
    ///
    /// # Errors
    /// [`crate::PsycheError::Database`] on SQLite failures.
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Records whose stored checksum does not match their data.
    ///
    /// # Errors
    /// [`crate::PsycheError::Database`] on SQLite failures.
    pub fn checksum_mismatches(&self) -> Result<Vec<RecordRef>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT kind, id, data, checksum FROM records
             WHERE checksum IS NOT NULL ORDER BY kind, id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut bad = Vec::new();
        for row in rows {
            let (kind, id, data, checksum) = row?;
            if crc32_hex(&data) == checksum {
                continue;
            }
            match kind.parse::<RecordKind>() {
                Ok(kind) => bad.push(RecordRef::new(kind, id)),
                Err(_) => warn!(kind = %kind, id = %id, "Skipping row with unknown kind"),
            }
        }
        Ok(bad)
    }

    /// Copy the database to `dest` with the online-backup API.
    ///
    /// # Errors
    /// [`crate::PsycheError::Database`] on SQLite failures.
    pub fn backup<P: AsRef<Path>>(&self, dest: P) -> Result<()> {
        let start = Instant::now();
        let conn = self.conn.lock();
        let mut target = Connection::open(dest.as_ref())?;
        let backup = rusqlite::backup::Backup::new(&conn, &mut target)?;
        backup.run_to_completion(256, std::time::Duration::from_millis(50), None)?;

        info!(
            dest = %dest.as_ref().display(),
            elapsed_ms = start.elapsed().as_millis(),
            "Record store backup completed"
        );
        Ok(())
    }

    /// Write `<db>.bak.1`, shifting older backups up and keeping at most
    /// `backup_count` of them. Returns the new backup's path, or `None` for
    /// in-memory databases or when backups are disabled.
    ///
    /// # Errors
    /// [`crate::PsycheError::Database`] or [`crate::PsycheError::Io`] on failure.
    pub fn create_rotating_backup(&self) -> Result<Option<PathBuf>> {
        let max = self.config.backup_count;
        if max == 0 || self.db_path.as_os_str() == ":memory:" {
            return Ok(None);
        }

        for i in (1..max).rev() {
            let src = self.backup_path(i);
            if src.exists() {
                std::fs::rename(&src, self.backup_path(i + 1))?;
            }
        }
        let overflow = self.backup_path(max + 1);
        if overflow.exists() {
            std::fs::remove_file(&overflow)?;
        }

        let dest = self.backup_path(1);
        self.backup(&dest)?;
        info!(max_backups = max, "Rotating backup created");
        Ok(Some(dest))
    }

    fn backup_path(&self, n: u32) -> PathBuf {
        let mut name = self.db_path.clone().into_os_string();
        name.push(format!(".bak.{n}"));
        PathBuf::from(name)
    }

    /// Path of the database file (`:memory:` for in-memory stores).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// `PRAGMA integrity_check`. `Ok(false)` means corruption was found.
    ///
    /// # Errors
    /// [`crate::PsycheError::Database`] if the check itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .lock()
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }

    /// Reclaim unused space.
    ///
    /// # Errors
    /// [`crate::PsycheError::Database`] on SQLite failures.
    pub fn vacuum(&self) -> Result<()> {
        self.conn.lock().execute_batch("VACUUM;")?;
        Ok(())
    }
}

fn encode(content: &Value, config: &PersistenceConfig) -> StoreResult<(Vec<u8>, Option<String>)> {
    let json = serde_json::to_vec(content).map_err(|e| StoreError::Query(e.to_string()))?;
    let checksum = config.checksum_enabled.then(|| crc32_hex(&json));
    Ok((json, checksum))
}

fn current_version(conn: &Connection, record: &RecordRef) -> StoreResult<Option<Version>> {
    conn.prepare_cached("SELECT version FROM records WHERE kind = ?1 AND id = ?2")?
        .query_row(params![record.kind.as_str(), record.id], |row| row.get::<_, i64>(0))
        .optional()?
        .map(version_from_sql)
        .transpose()
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn get(&self, record: &RecordRef) -> StoreResult<Option<Versioned>> {
        let record = record.clone();
        self.blocking(move |conn, config| {
            let start = Instant::now();
            let row: Option<(i64, Vec<u8>, Option<String>)> = conn
                .prepare_cached(
                    "SELECT version, data, checksum FROM records WHERE kind = ?1 AND id = ?2",
                )?
                .query_row(params![record.kind.as_str(), record.id], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })
                .optional()?;

            let Some((version, data, stored_checksum)) = row else {
                return Ok(None);
            };

            if config.checksum_enabled {
                if let Some(expected) = stored_checksum {
                    let actual = crc32_hex(&data);
                    if expected != actual {
                        warn!(
                            record = %record,
                            expected = %expected,
                            actual = %actual,
                            "Checksum mismatch, stored record may be corrupt"
                        );
                    }
                }
            }

            let content: Value = serde_json::from_slice(&data).map_err(|e| StoreError::Corrupt {
                record: record.clone(),
                reason: e.to_string(),
            })?;
            let version = version_from_sql(version)?;

            debug!(
                record = %record,
                version = %version,
                bytes = data.len(),
                elapsed_us = start.elapsed().as_micros(),
                "Loaded record"
            );
            Ok(Some(Versioned { content, version }))
        })
        .await
    }

    async fn put_if_version(
        &self,
        record: &RecordRef,
        expected: Version,
        content: Value,
    ) -> StoreResult<PutOutcome> {
        let record = record.clone();
        self.blocking(move |conn, config| {
            let (json, checksum) = encode(&content, config)?;
            let next = expected.next();
            let changed = conn.execute(
                "UPDATE records
                 SET version = ?1, data = ?2, updated_at = ?3, checksum = ?4
                 WHERE kind = ?5 AND id = ?6 AND version = ?7",
                params![
                    version_to_sql(next)?,
                    json,
                    Utc::now().to_rfc3339(),
                    checksum,
                    record.kind.as_str(),
                    record.id,
                    version_to_sql(expected)?,
                ],
            )?;
            if changed == 1 {
                debug!(record = %record, version = %next, bytes = json.len(), "Stored record");
                return Ok(PutOutcome::Stored(next));
            }
            Ok(PutOutcome::VersionMismatch {
                current: current_version(conn, &record)?,
            })
        })
        .await
    }

    async fn create(&self, record: &RecordRef, content: Value) -> StoreResult<CreateOutcome> {
        let record = record.clone();
        self.blocking(move |conn, config| {
            let (json, checksum) = encode(&content, config)?;
            let inserted = conn.execute(
                "INSERT INTO records (kind, id, version, data, updated_at, checksum)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(kind, id) DO NOTHING",
                params![
                    record.kind.as_str(),
                    record.id,
                    version_to_sql(Version::INITIAL)?,
                    json,
                    Utc::now().to_rfc3339(),
                    checksum,
                ],
            )?;
            if inserted == 0 {
                return Ok(CreateOutcome::AlreadyExists);
            }
            debug!(record = %record, bytes = json.len(), "Created record");
            Ok(CreateOutcome::Created(Version::INITIAL))
        })
        .await
    }

    async fn list(&self, kind: Option<RecordKind>) -> StoreResult<Vec<RecordRef>> {
        self.blocking(move |conn, _| {
            let mut stmt = conn.prepare_cached(
                "SELECT kind, id FROM records
                 WHERE ?1 IS NULL OR kind = ?1
                 ORDER BY kind, id",
            )?;
            let rows = stmt.query_map(params![kind.map(RecordKind::as_str)], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            let mut refs = Vec::new();
            for row in rows {
                let (kind, id) = row?;
                match kind.parse::<RecordKind>() {
                    Ok(kind) => refs.push(RecordRef::new(kind, id)),
                    Err(_) => warn!(kind = %kind, id = %id, "Skipping row with unknown kind"),
                }
            }
            Ok(refs)
        })
        .await
    }
}
