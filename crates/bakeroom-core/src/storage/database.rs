//! SQLite-based countdown storage.
//!
//! Provides persistent storage for:
//! - The current countdown snapshot (key-value store)
//! - Completed countdowns and their statistics
//!
//! Several processes may host the same countdown (one-shot CLI commands next
//! to a long-running `watch`). Every snapshot write bumps a revision, and
//! [`Database::commit_snapshot`] only writes when the caller has seen the
//! latest one, so a host never overwrites a change it did not observe.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::data_dir;
use crate::countdown::CountdownSnapshot;
use crate::error::DatabaseError;

const SNAPSHOT_KEY: &str = "countdown";
const REVISION_KEY: &str = "countdown.revision";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub id: i64,
    pub duration_secs: u64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Stats {
    pub total_completed: u64,
    pub total_secs: u64,
    pub today_completed: u64,
    pub today_secs: u64,
}

/// SQLite database for countdown state and history.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `<data dir>/bakeroom.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, DatabaseError> {
        let dir = data_dir().map_err(DatabaseError::DataDir)?;
        Self::open_at(&dir.join("bakeroom.db"))
    }

    /// Open (or create) the database at `path`.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS completions (
                    id            INTEGER PRIMARY KEY AUTOINCREMENT,
                    duration_secs INTEGER NOT NULL,
                    completed_at  TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS kv (
                    key   TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_completions_completed_at ON completions(completed_at);",
            )
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))
    }

    // ── Key-value store ──────────────────────────────────────────────

    pub fn kv_get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn kv_delete(&self, key: &str) -> Result<bool, DatabaseError> {
        let removed = self
            .conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }

    // ── Countdown snapshot ───────────────────────────────────────────

    /// Current revision of the stored snapshot; `0` before the first write.
    pub fn snapshot_revision(&self) -> Result<u64, DatabaseError> {
        let Some(value) = self.kv_get(REVISION_KEY)? else {
            return Ok(0);
        };
        value.parse().map_err(|e: std::num::ParseIntError| DatabaseError::CorruptValue {
            key: REVISION_KEY.into(),
            message: e.to_string(),
        })
    }

    /// Store `snapshot` unconditionally. Returns the new revision.
    pub fn save_snapshot(&self, snapshot: &CountdownSnapshot) -> Result<u64, DatabaseError> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let revision = self.write_snapshot(snapshot)?;
        tx.commit()?;
        Ok(revision)
    }

    /// Store `snapshot` if the stored revision is still `expected_revision`,
    /// recording a completion at `completed_at` in the same transaction.
    /// Returns the new revision.
    ///
    /// # Errors
    /// [`DatabaseError::Conflict`] when another writer got there first; in
    /// that case nothing is written and no completion is recorded.
    pub fn commit_snapshot(
        &self,
        expected_revision: u64,
        snapshot: &CountdownSnapshot,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<u64, DatabaseError> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let found = self.snapshot_revision()?;
        if found != expected_revision {
            debug!(expected_revision, found, "snapshot changed underneath, not writing");
            return Err(DatabaseError::Conflict {
                expected: expected_revision,
                found,
            });
        }
        let revision = self.write_snapshot(snapshot)?;
        if let Some(at) = completed_at {
            self.record_completion(snapshot.initial_seconds, at)?;
        }
        tx.commit()?;
        Ok(revision)
    }

    /// The saved snapshot, if any.
    ///
    /// # Errors
    /// A stored value that no longer decodes is reported as
    /// [`DatabaseError::CorruptValue`]; callers may fall back to a fresh
    /// countdown.
    pub fn load_snapshot(&self) -> Result<Option<CountdownSnapshot>, DatabaseError> {
        let Some(json) = self.kv_get(SNAPSHOT_KEY)? else {
            return Ok(None);
        };
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| DatabaseError::CorruptValue {
                key: SNAPSHOT_KEY.into(),
                message: e.to_string(),
            })
    }

    /// Remove the saved snapshot. Counts as a write for other hosts.
    pub fn clear_snapshot(&self) -> Result<bool, DatabaseError> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let removed = self.kv_delete(SNAPSHOT_KEY)?;
        let revision = self.snapshot_revision()? + 1;
        self.kv_set(REVISION_KEY, &revision.to_string())?;
        tx.commit()?;
        Ok(removed)
    }

    fn write_snapshot(&self, snapshot: &CountdownSnapshot) -> Result<u64, DatabaseError> {
        let json = serde_json::to_string(snapshot).map_err(|e| DatabaseError::CorruptValue {
            key: SNAPSHOT_KEY.into(),
            message: e.to_string(),
        })?;
        let revision = self.snapshot_revision()? + 1;
        self.kv_set(SNAPSHOT_KEY, &json)?;
        self.kv_set(REVISION_KEY, &revision.to_string())?;
        Ok(revision)
    }

    // ── Completions ──────────────────────────────────────────────────

    /// Record a countdown that reached zero.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn record_completion(
        &self,
        duration_secs: u64,
        completed_at: DateTime<Utc>,
    ) -> Result<i64, DatabaseError> {
        self.conn.execute(
            "INSERT INTO completions (duration_secs, completed_at) VALUES (?1, ?2)",
            params![duration_secs as i64, completed_at.to_rfc3339()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent completions first.
    pub fn recent_completions(&self, limit: usize) -> Result<Vec<CompletionRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, duration_secs, completed_at FROM completions
             ORDER BY completed_at DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let duration: i64 = row.get(1)?;
            let completed_at: String = row.get(2)?;
            Ok((id, duration, completed_at))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, duration, completed_at) = row?;
            let completed_at = DateTime::parse_from_rfc3339(&completed_at)
                .map_err(|e| DatabaseError::CorruptValue {
                    key: format!("completions.{id}"),
                    message: e.to_string(),
                })?
                .with_timezone(&Utc);
            records.push(CompletionRecord {
                id,
                duration_secs: duration.max(0) as u64,
                completed_at,
            });
        }
        Ok(records)
    }

    /// Totals overall and for the UTC day of `now`.
    pub fn stats(&self, now: DateTime<Utc>) -> Result<Stats, DatabaseError> {
        let (total_completed, total_secs): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(duration_secs), 0) FROM completions",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let day_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or(now);
        let (today_completed, today_secs): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(duration_secs), 0) FROM completions
             WHERE completed_at >= ?1",
            params![day_start.to_rfc3339()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(Stats {
            total_completed: total_completed as u64,
            total_secs: total_secs as u64,
            today_completed: today_completed as u64,
            today_secs: today_secs as u64,
        })
    }
}
