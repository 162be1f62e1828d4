//! Snapshot metadata store backed by SQLite
//!
//! Holds three tables:
//!
//! - `snapshots`: one row per snapshot, `id` is `AUTOINCREMENT` so ids are
//!   never reused after deletion
//! - `snapshot_files`: many-to-many mapping from snapshot id to file entries,
//!   removed together with the snapshot
//! - `contents`: one row per distinct blob hash with its original and encoded
//!   sizes
//!
//! [`MetadataStore::record_snapshot`] writes a complete snapshot (row, file
//! mappings, content rows) inside a single `BEGIN IMMEDIATE` transaction.
//! Parent resolution happens inside the same transaction, so two writers on
//! the same database cannot both claim the same parent.

use crate::error::Result;
use crate::types::{FileEntry, SnapshotMetadata};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// File name of the metadata database inside the storage directory
pub const DATABASE_FILE: &str = "snapvault.db";

const SNAPSHOT_COLUMNS: &str = "id, hash, message, tag, created_at, parent_id, is_autosave, \
     trigger_type, files_count, total_size, compressed_size";

/// Fields supplied by the caller when inserting a snapshot row
#[derive(Debug, Clone)]
pub struct NewSnapshot {
    /// Digest over the sorted `(path, hash)` pairs
    pub content_hash: String,
    /// Free-form message
    pub message: Option<String>,
    /// Optional tag
    pub tag: Option<String>,
    /// Created by an automatic trigger
    pub is_autosave: bool,
    /// Trigger label
    pub trigger_type: String,
    /// Parent id; ignored by `record_snapshot`, which resolves it itself
    pub parent_id: Option<i64>,
    /// Number of files
    pub files_count: usize,
    /// Sum of original sizes
    pub total_size: u64,
    /// Encoded bytes newly written
    pub compressed_size: u64,
}

/// Size record for one distinct blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRecord {
    /// Blob hash
    pub hash: String,
    /// Size before encoding
    pub original_size: u64,
    /// Size on disk
    pub compressed_size: u64,
}

/// SQLite-backed store for snapshot records and file mappings
///
/// The connection is guarded by a mutex; every method takes `&self`.
pub struct MetadataStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore").finish_non_exhaustive()
    }
}

impl MetadataStore {
    /// Open (or create) the database in `storage_dir`
    pub fn open(storage_dir: &Path) -> Result<Self> {
        let conn = Connection::open(storage_dir.join(DATABASE_FILE))?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert a snapshot row and return its new id
    ///
    /// `created_at` is set to the current time. `parent_id` is stored as
    /// given.
    pub fn create_snapshot(&self, new: &NewSnapshot) -> Result<i64> {
        let conn = self.conn.lock();
        let id = insert_snapshot(&conn, new, new.parent_id, Utc::now())?;
        debug!("Inserted snapshot row {}", id);
        Ok(id)
    }

    /// Insert one file mapping row
    pub fn add_file_to_snapshot(&self, snapshot_id: i64, entry: &FileEntry) -> Result<()> {
        let conn = self.conn.lock();
        insert_file(&conn, snapshot_id, entry)
    }

    /// Record a complete snapshot as a single unit of work
    ///
    /// Resolves the parent as the latest existing snapshot, inserts the
    /// snapshot row, every file mapping and every content row, then commits.
    /// Nothing is visible to readers unless all of it succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Database`](crate::VaultError::Database) if any
    /// statement fails; the transaction is rolled back.
    pub fn record_snapshot(
        &self,
        new: &NewSnapshot,
        files: &[FileEntry],
        contents: &[ContentRecord],
    ) -> Result<SnapshotMetadata> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let parent_id: Option<i64> = tx.query_row("SELECT MAX(id) FROM snapshots", [], |row| {
            row.get(0)
        })?;
        let created_at = Utc::now();
        let id = insert_snapshot(&tx, new, parent_id, created_at)?;

        for entry in files {
            insert_file(&tx, id, entry)?;
        }
        for content in contents {
            tx.execute(
                "INSERT OR IGNORE INTO contents (hash, original_size, compressed_size, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    content.hash,
                    content.original_size as i64,
                    content.compressed_size as i64,
                    created_at
                ],
            )?;
        }

        let metadata = fetch_snapshot(&tx, id)?
            .ok_or_else(|| crate::VaultError::internal(format!("snapshot {} vanished", id)))?;
        tx.commit()?;

        info!(
            "Recorded snapshot {} ({} files, parent {:?})",
            id, metadata.files_count, parent_id
        );
        Ok(metadata)
    }

    /// Fetch a snapshot by id
    pub fn get_snapshot(&self, id: i64) -> Result<Option<SnapshotMetadata>> {
        let conn = self.conn.lock();
        fetch_snapshot(&conn, id)
    }

    /// Most recent snapshot carrying `tag`
    pub fn get_snapshot_by_tag(&self, tag: &str) -> Result<Option<SnapshotMetadata>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM snapshots WHERE tag = ?1 ORDER BY id DESC LIMIT 1",
            SNAPSHOT_COLUMNS
        );
        Ok(conn.query_row(&sql, params![tag], row_to_metadata).optional()?)
    }

    /// Snapshot with the highest id
    pub fn get_latest_snapshot(&self) -> Result<Option<SnapshotMetadata>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM snapshots ORDER BY id DESC LIMIT 1",
            SNAPSHOT_COLUMNS
        );
        Ok(conn.query_row(&sql, [], row_to_metadata).optional()?)
    }

    /// List snapshots, most recent first
    pub fn list_snapshots(
        &self,
        limit: Option<usize>,
        include_autosave: bool,
    ) -> Result<Vec<SnapshotMetadata>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM snapshots
             WHERE (?1 OR is_autosave = 0)
             ORDER BY id DESC
             LIMIT ?2",
            SNAPSHOT_COLUMNS
        );
        // SQLite treats a negative LIMIT as unbounded
        let limit = limit.map_or(-1, |l| l as i64);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![include_autosave, limit], row_to_metadata)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// File rows of a snapshot ordered by path
    pub fn get_snapshot_files(&self, snapshot_id: i64) -> Result<Vec<FileEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT file_path, file_hash, size, mode
             FROM snapshot_files
             WHERE snapshot_id = ?1
             ORDER BY file_path",
        )?;
        let rows = stmt.query_map(params![snapshot_id], row_to_file)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Every version of `path` as `(snapshot_id, entry)`, ascending by id
    pub fn get_file_versions(&self, path: &str) -> Result<Vec<(i64, FileEntry)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT snapshot_id, file_path, file_hash, size, mode
             FROM snapshot_files
             WHERE file_path = ?1
             ORDER BY snapshot_id",
        )?;
        let rows = stmt.query_map(params![path], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                FileEntry {
                    path: row.get(1)?,
                    hash: row.get(2)?,
                    size: row.get::<_, i64>(3)? as u64,
                    mode: row.get::<_, i64>(4)? as u32,
                },
            ))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Remove a snapshot row and its file mappings
    ///
    /// Blob storage is not touched. Returns whether the snapshot existed.
    pub fn delete_snapshot(&self, id: i64) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let deleted = delete_snapshot_rows(&tx, id)?;
        tx.commit()?;
        if deleted {
            debug!("Deleted snapshot row {}", id);
        }
        Ok(deleted)
    }

    /// Delete all but the `max_keep` most recent autosaves
    ///
    /// Manual snapshots are never touched. Returns the ids deleted.
    pub fn cleanup_old_autosaves(&self, max_keep: usize) -> Result<Vec<i64>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let ids = {
            let mut stmt = tx.prepare(
                "SELECT id FROM snapshots
                 WHERE is_autosave = 1
                 ORDER BY id DESC
                 LIMIT -1 OFFSET ?1",
            )?;
            let rows = stmt.query_map(params![max_keep as i64], |row| row.get::<_, i64>(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        for id in &ids {
            delete_snapshot_rows(&tx, *id)?;
        }
        tx.commit()?;

        if !ids.is_empty() {
            info!("Removed {} old autosaves (keeping {})", ids.len(), max_keep);
        }
        Ok(ids)
    }

    /// Delete autosaves older than `days` days
    pub fn cleanup_expired_autosaves(&self, days: u32) -> Result<Vec<i64>> {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        self.cleanup_autosaves_before(cutoff)
    }

    /// Delete autosaves created strictly before `cutoff`
    pub fn cleanup_autosaves_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<i64>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let candidates = {
            let mut stmt =
                tx.prepare("SELECT id, created_at FROM snapshots WHERE is_autosave = 1")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, DateTime<Utc>>(1)?))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut ids = Vec::new();
        for (id, created_at) in candidates {
            if created_at < cutoff {
                delete_snapshot_rows(&tx, id)?;
                ids.push(id);
            }
        }
        tx.commit()?;

        if !ids.is_empty() {
            info!("Removed {} expired autosaves (before {})", ids.len(), cutoff);
        }
        Ok(ids)
    }

    /// Every blob hash referenced by a surviving snapshot
    pub fn referenced_hashes(&self) -> Result<HashSet<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT DISTINCT file_hash FROM snapshot_files")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<rusqlite::Result<HashSet<_>>>()?)
    }

    /// Drop `contents` rows whose hash no snapshot references
    pub fn prune_unreferenced_contents(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM contents
             WHERE hash NOT IN (SELECT DISTINCT file_hash FROM snapshot_files)",
            [],
        )?;
        Ok(removed)
    }

    /// Number of snapshot rows
    pub fn snapshot_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Sum of `(original_size, compressed_size)` over recorded contents
    pub fn content_totals(&self) -> Result<(u64, u64)> {
        let conn = self.conn.lock();
        let (original, stored): (i64, i64) = conn.query_row(
            "SELECT COALESCE(SUM(original_size), 0), COALESCE(SUM(compressed_size), 0)
             FROM contents",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((original as u64, stored as u64))
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS snapshots (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          hash TEXT NOT NULL,
          message TEXT,
          tag TEXT,
          created_at TEXT NOT NULL,
          parent_id INTEGER,
          is_autosave INTEGER NOT NULL DEFAULT 0,
          trigger_type TEXT NOT NULL DEFAULT 'manual',
          files_count INTEGER NOT NULL DEFAULT 0,
          total_size INTEGER NOT NULL DEFAULT 0,
          compressed_size INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_snapshots_tag ON snapshots(tag);

        CREATE TABLE IF NOT EXISTS snapshot_files (
          snapshot_id INTEGER NOT NULL REFERENCES snapshots(id) ON DELETE CASCADE,
          file_path TEXT NOT NULL,
          file_hash TEXT NOT NULL,
          size INTEGER NOT NULL,
          mode INTEGER NOT NULL,
          PRIMARY KEY (snapshot_id, file_path)
        );

        CREATE INDEX IF NOT EXISTS idx_snapshot_files_hash ON snapshot_files(file_hash);

        CREATE TABLE IF NOT EXISTS contents (
          hash TEXT PRIMARY KEY,
          original_size INTEGER NOT NULL,
          compressed_size INTEGER NOT NULL,
          created_at TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn insert_snapshot(
    conn: &Connection,
    new: &NewSnapshot,
    parent_id: Option<i64>,
    created_at: DateTime<Utc>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO snapshots (hash, message, tag, created_at, parent_id, is_autosave,
                                trigger_type, files_count, total_size, compressed_size)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            new.content_hash,
            new.message,
            new.tag,
            created_at,
            parent_id,
            new.is_autosave,
            new.trigger_type,
            new.files_count as i64,
            new.total_size as i64,
            new.compressed_size as i64,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn insert_file(conn: &Connection, snapshot_id: i64, entry: &FileEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO snapshot_files (snapshot_id, file_path, file_hash, size, mode)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            snapshot_id,
            entry.path,
            entry.hash,
            entry.size as i64,
            i64::from(entry.mode)
        ],
    )?;
    Ok(())
}

fn delete_snapshot_rows(conn: &Connection, id: i64) -> Result<bool> {
    conn.execute(
        "DELETE FROM snapshot_files WHERE snapshot_id = ?1",
        params![id],
    )?;
    let deleted = conn.execute("DELETE FROM snapshots WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

fn fetch_snapshot(conn: &Connection, id: i64) -> Result<Option<SnapshotMetadata>> {
    let sql = format!("SELECT {} FROM snapshots WHERE id = ?1", SNAPSHOT_COLUMNS);
    Ok(conn.query_row(&sql, params![id], row_to_metadata).optional()?)
}

fn row_to_metadata(row: &Row<'_>) -> rusqlite::Result<SnapshotMetadata> {
    Ok(SnapshotMetadata {
        id: row.get(0)?,
        content_hash: row.get(1)?,
        message: row.get(2)?,
        tag: row.get(3)?,
        created_at: row.get(4)?,
        parent_id: row.get(5)?,
        is_autosave: row.get(6)?,
        trigger_type: row.get(7)?,
        files_count: row.get::<_, i64>(8)? as usize,
        total_size: row.get::<_, i64>(9)? as u64,
        compressed_size: row.get::<_, i64>(10)? as u64,
    })
}

fn row_to_file(row: &Row<'_>) -> rusqlite::Result<FileEntry> {
    Ok(FileEntry {
        path: row.get(0)?,
        hash: row.get(1)?,
        size: row.get::<_, i64>(2)? as u64,
        mode: row.get::<_, i64>(3)? as u32,
    })
}
