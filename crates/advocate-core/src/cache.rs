//! Two-tier cache for computed argument sets, keyed by content hash.
//!
//! **L1**: [`DashMap`] in-memory map (lock-free concurrent reads).
//! **L2**: Optional SQLite database on disk (persists across process
//! restarts).
//!
//! On [`get`](ResultCache::get): check L1 first; on miss, fall through to
//! L2 and promote the result back into L1 on hit. On
//! [`insert`](ResultCache::insert): write-through to both tiers.
//!
//! Entries have no TTL. A document's content hash never changes meaning, so
//! cached results live until [`clear`](ResultCache::clear) or the file is
//! deleted. Caching is a performance optimization only: L2 write failures
//! are logged and swallowed, and a row that no longer deserializes reads as
//! a miss.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use rusqlite::{Connection, OpenFlags, params};

use crate::ArgumentSet;

/// Open a SQLite connection with WAL mode and standard pragmas.
fn open_sqlite(path: &Path, read_only: bool) -> Result<Connection, rusqlite::Error> {
    let flags = if read_only {
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX
    } else {
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
    };
    let conn = Connection::open_with_flags(path, flags)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(conn)
}

/// SQLite writer connection (L2 writes: insert, clear).
struct SqliteWriter {
    conn: Connection,
}

impl SqliteWriter {
    fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = open_sqlite(path, false)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS result_cache (
                 content_hash   TEXT PRIMARY KEY,
                 arguments_json TEXT NOT NULL,
                 inserted_at    INTEGER NOT NULL
             );",
        )?;
        Ok(Self { conn })
    }

    fn insert(&self, hash: &str, arguments_json: &str, epoch: u64) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO result_cache (content_hash, arguments_json, inserted_at)
             VALUES (?1, ?2, ?3)",
            params![hash, arguments_json, epoch],
        )?;
        Ok(())
    }

    fn clear(&self) {
        let _ = self.conn.execute("DELETE FROM result_cache", []);
        // Without VACUUM the deleted pages stay allocated as free pages.
        let _ = self.conn.execute_batch("VACUUM");
    }

    fn len(&self) -> usize {
        self.conn
            .query_row("SELECT COUNT(*) FROM result_cache", [], |row| row.get(0))
            .unwrap_or(0)
    }
}

/// Pool of read-only SQLite connections for concurrent L2 lookups.
///
/// Each reader gets its own connection (SQLite WAL mode allows concurrent
/// reads). Connections are returned to the pool after use. If the pool is
/// empty, a new connection is opened.
struct ReadPool {
    pool: Mutex<Vec<Connection>>,
    path: PathBuf,
}

impl ReadPool {
    fn new(path: &Path) -> Self {
        Self {
            pool: Mutex::new(Vec::new()),
            path: path.to_path_buf(),
        }
    }

    fn acquire(&self) -> Option<Connection> {
        // Try to reuse a pooled connection
        if let Ok(mut pool) = self.pool.lock()
            && let Some(conn) = pool.pop()
        {
            return Some(conn);
        }
        // Pool empty, open a new read-only connection
        open_sqlite(&self.path, true).ok()
    }

    fn release(&self, conn: Connection) {
        if let Ok(mut pool) = self.pool.lock() {
            pool.push(conn);
        }
    }

    fn get(&self, hash: &str) -> Option<ArgumentSet> {
        let conn = self.acquire()?;
        let result = Self::query(&conn, hash);
        self.release(conn);
        result
    }

    fn query(conn: &Connection, hash: &str) -> Option<ArgumentSet> {
        let mut stmt = conn
            .prepare_cached("SELECT arguments_json FROM result_cache WHERE content_hash = ?1")
            .ok()?;
        let json: String = stmt.query_row(params![hash], |row| row.get(0)).ok()?;
        // A row that fails to deserialize is treated as a miss, not an error.
        serde_json::from_str(&json).ok()
    }
}

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Hit/miss counters and tier sizes, for the CLI's `cache stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub l1_entries: usize,
    pub l2_entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Thread-safe two-tier cache mapping content hashes to argument sets.
///
/// L1: [`DashMap`] for lock-free concurrent access from multiple requests.
/// L2: Optional SQLite database. Reads use a [`ReadPool`] of concurrent
///     connections, writes go through a single [`SqliteWriter`] behind a
///     [`Mutex`].
pub struct ResultCache {
    entries: DashMap<String, ArgumentSet>,
    /// Writer connection for inserts and clears (serialized).
    sqlite_writer: Option<Mutex<SqliteWriter>>,
    /// Pool of read-only connections for concurrent L2 lookups.
    read_pool: Option<ReadPool>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultCache {
    /// Create an in-memory-only cache (no disk persistence).
    ///
    /// Used as a test double and as the degraded mode when the cache file
    /// cannot be opened.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            sqlite_writer: None,
            read_pool: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Open a persistent cache backed by a SQLite database at `path`.
    ///
    /// The L1 map starts empty and is populated lazily as entries are
    /// accessed.
    pub fn open(path: &Path) -> Result<Self, String> {
        let writer = SqliteWriter::open(path)
            .map_err(|e| format!("failed to open cache database at {}: {}", path.display(), e))?;
        Ok(Self {
            entries: DashMap::new(),
            sqlite_writer: Some(Mutex::new(writer)),
            read_pool: Some(ReadPool::new(path)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Look up the argument set stored under a content hash.
    pub fn get(&self, hash: &str) -> Option<ArgumentSet> {
        // L1 check
        if let Some(entry) = self.entries.get(hash) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(hash, "cache L1 hit");
            return Some(entry.clone());
        }

        // L2 check (concurrent read, no writer lock needed)
        if let Some(ref pool) = self.read_pool
            && let Some(arguments) = pool.get(hash)
        {
            // Promote to L1
            tracing::trace!(hash, "cache L2 hit, promoting to L1");
            self.entries.insert(hash.to_string(), arguments.clone());
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(arguments);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(hash, "cache miss");
        None
    }

    /// Store an argument set under a content hash, replacing any previous
    /// entry. Write-through: updates both L1 and L2.
    ///
    /// An L2 write failure is logged and swallowed; the caller still gets
    /// the result it computed.
    pub fn insert(&self, hash: &str, arguments: &ArgumentSet) {
        tracing::trace!(hash, "cache insert");
        self.entries.insert(hash.to_string(), arguments.clone());

        if let Some(ref sqlite_mutex) = self.sqlite_writer
            && let Ok(store) = sqlite_mutex.lock()
        {
            let json = match serde_json::to_string(arguments) {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!(hash, error = %e, "cache entry serialization failed");
                    return;
                }
            };
            if let Err(e) = store.insert(hash, &json, now_epoch()) {
                tracing::warn!(hash, error = %e, "cache write failed");
            }
        }
    }

    /// Remove all entries from both L1 and L2.
    pub fn clear(&self) {
        self.entries.clear();
        if let Some(ref sqlite_mutex) = self.sqlite_writer
            && let Ok(store) = sqlite_mutex.lock()
        {
            store.clear();
        }
    }

    /// Number of entries currently in the L1 in-memory map.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the L1 map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total entries in the persistent L2 store (0 if no SQLite backing).
    pub fn disk_len(&self) -> usize {
        if let Some(ref sqlite_mutex) = self.sqlite_writer
            && let Ok(store) = sqlite_mutex.lock()
        {
            store.len()
        } else {
            0
        }
    }

    /// Whether this cache has a persistent SQLite backing store.
    pub fn has_persistence(&self) -> bool {
        self.sqlite_writer.is_some()
    }

    /// Number of cache hits since creation.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of cache misses since creation.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Snapshot of counters and tier sizes.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            l1_entries: self.len(),
            l2_entries: self.disk_len(),
            hits: self.hits(),
            misses: self.misses(),
        }
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("l1_entries", &self.entries.len())
            .field("hits", &self.hits())
            .field("misses", &self.misses())
            .field("persistent", &self.has_persistence())
            .finish()
    }
}
