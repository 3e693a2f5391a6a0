use std::path::{Path, PathBuf};

use bracket_engine::discovery::MetadataEntry;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::{check_page, missing_pages, new_session_id, Result, SessionBuffer, SessionError, SessionStatus};

/// SQLite-backed session store.
///
/// Page payloads are kept as JSON text, one row per page. WAL mode lets a
/// reader check status while another connection appends.
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteSessionStore {
    /// Open or create the store at `~/.bracketflow/sessions.db`.
    pub fn open_default() -> Result<Self> {
        let dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".bracketflow");
        std::fs::create_dir_all(&dir)?;
        Self::open_at(&dir.join("sessions.db"))
    }

    /// Open a store at a specific path.
    pub fn open_at(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA synchronous=NORMAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: db_path.to_path_buf(),
        };
        store.create_tables()?;
        debug!(path = %db_path.display(), "opened session store");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn create_tables(&self) -> Result<()> {
        self.conn.lock().execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                total_pages INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS pages (
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                page_number INTEGER NOT NULL,
                entry_count INTEGER NOT NULL,
                entries TEXT NOT NULL,
                PRIMARY KEY (session_id, page_number)
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_updated ON sessions(updated_at);
            ",
        )?;
        Ok(())
    }

    fn load_status(conn: &Connection, session_id: &str) -> Result<SessionStatus> {
        let row: Option<(u32, i64, i64)> = conn
            .query_row(
                "SELECT total_pages, created_at, updated_at FROM sessions WHERE id = ?1",
                params![session_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let (total_pages, created_at, updated_at) =
            row.ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        let mut stmt = conn.prepare(
            "SELECT page_number, entry_count FROM pages WHERE session_id = ?1 ORDER BY page_number",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            Ok((row.get::<_, u32>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut received_pages = Vec::new();
        let mut entry_count = 0usize;
        for row in rows {
            let (page, count) = row?;
            received_pages.push(page);
            entry_count += count as usize;
        }

        Ok(SessionStatus {
            session_id: session_id.to_string(),
            total_pages,
            received_pages,
            entry_count,
            created_at: from_millis(created_at),
            updated_at: from_millis(updated_at),
        })
    }
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}

impl SessionBuffer for SqliteSessionStore {
    fn create(&self, total_pages: u32) -> Result<String> {
        if total_pages == 0 {
            return Err(SessionError::NoPages);
        }
        let id = new_session_id();
        let now = Utc::now().timestamp_millis();
        self.conn.lock().execute(
            "INSERT INTO sessions (id, total_pages, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![id, total_pages, now],
        )?;
        info!(session_id = %id, total_pages, "created discovery session");
        Ok(id)
    }

    fn append_page(&self, session_id: &str, page: u32, entries: Vec<MetadataEntry>) -> Result<SessionStatus> {
        let conn = self.conn.lock();
        let status = Self::load_status(&conn, session_id)?;
        check_page(page, status.total_pages)?;

        let payload = serde_json::to_string(&entries)?;
        let tx = conn.unchecked_transaction()?;
        conn.execute(
            "INSERT OR REPLACE INTO pages (session_id, page_number, entry_count, entries)
             VALUES (?1, ?2, ?3, ?4)",
            params![session_id, page, entries.len() as i64, payload],
        )?;
        conn.execute(
            "UPDATE sessions SET updated_at = ?1 WHERE id = ?2",
            params![Utc::now().timestamp_millis(), session_id],
        )?;
        tx.commit()?;

        debug!(session_id, page, entries = entries.len(), "stored page");
        Self::load_status(&conn, session_id)
    }

    fn status(&self, session_id: &str) -> Result<SessionStatus> {
        Self::load_status(&self.conn.lock(), session_id)
    }

    fn entries(&self, session_id: &str) -> Result<Vec<MetadataEntry>> {
        let conn = self.conn.lock();
        let status = Self::load_status(&conn, session_id)?;
        let missing = missing_pages(status.total_pages, &status.received_pages);
        if !missing.is_empty() {
            return Err(SessionError::Incomplete {
                session_id: session_id.to_string(),
                missing,
            });
        }

        let payloads: Vec<String> = {
            let mut stmt =
                conn.prepare("SELECT entries FROM pages WHERE session_id = ?1 ORDER BY page_number")?;
            let rows = stmt.query_map(params![session_id], |row| row.get(0))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        let mut entries = Vec::with_capacity(status.entry_count);
        for payload in payloads {
            let page: Vec<MetadataEntry> = serde_json::from_str(&payload)?;
            entries.extend(page);
        }

        debug!(session_id, entries = entries.len(), "loaded complete session");
        Ok(entries)
    }

    fn discard(&self, session_id: &str) -> Result<bool> {
        let removed = self
            .conn
            .lock()
            .execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
        if removed > 0 {
            info!(session_id, "discarded session");
        }
        Ok(removed > 0)
    }

    fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let purged = self.conn.lock().execute(
            "DELETE FROM sessions WHERE updated_at < ?1",
            params![cutoff.timestamp_millis()],
        )?;
        if purged > 0 {
            info!(purged, "purged expired sessions");
        }
        Ok(purged)
    }
}
