use std::collections::{BTreeMap, HashMap};

use bracket_engine::discovery::MetadataEntry;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::{check_page, missing_pages, new_session_id, Result, SessionBuffer, SessionError, SessionStatus};

struct Session {
    total_pages: u32,
    pages: BTreeMap<u32, Vec<MetadataEntry>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Session {
    fn status(&self, session_id: &str) -> SessionStatus {
        SessionStatus {
            session_id: session_id.to_string(),
            total_pages: self.total_pages,
            received_pages: self.pages.keys().copied().collect(),
            entry_count: self.pages.values().map(Vec::len).sum(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Process-local session store.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

impl SessionBuffer for MemorySessionStore {
    fn create(&self, total_pages: u32) -> Result<String> {
        if total_pages == 0 {
            return Err(SessionError::NoPages);
        }
        let id = new_session_id();
        let now = Utc::now();
        self.sessions.lock().insert(
            id.clone(),
            Session {
                total_pages,
                pages: BTreeMap::new(),
                created_at: now,
                updated_at: now,
            },
        );
        debug!(session_id = %id, total_pages, "created in-memory session");
        Ok(id)
    }

    fn append_page(&self, session_id: &str, page: u32, entries: Vec<MetadataEntry>) -> Result<SessionStatus> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        check_page(page, session.total_pages)?;

        session.pages.insert(page, entries);
        session.updated_at = Utc::now();
        Ok(session.status(session_id))
    }

    fn status(&self, session_id: &str) -> Result<SessionStatus> {
        self.sessions
            .lock()
            .get(session_id)
            .map(|s| s.status(session_id))
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    fn entries(&self, session_id: &str) -> Result<Vec<MetadataEntry>> {
        let sessions = self.sessions.lock();
        let session = sessions
            .get(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        let received: Vec<u32> = session.pages.keys().copied().collect();
        let missing = missing_pages(session.total_pages, &received);
        if !missing.is_empty() {
            return Err(SessionError::Incomplete {
                session_id: session_id.to_string(),
                missing,
            });
        }

        Ok(session.pages.values().flatten().cloned().collect())
    }

    fn discard(&self, session_id: &str) -> Result<bool> {
        Ok(self.sessions.lock().remove(session_id).is_some())
    }

    fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, s| s.updated_at >= cutoff);
        Ok(before - sessions.len())
    }
}
