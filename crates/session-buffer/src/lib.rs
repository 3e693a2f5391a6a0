//! Accumulation buffer for paginated discovery sessions.
//!
//! Extraction of a large job arrives one page at a time, correlated by a
//! session id. Pages are buffered here until every page has arrived, then
//! handed over in page order and the session is discarded. Sessions that
//! stall are purged after a TTL.
//!
//! Two stores implement [`SessionBuffer`]:
//! - [`SqliteSessionStore`]: durable, at `~/.bracketflow/sessions.db` by default
//! - [`MemorySessionStore`]: process-local, for tests and one-shot runs

use bracket_engine::discovery::MetadataEntry;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

mod memory;
mod sqlite;

pub use memory::MemorySessionStore;
pub use sqlite::SqliteSessionStore;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("a session needs at least one page")]
    NoPages,

    #[error("page {page} out of range for session with {total_pages} pages")]
    PageOutOfRange { page: u32, total_pages: u32 },

    #[error("session {session_id} is missing pages {missing:?}")]
    Incomplete { session_id: String, missing: Vec<u32> },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Progress of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub total_pages: u32,
    /// Page numbers received so far, ascending
    pub received_pages: Vec<u32>,
    pub entry_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionStatus {
    pub fn missing_pages(&self) -> Vec<u32> {
        missing_pages(self.total_pages, &self.received_pages)
    }

    pub fn is_complete(&self) -> bool {
        self.missing_pages().is_empty()
    }
}

/// Store for in-flight discovery sessions. Pages are numbered from 1.
pub trait SessionBuffer: Send + Sync {
    /// Start a session expecting `total_pages` pages and return its id.
    fn create(&self, total_pages: u32) -> Result<String>;

    /// Store one page. Sending the same page again replaces it.
    fn append_page(&self, session_id: &str, page: u32, entries: Vec<MetadataEntry>) -> Result<SessionStatus>;

    fn status(&self, session_id: &str) -> Result<SessionStatus>;

    /// Return all entries in page order, leaving the session in place.
    ///
    /// Fails with [`SessionError::Incomplete`] while pages are missing.
    fn entries(&self, session_id: &str) -> Result<Vec<MetadataEntry>>;

    /// [`entries`](SessionBuffer::entries), then discard the session.
    fn take_complete(&self, session_id: &str) -> Result<Vec<MetadataEntry>> {
        let entries = self.entries(session_id)?;
        self.discard(session_id)?;
        Ok(entries)
    }

    /// Drop a session and its pages. Returns whether it existed.
    fn discard(&self, session_id: &str) -> Result<bool>;

    /// Drop sessions not updated since `cutoff`. Returns how many were dropped.
    fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    fn purge_expired(&self, ttl: Duration) -> Result<usize> {
        let cutoff = Utc::now().checked_sub_signed(ttl).unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.purge_older_than(cutoff)
    }
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn check_page(page: u32, total_pages: u32) -> Result<()> {
    if page == 0 || page > total_pages {
        return Err(SessionError::PageOutOfRange { page, total_pages });
    }
    Ok(())
}

fn missing_pages(total_pages: u32, received: &[u32]) -> Vec<u32> {
    (1..=total_pages).filter(|p| !received.contains(p)).collect()
}

/// Behaviour every store must share.
#[cfg(test)]
pub(crate) mod contract {
    use super::*;

    pub fn entry(name: &str) -> MetadataEntry {
        MetadataEntry {
            name: name.to_string(),
            path: format!("/job/{}", name.to_lowercase()),
            date_taken: Some("2024-01-15T14:30:25".to_string()),
            camera_model: Some("Canon EOS R5".to_string()),
            manufacturer: None,
            size: Some(25_000_000),
        }
    }

    pub fn pages_arrive_out_of_order(store: &dyn SessionBuffer) {
        let id = store.create(3).unwrap();
        store.append_page(&id, 3, vec![entry("IMG_5.CR2")]).unwrap();
        store
            .append_page(&id, 1, vec![entry("IMG_1.CR2"), entry("IMG_2.CR2")])
            .unwrap();

        let status = store.status(&id).unwrap();
        assert_eq!(status.received_pages, vec![1, 3]);
        assert_eq!(status.missing_pages(), vec![2]);
        assert_eq!(status.entry_count, 3);
        assert!(!status.is_complete());

        match store.take_complete(&id) {
            Err(SessionError::Incomplete { missing, .. }) => assert_eq!(missing, vec![2]),
            other => panic!("expected incomplete, got {:?}", other),
        }
        // still there after the failed take
        assert!(store.status(&id).is_ok());

        let status = store
            .append_page(&id, 2, vec![entry("IMG_3.CR2"), entry("IMG_4.CR2")])
            .unwrap();
        assert!(status.is_complete());

        let entries = store.take_complete(&id).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["IMG_1.CR2", "IMG_2.CR2", "IMG_3.CR2", "IMG_4.CR2", "IMG_5.CR2"]);
        assert!(matches!(store.status(&id), Err(SessionError::NotFound(_))));
    }

    pub fn entries_leave_session_in_place(store: &dyn SessionBuffer) {
        let id = store.create(2).unwrap();
        store.append_page(&id, 2, vec![entry("IMG_2.CR2")]).unwrap();
        store.append_page(&id, 1, vec![entry("IMG_1.CR2")]).unwrap();

        let first = store.entries(&id).unwrap();
        let second = store.entries(&id).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].name, "IMG_1.CR2");

        let status = store.status(&id).unwrap();
        assert!(status.is_complete());
        assert_eq!(status.entry_count, 2);

        assert!(store.discard(&id).unwrap());
        assert!(matches!(store.entries(&id), Err(SessionError::NotFound(_))));
    }

    pub fn resent_page_replaces(store: &dyn SessionBuffer) {
        let id = store.create(1).unwrap();
        store.append_page(&id, 1, vec![entry("a.jpg"), entry("b.jpg")]).unwrap();
        let status = store.append_page(&id, 1, vec![entry("c.jpg")]).unwrap();
        assert_eq!(status.entry_count, 1);
        let entries = store.take_complete(&id).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "c.jpg");
    }

    pub fn rejects_bad_input(store: &dyn SessionBuffer) {
        assert!(matches!(store.create(0), Err(SessionError::NoPages)));
        let id = store.create(2).unwrap();
        assert!(matches!(
            store.append_page(&id, 0, vec![]),
            Err(SessionError::PageOutOfRange { page: 0, total_pages: 2 })
        ));
        assert!(matches!(
            store.append_page(&id, 3, vec![]),
            Err(SessionError::PageOutOfRange { page: 3, .. })
        ));
        assert!(matches!(
            store.append_page("no-such-session", 1, vec![]),
            Err(SessionError::NotFound(_))
        ));
        assert!(matches!(store.take_complete("no-such-session"), Err(SessionError::NotFound(_))));
    }

    pub fn discard_and_purge(store: &dyn SessionBuffer) {
        let a = store.create(1).unwrap();
        let b = store.create(1).unwrap();
        assert_ne!(a, b);

        assert!(store.discard(&a).unwrap());
        assert!(!store.discard(&a).unwrap());

        assert_eq!(store.purge_expired(Duration::hours(1)).unwrap(), 0);
        assert_eq!(store.purge_expired(Duration::MAX).unwrap(), 0);
        assert!(store.status(&b).is_ok());
        assert_eq!(store.purge_older_than(Utc::now() + Duration::seconds(1)).unwrap(), 1);
        assert!(matches!(store.status(&b), Err(SessionError::NotFound(_))));
    }
}
