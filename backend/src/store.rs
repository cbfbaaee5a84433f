use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rocket::async_trait;
use shared::models::*;
use time::OffsetDateTime;
use tokio::sync::watch;
use uuid::Uuid;

/// Full entry list at one point in time, in creation order.
pub type Snapshot = Arc<Vec<Entry>>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Entry {0} not found")]
    NotFound(Uuid),
    #[error("Entry store lock poisoned")]
    LockFailed,
    #[error("Entry store unavailable")]
    Unavailable,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Fields of a submission before the store assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub title: String,
    pub author: String,
    pub location: String,
    pub category: Category,
    pub url: String,
    pub votes: u32,
    pub owner_id: String,
}

impl NewEntry {
    pub fn submitted(request: NewEntryRequest, owner_id: impl Into<String>) -> Self {
        Self {
            title: request.title,
            author: request.author,
            location: request.location,
            category: request.category,
            url: request.url,
            votes: 0,
            owner_id: owner_id.into(),
        }
    }

    fn into_entry(self, id: Uuid, created_at: OffsetDateTime) -> Entry {
        Entry {
            id,
            title: self.title,
            author: self.author,
            location: self.location,
            category: self.category,
            url: self.url,
            votes: self.votes,
            created_at,
            owner_id: self.owner_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryPatch {
    pub votes: Option<u32>,
}

impl EntryPatch {
    pub fn votes(votes: u32) -> Self {
        Self { votes: Some(votes) }
    }

    fn apply(&self, entry: &mut Entry) {
        if let Some(votes) = self.votes {
            entry.votes = votes;
        }
    }
}

/// Live collection of contest entries.
///
/// Every accepted write is eventually followed by a new snapshot on the
/// `subscribe` channel; callers never mutate their local copy.
#[async_trait]
pub trait EntryStore: Send + Sync {
    fn subscribe(&self) -> watch::Receiver<Snapshot>;

    fn snapshot(&self) -> Snapshot {
        let rx = self.subscribe();
        let snapshot = rx.borrow().clone();
        snapshot
    }

    async fn create(&self, entry: NewEntry) -> Result<Entry, StoreError>;

    async fn update(&self, id: Uuid, patch: EntryPatch) -> Result<(), StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}

pub struct MemoryStore {
    entries: Mutex<Vec<Entry>>,
    snapshots: watch::Sender<Snapshot>,
    unavailable: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_entries(Vec::new())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<Entry>) -> Self {
        let (snapshots, _) = watch::channel(Arc::new(entries.clone()));
        Self {
            entries: Mutex::new(entries),
            snapshots,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Makes every write fail with `StoreError::Unavailable`, like a dropped connection.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn write<T>(&self, op: impl FnOnce(&mut Vec<Entry>) -> Result<T, StoreError>) -> Result<T, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        let mut entries = self.entries.lock().map_err(|_| StoreError::LockFailed)?;
        let out = op(&mut entries)?;
        self.snapshots.send_replace(Arc::new(entries.clone()));
        Ok(out)
    }
}

#[async_trait]
impl EntryStore for MemoryStore {
    fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.subscribe()
    }

    async fn create(&self, entry: NewEntry) -> Result<Entry, StoreError> {
        self.write(|entries| {
            let entry = entry.into_entry(Uuid::new_v4(), OffsetDateTime::now_utc());
            entries.push(entry.clone());
            Ok(entry)
        })
    }

    async fn update(&self, id: Uuid, patch: EntryPatch) -> Result<(), StoreError> {
        self.write(|entries| {
            let entry = entries.iter_mut().find(|e| e.id == id).ok_or(StoreError::NotFound(id))?;
            patch.apply(entry);
            Ok(())
        })
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.write(|entries| {
            let idx = entries.iter().position(|e| e.id == id).ok_or(StoreError::NotFound(id))?;
            entries.remove(idx);
            Ok(())
        })
    }
}
