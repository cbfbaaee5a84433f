use std::sync::Arc;

use rocket::async_trait;
use shared::{set_votes, Category, Entry};
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::store::{EntryPatch, EntryStore, NewEntry, Snapshot, StoreError};

const CHANGE_CHANNEL: &str = "entries_changed";
const RELISTEN_DELAY: Duration = Duration::from_secs(5);
const ENTRY_COLUMNS: &str = "id, title, author, location, category, url, votes, created_at, owner_id";

#[derive(sqlx::FromRow)]
struct EntryRow {
    id: Uuid,
    title: String,
    author: String,
    location: String,
    category: Category,
    url: String,
    votes: i64,
    created_at: OffsetDateTime,
    owner_id: String,
}

impl From<EntryRow> for Entry {
    fn from(row: EntryRow) -> Self {
        Entry {
            id: row.id,
            title: row.title,
            author: row.author,
            location: row.location,
            category: row.category,
            url: row.url,
            votes: set_votes(row.votes),
            created_at: row.created_at,
            owner_id: row.owner_id,
        }
    }
}

/// Postgres-backed entry store. Snapshots are reloaded after local writes and
/// whenever another writer fires `NOTIFY entries_changed`.
pub struct PgEntryStore {
    pool: PgPool,
    snapshots: watch::Sender<Snapshot>,
}

impl PgEntryStore {
    pub async fn connect(pool: PgPool) -> Result<Arc<Self>, StoreError> {
        let entries = load_entries(&pool).await?;
        info!("📋 Loaded {} entries", entries.len());
        Ok(Arc::new(Self::with_snapshot(pool, entries)))
    }

    pub(crate) fn with_snapshot(pool: PgPool, entries: Vec<Entry>) -> Self {
        let (snapshots, _) = watch::channel(Arc::new(entries));
        Self { pool, snapshots }
    }

    pub async fn refresh(&self) -> Result<(), StoreError> {
        let entries = load_entries(&self.pool).await?;
        debug!("Publishing snapshot of {} entries", entries.len());
        self.snapshots.send_replace(Arc::new(entries));
        Ok(())
    }

    /// Republishes after a write that already committed. A failed reload only
    /// delays the snapshot until the next change notification; the write stands.
    pub(crate) async fn committed<T>(&self, value: T) -> T {
        if let Err(e) = self.refresh().await {
            warn!("Write committed but snapshot reload failed: {}", e);
        }
        value
    }

    /// Runs forever, re-subscribing after connection failures.
    pub async fn listen(self: Arc<Self>) {
        loop {
            if let Err(e) = self.listen_once().await {
                error!("Entry change listener failed: {}", e);
            }
            sleep(RELISTEN_DELAY).await;
        }
    }

    async fn listen_once(&self) -> Result<(), StoreError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;
        info!("👂 Listening for entry changes");

        // catch up on anything missed while disconnected
        self.refresh().await?;
        loop {
            listener.recv().await?;
            self.refresh().await?;
        }
    }
}

async fn load_entries(pool: &PgPool) -> Result<Vec<Entry>, StoreError> {
    let rows = sqlx::query_as::<_, EntryRow>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM entries ORDER BY created_at, id"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Entry::from).collect())
}

#[async_trait]
impl EntryStore for PgEntryStore {
    fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.subscribe()
    }

    async fn create(&self, entry: NewEntry) -> Result<Entry, StoreError> {
        let row = sqlx::query_as::<_, EntryRow>(&format!(
            "INSERT INTO entries (id, title, author, location, category, url, votes, owner_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&entry.title)
        .bind(&entry.author)
        .bind(&entry.location)
        .bind(entry.category)
        .bind(&entry.url)
        .bind(i64::from(entry.votes))
        .bind(&entry.owner_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(self.committed(row.into()).await)
    }

    async fn update(&self, id: Uuid, patch: EntryPatch) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE entries SET votes = COALESCE($2, votes) WHERE id = $1")
            .bind(id)
            .bind(patch.votes.map(i64::from))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(self.committed(()).await)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM entries WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(self.committed(()).await)
    }
}
