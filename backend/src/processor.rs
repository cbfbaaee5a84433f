use std::collections::HashSet;

use futures::future::join_all;
use rustrict::CensorStr;
use shared::{
    apply_vote, derive_view, rank, set_votes, submission_gate, validate_entry_request, Category, CategoryFilter,
    Coordinates, Entry, GalleryView, MapMarker, MapView, NewEntryRequest, SubmitGate, VoteReceipt,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::audit::{AuditSink, SubmissionRecord};
use crate::error::ApiError;
use crate::geocode::Geocoder;
use crate::store::{EntryPatch, EntryStore, NewEntry, StoreError};
use crate::viewer::Viewer;

pub const SEED_OWNER: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    Recorded { points: u32, votes: u32 },
    /// The entry was not in the current snapshot; nothing was written.
    Ignored,
}

impl VoteOutcome {
    pub fn receipt(self, entry_id: Uuid) -> VoteReceipt {
        match self {
            VoteOutcome::Recorded { points, votes } => VoteReceipt { entry_id, recorded: true, points, votes: Some(votes) },
            VoteOutcome::Ignored => VoteReceipt { entry_id, recorded: false, points: 0, votes: None },
        }
    }
}

fn seed_entries() -> Vec<NewEntry> {
    let seed = |title: &str, author: &str, location: &str, category, url: &str, votes| NewEntry {
        title: title.into(),
        author: author.into(),
        location: location.into(),
        category,
        url: url.into(),
        votes,
        owner_id: SEED_OWNER.into(),
    };
    vec![
        seed("Hip Hop al Pont", "Grup Jove Molins", "Pont de les 15 Arcades", Category::Group, "https://www.youtube.com/watch?v=dQw4w9WgXcQ", 124),
        seed("Dansa Contemporània al Castell", "Maria S.", "Carrer del Castell, 2", Category::Individual, "https://instagram.com", 89),
        seed("Sardana Fusió", "Colla Nova", "Plaça de l'Ajuntament", Category::Group, "https://www.youtube.com/watch?v=kYtGl1dX5qI", 210),
    ]
}

pub struct ContestProcessor;

impl ContestProcessor {
    pub fn gallery(snapshot: &[Entry], search: &str, filter: CategoryFilter, vote_weight: u32) -> GalleryView {
        let entries = rank(derive_view(snapshot, search, filter));
        GalleryView {
            total: entries.len(),
            vote_weight,
            entries,
        }
    }

    /// Adds the viewer's weight to the entry's count as seen in the latest
    /// snapshot. Entries that have vanished are skipped silently.
    pub async fn cast_vote(store: &dyn EntryStore, id: Uuid, viewer: &Viewer) -> Result<VoteOutcome, StoreError> {
        let snapshot = store.snapshot();
        let Some(entry) = snapshot.iter().find(|e| e.id == id) else {
            debug!("Vote for unknown entry {} ignored", id);
            return Ok(VoteOutcome::Ignored);
        };

        let points = viewer.vote_weight();
        let votes = apply_vote(entry.votes, points);
        match store.update(id, EntryPatch::votes(votes)).await {
            Ok(()) => {
                debug!("+{} for {} by {}", points, id, viewer.identity.uid);
                Ok(VoteOutcome::Recorded { points, votes })
            }
            Err(StoreError::NotFound(_)) => {
                debug!("Entry {} deleted while voting", id);
                Ok(VoteOutcome::Ignored)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn override_votes(store: &dyn EntryStore, id: Uuid, raw: i64) -> Result<u32, StoreError> {
        let votes = set_votes(raw);
        store.update(id, EntryPatch::votes(votes)).await?;
        info!("Votes for {} set to {}", id, votes);
        Ok(votes)
    }

    pub async fn remove_entry(store: &dyn EntryStore, id: Uuid) -> Result<(), StoreError> {
        store.delete(id).await?;
        info!("🗑️ Removed entry {}", id);
        Ok(())
    }

    pub async fn submit_entry(
        store: &dyn EntryStore,
        audit: &AuditSink,
        viewer: &Viewer,
        request: &NewEntryRequest,
    ) -> Result<Entry, ApiError> {
        if submission_gate(viewer.class) == SubmitGate::SignInRequired {
            return Err(ApiError::SignInRequired);
        }

        let request = validate_entry_request(request)?;
        if request.title.is_inappropriate() {
            return Err(ApiError::Inappropriate("title"));
        }
        if request.author.is_inappropriate() {
            return Err(ApiError::Inappropriate("author"));
        }

        let entry = store.create(NewEntry::submitted(request, viewer.identity.uid.clone())).await?;
        info!("📥 New entry {} by {}", entry.id, entry.owner_id);

        audit.record(SubmissionRecord::new(&entry, viewer.identity.email.as_deref()));
        Ok(entry)
    }

    /// Loads the sample entries. Administrators may always seed; anyone may
    /// seed an empty contest.
    pub async fn seed(store: &dyn EntryStore, viewer: &Viewer) -> Result<Vec<Entry>, ApiError> {
        if !viewer.class.is_admin() && !store.snapshot().is_empty() {
            return Err(ApiError::Forbidden);
        }

        let mut created = Vec::new();
        for entry in seed_entries() {
            created.push(store.create(entry).await?);
        }
        info!("🌱 Seeded {} entries", created.len());
        Ok(created)
    }

    pub async fn map_view(geocoder: &dyn Geocoder, snapshot: &[Entry], center: Coordinates) -> MapView {
        let live: HashSet<&str> = snapshot.iter().map(|entry| entry.location.trim()).collect();
        geocoder.prune(&live);

        let lookups = snapshot.iter().map(|entry| async move {
            geocoder.locate(&entry.location).await.map(|position| MapMarker {
                entry_id: entry.id,
                title: entry.title.clone(),
                author: entry.author.clone(),
                url: entry.url.clone(),
                position,
            })
        });

        let markers: Vec<MapMarker> = join_all(lookups).await.into_iter().flatten().collect();
        MapView {
            center,
            locations: snapshot.len(),
            markers,
        }
    }
}
