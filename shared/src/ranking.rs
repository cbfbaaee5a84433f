use crate::media::thumbnail_url;
use crate::models::{CategoryFilter, Entry, RankedEntry};

/// Number of leading positions that get the podium badge.
pub const TOP_RANKED: usize = 3;

/// Filters `entries` by category and a case-insensitive title/author search,
/// then orders them by votes, highest first. Ties keep their input order.
pub fn derive_view(entries: &[Entry], search: &str, filter: CategoryFilter) -> Vec<Entry> {
    let needle = search.to_lowercase();
    let mut view: Vec<Entry> = entries
        .iter()
        .filter(|entry| filter.admits(entry.category))
        .filter(|entry| {
            needle.is_empty()
                || entry.title.to_lowercase().contains(&needle)
                || entry.author.to_lowercase().contains(&needle)
        })
        .cloned()
        .collect();

    // sort_by is stable
    view.sort_by(|a, b| b.votes.cmp(&a.votes));
    view
}

pub fn rank(view: Vec<Entry>) -> Vec<RankedEntry> {
    view.into_iter()
        .enumerate()
        .map(|(idx, entry)| RankedEntry {
            position: idx + 1,
            top_three: idx < TOP_RANKED,
            thumbnail_url: thumbnail_url(&entry.url),
            entry,
        })
        .collect()
}
