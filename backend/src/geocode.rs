use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use reqwest::Client;
use rocket::async_trait;
use serde::Deserialize;
use shared::Coordinates;
use tracing::{debug, warn};

/// Best-effort address lookup. `None` means "no marker", never an error.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn locate(&self, address: &str) -> Option<Coordinates>;

    /// Drops remembered lookups for addresses no longer in use.
    fn prune(&self, _live: &HashSet<&str>) {}
}

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

#[derive(Debug, thiserror::Error)]
enum LookupError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("bad coordinate {0:?}")]
    Coordinate(String),
}

/// OpenStreetMap Nominatim search, scoped to the contest town.
pub struct Nominatim {
    client: Client,
    base_url: String,
    town: String,
    cache: Mutex<HashMap<String, Option<Coordinates>>>,
}

impl Nominatim {
    pub fn new(base_url: impl Into<String>, town: impl Into<String>, user_agent: &str) -> Self {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default geocoding client: {}", e);
                Client::new()
            });
        Self {
            client,
            base_url: base_url.into(),
            town: town.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn cached(&self, address: &str) -> Option<Option<Coordinates>> {
        self.cache.lock().ok()?.get(address).copied()
    }

    pub(crate) fn remember(&self, address: &str, found: Option<Coordinates>) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(address.to_string(), found);
        }
    }

    async fn lookup(&self, address: &str) -> Result<Option<Coordinates>, LookupError> {
        let query = format!("{}, {}", address, self.town);
        let places: Vec<Place> = self.client
            .get(format!("{}/search", self.base_url))
            .query(&[("format", "json"), ("q", query.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let Some(place) = places.into_iter().next() else { return Ok(None) };
        let parse = |raw: &str| raw.parse::<f64>().map_err(|_| LookupError::Coordinate(raw.to_string()));
        Ok(Some(Coordinates { lat: parse(&place.lat)?, lon: parse(&place.lon)? }))
    }
}

#[async_trait]
impl Geocoder for Nominatim {
    async fn locate(&self, address: &str) -> Option<Coordinates> {
        let address = address.trim();
        if address.is_empty() {
            return None;
        }
        if let Some(hit) = self.cached(address) {
            return hit;
        }

        match self.lookup(address).await {
            Ok(found) => {
                debug!("Geocoded {:?} -> {:?}", address, found);
                self.remember(address, found);
                found
            }
            Err(e) => {
                warn!("Error geocoding {:?}: {}", address, e);
                None
            }
        }
    }

    fn prune(&self, live: &HashSet<&str>) {
        if let Ok(mut cache) = self.cache.lock() {
            let before = cache.len();
            cache.retain(|address, _| live.contains(address.as_str()));
            if cache.len() < before {
                debug!("Forgot {} stale geocoded addresses", before - cache.len());
            }
        }
    }
}
