use std::fmt::Display;
use std::str::FromStr;

use shared::{AdminSet, Coordinates};
use tracing::{info, warn};

const DEFAULT_CONTEST_NAME: &str = "molins_dansa";
const DEFAULT_TOWN: &str = "Molins de Rei, Spain";
const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";
const DEFAULT_AUDIENCE: &str = "authenticated";
const DEFAULT_CENTER: Coordinates = Coordinates { lat: 41.408, lon: 2.015 };

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),
    #[error("Invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub base_url: String,
    pub api_key: String,
    pub jwt_secret: String,
    pub audience: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub admins: AdminSet,
    pub contest_name: String,
    pub town: String,
    pub map_center: Coordinates,
    pub auth: AuthConfig,
    pub geocoder_url: String,
    pub audit_webhook: Option<String>,
    pub allowed_origin: Option<String>,
}

impl AppConfig {
    /// Builds the configuration from a key lookup, normally the Shuttle secret store.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));
        let or_default = |key: &str, default: &str| {
            get(key).unwrap_or_else(|| {
                info!("{key} not set, using default: {default}");
                default.to_string()
            })
        };

        let admins = AdminSet::parse(&get("ADMIN_UIDS").unwrap_or_default());
        if admins.is_empty() {
            warn!("ADMIN_UIDS is empty - nobody can moderate entries");
        }

        let map_center = match get("MAP_CENTER") {
            Some(raw) => parse_coordinates(&raw).map_err(|reason| ConfigError::Invalid { key: "MAP_CENTER", reason })?,
            None => DEFAULT_CENTER,
        };

        Ok(Self {
            admins,
            contest_name: or_default("CONTEST_NAME", DEFAULT_CONTEST_NAME),
            town: or_default("TOWN", DEFAULT_TOWN),
            map_center,
            auth: AuthConfig {
                base_url: require("AUTH_URL")?.trim_end_matches('/').to_string(),
                api_key: require("AUTH_API_KEY")?,
                jwt_secret: require("AUTH_JWT_SECRET")?,
                audience: or_default("AUTH_AUDIENCE", DEFAULT_AUDIENCE),
            },
            geocoder_url: or_default("GEOCODER_URL", DEFAULT_GEOCODER_URL).trim_end_matches('/').to_string(),
            audit_webhook: get("AUDIT_WEBHOOK_URL"),
            allowed_origin: get("ALLOWED_ORIGIN"),
        })
    }
}

fn parse_number<T: FromStr>(raw: &str) -> Result<T, String>
where
    T::Err: Display,
{
    raw.trim().parse().map_err(|e: T::Err| format!("{raw:?}: {e}"))
}

fn parse_coordinates(raw: &str) -> Result<Coordinates, String> {
    let (lat, lon) = raw.split_once(',').ok_or_else(|| format!("expected \"lat,lon\", got {raw:?}"))?;
    Ok(Coordinates { lat: parse_number(lat)?, lon: parse_number(lon)? })
}
