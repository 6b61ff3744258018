use std::{path::PathBuf, time::Duration};

use anyhow::{anyhow, Context, Result};
use url::Url;

/// Current cache generation. Bumping it evicts every older generation on activation.
pub const CACHE_NAME: &str = "diggo-ocr-v1";
pub const OFFLINE_URL: &str = "/offline.html";
pub const API_PATH_MARKER: &str = "/api/";
pub const SUBMISSION_ENDPOINT: &str = "/api/appointments";
pub const SYNC_TAG: &str = "sync-appointment";
pub const DEFAULT_ORIGIN: &str = "http://localhost:8080";

pub const PRECACHE_RESOURCES: &[&str] = &[
    "/",
    "/index.html",
    "/ocr-appointment.html",
    "/ocr-styles.css",
    "/ocr-appointment.js",
    "/styles.css",
    "/app.js",
    "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.4.0/css/all.min.css",
    "https://fonts.googleapis.com/css2?family=Noto+Sans+TC:wght@400;500;600;700&display=swap",
];

const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;
const DEBUG_SYNC_INTERVAL_SECS: u64 = 15;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub origin: Url,
    pub cache_name: String,
    pub offline_url: String,
    pub precache: Vec<String>,
    pub api_marker: String,
    pub submission_endpoint: String,
    pub sync_tag: String,
    /// Upper bound for every network call the worker makes.
    pub fetch_timeout: Duration,
    pub sync_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            origin: Url::parse(DEFAULT_ORIGIN).expect("default origin is a valid url"),
            cache_name: CACHE_NAME.into(),
            offline_url: OFFLINE_URL.into(),
            precache: PRECACHE_RESOURCES.iter().map(|s| s.to_string()).collect(),
            api_marker: API_PATH_MARKER.into(),
            submission_endpoint: SUBMISSION_ENDPOINT.into(),
            sync_tag: SYNC_TAG.into(),
            fetch_timeout: Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS),
            sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
        }
    }
}

impl WorkerConfig {
    pub fn with_origin(origin: &str) -> Result<Self> {
        let origin = Url::parse(origin).with_context(|| format!("invalid origin '{origin}'"))?;
        Ok(Self {
            origin,
            ..Self::default()
        })
    }

    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var("DIGGO_ORIGIN") {
            Ok(origin) => Self::with_origin(&origin)?,
            Err(_) => Self::default(),
        };

        if let Ok(name) = std::env::var("DIGGO_CACHE_NAME") {
            if !name.trim().is_empty() {
                config.cache_name = name;
            }
        }

        if let Some(ms) = env_u64("DIGGO_FETCH_TIMEOUT_MS")? {
            config.fetch_timeout = Duration::from_millis(ms.max(1));
        }

        config.sync_interval = match env_u64("DIGGO_SYNC_INTERVAL_SECS")? {
            Some(secs) => Duration::from_secs(secs.max(1)),
            None if debug_mode() => Duration::from_secs(DEBUG_SYNC_INTERVAL_SECS),
            None => Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
        };

        Ok(config)
    }

    /// Resolves a manifest or request URL against the portal origin.
    pub fn resolve(&self, url: &str) -> Result<Url> {
        self.origin
            .join(url)
            .map_err(|err| anyhow!("cannot resolve '{url}' against {}: {err}", self.origin))
    }
}

/// Where the database and local storage live.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub root: PathBuf,
}

impl DataPaths {
    pub fn from_env() -> Self {
        let root = std::env::var("DIGGO_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("diggo-data"));
        Self { root }
    }

    pub fn database(&self) -> PathBuf {
        self.root.join("diggo.sqlite3")
    }

    pub fn local_storage(&self) -> PathBuf {
        self.root.join("storage.json")
    }
}

pub fn debug_mode() -> bool {
    std::env::var("DIGGO_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .with_context(|| format!("{name} must be an unsigned integer, got '{raw}'")),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_and_absolute() {
        let config = WorkerConfig::with_origin("https://diggo.test").unwrap();
        assert_eq!(
            config.resolve("/offline.html").unwrap().as_str(),
            "https://diggo.test/offline.html"
        );
        let cdn = config
            .resolve("https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.4.0/css/all.min.css")
            .unwrap();
        assert_eq!(cdn.host_str(), Some("cdnjs.cloudflare.com"));
    }

    #[test]
    fn test_defaults_match_portal_constants() {
        let config = WorkerConfig::default();
        assert_eq!(config.cache_name, "diggo-ocr-v1");
        assert_eq!(config.precache.len(), PRECACHE_RESOURCES.len());
        assert_eq!(config.fetch_timeout, Duration::from_secs(10));
    }
}
