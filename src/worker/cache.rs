//! Named cache generations over the SQLite store.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::task::JoinSet;
use url::Url;

use crate::{
    db::{CachedAsset, Database},
    error::WorkerError,
};

use super::{
    http::{Request, Response},
    network::{fetch_with_timeout, Network},
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Outcome of evicting stale generations. Failures never abort activation.
#[derive(Debug, Default)]
pub struct ActivationReport {
    pub deleted: Vec<String>,
    pub failures: Vec<WorkerError>,
}

impl ActivationReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Handle to the current cache generation. Cheap to clone.
#[derive(Clone)]
pub struct CacheManager {
    db: Database,
    cache_name: Arc<str>,
}

impl CacheManager {
    pub fn new(db: Database, cache_name: &str) -> Self {
        Self {
            db,
            cache_name: Arc::from(cache_name),
        }
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// Fetches every URL concurrently and stores the responses in a single
    /// transaction. Any failed fetch or non-2xx reply aborts the whole batch
    /// and nothing is written.
    pub async fn add_all<N: Network>(
        &self,
        network: Arc<N>,
        urls: Vec<Url>,
        timeout: Duration,
    ) -> Result<usize, WorkerError> {
        let mut tasks = JoinSet::new();
        for (index, url) in urls.into_iter().enumerate() {
            let network = Arc::clone(&network);
            tasks.spawn(async move {
                let request = Request::get(url.as_str());
                let result = fetch_with_timeout(network.as_ref(), &request, timeout).await;
                (index, request, result)
            });
        }

        let mut fetched = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            let (index, request, result) = joined.map_err(|err| WorkerError::InstallFailure {
                url: "<unknown>".into(),
                reason: format!("fetch task failed: {err}"),
            })?;

            let response = match result {
                Ok(response) if response.ok() => response,
                Ok(response) => {
                    return Err(WorkerError::InstallFailure {
                        url: request.url,
                        reason: format!("HTTP {} {}", response.status, response.status_text),
                    });
                }
                Err(err) => {
                    return Err(WorkerError::InstallFailure {
                        url: request.url,
                        reason: err.to_string(),
                    });
                }
            };

            fetched.push((index, CachedAsset::capture(&self.cache_name, &request, &response)));
        }

        fetched.sort_by_key(|(index, _)| *index);
        let assets: Vec<CachedAsset> = fetched.into_iter().map(|(_, asset)| asset).collect();
        let count = assets.len();

        self.db.put_cache_entries(&self.cache_name, assets).await?;
        log_info!("cached {} resources into {}", count, self.cache_name);
        Ok(count)
    }

    /// Deletes every generation other than the current one. Each deletion is
    /// independent; failures are collected and logged.
    pub async fn activate(&self) -> Result<ActivationReport, WorkerError> {
        let names = self.db.cache_names().await?;
        let mut report = ActivationReport::default();

        for name in names {
            if name == *self.cache_name {
                continue;
            }
            match self.db.delete_cache(&name).await {
                Ok(_) => {
                    log_info!("deleted stale cache {}", name);
                    report.deleted.push(name);
                }
                Err(err) => {
                    log_warn!("failed to delete stale cache {}: {:#}", name, err);
                    report.failures.push(WorkerError::ActivationCleanupFailure {
                        cache_name: name,
                        reason: format!("{err:#}"),
                    });
                }
            }
        }

        Ok(report)
    }

    pub async fn put(&self, request: &Request, response: &Response) -> Result<()> {
        let asset = CachedAsset::capture(&self.cache_name, request, response);
        self.db.put_cache_entry(&asset).await
    }

    /// Exact-request lookup. `None` is a cache miss.
    pub async fn match_request(&self, request: &Request) -> Result<Option<Response>> {
        let asset = self
            .db
            .match_cache_entry(&self.cache_name, &request.cache_key())
            .await?;
        Ok(asset.map(CachedAsset::into_response))
    }

    /// Whether an earlier install already committed the current generation.
    pub async fn is_stored(&self) -> Result<bool> {
        let names = self.db.cache_names().await?;
        Ok(names.iter().any(|name| name.as_str() == &*self.cache_name))
    }

    pub async fn cache_names(&self) -> Result<Vec<String>> {
        self.db.cache_names().await
    }

    pub async fn entry_count(&self, cache_name: &str) -> Result<u64> {
        self.db.count_cache_entries(cache_name).await
    }
}
