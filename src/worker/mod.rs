//! The portal's offline worker: precaching, versioned cache eviction, fetch
//! routing, push notifications and background sync of queued submissions.
//!
//! A [`ServiceWorker`] is driven by the host the same way a browser drives
//! one: `install`, then `activate`, then one `handle_*` call per event.

pub mod cache;
pub mod fetch;
pub mod http;
pub mod lifecycle;
pub mod messages;
pub mod network;
pub mod push;
pub mod sync;

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;
use url::Url;

use crate::{config::WorkerConfig, db::Database, error::WorkerError};

pub use cache::{ActivationReport, CacheManager};
pub use fetch::{FetchOutcome, RoutePolicy};
pub use http::{Request, RequestMethod, Response, ResponseType};
pub use lifecycle::{Lifecycle, WorkerState};
pub use messages::WorkerMessage;
pub use network::{HttpNetwork, Network};
pub use push::{ClickAction, ClientWindow, Notification};
pub use sync::{AppointmentQueue, ReplayFailure, ReplayReport};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

pub struct ServiceWorker<N: Network> {
    config: Arc<WorkerConfig>,
    cache: CacheManager,
    network: Arc<N>,
    queue: AppointmentQueue,
    lifecycle: Mutex<Lifecycle>,
    background: TaskTracker,
    replay_lock: Mutex<()>,
}

impl<N: Network> ServiceWorker<N> {
    pub fn new(config: WorkerConfig, db: Database, network: N) -> Self {
        let cache = CacheManager::new(db.clone(), &config.cache_name);
        Self {
            config: Arc::new(config),
            cache,
            network: Arc::new(network),
            queue: AppointmentQueue::new(db),
            lifecycle: Mutex::new(Lifecycle::default()),
            background: TaskTracker::new(),
            replay_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn queue(&self) -> &AppointmentQueue {
        &self.queue
    }

    pub async fn state(&self) -> WorkerState {
        self.lifecycle.lock().await.state()
    }

    pub async fn clients_claimed(&self) -> bool {
        self.lifecycle.lock().await.clients_claimed()
    }

    /// Precaches the manifest. The worker reports `Installed` only after the
    /// whole batch is committed. When the batch fails but an earlier install
    /// already committed this generation, the stored copy is kept and the
    /// worker still becomes `Installed`; otherwise it is left `Redundant`
    /// with nothing stored.
    ///
    /// Returns the number of resources held by the current generation.
    pub async fn install(&self) -> Result<usize, WorkerError> {
        self.lifecycle
            .lock()
            .await
            .transition(WorkerState::Installing)?;
        log_info!("installing into cache {}", self.cache.cache_name());

        let result = match self.resolve_all(&self.config.precache) {
            Ok(urls) => {
                self.cache
                    .add_all(Arc::clone(&self.network), urls, self.config.fetch_timeout)
                    .await
            }
            Err(err) => Err(err),
        };

        let result = match result {
            Ok(count) => Ok(count),
            Err(err) => match self.stored_entry_count().await {
                Some(stored) => {
                    log_warn!(
                        "install failed ({}), keeping {} stored resources of {}",
                        err,
                        stored,
                        self.cache.cache_name()
                    );
                    Ok(stored)
                }
                None => Err(err),
            },
        };

        let mut lifecycle = self.lifecycle.lock().await;
        match result {
            Ok(count) => {
                lifecycle.transition(WorkerState::Installed)?;
                lifecycle.skip_waiting();
                log_info!("install complete, {} resources available", count);
                Ok(count)
            }
            Err(err) => {
                lifecycle.transition(WorkerState::Redundant)?;
                log_error!("install failed: {}", err);
                Err(err)
            }
        }
    }

    /// True once installed with skip-waiting requested.
    pub async fn is_ready_to_activate(&self) -> bool {
        self.lifecycle.lock().await.is_ready_to_activate()
    }

    /// Evicts stale cache generations and takes control of open clients.
    pub async fn activate(&self) -> Result<ActivationReport, WorkerError> {
        self.lifecycle
            .lock()
            .await
            .transition(WorkerState::Activating)?;

        let result = self.cache.activate().await;

        let mut lifecycle = self.lifecycle.lock().await;
        match result {
            Ok(report) => {
                lifecycle.transition(WorkerState::Activated)?;
                lifecycle.claim_clients()?;
                log_info!(
                    "activated, {} stale caches deleted, {} cleanup failures",
                    report.deleted.len(),
                    report.failures.len()
                );
                Ok(report)
            }
            Err(err) => {
                lifecycle.transition(WorkerState::Redundant)?;
                log_error!("activation failed: {}", err);
                Err(err)
            }
        }
    }

    /// Waits for every background refresh spawned so far.
    pub async fn wait_for_background(&self) {
        self.background.close();
        self.background.wait().await;
        self.background.reopen();
    }

    /// Stops accepting background work and drains what is in flight.
    pub async fn shutdown(&self) {
        self.background.close();
        self.background.wait().await;
        log_info!("worker background tasks drained");
    }

    async fn stored_entry_count(&self) -> Option<usize> {
        match self.cache.is_stored().await {
            Ok(true) => {}
            Ok(false) => return None,
            Err(err) => {
                log_warn!("failed to look up stored cache: {:#}", err);
                return None;
            }
        }
        match self.cache.entry_count(self.cache.cache_name()).await {
            Ok(count) => usize::try_from(count).ok(),
            Err(err) => {
                log_warn!("failed to count stored cache entries: {:#}", err);
                None
            }
        }
    }

    fn resolve(&self, url: &str) -> Result<Url, WorkerError> {
        self.config
            .resolve(url)
            .map_err(|err| WorkerError::InvalidUrl {
                url: url.to_string(),
                reason: err.to_string(),
            })
    }

    fn resolve_all(&self, urls: &[String]) -> Result<Vec<Url>, WorkerError> {
        urls.iter().map(|url| self.resolve(url)).collect()
    }
}
