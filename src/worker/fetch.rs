//! Request routing: network-first for the API, cache-first with background
//! refresh for everything else, offline fallbacks when both are unavailable.

use std::{sync::Arc, time::Duration};

use crate::{config::WorkerConfig, error::NetworkError};

use super::{
    cache::CacheManager,
    http::{Request, RequestMethod, Response},
    network::{fetch_with_timeout, Network},
    ServiceWorker,
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutePolicy {
    /// Not intercepted; the platform performs the request itself.
    Passthrough,
    NetworkFirst,
    CacheFirst,
}

impl RoutePolicy {
    pub fn classify(request: &Request, config: &WorkerConfig) -> Self {
        if request.method != RequestMethod::Get || !request.is_http() {
            return RoutePolicy::Passthrough;
        }
        if request.url.contains(&config.api_marker) {
            RoutePolicy::NetworkFirst
        } else {
            RoutePolicy::CacheFirst
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Passthrough,
    Respond(Response),
    /// API request with neither network nor a cached copy.
    Failed(NetworkError),
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchOutcome::Respond(response) => Some(response),
            _ => None,
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchOutcome::Respond(response) => Some(response),
            _ => None,
        }
    }
}

impl<N: Network> ServiceWorker<N> {
    /// Never fails: every request resolves to a live, cached, fallback or
    /// synthetic response, or an explicit `Failed` outcome.
    pub async fn handle_fetch(&self, request: &Request) -> FetchOutcome {
        if !self.state().await.intercepts_fetches() {
            return FetchOutcome::Passthrough;
        }

        match RoutePolicy::classify(request, &self.config) {
            RoutePolicy::Passthrough => FetchOutcome::Passthrough,
            RoutePolicy::NetworkFirst => self.network_first(request).await,
            RoutePolicy::CacheFirst => FetchOutcome::Respond(self.cache_first(request).await),
        }
    }

    async fn network_first(&self, request: &Request) -> FetchOutcome {
        match fetch_with_timeout(self.network.as_ref(), request, self.config.fetch_timeout).await {
            Ok(response) => {
                if response.is_cacheable() {
                    if let Err(err) = self.cache.put(request, &response).await {
                        log_warn!("failed to cache {}: {:#}", request.url, err);
                    }
                }
                FetchOutcome::Respond(response)
            }
            Err(network_err) => match self.lookup(request).await {
                Some(cached) => {
                    log_debug!("serving cached {} after {}", request.url, network_err);
                    FetchOutcome::Respond(cached)
                }
                None => FetchOutcome::Failed(network_err),
            },
        }
    }

    async fn cache_first(&self, request: &Request) -> Response {
        if let Some(cached) = self.lookup(request).await {
            self.spawn_refresh(request.clone());
            return cached;
        }

        match fetch_with_timeout(self.network.as_ref(), request, self.config.fetch_timeout).await {
            Ok(response) => {
                if response.is_cacheable() {
                    if let Err(err) = self.cache.put(request, &response).await {
                        log_warn!("failed to cache {}: {:#}", request.url, err);
                    }
                }
                response
            }
            Err(err) => {
                log_debug!("network unavailable for {}: {}", request.url, err);
                self.offline_fallback(request).await
            }
        }
    }

    async fn offline_fallback(&self, request: &Request) -> Response {
        if request.accepts_html() {
            if let Ok(offline_url) = self.config.resolve(&self.config.offline_url) {
                if let Some(page) = self.lookup(&Request::get(offline_url.as_str())).await {
                    return page;
                }
            }
        }
        Response::network_unavailable()
    }

    /// Cache lookup where a storage failure counts as a miss.
    async fn lookup(&self, request: &Request) -> Option<Response> {
        match self.cache.match_request(request).await {
            Ok(hit) => hit,
            Err(err) => {
                log_warn!("cache lookup failed for {}: {:#}", request.url, err);
                None
            }
        }
    }

    fn spawn_refresh(&self, request: Request) {
        let network = Arc::clone(&self.network);
        let cache = self.cache.clone();
        let timeout = self.config.fetch_timeout;
        self.background
            .spawn(refresh(network, cache, request, timeout));
    }
}

/// Stale-while-revalidate update. Runs detached; every failure is swallowed.
async fn refresh<N: Network>(
    network: Arc<N>,
    cache: CacheManager,
    request: Request,
    timeout: Duration,
) {
    match fetch_with_timeout(network.as_ref(), &request, timeout).await {
        Ok(response) if response.is_cacheable() => {
            if let Err(err) = cache.put(&request, &response).await {
                log_debug!("background refresh of {} not stored: {:#}", request.url, err);
            }
        }
        Ok(response) => {
            log_debug!(
                "background refresh of {} skipped, status {}",
                request.url,
                response.status
            );
        }
        Err(err) => {
            log_debug!("background refresh of {} failed: {}", request.url, err);
        }
    }
}
