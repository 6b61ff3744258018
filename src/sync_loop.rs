use std::sync::Arc;

use tokio::{
    sync::mpsc,
    time::{Duration, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::worker::{Network, ServiceWorker};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

/// Replays queued submissions on every interval tick and whenever the wizard
/// asks for a sync, until cancelled. The first tick fires immediately.
pub async fn sync_loop<N: Network>(
    worker: Arc<ServiceWorker<N>>,
    mut requests: mpsc::UnboundedReceiver<String>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut requests_open = true;
    let sync_tag = worker.config().sync_tag.clone();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_sync(&worker, &sync_tag).await;
            }
            request = requests.recv(), if requests_open => {
                match request {
                    Some(tag) => run_sync(&worker, &tag).await,
                    None => requests_open = false,
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("sync loop shutting down");
                break;
            }
        }
    }
}

async fn run_sync<N: Network>(worker: &ServiceWorker<N>, tag: &str) {
    match worker.handle_sync(tag).await {
        Ok(Some(report)) if !report.is_complete() => {
            log_info!("{} appointments still pending after sync", report.failed.len());
        }
        Ok(_) => {}
        Err(err) => log_error!("background sync '{}' failed: {}", tag, err),
    }
}
