//! Control messages posted to the worker by pages.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::WorkerError;

use super::{network::Network, ServiceWorker};

const ENABLE_LOGS: bool = true;

use crate::log_info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    SkipWaiting,
    CacheResources { urls: Vec<String> },
}

impl WorkerMessage {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

impl<N: Network> ServiceWorker<N> {
    pub async fn handle_message(&self, message: WorkerMessage) -> Result<(), WorkerError> {
        match message {
            WorkerMessage::SkipWaiting => {
                let ready = {
                    let mut lifecycle = self.lifecycle.lock().await;
                    lifecycle.skip_waiting();
                    lifecycle.is_ready_to_activate()
                };
                if ready {
                    log_info!("skip waiting requested, activating now");
                    self.activate().await?;
                }
                Ok(())
            }
            WorkerMessage::CacheResources { urls } => {
                let resolved = self.resolve_all(&urls)?;
                let count = self
                    .cache
                    .add_all(Arc::clone(&self.network), resolved, self.config.fetch_timeout)
                    .await?;
                log_info!("cached {} resources on request", count);
                Ok(())
            }
        }
    }
}
