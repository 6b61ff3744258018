//! Deferred appointment submissions and their background replay.

use chrono::Utc;
use serde::Serialize;

use crate::{
    db::{models::StatusCounts, Database, PendingAppointment},
    error::WorkerError,
};

use super::{
    http::Request,
    network::{fetch_with_timeout, Network},
    ServiceWorker,
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Durable queue of submissions waiting for the network.
#[derive(Clone)]
pub struct AppointmentQueue {
    db: Database,
}

impl AppointmentQueue {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn enqueue(&self, payload: serde_json::Value) -> anyhow::Result<PendingAppointment> {
        let record = PendingAppointment::new(payload);
        self.db.insert_appointment(&record).await?;
        Ok(record)
    }

    pub async fn list_pending(&self) -> anyhow::Result<Vec<PendingAppointment>> {
        self.db.list_pending_appointments().await
    }

    /// Absent or already-synced ids succeed without effect.
    pub async fn mark_synced(&self, id: &str) -> anyhow::Result<()> {
        self.db.mark_appointment_synced(id, Utc::now()).await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> anyhow::Result<Option<PendingAppointment>> {
        self.db.get_appointment(id).await
    }

    pub async fn count_by_status(&self) -> anyhow::Result<StatusCounts> {
        self.db.count_appointments_by_status().await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayFailure {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub attempted: usize,
    pub synced: Vec<String>,
    pub failed: Vec<ReplayFailure>,
}

impl ReplayReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl<N: Network> ServiceWorker<N> {
    /// Runs a replay when `tag` is the appointment sync tag; other tags are ignored.
    pub async fn handle_sync(&self, tag: &str) -> Result<Option<ReplayReport>, WorkerError> {
        if tag != self.config.sync_tag {
            log_warn!("ignoring unknown sync tag {}", tag);
            return Ok(None);
        }
        self.replay_pending().await.map(Some)
    }

    /// Posts every pending record to the submission endpoint. A failing
    /// record stays pending and does not stop the others. Overlapping
    /// triggers run one after another.
    pub async fn replay_pending(&self) -> Result<ReplayReport, WorkerError> {
        let _serial = self.replay_lock.lock().await;

        let endpoint = self.resolve(&self.config.submission_endpoint)?;
        let pending = self.queue.list_pending().await?;
        let mut report = ReplayReport {
            attempted: pending.len(),
            ..ReplayReport::default()
        };

        for appointment in pending {
            let request = Request::post_json(endpoint.as_str(), &appointment.payload);
            let outcome =
                fetch_with_timeout(self.network.as_ref(), &request, self.config.fetch_timeout).await;

            let failure = match outcome {
                Ok(response) if response.ok() => match self.queue.mark_synced(&appointment.id).await {
                    Ok(()) => None,
                    Err(err) => Some(format!("accepted but not marked synced: {err:#}")),
                },
                Ok(response) => Some(format!("HTTP {} {}", response.status, response.status_text)),
                Err(err) => Some(err.to_string()),
            };

            match failure {
                None => report.synced.push(appointment.id),
                Some(reason) => {
                    log_warn!("appointment {} not synced: {}", appointment.id, reason);
                    report.failed.push(ReplayFailure {
                        id: appointment.id,
                        reason,
                    });
                }
            }
        }

        log_info!(
            "sync finished: {} attempted, {} synced, {} failed",
            report.attempted,
            report.synced.len(),
            report.failed.len()
        );
        Ok(report)
    }
}
