//! Queued appointment submissions.
//!
//! A record is created `Pending` and moves to `Synced` exactly once, when the
//! submission endpoint accepts its payload. Synced records are kept as an
//! audit trail; nothing prunes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum AppointmentStatus {
    Pending,
    Synced,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Synced => "synced",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingAppointment {
    pub id: String,
    /// Opaque form data, posted verbatim to the submission endpoint.
    pub payload: serde_json::Value,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
    pub synced_at: Option<DateTime<Utc>>,
}

impl PendingAppointment {
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            status: AppointmentStatus::Pending,
            created_at: Utc::now(),
            synced_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == AppointmentStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub pending: u64,
    pub synced: u64,
}
