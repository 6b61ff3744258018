//! Push payloads and notification clicks.

use serde::{Deserialize, Serialize};

use super::{network::Network, ServiceWorker};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

pub const DEFAULT_TITLE: &str = "DigGO OCR 預約系統";
pub const DEFAULT_BODY: &str = "您有新的通知";
pub const NOTIFICATION_ICON: &str = "/icons/icon-192.png";
pub const NOTIFICATION_BADGE: &str = "/icons/badge-72.png";
pub const VIBRATE_PATTERN: [u32; 3] = [200, 100, 200];
pub const DEFAULT_URL: &str = "/";

#[derive(Debug, Clone, Default, Deserialize)]
struct PushPayload {
    title: Option<String>,
    body: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    /// Page opened when the notification is clicked.
    pub url: String,
}

impl Notification {
    /// Builds the notification for a push message. Missing fields, an empty
    /// message and unparseable JSON all fall back to the defaults.
    pub fn from_push(data: Option<&[u8]>) -> Self {
        let payload = match data {
            Some(bytes) if !bytes.is_empty() => match serde_json::from_slice::<PushPayload>(bytes) {
                Ok(payload) => payload,
                Err(err) => {
                    log_warn!("malformed push payload, using defaults: {}", err);
                    PushPayload::default()
                }
            },
            _ => PushPayload::default(),
        };

        Self {
            title: non_empty(payload.title).unwrap_or_else(|| DEFAULT_TITLE.into()),
            body: non_empty(payload.body).unwrap_or_else(|| DEFAULT_BODY.into()),
            icon: NOTIFICATION_ICON.into(),
            badge: NOTIFICATION_BADGE.into(),
            vibrate: VIBRATE_PATTERN.to_vec(),
            url: non_empty(payload.url).unwrap_or_else(|| DEFAULT_URL.into()),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// An open window the worker can see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientWindow {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickAction {
    Focus(String),
    OpenWindow(String),
}

/// Focus the first window already showing `target`, otherwise open one.
pub fn resolve_click(target: &str, clients: &[ClientWindow]) -> ClickAction {
    clients
        .iter()
        .find(|client| client.url == target)
        .map(|client| ClickAction::Focus(client.id.clone()))
        .unwrap_or_else(|| ClickAction::OpenWindow(target.to_string()))
}

impl<N: Network> ServiceWorker<N> {
    pub fn handle_push(&self, data: Option<&[u8]>) -> Notification {
        let notification = Notification::from_push(data);
        log_debug!("push received: {}", notification.title);
        notification
    }

    /// Client URLs are absolute, so the notification target is resolved
    /// against the portal origin before comparing.
    pub fn handle_notification_click(
        &self,
        notification: &Notification,
        clients: &[ClientWindow],
    ) -> ClickAction {
        let target = self
            .config
            .resolve(&notification.url)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| notification.url.clone());
        resolve_click(&target, clients)
    }
}
