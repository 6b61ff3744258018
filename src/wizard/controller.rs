use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use serde_json::json;
use tokio::sync::{broadcast, mpsc, Mutex};

use crate::{
    db::PendingAppointment,
    error::{DraftError, IntakeError, WizardError},
    worker::AppointmentQueue,
};

use super::{
    draft::{DraftSnapshot, DraftStore},
    intake::{self, format_file_size, FileUpload},
    recognition::{extract_fields, Recognizer},
    state::{FieldKey, SelectedFile, WizardState, WizardStep},
};

const EVENT_CAPACITY: usize = 64;
const NOTICE_AUTO_DISMISS: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    /// `None` keeps the notice up until the user dismisses it.
    pub auto_dismiss: Option<Duration>,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        let auto_dismiss = match level {
            NoticeLevel::Error => None,
            _ => Some(NOTICE_AUTO_DISMISS),
        };
        Self {
            level,
            message: message.into(),
            auto_dismiss,
        }
    }
}

#[derive(Debug, Clone)]
pub enum WizardEvent {
    StateChanged(WizardState),
    Notice(Notice),
}

/// Caller's answer to the reset prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Declined,
}

/// Held while a step transition or long-running step is in progress.
struct TransitionTicket(Arc<AtomicBool>);

impl TransitionTicket {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self, WizardError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(Arc::clone(flag)))
            .map_err(|_| WizardError::TransitionInFlight)
    }
}

impl Drop for TransitionTicket {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct WizardController {
    state: Arc<Mutex<WizardState>>,
    in_flight: Arc<AtomicBool>,
    events: broadcast::Sender<WizardEvent>,
    drafts: DraftStore,
    queue: AppointmentQueue,
    sync_requests: Option<mpsc::UnboundedSender<String>>,
    sync_tag: String,
}

impl WizardController {
    pub fn new(drafts: DraftStore, queue: AppointmentQueue) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(WizardState::new())),
            in_flight: Arc::new(AtomicBool::new(false)),
            events,
            drafts,
            queue,
            sync_requests: None,
            sync_tag: crate::config::SYNC_TAG.to_string(),
        }
    }

    /// Submissions will ask for a background sync on `sender` with `tag`.
    pub fn with_sync_requests(mut self, sender: mpsc::UnboundedSender<String>, tag: &str) -> Self {
        self.sync_requests = Some(sender);
        self.sync_tag = tag.to_string();
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WizardEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> WizardState {
        self.state.lock().await.clone()
    }

    pub async fn select_file(&self, upload: FileUpload) -> Result<SelectedFile, WizardError> {
        let _ticket = TransitionTicket::acquire(&self.in_flight)?;

        let file = match intake::accept(upload).await {
            Ok(file) => file,
            Err(err) => {
                let message = match &err {
                    IntakeError::UnsupportedFile { .. } => "不支援的文件格式",
                    IntakeError::FileTooLarge { .. } => "文件大小超過10MB限制",
                };
                self.notify(NoticeLevel::Error, message);
                return Err(err.into());
            }
        };

        let mut state = self.state.lock().await;
        state.select_file(file.clone());
        info!(
            "file selected: {} ({})",
            file.name,
            format_file_size(file.size)
        );
        self.publish(&state);
        self.notify(NoticeLevel::Success, "文件上傳成功");
        Ok(file)
    }

    pub async fn remove_file(&self) -> Option<SelectedFile> {
        let mut state = self.state.lock().await;
        let removed = state.remove_file();
        if removed.is_some() {
            self.publish(&state);
            self.notify(NoticeLevel::Success, "文件已刪除");
        }
        removed
    }

    pub async fn rotate_preview(&self) -> Option<u16> {
        let mut state = self.state.lock().await;
        let rotation = state.rotate_preview()?;
        self.publish(&state);
        self.notify(NoticeLevel::Success, "圖片已旋轉");
        Some(rotation)
    }

    pub async fn advance(&self) -> Result<WizardStep, WizardError> {
        let _ticket = TransitionTicket::acquire(&self.in_flight)?;

        let (from, values) = {
            let mut state = self.state.lock().await;
            let from = state.current_step;
            if let Err(err) = state.advance() {
                if let WizardError::ValidationFailure { reason, .. } = &err {
                    self.notify(NoticeLevel::Warning, reason.clone());
                }
                return Err(err);
            }
            self.publish(&state);
            (from, state.field_values())
        };

        // Review data is checkpointed on the way to the final step.
        if from == WizardStep::Review {
            if let Err(err) = self.drafts.save(&DraftSnapshot::new(values)) {
                warn!("failed to checkpoint draft: {err}");
                self.notify(NoticeLevel::Warning, "草稿未能儲存");
            }
        }

        let to = from.next().unwrap_or(from);
        info!("wizard advanced from step {} to {}", from.number(), to.number());
        Ok(to)
    }

    pub async fn retreat(&self) -> Result<WizardStep, WizardError> {
        let _ticket = TransitionTicket::acquire(&self.in_flight)?;
        let mut state = self.state.lock().await;
        let step = state.retreat();
        self.publish(&state);
        Ok(step)
    }

    pub async fn navigate_to(&self, target: WizardStep) -> Result<WizardStep, WizardError> {
        let _ticket = TransitionTicket::acquire(&self.in_flight)?;
        let mut state = self.state.lock().await;
        let step = state.navigate_to(target)?;
        self.publish(&state);
        Ok(step)
    }

    /// Runs the extraction rules over already-recognized text.
    pub async fn apply_recognition(&self, text: &str) -> usize {
        let fields = extract_fields(text);
        let mut state = self.state.lock().await;
        let matched = state.apply_recognition(fields);
        self.publish(&state);
        if matched == 0 {
            self.notify(NoticeLevel::Info, "未能識別任何資料");
        } else {
            self.notify(NoticeLevel::Success, format!("已識別 {matched} 項資料"));
        }
        matched
    }

    /// Sends the selected file through `recognizer`, then extracts fields.
    /// Counts as an in-flight transition for its whole duration.
    pub async fn recognize_with<R: Recognizer>(&self, recognizer: &R) -> Result<usize, WizardError> {
        let _ticket = TransitionTicket::acquire(&self.in_flight)?;

        let file = self.state.lock().await.selected_file.clone();
        let Some(file) = file else {
            self.notify(NoticeLevel::Warning, "請先上傳文件");
            return Err(WizardError::ValidationFailure {
                step: WizardStep::Upload,
                reason: "請先上傳文件".into(),
            });
        };

        let text = match recognizer.recognize(&file).await {
            Ok(text) => text,
            Err(err) => {
                warn!("recognition failed for {}: {err:#}", file.name);
                self.notify(NoticeLevel::Error, "文件識別失敗");
                return Err(WizardError::Recognition(format!("{err:#}")));
            }
        };

        Ok(self.apply_recognition(&text).await)
    }

    pub async fn edit_field(&self, key: FieldKey, value: impl Into<String>) {
        let mut state = self.state.lock().await;
        state.edit_field(key, value);
        self.publish(&state);
    }

    pub async fn populate_field(&self, key: FieldKey, value: impl Into<String>) {
        let mut state = self.state.lock().await;
        state.populate_field(key, value);
        self.publish(&state);
    }

    pub async fn save_draft(&self) -> Result<DraftSnapshot, WizardError> {
        let snapshot = DraftSnapshot::new(self.state.lock().await.field_values());
        self.drafts.save(&snapshot)?;
        self.notify(NoticeLevel::Success, "草稿已儲存");
        Ok(snapshot)
    }

    /// Restores a saved draft into the form. Restored values never count as
    /// recognized. A corrupt draft leaves the wizard untouched.
    pub async fn load_draft(&self) -> Result<Option<DraftSnapshot>, WizardError> {
        let snapshot = match self.drafts.load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Ok(None),
            Err(err) => {
                if let DraftError::Corrupt(reason) = &err {
                    warn!("saved draft is corrupt: {reason}");
                    self.notify(NoticeLevel::Error, "草稿已損壞，無法恢復");
                }
                return Err(err.into());
            }
        };

        let mut state = self.state.lock().await;
        for (name, value) in &snapshot.fields {
            match FieldKey::parse(name) {
                Some(key) => state.populate_field(key, value.clone()),
                None => warn!("ignoring unknown draft field {name}"),
            }
        }
        self.publish(&state);
        Ok(Some(snapshot))
    }

    pub fn has_draft(&self) -> bool {
        self.drafts.exists()
    }

    pub fn clear_draft(&self) -> Result<(), WizardError> {
        Ok(self.drafts.clear()?)
    }

    pub async fn reset(&self, confirmation: Confirmation) -> Result<(), WizardError> {
        if confirmation != Confirmation::Confirmed {
            return Err(WizardError::ResetDeclined);
        }
        let _ticket = TransitionTicket::acquire(&self.in_flight)?;
        let mut state = self.state.lock().await;
        state.reset();
        self.publish(&state);
        info!("wizard reset");
        Ok(())
    }

    /// Queues the appointment for background delivery and starts over.
    pub async fn submit(&self) -> Result<PendingAppointment, WizardError> {
        let _ticket = TransitionTicket::acquire(&self.in_flight)?;
        let mut state = self.state.lock().await;

        if state.current_step != WizardStep::Submit {
            return Err(WizardError::ValidationFailure {
                step: state.current_step,
                reason: "not at the submit step".into(),
            });
        }
        if let Err(err) = state.validate(WizardStep::Review) {
            if let WizardError::ValidationFailure { reason, .. } = &err {
                self.notify(NoticeLevel::Warning, reason.clone());
            }
            return Err(err);
        }

        let record = self.queue.enqueue(build_payload(&state)).await?;
        info!("appointment {} queued for sync", record.id);

        if let Some(sender) = &self.sync_requests {
            if sender.send(self.sync_tag.clone()).is_err() {
                warn!("sync requester is gone; appointment {} waits for the next interval", record.id);
            }
        }
        if let Err(err) = self.drafts.clear() {
            warn!("failed to clear draft after submit: {err}");
        }

        state.reset();
        self.publish(&state);
        self.notify(NoticeLevel::Success, "預約已提交");
        Ok(record)
    }

    fn publish(&self, state: &WizardState) {
        // No subscribers is fine.
        let _ = self.events.send(WizardEvent::StateChanged(state.clone()));
    }

    fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        let _ = self.events.send(WizardEvent::Notice(Notice::new(level, message)));
    }
}

fn build_payload(state: &WizardState) -> serde_json::Value {
    let file = state.selected_file.as_ref().map(|file| {
        json!({
            "name": file.name,
            "type": file.media_type,
            "size": file.size,
            "sizeLabel": format_file_size(file.size),
        })
    });
    json!({
        "fields": state.field_values(),
        "file": file,
        "submittedAt": Utc::now().to_rfc3339(),
    })
}
