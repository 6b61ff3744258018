//! Error taxonomy shared by the worker and the wizard.
//!
//! Storage plumbing stays on `anyhow`; these enums are what callers match on.

use std::time::Duration;

use crate::wizard::WizardStep;

/// A network fetch that produced no response at all.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("network request failed: {0}")]
    Failed(String),
}

#[derive(thiserror::Error, Debug)]
pub enum WorkerError {
    /// A precache fetch failed; nothing from the attempt was stored.
    #[error("install aborted, could not cache {url}: {reason}")]
    InstallFailure { url: String, reason: String },

    /// A stale generation could not be deleted. Reported, never fatal.
    #[error("failed to delete stale cache {cache_name}: {reason}")]
    ActivationCleanupFailure { cache_name: String, reason: String },

    #[error("invalid worker state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        from: crate::worker::WorkerState,
        to: crate::worker::WorkerState,
    },

    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// File intake rejections. The wizard state is untouched when one of these is returned.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IntakeError {
    #[error("unsupported file type: {media_type}")]
    UnsupportedFile { media_type: String },

    #[error("file is {size} bytes, above the {limit} byte limit")]
    FileTooLarge { size: u64, limit: u64 },
}

#[derive(thiserror::Error, Debug)]
pub enum DraftError {
    #[error("saved draft is corrupt: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum WizardError {
    #[error("step {step:?} is not complete: {reason}")]
    ValidationFailure { step: WizardStep, reason: String },

    #[error("cannot jump forward to step {target:?}")]
    StepNotReachable { target: WizardStep },

    #[error("another step transition is already in progress")]
    TransitionInFlight,

    #[error("reset was not confirmed")]
    ResetDeclined,

    #[error(transparent)]
    Intake(#[from] IntakeError),

    #[error(transparent)]
    Draft(#[from] DraftError),

    #[error("recognition failed: {0}")]
    Recognition(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
