//! The 4-step OCR appointment wizard: upload, recognize, review, submit.

pub mod controller;
pub mod draft;
pub mod intake;
pub mod recognition;
pub mod state;

pub use controller::{Confirmation, Notice, NoticeLevel, WizardController, WizardEvent};
pub use draft::{DraftSnapshot, DraftStore};
pub use intake::{format_file_size, FileUpload};
pub use recognition::{extract_fields, Recognizer};
pub use state::{
    FieldKey, FilePreview, Provenance, RecognitionOutcome, RecognizedField, SelectedFile,
    WizardState, WizardStep,
};
