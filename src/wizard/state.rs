use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::error::WizardError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WizardStep {
    Upload = 1,
    Recognize = 2,
    Review = 3,
    Submit = 4,
}

impl WizardStep {
    pub const ALL: [WizardStep; 4] = [
        WizardStep::Upload,
        WizardStep::Recognize,
        WizardStep::Review,
        WizardStep::Submit,
    ];

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(WizardStep::Upload),
            2 => Some(WizardStep::Recognize),
            3 => Some(WizardStep::Review),
            4 => Some(WizardStep::Submit),
            _ => None,
        }
    }

    pub fn next(self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }

    pub fn previous(self) -> Option<Self> {
        Self::from_number(self.number().saturating_sub(1))
    }

    fn index(self) -> usize {
        usize::from(self.number() - 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKey {
    Name,
    IdNumber,
    Phone,
    Date,
    Doctor,
    Diagnosis,
    Facility,
}

impl FieldKey {
    pub const ALL: [FieldKey; 7] = [
        FieldKey::Name,
        FieldKey::IdNumber,
        FieldKey::Phone,
        FieldKey::Date,
        FieldKey::Doctor,
        FieldKey::Diagnosis,
        FieldKey::Facility,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKey::Name => "name",
            FieldKey::IdNumber => "idNumber",
            FieldKey::Phone => "phone",
            FieldKey::Date => "date",
            FieldKey::Doctor => "doctor",
            FieldKey::Diagnosis => "diagnosis",
            FieldKey::Facility => "facility",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Provenance {
    AutoFilled,
    UserEdited,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizedField {
    pub value: String,
    pub provenance: Provenance,
}

impl RecognizedField {
    pub fn is_auto(&self) -> bool {
        self.provenance == Provenance::AutoFilled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecognitionOutcome {
    NotRun,
    Recognized,
    /// Recognition ran and matched nothing; shown instead of an empty grid.
    NothingRecognized,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum FilePreview {
    Image {
        data_url: String,
        width: u32,
        height: u32,
    },
    PdfIcon,
    Document,
    /// Accepted file whose content could not be rendered.
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedFile {
    pub name: String,
    pub media_type: String,
    pub size: u64,
    #[serde(skip)]
    pub bytes: Arc<[u8]>,
    pub preview: FilePreview,
    /// Display rotation in degrees, a multiple of 90.
    pub rotation: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardState {
    pub current_step: WizardStep,
    completed: [bool; 4],
    pub selected_file: Option<SelectedFile>,
    pub recognized_fields: BTreeMap<FieldKey, RecognizedField>,
    pub recognition: RecognitionOutcome,
}

impl Default for WizardState {
    fn default() -> Self {
        Self {
            current_step: WizardStep::Upload,
            completed: [false; 4],
            selected_file: None,
            recognized_fields: BTreeMap::new(),
            recognition: RecognitionOutcome::NotRun,
        }
    }
}

const REQUIRED_REVIEW_FIELDS: [FieldKey; 3] = [FieldKey::Name, FieldKey::Phone, FieldKey::Date];

impl WizardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_completed(&self, step: WizardStep) -> bool {
        self.completed[step.index()]
    }

    pub fn field(&self, key: FieldKey) -> Option<&RecognizedField> {
        self.recognized_fields.get(&key)
    }

    pub fn validate(&self, step: WizardStep) -> Result<(), WizardError> {
        let failure = |reason: &str| WizardError::ValidationFailure {
            step,
            reason: reason.to_string(),
        };

        match step {
            WizardStep::Upload if self.selected_file.is_none() => Err(failure("請先上傳文件")),
            WizardStep::Recognize if self.recognition == RecognitionOutcome::NotRun => {
                Err(failure("請先識別文件內容"))
            }
            WizardStep::Review => {
                let missing: Vec<&str> = REQUIRED_REVIEW_FIELDS
                    .iter()
                    .filter(|key| {
                        self.field(**key)
                            .map(|field| field.value.trim().is_empty())
                            .unwrap_or(true)
                    })
                    .map(FieldKey::as_str)
                    .collect();
                if missing.is_empty() {
                    Ok(())
                } else {
                    Err(failure(&format!("missing {}", missing.join(", "))))
                }
            }
            _ => Ok(()),
        }
    }

    /// Validates the current step, marks it completed and moves forward.
    /// Nothing changes when validation fails.
    pub fn advance(&mut self) -> Result<WizardStep, WizardError> {
        let current = self.current_step;
        let Some(next) = current.next() else {
            return Err(WizardError::ValidationFailure {
                step: current,
                reason: "the last step is finished by submitting".into(),
            });
        };
        self.validate(current)?;
        self.completed[current.index()] = true;
        self.show(next);
        Ok(next)
    }

    /// Moves one step back; a no-op on the first step.
    pub fn retreat(&mut self) -> WizardStep {
        if let Some(previous) = self.current_step.previous() {
            self.show(previous);
        }
        self.current_step
    }

    /// Jumps to `target`, which must not be ahead of the current step.
    pub fn navigate_to(&mut self, target: WizardStep) -> Result<WizardStep, WizardError> {
        if target > self.current_step {
            return Err(WizardError::StepNotReachable { target });
        }
        self.show(target);
        Ok(target)
    }

    /// Steps before `target` read as completed and steps after it do not.
    /// The target keeps its own flag.
    fn show(&mut self, target: WizardStep) {
        for step in WizardStep::ALL {
            if step < target {
                self.completed[step.index()] = true;
            } else if step > target {
                self.completed[step.index()] = false;
            }
        }
        self.current_step = target;
    }

    pub fn select_file(&mut self, file: SelectedFile) {
        self.selected_file = Some(file);
    }

    /// Drops the file. Past the upload step this also sends the wizard back
    /// to it, since the upload no longer validates.
    pub fn remove_file(&mut self) -> Option<SelectedFile> {
        let removed = self.selected_file.take();
        if removed.is_some() {
            self.completed[WizardStep::Upload.index()] = false;
            self.show(WizardStep::Upload);
        }
        removed
    }

    pub fn rotate_preview(&mut self) -> Option<u16> {
        let file = self.selected_file.as_mut()?;
        file.rotation = (file.rotation + 90) % 360;
        Some(file.rotation)
    }

    /// Stores a recognition run. Matched keys are overwritten as auto-filled,
    /// including keys the user had edited; other keys are kept.
    pub fn apply_recognition(&mut self, fields: BTreeMap<FieldKey, String>) -> usize {
        let matched = fields.len();
        for (key, value) in fields {
            self.recognized_fields.insert(
                key,
                RecognizedField {
                    value,
                    provenance: Provenance::AutoFilled,
                },
            );
        }
        self.recognition = if matched == 0 {
            RecognitionOutcome::NothingRecognized
        } else {
            RecognitionOutcome::Recognized
        };
        matched
    }

    /// A user keystroke. Auto-filled provenance is lost for good.
    pub fn edit_field(&mut self, key: FieldKey, value: impl Into<String>) {
        self.recognized_fields.insert(
            key,
            RecognizedField {
                value: value.into(),
                provenance: Provenance::UserEdited,
            },
        );
    }

    /// Programmatic fill. Only an auto-filled field receiving its own value
    /// stays auto-filled; everything else is recorded as user-edited.
    pub fn populate_field(&mut self, key: FieldKey, value: impl Into<String>) {
        let value = value.into();
        let provenance = match self.recognized_fields.get(&key) {
            Some(existing) if existing.is_auto() && existing.value == value => Provenance::AutoFilled,
            _ => Provenance::UserEdited,
        };
        self.recognized_fields
            .insert(key, RecognizedField { value, provenance });
    }

    pub fn field_values(&self) -> BTreeMap<String, String> {
        self.recognized_fields
            .iter()
            .map(|(key, field)| (key.as_str().to_string(), field.value.clone()))
            .collect()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file() -> SelectedFile {
        SelectedFile {
            name: "referral.jpg".into(),
            media_type: "image/jpeg".into(),
            size: 1024,
            bytes: Arc::from(vec![0u8; 4]),
            preview: FilePreview::Placeholder,
            rotation: 0,
        }
    }

    fn ready_for_review() -> WizardState {
        let mut state = WizardState::new();
        state.select_file(file());
        state.advance().unwrap();
        state.apply_recognition(BTreeMap::from([
            (FieldKey::Name, "陳大文".to_string()),
            (FieldKey::Phone, "91234567".to_string()),
            (FieldKey::Date, "2025-03-01".to_string()),
        ]));
        state.advance().unwrap();
        state
    }

    #[test]
    fn test_step_numbers() {
        assert_eq!(WizardStep::Upload.number(), 1);
        assert_eq!(WizardStep::Submit.next(), None);
        assert_eq!(WizardStep::Upload.previous(), None);
        assert_eq!(WizardStep::from_number(3), Some(WizardStep::Review));
    }

    #[test]
    fn test_advance_requires_file() {
        let mut state = WizardState::new();
        let result = state.advance();
        assert!(matches!(
            result,
            Err(WizardError::ValidationFailure {
                step: WizardStep::Upload,
                ..
            })
        ));
        assert_eq!(state.current_step, WizardStep::Upload);
        assert!(!state.is_completed(WizardStep::Upload));
    }

    #[test]
    fn test_recognize_requires_a_run() {
        let mut state = WizardState::new();
        state.select_file(file());
        state.advance().unwrap();
        assert!(state.advance().is_err());

        state.apply_recognition(BTreeMap::new());
        assert_eq!(state.recognition, RecognitionOutcome::NothingRecognized);
        assert_eq!(state.advance().unwrap(), WizardStep::Review);
    }

    #[test]
    fn test_review_requires_name_phone_date() {
        let mut state = ready_for_review();
        state.edit_field(FieldKey::Phone, "  ");
        let err = state.advance().unwrap_err();
        assert!(err.to_string().contains("phone"));

        state.edit_field(FieldKey::Phone, "91234567");
        assert_eq!(state.advance().unwrap(), WizardStep::Submit);
        assert!(WizardStep::ALL[..3].iter().all(|s| state.is_completed(*s)));
    }

    #[test]
    fn test_advance_at_submit_is_rejected() {
        let mut state = ready_for_review();
        state.advance().unwrap();
        assert!(matches!(
            state.advance(),
            Err(WizardError::ValidationFailure {
                step: WizardStep::Submit,
                ..
            })
        ));
        assert_eq!(state.current_step, WizardStep::Submit);
    }

    #[test]
    fn test_navigate_back_and_forward_jump() {
        let mut state = ready_for_review();
        assert!(matches!(
            state.navigate_to(WizardStep::Submit),
            Err(WizardError::StepNotReachable { .. })
        ));

        state.navigate_to(WizardStep::Upload).unwrap();
        assert_eq!(state.current_step, WizardStep::Upload);
        assert!(state.is_completed(WizardStep::Upload));
        assert!(!state.is_completed(WizardStep::Recognize));
    }

    #[test]
    fn test_retreat_stops_at_upload() {
        let mut state = WizardState::new();
        assert_eq!(state.retreat(), WizardStep::Upload);
    }

    #[test]
    fn test_populate_never_restores_auto() {
        let mut state = WizardState::new();
        state.apply_recognition(BTreeMap::from([(FieldKey::Name, "陳大文".to_string())]));
        state.populate_field(FieldKey::Name, "陳大文");
        assert!(state.field(FieldKey::Name).unwrap().is_auto());

        state.edit_field(FieldKey::Name, "陳小文");
        state.populate_field(FieldKey::Name, "陳大文");
        assert_eq!(
            state.field(FieldKey::Name).unwrap().provenance,
            Provenance::UserEdited
        );

        state.apply_recognition(BTreeMap::from([(FieldKey::Name, "陳大文".to_string())]));
        assert!(state.field(FieldKey::Name).unwrap().is_auto());
    }

    #[test]
    fn test_remove_file_returns_to_upload() {
        let mut state = ready_for_review();
        assert!(state.remove_file().is_some());
        assert_eq!(state.current_step, WizardStep::Upload);
        assert!(!state.is_completed(WizardStep::Upload));
        assert!(state.remove_file().is_none());
    }

    #[test]
    fn test_rotate_cycles() {
        let mut state = WizardState::new();
        assert_eq!(state.rotate_preview(), None);
        state.select_file(file());
        for expected in [90, 180, 270, 0] {
            assert_eq!(state.rotate_preview(), Some(expected));
        }
    }
}
