use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    error::DraftError,
    local_store::{LocalStore, DRAFT_KEY},
};

/// Saved form values, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftSnapshot {
    pub fields: BTreeMap<String, String>,
}

impl DraftSnapshot {
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The single saved draft. Independent of the wizard's step state; nothing
/// expires it.
#[derive(Clone)]
pub struct DraftStore {
    store: Arc<LocalStore>,
}

impl DraftStore {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    /// Overwrites any earlier draft.
    pub fn save(&self, snapshot: &DraftSnapshot) -> Result<(), DraftError> {
        let serialized = serde_json::to_string(snapshot)
            .map_err(|err| DraftError::Storage(anyhow::Error::new(err)))?;
        self.store.set(DRAFT_KEY, serialized)?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<DraftSnapshot>, DraftError> {
        match self.store.get(DRAFT_KEY) {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|err| DraftError::Corrupt(err.to_string())),
            None => Ok(None),
        }
    }

    pub fn exists(&self) -> bool {
        self.store.contains(DRAFT_KEY)
    }

    pub fn clear(&self) -> Result<(), DraftError> {
        self.store.remove(DRAFT_KEY)?;
        Ok(())
    }
}
