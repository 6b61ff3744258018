//! String key-value storage persisted as one JSON file, plus the typed
//! preferences the portal keeps in it.

use std::{
    collections::BTreeMap,
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

pub const USER_KEY: &str = "diggo-user";
pub const LANGUAGE_KEY: &str = "diggo-language";
pub const THEME_KEY: &str = "diggo-theme";
pub const DRAFT_KEY: &str = "diggo-ocr-draft";
pub const INSTALL_PROMPT_DISMISSED_KEY: &str = "installPromptDismissed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "zh-HK")]
    ZhHk,
    #[serde(rename = "en")]
    En,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::ZhHk => "zh-HK",
            Language::En => "en",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "zh-HK" => Some(Language::ZhHk),
            "en" => Some(Language::En),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Language::ZhHk => Language::En,
            Language::En => Language::ZhHk,
        }
    }
}

/// Entries never expire. Every write is flushed to disk before returning.
pub struct LocalStore {
    path: Option<PathBuf>,
    data: RwLock<BTreeMap<String, String>>,
}

impl LocalStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("failed to read local storage from {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(map) => map,
                Err(err) => {
                    warn!(
                        "local storage at {} is unreadable, starting empty: {err}",
                        path.display()
                    );
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    /// Store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    pub fn set(&self, key: &str, value: impl Into<String>) -> Result<()> {
        let mut guard = self.write();
        guard.insert(key.to_string(), value.into());
        self.persist(&guard)
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let mut guard = self.write();
        if guard.remove(key).is_some() {
            self.persist(&guard)?;
        }
        Ok(())
    }

    pub fn theme(&self) -> Option<Theme> {
        self.get(THEME_KEY).as_deref().and_then(Theme::parse)
    }

    pub fn set_theme(&self, theme: Theme) -> Result<()> {
        self.set(THEME_KEY, theme.as_str())
    }

    /// Flips the saved theme; with nothing saved, `fallback` is the current one.
    pub fn toggle_theme(&self, fallback: Theme) -> Result<Theme> {
        let next = self.theme().unwrap_or(fallback).toggled();
        self.set_theme(next)?;
        Ok(next)
    }

    pub fn language(&self) -> Language {
        self.get(LANGUAGE_KEY)
            .as_deref()
            .and_then(Language::parse)
            .unwrap_or(Language::ZhHk)
    }

    pub fn toggle_language(&self) -> Result<Language> {
        let next = self.language().toggled();
        self.set(LANGUAGE_KEY, next.as_str())?;
        Ok(next)
    }

    pub fn session_user(&self) -> Option<String> {
        self.get(USER_KEY)
    }

    pub fn set_session_user(&self, user: Option<&str>) -> Result<()> {
        match user {
            Some(name) => self.set(USER_KEY, name),
            None => self.remove(USER_KEY),
        }
    }

    pub fn install_prompt_dismissed(&self) -> bool {
        self.get(INSTALL_PROMPT_DISMISSED_KEY).as_deref() == Some("true")
    }

    pub fn dismiss_install_prompt(&self) -> Result<()> {
        self.set(INSTALL_PROMPT_DISMISSED_KEY, "true")
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, String>> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, String>> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn persist(&self, data: &BTreeMap<String, String>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create storage directory {}", parent.display())
                })?;
            }
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(path, serialized)
            .with_context(|| format!("failed to write local storage to {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");

        let store = LocalStore::open(path.clone()).unwrap();
        store.set(USER_KEY, "DigGo-HK").unwrap();
        store.set_theme(Theme::Dark).unwrap();
        drop(store);

        let reopened = LocalStore::open(path).unwrap();
        assert_eq!(reopened.session_user().as_deref(), Some("DigGo-HK"));
        assert_eq!(reopened.theme(), Some(Theme::Dark));
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, "{ not json").unwrap();

        let store = LocalStore::open(path).unwrap();
        assert!(store.get(THEME_KEY).is_none());
        store.set(THEME_KEY, "light").unwrap();
        assert_eq!(store.theme(), Some(Theme::Light));
    }

    #[test]
    fn test_toggles() {
        let store = LocalStore::in_memory();
        assert_eq!(store.language(), Language::ZhHk);
        assert_eq!(store.toggle_language().unwrap(), Language::En);
        assert_eq!(store.toggle_language().unwrap(), Language::ZhHk);

        assert_eq!(store.toggle_theme(Theme::Light).unwrap(), Theme::Dark);
        assert_eq!(store.toggle_theme(Theme::Light).unwrap(), Theme::Light);
    }

    #[test]
    fn test_install_prompt_and_session() {
        let store = LocalStore::in_memory();
        assert!(!store.install_prompt_dismissed());
        store.dismiss_install_prompt().unwrap();
        assert!(store.install_prompt_dismissed());

        store.set_session_user(Some("DigGo-HK")).unwrap();
        assert!(store.contains(USER_KEY));
        store.set_session_user(None).unwrap();
        assert!(store.session_user().is_none());
    }
}
