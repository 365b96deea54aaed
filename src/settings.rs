use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use thiserror::Error;

use crate::bus::{StoreArea, StoreEvents, StoreSubscription};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";
pub const TIMEOUT_RANGE_SECS: (u32, u32) = (10, 120);
pub const HISTORY_CAP_RANGE: (u32, u32) = (10, 1000);

pub const KEY_SERVER_URL: &str = "serverUrl";
pub const KEY_AUTO_ANALYZE: &str = "autoAnalyze";
pub const KEY_SHOW_NOTIFICATIONS: &str = "showNotifications";
pub const KEY_SAVE_HISTORY: &str = "saveHistory";
pub const KEY_ANALYSIS_TIMEOUT: &str = "analysisTimeoutSeconds";
pub const KEY_MAX_HISTORY_ITEMS: &str = "maxHistoryItems";

pub const ALL_KEYS: [&str; 6] = [
    KEY_SERVER_URL,
    KEY_AUTO_ANALYZE,
    KEY_SHOW_NOTIFICATIONS,
    KEY_SAVE_HISTORY,
    KEY_ANALYSIS_TIMEOUT,
    KEY_MAX_HISTORY_ITEMS,
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub server_url: String,
    pub auto_analyze: bool,
    pub show_notifications: bool,
    pub save_history: bool,
    pub analysis_timeout_seconds: u32,
    pub max_history_items: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.into(),
            auto_analyze: true,
            show_notifications: true,
            save_history: true,
            analysis_timeout_seconds: 30,
            max_history_items: 100,
        }
    }
}

impl Settings {
    /// First violated constraint, checked in field order.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let scheme_ok = Url::parse(&self.server_url)
            .map(|url| matches!(url.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !scheme_ok {
            return Err(ValidationError::ServerUrl(self.server_url.clone()));
        }

        let (min, max) = TIMEOUT_RANGE_SECS;
        if !(min..=max).contains(&self.analysis_timeout_seconds) {
            return Err(ValidationError::AnalysisTimeout(self.analysis_timeout_seconds));
        }

        let (min, max) = HISTORY_CAP_RANGE;
        if !(min..=max).contains(&self.max_history_items) {
            return Err(ValidationError::MaxHistoryItems(self.max_history_items));
        }

        Ok(())
    }
}

/// Partial settings, used both for writes and for the on-disk form (so keys
/// missing from the file fall back to defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_analyze: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_notifications: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_history: Option<bool>,
    #[serde(default, alias = "analysisTimeout", skip_serializing_if = "Option::is_none")]
    pub analysis_timeout_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_history_items: Option<u32>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        *self == SettingsPatch::default()
    }

    pub fn apply_to(&self, base: &Settings) -> Settings {
        Settings {
            server_url: self
                .server_url
                .as_ref()
                .map(|url| url.trim().to_string())
                .unwrap_or_else(|| base.server_url.clone()),
            auto_analyze: self.auto_analyze.unwrap_or(base.auto_analyze),
            show_notifications: self.show_notifications.unwrap_or(base.show_notifications),
            save_history: self.save_history.unwrap_or(base.save_history),
            analysis_timeout_seconds: self
                .analysis_timeout_seconds
                .unwrap_or(base.analysis_timeout_seconds),
            max_history_items: self.max_history_items.unwrap_or(base.max_history_items),
        }
    }
}

fn parse(contents: &str) -> serde_json::Result<Settings> {
    serde_json::from_str::<SettingsPatch>(contents).map(|stored| stored.apply_to(&Settings::default()))
}

fn changed_keys(before: &Settings, after: &Settings) -> Vec<&'static str> {
    let mut keys = Vec::new();
    if before.server_url != after.server_url {
        keys.push(KEY_SERVER_URL);
    }
    if before.auto_analyze != after.auto_analyze {
        keys.push(KEY_AUTO_ANALYZE);
    }
    if before.show_notifications != after.show_notifications {
        keys.push(KEY_SHOW_NOTIFICATIONS);
    }
    if before.save_history != after.save_history {
        keys.push(KEY_SAVE_HISTORY);
    }
    if before.analysis_timeout_seconds != after.analysis_timeout_seconds {
        keys.push(KEY_ANALYSIS_TIMEOUT);
    }
    if before.max_history_items != after.max_history_items {
        keys.push(KEY_MAX_HISTORY_ITEMS);
    }
    keys
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("server URL must be an http or https URL, got '{0}'")]
    ServerUrl(String),
    #[error("analysis timeout must be between 10 and 120 seconds, got {0}")]
    AnalysisTimeout(u32),
    #[error("max history items must be between 10 and 1000, got {0}")]
    MaxHistoryItems(u32),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Persist(#[from] anyhow::Error),
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
    events: StoreEvents,
}

impl SettingsStore {
    pub fn new(path: PathBuf, events: StoreEvents) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match parse(&contents) {
                Ok(stored) => stored,
                Err(err) => {
                    log::warn!(
                        "Ignoring unreadable settings at {}: {err}",
                        path.display()
                    );
                    Settings::default()
                }
            }
        } else {
            Settings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
            events,
        })
    }

    /// Always a complete value, re-read from disk so writes made by another
    /// process are seen. Falls back to the last good copy when the file is
    /// missing or unreadable.
    pub fn read(&self) -> Settings {
        if let Err(err) = self.reload() {
            log::warn!("Keeping cached settings: {err:#}");
        }
        self.read_guard().clone()
    }

    /// Pick up the file's current contents and announce the keys that differ
    /// from what this store last saw. Returns those keys.
    pub fn reload(&self) -> Result<Vec<&'static str>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let stored = parse(&contents)
            .with_context(|| format!("Unreadable settings at {}", self.path.display()))?;

        let changed = {
            let mut guard = self.write_guard();
            let changed = changed_keys(&guard, &stored);
            if !changed.is_empty() {
                *guard = stored;
            }
            changed
        };

        if !changed.is_empty() {
            log::debug!("Settings changed on disk: {changed:?}");
            self.events.emit(StoreArea::Sync, changed.iter().copied());
        }
        Ok(changed)
    }

    /// Validate the merged result, persist it, then announce the keys that
    /// actually changed. Nothing is written when validation fails.
    pub fn write(&self, patch: &SettingsPatch) -> Result<(), SettingsError> {
        if let Err(err) = self.reload() {
            log::warn!("Writing over unreadable settings: {err:#}");
        }

        let changed = {
            let mut guard = self.write_guard();
            let next = patch.apply_to(&guard);
            next.validate()?;

            let changed = changed_keys(&guard, &next);
            if changed.is_empty() {
                return Ok(());
            }

            self.persist(&next)?;
            *guard = next;
            changed
        };

        self.events.emit(StoreArea::Sync, changed);
        Ok(())
    }

    pub fn reset(&self) -> Result<()> {
        let defaults = Settings::default();
        {
            let mut guard = self.write_guard();
            self.persist(&defaults)?;
            *guard = defaults;
        }
        self.events.emit(StoreArea::Sync, ALL_KEYS);
        Ok(())
    }

    pub fn subscribe(&self) -> StoreSubscription {
        self.events.subscribe()
    }

    /// Write next to the target and rename over it, so readers in other
    /// processes never see a partial file.
    fn persist(&self, data: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;

        let staging = self.staging_path();
        fs::write(&staging, serialized)
            .with_context(|| format!("Failed to write settings to {}", staging.display()))?;
        if let Err(err) = fs::rename(&staging, &self.path) {
            let _ = fs::remove_file(&staging);
            return Err(err)
                .with_context(|| format!("Failed to replace {}", self.path.display()));
        }
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "settings.json".into());
        name.push(format!(".{}.tmp", std::process::id()));
        self.path.with_file_name(name)
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, Settings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, Settings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> SettingsStore {
        SettingsStore::new(dir.path().join("settings.json"), StoreEvents::new()).unwrap()
    }

    #[test]
    fn fresh_store_reads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(store_in(&dir).read(), Settings::default());
    }

    #[test]
    fn write_then_read_merges_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let patch = SettingsPatch {
            server_url: Some("https://mind.example.com".into()),
            analysis_timeout_seconds: Some(60),
            ..SettingsPatch::default()
        };
        store.write(&patch).unwrap();

        let expected = Settings {
            server_url: "https://mind.example.com".into(),
            analysis_timeout_seconds: 60,
            ..Settings::default()
        };
        assert_eq!(store.read(), expected);

        // And it survives a restart.
        assert_eq!(store_in(&dir).read(), expected);
    }

    #[test]
    fn invalid_writes_leave_settings_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .write(&SettingsPatch {
                auto_analyze: Some(false),
                ..SettingsPatch::default()
            })
            .unwrap();
        let before = store.read();

        let cases = [
            (
                SettingsPatch {
                    server_url: Some("ftp://x".into()),
                    ..SettingsPatch::default()
                },
                ValidationError::ServerUrl("ftp://x".into()),
            ),
            (
                SettingsPatch {
                    analysis_timeout_seconds: Some(5),
                    ..SettingsPatch::default()
                },
                ValidationError::AnalysisTimeout(5),
            ),
            (
                SettingsPatch {
                    max_history_items: Some(5000),
                    ..SettingsPatch::default()
                },
                ValidationError::MaxHistoryItems(5000),
            ),
        ];

        for (patch, expected) in cases {
            match store.write(&patch) {
                Err(SettingsError::Invalid(err)) => assert_eq!(err, expected),
                other => panic!("expected validation error, got {other:?}"),
            }
            assert_eq!(store.read(), before);
            assert_eq!(store_in(&dir).read(), before);
        }
    }

    #[test]
    fn first_violation_wins() {
        let settings = Settings {
            server_url: "not a url".into(),
            analysis_timeout_seconds: 1,
            max_history_items: 1,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ValidationError::ServerUrl(_))
        ));
    }

    #[test]
    fn missing_keys_are_backfilled_and_legacy_timeout_key_is_read() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("settings.json"),
            r#"{ "autoAnalyze": false, "analysisTimeout": 45 }"#,
        )
        .unwrap();

        let settings = store_in(&dir).read();
        assert!(!settings.auto_analyze);
        assert_eq!(settings.analysis_timeout_seconds, 45);
        assert_eq!(settings.server_url, DEFAULT_SERVER_URL);
        assert_eq!(settings.max_history_items, 100);
    }

    #[tokio::test]
    async fn writes_announce_only_changed_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let mut sub = store.subscribe();

        store
            .write(&SettingsPatch {
                auto_analyze: Some(false),
                show_notifications: Some(true),
                ..SettingsPatch::default()
            })
            .unwrap();

        let change = sub.next().await.unwrap();
        assert_eq!(change.keys, vec![KEY_AUTO_ANALYZE.to_string()]);

        // A no-op write announces nothing.
        store
            .write(&SettingsPatch {
                auto_analyze: Some(false),
                ..SettingsPatch::default()
            })
            .unwrap();
        assert!(sub.try_next().is_none());
    }

    #[tokio::test]
    async fn writes_from_another_store_are_seen_and_announced() {
        let dir = tempfile::tempdir().unwrap();
        let daemon = store_in(&dir);
        let settings_ui = store_in(&dir);
        let mut sub = daemon.subscribe();

        settings_ui
            .write(&SettingsPatch {
                auto_analyze: Some(false),
                analysis_timeout_seconds: Some(90),
                ..SettingsPatch::default()
            })
            .unwrap();

        let seen = daemon.read();
        assert!(!seen.auto_analyze);
        assert_eq!(seen.analysis_timeout_seconds, 90);

        let change = sub.next().await.unwrap();
        assert_eq!(
            change.keys,
            vec![KEY_AUTO_ANALYZE.to_string(), KEY_ANALYSIS_TIMEOUT.to_string()]
        );

        // Nothing new on disk, nothing announced.
        assert!(daemon.reload().unwrap().is_empty());
        assert!(sub.try_next().is_none());
    }

    #[test]
    fn patch_from_a_stale_store_keeps_the_other_writers_keys() {
        let dir = tempfile::tempdir().unwrap();
        let first = store_in(&dir);
        let second = store_in(&dir);

        first
            .write(&SettingsPatch {
                save_history: Some(false),
                ..SettingsPatch::default()
            })
            .unwrap();
        second
            .write(&SettingsPatch {
                show_notifications: Some(false),
                ..SettingsPatch::default()
            })
            .unwrap();

        let merged = store_in(&dir).read();
        assert!(!merged.save_history);
        assert!(!merged.show_notifications);
    }

    #[test]
    fn unreadable_file_keeps_the_cached_copy() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .write(&SettingsPatch {
                auto_analyze: Some(false),
                ..SettingsPatch::default()
            })
            .unwrap();

        fs::write(dir.path().join("settings.json"), "{ \"autoAna").unwrap();
        assert!(store.reload().is_err());
        assert!(!store.read().auto_analyze);
    }

    #[test]
    fn persist_replaces_the_file_and_leaves_no_staging_copy() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .write(&SettingsPatch {
                max_history_items: Some(250),
                ..SettingsPatch::default()
            })
            .unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["settings.json".to_string()]);

        let on_disk: Settings =
            serde_json::from_str(&fs::read_to_string(dir.path().join("settings.json")).unwrap())
                .unwrap();
        assert_eq!(on_disk.max_history_items, 250);
    }

    #[tokio::test]
    async fn reset_restores_defaults_and_announces_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .write(&SettingsPatch {
                max_history_items: Some(500),
                ..SettingsPatch::default()
            })
            .unwrap();
        let mut sub = store.subscribe();

        store.reset().unwrap();

        assert_eq!(store.read(), Settings::default());
        assert_eq!(sub.next().await.unwrap().keys.len(), ALL_KEYS.len());
    }
}
