//! Per-profile JSON config store
//!
//! Holds the live document for the active profile. Reads and writes go
//! through a re-entrant data lock; file writes are serialized by a separate
//! save lock so a debounced save never blocks field access for the duration
//! of disk I/O.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use super::document;
use super::paths::{self, DEFAULT_PROFILE};
use super::{ConfigError, ConfigResult};
use crate::events::EventBus;

/// Characters a profile name may not contain
const INVALID_PROFILE_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// How the current document came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No file on disk; empty document, nothing written yet
    Fresh,
    /// File parsed with a valid shape
    Loaded,
    /// File parsed but its shape had to be fixed
    Repaired,
    /// File was corrupt; the `.backup` snapshot was used
    RecoveredFromBackup,
    /// File and backup both unusable; empty document
    FailedFresh,
}

impl LoadOutcome {
    /// Whether the in-memory document differs from disk after this outcome
    fn leaves_dirty(self) -> bool {
        !matches!(self, LoadOutcome::Loaded)
    }
}

struct State {
    profile: String,
    data: Value,
    outcome: LoadOutcome,
}

/// The configuration document and its persistence
pub struct ConfigStore {
    dir: PathBuf,
    bus: Arc<EventBus>,
    debounce: Duration,
    state: ReentrantMutex<RefCell<State>>,
    /// Bumped on every mutation
    generation: AtomicU64,
    /// Generation last known to match disk
    saved_generation: AtomicU64,
    save_seq: AtomicU64,
    save_lock: Mutex<()>,
    saves_completed: AtomicU64,
}

impl ConfigStore {
    /// Create a store rooted at `dir` on the "default" profile. Nothing is
    /// read until [`load`](Self::load).
    pub fn new(dir: impl Into<PathBuf>, bus: Arc<EventBus>) -> Self {
        Self {
            dir: dir.into(),
            bus,
            debounce: Duration::from_millis(250),
            state: ReentrantMutex::new(RefCell::new(State {
                profile: DEFAULT_PROFILE.to_string(),
                data: document::empty(DEFAULT_PROFILE),
                outcome: LoadOutcome::Fresh,
            })),
            generation: AtomicU64::new(0),
            saved_generation: AtomicU64::new(0),
            save_seq: AtomicU64::new(0),
            save_lock: Mutex::new(()),
            saves_completed: AtomicU64::new(0),
        }
    }

    /// Debounce used by field writes
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn config_dir(&self) -> &Path {
        &self.dir
    }

    pub fn profile_path(&self, profile: &str) -> PathBuf {
        paths::profile_file(&self.dir, profile)
    }

    /// File backing the current profile
    pub fn config_path(&self) -> PathBuf {
        self.profile_path(&self.current_profile())
    }

    pub fn current_profile(&self) -> String {
        self.state.lock().borrow().profile.clone()
    }

    pub fn last_outcome(&self) -> LoadOutcome {
        self.state.lock().borrow().outcome
    }

    pub fn is_dirty(&self) -> bool {
        self.generation.load(Ordering::SeqCst) != self.saved_generation.load(Ordering::SeqCst)
    }

    /// Number of physical writes performed by [`save`](Self::save)
    pub fn saves_completed(&self) -> u64 {
        self.saves_completed.load(Ordering::SeqCst)
    }

    fn mark_dirty(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn mark_clean_at(&self, generation: u64) {
        self.saved_generation.fetch_max(generation, Ordering::SeqCst);
    }

    /// Replace the live document; must be called with the data lock held
    fn install(&self, state: &mut State, profile: String, data: Value, outcome: LoadOutcome) {
        state.profile = profile;
        state.data = data;
        state.outcome = outcome;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if !outcome.leaves_dirty() {
            self.mark_clean_at(generation);
        }
    }

    /// Load the current profile's file
    ///
    /// Returns false only when both the file and its backup were unusable and
    /// a fresh document was substituted.
    pub fn load(&self) -> bool {
        let guard = self.state.lock();
        let profile = guard.borrow().profile.clone();
        let (data, outcome) = read_document(&self.profile_path(&profile), &profile);
        self.install(&mut guard.borrow_mut(), profile.clone(), data, outcome);

        log_outcome(&profile, outcome);
        outcome != LoadOutcome::FailedFresh
    }

    /// Write the document to disk via `<file>.tmp` + rename
    pub fn save(&self) -> ConfigResult<()> {
        let _save = self.save_lock.lock();

        let (path, content, generation) = {
            let guard = self.state.lock();
            let state = guard.borrow();
            (
                self.profile_path(&state.profile),
                serde_json::to_string_pretty(&state.data)?,
                self.generation.load(Ordering::SeqCst),
            )
        };

        std::fs::create_dir_all(&self.dir)?;

        let tmp = paths::sibling(&path, ".tmp");
        std::fs::write(&tmp, &content)?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            tracing::warn!("Failed to rename {:?}: {}, writing directly", tmp, e);
            std::fs::write(&path, &content)?;
            let _ = std::fs::remove_file(&tmp);
        }

        self.mark_clean_at(generation);
        self.saves_completed.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Saved config to {:?}", path);
        Ok(())
    }

    /// Save after `debounce`, unless a newer request supersedes this one
    ///
    /// With `reload` set, fields and features are reloaded after the write.
    /// The returned handle may be dropped; tests join it.
    pub fn schedule_save(self: &Arc<Self>, debounce: Duration, reload: bool) -> Option<JoinHandle<()>> {
        let sequence = self.save_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let store = Arc::clone(self);

        let spawned = std::thread::Builder::new()
            .name("unihook-save".to_string())
            .spawn(move || {
                std::thread::sleep(debounce);

                if store.save_seq.load(Ordering::SeqCst) != sequence {
                    tracing::debug!("Skipping superseded save #{}", sequence);
                    return;
                }

                if let Err(e) = store.save() {
                    tracing::error!("Failed to save config: {}", e);
                }

                if reload {
                    store.bus.reload_fields.emit(&());
                    store.bus.reload_config.emit(&());
                }
            });

        match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!("Failed to spawn save thread: {}", e);
                None
            }
        }
    }

    /// Invalidate every pending debounced save
    pub fn cancel_pending_saves(&self) {
        self.save_seq.fetch_add(1, Ordering::SeqCst);
    }

    /// Switch to `profile`
    ///
    /// The current profile is saved first if dirty. If the target cannot be
    /// loaded the store is left exactly as it was and false is returned.
    pub fn set_profile(&self, profile: &str) -> bool {
        if profile != DEFAULT_PROFILE {
            if let Err(e) = validate_profile_name(profile) {
                tracing::warn!("Cannot switch profile: {}", e);
                return false;
            }
        }

        let previous = self.current_profile();
        if previous == profile {
            return true;
        }

        if self.is_dirty() {
            tracing::info!("Saving current profile '{}' before switching", previous);
            if let Err(e) = self.save() {
                tracing::error!("Failed to save profile '{}': {}", previous, e);
            }
        }

        tracing::info!("Switching from profile '{}' to '{}'", previous, profile);
        if !self.switch_to(profile) {
            tracing::error!(
                "Failed to load profile '{}', staying on '{}'",
                profile,
                previous
            );
            return false;
        }

        tracing::info!("Successfully switched to profile '{}'", profile);
        true
    }

    /// Load `profile` into a temporary and swap it in on success, then notify
    fn switch_to(&self, profile: &str) -> bool {
        let (data, outcome) = read_document(&self.profile_path(profile), profile);
        if outcome == LoadOutcome::FailedFresh {
            return false;
        }

        {
            let guard = self.state.lock();
            self.install(&mut guard.borrow_mut(), profile.to_string(), data, outcome);
        }
        log_outcome(profile, outcome);

        self.bus.reload_fields.emit(&());
        self.bus.reload_config.emit(&());
        self.bus.profile_changed.emit(&profile.to_string());
        true
    }

    /// Every profile on disk, "default" first
    pub fn list_profiles(&self) -> Vec<String> {
        let mut profiles = Vec::new();

        match std::fs::read_dir(&self.dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    if !entry.file_type().is_ok_and(|t| t.is_file()) {
                        continue;
                    }
                    let file_name = entry.file_name();
                    if let Some(name) = file_name.to_str().and_then(paths::profile_from_file_name) {
                        if name != DEFAULT_PROFILE {
                            profiles.push(name);
                        }
                    }
                }
            }
            Err(e) => tracing::debug!("Failed to list profiles in {:?}: {}", self.dir, e),
        }

        profiles.sort();
        profiles.dedup();
        profiles.insert(0, DEFAULT_PROFILE.to_string());
        profiles
    }

    /// Write an empty document for a new profile without switching to it
    pub fn create_profile(&self, profile: &str) -> bool {
        match self.try_create_profile(profile) {
            Ok(()) => {
                tracing::info!("Created new profile: '{}'", profile);
                true
            }
            Err(e) => {
                tracing::error!("Failed to create profile: {}", e);
                false
            }
        }
    }

    fn try_create_profile(&self, profile: &str) -> ConfigResult<()> {
        validate_profile_name(profile)?;

        let path = self.profile_path(profile);
        if path.exists() {
            return Err(ConfigError::ProfileExists(profile.to_string()));
        }

        std::fs::create_dir_all(&self.dir)?;
        let content = serde_json::to_string_pretty(&document::empty(profile))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Delete a profile, keeping a `.deleted` copy
    ///
    /// Deleting the active profile switches to "default".
    pub fn delete_profile(&self, profile: &str) -> bool {
        match self.try_delete_profile(profile) {
            Ok(backup) => {
                tracing::info!(
                    "Deleted profile: '{}' (backup saved as {:?})",
                    profile,
                    backup
                );
            }
            Err(e) => {
                tracing::error!("Failed to delete profile: {}", e);
                return false;
            }
        }

        if self.current_profile() == profile {
            // The deleted document must not be written back by a save-before-switch
            self.cancel_pending_saves();
            if !self.switch_to(DEFAULT_PROFILE) {
                tracing::warn!("Default profile is unreadable, starting fresh");
                let guard = self.state.lock();
                self.install(
                    &mut guard.borrow_mut(),
                    DEFAULT_PROFILE.to_string(),
                    document::empty(DEFAULT_PROFILE),
                    LoadOutcome::FailedFresh,
                );
            }
        }
        true
    }

    fn try_delete_profile(&self, profile: &str) -> ConfigResult<PathBuf> {
        validate_profile_name(profile)?;

        let path = self.profile_path(profile);
        if !path.exists() {
            return Err(ConfigError::ProfileNotFound(profile.to_string()));
        }

        let backup = paths::sibling(&path, ".deleted");
        std::fs::copy(&path, &backup)?;
        std::fs::remove_file(&path)?;
        Ok(backup)
    }

    /// Drop one feature's stored values
    pub fn reset_feature(self: &Arc<Self>, section: &str, feature: &str) -> bool {
        let removed = {
            let guard = self.state.lock();
            let mut state = guard.borrow_mut();
            state
                .data
                .get_mut("features")
                .and_then(|f| f.get_mut(section))
                .and_then(Value::as_object_mut)
                .and_then(|s| s.remove(feature))
                .is_some()
        };

        if !removed {
            return false;
        }

        self.mark_dirty();
        tracing::info!("Reset feature: {}.{}", section, feature);
        self.schedule_save(Duration::ZERO, true);
        true
    }

    /// Drop every feature's stored values
    pub fn reset_all(self: &Arc<Self>) -> bool {
        tracing::warn!("Resetting entire configuration to defaults");
        {
            let guard = self.state.lock();
            let mut state = guard.borrow_mut();
            let profile = state.profile.clone();
            state.data = document::empty(&profile);
        }

        self.mark_dirty();
        self.schedule_save(Duration::ZERO, true);
        true
    }

    /// Read `features.<section>.<feature>.<key>` as `T`
    ///
    /// Missing keys and values that fail to convert yield `default`.
    pub fn get_feature_value<T: DeserializeOwned>(
        &self,
        section: &str,
        feature: &str,
        key: &str,
        default: T,
    ) -> T {
        self.try_get_feature_value(section, feature, key)
            .unwrap_or(default)
    }

    /// Like [`get_feature_value`](Self::get_feature_value), but `None` when
    /// the key is missing or does not convert
    pub fn try_get_feature_value<T: DeserializeOwned>(
        &self,
        section: &str,
        feature: &str,
        key: &str,
    ) -> Option<T> {
        let guard = self.state.lock();
        let state = guard.borrow();
        let value = document::feature_node(&state.data, section, feature)?.get(key)?;

        match serde_json::from_value::<T>(value.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(
                    "Failed to get feature value {}.{}.{}: {}",
                    section,
                    feature,
                    key,
                    e
                );
                None
            }
        }
    }

    /// Write `features.<section>.<feature>.<key>`, creating the path
    ///
    /// A value that cannot be represented as JSON is skipped.
    pub fn set_feature_value<T: Serialize + ?Sized>(
        &self,
        section: &str,
        feature: &str,
        key: &str,
        value: &T,
    ) -> bool {
        let json = match serde_json::to_value(value) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(
                    "Failed to set feature value {}.{}.{}: {}",
                    section,
                    feature,
                    key,
                    e
                );
                return false;
            }
        };

        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        let Some(node) = document::feature_node_mut(&mut state.data, section, feature) else {
            tracing::warn!("Config root is not an object, dropping {}.{}.{}", section, feature, key);
            return false;
        };

        node.insert(key.to_string(), json);
        self.mark_dirty();
        true
    }

    /// Copy of the whole document
    pub fn snapshot(&self) -> Value {
        self.state.lock().borrow().data.clone()
    }

    /// Copy of one feature node
    pub fn feature_snapshot(&self, section: &str, feature: &str) -> Option<Map<String, Value>> {
        let guard = self.state.lock();
        let state = guard.borrow();
        document::feature_node(&state.data, section, feature).cloned()
    }
}

/// Reject names that cannot be used as a non-default profile
pub fn validate_profile_name(name: &str) -> ConfigResult<()> {
    let invalid = name.is_empty()
        || name == DEFAULT_PROFILE
        || name.contains('.')
        || name
            .chars()
            .any(|c| c.is_control() || INVALID_PROFILE_CHARS.contains(&c));

    if invalid {
        Err(ConfigError::InvalidProfileName(name.to_string()))
    } else {
        Ok(())
    }
}

/// Parse `bytes` as a document with an object root, repairing its shape
fn parse_document(bytes: &[u8], profile: &str) -> Option<(Value, bool)> {
    let mut doc: Value = match serde_json::from_slice(bytes) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::error!("Failed to parse config file: {}", e);
            return None;
        }
    };

    if !doc.is_object() {
        tracing::error!("Config root is not an object");
        return None;
    }

    let repaired = document::repair(&mut doc, profile);
    Some((doc, repaired))
}

/// Read a profile file, falling back to its backup
///
/// The `.backup` snapshot is refreshed only from a file that parsed, so a
/// corrupt file never overwrites a good backup.
fn read_document(path: &Path, profile: &str) -> (Value, LoadOutcome) {
    if !path.exists() {
        return (document::empty(profile), LoadOutcome::Fresh);
    }

    let backup = paths::sibling(path, ".backup");

    match std::fs::read(path) {
        Ok(bytes) => {
            if let Some((doc, repaired)) = parse_document(&bytes, profile) {
                if let Err(e) = std::fs::write(&backup, &bytes) {
                    tracing::warn!("Failed to create config backup: {}", e);
                }
                let outcome = if repaired {
                    LoadOutcome::Repaired
                } else {
                    LoadOutcome::Loaded
                };
                return (doc, outcome);
            }
        }
        Err(e) => tracing::error!("Failed to read config file {:?}: {}", path, e),
    }

    if let Ok(bytes) = std::fs::read(&backup) {
        tracing::info!("Attempting to restore from backup...");
        if let Some((doc, _)) = parse_document(&bytes, profile) {
            return (doc, LoadOutcome::RecoveredFromBackup);
        }
        tracing::error!("Backup restoration failed");
    }

    (document::empty(profile), LoadOutcome::FailedFresh)
}

fn log_outcome(profile: &str, outcome: LoadOutcome) {
    match outcome {
        LoadOutcome::Fresh => tracing::info!(
            "Config file not found for profile '{}', creating default configuration",
            profile
        ),
        LoadOutcome::Loaded => {
            tracing::info!("Configuration loaded successfully for profile '{}'", profile)
        }
        LoadOutcome::Repaired => {
            tracing::warn!("Invalid config structure for profile '{}', fixed", profile)
        }
        LoadOutcome::RecoveredFromBackup => {
            tracing::warn!("Restored profile '{}' from backup", profile)
        }
        LoadOutcome::FailedFresh => {
            tracing::warn!("Creating fresh configuration for profile '{}'", profile)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_in(dir: &Path) -> Arc<ConfigStore> {
        Arc::new(ConfigStore::new(dir, Arc::new(EventBus::new())))
    }

    fn write_json(path: &Path, value: &Value) {
        std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    }

    fn sample_doc(profile: &str, fov: i64) -> Value {
        json!({
            "version": 2,
            "features": {"Player": {"Fov": {"value": fov}}},
            "metadata": {"created": 1, "profile": profile},
        })
    }

    #[test]
    fn test_load_missing_file_is_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        assert!(store.load());
        assert_eq!(store.last_outcome(), LoadOutcome::Fresh);
        assert!(store.is_dirty());
        assert!(!store.config_path().exists());
        assert_eq!(store.snapshot()["features"], json!({}));
    }

    #[test]
    fn test_load_repairs_missing_features() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        write_json(&store.config_path(), &json!({"version": 2}));

        assert!(store.load());
        assert_eq!(store.last_outcome(), LoadOutcome::Repaired);
        assert!(store.is_dirty());
        assert_eq!(store.snapshot()["features"], json!({}));
    }

    #[test]
    fn test_load_repairs_non_object_features() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let path = store.config_path();
        std::fs::write(&path, r#"{"features": "not-an-object"}"#).unwrap();

        assert!(store.load());
        assert_eq!(store.last_outcome(), LoadOutcome::Repaired);
        assert!(store.is_dirty());
        assert_eq!(store.snapshot()["features"], json!({}));

        let backup = std::fs::read_to_string(paths::sibling(&path, ".backup")).unwrap();
        assert_eq!(backup, r#"{"features": "not-an-object"}"#);

        // Repaired document accepts writes
        assert!(store.set_feature_value("Player", "Fov", "value", &90));
        assert_eq!(store.get_feature_value("Player", "Fov", "value", 0), 90);
    }

    #[test]
    fn test_load_valid_file_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        write_json(&store.config_path(), &sample_doc("default", 100));

        assert!(store.load());
        assert_eq!(store.last_outcome(), LoadOutcome::Loaded);
        assert!(!store.is_dirty());
        assert_eq!(store.get_feature_value("Player", "Fov", "value", 0i64), 100);
        assert!(paths::sibling(&store.config_path(), ".backup").exists());
    }

    #[test]
    fn test_corrupt_file_recovers_from_backup() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let path = store.config_path();

        write_json(&path, &sample_doc("default", 110));
        assert!(store.load());

        std::fs::write(&path, "{ not json").unwrap();
        assert!(store.load());
        assert_eq!(store.last_outcome(), LoadOutcome::RecoveredFromBackup);
        assert!(store.is_dirty());
        assert_eq!(store.get_feature_value("Player", "Fov", "value", 0i64), 110);

        // Backup was not clobbered by the corrupt file
        let backup = std::fs::read_to_string(paths::sibling(&path, ".backup")).unwrap();
        assert!(backup.contains("110"));
    }

    #[test]
    fn test_corrupt_file_without_backup_fails_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        std::fs::write(store.config_path(), "[1, 2").unwrap();

        assert!(!store.load());
        assert_eq!(store.last_outcome(), LoadOutcome::FailedFresh);
        assert!(document::validate(&store.snapshot()));
    }

    #[test]
    fn test_save_writes_and_cleans() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir.path().join("nested"));
        store.load();
        assert!(store.set_feature_value("Combat", "Aim", "smooth", &2.5f64));

        store.save().unwrap();
        assert!(!store.is_dirty());
        assert_eq!(store.saves_completed(), 1);
        assert!(!paths::sibling(&store.config_path(), ".tmp").exists());

        let on_disk: Value =
            serde_json::from_str(&std::fs::read_to_string(store.config_path()).unwrap()).unwrap();
        assert_eq!(on_disk["features"]["Combat"]["Aim"]["smooth"], json!(2.5));
    }

    #[test]
    fn test_debounced_saves_coalesce() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.load();

        let handles: Vec<_> = (0..5)
            .filter_map(|i| {
                store.set_feature_value("Player", "Fov", "value", &i);
                store.schedule_save(Duration::from_millis(50), false)
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.saves_completed(), 1);
        assert!(!store.is_dirty());
        assert_eq!(
            store.get_feature_value("Player", "Fov", "value", -1),
            4
        );
    }

    #[test]
    fn test_scheduled_save_with_reload_emits() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        let _fields = store.bus.reload_fields.subscribe(move |_| o.lock().push("fields"));
        let o = order.clone();
        let _config = store.bus.reload_config.subscribe(move |_| o.lock().push("config"));

        store
            .schedule_save(Duration::ZERO, true)
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(*order.lock(), vec!["fields", "config"]);
    }

    #[test]
    fn test_cancel_pending_saves() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let handle = store.schedule_save(Duration::from_millis(50), false).unwrap();
        store.cancel_pending_saves();
        handle.join().unwrap();
        assert_eq!(store.saves_completed(), 0);
    }

    #[test]
    fn test_failed_profile_switch_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        write_json(&store.config_path(), &sample_doc("default", 95));
        store.load();

        std::fs::write(store.profile_path("broken"), "garbage").unwrap();
        let before = store.snapshot();

        assert!(!store.set_profile("broken"));
        assert_eq!(store.current_profile(), "default");
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_profile_switch_notifies_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.load();
        write_json(&store.profile_path("pvp"), &sample_doc("pvp", 120));

        let order = Arc::new(Mutex::new(Vec::new()));
        let o = order.clone();
        let _a = store.bus.reload_fields.subscribe(move |_| o.lock().push("fields".to_string()));
        let o = order.clone();
        let _b = store.bus.reload_config.subscribe(move |_| o.lock().push("config".to_string()));
        let o = order.clone();
        let _c = store
            .bus
            .profile_changed
            .subscribe(move |name: &String| o.lock().push(format!("profile:{}", name)));

        assert!(store.set_profile("pvp"));
        assert_eq!(store.current_profile(), "pvp");
        assert_eq!(store.get_feature_value("Player", "Fov", "value", 0), 120);
        assert_eq!(*order.lock(), vec!["fields", "config", "profile:pvp"]);
    }

    #[test]
    fn test_profile_switch_saves_dirty_current() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.load();
        store.set_feature_value("Game", "Speed", "value", &3);

        assert!(store.set_profile("other"));
        assert_eq!(store.last_outcome(), LoadOutcome::Fresh);

        let saved: Value = serde_json::from_str(
            &std::fs::read_to_string(store.profile_path("default")).unwrap(),
        )
        .unwrap();
        assert_eq!(saved["features"]["Game"]["Speed"]["value"], json!(3));
    }

    #[test]
    fn test_list_create_delete_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        assert_eq!(store.list_profiles(), vec!["default"]);

        assert!(store.create_profile("zeta"));
        assert!(store.create_profile("alpha"));
        assert!(!store.create_profile("alpha"));
        assert!(!store.create_profile("default"));
        assert!(!store.create_profile(""));
        assert!(!store.create_profile("a/b"));
        assert!(!store.create_profile("what?"));
        assert!(!store.create_profile("tab\there"));

        assert_eq!(store.list_profiles(), vec!["default", "alpha", "zeta"]);
        assert_eq!(store.current_profile(), "default");

        assert!(store.delete_profile("zeta"));
        assert!(!store.delete_profile("zeta"));
        assert!(!store.delete_profile("default"));
        assert!(paths::sibling(&store.profile_path("zeta"), ".deleted").exists());
        assert_eq!(store.list_profiles(), vec!["default", "alpha"]);
    }

    #[test]
    fn test_delete_active_profile_switches_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(store.create_profile("temp"));
        assert!(store.set_profile("temp"));
        store.set_feature_value("Player", "Fov", "value", &70);

        assert!(store.delete_profile("temp"));
        assert_eq!(store.current_profile(), "default");
        assert!(!store.profile_path("temp").exists());
    }

    #[test]
    fn test_typed_get_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        assert_eq!(store.get_feature_value("A", "B", "missing", 7), 7);

        assert!(store.set_feature_value("A", "B", "name", "hello"));
        assert_eq!(
            store.get_feature_value("A", "B", "name", String::new()),
            "hello"
        );

        // Wrong type falls back to the default
        assert!(!store.get_feature_value("A", "B", "name", false));
        assert_eq!(
            store.feature_snapshot("A", "B").unwrap()["name"],
            json!("hello")
        );
    }

    #[test]
    fn test_reset_feature_and_all() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.set_feature_value("Player", "Fov", "value", &100);
        store.set_feature_value("Player", "Speed", "value", &2);

        assert!(store.reset_feature("Player", "Fov"));
        assert!(!store.reset_feature("Player", "Fov"));
        assert!(store.feature_snapshot("Player", "Fov").is_none());
        assert!(store.feature_snapshot("Player", "Speed").is_some());

        assert!(store.reset_all());
        assert_eq!(store.snapshot()["features"], json!({}));
    }

    #[test]
    fn test_profile_name_validation() {
        assert!(validate_profile_name("ranked").is_ok());
        assert!(validate_profile_name("my profile").is_ok());
        for bad in ["", "default", "a\\b", "a:b", "a*b", "a\"b", "a<b", "a>b", "a|b", "a\u{1}b"] {
            assert!(
                matches!(validate_profile_name(bad), Err(ConfigError::InvalidProfileName(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }
}
