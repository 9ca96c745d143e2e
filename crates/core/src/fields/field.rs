//! Reactive, persisted config value

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use super::registry::{ErasedField, FieldId, FieldRegistry};
use crate::config::ConfigStore;
use crate::events::{Event, FieldChange, Subscription};

/// Section used when an owner path has no `.`
const DEFAULT_SECTION: &str = "Default";

/// Types a [`Field`] can hold
pub trait FieldValue: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> FieldValue for T where T: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static {}

type Validator<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

struct FieldInner<T: FieldValue> {
    id: FieldId,
    path: String,
    section: String,
    feature: String,
    key: String,
    default: T,
    value: RwLock<T>,
    /// Serializes value replacement with the matching store write
    commit: Mutex<()>,
    dirty: AtomicBool,
    validator: RwLock<Option<Validator<T>>>,
    changed: Event<FieldChange<T>>,
    store: Arc<ConfigStore>,
    registry: Weak<FieldRegistry>,
}

/// A typed value stored at `features.<section>.<feature>.<key>`
///
/// Handles are cheap to clone; the field unregisters itself when the last
/// handle is dropped.
pub struct Field<T: FieldValue> {
    inner: Arc<FieldInner<T>>,
}

impl<T: FieldValue> Clone for Field<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: FieldValue + fmt::Debug> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("path", &self.inner.path)
            .field("key", &self.inner.key)
            .field("value", &*self.inner.value.read())
            .finish()
    }
}

/// Split `Section.Feature`; a path without `.` lives in the default section
fn split_owner_path(path: &str) -> (String, String) {
    match path.split_once('.') {
        Some((section, feature)) => (section.to_string(), feature.to_string()),
        None => (DEFAULT_SECTION.to_string(), path.to_string()),
    }
}

impl<T: FieldValue> Field<T> {
    /// Create a field under `owner_path` and load its stored value
    ///
    /// # Arguments
    /// * `registry` - Registry the field joins; also provides the config store
    /// * `owner_path` - `Section.Feature` path of the owning feature
    /// * `key` - Key inside the feature node
    /// * `default` - Value used when nothing (or nothing convertible) is stored
    pub fn new(registry: &Arc<FieldRegistry>, owner_path: &str, key: &str, default: T) -> Self {
        let (section, feature) = split_owner_path(owner_path);
        let store = Arc::clone(registry.store());
        let initial = store
            .try_get_feature_value::<T>(&section, &feature, key)
            .unwrap_or_else(|| default.clone());

        let id = registry.next_id();
        let inner = Arc::new(FieldInner {
            id,
            path: owner_path.to_string(),
            section,
            feature,
            key: key.to_string(),
            default,
            value: RwLock::new(initial),
            commit: Mutex::new(()),
            dirty: AtomicBool::new(false),
            validator: RwLock::new(None),
            changed: Event::new("field_changed"),
            store,
            registry: Arc::downgrade(registry),
        });

        let weak: Weak<FieldInner<T>> = Arc::downgrade(&inner);
        let erased: Weak<dyn ErasedField> = weak;
        registry.register(owner_path, id, erased);

        Self { inner }
    }

    pub fn get(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Borrow the current value without cloning
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&*self.inner.value.read())
    }

    /// Set, notify and persist
    ///
    /// Returns true if the value changed.
    pub fn set(&self, value: T) -> bool {
        self.inner.apply(value, false)
    }

    /// Set and persist without firing the change event
    pub fn set_silent(&self, value: T) -> bool {
        self.inner.apply(value, true)
    }

    /// Mutable access committed when the guard drops
    pub fn edit(&self) -> FieldGuard<'_, T> {
        let original = self.get();
        FieldGuard {
            field: self,
            value: original.clone(),
            original,
            done: false,
        }
    }

    /// Mutate in place through [`edit`](Self::edit); returns true if the
    /// change was committed
    pub fn modify(&self, f: impl FnOnce(&mut T)) -> bool {
        let mut guard = self.edit();
        f(&mut *guard);
        guard.commit()
    }

    pub fn reset_to_default(&self) -> bool {
        self.set(self.inner.default.clone())
    }

    /// Silently re-read from the config store
    pub fn reload(&self) {
        self.inner.reload_from_store();
    }

    pub fn serialize(&self, out: &mut Map<String, Value>) {
        self.inner.serialize_into(out);
    }

    pub fn deserialize(&self, src: &Map<String, Value>) {
        self.inner.deserialize_from(src);
    }

    #[must_use = "dropping the Subscription disconnects the handler immediately"]
    pub fn on_changed<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&FieldChange<T>) + Send + Sync + 'static,
    {
        self.inner.changed.subscribe(handler)
    }

    /// Install a validator; an invalid current value is reset to the default
    pub fn set_validator<F>(&self, validator: F)
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let validator: Validator<T> = Arc::new(validator);
        *self.inner.validator.write() = Some(Arc::clone(&validator));

        let _commit = self.inner.commit.lock();
        let current_valid = validator(&*self.inner.value.read());
        if !current_valid {
            tracing::warn!(
                "Current value of field '{}' fails new validator, using default",
                self.inner.key
            );
            let default = self.inner.default.clone();
            *self.inner.value.write() = default.clone();
            self.inner.dirty.store(true, Ordering::Release);
            self.inner.persist(&default);
        }
    }

    pub fn is_valid(&self) -> bool {
        self.inner.validates(&*self.inner.value.read())
    }

    pub fn is_default(&self) -> bool {
        *self.inner.value.read() == self.inner.default
    }

    pub fn default_value(&self) -> &T {
        &self.inner.default
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::Acquire)
    }

    pub fn clear_dirty(&self) {
        self.inner.dirty.store(false, Ordering::Release);
    }

    pub fn id(&self) -> FieldId {
        self.inner.id
    }

    /// Owner path, `Section.Feature`
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn section(&self) -> &str {
        &self.inner.section
    }

    pub fn feature(&self) -> &str {
        &self.inner.feature
    }
}

impl<T: FieldValue> FieldInner<T> {
    fn validates(&self, value: &T) -> bool {
        let validator = self.validator.read().clone();
        validator.map_or(true, |v| v(value))
    }

    fn apply(&self, value: T, silent: bool) -> bool {
        if !self.validates(&value) {
            tracing::warn!("Validation failed for field '{}', value rejected", self.key);
            return false;
        }

        let change = {
            let _commit = self.commit.lock();
            let old = {
                let mut current = self.value.write();
                if *current == value {
                    return false;
                }
                std::mem::replace(&mut *current, value.clone())
            };

            self.dirty.store(true, Ordering::Release);
            self.persist(&value);
            FieldChange { old, new: value }
        };

        // Handlers may write this field again, so the commit lock is released first
        if !silent {
            self.changed.emit(&change);
        }
        true
    }

    fn persist(&self, value: &T) {
        self.store
            .set_feature_value(&self.section, &self.feature, &self.key, value);
        self.store.schedule_save(self.store.debounce(), false);
    }

    fn reload_from_store(&self) {
        let _commit = self.commit.lock();
        let mut loaded = self
            .store
            .try_get_feature_value::<T>(&self.section, &self.feature, &self.key)
            .unwrap_or_else(|| self.default.clone());

        if !self.validates(&loaded) {
            tracing::warn!(
                "Loaded value for field '{}' failed validation, using default",
                self.key
            );
            loaded = self.default.clone();
        }

        *self.value.write() = loaded;
        self.dirty.store(false, Ordering::Release);
    }

    fn serialize_into(&self, out: &mut Map<String, Value>) {
        match serde_json::to_value(&*self.value.read()) {
            Ok(json) => {
                out.insert(self.key.clone(), json);
            }
            Err(e) => tracing::warn!("Failed to serialize field '{}': {}", self.key, e),
        }
    }

    fn deserialize_from(&self, src: &Map<String, Value>) {
        let value = match src.get(&self.key) {
            Some(json) => match serde_json::from_value::<T>(json.clone()) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!("Failed to deserialize field '{}': {}", self.key, e);
                    self.default.clone()
                }
            },
            None => self.default.clone(),
        };

        let value = if self.validates(&value) {
            value
        } else {
            tracing::warn!(
                "Deserialized value for field '{}' failed validation, using default",
                self.key
            );
            self.default.clone()
        };

        let _commit = self.commit.lock();
        *self.value.write() = value;
        self.dirty.store(false, Ordering::Release);
    }
}

impl<T: FieldValue> ErasedField for FieldInner<T> {
    fn id(&self) -> FieldId {
        self.id
    }

    fn key(&self) -> &str {
        &self.key
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn serialize(&self, out: &mut Map<String, Value>) {
        self.serialize_into(out);
    }

    fn deserialize(&self, src: &Map<String, Value>) {
        self.deserialize_from(src);
    }

    fn reload(&self) {
        self.reload_from_store();
    }

    fn reset_to_default(&self) {
        self.apply(self.default.clone(), false);
    }

    fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }
}

impl<T: FieldValue> Drop for FieldInner<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(&self.path, self.id);
        }
    }
}

/// Working copy of a field's value, committed on drop
///
/// An invalid result is discarded with a warning; an unchanged one is a no-op.
pub struct FieldGuard<'a, T: FieldValue> {
    field: &'a Field<T>,
    original: T,
    value: T,
    done: bool,
}

impl<T: FieldValue> FieldGuard<'_, T> {
    /// Commit now; returns true if a change was applied
    pub fn commit(mut self) -> bool {
        self.finish()
    }

    fn finish(&mut self) -> bool {
        if std::mem::replace(&mut self.done, true) || self.value == self.original {
            return false;
        }

        let inner = &self.field.inner;
        if !inner.validates(&self.value) {
            tracing::warn!("Validation failed for field '{}', reverting", inner.key);
            return false;
        }

        let new = std::mem::replace(&mut self.value, self.original.clone());
        inner.apply(new, false)
    }
}

impl<T: FieldValue> Deref for FieldGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: FieldValue> DerefMut for FieldGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: FieldValue> Drop for FieldGuard<'_, T> {
    fn drop(&mut self) {
        self.finish();
    }
}
