//! Registry of live fields, keyed by owner path

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::config::ConfigStore;
use crate::events::{panic_message, EventBus, Subscription};

/// Unique id of one registered field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(u64);

/// Type-erased operations the registry performs on a field
pub trait ErasedField: Send + Sync {
    fn id(&self) -> FieldId;
    fn key(&self) -> &str;
    fn path(&self) -> &str;

    /// Write `{key: value}` into `out`
    fn serialize(&self, out: &mut Map<String, Value>);

    /// Silently take the value stored under `key`, or the default
    fn deserialize(&self, src: &Map<String, Value>);

    /// Silently re-read the value from the config store
    fn reload(&self);

    fn reset_to_default(&self);
    fn is_dirty(&self) -> bool;
    fn clear_dirty(&self);
}

type Entry = (FieldId, Weak<dyn ErasedField>);

/// Every live field, grouped by owner path
///
/// Holds weak references only; a field unregisters itself when its last
/// handle is dropped.
pub struct FieldRegistry {
    store: Arc<ConfigStore>,
    fields: Mutex<HashMap<String, Vec<Entry>>>,
    next_id: AtomicU64,
    _reload: Subscription,
}

impl FieldRegistry {
    /// Create a registry that reloads every field on `bus.reload_fields`
    pub fn new(store: Arc<ConfigStore>, bus: &EventBus) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let reload = bus.reload_fields.subscribe(move |_| {
                if let Some(registry) = weak.upgrade() {
                    registry.reload_all_fields();
                }
            });

            Self {
                store,
                fields: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                _reload: reload,
            }
        })
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    pub(crate) fn next_id(&self) -> FieldId {
        FieldId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn register(&self, path: &str, id: FieldId, field: Weak<dyn ErasedField>) {
        self.fields
            .lock()
            .entry(path.to_string())
            .or_default()
            .push((id, field));
    }

    pub fn unregister(&self, path: &str, id: FieldId) {
        let mut fields = self.fields.lock();
        let Some(entries) = fields.get_mut(path) else {
            return;
        };

        if let Some(pos) = entries.iter().position(|(entry_id, _)| *entry_id == id) {
            entries.swap_remove(pos);
        }
        if entries.is_empty() {
            fields.remove(path);
        }
    }

    /// Live fields owned by `path`, in id order
    pub fn get_fields(&self, path: &str) -> Vec<Arc<dyn ErasedField>> {
        let fields = self.fields.lock();
        let mut live: Vec<_> = fields
            .get(path)
            .into_iter()
            .flatten()
            .filter_map(|(_, weak)| weak.upgrade())
            .collect();
        live.sort_by_key(|field| field.id());
        live
    }

    pub fn get_all_fields(&self) -> Vec<Arc<dyn ErasedField>> {
        let fields = self.fields.lock();
        let mut live: Vec<_> = fields
            .values()
            .flatten()
            .filter_map(|(_, weak)| weak.upgrade())
            .collect();
        live.sort_by_key(|field| field.id());
        live
    }

    /// Owner paths with at least one registered field, sorted
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<_> = self.fields.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.fields.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Re-read every field from the store; a panicking field is logged and skipped
    pub fn reload_all_fields(&self) {
        let fields = self.get_all_fields();
        tracing::debug!("Reloading {} fields", fields.len());

        for field in fields {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| field.reload())) {
                tracing::error!(
                    "Field '{}.{}' panicked during reload: {}",
                    field.path(),
                    field.key(),
                    panic_message(&*payload)
                );
            }
        }
    }

    pub fn serialize_fields(&self, path: &str) -> Map<String, Value> {
        let mut out = Map::new();
        for field in self.get_fields(path) {
            field.serialize(&mut out);
        }
        out
    }

    pub fn deserialize_fields(&self, path: &str, src: &Map<String, Value>) {
        for field in self.get_fields(path) {
            field.deserialize(src);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Field;

    fn setup() -> (tempfile::TempDir, Arc<EventBus>, Arc<FieldRegistry>) {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(EventBus::new());
        let store = Arc::new(ConfigStore::new(dir.path(), bus.clone()));
        let registry = FieldRegistry::new(store, &bus);
        (dir, bus, registry)
    }

    #[test]
    fn test_register_and_drop_unregisters() {
        let (_dir, _bus, registry) = setup();

        let a = Field::new(&registry, "Player.Fov", "value", 90.0f64);
        let b = Field::new(&registry, "Player.Fov", "enabled", false);
        let c = Field::new(&registry, "Combat.Aim", "enabled", false);

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.paths(), vec!["Combat.Aim", "Player.Fov"]);
        assert_eq!(registry.get_fields("Player.Fov").len(), 2);

        drop(b);
        assert_eq!(registry.get_fields("Player.Fov").len(), 1);

        // Clones keep the field alive
        let a2 = a.clone();
        drop(a);
        assert_eq!(registry.len(), 2);
        drop(a2);
        drop(c);
        assert!(registry.is_empty());
        assert!(registry.paths().is_empty());
    }

    #[test]
    fn test_reload_event_reloads_all_fields() {
        let (_dir, bus, registry) = setup();
        let fov = Field::new(&registry, "Player.Fov", "value", 90i32);
        let name = Field::new(&registry, "Game.Lobby", "name", String::from("none"));

        let store = registry.store().clone();
        store.set_feature_value("Player", "Fov", "value", &120);
        store.set_feature_value("Game", "Lobby", "name", "custom");
        assert_eq!(fov.get(), 90);

        bus.reload_fields.emit(&());
        assert_eq!(fov.get(), 120);
        assert_eq!(name.get(), "custom");
    }

    #[test]
    fn test_reload_isolates_panicking_field() {
        let (_dir, _bus, registry) = setup();

        struct Exploding(FieldId);
        impl ErasedField for Exploding {
            fn id(&self) -> FieldId {
                self.0
            }
            fn key(&self) -> &str {
                "boom"
            }
            fn path(&self) -> &str {
                "Debug.Boom"
            }
            fn serialize(&self, _out: &mut Map<String, Value>) {}
            fn deserialize(&self, _src: &Map<String, Value>) {}
            fn reload(&self) {
                panic!("reload failed");
            }
            fn reset_to_default(&self) {}
            fn is_dirty(&self) -> bool {
                false
            }
            fn clear_dirty(&self) {}
        }

        let id = registry.next_id();
        let exploding: Arc<dyn ErasedField> = Arc::new(Exploding(id));
        registry.register("Debug.Boom", id, Arc::downgrade(&exploding));

        let later = Field::new(&registry, "Player.Speed", "value", 1i32);
        registry
            .store()
            .set_feature_value("Player", "Speed", "value", &5);

        registry.reload_all_fields();
        assert_eq!(later.get(), 5);
    }

    #[test]
    fn test_serialize_deserialize_fields() {
        let (_dir, _bus, registry) = setup();
        let enabled = Field::new(&registry, "Player.Fly", "enabled", false);
        let speed = Field::new(&registry, "Player.Fly", "speed", 2.0f64);

        enabled.set_silent(true);
        let out = registry.serialize_fields("Player.Fly");
        assert_eq!(out["enabled"], Value::Bool(true));
        assert_eq!(out["speed"], serde_json::json!(2.0));

        let mut src = Map::new();
        src.insert("speed".to_string(), serde_json::json!(7.5));
        registry.deserialize_fields("Player.Fly", &src);

        assert_eq!(speed.get(), 7.5);
        // Missing key falls back to the default
        assert!(!enabled.get());
        assert!(!speed.is_dirty());
    }
}
