//! Section/name scope grouping the fields of one feature

use serde_json::Map;

use super::registry::FieldRegistry;

/// A `(section, name)` pair addressing one feature node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigObject {
    section: String,
    name: String,
    path: String,
}

impl ConfigObject {
    pub fn new(section: &str, name: &str) -> Self {
        Self {
            section: section.to_string(),
            name: name.to_string(),
            path: format!("{}.{}", section, name),
        }
    }

    /// Owner path shared by this object's fields
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write every field under this path to the store and schedule a save
    pub fn save(&self, registry: &FieldRegistry) {
        let store = registry.store();
        for (key, value) in registry.serialize_fields(&self.path) {
            store.set_feature_value(&self.section, &self.name, &key, &value);
        }
        store.schedule_save(store.debounce(), false);
    }

    /// Load every field under this path from the stored feature node
    pub fn load(&self, registry: &FieldRegistry) {
        let node = registry
            .store()
            .feature_snapshot(&self.section, &self.name)
            .unwrap_or_else(Map::new);
        registry.deserialize_fields(&self.path, &node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use crate::events::EventBus;
    use crate::fields::Field;
    use std::sync::Arc;

    #[test]
    fn test_config_object_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(EventBus::new());
        let store = Arc::new(ConfigStore::new(dir.path(), bus.clone()));
        let registry = FieldRegistry::new(store.clone(), &bus);

        let object = ConfigObject::new("Combat", "Aim");
        assert_eq!(object.path(), "Combat.Aim");

        let fov = Field::new(&registry, object.path(), "fov", 5.0f64);
        fov.set_silent(12.0);
        object.save(&registry);
        assert_eq!(store.get_feature_value("Combat", "Aim", "fov", 0.0), 12.0);

        store.set_feature_value("Combat", "Aim", "fov", &30.0);
        object.load(&registry);
        assert_eq!(fov.get(), 30.0);

        store.reset_feature("Combat", "Aim");
        object.load(&registry);
        assert_eq!(fov.get(), 5.0);
    }
}
