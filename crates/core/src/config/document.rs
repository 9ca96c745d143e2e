//! Profile document shape
//!
//! ```json
//! {
//!   "version": 2,
//!   "features": { "<section>": { "<feature>": { "<key>": <value> } } },
//!   "metadata": { "created": 1700000000, "profile": "default" }
//! }
//! ```

use serde_json::{json, Map, Value};

/// Current document layout version
pub const CONFIG_VERSION: u32 = 2;

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Fresh document for `profile`
pub fn empty(profile: &str) -> Value {
    json!({
        "version": CONFIG_VERSION,
        "features": {},
        "metadata": {
            "created": unix_now(),
            "profile": profile,
        },
    })
}

/// Whether `doc` has the full three-level object shape
pub fn validate(doc: &Value) -> bool {
    let Some(root) = doc.as_object() else {
        return false;
    };
    let Some(features) = root.get("features").and_then(Value::as_object) else {
        return false;
    };

    features.values().all(|section| {
        section
            .as_object()
            .is_some_and(|s| s.values().all(Value::is_object))
    })
}

/// Fix the document shape in place, keeping every well-formed node
///
/// Returns true if anything changed. A non-object root cannot be repaired.
pub fn repair(doc: &mut Value, profile: &str) -> bool {
    let Some(root) = doc.as_object_mut() else {
        return false;
    };
    let mut repaired = false;

    if !root.get("features").is_some_and(Value::is_object) {
        root.insert("features".to_string(), Value::Object(Map::new()));
        repaired = true;
    }

    if let Some(Value::Object(features)) = root.get_mut("features") {
        for (section_name, section) in features.iter_mut() {
            let Some(section_map) = section.as_object_mut() else {
                tracing::warn!("Replacing malformed config section '{}'", section_name);
                *section = Value::Object(Map::new());
                repaired = true;
                continue;
            };

            for (feature_name, feature) in section_map.iter_mut() {
                if !feature.is_object() {
                    tracing::warn!(
                        "Replacing malformed config node '{}.{}'",
                        section_name,
                        feature_name
                    );
                    *feature = Value::Object(Map::new());
                    repaired = true;
                }
            }
        }
    }

    if !root.contains_key("version") {
        root.insert("version".to_string(), json!(CONFIG_VERSION));
        repaired = true;
    }

    if !root.get("metadata").is_some_and(Value::is_object) {
        root.insert(
            "metadata".to_string(),
            json!({ "created": unix_now(), "profile": profile }),
        );
        repaired = true;
    }

    repaired
}

/// Feature node at `features.<section>.<feature>`, if present and well-formed
pub fn feature_node<'a>(doc: &'a Value, section: &str, feature: &str) -> Option<&'a Map<String, Value>> {
    doc.get("features")?
        .get(section)?
        .get(feature)?
        .as_object()
}

/// Feature node at `features.<section>.<feature>`, creating every missing level
pub fn feature_node_mut<'a>(
    doc: &'a mut Value,
    section: &str,
    feature: &str,
) -> Option<&'a mut Map<String, Value>> {
    let root = doc.as_object_mut()?;
    let features = object_entry(root, "features")?;
    let section = object_entry(features, section)?;
    object_entry(section, feature)
}

fn object_entry<'a>(map: &'a mut Map<String, Value>, key: &str) -> Option<&'a mut Map<String, Value>> {
    let slot = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    slot.as_object_mut()
}
