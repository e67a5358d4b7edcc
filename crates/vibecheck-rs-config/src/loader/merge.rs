//! JSON merge for layered configuration.

use serde_json::{Map, Value};

/// Merge `overlay` into `base`, recursing through objects.
///
/// Keys that `constraints` pins to a non-object value are locked and keep the
/// value already in `base`.
pub(super) fn merge_layer(base: &mut Value, overlay: &Value, constraints: Option<&Value>) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let locked = match constraints {
                None => None,
                Some(Value::Object(map)) => Some(map),
                Some(_) => return,
            };
            for (key, value) in overlay_map {
                let constraint = locked.and_then(|map| map.get(key));
                if matches!(constraint, Some(pinned) if !pinned.is_object()) {
                    continue;
                }
                match base_map.get_mut(key) {
                    Some(existing) => merge_layer(existing, value, constraint),
                    None if constraint.is_some() => {
                        let mut fresh = Value::Object(Map::new());
                        merge_layer(&mut fresh, value, constraint);
                        base_map.insert(key.clone(), fresh);
                    }
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (slot, overlay_value) => {
            if constraints.is_none() {
                *slot = overlay_value.clone();
            }
        }
    }
}
