//! Entity payloads and content hashing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// Business data of an entity: a JSON object.
pub type Payload = Map<String, Value>;

/// SHA-256 digest of a payload's canonical JSON encoding.
///
/// Object keys are ordered, so two payloads with the same fields hash
/// identically regardless of insertion order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hashes a payload.
    #[must_use]
    pub fn of(payload: &Payload) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(canonical_json(payload).as_bytes());
        Self(hasher.finalize().into())
    }

    /// Returns the raw digest.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the lowercase hex rendering.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Serializes a payload with sorted keys at every level.
#[must_use]
pub fn canonical_json(payload: &Payload) -> String {
    // serde_json's default map is a BTreeMap, so serialization is already
    // key-ordered.
    Value::Object(payload.clone()).to_string()
}

/// Applies a shallow merge patch: each key in `patch` replaces the key in
/// `base`, and a `null` value removes it.
#[must_use]
pub fn merge_patch(base: &Payload, patch: &Payload) -> Payload {
    let mut merged = base.clone();
    for (key, value) in patch {
        if value.is_null() {
            merged.remove(key);
        } else {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Parses a JSON value into a payload, rejecting non-objects.
#[must_use]
pub fn payload_from_value(value: Value) -> Option<Payload> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn obj(value: Value) -> Payload {
        payload_from_value(value).unwrap()
    }

    #[test]
    fn hash_ignores_insertion_order() {
        let mut a = Payload::new();
        a.insert("b".into(), json!(2));
        a.insert("a".into(), json!(1));
        let b = obj(json!({"a": 1, "b": 2}));
        assert_eq!(ContentHash::of(&a), ContentHash::of(&b));
    }

    #[test]
    fn hash_changes_with_content() {
        let a = obj(json!({"status": "open"}));
        let b = obj(json!({"status": "closed"}));
        assert_ne!(ContentHash::of(&a), ContentHash::of(&b));
    }

    #[test]
    fn hex_is_64_chars() {
        let hash = ContentHash::of(&Payload::new());
        assert_eq!(hash.to_hex().len(), 64);
    }

    #[test]
    fn merge_patch_replaces_and_removes() {
        let base = obj(json!({"name": "pump", "serial": "A1", "notes": "x"}));
        let patch = obj(json!({"serial": "B2", "notes": null, "site": "north"}));
        let merged = merge_patch(&base, &patch);
        assert_eq!(merged, obj(json!({"name": "pump", "serial": "B2", "site": "north"})));
    }

    #[test]
    fn non_object_rejected() {
        assert!(payload_from_value(json!([1, 2])).is_none());
    }

    proptest! {
        #[test]
        fn hash_is_stable_for_equal_maps(entries in prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..12)) {
            let forward: Payload = entries.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
            let reverse: Payload = entries.iter().rev().map(|(k, v)| (k.clone(), json!(v))).collect();
            prop_assert_eq!(ContentHash::of(&forward), ContentHash::of(&reverse));
        }
    }
}
