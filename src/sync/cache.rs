//! Mirror cache: the last response body a source returned for an object,
//! keyed by a digest of the object's external URI. The renderer merges this
//! mirror data under local values, so a read never has to call the source.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as Json;
use sha2::{Digest, Sha256};

/// Cache key for a URI. A digest rather than the raw URI, so keys have a
/// fixed shape regardless of what characters the source puts in its URLs.
pub fn mirror_key(uri: &str) -> String {
    let digest = Sha256::digest(uri.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

pub trait MirrorCache: Send + Sync {
    fn put(&self, uri: &str, body: &Json);
    fn get(&self, uri: &str) -> Option<Json>;
    fn remove(&self, uri: &str);
}

/// Process-local mirror cache. Suits a single gateway instance; a shared
/// deployment would back this trait with an external store instead.
#[derive(Default)]
pub struct MemoryMirrorCache {
    entries: RwLock<HashMap<String, Json>>,
}

impl MemoryMirrorCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MirrorCache for MemoryMirrorCache {
    fn put(&self, uri: &str, body: &Json) {
        let mut entries = self.entries.write().expect("mirror cache lock poisoned");
        entries.insert(mirror_key(uri), body.clone());
    }

    fn get(&self, uri: &str) -> Option<Json> {
        let entries = self.entries.read().expect("mirror cache lock poisoned");
        entries.get(&mirror_key(uri)).cloned()
    }

    fn remove(&self, uri: &str) {
        let mut entries = self.entries.write().expect("mirror cache lock poisoned");
        entries.remove(&mirror_key(uri));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mirror_key_is_stable_hex() {
        let key = mirror_key("https://api.example.com/pets/1");
        assert_eq!(key.len(), 64);
        assert_eq!(key, mirror_key("https://api.example.com/pets/1"));
        assert_ne!(key, mirror_key("https://api.example.com/pets/2"));
    }

    #[test]
    fn put_get_remove_round_trip() {
        let cache = MemoryMirrorCache::new();
        cache.put("https://api.example.com/pets/1", &json!({"name": "Rex"}));
        assert_eq!(cache.get("https://api.example.com/pets/1"), Some(json!({"name": "Rex"})));
        cache.remove("https://api.example.com/pets/1");
        assert!(cache.get("https://api.example.com/pets/1").is_none());
    }
}
