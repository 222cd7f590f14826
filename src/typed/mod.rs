//! Typed Cache Module
//!
//! Serializes objects to JSON and stores them through a [`DiskCache`].

use std::any::type_name;
use std::ops::Deref;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::config::CacheConfig;
use crate::error::Result;
use crate::record::DiskCache;

// == Json Disk Cache ==
/// Best-effort object cache: reads return `None` on any problem and writes
/// never fail from the caller's point of view.
///
/// Derefs to the underlying [`DiskCache`] for freshness checks, eviction and
/// clearing.
#[derive(Debug)]
pub struct JsonDiskCache {
    cache: DiskCache,
}

impl JsonDiskCache {
    pub fn open(config: CacheConfig) -> Result<Self> {
        Ok(Self::new(DiskCache::open(config)?))
    }

    pub fn new(cache: DiskCache) -> Self {
        Self { cache }
    }

    // == Get ==
    /// Decodes the object cached under `key`.
    ///
    /// Absent, blank, `null` and undecodable values all read as `None`.
    pub fn get_cached_object<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let json = self.cache.get(key)?;
        if json.trim().is_empty() {
            return None;
        }
        match serde_json::from_str::<Option<T>>(&json) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    "Could not decode cached {} as {}: {}",
                    key,
                    type_name::<T>(),
                    e
                );
                None
            }
        }
    }

    // == Put ==
    /// Encodes `value` as JSON and caches it. `None` is stored as `null`.
    ///
    /// Failures are logged and swallowed.
    pub fn cache_object<T: Serialize>(&self, key: &str, value: Option<&T>) {
        let json = match serde_json::to_string(&value) {
            Ok(json) => json,
            Err(e) => {
                warn!("Could not encode {} for {}: {}", type_name::<T>(), key, e);
                return;
            }
        };
        if let Err(e) = self.cache.put(key, &json) {
            warn!("Could not cache {}: {}", key, e);
        }
    }
}

impl Deref for JsonDiskCache {
    type Target = DiskCache;

    fn deref(&self) -> &DiskCache {
        &self.cache
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::{BTreeMap, HashMap};
    use tempfile::{tempdir, TempDir};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Community {
        id: u64,
        name: String,
        nsfw: bool,
        tags: Vec<String>,
    }

    fn open_cache() -> (TempDir, JsonDiskCache) {
        let dir = tempdir().unwrap();
        let cache = JsonDiskCache::open(CacheConfig::new(dir.path(), 1, 1024 * 1024)).unwrap();
        (dir, cache)
    }

    fn sample() -> Community {
        Community {
            id: 42,
            name: "rust".to_string(),
            nsfw: false,
            tags: vec!["programming".to_string(), "systems".to_string()],
        }
    }

    #[test]
    fn test_object_round_trip() {
        let (_dir, cache) = open_cache();

        cache.cache_object("community/42", Some(&sample()));

        assert_eq!(cache.get_cached_object::<Community>("community/42"), Some(sample()));
    }

    #[test]
    fn test_collection_round_trip() {
        let (_dir, cache) = open_cache();
        let mut tabs = BTreeMap::new();
        tabs.insert("home".to_string(), vec![1u32, 2, 3]);
        tabs.insert("saved".to_string(), vec![]);

        cache.cache_object("tabs", Some(&tabs));

        assert_eq!(
            cache.get_cached_object::<BTreeMap<String, Vec<u32>>>("tabs"),
            Some(tabs)
        );
    }

    #[test]
    fn test_missing_object_is_none() {
        let (_dir, cache) = open_cache();
        assert_eq!(cache.get_cached_object::<Community>("nothing"), None);
    }

    #[test]
    fn test_none_reads_back_as_absent() {
        let (_dir, cache) = open_cache();

        cache.cache_object::<Community>("community/1", None);

        assert!(cache.has("community/1"));
        assert_eq!(cache.get_cached_object::<Community>("community/1"), None);
    }

    #[test]
    fn test_wrong_shape_is_none() {
        let (_dir, cache) = open_cache();
        cache.put("community/7", r#"{"id":"not a number"}"#).unwrap();

        assert_eq!(cache.get_cached_object::<Community>("community/7"), None);
    }

    #[test]
    fn test_blank_value_is_none() {
        let (_dir, cache) = open_cache();
        cache.put("blank", "   ").unwrap();

        assert_eq!(cache.get_cached_object::<HashMap<String, u32>>("blank"), None);
    }

    #[test]
    fn test_overwrite_and_evict_through_deref() {
        let (_dir, cache) = open_cache();
        let mut updated = sample();
        updated.name = "rust-lang".to_string();

        cache.cache_object("community/42", Some(&sample()));
        cache.cache_object("community/42", Some(&updated));
        assert_eq!(cache.get_cached_object::<Community>("community/42"), Some(updated));
        assert!(cache.has_fresh_cache("community/42", 60_000));

        cache.evict("community/42");
        assert_eq!(cache.get_cached_object::<Community>("community/42"), None);
    }
}
