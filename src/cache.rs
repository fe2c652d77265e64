use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const CURRENT_KEY: &str = "oral-dnb-current";
pub const JURY_KEY: &str = "oral-dnb-jury";
pub const HISTORY_KEY: &str = "oral-dnb-history";
pub const IMPORTED_KEY: &str = "oral-dnb-imported-juries";

const CACHE_FILE: &str = "local-cache.json";

/// Synchronous key-value string store for draft/offline continuity, one JSON
/// file per workspace. Reads are tolerant: a missing or corrupt file, or a
/// malformed value, is treated as absent and logged, never an error to the
/// caller.
#[derive(Debug, Clone)]
pub struct LocalCache {
    path: PathBuf,
}

impl LocalCache {
    pub fn open(workspace: &Path) -> LocalCache {
        LocalCache {
            path: workspace.join(CACHE_FILE),
        }
    }

    fn read_map(&self) -> BTreeMap<String, String> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(_) => return BTreeMap::new(),
        };
        match serde_json::from_str(&text) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cache file corrupt, treating as empty");
                BTreeMap::new()
            }
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        let text = serde_json::to_string_pretty(map).context("failed to serialize cache")?;
        std::fs::write(&self.path, text)
            .with_context(|| format!("failed to write cache file {}", self.path.display()))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.read_map().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.read_map();
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let mut map = self.read_map();
        if map.remove(key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }

    /// Reads a JSON-serialized value; malformed content is logged and
    /// treated as absent.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(key, error = %e, "cache value malformed, treating as absent");
                None
            }
        }
    }

    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value).context("failed to serialize cache value")?;
        self.set(key, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::EvaluationState;

    fn temp_workspace(tag: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "oraljuryd-cache-{}-{}",
            tag,
            std::process::id()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    #[test]
    fn round_trips_string_and_json_values() {
        let cache = LocalCache::open(&temp_workspace("roundtrip"));
        cache.set(JURY_KEY, "{\"juryNumber\":\"4\"}").expect("set");
        assert_eq!(cache.get(JURY_KEY).as_deref(), Some("{\"juryNumber\":\"4\"}"));

        let mut draft = EvaluationState::default();
        draft.candidate.nom = "Durand".to_string();
        cache.set_json(CURRENT_KEY, &draft).expect("set json");
        let loaded: EvaluationState = cache.get_json(CURRENT_KEY).expect("get json");
        assert_eq!(loaded.candidate.nom, "Durand");

        cache.remove(CURRENT_KEY).expect("remove");
        assert!(cache.get(CURRENT_KEY).is_none());
    }

    #[test]
    fn malformed_value_reads_as_absent() {
        let cache = LocalCache::open(&temp_workspace("malformed"));
        cache.set(CURRENT_KEY, "{not json").expect("set");
        assert!(cache.get_json::<EvaluationState>(CURRENT_KEY).is_none());
        // The raw string is still there; only the typed read treats it as absent.
        assert!(cache.get(CURRENT_KEY).is_some());
    }

    #[test]
    fn corrupt_cache_file_reads_as_empty() {
        let workspace = temp_workspace("corrupt");
        std::fs::write(workspace.join(CACHE_FILE), "????").expect("write corrupt file");
        let cache = LocalCache::open(&workspace);
        assert!(cache.get(CURRENT_KEY).is_none());
        cache.set(CURRENT_KEY, "ok").expect("set over corrupt file");
        assert_eq!(cache.get(CURRENT_KEY).as_deref(), Some("ok"));
    }
}
