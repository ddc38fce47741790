//! Content-addressed on-disk cache for analysis outputs
//!
//! Records are stored as JSON under `<root>/<analysis>/<key>.json`, where the
//! key is the SHA-256 of the canonical JSON of everything that determines
//! the output (analysis name, subject, and full settings). A stored record is
//! only reused when it was computed from the same number of events as the
//! current data; otherwise it is treated as a miss and overwritten by the
//! next [`ResultCache::store`].

use std::fs;
use std::path::{Path, PathBuf};

use memwave_core::types::FeatureSet;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::classify::ClassifierResult;
use crate::error::CacheResult;

/// A record that knows how many events it was computed from.
pub trait CacheRecord: Serialize + DeserializeOwned {
    /// Event count of the input the record was computed from
    fn n_events(&self) -> usize;

    /// Whether the record still matches data with `n_events` events
    fn is_fresh_for(&self, n_events: usize) -> bool {
        self.n_events() == n_events
    }
}

impl CacheRecord for ClassifierResult {
    fn n_events(&self) -> usize {
        self.source_events
    }

    fn is_fresh_for(&self, n_events: usize) -> bool {
        ClassifierResult::is_fresh_for(self, n_events)
    }
}

impl CacheRecord for FeatureSet {
    fn n_events(&self) -> usize {
        FeatureSet::n_events(self)
    }
}

/// Hex SHA-256 over the canonical JSON of `(analysis, subject, settings)`.
///
/// Object keys are emitted in sorted order, so equal settings always hash
/// equally regardless of field order in the source.
pub fn cache_key<S: Serialize + ?Sized>(analysis: &str, subject: &str, settings: &S) -> CacheResult<String> {
    let canonical = serde_json::to_string(&serde_json::to_value((analysis, subject, settings))?)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Directory-backed result cache.
#[derive(Clone, Debug)]
pub struct ResultCache {
    root: PathBuf,
}

impl ResultCache {
    /// Cache rooted at `root`; directories are created on first store
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File a record with this key lives in
    #[must_use]
    pub fn path_for(&self, analysis: &str, key: &str) -> PathBuf {
        self.root.join(analysis).join(format!("{key}.json"))
    }

    /// Load a stored record if it matches the current event count.
    ///
    /// Missing, stale, and unreadable records are all misses.
    pub fn load<R: CacheRecord>(&self, analysis: &str, key: &str, n_events: usize) -> CacheResult<Option<R>> {
        let Some(record) = self.load_any::<R>(analysis, key)? else {
            return Ok(None);
        };
        if record.is_fresh_for(n_events) {
            tracing::debug!(analysis, key, "cache hit");
            Ok(Some(record))
        } else {
            tracing::info!(
                analysis,
                stored = record.n_events(),
                current = n_events,
                "cached record has a different event count; recomputing"
            );
            Ok(None)
        }
    }

    /// Load a stored record without the freshness check.
    pub fn load_any<R: CacheRecord>(&self, analysis: &str, key: &str) -> CacheResult<Option<R>> {
        let path = self.path_for(analysis, key);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(analysis, key, "cache miss");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&text) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable cache record");
                Ok(None)
            }
        }
    }

    /// Write a record, replacing any previous one under the same key.
    pub fn store<R: CacheRecord>(&self, analysis: &str, key: &str, record: &R) -> CacheResult<PathBuf> {
        let path = self.path_for(analysis, key);
        let dir = self.root.join(analysis);
        fs::create_dir_all(&dir)?;

        // write-then-rename so readers never see a partial file
        let tmp = dir.join(format!("{key}.json.tmp"));
        fs::write(&tmp, serde_json::to_vec_pretty(record)?)?;
        fs::rename(&tmp, &path)?;
        tracing::debug!(path = %path.display(), "cached record stored");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        n: usize,
        value: String,
    }

    impl CacheRecord for Record {
        fn n_events(&self) -> usize {
            self.n
        }
    }

    #[derive(Serialize)]
    struct Settings {
        c: f64,
        phases: Vec<&'static str>,
    }

    #[test]
    fn test_key_is_stable_and_sensitive() {
        let a = Settings { c: 0.1, phases: vec!["enc"] };
        let b = Settings { c: 0.2, phases: vec!["enc"] };
        let key = cache_key("classify", "R1", &a).unwrap();
        assert_eq!(key.len(), 64);
        assert_eq!(key, cache_key("classify", "R1", &a).unwrap());
        assert_ne!(key, cache_key("classify", "R1", &b).unwrap());
        assert_ne!(key, cache_key("classify", "R2", &a).unwrap());
        assert_ne!(key, cache_key("cluster", "R1", &a).unwrap());
    }

    #[test]
    fn test_key_ignores_map_insertion_order() {
        let mut first = serde_json::Map::new();
        first.insert("b".into(), 2.into());
        first.insert("a".into(), 1.into());
        let mut second = serde_json::Map::new();
        second.insert("a".into(), 1.into());
        second.insert("b".into(), 2.into());
        assert_eq!(
            cache_key("x", "R1", &first).unwrap(),
            cache_key("x", "R1", &second).unwrap()
        );
    }

    #[test]
    fn test_store_then_load_fresh() {
        let dir = TempDir::new().unwrap();
        let cache = ResultCache::new(dir.path());
        let record = Record { n: 12, value: "ok".into() };
        let path = cache.store("classify", "abc", &record).unwrap();
        assert_eq!(path, dir.path().join("classify").join("abc.json"));

        let loaded: Option<Record> = cache.load("classify", "abc", 12).unwrap();
        assert_eq!(loaded, Some(record));
    }

    #[test]
    fn test_stale_record_is_a_miss_and_overwritten() {
        let dir = TempDir::new().unwrap();
        let cache = ResultCache::new(dir.path());
        cache.store("classify", "abc", &Record { n: 12, value: "old".into() }).unwrap();

        let loaded: Option<Record> = cache.load("classify", "abc", 10).unwrap();
        assert!(loaded.is_none());

        cache.store("classify", "abc", &Record { n: 10, value: "new".into() }).unwrap();
        let loaded: Option<Record> = cache.load("classify", "abc", 10).unwrap();
        assert_eq!(loaded.unwrap().value, "new");
    }

    #[test]
    fn test_missing_and_corrupt_are_misses() {
        let dir = TempDir::new().unwrap();
        let cache = ResultCache::new(dir.path());
        let missing: Option<Record> = cache.load("classify", "nope", 1).unwrap();
        assert!(missing.is_none());

        fs::create_dir_all(dir.path().join("classify")).unwrap();
        fs::write(cache.path_for("classify", "bad"), "{not json").unwrap();
        let corrupt: Option<Record> = cache.load("classify", "bad", 1).unwrap();
        assert!(corrupt.is_none());
    }
}
