//! Content-addressed cache of pipeline results.
//!
//! Entries are JSON snapshots named by a blake3 digest of the source sheet
//! bytes and the configuration. Editing a sheet or changing any option
//! yields a new key; stale entries are only removed by [`ResultCache::clear`].

use crate::config::Config;
use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

const KEY_NAMESPACE: &[u8] = b"metabo-eda/v1";

/// Directory of cached results.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultCache {
    dir: PathBuf,
}

impl ResultCache {
    /// Cache rooted at `dir`. The directory is created on first write.
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache under the user's cache directory.
    pub fn default_location() -> Self {
        Self::new(default_cache_dir())
    }

    /// Cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Key for the given source files and configuration.
    pub fn key<P: AsRef<Path>>(sources: &[P], config: &Config) -> Result<String> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(KEY_NAMESPACE);
        for source in sources {
            let bytes = fs::read(source.as_ref())?;
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(&bytes);
        }
        hasher.update(&serde_json::to_vec(config)?);
        Ok(hasher.finalize().to_hex().to_string())
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Check if an entry exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entry_path(key).is_file()
    }

    /// Read an entry. Missing or unreadable snapshots are a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.entry_path(key);
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(value) => {
                tracing::debug!("Cache hit: {}", path.display());
                Some(value)
            }
            Err(e) => {
                tracing::warn!("Ignoring corrupt cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Store an entry, replacing any previous snapshot for `key`.
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.entry_path(key);
        let tmp = self.dir.join(format!("{}.json.tmp", key));
        fs::write(&tmp, serde_json::to_vec(value)?)?;
        fs::rename(&tmp, &path)?;
        tracing::debug!("Cached result at {}", path.display());
        Ok(path)
    }

    /// Remove every entry.
    pub fn clear(&self) -> Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("metabo-eda")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_get_clear() {
        let dir = TempDir::new().unwrap();
        let cache = ResultCache::new(dir.path().join("cache"));

        assert!(cache.get::<Vec<f64>>("abc").is_none());
        cache.put("abc", &vec![1.0, 2.5]).unwrap();
        assert!(cache.contains("abc"));
        assert_eq!(cache.get::<Vec<f64>>("abc"), Some(vec![1.0, 2.5]));

        cache.clear().unwrap();
        assert!(!cache.contains("abc"));
    }

    #[test]
    fn test_floats_roundtrip_exactly() {
        let dir = TempDir::new().unwrap();
        let cache = ResultCache::new(dir.path());
        let values: Vec<f64> = (1..200)
            .map(|i| (i as f64 * 0.731).ln() / 3.0 - (i as f64).sqrt() * 1e-7)
            .chain([0.1 + 0.2, 1.0 / 3.0, f64::MIN_POSITIVE, 2.2250738585072014e-300])
            .collect();

        cache.put("floats", &values).unwrap();
        let cached: Vec<f64> = cache.get("floats").unwrap();
        assert_eq!(cached.len(), values.len());
        for (a, b) in cached.iter().zip(&values) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_key_changes_with_content_and_config() {
        let dir = TempDir::new().unwrap();
        let sheet = dir.path().join("data_matrix.tsv");
        fs::write(&sheet, "compound_id\tS1\ncompound_001\t1\n").unwrap();
        let config = Config::default();

        let k1 = ResultCache::key(&[&sheet], &config).unwrap();
        assert_eq!(k1, ResultCache::key(&[&sheet], &config).unwrap());

        fs::write(&sheet, "compound_id\tS1\ncompound_001\t2\n").unwrap();
        let k2 = ResultCache::key(&[&sheet], &config).unwrap();
        assert_ne!(k1, k2);

        let mut other = Config::default();
        other.preprocessing.knn_k = 5;
        assert_ne!(k2, ResultCache::key(&[&sheet], &other).unwrap());
    }

    #[test]
    fn test_corrupt_entry_is_miss() {
        let dir = TempDir::new().unwrap();
        let cache = ResultCache::new(dir.path());
        fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        assert!(cache.get::<Vec<f64>>("bad").is_none());
    }
}
