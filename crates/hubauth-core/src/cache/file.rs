use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::KeyValueStore;

/// A stored value together with the time it was written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }
}

/// Stores each key as `<cache_dir>/<key>.json`.
pub struct FileStore {
    cache_dir: PathBuf,
}

impl FileStore {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache directory {}", cache_dir.display()))?;
        Ok(Self { cache_dir })
    }

    fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", key))
    }

    /// Load a value with its write time
    pub async fn load(&self, key: &str) -> Result<Option<CachedData<String>>> {
        let contents = match tokio::fs::read_to_string(self.cache_path(key)).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read cache file: {}", key))
            }
        };
        let cached: CachedData<String> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache file: {}", key))?;

        Ok(Some(cached))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load(key).await?.map(|cached| cached.data))
    }

    async fn set(&self, key: &str, value: String) -> Result<String> {
        let cached = CachedData::new(value);
        let contents = serde_json::to_string_pretty(&cached)?;
        // Readers only ever see a complete file
        let path = self.cache_path(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents)
            .await
            .with_context(|| format!("Failed to write cache file: {}", key))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to write cache file: {}", key))?;
        debug!(key, "Value written to file store");
        Ok(cached.data)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.cache_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove cache file: {}", key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_cached_data_age_display() {
        let mut cached = CachedData::new("x".to_string());
        assert_eq!(cached.age_display(), "just now");

        cached.cached_at = Utc::now() - Duration::minutes(5);
        assert_eq!(cached.age_display(), "5m ago");

        cached.cached_at = Utc::now() - Duration::minutes(125);
        assert_eq!(cached.age_display(), "2h ago");

        cached.cached_at = Utc::now() - Duration::days(3);
        assert_eq!(cached.age_display(), "3d ago");

        cached.cached_at = Utc::now() + Duration::minutes(10);
        assert_eq!(cached.age_display(), "just now");
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().expect("tempdir");

        let store = FileStore::new(dir.path().to_path_buf()).expect("store");
        store.set("auth", "{\"a\":1}".to_string()).await.expect("set");

        let reopened = FileStore::new(dir.path().to_path_buf()).expect("store");
        assert_eq!(reopened.get("auth").await.expect("get").as_deref(), Some("{\"a\":1}"));
        assert!(reopened.load("auth").await.expect("load").is_some());

        reopened.remove("auth").await.expect("remove");
        assert_eq!(store.get("auth").await.expect("get"), None);
        // Removing twice is fine
        reopened.remove("auth").await.expect("remove again");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_file_store_serves_concurrent_callers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = std::sync::Arc::new(FileStore::new(dir.path().to_path_buf()).expect("store"));

        let writers = (0..8).map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                let key = format!("key-{}", i);
                store.set(&key, format!("value-{}", i)).await.expect("set");
                store.get(&key).await.expect("get")
            })
        });
        let results = futures::future::join_all(writers).await;

        for (i, result) in results.into_iter().enumerate() {
            assert_eq!(result.expect("task"), Some(format!("value-{}", i)));
        }
        assert_eq!(store.get("missing").await.expect("get"), None);
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("auth.json"), "not json").expect("write");

        let store = FileStore::new(dir.path().to_path_buf()).expect("store");
        assert!(store.get("auth").await.is_err());
    }
}
