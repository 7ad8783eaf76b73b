use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

/// Durable string storage keyed by name.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Previously stored value, if any
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Durably store `value` and hand it back
    async fn set(&self, key: &str, value: String) -> Result<String>;

    async fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<String> {
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.clone());
        Ok(value)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.values.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("auth").await.expect("get"), None);

        let stored = store.set("auth", "value".to_string()).await.expect("set");
        assert_eq!(stored, "value");
        assert_eq!(store.get("auth").await.expect("get").as_deref(), Some("value"));

        store.remove("auth").await.expect("remove");
        assert_eq!(store.get("auth").await.expect("get"), None);
    }
}
