//! Durable storage behind the subscription store.
//!
//! The service only ever needs load-all/insert/update/delete over whole
//! subscription rows, so [`SubscriptionRepository`] is that seam.
//! [`JsonFileRepository`] keeps everything in one pretty-printed JSON file
//! and rewrites it on each mutation; subscription churn is rare enough
//! that this stays cheap. [`MemoryRepository`] backs tests and ephemeral
//! deployments.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::subscription::Subscription;

/// Errors from the durable layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure.
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored file was not valid subscription JSON.
    #[error("storage encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Durable CRUD over subscription rows.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Every persisted subscription; used to warm the cache at startup.
    async fn load_all(&self) -> Result<Vec<Subscription>, StorageError>;

    async fn insert(&self, subscription: &Subscription) -> Result<(), StorageError>;

    async fn update(&self, subscription: &Subscription) -> Result<(), StorageError>;

    async fn delete(&self, id: Uuid) -> Result<(), StorageError>;
}

/// In-memory repository. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryRepository {
    rows: Mutex<HashMap<Uuid, Subscription>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionRepository for MemoryRepository {
    async fn load_all(&self) -> Result<Vec<Subscription>, StorageError> {
        Ok(self.rows.lock().await.values().cloned().collect())
    }

    async fn insert(&self, subscription: &Subscription) -> Result<(), StorageError> {
        self.rows
            .lock()
            .await
            .insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), StorageError> {
        self.rows
            .lock()
            .await
            .insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StorageError> {
        self.rows.lock().await.remove(&id);
        Ok(())
    }
}

/// File-backed repository: all rows live in `subscriptions.json` under the
/// data directory.
pub struct JsonFileRepository {
    path: PathBuf,
    rows: Mutex<HashMap<Uuid, Subscription>>,
}

impl JsonFileRepository {
    /// Open (or create) the data directory and load any existing rows.
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)?;
        let path = data_dir.join("subscriptions.json");

        let mut rows = HashMap::new();
        if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let stored: Vec<Subscription> = serde_json::from_str(&raw)?;
            for subscription in stored {
                rows.insert(subscription.id, subscription);
            }
        }
        debug!(path = %path.display(), rows = rows.len(), "Opened subscription storage");

        Ok(Self {
            path,
            rows: Mutex::new(rows),
        })
    }

    fn save(&self, rows: &HashMap<Uuid, Subscription>) -> Result<(), StorageError> {
        let mut stored: Vec<&Subscription> = rows.values().collect();
        // Stable order keeps the file diffable.
        stored.sort_by_key(|subscription| subscription.id);
        let raw = serde_json::to_string_pretty(&stored)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRepository for JsonFileRepository {
    async fn load_all(&self) -> Result<Vec<Subscription>, StorageError> {
        Ok(self.rows.lock().await.values().cloned().collect())
    }

    async fn insert(&self, subscription: &Subscription) -> Result<(), StorageError> {
        let mut rows = self.rows.lock().await;
        rows.insert(subscription.id, subscription.clone());
        self.save(&rows)
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), StorageError> {
        let mut rows = self.rows.lock().await;
        rows.insert(subscription.id, subscription.clone());
        self.save(&rows)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StorageError> {
        let mut rows = self.rows.lock().await;
        rows.remove(&id);
        self.save(&rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(repo: &str) -> Subscription {
        Subscription {
            id: Uuid::new_v4(),
            repo: repo.to_string(),
            user_id: "@dev:example.org".to_string(),
            channel_id: "!room:example.org".to_string(),
            remote_id: None,
        }
    }

    #[tokio::test]
    async fn test_memory_repository_crud() {
        let repository = MemoryRepository::new();
        let mut subscription = sample("octo/widgets");

        repository.insert(&subscription).await.unwrap();
        assert_eq!(repository.load_all().await.unwrap().len(), 1);

        subscription.remote_id = Some(42);
        repository.update(&subscription).await.unwrap();
        let rows = repository.load_all().await.unwrap();
        assert_eq!(rows[0].remote_id, Some(42));

        repository.delete(subscription.id).await.unwrap();
        assert!(repository.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_json_repository_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let subscription = sample("octo/widgets");

        {
            let repository = JsonFileRepository::new(dir.path()).unwrap();
            repository.insert(&subscription).await.unwrap();
        }

        let reopened = JsonFileRepository::new(dir.path()).unwrap();
        let rows = reopened.load_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], subscription);
    }

    #[tokio::test]
    async fn test_json_repository_update_and_delete_persist() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = sample("octo/widgets");
        let second = sample("octo/gadgets");

        {
            let repository = JsonFileRepository::new(dir.path()).unwrap();
            repository.insert(&first).await.unwrap();
            repository.insert(&second).await.unwrap();

            first.repo = "octo/renamed".to_string();
            repository.update(&first).await.unwrap();
            repository.delete(second.id).await.unwrap();
        }

        let reopened = JsonFileRepository::new(dir.path()).unwrap();
        let rows = reopened.load_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].repo, "octo/renamed");
    }

    #[tokio::test]
    async fn test_json_repository_empty_dir_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let repository = JsonFileRepository::new(dir.path()).unwrap();
        assert!(repository.load_all().await.unwrap().is_empty());
    }
}
