//! Webhook subscriptions and their owning store.
//!
//! A [`Subscription`] binds one upstream repository to one destination
//! channel. The [`SubscriptionStore`] keeps every subscription in memory
//! and writes through to an injected [`SubscriptionRepository`]. Reads are
//! cache-only; intake never waits on the durable layer. Lifecycle updates
//! driven by webhook traffic (hook id recording, renames, channel
//! migration) apply to the cache first and log a durable-write failure
//! instead of propagating it, so one bad disk write cannot wedge intake.
//!
//! Shared secrets are never stored. Each subscription's secret is derived
//! on demand from the process root secret, so a database leak alone does
//! not let anyone forge deliveries.

use std::collections::HashMap;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::storage::{StorageError, SubscriptionRepository};

type HmacSha256 = Hmac<Sha256>;

/// One webhook registration: an upstream repository wired to a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Stable identifier; also the per-subscription intake path segment.
    pub id: Uuid,

    /// Upstream repository in "owner/name" form.
    pub repo: String,

    /// User that registered the subscription.
    pub user_id: String,

    /// Channel the rendered notices are destined for.
    pub channel_id: String,

    /// Hook id assigned by the upstream, recorded from the first ping.
    #[serde(default)]
    pub remote_id: Option<i64>,
}

impl Subscription {
    /// Identity used by the shared intake route.
    ///
    /// Derived deterministically from the channel so that coalescing state
    /// for one channel never mixes with another's, while repeated
    /// deliveries for the same channel keep landing on the same identity.
    pub fn global(channel_id: impl Into<String>) -> Self {
        let channel_id = channel_id.into();
        Self {
            id: Uuid::new_v5(&Uuid::NAMESPACE_OID, channel_id.as_bytes()),
            repo: "unknown/unknown".to_string(),
            user_id: "global".to_string(),
            channel_id,
            remote_id: None,
        }
    }
}

/// Errors from explicit subscription management.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// The (repository, channel) pair is already registered.
    #[error("a webhook for {repo} already exists in {channel}")]
    AlreadyExists { repo: String, channel: String },

    /// No subscription with that id.
    #[error("webhook {0} not found")]
    NotFound(Uuid),

    /// The durable layer failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// In-memory subscription cache with write-through persistence.
pub struct SubscriptionStore {
    repository: Arc<dyn SubscriptionRepository>,
    cache: RwLock<HashMap<Uuid, Subscription>>,
    root_secret: String,
}

impl SubscriptionStore {
    pub fn new(repository: Arc<dyn SubscriptionRepository>, root_secret: impl Into<String>) -> Self {
        Self {
            repository,
            cache: RwLock::new(HashMap::new()),
            root_secret: root_secret.into(),
        }
    }

    /// Warm the cache from the durable layer. Returns how many rows loaded.
    pub async fn load(&self) -> Result<usize, SubscriptionError> {
        let rows = self.repository.load_all().await?;
        let mut cache = self.cache.write().await;
        cache.clear();
        for subscription in rows {
            cache.insert(subscription.id, subscription);
        }
        Ok(cache.len())
    }

    /// Register a new subscription. One per (repository, channel) pair.
    pub async fn create(
        &self,
        repo: impl Into<String>,
        user_id: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Result<Subscription, SubscriptionError> {
        let repo = repo.into();
        let channel_id = channel_id.into();

        if self.find(&repo, &channel_id).await.is_some() {
            return Err(SubscriptionError::AlreadyExists {
                repo,
                channel: channel_id,
            });
        }

        let subscription = Subscription {
            id: Uuid::new_v4(),
            repo,
            user_id: user_id.into(),
            channel_id,
            remote_id: None,
        };
        self.repository.insert(&subscription).await?;
        self.cache
            .write()
            .await
            .insert(subscription.id, subscription.clone());
        info!(
            id = %subscription.id,
            repo = %subscription.repo,
            channel = %subscription.channel_id,
            "Subscription created"
        );
        Ok(subscription)
    }

    pub async fn get(&self, id: Uuid) -> Option<Subscription> {
        self.cache.read().await.get(&id).cloned()
    }

    /// Look a subscription up by its (repository, channel) pair.
    pub async fn find(&self, repo: &str, channel_id: &str) -> Option<Subscription> {
        self.cache
            .read()
            .await
            .values()
            .find(|subscription| subscription.repo == repo && subscription.channel_id == channel_id)
            .cloned()
    }

    pub async fn list_for_channel(&self, channel_id: &str) -> Vec<Subscription> {
        self.cache
            .read()
            .await
            .values()
            .filter(|subscription| subscription.channel_id == channel_id)
            .cloned()
            .collect()
    }

    /// Drop a subscription from the cache and the durable layer.
    ///
    /// The cache entry is gone even when the durable delete fails, so
    /// intake stops accepting deliveries for it immediately.
    pub async fn remove(&self, id: Uuid) -> Result<Subscription, SubscriptionError> {
        let removed = self
            .cache
            .write()
            .await
            .remove(&id)
            .ok_or(SubscriptionError::NotFound(id))?;
        self.repository.delete(id).await?;
        info!(id = %id, repo = %removed.repo, "Subscription removed");
        Ok(removed)
    }

    /// Record the hook id the upstream reported in its ping.
    pub async fn set_remote_id(&self, id: Uuid, remote_id: i64) {
        let updated = {
            let mut cache = self.cache.write().await;
            match cache.get_mut(&id) {
                Some(subscription) if subscription.remote_id != Some(remote_id) => {
                    subscription.remote_id = Some(remote_id);
                    Some(subscription.clone())
                }
                _ => None,
            }
        };
        if let Some(subscription) = updated {
            info!(id = %id, remote_id, "Recorded upstream hook id");
            self.persist(&subscription).await;
        }
    }

    /// Track an upstream rename or transfer of the repository.
    pub async fn rename_repo(&self, id: Uuid, repo: &str) {
        let updated = {
            let mut cache = self.cache.write().await;
            match cache.get_mut(&id) {
                Some(subscription) if subscription.repo != repo => {
                    let previous = std::mem::replace(&mut subscription.repo, repo.to_string());
                    Some((subscription.clone(), previous))
                }
                _ => None,
            }
        };
        if let Some((subscription, previous)) = updated {
            info!(id = %id, from = %previous, to = %repo, "Subscription repository renamed");
            self.persist(&subscription).await;
        }
    }

    /// Repoint every subscription in `old` at `new`. Returns how many moved.
    pub async fn migrate_channel(&self, old: &str, new: &str) -> usize {
        let moved: Vec<Subscription> = {
            let mut cache = self.cache.write().await;
            cache
                .values_mut()
                .filter(|subscription| subscription.channel_id == old)
                .map(|subscription| {
                    subscription.channel_id = new.to_string();
                    subscription.clone()
                })
                .collect()
        };
        for subscription in &moved {
            self.persist(subscription).await;
        }
        if !moved.is_empty() {
            info!(from = %old, to = %new, count = moved.len(), "Subscriptions migrated to new channel");
        }
        moved.len()
    }

    async fn persist(&self, subscription: &Subscription) {
        if let Err(err) = self.repository.update(subscription).await {
            warn!(
                id = %subscription.id,
                error = %err,
                "Durable write failed; keeping in-memory state"
            );
        }
    }

    /// Shared secret for a subscription: keyed hash of its identity under
    /// the process root secret.
    pub fn secret_for(&self, subscription: &Subscription) -> String {
        let mut mac = HmacSha256::new_from_slice(self.root_secret.as_bytes())
            .expect("hmac accepts any key length");
        mac.update(subscription.id.as_bytes());
        mac.update(subscription.user_id.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Secret under the older derivation, which also mixed in the channel.
    ///
    /// Kept as a verification fallback so hooks registered before the
    /// derivation change keep working; channel migration broke those
    /// secrets, which is why the channel is no longer an input.
    pub fn legacy_secret_for(&self, subscription: &Subscription) -> String {
        let mut mac = HmacSha256::new_from_slice(self.root_secret.as_bytes())
            .expect("hmac accepts any key length");
        mac.update(subscription.id.as_bytes());
        mac.update(subscription.user_id.as_bytes());
        mac.update(subscription.channel_id.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}
