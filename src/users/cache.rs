//! Read-through cache for user profiles.
//!
//! The cache is never authoritative. Every failure here degrades to a miss
//! on read and to a logged no-op on write.

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tracing::{debug, warn};
use uuid::Uuid;

use super::repo_types::User;

pub fn cache_key(id: Uuid) -> String {
    format!("user-{id}")
}

#[async_trait]
pub trait UserCache: Send + Sync {
    /// `None` on miss, expiry or any cache-side failure.
    async fn get(&self, id: Uuid) -> Option<User>;
    async fn set(&self, user: &User);
    async fn invalidate(&self, id: Uuid);
}

/// In-memory TTL cache holding JSON snapshots keyed by `user-<id>`.
#[derive(Clone)]
pub struct MokaUserCache {
    entries: Cache<String, String>,
}

impl MokaUserCache {
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();
        Self { entries }
    }
}

#[async_trait]
impl UserCache for MokaUserCache {
    async fn get(&self, id: Uuid) -> Option<User> {
        let key = cache_key(id);
        let data = self.entries.get(&key).await?;
        match serde_json::from_str::<User>(&data) {
            Ok(user) => {
                debug!(%key, "user cache hit");
                Some(user)
            }
            Err(e) => {
                warn!(%key, error = %e, "corrupt user cache entry, treating as miss");
                self.entries.invalidate(&key).await;
                None
            }
        }
    }

    async fn set(&self, user: &User) {
        let key = cache_key(user.id);
        match serde_json::to_string(user) {
            Ok(data) => self.entries.insert(key, data).await,
            Err(e) => warn!(%key, error = %e, "failed to serialize user for cache"),
        }
    }

    async fn invalidate(&self, id: Uuid) {
        self.entries.invalidate(&cache_key(id)).await;
    }
}

/// Used when caching is disabled; every read is a miss.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUserCache;

#[async_trait]
impl UserCache for NoopUserCache {
    async fn get(&self, _id: Uuid) -> Option<User> {
        None
    }
    async fn set(&self, _user: &User) {}
    async fn invalidate(&self, _id: Uuid) {}
}
