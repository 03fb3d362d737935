// Clearance
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! TTL cache for merged permission sets
//!
//! Two entries exist per user: the recomputed role+override merge under
//! [`permissions_key`] and the decision-facing copy under [`merged_key`].
//! Both are deleted on invalidation, which happens before every override
//! mutation. A reader racing between invalidation and mutation completion
//! can repopulate with pre-mutation data; that staleness window is bounded
//! by the entry TTL and is accepted rather than locked around.

use crate::permission::PermissionSet;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Cache key for a user's recomputed permission set
pub fn permissions_key(user_id: &str) -> String {
    format!("permissions:by-user:{user_id}")
}

/// Cache key for a user's decision-facing merged set
pub fn merged_key(user_id: &str) -> String {
    format!("merged:by-user:{user_id}")
}

/// Cache entry with expiration
#[derive(Debug, Clone)]
struct CacheEntry {
    /// Cached permission set
    value: PermissionSet,
    /// When this entry expires
    expires_at: Instant,
}

impl CacheEntry {
    fn new(value: PermissionSet, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    /// Total cache hits
    pub hits: u64,

    /// Total cache misses
    pub misses: u64,

    /// Total cache evictions
    pub evictions: u64,

    /// Current cache size
    pub current_size: usize,
}

impl CacheStats {
    /// Calculate hit ratio
    pub fn hit_ratio(&self) -> f64 {
        if self.hits + self.misses == 0 { 0.0 } else { self.hits as f64 / (self.hits + self.misses) as f64 }
    }
}

/// TTL cache of merged permission sets keyed by user identity
#[derive(Debug, Default)]
pub struct PermissionCache {
    entries: DashMap<String, CacheEntry>,
    stats: Arc<RwLock<CacheStats>>,
}

impl PermissionCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a permission set from cache
    pub async fn get(&self, key: &str) -> Option<PermissionSet> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                // Record hit without blocking
                if let Ok(mut stats) = self.stats.try_write() {
                    stats.hits += 1;
                }
                debug!("Permission cache hit for key: {}", key);
                return Some(entry.value.clone());
            }
        }

        // Drop the expired entry outside the read guard
        if self.entries.remove_if(key, |_, entry| entry.is_expired()).is_some() {
            if let Ok(mut stats) = self.stats.try_write() {
                stats.evictions += 1;
            }
        }

        if let Ok(mut stats) = self.stats.try_write() {
            stats.misses += 1;
        }
        debug!("Permission cache miss for key: {}", key);
        None
    }

    /// Insert a permission set with a TTL
    pub async fn insert(&self, key: String, value: PermissionSet, ttl: Duration) {
        self.entries.insert(key.clone(), CacheEntry::new(value, ttl));
        self.update_size().await;
        debug!("Permission set cached for key: {} with TTL: {:?}", key, ttl);
    }

    /// Remove both cache entries of a user
    pub async fn invalidate_user(&self, user_id: &str) {
        self.entries.remove(&permissions_key(user_id));
        self.entries.remove(&merged_key(user_id));

        self.update_size().await;
        debug!("Invalidated cache for user: {}", user_id);
    }

    /// Clear all cache entries
    pub async fn clear(&self) {
        self.entries.clear();

        let mut stats = self.stats.write().await;
        stats.current_size = 0;

        debug!("Cleared all cache entries");
    }

    /// Clean up expired entries
    pub async fn cleanup_expired(&self) {
        let mut evicted = 0;

        self.entries.retain(|_, entry| {
            if entry.is_expired() {
                evicted += 1;
                false
            } else {
                true
            }
        });

        if evicted > 0 {
            let mut stats = self.stats.write().await;
            stats.evictions += evicted;
            stats.current_size = self.entries.len();
            debug!("Cleaned up {} expired cache entries", evicted);
        }
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        self.stats.read().await.clone()
    }

    async fn update_size(&self) {
        let mut stats = self.stats.write().await;
        stats.current_size = self.entries.len();
    }

    /// Start background cleanup task
    pub fn start_cleanup_task(cache: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            loop {
                ticker.tick().await;
                cache.cleanup_expired().await;

                let stats = cache.stats().await;
                debug!(
                    "Cache stats - Hits: {}, Misses: {}, Hit ratio: {:.2}%, Size: {}, Evictions: {}",
                    stats.hits,
                    stats.misses,
                    stats.hit_ratio() * 100.0,
                    stats.current_size,
                    stats.evictions
                );

                if stats.hits + stats.misses > 100 && stats.hit_ratio() < 0.5 {
                    warn!("Low cache hit ratio: {:.2}%", stats.hit_ratio() * 100.0);
                }
            }
        })
    }
}
