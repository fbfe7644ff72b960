//! Redis cache integration
//!
//! Provides:
//! - Connection management
//! - Generic get/set operations with TTL
//! - Research result caching keyed by query hash

use crate::errors::{AppError, Result};
use crate::metrics;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

/// Redis cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Redis URL (redis://host:port)
    pub url: String,
    /// Default TTL in seconds
    pub default_ttl_secs: u64,
    /// Key prefix for namespacing
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            default_ttl_secs: 86_400,
            key_prefix: "researchforge".to_string(),
        }
    }
}

impl CacheConfig {
    /// Build from settings; `None` when caching is disabled
    pub fn from_settings(settings: &crate::config::CacheSettings) -> Option<Self> {
        settings.url.as_ref().map(|url| Self {
            url: url.clone(),
            default_ttl_secs: settings.ttl_secs,
            key_prefix: settings.key_prefix.clone(),
        })
    }
}

/// Redis cache client
pub struct Cache {
    connection: ConnectionManager,
    config: CacheConfig,
}

impl Cache {
    /// Create a new cache client
    pub async fn new(config: CacheConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to create Redis client: {}", e)
            })?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to connect to Redis: {}", e),
            })?;

        Ok(Self { connection, config })
    }

    /// Build a prefixed key
    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.config.key_prefix, key)
    }

    /// Get a value from cache
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let full_key = self.key(key);
        let mut conn = self.connection.clone();

        let value: Option<String> = conn.get(&full_key).await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to get key '{}': {}", full_key, e),
            })?;

        match value {
            Some(json) => {
                let parsed = serde_json::from_str(&json)
                    .map_err(|e| AppError::CacheError {
                        message: format!("Failed to parse cached value: {}", e),
                    })?;
                debug!(key = %full_key, "Cache hit");
                metrics::record_cache(true, "research");
                Ok(Some(parsed))
            }
            None => {
                debug!(key = %full_key, "Cache miss");
                metrics::record_cache(false, "research");
                Ok(None)
            }
        }
    }

    /// Set a value in cache with default TTL
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set_with_ttl(key, value, self.config.default_ttl_secs).await
    }

    /// Set a value in cache with custom TTL
    pub async fn set_with_ttl<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> Result<()> {
        let full_key = self.key(key);
        let json = serde_json::to_string(value)
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to serialize value: {}", e),
            })?;

        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(&full_key, &json, ttl_secs)
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to set key '{}': {}", full_key, e),
            })?;

        debug!(key = %full_key, ttl_secs, "Cache set");
        Ok(())
    }

    /// Ping Redis to check connectivity
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Redis ping failed: {}", e),
            })?;
        Ok(())
    }
}

/// Cache key builder helpers
pub mod keys {
    use sha2::{Digest, Sha256};

    /// Stable hash of a normalized query
    pub fn query_hash(query: &str) -> String {
        let normalized = query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        hex::encode(Sha256::digest(normalized.as_bytes()))
    }

    /// Build a topic research result key
    pub fn research_result(query: &str, depth: &str) -> String {
        format!("research:{}:{}", depth, query_hash(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_builders() {
        let key = keys::research_result("Swedish gambling tax", "deep");
        assert!(key.starts_with("research:deep:"));
        assert_eq!(key.len(), "research:deep:".len() + 64);
    }

    #[test]
    fn test_query_hash_normalizes_whitespace_and_case() {
        assert_eq!(
            keys::query_hash("Swedish  gambling TAX"),
            keys::query_hash("swedish gambling tax"),
        );
        assert_ne!(keys::query_hash("a"), keys::query_hash("b"));
    }

    #[test]
    fn test_cache_disabled_without_url() {
        let settings = crate::config::CacheSettings::default();
        assert!(CacheConfig::from_settings(&settings).is_none());
    }
}
