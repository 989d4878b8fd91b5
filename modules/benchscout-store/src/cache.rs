//! Redis-backed result caches (LLM scores, uploaded image keys).
//!
//! The cache is best-effort: when Redis is unconfigured or unreachable the
//! client degrades to a disabled no-op and the pipeline pays the recompute
//! cost instead of failing.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct CacheClient {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    connection: RwLock<Option<ConnectionManager>>,
    prefix: String,
}

impl CacheClient {
    /// Connect to Redis at `url`; a failed connection yields a disabled cache.
    pub async fn connect(url: Option<&str>, prefix: &str) -> Self {
        let connection = match url {
            Some(url) => match redis::Client::open(url) {
                Ok(client) => match ConnectionManager::new(client).await {
                    Ok(conn) => {
                        info!(prefix, "result cache connected");
                        Some(conn)
                    }
                    Err(e) => {
                        warn!(error = %e, "cache unreachable, continuing without it");
                        None
                    }
                },
                Err(e) => {
                    warn!(error = %e, "invalid cache URL, continuing without it");
                    None
                }
            },
            None => None,
        };

        Self {
            inner: Arc::new(CacheInner {
                connection: RwLock::new(connection),
                prefix: prefix.to_string(),
            }),
        }
    }

    /// A cache that never hits (tests, deployments without Redis).
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(CacheInner {
                connection: RwLock::new(None),
                prefix: "benchscout:".to_string(),
            }),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.connection.read().await.is_some()
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.inner.prefix, key)
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let full = self.full_key(key);
        let mut guard = self.inner.connection.write().await;
        let conn = guard.as_mut()?;

        match conn.get::<_, Option<String>>(&full).await {
            Ok(Some(data)) => match serde_json::from_str(&data) {
                Ok(value) => {
                    debug!(key = %full, "cache hit");
                    Some(value)
                }
                Err(e) => {
                    warn!(key = %full, error = %e, "cache payload undeserializable");
                    None
                }
            },
            Ok(None) => {
                debug!(key = %full, "cache miss");
                None
            }
            Err(e) => {
                warn!(key = %full, error = %e, "cache read failed");
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> bool {
        let full = self.full_key(key);
        let mut guard = self.inner.connection.write().await;
        let Some(conn) = guard.as_mut() else {
            return false;
        };

        let serialized = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => {
                warn!(key = %full, error = %e, "cache payload unserializable");
                return false;
            }
        };

        match conn.set_ex::<_, _, ()>(&full, serialized, ttl_secs).await {
            Ok(_) => {
                debug!(key = %full, ttl_secs, "cache set");
                true
            }
            Err(e) => {
                warn!(key = %full, error = %e, "cache write failed");
                false
            }
        }
    }
}

/// Content fingerprint over the given parts, hex-encoded sha256.
pub fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}
