// Key-value connection seam.
//
// `RedisStorage` only needs GET, SET, SETEX and DEL. Anything that can do
// those four implements `KeyValueConnection`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::RwLock;

use oauth_storage_core::config::ConnectionOptions;
use oauth_storage_core::error::{StorageError, StorageResult};

/// Minimal remote key-value store.
#[async_trait]
pub trait KeyValueConnection: Send + Sync + std::fmt::Debug {
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> StorageResult<()>;
    /// Set with a TTL. `ttl_secs` is always positive.
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> StorageResult<()>;
    /// `true` if the key existed.
    async fn del(&self, key: &str) -> StorageResult<bool>;
}

// ─── Redis ───────────────────────────────────────────────────────

/// Connection to a Redis server through a multiplexed, auto-reconnecting
/// [`ConnectionManager`]. Clones share the same connection.
#[derive(Clone)]
pub struct RedisConnection {
    manager: ConnectionManager,
    url: String,
}

impl std::fmt::Debug for RedisConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConnection")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl RedisConnection {
    /// Connect from a host/port/database descriptor. The database must be a
    /// numeric Redis database index.
    pub async fn connect(options: &ConnectionOptions) -> StorageResult<Self> {
        options.validate()?;
        let index: u32 = options.database.trim().parse().map_err(|_| {
            StorageError::invalid_argument(format!(
                "redis database must be a numeric index, got {:?}",
                options.database
            ))
        })?;
        let url = format!("redis://{}:{}/{}", options.host, options.port, index);
        Self::open(&url).await
    }

    /// Connect to a `redis://` URL.
    pub async fn open(url: &str) -> StorageResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| StorageError::invalid_argument(format!("invalid redis url: {e}")))?;
        tracing::debug!(url, "connecting to Redis");
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| StorageError::backend(format!("Redis connection failed: {e}")))?;
        Ok(Self {
            manager,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn redis_error(op: &str, e: redis::RedisError) -> StorageError {
    tracing::warn!(op, error = %e, "Redis command failed");
    StorageError::backend(format!("Redis {op} failed: {e}"))
}

#[async_trait]
impl KeyValueConnection for RedisConnection {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let mut conn = self.manager.clone();
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| redis_error("GET", e))
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut conn = self.manager.clone();
        conn.set::<_, _, ()>(key, value)
            .await
            .map_err(|e| redis_error("SET", e))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> StorageResult<()> {
        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .map_err(|e| redis_error("SETEX", e))
    }

    async fn del(&self, key: &str) -> StorageResult<bool> {
        let mut conn = self.manager.clone();
        let removed: i64 = conn.del(key).await.map_err(|e| redis_error("DEL", e))?;
        Ok(removed > 0)
    }
}

// ─── In-memory ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() >= exp)
    }
}

/// In-process key-value store with Redis-like TTL semantics.
///
/// Clones share the same data, so a test can hold one clone while the
/// storage under test owns another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConnection {
    store: Arc<RwLock<HashMap<String, Entry>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining TTL of a key in whole seconds, rounded up. `None` for a
    /// missing key or one without expiry.
    pub async fn ttl(&self, key: &str) -> Option<u64> {
        let store = self.store.read().await;
        let entry = store.get(key).filter(|e| !e.is_expired())?;
        let remaining = entry.expires_at?.saturating_duration_since(Instant::now());
        Some(remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0))
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let store = self.store.read().await;
        store.values().filter(|e| !e.is_expired()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Simulate an outage: while set, every command fails with a backend error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::backend("in-memory connection is unavailable"));
        }
        Ok(())
    }

    async fn insert(&self, key: &str, value: &str, expires_at: Option<Instant>) {
        self.store.write().await.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
    }
}

#[async_trait]
impl KeyValueConnection for InMemoryConnection {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.check_available()?;
        let store = self.store.read().await;
        Ok(match store.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            _ => None,
        })
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.check_available()?;
        self.insert(key, value, None).await;
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> StorageResult<()> {
        self.check_available()?;
        if ttl_secs == 0 {
            return Err(StorageError::backend("invalid expire time in 'setex' command"));
        }
        let expires_at = Instant::now() + Duration::from_secs(ttl_secs);
        self.insert(key, value, Some(expires_at)).await;
        Ok(())
    }

    async fn del(&self, key: &str) -> StorageResult<bool> {
        self.check_available()?;
        let mut store = self.store.write().await;
        Ok(store.remove(key).is_some_and(|e| !e.is_expired()))
    }
}
