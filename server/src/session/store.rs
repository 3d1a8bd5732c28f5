use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, Instant};

const KEY_PREFIX: &str = "sess:";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Key/value store for serialized session records.
///
/// Every operation is a single key operation; entries disappear on their own
/// once their TTL elapses.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<String>, StoreError>;

    /// Writes the record and resets its TTL.
    async fn save(&self, session_id: &str, record: String, ttl: Duration)
        -> Result<(), StoreError>;

    async fn remove(&self, session_id: &str) -> Result<(), StoreError>;

    fn backend(&self) -> &'static str;

    /// Drops expired entries for stores that do not expire keys themselves.
    fn purge_expired(&self) -> usize {
        0
    }
}

fn store_key(session_id: &str) -> String {
    format!("{KEY_PREFIX}{session_id}")
}

#[derive(Debug, Clone)]
struct StoredEntry {
    record: String,
    expires_at: Instant,
}

impl StoredEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-process store for development and tests. Not shared across replicas.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    entries: Arc<DashMap<String, StoredEntry>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<String>, StoreError> {
        let key = store_key(session_id);
        let live = self
            .entries
            .get(&key)
            .map(|entry| (!entry.is_expired()).then(|| entry.record.clone()));

        match live {
            Some(Some(record)) => Ok(Some(record)),
            Some(None) => {
                // Re-checked under the shard lock so a concurrent save survives.
                self.entries.remove_if(&key, |_, entry| entry.is_expired());
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn save(
        &self,
        session_id: &str,
        record: String,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.entries.insert(
            store_key(session_id),
            StoredEntry {
                record,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn remove(&self, session_id: &str) -> Result<(), StoreError> {
        self.entries.remove(&store_key(session_id));
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }

    fn purge_expired(&self) -> usize {
        let mut removed = 0;

        self.entries.retain(|key, entry| {
            if entry.is_expired() {
                log::debug!("Purged expired session entry: {}", key);
                removed += 1;
                false
            } else {
                true
            }
        });

        removed
    }
}

/// Redis-backed store shared by every gateway replica.
#[derive(Clone)]
pub struct RedisSessionStore {
    connection: redis::aio::MultiplexedConnection,
}

impl RedisSessionStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection.clone();
        let record: Option<String> = conn.get(store_key(session_id)).await?;
        Ok(record)
    }

    async fn save(
        &self,
        session_id: &str,
        record: String,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(store_key(session_id), record, seconds)
            .await?;
        Ok(())
    }

    async fn remove(&self, session_id: &str) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(store_key(session_id)).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
