use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// A single `token_id -> value` record with its time to live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    pub key: String,
    pub value: String,
    pub ttl: Duration,
}

impl SessionEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ttl,
        }
    }

    /// Entry that lives until `expires_at`, never less than one second.
    pub fn expiring_at(key: impl Into<String>, value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self::new(key, value, ttl_until(expires_at))
    }
}

pub fn ttl_until(expires_at: DateTime<Utc>) -> Duration {
    (expires_at - Utc::now())
        .to_std()
        .unwrap_or_default()
        .max(Duration::from_secs(1))
}

/// Liveness ledger for issued token identifiers.
///
/// Presence of a key means the token has not been revoked or consumed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn put(&self, token_id: &str, user_id: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Writes every entry or none of them.
    async fn put_all(&self, entries: &[SessionEntry]) -> Result<(), StoreError>;

    async fn get(&self, token_id: &str) -> Result<Option<String>, StoreError>;

    /// Deleting an absent key is not an error.
    async fn delete(&self, token_id: &str) -> Result<(), StoreError>;

    async fn delete_all(&self, token_ids: &[String]) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

fn namespaced_key(prefix: &str, token_id: &str) -> String {
    format!("{}:{}", prefix, token_id)
}

/// Seconds passed to `SET EX`; Redis rejects zero.
fn expire_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Redis-backed store. Keys are namespaced as `{prefix}:{token_id}`.
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisSessionStore {
    pub async fn connect(url: &str, key_prefix: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            key_prefix: key_prefix.to_string(),
        })
    }

    fn key(&self, token_id: &str) -> String {
        namespaced_key(&self.key_prefix, token_id)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn put(&self, token_id: &str, user_id: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(self.key(token_id), user_id, expire_secs(ttl))
            .await?;
        debug!("Stored session entry {} (ttl {}s)", token_id, ttl.as_secs());
        Ok(())
    }

    async fn put_all(&self, entries: &[SessionEntry]) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for entry in entries {
            pipe.set_ex(self.key(&entry.key), &entry.value, expire_secs(entry.ttl))
                .ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        debug!("Stored {} session entries atomically", entries.len());
        Ok(())
    }

    async fn get(&self, token_id: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(self.key(token_id)).await?;
        Ok(value)
    }

    async fn delete(&self, token_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(self.key(token_id)).await?;
        debug!("Deleted session entry {} (existed: {})", token_id, removed > 0);
        Ok(())
    }

    async fn delete_all(&self, token_ids: &[String]) -> Result<(), StoreError> {
        if token_ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let keys: Vec<String> = token_ids.iter().map(|id| self.key(id)).collect();
        let removed: i64 = conn.del(keys).await?;
        debug!("Deleted {} of {} session entries", removed, token_ids.len());
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

impl MemoryEntry {
    fn is_expired(&self) -> bool {
        self.expires_at <= Instant::now()
    }
}

/// Process-local store for development and tests.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    entries: Arc<RwLock<HashMap<String, MemoryEntry>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.values().filter(|e| !e.is_expired()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn put(&self, token_id: &str, user_id: &str, ttl: Duration) -> Result<(), StoreError> {
        self.put_all(&[SessionEntry::new(token_id, user_id, ttl)]).await
    }

    async fn put_all(&self, entries: &[SessionEntry]) -> Result<(), StoreError> {
        let mut store = self.entries.write().await;
        let now = Instant::now();
        store.retain(|_, e| !e.is_expired());
        for entry in entries {
            store.insert(
                entry.key.clone(),
                MemoryEntry {
                    value: entry.value.clone(),
                    expires_at: now + entry.ttl,
                },
            );
        }
        Ok(())
    }

    async fn get(&self, token_id: &str) -> Result<Option<String>, StoreError> {
        let store = self.entries.read().await;
        Ok(store
            .get(token_id)
            .filter(|e| !e.is_expired())
            .map(|e| e.value.clone()))
    }

    async fn delete(&self, token_id: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(token_id);
        Ok(())
    }

    async fn delete_all(&self, token_ids: &[String]) -> Result<(), StoreError> {
        let mut store = self.entries.write().await;
        for id in token_ids {
            store.remove(id);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
