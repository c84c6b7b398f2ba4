//! Pluggable key-value `Storage` (§3 item 6). Default is in-memory,
//! grounded on `AppState::broadcast_registry`'s `HashMap` + `RwLock` shape;
//! the `redis` feature adds a shared backend for multi-process deployments
//! (§9's "prefork + shared state" warning is the reason this trait exists at
//! all — in-memory `Storage` isolates state per worker).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
    async fn set(&self, key: &str, value: Vec<u8>);
    async fn delete(&self, key: &str);
}

#[derive(Default)]
pub struct InMemoryStorage {
    data: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.data.read().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: Vec<u8>) {
        self.data.write().await.insert(key.to_owned(), value);
    }

    async fn delete(&self, key: &str) {
        self.data.write().await.remove(key);
    }
}

/// Shared backend behind the `redis` feature, for deployments that run more
/// than one process (§9: "the documented remedy is to configure external
/// Storage/PubSub"). Not wired up by default and not exercised by the
/// default test suite — present so the trait boundary is real.
#[cfg(feature = "redis")]
pub struct RedisStorage {
    conn: redis::aio::ConnectionManager,
}

#[cfg(feature = "redis")]
impl RedisStorage {
    pub async fn connect(url: &str) -> redis::RedisResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[cfg(feature = "redis")]
#[async_trait]
impl Storage for RedisStorage {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut conn = self.conn.clone();
        redis::AsyncCommands::get(&mut conn, key).await.ok()
    }

    async fn set(&self, key: &str, value: Vec<u8>) {
        let mut conn = self.conn.clone();
        let _: Result<(), _> = redis::AsyncCommands::set(&mut conn, key, value).await;
    }

    async fn delete(&self, key: &str) {
        let mut conn = self.conn.clone();
        let _: Result<(), _> = redis::AsyncCommands::del(&mut conn, key).await;
    }
}

pub fn default_storage() -> Arc<dyn Storage> {
    Arc::new(InMemoryStorage::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete_round_trip() {
        let storage = InMemoryStorage::new();
        assert_eq!(storage.get("k").await, None);
        storage.set("k", b"v".to_vec()).await;
        assert_eq!(storage.get("k").await, Some(b"v".to_vec()));
        storage.delete("k").await;
        assert_eq!(storage.get("k").await, None);
    }
}
