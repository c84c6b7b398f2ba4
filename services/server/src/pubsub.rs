//! Pluggable broadcast `PubSub` (§3 item 6, §4.6). The Hub publishes every
//! broadcast to a named channel when a `Storage`-backed deployment is
//! configured, and a subscribe loop feeds inbound published messages back
//! into the local broadcast path — this is how multiple processes share a
//! client population. Default in-memory backend grounded on
//! `AppState::get_or_create_broadcast`'s "look up, else create and insert"
//! pattern over `tokio::sync::broadcast`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::BroadcastStream;

pub type BroadcastStreamOf = BroadcastStream<Vec<u8>>;

#[async_trait]
pub trait PubSub: Send + Sync {
    async fn publish(&self, channel: &str, payload: Vec<u8>);
    async fn subscribe(&self, channel: &str) -> BroadcastStreamOf;
}

#[derive(Default)]
pub struct InMemoryPubSub {
    channels: RwLock<HashMap<String, broadcast::Sender<Vec<u8>>>>,
}

impl InMemoryPubSub {
    pub fn new() -> Self {
        Self::default()
    }

    async fn sender_for(&self, channel: &str) -> broadcast::Sender<Vec<u8>> {
        if let Some(tx) = self.channels.read().await.get(channel) {
            return tx.clone();
        }
        let mut channels = self.channels.write().await;
        if let Some(tx) = channels.get(channel) {
            return tx.clone();
        }
        let (tx, _rx) = broadcast::channel(1024);
        channels.insert(channel.to_owned(), tx.clone());
        tx
    }
}

#[async_trait]
impl PubSub for InMemoryPubSub {
    async fn publish(&self, channel: &str, payload: Vec<u8>) {
        let tx = self.sender_for(channel).await;
        let _ = tx.send(payload);
    }

    async fn subscribe(&self, channel: &str) -> BroadcastStreamOf {
        let tx = self.sender_for(channel).await;
        BroadcastStream::new(tx.subscribe())
    }
}

pub fn default_pubsub() -> Arc<dyn PubSub> {
    Arc::new(InMemoryPubSub::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn subscriber_receives_published_payload() {
        let pubsub = InMemoryPubSub::new();
        let mut stream = pubsub.subscribe("room-1").await;
        pubsub.publish("room-1", b"hello".to_vec()).await;
        let received = stream.next().await.unwrap().unwrap();
        assert_eq!(received, b"hello");
    }

    #[tokio::test]
    async fn distinct_channels_do_not_cross_talk() {
        let pubsub = InMemoryPubSub::new();
        let mut a = pubsub.subscribe("a").await;
        let _b = pubsub.subscribe("b").await;
        pubsub.publish("b", b"for-b".to_vec()).await;
        pubsub.publish("a", b"for-a".to_vec()).await;
        assert_eq!(a.next().await.unwrap().unwrap(), b"for-a");
    }
}
