//! Topic fan-out shared by servers and clients

use async_channel::{Receiver, Sender};
use futures::lock::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Topic subscribers (topic -> live receivers)
#[derive(Clone, Default)]
pub(crate) struct Subscribers {
    topics: Arc<Mutex<HashMap<String, Vec<Sender<Value>>>>>,
}

impl Subscribers {
    /// Register a new receiver for `topic`
    pub(crate) async fn subscribe(&self, topic: &str) -> Receiver<Value> {
        let (tx, rx) = async_channel::unbounded();
        self.topics
            .lock()
            .await
            .entry(topic.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Deliver `data` to every live receiver of `topic`, dropping closed ones.
    /// Returns how many receivers got the message.
    pub(crate) async fn deliver(&self, topic: &str, data: &Value) -> usize {
        let mut topics = self.topics.lock().await;
        let Some(senders) = topics.get_mut(topic) else {
            return 0;
        };

        senders.retain(|tx| tx.try_send(data.clone()).is_ok());
        let delivered = senders.len();
        if senders.is_empty() {
            topics.remove(topic);
        }
        delivered
    }
}
