//! Fan-out of change notifications to subscribers.
//!
//! One broadcast channel per (table, scope). Every published event is
//! stamped with the next value of a store-wide revision counter, so a
//! subscriber can tell which events a snapshot already reflects.

use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ChangeEvent, ChangeStream, Table};

const CHANNEL_CAPACITY: usize = 64;

pub struct ChangeHub {
    /// Key: (table, scope)
    channels: RwLock<HashMap<(Table, Uuid), broadcast::Sender<ChangeEvent>>>,
    revision: AtomicU64,
}

impl ChangeHub {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            revision: AtomicU64::new(0),
        }
    }

    /// Revision of the most recently published event.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    pub async fn subscribe(&self, table: Table, scope: Uuid) -> broadcast::Receiver<ChangeEvent> {
        let key = (table, scope);

        let mut channels = self.channels.write().await;

        if let Some(sender) = channels.get(&key) {
            sender.subscribe()
        } else {
            let (sender, receiver) = broadcast::channel(CHANNEL_CAPACITY);
            channels.insert(key, sender);
            receiver
        }
    }

    /// Subscribes and adapts the receiver into a [`ChangeStream`].
    pub async fn stream(&self, table: Table, scope: Uuid) -> ChangeStream {
        receiver_stream(self.subscribe(table, scope).await, table, scope)
    }

    /// Stamps `event` with the next revision and sends it to the scope's
    /// subscribers. Returns the revision.
    ///
    /// The write lock is held across stamping and sending so subscribers
    /// always see revisions in increasing order.
    pub async fn publish(&self, mut event: ChangeEvent) -> u64 {
        let key = (event.table, event.scope);

        let mut channels = self.channels.write().await;
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        event.revision = revision;

        if let Some(sender) = channels.get(&key) {
            if sender.receiver_count() == 0 {
                channels.remove(&key);
            } else {
                // Ignore send errors (no subscribers)
                let _ = sender.send(event);
            }
        }

        revision
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}

/// A lagging receiver yields a single resync event in place of the events
/// it missed.
fn receiver_stream(
    receiver: broadcast::Receiver<ChangeEvent>,
    table: Table,
    scope: Uuid,
) -> ChangeStream {
    stream::unfold(receiver, move |mut receiver| async move {
        match receiver.recv().await {
            Ok(event) => Some((event, receiver)),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(
                    "Subscriber for {}/{} lagged by {} events",
                    table,
                    scope,
                    skipped
                );
                Some((ChangeEvent::resync(table, scope), receiver))
            }
            Err(RecvError::Closed) => None,
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ChangeKind;

    fn event(table: Table, scope: Uuid) -> ChangeEvent {
        ChangeEvent {
            table,
            scope,
            kind: ChangeKind::Insert,
            id: Uuid::new_v4(),
            revision: 0,
            row: None,
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_matching_scope_only() {
        let hub = ChangeHub::new();
        let scope = Uuid::new_v4();
        let other = Uuid::new_v4();

        let mut stream = hub.stream(Table::Tasks, scope).await;
        let mut other_stream = hub.stream(Table::Tasks, other).await;

        hub.publish(event(Table::Modules, scope)).await;
        let revision = hub.publish(event(Table::Tasks, scope)).await;

        let received = stream.next().await.unwrap();
        assert_eq!(received.table, Table::Tasks);
        assert_eq!(received.revision, revision);
        assert_eq!(hub.revision(), 2);

        drop(stream);
        let timeout = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            other_stream.next(),
        )
        .await;
        assert!(timeout.is_err());
    }

    #[tokio::test]
    async fn test_lagged_subscriber_gets_resync() {
        let hub = ChangeHub::new();
        let scope = Uuid::new_v4();
        let mut stream = hub.stream(Table::Projects, scope).await;

        for _ in 0..CHANNEL_CAPACITY + 5 {
            hub.publish(event(Table::Projects, scope)).await;
        }

        let first = stream.next().await.unwrap();
        assert_eq!(first.kind, ChangeKind::Resync);
        assert_eq!(first.scope, scope);
    }

    #[tokio::test]
    async fn test_revision_advances_without_subscribers() {
        let hub = ChangeHub::new();
        assert_eq!(hub.revision(), 0);
        hub.publish(event(Table::Endpoints, Uuid::new_v4())).await;
        hub.publish(event(Table::Endpoints, Uuid::new_v4())).await;
        assert_eq!(hub.revision(), 2);
    }
}
