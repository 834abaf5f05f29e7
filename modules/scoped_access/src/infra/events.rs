use futures::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::domain::events::RecordEvent;
use crate::domain::ports::EventPublisher;

/// Typed fan-out of domain events built on `tokio::sync::broadcast`.
/// The channel is bounded; subscribers that lag lose the oldest events.
#[derive(Clone)]
pub struct BroadcastPublisher<T> {
    tx: broadcast::Sender<T>,
}

impl<T: Clone + Send + 'static> BroadcastPublisher<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Errors are ignored (no active subscribers is the common case).
    pub fn send(&self, value: T) {
        let _ = self.tx.send(value);
    }

    /// Typed stream of events; lag errors are filtered out.
    pub fn subscribe_stream(&self) -> impl Stream<Item = T> {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|res| async move { res.ok() })
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl EventPublisher<RecordEvent> for BroadcastPublisher<RecordEvent> {
    fn publish(&self, event: &RecordEvent) {
        self.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::model::Entity;
    use chrono::Utc;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let publisher = BroadcastPublisher::<RecordEvent>::new(4);
        let stream = publisher.subscribe_stream();
        futures::pin_mut!(stream);

        publisher.publish(&RecordEvent::Deleted {
            entity: Entity::Payments,
            id: "p1".into(),
            at: Utc::now(),
        });

        let got = stream.next().await.expect("event");
        assert_eq!(got.id(), "p1");
    }

    #[test]
    fn publishing_without_subscribers_is_silent() {
        let publisher = BroadcastPublisher::<RecordEvent>::new(1);
        assert_eq!(publisher.receiver_count(), 0);
        publisher.publish(&RecordEvent::Updated {
            entity: Entity::Users,
            id: "u1".into(),
            at: Utc::now(),
        });
    }
}
