pub mod backend;

pub use backend::{DocumentBackend, ErrorFn, SnapshotFn, SubscriptionHandle};

/// Output port: publish domain events (no knowledge of transport).
pub trait EventPublisher<E>: Send + Sync + 'static {
    fn publish(&self, event: &E);
}
