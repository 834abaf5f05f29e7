use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use query_core::CollectionQuery;

use crate::contract::model::{Record, SubscriptionError, WriteSet};

/// Receives every full snapshot of a live query.
pub type SnapshotFn = Arc<dyn Fn(Vec<Record>) + Send + Sync>;
/// Receives a terminal failure of a live query.
pub type ErrorFn = Arc<dyn Fn(SubscriptionError) + Send + Sync>;

/// Owns the teardown of one live-query registration.
///
/// Teardown runs exactly once: on [`SubscriptionHandle::unsubscribe`] or on drop.
pub struct SubscriptionHandle {
    teardown: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionHandle {
    pub fn new(teardown: impl FnOnce() + Send + 'static) -> Self {
        Self {
            teardown: Some(Box::new(teardown)),
        }
    }

    /// Handle with nothing to tear down.
    pub fn noop() -> Self {
        Self { teardown: None }
    }

    pub fn unsubscribe(mut self) {
        self.run_teardown();
    }

    fn run_teardown(&mut self) {
        if let Some(f) = self.teardown.take() {
            f();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.run_teardown();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("active", &self.teardown.is_some())
            .finish()
    }
}

/// Port for the managed document backend: live queries and one-shot CRUD.
/// Object-safe and async-friendly via `async_trait`.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Register a live query. Returns immediately; snapshots and errors are
    /// delivered through the callbacks until the handle is torn down.
    fn subscribe(
        &self,
        query: &CollectionQuery,
        on_next: SnapshotFn,
        on_error: ErrorFn,
    ) -> SubscriptionHandle;

    async fn get_all(&self, query: &CollectionQuery) -> anyhow::Result<Vec<Record>>;

    /// `Ok(None)` when the id does not resolve.
    async fn get_by_id(&self, collection: &str, id: &str) -> anyhow::Result<Option<Record>>;

    /// Insert a document; the backend generates and returns the id.
    async fn create(&self, collection: &str, write: WriteSet) -> anyhow::Result<String>;

    /// Shallow-merge fields into an existing document.
    async fn update(&self, collection: &str, id: &str, write: WriteSet) -> anyhow::Result<()>;

    async fn delete(&self, collection: &str, id: &str) -> anyhow::Result<()>;
}
