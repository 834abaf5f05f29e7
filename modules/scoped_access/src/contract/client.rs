use async_trait::async_trait;
use query_core::{Constraint, Document};
use tokio::sync::watch;

use crate::contract::{
    error::AccessError,
    model::{Record, ResultSet},
};

/// Uniform per-entity surface for views: a live, role-scoped result set plus
/// CRUD against the same collection.
#[async_trait]
pub trait ScopedCollectionApi: Send + Sync {
    /// Current `{data, loading, error}` state.
    fn snapshot(&self) -> ResultSet;

    /// Receiver that observes every state transition.
    fn watch(&self) -> watch::Receiver<ResultSet>;

    /// Create a record; returns its generated id.
    async fn create(&self, data: Document) -> Result<String, AccessError>;

    /// Merge fields into an existing record.
    async fn update(&self, id: &str, data: Document) -> Result<(), AccessError>;

    /// Permanently remove a record.
    async fn delete(&self, id: &str) -> Result<(), AccessError>;

    /// One-shot read with optional constraints.
    async fn get_all(&self, constraints: Vec<Constraint>) -> Result<Vec<Record>, AccessError>;

    /// `Ok(None)` when the id does not resolve.
    async fn get_by_id(&self, id: &str) -> Result<Option<Record>, AccessError>;
}
