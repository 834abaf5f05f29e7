#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use query_core::{CollectionQuery, Document};
use serde_json::Value;
use tokio::sync::watch;

use scoped_access::contract::model::{Record, ResultSet, SubscriptionError, WriteSet};
use scoped_access::domain::ports::{DocumentBackend, ErrorFn, SnapshotFn, SubscriptionHandle};
use scoped_access::infra::MemoryBackend;

/// Ordered log entry of a backend interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Subscribe { seq: u64, id: u64, query: CollectionQuery },
    Unsubscribe { seq: u64, id: u64 },
    Read { seq: u64, collection: String },
    Write { seq: u64, op: &'static str, collection: String },
}

impl Call {
    pub fn seq(&self) -> u64 {
        match self {
            Call::Subscribe { seq, .. }
            | Call::Unsubscribe { seq, .. }
            | Call::Read { seq, .. }
            | Call::Write { seq, .. } => *seq,
        }
    }
}

struct Registration {
    id: u64,
    query: CollectionQuery,
    on_next: SnapshotFn,
    on_error: ErrorFn,
}

#[derive(Default)]
struct Inner {
    seq: AtomicU64,
    next_id: AtomicU64,
    log: Mutex<Vec<Call>>,
    // Kept after teardown so tests can replay late callbacks.
    registrations: Mutex<Vec<Registration>>,
}

impl Inner {
    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Fake backend that records every call and never delivers snapshots on its
/// own. CRUD goes to an embedded [`MemoryBackend`].
#[derive(Clone, Default)]
pub struct RecordingBackend {
    inner: Arc<Inner>,
    pub store: MemoryBackend,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.log.lock().clone()
    }

    pub fn subscribe_calls(&self) -> Vec<(u64, CollectionQuery)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Subscribe { id, query, .. } => Some((id, query)),
                _ => None,
            })
            .collect()
    }

    pub fn write_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Write { .. }))
            .count()
    }

    pub fn read_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Read { .. }))
            .count()
    }

    pub fn seq_of_subscribe(&self, id: u64) -> Option<u64> {
        self.calls().iter().find_map(|c| match c {
            Call::Subscribe { seq, id: i, .. } if *i == id => Some(*seq),
            _ => None,
        })
    }

    pub fn seq_of_unsubscribe(&self, id: u64) -> Option<u64> {
        self.calls().iter().find_map(|c| match c {
            Call::Unsubscribe { seq, id: i } if *i == id => Some(*seq),
            _ => None,
        })
    }

    /// Registration ids that have not been torn down yet.
    pub fn active(&self) -> Vec<u64> {
        let calls = self.calls();
        self.subscribe_calls()
            .into_iter()
            .map(|(id, _)| id)
            .filter(|id| {
                !calls
                    .iter()
                    .any(|c| matches!(c, Call::Unsubscribe { id: i, .. } if i == id))
            })
            .collect()
    }

    pub fn last_id(&self) -> Option<u64> {
        self.subscribe_calls().last().map(|(id, _)| *id)
    }

    /// Fire `on_next` of a registration, even if it was torn down.
    pub fn emit(&self, id: u64, records: Vec<Record>) {
        let cb = self
            .inner
            .registrations
            .lock()
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.on_next.clone());
        if let Some(cb) = cb {
            cb(records);
        }
    }

    /// Fire `on_error` of a registration, even if it was torn down.
    pub fn fail(&self, id: u64, message: &str) {
        let cb = self
            .inner
            .registrations
            .lock()
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.on_error.clone());
        if let Some(cb) = cb {
            cb(SubscriptionError::new(message));
        }
    }

    pub fn query_of(&self, id: u64) -> Option<CollectionQuery> {
        self.inner
            .registrations
            .lock()
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.query.clone())
    }

    fn log(&self, call: Call) {
        self.inner.log.lock().push(call);
    }
}

#[async_trait]
impl DocumentBackend for RecordingBackend {
    fn subscribe(
        &self,
        query: &CollectionQuery,
        on_next: SnapshotFn,
        on_error: ErrorFn,
    ) -> SubscriptionHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let seq = self.inner.next_seq();
        self.log(Call::Subscribe {
            seq,
            id,
            query: query.clone(),
        });
        self.inner.registrations.lock().push(Registration {
            id,
            query: query.clone(),
            on_next,
            on_error,
        });
        let inner = self.inner.clone();
        SubscriptionHandle::new(move || {
            let seq = inner.next_seq();
            inner.log.lock().push(Call::Unsubscribe { seq, id });
        })
    }

    async fn get_all(&self, query: &CollectionQuery) -> Result<Vec<Record>> {
        self.log(Call::Read {
            seq: self.inner.next_seq(),
            collection: query.collection.clone(),
        });
        self.store.get_all(query).await
    }

    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Record>> {
        self.log(Call::Read {
            seq: self.inner.next_seq(),
            collection: collection.to_string(),
        });
        self.store.get_by_id(collection, id).await
    }

    async fn create(&self, collection: &str, write: WriteSet) -> Result<String> {
        self.log(Call::Write {
            seq: self.inner.next_seq(),
            op: "create",
            collection: collection.to_string(),
        });
        self.store.create(collection, write).await
    }

    async fn update(&self, collection: &str, id: &str, write: WriteSet) -> Result<()> {
        self.log(Call::Write {
            seq: self.inner.next_seq(),
            op: "update",
            collection: collection.to_string(),
        });
        self.store.update(collection, id, write).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.log(Call::Write {
            seq: self.inner.next_seq(),
            op: "delete",
            collection: collection.to_string(),
        });
        self.store.delete(collection, id).await
    }
}

pub fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

pub fn record(id: &str, value: Value) -> Record {
    Record::new(id, doc(value))
}

/// Wait until the observed state satisfies `pred`, failing after two seconds.
pub async fn wait_for_state<F>(rx: &mut watch::Receiver<ResultSet>, pred: F) -> ResultSet
where
    F: FnMut(&ResultSet) -> bool,
{
    let state = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(pred))
        .await
        .expect("timed out waiting for result set")
        .expect("state channel closed");
    state.clone()
}
