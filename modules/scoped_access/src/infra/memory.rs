//! In-process document backend.
//!
//! Stands in for the managed backend in tests, the CLI and local demos:
//! live queries are evaluated with `query_core`, every write re-delivers a full
//! snapshot to the watchers of the touched collection, and failures can be
//! injected on demand.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Weak};

use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use parking_lot::{ReentrantMutex, RwLock};
use query_core::{CollectionQuery, Document};
use serde_json::Value;
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::contract::model::{Record, SubscriptionError, WriteSet};
use crate::domain::ports::{DocumentBackend, ErrorFn, SnapshotFn, SubscriptionHandle};

struct StoredDoc {
    seq: u64,
    fields: Document,
}

struct Watcher {
    query: CollectionQuery,
    on_next: SnapshotFn,
    on_error: ErrorFn,
}

#[derive(Default)]
struct State {
    collections: HashMap<String, HashMap<String, StoredDoc>>,
    watchers: HashMap<u64, Watcher>,
    broken: HashSet<String>,
    next_seq: u64,
    next_watcher: u64,
    fail_writes: bool,
    fail_reads: bool,
}

impl State {
    fn snapshot(&self, query: &CollectionQuery) -> Vec<Record> {
        let Some(docs) = self.collections.get(&query.collection) else {
            return Vec::new();
        };
        let mut ordered: Vec<(&String, &StoredDoc)> = docs.iter().collect();
        ordered.sort_by_key(|(_, d)| d.seq);
        let records = ordered
            .into_iter()
            .map(|(id, d)| Record::new(id.clone(), d.fields.clone()))
            .collect();
        query.apply(records, |r: &Record| &r.fields)
    }

    fn pending_for(&self, collection: &str) -> Vec<(SnapshotFn, Vec<Record>)> {
        self.watchers
            .values()
            .filter(|w| w.query.collection == collection)
            .map(|w| (w.on_next.clone(), self.snapshot(&w.query)))
            .collect()
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// Thread-safe, cloneable in-memory [`DocumentBackend`].
///
/// Snapshots reach each watcher in write order: a write holds `delivery`
/// from the moment its snapshots are computed until they are delivered.
/// Reentrant so a callback may write back into the backend.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<RwLock<State>>,
    delivery: Arc<ReentrantMutex<()>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document with a caller-chosen id, notifying watchers.
    pub fn seed(&self, collection: &str, id: &str, fields: Document) {
        let _delivery = self.delivery.lock();
        let pending = {
            let mut st = self.state.write();
            let seq = st.bump_seq();
            st.collections
                .entry(collection.to_string())
                .or_default()
                .insert(id.to_string(), StoredDoc { seq, fields });
            st.pending_for(collection)
        };
        deliver(pending);
    }

    /// Load documents from YAML shaped as `collection -> id -> fields`.
    /// Returns the number of documents loaded.
    pub fn load_seed_yaml(&self, yaml: &str) -> anyhow::Result<usize> {
        let parsed: BTreeMap<String, BTreeMap<String, Document>> =
            serde_yaml::from_str(yaml).context("invalid seed YAML")?;
        let mut count = 0;
        for (collection, docs) in parsed {
            for (id, fields) in docs {
                self.seed(&collection, &id, fields);
                count += 1;
            }
        }
        info!(documents = count, "seeded in-memory backend");
        Ok(count)
    }

    pub fn load_seed_file(&self, path: &Path) -> anyhow::Result<usize> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read seed file {}", path.display()))?;
        self.load_seed_yaml(&yaml)
    }

    /// Make every subsequent create/update/delete fail.
    pub fn fail_writes(&self, on: bool) {
        self.state.write().fail_writes = on;
    }

    /// Make every subsequent one-shot read fail.
    pub fn fail_reads(&self, on: bool) {
        self.state.write().fail_reads = on;
    }

    /// Fail all live queries on `collection`, current and future, until
    /// [`MemoryBackend::restore_subscriptions`] is called. Failed watchers are
    /// dropped, as a real listener stops after reporting an error.
    pub fn break_subscriptions(&self, collection: &str) {
        let _delivery = self.delivery.lock();
        let failed: Vec<ErrorFn> = {
            let mut st = self.state.write();
            st.broken.insert(collection.to_string());
            let ids: Vec<u64> = st
                .watchers
                .iter()
                .filter(|(_, w)| w.query.collection == collection)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| st.watchers.remove(&id))
                .map(|w| w.on_error)
                .collect()
        };
        debug!(collection, watchers = failed.len(), "breaking live queries");
        let err = SubscriptionError::new(format!("listener on '{collection}' was revoked"));
        for on_error in failed {
            on_error(err.clone());
        }
    }

    pub fn restore_subscriptions(&self, collection: &str) {
        self.state.write().broken.remove(collection);
    }

    /// Number of live watchers, optionally restricted to one collection.
    pub fn watcher_count(&self, collection: Option<&str>) -> usize {
        let st = self.state.read();
        st.watchers
            .values()
            .filter(|w| collection.map_or(true, |c| w.query.collection == c))
            .count()
    }

    pub fn len(&self, collection: &str) -> usize {
        self.state
            .read()
            .collections
            .get(collection)
            .map_or(0, HashMap::len)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn check_writable(&self, op: &str, collection: &str) -> anyhow::Result<()> {
        if self.state.read().fail_writes {
            bail!("{op} on '{collection}' rejected: backend unavailable");
        }
        Ok(())
    }

    fn check_readable(&self, collection: &str) -> anyhow::Result<()> {
        if self.state.read().fail_reads {
            bail!("read of '{collection}' rejected: backend unavailable");
        }
        Ok(())
    }
}

fn deliver(pending: Vec<(SnapshotFn, Vec<Record>)>) {
    for (on_next, records) in pending {
        on_next(records);
    }
}

fn now_rfc3339() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn stamp(write: WriteSet) -> Document {
    let mut fields = write.fields;
    if !write.server_timestamps.is_empty() {
        let now = now_rfc3339();
        for name in write.server_timestamps {
            fields.insert(name.to_string(), now.clone());
        }
    }
    fields
}

fn remove_watcher(state: &Weak<RwLock<State>>, id: u64) {
    if let Some(state) = state.upgrade() {
        if state.write().watchers.remove(&id).is_some() {
            trace!(watcher = id, "live query removed");
        }
    }
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
    fn subscribe(
        &self,
        query: &CollectionQuery,
        on_next: SnapshotFn,
        on_error: ErrorFn,
    ) -> SubscriptionHandle {
        let _delivery = self.delivery.lock();
        let registered = {
            let mut st = self.state.write();
            if st.broken.contains(&query.collection) {
                None
            } else {
                st.next_watcher += 1;
                let id = st.next_watcher;
                st.watchers.insert(
                    id,
                    Watcher {
                        query: query.clone(),
                        on_next: on_next.clone(),
                        on_error: on_error.clone(),
                    },
                );
                Some((id, st.snapshot(query)))
            }
        };

        let Some((id, first)) = registered else {
            debug!(query = %query, "live query refused");
            on_error(SubscriptionError::new(format!(
                "listener on '{}' was revoked",
                query.collection
            )));
            return SubscriptionHandle::noop();
        };

        trace!(watcher = id, query = %query, "live query registered");
        on_next(first);

        let state = Arc::downgrade(&self.state);
        SubscriptionHandle::new(move || remove_watcher(&state, id))
    }

    async fn get_all(&self, query: &CollectionQuery) -> anyhow::Result<Vec<Record>> {
        self.check_readable(&query.collection)?;
        Ok(self.state.read().snapshot(query))
    }

    async fn get_by_id(&self, collection: &str, id: &str) -> anyhow::Result<Option<Record>> {
        self.check_readable(collection)?;
        let st = self.state.read();
        Ok(st
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|d| Record::new(id, d.fields.clone())))
    }

    async fn create(&self, collection: &str, write: WriteSet) -> anyhow::Result<String> {
        self.check_writable("create", collection)?;
        let id = Uuid::new_v4().to_string();
        let fields = stamp(write);
        let _delivery = self.delivery.lock();
        let pending = {
            let mut st = self.state.write();
            let seq = st.bump_seq();
            st.collections
                .entry(collection.to_string())
                .or_default()
                .insert(id.clone(), StoredDoc { seq, fields });
            st.pending_for(collection)
        };
        deliver(pending);
        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, write: WriteSet) -> anyhow::Result<()> {
        self.check_writable("update", collection)?;
        let patch = stamp(write);
        let _delivery = self.delivery.lock();
        let pending = {
            let mut st = self.state.write();
            let Some(doc) = st
                .collections
                .get_mut(collection)
                .and_then(|docs| docs.get_mut(id))
            else {
                bail!("no document '{id}' in '{collection}'");
            };
            for (k, v) in patch {
                doc.fields.insert(k, v);
            }
            st.pending_for(collection)
        };
        deliver(pending);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> anyhow::Result<()> {
        self.check_writable("delete", collection)?;
        let _delivery = self.delivery.lock();
        let pending = {
            let mut st = self.state.write();
            let removed = st
                .collections
                .get_mut(collection)
                .and_then(|docs| docs.remove(id))
                .is_some();
            if !removed {
                return Ok(());
            }
            st.pending_for(collection)
        };
        deliver(pending);
        Ok(())
    }
}
