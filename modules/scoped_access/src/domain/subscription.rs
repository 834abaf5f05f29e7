//! Binds a [`ResultSet`] to one live, role-scoped backend query.
//!
//! Invariants:
//! - at most one backend handle is alive per `ScopedSubscription`;
//! - the previous handle is torn down before the next one is registered;
//! - every scope change resets `data` to empty before anything else is shown;
//! - callbacks from a torn-down handle never touch state (generation guard).

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use query_core::CollectionQuery;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, instrument, trace, warn};

use crate::contract::model::{Entity, Record, ResultSet, SubscriptionError, UserProfile};
use crate::domain::policy::{ConstraintPolicy, ScopeDecision};
use crate::domain::ports::{DocumentBackend, ErrorFn, SnapshotFn, SubscriptionHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Unresolved profile or access denied; no backend subscription.
    Idle,
    /// Subscription registered, first snapshot pending.
    Loading,
    /// At least one snapshot delivered for the current scope.
    Live,
    /// Backend reported a failure; waits for the next scope change.
    Errored,
}

struct Inner {
    generation: u64,
    phase: Phase,
    scope_key: Option<String>,
    profile: Option<UserProfile>,
    decision: Option<ScopeDecision>,
    handle: Option<SubscriptionHandle>,
}

struct Shared {
    entity: Entity,
    inner: Mutex<Inner>,
    state: watch::Sender<ResultSet>,
}

impl Shared {
    fn apply_snapshot(&self, generation: u64, data: Vec<Record>) {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            trace!(entity = %self.entity, generation, "dropping stale snapshot");
            return;
        }
        if !matches!(inner.phase, Phase::Loading | Phase::Live) {
            trace!(entity = %self.entity, phase = ?inner.phase, "dropping snapshot outside live phases");
            return;
        }
        if inner.phase == Phase::Loading {
            debug!(entity = %self.entity, records = data.len(), "first snapshot delivered");
        }
        inner.phase = Phase::Live;
        self.state.send_replace(ResultSet::live(data));
    }

    fn apply_error(&self, generation: u64, error: SubscriptionError) {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            trace!(entity = %self.entity, generation, "dropping stale subscription error");
            return;
        }
        if !matches!(inner.phase, Phase::Loading | Phase::Live) {
            return;
        }
        warn!(entity = %self.entity, error = %error, "live subscription failed");
        inner.phase = Phase::Errored;
        self.state.send_replace(ResultSet::errored(error));
    }
}

/// Generic lifecycle manager, parameterized by the entity's policy.
pub struct ScopedSubscription {
    shared: Arc<Shared>,
    backend: Arc<dyn DocumentBackend>,
    policy: Arc<dyn ConstraintPolicy>,
    // Serializes scope transitions; never held by backend callbacks.
    transition: Mutex<()>,
}

impl ScopedSubscription {
    /// Starts Idle. Nothing is requested from the backend until a profile is set.
    pub fn new(
        entity: Entity,
        backend: Arc<dyn DocumentBackend>,
        policy: Arc<dyn ConstraintPolicy>,
    ) -> Self {
        let (state, _rx) = watch::channel(ResultSet::idle());
        Self {
            shared: Arc::new(Shared {
                entity,
                inner: Mutex::new(Inner {
                    generation: 0,
                    phase: Phase::Idle,
                    scope_key: None,
                    profile: None,
                    decision: None,
                    handle: None,
                }),
                state,
            }),
            backend,
            policy,
            transition: Mutex::new(()),
        }
    }

    pub fn entity(&self) -> Entity {
        self.shared.entity
    }

    pub fn snapshot(&self) -> ResultSet {
        self.shared.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ResultSet> {
        self.shared.state.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.shared.inner.lock().phase
    }

    /// Decision computed for the current scope, if any profile was applied.
    pub fn decision(&self) -> Option<ScopeDecision> {
        self.shared.inner.lock().decision.clone()
    }

    pub fn scope_key(&self) -> Option<String> {
        self.shared.inner.lock().scope_key.clone()
    }

    /// Re-scope to `profile`. A no-op when neither the principal identity nor
    /// the serialized constraints changed.
    #[instrument(
        name = "scoped_access.subscription.set_profile",
        skip(self, profile),
        fields(entity = %self.shared.entity, uid = profile.map(|p| p.uid.as_str()).unwrap_or("-"))
    )]
    pub fn set_profile(&self, profile: Option<&UserProfile>) {
        let _guard = self.transition.lock();
        let decision = self.policy.build(profile);
        let key = self.key_for(profile, &decision);

        if self.shared.inner.lock().scope_key.as_deref() == Some(key.as_str()) {
            trace!("scope unchanged");
            return;
        }
        self.transition_to(profile.cloned(), decision, key);
    }

    /// Force a fresh subscription for the current scope (manual retry).
    #[instrument(name = "scoped_access.subscription.refresh", skip(self), fields(entity = %self.shared.entity))]
    pub fn refresh(&self) {
        let _guard = self.transition.lock();
        let profile = self.shared.inner.lock().profile.clone();
        let decision = self.policy.build(profile.as_ref());
        let key = self.key_for(profile.as_ref(), &decision);
        info!("refreshing subscription");
        self.transition_to(profile, decision, key);
    }

    /// Tear down the live handle, if any. State is left as is.
    pub fn close(&self) {
        let _guard = self.transition.lock();
        let old = {
            let mut inner = self.shared.inner.lock();
            inner.generation += 1;
            inner.scope_key = None;
            inner.handle.take()
        };
        if let Some(handle) = old {
            debug!(entity = %self.shared.entity, "closing subscription");
            handle.unsubscribe();
        }
    }

    fn key_for(&self, profile: Option<&UserProfile>, decision: &ScopeDecision) -> String {
        let who = profile.map(|p| p.uid.as_str()).unwrap_or("-");
        match decision {
            ScopeDecision::Denied => format!("{who}|denied"),
            ScopeDecision::Allowed(constraints) => {
                let q = CollectionQuery::with_constraints(
                    self.shared.entity.collection(),
                    constraints.clone(),
                );
                format!("{who}|{}", q.scope_key())
            }
        }
    }

    fn transition_to(&self, profile: Option<UserProfile>, decision: ScopeDecision, key: String) {
        let entity = self.shared.entity;

        // 1. invalidate the old generation and reset visible state
        let (old, generation) = {
            let mut inner = self.shared.inner.lock();
            inner.generation += 1;
            inner.scope_key = Some(key);
            inner.profile = profile;
            inner.decision = Some(decision.clone());
            if decision.is_denied() {
                inner.phase = Phase::Idle;
                self.shared.state.send_replace(ResultSet::idle());
            } else {
                inner.phase = Phase::Loading;
                self.shared.state.send_replace(ResultSet::loading());
            }
            (inner.handle.take(), inner.generation)
        };

        // 2. tear down strictly before registering the replacement
        if let Some(handle) = old {
            debug!(%entity, "tearing down previous subscription");
            handle.unsubscribe();
        }

        let ScopeDecision::Allowed(constraints) = decision else {
            debug!(%entity, "access denied; staying idle");
            return;
        };

        // 3. register the new live query
        let query = CollectionQuery::with_constraints(entity.collection(), constraints);
        info!(%entity, query = %query, generation, "subscribing");

        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let on_next: SnapshotFn = {
            let weak = weak.clone();
            Arc::new(move |data: Vec<Record>| {
                if let Some(shared) = weak.upgrade() {
                    shared.apply_snapshot(generation, data);
                }
            })
        };
        let on_error: ErrorFn = Arc::new(move |error: SubscriptionError| {
            if let Some(shared) = weak.upgrade() {
                shared.apply_error(generation, error);
            }
        });

        let handle = self.backend.subscribe(&query, on_next, on_error);

        let mut inner = self.shared.inner.lock();
        if inner.generation == generation {
            inner.handle = Some(handle);
        } else {
            drop(inner);
            handle.unsubscribe();
        }
    }
}

impl Drop for ScopedSubscription {
    fn drop(&mut self) {
        self.close();
    }
}
