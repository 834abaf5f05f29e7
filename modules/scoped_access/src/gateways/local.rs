use std::sync::{Arc, Weak};

use async_trait::async_trait;
use query_core::{Constraint, Document};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::contract::{
    client::ScopedCollectionApi,
    error::AccessError,
    model::{Entity, Record, ResultSet, UserProfile},
};
use crate::domain::error::DomainError;
use crate::domain::policy::ScopeDecision;
use crate::domain::service::EntityService;
use crate::domain::session::Session;
use crate::domain::subscription::{Phase, ScopedSubscription};

/// Live, role-scoped view of one collection plus its CRUD facade.
///
/// The subscription follows the session profile until the handle is dropped
/// or [`EntityHandle::close`] is called.
pub struct EntityHandle {
    subscription: Arc<ScopedSubscription>,
    service: EntityService,
    session: Arc<Session>,
    cancel: CancellationToken,
}

impl EntityHandle {
    /// Applies the current profile synchronously, then follows session changes
    /// in a background task when a tokio runtime is available.
    pub fn new(subscription: ScopedSubscription, service: EntityService, session: Arc<Session>) -> Self {
        let subscription = Arc::new(subscription);
        let mut rx = session.watch();
        let current = rx.borrow_and_update().clone();
        subscription.set_profile(current.as_ref());

        let cancel = CancellationToken::new();
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn(follow_session(
                    Arc::downgrade(&subscription),
                    rx,
                    cancel.clone(),
                ));
            }
            Err(_) => {
                warn!(entity = %subscription.entity(), "no tokio runtime; handle will not follow sign-in changes");
            }
        }

        Self {
            subscription,
            service,
            session,
            cancel,
        }
    }

    pub fn entity(&self) -> Entity {
        self.subscription.entity()
    }

    pub fn phase(&self) -> Phase {
        self.subscription.phase()
    }

    pub fn decision(&self) -> Option<ScopeDecision> {
        self.subscription.decision()
    }

    /// Re-subscribe with the current scope; the only way out of an error.
    pub fn refresh(&self) {
        self.subscription.refresh();
    }

    /// Stop following the session and tear down the live query.
    pub fn close(&self) {
        self.cancel.cancel();
        self.subscription.close();
    }

    fn principal(&self) -> Result<UserProfile, AccessError> {
        self.session
            .current()
            .ok_or_else(|| DomainError::Unauthenticated.into())
    }
}

impl Drop for EntityHandle {
    fn drop(&mut self) {
        self.close();
    }
}

async fn follow_session(
    subscription: Weak<ScopedSubscription>,
    mut rx: watch::Receiver<Option<UserProfile>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    debug!("session closed; handle stops following");
                    break;
                }
                let profile = rx.borrow_and_update().clone();
                let Some(sub) = subscription.upgrade() else { break };
                sub.set_profile(profile.as_ref());
            }
        }
    }
}

#[async_trait]
impl ScopedCollectionApi for EntityHandle {
    fn snapshot(&self) -> ResultSet {
        self.subscription.snapshot()
    }

    fn watch(&self) -> watch::Receiver<ResultSet> {
        self.subscription.watch()
    }

    async fn create(&self, data: Document) -> Result<String, AccessError> {
        let principal = self.principal()?;
        self.service
            .create(&principal, data)
            .await
            .map_err(Into::into)
    }

    async fn update(&self, id: &str, data: Document) -> Result<(), AccessError> {
        self.service.update(id, data).await.map_err(Into::into)
    }

    async fn delete(&self, id: &str) -> Result<(), AccessError> {
        self.service.delete(id).await.map_err(Into::into)
    }

    async fn get_all(&self, constraints: Vec<Constraint>) -> Result<Vec<Record>, AccessError> {
        self.service.get_all(constraints).await.map_err(Into::into)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Record>, AccessError> {
        self.service.get_by_id(id).await.map_err(Into::into)
    }
}
