use std::sync::Arc;

use futures::Stream;
use tracing::{info, instrument};

use crate::config::ScopedAccessConfig;
use crate::contract::{
    error::AccessError,
    model::{Entity, UserProfile},
};
use crate::domain::error::DomainError;
use crate::domain::events::RecordEvent;
use crate::domain::policy::PolicyTable;
use crate::domain::ports::DocumentBackend;
use crate::domain::service::EntityService;
use crate::domain::session::Session;
use crate::domain::subscription::ScopedSubscription;
use crate::gateways::EntityHandle;
use crate::infra::BroadcastPublisher;

/// Entry point wiring the backend, the policy table, record events and the
/// signed-in session.
pub struct AccessLayer {
    backend: Arc<dyn DocumentBackend>,
    policies: PolicyTable,
    events: Arc<BroadcastPublisher<RecordEvent>>,
    session: Arc<Session>,
}

impl AccessLayer {
    /// Built-in policies with the configured per-entity overrides applied.
    pub fn new(backend: Arc<dyn DocumentBackend>, config: &ScopedAccessConfig) -> Self {
        let mut policies = PolicyTable::default();
        policies.apply_overrides(&config.policies);
        Self::with_policies(backend, policies, config.event_capacity)
    }

    pub fn with_policies(
        backend: Arc<dyn DocumentBackend>,
        policies: PolicyTable,
        event_capacity: usize,
    ) -> Self {
        info!(?policies, "scoped access layer initialized");
        Self {
            backend,
            policies,
            events: Arc::new(BroadcastPublisher::new(event_capacity)),
            session: Arc::new(Session::new()),
        }
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Stream of record events emitted after successful writes.
    pub fn events(&self) -> impl Stream<Item = RecordEvent> {
        self.events.subscribe_stream()
    }

    pub fn service(&self, entity: Entity) -> EntityService {
        EntityService::new(self.backend.clone(), self.events.clone(), entity)
    }

    /// Open a live, role-scoped handle on `entity` that follows the session.
    pub fn open(&self, entity: Entity) -> EntityHandle {
        let subscription =
            ScopedSubscription::new(entity, self.backend.clone(), self.policies.get(entity));
        EntityHandle::new(subscription, self.service(entity), self.session.clone())
    }

    /// Resolve the profile stored under `uid` in the users collection and
    /// make it the session principal.
    #[instrument(name = "scoped_access.layer.sign_in", skip(self), fields(uid = %uid))]
    pub async fn sign_in(&self, uid: &str) -> Result<UserProfile, AccessError> {
        let record = self
            .service(Entity::Users)
            .get_by_id(uid)
            .await?
            .ok_or_else(|| DomainError::profile_not_found(uid))?;
        let profile =
            UserProfile::from_record(&record).ok_or_else(|| DomainError::profile_not_found(uid))?;
        self.session.sign_in(profile.clone());
        Ok(profile)
    }

    pub fn sign_out(&self) {
        self.session.sign_out();
    }
}
