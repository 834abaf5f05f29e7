use std::sync::Arc;

use chrono::Utc;
use query_core::{CollectionQuery, Constraint, Document};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::contract::model::{fields, Entity, Record, UserProfile, WriteSet};
use crate::domain::error::DomainError;
use crate::domain::events::RecordEvent;
use crate::domain::ports::{DocumentBackend, EventPublisher};

/// CRUD facade for one entity collection.
/// Depends only on the backend port, not on infra types.
#[derive(Clone)]
pub struct EntityService {
    backend: Arc<dyn DocumentBackend>,
    events: Arc<dyn EventPublisher<RecordEvent>>,
    entity: Entity,
}

impl EntityService {
    pub fn new(
        backend: Arc<dyn DocumentBackend>,
        events: Arc<dyn EventPublisher<RecordEvent>>,
        entity: Entity,
    ) -> Self {
        Self {
            backend,
            events,
            entity,
        }
    }

    pub fn entity(&self) -> Entity {
        self.entity
    }

    fn collection(&self) -> &'static str {
        self.entity.collection()
    }

    #[instrument(
        name = "scoped_access.service.create",
        skip(self, principal, data),
        fields(entity = %self.entity, uid = %principal.uid)
    )]
    pub async fn create(&self, principal: &UserProfile, data: Document) -> Result<String, DomainError> {
        info!("Creating record");

        let mut doc = data;
        doc.remove(fields::CREATED_AT);
        doc.remove(fields::UPDATED_AT);
        doc.insert(
            fields::CREATED_BY.to_string(),
            Value::String(principal.uid.clone()),
        );

        if self.entity.stamps_branch() && !has_value(&doc, fields::BRANCH_ID) {
            if let Some(branch) = principal.branch() {
                debug!(branch, "Defaulting branchId from principal");
                doc.insert(
                    fields::BRANCH_ID.to_string(),
                    Value::String(branch.to_string()),
                );
            }
        }

        let write = WriteSet {
            fields: doc,
            server_timestamps: vec![fields::CREATED_AT, fields::UPDATED_AT],
        };

        let id = self
            .backend
            .create(self.collection(), write)
            .await
            .map_err(|e| DomainError::backend_write(self.collection(), "create", e.to_string()))?;

        self.events.publish(&RecordEvent::Created {
            entity: self.entity,
            id: id.clone(),
            by: principal.uid.clone(),
            at: Utc::now(),
        });

        info!("Successfully created record with id={}", id);
        Ok(id)
    }

    #[instrument(
        name = "scoped_access.service.update",
        skip(self, data),
        fields(entity = %self.entity, record_id = %id)
    )]
    pub async fn update(&self, id: &str, data: Document) -> Result<(), DomainError> {
        info!("Updating record");
        let id = require_id(id)?;

        let mut doc = data;
        // Provenance is immutable after creation
        doc.remove(fields::CREATED_BY);
        doc.remove(fields::CREATED_AT);
        doc.remove(fields::UPDATED_AT);

        let write = WriteSet {
            fields: doc,
            server_timestamps: vec![fields::UPDATED_AT],
        };

        self.backend
            .update(self.collection(), id, write)
            .await
            .map_err(|e| DomainError::backend_write(self.collection(), "update", e.to_string()))?;

        self.events.publish(&RecordEvent::Updated {
            entity: self.entity,
            id: id.to_string(),
            at: Utc::now(),
        });

        info!("Successfully updated record");
        Ok(())
    }

    #[instrument(
        name = "scoped_access.service.delete",
        skip(self),
        fields(entity = %self.entity, record_id = %id)
    )]
    pub async fn delete(&self, id: &str) -> Result<(), DomainError> {
        info!("Deleting record");
        let id = require_id(id)?;

        self.backend
            .delete(self.collection(), id)
            .await
            .map_err(|e| DomainError::backend_write(self.collection(), "delete", e.to_string()))?;

        self.events.publish(&RecordEvent::Deleted {
            entity: self.entity,
            id: id.to_string(),
            at: Utc::now(),
        });

        info!("Successfully deleted record");
        Ok(())
    }

    #[instrument(
        name = "scoped_access.service.get_all",
        skip(self, constraints),
        fields(entity = %self.entity, constraints = constraints.len())
    )]
    pub async fn get_all(&self, constraints: Vec<Constraint>) -> Result<Vec<Record>, DomainError> {
        debug!("Listing records");

        let query = CollectionQuery::with_constraints(self.collection(), constraints);
        query.validate()?;

        let records = self
            .backend
            .get_all(&query)
            .await
            .map_err(|e| DomainError::backend_read(self.collection(), e.to_string()))?;

        debug!("Successfully listed {} records", records.len());
        Ok(records)
    }

    #[instrument(
        name = "scoped_access.service.get_by_id",
        skip(self),
        fields(entity = %self.entity, record_id = %id)
    )]
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Record>, DomainError> {
        debug!("Getting record by id");

        let id = id.trim();
        if id.is_empty() {
            return Ok(None);
        }

        let record = self
            .backend
            .get_by_id(self.collection(), id)
            .await
            .map_err(|e| DomainError::backend_read(self.collection(), e.to_string()))?;

        debug!(found = record.is_some(), "Lookup finished");
        Ok(record)
    }
}

// --- validation helpers ---

fn require_id(id: &str) -> Result<&str, DomainError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(DomainError::missing_id());
    }
    Ok(id)
}

fn has_value(doc: &Document, field: &str) -> bool {
    match doc.get(field) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}
