use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::contract::model::Entity;

/// Transport-agnostic record event, published after a successful write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordEvent {
    Created {
        entity: Entity,
        id: String,
        by: String,
        at: DateTime<Utc>,
    },
    Updated {
        entity: Entity,
        id: String,
        at: DateTime<Utc>,
    },
    Deleted {
        entity: Entity,
        id: String,
        at: DateTime<Utc>,
    },
}

impl RecordEvent {
    pub fn id(&self) -> &str {
        match self {
            RecordEvent::Created { id, .. }
            | RecordEvent::Updated { id, .. }
            | RecordEvent::Deleted { id, .. } => id,
        }
    }
}
