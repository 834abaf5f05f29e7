use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::contract::model::Entity;
use crate::domain::policy::PolicyRule;

/// Configuration for the scoped_access module
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScopedAccessConfig {
    /// Capacity of the record event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// YAML file used to seed the in-memory backend (`collection -> id -> fields`).
    #[serde(default)]
    pub seed_file: Option<String>,
    /// Per-entity rule lists replacing the built-in ones.
    #[serde(default)]
    pub policies: HashMap<Entity, Vec<PolicyRule>>,
}

impl Default for ScopedAccessConfig {
    fn default() -> Self {
        Self {
            event_capacity: default_event_capacity(),
            seed_file: None,
            policies: HashMap::new(),
        }
    }
}

fn default_event_capacity() -> usize {
    16
}
