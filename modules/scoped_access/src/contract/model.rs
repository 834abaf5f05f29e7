use std::fmt;
use std::str::FromStr;

use query_core::Document;
use serde::{Deserialize, Serialize};

/// Well-known document fields the layer reads or stamps.
pub mod fields {
    pub const BRANCH_ID: &str = "branchId";
    pub const CREATED_BY: &str = "createdBy";
    pub const CREATED_AT: &str = "createdAt";
    pub const UPDATED_AT: &str = "updatedAt";
    pub const ASSIGNED_COUNSELLOR_ID: &str = "assignedCounsellorId";
    pub const ROLE: &str = "role";
    pub const UID: &str = "uid";
}

/// Staff role of the acting principal.
///
/// Unrecognised role strings parse to [`Role::Unknown`], which no built-in
/// policy grants access to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    SuperAdmin,
    BranchAdmin,
    Counsellor,
    Processor,
    Accountant,
    Reception,
    Agent,
    Unknown(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::SuperAdmin => "superadmin",
            Role::BranchAdmin => "branch-admin",
            Role::Counsellor => "counsellor",
            Role::Processor => "processor",
            Role::Accountant => "accountant",
            Role::Reception => "reception",
            Role::Agent => "agent",
            Role::Unknown(s) => s,
        }
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        let norm = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        match norm.as_str() {
            "superadmin" | "super-admin" => Role::SuperAdmin,
            "branch-admin" | "branchadmin" => Role::BranchAdmin,
            "counsellor" | "counselor" => Role::Counsellor,
            "processor" => Role::Processor,
            "accountant" => Role::Accountant,
            "reception" | "receptionist" => Role::Reception,
            "agent" => Role::Agent,
            _ => Role::Unknown(s.to_string()),
        }
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        Role::from(s.as_str())
    }
}

impl From<Role> for String {
    fn from(r: Role) -> Self {
        r.as_str().to_string()
    }
}

impl FromStr for Role {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Role::from(s))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated principal. Read-only to this layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,
    pub role: Role,
    #[serde(default)]
    pub branch_id: Option<String>,
}

impl UserProfile {
    pub fn new(uid: impl Into<String>, role: Role) -> Self {
        Self {
            uid: uid.into(),
            role,
            branch_id: None,
        }
    }

    pub fn with_branch(mut self, branch_id: impl Into<String>) -> Self {
        self.branch_id = Some(branch_id.into());
        self
    }

    /// Branch the principal is bound to; blank values count as absent.
    pub fn branch(&self) -> Option<&str> {
        self.branch_id
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
    }

    /// Build a profile from a `users` record. The `uid` field wins over the
    /// record id when both are present. Returns `None` without a role.
    pub fn from_record(record: &Record) -> Option<Self> {
        let role = record.get(fields::ROLE)?.as_str()?;
        let uid = record
            .get(fields::UID)
            .and_then(|v| v.as_str())
            .unwrap_or(&record.id);
        let branch_id = record
            .get(fields::BRANCH_ID)
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Some(Self {
            uid: uid.to_string(),
            role: Role::from(role),
            branch_id,
        })
    }
}

/// Backend collections managed by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Enquiries,
    Assessments,
    Applications,
    VisaApplications,
    Payments,
    Users,
}

impl Entity {
    pub const ALL: [Entity; 6] = [
        Entity::Enquiries,
        Entity::Assessments,
        Entity::Applications,
        Entity::VisaApplications,
        Entity::Payments,
        Entity::Users,
    ];

    pub fn collection(self) -> &'static str {
        match self {
            Entity::Enquiries => "enquiries",
            Entity::Assessments => "assessments",
            Entity::Applications => "applications",
            Entity::VisaApplications => "visa_applications",
            Entity::Payments => "payments",
            Entity::Users => "users",
        }
    }

    /// Whether new records inherit the creator's branch.
    pub fn stamps_branch(self) -> bool {
        !matches!(self, Entity::Users)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown entity '{0}'")]
pub struct UnknownEntity(pub String);

impl FromStr for Entity {
    type Err = UnknownEntity;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        Entity::ALL
            .into_iter()
            .find(|e| e.collection() == norm)
            .ok_or_else(|| UnknownEntity(s.to_string()))
    }
}

/// A stored document plus its backend-generated id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(flatten)]
    pub fields: Document,
}

impl Record {
    pub fn new(id: impl Into<String>, fields: Document) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        query_core::lookup(&self.fields, field)
    }
}

/// Failure reported by a live subscription.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[error("subscription failed: {message}")]
pub struct SubscriptionError {
    pub message: String,
}

impl SubscriptionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Observable state handed to views.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ResultSet {
    pub data: Vec<Record>,
    pub loading: bool,
    pub error: Option<SubscriptionError>,
}

impl ResultSet {
    /// Empty, settled, no error. Used for Idle and for denied access.
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn loading() -> Self {
        Self {
            data: Vec::new(),
            loading: true,
            error: None,
        }
    }

    pub fn live(data: Vec<Record>) -> Self {
        Self {
            data,
            loading: false,
            error: None,
        }
    }

    pub fn errored(error: SubscriptionError) -> Self {
        Self {
            data: Vec::new(),
            loading: false,
            error: Some(error),
        }
    }
}

/// Fields to persist plus the fields the backend must stamp with its own clock.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WriteSet {
    pub fields: Document,
    pub server_timestamps: Vec<&'static str>,
}
