//! Role-keyed query scoping.
//!
//! Every entity owns a [`ConstraintPolicy`] that maps the acting principal to
//! a [`ScopeDecision`]. Policies are pure: no I/O, no shared state, so they can
//! be re-evaluated synchronously on every profile change.

use std::collections::HashMap;
use std::sync::Arc;

use query_core::Constraint;
use serde::{Deserialize, Serialize};

use crate::contract::model::{fields, Entity, Role, UserProfile};

/// Outcome of scoping a query for a principal.
///
/// `Allowed(vec![])` means full visibility; `Denied` means no access at all.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "access", content = "constraints", rename_all = "snake_case")]
pub enum ScopeDecision {
    Allowed(Vec<Constraint>),
    Denied,
}

impl ScopeDecision {
    pub fn unrestricted() -> Self {
        ScopeDecision::Allowed(Vec::new())
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, ScopeDecision::Denied)
    }

    pub fn constraints(&self) -> Option<&[Constraint]> {
        match self {
            ScopeDecision::Allowed(c) => Some(c),
            ScopeDecision::Denied => None,
        }
    }
}

pub trait ConstraintPolicy: Send + Sync {
    /// An unresolved profile (`None`) must never produce an unscoped query.
    fn build(&self, profile: Option<&UserProfile>) -> ScopeDecision;
}

impl<F> ConstraintPolicy for F
where
    F: Fn(Option<&UserProfile>) -> ScopeDecision + Send + Sync,
{
    fn build(&self, profile: Option<&UserProfile>) -> ScopeDecision {
        self(profile)
    }
}

/// How a matching rule scopes the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Strategy {
    /// Whole collection.
    All,
    /// `branchId == profile.branch`; denied without a branch.
    Branch,
    /// `<field> == profile.uid` and `branchId == profile.branch`; denied without a branch.
    AssignedInBranch { field: String },
    /// `<field> == profile.uid`.
    Owner { field: String },
    Deny,
}

impl Strategy {
    pub fn decide(&self, profile: &UserProfile) -> ScopeDecision {
        match self {
            Strategy::All => ScopeDecision::unrestricted(),
            Strategy::Branch => match profile.branch() {
                Some(b) => ScopeDecision::Allowed(vec![Constraint::eq(fields::BRANCH_ID, b)]),
                None => ScopeDecision::Denied,
            },
            Strategy::AssignedInBranch { field } => match profile.branch() {
                Some(b) => ScopeDecision::Allowed(vec![
                    Constraint::eq(field.as_str(), profile.uid.as_str()),
                    Constraint::eq(fields::BRANCH_ID, b),
                ]),
                None => ScopeDecision::Denied,
            },
            Strategy::Owner { field } => {
                ScopeDecision::Allowed(vec![Constraint::eq(field.as_str(), profile.uid.as_str())])
            }
            Strategy::Deny => ScopeDecision::Denied,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub roles: Vec<Role>,
    #[serde(flatten)]
    pub strategy: Strategy,
}

impl PolicyRule {
    pub fn new(roles: impl IntoIterator<Item = Role>, strategy: Strategy) -> Self {
        Self {
            roles: roles.into_iter().collect(),
            strategy,
        }
    }
}

/// Ordered rule list; the first rule naming the principal's role wins and
/// roles no rule names are denied.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RolePolicy {
    pub rules: Vec<PolicyRule>,
}

impl RolePolicy {
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self { rules }
    }

    pub fn rule_for(&self, role: &Role) -> Option<&PolicyRule> {
        self.rules.iter().find(|r| r.roles.contains(role))
    }
}

impl ConstraintPolicy for RolePolicy {
    fn build(&self, profile: Option<&UserProfile>) -> ScopeDecision {
        let Some(profile) = profile else {
            return ScopeDecision::Denied;
        };
        match self.rule_for(&profile.role) {
            Some(rule) => rule.strategy.decide(profile),
            None => ScopeDecision::Denied,
        }
    }
}

/// Declarative `{entity → policy}` table.
#[derive(Clone)]
pub struct PolicyTable {
    policies: HashMap<Entity, Arc<dyn ConstraintPolicy>>,
}

impl PolicyTable {
    /// Table with no entries: every entity is denied.
    pub fn empty() -> Self {
        Self {
            policies: HashMap::new(),
        }
    }

    pub fn set(&mut self, entity: Entity, policy: Arc<dyn ConstraintPolicy>) {
        self.policies.insert(entity, policy);
    }

    pub fn with(mut self, entity: Entity, policy: impl ConstraintPolicy + 'static) -> Self {
        self.set(entity, Arc::new(policy));
        self
    }

    /// Replace the rule lists of the given entities wholesale.
    pub fn apply_overrides(&mut self, overrides: &HashMap<Entity, Vec<PolicyRule>>) {
        for (entity, rules) in overrides {
            self.set(*entity, Arc::new(RolePolicy::new(rules.clone())));
        }
    }

    /// Policy for `entity`; unknown entities get a deny-all policy.
    pub fn get(&self, entity: Entity) -> Arc<dyn ConstraintPolicy> {
        match self.policies.get(&entity) {
            Some(p) => p.clone(),
            None => Arc::new(|_: Option<&UserProfile>| ScopeDecision::Denied),
        }
    }

    pub fn decide(&self, entity: Entity, profile: Option<&UserProfile>) -> ScopeDecision {
        self.get(entity).build(profile)
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        let mut table = Self::empty();
        for entity in Entity::ALL {
            table.set(entity, Arc::new(builtin_rules(entity)));
        }
        table
    }
}

impl std::fmt::Debug for PolicyTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.policies.keys().map(|e| e.collection()).collect();
        keys.sort_unstable();
        f.debug_struct("PolicyTable").field("entities", &keys).finish()
    }
}

fn owner(field: &str) -> Strategy {
    Strategy::Owner {
        field: field.to_string(),
    }
}

/// Built-in per-entity rules. Entities deliberately differ (a counsellor sees
/// every assessment but only assigned enquiries in their branch).
pub fn builtin_rules(entity: Entity) -> RolePolicy {
    use Role::*;

    let rules = match entity {
        Entity::Enquiries => vec![
            PolicyRule::new([SuperAdmin, Processor], Strategy::All),
            PolicyRule::new([BranchAdmin, Reception, Accountant], Strategy::Branch),
            PolicyRule::new(
                [Counsellor],
                Strategy::AssignedInBranch {
                    field: fields::ASSIGNED_COUNSELLOR_ID.to_string(),
                },
            ),
            PolicyRule::new([Agent], owner(fields::CREATED_BY)),
        ],
        Entity::Assessments => vec![
            PolicyRule::new([SuperAdmin, Processor, Counsellor], Strategy::All),
            PolicyRule::new([BranchAdmin, Reception], Strategy::Branch),
        ],
        Entity::Applications => vec![
            PolicyRule::new([SuperAdmin, Processor], Strategy::All),
            PolicyRule::new(
                [BranchAdmin, Counsellor, Reception, Accountant],
                Strategy::Branch,
            ),
            PolicyRule::new([Agent], owner(fields::CREATED_BY)),
        ],
        Entity::VisaApplications => vec![
            PolicyRule::new([SuperAdmin, Processor], Strategy::All),
            PolicyRule::new([BranchAdmin, Counsellor], Strategy::Branch),
        ],
        Entity::Payments => vec![
            PolicyRule::new([SuperAdmin, Accountant], Strategy::All),
            PolicyRule::new([BranchAdmin, Counsellor, Reception], Strategy::Branch),
        ],
        Entity::Users => vec![
            PolicyRule::new([SuperAdmin], Strategy::All),
            PolicyRule::new([BranchAdmin], Strategy::Branch),
            PolicyRule::new(
                [Counsellor, Processor, Accountant, Reception, Agent],
                owner(fields::UID),
            ),
        ],
    };
    RolePolicy::new(rules)
}
