//! Backend-agnostic query constraints for document collections.
//!
//! A [`CollectionQuery`] names a collection and carries an ordered list of
//! [`ast::Constraint`]s. The list order is significant: it is part of the
//! query's identity ([`CollectionQuery::scope_key`]) and ordering clauses are
//! applied in the order they appear.

pub mod ast {
    use serde::{Deserialize, Serialize};
    use serde_json::Value;
    use std::fmt;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum CompareOperator {
        Eq,
        Ne,
        Gt,
        Ge,
        Lt,
        Le,
        /// Right-hand side must be an array; matches when any element is equal.
        In,
    }

    impl fmt::Display for CompareOperator {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let s = match self {
                CompareOperator::Eq => "==",
                CompareOperator::Ne => "!=",
                CompareOperator::Gt => ">",
                CompareOperator::Ge => ">=",
                CompareOperator::Lt => "<",
                CompareOperator::Le => "<=",
                CompareOperator::In => "in",
            };
            f.write_str(s)
        }
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum SortDir {
        Asc,
        Desc,
    }

    impl SortDir {
        pub fn reverse(self) -> Self {
            match self {
                SortDir::Asc => SortDir::Desc,
                SortDir::Desc => SortDir::Asc,
            }
        }
    }

    /// A single filter or ordering clause.
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "kind", rename_all = "snake_case")]
    pub enum Constraint {
        Where {
            field: String,
            op: CompareOperator,
            value: Value,
        },
        OrderBy {
            field: String,
            dir: SortDir,
        },
        Limit {
            count: usize,
        },
    }

    impl Constraint {
        pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
            Self::compare(field, CompareOperator::Eq, value)
        }

        pub fn compare(
            field: impl Into<String>,
            op: CompareOperator,
            value: impl Into<Value>,
        ) -> Self {
            Constraint::Where {
                field: field.into(),
                op,
                value: value.into(),
            }
        }

        pub fn order_by(field: impl Into<String>, dir: SortDir) -> Self {
            Constraint::OrderBy {
                field: field.into(),
                dir,
            }
        }

        pub fn limit(count: usize) -> Self {
            Constraint::Limit { count }
        }

        /// True for `field == value` filters on the given field.
        pub fn is_equality_on(&self, name: &str) -> bool {
            matches!(self, Constraint::Where { field, op: CompareOperator::Eq, .. } if field == name)
        }
    }

    impl fmt::Display for Constraint {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Constraint::Where { field, op, value } => write!(f, "{field} {op} {value}"),
                Constraint::OrderBy { field, dir } => match dir {
                    SortDir::Asc => write!(f, "+{field}"),
                    SortDir::Desc => write!(f, "-{field}"),
                },
                Constraint::Limit { count } => write!(f, "limit {count}"),
            }
        }
    }
}

mod eval;

pub use ast::{CompareOperator, Constraint, SortDir};
pub use eval::{compare_values, lookup, total_cmp};

use serde::{Deserialize, Serialize};

/// Opaque document body: a JSON object.
pub type Document = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("constraint has an empty field name")]
    EmptyField,
    #[error("`in` filter on '{0}' requires an array value")]
    InOperandNotArray(String),
    #[error("collection name is empty")]
    EmptyCollection,
}

/// Named collection plus its ordered constraint list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionQuery {
    pub collection: String,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

impl CollectionQuery {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            constraints: Vec::new(),
        }
    }

    pub fn with_constraints(collection: impl Into<String>, constraints: Vec<Constraint>) -> Self {
        Self {
            collection: collection.into(),
            constraints,
        }
    }

    pub fn push(mut self, c: Constraint) -> Self {
        self.constraints.push(c);
        self
    }

    pub fn is_unconstrained(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Stable serialized form used to detect scope changes.
    pub fn scope_key(&self) -> String {
        // Constraint serialization cannot fail: every variant is plain data.
        let body = serde_json::to_string(&self.constraints).unwrap_or_default();
        format!("{}:{}", self.collection, body)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.collection.trim().is_empty() {
            return Err(Error::EmptyCollection);
        }
        for c in &self.constraints {
            match c {
                Constraint::Where { field, op, value } => {
                    if field.is_empty() {
                        return Err(Error::EmptyField);
                    }
                    if *op == CompareOperator::In && !value.is_array() {
                        return Err(Error::InOperandNotArray(field.clone()));
                    }
                }
                Constraint::OrderBy { field, .. } if field.is_empty() => {
                    return Err(Error::EmptyField);
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// True when the document satisfies every filter clause.
    pub fn matches(&self, doc: &Document) -> bool {
        self.constraints.iter().all(|c| eval::matches(c, doc))
    }

    /// Filter, order and limit `items` in process. Sorting is stable, so
    /// items with equal sort keys keep their input order.
    pub fn apply<T, F>(&self, items: Vec<T>, doc: F) -> Vec<T>
    where
        F: Fn(&T) -> &Document,
    {
        let mut out: Vec<T> = items.into_iter().filter(|t| self.matches(doc(t))).collect();

        let order: Vec<(&str, SortDir)> = self
            .constraints
            .iter()
            .filter_map(|c| match c {
                Constraint::OrderBy { field, dir } => Some((field.as_str(), *dir)),
                _ => None,
            })
            .collect();
        if !order.is_empty() {
            out.sort_by(|a, b| eval::compare_by(doc(a), doc(b), &order));
        }

        let limit = self
            .constraints
            .iter()
            .filter_map(|c| match c {
                Constraint::Limit { count } => Some(*count),
                _ => None,
            })
            .min();
        if let Some(n) = limit {
            out.truncate(n);
        }
        out
    }
}

impl std::fmt::Display for CollectionQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.collection)?;
        for c in &self.constraints {
            write!(f, " | {c}")?;
        }
        Ok(())
    }
}
