use std::cmp::Ordering;

use serde_json::Value;

use crate::ast::{CompareOperator, Constraint, SortDir};
use crate::Document;

/// Resolve a possibly dotted field path (`address.city`) inside a document.
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut cur = doc.get(first)?;
    for part in parts {
        cur = cur.as_object()?.get(part)?;
    }
    Some(cur)
}

/// Order two JSON values of the same kind. Values of different kinds are
/// incomparable and yield `None`.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                return Some(x.cmp(&y));
            }
            x.as_f64()?.partial_cmp(&y.as_f64()?)
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            (a == b).then_some(Ordering::Equal)
        }
        _ => None,
    }
}

pub(crate) fn matches(c: &Constraint, doc: &Document) -> bool {
    let Constraint::Where { field, op, value } = c else {
        return true;
    };
    let missing = Value::Null;
    let actual = lookup(doc, field).unwrap_or(&missing);

    match op {
        CompareOperator::In => value
            .as_array()
            .is_some_and(|items| items.iter().any(|v| compare_values(actual, v) == Some(Ordering::Equal))),
        CompareOperator::Ne => compare_values(actual, value) != Some(Ordering::Equal),
        _ => match compare_values(actual, value) {
            Some(ord) => match op {
                CompareOperator::Eq => ord == Ordering::Equal,
                CompareOperator::Gt => ord == Ordering::Greater,
                CompareOperator::Ge => ord != Ordering::Less,
                CompareOperator::Lt => ord == Ordering::Less,
                CompareOperator::Le => ord != Ordering::Greater,
                CompareOperator::Ne | CompareOperator::In => false,
            },
            None => false,
        },
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values for sorting: kinds rank
/// null < bool < number < string < array < object, then values compare
/// within their kind.
pub fn total_cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y) {
                let ord = total_cmp(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            for ((lk, lv), (rk, rv)) in x.iter().zip(y) {
                let ord = lk.cmp(rk).then_with(|| total_cmp(lv, rv));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => match type_rank(a).cmp(&type_rank(b)) {
            Ordering::Equal => compare_values(a, b).unwrap_or(Ordering::Equal),
            ord => ord,
        },
    }
}

/// Multi-key comparator. Missing keys sort after present ones.
pub(crate) fn compare_by(a: &Document, b: &Document, order: &[(&str, SortDir)]) -> Ordering {
    for (field, dir) in order {
        let ord = match (lookup(a, field), lookup(b, field)) {
            (Some(x), Some(y)) => {
                let ord = total_cmp(x, y);
                match dir {
                    SortDir::Asc => ord,
                    SortDir::Desc => ord.reverse(),
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
