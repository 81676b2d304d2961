use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A scalar attribute value. Tables hold nothing richer than this; nested
/// arrays or objects are rejected at parse time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

/// One row: an insertion-ordered mapping from attribute name to value.
/// There is no enforced schema; two tuples in the same table may carry
/// different attribute sets.
pub type Tuple = IndexMap<String, Value>;

/// An ordered sequence of tuples. Order matters for the set operators.
pub type Table = Vec<Tuple>;

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Canonical, order-independent tuple comparison: two tuples are equal when
/// they describe the same attribute-to-value mapping, regardless of the
/// order the attributes were inserted in.
pub fn tuples_equal(a: &Tuple, b: &Tuple) -> bool {
    a.len() == b.len() && a.iter().all(|(key, value)| b.get(key) == Some(value))
}

/// Table names accepted by the store: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
