//! Untyped value kernel: the dynamic value type, loose numeric coercion,
//! loose equality, and the leaf comparison operators shared by the flat
//! interpreter/compiler and the RETE network.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// An untyped dynamic value addressable by a fact's dotted-path tree.
///
/// `Map` uses a `BTreeMap` rather than a `HashMap` so that re-serializing a
/// value for alpha-node canonicalization (`field|operator|value`) is
/// deterministic across process runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    pub fn map() -> Self {
        Value::Map(BTreeMap::new())
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Normalize any numeric variant (signed, unsigned, or float) to `f64`.
    /// Non-numeric variants return `None`.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::UInt(u) => Some(*u as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Coerce to a non-negative integral `u64`, for `bitmask_all`. Negative
    /// integers and non-integral floats fail.
    pub fn to_bitmask(&self) -> Option<u64> {
        match self {
            Value::Int(i) => u64::try_from(*i).ok(),
            Value::UInt(u) => Some(*u),
            Value::Float(f) => {
                if *f >= 0.0 && f.fract() == 0.0 {
                    Some(*f as u64)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::UInt(_) | Value::Float(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::UInt(u) => write!(f, "{u}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s}"),
            Value::List(_) | Value::Map(_) => {
                write!(f, "{}", serde_json::to_string(self).unwrap_or_default())
            }
        }
    }
}

/// Loose equality: numerics on both sides normalize to `f64` before
/// comparison; mappings and sequences compare element-wise.
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    if left.is_numeric() && right.is_numeric() {
        return left.to_f64() == right.to_f64();
    }
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| loose_eq(x, y))
        }
        (Value::Map(a), Value::Map(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|bv| loose_eq(v, bv)))
        }
        _ => false,
    }
}

/// Error kinds produced by the value kernel's operators. These are the
/// `TypeMismatch` family of spec error kinds; callers upgrade them into the
/// crate-wide error type at the condition-evaluation boundary.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    #[error("left is not number")]
    LeftNotNumber,
    #[error("right is not number")]
    RightNotNumber,
    #[error("right is not a sequence for `in`")]
    RightNotSequence,
    #[error("right is not a string for `contains`")]
    ContainsRightNotString,
    #[error("left is not a sequence for `contains`")]
    ContainsLeftNotSequence,
    #[error("left is not a non-negative integer for `bitmask_all`")]
    BitmaskLeftInvalid,
    #[error("right is not a non-negative integer for `bitmask_all`")]
    BitmaskRightInvalid,
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),
}

/// Leaf comparison operators, compared case-insensitively per spec.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Contains,
    BitmaskAll,
}

impl Operator {
    pub fn parse(tag: &str) -> Result<Self, ValueError> {
        match tag.to_ascii_lowercase().as_str() {
            "eq" => Ok(Operator::Eq),
            "ne" => Ok(Operator::Ne),
            "gt" => Ok(Operator::Gt),
            "gte" => Ok(Operator::Gte),
            "lt" => Ok(Operator::Lt),
            "lte" => Ok(Operator::Lte),
            "in" => Ok(Operator::In),
            "contains" => Ok(Operator::Contains),
            "bitmask_all" => Ok(Operator::BitmaskAll),
            other => Err(ValueError::UnsupportedOperator(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::In => "in",
            Operator::Contains => "contains",
            Operator::BitmaskAll => "bitmask_all",
        }
    }
}

/// Apply a leaf operator to a resolved `(left, right)` pair.
pub fn apply(op: Operator, left: &Value, right: &Value) -> Result<bool, ValueError> {
    match op {
        Operator::Eq => Ok(loose_eq(left, right)),
        Operator::Ne => Ok(!loose_eq(left, right)),
        Operator::Gt => compare(left, right, |a, b| a > b),
        Operator::Gte => compare(left, right, |a, b| a >= b),
        Operator::Lt => compare(left, right, |a, b| a < b),
        Operator::Lte => compare(left, right, |a, b| a <= b),
        Operator::In => is_in(left, right),
        Operator::Contains => contains(left, right),
        Operator::BitmaskAll => bitmask_all(left, right),
    }
}

fn compare(left: &Value, right: &Value, cmp: impl Fn(f64, f64) -> bool) -> Result<bool, ValueError> {
    let lf = left.to_f64().ok_or(ValueError::LeftNotNumber)?;
    let rf = right.to_f64().ok_or(ValueError::RightNotNumber)?;
    Ok(cmp(lf, rf))
}

fn is_in(left: &Value, right: &Value) -> Result<bool, ValueError> {
    let items = right.as_list().ok_or(ValueError::RightNotSequence)?;
    Ok(items.iter().any(|item| loose_eq(left, item)))
}

fn contains(left: &Value, right: &Value) -> Result<bool, ValueError> {
    match left {
        Value::String(l) => {
            let r = right.as_str().ok_or(ValueError::ContainsRightNotString)?;
            Ok(l.contains(r))
        }
        _ => {
            let items = left.as_list().ok_or(ValueError::ContainsLeftNotSequence)?;
            Ok(items.iter().any(|item| loose_eq(item, right)))
        }
    }
}

fn bitmask_all(left: &Value, right: &Value) -> Result<bool, ValueError> {
    let lv = left.to_bitmask().ok_or(ValueError::BitmaskLeftInvalid)?;
    let rv = right.to_bitmask().ok_or(ValueError::BitmaskRightInvalid)?;
    Ok((lv & rv) == rv)
}
