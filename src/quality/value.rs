// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! Propagated task values
//!
//! A task may hand a small value to its downstream tasks: a row count, the
//! rows of a check query, a status string. The shape is closed: a scalar or a
//! list of values, with anything else carried along as opaque JSON.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value propagated from one task to its dependents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskValue {
    /// Integral number
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Text, possibly holding a number
    Text(String),
    /// Nested sequence of values
    List(Vec<TaskValue>),
    /// Booleans, nulls and objects
    Other(serde_json::Value),
}

impl TaskValue {
    /// Parse a JSON document into a value
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl From<i64> for TaskValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for TaskValue {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<&str> for TaskValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for TaskValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl<T: Into<TaskValue>> From<Vec<T>> for TaskValue {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for TaskValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{}", n),
            Self::Float(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Self::Other(v) => write!(f, "{}", v),
        }
    }
}

/// Scalar count extracted from a check result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Count {
    Int(i64),
    Float(f64),
}

impl Count {
    /// A positive count means violations were found
    pub fn is_positive(&self) -> bool {
        match self {
            Self::Int(n) => *n > 0,
            Self::Float(n) => *n > 0.0,
        }
    }
}

impl fmt::Display for Count {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{}", n),
            Self::Float(n) => write!(f, "{}", n),
        }
    }
}

impl From<Count> for TaskValue {
    fn from(count: Count) -> Self {
        match count {
            Count::Int(n) => Self::Int(n),
            Count::Float(n) => Self::Float(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_json() {
        let value = TaskValue::from_json_str(r#"[["3"], "abc", 0, null, true]"#).unwrap();
        assert_eq!(
            value,
            TaskValue::List(vec![
                TaskValue::List(vec![TaskValue::Text("3".into())]),
                TaskValue::Text("abc".into()),
                TaskValue::Int(0),
                TaskValue::Other(serde_json::Value::Null),
                TaskValue::Other(serde_json::Value::Bool(true)),
            ])
        );
    }

    #[test]
    fn test_float_json_stays_float() {
        assert_eq!(TaskValue::from_json_str("2.5").unwrap(), TaskValue::Float(2.5));
    }

    #[test]
    fn test_display_nested() {
        let value = TaskValue::from(vec![TaskValue::Int(1), TaskValue::from("x")]);
        assert_eq!(value.to_string(), "[1, x]");
    }

    #[test]
    fn test_count_sign() {
        assert!(Count::Int(1).is_positive());
        assert!(!Count::Int(0).is_positive());
        assert!(!Count::Int(-4).is_positive());
        assert!(!Count::Float(0.0).is_positive());
        assert!(Count::Float(0.5).is_positive());
    }
}
