//! Event-bus patterns and local evaluation.
//!
//! A pattern is a JSON object. Leaves are arrays of allowed values; nested
//! objects recurse into the event. A leaf matches when the event value, or
//! any element of it when it is an array, equals one allowed value. Allowed
//! values may also be filters: `{"prefix": "..."}`, `{"anything-but": [...]}`
//! and `{"exists": bool}`.

use crate::error::{Result, TaskchainError};
use crate::topology::EventPredicate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct EventPattern(Map<String, Value>);

impl EventPattern {
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => {
                check_object(&map, "")?;
                Ok(Self(map))
            }
            _ => Err(TaskchainError::InvalidPattern(
                "pattern must be a JSON object".to_string(),
            )),
        }
    }

    /// Render `predicate`, with `cluster_ref` standing in for the cluster:
    /// a concrete ARN when evaluating locally, an intrinsic in a template.
    pub fn for_predicate(predicate: &EventPredicate, cluster_ref: Value) -> Self {
        let mut detail = Map::new();
        detail.insert("lastStatus".into(), json!([predicate.last_status]));
        detail.insert("clusterArn".into(), json!([cluster_ref]));
        detail.insert("stoppedReason".into(), json!([predicate.stopped_reason]));

        let mut pattern = Map::new();
        pattern.insert("source".into(), json!([predicate.source]));
        pattern.insert("detail-type".into(), json!([predicate.detail_type]));
        pattern.insert("detail".into(), Value::Object(detail));
        Self(pattern)
    }

    pub fn matches(&self, event: &Value) -> bool {
        matches_object(&self.0, event)
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl TryFrom<Value> for EventPattern {
    type Error = TaskchainError;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

impl From<EventPattern> for Value {
    fn from(p: EventPattern) -> Self {
        Value::Object(p.0)
    }
}

fn check_object(map: &Map<String, Value>, path: &str) -> Result<()> {
    if map.is_empty() {
        return Err(TaskchainError::InvalidPattern(format!(
            "empty object at '{path}'"
        )));
    }
    for (key, value) in map {
        let here = if path.is_empty() {
            key.clone()
        } else {
            format!("{path}.{key}")
        };
        match value {
            Value::Object(nested) => check_object(nested, &here)?,
            Value::Array(allowed) if !allowed.is_empty() => {}
            _ => {
                return Err(TaskchainError::InvalidPattern(format!(
                    "'{here}' must be a non-empty array or an object"
                )))
            }
        }
    }
    Ok(())
}

fn matches_object(pattern: &Map<String, Value>, event: &Value) -> bool {
    let Some(fields) = event.as_object() else {
        return false;
    };
    pattern.iter().all(|(key, expected)| match expected {
        Value::Object(nested) => fields
            .get(key)
            .is_some_and(|value| matches_object(nested, value)),
        Value::Array(allowed) => allowed
            .iter()
            .any(|filter| matches_filter(filter, fields.get(key))),
        _ => false,
    })
}

fn matches_filter(filter: &Value, value: Option<&Value>) -> bool {
    if let Some(exists) = filter.get("exists").and_then(Value::as_bool) {
        return value.is_some() == exists;
    }
    match value {
        None => false,
        Some(Value::Array(items)) => items.iter().any(|item| matches_scalar(filter, item)),
        Some(v) => matches_scalar(filter, v),
    }
}

fn matches_scalar(filter: &Value, value: &Value) -> bool {
    if let Some(prefix) = filter.get("prefix").and_then(Value::as_str) {
        return value.as_str().is_some_and(|s| s.starts_with(prefix));
    }
    if let Some(excluded) = filter.get("anything-but") {
        return match excluded {
            Value::Array(list) => !list.contains(value),
            single => single != value,
        };
    }
    filter == value
}
