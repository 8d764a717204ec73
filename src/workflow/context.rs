//! Persisted workflow position
//!
//! The context is stored as one storage key per field so that a page can
//! update `current` without rewriting the whole workflow.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const WORKFLOW_KEY: &str = "workflow";
pub const CURRENT_KEY: &str = "current";
pub const START_KEY: &str = "start";
pub const COMPLETED_KEY: &str = "completed";
pub const STORE_URL_KEY: &str = "store-url";

/// Every key the context occupies in storage
pub const CONTEXT_KEYS: [&str; 5] = [WORKFLOW_KEY, CURRENT_KEY, START_KEY, COMPLETED_KEY, STORE_URL_KEY];

/// Where the respondent is in a multi-page survey
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowContext {
    /// Page URLs in the order they are taken
    pub workflow: Vec<String>,

    /// Index of the current page
    pub current: usize,

    /// Start time, epoch milliseconds
    pub start: i64,

    pub completed: bool,

    /// Endpoint responses are sent to
    #[serde(rename = "store-url")]
    pub store_url: Option<String>,
}

impl WorkflowContext {
    /// A fresh context starting now
    pub fn new(workflow: Vec<String>, store_url: Option<String>) -> Self {
        Self {
            workflow,
            current: 0,
            start: Utc::now().timestamp_millis(),
            completed: false,
            store_url,
        }
    }

    /// Rebuild a context from its stored fields, defaulting whatever is missing
    pub fn from_stored<'a, F>(mut lookup: F) -> Self
    where
        F: FnMut(&str) -> Option<&'a Value>,
    {
        let workflow = match lookup(WORKFLOW_KEY) {
            Some(Value::Array(pages)) => pages
                .iter()
                .filter_map(|page| page.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };

        Self {
            workflow,
            current: lookup(CURRENT_KEY).map(coerce_index).unwrap_or(0),
            start: lookup(START_KEY).and_then(coerce_millis).unwrap_or(0),
            completed: matches!(lookup(COMPLETED_KEY), Some(Value::Bool(true))),
            store_url: lookup(STORE_URL_KEY)
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }

    /// The stored form of every field
    pub fn to_stored(&self) -> Vec<(&'static str, Value)> {
        vec![
            (WORKFLOW_KEY, Value::from(self.workflow.clone())),
            (CURRENT_KEY, Value::from(self.current)),
            (START_KEY, Value::from(self.start)),
            (COMPLETED_KEY, Value::Bool(self.completed)),
            (
                STORE_URL_KEY,
                self.store_url.clone().map(Value::String).unwrap_or(Value::Null),
            ),
        ]
    }

    pub fn current_page(&self) -> Option<&str> {
        self.workflow.get(self.current).map(String::as_str)
    }

    pub fn is_last_page(&self) -> bool {
        self.current + 1 >= self.workflow.len()
    }
}

/// Coerce a stored page index to an integer.
///
/// Numbers are truncated, numeric strings are parsed, and anything else
/// (including negative values) becomes 0.
pub fn coerce_index(value: &Value) -> usize {
    let index = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
        }
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    };

    index.and_then(|i| usize::try_from(i).ok()).unwrap_or(0)
}

fn coerce_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_coerce_index() {
        assert_eq!(coerce_index(&json!(2)), 2);
        assert_eq!(coerce_index(&json!(2.9)), 2);
        assert_eq!(coerce_index(&json!("3")), 3);
        assert_eq!(coerce_index(&json!("1.5")), 1);
        assert_eq!(coerce_index(&json!(-4)), 0);
        assert_eq!(coerce_index(&json!("page two")), 0);
        assert_eq!(coerce_index(&json!(null)), 0);
        assert_eq!(coerce_index(&json!(true)), 1);
    }

    #[test]
    fn test_from_stored_defaults() {
        let context = WorkflowContext::from_stored(|_| None);
        assert_eq!(context, WorkflowContext::default());
    }

    #[test]
    fn test_stored_round_trip() {
        let context = WorkflowContext {
            workflow: vec!["/p1".into(), "/p2".into()],
            current: 1,
            start: 1_700_000_000_000,
            completed: false,
            store_url: Some("https://example.org/store".into()),
        };

        let stored: HashMap<&str, Value> = context.to_stored().into_iter().collect();
        let loaded = WorkflowContext::from_stored(|key| stored.get(key));
        assert_eq!(loaded, context);
        assert!(loaded.is_last_page());
        assert_eq!(loaded.current_page(), Some("/p2"));
    }

    #[test]
    fn test_from_stored_coerces_current() {
        let stored: HashMap<&str, Value> = [
            (WORKFLOW_KEY, json!(["/a", "/b", "/c"])),
            (CURRENT_KEY, json!("1")),
        ]
        .into_iter()
        .collect();

        let context = WorkflowContext::from_stored(|key| stored.get(key));
        assert_eq!(context.current, 1);
        assert_eq!(context.current_page(), Some("/b"));
    }
}
