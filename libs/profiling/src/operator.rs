//! Nested Counter View
//!
//! Instrumentation call sites write into a task's profiling tree through a
//! [`ProfilingOperator`]. The variant is fixed when the view is looked up:
//! `Tree` for a path that exists, `Noop` otherwise, so callers never branch
//! on whether profiling is enabled.

use crate::registry::SharedState;
use crate::{ProfilingError, Result};
use serde_json::{Map, Number, Value};
use std::sync::Arc;
use tracing::debug;

/// Mutable view into a profiling tree, or a no-op stand-in
#[derive(Clone)]
pub enum ProfilingOperator {
    Tree(TreeOperator),
    Noop,
}

impl std::fmt::Debug for ProfilingOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tree(op) => f
                .debug_struct("Tree")
                .field("task_id", &op.task_id)
                .field("path", &op.path)
                .finish(),
            Self::Noop => f.write_str("Noop"),
        }
    }
}

impl ProfilingOperator {
    /// Store `value` under `key`
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        if let Self::Tree(op) = self {
            op.set(key, value.into());
        }
    }

    /// Add `value` to the number under `key` (absent counts as 0)
    ///
    /// The sum stays an integer while both operands are integers.
    pub fn inc(&self, key: &str, value: impl Into<Value>) {
        if let Self::Tree(op) = self {
            op.inc(key, value.into());
        }
    }

    /// View into the sub-tree under `key`, created if absent
    pub fn nest(&self, key: &str) -> Result<ProfilingOperator> {
        match self {
            Self::Tree(op) => op.nest(key),
            Self::Noop => Ok(Self::Noop),
        }
    }

    /// Copy of the values stored at this level
    pub fn values(&self) -> Vec<Value> {
        match self {
            Self::Tree(op) => op.with_target(|t| t.values().cloned().collect()).unwrap_or_default(),
            Self::Noop => Vec::new(),
        }
    }

    pub fn empty(&self) -> bool {
        match self {
            Self::Tree(op) => op.with_target(|t| t.is_empty()).unwrap_or(true),
            Self::Noop => true,
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Self::Noop)
    }
}

/// Path into one task's tree inside the registry
#[derive(Clone)]
pub struct TreeOperator {
    state: SharedState,
    task_id: Arc<str>,
    path: Vec<String>,
}

impl TreeOperator {
    pub(crate) fn new(state: SharedState, task_id: &str, path: Vec<String>) -> Self {
        Self {
            state,
            task_id: Arc::from(task_id),
            path,
        }
    }

    /// Run `f` on the target map; `None` once the task has been popped
    fn with_target<R>(&self, f: impl FnOnce(&mut Map<String, Value>) -> R) -> Option<R> {
        let mut state = self.state.lock();
        let mut target = state.data.get_mut(&*self.task_id)?;
        for key in &self.path {
            target = target.get_mut(key)?.as_object_mut()?;
        }
        Some(f(target))
    }

    fn set(&self, key: &str, value: Value) {
        self.with_target(|t| {
            t.insert(key.to_string(), value);
        });
    }

    fn inc(&self, key: &str, value: Value) {
        let Value::Number(value) = value else {
            debug!(key, value = %value, "Ignoring non-numeric profiling increment");
            return;
        };
        self.with_target(|t| {
            let old = match t.get(key) {
                None => Number::from(0),
                Some(Value::Number(n)) => n.clone(),
                Some(other) => {
                    debug!(key, found = %other, "Replacing non-numeric profiling value on inc");
                    Number::from(0)
                }
            };
            t.insert(key.to_string(), add_numbers(&old, &value));
        });
    }

    fn nest(&self, key: &str) -> Result<ProfilingOperator> {
        let nested = self.with_target(|t| {
            let entry = t
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if entry.is_object() {
                Ok(())
            } else {
                Err(ProfilingError::not_a_tree(key, value_kind(entry)))
            }
        });

        match nested {
            Some(Ok(())) => {
                let mut path = self.path.clone();
                path.push(key.to_string());
                Ok(ProfilingOperator::Tree(TreeOperator {
                    state: Arc::clone(&self.state),
                    task_id: Arc::clone(&self.task_id),
                    path,
                }))
            }
            Some(Err(e)) => Err(e),
            None => Ok(ProfilingOperator::Noop),
        }
    }
}

fn add_numbers(a: &Number, b: &Number) -> Value {
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        if let Some(sum) = a.checked_add(b) {
            return Value::from(sum);
        }
    }
    if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
        if let Some(sum) = a.checked_add(b) {
            return Value::from(sum);
        }
    }
    Value::from(a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0))
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a tree",
    }
}
