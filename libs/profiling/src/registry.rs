//! Profiling Registry
//!
//! Keyed store of per-task profiling trees and call statistics. A task's
//! entries are created by [`ProfilingData::init`], written through
//! [`ProfilingData::get`] views while the task runs, and removed by
//! [`ProfilingData::pop`], which returns the tree merged with the final call
//! statistics.
//!
//! The registry is a cheap-to-clone handle around mutex-guarded state. A
//! process-wide instance is available through [`ProfilingData::global`];
//! tests and embedders can construct isolated instances instead.
//!
//! One owner per task id: concurrent `init`/`pop` on the same id is not
//! supported.

use crate::call_stats::CallStats;
use crate::config::{EnvSettings, ProfilingOptions};
use crate::operator::{ProfilingOperator, TreeOperator};
use crate::Result;
use anyhow::Context;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use protocol::Message;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Top-level sections of every task tree
pub const TREE_SECTIONS: [&str; 6] = [
    "general",
    "serialization",
    "most_calls",
    "slow_calls",
    "band_subtasks",
    "slow_subtasks",
];

static GLOBAL: Lazy<ProfilingData> = Lazy::new(ProfilingData::new);

pub(crate) type SharedState = Arc<Mutex<RegistryState>>;

#[derive(Default)]
pub(crate) struct RegistryState {
    pub(crate) data: HashMap<String, Map<String, Value>>,
    call_stats: HashMap<String, CallStats>,
    debug_tasks: HashMap<String, JoinHandle<()>>,
}

impl RegistryState {
    /// Tree merged with the current call statistics
    fn snapshot(&self, task_id: &str) -> Option<Map<String, Value>> {
        let mut tree = self.data.get(task_id)?.clone();
        if let Some(stats) = self.call_stats.get(task_id) {
            tree.extend(stats.snapshot().to_map());
        }
        Some(tree)
    }
}

/// Per-task profiling registry
#[derive(Clone)]
pub struct ProfilingData {
    state: SharedState,
    env: Arc<EnvSettings>,
}

impl Default for ProfilingData {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProfilingData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfilingData")
            .field("tasks", &self.task_ids())
            .finish()
    }
}

impl ProfilingData {
    /// Registry resolving options against the process environment
    pub fn new() -> Self {
        Self::with_env(EnvSettings::global().clone())
    }

    /// Registry resolving options against explicit environment settings
    pub fn with_env(env: EnvSettings) -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState::default())),
            env: Arc::new(env),
        }
    }

    /// Process-wide registry
    pub fn global() -> &'static ProfilingData {
        &GLOBAL
    }

    /// Whether profiling was enabled through the environment
    pub fn is_enabled(&self) -> bool {
        self.env.profiling_enabled()
    }

    /// Register `task_id`
    ///
    /// `options` is null, a boolean, or a map of option names to values.
    /// With a debug interval configured and a tokio runtime available, a
    /// background task periodically logs the task's snapshot.
    pub fn init(&self, task_id: &str, options: &Value) -> Result<()> {
        let options = ProfilingOptions::resolve(options, &self.env)?;
        info!(
            task_id,
            debug_interval_seconds = ?options.debug_interval_seconds,
            "Init profiling data"
        );

        let tree: Map<String, Value> = TREE_SECTIONS
            .iter()
            .map(|section| (section.to_string(), Value::Object(Map::new())))
            .collect();

        let mut state = self.state.lock();
        state.data.insert(task_id.to_string(), tree);
        state
            .call_stats
            .insert(task_id.to_string(), CallStats::new(&options));

        if let Some(interval) = options.debug_interval() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let task = handle.spawn(debug_dump_loop(
                        Arc::downgrade(&self.state),
                        task_id.to_string(),
                        interval,
                    ));
                    if let Some(previous) = state.debug_tasks.insert(task_id.to_string(), task) {
                        previous.abort();
                    }
                }
                Err(_) => {
                    warn!(task_id, "No async runtime available, profiling debug log disabled");
                }
            }
        }
        Ok(())
    }

    /// Remove `task_id`, returning its tree merged with the final call stats
    ///
    /// Returns `None` for unknown task ids.
    pub fn pop(&self, task_id: &str) -> Option<Map<String, Value>> {
        info!(task_id, "Pop profiling data");
        let mut state = self.state.lock();
        if let Some(task) = state.debug_tasks.remove(task_id) {
            task.abort();
        }
        let mut tree = state.data.remove(task_id)?;
        if let Some(stats) = state.call_stats.remove(task_id) {
            tree.extend(stats.snapshot().to_map());
        }
        Some(tree)
    }

    /// Current tree of `task_id` merged with its call stats
    pub fn snapshot(&self, task_id: &str) -> Option<Map<String, Value>> {
        self.state.lock().snapshot(task_id)
    }

    /// Feed a Send/Tell call into every registered task's call stats
    ///
    /// A raw message cannot be attributed to one task, so concurrently
    /// profiled tasks all observe each other's calls.
    pub fn collect_actor_call(&self, message: &Message, duration: f64) {
        if !message.is_actor_call() {
            return;
        }
        let mut state = self.state.lock();
        for stats in state.call_stats.values_mut() {
            stats.collect(message, duration);
        }
    }

    /// View into `task_id`'s tree at `keys`; a no-op view if the path is missing
    pub fn get(&self, task_id: &str, keys: &[&str]) -> ProfilingOperator {
        let state = self.state.lock();
        let Some(mut target) = state.data.get(task_id) else {
            return ProfilingOperator::Noop;
        };
        for key in keys {
            match target.get(*key).and_then(Value::as_object) {
                Some(nested) => target = nested,
                None => return ProfilingOperator::Noop,
            }
        }
        drop(state);

        ProfilingOperator::Tree(TreeOperator::new(
            Arc::clone(&self.state),
            task_id,
            keys.iter().map(|k| k.to_string()).collect(),
        ))
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.state.lock().data.contains_key(task_id)
    }

    pub fn task_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.lock().data.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn has_debug_task(&self, task_id: &str) -> bool {
        self.state
            .lock()
            .debug_tasks
            .get(task_id)
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }
}

/// Periodically log a task's snapshot until its entry is gone
async fn debug_dump_loop(state: Weak<Mutex<RegistryState>>, task_id: String, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;

        let Some(state) = state.upgrade() else {
            break;
        };
        let snapshot = state.lock().snapshot(&task_id);
        let Some(snapshot) = snapshot else {
            info!(task_id = %task_id, "Profiling debug log break");
            break;
        };

        match serde_json::to_string_pretty(&snapshot).context("Failed to render profiling snapshot") {
            Ok(rendered) => warn!(task_id = %task_id, "Profiling debug:\n{}", rendered),
            Err(e) => error!(task_id = %task_id, error = ?e, "Profiling debug log failed"),
        }
    }
}
