//! Profiling Configuration
//!
//! Options are resolved once, when a task is registered, from three layers:
//! the explicit value passed to `init`, an environment override
//! (`XOSCAR_PROFILING_<OPTION_NAME>`), and the built-in default.
//!
//! The environment is read through the `config` crate a single time per
//! process and cached; resolution functions also accept an explicit
//! [`EnvSettings`] so callers are not tied to the process environment.

use crate::{ProfilingError, Result};
use config_crate::{Config, Environment};
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// Prefix shared by every environment variable read here
pub const ENV_PREFIX: &str = "XOSCAR";

pub const DEBUG_INTERVAL_SECONDS: &str = "debug_interval_seconds";
pub const SLOW_CALLS_DURATION_THRESHOLD: &str = "slow_calls_duration_threshold";
pub const SLOW_SUBTASKS_DURATION_THRESHOLD: &str = "slow_subtasks_duration_threshold";

/// Every option key accepted by [`ProfilingOptions::resolve`]
pub const OPTION_NAMES: [&str; 3] = [
    DEBUG_INTERVAL_SECONDS,
    SLOW_CALLS_DURATION_THRESHOLD,
    SLOW_SUBTASKS_DURATION_THRESHOLD,
];

const DEFAULT_SLOW_CALLS_DURATION_THRESHOLD: f64 = 1.0;
const DEFAULT_SLOW_SUBTASKS_DURATION_THRESHOLD: f64 = 10.0;

static ENV_SETTINGS: Lazy<EnvSettings> = Lazy::new(EnvSettings::from_env);

/// Profiling-related environment variables
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EnvSettings {
    /// `XOSCAR_ENABLE_PROFILING`
    #[serde(default)]
    pub enable_profiling: Option<bool>,
    /// `XOSCAR_PROFILING_DEBUG_INTERVAL_SECONDS`
    #[serde(default)]
    pub profiling_debug_interval_seconds: Option<f64>,
    /// `XOSCAR_PROFILING_SLOW_CALLS_DURATION_THRESHOLD`
    #[serde(default)]
    pub profiling_slow_calls_duration_threshold: Option<f64>,
    /// `XOSCAR_PROFILING_SLOW_SUBTASKS_DURATION_THRESHOLD`
    #[serde(default)]
    pub profiling_slow_subtasks_duration_threshold: Option<f64>,
}

impl EnvSettings {
    /// Read the process environment
    pub fn from_env() -> Self {
        Self::load(None)
    }

    /// Read from an explicit variable map instead of the process environment
    pub fn from_vars(vars: HashMap<String, String>) -> Self {
        Self::load(Some(vars))
    }

    fn load(vars: Option<HashMap<String, String>>) -> Self {
        let settings = Config::builder()
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .try_parsing(true)
                    .source(vars.map(|v| v.into_iter().collect())),
            )
            .build()
            .and_then(|config| config.try_deserialize::<EnvSettings>());

        match settings {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed profiling environment overrides");
                Self::default()
            }
        }
    }

    /// Process-wide settings, read on first use
    pub fn global() -> &'static EnvSettings {
        &ENV_SETTINGS
    }

    pub fn profiling_enabled(&self) -> bool {
        self.enable_profiling.unwrap_or(false)
    }

    fn override_for(&self, option: &str) -> Option<f64> {
        match option {
            DEBUG_INTERVAL_SECONDS => self.profiling_debug_interval_seconds,
            SLOW_CALLS_DURATION_THRESHOLD => self.profiling_slow_calls_duration_threshold,
            SLOW_SUBTASKS_DURATION_THRESHOLD => self.profiling_slow_subtasks_duration_threshold,
            _ => None,
        }
    }
}

/// Whether profiling was switched on through `XOSCAR_ENABLE_PROFILING`
pub fn profiling_enabled() -> bool {
    EnvSettings::global().profiling_enabled()
}

/// Resolved per-task profiling options
#[derive(Debug, Clone, PartialEq)]
pub struct ProfilingOptions {
    /// Period of the background debug dump, disabled when `None`
    pub debug_interval_seconds: Option<f64>,
    /// Calls at least this long (seconds) enter the slow-call set
    pub slow_calls_duration_threshold: f64,
    /// Subtasks at least this long (seconds) count as slow
    pub slow_subtasks_duration_threshold: f64,
}

impl Default for ProfilingOptions {
    fn default() -> Self {
        Self {
            debug_interval_seconds: None,
            slow_calls_duration_threshold: DEFAULT_SLOW_CALLS_DURATION_THRESHOLD,
            slow_subtasks_duration_threshold: DEFAULT_SLOW_SUBTASKS_DURATION_THRESHOLD,
        }
    }
}

impl ProfilingOptions {
    /// Debug dump period, `None` when disabled
    pub fn debug_interval(&self) -> Option<Duration> {
        self.debug_interval_seconds
            .and_then(|interval| Duration::try_from_secs_f64(interval).ok())
    }

    /// Resolve against the process environment
    pub fn new(options: &Value) -> Result<Self> {
        Self::resolve(options, EnvSettings::global())
    }

    /// Resolve `options` (null, a boolean, or a key/value map) against `env`
    pub fn resolve(options: &Value, env: &EnvSettings) -> Result<Self> {
        let empty = Map::new();
        let explicit = match options {
            Value::Null | Value::Bool(_) => &empty,
            Value::Object(map) => {
                let mut invalid: Vec<String> = map
                    .keys()
                    .filter(|k| !OPTION_NAMES.contains(&k.as_str()))
                    .cloned()
                    .collect();
                if !invalid.is_empty() {
                    invalid.sort();
                    return Err(ProfilingError::invalid_options(format!("{:?}", invalid)));
                }
                map
            }
            other => return Err(ProfilingError::invalid_options(other.to_string())),
        };

        let debug_interval_seconds = lookup(explicit, env, DEBUG_INTERVAL_SECONDS)?;
        if let Some(interval) = debug_interval_seconds {
            if interval <= 0.0 || Duration::try_from_secs_f64(interval).is_err() {
                return Err(ProfilingError::invalid_value(DEBUG_INTERVAL_SECONDS, interval));
            }
        }

        Ok(Self {
            debug_interval_seconds,
            slow_calls_duration_threshold: lookup(explicit, env, SLOW_CALLS_DURATION_THRESHOLD)?
                .unwrap_or(DEFAULT_SLOW_CALLS_DURATION_THRESHOLD),
            slow_subtasks_duration_threshold: lookup(
                explicit,
                env,
                SLOW_SUBTASKS_DURATION_THRESHOLD,
            )?
            .unwrap_or(DEFAULT_SLOW_SUBTASKS_DURATION_THRESHOLD),
        })
    }
}

/// Explicit value first, then environment override
fn lookup(explicit: &Map<String, Value>, env: &EnvSettings, key: &str) -> Result<Option<f64>> {
    match explicit.get(key) {
        None | Some(Value::Null) => Ok(env.override_for(key)),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| ProfilingError::invalid_value(key, n)),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| ProfilingError::invalid_value(key, s)),
        Some(other) => Err(ProfilingError::invalid_value(key, other)),
    }
}
