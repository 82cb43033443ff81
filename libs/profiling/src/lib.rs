//! Actor Call Profiling
//!
//! Live, per-task statistics used for performance profiling:
//!
//! - [`ProfilingData`]: registry of per-task profiling trees with periodic
//!   debug dumps
//! - [`CallStats`]: call frequency and bounded slowest-call tracking
//! - [`ProfilingOperator`]: nested counter view with a no-op fallback
//! - [`ProfilingOptions`]: option resolution (explicit, environment, default)

pub mod call_stats;
pub mod config;
pub mod error;
pub mod operator;
pub mod registry;

pub use call_stats::{CallStats, CallStatsSnapshot, MAX_MOST_CALLS, MAX_SLOW_CALLS};
pub use config::{profiling_enabled, EnvSettings, ProfilingOptions, OPTION_NAMES};
pub use error::{ProfilingError, Result};
pub use operator::{ProfilingOperator, TreeOperator};
pub use registry::{ProfilingData, TREE_SECTIONS};
