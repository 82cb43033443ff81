//! Metrics API
//!
//! Metric handles (counter, gauge, meter, histogram) reporting through a
//! selectable backend, and the one-shot windowed [`Percentile`] collector
//! used for latency reporting.

pub mod backend;
pub mod context;
pub mod error;
pub mod metric;
pub mod percentile;

pub use backend::{Backend, BackendKind, MetricsConfig, PrometheusBackend, RayBackend};
pub use context::{init_metrics, shutdown_metrics, Metrics, MetricsContext};
pub use error::{MetricsError, Result};
pub use metric::{Metric, MetricDesc, MetricType};
pub use percentile::{
    record_time_cost_percentile, record_time_cost_percentile_async, Percentile,
    PercentileCallback, PercentileType,
};
