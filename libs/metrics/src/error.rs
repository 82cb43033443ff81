//! Metrics Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricsError {
    #[error("Metric backend {backend} is not supported")]
    NotSupported { backend: String },

    #[error("Invalid percentile parameters: percentile={percentile}, window={window}")]
    InvalidPercentile { percentile: f64, window: i64 },

    #[error("Tags {found:?} of metric {metric} do not match declared keys {expected:?}")]
    InvalidTags {
        metric: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Counter {metric} cannot record {value}")]
    InvalidValue { metric: String, value: f64 },

    #[error("Invalid metrics configuration: {0}")]
    InvalidConfig(String),

    /// Failure reported by the export backend (registration, encoding)
    #[error("Metric backend error: {0}")]
    Backend(String),
}

/// Result type alias for metrics operations
pub type Result<T> = std::result::Result<T, MetricsError>;

impl MetricsError {
    pub fn not_supported(backend: impl Into<String>) -> Self {
        Self::NotSupported {
            backend: backend.into(),
        }
    }

    pub fn invalid_percentile(percentile: f64, window: i64) -> Self {
        Self::InvalidPercentile { percentile, window }
    }

    pub fn invalid_value(metric: impl Into<String>, value: f64) -> Self {
        Self::InvalidValue {
            metric: metric.into(),
            value,
        }
    }
}

impl From<prometheus::Error> for MetricsError {
    fn from(err: prometheus::Error) -> Self {
        Self::Backend(err.to_string())
    }
}
