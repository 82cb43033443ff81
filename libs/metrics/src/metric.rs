//! Metric Handles
//!
//! Handles are cheap to clone and may be created before a backend is
//! initialised: each handle resolves the active backend of its
//! [`MetricsContext`](crate::MetricsContext) on every report.

use crate::backend::Backend;
use crate::{MetricsError, Result};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Meter reports once this many units were recorded
pub const METER_SAMPLE_UNITS: f64 = 1000.0;
/// Meter reports at least this often
pub const METER_INTERVAL: Duration = Duration::from_secs(60);
/// Histogram reports the mean of every bucket of this many samples
pub const HISTOGRAM_BUCKET_SIZE: usize = 1000;

pub(crate) type SharedBackend = Arc<RwLock<Option<Arc<Backend>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricType {
    Counter,
    Gauge,
    Meter,
    Histogram,
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Counter => "Counter",
            Self::Gauge => "Gauge",
            Self::Meter => "Meter",
            Self::Histogram => "Histogram",
        })
    }
}

/// Static description of a metric
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDesc {
    pub name: String,
    pub description: String,
    pub tag_keys: Vec<String>,
    pub metric_type: MetricType,
}

#[derive(Debug, Clone, Copy)]
enum MetricState {
    Counter { total: f64 },
    Gauge { last: f64 },
    Meter { pending: f64, since: Instant, rate: f64 },
    Histogram { sum: f64, count: usize, mean: f64 },
}

impl MetricState {
    fn new(metric_type: MetricType) -> Self {
        match metric_type {
            MetricType::Counter => Self::Counter { total: 0.0 },
            MetricType::Gauge => Self::Gauge { last: 0.0 },
            MetricType::Meter => Self::Meter {
                pending: 0.0,
                since: Instant::now(),
                rate: 0.0,
            },
            MetricType::Histogram => Self::Histogram {
                sum: 0.0,
                count: 0,
                mean: 0.0,
            },
        }
    }

    /// Apply `value`; returns what should be exported, if anything
    fn record(&mut self, value: f64) -> Option<f64> {
        match self {
            Self::Counter { total } => {
                *total += value;
                Some(value)
            }
            Self::Gauge { last } => {
                *last = value;
                Some(value)
            }
            Self::Meter {
                pending,
                since,
                rate,
            } => {
                *pending += value;
                let elapsed = since.elapsed();
                if *pending >= METER_SAMPLE_UNITS || elapsed >= METER_INTERVAL {
                    *rate = *pending / elapsed.as_secs_f64().max(f64::EPSILON);
                    *pending = 0.0;
                    *since = Instant::now();
                    Some(*rate)
                } else {
                    None
                }
            }
            Self::Histogram { sum, count, mean } => {
                *sum += value;
                *count += 1;
                if *count >= HISTOGRAM_BUCKET_SIZE {
                    *mean = *sum / *count as f64;
                    *sum = 0.0;
                    *count = 0;
                    Some(*mean)
                } else {
                    None
                }
            }
        }
    }

    fn value(&self) -> f64 {
        match self {
            Self::Counter { total } => *total,
            Self::Gauge { last } => *last,
            Self::Meter { rate, .. } => *rate,
            Self::Histogram { mean, .. } => *mean,
        }
    }
}

struct MetricInner {
    desc: MetricDesc,
    state: Mutex<MetricState>,
    backend: SharedBackend,
}

/// Handle to one named metric
#[derive(Clone)]
pub struct Metric {
    inner: Arc<MetricInner>,
}

impl fmt::Debug for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metric")
            .field("desc", &self.inner.desc)
            .field("value", &self.value())
            .finish()
    }
}

impl Metric {
    pub(crate) fn new(
        name: &str,
        description: &str,
        tag_keys: &[&str],
        metric_type: MetricType,
        backend: SharedBackend,
    ) -> Self {
        Self {
            inner: Arc::new(MetricInner {
                desc: MetricDesc {
                    name: name.to_string(),
                    description: description.to_string(),
                    tag_keys: tag_keys.iter().map(|k| k.to_string()).collect(),
                    metric_type,
                },
                state: Mutex::new(MetricState::new(metric_type)),
                backend,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.desc.name
    }

    pub fn description(&self) -> &str {
        &self.inner.desc.description
    }

    pub fn tag_keys(&self) -> &[String] {
        &self.inner.desc.tag_keys
    }

    pub fn metric_type(&self) -> MetricType {
        self.inner.desc.metric_type
    }

    pub fn desc(&self) -> &MetricDesc {
        &self.inner.desc
    }

    /// Current value: counter total, last gauge value, last meter rate or
    /// last histogram bucket mean
    pub fn value(&self) -> f64 {
        self.inner.state.lock().value()
    }

    /// Record `value` with `tags`
    ///
    /// Non-empty tags must name exactly the declared tag keys, and counters
    /// only accept non-negative increments. The local value is only updated
    /// once the backend accepted the export.
    pub fn record(&self, value: f64, tags: &[(&str, &str)]) -> Result<()> {
        self.check_tags(tags)?;
        if self.inner.desc.metric_type == MetricType::Counter && (value.is_nan() || value < 0.0) {
            return Err(MetricsError::invalid_value(&self.inner.desc.name, value));
        }

        let mut state = self.inner.state.lock();
        let mut next = *state;
        if let Some(export) = next.record(value) {
            let backend = self.inner.backend.read().clone();
            if let Some(backend) = backend {
                backend.report(&self.inner.desc, export, tags)?;
            }
        }
        *state = next;
        Ok(())
    }

    fn check_tags(&self, tags: &[(&str, &str)]) -> Result<()> {
        if tags.is_empty() {
            return Ok(());
        }
        let expected = &self.inner.desc.tag_keys;
        let matches = tags.len() == expected.len()
            && expected.iter().all(|key| tags.iter().any(|(k, _)| k == key));
        if matches {
            return Ok(());
        }

        let mut found: Vec<String> = tags.iter().map(|(k, _)| k.to_string()).collect();
        found.sort();
        Err(MetricsError::InvalidTags {
            metric: self.inner.desc.name.clone(),
            expected: expected.clone(),
            found,
        })
    }
}
