//! Metrics Context
//!
//! Owns the active export backend and creates metric handles bound to it.
//! A process-wide context backs [`init_metrics`], [`shutdown_metrics`] and
//! the [`Metrics`] constructors.

use crate::backend::{Backend, BackendKind, MetricsConfig};
use crate::metric::{Metric, MetricType, SharedBackend};
use crate::Result;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

static GLOBAL: Lazy<MetricsContext> = Lazy::new(MetricsContext::new);

/// Backend owner and metric factory
#[derive(Debug, Clone, Default)]
pub struct MetricsContext {
    backend: SharedBackend,
}

impl MetricsContext {
    pub fn new() -> Self {
        Self {
            backend: Arc::new(RwLock::new(None)),
        }
    }

    pub fn global() -> &'static MetricsContext {
        &GLOBAL
    }

    /// Activate the configured backend, replacing any previous one
    pub fn init(&self, config: &MetricsConfig) -> Result<()> {
        let backend = Backend::from_config(config)?;
        info!(backend = %backend.kind(), "Metrics backend initialized");
        *self.backend.write() = Some(Arc::new(backend));
        Ok(())
    }

    pub fn shutdown(&self) {
        if let Some(backend) = self.backend.write().take() {
            info!(backend = %backend.kind(), "Metrics backend shut down");
        }
    }

    /// Kind of the active backend
    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.backend.read().as_ref().map(|b| b.kind())
    }

    /// Active backend, for exporters that read it directly
    pub fn backend(&self) -> Option<Arc<Backend>> {
        self.backend.read().clone()
    }

    pub fn counter(&self, name: &str, description: &str, tag_keys: &[&str]) -> Metric {
        self.metric(name, description, tag_keys, MetricType::Counter)
    }

    pub fn gauge(&self, name: &str, description: &str, tag_keys: &[&str]) -> Metric {
        self.metric(name, description, tag_keys, MetricType::Gauge)
    }

    pub fn meter(&self, name: &str, description: &str, tag_keys: &[&str]) -> Metric {
        self.metric(name, description, tag_keys, MetricType::Meter)
    }

    pub fn histogram(&self, name: &str, description: &str, tag_keys: &[&str]) -> Metric {
        self.metric(name, description, tag_keys, MetricType::Histogram)
    }

    fn metric(&self, name: &str, description: &str, tag_keys: &[&str], metric_type: MetricType) -> Metric {
        Metric::new(name, description, tag_keys, metric_type, Arc::clone(&self.backend))
    }
}

/// Initialise the process-wide metrics backend
pub fn init_metrics(config: &MetricsConfig) -> Result<()> {
    MetricsContext::global().init(config)
}

/// Drop the process-wide metrics backend
pub fn shutdown_metrics() {
    MetricsContext::global().shutdown()
}

/// Constructors for handles bound to the process-wide context
pub struct Metrics;

impl Metrics {
    pub fn counter(name: &str, description: &str, tag_keys: &[&str]) -> Metric {
        MetricsContext::global().counter(name, description, tag_keys)
    }

    pub fn gauge(name: &str, description: &str, tag_keys: &[&str]) -> Metric {
        MetricsContext::global().gauge(name, description, tag_keys)
    }

    pub fn meter(name: &str, description: &str, tag_keys: &[&str]) -> Metric {
        MetricsContext::global().meter(name, description, tag_keys)
    }

    pub fn histogram(name: &str, description: &str, tag_keys: &[&str]) -> Metric {
        MetricsContext::global().histogram(name, description, tag_keys)
    }
}
