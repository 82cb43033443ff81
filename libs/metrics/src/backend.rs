//! Metric Export Backends
//!
//! A backend receives every value a metric handle decides to report. The
//! `console` backend logs it, `prometheus` keeps it in a registry that can
//! be rendered in the text exposition format, and `ray` keeps it locally
//! for a cluster exporter to pick up.

use crate::metric::{MetricDesc, MetricType};
use crate::{MetricsError, Result};
use parking_lot::Mutex;
use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Recognised backend identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Console,
    Prometheus,
    Ray,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Console => "console",
            Self::Prometheus => "prometheus",
            Self::Ray => "ray",
        })
    }
}

impl FromStr for BackendKind {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "console" => Ok(Self::Console),
            "prometheus" => Ok(Self::Prometheus),
            "ray" => Ok(Self::Ray),
            other => Err(MetricsError::not_supported(other)),
        }
    }
}

/// Backend selection plus backend-specific settings
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    pub backend: String,
    pub config: Map<String, Value>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self::new(BackendKind::Console.to_string())
    }
}

impl MetricsConfig {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            config: Map::new(),
        }
    }

    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.config = config;
        self
    }

    /// `port` setting of the prometheus backend
    pub fn port(&self) -> Result<Option<u16>> {
        match self.config.get("port") {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_u64()
                .and_then(|p| u16::try_from(p).ok())
                .map(Some)
                .ok_or_else(|| MetricsError::InvalidConfig(format!("invalid port {value}"))),
        }
    }
}

/// Active export backend
#[derive(Debug)]
pub enum Backend {
    Console,
    Prometheus(PrometheusBackend),
    Ray(RayBackend),
}

impl Backend {
    pub fn from_config(config: &MetricsConfig) -> Result<Self> {
        match config.backend.parse::<BackendKind>()? {
            BackendKind::Console => Ok(Self::Console),
            BackendKind::Prometheus => Ok(Self::Prometheus(PrometheusBackend::new(config.port()?))),
            BackendKind::Ray => Ok(Self::Ray(RayBackend::default())),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Console => BackendKind::Console,
            Self::Prometheus(_) => BackendKind::Prometheus,
            Self::Ray(_) => BackendKind::Ray,
        }
    }

    /// Export `value` for `metric`; counters report increments, other
    /// metric types their current value
    pub(crate) fn report(&self, metric: &MetricDesc, value: f64, tags: &[(&str, &str)]) -> Result<()> {
        match self {
            Self::Console => {
                debug!(
                    metric = %metric.name,
                    metric_type = %metric.metric_type,
                    value,
                    tags = ?tags,
                    "Metric reported"
                );
                Ok(())
            }
            Self::Prometheus(backend) => backend.report(metric, value, tags),
            Self::Ray(backend) => {
                backend.report(metric, value, tags);
                Ok(())
            }
        }
    }
}

enum PrometheusMetric {
    Counter(CounterVec),
    Gauge(GaugeVec),
}

/// Prometheus registry holding one vector per metric name
pub struct PrometheusBackend {
    registry: Registry,
    port: Option<u16>,
    metrics: Mutex<HashMap<String, PrometheusMetric>>,
}

impl fmt::Debug for PrometheusBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrometheusBackend")
            .field("port", &self.port)
            .field("metrics", &self.metrics.lock().len())
            .finish()
    }
}

impl PrometheusBackend {
    pub fn new(port: Option<u16>) -> Self {
        info!(port = ?port, "Prometheus metric backend created");
        Self {
            registry: Registry::new(),
            port,
            metrics: Mutex::new(HashMap::new()),
        }
    }

    /// Port the external exporter should listen on
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render every registered metric in the text exposition format
    pub fn gather(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Backend(e.to_string()))
    }

    fn report(&self, metric: &MetricDesc, value: f64, tags: &[(&str, &str)]) -> Result<()> {
        let mut metrics = self.metrics.lock();
        if !metrics.contains_key(&metric.name) {
            let registered = self.register(metric)?;
            metrics.insert(metric.name.clone(), registered);
        }

        let label_values: Vec<&str> = metric
            .tag_keys
            .iter()
            .map(|key| {
                tags.iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| *v)
                    .unwrap_or("")
            })
            .collect();

        match metrics.get(&metric.name) {
            Some(PrometheusMetric::Counter(counter)) => {
                if value < 0.0 {
                    return Err(MetricsError::Backend(format!(
                        "counter {} cannot decrease by {}",
                        metric.name, value
                    )));
                }
                counter.get_metric_with_label_values(&label_values)?.inc_by(value);
            }
            Some(PrometheusMetric::Gauge(gauge)) => {
                gauge.get_metric_with_label_values(&label_values)?.set(value);
            }
            None => {}
        }
        Ok(())
    }

    fn register(&self, metric: &MetricDesc) -> Result<PrometheusMetric> {
        let help = if metric.description.is_empty() {
            metric.name.as_str()
        } else {
            metric.description.as_str()
        };
        let opts = Opts::new(metric.name.as_str(), help);
        let labels: Vec<&str> = metric.tag_keys.iter().map(String::as_str).collect();

        let registered = match metric.metric_type {
            MetricType::Counter => {
                let counter = CounterVec::new(opts, &labels)?;
                self.registry.register(Box::new(counter.clone()))?;
                PrometheusMetric::Counter(counter)
            }
            MetricType::Gauge | MetricType::Meter | MetricType::Histogram => {
                let gauge = GaugeVec::new(opts, &labels)?;
                self.registry.register(Box::new(gauge.clone()))?;
                PrometheusMetric::Gauge(gauge)
            }
        };
        debug!(metric = %metric.name, "Registered prometheus metric");
        Ok(registered)
    }
}

/// Locally buffered values for a cluster-side exporter
#[derive(Debug, Default)]
pub struct RayBackend {
    values: Mutex<HashMap<String, f64>>,
}

impl RayBackend {
    /// Last exported value of `name`, counters accumulate
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.lock().get(name).copied()
    }

    fn report(&self, metric: &MetricDesc, value: f64, _tags: &[(&str, &str)]) {
        let mut values = self.values.lock();
        let entry = values.entry(metric.name.clone()).or_insert(0.0);
        match metric.metric_type {
            MetricType::Counter => *entry += value,
            _ => *entry = value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn desc(name: &str, metric_type: MetricType, tag_keys: &[&str]) -> MetricDesc {
        MetricDesc {
            name: name.to_string(),
            description: String::new(),
            tag_keys: tag_keys.iter().map(|k| k.to_string()).collect(),
            metric_type,
        }
    }

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("console".parse::<BackendKind>(), Ok(BackendKind::Console));
        assert_eq!("ray".parse::<BackendKind>(), Ok(BackendKind::Ray));
        assert_eq!(
            "not_exist".parse::<BackendKind>(),
            Err(MetricsError::not_supported("not_exist"))
        );
    }

    #[test]
    fn test_prometheus_port() {
        let mut config = Map::new();
        config.insert("port".to_string(), json!(0));
        let backend = Backend::from_config(&MetricsConfig::new("prometheus").with_config(config))
            .unwrap();
        match backend {
            Backend::Prometheus(p) => assert_eq!(p.port(), Some(0)),
            other => panic!("unexpected backend {other:?}"),
        }

        let mut bad = Map::new();
        bad.insert("port".to_string(), json!("http"));
        assert!(matches!(
            MetricsConfig::new("prometheus").with_config(bad).port(),
            Err(MetricsError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_prometheus_gather() {
        let backend = PrometheusBackend::new(None);
        let requests = desc("xoscar_requests", MetricType::Counter, &["service"]);
        backend.report(&requests, 2.0, &[("service", "pool")]).unwrap();
        backend.report(&requests, 3.0, &[("service", "pool")]).unwrap();
        backend
            .report(&desc("xoscar_load", MetricType::Gauge, &[]), 0.5, &[])
            .unwrap();

        let text = backend.gather().unwrap();
        assert!(text.contains(r#"xoscar_requests{service="pool"} 5"#), "{text}");
        assert!(text.contains("xoscar_load 0.5"), "{text}");
    }

    #[test]
    fn test_prometheus_counter_rejects_decrease() {
        let backend = PrometheusBackend::new(None);
        let counter = desc("xoscar_counter", MetricType::Counter, &[]);
        assert!(backend.report(&counter, -1.0, &[]).is_err());
    }

    #[test]
    fn test_ray_keeps_values() {
        let backend = RayBackend::default();
        backend.report(&desc("c", MetricType::Counter, &[]), 1.0, &[]);
        backend.report(&desc("c", MetricType::Counter, &[]), 2.0, &[]);
        backend.report(&desc("g", MetricType::Gauge, &[]), 4.0, &[]);
        backend.report(&desc("g", MetricType::Gauge, &[]), 1.0, &[]);

        assert_eq!(backend.value("c"), Some(3.0));
        assert_eq!(backend.value("g"), Some(1.0));
        assert_eq!(backend.value("missing"), None);
    }
}
