//! Windowed Percentile Collector
//!
//! Reports a single order statistic over the first `window` samples. The
//! collector keeps only the `k` smallest samples, where
//! `k = ceil(window * (100 - percentile) / 100)`, and invokes its callback
//! once with the largest of them when the window fills. A higher percentile
//! therefore reports a smaller value: with `window = 100`, P90 reports the
//! 10th smallest sample and P99 the smallest.

use crate::{MetricsError, Result};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::time::Instant;
use tracing::trace;

// heap slots reserved up front; larger windows grow on demand
const MAX_PREALLOCATED_SAMPLES: usize = 1024;

/// Callback receiving the reported percentile value
pub type PercentileCallback = Box<dyn FnMut(f64) + Send + 'static>;

/// Common percentile levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PercentileType {
    P90,
    P95,
    P99,
}

impl PercentileType {
    pub fn percentile(self) -> f64 {
        match self {
            Self::P90 => 90.0,
            Self::P95 => 95.0,
            Self::P99 => 99.0,
        }
    }

    /// Collector for this level over `window` samples
    pub fn build(self, window: usize, callback: impl FnMut(f64) + Send + 'static) -> Percentile {
        Percentile::with_capacity(self.percentile(), window, Box::new(callback))
    }
}

/// Heap entry ordered with `total_cmp`
#[derive(Debug, Clone, Copy)]
struct Sample(f64);

impl PartialEq for Sample {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Sample {}

impl PartialOrd for Sample {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Sample {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// One-shot windowed percentile
pub struct Percentile {
    percentile: f64,
    window: usize,
    capacity: usize,
    // max-heap of the `capacity` smallest samples
    smallest: BinaryHeap<Sample>,
    samples_seen: usize,
    fired: bool,
    callback: PercentileCallback,
}

impl std::fmt::Debug for Percentile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Percentile")
            .field("percentile", &self.percentile)
            .field("window", &self.window)
            .field("capacity", &self.capacity)
            .field("samples_seen", &self.samples_seen)
            .field("fired", &self.fired)
            .finish()
    }
}

impl Percentile {
    /// Validate parameters and build a collector
    ///
    /// Fails when `percentile` or `window` is negative.
    pub fn new(
        percentile: f64,
        window: i64,
        callback: impl FnMut(f64) + Send + 'static,
    ) -> Result<Self> {
        if percentile.is_nan() || percentile < 0.0 || window < 0 {
            return Err(MetricsError::invalid_percentile(percentile, window));
        }
        let window = usize::try_from(window)
            .map_err(|_| MetricsError::invalid_percentile(percentile, window))?;
        Ok(Self::with_capacity(percentile, window, Box::new(callback)))
    }

    fn with_capacity(percentile: f64, window: usize, callback: PercentileCallback) -> Self {
        let k = (window as f64 * (100.0 - percentile) / 100.0).ceil();
        let capacity = if k.is_finite() && k >= 1.0 { k as usize } else { 1 };
        Self {
            percentile,
            window,
            capacity,
            smallest: BinaryHeap::with_capacity(capacity.min(MAX_PREALLOCATED_SAMPLES)),
            samples_seen: 0,
            fired: false,
            callback,
        }
    }

    /// Feed one sample; fires the callback when the window fills
    pub fn record_data(&mut self, value: f64) {
        if self.fired {
            return;
        }
        self.samples_seen += 1;

        if self.smallest.len() < self.capacity {
            self.smallest.push(Sample(value));
        } else if let Some(Sample(max)) = self.smallest.peek().copied() {
            if value < max {
                self.smallest.pop();
                self.smallest.push(Sample(value));
            }
        }

        if self.samples_seen == self.window {
            if let Some(Sample(reported)) = self.smallest.peek().copied() {
                trace!(
                    percentile = self.percentile,
                    window = self.window,
                    value = reported,
                    "Percentile window complete"
                );
                (self.callback)(reported);
            }
            self.fired = true;
        }
    }

    pub fn percentile(&self) -> f64 {
        self.percentile
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Number of smallest samples retained
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn samples_seen(&self) -> usize {
        self.samples_seen
    }

    pub fn is_fired(&self) -> bool {
        self.fired
    }
}

/// Time `body` and feed its duration (seconds) to every collector
///
/// The duration is only recorded when `body` succeeds; an error is returned
/// to the caller unchanged.
pub fn record_time_cost_percentile<T, E>(
    percentiles: &mut [Percentile],
    body: impl FnOnce() -> std::result::Result<T, E>,
) -> std::result::Result<T, E> {
    let begin = Instant::now();
    let output = body()?;
    let cost = begin.elapsed().as_secs_f64();
    for percentile in percentiles.iter_mut() {
        percentile.record_data(cost);
    }
    Ok(output)
}

/// Async counterpart of [`record_time_cost_percentile`]
pub async fn record_time_cost_percentile_async<T, E, F>(
    percentiles: &mut [Percentile],
    body: F,
) -> std::result::Result<T, E>
where
    F: Future<Output = std::result::Result<T, E>>,
{
    let begin = Instant::now();
    let output = body.await?;
    let cost = begin.elapsed().as_secs_f64();
    for percentile in percentiles.iter_mut() {
        percentile.record_data(cost);
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn collector(kind: PercentileType, window: usize) -> (Percentile, Arc<Mutex<Vec<f64>>>) {
        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reported);
        let percentile = kind.build(window, move |v| sink.lock().push(v));
        (percentile, reported)
    }

    #[test]
    fn test_ascending_samples() {
        for (kind, expected) in [
            (PercentileType::P90, 10.0),
            (PercentileType::P95, 5.0),
            (PercentileType::P99, 1.0),
        ] {
            let (mut percentile, reported) = collector(kind, 100);
            for v in 1..=100 {
                percentile.record_data(v as f64);
            }
            assert_eq!(*reported.lock(), vec![expected], "{kind:?}");

            percentile.record_data(0.0);
            assert_eq!(reported.lock().len(), 1);
            assert_eq!(percentile.samples_seen(), 100);
        }
    }

    #[test]
    fn test_descending_samples() {
        let (mut percentile, reported) = collector(PercentileType::P90, 100);
        for v in (1..=100).rev() {
            percentile.record_data(v as f64);
        }
        assert_eq!(*reported.lock(), vec![10.0]);
    }

    #[test]
    fn test_only_first_window_counts() {
        let (mut percentile, reported) = collector(PercentileType::P95, 20);
        for v in 0..40 {
            percentile.record_data(100.0 - v as f64);
        }
        // first 20 samples are 100..=81, the smallest is 81
        assert_eq!(*reported.lock(), vec![81.0]);
    }

    #[test]
    fn test_negative_parameters_rejected() {
        assert!(matches!(
            Percentile::new(-1.0, 10, |_| {}),
            Err(MetricsError::InvalidPercentile { .. })
        ));
        assert!(matches!(
            Percentile::new(1.0, -1, |_| {}),
            Err(MetricsError::InvalidPercentile { .. })
        ));
        assert!(Percentile::new(50.0, 0, |_| {}).is_ok());
    }

    #[test]
    fn test_huge_window_allocates_lazily() {
        let mut percentile = Percentile::new(90.0, i64::MAX, |_| {}).unwrap();
        assert!(percentile.capacity() > MAX_PREALLOCATED_SAMPLES);
        for v in 0..10 {
            percentile.record_data(v as f64);
        }
        assert_eq!(percentile.samples_seen(), 10);
        assert!(!percentile.is_fired());
    }

    #[test]
    fn test_full_percentile_keeps_minimum() {
        let mut percentile = Percentile::new(100.0, 3, |_| {}).unwrap();
        assert_eq!(percentile.capacity(), 1);
        for v in [3.0, 1.0, 2.0] {
            percentile.record_data(v);
        }
        assert!(percentile.is_fired());
    }

    #[test]
    fn test_time_cost_records_on_success() {
        let (p90, reported) = collector(PercentileType::P90, 1);
        let mut percentiles = vec![p90];

        let out: std::result::Result<u32, String> =
            record_time_cost_percentile(&mut percentiles, || Ok(7));

        assert_eq!(out, Ok(7));
        assert_eq!(reported.lock().len(), 1);
        assert!(reported.lock()[0] >= 0.0);
    }

    #[test]
    fn test_time_cost_propagates_error() {
        let (p90, reported) = collector(PercentileType::P90, 1);
        let mut percentiles = vec![p90];

        let out: std::result::Result<(), String> =
            record_time_cost_percentile(&mut percentiles, || Err("boom".to_string()));

        assert_eq!(out, Err("boom".to_string()));
        assert!(reported.lock().is_empty());
        assert_eq!(percentiles[0].samples_seen(), 0);

        let empty: std::result::Result<(), String> =
            record_time_cost_percentile(&mut [], || Err("inner".to_string()));
        assert_eq!(empty, Err("inner".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_time_cost() {
        let (p99, reported) = collector(PercentileType::P99, 1);
        let mut percentiles = vec![p99];

        let out: std::result::Result<&str, String> =
            record_time_cost_percentile_async(&mut percentiles, async {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                Ok("done")
            })
            .await;

        assert_eq!(out, Ok("done"));
        assert_eq!(reported.lock().len(), 1);
    }
}
