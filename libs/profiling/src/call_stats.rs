//! Actor Call Statistics
//!
//! Per-task aggregation of Send/Tell traffic: how often each
//! `(actor uid, method)` pair is called, and a bounded set of the slowest
//! calls seen so far.

use crate::ProfilingOptions;
use bytes::Bytes;
use protocol::{CallContent, Message};
use serde_json::{Map, Value};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use tracing::trace;

/// Capacity of the slow-call set
pub const MAX_SLOW_CALLS: usize = 10;
/// Entries reported under `most_calls`
pub const MAX_MOST_CALLS: usize = 10;

/// One recorded slow call
///
/// Ordered by duration, ties broken on uid then address. The call content
/// never takes part in ordering.
#[derive(Debug, Clone)]
struct SlowCall {
    duration: f64,
    uid: Bytes,
    address: String,
    content: CallContent,
}

impl SlowCall {
    fn render(&self) -> String {
        format!(
            "[{}]{}.{}",
            self.address,
            String::from_utf8_lossy(&self.uid),
            self.content
        )
    }
}

impl PartialEq for SlowCall {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SlowCall {}

impl PartialOrd for SlowCall {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SlowCall {
    fn cmp(&self, other: &Self) -> Ordering {
        self.duration
            .total_cmp(&other.duration)
            .then_with(|| self.uid.cmp(&other.uid))
            .then_with(|| self.address.cmp(&other.address))
    }
}

/// Call statistics of one profiled task
#[derive(Debug)]
pub struct CallStats {
    slow_calls_threshold: f64,
    call_counter: HashMap<(Bytes, String), u64>,
    // min-heap: the root is the first entry to evict
    slow_calls: BinaryHeap<Reverse<SlowCall>>,
}

impl CallStats {
    pub fn new(options: &ProfilingOptions) -> Self {
        Self {
            slow_calls_threshold: options.slow_calls_duration_threshold,
            call_counter: HashMap::new(),
            slow_calls: BinaryHeap::with_capacity(MAX_SLOW_CALLS),
        }
    }

    /// Record one Send/Tell call that took `duration` seconds
    ///
    /// Other message kinds are ignored. A duration that cannot be ordered
    /// (NaN) still counts as a call but never enters the slow-call set.
    pub fn collect(&mut self, message: &Message, duration: f64) {
        let (Some(actor_ref), Some(content)) = (message.actor_ref(), message.call_content())
        else {
            return;
        };

        *self
            .call_counter
            .entry((actor_ref.uid().clone(), content.method.clone()))
            .or_insert(0) += 1;

        if duration < self.slow_calls_threshold {
            return;
        }
        if duration.is_nan() {
            trace!(uid = %actor_ref.uid_str(), "Dropping slow call sample without a usable duration");
            return;
        }

        let call = SlowCall {
            duration,
            uid: actor_ref.uid().clone(),
            address: actor_ref.address().to_string(),
            content: content.clone(),
        };

        if self.slow_calls.len() < MAX_SLOW_CALLS {
            self.slow_calls.push(Reverse(call));
        } else if let Some(Reverse(fastest)) = self.slow_calls.peek() {
            if call > *fastest {
                self.slow_calls.pop();
                self.slow_calls.push(Reverse(call));
            }
        }
    }

    /// Number of calls recorded for `(uid, method)`
    pub fn call_count(&self, uid: &[u8], method: &str) -> u64 {
        self.call_counter
            .get(&(Bytes::copy_from_slice(uid), method.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn slow_call_count(&self) -> usize {
        self.slow_calls.len()
    }

    /// Most frequent calls and slowest calls, both in descending order
    pub fn snapshot(&self) -> CallStatsSnapshot {
        let mut counts: Vec<(String, u64)> = self
            .call_counter
            .iter()
            .map(|((uid, method), count)| {
                (format!("{}.{}", String::from_utf8_lossy(uid), method), *count)
            })
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts.truncate(MAX_MOST_CALLS);

        let mut slow: Vec<&SlowCall> = self.slow_calls.iter().map(|Reverse(c)| c).collect();
        slow.sort_by(|a, b| b.cmp(a));

        CallStatsSnapshot {
            most_calls: counts,
            slow_calls: slow.into_iter().map(|c| (c.render(), c.duration)).collect(),
        }
    }
}

/// Rendered view of [`CallStats`]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallStatsSnapshot {
    /// `"<uid>.<method>"` → count, most frequent first
    pub most_calls: Vec<(String, u64)>,
    /// `"[address]uid.method(args=…, kwargs=…)"` → duration, slowest first
    pub slow_calls: Vec<(String, f64)>,
}

impl CallStatsSnapshot {
    /// `{"most_calls": {...}, "slow_calls": {...}}`, order preserved
    pub fn to_map(&self) -> Map<String, Value> {
        let most_calls: Map<String, Value> = self
            .most_calls
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(*v)))
            .collect();
        let slow_calls: Map<String, Value> = self
            .slow_calls
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(*v)))
            .collect();

        let mut map = Map::new();
        map.insert("most_calls".to_string(), Value::Object(most_calls));
        map.insert("slow_calls".to_string(), Value::Object(slow_calls));
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::ActorRef;

    fn stats_with_threshold(threshold: f64) -> CallStats {
        CallStats::new(&ProfilingOptions {
            slow_calls_duration_threshold: threshold,
            ..Default::default()
        })
    }

    fn send(uid: &'static str, method: &str, arg: i64) -> Message {
        Message::send(
            ActorRef::new("127.0.0.1:1111", uid),
            CallContent::new(method).arg(arg),
            None,
        )
    }

    #[test]
    fn test_keeps_ten_slowest_calls() {
        let mut stats = stats_with_threshold(0.0);
        for i in 1..=15 {
            stats.collect(&send("worker", "run", i), i as f64);
        }

        let snapshot = stats.snapshot();
        let durations: Vec<f64> = snapshot.slow_calls.iter().map(|(_, d)| *d).collect();
        let expected: Vec<f64> = (6..=15).rev().map(|d| d as f64).collect();

        assert_eq!(durations, expected);
        assert_eq!(
            snapshot.slow_calls[0].0,
            "[127.0.0.1:1111]worker.run(args=[15], kwargs={})"
        );
        assert_eq!(snapshot.most_calls, vec![("worker.run".to_string(), 15)]);
    }

    #[test]
    fn test_fast_calls_only_counted() {
        let mut stats = stats_with_threshold(1.0);
        stats.collect(&send("a", "ping", 0), 0.2);
        stats.collect(&send("a", "ping", 0), 0.3);

        assert_eq!(stats.call_count(b"a", "ping"), 2);
        assert_eq!(stats.slow_call_count(), 0);
    }

    #[test]
    fn test_smaller_duration_does_not_evict() {
        let mut stats = stats_with_threshold(0.0);
        for i in 10..20 {
            stats.collect(&send("a", "m", i), i as f64);
        }
        stats.collect(&send("a", "m", 0), 1.0);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.slow_calls.last().map(|(_, d)| *d), Some(10.0));
    }

    #[test]
    fn test_unorderable_duration_is_dropped() {
        let mut stats = stats_with_threshold(0.0);
        stats.collect(&send("a", "m", 0), f64::NAN);

        assert_eq!(stats.call_count(b"a", "m"), 1);
        assert_eq!(stats.slow_call_count(), 0);
    }

    #[test]
    fn test_ignores_non_call_messages() {
        let mut stats = stats_with_threshold(0.0);
        stats.collect(&Message::has_actor(ActorRef::new("addr", "a")), 5.0);

        assert!(stats.snapshot().most_calls.is_empty());
    }

    #[test]
    fn test_most_calls_limited_and_ordered() {
        let mut stats = stats_with_threshold(100.0);
        for (n, method) in ["m00", "m01", "m02", "m03", "m04", "m05", "m06", "m07", "m08", "m09", "m10", "m11"]
            .iter()
            .enumerate()
        {
            for _ in 0..=n {
                stats.collect(&send("a", method, 0), 0.0);
            }
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.most_calls.len(), MAX_MOST_CALLS);
        assert_eq!(snapshot.most_calls[0], ("a.m11".to_string(), 12));
        assert_eq!(snapshot.most_calls[9], ("a.m02".to_string(), 3));
    }
}
