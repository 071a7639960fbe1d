use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::refer::{Descriptor, References};

pub mod cached;
pub mod cloudwatch;
pub mod unit;

pub use cached::CachedCounters;
pub use cloudwatch::CloudWatchCounters;
pub use unit::CloudWatchUnit;

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum CounterType {
    Interval,
    LastValue,
    Statistics,
    Timestamp,
    Increment,
}

/// Aggregated measurement for one counter name.
#[derive(PartialEq, Debug, Clone)]
pub struct Counter {
    pub name: String,
    pub counter_type: CounterType,
    pub last: Option<f64>,
    pub count: Option<i64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub average: Option<f64>,
    pub time: Option<DateTime<Utc>>,
}

impl Counter {
    pub fn new(name: &str, counter_type: CounterType) -> Self {
        Counter {
            name: name.to_string(),
            counter_type,
            last: None,
            count: None,
            min: None,
            max: None,
            average: None,
            time: None,
        }
    }
}

/// Sink for performance measurements.
pub trait Counters: Send + Sync {
    fn end_timing(&self, name: &str, elapsed_ms: f64);

    fn stats(&self, name: &str, value: f64);

    fn last(&self, name: &str, value: f64);

    fn timestamp(&self, name: &str, value: DateTime<Utc>);

    fn timestamp_now(&self, name: &str) {
        self.timestamp(name, Utc::now());
    }

    fn increment(&self, name: &str, value: i64);

    fn increment_one(&self, name: &str) {
        self.increment(name, 1);
    }
}

/// Counters that discard everything.
#[derive(Clone, Copy, Default, Debug)]
pub struct NullCounters;

impl Counters for NullCounters {
    fn end_timing(&self, _: &str, _: f64) {}
    fn stats(&self, _: &str, _: f64) {}
    fn last(&self, _: &str, _: f64) {}
    fn timestamp(&self, _: &str, _: DateTime<Utc>) {}
    fn increment(&self, _: &str, _: i64) {}
}

/// Fans measurements out to every referenced counters component.
#[derive(Clone, Default)]
pub struct CompositeCounters {
    counters: Vec<Arc<dyn Counters>>,
}

impl CompositeCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, counters: Arc<dyn Counters>) {
        self.counters.push(counters);
    }

    pub fn set_counters(&mut self, counters: Vec<Arc<dyn Counters>>) {
        self.counters = counters;
    }

    /// Picks up every `Arc<dyn Counters>` registered as `*:counters:*:*:*`.
    pub fn set_references(&mut self, references: &References) {
        let locator = Descriptor::new("*", "counters", "*", "*", "*");
        self.counters = references.get_optional::<Arc<dyn Counters>>(&locator);
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    pub fn begin_timing(&self, name: &str) -> CounterTiming {
        CounterTiming {
            name: name.to_string(),
            counters: self.clone(),
            start: Instant::now(),
        }
    }
}

impl Counters for CompositeCounters {
    fn end_timing(&self, name: &str, elapsed_ms: f64) {
        self.counters.iter().for_each(|c| c.end_timing(name, elapsed_ms));
    }

    fn stats(&self, name: &str, value: f64) {
        self.counters.iter().for_each(|c| c.stats(name, value));
    }

    fn last(&self, name: &str, value: f64) {
        self.counters.iter().for_each(|c| c.last(name, value));
    }

    fn timestamp(&self, name: &str, value: DateTime<Utc>) {
        self.counters.iter().for_each(|c| c.timestamp(name, value));
    }

    fn increment(&self, name: &str, value: i64) {
        self.counters.iter().for_each(|c| c.increment(name, value));
    }
}

/// Running interval measurement started by [`CompositeCounters::begin_timing`].
pub struct CounterTiming {
    name: String,
    counters: CompositeCounters,
    start: Instant,
}

impl CounterTiming {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reports the elapsed milliseconds and returns them.
    pub fn end_timing(self) -> f64 {
        let elapsed = self.start.elapsed().as_secs_f64() * 1000.0;
        self.counters.end_timing(&self.name, elapsed);
        elapsed
    }
}
