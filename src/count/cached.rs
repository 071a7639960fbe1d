use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::config::ConfigParams;
use crate::count::{Counter, CounterType, Counters};

struct CacheState {
    counters: HashMap<String, Counter>,
    updated: bool,
    last_reset: Instant,
}

/// In-memory aggregation of measurements by name. Sinks that ship
/// counters elsewhere periodically take snapshots from it.
pub struct CachedCounters {
    state: Mutex<CacheState>,
    reset_timeout: Mutex<Duration>,
}

impl Default for CachedCounters {
    fn default() -> Self {
        CachedCounters {
            state: Mutex::new(CacheState {
                counters: HashMap::new(),
                updated: false,
                last_reset: Instant::now(),
            }),
            reset_timeout: Mutex::new(Duration::ZERO),
        }
    }
}

impl CachedCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `options.reset_timeout` (ms, 0 disables resets).
    pub fn configure(&self, config: &ConfigParams) {
        let current = self.reset_timeout().as_millis() as i64;
        let timeout = config
            .get_as_integer_with_default("options.reset_timeout", current)
            .max(0);
        *self
            .reset_timeout
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Duration::from_millis(timeout as u64);
    }

    fn reset_timeout(&self) -> Duration {
        *self
            .reset_timeout
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        let timeout = self.reset_timeout();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !timeout.is_zero() && state.last_reset.elapsed() > timeout {
            state.counters.clear();
            state.updated = false;
            state.last_reset = Instant::now();
        }
        state
    }

    fn update<F: FnOnce(&mut Counter)>(&self, name: &str, counter_type: CounterType, apply: F) {
        let mut state = self.lock();
        let counter = state
            .counters
            .entry(name.to_string())
            .or_insert_with(|| Counter::new(name, counter_type));
        if counter.counter_type != counter_type {
            *counter = Counter::new(name, counter_type);
        }
        apply(counter);
        state.updated = true;
    }

    pub fn get(&self, name: &str) -> Option<Counter> {
        self.lock().counters.get(name).cloned()
    }

    /// Snapshot of all counters ordered by name.
    pub fn get_all(&self) -> Vec<Counter> {
        let mut counters: Vec<Counter> = self.lock().counters.values().cloned().collect();
        counters.sort_by(|a, b| a.name.cmp(&b.name));
        counters
    }

    /// Snapshot of all counters when anything changed since the last call.
    pub fn take_updated(&self) -> Option<Vec<Counter>> {
        let updated = {
            let mut state = self.lock();
            std::mem::replace(&mut state.updated, false)
        };
        if updated {
            Some(self.get_all())
        } else {
            None
        }
    }

    pub fn clear(&self, name: &str) {
        self.lock().counters.remove(name);
    }

    pub fn clear_all(&self) {
        let mut state = self.lock();
        state.counters.clear();
        state.updated = false;
    }
}

fn calculate_stats(counter: &mut Counter, value: f64) {
    let count = counter.count.unwrap_or(0) + 1;
    counter.last = Some(value);
    counter.count = Some(count);
    counter.max = Some(counter.max.map_or(value, |max| max.max(value)));
    counter.min = Some(counter.min.map_or(value, |min| min.min(value)));
    counter.average = Some(
        (counter.average.unwrap_or(0.0) * (count - 1) as f64 + value) / count as f64,
    );
}

impl Counters for CachedCounters {
    fn end_timing(&self, name: &str, elapsed_ms: f64) {
        self.update(name, CounterType::Interval, |c| calculate_stats(c, elapsed_ms));
    }

    fn stats(&self, name: &str, value: f64) {
        self.update(name, CounterType::Statistics, |c| calculate_stats(c, value));
    }

    fn last(&self, name: &str, value: f64) {
        self.update(name, CounterType::LastValue, |c| c.last = Some(value));
    }

    fn timestamp(&self, name: &str, value: DateTime<Utc>) {
        self.update(name, CounterType::Timestamp, |c| c.time = Some(value));
    }

    fn increment(&self, name: &str, value: i64) {
        self.update(name, CounterType::Increment, |c| {
            c.count = Some(c.count.unwrap_or(0) + value);
            c.time = Some(Utc::now());
        });
    }
}
