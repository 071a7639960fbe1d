use tracing::{error, trace};

use crate::count::{CompositeCounters, CounterTiming, Counters};
use crate::errors::ApplicationError;

/// Measures one execution of a named method. Created by [`instrument`].
pub struct InstrumentTiming {
    correlation_id: Option<String>,
    name: String,
    counters: CompositeCounters,
    timing: Option<CounterTiming>,
}

/// Logs the call at trace level, increments `<name>.exec_count` and
/// starts the `<name>.exec_time` timer.
pub fn instrument(
    counters: &CompositeCounters,
    correlation_id: Option<&str>,
    name: &str,
) -> InstrumentTiming {
    trace!(
        correlation_id = correlation_id.unwrap_or_default(),
        "Executing {} method",
        name
    );
    counters.increment_one(&format!("{}.exec_count", name));

    InstrumentTiming {
        correlation_id: correlation_id.map(str::to_string),
        name: name.to_string(),
        counters: counters.clone(),
        timing: Some(counters.begin_timing(&format!("{}.exec_time", name))),
    }
}

impl InstrumentTiming {
    fn end_timing(&mut self) {
        if let Some(timing) = self.timing.take() {
            timing.end_timing();
        }
    }

    pub fn end_success(mut self) {
        self.end_timing();
    }

    pub fn end_failure(mut self, err: &ApplicationError) {
        self.end_timing();
        self.counters
            .increment_one(&format!("{}.exec_errors", self.name));
        error!(
            correlation_id = self.correlation_id.as_deref().unwrap_or_default(),
            "Failed to execute {} method: {}", self.name, err
        );
    }

    /// Ends the timing according to the outcome and passes it through.
    pub fn end<T>(self, result: Result<T, ApplicationError>) -> Result<T, ApplicationError> {
        match &result {
            Ok(_) => self.end_success(),
            Err(err) => self.end_failure(err),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::count::CachedCounters;
    use std::sync::Arc;

    #[test]
    fn test_success_and_failure_counters() {
        let cache = Arc::new(CachedCounters::new());
        let mut counters = CompositeCounters::new();
        counters.add(cache.clone());

        instrument(&counters, Some("123"), "dummies.get").end_success();
        let failed: Result<(), ApplicationError> = instrument(&counters, None, "dummies.get")
            .end(Err(ApplicationError::unknown(None, "FAIL", "failed")));
        assert!(failed.is_err());

        assert_eq!(cache.get("dummies.get.exec_count").unwrap().count, Some(2));
        assert_eq!(cache.get("dummies.get.exec_time").unwrap().count, Some(2));
        assert_eq!(cache.get("dummies.get.exec_errors").unwrap().count, Some(1));
    }
}
