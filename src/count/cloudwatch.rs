use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use aws_sdk_cloudwatch::primitives::DateTime as AwsDateTime;
use aws_sdk_cloudwatch::types::{Dimension, MetricDatum, StandardUnit, StatisticSet};
use aws_sdk_cloudwatch::Client;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::config::ConfigParams;
use crate::connect::AwsConnectionResolver;
use crate::count::{CachedCounters, CloudWatchUnit, Counter, CounterType, Counters};
use crate::errors::ApplicationError;

const MAX_METRIC_DATA: usize = 20;

struct State {
    resolver: AwsConnectionResolver,
    connect_timeout: Duration,
    interval: Duration,
    source: Option<String>,
    instance: Option<String>,
    client: Option<Client>,
    timer: Option<JoinHandle<()>>,
    opened: bool,
}

struct Inner {
    cache: CachedCounters,
    state: Mutex<State>,
}

/// Counters that are aggregated in memory and periodically sent to
/// CloudWatch metrics with `PutMetricData`.
///
/// ### Configuration parameters
///
/// - `source`: metrics namespace
/// - `instance`: value of the `InstanceID` dimension
/// - `connection.*` / `credential.*`: AWS connection
/// - `options.interval`: flush interval in ms (default 300000)
/// - `options.connect_timeout`: connect timeout in ms (default 30000)
/// - `options.reset_timeout`: counters reset timeout in ms (default 0, never)
#[derive(Clone)]
pub struct CloudWatchCounters {
    inner: Arc<Inner>,
}

impl Default for CloudWatchCounters {
    fn default() -> Self {
        CloudWatchCounters {
            inner: Arc::new(Inner {
                cache: CachedCounters::new(),
                state: Mutex::new(State {
                    resolver: AwsConnectionResolver::new(),
                    connect_timeout: Duration::from_millis(30000),
                    interval: Duration::from_millis(300000),
                    source: None,
                    instance: None,
                    client: None,
                    timer: None,
                    opened: false,
                }),
            }),
        }
    }
}

impl CloudWatchCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses an already built client instead of resolving a connection on open.
    pub fn with_client(self, client: Client) -> Self {
        self.state().client = Some(client);
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn configure(&self, config: &ConfigParams) {
        self.inner.cache.configure(config);

        let mut state = self.state();
        state.resolver.configure(config);
        if let Some(source) = config.get_as_nullable_string("source") {
            state.source = Some(source);
        }
        if let Some(instance) = config.get_as_nullable_string("instance") {
            state.instance = Some(instance);
        }
        state.interval = Duration::from_millis(
            config
                .get_as_integer_with_default("options.interval", state.interval.as_millis() as i64)
                .max(1) as u64,
        );
        state.connect_timeout = Duration::from_millis(
            config
                .get_as_integer_with_default(
                    "options.connect_timeout",
                    state.connect_timeout.as_millis() as i64,
                )
                .max(0) as u64,
        );
    }

    /// Fills `source` and `instance` from the hosting context unless configured.
    pub fn set_context(&self, name: &str, instance: &str) {
        let mut state = self.state();
        state.source.get_or_insert_with(|| name.to_string());
        state.instance.get_or_insert_with(|| instance.to_string());
    }

    pub fn cache(&self) -> &CachedCounters {
        &self.inner.cache
    }

    pub fn is_open(&self) -> bool {
        self.state().opened
    }

    pub async fn open(&self, correlation_id: Option<&str>) -> Result<(), ApplicationError> {
        let (resolver, connect_timeout, has_client) = {
            let state = self.state();
            if state.opened {
                return Ok(());
            }
            (state.resolver.clone(), state.connect_timeout, state.client.is_some())
        };

        let client = if has_client {
            None
        } else {
            let connection = resolver.resolve(correlation_id)?;
            let sdk_config = connection.to_sdk_config(connect_timeout).await;
            Some(Client::new(&sdk_config))
        };

        let mut state = self.state();
        if state.opened {
            return Ok(());
        }
        if client.is_some() {
            state.client = client;
        }
        state.timer = Some(spawn_flush(Arc::downgrade(&self.inner), state.interval));
        state.opened = true;
        debug!(
            correlation_id = correlation_id.unwrap_or_default(),
            "Opened CloudWatch counters"
        );
        Ok(())
    }

    /// Flushes pending measurements, stops the timer and releases the client.
    pub async fn close(&self, correlation_id: Option<&str>) -> Result<(), ApplicationError> {
        if !self.is_open() {
            return Ok(());
        }
        self.dump().await;

        let mut state = self.state();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.client = None;
        state.opened = false;
        debug!(
            correlation_id = correlation_id.unwrap_or_default(),
            "Closed CloudWatch counters"
        );
        Ok(())
    }

    /// Sends counters updated since the last dump.
    pub async fn dump(&self) {
        if let Some(counters) = self.inner.cache.take_updated() {
            self.save(&counters).await;
        }
    }

    async fn save(&self, counters: &[Counter]) {
        let (client, source, instance) = {
            let state = self.state();
            let Some(client) = state.client.clone() else {
                return;
            };
            (
                client,
                state.source.clone().unwrap_or_default(),
                state.instance.clone().unwrap_or_default(),
            )
        };

        let now = Utc::now();
        let data: Vec<MetricDatum> = counters
            .iter()
            .map(|counter| metric_datum(counter, &instance, now))
            .collect();

        for chunk in data.chunks(MAX_METRIC_DATA) {
            let result = client
                .put_metric_data()
                .namespace(&source)
                .set_metric_data(Some(chunk.to_vec()))
                .send()
                .await;
            if let Err(err) = result {
                error!("PutMetricData to namespace {} failed: {}", source, err);
            }
        }
    }
}

fn spawn_flush(inner: Weak<Inner>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            CloudWatchCounters { inner }.dump().await;
        }
    })
}

fn statistic_set(counter: &Counter) -> StatisticSet {
    let count = counter.count.unwrap_or(0) as f64;
    StatisticSet::builder()
        .sample_count(count)
        .maximum(counter.max.unwrap_or(0.0))
        .minimum(counter.min.unwrap_or(0.0))
        .sum(count * counter.average.unwrap_or(0.0))
        .build()
}

fn instance_dimension(instance: &str) -> Dimension {
    Dimension::builder()
        .name("InstanceID")
        .value(instance)
        .build()
}

fn metric_datum(counter: &Counter, instance: &str, now: DateTime<Utc>) -> MetricDatum {
    let time = counter.time.unwrap_or(now);
    let builder = MetricDatum::builder()
        .metric_name(&counter.name)
        .timestamp(AwsDateTime::from_millis(time.timestamp_millis()))
        .dimensions(instance_dimension(instance));

    let builder = match counter.counter_type {
        CounterType::Increment => builder
            .value(counter.count.unwrap_or(0) as f64)
            .unit(StandardUnit::from(CloudWatchUnit::Count)),
        CounterType::Interval => builder
            .statistic_values(statistic_set(counter))
            .unit(StandardUnit::from(CloudWatchUnit::Milliseconds)),
        CounterType::Statistics => builder
            .statistic_values(statistic_set(counter))
            .unit(StandardUnit::from(CloudWatchUnit::None)),
        CounterType::LastValue => builder
            .value(counter.last.unwrap_or(0.0))
            .unit(StandardUnit::from(CloudWatchUnit::None)),
        CounterType::Timestamp => builder
            .value(time.timestamp_millis() as f64)
            .unit(StandardUnit::from(CloudWatchUnit::None)),
    };
    builder.build()
}

impl Counters for CloudWatchCounters {
    fn end_timing(&self, name: &str, elapsed_ms: f64) {
        self.inner.cache.end_timing(name, elapsed_ms);
    }

    fn stats(&self, name: &str, value: f64) {
        self.inner.cache.stats(name, value);
    }

    fn last(&self, name: &str, value: f64) {
        self.inner.cache.last(name, value);
    }

    fn timestamp(&self, name: &str, value: DateTime<Utc>) {
        self.inner.cache.timestamp(name, value);
    }

    fn increment(&self, name: &str, value: i64) {
        self.inner.cache.increment(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_config::BehaviorVersion;
    use aws_sdk_cloudwatch::config::{Credentials, Region};
    use aws_smithy_runtime::client::http::test_util::{ReplayEvent, StaticReplayClient};
    use aws_smithy_types::body::SdkBody;

    fn replay_event() -> ReplayEvent {
        ReplayEvent::new(
            http::Request::builder()
                .body(SdkBody::from(""))
                .unwrap(),
            http::Response::builder()
                .status(200)
                .body(SdkBody::from(""))
                .unwrap(),
        )
    }

    fn mock_client(http_client: StaticReplayClient) -> Client {
        let conf = aws_sdk_cloudwatch::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(Credentials::new(
                "SOMETESTKEYID",
                "somesecretkey",
                None,
                None,
                "",
            ))
            .region(Region::new("us-east-1"))
            .http_client(http_client)
            .build();
        Client::from_conf(conf)
    }

    #[test]
    fn test_metric_datum_per_counter_type() {
        let now = Utc::now();

        let mut increment = Counter::new("calls", CounterType::Increment);
        increment.count = Some(3);
        let datum = metric_datum(&increment, "i-1", now);
        assert_eq!(datum.value(), Some(3.0));
        assert_eq!(datum.unit(), Some(&StandardUnit::Count));
        assert_eq!(datum.dimensions().len(), 1);

        let mut interval = Counter::new("exec_time", CounterType::Interval);
        interval.count = Some(2);
        interval.min = Some(1.0);
        interval.max = Some(3.0);
        interval.average = Some(2.0);
        let datum = metric_datum(&interval, "i-1", now);
        assert_eq!(datum.unit(), Some(&StandardUnit::Milliseconds));
        let stats = datum.statistic_values().unwrap();
        assert_eq!(stats.sum(), Some(4.0));
        assert_eq!(stats.sample_count(), Some(2.0));

        let mut timestamp = Counter::new("started", CounterType::Timestamp);
        timestamp.time = Some(now);
        let datum = metric_datum(&timestamp, "i-1", now);
        assert_eq!(datum.value(), Some(now.timestamp_millis() as f64));
    }

    #[tokio::test]
    async fn test_dump_sends_in_chunks() {
        let http_client = StaticReplayClient::new(vec![replay_event(), replay_event()]);
        let counters = CloudWatchCounters::new().with_client(mock_client(http_client.clone()));
        counters.configure(&ConfigParams::from_tuples(&[
            ("source", "pip-services-aws"),
            ("instance", "test"),
        ]));
        counters.open(None).await.unwrap();
        counters.open(None).await.unwrap();

        for i in 0..25 {
            counters.increment_one(&format!("counter{}", i));
        }
        counters.dump().await;
        assert_eq!(http_client.actual_requests().count(), 2);

        // nothing changed since the last dump
        counters.dump().await;
        assert_eq!(http_client.actual_requests().count(), 2);

        counters.close(None).await.unwrap();
        assert!(!counters.is_open());
    }

    #[tokio::test]
    async fn test_open_without_connection_fails() {
        let counters = CloudWatchCounters::new();
        let err = counters.open(Some("123")).await.unwrap_err();
        assert_eq!(err.code, "NO_AWS_CONNECTION");
        assert!(!counters.is_open());
    }
}
