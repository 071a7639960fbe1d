use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use aws_sdk_cloudwatchlogs::error::BuildError;
use aws_sdk_cloudwatchlogs::types::InputLogEvent;
use aws_sdk_cloudwatchlogs::Client;
use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::config::ConfigParams;
use crate::connect::AwsConnectionResolver;
use crate::errors::ApplicationError;
use crate::log::LogMessage;

struct State {
    resolver: AwsConnectionResolver,
    connect_timeout: Duration,
    interval: Duration,
    max_cache_size: usize,
    group: Option<String>,
    stream: Option<String>,
    source: Option<String>,
    client: Option<Client>,
    timer: Option<JoinHandle<()>>,
    opened: bool,
}

struct Inner {
    level: Mutex<LevelFilter>,
    cache: Mutex<Vec<LogMessage>>,
    state: Mutex<State>,
}

impl Inner {
    fn level(&self) -> LevelFilter {
        *self.level.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cache(&self) -> MutexGuard<'_, Vec<LogMessage>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Logger that caches `tracing` events and periodically ships them to a
/// CloudWatch Logs stream. Attach it with [`CloudWatchLogger::layer`].
///
/// ### Configuration parameters
///
/// - `group`: log group name (default: context name)
/// - `stream`: log stream name (default: context instance)
/// - `level`: maximum level to ship (default `info`)
/// - `connection.*` / `credential.*`: AWS connection
/// - `options.interval`: flush interval in ms (default 10000)
/// - `options.max_cache_size`: messages kept between flushes (default 100)
/// - `options.connect_timeout`: connect timeout in ms (default 30000)
#[derive(Clone)]
pub struct CloudWatchLogger {
    inner: Arc<Inner>,
}

impl Default for CloudWatchLogger {
    fn default() -> Self {
        CloudWatchLogger {
            inner: Arc::new(Inner {
                level: Mutex::new(LevelFilter::INFO),
                cache: Mutex::new(Vec::new()),
                state: Mutex::new(State {
                    resolver: AwsConnectionResolver::new(),
                    connect_timeout: Duration::from_millis(30000),
                    interval: Duration::from_millis(10000),
                    max_cache_size: 100,
                    group: None,
                    stream: None,
                    source: None,
                    client: None,
                    timer: None,
                    opened: false,
                }),
            }),
        }
    }
}

impl fmt::Debug for CloudWatchLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state();
        f.debug_struct("CloudWatchLogger")
            .field("group", &state.group)
            .field("stream", &state.stream)
            .field("opened", &state.opened)
            .finish()
    }
}

impl CloudWatchLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses an already built client instead of resolving a connection on open.
    pub fn with_client(self, client: Client) -> Self {
        self.inner.state().client = Some(client);
        self
    }

    pub fn configure(&self, config: &ConfigParams) -> Result<(), ApplicationError> {
        if let Some(level) = config.get_as_nullable_string("level") {
            let level = LevelFilter::from_str(&level).map_err(|e| {
                ApplicationError::config(None, "BAD_LEVEL", format!("Unknown log level {}", level))
                    .with_cause(e)
            })?;
            *self
                .inner
                .level
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = level;
        }

        let mut state = self.inner.state();
        state.resolver.configure(config);
        if let Some(group) = config.get_as_nullable_string("group") {
            state.group = Some(group);
        }
        if let Some(stream) = config.get_as_nullable_string("stream") {
            state.stream = Some(stream);
        }
        state.interval = Duration::from_millis(
            config
                .get_as_integer_with_default("options.interval", state.interval.as_millis() as i64)
                .max(1) as u64,
        );
        state.max_cache_size = config
            .get_as_integer_with_default("options.max_cache_size", state.max_cache_size as i64)
            .max(1) as usize;
        state.connect_timeout = Duration::from_millis(
            config
                .get_as_integer_with_default(
                    "options.connect_timeout",
                    state.connect_timeout.as_millis() as i64,
                )
                .max(0) as u64,
        );
        Ok(())
    }

    /// Fills the group, stream and message source from the hosting
    /// context unless configured.
    pub fn set_context(&self, name: &str, instance: &str) {
        let mut state = self.inner.state();
        state.group.get_or_insert_with(|| name.to_string());
        state.stream.get_or_insert_with(|| instance.to_string());
        state.source.get_or_insert_with(|| name.to_string());
    }

    pub fn layer(&self) -> CloudWatchLayer {
        CloudWatchLayer {
            inner: self.inner.clone(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.state().opened
    }

    /// Messages captured and not yet shipped.
    pub fn cached(&self) -> Vec<LogMessage> {
        self.inner.cache().clone()
    }

    pub async fn open(&self, correlation_id: Option<&str>) -> Result<(), ApplicationError> {
        let (resolver, connect_timeout, client) = {
            let state = self.inner.state();
            if state.opened {
                return Ok(());
            }
            (state.resolver.clone(), state.connect_timeout, state.client.clone())
        };

        let client = match client {
            Some(client) => client,
            None => {
                let connection = resolver.resolve(correlation_id)?;
                let sdk_config = connection.to_sdk_config(connect_timeout).await;
                Client::new(&sdk_config)
            }
        };

        let (group, stream) = self.destination();
        create_group(&client, &group, correlation_id).await?;
        create_stream(&client, &group, &stream, correlation_id).await?;

        {
            let mut state = self.inner.state();
            if state.opened {
                return Ok(());
            }
            state.client = Some(client);
            state.timer = Some(spawn_flush(Arc::downgrade(&self.inner), state.interval));
            state.opened = true;
        }
        debug!(
            correlation_id = correlation_id.unwrap_or_default(),
            "Opened CloudWatch logger for {}/{}", group, stream
        );
        Ok(())
    }

    /// Flushes cached messages, stops the timer and releases the client.
    pub async fn close(&self, correlation_id: Option<&str>) -> Result<(), ApplicationError> {
        if !self.is_open() {
            return Ok(());
        }
        self.dump().await;

        {
            let mut state = self.inner.state();
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            state.client = None;
            state.opened = false;
        }
        debug!(
            correlation_id = correlation_id.unwrap_or_default(),
            "Closed CloudWatch logger"
        );
        Ok(())
    }

    fn destination(&self) -> (String, String) {
        let state = self.inner.state();
        (
            state.group.clone().unwrap_or_else(|| "undefined".to_string()),
            state.stream.clone().unwrap_or_else(|| "undefined".to_string()),
        )
    }

    /// Ships cached messages. Failures are logged and the batch is dropped.
    pub async fn dump(&self) {
        let client = {
            let state = self.inner.state();
            match &state.client {
                Some(client) if state.opened => client.clone(),
                _ => return,
            }
        };

        let mut messages = std::mem::take(&mut *self.inner.cache());
        if messages.is_empty() {
            return;
        }
        messages.sort_by_key(|m| m.time);

        let events = match messages
            .iter()
            .map(input_log_event)
            .collect::<Result<Vec<InputLogEvent>, BuildError>>()
        {
            Ok(events) => events,
            Err(err) => {
                error!("Failed to build log events: {}", err);
                return;
            }
        };

        let (group, stream) = self.destination();
        let result = client
            .put_log_events()
            .log_group_name(&group)
            .log_stream_name(&stream)
            .set_log_events(Some(events))
            .send()
            .await;
        if let Err(err) = result {
            error!("PutLogEvents to {}/{} failed: {}", group, stream, err);
        }
    }
}

fn input_log_event(message: &LogMessage) -> Result<InputLogEvent, BuildError> {
    InputLogEvent::builder()
        .timestamp(message.time.timestamp_millis())
        .message(message.format())
        .build()
}

async fn create_group(
    client: &Client,
    group: &str,
    correlation_id: Option<&str>,
) -> Result<(), ApplicationError> {
    match client.create_log_group().log_group_name(group).send().await {
        Ok(_) => Ok(()),
        Err(err)
            if err
                .as_service_error()
                .is_some_and(|e| e.is_resource_already_exists_exception()) =>
        {
            Ok(())
        }
        Err(err) => Err(ApplicationError::invocation(
            correlation_id,
            "CALL_FAILED",
            format!("Failed to create log group {}", group),
        )
        .with_cause(err)),
    }
}

async fn create_stream(
    client: &Client,
    group: &str,
    stream: &str,
    correlation_id: Option<&str>,
) -> Result<(), ApplicationError> {
    let result = client
        .create_log_stream()
        .log_group_name(group)
        .log_stream_name(stream)
        .send()
        .await;
    match result {
        Ok(_) => Ok(()),
        Err(err)
            if err
                .as_service_error()
                .is_some_and(|e| e.is_resource_already_exists_exception()) =>
        {
            Ok(())
        }
        Err(err) => Err(ApplicationError::invocation(
            correlation_id,
            "CALL_FAILED",
            format!("Failed to create log stream {}/{}", group, stream),
        )
        .with_cause(err)),
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
            CloudWatchLogger { inner }.dump().await;
        }
    })
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    correlation_id: Option<String>,
    error: Option<String>,
    fields: Vec<String>,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "correlation_id" if !value.is_empty() => self.correlation_id = Some(value.to_string()),
            "correlation_id" => {}
            "error" => self.error = Some(value.to_string()),
            name => self.fields.push(format!("{}={}", name, value)),
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{:?}", value),
            "correlation_id" => self.record_str(field, &format!("{:?}", value)),
            "error" => self.error = Some(format!("{:?}", value)),
            name => self.fields.push(format!("{}={:?}", name, value)),
        }
    }
}

/// `tracing` layer feeding a [`CloudWatchLogger`].
pub struct CloudWatchLayer {
    inner: Arc<Inner>,
}

impl CloudWatchLayer {
    fn is_own(target: &str) -> bool {
        // the SDK traces its own requests, shipping those would feed back
        target == module_path!() || target.starts_with("aws_")
    }
}

impl<S: Subscriber> Layer<S> for CloudWatchLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if Self::is_own(metadata.target()) || *metadata.level() > self.inner.level() {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let mut message = visitor.message;
        if !visitor.fields.is_empty() {
            message = format!("{} {}", message, visitor.fields.join(" "));
        }

        let source = self.inner.state().source.clone();
        let max_cache_size = self.inner.state().max_cache_size;
        let mut cache = self.inner.cache();
        cache.push(LogMessage {
            time: Utc::now(),
            level: *metadata.level(),
            source,
            correlation_id: visitor.correlation_id,
            message,
            error: visitor.error,
        });
        if cache.len() > max_cache_size {
            let excess = cache.len() - max_cache_size;
            cache.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_config::BehaviorVersion;
    use aws_sdk_cloudwatchlogs::config::{Credentials, Region};
    use aws_smithy_runtime::client::http::test_util::{ReplayEvent, StaticReplayClient};
    use aws_smithy_types::body::SdkBody;
    use tracing_subscriber::layer::SubscriberExt;

    fn replay_event(status: u16, body: &'static str) -> ReplayEvent {
        ReplayEvent::new(
            http::Request::builder()
                .body(SdkBody::from(""))
                .unwrap(),
            http::Response::builder()
                .status(status)
                .body(SdkBody::from(body))
                .unwrap(),
        )
    }

    fn mock_client(http_client: StaticReplayClient) -> Client {
        let conf = aws_sdk_cloudwatchlogs::Config::builder()
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

    fn capture<F: FnOnce()>(logger: &CloudWatchLogger, f: F) {
        let subscriber = tracing_subscriber::registry().with(logger.layer());
        tracing::subscriber::with_default(subscriber, f);
    }

    #[test]
    fn test_layer_caches_events_by_level() {
        let logger = CloudWatchLogger::new();
        logger
            .configure(&ConfigParams::from_tuples(&[("level", "info")]))
            .unwrap();
        logger.set_context("dummies", "instance-1");

        capture(&logger, || {
            tracing::info!(correlation_id = "123", "Created dummy");
            tracing::debug!("Not shipped");
            tracing::error!(error = "NO_ACTION", "Dispatch failed");
        });

        let cached = logger.cached();
        assert_eq!(cached.len(), 2);
        assert_eq!(cached[0].format(), "[dummies:123:INFO] Created dummy");
        assert_eq!(cached[1].error.as_deref(), Some("NO_ACTION"));
    }

    #[test]
    fn test_cache_keeps_latest_messages() {
        let logger = CloudWatchLogger::new();
        logger
            .configure(&ConfigParams::from_tuples(&[("options.max_cache_size", "2")]))
            .unwrap();

        capture(&logger, || {
            for i in 0..5 {
                tracing::warn!("message {}", i);
            }
        });

        let messages: Vec<String> = logger.cached().into_iter().map(|m| m.message).collect();
        assert_eq!(messages, vec!["message 3", "message 4"]);
    }

    #[test]
    fn test_unknown_level_is_rejected() {
        let logger = CloudWatchLogger::new();
        let err = logger
            .configure(&ConfigParams::from_tuples(&[("level", "loud")]))
            .unwrap_err();
        assert_eq!(err.code, "BAD_LEVEL");
    }

    #[tokio::test]
    async fn test_open_and_dump() {
        let http_client = StaticReplayClient::new(vec![
            replay_event(200, "{}"),
            replay_event(200, "{}"),
            replay_event(200, "{}"),
        ]);
        let logger = CloudWatchLogger::new().with_client(mock_client(http_client.clone()));
        logger.set_context("dummies", "instance-1");

        logger.open(Some("123")).await.unwrap();
        assert!(logger.is_open());
        assert_eq!(http_client.actual_requests().count(), 2);

        capture(&logger, || tracing::info!("Shipped"));
        logger.dump().await;
        assert_eq!(http_client.actual_requests().count(), 3);
        assert!(logger.cached().is_empty());

        logger.close(None).await.unwrap();
        logger.close(None).await.unwrap();
        assert!(!logger.is_open());
        assert_eq!(http_client.actual_requests().count(), 3);
    }
}
