use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub mod clients;
pub mod commands;
pub mod config;
pub mod connect;
pub mod container;
pub mod count;
pub mod dummy;
pub mod errors;
pub mod instrument;
pub mod log;
pub mod refer;
pub mod services;
pub mod validate;

fn env_filter() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy()
}

pub fn set_up_logging() {
    tracing_subscriber::fmt().with_env_filter(env_filter()).init();
}

/// Like [`set_up_logging`], with `layer` receiving every event regardless
/// of `RUST_LOG`, e.g. [`log::CloudWatchLogger::layer`].
pub fn set_up_logging_with<L>(layer: L)
where
    L: Layer<tracing_subscriber::Registry> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(layer)
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter()))
        .init();
}
