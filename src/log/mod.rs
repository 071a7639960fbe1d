use chrono::{DateTime, Utc};
use tracing::Level;

pub mod cloudwatch;

pub use cloudwatch::{CloudWatchLayer, CloudWatchLogger};

/// One captured log event waiting to be shipped.
#[derive(PartialEq, Debug, Clone)]
pub struct LogMessage {
    pub time: DateTime<Utc>,
    pub level: Level,
    pub source: Option<String>,
    pub correlation_id: Option<String>,
    pub message: String,
    pub error: Option<String>,
}

impl LogMessage {
    /// `[<source>:<correlation_id>:<LEVEL>] <message>[: <error>]`, with
    /// `---` standing in for a missing source or correlation id.
    pub fn format(&self) -> String {
        let mut result = format!(
            "[{}:{}:{}] {}",
            self.source.as_deref().unwrap_or("---"),
            self.correlation_id.as_deref().unwrap_or("---"),
            self.level,
            self.message
        );
        if let Some(error) = &self.error {
            if self.message.is_empty() {
                result.push_str("Error: ");
            } else {
                result.push_str(": ");
            }
            result.push_str(error);
        }
        result
    }
}
