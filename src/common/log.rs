// SPDX-License-Identifier: GPL-2.0-or-later

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;

use crate::event::SegmentId;

pub type ArcLogger = Arc<dyn ILogger + Send + Sync>;

pub trait ILogger {
    fn log(&self, _: LogEntry) {}
}

/// Severity of a log message.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
}

/// One log record before a timestamp has been assigned.
#[derive(Clone, Debug)]
pub struct LogEntry {
    pub level: LogLevel,
    pub source: &'static str,
    pub segment_id: Option<SegmentId>,
    pub message: String,
}

impl LogEntry {
    #[must_use]
    pub fn new(
        level: LogLevel,
        source: &'static str,
        segment_id: Option<SegmentId>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level,
            source,
            segment_id,
            message: message.into(),
        }
    }
}

/// Microseconds since the Unix epoch.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct UnixMicro(u64);

impl UnixMicro {
    fn now() -> Self {
        #[allow(clippy::unwrap_used)]
        UnixMicro(
            u64::try_from(
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .expect("broken system clock")
                    .as_micros(),
            )
            .unwrap_or(u64::MAX),
        )
    }
}

/// A log entry with its assigned timestamp.
#[derive(Clone, Debug, Serialize)]
pub struct LogEntryWithTime {
    pub level: LogLevel,
    pub source: &'static str,
    #[serde(rename = "segmentId", skip_serializing_if = "Option::is_none")]
    pub segment_id: Option<SegmentId>,
    pub message: String,
    pub time: UnixMicro,
}

impl fmt::Display for LogEntryWithTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            LogLevel::Error => write!(f, "[ERROR] ")?,
            LogLevel::Warning => write!(f, "[WARNING] ")?,
            LogLevel::Info => write!(f, "[INFO] ")?,
            LogLevel::Debug => write!(f, "[DEBUG] ")?,
        };
        if let Some(id) = &self.segment_id {
            write!(f, "segment {id}: ")?;
        }
        write!(f, "{}: {}", self.source, self.message)
    }
}

/// Process-wide logger: a broadcast feed that anyone can subscribe to,
/// plus a copy printed to stdout. Mirrors the teacher's `log::Logger`.
pub struct Logger {
    feed: broadcast::Sender<LogEntryWithTime>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    #[must_use]
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(256);
        Self { feed }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntryWithTime> {
        self.feed.subscribe()
    }
}

impl ILogger for Logger {
    fn log(&self, entry: LogEntry) {
        let entry = LogEntryWithTime {
            level: entry.level,
            source: entry.source,
            segment_id: entry.segment_id,
            message: entry.message,
            time: UnixMicro::now(),
        };
        println!("{entry}");
        self.feed.send(entry).ok();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn logger_broadcasts_to_subscribers() {
        let logger = Logger::new();
        let mut feed = logger.subscribe();

        logger.log(LogEntry::new(
            LogLevel::Info,
            "window",
            Some(SegmentId(3)),
            "loaded",
        ));

        let got = feed.recv().await.expect("should receive");
        assert_eq!(got.source, "window");
        assert_eq!(got.segment_id, Some(SegmentId(3)));
        assert_eq!(got.message, "loaded");
    }
}
