//! Throughput report lines.
//!
//! ```text
//! <epochMillis> client: hostName=<h>, event=<e>, readTime=<s>, readThroughput=<MB/s>, writeTime=<s>, writeThroughput=<MB/s>
//! ```
//!
//! These lines are the output other tooling parses; they go to stdout and
//! nowhere else.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::transfer::{Direction, TransferStats};

const ONE_MB: f64 = (1024 * 1024) as f64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportEvent {
    Start,
    End,
    Read,
    Write,
}

impl ReportEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportEvent::Start => "start",
            ReportEvent::End => "end",
            ReportEvent::Read => "read",
            ReportEvent::Write => "write",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportLine {
    timestamp_ms: u128,
    hostname: String,
    event: ReportEvent,
    stats: Option<TransferStats>,
}

impl ReportLine {
    pub fn start(hostname: &str) -> Self {
        Self::new(hostname, ReportEvent::Start, None)
    }

    pub fn end(hostname: &str) -> Self {
        Self::new(hostname, ReportEvent::End, None)
    }

    pub fn transfer(hostname: &str, direction: Direction, stats: TransferStats) -> Self {
        let event = match direction {
            Direction::Read => ReportEvent::Read,
            Direction::Write => ReportEvent::Write,
        };
        Self::new(hostname, event, Some(stats))
    }

    fn new(hostname: &str, event: ReportEvent, stats: Option<TransferStats>) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        Self {
            timestamp_ms,
            hostname: hostname.to_string(),
            event,
            stats,
        }
    }

    pub fn with_timestamp(mut self, timestamp_ms: u128) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    pub fn event(&self) -> ReportEvent {
        self.event
    }

    /// Print to stdout.
    pub fn emit(&self) {
        println!("{self}");
    }

    fn side(&self, event: ReportEvent) -> (String, String) {
        match self.stats {
            Some(stats) if self.event == event => (
                stats.elapsed.as_secs().to_string(),
                format!("{:.6}", throughput_mb_s(stats.bytes, stats.elapsed)),
            ),
            _ => ("0".to_string(), "0".to_string()),
        }
    }
}

impl fmt::Display for ReportLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (read_time, read_throughput) = self.side(ReportEvent::Read);
        let (write_time, write_throughput) = self.side(ReportEvent::Write);
        write!(
            f,
            "{} client: hostName={}, event={}, readTime={}, readThroughput={}, writeTime={}, writeThroughput={}",
            self.timestamp_ms,
            self.hostname,
            self.event.as_str(),
            read_time,
            read_throughput,
            write_time,
            write_throughput
        )
    }
}

/// MiB per second, using sub-second precision. Zero elapsed time yields 0.
pub fn throughput_mb_s(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    bytes as f64 / ONE_MB / secs
}
