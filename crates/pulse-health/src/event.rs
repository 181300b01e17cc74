//! Structured monitor events and where they go.

use std::fmt;
use std::time::Duration;

use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Fail,
    Success,
    ThresholdReached,
    Recovered,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventKind::Fail => "FAIL",
            EventKind::Success => "SUCCESS",
            EventKind::ThresholdReached => "THRESHOLD-REACHED",
            EventKind::Recovered => "RECOVERED",
        })
    }
}

/// One event emitted by a service worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorEvent {
    pub kind: EventKind,
    pub service: String,
    pub failures: u32,
    pub status_code: Option<u16>,
    pub elapsed: Duration,
    pub reason: String,
}

/// Receives every event a worker emits. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &MonitorEvent);
}

/// Default sink: one `tracing` event per monitor event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &MonitorEvent) {
        let status = event.status_code.map(i64::from).unwrap_or(-1);
        match event.kind {
            EventKind::Success | EventKind::Recovered => info!(
                event = %event.kind,
                service = %event.service,
                failures = event.failures,
                status,
                elapsed = ?event.elapsed,
                "check passed"
            ),
            EventKind::Fail | EventKind::ThresholdReached => warn!(
                event = %event.kind,
                service = %event.service,
                failures = event.failures,
                status,
                elapsed = ?event.elapsed,
                reason = %event.reason,
                "check failed"
            ),
        }
    }
}
