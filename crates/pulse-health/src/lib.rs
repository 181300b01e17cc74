//! pulse-health — service health monitoring for pulsewatch.
//!
//! Each configured service gets one worker task. A worker probes its URL,
//! evaluates the service's condition tree against the outcome, and feeds
//! the verdict to a [`HealthTracker`]. When consecutive failures reach the
//! threshold the worker fans an alert out to the service's targets, resets
//! its count and backs off.
//!
//! # Architecture
//!
//! ```text
//! Supervisor (shared watch shutdown)
//!   └── ServiceMonitor task per service
//!       ├── http_probe() → Probe { outcome, elapsed }
//!       ├── ConditionNode::evaluate → EvaluationResult
//!       ├── HealthTracker::record → Transition
//!       ├── EventSink (FAIL / SUCCESS / THRESHOLD-REACHED / RECOVERED)
//!       └── pulse_notify::fan_out on ThresholdReached
//! ```

pub mod event;
pub mod monitor;
pub mod probe;
pub mod supervisor;
pub mod tracker;

pub use event::{EventKind, EventSink, MonitorEvent, TracingSink};
pub use monitor::{CycleReport, MonitorError, MonitorResult, ServiceMonitor};
pub use probe::{ProbeError, http_probe};
pub use supervisor::{Supervisor, WorkerExit};
pub use tracker::{HealthTracker, Transition};
