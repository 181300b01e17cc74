//! pulse-core — shared building blocks for pulsewatch.
//!
//! Holds everything the monitor workers read but never mutate:
//!
//! - `config`: the TOML file model and its validation into runtime specs
//! - `condition`: the composable health condition tree and its evaluator
//! - `registry`: immutable name → instance lookup tables
//! - `transport`: a one-shot HTTP/1.1 client (plain TCP or rustls)
//! - `template`: `{{ .Field }}` placeholder rendering for notifier payloads

pub mod condition;
pub mod config;
pub mod duration;
pub mod error;
pub mod outcome;
pub mod registry;
pub mod template;
pub mod transport;

pub use condition::{ConditionNode, ConditionSpec, EvaluationResult};
pub use config::{
    IpPanelSpec, PayamakSpec, PulseConfig, ServiceSpec, SmtpSecurity, SmtpSpec, TargetSpec,
    ValidatedConfig, WebhookSpec,
};
pub use duration::{DurationError, parse_duration};
pub use error::{ConfigError, ConfigResult};
pub use outcome::{Probe, ProbeOutcome};
pub use registry::{Registry, RegistryBuilder};
pub use transport::{HttpClient, HttpError, HttpResponse, HttpResult, parse_url};
