//! pulse-notify — alert delivery for pulsewatch.
//!
//! # Architecture
//!
//! ```text
//! ServiceMonitor (threshold reached)
//!   └── fan_out(registry, targets, record)
//!         ├── target "ops-hook" → WebhookNotifier::notify ─┬─ recipient 1
//!         │                                               └─ recipient 2
//!         ├── target "sms"      → SmsNotifier::notify ─────── recipient 1
//!         ├── target "meli"     → PayamakNotifier::notify ─── recipient 1
//!         └── target "mail"     → MailNotifier::notify ────── recipient 1
//! ```
//!
//! Targets are attempted one after another and never affect each other: a
//! missing notifier or a failed delivery is logged and the next target is
//! tried. Inside a single `notify` call recipients are sent concurrently
//! and the call returns once every recipient has been attempted.

pub mod error;
pub mod mail;
pub mod notifier;
pub mod payamak;
pub mod record;
pub mod sms;
pub mod webhook;

pub use error::{NotifyError, NotifyResult};
pub use mail::MailNotifier;
pub use notifier::{FanOutReport, Notifier, SharedNotifier, build_notifiers, fan_out};
pub use payamak::PayamakNotifier;
pub use record::NotificationRecord;
pub use sms::SmsNotifier;
pub use webhook::WebhookNotifier;
