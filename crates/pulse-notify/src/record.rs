//! The record handed to notifiers when a service crosses its threshold.

use chrono::{SecondsFormat, Utc};
use pulse_core::template::TemplateContext;

/// What went wrong, and who to tell. Built once per target at the
/// threshold crossing and never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRecord {
    pub service_name: String,
    pub service_url: String,
    pub recipients: Vec<String>,
    /// Reason of the failure that crossed the threshold.
    pub reason: String,
    /// Status of the last probe, `None` when it got no response.
    pub status_code: Option<u16>,
    /// Elapsed time of the last probe, formatted (`"1.2s"`, `"340ms"`).
    pub response_time: String,
    /// Consecutive failures counted at the crossing.
    pub failures: u32,
}

impl NotificationRecord {
    /// Template values for this record, stamped with the current time.
    /// `URL` starts as the service URL; notifiers that address recipients
    /// by URL overwrite it.
    pub fn template_context(&self) -> TemplateContext {
        TemplateContext {
            service_name: self.service_name.clone(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            url: self.service_url.clone(),
            reason: self.reason.clone(),
            status_code: self
                .status_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none".to_string()),
            response_time: self.response_time.clone(),
        }
    }
}
