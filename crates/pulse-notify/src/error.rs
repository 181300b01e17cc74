//! Notifier error types.

use pulse_core::HttpError;
use pulse_core::template::TemplateError;
use thiserror::Error;

pub type NotifyResult<T> = Result<T, NotifyError>;

/// Errors that can occur while delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    #[error("transport error: {0}")]
    Http(#[from] HttpError),

    #[error("failed to build request: {0}")]
    Request(String),

    #[error("failed to serialize payload: {0}")]
    Serialize(String),

    #[error("{recipient} answered {status}: {body}")]
    Status {
        recipient: String,
        status: u16,
        body: String,
    },

    #[error("{recipient} rejected the message: {reason}")]
    Rejected { recipient: String, reason: String },

    #[error("smtp error: {0}")]
    Mail(String),

    #[error("{notifier}: {failed} of {total} deliveries failed: {detail}")]
    Delivery {
        notifier: String,
        failed: usize,
        total: usize,
        detail: String,
    },
}
