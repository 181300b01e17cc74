//! What a single probe produced.

use std::time::Duration;

use bytes::Bytes;
use http::HeaderMap;

/// Outcome of one probe attempt. Exactly one variant holds.
#[derive(Debug, Clone)]
pub enum ProbeOutcome {
    /// The request never produced a response (DNS, refused, TLS, timeout).
    NetworkError { message: String },
    /// A complete response with its body fully read.
    Response {
        status: u16,
        headers: HeaderMap,
        body: Bytes,
        latency: Duration,
    },
}

impl ProbeOutcome {
    /// Status code of the response, if there was one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProbeOutcome::Response { status, .. } => Some(*status),
            ProbeOutcome::NetworkError { .. } => None,
        }
    }

    pub fn is_network_error(&self) -> bool {
        matches!(self, ProbeOutcome::NetworkError { .. })
    }
}

/// A probe outcome paired with the elapsed time of the attempt.
///
/// `elapsed` is measured for failed attempts too, so response-time
/// conditions can judge a slow timeout.
#[derive(Debug, Clone)]
pub struct Probe {
    pub outcome: ProbeOutcome,
    pub elapsed: Duration,
}
