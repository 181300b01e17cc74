//! Single-shot HTTP probe.

use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::USER_AGENT;
use http::{Request, Uri};
use pulse_core::{HttpClient, Probe, ProbeOutcome};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ProbeError {
    /// The target can never be requested; retrying is pointless.
    #[error("invalid probe target '{url}': {reason}")]
    InvalidTarget { url: String, reason: String },
}

/// Issue exactly one `GET url` and report what happened.
///
/// Transport failures (refused, DNS, TLS, timeout) come back as
/// [`ProbeOutcome::NetworkError`]; only a malformed target is an `Err`.
/// `elapsed` runs from just before dispatch to the last body byte or the
/// failure, whichever ends the attempt.
pub async fn http_probe(
    client: &HttpClient,
    url: &Uri,
    timeout: Duration,
    user_agent: Option<&str>,
) -> Result<Probe, ProbeError> {
    let mut builder = Request::get(url.clone());
    if let Some(ua) = user_agent {
        builder = builder.header(USER_AGENT, ua);
    }
    let request = builder
        .body(Bytes::new())
        .map_err(|e| ProbeError::InvalidTarget {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let start = Instant::now();
    let result = client.send(request, timeout).await;
    let elapsed = start.elapsed();

    let outcome = match result {
        Ok(response) => ProbeOutcome::Response {
            status: response.status.as_u16(),
            headers: response.headers,
            body: response.body,
            latency: elapsed,
        },
        Err(e) if e.is_permanent() => {
            return Err(ProbeError::InvalidTarget {
                url: url.to_string(),
                reason: e.to_string(),
            });
        }
        Err(e) => {
            debug!(%url, error = %e, "probe got no response");
            ProbeOutcome::NetworkError {
                message: e.to_string(),
            }
        }
    };

    Ok(Probe { outcome, elapsed })
}
