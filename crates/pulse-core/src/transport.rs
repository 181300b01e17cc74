//! One-shot HTTP/1.1 client.
//!
//! Every call opens a fresh TCP connection (wrapped in rustls for `https`),
//! performs a single request, reads the whole body and drops the
//! connection before returning. There is no pooling and no retry: the
//! callers own their retry policy.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{HOST, USER_AGENT};
use http::{HeaderMap, HeaderValue, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

/// Result type alias for HTTP operations.
pub type HttpResult<T> = Result<T, HttpError>;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported url scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("tls configuration error: {0}")]
    Config(String),

    #[error("connect to {addr} failed: {reason}")]
    Connect { addr: String, reason: String },

    #[error("tls handshake with {host} failed: {reason}")]
    Tls { host: String, reason: String },

    #[error("http handshake failed: {0}")]
    Handshake(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl HttpError {
    /// Whether retrying can never help: the target itself is malformed.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            HttpError::InvalidUrl { .. } | HttpError::UnsupportedScheme(_)
        )
    }
}

/// A fully read response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Where a request goes, split out of its URL.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    tls: bool,
    host: String,
    port: u16,
    authority: String,
    path_and_query: String,
}

impl Target {
    fn from_uri(uri: &Uri) -> HttpResult<Self> {
        let invalid = |reason: &str| HttpError::InvalidUrl {
            url: uri.to_string(),
            reason: reason.to_string(),
        };

        let tls = match uri.scheme_str() {
            Some("http") => false,
            Some("https") => true,
            Some(other) => return Err(HttpError::UnsupportedScheme(other.to_string())),
            None => return Err(invalid("missing scheme")),
        };
        let authority = uri.authority().ok_or_else(|| invalid("missing host"))?;
        let host = authority
            .host()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let port = authority.port_u16().unwrap_or(if tls { 443 } else { 80 });
        let path_and_query = match uri.path_and_query().map(|p| p.as_str()) {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => "/".to_string(),
        };

        Ok(Self {
            tls,
            host,
            port,
            authority: authority.as_str().to_string(),
            path_and_query,
        })
    }
}

/// Parse and check a URL the client can reach.
pub fn parse_url(url: &str) -> HttpResult<Uri> {
    let uri = Uri::from_str(url).map_err(|e| HttpError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    Target::from_uri(&uri)?;
    Ok(uri)
}

/// HTTP client handle. Cheap to clone; clones share the TLS config.
#[derive(Clone)]
pub struct HttpClient {
    tls: TlsConnector,
    user_agent: String,
}

impl HttpClient {
    /// Create a client trusting the Mozilla root certificate store.
    pub fn new() -> HttpResult<Self> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = rustls::ClientConfig::builder_with_provider(
            rustls::crypto::ring::default_provider().into(),
        )
        .with_safe_default_protocol_versions()
        .map_err(|e| HttpError::Config(e.to_string()))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

        Ok(Self::with_tls_config(Arc::new(config)))
    }

    /// Create a client from a pre-built rustls configuration.
    pub fn with_tls_config(config: Arc<rustls::ClientConfig>) -> Self {
        Self {
            tls: TlsConnector::from(config),
            user_agent: default_user_agent(),
        }
    }

    /// Send one request. `timeout` bounds everything from connect to the
    /// last body byte.
    pub async fn send(&self, request: Request<Bytes>, timeout: Duration) -> HttpResult<HttpResponse> {
        match tokio::time::timeout(timeout, self.exchange(request)).await {
            Ok(result) => result,
            Err(_) => Err(HttpError::Timeout(timeout)),
        }
    }

    async fn exchange(&self, request: Request<Bytes>) -> HttpResult<HttpResponse> {
        let target = Target::from_uri(request.uri())?;
        let (mut parts, body) = request.into_parts();

        // Origin-form on the wire; the authority moves to the Host header.
        parts.uri = Uri::from_str(&target.path_and_query).map_err(|e| HttpError::InvalidUrl {
            url: target.path_and_query.clone(),
            reason: e.to_string(),
        })?;
        if !parts.headers.contains_key(HOST) {
            let host = HeaderValue::from_str(&target.authority).map_err(|e| HttpError::InvalidUrl {
                url: target.authority.clone(),
                reason: e.to_string(),
            })?;
            parts.headers.insert(HOST, host);
        }
        if !parts.headers.contains_key(USER_AGENT) {
            if let Ok(ua) = HeaderValue::from_str(&self.user_agent) {
                parts.headers.insert(USER_AGENT, ua);
            }
        }
        let request = Request::from_parts(parts, Full::new(body));

        let addr = format!("{}:{}", target.host, target.port);
        let stream = TcpStream::connect((target.host.as_str(), target.port))
            .await
            .map_err(|e| HttpError::Connect {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;

        if !target.tls {
            return send_over(stream, request).await;
        }

        let server_name = rustls::pki_types::ServerName::try_from(target.host.as_str())
            .map_err(|e| HttpError::Tls {
                host: target.host.clone(),
                reason: e.to_string(),
            })?
            .to_owned();
        let stream = self
            .tls
            .connect(server_name, stream)
            .await
            .map_err(|e| HttpError::Tls {
                host: target.host.clone(),
                reason: e.to_string(),
            })?;
        send_over(stream, request).await
    }
}

async fn send_over<S>(io: S, request: Request<Full<Bytes>>) -> HttpResult<HttpResponse>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(io))
        .await
        .map_err(|e| HttpError::Handshake(e.to_string()))?;

    // Drive the connection until the sender is dropped.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "http connection closed with error");
        }
    });

    let response = sender
        .send_request(request)
        .await
        .map_err(|e| HttpError::Request(e.to_string()))?;
    let (parts, body) = response.into_parts();
    let body = body
        .collect()
        .await
        .map_err(|e| HttpError::Body(e.to_string()))?
        .to_bytes();

    Ok(HttpResponse {
        status: parts.status,
        headers: parts.headers,
        body,
    })
}

fn default_user_agent() -> String {
    format!("pulsewatch/{}", env!("CARGO_PKG_VERSION"))
}
