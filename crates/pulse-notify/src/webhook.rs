//! Templated JSON webhooks.
//!
//! Each recipient is a URL. The configured headers and JSON body are
//! rendered per recipient with `URL` set to that recipient, then sent
//! with the configured method. Any non-2xx answer counts as a failure.

use std::sync::Arc;

use bytes::Bytes;
use http::Request;
use http::header::CONTENT_TYPE;
use pulse_core::template::{self, TemplateContext};
use pulse_core::{HttpClient, WebhookSpec, parse_url};
use tracing::debug;

use crate::error::{NotifyError, NotifyResult};
use crate::notifier::{BoxFuture, Notifier, deliver_all};
use crate::record::NotificationRecord;

/// Longest response body kept in a `Status` error.
const MAX_ERROR_BODY: usize = 256;

pub struct WebhookNotifier {
    name: String,
    inner: Arc<WebhookInner>,
}

struct WebhookInner {
    spec: WebhookSpec,
    client: HttpClient,
}

impl WebhookNotifier {
    pub fn new(spec: WebhookSpec, client: HttpClient) -> Self {
        Self {
            name: format!("webhook({})", spec.id),
            inner: Arc::new(WebhookInner { spec, client }),
        }
    }
}

impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn notify<'a>(&'a self, record: &'a NotificationRecord) -> BoxFuture<'a, NotifyResult<()>> {
        Box::pin(async move {
            let base = record.template_context();
            let inner = self.inner.clone();
            deliver_all(&self.name, &record.recipients, move |recipient| {
                let inner = inner.clone();
                let mut ctx = base.clone();
                async move {
                    ctx.url = recipient.clone();
                    inner.deliver(&recipient, &ctx).await
                }
            })
            .await
        })
    }
}

impl WebhookInner {
    fn build_request(&self, recipient: &str, ctx: &TemplateContext) -> NotifyResult<Request<Bytes>> {
        let url = parse_url(recipient)?;
        let body = template::render_json(&self.spec.json, ctx)?;
        let payload = serde_json::to_vec(&body).map_err(|e| NotifyError::Serialize(e.to_string()))?;

        let mut builder = Request::builder().method(self.spec.method.clone()).uri(url);
        let mut has_content_type = false;
        for (name, value) in &self.spec.headers {
            if name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()) {
                has_content_type = true;
            }
            builder = builder.header(name.as_str(), template::render(value, ctx)?);
        }
        if !has_content_type {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }

        builder
            .body(Bytes::from(payload))
            .map_err(|e| NotifyError::Request(e.to_string()))
    }

    async fn deliver(&self, recipient: &str, ctx: &TemplateContext) -> NotifyResult<()> {
        let request = self.build_request(recipient, ctx)?;
        let response = self.client.send(request, self.spec.timeout).await?;
        if !response.status.is_success() {
            let body: String = String::from_utf8_lossy(&response.body)
                .chars()
                .take(MAX_ERROR_BODY)
                .collect();
            return Err(NotifyError::Status {
                recipient: recipient.to_string(),
                status: response.status.as_u16(),
                body,
            });
        }
        debug!(webhook = %self.spec.id, %recipient, status = response.status.as_u16(), "webhook accepted");
        Ok(())
    }
}
