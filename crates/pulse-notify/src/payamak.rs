//! Meli Payamak SMS.
//!
//! One form-encoded `POST` per phone number carrying the account
//! credentials, the sender line and the rendered text. The panel answers
//! 200 with a JSON status; a `RetStatus` other than 1 means the message was
//! refused even though the request went through.

use std::sync::Arc;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Method, Request};
use pulse_core::template;
use pulse_core::{HttpClient, PayamakSpec};
use serde::Deserialize;
use tracing::debug;
use url::form_urlencoded;

use crate::error::{NotifyError, NotifyResult};
use crate::notifier::{BoxFuture, Notifier, deliver_all};
use crate::record::NotificationRecord;

/// Longest response body kept in a `Status` error.
const MAX_ERROR_BODY: usize = 256;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SendSmsResponse {
    ret_status: i64,
    #[serde(default)]
    str_ret_status: String,
}

pub struct PayamakNotifier {
    name: String,
    inner: Arc<PayamakInner>,
}

struct PayamakInner {
    spec: PayamakSpec,
    client: HttpClient,
}

impl PayamakNotifier {
    pub fn new(spec: PayamakSpec, client: HttpClient) -> Self {
        Self {
            name: format!("payamak({})", spec.id),
            inner: Arc::new(PayamakInner { spec, client }),
        }
    }
}

impl Notifier for PayamakNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn notify<'a>(&'a self, record: &'a NotificationRecord) -> BoxFuture<'a, NotifyResult<()>> {
        Box::pin(async move {
            let text = template::render(&self.inner.spec.text, &record.template_context())?;
            let inner = self.inner.clone();
            deliver_all(&self.name, &record.recipients, move |number| {
                let inner = inner.clone();
                let text = text.clone();
                async move { inner.send(&number, &text).await }
            })
            .await
        })
    }
}

impl PayamakInner {
    fn form(&self, number: &str, text: &str) -> String {
        form_urlencoded::Serializer::new(String::new())
            .append_pair("username", &self.spec.username)
            .append_pair("password", &self.spec.password)
            .append_pair("to", number)
            .append_pair("from", &self.spec.sender)
            .append_pair("text", text)
            .append_pair("isFlash", "false")
            .finish()
    }

    async fn send(&self, number: &str, text: &str) -> NotifyResult<()> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(self.spec.url.clone())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Bytes::from(self.form(number, text)))
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        let response = self.client.send(request, self.spec.timeout).await?;
        if !response.status.is_success() {
            return Err(NotifyError::Status {
                recipient: number.to_string(),
                status: response.status.as_u16(),
                body: String::from_utf8_lossy(&response.body)
                    .chars()
                    .take(MAX_ERROR_BODY)
                    .collect(),
            });
        }
        // Bodies that are not the usual JSON status are taken as accepted.
        if let Ok(answer) = serde_json::from_slice::<SendSmsResponse>(&response.body) {
            if answer.ret_status != 1 {
                return Err(NotifyError::Rejected {
                    recipient: number.to_string(),
                    reason: format!("RetStatus {} {}", answer.ret_status, answer.str_ret_status),
                });
            }
        }
        debug!(panel = %self.spec.id, %number, "sms sent");
        Ok(())
    }
}
