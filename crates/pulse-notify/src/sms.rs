//! IPPanel pattern SMS.
//!
//! One `POST` per phone number with a JSON body naming the pattern and
//! filling its single variable with the service name. The gateway answers
//! 200 on acceptance; anything else is a failure.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Method, Request};
use pulse_core::{HttpClient, IpPanelSpec};
use serde::Serialize;
use tracing::debug;

use crate::error::{NotifyError, NotifyResult};
use crate::notifier::{BoxFuture, Notifier, deliver_all};
use crate::record::NotificationRecord;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendSmsRequest<'a> {
    op: &'static str,
    user: &'a str,
    pass: &'a str,
    from_num: &'a str,
    to_num: &'a str,
    pattern_code: &'a str,
    input_data: Vec<BTreeMap<&'a str, &'a str>>,
}

pub struct SmsNotifier {
    name: String,
    inner: Arc<SmsInner>,
}

struct SmsInner {
    spec: IpPanelSpec,
    client: HttpClient,
}

impl SmsNotifier {
    pub fn new(spec: IpPanelSpec, client: HttpClient) -> Self {
        Self {
            name: format!("ippanel({})", spec.id),
            inner: Arc::new(SmsInner { spec, client }),
        }
    }
}

impl Notifier for SmsNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn notify<'a>(&'a self, record: &'a NotificationRecord) -> BoxFuture<'a, NotifyResult<()>> {
        Box::pin(async move {
            let inner = self.inner.clone();
            let service = record.service_name.clone();
            deliver_all(&self.name, &record.recipients, move |number| {
                let inner = inner.clone();
                let service = service.clone();
                async move { inner.send(&number, &service).await }
            })
            .await
        })
    }
}

impl SmsInner {
    fn payload(&self, number: &str, service: &str) -> NotifyResult<Vec<u8>> {
        let request = SendSmsRequest {
            op: "pattern",
            user: &self.spec.user,
            pass: &self.spec.pass,
            from_num: &self.spec.sender,
            to_num: number,
            pattern_code: &self.spec.pattern_code,
            input_data: vec![BTreeMap::from([(self.spec.data_key.as_str(), service)])],
        };
        serde_json::to_vec(&request).map_err(|e| NotifyError::Serialize(e.to_string()))
    }

    async fn send(&self, number: &str, service: &str) -> NotifyResult<()> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(self.spec.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(Bytes::from(self.payload(number, service)?))
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        let response = self.client.send(request, self.spec.timeout).await?;
        let body = String::from_utf8_lossy(&response.body).into_owned();
        if response.status.as_u16() != 200 {
            return Err(NotifyError::Status {
                recipient: number.to_string(),
                status: response.status.as_u16(),
                body,
            });
        }
        debug!(gateway = %self.spec.id, %number, %body, "sms sent");
        Ok(())
    }
}
