//! The `Notifier` trait and target fan-out.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use pulse_core::{ConfigResult, HttpClient, Registry, TargetSpec, ValidatedConfig};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{NotifyError, NotifyResult};
use crate::mail::MailNotifier;
use crate::payamak::PayamakNotifier;
use crate::record::NotificationRecord;
use crate::sms::SmsNotifier;
use crate::webhook::WebhookNotifier;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A delivery integration.
///
/// `notify` returns once every recipient in the record has been attempted.
/// An error reports what failed; it never means other recipients were
/// skipped.
pub trait Notifier: Send + Sync {
    /// Identifier for logs, e.g. `webhook(ops-hook)`.
    fn name(&self) -> &str;

    fn notify<'a>(&'a self, record: &'a NotificationRecord) -> BoxFuture<'a, NotifyResult<()>>;
}

pub type SharedNotifier = Arc<dyn Notifier>;

/// Outcome of one fan-out across a service's targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    /// Targets whose notifier returned `Ok`.
    pub delivered: Vec<String>,
    /// Targets whose notifier returned an error.
    pub failed: Vec<String>,
    /// Targets naming a notifier that is not registered.
    pub missing: Vec<String>,
}

impl FanOutReport {
    /// Number of notifiers actually invoked.
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

/// Notify every target in order. Each target gets its own record from
/// `record_for`; a missing notifier or a failed `notify` is logged and
/// does not stop the remaining targets.
pub async fn fan_out<F>(
    notifiers: &Registry<SharedNotifier>,
    targets: &[TargetSpec],
    record_for: F,
) -> FanOutReport
where
    F: Fn(&TargetSpec) -> NotificationRecord,
{
    let mut report = FanOutReport::default();
    for target in targets {
        let Some(notifier) = notifiers.get(&target.notifier) else {
            warn!(notifier = %target.notifier, "notifier not found, skipping target");
            report.missing.push(target.notifier.clone());
            continue;
        };

        let record = record_for(target);
        match notifier.notify(&record).await {
            Ok(()) => {
                info!(
                    notifier = %notifier.name(),
                    service = %record.service_name,
                    recipients = record.recipients.len(),
                    "notification sent"
                );
                report.delivered.push(target.notifier.clone());
            }
            Err(e) => {
                warn!(
                    notifier = %notifier.name(),
                    service = %record.service_name,
                    error = %e,
                    "notification failed"
                );
                report.failed.push(target.notifier.clone());
            }
        }
    }
    report
}

/// Run `send` for every recipient concurrently and wait for all of them.
pub(crate) async fn deliver_all<F, Fut>(
    notifier: &str,
    recipients: &[String],
    send: F,
) -> NotifyResult<()>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = NotifyResult<()>> + Send + 'static,
{
    let mut set = JoinSet::new();
    for recipient in recipients {
        let delivery = send(recipient.clone());
        let recipient = recipient.clone();
        set.spawn(async move { (recipient, delivery.await) });
    }

    let mut failures = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((recipient, Ok(()))) => {
                debug!(notifier = %notifier, %recipient, "delivered");
            }
            Ok((recipient, Err(e))) => {
                warn!(notifier = %notifier, %recipient, error = %e, "delivery failed");
                failures.push(format!("{recipient}: {e}"));
            }
            Err(e) => {
                warn!(notifier = %notifier, error = %e, "delivery task aborted");
                failures.push(e.to_string());
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(NotifyError::Delivery {
            notifier: notifier.to_string(),
            failed: failures.len(),
            total: recipients.len(),
            detail: failures.join("; "),
        })
    }
}

/// Instantiate every configured notifier into a frozen registry.
pub fn build_notifiers(
    config: &ValidatedConfig,
    client: &HttpClient,
) -> ConfigResult<Registry<SharedNotifier>> {
    let mut builder = Registry::builder("notifier");
    for spec in &config.webhooks {
        let notifier: SharedNotifier = Arc::new(WebhookNotifier::new(spec.clone(), client.clone()));
        builder.register(spec.id.clone(), notifier)?;
        debug!(id = %spec.id, kind = "webhook", "notifier registered");
    }
    for spec in &config.ippanels {
        let notifier: SharedNotifier = Arc::new(SmsNotifier::new(spec.clone(), client.clone()));
        builder.register(spec.id.clone(), notifier)?;
        debug!(id = %spec.id, kind = "ippanel", "notifier registered");
    }
    for spec in &config.payamaks {
        let notifier: SharedNotifier = Arc::new(PayamakNotifier::new(spec.clone(), client.clone()));
        builder.register(spec.id.clone(), notifier)?;
        debug!(id = %spec.id, kind = "payamak", "notifier registered");
    }
    for spec in &config.smtps {
        let notifier: SharedNotifier = Arc::new(MailNotifier::new(spec.clone())?);
        builder.register(spec.id.clone(), notifier)?;
        debug!(id = %spec.id, kind = "smtp", server = %spec.server, "notifier registered");
    }
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every call; fails when `fail` is set.
    struct FakeNotifier {
        name: String,
        fail: bool,
        calls: Mutex<Vec<NotificationRecord>>,
    }

    impl FakeNotifier {
        fn new(name: &str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                fail,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<NotificationRecord> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Notifier for FakeNotifier {
        fn name(&self) -> &str {
            &self.name
        }

        fn notify<'a>(&'a self, record: &'a NotificationRecord) -> BoxFuture<'a, NotifyResult<()>> {
            Box::pin(async move {
                self.calls.lock().unwrap().push(record.clone());
                if self.fail {
                    Err(NotifyError::Request("gateway down".to_string()))
                } else {
                    Ok(())
                }
            })
        }
    }

    fn record_for(target: &TargetSpec) -> NotificationRecord {
        NotificationRecord {
            service_name: "api".to_string(),
            service_url: "http://api/health".to_string(),
            recipients: target.recipients.clone(),
            reason: "expected status code 200, got 500".to_string(),
            status_code: Some(500),
            response_time: "12ms".to_string(),
            failures: 3,
        }
    }

    fn target(notifier: &str, recipients: &[&str]) -> TargetSpec {
        TargetSpec {
            notifier: notifier.to_string(),
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn failing_target_does_not_block_others() {
        let first = FakeNotifier::new("first", true);
        let second = FakeNotifier::new("second", false);
        let mut builder = Registry::builder("notifier");
        builder.register("first", first.clone() as SharedNotifier).unwrap();
        builder.register("second", second.clone() as SharedNotifier).unwrap();
        let registry = builder.build();

        let targets = vec![
            target("first", &["a"]),
            target("ghost", &["b"]),
            target("second", &["c", "d"]),
        ];
        let report = fan_out(&registry, &targets, record_for).await;

        assert_eq!(report.failed, vec!["first"]);
        assert_eq!(report.missing, vec!["ghost"]);
        assert_eq!(report.delivered, vec!["second"]);
        assert_eq!(report.attempted(), 2);

        assert_eq!(first.calls().len(), 1);
        let calls = second.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].recipients, vec!["c", "d"]);
    }

    #[tokio::test]
    async fn no_targets_is_a_no_op() {
        let registry: Registry<SharedNotifier> = Registry::builder("notifier").build();
        let report = fan_out(&registry, &[], record_for).await;
        assert_eq!(report, FanOutReport::default());
    }

    #[tokio::test]
    async fn deliver_all_attempts_every_recipient() {
        let attempted = Arc::new(Mutex::new(Vec::new()));
        let recipients: Vec<String> = ["ok-1", "bad", "ok-2"].iter().map(|s| s.to_string()).collect();

        let seen = attempted.clone();
        let result = deliver_all("test", &recipients, move |recipient| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push(recipient.clone());
                if recipient == "bad" {
                    Err(NotifyError::Request("rejected".to_string()))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        let mut seen = attempted.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["bad", "ok-1", "ok-2"]);
        match result {
            Err(NotifyError::Delivery { failed, total, detail, .. }) => {
                assert_eq!(failed, 1);
                assert_eq!(total, 3);
                assert!(detail.starts_with("bad: "));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn deliver_all_with_no_recipients_succeeds() {
        let result = deliver_all("test", &[], |_| async { Ok(()) }).await;
        assert!(result.is_ok());
    }

    #[test]
    fn build_notifiers_registers_every_kind() {
        let config = pulse_core::PulseConfig::from_toml(
            r#"
[[notifiers.webhooks]]
id = "hook"
json = { text = "{{ .ServiceName }}" }

[[notifiers.ippanels]]
id = "sms"
url = "http://sms.local/api"
user = "u"
pass = "p"
sender = "100"
pattern_code = "pat"

[[notifiers.payamaks]]
id = "meli"
username = "u"
password = "p"
sender = "5000"

[[notifiers.smtps]]
id = "mail"
server = "smtp.example.com"
sender = "alerts@example.com"
"#,
        )
        .unwrap()
        .validate()
        .unwrap();

        let registry = build_notifiers(&config, &HttpClient::new().unwrap()).unwrap();
        assert_eq!(registry.names(), vec!["hook", "mail", "meli", "sms"]);
        assert_eq!(registry.get("hook").unwrap().name(), "webhook(hook)");
        assert_eq!(registry.get("sms").unwrap().name(), "ippanel(sms)");
        assert_eq!(registry.get("meli").unwrap().name(), "payamak(meli)");
        assert_eq!(registry.get("mail").unwrap().name(), "smtp(mail)");
    }
}
