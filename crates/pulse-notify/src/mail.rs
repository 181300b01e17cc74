//! SMTP mail.
//!
//! Each recipient is an email address and gets its own message over its
//! own SMTP session. Subject and body are rendered once per alert.

use std::sync::Arc;

use lettre::address::AddressError;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use pulse_core::template;
use pulse_core::{ConfigError, ConfigResult, SmtpSecurity, SmtpSpec};
use tracing::debug;

use crate::error::{NotifyError, NotifyResult};
use crate::notifier::{BoxFuture, Notifier, deliver_all};
use crate::record::NotificationRecord;

pub struct MailNotifier {
    name: String,
    inner: Arc<MailInner>,
}

struct MailInner {
    spec: SmtpSpec,
    sender: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl MailNotifier {
    /// Fails when the sender is not a usable mailbox or the relay cannot
    /// be set up for the configured security.
    pub fn new(spec: SmtpSpec) -> ConfigResult<Self> {
        let context = format!("smtp '{}'", spec.id);
        let sender: Mailbox = spec.sender.parse().map_err(|e: AddressError| ConfigError::Invalid {
            context: format!("{context} sender '{}'", spec.sender),
            reason: e.to_string(),
        })?;

        type Transport = AsyncSmtpTransport<Tokio1Executor>;
        let builder = match spec.security {
            SmtpSecurity::StartTls => Transport::starttls_relay(&spec.server),
            SmtpSecurity::Tls => Transport::relay(&spec.server),
            SmtpSecurity::None => Ok(Transport::builder_dangerous(spec.server.as_str())),
        }
        .map_err(|e| ConfigError::Invalid {
            context: format!("{context} server '{}'", spec.server),
            reason: e.to_string(),
        })?;

        let mut builder = builder.port(spec.port).timeout(Some(spec.timeout));
        if let Some((username, password)) = &spec.credentials {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        let transport = builder.build();

        Ok(Self {
            name: format!("smtp({})", spec.id),
            inner: Arc::new(MailInner {
                spec,
                sender,
                transport,
            }),
        })
    }
}

impl Notifier for MailNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn notify<'a>(&'a self, record: &'a NotificationRecord) -> BoxFuture<'a, NotifyResult<()>> {
        Box::pin(async move {
            let ctx = record.template_context();
            let subject = template::render(&self.inner.spec.subject, &ctx)?;
            let body = template::render(&self.inner.spec.body, &ctx)?;
            let inner = self.inner.clone();
            deliver_all(&self.name, &record.recipients, move |recipient| {
                let inner = inner.clone();
                let subject = subject.clone();
                let body = body.clone();
                async move { inner.send(&recipient, subject, body).await }
            })
            .await
        })
    }
}

impl MailInner {
    fn message(&self, recipient: &str, subject: String, body: String) -> NotifyResult<Message> {
        let to: Mailbox = recipient
            .parse()
            .map_err(|e: AddressError| NotifyError::Request(format!("invalid address: {e}")))?;
        Message::builder()
            .from(self.sender.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| NotifyError::Request(e.to_string()))
    }

    async fn send(&self, recipient: &str, subject: String, body: String) -> NotifyResult<()> {
        let message = self.message(recipient, subject, body)?;
        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Mail(e.to_string()))?;
        debug!(smtp = %self.spec.id, %recipient, code = %response.code(), "mail accepted");
        Ok(())
    }
}
