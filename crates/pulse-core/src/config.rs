//! pulsewatch.toml configuration.
//!
//! `PulseConfig` mirrors the file. `PulseConfig::validate` checks every
//! reference, duration, URL and template up front and produces a
//! `ValidatedConfig`; nothing downstream re-checks configuration.

use std::collections::{BTreeMap, HashSet};
use std::num::NonZeroU32;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use http::{HeaderName, HeaderValue, Method, Uri};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::condition::{ConditionNode, ConditionSpec};
use crate::duration::{DurationError, parse_duration, parse_interval};
use crate::error::{ConfigError, ConfigResult};
use crate::registry::Registry;
use crate::template::{self, TemplateContext};
use crate::transport::parse_url;

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_EXPECTED_STATUS: u16 = 200;
const DEFAULT_PAYAMAK_URL: &str = "https://rest.payamak-panel.com/api/SendSMS/SendSMS";

// ── File model ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PulseConfig {
    #[serde(default)]
    pub conditions: Vec<NamedCondition>,
    #[serde(default)]
    pub notifiers: NotifiersConfig,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedCondition {
    pub id: String,
    pub condition: ConditionSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifiersConfig {
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,
    #[serde(default)]
    pub ippanels: Vec<IpPanelConfig>,
    #[serde(default)]
    pub smtps: Vec<SmtpConfig>,
    #[serde(default)]
    pub payamaks: Vec<PayamakConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub id: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub json: serde_json::Map<String, Value>,
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpPanelConfig {
    pub id: String,
    pub url: String,
    pub user: String,
    pub pass: String,
    pub sender: String,
    pub pattern_code: String,
    #[serde(default = "default_data_key")]
    pub data_key: String,
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub id: String,
    pub server: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// Envelope and `From` address.
    pub sender: String,
    /// Login name; the sender address when unset.
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub security: SmtpSecurity,
    #[serde(default = "default_mail_subject")]
    pub subject: String,
    #[serde(default = "default_mail_body")]
    pub body: String,
    pub timeout: Option<String>,
}

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Plain connection upgraded with `STARTTLS`, which must be offered.
    #[default]
    StartTls,
    /// TLS from the first byte (SMTPS, usually port 465).
    Tls,
    /// No encryption. Only for local relays.
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayamakConfig {
    pub id: String,
    #[serde(default = "default_payamak_url")]
    pub url: String,
    pub username: String,
    pub password: String,
    pub sender: String,
    #[serde(default = "default_payamak_text", alias = "template")]
    pub text: String,
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub url: String,
    pub check_period: String,
    #[serde(alias = "sleep_on_fail")]
    pub failure_backoff: String,
    #[serde(default = "default_threshold")]
    pub threshold: u32,
    pub condition: Option<String>,
    pub expected_status_code: Option<u16>,
    pub timeout: Option<String>,
    pub user_agent: Option<String>,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(alias = "notifier_id")]
    pub notifier: String,
    #[serde(default)]
    pub recipients: Vec<String>,
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_data_key() -> String {
    "app-name".to_string()
}

fn default_threshold() -> u32 {
    1
}

fn default_smtp_port() -> u16 {
    587
}

fn default_mail_subject() -> String {
    "Alert: {{ .ServiceName }}".to_string()
}

fn default_mail_body() -> String {
    "Service {{ .ServiceName }} ({{ .URL }}) is not healthy: {{ .Reason }}".to_string()
}

fn default_payamak_url() -> String {
    DEFAULT_PAYAMAK_URL.to_string()
}

fn default_payamak_text() -> String {
    "Service {{ .ServiceName }} is DOWN!".to_string()
}

// ── Validated model ──────────────────────────────────────────────────

/// Everything a monitor worker needs to know about its service.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub name: String,
    pub url: Uri,
    pub check_period: Duration,
    pub failure_backoff: Duration,
    /// Consecutive failures before alerting.
    pub threshold: NonZeroU32,
    /// Condition id; `None` means "status equals `expected_status_code`".
    pub condition: Option<String>,
    pub expected_status_code: u16,
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub targets: Vec<TargetSpec>,
}

/// One notifier to alert, and who it should reach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub notifier: String,
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct WebhookSpec {
    pub id: String,
    pub method: Method,
    pub headers: BTreeMap<String, String>,
    pub json: Value,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct IpPanelSpec {
    pub id: String,
    pub url: Uri,
    pub user: String,
    pub pass: String,
    pub sender: String,
    pub pattern_code: String,
    pub data_key: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SmtpSpec {
    pub id: String,
    pub server: String,
    pub port: u16,
    pub sender: String,
    /// `(username, password)` when the relay needs a login.
    pub credentials: Option<(String, String)>,
    pub security: SmtpSecurity,
    pub subject: String,
    pub body: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct PayamakSpec {
    pub id: String,
    pub url: Uri,
    pub username: String,
    pub password: String,
    pub sender: String,
    pub text: String,
    pub timeout: Duration,
}

/// A configuration whose every reference resolves.
#[derive(Debug)]
pub struct ValidatedConfig {
    pub conditions: Registry<Arc<ConditionNode>>,
    pub webhooks: Vec<WebhookSpec>,
    pub ippanels: Vec<IpPanelSpec>,
    pub smtps: Vec<SmtpSpec>,
    pub payamaks: Vec<PayamakSpec>,
    pub services: Vec<ServiceSpec>,
}

impl ValidatedConfig {
    pub fn notifier_count(&self) -> usize {
        self.webhooks.len() + self.ippanels.len() + self.smtps.len() + self.payamaks.len()
    }
}

impl PulseConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Check the whole configuration, failing on the first problem.
    pub fn validate(&self) -> ConfigResult<ValidatedConfig> {
        let mut conditions = Registry::builder("condition");
        for named in &self.conditions {
            let node = named.condition.validate(&format!("conditions.{}", named.id))?;
            conditions.register(named.id.clone(), Arc::new(node))?;
        }
        let conditions = conditions.build();

        let mut notifier_ids = HashSet::new();
        let mut claim = |id: &str| {
            if notifier_ids.insert(id.to_string()) {
                Ok(())
            } else {
                Err(ConfigError::Duplicate {
                    kind: "notifier",
                    id: id.to_string(),
                })
            }
        };

        let mut webhooks = Vec::with_capacity(self.notifiers.webhooks.len());
        for hook in &self.notifiers.webhooks {
            claim(&hook.id)?;
            webhooks.push(validate_webhook(hook)?);
        }
        let mut ippanels = Vec::with_capacity(self.notifiers.ippanels.len());
        for panel in &self.notifiers.ippanels {
            claim(&panel.id)?;
            ippanels.push(validate_ippanel(panel)?);
        }
        let mut smtps = Vec::with_capacity(self.notifiers.smtps.len());
        for smtp in &self.notifiers.smtps {
            claim(&smtp.id)?;
            smtps.push(validate_smtp(smtp)?);
        }
        let mut payamaks = Vec::with_capacity(self.notifiers.payamaks.len());
        for panel in &self.notifiers.payamaks {
            claim(&panel.id)?;
            payamaks.push(validate_payamak(panel)?);
        }

        let mut service_names = HashSet::new();
        let mut services = Vec::with_capacity(self.services.len());
        for svc in &self.services {
            if !service_names.insert(svc.name.as_str()) {
                return Err(ConfigError::Duplicate {
                    kind: "service",
                    id: svc.name.clone(),
                });
            }
            services.push(validate_service(svc, &conditions, &notifier_ids)?);
        }

        Ok(ValidatedConfig {
            conditions,
            webhooks,
            ippanels,
            smtps,
            payamaks,
            services,
        })
    }
}

fn duration_field(
    value: &str,
    path: String,
    parse: fn(&str) -> Result<Duration, DurationError>,
) -> ConfigResult<Duration> {
    let d = parse(value).map_err(|e| ConfigError::InvalidDuration {
        path: path.clone(),
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    if d.is_zero() {
        return Err(ConfigError::InvalidDuration {
            path,
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(d)
}

/// Check period and failure backoff: bare integers count as seconds.
fn interval_field(value: &str, path: String) -> ConfigResult<Duration> {
    duration_field(value, path, parse_interval)
}

fn optional_timeout(value: Option<&str>, path: String, default: Duration) -> ConfigResult<Duration> {
    value.map_or(Ok(default), |v| duration_field(v, path, parse_duration))
}

fn url_field(url: &str, context: String) -> ConfigResult<Uri> {
    parse_url(url).map_err(|e| ConfigError::InvalidUrl {
        context,
        url: url.to_string(),
        reason: e.to_string(),
    })
}

fn validate_service(
    svc: &ServiceConfig,
    conditions: &Registry<Arc<ConditionNode>>,
    notifier_ids: &HashSet<String>,
) -> ConfigResult<ServiceSpec> {
    let ctx = format!("services.{}", svc.name);

    let threshold = NonZeroU32::new(svc.threshold).ok_or_else(|| ConfigError::InvalidThreshold {
        service: svc.name.clone(),
    })?;
    let url = url_field(&svc.url, format!("service '{}'", svc.name))?;
    let check_period = interval_field(&svc.check_period, format!("{ctx}.check_period"))?;
    let failure_backoff = interval_field(&svc.failure_backoff, format!("{ctx}.failure_backoff"))?;
    let timeout = optional_timeout(
        svc.timeout.as_deref(),
        format!("{ctx}.timeout"),
        DEFAULT_PROBE_TIMEOUT,
    )?;

    if let Some(ua) = &svc.user_agent {
        HeaderValue::from_str(ua).map_err(|e| ConfigError::Invalid {
            context: format!("{ctx}.user_agent"),
            reason: e.to_string(),
        })?;
    }

    let referrer = format!("service '{}'", svc.name);
    if let Some(id) = &svc.condition {
        conditions.resolve(id, &referrer)?;
    }
    for target in &svc.targets {
        if !notifier_ids.contains(&target.notifier) {
            return Err(ConfigError::UnknownReference {
                kind: "notifier",
                id: target.notifier.clone(),
                referenced_by: referrer,
            });
        }
    }

    Ok(ServiceSpec {
        name: svc.name.clone(),
        url,
        check_period,
        failure_backoff,
        threshold,
        condition: svc.condition.clone(),
        expected_status_code: svc.expected_status_code.unwrap_or(DEFAULT_EXPECTED_STATUS),
        timeout,
        user_agent: svc.user_agent.clone(),
        targets: svc
            .targets
            .iter()
            .map(|t| TargetSpec {
                notifier: t.notifier.clone(),
                recipients: t.recipients.clone(),
            })
            .collect(),
    })
}

fn validate_webhook(hook: &WebhookConfig) -> ConfigResult<WebhookSpec> {
    let context = format!("webhook '{}'", hook.id);

    let method = Method::from_str(&hook.method.to_ascii_uppercase()).map_err(|e| {
        ConfigError::Invalid {
            context: format!("{context} method '{}'", hook.method),
            reason: e.to_string(),
        }
    })?;

    let sample = TemplateContext::sample();
    for (name, value) in &hook.headers {
        HeaderName::from_str(name).map_err(|e| ConfigError::Invalid {
            context: format!("{context} header name '{name}'"),
            reason: e.to_string(),
        })?;
        template::render(value, &sample).map_err(|e| ConfigError::InvalidTemplate {
            context: format!("{context} header '{name}'"),
            reason: e.to_string(),
        })?;
    }
    let json = Value::Object(hook.json.clone());
    template::render_json(&json, &sample).map_err(|e| ConfigError::InvalidTemplate {
        context: format!("{context} json body"),
        reason: e.to_string(),
    })?;

    Ok(WebhookSpec {
        id: hook.id.clone(),
        method,
        headers: hook.headers.clone(),
        json,
        timeout: optional_timeout(
            hook.timeout.as_deref(),
            format!("notifiers.webhooks.{}.timeout", hook.id),
            DEFAULT_NOTIFY_TIMEOUT,
        )?,
    })
}

fn validate_ippanel(panel: &IpPanelConfig) -> ConfigResult<IpPanelSpec> {
    Ok(IpPanelSpec {
        id: panel.id.clone(),
        url: url_field(&panel.url, format!("ippanel '{}'", panel.id))?,
        user: panel.user.clone(),
        pass: panel.pass.clone(),
        sender: panel.sender.clone(),
        pattern_code: panel.pattern_code.clone(),
        data_key: panel.data_key.clone(),
        timeout: optional_timeout(
            panel.timeout.as_deref(),
            format!("notifiers.ippanels.{}.timeout", panel.id),
            DEFAULT_NOTIFY_TIMEOUT,
        )?,
    })
}

fn template_field(value: &str, context: String) -> ConfigResult<()> {
    template::render(value, &TemplateContext::sample())
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidTemplate {
            context,
            reason: e.to_string(),
        })
}

fn validate_smtp(smtp: &SmtpConfig) -> ConfigResult<SmtpSpec> {
    let context = format!("smtp '{}'", smtp.id);

    if smtp.server.trim().is_empty() {
        return Err(ConfigError::Invalid {
            context: format!("{context} server"),
            reason: "must not be empty".to_string(),
        });
    }
    if smtp.port == 0 {
        return Err(ConfigError::Invalid {
            context: format!("{context} port"),
            reason: "must not be 0".to_string(),
        });
    }
    match smtp.sender.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
        _ => {
            return Err(ConfigError::Invalid {
                context: format!("{context} sender '{}'", smtp.sender),
                reason: "expected an email address".to_string(),
            });
        }
    }
    let credentials = match (&smtp.username, &smtp.password) {
        (username, Some(password)) => Some((
            username.clone().unwrap_or_else(|| smtp.sender.clone()),
            password.clone(),
        )),
        (None, None) => None,
        (Some(_), None) => {
            return Err(ConfigError::Invalid {
                context: format!("{context} username"),
                reason: "a username needs a password".to_string(),
            });
        }
    };
    template_field(&smtp.subject, format!("{context} subject"))?;
    template_field(&smtp.body, format!("{context} body"))?;

    Ok(SmtpSpec {
        id: smtp.id.clone(),
        server: smtp.server.clone(),
        port: smtp.port,
        sender: smtp.sender.clone(),
        credentials,
        security: smtp.security,
        subject: smtp.subject.clone(),
        body: smtp.body.clone(),
        timeout: optional_timeout(
            smtp.timeout.as_deref(),
            format!("notifiers.smtps.{}.timeout", smtp.id),
            DEFAULT_NOTIFY_TIMEOUT,
        )?,
    })
}

fn validate_payamak(panel: &PayamakConfig) -> ConfigResult<PayamakSpec> {
    let context = format!("payamak '{}'", panel.id);
    template_field(&panel.text, format!("{context} text"))?;

    Ok(PayamakSpec {
        id: panel.id.clone(),
        url: url_field(&panel.url, context)?,
        username: panel.username.clone(),
        password: panel.password.clone(),
        sender: panel.sender.clone(),
        text: panel.text.clone(),
        timeout: optional_timeout(
            panel.timeout.as_deref(),
            format!("notifiers.payamaks.{}.timeout", panel.id),
            DEFAULT_NOTIFY_TIMEOUT,
        )?,
    })
}
