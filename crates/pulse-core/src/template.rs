//! `{{ .Field }}` placeholder rendering for notifier payloads.
//!
//! Supported fields: `ServiceName`, `TimeStamp`, `URL`, `Reason`,
//! `StatusCode`, `ResponseTime`. Anything else is an error, so templates
//! can be checked once at startup with a sample context.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern compiles")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unknown template field '{0}'")]
    UnknownField(String),

    #[error("malformed placeholder in '{0}'")]
    Malformed(String),
}

/// Values available to templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    pub service_name: String,
    pub timestamp: String,
    pub url: String,
    pub reason: String,
    pub status_code: String,
    pub response_time: String,
}

impl TemplateContext {
    /// A context with every field filled, used to check templates at load.
    pub fn sample() -> Self {
        Self {
            service_name: "test".to_string(),
            timestamp: "1970-01-01T00:00:00Z".to_string(),
            url: "http://localhost/".to_string(),
            reason: "test".to_string(),
            status_code: "500".to_string(),
            response_time: "1s".to_string(),
        }
    }

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "ServiceName" => Some(&self.service_name),
            "TimeStamp" => Some(&self.timestamp),
            "URL" => Some(&self.url),
            "Reason" => Some(&self.reason),
            "StatusCode" => Some(&self.status_code),
            "ResponseTime" => Some(&self.response_time),
            _ => None,
        }
    }
}

/// Substitute every placeholder in `template`.
pub fn render(template: &str, ctx: &TemplateContext) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let whole = caps.get(0).expect("group 0 is always present");
        check_literal(&template[last..whole.start()], template)?;
        out.push_str(&template[last..whole.start()]);

        let name = &caps[1];
        let value = ctx
            .field(name)
            .ok_or_else(|| TemplateError::UnknownField(name.to_string()))?;
        out.push_str(value);
        last = whole.end();
    }
    check_literal(&template[last..], template)?;
    out.push_str(&template[last..]);
    Ok(out)
}

fn check_literal(segment: &str, template: &str) -> Result<(), TemplateError> {
    if segment.contains("{{") || segment.contains("}}") {
        return Err(TemplateError::Malformed(template.to_string()));
    }
    Ok(())
}

/// Render every string inside a JSON value, recursing into objects and
/// arrays. Non-string scalars are kept as they are.
pub fn render_json(value: &Value, ctx: &TemplateContext) -> Result<Value, TemplateError> {
    Ok(match value {
        Value::String(s) => Value::String(render(s, ctx)?),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| render_json(item, ctx))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), render_json(v, ctx)?)))
                .collect::<Result<_, TemplateError>>()?,
        ),
        other => other.clone(),
    })
}
