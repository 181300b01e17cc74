//! Health condition trees.
//!
//! A condition is written in the config file as a `ConditionSpec`: a node
//! with one optional field per kind, of which exactly one must be set.
//! `ConditionSpec::validate` checks that at every depth and turns the tree
//! into a `ConditionNode`, a closed enum the evaluator matches
//! exhaustively.
//!
//! ```text
//! or
//! ├── and
//! │   ├── status_code = 200
//! │   └── regex "OK"
//! └── status_code = 404
//! ```
//!
//! Evaluation is pure: the same outcome and elapsed time always yield the
//! same `EvaluationResult`. Failures carry the deepest reason available
//! (the literal mismatch), not a generic label.

use std::fmt;
use std::time::Duration;

use regex::bytes::Regex;
use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;
use crate::error::{ConfigError, ConfigResult};
use crate::outcome::ProbeOutcome;

// ── On-disk form ─────────────────────────────────────────────────────

/// A condition node as written in the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub and: Option<Vec<ConditionSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub or: Option<Vec<ConditionSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not: Option<Box<ConditionSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<StatusCodeSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex: Option<RegexSpec>,
    #[serde(alias = "headers", skip_serializing_if = "Option::is_none")]
    pub header: Option<Vec<HeaderSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<ResponseTimeSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusCodeSpec {
    pub code: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegexSpec {
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderSpec {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseTimeSpec {
    pub max_duration: String,
}

impl ConditionSpec {
    /// Number of kinds populated on this node (not its children).
    fn populated(&self) -> usize {
        [
            self.and.is_some(),
            self.or.is_some(),
            self.not.is_some(),
            self.status_code.is_some(),
            self.regex.is_some(),
            self.header.is_some(),
            self.response_time.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }

    /// Check the tree and build its evaluable form.
    ///
    /// Fails on the first node (depth-first, in order) that does not have
    /// exactly one kind set, or whose response-time limit does not parse.
    /// `path` names this node in the error, children extend it
    /// (`conditions.api.or[1].and[0]`).
    pub fn validate(&self, path: &str) -> ConfigResult<ConditionNode> {
        let count = self.populated();
        if count != 1 {
            return Err(ConfigError::Condition {
                path: path.to_string(),
                message: format!("a condition node must contain exactly one field (got {count})"),
            });
        }

        if let Some(children) = &self.and {
            return validate_children(children, path, "and").map(ConditionNode::And);
        }
        if let Some(children) = &self.or {
            return validate_children(children, path, "or").map(ConditionNode::Or);
        }
        if let Some(child) = &self.not {
            let node = child.validate(&format!("{path}.not"))?;
            return Ok(ConditionNode::Not(Box::new(node)));
        }
        if let Some(spec) = &self.status_code {
            return Ok(ConditionNode::StatusCode(spec.code));
        }
        if let Some(spec) = &self.regex {
            return Ok(ConditionNode::Regex(RegexMatcher::new(&spec.pattern)));
        }
        if let Some(pairs) = &self.header {
            return Ok(ConditionNode::Headers(
                pairs
                    .iter()
                    .map(|h| HeaderMatch {
                        key: h.key.clone(),
                        value: h.value.clone(),
                    })
                    .collect(),
            ));
        }
        match &self.response_time {
            Some(spec) => {
                let max = parse_duration(&spec.max_duration).map_err(|e| {
                    ConfigError::InvalidDuration {
                        path: path.to_string(),
                        value: spec.max_duration.clone(),
                        reason: e.to_string(),
                    }
                })?;
                Ok(ConditionNode::MaxResponseTime(max))
            }
            // populated() == 1 guarantees one of the branches above matched.
            None => Err(ConfigError::Condition {
                path: path.to_string(),
                message: "no valid condition defined".to_string(),
            }),
        }
    }
}

fn validate_children(
    children: &[ConditionSpec],
    path: &str,
    kind: &str,
) -> ConfigResult<Vec<ConditionNode>> {
    children
        .iter()
        .enumerate()
        .map(|(i, child)| child.validate(&format!("{path}.{kind}[{i}]")))
        .collect()
}

// ── Evaluable form ───────────────────────────────────────────────────

/// A validated condition tree.
#[derive(Debug, Clone)]
pub enum ConditionNode {
    /// Every child must pass. Empty means healthy.
    And(Vec<ConditionNode>),
    /// At least one child must pass. Empty means unhealthy.
    Or(Vec<ConditionNode>),
    /// The child must fail.
    Not(Box<ConditionNode>),
    /// The response status must equal this code.
    StatusCode(u16),
    /// The body must match this pattern somewhere.
    Regex(RegexMatcher),
    /// Every header must be present with exactly this value.
    Headers(Vec<HeaderMatch>),
    /// The attempt must not take longer than this.
    MaxResponseTime(Duration),
}

/// A regex leaf. The pattern is compiled once at load; a pattern that does
/// not compile is kept and reported as unhealthy on every evaluation.
#[derive(Debug, Clone)]
pub struct RegexMatcher {
    pattern: String,
    compiled: Result<Regex, String>,
}

impl RegexMatcher {
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            compiled: Regex::new(pattern).map_err(|e| e.to_string()),
        }
    }
}

/// One expected header. Key lookup is case-insensitive, value comparison
/// is exact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMatch {
    pub key: String,
    pub value: String,
}

/// Verdict of a condition against one probe outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationResult {
    pub healthy: bool,
    /// Why the check failed. Empty on success.
    pub reason: String,
}

impl EvaluationResult {
    pub fn pass() -> Self {
        Self {
            healthy: true,
            reason: String::new(),
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            healthy: false,
            reason: reason.into(),
        }
    }
}

impl ConditionNode {
    /// Evaluate against a probe outcome and the elapsed attempt time.
    pub fn evaluate(&self, outcome: &ProbeOutcome, elapsed: Duration) -> EvaluationResult {
        match self {
            ConditionNode::And(children) => {
                for child in children {
                    let result = child.evaluate(outcome, elapsed);
                    if !result.healthy {
                        return result;
                    }
                }
                EvaluationResult::pass()
            }
            ConditionNode::Or(children) => {
                if children.is_empty() {
                    return EvaluationResult::fail("'or' condition has no alternatives");
                }
                let mut reasons = Vec::with_capacity(children.len());
                for (i, child) in children.iter().enumerate() {
                    let result = child.evaluate(outcome, elapsed);
                    if result.healthy {
                        return result;
                    }
                    reasons.push(format!("[{i}] {}", result.reason));
                }
                EvaluationResult::fail(format!(
                    "no alternative matched: {}",
                    reasons.join("; ")
                ))
            }
            ConditionNode::Not(child) => {
                if child.evaluate(outcome, elapsed).healthy {
                    EvaluationResult::fail("forbidden condition matched")
                } else {
                    EvaluationResult::pass()
                }
            }
            ConditionNode::StatusCode(expected) => match outcome {
                ProbeOutcome::Response { status, .. } if status == expected => {
                    EvaluationResult::pass()
                }
                ProbeOutcome::Response { status, .. } => EvaluationResult::fail(format!(
                    "expected status code {expected}, got {status}"
                )),
                ProbeOutcome::NetworkError { message } => EvaluationResult::fail(format!(
                    "no response (expected status code {expected}): {message}"
                )),
            },
            ConditionNode::Regex(matcher) => match outcome {
                ProbeOutcome::Response { body, .. } => match &matcher.compiled {
                    Ok(re) if re.is_match(body) => EvaluationResult::pass(),
                    Ok(_) => EvaluationResult::fail(format!(
                        "body does not match pattern '{}'",
                        matcher.pattern
                    )),
                    Err(e) => EvaluationResult::fail(format!(
                        "invalid regex pattern '{}': {e}",
                        matcher.pattern
                    )),
                },
                ProbeOutcome::NetworkError { message } => EvaluationResult::fail(format!(
                    "no response body to match '{}': {message}",
                    matcher.pattern
                )),
            },
            ConditionNode::Headers(expected) => match outcome {
                ProbeOutcome::Response { headers, .. } => {
                    for h in expected {
                        let actual = headers
                            .get(h.key.as_str())
                            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                            .unwrap_or_default();
                        if actual != h.value {
                            return EvaluationResult::fail(format!(
                                "header '{}' expected '{}', got '{actual}'",
                                h.key, h.value
                            ));
                        }
                    }
                    EvaluationResult::pass()
                }
                ProbeOutcome::NetworkError { message } => EvaluationResult::fail(format!(
                    "no response headers to check: {message}"
                )),
            },
            ConditionNode::MaxResponseTime(max) => {
                if elapsed <= *max {
                    EvaluationResult::pass()
                } else {
                    EvaluationResult::fail(format!(
                        "response time {elapsed:?} exceeded maximum {max:?}"
                    ))
                }
            }
        }
    }
}

impl fmt::Display for ConditionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, op: &str, children: &[ConditionNode]) -> fmt::Result {
            write!(f, "{op}(")?;
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{child}")?;
            }
            write!(f, ")")
        }

        match self {
            ConditionNode::And(children) => list(f, "and", children),
            ConditionNode::Or(children) => list(f, "or", children),
            ConditionNode::Not(child) => write!(f, "not({child})"),
            ConditionNode::StatusCode(code) => write!(f, "status_code == {code}"),
            ConditionNode::Regex(m) => write!(f, "regex /{}/", m.pattern),
            ConditionNode::Headers(pairs) => {
                write!(f, "headers[")?;
                for (i, h) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", h.key, h.value)?;
                }
                write!(f, "]")
            }
            ConditionNode::MaxResponseTime(max) => write!(f, "response_time <= {max:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{HeaderMap, HeaderValue};

    fn response(status: u16, body: &str) -> ProbeOutcome {
        ProbeOutcome::Response {
            status,
            headers: HeaderMap::new(),
            body: Bytes::from(body.to_string()),
            latency: Duration::from_millis(10),
        }
    }

    fn with_headers(pairs: &[(&'static str, &'static str)]) -> ProbeOutcome {
        let mut headers = HeaderMap::new();
        for (k, v) in pairs {
            headers.insert(*k, HeaderValue::from_static(*v));
        }
        ProbeOutcome::Response {
            status: 200,
            headers,
            body: Bytes::new(),
            latency: Duration::from_millis(10),
        }
    }

    fn network_error() -> ProbeOutcome {
        ProbeOutcome::NetworkError {
            message: "connection refused".to_string(),
        }
    }

    fn status(code: u16) -> ConditionSpec {
        ConditionSpec {
            status_code: Some(StatusCodeSpec { code }),
            ..Default::default()
        }
    }

    fn regex(pattern: &str) -> ConditionSpec {
        ConditionSpec {
            regex: Some(RegexSpec {
                pattern: pattern.to_string(),
            }),
            ..Default::default()
        }
    }

    fn response_time(max: &str) -> ConditionSpec {
        ConditionSpec {
            response_time: Some(ResponseTimeSpec {
                max_duration: max.to_string(),
            }),
            ..Default::default()
        }
    }

    fn and(children: Vec<ConditionSpec>) -> ConditionSpec {
        ConditionSpec {
            and: Some(children),
            ..Default::default()
        }
    }

    fn or(children: Vec<ConditionSpec>) -> ConditionSpec {
        ConditionSpec {
            or: Some(children),
            ..Default::default()
        }
    }

    fn not(child: ConditionSpec) -> ConditionSpec {
        ConditionSpec {
            not: Some(Box::new(child)),
            ..Default::default()
        }
    }

    fn build(spec: ConditionSpec) -> ConditionNode {
        spec.validate("test").unwrap()
    }

    const MS: Duration = Duration::from_millis(100);

    // ── validate ─────────────────────────────────────────────────

    #[test]
    fn validate_rejects_empty_node() {
        let err = ConditionSpec::default().validate("conditions.x").unwrap_err();
        match err {
            ConfigError::Condition { path, message } => {
                assert_eq!(path, "conditions.x");
                assert!(message.contains("got 0"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn validate_rejects_two_kinds_on_one_node() {
        let mut spec = status(200);
        spec.regex = Some(RegexSpec {
            pattern: "OK".to_string(),
        });
        let err = spec.validate("root").unwrap_err();
        assert!(err.to_string().contains("got 2"));
    }

    #[test]
    fn validate_reports_nested_path() {
        let spec = or(vec![status(200), and(vec![regex("OK"), ConditionSpec::default()])]);
        let err = spec.validate("conditions.api").unwrap_err();
        match err {
            ConfigError::Condition { path, .. } => {
                assert_eq!(path, "conditions.api.or[1].and[1]");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn validate_descends_into_not() {
        let spec = and(vec![not(not(ConditionSpec::default()))]);
        let err = spec.validate("c").unwrap_err();
        match err {
            ConfigError::Condition { path, .. } => assert_eq!(path, "c.and[0].not.not"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn validate_checks_duration_format() {
        let err = response_time("invalid-time").validate("test").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDuration { .. }));

        let node = build(response_time("1.5s"));
        assert!(matches!(node, ConditionNode::MaxResponseTime(d) if d == Duration::from_millis(1500)));
    }

    #[test]
    fn validate_finds_bad_duration_deep_in_or() {
        let spec = or(vec![status(200), and(vec![response_time("soon")])]);
        match spec.validate("root").unwrap_err() {
            ConfigError::InvalidDuration { path, value, .. } => {
                assert_eq!(path, "root.or[1].and[0]");
                assert_eq!(value, "soon");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn validate_accepts_empty_combinators() {
        assert!(matches!(build(and(vec![])), ConditionNode::And(c) if c.is_empty()));
        assert!(matches!(build(or(vec![])), ConditionNode::Or(c) if c.is_empty()));
    }

    #[test]
    fn validate_keeps_malformed_regex() {
        let node = build(regex("(unclosed"));
        assert!(matches!(node, ConditionNode::Regex(_)));
    }

    // ── evaluate ─────────────────────────────────────────────────

    #[test]
    fn nested_or_and_example() {
        let node = build(or(vec![and(vec![status(200), regex("OK")]), status(404)]));

        assert!(node.evaluate(&response(200, "System status is OK"), MS).healthy);
        assert!(node.evaluate(&response(404, "Not Found"), MS).healthy);

        let result = node.evaluate(&response(200, "System status is Error"), MS);
        assert!(!result.healthy);
        assert_eq!(
            result.reason,
            "no alternative matched: [0] body does not match pattern 'OK'; \
             [1] expected status code 404, got 200"
        );
    }

    #[test]
    fn and_propagates_first_failure_verbatim() {
        let node = build(and(vec![status(200), regex("OK"), status(201)]));
        let result = node.evaluate(&response(500, "OK"), MS);
        assert_eq!(
            result,
            EvaluationResult::fail("expected status code 200, got 500")
        );
    }

    #[test]
    fn empty_and_is_healthy_empty_or_is_not() {
        assert!(build(and(vec![])).evaluate(&response(500, ""), MS).healthy);
        assert!(!build(or(vec![])).evaluate(&response(200, ""), MS).healthy);
    }

    #[test]
    fn not_uses_fixed_reason() {
        let node = build(not(status(503)));
        assert!(node.evaluate(&response(200, ""), MS).healthy);

        let result = node.evaluate(&response(503, ""), MS);
        assert_eq!(result, EvaluationResult::fail("forbidden condition matched"));
    }

    #[test]
    fn double_negation_preserves_verdict() {
        let inner = or(vec![status(200), regex("ready")]);
        let plain = build(inner.clone());
        let doubled = build(not(not(inner)));
        for outcome in [
            response(200, ""),
            response(500, "ready"),
            response(500, "down"),
            network_error(),
        ] {
            assert_eq!(
                plain.evaluate(&outcome, MS).healthy,
                doubled.evaluate(&outcome, MS).healthy
            );
        }
    }

    #[test]
    fn evaluate_is_idempotent() {
        let node = build(or(vec![and(vec![status(200), regex("OK")]), status(404)]));
        let outcome = response(200, "nope");
        let first = node.evaluate(&outcome, MS);
        for _ in 0..5 {
            assert_eq!(node.evaluate(&outcome, MS), first);
        }
    }

    #[test]
    fn status_code_fails_closed_without_response() {
        let result = build(status(200)).evaluate(&network_error(), MS);
        assert!(!result.healthy);
        assert!(result.reason.starts_with("no response"));
        assert!(result.reason.contains("connection refused"));
    }

    #[test]
    fn not_of_failed_probe_is_healthy() {
        // A network error fails the status leaf, so its negation passes.
        assert!(build(not(status(200))).evaluate(&network_error(), MS).healthy);
    }

    #[test]
    fn regex_matches_anywhere_in_body() {
        let node = build(regex(r"status:\s+(up|ok)"));
        assert!(node.evaluate(&response(200, "{\"x\":1}\nstatus:  up\n"), MS).healthy);
        assert!(!node.evaluate(&response(200, "status: down"), MS).healthy);
    }

    #[test]
    fn malformed_regex_degrades_to_unhealthy() {
        let result = build(regex("(unclosed")).evaluate(&response(200, "(unclosed"), MS);
        assert!(!result.healthy);
        assert!(result.reason.starts_with("invalid regex pattern '(unclosed'"));
    }

    #[test]
    fn regex_without_response_is_unhealthy() {
        let result = build(regex("OK")).evaluate(&network_error(), MS);
        assert!(!result.healthy);
        assert!(result.reason.contains("no response"));
    }

    #[test]
    fn headers_match_key_case_insensitively() {
        let node = ConditionNode::Headers(vec![HeaderMatch {
            key: "Content-Type".to_string(),
            value: "application/json".to_string(),
        }]);
        assert!(node
            .evaluate(&with_headers(&[("content-type", "application/json")]), MS)
            .healthy);
    }

    #[test]
    fn headers_compare_value_case_sensitively() {
        let node = ConditionNode::Headers(vec![
            HeaderMatch {
                key: "x-env".to_string(),
                value: "prod".to_string(),
            },
            HeaderMatch {
                key: "x-region".to_string(),
                value: "eu".to_string(),
            },
        ]);
        let result = node.evaluate(&with_headers(&[("x-env", "PROD"), ("x-region", "us")]), MS);
        assert_eq!(
            result,
            EvaluationResult::fail("header 'x-env' expected 'prod', got 'PROD'")
        );
    }

    #[test]
    fn missing_header_reads_as_empty() {
        let node = ConditionNode::Headers(vec![HeaderMatch {
            key: "x-version".to_string(),
            value: "2".to_string(),
        }]);
        let result = node.evaluate(&with_headers(&[]), MS);
        assert_eq!(
            result,
            EvaluationResult::fail("header 'x-version' expected '2', got ''")
        );
    }

    #[test]
    fn headers_without_response_is_unhealthy() {
        let node = ConditionNode::Headers(vec![HeaderMatch {
            key: "x".to_string(),
            value: "y".to_string(),
        }]);
        let result = node.evaluate(&network_error(), MS);
        assert!(!result.healthy);
        assert!(result.reason.contains("no response"));
    }

    #[test]
    fn response_time_limit() {
        let node = build(response_time("500ms"));
        assert!(node.evaluate(&response(200, ""), Duration::from_millis(200)).healthy);
        assert!(node.evaluate(&response(200, ""), Duration::from_millis(500)).healthy);

        let result = node.evaluate(&response(200, ""), Duration::from_millis(600));
        assert!(!result.healthy);
        assert_eq!(result.reason, "response time 600ms exceeded maximum 500ms");
    }

    #[test]
    fn response_time_applies_to_failed_attempts() {
        let node = build(response_time("1s"));
        assert!(node.evaluate(&network_error(), Duration::from_millis(20)).healthy);
        assert!(!node.evaluate(&network_error(), Duration::from_secs(15)).healthy);
    }

    #[test]
    fn combined_status_and_latency() {
        let node = build(and(vec![status(200), response_time("500ms")]));
        assert!(node.evaluate(&response(200, ""), Duration::from_millis(100)).healthy);
        assert!(!node.evaluate(&response(200, ""), Duration::from_millis(700)).healthy);
        assert!(!node.evaluate(&response(500, ""), Duration::from_millis(100)).healthy);
    }

    #[test]
    fn spec_round_trips_through_toml() {
        let text = r#"
            or = [
                { and = [ { status_code = { code = 200 } }, { regex = { pattern = "OK" } } ] },
                { headers = [ { key = "x-ready", value = "1" } ] },
            ]
        "#;
        let spec: ConditionSpec = toml::from_str(text).unwrap();
        let node = spec.validate("t").unwrap();
        assert_eq!(
            node.to_string(),
            "or(and(status_code == 200, regex /OK/), headers[x-ready: 1])"
        );
    }

    #[test]
    fn spec_rejects_unknown_kind() {
        let text = r#"jsonpath = { expr = "$.ok" }"#;
        assert!(toml::from_str::<ConditionSpec>(text).is_err());
    }
}
