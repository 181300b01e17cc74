//! Per-service worker: probe, evaluate, count, alert, sleep.

use std::sync::Arc;
use std::time::Duration;

use pulse_core::{
    ConditionNode, ConfigResult, EvaluationResult, HttpClient, Registry, ServiceSpec,
    ValidatedConfig,
};
use pulse_notify::{FanOutReport, NotificationRecord, SharedNotifier, fan_out};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span};

use crate::event::{EventKind, EventSink, MonitorEvent, TracingSink};
use crate::probe::{ProbeError, http_probe};
use crate::tracker::{HealthTracker, Transition};

pub type MonitorResult<T> = Result<T, MonitorError>;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("service '{service}' stopped: {source}")]
    Probe {
        service: String,
        #[source]
        source: ProbeError,
    },
}

/// What one cycle did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub transition: Transition,
    pub evaluation: EvaluationResult,
    pub status_code: Option<u16>,
    pub elapsed: Duration,
    /// How long the worker sleeps before the next cycle.
    pub sleep: Duration,
    /// Set only on the cycle that reached the threshold.
    pub notified: Option<FanOutReport>,
}

/// Owns one service's lifecycle loop and its failure tracker.
pub struct ServiceMonitor {
    spec: ServiceSpec,
    condition: Arc<ConditionNode>,
    notifiers: Arc<Registry<SharedNotifier>>,
    client: HttpClient,
    sink: Arc<dyn EventSink>,
    tracker: HealthTracker,
}

impl ServiceMonitor {
    /// Without a condition the service is judged by its expected status code.
    pub fn new(
        spec: ServiceSpec,
        condition: Option<Arc<ConditionNode>>,
        notifiers: Arc<Registry<SharedNotifier>>,
        client: HttpClient,
    ) -> Self {
        let condition = condition
            .unwrap_or_else(|| Arc::new(ConditionNode::StatusCode(spec.expected_status_code)));
        let tracker = HealthTracker::for_service(&spec);
        Self {
            spec,
            condition,
            notifiers,
            client,
            sink: Arc::new(TracingSink),
            tracker,
        }
    }

    /// Build a monitor for `spec`, resolving its named condition.
    pub fn from_config(
        spec: &ServiceSpec,
        config: &ValidatedConfig,
        notifiers: Arc<Registry<SharedNotifier>>,
        client: HttpClient,
    ) -> ConfigResult<Self> {
        let context = format!("service '{}'", spec.name);
        let condition = spec
            .condition
            .as_deref()
            .map(|id| config.conditions.resolve(id, &context).cloned())
            .transpose()?;
        Ok(Self::new(spec.clone(), condition, notifiers, client))
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn condition(&self) -> &ConditionNode {
        &self.condition
    }

    /// Run one probe and act on the result.
    pub async fn run_cycle(&mut self) -> MonitorResult<CycleReport> {
        let probe = http_probe(
            &self.client,
            &self.spec.url,
            self.spec.timeout,
            self.spec.user_agent.as_deref(),
        )
        .await
        .map_err(|source| MonitorError::Probe {
            service: self.spec.name.clone(),
            source,
        })?;

        let evaluation = self.condition.evaluate(&probe.outcome, probe.elapsed);
        let status_code = probe.outcome.status_code();
        let transition = self.tracker.record(evaluation.healthy);
        debug!(?transition, status = ?status_code, elapsed = ?probe.elapsed, "cycle evaluated");

        let event = |kind, failures| MonitorEvent {
            kind,
            service: self.spec.name.clone(),
            failures,
            status_code,
            elapsed: probe.elapsed,
            reason: evaluation.reason.clone(),
        };

        let mut notified = None;
        match transition {
            Transition::Healthy => self.sink.emit(&event(EventKind::Success, 0)),
            Transition::Recovered { failures } => {
                self.sink.emit(&event(EventKind::Recovered, failures))
            }
            Transition::Degraded { failures } => self.sink.emit(&event(EventKind::Fail, failures)),
            Transition::ThresholdReached { failures } => {
                self.sink.emit(&event(EventKind::Fail, failures));
                self.sink.emit(&event(EventKind::ThresholdReached, failures));
                notified = Some(
                    self.notify(&evaluation, status_code, probe.elapsed, failures)
                        .await,
                );
            }
        }

        Ok(CycleReport {
            transition,
            evaluation,
            status_code,
            elapsed: probe.elapsed,
            sleep: self.tracker.next_interval(transition),
            notified,
        })
    }

    async fn notify(
        &self,
        evaluation: &EvaluationResult,
        status_code: Option<u16>,
        elapsed: Duration,
        failures: u32,
    ) -> FanOutReport {
        let response_time = format_elapsed(elapsed);
        let service_url = self.spec.url.to_string();
        let report = fan_out(&self.notifiers, &self.spec.targets, |target| {
            NotificationRecord {
                service_name: self.spec.name.clone(),
                service_url: service_url.clone(),
                recipients: target.recipients.clone(),
                reason: evaluation.reason.clone(),
                status_code,
                response_time: response_time.clone(),
                failures,
            }
        })
        .await;
        info!(
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            missing = report.missing.len(),
            "alert fan-out finished"
        );
        report
    }

    /// Loop until `shutdown` turns true or its sender goes away.
    ///
    /// Both the probe and the sleep are cancelled by shutdown. The only
    /// error is a target that can never be probed.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> MonitorResult<()> {
        let span = info_span!("service", name = %self.spec.name);
        async move {
            info!(url = %self.spec.url, condition = %self.condition, "monitor started");
            loop {
                if *shutdown.borrow() {
                    break;
                }
                let report = tokio::select! {
                    result = self.run_cycle() => match result {
                        Ok(report) => report,
                        Err(e) => {
                            error!(error = %e, "stopping monitor");
                            return Err(e);
                        }
                    },
                    _ = shutdown.changed() => break,
                };
                tokio::select! {
                    _ = tokio::time::sleep(report.sleep) => {}
                    _ = shutdown.changed() => break,
                }
            }
            info!("monitor stopped");
            Ok(())
        }
        .instrument(span)
        .await
    }
}

/// Millisecond precision, e.g. `340ms` or `1.2s`.
fn format_elapsed(elapsed: Duration) -> String {
    let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    format!("{:?}", Duration::from_millis(millis))
}
