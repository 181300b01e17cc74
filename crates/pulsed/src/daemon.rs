//! Startup, supervision and shutdown.
//!
//! Startup order:
//! 1. Load and validate the whole config (any error is fatal here)
//! 2. Build the shared HTTP client and the notifier registry
//! 3. Build one `ServiceMonitor` per service and hand it to the supervisor
//! 4. Wait for Ctrl-C or for every worker to end on its own

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use pulse_core::{HttpClient, PulseConfig, ValidatedConfig};
use pulse_health::{ServiceMonitor, Supervisor};
use pulse_notify::build_notifiers;
use tracing::{error, info, warn};

/// How long workers get to finish after the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn load(path: &Path) -> anyhow::Result<ValidatedConfig> {
    let config = PulseConfig::from_file(path)?;
    let validated = config
        .validate()
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    Ok(validated)
}

pub fn check(path: &Path) -> anyhow::Result<()> {
    let config = load(path)?;
    println!("configuration OK: {}", path.display());
    println!("  conditions: {}", config.conditions.len());
    println!(
        "  notifiers:  {} ({} webhook, {} ippanel, {} payamak, {} smtp)",
        config.notifier_count(),
        config.webhooks.len(),
        config.ippanels.len(),
        config.payamaks.len(),
        config.smtps.len()
    );
    println!("  services:   {}", config.services.len());
    for service in &config.services {
        let condition = match &service.condition {
            Some(id) => format!("condition '{id}'"),
            None => format!("status == {}", service.expected_status_code),
        };
        println!(
            "    {} -> {} every {:?}, threshold {}, {}, {} target(s)",
            service.name,
            service.url,
            service.check_period,
            service.threshold,
            condition,
            service.targets.len()
        );
    }
    Ok(())
}

pub async fn run(path: &Path) -> anyhow::Result<()> {
    info!(config = %path.display(), "pulsewatch daemon starting");
    let config = load(path)?;

    let client = HttpClient::new().context("failed to initialize HTTP client")?;
    let notifiers = Arc::new(build_notifiers(&config, &client)?);
    info!(notifiers = notifiers.len(), "notifiers initialized");

    let mut supervisor = Supervisor::new();
    for spec in &config.services {
        let monitor = ServiceMonitor::from_config(spec, &config, notifiers.clone(), client.clone())?;
        supervisor.spawn(monitor);
    }
    info!(services = supervisor.active(), "monitors started");

    if supervisor.active() == 0 {
        warn!("no services configured, nothing to monitor");
        return Ok(());
    }

    let interrupted = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!(error = %e, "failed to listen for Ctrl-C");
            }
            info!("shutdown signal received");
            true
        }
        exits = supervisor.wait_all() => {
            warn!(workers = exits.len(), "every worker ended on its own");
            false
        }
    };

    if interrupted {
        let exits = supervisor.shutdown(SHUTDOWN_GRACE).await;
        let unclean = exits.iter().filter(|e| !e.is_clean()).count();
        if unclean > 0 {
            warn!(unclean, "some workers did not stop cleanly");
        }
    }

    info!("pulsewatch daemon stopped");
    Ok(())
}
