// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Reconcile engine.
//!
//! One reconcile task owns all mounter state and metrics; one event task
//! watches runtime events and nudges the loop through a coalescing signal.
//! Steps inside a pass run in a fixed order; only the mounter supervisor
//! aborts a pass, everything else degrades to a warning and is retried on
//! the next tick.

use crate::application::healer::MountHealer;
use crate::application::helper::HostHelper;
use crate::application::provisioner::ClaimProvisioner;
use crate::application::reaper::OrphanReaper;
use crate::application::supervisor::MounterSupervisor;
use crate::application::{INSPECT_DEADLINE, LIST_DEADLINE, PROBE_DEADLINE, REMOVE_DEADLINE};
use crate::domain::claim::{collect_claims, LabelResolver};
use crate::domain::config::Config;
use crate::domain::metrics::{ControllerMetrics, MetricsSnapshot};
use crate::domain::naming;
use crate::domain::runtime::{ContainerRuntime, ContainerState, ListFilter};
use crate::infrastructure::credentials::Credentials;
use crate::infrastructure::probe::MountProber;
use anyhow::{bail, Context, Result};
use futures::StreamExt;
use rand::Rng;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const EVENT_BACKOFF_START: Duration = Duration::from_secs(1);
const EVENT_BACKOFF_CAP: Duration = Duration::from_secs(30);
const STRICT_READY_DEADLINE: Duration = Duration::from_secs(2);

pub struct MountController {
    config: Arc<Config>,
    runtime: Arc<dyn ContainerRuntime>,
    metrics: Arc<ControllerMetrics>,
    prober: MountProber,
    helper: Arc<HostHelper>,
    supervisor: MounterSupervisor,
    healer: MountHealer,
    provisioner: ClaimProvisioner,
    reaper: OrphanReaper,
    resolver: LabelResolver,
    http: reqwest::Client,
    nudge: Notify,
    host: String,
}

impl MountController {
    pub fn new(config: Config, runtime: Arc<dyn ContainerRuntime>) -> Self {
        let config = Arc::new(config);
        let metrics = Arc::new(ControllerMetrics::new());
        let host = naming::local_hostname();
        let prober = MountProber::new(config.read_only);

        let helper = Arc::new(HostHelper::new(
            runtime.clone(),
            config.helper_image.clone(),
            host.clone(),
        ));
        let supervisor = MounterSupervisor::new(
            runtime.clone(),
            config.clone(),
            metrics.clone(),
            host.clone(),
        );
        let healer = MountHealer::new(
            helper.clone(),
            prober.clone(),
            metrics.clone(),
            config.mountpoint.clone(),
        );
        let provisioner = ClaimProvisioner::new(runtime.clone(), config.clone(), host.clone());
        let reaper = OrphanReaper::new(runtime.clone(), metrics.clone());
        let resolver = LabelResolver::new(config.label_prefix.clone(), config.label_strict);

        Self {
            config,
            runtime,
            metrics,
            prober,
            helper,
            supervisor,
            healer,
            provisioner,
            reaper,
            resolver,
            http: reqwest::Client::new(),
            nudge: Notify::new(),
            host,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Schedule an immediate reconcile; duplicate nudges collapse to one.
    pub fn nudge(&self) {
        self.nudge.notify_one();
    }

    /// Drive the reconcile loop until cancellation.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tokio::spawn(self.clone().watch_events(cancel.clone()));

        let poll = self.config.effective_poll_interval();
        info!(host = %self.host, poll = ?poll, "controller running");
        loop {
            let started = Instant::now();
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.reconcile() => {
                    if let Err(e) = result {
                        self.metrics.inc_reconcile_errors();
                        error!("reconcile error: {:#}", e);
                    }
                }
            }
            self.metrics
                .set_last_reconcile_ms(started.elapsed().as_millis() as u64);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.nudge.notified() => {}
                _ = tokio::time::sleep(poll) => {}
            }
        }
        info!("controller stopped");
    }

    /// Event task: every container/service event nudges the loop; a dropped
    /// stream reconnects with jittered exponential backoff.
    async fn watch_events(self: Arc<Self>, cancel: CancellationToken) {
        let mut backoff = EVENT_BACKOFF_START;
        loop {
            if cancel.is_cancelled() {
                return;
            }
            match self.runtime.subscribe_events(&["container", "service"]).await {
                Ok(mut stream) => loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        item = stream.next() => match item {
                            Some(Ok(_)) => self.nudge(),
                            Some(Err(e)) => {
                                warn!("event stream error: {}", e);
                                break;
                            }
                            None => {
                                warn!("event stream ended");
                                break;
                            }
                        }
                    }
                },
                Err(e) => warn!("event subscribe failed: {}", e),
            }

            let jitter = rand::thread_rng().gen_range(0.5..1.5);
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(backoff.mul_f64(jitter)) => {}
            }
            backoff = (backoff * 2).min(EVENT_BACKOFF_CAP);
        }
    }

    /// One reconcile pass, steps in documented order.
    pub async fn reconcile(&self) -> Result<()> {
        self.metrics.inc_reconcile();

        if let Err(e) = tokio::fs::create_dir_all(&self.config.mountpoint).await {
            warn!(mountpoint = %self.config.mountpoint, "ensure mountpoint: {}", e);
        }

        if let Err(e) = self.helper.ensure_rshared(&self.config.mountpoint).await {
            warn!("ensure rshared failed: {}", e);
        }

        if let Err(e) = self.supervisor.refresh_image().await {
            warn!("mounter image refresh failed: {}", e);
        }

        self.supervisor.ensure_mounter().await?;

        if let Err(e) = self.healer.check_and_heal().await {
            warn!("heal mount: {}", e);
        }

        if let Err(e) = self.provision_claims().await {
            warn!("provision claims: {}", e);
        }

        self.update_status().await;

        if let Err(e) = self.reaper.reap().await {
            warn!("cleanup orphaned mounters: {}", e);
        }
        Ok(())
    }

    /// Collect claims from running peers and materialize them; skipped
    /// entirely while the mount is not writable.
    async fn provision_claims(&self) -> Result<()> {
        self.prober
            .test_rw(Path::new(&self.config.mountpoint), PROBE_DEADLINE)
            .await
            .context("mount not writable")?;
        let running = self
            .runtime
            .list_containers(ListFilter::default(), LIST_DEADLINE)
            .await
            .context("list peer containers")?;
        let claims = collect_claims(&self.resolver, &running);
        self.provisioner.provision(&claims).await
    }

    async fn update_status(&self) {
        let name = naming::mounter_name(&self.host);
        let mut running = false;
        if let Ok(listed) = self
            .runtime
            .list_containers(
                ListFilter {
                    all: true,
                    name: Some(name.clone()),
                    label: None,
                },
                LIST_DEADLINE,
            )
            .await
        {
            if let Some(found) = listed.iter().find(|c| c.name == name) {
                running = match self
                    .runtime
                    .inspect_container(&found.id, INSPECT_DEADLINE)
                    .await
                {
                    Ok(record) => record.state == ContainerState::Running,
                    Err(_) => found.state == ContainerState::Running,
                };
            }
        }
        let writable = self
            .prober
            .test_rw(Path::new(&self.config.mountpoint), PROBE_DEADLINE)
            .await
            .is_ok();
        self.metrics.set_status(running, writable);
        info!(mounter_running = running, mount_writable = writable, "status");
    }

    /// Readiness: mountpoint probed (sentinel write unless read-only), plus
    /// an optional strict check against the resolved endpoint.
    pub async fn ready(&self) -> Result<()> {
        self.prober
            .ready_probe(
                Path::new(&self.config.mountpoint),
                &self.config.ready_file,
                PROBE_DEADLINE,
            )
            .await?;

        if self.config.strict_ready {
            let endpoint = self.config.resolved_endpoint(&self.host);
            let endpoint = endpoint.trim();
            if !endpoint.is_empty() {
                let resp = self
                    .http
                    .get(endpoint)
                    .timeout(STRICT_READY_DEADLINE)
                    .send()
                    .await
                    .context("remote not ready")?;
                let status = resp.status().as_u16();
                if status >= 500 && status != 404 {
                    bail!("remote not ready: status {}", status);
                }
            }
        }
        Ok(())
    }

    /// Preflight: every problem at once, not first-fail.
    pub async fn preflight(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if let Err(e) = self.runtime.ping(INSPECT_DEADLINE).await {
            issues.push(format!("runtime ping failed: {}", e));
        }
        let creds = Credentials::resolve(&self.config);
        if !creds.is_complete() {
            issues.push(
                "missing access/secret credentials (set VOLS3_ACCESS_KEY/VOLS3_SECRET_KEY or mount secret files)"
                    .to_string(),
            );
        }
        if let Err(e) = self.helper.nsenter_check().await {
            issues.push(format!("helper image may lack nsenter: {}", e));
        }
        issues
    }

    /// Shutdown cleanup: lazy-unmount and drop the managed mounter. Runs
    /// after the loop has stopped, under fresh per-call deadlines.
    pub async fn shutdown_cleanup(&self) {
        if !self.config.unmount_on_exit {
            return;
        }
        info!("shutdown cleanup: unmounting and removing mounter");
        if let Err(e) = self.healer.check_and_heal().await {
            warn!("shutdown heal: {}", e);
        }
        let name = naming::mounter_name(&self.host);
        if let Ok(listed) = self
            .runtime
            .list_containers(
                ListFilter {
                    all: true,
                    name: Some(name.clone()),
                    label: None,
                },
                LIST_DEADLINE,
            )
            .await
        {
            for container in listed.iter().filter(|c| c.name == name) {
                if let Err(e) = self
                    .runtime
                    .remove_container(&container.id, true, REMOVE_DEADLINE)
                    .await
                {
                    warn!(name = %container.name, "remove mounter on shutdown: {}", e);
                }
            }
        }
    }
}
