// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Claim provisioner.
//!
//! Materializes claims collected from peer-container labels: optional
//! remote-side bucket/prefix creation through ephemeral rclone runs, and an
//! idempotent local directory under the mountpoint. Remote failures are
//! warnings; a claim is re-attempted on every reconcile anyway.

use crate::application::images::ensure_image_present;
use crate::application::{CREATE_DEADLINE, REMOVE_DEADLINE, START_DEADLINE, WAIT_DEADLINE};
use crate::domain::claim::ClaimSpec;
use crate::domain::config::Config;
use crate::domain::runtime::{ContainerRuntime, ContainerSpec};
use crate::domain::{naming, prefix};
use crate::infrastructure::credentials::Credentials;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

pub struct ClaimProvisioner {
    runtime: Arc<dyn ContainerRuntime>,
    config: Arc<Config>,
    host: String,
}

impl ClaimProvisioner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: Arc<Config>, host: String) -> Self {
        Self {
            runtime,
            config,
            host,
        }
    }

    /// Materialize every actionable claim. Caller guarantees the mount is
    /// writable; individual claim failures are logged and skipped.
    pub async fn provision(&self, claims: &[ClaimSpec]) -> Result<()> {
        for claim in claims.iter().filter(|c| c.is_actionable()) {
            if let Err(e) = self.ensure_remote_paths(claim).await {
                warn!(
                    bucket = %claim.bucket,
                    prefix = %claim.prefix,
                    "remote provisioning failed: {}",
                    e
                );
            }
            let dir = prefix::claim_dir(Path::new(&self.config.mountpoint), &claim.prefix);
            if let Err(e) = tokio::fs::create_dir_all(&dir).await {
                warn!(path = %dir.display(), "claim mkdir failed: {}", e);
            }
        }
        Ok(())
    }

    /// Remote bucket/prefix creation, gated on the auto-create flags and
    /// suppressed entirely in read-only mode.
    async fn ensure_remote_paths(&self, claim: &ClaimSpec) -> Result<()> {
        if !(self.config.auto_create_bucket || self.config.auto_create_prefix) {
            return Ok(());
        }
        if self.config.read_only {
            return Ok(());
        }
        if claim.bucket.trim().is_empty() {
            return Ok(());
        }
        if self.config.auto_create_bucket {
            let target = format!("S3:{}", claim.bucket);
            if let Err(e) = self.run_rclone(&["mkdir", &target]).await {
                warn!(bucket = %claim.bucket, "mkdir bucket failed: {}", e);
            }
        }
        if self.config.auto_create_prefix && !claim.prefix.trim().is_empty() {
            let target = format!("S3:{}/{}", claim.bucket, claim.prefix.trim_matches('/'));
            if let Err(e) = self.run_rclone(&["mkdir", &target]).await {
                warn!(path = %target, "mkdir prefix failed: {}", e);
            }
        }
        Ok(())
    }

    /// One-shot rclone run using the mounter image and environment, joined
    /// to the proxy network when configured. The helper is always removed.
    async fn run_rclone(&self, cmd: &[&str]) -> Result<()> {
        ensure_image_present(self.runtime.as_ref(), &self.config.mounter_image).await?;

        let creds = Credentials::resolve(&self.config);
        let endpoint = self.config.resolved_endpoint(&self.host);
        let mut networks = BTreeMap::new();
        if !self.config.proxy_network.trim().is_empty() {
            networks.insert(self.config.proxy_network.trim().to_string(), Vec::new());
        }

        let spec = ContainerSpec {
            name: naming::helper_name("rclone-run", &self.host),
            image: self.config.mounter_image.clone(),
            cmd: cmd.iter().map(|s| s.to_string()).collect(),
            env: creds.rclone_env(&endpoint, &self.config.s3_provider),
            network_mode: Some("bridge".to_string()),
            networks,
            ..Default::default()
        };

        let id = self
            .runtime
            .create_container(&spec, CREATE_DEADLINE)
            .await
            .context("create rclone helper")?;
        let result = async {
            self.runtime.start_container(&id, START_DEADLINE).await?;
            self.runtime.wait_container(&id, WAIT_DEADLINE).await
        }
        .await;
        if let Err(e) = self.runtime.remove_container(&id, true, REMOVE_DEADLINE).await {
            warn!("rclone helper remove failed: {}", e);
        }
        match result {
            Ok(0) => Ok(()),
            Ok(code) => anyhow::bail!("rclone exited with status {}", code),
            Err(e) => Err(e).context("run rclone"),
        }
    }
}
