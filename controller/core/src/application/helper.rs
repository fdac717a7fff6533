// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Host helper invoker.
//!
//! Mount-namespace operations (`mount --make-rshared`, lazy unmount) must run
//! in the host namespace, which the controller reaches by creating a one-shot
//! privileged container in the host PID namespace and entering PID 1's mount
//! namespace with nsenter, falling back to the helper's own namespace.
//!
//! Helper runs are fire-and-forget: the invoker starts the container, gives
//! the side effect a second to land, and always removes the helper. The
//! mount prober is the source of truth for whether the operation worked.

use crate::application::images::ensure_image_present;
use crate::application::{CREATE_DEADLINE, INSPECT_DEADLINE, REMOVE_DEADLINE, START_DEADLINE, WAIT_DEADLINE};
use crate::domain::naming;
use crate::domain::runtime::{ContainerRuntime, ContainerSpec};
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Published controller image, used when self-discovery fails.
const DEFAULT_HELPER_IMAGE: &str = "ghcr.io/swarmnative/volume-s3:latest";

pub struct HostHelper {
    runtime: Arc<dyn ContainerRuntime>,
    /// Configured helper image; empty means "use the controller's own image".
    configured_image: String,
    host: String,
    discovered_image: OnceCell<String>,
}

impl HostHelper {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, configured_image: String, host: String) -> Self {
        Self {
            runtime,
            configured_image,
            host,
            discovered_image: OnceCell::new(),
        }
    }

    /// Flip the mountpoint to rshared propagation on the host, so sibling
    /// containers bind-mounting it see the FUSE mount appear.
    pub async fn ensure_rshared(&self, mountpoint: &str) -> Result<()> {
        let script = format!(
            "nsenter -t 1 -m -- mount --make-rshared {mp} || mount --make-rshared {mp}",
            mp = mountpoint
        );
        self.run_host_op("rshared-helper", &script, mountpoint).await
    }

    /// Lazily detach a stuck FUSE mount; both commands tolerate failure.
    pub async fn lazy_unmount(&self, mountpoint: &str) -> Result<()> {
        let script = format!(
            "(nsenter -t 1 -m -- fusermount -uz {mp} || true); (nsenter -t 1 -m -- umount -l {mp} || true)",
            mp = mountpoint
        );
        self.run_host_op("umount-helper", &script, mountpoint).await
    }

    async fn run_host_op(&self, role: &str, script: &str, mountpoint: &str) -> Result<()> {
        let image = self.image_ref().await;
        ensure_image_present(self.runtime.as_ref(), &image).await?;

        let spec = ContainerSpec {
            name: naming::helper_name(role, &self.host),
            image,
            cmd: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            privileged: true,
            host_pid: true,
            binds: vec![format!("{}:{}", mountpoint, mountpoint)],
            ..Default::default()
        };

        let id = self
            .runtime
            .create_container(&spec, CREATE_DEADLINE)
            .await
            .with_context(|| format!("create {} helper", role))?;

        if let Err(e) = self.runtime.start_container(&id, START_DEADLINE).await {
            warn!(role, "helper start failed: {}", e);
        }
        // Give the namespace operation a moment to take effect before the
        // helper is discarded.
        tokio::time::sleep(Duration::from_secs(1)).await;

        if let Err(e) = self.runtime.remove_container(&id, true, REMOVE_DEADLINE).await {
            warn!(role, "helper remove failed: {}", e);
        }
        Ok(())
    }

    /// Preflight check: does the helper image actually carry nsenter?
    pub async fn nsenter_check(&self) -> Result<()> {
        let image = self.image_ref().await;
        ensure_image_present(self.runtime.as_ref(), &image).await?;
        let spec = ContainerSpec {
            name: naming::helper_name("nsenter-check", &self.host),
            image,
            cmd: vec![
                "sh".to_string(),
                "-lc".to_string(),
                "nsenter --version >/dev/null 2>&1 || exit 1".to_string(),
            ],
            ..Default::default()
        };
        let id = self
            .runtime
            .create_container(&spec, CREATE_DEADLINE)
            .await
            .context("create nsenter-check helper")?;
        let result = async {
            self.runtime.start_container(&id, START_DEADLINE).await?;
            self.runtime.wait_container(&id, WAIT_DEADLINE).await
        }
        .await;
        if let Err(e) = self.runtime.remove_container(&id, true, REMOVE_DEADLINE).await {
            warn!("nsenter-check remove failed: {}", e);
        }
        match result {
            Ok(0) => Ok(()),
            Ok(code) => bail!("helper image lacks nsenter (exit {})", code),
            Err(e) => Err(e).context("nsenter check"),
        }
    }

    /// The image used for helper containers.
    ///
    /// Prefers the configured image; otherwise discovers the controller's
    /// own image (inspect by hostname, then /proc/self/cgroup) and caches
    /// it, falling back to the published default.
    pub async fn image_ref(&self) -> String {
        if !self.configured_image.trim().is_empty() {
            return self.configured_image.trim().to_string();
        }
        self.discovered_image
            .get_or_init(|| async { self.discover_self_image().await })
            .await
            .clone()
    }

    async fn discover_self_image(&self) -> String {
        // Inside a container the hostname is the container id.
        if let Ok(hn) = hostname::get() {
            let hn = hn.to_string_lossy().to_string();
            if !hn.trim().is_empty() {
                if let Ok(record) = self.runtime.inspect_container(&hn, INSPECT_DEADLINE).await {
                    if !record.image.trim().is_empty() {
                        debug!(image = %record.image, "helper image from self inspect");
                        return record.image;
                    }
                }
            }
        }
        // cgroup path carries the container id on cgroup v1 hosts.
        if let Ok(data) = std::fs::read_to_string("/proc/self/cgroup") {
            for id in cgroup_container_ids(&data) {
                if let Ok(record) = self.runtime.inspect_container(&id, INSPECT_DEADLINE).await {
                    if !record.image.trim().is_empty() {
                        debug!(image = %record.image, "helper image from cgroup");
                        return record.image;
                    }
                }
            }
        }
        DEFAULT_HELPER_IMAGE.to_string()
    }
}

/// Candidate container ids from /proc/self/cgroup contents.
fn cgroup_container_ids(data: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in data.lines() {
        if line.is_empty() {
            continue;
        }
        let path = line.splitn(3, ':').nth(2).unwrap_or(line);
        if let Some(last) = path.rsplit('/').next() {
            let id = last
                .trim()
                .trim_end_matches(".scope")
                .trim_start_matches("docker-");
            if id.len() >= 12 && !out.contains(&id.to_string()) {
                out.push(id.to_string());
            }
        }
    }
    out
}
