// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Mounter supervisor.
//!
//! Keeps exactly one running container whose name equals the managed name
//! and whose image matches the most recently pulled image id. Name
//! uniqueness in the runtime is the only interlock.

use crate::application::images::ensure_image_present;
use crate::application::{
    CREATE_DEADLINE, INSPECT_DEADLINE, LIST_DEADLINE, PULL_DEADLINE, REMOVE_DEADLINE,
    START_DEADLINE,
};
use crate::domain::config::{Config, UpdateMode};
use crate::domain::metrics::ControllerMetrics;
use crate::domain::naming;
use crate::domain::runtime::{ContainerRuntime, ContainerSpec, ContainerState, ListFilter};
use crate::infrastructure::credentials::Credentials;
use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Default)]
struct ImageState {
    last_pull: Option<Instant>,
    last_image_id: Option<String>,
}

pub struct MounterSupervisor {
    runtime: Arc<dyn ContainerRuntime>,
    config: Arc<Config>,
    metrics: Arc<ControllerMetrics>,
    host: String,
    state: Mutex<ImageState>,
}

impl MounterSupervisor {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        config: Arc<Config>,
        metrics: Arc<ControllerMetrics>,
        host: String,
    ) -> Self {
        Self {
            runtime,
            config,
            metrics,
            host,
            state: Mutex::new(ImageState::default()),
        }
    }

    /// Refresh the mounter image according to the configured mode.
    pub async fn refresh_image(&self) -> Result<()> {
        match self.config.update_mode() {
            UpdateMode::Never => Ok(()),
            UpdateMode::Periodic => self.pull_if_due().await,
            UpdateMode::OnChange => self.pull_if_changed().await,
        }
    }

    async fn pull_if_due(&self) -> Result<()> {
        {
            let state = self.state.lock().await;
            if let Some(last) = state.last_pull {
                if last.elapsed() < self.config.mounter_pull_interval {
                    return Ok(());
                }
            }
        }
        self.runtime
            .pull_image(&self.config.mounter_image, PULL_DEADLINE)
            .await
            .context("pull mounter image")?;
        let mut state = self.state.lock().await;
        state.last_pull = Some(Instant::now());
        if let Ok(id) = self
            .runtime
            .inspect_image(&self.config.mounter_image, INSPECT_DEADLINE)
            .await
        {
            state.last_image_id = Some(id);
        }
        Ok(())
    }

    async fn pull_if_changed(&self) -> Result<()> {
        let current = self.desired_image_id().await;
        self.runtime
            .pull_image(&self.config.mounter_image, PULL_DEADLINE)
            .await
            .context("pull mounter image")?;
        let pulled = self
            .runtime
            .inspect_image(&self.config.mounter_image, INSPECT_DEADLINE)
            .await
            .ok();
        let mut state = self.state.lock().await;
        state.last_pull = Some(Instant::now());
        match (current, pulled) {
            (Some(old), Some(new)) if old == new => {}
            (_, Some(new)) => {
                info!(image_id = %new, "mounter image changed");
                state.last_image_id = Some(new);
            }
            (_, None) => {}
        }
        Ok(())
    }

    /// The image id the mounter should be running; populated by pulls and
    /// lazily from the local image store.
    pub async fn desired_image_id(&self) -> Option<String> {
        let mut state = self.state.lock().await;
        if state.last_image_id.is_some() {
            return state.last_image_id.clone();
        }
        match self
            .runtime
            .inspect_image(&self.config.mounter_image, INSPECT_DEADLINE)
            .await
        {
            Ok(id) => {
                state.last_image_id = Some(id.clone());
                Some(id)
            }
            Err(_) => None,
        }
    }

    /// Converge the managed mounter to "running with the desired image".
    pub async fn ensure_mounter(&self) -> Result<()> {
        let name = naming::mounter_name(&self.host);
        let listed = self
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
            .context("list mounter")?;

        // The runtime's name filter matches substrings.
        if let Some(found) = listed.iter().find(|c| c.name == name) {
            if let Ok(record) = self
                .runtime
                .inspect_container(&found.id, INSPECT_DEADLINE)
                .await
            {
                let desired = self.desired_image_id().await;
                let drifted = desired
                    .as_deref()
                    .is_some_and(|d| !record.image_id.is_empty() && d != record.image_id);
                if drifted {
                    info!(name = %name, "mounter image drifted, replacing");
                    let _ = self
                        .runtime
                        .remove_container(&found.id, true, REMOVE_DEADLINE)
                        .await;
                } else if record.state == ContainerState::Running {
                    return Ok(());
                } else {
                    match self.runtime.start_container(&found.id, START_DEADLINE).await {
                        Ok(()) => return Ok(()),
                        Err(e) => {
                            warn!(name = %name, "mounter start failed, recreating: {}", e);
                            let _ = self
                                .runtime
                                .remove_container(&found.id, true, REMOVE_DEADLINE)
                                .await;
                        }
                    }
                }
            }
        }

        ensure_image_present(self.runtime.as_ref(), &self.config.mounter_image)
            .await
            .context("ensure mounter image")?;

        let creds = Credentials::resolve(&self.config);
        let spec = build_mounter_spec(&self.config, &self.host, &creds);
        let id = self
            .runtime
            .create_container(&spec, CREATE_DEADLINE)
            .await
            .context("create mounter")?;
        self.runtime
            .start_container(&id, START_DEADLINE)
            .await
            .context("start mounter")?;
        self.metrics.inc_mounter_created();
        info!(name = %name, id = %id, "mounter created");
        Ok(())
    }
}

/// Assemble the mounter create-spec: rclone environment, mount command with
/// preset and user args, FUSE device access, rshared bind of the mountpoint.
pub(crate) fn build_mounter_spec(
    config: &Config,
    host: &str,
    creds: &Credentials,
) -> ContainerSpec {
    let endpoint = config.resolved_endpoint(host);
    let env = creds.rclone_env(&endpoint, &config.s3_provider);

    let mut cmd = vec![
        "mount".to_string(),
        config.rclone_remote.clone(),
        config.mountpoint.clone(),
        "--allow-other".to_string(),
        "--vfs-cache-mode=writes".to_string(),
        "--dir-cache-time=12h".to_string(),
    ];
    cmd.extend(config.preset().args().iter().map(|s| s.to_string()));
    if config.read_only {
        cmd.push("--read-only".to_string());
    }
    cmd.extend(split_args(&config.rclone_extra_args));

    let mut labels = HashMap::new();
    labels.insert(
        naming::MANAGED_LABEL_KEY.to_string(),
        naming::MANAGED_LABEL_VALUE.to_string(),
    );

    let mut networks = BTreeMap::new();
    if !config.proxy_network.trim().is_empty() {
        let aliases = if config.enable_proxy && config.local_lb_enabled {
            vec![naming::local_lb_alias(host)]
        } else {
            Vec::new()
        };
        networks.insert(config.proxy_network.trim().to_string(), aliases);
    }

    ContainerSpec {
        name: naming::mounter_name(host),
        image: config.mounter_image.clone(),
        cmd,
        env,
        labels,
        binds: vec![
            "/dev/fuse:/dev/fuse".to_string(),
            format!("{mp}:{mp}:rshared", mp = config.mountpoint),
        ],
        cap_add: vec!["SYS_ADMIN".to_string()],
        privileged: false,
        host_pid: false,
        network_mode: Some("bridge".to_string()),
        security_opt: vec![
            "apparmor=unconfined".to_string(),
            "seccomp=unconfined".to_string(),
        ],
        fuse_device: true,
        restart_always: true,
        networks,
    }
}

/// Whitespace-split user args; quoting is intentionally not supported.
pub(crate) fn split_args(s: &str) -> Vec<String> {
    s.split_whitespace().map(|p| p.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::default()
    }

    fn creds() -> Credentials {
        Credentials {
            access_key: "ak".to_string(),
            secret_key: "sk".to_string(),
            session_token: String::new(),
        }
    }

    #[test]
    fn test_split_args() {
        assert!(split_args("").is_empty());
        assert!(split_args("   ").is_empty());
        assert_eq!(split_args("--a  --b=1"), vec!["--a", "--b=1"]);
    }

    #[test]
    fn test_base_mount_command() {
        let spec = build_mounter_spec(&config(), "node-1", &creds());
        assert_eq!(
            spec.cmd,
            vec![
                "mount",
                "S3:bucket",
                "/mnt/s3",
                "--allow-other",
                "--vfs-cache-mode=writes",
                "--dir-cache-time=12h",
            ]
        );
        assert_eq!(spec.name, "rclone-mounter-node-1");
        assert!(spec.restart_always);
        assert!(spec.fuse_device);
        assert_eq!(spec.cap_add, vec!["SYS_ADMIN"]);
        assert!(spec
            .binds
            .contains(&"/mnt/s3:/mnt/s3:rshared".to_string()));
        assert_eq!(
            spec.labels.get("swarmnative.mounter").map(String::as_str),
            Some("managed")
        );
    }

    #[test]
    fn test_command_order_preset_readonly_extra() {
        let cfg = Config {
            preset: "wasabi".to_string(),
            read_only: true,
            rclone_extra_args: "--fast-list --transfers=8".to_string(),
            ..config()
        };
        let spec = build_mounter_spec(&cfg, "n", &creds());
        let tail: Vec<_> = spec.cmd[6..].iter().map(String::as_str).collect();
        assert_eq!(
            tail,
            vec![
                "--s3-region=us-east-1",
                "--s3-force-path-style=true",
                "--read-only",
                "--fast-list",
                "--transfers=8",
            ]
        );
    }

    #[test]
    fn test_endpoint_rewritten_for_local_lb() {
        let cfg = Config {
            enable_proxy: true,
            local_lb_enabled: true,
            proxy_network: "s3-net".to_string(),
            ..config()
        };
        let spec = build_mounter_spec(&cfg, "node-1", &creds());
        assert!(spec
            .env
            .contains(&"RCLONE_CONFIG_S3_ENDPOINT=http://volume-s3-lb-node-1:8081".to_string()));
        assert_eq!(
            spec.networks.get("s3-net").map(Vec::as_slice),
            Some(&["volume-s3-lb-node-1".to_string()][..])
        );
    }

    #[test]
    fn test_endpoint_unchanged_without_local_lb() {
        let cfg = Config {
            enable_proxy: true,
            local_lb_enabled: false,
            proxy_network: "s3-net".to_string(),
            ..config()
        };
        let spec = build_mounter_spec(&cfg, "node-1", &creds());
        assert!(spec
            .env
            .contains(&"RCLONE_CONFIG_S3_ENDPOINT=http://s3.local:9000".to_string()));
        // Attached to the network, but with no alias.
        assert_eq!(spec.networks.get("s3-net").map(Vec::len), Some(0));
    }
}
