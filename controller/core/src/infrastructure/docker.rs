// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Docker implementation of the container runtime seam.
//!
//! The only module that touches `bollard` types; everything crossing the
//! boundary is converted into the plain records of `domain::runtime`.
//! Every call is wrapped in the caller-supplied deadline.

use crate::domain::runtime::{
    ContainerRecord, ContainerRuntime, ContainerSpec, ContainerState, EventStream, ListFilter,
    RuntimeError, RuntimeEvent,
};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, NetworkingConfig, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{
    ContainerStateStatusEnum, ContainerSummary, DeviceMapping, EndpointSettings, HostConfig,
    RestartPolicy, RestartPolicyNameEnum,
};
use bollard::system::EventsOptions;
use bollard::Docker;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the local daemon, or to an explicit socket path.
    pub fn new(socket_path: Option<&str>) -> Result<Self, RuntimeError> {
        let docker = match socket_path {
            Some(path) => Docker::connect_with_unix(path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| {
                    RuntimeError::Unavailable(format!("connect to {}: {}", path, e))
                })?,
            None => Docker::connect_with_local_defaults()
                .map_err(|e| RuntimeError::Unavailable(e.to_string()))?,
        };
        Ok(Self { docker })
    }

    async fn with_deadline<T, F>(
        &self,
        op: &'static str,
        deadline: Duration,
        fut: F,
    ) -> Result<T, RuntimeError>
    where
        F: Future<Output = Result<T, bollard::errors::Error>>,
    {
        match tokio::time::timeout(deadline, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(map_error(e)),
            Err(_) => Err(RuntimeError::Timeout(op.to_string())),
        }
    }
}

fn map_error(e: bollard::errors::Error) -> RuntimeError {
    use bollard::errors::Error as E;
    match e {
        E::DockerResponseServerError {
            status_code: 404,
            message,
        } => RuntimeError::NotFound(message),
        E::DockerResponseServerError {
            status_code: 409,
            message,
        } => RuntimeError::Conflict(message),
        E::DockerResponseServerError {
            status_code,
            message,
        } => RuntimeError::Api(format!("{}: {}", status_code, message)),
        E::HyperResponseError { .. } | E::IOError { .. } => RuntimeError::Unavailable(e.to_string()),
        other => RuntimeError::Api(other.to_string()),
    }
}

fn record_from_summary(s: ContainerSummary) -> ContainerRecord {
    let name = s
        .names
        .as_deref()
        .and_then(|n| n.first())
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_default();
    ContainerRecord {
        id: s.id.unwrap_or_default(),
        name,
        image: s.image.unwrap_or_default(),
        image_id: s.image_id.unwrap_or_default(),
        state: s
            .state
            .as_deref()
            .map(ContainerState::parse)
            .unwrap_or(ContainerState::Unknown),
        labels: s.labels.unwrap_or_default(),
    }
}

fn state_from_status(status: Option<ContainerStateStatusEnum>) -> ContainerState {
    use ContainerStateStatusEnum as S;
    match status {
        Some(S::CREATED) => ContainerState::Created,
        Some(S::RUNNING) => ContainerState::Running,
        Some(S::RESTARTING) => ContainerState::Restarting,
        Some(S::PAUSED) => ContainerState::Paused,
        Some(S::EXITED) => ContainerState::Exited,
        Some(S::DEAD) => ContainerState::Dead,
        _ => ContainerState::Unknown,
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self, deadline: Duration) -> Result<(), RuntimeError> {
        self.with_deadline("ping", deadline, self.docker.ping())
            .await
            .map(|_| ())
    }

    async fn list_containers(
        &self,
        filter: ListFilter,
        deadline: Duration,
    ) -> Result<Vec<ContainerRecord>, RuntimeError> {
        let mut filters: HashMap<String, Vec<String>> = HashMap::new();
        if let Some(name) = filter.name {
            filters.insert("name".to_string(), vec![name]);
        }
        if let Some(label) = filter.label {
            filters.insert("label".to_string(), vec![label]);
        }
        let options = ListContainersOptions::<String> {
            all: filter.all,
            filters,
            ..Default::default()
        };
        let summaries = self
            .with_deadline(
                "list containers",
                deadline,
                self.docker.list_containers(Some(options)),
            )
            .await?;
        Ok(summaries.into_iter().map(record_from_summary).collect())
    }

    async fn inspect_container(
        &self,
        id: &str,
        deadline: Duration,
    ) -> Result<ContainerRecord, RuntimeError> {
        let resp = self
            .with_deadline(
                "inspect container",
                deadline,
                self.docker.inspect_container(id, None),
            )
            .await?;
        let config = resp.config.unwrap_or_default();
        Ok(ContainerRecord {
            id: resp.id.unwrap_or_default(),
            name: resp
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_default(),
            image: config.image.unwrap_or_default(),
            image_id: resp.image.unwrap_or_default(),
            state: state_from_status(resp.state.and_then(|s| s.status)),
            labels: config.labels.unwrap_or_default(),
        })
    }

    async fn create_container(
        &self,
        spec: &ContainerSpec,
        deadline: Duration,
    ) -> Result<String, RuntimeError> {
        let host_config = HostConfig {
            binds: (!spec.binds.is_empty()).then(|| spec.binds.clone()),
            cap_add: (!spec.cap_add.is_empty()).then(|| spec.cap_add.clone()),
            privileged: Some(spec.privileged),
            pid_mode: spec.host_pid.then(|| "host".to_string()),
            network_mode: spec.network_mode.clone(),
            security_opt: (!spec.security_opt.is_empty()).then(|| spec.security_opt.clone()),
            restart_policy: spec.restart_always.then(|| RestartPolicy {
                name: Some(RestartPolicyNameEnum::ALWAYS),
                ..Default::default()
            }),
            devices: spec.fuse_device.then(|| {
                vec![DeviceMapping {
                    path_on_host: Some("/dev/fuse".to_string()),
                    path_in_container: Some("/dev/fuse".to_string()),
                    cgroup_permissions: Some("mrw".to_string()),
                }]
            }),
            ..Default::default()
        };

        let networking_config = (!spec.networks.is_empty()).then(|| NetworkingConfig {
            endpoints_config: spec
                .networks
                .iter()
                .map(|(net, aliases)| {
                    (
                        net.clone(),
                        EndpointSettings {
                            aliases: (!aliases.is_empty()).then(|| aliases.clone()),
                            ..Default::default()
                        },
                    )
                })
                .collect(),
        });

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: (!spec.cmd.is_empty()).then(|| spec.cmd.clone()),
            env: (!spec.env.is_empty()).then(|| spec.env.clone()),
            labels: (!spec.labels.is_empty()).then(|| spec.labels.clone()),
            host_config: Some(host_config),
            networking_config,
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let resp = self
            .with_deadline(
                "create container",
                deadline,
                self.docker.create_container(Some(options), config),
            )
            .await?;
        debug!(id = %resp.id, name = %spec.name, "created container");
        Ok(resp.id)
    }

    async fn start_container(&self, id: &str, deadline: Duration) -> Result<(), RuntimeError> {
        self.with_deadline(
            "start container",
            deadline,
            self.docker
                .start_container(id, None::<StartContainerOptions<String>>),
        )
        .await
    }

    async fn remove_container(
        &self,
        id: &str,
        force: bool,
        deadline: Duration,
    ) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.with_deadline(
            "remove container",
            deadline,
            self.docker.remove_container(id, Some(options)),
        )
        .await
    }

    async fn wait_container(&self, id: &str, deadline: Duration) -> Result<i64, RuntimeError> {
        let options = WaitContainerOptions {
            condition: "not-running".to_string(),
        };
        let mut stream = self.docker.wait_container(id, Some(options));
        match tokio::time::timeout(deadline, stream.next()).await {
            Ok(Some(Ok(resp))) => Ok(resp.status_code),
            Ok(Some(Err(e))) => Err(map_error(e)),
            Ok(None) => Err(RuntimeError::Api("wait stream ended early".to_string())),
            Err(_) => Err(RuntimeError::Timeout("wait container".to_string())),
        }
    }

    async fn inspect_image(
        &self,
        reference: &str,
        deadline: Duration,
    ) -> Result<String, RuntimeError> {
        let inspect = self
            .with_deadline(
                "inspect image",
                deadline,
                self.docker.inspect_image(reference),
            )
            .await?;
        inspect
            .id
            .ok_or_else(|| RuntimeError::Api("image inspect returned no id".to_string()))
    }

    async fn pull_image(&self, reference: &str, deadline: Duration) -> Result<(), RuntimeError> {
        let options = CreateImageOptions {
            from_image: reference.to_string(),
            ..Default::default()
        };
        let drain = async {
            let mut stream = self.docker.create_image(Some(options), None, None);
            while let Some(item) = stream.next().await {
                item?;
            }
            Ok::<_, bollard::errors::Error>(())
        };
        match tokio::time::timeout(deadline, drain).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(map_error(e)),
            Err(_) => Err(RuntimeError::Timeout("pull image".to_string())),
        }
    }

    async fn subscribe_events(&self, kinds: &[&str]) -> Result<EventStream, RuntimeError> {
        let mut filters: HashMap<String, Vec<String>> = HashMap::new();
        filters.insert(
            "type".to_string(),
            kinds.iter().map(|k| k.to_string()).collect(),
        );
        let options = EventsOptions::<String> {
            filters,
            ..Default::default()
        };
        let docker = self.docker.clone();
        let (mut tx, rx) = futures::channel::mpsc::channel(16);
        tokio::spawn(async move {
            let mut stream = docker.events(Some(options));
            while let Some(item) = stream.next().await {
                let mapped = item
                    .map(|msg| RuntimeEvent {
                        kind: msg.typ.map(|t| format!("{:?}", t)).unwrap_or_default(),
                        action: msg.action.unwrap_or_default(),
                    })
                    .map_err(map_error);
                let failed = mapped.is_err();
                if tx.send(mapped).await.is_err() {
                    return;
                }
                if failed {
                    // Let the subscriber resubscribe with backoff.
                    return;
                }
            }
        });
        Ok(rx.boxed())
    }
}
