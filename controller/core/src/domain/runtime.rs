// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Container runtime seam.
//!
//! The controller talks to the container runtime exclusively through the
//! [`ContainerRuntime`] trait, which returns plain records instead of
//! runtime-specific types. Every call carries an explicit deadline; the
//! implementation must abort the underlying request when it expires.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime unavailable: {0}")]
    Unavailable(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("deadline exceeded: {0}")]
    Timeout(String),
    #[error("runtime api error: {0}")]
    Api(String),
}

impl RuntimeError {
    /// Whether retrying the same call next reconcile is reasonable.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// Coarse container state as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Created,
    Running,
    Restarting,
    Paused,
    Exited,
    Dead,
    Unknown,
}

impl ContainerState {
    pub fn parse(s: &str) -> Self {
        match s {
            "created" => Self::Created,
            "running" => Self::Running,
            "restarting" => Self::Restarting,
            "paused" => Self::Paused,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            _ => Self::Unknown,
        }
    }

    /// Running or about to be running again under a restart policy.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Running | Self::Restarting)
    }
}

/// Plain record describing an existing container.
#[derive(Debug, Clone)]
pub struct ContainerRecord {
    pub id: String,
    /// Primary name, without the runtime's leading slash.
    pub name: String,
    /// Image reference the container was created with.
    pub image: String,
    /// Image id (digest form) the container was created from.
    pub image_id: String,
    pub state: ContainerState,
    pub labels: HashMap<String, String>,
}

/// Listing filter. `name` and `label` map to the runtime's native filters;
/// the name filter matches substrings, so callers match exact names
/// themselves when it matters.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub all: bool,
    pub name: Option<String>,
    pub label: Option<String>,
}

/// Everything needed to create a container, runtime-agnostic.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub cmd: Vec<String>,
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    pub binds: Vec<String>,
    pub cap_add: Vec<String>,
    pub privileged: bool,
    /// Join the host PID namespace (required for nsenter into PID 1).
    pub host_pid: bool,
    pub network_mode: Option<String>,
    pub security_opt: Vec<String>,
    /// Map /dev/fuse into the container with `mrw` cgroup permissions.
    pub fuse_device: bool,
    pub restart_always: bool,
    /// Additional networks to attach, each with its endpoint aliases.
    pub networks: BTreeMap<String, Vec<String>>,
}

/// A runtime event relevant to reconciliation (container/service churn).
#[derive(Debug, Clone)]
pub struct RuntimeEvent {
    pub kind: String,
    pub action: String,
}

pub type EventStream = BoxStream<'static, Result<RuntimeEvent, RuntimeError>>;

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Liveness of the runtime daemon itself.
    async fn ping(&self, deadline: Duration) -> Result<(), RuntimeError>;

    async fn list_containers(
        &self,
        filter: ListFilter,
        deadline: Duration,
    ) -> Result<Vec<ContainerRecord>, RuntimeError>;

    async fn inspect_container(
        &self,
        id: &str,
        deadline: Duration,
    ) -> Result<ContainerRecord, RuntimeError>;

    async fn create_container(
        &self,
        spec: &ContainerSpec,
        deadline: Duration,
    ) -> Result<String, RuntimeError>;

    async fn start_container(&self, id: &str, deadline: Duration) -> Result<(), RuntimeError>;

    async fn remove_container(
        &self,
        id: &str,
        force: bool,
        deadline: Duration,
    ) -> Result<(), RuntimeError>;

    /// Wait until the container is no longer running; returns the exit code.
    async fn wait_container(&self, id: &str, deadline: Duration) -> Result<i64, RuntimeError>;

    /// Image id (digest form) for a local image reference.
    async fn inspect_image(&self, reference: &str, deadline: Duration)
        -> Result<String, RuntimeError>;

    /// Pull an image, draining the progress stream to completion.
    async fn pull_image(&self, reference: &str, deadline: Duration) -> Result<(), RuntimeError>;

    /// Subscribe to container and service events. The stream ends (or yields
    /// an error) when the underlying connection drops; callers resubscribe.
    async fn subscribe_events(&self, kinds: &[&str]) -> Result<EventStream, RuntimeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_parse() {
        assert_eq!(ContainerState::parse("running"), ContainerState::Running);
        assert_eq!(ContainerState::parse("exited"), ContainerState::Exited);
        assert_eq!(ContainerState::parse("weird"), ContainerState::Unknown);
    }

    #[test]
    fn test_live_states() {
        assert!(ContainerState::Running.is_live());
        assert!(ContainerState::Restarting.is_live());
        assert!(!ContainerState::Created.is_live());
        assert!(!ContainerState::Exited.is_live());
    }
}
