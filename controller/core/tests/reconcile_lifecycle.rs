// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Reconcile lifecycle scenarios over an in-memory mock runtime:
//! first-boot convergence, image drift replacement, stuck-mount healing,
//! orphan reaping, and reconcile idempotency.

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vols3_core::application::MountController;
use vols3_core::domain::config::Config;
use vols3_core::domain::naming;
use vols3_core::domain::runtime::{
    ContainerRecord, ContainerRuntime, ContainerSpec, ContainerState, EventStream, ListFilter,
    RuntimeError,
};

// ============================================================================
// Mock runtime
// ============================================================================

#[derive(Clone)]
struct Entry {
    id: String,
    name: String,
    image: String,
    image_id: String,
    state: ContainerState,
    labels: HashMap<String, String>,
}

impl Entry {
    fn record(&self) -> ContainerRecord {
        ContainerRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            image: self.image.clone(),
            image_id: self.image_id.clone(),
            state: self.state,
            labels: self.labels.clone(),
        }
    }
}

#[derive(Default)]
struct Inner {
    containers: Vec<Entry>,
    images: HashMap<String, String>,
    created: Vec<ContainerSpec>,
    removed: Vec<String>,
    next_id: u64,
}

#[derive(Default)]
struct MockRuntime {
    inner: Mutex<Inner>,
    // Invoked after a container is created; lets tests simulate the side
    // effects of helper containers (e.g. a lazy unmount freeing the path).
    on_create: Mutex<Option<Box<dyn Fn(&ContainerSpec) + Send + Sync>>>,
}

impl MockRuntime {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn register_image(&self, reference: &str, id: &str) {
        self.inner
            .lock()
            .unwrap()
            .images
            .insert(reference.to_string(), id.to_string());
    }

    fn insert_container(
        &self,
        name: &str,
        image_id: &str,
        state: ContainerState,
        labels: &[(&str, &str)],
    ) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = format!("pre-{}", inner.next_id);
        inner.containers.push(Entry {
            id,
            name: name.to_string(),
            image: String::new(),
            image_id: image_id.to_string(),
            state,
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
    }

    fn set_on_create(&self, f: impl Fn(&ContainerSpec) + Send + Sync + 'static) {
        *self.on_create.lock().unwrap() = Some(Box::new(f));
    }

    fn created_names(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .created
            .iter()
            .map(|s| s.name.clone())
            .collect()
    }

    fn created_specs(&self) -> Vec<ContainerSpec> {
        self.inner.lock().unwrap().created.clone()
    }

    fn removed_ids(&self) -> Vec<String> {
        self.inner.lock().unwrap().removed.clone()
    }

    fn containers_named(&self, prefix: &str) -> Vec<Entry> {
        self.inner
            .lock()
            .unwrap()
            .containers
            .iter()
            .filter(|c| c.name.starts_with(prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn ping(&self, _deadline: Duration) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn list_containers(
        &self,
        filter: ListFilter,
        _deadline: Duration,
    ) -> Result<Vec<ContainerRecord>, RuntimeError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .containers
            .iter()
            .filter(|c| filter.all || c.state == ContainerState::Running)
            .filter(|c| {
                filter
                    .name
                    .as_deref()
                    .map_or(true, |n| c.name.contains(n))
            })
            .filter(|c| {
                filter.label.as_deref().map_or(true, |l| match l.split_once('=') {
                    Some((k, v)) => c.labels.get(k).map(String::as_str) == Some(v),
                    None => c.labels.contains_key(l),
                })
            })
            .map(Entry::record)
            .collect())
    }

    async fn inspect_container(
        &self,
        id: &str,
        _deadline: Duration,
    ) -> Result<ContainerRecord, RuntimeError> {
        let inner = self.inner.lock().unwrap();
        inner
            .containers
            .iter()
            .find(|c| c.id == id || c.name == id)
            .map(Entry::record)
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))
    }

    async fn create_container(
        &self,
        spec: &ContainerSpec,
        _deadline: Duration,
    ) -> Result<String, RuntimeError> {
        let id = {
            let mut inner = self.inner.lock().unwrap();
            if inner.containers.iter().any(|c| c.name == spec.name) {
                return Err(RuntimeError::Conflict(format!(
                    "name {} already in use",
                    spec.name
                )));
            }
            inner.next_id += 1;
            let id = format!("id-{}", inner.next_id);
            let image_id = inner.images.get(&spec.image).cloned().unwrap_or_default();
            inner.containers.push(Entry {
                id: id.clone(),
                name: spec.name.clone(),
                image: spec.image.clone(),
                image_id,
                state: ContainerState::Created,
                labels: spec.labels.clone(),
            });
            inner.created.push(spec.clone());
            id
        };
        if let Some(hook) = self.on_create.lock().unwrap().as_ref() {
            hook(spec);
        }
        Ok(id)
    }

    async fn start_container(&self, id: &str, _deadline: Duration) -> Result<(), RuntimeError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.containers.iter_mut().find(|c| c.id == id) {
            Some(c) => {
                c.state = ContainerState::Running;
                Ok(())
            }
            None => Err(RuntimeError::NotFound(id.to_string())),
        }
    }

    async fn remove_container(
        &self,
        id: &str,
        _force: bool,
        _deadline: Duration,
    ) -> Result<(), RuntimeError> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.containers.len();
        inner.containers.retain(|c| c.id != id);
        if inner.containers.len() == before {
            return Err(RuntimeError::NotFound(id.to_string()));
        }
        inner.removed.push(id.to_string());
        Ok(())
    }

    async fn wait_container(&self, _id: &str, _deadline: Duration) -> Result<i64, RuntimeError> {
        Ok(0)
    }

    async fn inspect_image(
        &self,
        reference: &str,
        _deadline: Duration,
    ) -> Result<String, RuntimeError> {
        let inner = self.inner.lock().unwrap();
        inner
            .images
            .get(reference)
            .cloned()
            .ok_or_else(|| RuntimeError::NotFound(reference.to_string()))
    }

    async fn pull_image(&self, reference: &str, _deadline: Duration) -> Result<(), RuntimeError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .images
            .entry(reference.to_string())
            .or_insert_with(|| format!("sha256:{}", reference));
        Ok(())
    }

    async fn subscribe_events(&self, _kinds: &[&str]) -> Result<EventStream, RuntimeError> {
        Ok(futures::stream::pending().boxed())
    }
}

// ============================================================================
// Scenarios
// ============================================================================

fn test_config(mountpoint: &str) -> Config {
    Config {
        mountpoint: mountpoint.to_string(),
        helper_image: "helper:latest".to_string(),
        access_key_file: "/dev/null".to_string(),
        secret_key_file: "/dev/null".to_string(),
        ..Config::default()
    }
}

#[tokio::test]
async fn test_first_reconcile_creates_mounter() {
    let dir = tempfile::tempdir().unwrap();
    let mountpoint = dir.path().to_string_lossy().into_owned();
    let runtime = MockRuntime::new();
    let controller = MountController::new(test_config(&mountpoint), runtime.clone());

    controller.reconcile().await.unwrap();

    // The host-namespace propagation helper ran exactly once and was removed.
    let created = runtime.created_names();
    assert_eq!(
        created
            .iter()
            .filter(|n| n.starts_with("rshared-helper-"))
            .count(),
        1
    );

    // Exactly one managed mounter exists, running the documented command.
    let host = naming::local_hostname();
    let mounters = runtime.containers_named(naming::MOUNTER_NAME_PREFIX);
    assert_eq!(mounters.len(), 1);
    assert_eq!(mounters[0].name, naming::mounter_name(&host));
    assert_eq!(mounters[0].state, ContainerState::Running);

    let mounter_spec = runtime
        .created_specs()
        .into_iter()
        .find(|s| s.name == naming::mounter_name(&host))
        .expect("mounter created");
    assert_eq!(
        mounter_spec.cmd,
        vec![
            "mount".to_string(),
            "S3:bucket".to_string(),
            mountpoint.clone(),
            "--allow-other".to_string(),
            "--vfs-cache-mode=writes".to_string(),
            "--dir-cache-time=12h".to_string(),
        ]
    );

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.mounter_created_total, 1);
    assert_eq!(snapshot.reconcile_errors, 0);
    assert_eq!(snapshot.reconcile_total, 1);
}

#[tokio::test]
async fn test_image_drift_replaces_mounter() {
    let dir = tempfile::tempdir().unwrap();
    let mountpoint = dir.path().to_string_lossy().into_owned();
    let runtime = MockRuntime::new();
    let host = naming::local_hostname();
    let name = naming::mounter_name(&host);

    // Desired image resolves to sha256:A; the running mounter is on sha256:B.
    runtime.register_image("rclone/rclone:latest", "sha256:A");
    runtime.insert_container(
        &name,
        "sha256:B",
        ContainerState::Running,
        &[("swarmnative.mounter", "managed")],
    );

    let controller = MountController::new(test_config(&mountpoint), runtime.clone());
    controller.reconcile().await.unwrap();

    assert!(runtime.removed_ids().contains(&"pre-1".to_string()));
    let mounters = runtime.containers_named(naming::MOUNTER_NAME_PREFIX);
    assert_eq!(mounters.len(), 1, "exactly one mounter after replacement");
    assert_eq!(mounters[0].image_id, "sha256:A");
    assert_eq!(mounters[0].state, ContainerState::Running);
    assert_eq!(controller.snapshot().mounter_created_total, 1);
}

#[tokio::test]
async fn test_running_mounter_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let mountpoint = dir.path().to_string_lossy().into_owned();
    let runtime = MockRuntime::new();
    let host = naming::local_hostname();

    runtime.register_image("rclone/rclone:latest", "sha256:A");
    runtime.insert_container(
        &naming::mounter_name(&host),
        "sha256:A",
        ContainerState::Running,
        &[("swarmnative.mounter", "managed")],
    );

    let controller = MountController::new(test_config(&mountpoint), runtime.clone());
    controller.reconcile().await.unwrap();

    assert_eq!(controller.snapshot().mounter_created_total, 0);
    assert!(runtime.removed_ids().iter().all(|id| !id.starts_with("pre-")));
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let mountpoint = dir.path().to_string_lossy().into_owned();
    let runtime = MockRuntime::new();
    let controller = MountController::new(test_config(&mountpoint), runtime.clone());

    controller.reconcile().await.unwrap();
    let first = controller.snapshot();
    controller.reconcile().await.unwrap();
    let second = controller.snapshot();

    assert_eq!(second.reconcile_total, first.reconcile_total + 1);
    assert_eq!(second.reconcile_errors, first.reconcile_errors);
    assert_eq!(second.heal_attempts_total, first.heal_attempts_total);
    assert_eq!(second.heal_success_total, first.heal_success_total);
    assert_eq!(second.orphan_cleanup_total, first.orphan_cleanup_total);
    assert_eq!(second.mounter_created_total, first.mounter_created_total);
    assert_eq!(second.mounter_running, first.mounter_running);
    assert_eq!(second.mount_writable, first.mount_writable);
}

#[tokio::test]
async fn test_stuck_mount_heals() {
    let dir = tempfile::tempdir().unwrap();
    // A regular file where the mountpoint directory should be makes every
    // probe fail, standing in for a dead FUSE endpoint.
    let mountpoint = dir.path().join("mnt");
    std::fs::write(&mountpoint, b"stuck").unwrap();
    let mountpoint_str = mountpoint.to_string_lossy().into_owned();

    let runtime = MockRuntime::new();
    {
        let mountpoint = mountpoint.clone();
        runtime.set_on_create(move |spec| {
            // The lazy-unmount helper frees the path.
            if spec.name.starts_with("umount-helper-") {
                let _ = std::fs::remove_file(&mountpoint);
                let _ = std::fs::create_dir_all(&mountpoint);
            }
        });
    }

    let controller = MountController::new(test_config(&mountpoint_str), runtime.clone());
    controller.reconcile().await.unwrap();

    let created = runtime.created_names();
    assert_eq!(
        created
            .iter()
            .filter(|n| n.starts_with("umount-helper-"))
            .count(),
        1
    );
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.heal_attempts_total, 1);
    assert_eq!(snapshot.heal_success_total, 1);
    assert!(snapshot.last_heal_success_unix > 0);
    assert!(snapshot.mount_writable);

    // Healed: the next pass is a no-op heal and does not count an attempt.
    controller.reconcile().await.unwrap();
    assert_eq!(controller.snapshot().heal_attempts_total, 1);
}

#[tokio::test]
async fn test_orphan_mounters_reaped() {
    let dir = tempfile::tempdir().unwrap();
    let mountpoint = dir.path().to_string_lossy().into_owned();
    let runtime = MockRuntime::new();
    let host = naming::local_hostname();
    let current = naming::mounter_name(&host);
    let managed = [("swarmnative.mounter", "managed")];

    runtime.register_image("rclone/rclone:latest", "sha256:A");
    runtime.insert_container(&current, "sha256:A", ContainerState::Running, &managed);
    runtime.insert_container("rclone-mounter-old1", "sha256:A", ContainerState::Exited, &managed);
    runtime.insert_container("rclone-mounter-old2", "sha256:A", ContainerState::Created, &managed);

    let controller = MountController::new(test_config(&mountpoint), runtime.clone());
    controller.reconcile().await.unwrap();

    let survivors = runtime.containers_named(naming::MOUNTER_NAME_PREFIX);
    assert_eq!(survivors.len(), 1);
    assert_eq!(survivors[0].name, current);
    assert_eq!(controller.snapshot().orphan_cleanup_total, 2);
}
