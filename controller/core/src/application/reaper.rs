// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Orphan mounter reaper.
//!
//! A replaced or crashed mounter leaves an exited container behind (the
//! supervisor force-removes on replacement, but the controller itself can
//! die mid-pass). Anything carrying the managed label and the mounter name
//! prefix that is neither running nor restarting gets force-removed.

use crate::application::{LIST_DEADLINE, REMOVE_DEADLINE};
use crate::domain::metrics::ControllerMetrics;
use crate::domain::naming;
use crate::domain::runtime::{ContainerRuntime, ListFilter};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

pub struct OrphanReaper {
    runtime: Arc<dyn ContainerRuntime>,
    metrics: Arc<ControllerMetrics>,
}

impl OrphanReaper {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, metrics: Arc<ControllerMetrics>) -> Self {
        Self { runtime, metrics }
    }

    /// Remove dead managed mounters; returns how many were reaped.
    pub async fn reap(&self) -> Result<u64> {
        let listed = self
            .runtime
            .list_containers(
                ListFilter {
                    all: true,
                    name: Some(naming::MOUNTER_NAME_PREFIX.to_string()),
                    label: Some(format!(
                        "{}={}",
                        naming::MANAGED_LABEL_KEY,
                        naming::MANAGED_LABEL_VALUE
                    )),
                },
                LIST_DEADLINE,
            )
            .await
            .context("list managed mounters")?;

        let mut removed = 0u64;
        for container in listed {
            if !container.name.starts_with(naming::MOUNTER_NAME_PREFIX) {
                continue;
            }
            if container.state.is_live() {
                continue;
            }
            if self
                .runtime
                .remove_container(&container.id, true, REMOVE_DEADLINE)
                .await
                .is_ok()
            {
                info!(name = %container.name, "removed orphaned mounter");
                removed += 1;
            }
        }
        if removed > 0 {
            self.metrics.add_orphans_cleaned(removed);
        }
        Ok(removed)
    }
}
