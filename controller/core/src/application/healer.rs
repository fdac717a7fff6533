// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Mount heal path.
//!
//! Healing is stateless from the mounter's perspective: a lazy unmount drops
//! the kernel's references to the dead FUSE endpoint, and the supervisor's
//! next pass re-establishes the mount. No synchronization with the mounter
//! container is needed.

use crate::application::helper::HostHelper;
use crate::application::PROBE_DEADLINE;
use crate::domain::metrics::ControllerMetrics;
use crate::infrastructure::probe::MountProber;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub struct MountHealer {
    helper: Arc<HostHelper>,
    prober: MountProber,
    metrics: Arc<ControllerMetrics>,
    mountpoint: PathBuf,
}

impl MountHealer {
    pub fn new(
        helper: Arc<HostHelper>,
        prober: MountProber,
        metrics: Arc<ControllerMetrics>,
        mountpoint: impl Into<PathBuf>,
    ) -> Self {
        Self {
            helper,
            prober,
            metrics,
            mountpoint: mountpoint.into(),
        }
    }

    /// Probe the mount; when it is stuck, lazily unmount it and re-probe.
    ///
    /// A no-op pass (probe succeeded) does not count as a heal attempt.
    pub async fn check_and_heal(&self) -> Result<()> {
        if self
            .prober
            .test_rw(&self.mountpoint, PROBE_DEADLINE)
            .await
            .is_ok()
        {
            return Ok(());
        }

        self.metrics.inc_heal_attempts();
        info!(mountpoint = %self.mountpoint.display(), "mount not writable, attempting lazy unmount");
        if let Err(e) = self
            .helper
            .lazy_unmount(&self.mountpoint.to_string_lossy())
            .await
        {
            warn!("lazy unmount helper failed: {}", e);
        }

        if self
            .prober
            .test_rw(&self.mountpoint, PROBE_DEADLINE)
            .await
            .is_ok()
        {
            self.metrics
                .record_heal_success(chrono::Utc::now().timestamp());
            info!("mount healed");
        }
        Ok(())
    }
}
