// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Mountpoint write probe.
//!
//! The probe is the controller's source of truth for "is the FUSE mount
//! usable": it creates the mountpoint if absent, writes a fixed-name
//! sentinel, and removes it again. A stuck FUSE mount can block filesystem
//! calls indefinitely, so every probe runs on the blocking pool under a
//! deadline.

use anyhow::{bail, Context, Result};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const RW_SENTINEL: &str = ".rw-test";

#[derive(Debug, Clone)]
pub struct MountProber {
    read_only: bool,
}

impl MountProber {
    pub fn new(read_only: bool) -> Self {
        Self { read_only }
    }

    /// Probe the mountpoint for writability.
    ///
    /// Success means the directory exists and (unless read-only) a sentinel
    /// file could be written and unlinked.
    pub async fn test_rw(&self, mountpoint: &Path, deadline: Duration) -> Result<()> {
        self.probe(mountpoint.to_path_buf(), RW_SENTINEL.to_string(), "ok".to_string(), deadline)
            .await
    }

    /// Readiness variant: the sentinel is the configured ready file and
    /// carries the probe timestamp.
    pub async fn ready_probe(
        &self,
        mountpoint: &Path,
        ready_file: &str,
        deadline: Duration,
    ) -> Result<()> {
        self.probe(
            mountpoint.to_path_buf(),
            ready_file.to_string(),
            chrono::Utc::now().to_rfc3339(),
            deadline,
        )
        .await
    }

    async fn probe(
        &self,
        mountpoint: PathBuf,
        file_name: String,
        contents: String,
        deadline: Duration,
    ) -> Result<()> {
        let read_only = self.read_only;
        let blocking = tokio::task::spawn_blocking(move || -> Result<()> {
            std::fs::DirBuilder::new()
                .recursive(true)
                .mode(0o755)
                .create(&mountpoint)
                .with_context(|| format!("create mountpoint {}", mountpoint.display()))?;
            if read_only {
                return Ok(());
            }
            let sentinel = mountpoint.join(file_name);
            std::fs::write(&sentinel, contents)
                .with_context(|| format!("write probe {}", sentinel.display()))?;
            std::fs::remove_file(&sentinel)
                .with_context(|| format!("remove probe {}", sentinel.display()))?;
            Ok(())
        });
        match tokio::time::timeout(deadline, blocking).await {
            Ok(joined) => joined.context("probe task panicked")?,
            Err(_) => bail!("mount probe timed out after {:?}", deadline),
        }
    }
}
