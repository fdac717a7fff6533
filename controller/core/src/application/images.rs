// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Image presence guard shared by every container-creating path.

use crate::application::{INSPECT_DEADLINE, PULL_DEADLINE};
use crate::domain::runtime::{ContainerRuntime, RuntimeError};
use anyhow::{bail, Context, Result};
use tracing::info;

/// Make sure `reference` is available locally: inspect, pull if missing,
/// then verify the pull actually produced the image.
pub async fn ensure_image_present(runtime: &dyn ContainerRuntime, reference: &str) -> Result<()> {
    let reference = reference.trim();
    if reference.is_empty() {
        bail!("empty image reference");
    }
    match runtime.inspect_image(reference, INSPECT_DEADLINE).await {
        Ok(_) => return Ok(()),
        Err(RuntimeError::NotFound(_)) => {}
        Err(e) => return Err(e).context("inspect image"),
    }
    info!(image = reference, "image missing locally, pulling");
    runtime
        .pull_image(reference, PULL_DEADLINE)
        .await
        .with_context(|| format!("pull image {}", reference))?;
    runtime
        .inspect_image(reference, INSPECT_DEADLINE)
        .await
        .with_context(|| format!("image {} still absent after pull", reference))?;
    Ok(())
}
