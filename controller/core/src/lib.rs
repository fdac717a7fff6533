// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! vols3 core library
//!
//! Per-node reconciling controller for a host-level rclone FUSE mount of an
//! S3-compatible object store, plus declarative prefix provisioning driven
//! by labels on sibling containers.

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
