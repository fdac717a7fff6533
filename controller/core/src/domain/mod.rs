// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod claim;
pub mod config;
pub mod metrics;
pub mod naming;
pub mod prefix;
pub mod runtime;

pub use claim::{ClaimSpec, LabelResolver};
pub use config::{Config, Preset, UpdateMode, ValidationReport};
pub use metrics::{ControllerMetrics, MetricsSnapshot};
pub use runtime::{
    ContainerRecord, ContainerRuntime, ContainerSpec, ContainerState, RuntimeError, RuntimeEvent,
};
