// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod controller;
pub mod healer;
pub mod helper;
pub mod images;
pub mod provisioner;
pub mod reaper;
pub mod supervisor;

pub use controller::MountController;
pub use healer::MountHealer;
pub use helper::HostHelper;
pub use provisioner::ClaimProvisioner;
pub use reaper::OrphanReaper;
pub use supervisor::MounterSupervisor;

use std::time::Duration;

// Per-call runtime deadlines. Image pulls get the long one.
pub(crate) const INSPECT_DEADLINE: Duration = Duration::from_secs(5);
pub(crate) const LIST_DEADLINE: Duration = Duration::from_secs(10);
pub(crate) const START_DEADLINE: Duration = Duration::from_secs(15);
pub(crate) const CREATE_DEADLINE: Duration = Duration::from_secs(20);
pub(crate) const REMOVE_DEADLINE: Duration = Duration::from_secs(10);
pub(crate) const WAIT_DEADLINE: Duration = Duration::from_secs(60);
pub(crate) const PULL_DEADLINE: Duration = Duration::from_secs(60);
pub(crate) const PROBE_DEADLINE: Duration = Duration::from_secs(5);
