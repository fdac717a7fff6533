// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod credentials;
pub mod docker;
pub mod probe;

pub use credentials::Credentials;
pub use docker::DockerRuntime;
pub use probe::MountProber;
