// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Host-derived container naming.
//!
//! The managed mounter and every helper container are keyed by the node's
//! hostname: name uniqueness in the runtime is the single-instance interlock,
//! so exactly one mounter can exist per host.

/// Name prefix shared by every managed mounter container.
pub const MOUNTER_NAME_PREFIX: &str = "rclone-mounter-";

/// Label set on the managed mounter so the reaper can identify it later.
pub const MANAGED_LABEL_KEY: &str = "swarmnative.mounter";
pub const MANAGED_LABEL_VALUE: &str = "managed";

/// Sanitize a hostname into a runtime-safe container name fragment.
///
/// Every character outside `[A-Za-z0-9-]` becomes `-`, then leading and
/// trailing hyphens are trimmed.
pub fn sanitize_hostname(host: &str) -> String {
    let mapped: String = host
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    mapped.trim_matches('-').to_string()
}

/// The local node's sanitized hostname, falling back to `unknown`.
pub fn local_hostname() -> String {
    let raw = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_default();
    let sanitized = sanitize_hostname(&raw);
    if sanitized.is_empty() {
        "unknown".to_string()
    } else {
        sanitized
    }
}

/// Name of the managed mounter container on this host.
pub fn mounter_name(host: &str) -> String {
    format!("{}{}", MOUNTER_NAME_PREFIX, host)
}

/// Name of a one-shot helper container for the given role on this host.
pub fn helper_name(role: &str, host: &str) -> String {
    format!("{}-{}", role, host)
}

/// Node-local DNS alias for the S3 load-balancer endpoint on the proxy
/// network.
pub fn local_lb_alias(host: &str) -> String {
    format!("volume-s3-lb-{}", host)
}
