// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Controller metrics.
//!
//! Counters and gauges are written only by the reconcile task and read by
//! the HTTP layer, so plain atomics with relaxed ordering are sufficient;
//! [`ControllerMetrics::snapshot`] hands out a value copy.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ControllerMetrics {
    reconcile_total: AtomicU64,
    reconcile_errors: AtomicU64,
    heal_attempts_total: AtomicU64,
    heal_success_total: AtomicU64,
    orphan_cleanup_total: AtomicU64,
    mounter_created_total: AtomicU64,
    mounter_running: AtomicBool,
    mount_writable: AtomicBool,
    last_heal_success_unix: AtomicI64,
    last_reconcile_ms: AtomicU64,
}

impl ControllerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_reconcile(&self) {
        self.reconcile_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reconcile_errors(&self) {
        self.reconcile_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_heal_attempts(&self) {
        self.heal_attempts_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_heal_success(&self, unix_ts: i64) {
        self.heal_success_total.fetch_add(1, Ordering::Relaxed);
        self.last_heal_success_unix.store(unix_ts, Ordering::Relaxed);
    }

    pub fn add_orphans_cleaned(&self, n: u64) {
        self.orphan_cleanup_total.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_mounter_created(&self) {
        self.mounter_created_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_status(&self, mounter_running: bool, mount_writable: bool) {
        self.mounter_running.store(mounter_running, Ordering::Relaxed);
        self.mount_writable.store(mount_writable, Ordering::Relaxed);
    }

    pub fn set_last_reconcile_ms(&self, ms: u64) {
        self.last_reconcile_ms.store(ms, Ordering::Relaxed);
    }

    pub fn mount_writable(&self) -> bool {
        self.mount_writable.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            reconcile_total: self.reconcile_total.load(Ordering::Relaxed),
            reconcile_errors: self.reconcile_errors.load(Ordering::Relaxed),
            heal_attempts_total: self.heal_attempts_total.load(Ordering::Relaxed),
            heal_success_total: self.heal_success_total.load(Ordering::Relaxed),
            orphan_cleanup_total: self.orphan_cleanup_total.load(Ordering::Relaxed),
            mounter_created_total: self.mounter_created_total.load(Ordering::Relaxed),
            mounter_running: self.mounter_running.load(Ordering::Relaxed),
            mount_writable: self.mount_writable.load(Ordering::Relaxed),
            last_heal_success_unix: self.last_heal_success_unix.load(Ordering::Relaxed),
            last_reconcile_ms: self.last_reconcile_ms.load(Ordering::Relaxed),
        }
    }
}

/// Read-only value copy of all counters and gauges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub reconcile_total: u64,
    pub reconcile_errors: u64,
    pub heal_attempts_total: u64,
    pub heal_success_total: u64,
    pub orphan_cleanup_total: u64,
    pub mounter_created_total: u64,
    pub mounter_running: bool,
    pub mount_writable: bool,
    pub last_heal_success_unix: i64,
    pub last_reconcile_ms: u64,
}
