// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP surface: readiness, status, preflight, validation, metrics.
//!
//! A thin adapter over the controller's snapshot and validation functions.
//! `/status` always succeeds and reports true counters even when the
//! mounter is down; `/metrics` is exposed only when enabled.

use crate::application::controller::MountController;
use crate::domain::metrics::MetricsSnapshot;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;

pub struct AppState {
    pub controller: Arc<MountController>,
}

pub fn app(controller: Arc<MountController>) -> Router {
    let enable_metrics = controller.config().enable_metrics;
    let state = Arc::new(AppState { controller });

    let mut router = Router::new()
        .route("/ready", get(ready))
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .route("/preflight", get(preflight))
        .route("/reload", post(reload))
        .route("/validate", get(validate));
    if enable_metrics {
        router = router.route("/metrics", get(metrics));
    }
    router.with_state(state)
}

async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.controller.ready().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "not ready"),
    }
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.controller.snapshot())
}

async fn preflight(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let issues = state.controller.preflight().await;
    if issues.is_empty() {
        (StatusCode::OK, "ok".to_string())
    } else {
        (StatusCode::PRECONDITION_FAILED, issues.join("; "))
    }
}

async fn reload(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.controller.nudge();
    (StatusCode::ACCEPTED, "reconcile scheduled")
}

async fn validate(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.controller.config().validate())
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = render_prometheus(&state.controller.snapshot());
    (
        [("content-type", "text/plain; version=0.0.4")],
        body,
    )
}

/// Minimal Prometheus text exposition of the snapshot.
fn render_prometheus(s: &MetricsSnapshot) -> String {
    let bool01 = |b: bool| if b { 1 } else { 0 };
    format!(
        "# HELP s3mounter_reconcile_total Total reconcile loops\n\
         # TYPE s3mounter_reconcile_total counter\n\
         s3mounter_reconcile_total {}\n\
         # HELP s3mounter_reconcile_errors Total reconcile errors\n\
         # TYPE s3mounter_reconcile_errors counter\n\
         s3mounter_reconcile_errors {}\n\
         # HELP s3mounter_mounter_running Whether the mounter is running\n\
         # TYPE s3mounter_mounter_running gauge\n\
         s3mounter_mounter_running {}\n\
         # HELP s3mounter_mount_writable Whether the mountpoint is writable\n\
         # TYPE s3mounter_mount_writable gauge\n\
         s3mounter_mount_writable {}\n\
         # HELP s3mounter_heal_attempts_total Total heal attempts\n\
         # TYPE s3mounter_heal_attempts_total counter\n\
         s3mounter_heal_attempts_total {}\n\
         # HELP s3mounter_heal_success_total Total heal successes\n\
         # TYPE s3mounter_heal_success_total counter\n\
         s3mounter_heal_success_total {}\n\
         # HELP s3mounter_last_heal_success_timestamp Seconds since epoch of last heal success\n\
         # TYPE s3mounter_last_heal_success_timestamp gauge\n\
         s3mounter_last_heal_success_timestamp {}\n\
         # HELP s3mounter_orphan_cleanup_total Total orphaned mounters cleaned\n\
         # TYPE s3mounter_orphan_cleanup_total counter\n\
         s3mounter_orphan_cleanup_total {}\n\
         # HELP s3mounter_reconcile_duration_milliseconds Last reconcile duration in ms\n\
         # TYPE s3mounter_reconcile_duration_milliseconds gauge\n\
         s3mounter_reconcile_duration_milliseconds {}\n\
         # HELP s3mounter_mounter_created_total Total mounter containers created\n\
         # TYPE s3mounter_mounter_created_total counter\n\
         s3mounter_mounter_created_total {}\n",
        s.reconcile_total,
        s.reconcile_errors,
        bool01(s.mounter_running),
        bool01(s.mount_writable),
        s.heal_attempts_total,
        s.heal_success_total,
        s.last_heal_success_unix,
        s.orphan_cleanup_total,
        s.last_reconcile_ms,
        s.mounter_created_total,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prometheus_rendering() {
        let snapshot = MetricsSnapshot {
            reconcile_total: 3,
            reconcile_errors: 1,
            heal_attempts_total: 2,
            heal_success_total: 1,
            orphan_cleanup_total: 4,
            mounter_created_total: 1,
            mounter_running: true,
            mount_writable: false,
            last_heal_success_unix: 1_700_000_000,
            last_reconcile_ms: 12,
        };
        let body = render_prometheus(&snapshot);
        assert!(body.contains("s3mounter_reconcile_total 3\n"));
        assert!(body.contains("s3mounter_reconcile_errors 1\n"));
        assert!(body.contains("s3mounter_mounter_running 1\n"));
        assert!(body.contains("s3mounter_mount_writable 0\n"));
        assert!(body.contains("s3mounter_last_heal_success_timestamp 1700000000\n"));
        assert!(body.contains("s3mounter_reconcile_duration_milliseconds 12\n"));
        // Every family is typed.
        assert_eq!(body.matches("# TYPE ").count(), 10);
    }
}
