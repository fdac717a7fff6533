// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Controller configuration.
//!
//! Built once at boot from `VOLS3_*` environment variables and never mutated.
//! Static validation collects every problem into a [`ValidationReport`]
//! instead of failing on the first; the report doubles as the
//! `--validate-config` / `/validate` JSON payload.

use crate::domain::naming;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Image refresh policy for the managed mounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    Never,
    Periodic,
    OnChange,
}

impl UpdateMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "" | "never" => Some(Self::Never),
            "periodic" => Some(Self::Periodic),
            "on_change" => Some(Self::OnChange),
            _ => None,
        }
    }
}

/// Provider presets appending mounter arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Aws,
    Minio,
    Ceph,
    Wasabi,
    Aliyun,
    None,
}

impl Preset {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" => Self::Aws,
            "minio" => Self::Minio,
            "ceph" => Self::Ceph,
            "wasabi" => Self::Wasabi,
            "aliyun" => Self::Aliyun,
            _ => Self::None,
        }
    }

    /// Extra mounter arguments for this preset.
    pub fn args(self) -> &'static [&'static str] {
        match self {
            Self::Aws => &["--s3-region=us-east-1"],
            Self::Minio | Self::Ceph => &["--s3-force-path-style=true"],
            Self::Wasabi => &["--s3-region=us-east-1", "--s3-force-path-style=true"],
            Self::Aliyun => &["--s3-provider=Alibaba", "--s3-force-path-style=true"],
            Self::None => &[],
        }
    }
}

/// Immutable per-process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub s3_provider: String,
    pub s3_endpoint: String,
    pub rclone_remote: String,
    pub rclone_extra_args: String,
    pub mountpoint: String,
    pub access_key_file: String,
    pub secret_key_file: String,
    pub mounter_image: String,
    /// Image for one-shot privileged helpers; empty means "discover the
    /// controller's own image at runtime".
    pub helper_image: String,
    pub ready_file: String,
    pub poll_interval: Duration,
    /// Kept as the raw string so validation can report unknown values.
    pub mounter_update_mode: String,
    pub mounter_pull_interval: Duration,
    pub unmount_on_exit: bool,
    pub auto_create_bucket: bool,
    pub auto_create_prefix: bool,
    pub read_only: bool,
    pub enable_proxy: bool,
    pub local_lb_enabled: bool,
    pub proxy_port: String,
    pub proxy_network: String,
    pub label_prefix: String,
    pub label_strict: bool,
    pub strict_ready: bool,
    pub preset: String,
    pub http_addr: String,
    pub enable_metrics: bool,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            s3_provider: String::new(),
            s3_endpoint: "http://s3.local:9000".to_string(),
            rclone_remote: "S3:bucket".to_string(),
            rclone_extra_args: String::new(),
            mountpoint: "/mnt/s3".to_string(),
            access_key_file: "/run/secrets/s3_access_key".to_string(),
            secret_key_file: "/run/secrets/s3_secret_key".to_string(),
            mounter_image: "rclone/rclone:latest".to_string(),
            helper_image: String::new(),
            ready_file: ".ready".to_string(),
            poll_interval: Duration::from_secs(15),
            mounter_update_mode: "never".to_string(),
            mounter_pull_interval: Duration::from_secs(24 * 3600),
            unmount_on_exit: true,
            auto_create_bucket: false,
            auto_create_prefix: false,
            read_only: false,
            enable_proxy: false,
            local_lb_enabled: false,
            proxy_port: "8081".to_string(),
            proxy_network: String::new(),
            label_prefix: String::new(),
            label_strict: false,
            strict_ready: false,
            preset: String::new(),
            http_addr: "0.0.0.0:8080".to_string(),
            enable_metrics: false,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Populate configuration from `VOLS3_*` environment variables.
    ///
    /// Unset variables fall back to defaults; unparsable durations do too.
    /// Nothing here fails; problems surface through [`Config::validate`].
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            s3_provider: env_or("VOLS3_PROVIDER", &d.s3_provider),
            s3_endpoint: env_or("VOLS3_ENDPOINT", &d.s3_endpoint),
            rclone_remote: env_or("VOLS3_RCLONE_REMOTE", &d.rclone_remote),
            rclone_extra_args: env_or("VOLS3_RCLONE_ARGS", &d.rclone_extra_args),
            mountpoint: env_or("VOLS3_MOUNTPOINT", &d.mountpoint),
            access_key_file: env_or("VOLS3_ACCESS_KEY_FILE", &d.access_key_file),
            secret_key_file: env_or("VOLS3_SECRET_KEY_FILE", &d.secret_key_file),
            mounter_image: env_or("VOLS3_RCLONE_IMAGE", &d.mounter_image),
            helper_image: env_or("VOLS3_NSENTER_HELPER_IMAGE", &d.helper_image),
            ready_file: d.ready_file.clone(),
            poll_interval: env_duration("VOLS3_POLL_INTERVAL", d.poll_interval),
            mounter_update_mode: env_or("VOLS3_RCLONE_UPDATE_MODE", &d.mounter_update_mode),
            mounter_pull_interval: env_duration(
                "VOLS3_RCLONE_PULL_INTERVAL",
                d.mounter_pull_interval,
            ),
            unmount_on_exit: env_bool("VOLS3_UNMOUNT_ON_EXIT", d.unmount_on_exit),
            auto_create_bucket: env_bool("VOLS3_AUTOCREATE_BUCKET", d.auto_create_bucket),
            auto_create_prefix: env_bool("VOLS3_AUTOCREATE_PREFIX", d.auto_create_prefix),
            read_only: env_bool("VOLS3_READ_ONLY", d.read_only),
            enable_proxy: env_bool("VOLS3_PROXY_ENABLE", d.enable_proxy),
            local_lb_enabled: env_bool("VOLS3_PROXY_LOCAL_LB", d.local_lb_enabled),
            proxy_port: env_or("VOLS3_PROXY_PORT", &d.proxy_port),
            proxy_network: env_or("VOLS3_PROXY_NETWORK", &d.proxy_network),
            label_prefix: env_or("VOLS3_LABEL_PREFIX", &d.label_prefix),
            label_strict: env_bool("VOLS3_LABEL_STRICT", d.label_strict),
            strict_ready: env_bool("VOLS3_STRICT_READY", d.strict_ready),
            preset: env_or("VOLS3_PRESET", &d.preset),
            http_addr: env_or("VOLS3_HTTP_ADDR", &d.http_addr),
            enable_metrics: env_bool("VOLS3_ENABLE_METRICS", d.enable_metrics),
            log_level: env_or("VOLS3_LOG_LEVEL", &d.log_level),
        }
    }

    pub fn update_mode(&self) -> UpdateMode {
        UpdateMode::parse(&self.mounter_update_mode).unwrap_or(UpdateMode::Never)
    }

    pub fn preset(&self) -> Preset {
        Preset::parse(&self.preset)
    }

    /// Effective poll interval; zero means "use the default".
    pub fn effective_poll_interval(&self) -> Duration {
        if self.poll_interval.is_zero() {
            Duration::from_secs(15)
        } else {
            self.poll_interval
        }
    }

    /// The S3 endpoint the mounter (and ephemeral rclone helpers) should use.
    ///
    /// When the proxy and the node-local LB are both enabled and a proxy
    /// network is configured, traffic is steered through the node-local
    /// alias on that network instead of the configured endpoint.
    pub fn resolved_endpoint(&self, host: &str) -> String {
        if self.enable_proxy && self.local_lb_enabled && !self.proxy_network.trim().is_empty() {
            format!(
                "http://{}:{}",
                naming::local_lb_alias(host),
                self.proxy_port.trim()
            )
        } else {
            self.s3_endpoint.clone()
        }
    }

    /// Static validation: required fields, value ranges, and advisory
    /// warnings. Never fails fast; callers inspect the report.
    pub fn validate(&self) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.mountpoint.trim().is_empty() {
            errors.push("mountpoint is required".to_string());
        }
        if self.s3_endpoint.trim().is_empty() {
            errors.push("S3 endpoint is required".to_string());
        } else {
            match reqwest::Url::parse(&self.s3_endpoint) {
                Ok(u) if !u.scheme().is_empty() && u.host_str().is_some() => {}
                _ => errors.push(
                    "S3 endpoint must be a valid URL (e.g. http(s)://host:port)".to_string(),
                ),
            }
        }
        if self.mounter_image.trim().is_empty() {
            errors.push("mounter image is required".to_string());
        }
        if UpdateMode::parse(&self.mounter_update_mode).is_none() {
            errors.push("mounter update mode must be one of never|periodic|on_change".to_string());
        }
        if !self.proxy_port.trim().is_empty() && self.proxy_port.trim().parse::<u16>().is_err() {
            errors.push("proxy port must be a number".to_string());
        }
        if let Err(e) = std::fs::metadata(&self.access_key_file) {
            warnings.push(format!("access key file not readable: {}", e));
        }
        if let Err(e) = std::fs::metadata(&self.secret_key_file) {
            warnings.push(format!("secret key file not readable: {}", e));
        }
        if self.read_only && (self.auto_create_bucket || self.auto_create_prefix) {
            warnings.push("read-only mode: auto-create bucket/prefix is ignored".to_string());
        }

        ValidationReport {
            ok: errors.is_empty(),
            errors,
            warnings,
            summary: self.summary(),
        }
    }

    /// Flat, secret-free view of the effective configuration.
    pub fn summary(&self) -> BTreeMap<String, String> {
        let mut m = BTreeMap::new();
        m.insert("mountpoint".into(), self.mountpoint.clone());
        m.insert("s3_endpoint".into(), self.s3_endpoint.clone());
        m.insert("s3_provider".into(), self.s3_provider.clone());
        m.insert("rclone_remote".into(), self.rclone_remote.clone());
        m.insert("mounter_image".into(), self.mounter_image.clone());
        m.insert("helper_image".into(), self.helper_image.clone());
        m.insert(
            "poll_interval".into(),
            humantime::format_duration(self.poll_interval).to_string(),
        );
        m.insert("mounter_update_mode".into(), self.mounter_update_mode.clone());
        m.insert(
            "mounter_pull_interval".into(),
            humantime::format_duration(self.mounter_pull_interval).to_string(),
        );
        m.insert("unmount_on_exit".into(), self.unmount_on_exit.to_string());
        m.insert("auto_create_bucket".into(), self.auto_create_bucket.to_string());
        m.insert("auto_create_prefix".into(), self.auto_create_prefix.to_string());
        m.insert("read_only".into(), self.read_only.to_string());
        m.insert("enable_proxy".into(), self.enable_proxy.to_string());
        m.insert("local_lb_enabled".into(), self.local_lb_enabled.to_string());
        m.insert("proxy_port".into(), self.proxy_port.clone());
        m.insert("proxy_network".into(), self.proxy_network.clone());
        m.insert("label_prefix".into(), self.label_prefix.clone());
        m.insert("access_key_file".into(), self.access_key_file.clone());
        m.insert("secret_key_file".into(), self.secret_key_file.clone());
        m.insert("preset".into(), self.preset.clone());
        m
    }
}

/// Outcome of static validation, JSON-shaped for the CLI flag and `/validate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub summary: BTreeMap<String, String>,
}

fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}

/// Booleans enable on the exact string `true`.
fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => v == "true",
        Err(_) => default,
    }
}

fn env_duration(key: &str, default: Duration) -> Duration {
    match std::env::var(key) {
        Ok(v) => humantime::parse_duration(v.trim()).unwrap_or(default),
        Err(_) => default,
    }
}
