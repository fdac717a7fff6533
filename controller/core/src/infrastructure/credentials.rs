// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! S3 credential resolution.
//!
//! Environment variables win over secret files; files are the normal path in
//! clustered deployments where the secrets store mounts them read-only.

use crate::domain::config::Config;
use tracing::debug;

/// Resolved credential material for the mounter environment.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub session_token: String,
}

impl Credentials {
    /// Resolve credentials: `VOLS3_ACCESS_KEY` / `VOLS3_SECRET_KEY` /
    /// `VOLS3_SESSION_TOKEN` override the configured key files.
    pub fn resolve(config: &Config) -> Self {
        let mut access_key = env_trimmed("VOLS3_ACCESS_KEY");
        let mut secret_key = env_trimmed("VOLS3_SECRET_KEY");
        let session_token = env_trimmed("VOLS3_SESSION_TOKEN");

        if access_key.is_empty() {
            access_key = read_trimmed(&config.access_key_file);
        }
        if secret_key.is_empty() {
            secret_key = read_trimmed(&config.secret_key_file);
        }

        Self {
            access_key,
            secret_key,
            session_token,
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.access_key.is_empty() && !self.secret_key.is_empty()
    }

    /// rclone-style environment for the mounter and ephemeral rclone runs.
    pub fn rclone_env(&self, endpoint: &str, provider: &str) -> Vec<String> {
        let mut env = vec![
            "RCLONE_CONFIG_S3_TYPE=s3".to_string(),
            format!("RCLONE_CONFIG_S3_ACCESS_KEY_ID={}", self.access_key),
            format!("RCLONE_CONFIG_S3_SECRET_ACCESS_KEY={}", self.secret_key),
            format!("RCLONE_CONFIG_S3_ENDPOINT={}", endpoint),
        ];
        if !self.session_token.is_empty() {
            env.push(format!(
                "RCLONE_CONFIG_S3_SESSION_TOKEN={}",
                self.session_token
            ));
        }
        if !provider.trim().is_empty() {
            env.push(format!("RCLONE_CONFIG_S3_PROVIDER={}", provider.trim()));
        }
        env
    }
}

fn env_trimmed(key: &str) -> String {
    std::env::var(key)
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

fn read_trimmed(path: &str) -> String {
    match std::fs::read_to_string(path) {
        Ok(contents) => contents.trim().to_string(),
        Err(e) => {
            debug!(path, "credential file not readable: {}", e);
            String::new()
        }
    }
}
