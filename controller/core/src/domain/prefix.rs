// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Claim prefix containment.
//!
//! A claim's prefix is untrusted input from peer-container labels. Before it
//! becomes a directory under the mountpoint it is rooted at `/` and cleaned
//! component-by-component, so `..` segments pop within the claim itself and
//! can never climb above the mountpoint.

use std::path::{Component, Path, PathBuf};

/// Lexically clean a claim prefix: `.` segments vanish, `..` pops at most to
/// the (virtual) root, separators collapse. Returns a relative path.
pub fn clean_prefix(prefix: &str) -> PathBuf {
    let rooted = format!("/{}", prefix);
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(&rooted).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::ParentDir => {
                parts.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    parts.iter().collect()
}

/// The local directory a claim materializes as, always under `mountpoint`.
pub fn claim_dir(mountpoint: &Path, prefix: &str) -> PathBuf {
    mountpoint.join(clean_prefix(prefix))
}
