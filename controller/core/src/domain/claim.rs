// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Declarative claims from container labels.
//!
//! Peer containers request sub-prefixes of the mount with `s3.*` labels,
//! either bare (`s3.prefix`) or namespaced under a domain-style prefix
//! (`acme.io/s3.prefix`). The resolver collapses both schemes into one value
//! per base key: a prefixed key always overrides the bare one, and two
//! distinct prefixed values for the same base are a conflict (first wins).

use crate::domain::runtime::ContainerRecord;
use std::collections::HashMap;
use tracing::{error, warn};

/// The exact set of recognized label base keys.
const ALLOWED_BASES: &[&str] = &[
    "s3.enabled",
    "s3.bucket",
    "s3.prefix",
    "s3.class",
    "s3.reclaim",
    "s3.access",
    "s3.args",
];

/// Resolves a container's label map into at most one value per base key.
#[derive(Debug, Clone)]
pub struct LabelResolver {
    /// When non-empty, only this prefix (or no prefix) is accepted.
    label_prefix: String,
    /// Promote label warnings to error-level logs.
    strict: bool,
}

impl LabelResolver {
    pub fn new(label_prefix: impl Into<String>, strict: bool) -> Self {
        Self {
            label_prefix: label_prefix.into().trim().to_string(),
            strict,
        }
    }

    fn complain(&self, msg: &str, key: &str) {
        if self.strict {
            error!(key = %key, "{}", msg);
        } else {
            warn!(key = %key, "{}", msg);
        }
    }

    /// Collapse a label map into `base -> value`.
    pub fn resolve(&self, labels: &HashMap<String, String>) -> HashMap<String, String> {
        struct Kept {
            value: String,
            prefixed: bool,
        }
        let mut kept: HashMap<&'static str, Kept> = HashMap::new();

        for (key, value) in labels {
            let (prefix, base) = match key.find('/') {
                Some(i) => (&key[..i], &key[i + 1..]),
                None => ("", key.as_str()),
            };
            let Some(base) = ALLOWED_BASES.iter().copied().find(|b| *b == base) else {
                self.complain("unknown label key", key);
                continue;
            };
            if !self.label_prefix.is_empty() && !prefix.is_empty() && prefix != self.label_prefix {
                warn!(key = %key, "ignoring label from other prefix");
                continue;
            }
            let prefixed = !prefix.is_empty();
            match kept.get(base).map(|old| old.prefixed) {
                Some(true) if prefixed => {
                    self.complain("conflicting prefixed labels", base);
                }
                Some(false) if prefixed => {
                    warn!(key = base, prefix, "prefixed label overrides unprefixed");
                    kept.insert(
                        base,
                        Kept {
                            value: value.clone(),
                            prefixed: true,
                        },
                    );
                }
                Some(_) => {}
                None => {
                    kept.insert(
                        base,
                        Kept {
                            value: value.clone(),
                            prefixed,
                        },
                    );
                }
            }
        }

        kept.into_iter()
            .map(|(k, v)| (k.to_string(), v.value))
            .collect()
    }
}

/// A single provisioning intent derived from one container's labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimSpec {
    pub enabled: bool,
    pub bucket: String,
    /// Slash-trimmed; empty means "nothing to provision".
    pub prefix: String,
    pub class: String,
    pub reclaim: String,
    pub access: String,
    pub args: String,
}

impl ClaimSpec {
    /// Build a claim from a resolved label map.
    pub fn from_resolved(resolved: &HashMap<String, String>) -> Self {
        let get = |k: &str| resolved.get(k).cloned().unwrap_or_default();
        Self {
            enabled: resolved
                .get("s3.enabled")
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
            bucket: get("s3.bucket"),
            prefix: get("s3.prefix").trim_matches('/').to_string(),
            class: get("s3.class"),
            reclaim: get("s3.reclaim"),
            access: get("s3.access"),
            args: get("s3.args"),
        }
    }

    /// A claim only provisions something when enabled with a usable prefix.
    pub fn is_actionable(&self) -> bool {
        self.enabled && !self.prefix.is_empty()
    }
}

/// Collect claims from every labeled peer container.
///
/// Duplicate prefixes across containers yield duplicate claims; the
/// provisioner is idempotent, so that is harmless.
pub fn collect_claims(resolver: &LabelResolver, containers: &[ContainerRecord]) -> Vec<ClaimSpec> {
    let mut out = Vec::new();
    for container in containers {
        if container.labels.is_empty() {
            continue;
        }
        let resolved = resolver.resolve(&container.labels);
        let claim = ClaimSpec::from_resolved(&resolved);
        if claim.enabled {
            out.push(claim);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::runtime::ContainerState;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_resolve_bare_keys() {
        let resolver = LabelResolver::new("", false);
        let m = resolver.resolve(&labels(&[
            ("s3.enabled", "true"),
            ("s3.bucket", "b"),
            ("foo", "bar"),
        ]));
        assert_eq!(m.get("s3.enabled").map(String::as_str), Some("true"));
        assert_eq!(m.get("s3.bucket").map(String::as_str), Some("b"));
        assert!(!m.contains_key("foo"));
    }

    #[test]
    fn test_prefixed_overrides_unprefixed() {
        // Holds with the matching prefix configured...
        let resolver = LabelResolver::new("acme", false);
        let m = resolver.resolve(&labels(&[
            ("acme/s3.enabled", "true"),
            ("s3.enabled", "false"),
        ]));
        assert_eq!(m.get("s3.enabled").map(String::as_str), Some("true"));

        // ...and with no prefix configured at all.
        let resolver = LabelResolver::new("", false);
        let m = resolver.resolve(&labels(&[
            ("acme/s3.prefix", "up"),
            ("s3.prefix", "down"),
        ]));
        assert_eq!(m.get("s3.prefix").map(String::as_str), Some("up"));
    }

    #[test]
    fn test_foreign_prefix_ignored() {
        let resolver = LabelResolver::new("acme", false);
        let m = resolver.resolve(&labels(&[("other/s3.enabled", "true")]));
        assert!(m.is_empty());
    }

    #[test]
    fn test_conflicting_prefixed_keeps_first() {
        let resolver = LabelResolver::new("", true);
        let m = resolver.resolve(&labels(&[
            ("a/s3.bucket", "one"),
            ("b/s3.bucket", "two"),
        ]));
        // Exactly one of the two prefixed values survives; which one depends
        // on map iteration order, matching the single-valued guarantee.
        assert_eq!(m.len(), 1);
        let v = m.get("s3.bucket").unwrap();
        assert!(v == "one" || v == "two");
    }

    #[test]
    fn test_prefix_override_is_not_a_conflict() {
        // Same container carrying both the bare and the configured-prefix
        // form resolves cleanly to the prefixed value.
        let resolver = LabelResolver::new("acme", true);
        let m = resolver.resolve(&labels(&[
            ("acme/s3.enabled", "true"),
            ("s3.enabled", "true"),
        ]));
        assert_eq!(m.get("s3.enabled").map(String::as_str), Some("true"));
    }

    #[test]
    fn test_claim_from_resolved() {
        let resolver = LabelResolver::new("", false);
        let m = resolver.resolve(&labels(&[
            ("s3.enabled", "TRUE"),
            ("s3.bucket", "data"),
            ("s3.prefix", "/team/app/"),
        ]));
        let claim = ClaimSpec::from_resolved(&m);
        assert!(claim.enabled);
        assert_eq!(claim.bucket, "data");
        assert_eq!(claim.prefix, "team/app");
        assert!(claim.is_actionable());
    }

    #[test]
    fn test_claim_without_prefix_not_actionable() {
        let resolver = LabelResolver::new("", false);
        let m = resolver.resolve(&labels(&[("s3.enabled", "true")]));
        let claim = ClaimSpec::from_resolved(&m);
        assert!(claim.enabled);
        assert!(!claim.is_actionable());
    }

    #[test]
    fn test_collect_claims_skips_disabled() {
        let resolver = LabelResolver::new("", false);
        let mk = |pairs: &[(&str, &str)]| ContainerRecord {
            id: "c".into(),
            name: "c".into(),
            image: String::new(),
            image_id: String::new(),
            state: ContainerState::Running,
            labels: labels(pairs),
        };
        let containers = vec![
            mk(&[("s3.enabled", "true"), ("s3.prefix", "a")]),
            mk(&[("s3.enabled", "false"), ("s3.prefix", "b")]),
            mk(&[]),
        ];
        let claims = collect_claims(&resolver, &containers);
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].prefix, "a");
    }
}
