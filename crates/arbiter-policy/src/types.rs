//! Policy layers, resolution, and the fixed capability set.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The closed set of capabilities a policy can allow or deny.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Execute a shell command.
    ShellExec,
    /// Make an outbound network request.
    NetworkFetch,
    /// Read a file from the filesystem.
    FilesystemRead,
    /// Write a file to the filesystem.
    FilesystemWrite,
    /// Invoke a registered tool.
    ToolInvoke,
    /// Invoke a model.
    ModelInvoke,
    /// Load a plugin.
    PluginLoad,
}

impl Capability {
    /// Wire name, e.g. `"shell.exec"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ShellExec => "shell.exec",
            Capability::NetworkFetch => "network.fetch",
            Capability::FilesystemRead => "filesystem.read",
            Capability::FilesystemWrite => "filesystem.write",
            Capability::ToolInvoke => "tool.invoke",
            Capability::ModelInvoke => "model.invoke",
            Capability::PluginLoad => "plugin.load",
        }
    }
}

/// One partially specified policy layer. Fields left `None` impose no
/// constraint at this layer and inherit from the layer folded before it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyLayer {
    /// Capabilities explicitly allowed. Replaces, does not merge with,
    /// any prior layer's `allow` set.
    pub allow: Option<HashSet<Capability>>,
    /// Capabilities explicitly denied. Replaces any prior `deny` set.
    pub deny: Option<HashSet<Capability>>,
    /// Domain rules for `network.fetch` (exact, `*.`-wildcard, or
    /// `.`-prefixed).
    pub allow_domains: Option<Vec<String>>,
    /// Root paths `filesystem.write` targets must resolve within.
    pub write_paths: Option<Vec<String>>,
    /// Whether every tool call under this layer requires approval.
    pub require_approval: Option<bool>,
}

/// The fully folded result of hardcoded → global → agent → skill.
#[derive(Debug, Clone)]
pub struct ResolvedPolicy {
    /// Effective allow set, or `None` meaning "no restriction beyond deny".
    pub allow: Option<HashSet<Capability>>,
    /// Effective deny set.
    pub deny: HashSet<Capability>,
    /// Effective domain allowlist.
    pub allow_domains: Vec<String>,
    /// Effective write-path roots.
    pub write_paths: Vec<String>,
    /// Whether approval is required regardless of risk tier.
    pub require_approval: bool,
}

/// Hardcoded defaults always deny `plugin.load`.
pub fn hardcoded_defaults() -> ResolvedPolicy {
    ResolvedPolicy {
        allow: None,
        deny: [Capability::PluginLoad].into_iter().collect(),
        allow_domains: Vec::new(),
        write_paths: Vec::new(),
        require_approval: false,
    }
}

/// Fold layers in order; each defined field in a later layer replaces
/// (not merges with) the prior value.
pub fn resolve(layers: &[Option<&PolicyLayer>]) -> ResolvedPolicy {
    let mut resolved = hardcoded_defaults();
    for layer in layers.iter().flatten() {
        if let Some(allow) = &layer.allow {
            resolved.allow = Some(allow.clone());
        }
        if let Some(deny) = &layer.deny {
            resolved.deny = deny.clone();
        }
        if let Some(domains) = &layer.allow_domains {
            resolved.allow_domains = domains.clone();
        }
        if let Some(paths) = &layer.write_paths {
            resolved.write_paths = paths.clone();
        }
        if let Some(require_approval) = layer.require_approval {
            resolved.require_approval = require_approval;
        }
    }
    resolved
}

impl ResolvedPolicy {
    /// Whether `capability` passes the basic allow/deny check.
    pub fn capability_check(&self, capability: Capability) -> bool {
        if self.deny.contains(&capability) {
            return false;
        }
        match &self.allow {
            Some(allow) => allow.contains(&capability),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardcoded_defaults_deny_plugin_load() {
        let resolved = resolve(&[]);
        assert!(!resolved.capability_check(Capability::PluginLoad));
    }

    #[test]
    fn later_layer_replaces_earlier_allow_set_wholesale() {
        let global = PolicyLayer {
            allow: Some([Capability::ShellExec, Capability::NetworkFetch].into_iter().collect()),
            ..Default::default()
        };
        let agent = PolicyLayer {
            allow: Some([Capability::NetworkFetch].into_iter().collect()),
            ..Default::default()
        };
        let resolved = resolve(&[Some(&global), Some(&agent)]);
        assert!(!resolved.capability_check(Capability::ShellExec));
        assert!(resolved.capability_check(Capability::NetworkFetch));
    }

    #[test]
    fn undefined_fields_inherit_from_prior_layer() {
        let global = PolicyLayer {
            allow_domains: Some(vec!["example.com".to_string()]),
            ..Default::default()
        };
        let agent = PolicyLayer::default();
        let resolved = resolve(&[Some(&global), Some(&agent)]);
        assert_eq!(resolved.allow_domains, vec!["example.com".to_string()]);
    }
}
