//! Path target extraction and containment for `filesystem.write`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};

const DIRECT_KEYS: &[&str] = &["path", "file_path", "filename", "file", "target", "cwd", "filePath"];

static PATCH_TARGET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\*\*\* (?:Add|Update|Delete) File: (.+)$|^\*\*\* Move to: (.+)$")
        .expect("valid pattern")
});

/// Extract write targets: direct structured keys, plus patch-format
/// markers found in freeform `input`/`command` strings.
pub fn extract_write_targets(request: &Value) -> Vec<String> {
    let mut targets = Vec::new();
    for key in DIRECT_KEYS {
        if let Some(s) = request.get(*key).and_then(Value::as_str) {
            targets.push(s.to_string());
        }
    }
    for key in ["input", "command"] {
        if let Some(s) = request.get(key).and_then(Value::as_str) {
            targets.extend(extract_patch_targets(s));
        }
    }
    targets
}

/// Parse `*** Add|Update|Delete File: PATH` and `*** Move to: PATH`
/// markers, one resolved target per matching line.
pub fn extract_patch_targets(text: &str) -> Vec<String> {
    PATCH_TARGET_RE
        .captures_iter(text)
        .map(|c| {
            c.get(1)
                .or_else(|| c.get(2))
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default()
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Resolve `path` relative to `base` lexically (no filesystem access)
/// and check containment: the relative path must not be empty, must
/// not start with `..`, and must not itself be absolute.
pub fn is_contained(base: &str, target: &str) -> bool {
    let base = lexical_absolute(Path::new(base));
    let target_path = Path::new(target);
    let target_abs = if target_path.is_absolute() {
        lexical_absolute(target_path)
    } else {
        lexical_absolute(&base.join(target_path))
    };
    match target_abs.strip_prefix(&base) {
        Ok(rel) => !matches!(rel.components().next(), Some(Component::ParentDir)),
        Err(_) => false,
    }
}

/// Whether every target is contained within at least one root.
pub fn all_targets_contained(targets: &[String], roots: &[String]) -> bool {
    !targets.is_empty()
        && targets
            .iter()
            .all(|target| roots.iter().any(|root| is_contained(root, target)))
}

fn lexical_absolute(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}
