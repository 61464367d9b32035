//! Secret lookup with `<NAME>_FILE` indirection, for docker-style secret mounts.

use std::path::{Path, PathBuf};

/// Resolve a secret by name.
///
/// Priority: contents of the file named by `<NAME>_FILE`, then `<NAME>`
/// itself. Blank values are treated as unset.
pub fn get_secret<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = lookup(&format!("{name}_FILE")).filter(|p| !p.trim().is_empty()) {
        match read_trimmed(Path::new(path.trim())) {
            Some(value) => return Some(value),
            None => tracing::warn!(secret = name, path = %path, "secret file unreadable or empty"),
        }
    }

    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read a file and return its trimmed contents, or `None` if missing/blank.
pub fn read_trimmed(path: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(path).ok()?;
    let value = raw.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Location of the repo-local UniFi key fallback.
pub fn local_unifi_key_path(base_dir: &Path) -> PathBuf {
    base_dir.join("secrets").join("unifi_key")
}
