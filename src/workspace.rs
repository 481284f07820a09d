//! Path normalization at the filesystem boundary (spec §4.3, §9).
//!
//! The engine keeps two representations: an absolute path used only when
//! touching the filesystem, and a POSIX-normalized relative path used
//! everywhere else (catalog, manifests, journals). Conversion happens only
//! here, at the edge.

use crate::core::{EngineError, Result};
use std::path::{Path, PathBuf};

/// Normalize `absolute_path` relative to `workspace_root` into the
/// POSIX-normalized, NUL-free, `..`-free relative form stored in
/// `ChangeRecord::path`.
pub fn normalize_relative(workspace_root: &Path, absolute_path: &Path) -> Result<String> {
    let relative = absolute_path.strip_prefix(workspace_root).map_err(|_| {
        EngineError::InvalidPath(format!(
            "{} is not inside workspace root {}",
            absolute_path.display(),
            workspace_root.display()
        ))
    })?;
    normalize_components(relative)
}

/// Validate and normalize a path that is already relative (e.g. one read
/// back out of a manifest). Rejects absolute paths, `..` segments, and
/// embedded NUL bytes per invariant P8.
pub fn normalize_components(relative: &Path) -> Result<String> {
    if relative.is_absolute() {
        return Err(EngineError::InvalidPath(format!(
            "absolute path not allowed: {}",
            relative.display()
        )));
    }

    let mut parts = Vec::new();
    for component in relative.components() {
        use std::path::Component;
        match component {
            Component::Normal(segment) => {
                let segment = segment.to_str().ok_or_else(|| {
                    EngineError::InvalidPath(format!("non-UTF8 path: {}", relative.display()))
                })?;
                if segment.contains('\0') {
                    return Err(EngineError::InvalidPath("embedded NUL byte".into()));
                }
                parts.push(segment.to_string());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(EngineError::InvalidPath(format!(
                    "'..' segment not allowed: {}",
                    relative.display()
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(EngineError::InvalidPath(format!(
                    "absolute path not allowed: {}",
                    relative.display()
                )));
            }
        }
    }

    if parts.is_empty() {
        return Err(EngineError::InvalidPath("empty path".into()));
    }

    Ok(parts.join("/"))
}

pub fn to_absolute(workspace_root: &Path, relative: &str) -> PathBuf {
    workspace_root.join(relative)
}

/// Backup-file naming: `<workspaceRoot>/<relativePath>.bak-<sessionId>` (§6).
pub fn backup_path(workspace_root: &Path, relative: &str, session_id: &str) -> PathBuf {
    let mut name = to_absolute(workspace_root, relative).into_os_string();
    name.push(format!(".bak-{session_id}"));
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_separators_and_accepts_plain_paths() {
        assert_eq!(
            normalize_components(Path::new("src/main.rs")).unwrap(),
            "src/main.rs"
        );
    }

    #[test]
    fn rejects_parent_dir_segments() {
        assert!(normalize_components(Path::new("../secret")).is_err());
        assert!(normalize_components(Path::new("a/../b")).is_err());
    }

    #[test]
    fn rejects_absolute_paths() {
        assert!(normalize_components(Path::new("/etc/passwd")).is_err());
    }

    #[test]
    fn rejects_nul_bytes() {
        let bad = String::from_utf8(vec![b'a', 0, b'b']).unwrap();
        assert!(normalize_components(Path::new(&bad)).is_err());
    }

    #[test]
    fn backup_path_appends_session_suffix() {
        let root = Path::new("/work");
        let p = backup_path(root, "a.txt", "sess1");
        assert_eq!(p, Path::new("/work/a.txt.bak-sess1"));
    }
}
