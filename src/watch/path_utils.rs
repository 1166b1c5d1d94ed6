// src/watch/path_utils.rs

//! Utility functions for path handling in the watcher.

use std::path::{Component, Path, PathBuf};

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// - First we try a direct `strip_prefix(root)`.
/// - If that fails (e.g. due to symlinks or different absolute prefixes),
///   we canonicalize both paths and try again.
/// - Only if both attempts fail do we give up.
///
/// Returns `None` if the path cannot be reasonably related to `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(slashed(rel));
    }

    // macOS reports /private/var/... for /var/..., and a deleted file cannot be
    // canonicalized at all, so compare through `absolutize` as a fallback.
    let root_abs = absolutize(root);
    let path_abs = absolutize(path);
    path_abs.strip_prefix(&root_abs).ok().map(slashed)
}

/// Resolve `.` and `..` components without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Best-effort canonical form of a path that may not exist yet.
///
/// The longest existing ancestor is canonicalized and the remaining
/// components are appended lexically. This keeps output paths such as
/// `dist/bundle.js` comparable with canonical paths reported by the bundler
/// even before the first build has created them.
pub fn absolutize(path: &Path) -> PathBuf {
    let path = if path.is_absolute() {
        normalize_lexically(path)
    } else {
        match std::env::current_dir() {
            Ok(cwd) => normalize_lexically(&cwd.join(path)),
            Err(_) => normalize_lexically(path),
        }
    };

    let mut existing = path.clone();
    let mut rest: Vec<std::ffi::OsString> = Vec::new();
    loop {
        if let Ok(canon) = existing.canonicalize() {
            let mut out = canon;
            for part in rest.iter().rev() {
                out.push(part);
            }
            return out;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => return path,
        }
    }
}

fn slashed(rel: &Path) -> String {
    rel.to_string_lossy().replace('\\', "/")
}
