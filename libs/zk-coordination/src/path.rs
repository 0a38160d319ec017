//! Helpers for slash-delimited coordination paths.

use crate::error::{CoordinationError, CoordinationResult};

/// The root of the coordination tree.
pub const ROOT: &str = "/";

/// Check that `path` is absolute and well formed.
///
/// Accepts `/` and paths like `/a/b`. Rejects the empty string, relative
/// paths, empty segments and a trailing separator.
pub fn validate(path: &str) -> CoordinationResult<()> {
    if path.is_empty() {
        return Err(CoordinationError::param("path is empty"));
    }
    if !path.starts_with('/') {
        return Err(CoordinationError::param(format!(
            "path must start with '/': {path}"
        )));
    }
    if path == ROOT {
        return Ok(());
    }
    if path.ends_with('/') {
        return Err(CoordinationError::param(format!(
            "path must not end with '/': {path}"
        )));
    }
    if path[1..].split('/').any(str::is_empty) {
        return Err(CoordinationError::param(format!(
            "path contains an empty segment: {path}"
        )));
    }
    Ok(())
}

/// Join a parent path and a child name.
pub fn join(parent: &str, child: &str) -> String {
    if parent == ROOT {
        format!("/{child}")
    } else {
        format!("{parent}/{child}")
    }
}

/// Every proper ancestor of `path`, shortest first, excluding the root.
///
/// `/a/b/c` yields `/a` then `/a/b`.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.char_indices()
        .skip(1)
        .filter(|&(_, c)| c == '/')
        .map(move |(pos, _)| &path[..pos])
}

/// The parent of `path`, or `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT),
        Some(pos) => Some(&path[..pos]),
        None => None,
    }
}

/// The last segment of `path`.
pub fn name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
