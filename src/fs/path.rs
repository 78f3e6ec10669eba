//! Absolute `/`-separated path helpers for the working tree.

use super::error::FsError;

/// Normalize an absolute path: collapse repeated separators, resolve `.`
/// and `..`, drop the trailing separator. The root normalizes to `/`.
pub fn normalize(path: &str) -> Result<String, FsError> {
    if !path.starts_with('/') {
        return Err(FsError::InvalidPath {
            path: path.to_string(),
        });
    }
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    Ok(format!("/{}", parts.join("/")))
}

/// Last component of a path, without normalization (`/a/..` → `..`).
pub fn basename(path: &str) -> &str {
    let trimmed = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    };
    match trimmed.rfind('/') {
        Some(index) => &trimmed[index + 1..],
        None => trimmed,
    }
}

/// Parent of a normalized path. The parent of `/` is `/`.
pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(index) => &path[..index],
    }
}

/// Join a normalized directory path and a child name.
pub fn join(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// True if `path` is `ancestor` or lies below it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    if ancestor == "/" {
        return true;
    }
    path == ancestor
        || (path.starts_with(ancestor) && path.as_bytes().get(ancestor.len()) == Some(&b'/'))
}

/// Path of `path` relative to `root`, or `None` if it is not below `root`.
pub fn relative_to<'a>(path: &'a str, root: &str) -> Option<&'a str> {
    if path == root || !is_within(path, root) {
        return None;
    }
    if root == "/" {
        Some(&path[1..])
    } else {
        Some(&path[root.len() + 1..])
    }
}
