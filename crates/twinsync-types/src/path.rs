//! Slash-separated relative path helpers
//!
//! All tracking structures key entries by slash-separated relative paths,
//! independent of the platform separator. Conversion to `std::path` happens
//! only at the physical apply edge.

/// Path separator used by all tracking structures
pub const SEPARATOR: char = '/';

/// Split a relative path into its segments, skipping empty ones
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR).filter(|s| !s.is_empty())
}

/// Last segment of a path, or the whole path if it has no separator
pub fn basename(path: &str) -> &str {
    path.rsplit(SEPARATOR).next().unwrap_or(path)
}

/// Everything before the last segment; `None` for a single-segment path
pub fn parent(path: &str) -> Option<&str> {
    path.rfind(SEPARATOR).map(|idx| &path[..idx])
}

/// Join a parent path and a child name
pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}{SEPARATOR}{name}")
    }
}

/// Replace the last segment of `path` with `name`
pub fn with_basename(path: &str, name: &str) -> String {
    match parent(path) {
        Some(dir) => join(dir, name),
        None => name.to_string(),
    }
}

/// Predicate over relative paths, used to skip excluded entries.
///
/// Implemented by the configuration crate's exclude matcher; tracking
/// structures only see this seam.
pub trait PathMatcher: Send + Sync + std::fmt::Debug {
    /// Whether the given relative path is matched (and should be skipped)
    fn is_match(&self, path: &str) -> bool;
}

/// Whether `path` equals `prefix` or lives underneath it
pub fn starts_with(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with(SEPARATOR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basename_and_parent() {
        assert_eq!(basename("a/b/c.txt"), "c.txt");
        assert_eq!(basename("c.txt"), "c.txt");
        assert_eq!(parent("a/b/c.txt"), Some("a/b"));
        assert_eq!(parent("c.txt"), None);
    }

    #[test]
    fn test_with_basename() {
        assert_eq!(with_basename("a/b/c.txt", "d.txt"), "a/b/d.txt");
        assert_eq!(with_basename("c.txt", "d.txt"), "d.txt");
    }

    #[test]
    fn test_starts_with_respects_boundaries() {
        assert!(starts_with("a/b/c", "a/b"));
        assert!(starts_with("a/b", "a/b"));
        assert!(!starts_with("a/bc", "a/b"));
    }

    #[test]
    fn test_segments_skip_empty() {
        let parts: Vec<&str> = segments("a//b/").collect();
        assert_eq!(parts, vec!["a", "b"]);
    }
}
