// ── Store path helpers ──
//
// Normalized form: segments joined by a single '/', no leading or
// trailing separator. The root is "".

/// Collapse empty segments so equivalent spellings compare equal.
pub fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Append `sub` beneath `base` and normalize the result.
pub fn join(base: &str, sub: &str) -> String {
    normalize(&format!("{base}/{sub}"))
}

/// Last segment of a normalized path; `None` for the root.
pub fn key(path: &str) -> Option<&str> {
    path.rsplit('/').next().filter(|k| !k.is_empty())
}

/// Parent of a normalized path; `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rsplit_once('/').map_or("", |(parent, _)| parent))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_separator_artifacts() {
        assert_eq!(normalize("/a//b/"), "a/b");
        assert_eq!(normalize("///"), "");
        assert_eq!(normalize("a"), "a");
    }

    #[test]
    fn join_never_doubles_separators() {
        assert_eq!(join("a/", "/b"), "a/b");
        assert_eq!(join("", "b"), "b");
        assert_eq!(join("a", ""), "a");
    }

    #[test]
    fn key_and_parent() {
        assert_eq!(key("a/b"), Some("b"));
        assert_eq!(key(""), None);
        assert_eq!(parent("a/b"), Some("a"));
        assert_eq!(parent("a"), Some(""));
        assert_eq!(parent(""), None);
    }
}
