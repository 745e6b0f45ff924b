//! Lightweight JSONPath construction for validation findings.
//!
//! Findings locate problems with `$`-rooted dotted paths
//! (`$.flows.F.stages.s1.modules[0].id`). Paths are built incrementally
//! during the validation pass and frozen into plain strings on emission.

use std::fmt;

/// A `$`-rooted JSONPath under construction.
///
/// Cloning is cheap enough for the validator's purposes: paths are short and
/// the pass clones only when it descends into a sub-element.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JsonPath(String);

impl JsonPath {
    /// The document root, `$`.
    pub fn root() -> Self {
        JsonPath("$".to_string())
    }

    /// Append an object key segment: `$.a` + `b` → `$.a.b`.
    #[must_use]
    pub fn key(&self, segment: &str) -> Self {
        let mut s = String::with_capacity(self.0.len() + segment.len() + 1);
        s.push_str(&self.0);
        s.push('.');
        s.push_str(segment);
        JsonPath(s)
    }

    /// Append an array index segment: `$.a` + `3` → `$.a[3]`.
    #[must_use]
    pub fn index(&self, idx: usize) -> Self {
        JsonPath(format!("{}[{}]", self.0, idx))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<JsonPath> for String {
    fn from(p: JsonPath) -> Self {
        p.0
    }
}

/// Join dotted parameter path segments (`a` + `b` → `a.b`), used by the
/// params resolver's provenance records where paths are blueprint-relative
/// rather than `$`-rooted.
#[must_use]
pub fn join_dotted(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{prefix}.{segment}")
    }
}

/// Exact-match-or-dotted-prefix ownership test: `a.b` owns `a.b` and
/// `a.b.c` but not `a.bx`.
#[must_use]
pub fn owns_path(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with('.'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_building() {
        let p = JsonPath::root().key("flows").key("F").key("modules").index(2);
        assert_eq!(p.as_str(), "$.flows.F.modules[2]");
    }

    #[test]
    fn test_owns_path_prefix_semantics() {
        assert!(owns_path("a.b", "a.b"));
        assert!(owns_path("a.b", "a.b.c"));
        assert!(!owns_path("a.b", "a.bx"));
        assert!(!owns_path("a.b", "a"));
    }
}
