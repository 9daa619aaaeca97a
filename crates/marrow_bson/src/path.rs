//! Dotted path segmentation and the path trie.

use std::collections::HashMap;

/// Splits a path into its first segment and the remaining suffix.
///
/// Returns `None` as the suffix when the path has no further segments.
#[must_use]
pub fn split_path(path: &str) -> (&str, Option<&str>) {
    match path.find('.') {
        Some(i) => (&path[..i], Some(&path[i + 1..])),
        None => (path, None),
    }
}

/// Attempts to parse a segment as an array index.
///
/// Only segments that begin with an ASCII digit qualify; anything else is
/// treated as a document key by the caller.
#[must_use]
pub fn parse_index(segment: &str) -> Option<usize> {
    if !segment.as_bytes().first().is_some_and(u8::is_ascii_digit) {
        return None;
    }
    segment.parse().ok()
}

/// A trie mapping path segments to nodes.
///
/// Each node carries an optional terminal payload, set when a path ends at
/// the node. The trie accumulates per-path state, such as the set of paths
/// an update intends to write.
#[derive(Debug, Clone)]
pub struct PathTree<T> {
    value: Option<T>,
    children: HashMap<String, PathTree<T>>,
}

impl<T> Default for PathTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PathTree<T> {
    /// Creates an empty trie.
    #[must_use]
    pub fn new() -> Self {
        Self {
            value: None,
            children: HashMap::new(),
        }
    }

    /// Traverses the path, creating missing nodes, and returns the terminal
    /// node.
    pub fn append(&mut self, path: &str) -> &mut PathTree<T> {
        if path.is_empty() {
            return self;
        }
        let (segment, rest) = split_path(path);
        let child = self.children.entry(segment.to_string()).or_default();
        match rest {
            Some(rest) => child.append(rest),
            None => child,
        }
    }

    /// Traverses the path as far as existing nodes allow.
    ///
    /// Returns the deepest reachable node and the unconsumed suffix, which
    /// is `None` when the full path resolved.
    #[must_use]
    pub fn lookup<'a>(&self, path: &'a str) -> (&PathTree<T>, Option<&'a str>) {
        if path.is_empty() {
            return (self, None);
        }
        let (segment, rest) = split_path(path);
        match self.children.get(segment) {
            Some(child) => match rest {
                Some(rest) => child.lookup(rest),
                None => (child, None),
            },
            None => (self, Some(path)),
        }
    }

    /// Sets the terminal payload and returns the previous one.
    pub fn store(&mut self, value: T) -> Option<T> {
        self.value.replace(value)
    }

    /// Returns the terminal payload.
    #[must_use]
    pub fn load(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Returns true if the node has child nodes.
    #[must_use]
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Clears the trie.
    pub fn clear(&mut self) {
        self.value = None;
        self.children.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_path_segments() {
        assert_eq!(split_path("a.b.c"), ("a", Some("b.c")));
        assert_eq!(split_path("a"), ("a", None));
        assert_eq!(split_path(""), ("", None));
    }

    #[test]
    fn parse_index_accepts_digits_only() {
        assert_eq!(parse_index("0"), Some(0));
        assert_eq!(parse_index("42"), Some(42));
        assert_eq!(parse_index("x1"), None);
        assert_eq!(parse_index("-1"), None);
        assert_eq!(parse_index(""), None);
    }

    #[test]
    fn append_and_lookup() {
        let mut tree: PathTree<i32> = PathTree::new();
        tree.append("a.b").store(1);

        let (node, rest) = tree.lookup("a.b");
        assert_eq!(rest, None);
        assert_eq!(node.load(), Some(&1));

        let (node, rest) = tree.lookup("a.b.c.d");
        assert_eq!(rest, Some("c.d"));
        assert_eq!(node.load(), Some(&1));

        let (_, rest) = tree.lookup("x.y");
        assert_eq!(rest, Some("x.y"));
    }

    #[test]
    fn intermediate_nodes_have_children() {
        let mut tree: PathTree<()> = PathTree::new();
        tree.append("a.b");
        let (node, rest) = tree.lookup("a");
        assert_eq!(rest, None);
        assert!(node.has_children());
        assert_eq!(node.load(), None);
    }

    #[test]
    fn store_replaces_previous_payload() {
        let mut tree: PathTree<i32> = PathTree::new();
        let node = tree.append("k");
        assert_eq!(node.store(1), None);
        assert_eq!(node.store(2), Some(1));
    }
}
