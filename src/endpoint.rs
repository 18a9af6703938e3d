//! Endpoint label mapper.
//!
//! Classifies request paths into a small, fixed set of labels so metrics
//! stay route-level instead of growing one series per requested file.
//!
//! The mapping lives in a persistent byte trie. [`EndpointMapper::declare`]
//! copies only the nodes along the inserted key and shares every other
//! subtree with the previous version, so a clone taken earlier keeps seeing
//! the tree as it was.

use std::sync::Arc;

#[derive(Clone, Debug, Default)]
struct Node {
    label: Option<Arc<str>>,
    // Sorted by byte.
    children: Vec<(u8, Arc<Node>)>,
}

impl Node {
    fn child(&self, byte: u8) -> Option<&Node> {
        self.children
            .binary_search_by_key(&byte, |(b, _)| *b)
            .ok()
            .map(|i| self.children[i].1.as_ref())
    }

    fn with(&self, key: &[u8], label: Arc<str>) -> Node {
        let mut copy = self.clone();
        match key.split_first() {
            None => copy.label = Some(label),
            Some((&byte, rest)) => match copy.children.binary_search_by_key(&byte, |(b, _)| *b) {
                Ok(i) => {
                    let updated = copy.children[i].1.with(rest, label);
                    copy.children[i].1 = Arc::new(updated);
                }
                Err(i) => {
                    let fresh = Node::default().with(rest, label);
                    copy.children.insert(i, (byte, Arc::new(fresh)));
                }
            },
        }
        copy
    }
}

/// Longest-prefix path classifier. Cheap to clone; clones are snapshots.
#[derive(Clone, Debug, Default)]
pub struct EndpointMapper {
    root: Arc<Node>,
}

impl EndpointMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps every path starting with `prefix` to `label`, unless a longer
    /// declared prefix also matches. Redeclaring a prefix replaces its label.
    pub fn declare(&mut self, prefix: &str, label: &str) {
        self.root = Arc::new(self.root.with(prefix.as_bytes(), Arc::from(label)));
    }

    /// Label of the longest declared prefix of `path`, or `""`.
    pub fn map(&self, path: &str) -> &str {
        let mut node = self.root.as_ref();
        let mut found = node.label.as_deref();
        for &byte in path.as_bytes() {
            match node.child(byte) {
                Some(next) => node = next,
                None => break,
            }
            if let Some(label) = node.label.as_deref() {
                found = Some(label);
            }
        }
        found.unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> EndpointMapper {
        let mut m = EndpointMapper::new();
        m.declare("/static", "/static");
        m.declare("/upload", "/upload");
        m.declare("/download", "/download");
        m
    }

    #[test]
    fn test_longest_prefix_wins() {
        let m = mapper();
        assert_eq!(m.map("/static/sub/file.txt"), "/static");
        assert_eq!(m.map("/upload"), "/upload");
        assert_eq!(m.map("/download?x"), "/download");
    }

    #[test]
    fn test_unknown_paths_map_to_empty() {
        let m = mapper();
        assert_eq!(m.map("/unknown"), "");
        assert_eq!(m.map("/stat"), "");
        assert_eq!(m.map(""), "");
    }

    #[test]
    fn test_more_specific_prefix_wins_regardless_of_order() {
        let mut m = EndpointMapper::new();
        m.declare("/static/deep", "deep");
        m.declare("/", "root");
        m.declare("/static", "static");

        assert_eq!(m.map("/static/deep/x"), "deep");
        assert_eq!(m.map("/static/other"), "static");
        assert_eq!(m.map("/elsewhere"), "root");
    }

    #[test]
    fn test_snapshots_are_unaffected_by_later_declarations() {
        let mut m = mapper();
        let before = m.clone();
        m.declare("/static/sub", "/static/sub");

        assert_eq!(m.map("/static/sub/file.txt"), "/static/sub");
        assert_eq!(before.map("/static/sub/file.txt"), "/static");
    }

    #[test]
    fn test_redeclaring_replaces_label() {
        let mut m = mapper();
        m.declare("/upload", "uploads");
        assert_eq!(m.map("/upload"), "uploads");
    }
}
