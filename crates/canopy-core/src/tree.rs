//! Completed tree snapshot and export records.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::node::{Node, NodeType, ROOT_PATH, parent_path};

/// Nodes keyed by logical path, in discovery order.
pub type NodeMap = IndexMap<CompactString, Arc<Node>>;

/// Summary counts for a completed tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    /// Total number of recorded nodes.
    pub nodes: usize,
    /// Number of branch nodes (including the root).
    pub branches: usize,
    /// Number of leaf nodes.
    pub leaves: usize,
    /// Number of fruit nodes.
    pub fruits: usize,
}

/// Immutable result of a finished build, carried by the terminal event.
#[derive(Debug, Clone)]
pub struct TreeEnd {
    root_path: PathBuf,
    nodes: NodeMap,
    branches: NodeMap,
    leaves: NodeMap,
    fruits: NodeMap,
    built_at: SystemTime,
    build_duration: Duration,
}

impl TreeEnd {
    /// Freeze the four collections of a finished build.
    ///
    /// Every node in `nodes` is sealed and refuses further children.
    pub fn new(
        root_path: PathBuf,
        nodes: NodeMap,
        branches: NodeMap,
        leaves: NodeMap,
        fruits: NodeMap,
        build_duration: Duration,
    ) -> Self {
        for node in nodes.values() {
            node.seal();
        }
        Self {
            root_path,
            nodes,
            branches,
            leaves,
            fruits,
            built_at: SystemTime::now(),
            build_duration,
        }
    }

    /// Physical root directory.
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Root node, logical path `/`.
    pub fn root(&self) -> Option<&Arc<Node>> {
        self.nodes.get(ROOT_PATH)
    }

    /// Every recorded node.
    pub fn nodes(&self) -> &NodeMap {
        &self.nodes
    }

    /// Branch nodes.
    pub fn branches(&self) -> &NodeMap {
        &self.branches
    }

    /// Leaf nodes.
    pub fn leaves(&self) -> &NodeMap {
        &self.leaves
    }

    /// Fruit nodes.
    pub fn fruits(&self) -> &NodeMap {
        &self.fruits
    }

    /// When the build finished.
    pub fn built_at(&self) -> SystemTime {
        self.built_at
    }

    /// How long the build took.
    pub fn build_duration(&self) -> Duration {
        self.build_duration
    }

    /// Look up a node by logical path.
    pub fn get(&self, path: &str) -> Option<&Arc<Node>> {
        self.nodes.get(path)
    }

    /// Branch that holds the node at `path`.
    pub fn parent_of(&self, path: &str) -> Option<&Arc<Node>> {
        parent_path(path).and_then(|parent| self.branches.get(parent))
    }

    /// Summary counts.
    pub fn stats(&self) -> TreeStats {
        TreeStats {
            nodes: self.nodes.len(),
            branches: self.branches.len(),
            leaves: self.leaves.len(),
            fruits: self.fruits.len(),
        }
    }

    /// Flatten the tree into serializable records, in discovery order.
    pub fn records(&self) -> Vec<NodeRecord> {
        self.nodes.values().map(|node| NodeRecord::from_node(node)).collect()
    }
}

/// Serializable view of a single node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Logical path.
    pub path: String,
    /// Physical path.
    pub realpath: PathBuf,
    /// Classification.
    #[serde(rename = "type")]
    pub node_type: Option<NodeType>,
    /// Logical paths of the direct children.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
}

impl NodeRecord {
    /// Capture a node and the paths of its children.
    pub fn from_node(node: &Node) -> Self {
        Self {
            path: node.path().to_string(),
            realpath: node.realpath().to_path_buf(),
            node_type: node.node_type(),
            children: node
                .children()
                .iter()
                .map(|child| child.path().to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_stats_default() {
        let stats = TreeStats::default();
        assert_eq!(stats.nodes, 0);
        assert_eq!(stats.branches, 0);
        assert_eq!(stats.leaves, 0);
        assert_eq!(stats.fruits, 0);
    }

    #[test]
    fn test_empty_tree_end() {
        let end = TreeEnd::new(
            PathBuf::from("/tmp/x"),
            NodeMap::new(),
            NodeMap::new(),
            NodeMap::new(),
            NodeMap::new(),
            Duration::ZERO,
        );
        assert!(end.root().is_none());
        assert!(end.parent_of("/a").is_none());
        assert!(end.records().is_empty());
        assert_eq!(end.root_path(), Path::new("/tmp/x"));
    }

    #[test]
    fn test_node_record_serialization() {
        let record = NodeRecord {
            path: "/a".to_string(),
            realpath: PathBuf::from("/tmp/root/a"),
            node_type: Some(NodeType::Fruit),
            children: Vec::new(),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"type\":\"FRUIT\""));
        assert!(!json.contains("children"));
    }
}
