//! Filesystem entry nodes and their asynchronous classification.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use compact_str::{CompactString, format_compact};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::ClassificationHints;
use crate::error::{Result, TreeError};

/// Logical path of the tree root.
pub const ROOT_PATH: &str = "/";

/// Classification of a node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum NodeType {
    /// Directory that is descended into.
    Branch,
    /// Terminal entry with the default classification.
    Leaf,
    /// Terminal entry matching a fruit hint.
    Fruit,
    /// Anything else (dangling symlinks, sockets, devices).
    Other,
}

impl NodeType {
    /// Check if this node is descended into.
    pub fn is_branch(&self) -> bool {
        matches!(self, NodeType::Branch)
    }
}

/// Stat failure carried through the readiness cell.
#[derive(Debug, Clone)]
struct Failure {
    kind: std::io::ErrorKind,
    message: String,
}

type Readiness = Option<std::result::Result<NodeType, Failure>>;

/// Attached children; sealed once the tree is finished.
#[derive(Default)]
struct Children {
    nodes: Vec<Arc<Node>>,
    sealed: bool,
}

/// A single filesystem entry in the tree.
///
/// A node classifies itself on a spawned task. Its readiness resolves once;
/// every call to [`Node::ready`] observes the same resolution.
pub struct Node {
    path: CompactString,
    realpath: PathBuf,
    name: CompactString,
    ready: watch::Receiver<Readiness>,
    children: Mutex<Children>,
}

impl Node {
    /// Create a node and start classifying it.
    ///
    /// Must be called from within a Tokio runtime. The node with logical
    /// path `/` is the tree root and is always a branch.
    pub fn spawn(
        path: impl Into<CompactString>,
        realpath: impl Into<PathBuf>,
        hints: Arc<ClassificationHints>,
        debug: bool,
        verbose: bool,
    ) -> Arc<Self> {
        let path = path.into();
        let realpath = realpath.into();
        let name = realpath
            .file_name()
            .map(entry_name)
            .unwrap_or_else(|| CompactString::new(ROOT_PATH));

        let (tx, rx) = watch::channel(None);
        let node = Arc::new(Self {
            path,
            realpath,
            name,
            ready: rx,
            children: Mutex::new(Children::default()),
        });

        let is_root = node.path == ROOT_PATH;
        let path = node.path.clone();
        let realpath = node.realpath.clone();
        let name = node.name.clone();
        tokio::spawn(async move {
            let result = classify(&realpath, &name, &hints, is_root).await;
            match &result {
                Ok(node_type) => {
                    if debug {
                        debug!(path = %path, realpath = %realpath.display(), %node_type, "Classified node");
                    }
                    if verbose {
                        info!("node ready: {path} ({node_type})");
                    }
                }
                Err(err) => debug!(path = %path, error = %err, "Classification failed"),
            }
            let readiness = result.map_err(|err| Failure {
                kind: err.kind(),
                message: err.to_string(),
            });
            tx.send_replace(Some(readiness));
        });

        node
    }

    /// Logical path, relative to the tree root.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Physical filesystem location.
    pub fn realpath(&self) -> &Path {
        &self.realpath
    }

    /// Entry name (last component of the physical path).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Classification, or `None` while the node is still classifying.
    pub fn node_type(&self) -> Option<NodeType> {
        self.ready
            .borrow()
            .as_ref()
            .and_then(|readiness| readiness.as_ref().ok().copied())
    }

    /// Check whether classification has finished (successfully or not).
    pub fn is_ready(&self) -> bool {
        self.ready.borrow().is_some()
    }

    /// Wait for the node to finish classifying.
    pub async fn ready(&self) -> Result<NodeType> {
        let mut rx = self.ready.clone();
        let readiness = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| TreeError::TaskFailed {
                message: format!("classification of {} was dropped", self.path),
            })?;

        match readiness.as_ref() {
            Some(Ok(node_type)) => Ok(*node_type),
            Some(Err(failure)) => Err(TreeError::classification(
                self.realpath.clone(),
                failure.kind,
                failure.message.clone(),
            )),
            None => Err(TreeError::TaskFailed {
                message: format!("classification of {} never resolved", self.path),
            }),
        }
    }

    /// Attach a child. Only unsealed branch nodes accept children.
    pub fn append_child(&self, child: Arc<Node>) -> Result<()> {
        if self.node_type() != Some(NodeType::Branch) {
            return Err(TreeError::NotABranch {
                path: self.path.to_string(),
            });
        }
        let mut children = self.lock_children();
        if children.sealed {
            return Err(TreeError::Sealed {
                path: self.path.to_string(),
            });
        }
        children.nodes.push(child);
        Ok(())
    }

    /// Snapshot of the attached children, in attachment order.
    pub fn children(&self) -> Vec<Arc<Node>> {
        self.lock_children().nodes.clone()
    }

    /// Get the number of direct children.
    pub fn child_count(&self) -> usize {
        self.lock_children().nodes.len()
    }

    /// Check whether the node is part of a finished tree.
    pub fn is_sealed(&self) -> bool {
        self.lock_children().sealed
    }

    /// Refuse further children.
    pub(crate) fn seal(&self) {
        self.lock_children().sealed = true;
    }

    fn lock_children(&self) -> std::sync::MutexGuard<'_, Children> {
        self.children.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("path", &self.path)
            .field("realpath", &self.realpath)
            .field("node_type", &self.node_type())
            .field("children", &self.child_count())
            .finish()
    }
}

/// Determine the classification of one entry.
async fn classify(
    realpath: &Path,
    name: &str,
    hints: &ClassificationHints,
    is_root: bool,
) -> std::io::Result<NodeType> {
    let metadata = match tokio::fs::metadata(realpath).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            // Dangling symlinks exist but cannot be followed.
            return match tokio::fs::symlink_metadata(realpath).await {
                Ok(link) if link.file_type().is_symlink() => Ok(NodeType::Other),
                _ => Err(err),
            };
        }
        Err(err) => return Err(err),
    };

    if is_root {
        return Ok(NodeType::Branch);
    }

    let node_type = if hints.is_fruit(name) {
        NodeType::Fruit
    } else if hints.is_leaf(name) {
        NodeType::Leaf
    } else if metadata.is_dir() {
        NodeType::Branch
    } else if metadata.is_file() {
        NodeType::Leaf
    } else {
        NodeType::Other
    };
    Ok(node_type)
}

/// Logical name of a directory entry.
///
/// UTF-8 names are used as-is. Names that are not valid UTF-8 have each
/// invalid byte, and each `%`, written as `%XX`.
pub fn entry_name(name: &OsStr) -> CompactString {
    match name.to_str() {
        Some(name) => CompactString::new(name),
        None => escape_name(name),
    }
}

#[cfg(unix)]
fn escape_name(name: &OsStr) -> CompactString {
    use std::os::unix::ffi::OsStrExt;

    let mut escaped = CompactString::default();
    for chunk in name.as_bytes().utf8_chunks() {
        for c in chunk.valid().chars() {
            if c == '%' {
                escaped.push_str("%25");
            } else {
                escaped.push(c);
            }
        }
        for byte in chunk.invalid() {
            escaped.push_str(&format_compact!("%{byte:02X}"));
        }
    }
    escaped
}

#[cfg(not(unix))]
fn escape_name(name: &OsStr) -> CompactString {
    CompactString::new(name.to_string_lossy())
}

/// Join an entry name onto a logical path.
pub fn join_path(parent: &str, name: &str) -> CompactString {
    let parent = parent.trim_end_matches('/');
    format_compact!("{parent}/{name}")
}

/// Logical parent of a path, or `None` for the root.
pub fn parent_path(path: &str) -> Option<&str> {
    if path == ROOT_PATH {
        return None;
    }
    let (parent, _) = path.trim_end_matches('/').rsplit_once('/')?;
    Some(if parent.is_empty() { ROOT_PATH } else { parent })
}
