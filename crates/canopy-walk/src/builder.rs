//! Breadth-first asynchronous tree builder.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use compact_str::CompactString;
use futures::future::try_join_all;
use indexmap::IndexSet;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use canopy_core::{
    ClassificationHints, Node, NodeMap, NodeType, ROOT_PATH, Result, TreeConfig, TreeEnd,
    TreeError, entry_name, join_path,
};

use crate::events::{EventLog, ReadyState, TreeListener};
use crate::ignore::is_ignored;

/// Builds a classified tree from a root directory.
///
/// The walk starts on construction and runs on a spawned task. Listeners
/// obtained from [`TreeBuilder::subscribe`] observe every ready-state change
/// and the terminal event; [`TreeBuilder::finish`] carries the failure signal.
pub struct TreeBuilder {
    shared: Arc<Shared>,
    task: JoinHandle<Result<Arc<TreeEnd>>>,
}

/// State owned by one build and shared with its task.
struct Shared {
    root: PathBuf,
    config: TreeConfig,
    hints: Arc<ClassificationHints>,
    events: EventLog,
}

impl TreeBuilder {
    /// Start building the tree under `root`.
    ///
    /// Must be called from within a Tokio runtime. Returns immediately; the
    /// builder stays `Uninitialized` until the spawned task has validated
    /// the root.
    pub fn spawn(root: impl Into<PathBuf>, config: TreeConfig) -> Self {
        let root = root.into();
        if config.verbose {
            info!("building tree from {}", root.display());
        }

        let shared = Arc::new(Shared::new(root, config));
        let task = tokio::spawn(run(Arc::clone(&shared), list_entries));

        Self { shared, task }
    }

    /// Build the tree and wait for the result.
    pub async fn build(root: impl Into<PathBuf>, config: TreeConfig) -> Result<Arc<TreeEnd>> {
        Self::spawn(root, config).finish().await
    }

    /// Wait for the build to complete or fail.
    pub async fn finish(self) -> Result<Arc<TreeEnd>> {
        self.task.await.map_err(|err| TreeError::TaskFailed {
            message: err.to_string(),
        })?
    }

    /// Listen for ready-state changes and the terminal event.
    pub fn subscribe(&self) -> TreeListener {
        self.shared.events.subscribe()
    }

    /// Current readiness.
    pub fn ready_state(&self) -> ReadyState {
        self.shared.events.state()
    }

    /// Physical root directory, as given.
    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    /// Whether classification detail is logged.
    pub fn debug(&self) -> bool {
        self.shared.config.debug
    }

    /// Whether per-node progress is logged.
    pub fn verbose(&self) -> bool {
        self.shared.config.verbose
    }

    /// Configured leaf hints.
    pub fn leaf_hints(&self) -> &IndexSet<String> {
        self.shared.hints.leaves()
    }

    /// Configured fruit hints.
    pub fn fruit_hints(&self) -> &IndexSet<String> {
        self.shared.hints.fruits()
    }

    /// Finished result, `None` before `End`.
    pub fn result(&self) -> Option<&Arc<TreeEnd>> {
        self.shared.events.result()
    }

    /// Every discovered node, `None` before `End`.
    pub fn nodes(&self) -> Option<&NodeMap> {
        self.result().map(|end| end.nodes())
    }

    /// Branch nodes, `None` before `End`.
    pub fn branches(&self) -> Option<&NodeMap> {
        self.result().map(|end| end.branches())
    }

    /// Leaf nodes, `None` before `End`.
    pub fn leaves(&self) -> Option<&NodeMap> {
        self.result().map(|end| end.leaves())
    }

    /// Fruit nodes, `None` before `End`.
    pub fn fruits(&self) -> Option<&NodeMap> {
        self.result().map(|end| end.fruits())
    }
}

impl std::fmt::Debug for TreeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeBuilder")
            .field("root", &self.shared.root)
            .field("ready_state", &self.ready_state())
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn new(root: PathBuf, config: TreeConfig) -> Self {
        Self {
            hints: Arc::new(config.hints()),
            root,
            config,
            events: EventLog::new(),
        }
    }
}

/// Run one build to completion, listing directories with `list`.
async fn run<L, F>(shared: Arc<Shared>, list: L) -> Result<Arc<TreeEnd>>
where
    L: Fn(PathBuf) -> F,
    F: Future<Output = Result<Vec<OsString>>>,
{
    match walk(&shared, &list).await {
        Ok(end) => {
            let end = Arc::new(end);
            shared.events.finish(Arc::clone(&end));
            Ok(end)
        }
        Err(err) => {
            error!(root = %shared.root.display(), error = %err, "Tree build failed");
            shared.events.close();
            Err(err)
        }
    }
}

/// Collections accumulated during the walk.
#[derive(Default)]
struct Collector {
    nodes: NodeMap,
    branches: NodeMap,
    leaves: NodeMap,
    fruits: NodeMap,
}

impl Collector {
    /// Record a ready node. `Other` nodes are dropped.
    ///
    /// Fails if another node already holds the same logical path.
    fn record(&mut self, node: Arc<Node>, node_type: NodeType) -> Result<()> {
        if self.nodes.contains_key(node.path()) {
            return Err(TreeError::DuplicatePath {
                path: node.path().to_string(),
                realpath: node.realpath().to_path_buf(),
            });
        }
        let key = CompactString::new(node.path());
        let subset = match node_type {
            NodeType::Branch => &mut self.branches,
            NodeType::Leaf => &mut self.leaves,
            NodeType::Fruit => &mut self.fruits,
            NodeType::Other => return Ok(()),
        };
        subset.insert(key.clone(), Arc::clone(&node));
        self.nodes.insert(key, node);
        Ok(())
    }

    fn finish(self, root: PathBuf, started: Instant) -> TreeEnd {
        TreeEnd::new(
            root,
            self.nodes,
            self.branches,
            self.leaves,
            self.fruits,
            started.elapsed(),
        )
    }
}

async fn walk<L, F>(shared: &Shared, list: &L) -> Result<TreeEnd>
where
    L: Fn(PathBuf) -> F,
    F: Future<Output = Result<Vec<OsString>>>,
{
    let started = Instant::now();
    let TreeConfig { debug, verbose, .. } = shared.config;

    validate_root(&shared.root).await?;
    shared.events.transition(ReadyState::Busy);

    if verbose {
        info!("treewalk, root node: {}", shared.root.display());
    }
    let root = Node::spawn(
        ROOT_PATH,
        shared.root.clone(),
        Arc::clone(&shared.hints),
        debug,
        verbose,
    );
    root.ready().await?;

    let mut collector = Collector::default();
    collector.record(Arc::clone(&root), NodeType::Branch)?;

    let mut to_walk = VecDeque::from([root]);
    while let Some(branch) = to_walk.pop_front() {
        let names = list(branch.realpath().to_path_buf()).await?;
        if debug {
            debug!(path = branch.path(), entries = names.len(), "Listed directory");
        }

        let children: Vec<Arc<Node>> = names
            .into_iter()
            .map(|name| {
                let realpath = branch.realpath().join(&name);
                if verbose {
                    info!("treewalk, node: {}", realpath.display());
                }
                Node::spawn(
                    join_path(branch.path(), &entry_name(&name)),
                    realpath,
                    Arc::clone(&shared.hints),
                    debug,
                    verbose,
                )
            })
            .collect();

        // One join per listing: every child is classified before the next pop.
        let node_types = try_join_all(children.iter().map(|child| child.ready())).await?;

        for (child, node_type) in children.into_iter().zip(node_types) {
            if node_type == NodeType::Other {
                if debug {
                    debug!(path = child.path(), "Dropping unclassified entry");
                }
                continue;
            }
            collector.record(Arc::clone(&child), node_type)?;
            branch.append_child(Arc::clone(&child))?;
            if node_type.is_branch() {
                to_walk.push_back(child);
            }
        }
    }

    Ok(collector.finish(shared.root.clone(), started))
}

/// Stat the root before anything is built.
async fn validate_root(root: &Path) -> Result<()> {
    let metadata = tokio::fs::metadata(root)
        .await
        .map_err(|err| TreeError::io(root, err))?;
    if !metadata.is_dir() {
        return Err(TreeError::NotADirectory {
            path: root.to_path_buf(),
        });
    }
    Ok(())
}

/// List a directory, skipping housekeeping entries.
///
/// Names are sorted so repeated builds discover nodes in the same order.
async fn list_entries(dir: PathBuf) -> Result<Vec<OsString>> {
    let listing_error = |source: std::io::Error| TreeError::Listing {
        path: dir.clone(),
        source,
    };

    let mut entries = tokio::fs::read_dir(&dir).await.map_err(listing_error)?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(listing_error)? {
        let name = entry.file_name();
        if !is_ignored(&name.to_string_lossy()) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TreeEvent;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_collector_partitions_by_type() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "a").unwrap();
        let hints = Arc::new(ClassificationHints::default());

        let root = Node::spawn(ROOT_PATH, temp.path(), Arc::clone(&hints), false, false);
        let leaf = Node::spawn("/a.txt", temp.path().join("a.txt"), hints, false, false);
        root.ready().await.unwrap();
        leaf.ready().await.unwrap();

        let mut collector = Collector::default();
        collector.record(root, NodeType::Branch).unwrap();
        collector.record(Arc::clone(&leaf), NodeType::Leaf).unwrap();

        assert_eq!(collector.nodes.len(), 2);
        assert_eq!(collector.branches.len(), 1);
        assert_eq!(collector.leaves.len(), 1);
        assert!(collector.fruits.is_empty());

        let err = collector.record(leaf, NodeType::Leaf).unwrap_err();
        assert!(matches!(err, TreeError::DuplicatePath { .. }));
        assert_eq!(collector.nodes.len(), 2);
    }

    #[tokio::test]
    async fn test_collector_drops_other() {
        let temp = TempDir::new().unwrap();
        let hints = Arc::new(ClassificationHints::default());
        let root = Node::spawn(ROOT_PATH, temp.path(), hints, false, false);
        root.ready().await.unwrap();

        let mut collector = Collector::default();
        collector.record(root, NodeType::Other).unwrap();
        assert!(collector.nodes.is_empty());
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_walk() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("locked")).unwrap();
        fs::write(temp.path().join("locked/a.txt"), "a").unwrap();
        fs::write(temp.path().join("b.txt"), "b").unwrap();

        let shared = Arc::new(Shared::new(temp.path().to_path_buf(), TreeConfig::default()));
        let mut listener = shared.events.subscribe();
        let locked = temp.path().join("locked");

        let err = run(Arc::clone(&shared), move |dir: PathBuf| {
            let locked = locked.clone();
            async move {
                if dir == locked {
                    Err(TreeError::Listing {
                        path: dir,
                        source: std::io::ErrorKind::PermissionDenied.into(),
                    })
                } else {
                    list_entries(dir).await
                }
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, TreeError::Listing { ref path, .. } if path.ends_with("locked")));
        assert_eq!(shared.events.state(), ReadyState::Busy);
        assert!(shared.events.result().is_none());

        let mut states = Vec::new();
        while let Some(event) = listener.recv().await {
            match event {
                TreeEvent::ReadyStateChange(state) => states.push(state),
                TreeEvent::End(_) => panic!("failed build emitted End"),
            }
        }
        assert_eq!(states, vec![ReadyState::Uninitialized, ReadyState::Busy]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_utf8_names_keep_distinct_paths() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp = TempDir::new().unwrap();
        for name in [&b"\xff"[..], &b"\xfe"[..]] {
            fs::write(temp.path().join(OsStr::from_bytes(name)), "x").unwrap();
        }

        let tree = TreeBuilder::build(temp.path(), TreeConfig::default())
            .await
            .unwrap();
        let root = tree.root().unwrap();

        assert_eq!(tree.nodes().len(), 3);
        assert_eq!(tree.leaves().len(), 2);
        assert_eq!(root.child_count(), tree.nodes().len() - 1);
        assert!(tree.get("/%FE").is_some());
        assert!(tree.get("/%FF").is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_colliding_names_fail_build() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("%FF"), "x").unwrap();
        fs::write(temp.path().join(OsStr::from_bytes(b"\xff")), "x").unwrap();

        let err = TreeBuilder::build(temp.path(), TreeConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TreeError::DuplicatePath { ref path, .. } if path == "/%FF"));
    }

    #[tokio::test]
    async fn test_finished_tree_is_sealed() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("dir")).unwrap();
        fs::write(temp.path().join("a.txt"), "a").unwrap();

        let tree = TreeBuilder::build(temp.path(), TreeConfig::default())
            .await
            .unwrap();
        let root = tree.root().unwrap();
        let dir = tree.get("/dir").unwrap();
        let leaf = tree.get("/a.txt").unwrap();
        assert_eq!(root.child_count(), 2);

        let err = root.append_child(Arc::clone(leaf)).unwrap_err();
        assert!(matches!(err, TreeError::Sealed { .. }));
        assert!(dir.append_child(Arc::clone(leaf)).is_err());
        assert_eq!(root.child_count(), 2);
        assert_eq!(dir.child_count(), 0);
        assert!(tree.nodes().values().all(|node| node.is_sealed()));
    }

    #[tokio::test]
    async fn test_list_entries_skips_ignored() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(".DS_Store"), "").unwrap();
        fs::write(temp.path().join("b.txt"), "").unwrap();
        fs::write(temp.path().join("a.txt"), "").unwrap();

        let names = list_entries(temp.path().to_path_buf()).await.unwrap();
        assert_eq!(names, vec![OsString::from("a.txt"), OsString::from("b.txt")]);
    }

    #[tokio::test]
    async fn test_list_entries_missing_dir() {
        let temp = TempDir::new().unwrap();
        let err = list_entries(temp.path().join("gone")).await.unwrap_err();
        assert!(matches!(err, TreeError::Listing { .. }));
    }

    #[tokio::test]
    async fn test_validate_root() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file.txt");
        fs::write(&file, "x").unwrap();

        assert!(validate_root(temp.path()).await.is_ok());
        assert!(matches!(
            validate_root(&file).await,
            Err(TreeError::NotADirectory { .. })
        ));
        assert!(matches!(
            validate_root(&temp.path().join("gone")).await,
            Err(TreeError::PathNotFound { .. })
        ));
    }
}
