use canopy_core::{
    ClassificationHints, Node, NodeMap, NodeRecord, NodeType, ROOT_PATH, TreeConfig, TreeEnd,
    TreeStats, join_path, parent_path,
};
use compact_str::CompactString;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_tree_config_builder() {
    let config = TreeConfig::builder()
        .fruits(vec!["md".to_string(), ".json".to_string()])
        .leaves(vec!["node_modules".to_string()])
        .debug(true)
        .build()
        .unwrap();

    assert_eq!(config.fruits.len(), 2);
    assert_eq!(config.leaves, vec!["node_modules".to_string()]);
    assert!(config.debug);
    assert!(!config.verbose);

    let hints = config.hints();
    assert!(hints.is_fruit("a.json"));
    assert!(hints.is_leaf("node_modules"));
    assert_eq!(hints.fruits().len(), 2);

    // Test default config
    let default_config = TreeConfig::default();
    assert!(default_config.fruits.is_empty());
    assert!(default_config.hints().leaves().is_empty());
}

#[test]
fn test_tree_config_toml_roundtrip() {
    let config: TreeConfig = toml::from_str(
        r#"
        fruits = ["md"]
        verbose = true
        "#,
    )
    .unwrap();

    assert_eq!(config.fruits, vec!["md".to_string()]);
    assert!(config.leaves.is_empty());
    assert!(config.verbose);
    assert!(!config.debug);
}

#[test]
fn test_hint_sets_deduplicate() {
    let hints = ClassificationHints::new(["md", "md", "txt"], ["bin", ""]);
    assert_eq!(hints.fruits().len(), 2);
    assert_eq!(hints.leaves().len(), 1);
    assert!(!hints.is_fruit("archive.tar.gz"));
    assert!(hints.is_fruit("notes.txt"));
}

#[test]
fn test_logical_paths() {
    assert_eq!(join_path(ROOT_PATH, "a"), "/a");
    assert_eq!(join_path(&join_path("/", "a"), "b"), "/a/b");
    assert_eq!(parent_path("/a/b"), Some("/a"));
    assert_eq!(parent_path("/a"), Some(ROOT_PATH));
    assert_eq!(parent_path(ROOT_PATH), None);
}

#[tokio::test]
async fn test_tree_end_snapshot() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("a")).unwrap();
    fs::write(temp.path().join("a/y.special"), "y").unwrap();
    let hints = Arc::new(ClassificationHints::new(["special"], Vec::<String>::new()));

    let root = Node::spawn(ROOT_PATH, temp.path(), Arc::clone(&hints), false, false);
    let dir = Node::spawn("/a", temp.path().join("a"), Arc::clone(&hints), false, false);
    let fruit = Node::spawn("/a/y.special", temp.path().join("a/y.special"), hints, false, false);
    assert_eq!(root.ready().await.unwrap(), NodeType::Branch);
    assert_eq!(dir.ready().await.unwrap(), NodeType::Branch);
    assert_eq!(fruit.ready().await.unwrap(), NodeType::Fruit);
    root.append_child(Arc::clone(&dir)).unwrap();
    dir.append_child(Arc::clone(&fruit)).unwrap();

    let mut nodes = NodeMap::new();
    let mut branches = NodeMap::new();
    let mut fruits = NodeMap::new();
    for node in [&root, &dir] {
        nodes.insert(CompactString::new(node.path()), Arc::clone(node));
        branches.insert(CompactString::new(node.path()), Arc::clone(node));
    }
    nodes.insert(CompactString::new(fruit.path()), Arc::clone(&fruit));
    fruits.insert(CompactString::new(fruit.path()), Arc::clone(&fruit));

    let end = TreeEnd::new(
        temp.path().to_path_buf(),
        nodes,
        branches,
        NodeMap::new(),
        fruits,
        Duration::from_millis(5),
    );

    assert_eq!(
        end.stats(),
        TreeStats {
            nodes: 3,
            branches: 2,
            leaves: 0,
            fruits: 1,
        }
    );
    assert_eq!(end.root().unwrap().path(), "/");
    assert_eq!(end.parent_of("/a/y.special").unwrap().path(), "/a");
    assert_eq!(end.build_duration(), Duration::from_millis(5));

    let records = end.records();
    assert_eq!(
        records[1],
        NodeRecord {
            path: "/a".to_string(),
            realpath: temp.path().join("a"),
            node_type: Some(NodeType::Branch),
            children: vec!["/a/y.special".to_string()],
        }
    );
    assert_eq!(records[2].realpath, temp.path().join("a/y.special"));
}
