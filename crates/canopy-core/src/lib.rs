//! Core types for canopy.
//!
//! This crate provides the node type that classifies a single filesystem
//! entry, the build configuration, the error type, and the immutable
//! snapshot produced when a tree build finishes.

mod config;
mod error;
mod node;
mod tree;

pub use config::{ClassificationHints, TreeConfig, TreeConfigBuilder};
pub use error::{Result, TreeError};
pub use node::{Node, NodeType, ROOT_PATH, entry_name, join_path, parent_path};
pub use tree::{NodeMap, NodeRecord, TreeEnd, TreeStats};
