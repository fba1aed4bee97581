//! Asynchronous tree building engine for canopy.
//!
//! This crate walks a root directory breadth-first and turns every entry
//! into a classified [`Node`], linked into a parent/child tree.
//!
//! # Overview
//!
//! `canopy-walk` drives the whole build:
//!
//! - **Non-blocking I/O** via tokio, one fan-out and join per directory
//! - **Ready-state machine** (`Uninitialized -> Busy -> End`)
//! - **Single terminal event** carrying the nodes, branches, leaves and fruits
//! - **All-or-nothing** failure: any listing or classification error aborts
//!
//! # Example
//!
//! ```rust,no_run
//! use canopy_walk::{TreeBuilder, TreeConfig};
//!
//! # async fn example() -> canopy_walk::Result<()> {
//! let config = TreeConfig::builder()
//!     .fruits(vec!["md".to_string()])
//!     .build()
//!     .unwrap();
//! let tree = TreeBuilder::build("/path/to/root", config).await?;
//!
//! println!("Branches: {}", tree.branches().len());
//! println!("Fruits: {}", tree.fruits().len());
//! # Ok(())
//! # }
//! ```
//!
//! # Listening for events
//!
//! ```rust,no_run
//! use canopy_walk::{TreeBuilder, TreeConfig, TreeEvent};
//!
//! # async fn example() {
//! let builder = TreeBuilder::spawn("/path/to/root", TreeConfig::default());
//! let mut listener = builder.subscribe();
//!
//! while let Some(event) = listener.recv().await {
//!     match event {
//!         TreeEvent::ReadyStateChange(state) => println!("state: {state}"),
//!         TreeEvent::End(tree) => println!("{} nodes", tree.nodes().len()),
//!     }
//! }
//! # }
//! ```

mod builder;
mod events;
mod ignore;

pub use builder::TreeBuilder;
pub use events::{ReadyState, TreeEvent, TreeListener};
pub use ignore::{IGNORED_NAMES, is_ignored};

// Re-export core types for convenience
pub use canopy_core::{
    ClassificationHints, Node, NodeMap, NodeRecord, NodeType, ROOT_PATH, Result, TreeConfig,
    TreeEnd, TreeError, TreeStats, entry_name, join_path, parent_path,
};

/// Buffer size of the live event channel.
pub const EVENT_CHANNEL_SIZE: usize = 16;
