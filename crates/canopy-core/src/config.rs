//! Tree build configuration types.

use derive_builder::Builder;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Configuration for building a tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct TreeConfig {
    /// Names or extensions that classify an entry as a fruit.
    #[builder(default)]
    #[serde(default)]
    pub fruits: Vec<String>,

    /// Names or extensions that classify an entry as a leaf.
    #[builder(default)]
    #[serde(default)]
    pub leaves: Vec<String>,

    /// Emit classification detail.
    #[builder(default = "false")]
    #[serde(default)]
    pub debug: bool,

    /// Emit per-node progress.
    #[builder(default = "false")]
    #[serde(default)]
    pub verbose: bool,
}

impl TreeConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        let fruits = self.fruits.iter().flatten();
        let leaves = self.leaves.iter().flatten();
        if fruits.chain(leaves).any(|hint| normalize_hint(hint).is_empty()) {
            return Err("Classification hints cannot be empty".to_string());
        }
        Ok(())
    }
}

impl TreeConfig {
    /// Create a new tree config builder.
    pub fn builder() -> TreeConfigBuilder {
        TreeConfigBuilder::default()
    }

    /// Collect the configured hints into a matcher shared by every node.
    pub fn hints(&self) -> ClassificationHints {
        ClassificationHints::new(self.fruits.iter(), self.leaves.iter())
    }

    /// Overlay another config on top of this one.
    ///
    /// Hint lists are appended, flags are or-ed.
    pub fn merge(mut self, other: TreeConfig) -> Self {
        self.fruits.extend(other.fruits);
        self.leaves.extend(other.leaves);
        self.debug |= other.debug;
        self.verbose |= other.verbose;
        self
    }
}

/// Strip a leading dot so `.md` and `md` hint the same extension.
fn normalize_hint(hint: &str) -> &str {
    hint.strip_prefix('.').unwrap_or(hint)
}

fn collect_hints<I>(hints: I) -> IndexSet<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    hints
        .into_iter()
        .map(|hint| hint.as_ref().to_string())
        .filter(|hint| !normalize_hint(hint).is_empty())
        .collect()
}

/// Leaf and fruit hint sets used during classification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationHints {
    fruits: IndexSet<String>,
    leaves: IndexSet<String>,
}

impl ClassificationHints {
    /// Build hint sets from iterables of names or extensions.
    pub fn new<F, L>(fruits: F, leaves: L) -> Self
    where
        F: IntoIterator,
        F::Item: AsRef<str>,
        L: IntoIterator,
        L::Item: AsRef<str>,
    {
        Self {
            fruits: collect_hints(fruits),
            leaves: collect_hints(leaves),
        }
    }

    /// Configured fruit hints, in configuration order.
    pub fn fruits(&self) -> &IndexSet<String> {
        &self.fruits
    }

    /// Configured leaf hints, in configuration order.
    pub fn leaves(&self) -> &IndexSet<String> {
        &self.leaves
    }

    /// Check whether an entry name matches a fruit hint.
    pub fn is_fruit(&self, name: &str) -> bool {
        Self::matches(&self.fruits, name)
    }

    /// Check whether an entry name matches a leaf hint.
    pub fn is_leaf(&self, name: &str) -> bool {
        Self::matches(&self.leaves, name)
    }

    fn matches(hints: &IndexSet<String>, name: &str) -> bool {
        let extension = name
            .rsplit_once('.')
            .filter(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
            .map(|(_, ext)| ext);

        hints.iter().any(|hint| {
            hint == name || extension.is_some_and(|ext| normalize_hint(hint) == ext)
        })
    }
}
