//! Housekeeping entries skipped in every directory listing.

/// Entry names never turned into nodes.
pub const IGNORED_NAMES: &[&str] = &[
    ".DS_Store",
    ".meta",
    ".Spotlight-V100",
    ".Trashes",
    ".fseventsd",
    "Thumbs.db",
    "desktop.ini",
];

/// Check if an entry name is a housekeeping artifact.
pub fn is_ignored(name: &str) -> bool {
    IGNORED_NAMES.contains(&name)
}
