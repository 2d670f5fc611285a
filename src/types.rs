use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Whether a bundle's document is written back by [`Registry::save`](crate::Registry::save).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Read-write: saves overwrite the document with the in-memory values.
    #[default]
    Settings,
    /// The document is written when first created (and optionally after a
    /// migration), never by an explicit save.
    ReadOnly,
}

/// What to do with document keys that no declared member claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleKeyPolicy {
    /// Delete the key from the document.
    Remove,
    /// Keep the key and attach the configured warning as its comment.
    #[default]
    MarkUnused,
    /// Leave the key untouched.
    Ignore,
}

/// Base directory that relative bundle locations resolve against.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigDir {
    /// Platform config directory (XDG on Linux, ~/Library/Application Support on macOS).
    Platform,
    /// A subdirectory under the user's home directory, e.g. `Home(".myapp")`.
    Home(&'static str),
    /// Current working directory.
    Cwd,
    /// An explicit directory.
    Path(PathBuf),
}
