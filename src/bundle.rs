use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::describe::Section;
use crate::error::BindError;
use crate::migrate::MigrationChain;
use crate::types::AccessMode;
use crate::version::Version;

/// A section that may be reachable from several owners.
///
/// The binder identifies shared sections by allocation, so a value reached
/// twice in one pass is bound once and cycles terminate.
pub type Shared<T> = Arc<Mutex<T>>;

pub fn shared<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Unique identity of a registered bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BundleId(Uuid);

impl BundleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BundleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Registration metadata every bundle carries.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleMeta {
    id: BundleId,
    version: Version,
    location: PathBuf,
    mode: AccessMode,
    substituted: BTreeSet<String>,
}

impl BundleMeta {
    /// A writable bundle at `location`, which is resolved against the
    /// registry's config directory when relative.
    pub fn new(version: Version, location: impl Into<PathBuf>) -> Self {
        Self {
            id: BundleId::new(),
            version,
            location: location.into(),
            mode: AccessMode::default(),
            substituted: BTreeSet::new(),
        }
    }

    pub fn read_only(self) -> Self {
        self.with_mode(AccessMode::ReadOnly)
    }

    pub fn with_mode(mut self, mode: AccessMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn id(&self) -> BundleId {
        self.id
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn is_read_only(&self) -> bool {
        self.mode == AccessMode::ReadOnly
    }

    /// Paths whose in-memory value came from an override.
    pub fn substituted(&self) -> &BTreeSet<String> {
        &self.substituted
    }

    pub fn is_substituted(&self, path: &str) -> bool {
        self.substituted.contains(path)
    }

    pub(crate) fn set_location(&mut self, location: PathBuf) {
        self.location = location;
    }

    pub(crate) fn set_substituted(&mut self, substituted: BTreeSet<String>) {
        self.substituted = substituted;
    }
}

/// A root section persisted to its own document.
pub trait Bundle: Section {
    fn meta(&self) -> &BundleMeta;

    fn meta_mut(&mut self) -> &mut BundleMeta;

    /// Register the steps that upgrade older documents of this type.
    ///
    /// Called once per registry, before the first bundle of the type is
    /// registered.
    fn migrations(chain: &mut MigrationChain) -> Result<(), BindError> {
        let _ = chain;
        Ok(())
    }
}
