use std::path::PathBuf;

use thiserror::Error;

use crate::bundle::BundleId;
use crate::version::Version;

#[derive(Debug, Error)]
pub enum BindError {
    #[error("Type mismatch for '{member}': expected {expected}, found {found}")]
    StructuralMismatch {
        member: String,
        expected: String,
        found: String,
    },

    #[error("No migration registered from version {base} for {bundle_type}")]
    MigrationMissing {
        base: Version,
        bundle_type: &'static str,
    },

    #[error("Refusing to downgrade document from version {document} to {bundle}")]
    DowngradeRejected { document: Version, bundle: Version },

    #[error("Migration from {from} produced version {to}, which is not newer")]
    NonMonotonicMigration { from: Version, to: Version },

    #[error("A migration from version {base} is already registered for {bundle_type}")]
    DuplicateMigration {
        base: Version,
        bundle_type: &'static str,
    },

    #[error("Invalid or missing version under '{key}': {found}")]
    InvalidVersion { key: String, found: String },

    #[error("Cannot construct a default {type_name} for '{member}'")]
    DefaultConstruction {
        type_name: &'static str,
        member: String,
    },

    #[error("No serializer registered for {type_name} (member '{member}')")]
    MissingSerializer {
        type_name: &'static str,
        member: String,
    },

    #[error("Serializer for '{member}' failed: {reason}")]
    Serializer { member: String, reason: String },

    #[error("Cannot write '{path}': an intermediate key is not a section")]
    PathConflict { path: String },

    #[error("Failed to parse {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml_edit::TomlError,
    },

    #[error("Failed to read {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    ConfigError(#[from] confique::Error),

    #[error("The platform config directory needs an app name: call .app_name() on the builder")]
    AppNameRequired,

    #[error("Failed to register bundle {id} at {path} (version {version}): {source}")]
    Bundle {
        id: BundleId,
        path: PathBuf,
        version: Version,
        source: Box<BindError>,
    },
}

impl BindError {
    /// The innermost error, with bundle context stripped.
    pub fn root_cause(&self) -> &BindError {
        match self {
            BindError::Bundle { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// A value that could not be converted to its declared type.
///
/// Scalar failures are recovered by keeping the current value. Failures
/// inside a list or array ([`is_structural`](Self::is_structural)) are
/// escalated to [`BindError::StructuralMismatch`] by the binder.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoercionError {
    #[error("expected {expected}, found {found}")]
    Type {
        expected: &'static str,
        found: &'static str,
    },

    #[error("value {value} is out of range for {expected}")]
    Overflow {
        expected: &'static str,
        value: String,
    },

    #[error("cannot parse '{raw}' as {expected}")]
    Parse { expected: &'static str, raw: String },

    #[error("expected a sequence, found {found}")]
    NotSequence { found: &'static str },

    #[error("element {index}: {source}")]
    Element {
        index: usize,
        source: Box<CoercionError>,
    },
}

impl CoercionError {
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            CoercionError::NotSequence { .. } | CoercionError::Element { .. }
        )
    }
}
