use std::path::Path;

use confique::Config;
use serde::{Deserialize, Serialize};

use crate::error::BindError;
use crate::types::StaleKeyPolicy;

/// Registry settings in loadable form.
///
/// Values come from defaults, `BINDFIG_*` environment variables and an
/// optional TOML file, and are applied with
/// [`RegistryBuilder::apply_config`](crate::RegistryBuilder::apply_config).
#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    /// Consult the override chain while loading bundles.
    #[config(default = false, env = "BINDFIG_ENABLE_OVERRIDES")]
    pub enable_overrides: bool,

    /// Stamp the bundle version onto documents with no migration path.
    #[config(default = false, env = "BINDFIG_AUTO_UPGRADE")]
    pub auto_upgrade: bool,

    /// What to do with keys no member claims: remove, mark_unused or ignore.
    #[config(default = "mark_unused", env = "BINDFIG_STALE_KEYS")]
    pub stale_keys: StaleKeyPolicy,

    /// Rewrite read-only documents after a version upgrade.
    #[config(default = true, env = "BINDFIG_SAVE_READ_ONLY_ON_UPGRADE")]
    pub save_read_only_on_upgrade: bool,

    /// Root key holding the document version.
    #[config(default = "Version", env = "BINDFIG_VERSION_KEY")]
    pub version_key: String,

    /// Comment attached to unused keys.
    #[config(default = "Deprecated. No longer used", env = "BINDFIG_UNUSED_WARNING")]
    pub unused_warning: String,
}

impl RegistryConfig {
    /// Load from the environment and, if given, a TOML file.
    ///
    /// Environment variables take precedence over the file.
    pub fn load_from(path: Option<&Path>) -> Result<Self, BindError> {
        let mut builder = Self::builder().env();
        if let Some(path) = path {
            builder = builder.file(path);
        }
        Ok(builder.load()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_registry_defaults() {
        let config = RegistryConfig::builder().load().unwrap();
        assert!(!config.enable_overrides);
        assert!(!config.auto_upgrade);
        assert_eq!(config.stale_keys, StaleKeyPolicy::MarkUnused);
        assert!(config.save_read_only_on_upgrade);
        assert_eq!(config.version_key, "Version");
        assert_eq!(config.unused_warning, "Deprecated. No longer used");
    }

    #[test]
    fn file_values_replace_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bindfig.toml");
        fs::write(
            &path,
            "auto_upgrade = true\nstale_keys = \"remove\"\nversion_key = \"schema\"\n",
        )
        .unwrap();

        let config = RegistryConfig::builder().file(&path).load().unwrap();
        assert!(config.auto_upgrade);
        assert_eq!(config.stale_keys, StaleKeyPolicy::Remove);
        assert_eq!(config.version_key, "schema");
        assert!(config.save_read_only_on_upgrade);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let config = RegistryConfig::builder()
            .file(dir.path().join("absent.toml"))
            .load()
            .unwrap();
        assert_eq!(config.version_key, "Version");
    }

    #[test]
    fn invalid_policy_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bindfig.toml");
        fs::write(&path, "stale_keys = \"shred\"\n").unwrap();
        let err = RegistryConfig::load_from(Some(&path)).unwrap_err();
        assert!(matches!(err, BindError::ConfigError(_)));
    }
}
