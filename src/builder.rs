use std::path::PathBuf;

use crate::env::EnvProvider;
use crate::error::BindError;
use crate::location;
use crate::overrides::{OverrideChain, OverrideProvider};
use crate::registry::Registry;
use crate::serializer::{ExternalSerializer, SerializerTable};
use crate::settings::RegistryConfig;
use crate::types::{ConfigDir, StaleKeyPolicy};

/// Immutable registry settings, fixed when the registry is built.
#[derive(Debug, Clone)]
pub struct Settings {
    pub(crate) overrides_enabled: bool,
    pub(crate) overrides: OverrideChain,
    pub(crate) auto_upgrade: bool,
    pub(crate) stale_keys: StaleKeyPolicy,
    pub(crate) save_read_only_on_upgrade: bool,
    pub(crate) version_key: String,
    pub(crate) unused_warning: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            overrides_enabled: false,
            overrides: OverrideChain::new().with(EnvProvider::new()),
            auto_upgrade: false,
            stale_keys: StaleKeyPolicy::default(),
            save_read_only_on_upgrade: true,
            version_key: "Version".to_string(),
            unused_warning: "Deprecated. No longer used".to_string(),
        }
    }
}

impl Settings {
    pub fn overrides_enabled(&self) -> bool {
        self.overrides_enabled
    }

    pub fn overrides(&self) -> &OverrideChain {
        &self.overrides
    }

    pub fn auto_upgrade(&self) -> bool {
        self.auto_upgrade
    }

    pub fn stale_keys(&self) -> StaleKeyPolicy {
        self.stale_keys
    }

    pub fn save_read_only_on_upgrade(&self) -> bool {
        self.save_read_only_on_upgrade
    }

    pub fn version_key(&self) -> &str {
        &self.version_key
    }

    pub fn unused_warning(&self) -> &str {
        &self.unused_warning
    }
}

/// Builder for a [`Registry`].
///
/// Two groups of settings:
///
/// - **Location**: [`app_name()`](Self::app_name) and
///   [`config_dir()`](Self::config_dir) pick the directory relative bundle
///   locations resolve against.
/// - **Binding policy**: overrides, auto-upgrade, stale keys, read-only
///   saves and the version key. See [`Settings`] for the defaults.
pub struct RegistryBuilder {
    app_name: Option<String>,
    config_dir: Option<ConfigDir>,
    settings: Settings,
    serializers: SerializerTable,
}

impl RegistryBuilder {
    pub(crate) fn new() -> Self {
        Self {
            app_name: None,
            config_dir: None,
            settings: Settings::default(),
            serializers: SerializerTable::new(),
        }
    }

    /// Set the application name. Without an explicit
    /// [`config_dir`](Self::config_dir) this selects the platform config
    /// directory for the app.
    pub fn app_name(mut self, name: &str) -> Self {
        self.app_name = Some(name.to_string());
        self
    }

    /// Directory that relative bundle locations resolve against.
    ///
    /// Without one (and without an app name) relative locations are used as
    /// given, i.e. relative to the working directory.
    pub fn config_dir(mut self, dir: ConfigDir) -> Self {
        self.config_dir = Some(dir);
        self
    }

    /// Consult the override chain while loading (default: `false`).
    pub fn enable_overrides(mut self, enabled: bool) -> Self {
        self.settings.overrides_enabled = enabled;
        self
    }

    /// Replace the override chain (default: process environment only).
    pub fn override_chain(mut self, chain: OverrideChain) -> Self {
        self.settings.overrides = chain;
        self
    }

    /// Append a provider to the override chain.
    pub fn override_provider(mut self, provider: impl OverrideProvider + 'static) -> Self {
        self.settings.overrides.push(provider);
        self
    }

    /// Accept documents with no migration path by stamping the bundle
    /// version onto them (default: `false`).
    pub fn auto_upgrade(mut self, enabled: bool) -> Self {
        self.settings.auto_upgrade = enabled;
        self
    }

    pub fn stale_keys(mut self, policy: StaleKeyPolicy) -> Self {
        self.settings.stale_keys = policy;
        self
    }

    /// Rewrite read-only documents after a version upgrade (default: `true`).
    pub fn save_read_only_on_upgrade(mut self, enabled: bool) -> Self {
        self.settings.save_read_only_on_upgrade = enabled;
        self
    }

    /// Root key holding the document version (default: `"Version"`).
    pub fn version_key(mut self, key: &str) -> Self {
        self.settings.version_key = key.to_string();
        self
    }

    /// Comment attached to unused keys (default: `"Deprecated. No longer used"`).
    pub fn unused_warning(mut self, text: &str) -> Self {
        self.settings.unused_warning = text.to_string();
        self
    }

    /// Register the serializer used for `custom` members of type `T`.
    pub fn serializer<T: 'static>(mut self, serializer: impl ExternalSerializer<T>) -> Self {
        self.serializers.insert::<T>(serializer);
        self
    }

    /// Apply every policy value from a loaded [`RegistryConfig`].
    pub fn apply_config(mut self, config: &RegistryConfig) -> Self {
        self.settings.overrides_enabled = config.enable_overrides;
        self.settings.auto_upgrade = config.auto_upgrade;
        self.settings.stale_keys = config.stale_keys;
        self.settings.save_read_only_on_upgrade = config.save_read_only_on_upgrade;
        self.settings.version_key = config.version_key.clone();
        self.settings.unused_warning = config.unused_warning.clone();
        self
    }

    /// Resolve the effective base directory for relative locations.
    fn effective_base_dir(&self) -> Result<Option<PathBuf>, BindError> {
        let app_name = self.app_name.as_deref();
        match (&self.config_dir, app_name) {
            (Some(dir), _) => location::resolve_config_dir(dir, app_name),
            (None, Some(_)) => location::resolve_config_dir(&ConfigDir::Platform, app_name),
            (None, None) => Ok(None),
        }
    }

    pub fn build(self) -> Result<Registry, BindError> {
        let base_dir = self.effective_base_dir()?;
        Ok(Registry::new(self.settings, base_dir, self.serializers))
    }
}
