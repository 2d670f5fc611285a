//! Typed configuration bundles bound to comment-preserving TOML documents,
//! with version migrations and override layers.
//!
//! A bundle is a Rust struct that describes its members once, and a registry
//! keeps it synchronized with one file:
//!
//! ```ignore
//! struct AppSettings {
//!     meta: BundleMeta,
//!     name: String,
//!     server: Server,
//! }
//!
//! impl Section for AppSettings {
//!     fn declare(schema: &mut Schema<Self>) {
//!         schema.value("name", |s| &mut s.name).comment("Display name.");
//!         schema.section("server", |s| &mut s.server);
//!     }
//! }
//!
//! impl Bundle for AppSettings {
//!     fn meta(&self) -> &BundleMeta { &self.meta }
//!     fn meta_mut(&mut self) -> &mut BundleMeta { &mut self.meta }
//! }
//!
//! let registry = Registry::builder().app_name("myapp").build()?;
//! let id = registry.register(AppSettings::new(Version::new(1, 2, 0), "app.toml"))?;
//! ```
//!
//! Registration reads `app.toml` from the platform config directory,
//! upgrades it to version 1.2.0, binds every declared member, and writes the
//! file back when it is new or has gained stale keys.
//!
//! # Registration pipeline
//!
//! ```text
//! read document          missing file -> empty document
//!        |
//! stamp version          only when the version key is absent
//!        |
//! migrate                registered steps, or auto-upgrade stamp
//!        |
//! bind                   defaults -> document values -> overrides
//!        |
//! persist?               first registration, read-only upgrade, stale keys
//!        |
//! stale keys             remove / mark unused / ignore, when persisting
//! ```
//!
//! # Describing sections
//!
//! Rust has no runtime reflection, so every bindable type implements
//! [`Section`] and lists its members on a [`Schema`]. Each member is reached
//! through an accessor function and carries a document path, optional
//! comments and an override key:
//!
//! - **`value`**: scalars, `Vec` of scalars, fixed arrays and `Option`s of
//!   those. Conversion rules live in [`Leaf`] and [`Scalar`].
//! - **`section`** / **`optional_section`**: nested sections.
//! - **`shared`** / **`optional_shared`**: [`Shared`] sections, which may be
//!   reachable from several places or from themselves.
//! - **`section_list`**: a `Vec` of sections, stored as an array of tables.
//! - **`custom`** / **`optional_custom`** / **`serializable`**: opaque types
//!   converted by an [`ExternalSerializer`] or [`SelfSerializing`].
//!
//! [`describe`] returns the resulting [`MemberDescriptor`]s.
//!
//! # Binding rules
//!
//! - A value in the document always wins over the code default. Defaults are
//!   written only for paths the document lacks.
//! - Comments declared on members are written only where the document has
//!   none, so user comments are never replaced.
//! - A scalar that cannot be converted is logged and the current value is
//!   kept. A list or array whose elements do not match the declared type is
//!   a fatal [`BindError::StructuralMismatch`].
//! - Saving an unchanged bundle reproduces its file byte for byte.
//!
//! # Migrations
//!
//! Each bundle type has a [`MigrationChain`] keyed by the version a step
//! upgrades *from*. Steps receive the document and the bundle id and must
//! return a document with a strictly newer version. Register them in
//! [`Bundle::migrations`] or with [`Registry::register_migration`]:
//!
//! ```ignore
//! registry.register_migration::<AppSettings, _>(Version::new(1, 0, 0), |mut doc, _| {
//!     doc.rename("port", "server.port")?;
//!     doc.set("Version", "1.1.0".into())?;
//!     Ok(doc)
//! })?;
//! ```
//!
//! A document newer than its bundle is rejected. A gap in the chain is fatal
//! unless [`auto_upgrade`](RegistryBuilder::auto_upgrade) is on, in which
//! case the bundle version is stamped onto the document and binding fills in
//! the rest.
//!
//! # Overrides
//!
//! With [`enable_overrides`](RegistryBuilder::enable_overrides), each member
//! asks the [`OverrideChain`] for its override key (by default the
//! SCREAMING_SNAKE_CASE form of its name, see [`env_name`]). The first
//! provider to answer wins. An override that parses and differs from the
//! loaded value replaces it in memory only: the path is recorded in
//! [`BundleMeta::substituted`] and saves leave the document value alone.
//!
//! The default chain reads the process environment ([`EnvProvider`]).
//! [`Properties`] and plain closures are providers too.
//!
//! # Access modes
//!
//! [`AccessMode::Settings`] bundles are written by [`Registry::save`].
//! [`AccessMode::ReadOnly`] bundles are written when their file is first
//! created and, if
//! [`save_read_only_on_upgrade`](RegistryBuilder::save_read_only_on_upgrade)
//! is on, after a version upgrade. Explicit saves return `false`.
//!
//! # Configuration
//!
//! Registry settings are set on [`RegistryBuilder`] or loaded as a
//! [`RegistryConfig`] (defaults, `BINDFIG_*` environment variables and an
//! optional TOML file) and applied with
//! [`apply_config`](RegistryBuilder::apply_config).
//!
//! # Error handling
//!
//! Fatal conditions are [`BindError`]s. Registration failures are wrapped in
//! [`BindError::Bundle`] with the bundle's id, file and version;
//! [`BindError::root_cause`] unwraps them. Recoverable conversion failures
//! are [`CoercionError`]s and only surface as `tracing` warnings.

pub mod error;
pub mod types;

mod binder;
mod builder;
mod bundle;
mod coerce;
mod describe;
mod document;
mod env;
mod location;
mod migrate;
mod overrides;
mod registry;
mod resolve;
mod serializer;
mod settings;
mod version;

#[cfg(test)]
mod fixtures;

pub use binder::LoadReport;
pub use builder::{RegistryBuilder, Settings};
pub use bundle::{Bundle, BundleId, BundleMeta, Shared, shared};
pub use coerce::{Leaf, LeafShape, Scalar, kind_of};
pub use describe::{MemberBuilder, MemberDescriptor, MemberKind, Schema, Section, describe};
pub use document::Document;
pub use env::{EnvProvider, env_name};
pub use error::{BindError, CoercionError};
pub use location::{resolve_config_dir, resolve_location};
pub use migrate::{MigrationChain, MigrationStep, UpgradeRequest, Upgraded, document_version};
pub use overrides::{OverrideChain, OverrideProvider, Properties};
pub use registry::Registry;
pub use serializer::{
    ExternalSerializer, SelfSerializing, SerdeSerializer, SerializerError, SerializerTable,
};
pub use settings::RegistryConfig;
pub use types::{AccessMode, ConfigDir, StaleKeyPolicy};
pub use version::{Version, VersionParseError};
