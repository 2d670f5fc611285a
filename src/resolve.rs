//! Registration pipeline: reconcile a bundle with its pre-loaded document.
//!
//! Operates on a document already read from disk (or `None` for a missing
//! file) with no I/O, so the whole pipeline is testable with in-memory
//! inputs. Steps:
//!
//! 1. Stamp the bundle version onto a document without a version key
//! 2. Upgrade the document through the bundle type's migration chain
//! 3. Bind the bundle to the upgraded document
//! 4. Record substituted paths on the bundle
//! 5. Decide whether the document must be written back
//! 6. Apply the stale-key policy, only to documents that will be written

use toml::Value;

use crate::binder::{Binder, LoadReport};
use crate::builder::Settings;
use crate::bundle::Bundle;
use crate::document::Document;
use crate::error::BindError;
use crate::migrate::{MigrationChain, UpgradeRequest};

/// Result of reconciling one bundle.
#[derive(Debug)]
pub(crate) struct Reconciled {
    pub document: Document,
    /// The document had no version key, i.e. this is its first registration.
    pub initial: bool,
    /// The version changed, by migration steps or an auto-upgrade stamp.
    pub migrated: bool,
    pub report: LoadReport,
    pub persist: bool,
}

/// Reconcile `bundle` with `document`.
///
/// The document is persisted when it is new, when a read-only bundle was
/// upgraded and read-only saves on upgrade are enabled, or when a writable
/// bundle's document still has unused keys.
pub(crate) fn reconcile<B: Bundle>(
    binder: &Binder<'_>,
    settings: &Settings,
    chain: &MigrationChain,
    bundle: &mut B,
    identity: Option<usize>,
    document: Option<Document>,
) -> Result<Reconciled, BindError> {
    let version = bundle.meta().version();
    let version_key = settings.version_key();

    // 1: First registration gets the bundle's own version
    let mut document = document.unwrap_or_default();
    let initial = !document.contains(version_key);
    if initial {
        document.set(version_key, Value::String(version.to_string()))?;
    }

    // 2: Migrate
    let upgraded = chain.upgrade(
        document,
        &UpgradeRequest {
            target: version,
            bundle: bundle.meta().id(),
            version_key,
            auto_upgrade: settings.auto_upgrade(),
        },
    )?;
    let migrated = upgraded.migrated();
    let mut document = upgraded.document;

    // 3-4: Bind and remember overrides
    let report = binder.load(bundle, identity, &mut document)?;
    bundle.meta_mut().set_substituted(report.substituted.clone());

    // 5: Persistence decision
    let read_only = bundle.meta().is_read_only();
    let persist = initial
        || (read_only && migrated && settings.save_read_only_on_upgrade())
        || (!read_only && !report.unused.is_empty());

    // 6: Stale keys are only touched in documents headed for disk
    if persist {
        binder.sweep(&mut document, &report.unused);
    }

    Ok(Reconciled {
        document,
        initial,
        migrated,
        report,
        persist,
    })
}
