//! Version migrations: upgrade a document step by step to a bundle's version.
//!
//! A [`MigrationChain`] maps a base version to the step that upgrades a
//! document *from* that version. [`MigrationChain::upgrade`] applies steps
//! until the document's version key equals the target:
//!
//! ```text
//! document == target  -> done
//! document  > target  -> DowngradeRejected
//! step for document   -> apply, require a strictly newer version, repeat
//! no step             -> auto-upgrade ? stamp target : MigrationMissing
//! ```
//!
//! Every step must strictly increase the version, so the loop terminates.

use std::collections::BTreeMap;
use std::fmt;

use toml::Value;
use tracing::{debug, warn};

use crate::bundle::BundleId;
use crate::document::Document;
use crate::error::BindError;
use crate::version::Version;

/// Transforms a document from one version to a newer one.
pub type MigrationStep =
    Box<dyn Fn(Document, BundleId) -> Result<Document, BindError> + Send + Sync>;

/// Inputs for one upgrade run.
#[derive(Debug, Clone, Copy)]
pub struct UpgradeRequest<'a> {
    pub target: Version,
    pub bundle: BundleId,
    pub version_key: &'a str,
    pub auto_upgrade: bool,
}

/// Result of [`MigrationChain::upgrade`].
#[derive(Debug)]
pub struct Upgraded {
    pub document: Document,
    /// Base versions of the steps applied, in order.
    pub applied: Vec<Version>,
    /// The target was stamped without a step because none was registered.
    pub auto_stamped: bool,
}

impl Upgraded {
    /// Whether the document's version changed.
    pub fn migrated(&self) -> bool {
        !self.applied.is_empty() || self.auto_stamped
    }
}

/// Migration steps for one bundle type, keyed by base version.
#[derive(Default)]
pub struct MigrationChain {
    bundle_type: &'static str,
    steps: BTreeMap<Version, MigrationStep>,
}

impl MigrationChain {
    pub fn new(bundle_type: &'static str) -> Self {
        Self {
            bundle_type,
            steps: BTreeMap::new(),
        }
    }

    pub fn bundle_type(&self) -> &'static str {
        self.bundle_type
    }

    /// Register the step upgrading documents at `base`.
    ///
    /// Fails with [`BindError::DuplicateMigration`] if `base` already has one.
    pub fn register<F>(&mut self, base: Version, step: F) -> Result<(), BindError>
    where
        F: Fn(Document, BundleId) -> Result<Document, BindError> + Send + Sync + 'static,
    {
        if self.steps.contains_key(&base) {
            return Err(BindError::DuplicateMigration {
                base,
                bundle_type: self.bundle_type,
            });
        }
        self.steps.insert(base, Box::new(step));
        Ok(())
    }

    pub fn contains(&self, base: Version) -> bool {
        self.steps.contains_key(&base)
    }

    /// Registered base versions, ascending.
    pub fn bases(&self) -> impl Iterator<Item = Version> + '_ {
        self.steps.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn upgrade(
        &self,
        mut document: Document,
        request: &UpgradeRequest<'_>,
    ) -> Result<Upgraded, BindError> {
        let mut applied = Vec::new();
        let mut current = document_version(&document, request.version_key)?;
        loop {
            if current == request.target {
                return Ok(Upgraded {
                    document,
                    applied,
                    auto_stamped: false,
                });
            }
            if current > request.target {
                return Err(BindError::DowngradeRejected {
                    document: current,
                    bundle: request.target,
                });
            }
            let Some(step) = self.steps.get(&current) else {
                if !request.auto_upgrade {
                    return Err(BindError::MigrationMissing {
                        base: current,
                        bundle_type: self.bundle_type,
                    });
                }
                warn!(
                    bundle = %request.bundle,
                    from = %current,
                    to = %request.target,
                    "no migration registered, accepting document without explicit migration"
                );
                document.set(request.version_key, Value::String(request.target.to_string()))?;
                return Ok(Upgraded {
                    document,
                    applied,
                    auto_stamped: true,
                });
            };

            document = step(document, request.bundle)?;
            let next = document_version(&document, request.version_key)?;
            if next <= current {
                return Err(BindError::NonMonotonicMigration {
                    from: current,
                    to: next,
                });
            }
            debug!(bundle = %request.bundle, from = %current, to = %next, "applied migration");
            applied.push(current);
            current = next;
        }
    }
}

impl fmt::Debug for MigrationChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationChain")
            .field("bundle_type", &self.bundle_type)
            .field("bases", &self.steps.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The version stored under `key`, which must be a `major.minor.patch` string.
pub fn document_version(document: &Document, key: &str) -> Result<Version, BindError> {
    let invalid = |found: String| BindError::InvalidVersion {
        key: key.to_string(),
        found,
    };
    match document.get(key) {
        Some(Value::String(raw)) => raw.parse().map_err(|_| invalid(format!("'{raw}'"))),
        Some(other) => Err(invalid(format!("a {}", crate::coerce::kind_of(&other)))),
        None => Err(invalid("nothing".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    const KEY: &str = "Version";

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    fn doc(content: &str) -> Document {
        Document::parse(content).unwrap()
    }

    fn request(target: &str, auto_upgrade: bool) -> UpgradeRequest<'static> {
        UpgradeRequest {
            target: v(target),
            bundle: BundleId::new(),
            version_key: KEY,
            auto_upgrade,
        }
    }

    fn bump(to: &'static str) -> impl Fn(Document, BundleId) -> Result<Document, BindError> {
        move |mut doc, _| {
            doc.set(KEY, Value::String(to.to_string()))?;
            Ok(doc)
        }
    }

    #[test]
    fn current_document_is_untouched() {
        let chain = MigrationChain::new("App");
        let out = chain
            .upgrade(doc("Version = \"1.0.0\"\n"), &request("1.0.0", false))
            .unwrap();
        assert!(!out.migrated());
        assert_eq!(out.document.to_string(), "Version = \"1.0.0\"\n");
    }

    #[test]
    fn steps_apply_in_sequence() {
        let mut chain = MigrationChain::new("App");
        chain.register(v("1.0.0"), bump("1.1.0")).unwrap();
        chain.register(v("1.1.0"), bump("2.0.0")).unwrap();

        let out = chain
            .upgrade(doc("Version = \"1.0.0\"\n"), &request("2.0.0", false))
            .unwrap();
        assert_eq!(out.applied, vec![v("1.0.0"), v("1.1.0")]);
        assert!(!out.auto_stamped);
        assert_eq!(document_version(&out.document, KEY).unwrap(), v("2.0.0"));
    }

    #[test]
    fn steps_receive_the_bundle_id() {
        let mut chain = MigrationChain::new("App");
        chain
            .register(v("1.0.0"), |mut doc, id| {
                doc.set("owner", Value::String(id.to_string()))?;
                doc.set(KEY, Value::String("1.0.1".into()))?;
                Ok(doc)
            })
            .unwrap();
        let req = request("1.0.1", false);
        let out = chain.upgrade(doc("Version = \"1.0.0\"\n"), &req).unwrap();
        assert_eq!(
            out.document.get("owner"),
            Some(Value::String(req.bundle.to_string()))
        );
    }

    #[test]
    fn downgrade_is_rejected() {
        let chain = MigrationChain::new("App");
        let err = chain
            .upgrade(doc("Version = \"2.0.0\"\n"), &request("1.0.0", true))
            .unwrap_err();
        assert!(matches!(err, BindError::DowngradeRejected { .. }));
    }

    #[test]
    fn missing_step_is_fatal_without_auto_upgrade() {
        let mut chain = MigrationChain::new("App");
        chain.register(v("1.0.0"), bump("1.1.0")).unwrap();
        let err = chain
            .upgrade(doc("Version = \"1.0.0\"\n"), &request("2.0.0", false))
            .unwrap_err();
        match err {
            BindError::MigrationMissing { base, bundle_type } => {
                assert_eq!(base, v("1.1.0"));
                assert_eq!(bundle_type, "App");
            }
            other => panic!("expected MigrationMissing, got {other:?}"),
        }
    }

    #[test]
    #[traced_test]
    fn auto_upgrade_stamps_target_and_warns() {
        let mut chain = MigrationChain::new("App");
        chain.register(v("1.0.0"), bump("1.1.0")).unwrap();
        let out = chain
            .upgrade(doc("Version = \"1.0.0\"\n"), &request("2.0.0", true))
            .unwrap();
        assert!(out.auto_stamped);
        assert_eq!(out.applied, vec![v("1.0.0")]);
        assert_eq!(document_version(&out.document, KEY).unwrap(), v("2.0.0"));
        assert!(logs_contain("without explicit migration"));
    }

    #[test]
    fn step_that_keeps_the_version_is_rejected() {
        let mut chain = MigrationChain::new("App");
        chain.register(v("1.0.0"), |doc, _| Ok(doc)).unwrap();
        let err = chain
            .upgrade(doc("Version = \"1.0.0\"\n"), &request("2.0.0", false))
            .unwrap_err();
        assert!(matches!(err, BindError::NonMonotonicMigration { .. }));
    }

    #[test]
    fn step_that_goes_backwards_is_rejected() {
        let mut chain = MigrationChain::new("App");
        chain.register(v("1.0.0"), bump("0.5.0")).unwrap();
        let err = chain
            .upgrade(doc("Version = \"1.0.0\"\n"), &request("2.0.0", false))
            .unwrap_err();
        match err {
            BindError::NonMonotonicMigration { from, to } => {
                assert_eq!(from, v("1.0.0"));
                assert_eq!(to, v("0.5.0"));
            }
            other => panic!("expected NonMonotonicMigration, got {other:?}"),
        }
    }

    #[test]
    fn step_that_drops_the_version_is_invalid() {
        let mut chain = MigrationChain::new("App");
        chain
            .register(v("1.0.0"), |mut doc, _| {
                doc.remove(KEY);
                Ok(doc)
            })
            .unwrap();
        let err = chain
            .upgrade(doc("Version = \"1.0.0\"\n"), &request("2.0.0", false))
            .unwrap_err();
        assert!(matches!(err, BindError::InvalidVersion { .. }));
    }

    #[test]
    fn step_overshooting_the_target_is_a_downgrade() {
        let mut chain = MigrationChain::new("App");
        chain.register(v("1.0.0"), bump("3.0.0")).unwrap();
        let err = chain
            .upgrade(doc("Version = \"1.0.0\"\n"), &request("2.0.0", false))
            .unwrap_err();
        assert!(matches!(err, BindError::DowngradeRejected { .. }));
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut chain = MigrationChain::new("App");
        chain.register(v("1.0.0"), bump("1.1.0")).unwrap();
        let err = chain.register(v("1.0.0"), bump("1.2.0")).unwrap_err();
        assert!(matches!(err, BindError::DuplicateMigration { .. }));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn step_errors_propagate() {
        let mut chain = MigrationChain::new("App");
        chain
            .register(v("1.0.0"), |_, _| {
                Err(BindError::PathConflict {
                    path: "a.b".into(),
                })
            })
            .unwrap();
        let err = chain
            .upgrade(doc("Version = \"1.0.0\"\n"), &request("2.0.0", false))
            .unwrap_err();
        assert!(matches!(err, BindError::PathConflict { .. }));
    }

    #[test]
    fn version_must_be_a_string() {
        let err = document_version(&doc("Version = 1\n"), KEY).unwrap_err();
        assert!(err.to_string().contains("integer"));
        let err = document_version(&doc("Version = \"1.0\"\n"), KEY).unwrap_err();
        assert!(matches!(err, BindError::InvalidVersion { .. }));
        assert!(document_version(&Document::new(), KEY).is_err());
    }

    #[test]
    fn bases_are_sorted() {
        let mut chain = MigrationChain::new("App");
        chain.register(v("1.2.0"), bump("1.3.0")).unwrap();
        chain.register(v("0.9.9"), bump("1.0.0")).unwrap();
        assert_eq!(chain.bases().collect::<Vec<_>>(), vec![v("0.9.9"), v("1.2.0")]);
        assert!(chain.contains(v("0.9.9")));
    }
}
