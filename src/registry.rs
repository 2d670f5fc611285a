use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::binder::{Binder, LoadReport};
use crate::builder::{RegistryBuilder, Settings};
use crate::bundle::{Bundle, BundleId, Shared, shared};
use crate::describe::{MemberDescriptor, SchemaCache, Section, shared_identity, short_type_name};
use crate::document::Document;
use crate::error::BindError;
use crate::location;
use crate::migrate::MigrationChain;
use crate::resolve;
use crate::serializer::SerializerTable;
use crate::version::Version;

/// Owns registered bundles and their backing documents.
///
/// Built with [`Registry::builder`]. Settings are fixed at build time; the
/// registry itself is `Send + Sync` and meant to be passed by reference.
pub struct Registry {
    settings: Settings,
    base_dir: Option<PathBuf>,
    schemas: SchemaCache,
    serializers: SerializerTable,
    chains: RwLock<HashMap<TypeId, MigrationChain>>,
    bundles: RwLock<HashMap<BundleId, Arc<dyn Registered>>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub(crate) fn new(
        settings: Settings,
        base_dir: Option<PathBuf>,
        serializers: SerializerTable,
    ) -> Self {
        Self {
            settings,
            base_dir,
            schemas: SchemaCache::default(),
            serializers,
            chains: RwLock::new(HashMap::new()),
            bundles: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Directory relative bundle locations resolve against, if any.
    pub fn base_dir(&self) -> Option<&std::path::Path> {
        self.base_dir.as_deref()
    }

    fn binder(&self) -> Binder<'_> {
        Binder::new(&self.settings, &self.schemas, &self.serializers)
    }

    /// Register a migration step for bundles of type `B`.
    ///
    /// Fails with [`BindError::DuplicateMigration`] if `base` already has a
    /// step, including one added by [`Bundle::migrations`].
    pub fn register_migration<B, F>(&self, base: Version, step: F) -> Result<(), BindError>
    where
        B: Bundle,
        F: Fn(Document, BundleId) -> Result<Document, BindError> + Send + Sync + 'static,
    {
        self.ensure_chain::<B>()?;
        let mut chains = self.chains.write();
        chains
            .entry(TypeId::of::<B>())
            .or_insert_with(|| MigrationChain::new(short_type_name::<B>()))
            .register(base, step)
    }

    /// Create the chain for `B` on first use, seeded by [`Bundle::migrations`].
    fn ensure_chain<B: Bundle>(&self) -> Result<(), BindError> {
        let key = TypeId::of::<B>();
        if self.chains.read().contains_key(&key) {
            return Ok(());
        }
        let mut chains = self.chains.write();
        if chains.contains_key(&key) {
            return Ok(());
        }
        let mut chain = MigrationChain::new(short_type_name::<B>());
        B::migrations(&mut chain)?;
        chains.insert(key, chain);
        Ok(())
    }

    /// Register `bundle`, reconciling it with its document.
    pub fn register<B: Bundle>(&self, bundle: B) -> Result<BundleId, BindError> {
        self.register_shared(shared(bundle))
    }

    /// Register a bundle the caller keeps a handle to.
    ///
    /// Loads (or creates) the document, migrates it to the bundle's version,
    /// binds the bundle and writes the document when needed. Failures carry
    /// the bundle's id, location and version.
    pub fn register_shared<B: Bundle>(&self, bundle: Shared<B>) -> Result<BundleId, BindError> {
        let identity = shared_identity(&bundle);
        let (id, document) = {
            let mut guard = bundle.lock();
            let location = location::resolve_location(self.base_dir(), guard.meta().location());
            guard.meta_mut().set_location(location.clone());
            let id = guard.meta().id();
            let version = guard.meta().version();
            let context = |source: BindError| BindError::Bundle {
                id,
                path: location.clone(),
                version,
                source: Box::new(source),
            };

            self.ensure_chain::<B>().map_err(context)?;
            let loaded = Document::load(&location).map_err(context)?;
            let reconciled = {
                let chains = self.chains.read();
                let fallback = MigrationChain::new(short_type_name::<B>());
                let chain = chains.get(&TypeId::of::<B>()).unwrap_or(&fallback);
                resolve::reconcile(
                    &self.binder(),
                    &self.settings,
                    chain,
                    &mut *guard,
                    Some(identity),
                    loaded,
                )
                .map_err(context)?
            };
            if reconciled.persist {
                reconciled.document.save(&location).map_err(context)?;
            }
            debug!(
                bundle = %id,
                path = %location.display(),
                initial = reconciled.initial,
                migrated = reconciled.migrated,
                persisted = reconciled.persist,
                unused = reconciled.report.unused.len(),
                "registered bundle"
            );
            (id, reconciled.document)
        };

        self.bundles.write().insert(
            id,
            Arc::new(Entry {
                bundle,
                document: Mutex::new(document),
            }),
        );
        Ok(id)
    }

    /// Write the in-memory values of bundle `id` to its document.
    ///
    /// Returns `false` without writing for unknown ids and read-only bundles.
    pub fn save(&self, id: BundleId) -> Result<bool, BindError> {
        let entry = self.bundles.read().get(&id).cloned();
        match entry {
            Some(entry) => entry.save(&self.binder()),
            None => Ok(false),
        }
    }

    pub fn save_bundle<B: Bundle>(&self, bundle: &Shared<B>) -> Result<bool, BindError> {
        let id = bundle.lock().meta().id();
        self.save(id)
    }

    /// Save every registered bundle, returning how many were written.
    pub fn save_all(&self) -> Result<usize, BindError> {
        let entries: Vec<_> = self.bundles.read().values().cloned().collect();
        let binder = self.binder();
        let mut saved = 0;
        for entry in entries {
            if entry.save(&binder)? {
                saved += 1;
            }
        }
        Ok(saved)
    }

    /// The registered bundle `id`, if it is a `B`.
    pub fn instance<B: Bundle>(&self, id: BundleId) -> Option<Shared<B>> {
        self.bundles
            .read()
            .get(&id)?
            .as_any()
            .downcast_ref::<Entry<B>>()
            .map(|entry| Arc::clone(&entry.bundle))
    }

    /// Forget bundle `id`. Its document on disk is left as is.
    pub fn unregister(&self, id: BundleId) -> bool {
        self.bundles.write().remove(&id).is_some()
    }

    pub fn ids(&self) -> Vec<BundleId> {
        let mut ids: Vec<_> = self.bundles.read().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn contains(&self, id: BundleId) -> bool {
        self.bundles.read().contains_key(&id)
    }

    /// A snapshot of the document backing bundle `id`.
    pub fn document(&self, id: BundleId) -> Option<Document> {
        let entry = self.bundles.read().get(&id).cloned()?;
        Some(entry.document())
    }

    /// Member descriptors of `S`, from the registry's schema cache.
    pub fn describe<S: Section>(&self) -> Vec<MemberDescriptor> {
        self.schemas.get::<S>().descriptors()
    }

    /// Bind `instance` to an in-memory document with the registry's
    /// settings, applying the stale-key policy to the document.
    pub fn bind<S: Section>(
        &self,
        instance: &mut S,
        document: &mut Document,
    ) -> Result<LoadReport, BindError> {
        let binder = self.binder();
        let report = binder.load(instance, None, document)?;
        binder.sweep(document, &report.unused);
        Ok(report)
    }

    /// Write `instance` into an in-memory document.
    pub fn write<S: Section>(
        &self,
        instance: &mut S,
        document: &mut Document,
    ) -> Result<(), BindError> {
        self.binder().save(instance, None, document, &BTreeSet::new())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("settings", &self.settings)
            .field("base_dir", &self.base_dir)
            .field("bundles", &self.ids())
            .finish_non_exhaustive()
    }
}

trait Registered: Send + Sync {
    fn save(&self, binder: &Binder<'_>) -> Result<bool, BindError>;
    fn document(&self) -> Document;
    fn as_any(&self) -> &dyn Any;
}

struct Entry<B> {
    bundle: Shared<B>,
    document: Mutex<Document>,
}

impl<B: Bundle> Registered for Entry<B> {
    fn save(&self, binder: &Binder<'_>) -> Result<bool, BindError> {
        let mut bundle = self.bundle.lock();
        if bundle.meta().is_read_only() {
            return Ok(false);
        }
        let substituted = bundle.meta().substituted().clone();
        let location = bundle.meta().location().to_path_buf();
        let mut document = self.document.lock();
        let identity = Some(shared_identity(&self.bundle));
        binder.save(&mut *bundle, identity, &mut document, &substituted)?;
        document.save(&location)?;
        debug!(bundle = %bundle.meta().id(), path = %location.display(), "saved bundle");
        Ok(true)
    }

    fn document(&self) -> Document {
        self.document.lock().clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
