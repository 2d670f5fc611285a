//! Type descriptors: the bindable shape of a configuration type.
//!
//! A configuration type implements [`Section`] and lists its members in
//! [`Section::declare`]. Each member is bound through a plain accessor
//! function, so the binder reaches fields without runtime reflection:
//!
//! ```ignore
//! impl Section for Server {
//!     fn declare(schema: &mut Schema<Self>) {
//!         schema.value("host", |s| &mut s.host).comment("Address to bind.");
//!         schema.value("poolSize", |s| &mut s.pool_size).env("DB_POOL");
//!         schema.section("tls", |s| &mut s.tls);
//!     }
//! }
//! ```
//!
//! Declaration order is binding order. The document path defaults to the
//! member name and the environment name to its SCREAMING_SNAKE_CASE form
//! (see [`env_name`](crate::env_name)).
//!
//! Schemas are deterministic, so the registry builds each one once and
//! shares it across bundles ([`SchemaCache`]).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use toml::{Table, Value};

use crate::binder::DynSection;
use crate::bundle::Shared;
use crate::coerce::{Leaf, LeafShape};
use crate::env::env_name;
use crate::error::{BindError, CoercionError};
use crate::serializer::{ExternalSerializer, SelfCodec, SelfSerializing, SerializerTable};

/// A type whose members bind to a document section.
pub trait Section: Sized + Send + 'static {
    fn declare(schema: &mut Schema<Self>);
}

/// How a member is bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberKind {
    /// A scalar, list or fixed array converted by the coercer.
    Value(LeafShape),
    /// A nested section, recursed into.
    Section {
        type_name: &'static str,
        optional: bool,
        shared: bool,
    },
    /// A list of sections, one document table per element.
    SectionList { element: &'static str },
    /// A type converted by a serializer registered with the registry.
    Custom { type_name: &'static str },
    /// A type implementing [`SelfSerializing`].
    Serializable { type_name: &'static str },
}

/// Static metadata for one member.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberDescriptor {
    pub name: &'static str,
    pub path: String,
    pub comments: Vec<String>,
    pub env: String,
    pub ignored: bool,
    pub kind: MemberKind,
}

impl MemberDescriptor {
    /// Element type of list and array members.
    pub fn element_type(&self) -> Option<&'static str> {
        match &self.kind {
            MemberKind::Value(shape) if shape.is_sequence() => Some(shape.element()),
            MemberKind::SectionList { element } => Some(element),
            _ => None,
        }
    }
}

/// Chained modifiers for the member just declared.
pub struct MemberBuilder<'a> {
    descriptor: &'a mut MemberDescriptor,
}

impl MemberBuilder<'_> {
    /// Bind to `path` (relative to the owning section) instead of the member name.
    pub fn path(self, path: &str) -> Self {
        self.descriptor.path = path.to_string();
        self
    }

    /// Add a comment line, written above the key when the document has none.
    pub fn comment(self, line: &str) -> Self {
        self.descriptor.comments.push(line.to_string());
        self
    }

    /// Use `name` as the override key instead of the derived one.
    pub fn env(self, name: &str) -> Self {
        self.descriptor.env = name.to_string();
        self
    }

    /// Exclude the member from binding.
    pub fn ignore(self) -> Self {
        self.descriptor.ignored = true;
        self
    }
}

pub(crate) enum Binding<S> {
    Leaf(Box<dyn LeafAccess<S>>),
    Section(Box<dyn SectionAccess<S>>),
    SectionList(Box<dyn SectionListAccess<S>>),
    Opaque(Box<dyn OpaqueAccess<S>>),
}

pub(crate) struct Member<S> {
    pub descriptor: MemberDescriptor,
    pub binding: Binding<S>,
}

/// The declared members of `S`, in order.
pub struct Schema<S> {
    members: Vec<Member<S>>,
}

impl<S: Section> Schema<S> {
    pub(crate) fn build() -> Self {
        let mut schema = Schema {
            members: Vec::new(),
        };
        S::declare(&mut schema);
        schema
    }

    pub(crate) fn members(&self) -> &[Member<S>] {
        &self.members
    }

    /// Descriptors of the members that take part in binding.
    pub fn descriptors(&self) -> Vec<MemberDescriptor> {
        self.members
            .iter()
            .filter(|m| !m.descriptor.ignored)
            .map(|m| m.descriptor.clone())
            .collect()
    }

    fn push(
        &mut self,
        name: &'static str,
        kind: MemberKind,
        binding: Binding<S>,
    ) -> MemberBuilder<'_> {
        let slot = self.members.len();
        self.members.push(Member {
            descriptor: MemberDescriptor {
                name,
                path: name.to_string(),
                comments: Vec::new(),
                env: env_name(name),
                ignored: false,
                kind,
            },
            binding,
        });
        MemberBuilder {
            descriptor: &mut self.members[slot].descriptor,
        }
    }

    /// A scalar, list of scalars, fixed array of scalars, or `Option` of one.
    pub fn value<T: Leaf>(
        &mut self,
        name: &'static str,
        access: fn(&mut S) -> &mut T,
    ) -> MemberBuilder<'_> {
        self.push(
            name,
            MemberKind::Value(T::shape()),
            Binding::Leaf(Box::new(LeafSlot { access })),
        )
    }

    pub fn section<T: Section>(
        &mut self,
        name: &'static str,
        access: fn(&mut S) -> &mut T,
    ) -> MemberBuilder<'_> {
        self.push(
            name,
            section_kind::<T>(false, false),
            Binding::Section(Box::new(NestedSlot { access })),
        )
    }

    /// A nested section created with `T::default()` when absent.
    pub fn optional_section<T: Section + Default>(
        &mut self,
        name: &'static str,
        access: fn(&mut S) -> &mut Option<T>,
    ) -> MemberBuilder<'_> {
        self.push(
            name,
            section_kind::<T>(true, false),
            Binding::Section(Box::new(OptionalNestedSlot { access })),
        )
    }

    /// A section that may be shared with other members, or with itself.
    pub fn shared<T: Section>(
        &mut self,
        name: &'static str,
        access: fn(&mut S) -> &mut Shared<T>,
    ) -> MemberBuilder<'_> {
        self.push(
            name,
            section_kind::<T>(false, true),
            Binding::Section(Box::new(SharedSlot { access })),
        )
    }

    pub fn optional_shared<T: Section + Default>(
        &mut self,
        name: &'static str,
        access: fn(&mut S) -> &mut Option<Shared<T>>,
    ) -> MemberBuilder<'_> {
        self.push(
            name,
            section_kind::<T>(true, true),
            Binding::Section(Box::new(OptionalSharedSlot { access })),
        )
    }

    /// A list of sections; each element binds a fresh `T::default()`.
    pub fn section_list<T: Section + Default>(
        &mut self,
        name: &'static str,
        access: fn(&mut S) -> &mut Vec<T>,
    ) -> MemberBuilder<'_> {
        self.push(
            name,
            MemberKind::SectionList {
                element: short_type_name::<T>(),
            },
            Binding::SectionList(Box::new(ListSlot { access })),
        )
    }

    /// A type converted by the serializer registered for it.
    pub fn custom<T: Send + 'static>(
        &mut self,
        name: &'static str,
        access: fn(&mut S) -> &mut T,
    ) -> MemberBuilder<'_> {
        self.push(
            name,
            MemberKind::Custom {
                type_name: short_type_name::<T>(),
            },
            Binding::Opaque(Box::new(OpaqueSlot {
                access,
                codec: Codec::Registered,
            })),
        )
    }

    /// Like [`custom`](Self::custom); an absent value is created by the
    /// serializer's default instance.
    pub fn optional_custom<T: Send + 'static>(
        &mut self,
        name: &'static str,
        access: fn(&mut S) -> &mut Option<T>,
    ) -> MemberBuilder<'_> {
        self.push(
            name,
            MemberKind::Custom {
                type_name: short_type_name::<T>(),
            },
            Binding::Opaque(Box::new(OptionalOpaqueSlot {
                access,
                codec: Codec::Registered,
            })),
        )
    }

    pub fn serializable<T: SelfSerializing>(
        &mut self,
        name: &'static str,
        access: fn(&mut S) -> &mut T,
    ) -> MemberBuilder<'_> {
        self.push(
            name,
            MemberKind::Serializable {
                type_name: short_type_name::<T>(),
            },
            Binding::Opaque(Box::new(OpaqueSlot {
                access,
                codec: Codec::Fixed(Arc::new(SelfCodec::<T>::new())),
            })),
        )
    }
}

/// The ordered, non-ignored member descriptors of `S`.
pub fn describe<S: Section>() -> Vec<MemberDescriptor> {
    Schema::<S>::build().descriptors()
}

fn section_kind<T>(optional: bool, shared: bool) -> MemberKind {
    MemberKind::Section {
        type_name: short_type_name::<T>(),
        optional,
        shared,
    }
}

/// `std::any::type_name` without the module path.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    if full.contains('<') {
        return full;
    }
    full.rsplit("::").next().unwrap_or(full)
}

/// Compute-once cache of schemas, keyed by type.
#[derive(Default)]
pub(crate) struct SchemaCache {
    schemas: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl SchemaCache {
    pub fn get<S: Section>(&self) -> Arc<Schema<S>> {
        let key = TypeId::of::<S>();
        let cached = self.schemas.read().get(&key).cloned();
        if let Some(found) = cached.and_then(|s| s.downcast::<Schema<S>>().ok()) {
            return found;
        }
        let entry = self
            .schemas
            .write()
            .entry(key)
            .or_insert_with(|| Arc::new(Schema::<S>::build()))
            .clone();
        entry
            .downcast::<Schema<S>>()
            .unwrap_or_else(|_| Arc::new(Schema::build()))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.schemas.read().len()
    }
}

// -- Member access -------------------------------------------------------------

pub(crate) type Visit<'v> = dyn FnMut(&mut dyn DynSection) -> Result<(), BindError> + 'v;

pub(crate) trait LeafAccess<S>: Send + Sync {
    fn shape(&self) -> LeafShape;
    fn is_absent(&self, owner: &mut S) -> bool;
    fn fill_default(&self, owner: &mut S);
    fn value(&self, owner: &mut S) -> Option<Value>;
    fn load(&self, owner: &mut S, node: &Value) -> Result<(), CoercionError>;
    /// Returns whether the value changed.
    fn apply_override(&self, owner: &mut S, raw: &str) -> Result<bool, CoercionError>;
}

pub(crate) trait SectionAccess<S>: Send + Sync {
    fn target(&self) -> TypeId;
    fn is_absent(&self, owner: &mut S) -> bool;
    fn fill_default(&self, owner: &mut S);
    /// Address of a shared section's allocation; `None` for owned sections.
    fn identity(&self, owner: &mut S) -> Option<usize>;
    fn enter(&self, owner: &mut S, visit: &mut Visit<'_>) -> Result<(), BindError>;
}

pub(crate) trait SectionListAccess<S>: Send + Sync {
    fn element(&self) -> &'static str;
    /// Replace the list with `count` fresh elements, each passed to `visit`.
    fn rebuild(
        &self,
        owner: &mut S,
        count: usize,
        visit: &mut dyn FnMut(usize, &mut dyn DynSection) -> Result<(), BindError>,
    ) -> Result<(), BindError>;
    fn each(&self, owner: &mut S, visit: &mut Visit<'_>) -> Result<(), BindError>;
}

pub(crate) trait OpaqueAccess<S>: Send + Sync {
    fn read(
        &self,
        owner: &mut S,
        section: &Table,
        serializers: &SerializerTable,
        path: &str,
    ) -> Result<(), BindError>;
    /// Give an absent value an instance, or fail.
    fn ensure_present(
        &self,
        owner: &mut S,
        serializers: &SerializerTable,
        path: &str,
    ) -> Result<(), BindError>;
    fn write(
        &self,
        owner: &mut S,
        serializers: &SerializerTable,
        path: &str,
    ) -> Result<Option<Table>, BindError>;
}

pub(crate) fn shared_identity<T>(shared: &Shared<T>) -> usize {
    Arc::as_ptr(shared) as *const () as usize
}

struct LeafSlot<S, T> {
    access: fn(&mut S) -> &mut T,
}

impl<S: 'static, T: Leaf> LeafAccess<S> for LeafSlot<S, T> {
    fn shape(&self) -> LeafShape {
        T::shape()
    }

    fn is_absent(&self, owner: &mut S) -> bool {
        (self.access)(owner).is_absent()
    }

    fn fill_default(&self, owner: &mut S) {
        (self.access)(owner).fill_default();
    }

    fn value(&self, owner: &mut S) -> Option<Value> {
        (self.access)(owner).to_value()
    }

    fn load(&self, owner: &mut S, node: &Value) -> Result<(), CoercionError> {
        *(self.access)(owner) = T::from_value(node)?;
        Ok(())
    }

    fn apply_override(&self, owner: &mut S, raw: &str) -> Result<bool, CoercionError> {
        let parsed = T::parse_override(raw)?;
        let slot = (self.access)(owner);
        if *slot == parsed {
            return Ok(false);
        }
        *slot = parsed;
        Ok(true)
    }
}

struct NestedSlot<S, T> {
    access: fn(&mut S) -> &mut T,
}

impl<S: 'static, T: Section> SectionAccess<S> for NestedSlot<S, T> {
    fn target(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn is_absent(&self, _owner: &mut S) -> bool {
        false
    }

    fn fill_default(&self, _owner: &mut S) {}

    fn identity(&self, _owner: &mut S) -> Option<usize> {
        None
    }

    fn enter(&self, owner: &mut S, visit: &mut Visit<'_>) -> Result<(), BindError> {
        visit((self.access)(owner))
    }
}

struct OptionalNestedSlot<S, T> {
    access: fn(&mut S) -> &mut Option<T>,
}

impl<S: 'static, T: Section + Default> SectionAccess<S> for OptionalNestedSlot<S, T> {
    fn target(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn is_absent(&self, owner: &mut S) -> bool {
        (self.access)(owner).is_none()
    }

    fn fill_default(&self, owner: &mut S) {
        (self.access)(owner).get_or_insert_with(T::default);
    }

    fn identity(&self, _owner: &mut S) -> Option<usize> {
        None
    }

    fn enter(&self, owner: &mut S, visit: &mut Visit<'_>) -> Result<(), BindError> {
        match (self.access)(owner) {
            Some(section) => visit(section),
            None => Ok(()),
        }
    }
}

struct SharedSlot<S, T> {
    access: fn(&mut S) -> &mut Shared<T>,
}

impl<S: 'static, T: Section> SectionAccess<S> for SharedSlot<S, T> {
    fn target(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn is_absent(&self, _owner: &mut S) -> bool {
        false
    }

    fn fill_default(&self, _owner: &mut S) {}

    fn identity(&self, owner: &mut S) -> Option<usize> {
        Some(shared_identity((self.access)(owner)))
    }

    fn enter(&self, owner: &mut S, visit: &mut Visit<'_>) -> Result<(), BindError> {
        let shared = Arc::clone((self.access)(owner));
        let mut guard = shared.lock();
        visit(&mut *guard)
    }
}

struct OptionalSharedSlot<S, T> {
    access: fn(&mut S) -> &mut Option<Shared<T>>,
}

impl<S: 'static, T: Section + Default> SectionAccess<S> for OptionalSharedSlot<S, T> {
    fn target(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn is_absent(&self, owner: &mut S) -> bool {
        (self.access)(owner).is_none()
    }

    fn fill_default(&self, owner: &mut S) {
        (self.access)(owner).get_or_insert_with(|| Arc::new(Mutex::new(T::default())));
    }

    fn identity(&self, owner: &mut S) -> Option<usize> {
        (self.access)(owner).as_ref().map(shared_identity)
    }

    fn enter(&self, owner: &mut S, visit: &mut Visit<'_>) -> Result<(), BindError> {
        let Some(shared) = (self.access)(owner).as_ref().map(Arc::clone) else {
            return Ok(());
        };
        let mut guard = shared.lock();
        visit(&mut *guard)
    }
}

struct ListSlot<S, T> {
    access: fn(&mut S) -> &mut Vec<T>,
}

impl<S: 'static, T: Section + Default> SectionListAccess<S> for ListSlot<S, T> {
    fn element(&self) -> &'static str {
        short_type_name::<T>()
    }

    fn rebuild(
        &self,
        owner: &mut S,
        count: usize,
        visit: &mut dyn FnMut(usize, &mut dyn DynSection) -> Result<(), BindError>,
    ) -> Result<(), BindError> {
        let mut elements = Vec::with_capacity(count);
        for index in 0..count {
            let mut element = T::default();
            visit(index, &mut element)?;
            elements.push(element);
        }
        *(self.access)(owner) = elements;
        Ok(())
    }

    fn each(&self, owner: &mut S, visit: &mut Visit<'_>) -> Result<(), BindError> {
        (self.access)(owner)
            .iter_mut()
            .try_for_each(|element| visit(element))
    }
}

enum Codec<T> {
    Registered,
    Fixed(Arc<dyn ExternalSerializer<T>>),
}

impl<T: 'static> Codec<T> {
    fn resolve(
        &self,
        serializers: &SerializerTable,
        path: &str,
    ) -> Result<Arc<dyn ExternalSerializer<T>>, BindError> {
        match self {
            Codec::Fixed(codec) => Ok(Arc::clone(codec)),
            Codec::Registered => serializers
                .get::<T>()
                .ok_or_else(|| BindError::MissingSerializer {
                    type_name: short_type_name::<T>(),
                    member: path.to_string(),
                }),
        }
    }
}

fn serializer_failure(path: &str) -> impl Fn(crate::serializer::SerializerError) -> BindError + '_ {
    move |e| BindError::Serializer {
        member: path.to_string(),
        reason: e.to_string(),
    }
}

struct OpaqueSlot<S, T> {
    access: fn(&mut S) -> &mut T,
    codec: Codec<T>,
}

impl<S: 'static, T: Send + 'static> OpaqueAccess<S> for OpaqueSlot<S, T> {
    fn read(
        &self,
        owner: &mut S,
        section: &Table,
        serializers: &SerializerTable,
        path: &str,
    ) -> Result<(), BindError> {
        let codec = self.codec.resolve(serializers, path)?;
        *(self.access)(owner) = codec.deserialize(section).map_err(serializer_failure(path))?;
        Ok(())
    }

    fn ensure_present(
        &self,
        _owner: &mut S,
        serializers: &SerializerTable,
        path: &str,
    ) -> Result<(), BindError> {
        self.codec.resolve(serializers, path).map(|_| ())
    }

    fn write(
        &self,
        owner: &mut S,
        serializers: &SerializerTable,
        path: &str,
    ) -> Result<Option<Table>, BindError> {
        let codec = self.codec.resolve(serializers, path)?;
        codec
            .serialize((self.access)(owner))
            .map(Some)
            .map_err(serializer_failure(path))
    }
}

struct OptionalOpaqueSlot<S, T> {
    access: fn(&mut S) -> &mut Option<T>,
    codec: Codec<T>,
}

impl<S: 'static, T: Send + 'static> OpaqueAccess<S> for OptionalOpaqueSlot<S, T> {
    fn read(
        &self,
        owner: &mut S,
        section: &Table,
        serializers: &SerializerTable,
        path: &str,
    ) -> Result<(), BindError> {
        let codec = self.codec.resolve(serializers, path)?;
        *(self.access)(owner) = Some(codec.deserialize(section).map_err(serializer_failure(path))?);
        Ok(())
    }

    fn ensure_present(
        &self,
        owner: &mut S,
        serializers: &SerializerTable,
        path: &str,
    ) -> Result<(), BindError> {
        let slot = (self.access)(owner);
        if slot.is_some() {
            return Ok(());
        }
        let codec = self.codec.resolve(serializers, path)?;
        match codec.default_instance() {
            Some(value) => {
                *slot = Some(value);
                Ok(())
            }
            None => Err(BindError::DefaultConstruction {
                type_name: short_type_name::<T>(),
                member: path.to_string(),
            }),
        }
    }

    fn write(
        &self,
        owner: &mut S,
        serializers: &SerializerTable,
        path: &str,
    ) -> Result<Option<Table>, BindError> {
        let Some(value) = (self.access)(owner).as_ref() else {
            return Ok(None);
        };
        let codec = self.codec.resolve(serializers, path)?;
        codec.serialize(value).map(Some).map_err(serializer_failure(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::test::{AppSettings, Node, Server};

    #[test]
    fn descriptors_follow_declaration_order() {
        let names: Vec<_> = describe::<Server>().iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["host", "port", "tags"]);
    }

    #[test]
    fn path_and_env_default_from_name() {
        let descriptors = describe::<AppSettings>();
        let retries = descriptors.iter().find(|d| d.name == "maxRetries").unwrap();
        assert_eq!(retries.path, "maxRetries");
        assert_eq!(retries.env, "MAX_RETRIES");
    }

    #[test]
    fn modifiers_override_defaults() {
        let descriptors = describe::<AppSettings>();
        let nickname = descriptors.iter().find(|d| d.name == "nickname").unwrap();
        assert_eq!(nickname.path, "display.nickname");
        assert_eq!(nickname.env, "APP_NICKNAME");

        let name = descriptors.iter().find(|d| d.name == "name").unwrap();
        assert_eq!(name.comments, vec!["Display name."]);
    }

    #[test]
    fn ignored_members_are_excluded() {
        let descriptors = describe::<AppSettings>();
        assert!(descriptors.iter().all(|d| d.name != "scratch"));
        let schema = Schema::<AppSettings>::build();
        assert!(schema.members().iter().any(|m| m.descriptor.name == "scratch"));
    }

    #[test]
    fn element_types_are_recorded() {
        let descriptors = describe::<AppSettings>();
        let element = |name: &str| {
            descriptors
                .iter()
                .find(|d| d.name == name)
                .and_then(|d| d.element_type())
        };
        assert_eq!(element("slots"), Some("i32"));
        assert_eq!(element("plugins"), Some("Plugin"));
        assert_eq!(element("name"), None);
        assert_eq!(element("server"), None);
    }

    #[test]
    fn section_kinds_report_sharing() {
        let descriptors = describe::<Node>();
        let next = descriptors.iter().find(|d| d.name == "next").unwrap();
        assert_eq!(
            next.kind,
            MemberKind::Section {
                type_name: "Node",
                optional: true,
                shared: true
            }
        );
    }

    #[test]
    fn short_type_names_drop_module_paths() {
        assert_eq!(short_type_name::<Server>(), "Server");
        assert_eq!(short_type_name::<u32>(), "u32");
        assert!(short_type_name::<Vec<u32>>().contains("Vec"));
    }

    #[test]
    fn cache_builds_each_schema_once() {
        let cache = SchemaCache::default();
        let first = cache.get::<Server>();
        let second = cache.get::<Server>();
        assert!(Arc::ptr_eq(&first, &second));
        cache.get::<AppSettings>();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn cache_is_shared_across_threads() {
        let cache = Arc::new(SchemaCache::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.get::<Server>().descriptors().len())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 3);
        }
        assert_eq!(cache.len(), 1);
    }
}
