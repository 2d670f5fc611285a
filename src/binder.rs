//! Recursive load/save traversal between a section tree and a document.
//!
//! Load walks the declared members of a section in order:
//!
//! 1. An absent member value (`None`) gets a default.
//! 2. A document value at the member's path replaces it.
//! 3. The member's value is written only when the document lacked the path,
//!    so defaults populate the document but never overwrite it.
//! 4. With overrides enabled, a provider answer that parses and differs from
//!    the loaded value replaces it in memory and is recorded as substituted.
//!
//! Document keys that no member claims are handled by the stale-key policy
//! once the whole tree has been bound.
//!
//! Save mirrors load but always writes, skipping substituted paths so
//! overrides never reach the document.
//!
//! Shared sections are tracked by `(allocation, type)`: each is bound once
//! per pass, which makes cyclic graphs terminate. Optional sections whose
//! type is already being bound higher up are not synthesized unless the
//! document has data for them.

use std::any::TypeId;
use std::collections::{BTreeSet, HashSet};

use toml::Value;
use tracing::{debug, warn};

use crate::builder::Settings;
use crate::coerce::kind_of;
use crate::describe::{
    Binding, LeafAccess, Member, MemberDescriptor, OpaqueAccess, SchemaCache, Section,
    SectionAccess, SectionListAccess,
};
use crate::document::Document;
use crate::error::BindError;
use crate::serializer::SerializerTable;
use crate::types::StaleKeyPolicy;

/// Outcome of binding a section tree against a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Full paths whose in-memory value came from an override.
    pub substituted: BTreeSet<String>,
    /// Document keys no member claimed, in document order.
    pub unused: Vec<String>,
}

pub(crate) struct Binder<'r> {
    settings: &'r Settings,
    schemas: &'r SchemaCache,
    serializers: &'r SerializerTable,
}

impl<'r> Binder<'r> {
    pub fn new(
        settings: &'r Settings,
        schemas: &'r SchemaCache,
        serializers: &'r SerializerTable,
    ) -> Self {
        Self {
            settings,
            schemas,
            serializers,
        }
    }

    /// Bind `instance` to `doc`. `identity` marks a root held in a
    /// [`Shared`](crate::Shared) so references back to it are not re-entered.
    pub fn load<S: Section>(
        &self,
        instance: &mut S,
        identity: Option<usize>,
        doc: &mut Document,
    ) -> Result<LoadReport, BindError> {
        let version_key = self.settings.version_key();
        let mut unused: Vec<String> = doc
            .keys(true)
            .into_iter()
            .filter(|key| key != version_key)
            .collect();

        let mut pass = LoadPass {
            binder: self,
            visited: HashSet::new(),
            ancestry: Vec::new(),
            substituted: BTreeSet::new(),
            overrides: self.settings.overrides_enabled(),
        };
        if let Some(identity) = identity {
            pass.visited.insert((identity, TypeId::of::<S>()));
        }
        pass.load_section(instance, doc, "", &mut unused)?;

        Ok(LoadReport {
            substituted: pass.substituted,
            unused,
        })
    }

    /// Write `instance` into `doc`, leaving `substituted` paths untouched.
    pub fn save<S: Section>(
        &self,
        instance: &mut S,
        identity: Option<usize>,
        doc: &mut Document,
        substituted: &BTreeSet<String>,
    ) -> Result<(), BindError> {
        let mut pass = SavePass {
            binder: self,
            visited: HashSet::new(),
            substituted,
            in_element: false,
        };
        if let Some(identity) = identity {
            pass.visited.insert((identity, TypeId::of::<S>()));
        }
        pass.save_section(instance, doc, "")
    }

    /// Apply the stale-key policy to `unused` keys of `doc`.
    pub fn sweep(&self, doc: &mut Document, unused: &[String]) {
        let policy = self.settings.stale_keys();
        if policy == StaleKeyPolicy::Ignore {
            return;
        }
        let warning = [self.settings.unused_warning().to_string()];
        for key in unused {
            if !doc.contains(key) {
                continue;
            }
            match policy {
                StaleKeyPolicy::Remove => {
                    warn!(key = %key, "removing unused key");
                    doc.remove(key);
                }
                StaleKeyPolicy::MarkUnused => {
                    warn!(key = %key, "marking unused key");
                    doc.set_comments(key, &warning);
                }
                StaleKeyPolicy::Ignore => {}
            }
        }
    }
}

/// Type-erased entry point into a section, used to recurse through
/// accessors without knowing the concrete type.
pub(crate) trait DynSection {
    fn load_in(
        &mut self,
        pass: &mut LoadPass<'_>,
        doc: &mut Document,
        prefix: &str,
        unused: &mut Vec<String>,
    ) -> Result<(), BindError>;

    fn save_in(
        &mut self,
        pass: &mut SavePass<'_>,
        doc: &mut Document,
        prefix: &str,
    ) -> Result<(), BindError>;
}

impl<S: Section> DynSection for S {
    fn load_in(
        &mut self,
        pass: &mut LoadPass<'_>,
        doc: &mut Document,
        prefix: &str,
        unused: &mut Vec<String>,
    ) -> Result<(), BindError> {
        pass.load_section(self, doc, prefix, unused)
    }

    fn save_in(
        &mut self,
        pass: &mut SavePass<'_>,
        doc: &mut Document,
        prefix: &str,
    ) -> Result<(), BindError> {
        pass.save_section(self, doc, prefix)
    }
}

pub(crate) struct LoadPass<'b> {
    binder: &'b Binder<'b>,
    visited: HashSet<(usize, TypeId)>,
    ancestry: Vec<TypeId>,
    substituted: BTreeSet<String>,
    overrides: bool,
}

impl LoadPass<'_> {
    fn load_section<S: Section>(
        &mut self,
        instance: &mut S,
        doc: &mut Document,
        prefix: &str,
        unused: &mut Vec<String>,
    ) -> Result<(), BindError> {
        let schema = self.binder.schemas.get::<S>();
        self.ancestry.push(TypeId::of::<S>());
        let result = schema
            .members()
            .iter()
            .filter(|member| !member.descriptor.ignored)
            .try_for_each(|member| self.load_member(instance, member, doc, prefix, unused));
        self.ancestry.pop();
        result
    }

    fn load_member<S>(
        &mut self,
        owner: &mut S,
        member: &Member<S>,
        doc: &mut Document,
        prefix: &str,
        unused: &mut Vec<String>,
    ) -> Result<(), BindError> {
        let descriptor = &member.descriptor;
        let path = join(prefix, &descriptor.path);
        claim(unused, &path);

        match &member.binding {
            Binding::Leaf(access) => {
                self.load_leaf(owner, access.as_ref(), descriptor, &path, doc)?
            }
            Binding::Section(access) => {
                self.load_nested(owner, access.as_ref(), &path, doc, unused)?
            }
            Binding::SectionList(access) => self.load_list(owner, access.as_ref(), &path, doc)?,
            Binding::Opaque(access) => {
                self.load_opaque(owner, access.as_ref(), &path, doc, unused)?
            }
        }

        if !descriptor.comments.is_empty()
            && doc.contains(&path)
            && doc.comments(&path).is_empty()
        {
            doc.set_comments(&path, &descriptor.comments);
        }
        Ok(())
    }

    fn load_leaf<S>(
        &mut self,
        owner: &mut S,
        access: &dyn LeafAccess<S>,
        descriptor: &MemberDescriptor,
        path: &str,
        doc: &mut Document,
    ) -> Result<(), BindError> {
        let present = doc.contains(path);
        if access.is_absent(owner) {
            access.fill_default(owner);
        }

        if let Some(node) = doc.get(path) {
            match access.load(owner, &node) {
                Ok(()) => {}
                Err(err) if err.is_structural() => {
                    return Err(BindError::StructuralMismatch {
                        member: path.to_string(),
                        expected: access.shape().describe(),
                        found: err.to_string(),
                    });
                }
                Err(err) => warn!(member = %path, error = %err, "keeping current value"),
            }
        }

        if !present && let Some(value) = access.value(owner) {
            doc.set(path, value)?;
        }

        if self.overrides
            && let Some(raw) = self.binder.settings.overrides().resolve(&descriptor.env)
        {
            match access.apply_override(owner, &raw) {
                Ok(true) => {
                    debug!(member = %path, key = %descriptor.env, "value overridden");
                    self.substituted.insert(path.to_string());
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(member = %path, key = %descriptor.env, error = %err, "ignoring override")
                }
            }
        }
        Ok(())
    }

    fn load_nested<S>(
        &mut self,
        owner: &mut S,
        access: &dyn SectionAccess<S>,
        path: &str,
        doc: &mut Document,
        unused: &mut Vec<String>,
    ) -> Result<(), BindError> {
        if access.is_absent(owner) {
            if self.ancestry.contains(&access.target()) && !doc.contains(path) {
                return Ok(());
            }
            access.fill_default(owner);
        }
        if let Some(identity) = access.identity(owner)
            && !self.visited.insert((identity, access.target()))
        {
            debug!(member = %path, "shared section already bound");
            unused.retain(|key| !is_ancestor(path, key));
            return Ok(());
        }
        access.enter(owner, &mut |section| section.load_in(self, doc, path, unused))
    }

    fn load_list<S>(
        &mut self,
        owner: &mut S,
        access: &dyn SectionListAccess<S>,
        path: &str,
        doc: &mut Document,
    ) -> Result<(), BindError> {
        let mismatch = |found: String| BindError::StructuralMismatch {
            member: path.to_string(),
            expected: format!("list of {}", access.element()),
            found,
        };

        let tables = match doc.get(path) {
            Some(Value::Array(items)) => {
                let mut tables = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    match item {
                        Value::Table(table) => tables.push(table),
                        other => {
                            let found = format!("{} at element {index}", kind_of(&other));
                            return Err(mismatch(found));
                        }
                    }
                }
                Some(tables)
            }
            Some(other) => return Err(mismatch(kind_of(&other).to_string())),
            None => None,
        };

        let overrides = std::mem::replace(&mut self.overrides, false);
        let mut rebuilt = Vec::new();
        let result = match &tables {
            Some(tables) => access.rebuild(owner, tables.len(), &mut |index, element| {
                let mut scratch = Document::from_table(&tables[index]);
                element.load_in(self, &mut scratch, "", &mut Vec::new())?;
                rebuilt.push(Value::Table(scratch.to_table()));
                Ok(())
            }),
            None => access.each(owner, &mut |element| {
                let mut scratch = Document::new();
                element.load_in(self, &mut scratch, "", &mut Vec::new())?;
                rebuilt.push(Value::Table(scratch.to_table()));
                Ok(())
            }),
        };
        self.overrides = overrides;
        result?;
        doc.set(path, Value::Array(rebuilt))
    }

    fn load_opaque<S>(
        &mut self,
        owner: &mut S,
        access: &dyn OpaqueAccess<S>,
        path: &str,
        doc: &mut Document,
        unused: &mut Vec<String>,
    ) -> Result<(), BindError> {
        let serializers = self.binder.serializers;
        let present = doc.contains(path);
        match doc.section(path) {
            Some(section) => {
                access.read(owner, &section, serializers, path)?;
                unused.retain(|key| !is_ancestor(path, key));
            }
            None if present => warn!(member = %path, "expected a section, keeping current value"),
            None => {}
        }
        if !present {
            access.ensure_present(owner, serializers, path)?;
            if let Some(table) = access.write(owner, serializers, path)? {
                doc.set(path, Value::Table(table))?;
            }
        }
        Ok(())
    }
}

pub(crate) struct SavePass<'b> {
    binder: &'b Binder<'b>,
    visited: HashSet<(usize, TypeId)>,
    substituted: &'b BTreeSet<String>,
    in_element: bool,
}

impl SavePass<'_> {
    fn save_section<S: Section>(
        &mut self,
        instance: &mut S,
        doc: &mut Document,
        prefix: &str,
    ) -> Result<(), BindError> {
        let schema = self.binder.schemas.get::<S>();
        schema
            .members()
            .iter()
            .filter(|member| !member.descriptor.ignored)
            .try_for_each(|member| self.save_member(instance, member, doc, prefix))
    }

    fn save_member<S>(
        &mut self,
        owner: &mut S,
        member: &Member<S>,
        doc: &mut Document,
        prefix: &str,
    ) -> Result<(), BindError> {
        let path = join(prefix, &member.descriptor.path);
        match &member.binding {
            Binding::Leaf(access) => {
                if !self.in_element && self.substituted.contains(&path) {
                    return Ok(());
                }
                match access.value(owner) {
                    Some(value) => doc.set(&path, value)?,
                    None => {
                        doc.remove(&path);
                    }
                }
            }
            Binding::Section(access) => {
                if access.is_absent(owner) {
                    doc.remove(&path);
                    return Ok(());
                }
                if let Some(identity) = access.identity(owner)
                    && !self.visited.insert((identity, access.target()))
                {
                    return Ok(());
                }
                access.enter(owner, &mut |section| section.save_in(self, doc, &path))?;
            }
            Binding::SectionList(access) => {
                let in_element = std::mem::replace(&mut self.in_element, true);
                let mut tables = Vec::new();
                let result = access.each(owner, &mut |element| {
                    let mut scratch = Document::new();
                    element.save_in(self, &mut scratch, "")?;
                    tables.push(Value::Table(scratch.to_table()));
                    Ok(())
                });
                self.in_element = in_element;
                result?;
                doc.set(&path, Value::Array(tables))?;
            }
            Binding::Opaque(access) => match access.write(owner, self.binder.serializers, &path)? {
                Some(table) => doc.set(&path, Value::Table(table))?,
                None => {
                    doc.remove(&path);
                }
            },
        }
        Ok(())
    }
}

fn join(prefix: &str, path: &str) -> String {
    if prefix.is_empty() {
        path.to_string()
    } else {
        format!("{prefix}.{path}")
    }
}

/// Whether `key` is `path` itself or lies beneath it.
fn is_ancestor(path: &str, key: &str) -> bool {
    key == path
        || (key.len() > path.len()
            && key.starts_with(path)
            && key.as_bytes()[path.len()] == b'.')
}

/// Drop `path` and its parent sections from the unused set.
fn claim(unused: &mut Vec<String>, path: &str) {
    unused.retain(|key| !is_ancestor(key, path));
}
