//! The backing document of a bundle: a TOML tree addressed by dotted paths.
//!
//! Edits go through `toml_edit`, so comments and formatting written by users
//! survive every load/save cycle. Values cross the API as `toml::Value`,
//! which keeps the binder and migration steps independent of the editing
//! representation.
//!
//! Two properties the binder depends on:
//!
//! - [`Document::set`] is a no-op when the stored value already equals the
//!   new one. Saving an unchanged bundle therefore reproduces the file byte
//!   for byte.
//! - Replacing an existing value keeps the key's comments and the value's
//!   trailing comment.

use std::fmt;
use std::path::Path;

use toml::Value;
use toml_edit::{ArrayOfTables, DocumentMut, Item, Table, TableLike};

use crate::error::BindError;

#[derive(Debug, Clone, Default)]
pub struct Document {
    inner: DocumentMut,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(content: &str) -> Result<Self, toml_edit::TomlError> {
        content.parse::<DocumentMut>().map(|inner| Self { inner })
    }

    /// Build a document holding the entries of `table`.
    pub fn from_table(table: &toml::Table) -> Self {
        let mut doc = Self::new();
        let root = doc.inner.as_table_mut();
        for (key, value) in table {
            root.insert(key, to_item(value));
        }
        doc
    }

    /// Snapshot of the whole tree, comments dropped.
    pub fn to_table(&self) -> toml::Table {
        table_from(self.inner.as_table())
    }

    /// Read and parse `path`. A missing file yields `None`.
    pub fn load(path: &Path) -> Result<Option<Self>, BindError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(BindError::IoError {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };
        Self::parse(&content)
            .map(Some)
            .map_err(|source| BindError::ParseError {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Write the document to `path`, creating parent directories if needed.
    pub fn save(&self, path: &Path) -> Result<(), BindError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BindError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(path, self.to_string()).map_err(|e| BindError::IoError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        self.item(path).and_then(value_from_item)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.item(path).is_some_and(|item| !item.is_none())
    }

    /// The table stored at `path`, whether written as a section or inline.
    pub fn section(&self, path: &str) -> Option<toml::Table> {
        match self.get(path)? {
            Value::Table(table) => Some(table),
            _ => None,
        }
    }

    /// Store `value` at `path`, creating intermediate sections as needed.
    ///
    /// Inline tables along the path are promoted to standard sections. Fails
    /// with [`BindError::PathConflict`] when a segment holds a non-table value.
    pub fn set(&mut self, path: &str, value: Value) -> Result<(), BindError> {
        if self.get(path).as_ref() == Some(&value) {
            return Ok(());
        }
        let (parents, leaf) = split(path);
        let Some(table) = self.table_mut(&parents, true, path)? else {
            return Err(BindError::PathConflict {
                path: path.to_string(),
            });
        };
        let mut item = to_item(&value);
        match table.get_mut(leaf) {
            Some(existing) if !existing.is_none() => {
                carry_decor(existing, &mut item);
                *existing = item;
            }
            _ => {
                table.insert(leaf, item);
            }
        }
        Ok(())
    }

    /// Remove `path`, returning the value it held.
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        let (parents, leaf) = split(path);
        let table = self.table_mut(&parents, false, path).ok().flatten()?;
        table.remove(leaf).as_ref().and_then(value_from_item)
    }

    /// Move the value at `from` (and its comments) to `to`.
    ///
    /// Returns `false` when `from` is absent.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<bool, BindError> {
        let Some(value) = self.get(from) else {
            return Ok(false);
        };
        let comments = self.comments(from);
        self.remove(from);
        self.set(to, value)?;
        if !comments.is_empty() {
            self.set_comments(to, &comments);
        }
        Ok(true)
    }

    /// Dotted paths in document order. With `recursive`, sections are
    /// descended into; arrays never are.
    pub fn keys(&self, recursive: bool) -> Vec<String> {
        let mut keys = Vec::new();
        collect_keys(self.inner.as_table(), "", recursive, &mut keys);
        keys
    }

    /// Comment lines attached above `path`, without the `#` markers.
    pub fn comments(&self, path: &str) -> Vec<String> {
        let (parents, leaf) = split(path);
        let Some(table) = self.item(&parents.join(".")).and_then(Item::as_table) else {
            return Vec::new();
        };
        let decor = match table.get(leaf) {
            Some(Item::Table(section)) => section.decor(),
            Some(Item::ArrayOfTables(array)) => match array.get(0) {
                Some(first) => first.decor(),
                None => return Vec::new(),
            },
            Some(item) if !item.is_none() => match table.get_key_value(leaf) {
                Some((key, _)) => key.leaf_decor(),
                None => return Vec::new(),
            },
            _ => return Vec::new(),
        };
        decor
            .prefix()
            .and_then(|raw| raw.as_str())
            .map(parse_comment_lines)
            .unwrap_or_default()
    }

    /// Replace the comment lines above `path`. An empty slice clears them.
    ///
    /// Returns `false` when `path` does not exist.
    pub fn set_comments(&mut self, path: &str, lines: &[String]) -> bool {
        let (parents, leaf) = split(path);
        let Ok(Some(table)) = self.table_mut(&parents, false, path) else {
            return false;
        };
        let rendered = render_comment_lines(lines);
        // Section headers get a separating blank line, keys sit flush.
        let header = if lines.is_empty() {
            String::new()
        } else {
            format!("\n{rendered}")
        };
        match table.get_mut(leaf) {
            Some(Item::Table(section)) => {
                section.decor_mut().set_prefix(header);
                return true;
            }
            Some(Item::ArrayOfTables(array)) => {
                return match array.get_mut(0) {
                    Some(first) => {
                        first.decor_mut().set_prefix(header);
                        true
                    }
                    None => false,
                };
            }
            Some(item) if !item.is_none() => {}
            _ => return false,
        }
        match table.get_key_value_mut(leaf) {
            Some((mut key, _)) => {
                key.leaf_decor_mut().set_prefix(rendered);
                true
            }
            None => false,
        }
    }

    fn item(&self, path: &str) -> Option<&Item> {
        let mut current = self.inner.as_item();
        if path.is_empty() {
            return Some(current);
        }
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current)
    }

    /// Walk to the table holding the leaf of `path`.
    fn table_mut(
        &mut self,
        parents: &[&str],
        create: bool,
        path: &str,
    ) -> Result<Option<&mut Table>, BindError> {
        let mut current = self.inner.as_table_mut();
        for &segment in parents {
            if !current.contains_key(segment) {
                if !create {
                    return Ok(None);
                }
                let mut fresh = Table::new();
                fresh.set_implicit(true);
                current.insert(segment, Item::Table(fresh));
            }
            let Some(item) = current.get_mut(segment) else {
                return Ok(None);
            };
            if matches!(item, Item::Value(toml_edit::Value::InlineTable(_)))
                && let Item::Value(toml_edit::Value::InlineTable(inline)) = std::mem::take(item)
            {
                *item = Item::Table(inline.into_table());
            }
            current = match item {
                Item::Table(table) => table,
                _ => {
                    return Err(BindError::PathConflict {
                        path: path.to_string(),
                    });
                }
            };
        }
        Ok(Some(current))
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

fn split(path: &str) -> (Vec<&str>, &str) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let leaf = segments.pop().unwrap_or_default();
    (segments, leaf)
}

fn collect_keys(table: &dyn TableLike, prefix: &str, recursive: bool, out: &mut Vec<String>) {
    for (key, item) in table.iter() {
        if item.is_none() {
            continue;
        }
        let path = if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}.{key}")
        };
        out.push(path.clone());
        if recursive && let Some(inner) = item.as_table_like() {
            collect_keys(inner, &path, recursive, out);
        }
    }
}

/// Keep the comments of the entry being replaced.
fn carry_decor(existing: &Item, replacement: &mut Item) {
    match (existing, replacement) {
        (Item::Value(old), Item::Value(new)) => *new.decor_mut() = old.decor().clone(),
        (Item::Table(old), Item::Table(new)) => *new.decor_mut() = old.decor().clone(),
        _ => {}
    }
}

fn parse_comment_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix('#'))
        .map(|line| line.strip_prefix(' ').unwrap_or(line).to_string())
        .collect()
}

fn render_comment_lines(lines: &[String]) -> String {
    lines
        .iter()
        .map(|line| {
            if line.is_empty() {
                "#\n".to_string()
            } else {
                format!("# {line}\n")
            }
        })
        .collect()
}

fn value_from_item(item: &Item) -> Option<Value> {
    match item {
        Item::None => None,
        Item::Value(value) => Some(value_from_edit(value)),
        Item::Table(table) => Some(Value::Table(table_from(table))),
        Item::ArrayOfTables(array) => Some(Value::Array(
            array.iter().map(|t| Value::Table(table_from(t))).collect(),
        )),
    }
}

fn table_from(table: &Table) -> toml::Table {
    table
        .iter()
        .filter_map(|(key, item)| value_from_item(item).map(|v| (key.to_string(), v)))
        .collect()
}

fn value_from_edit(value: &toml_edit::Value) -> Value {
    match value {
        toml_edit::Value::String(s) => Value::String(s.value().clone()),
        toml_edit::Value::Integer(i) => Value::Integer(*i.value()),
        toml_edit::Value::Float(f) => Value::Float(*f.value()),
        toml_edit::Value::Boolean(b) => Value::Boolean(*b.value()),
        toml_edit::Value::Datetime(d) => Value::Datetime(*d.value()),
        toml_edit::Value::Array(array) => Value::Array(array.iter().map(value_from_edit).collect()),
        toml_edit::Value::InlineTable(table) => Value::Table(
            table
                .iter()
                .map(|(key, v)| (key.to_string(), value_from_edit(v)))
                .collect(),
        ),
    }
}

fn to_item(value: &Value) -> Item {
    match value {
        Value::Table(table) => Item::Table(to_table(table)),
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_table) => {
            let mut array = ArrayOfTables::new();
            for item in items {
                if let Value::Table(table) = item {
                    array.push(to_table(table));
                }
            }
            Item::ArrayOfTables(array)
        }
        other => Item::Value(to_edit(other)),
    }
}

fn to_table(table: &toml::Table) -> Table {
    let mut out = Table::new();
    out.set_implicit(true);
    for (key, value) in table {
        out.insert(key, to_item(value));
    }
    out
}

fn to_edit(value: &Value) -> toml_edit::Value {
    match value {
        Value::String(s) => toml_edit::Value::from(s.as_str()),
        Value::Integer(i) => toml_edit::Value::from(*i),
        Value::Float(f) => toml_edit::Value::from(*f),
        Value::Boolean(b) => toml_edit::Value::from(*b),
        Value::Datetime(d) => toml_edit::Value::from(*d),
        Value::Array(items) => toml_edit::Value::Array(items.iter().map(to_edit).collect()),
        Value::Table(table) => toml_edit::Value::InlineTable(
            table
                .iter()
                .map(|(key, v)| (key.clone(), to_edit(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
# Schema version
Version = \"1.0.0\"
name = \"demo\" # trailing

[server]
# Port to listen on
port = 8080
tags = [\"a\", \"b\"]
";

    #[test]
    fn get_reads_nested_paths() {
        let doc = Document::parse(SAMPLE).unwrap();
        assert_eq!(doc.get("server.port"), Some(Value::Integer(8080)));
        assert_eq!(doc.get("name").unwrap().as_str(), Some("demo"));
        assert_eq!(doc.get("server.missing"), None);
        assert!(doc.contains("server"));
        assert!(!doc.contains("client"));
    }

    #[test]
    fn set_creates_intermediate_sections() {
        let mut doc = Document::new();
        doc.set("a.b.c", Value::Integer(1)).unwrap();
        assert_eq!(doc.get("a.b.c"), Some(Value::Integer(1)));
        let reparsed = Document::parse(&doc.to_string()).unwrap();
        assert_eq!(reparsed.get("a.b.c"), Some(Value::Integer(1)));
    }

    #[test]
    fn set_with_equal_value_keeps_bytes() {
        let mut doc = Document::parse(SAMPLE).unwrap();
        doc.set("server.port", Value::Integer(8080)).unwrap();
        doc.set("name", Value::String("demo".into())).unwrap();
        assert_eq!(doc.to_string(), SAMPLE);
    }

    #[test]
    fn set_preserves_comments_on_replaced_values() {
        let mut doc = Document::parse(SAMPLE).unwrap();
        doc.set("server.port", Value::Integer(9090)).unwrap();
        doc.set("name", Value::String("other".into())).unwrap();
        let out = doc.to_string();
        assert!(out.contains("# Port to listen on\nport = 9090"));
        assert!(out.contains("name = \"other\" # trailing"));
        assert_eq!(doc.comments("server.port"), vec!["Port to listen on"]);
    }

    #[test]
    fn set_through_scalar_is_a_path_conflict() {
        let mut doc = Document::parse(SAMPLE).unwrap();
        let err = doc.set("name.inner", Value::Integer(1)).unwrap_err();
        assert!(matches!(err, BindError::PathConflict { .. }));
    }

    #[test]
    fn set_promotes_inline_tables() {
        let mut doc = Document::parse("point = { x = 1, y = 2 }\n").unwrap();
        doc.set("point.z", Value::Integer(3)).unwrap();
        assert_eq!(doc.get("point.x"), Some(Value::Integer(1)));
        assert_eq!(doc.get("point.z"), Some(Value::Integer(3)));
    }

    #[test]
    fn keys_follow_document_order() {
        let doc = Document::parse(SAMPLE).unwrap();
        assert_eq!(doc.keys(false), vec!["Version", "name", "server"]);
        assert_eq!(
            doc.keys(true),
            vec!["Version", "name", "server", "server.port", "server.tags"]
        );
    }

    #[test]
    fn keys_do_not_descend_into_arrays() {
        let doc = Document::parse("[[items]]\nid = 1\n[[items]]\nid = 2\n").unwrap();
        assert_eq!(doc.keys(true), vec!["items"]);
    }

    #[test]
    fn remove_drops_value() {
        let mut doc = Document::parse(SAMPLE).unwrap();
        assert_eq!(doc.remove("server.port"), Some(Value::Integer(8080)));
        assert!(!doc.contains("server.port"));
        assert_eq!(doc.remove("server.port"), None);
        assert_eq!(doc.remove("nowhere.deep"), None);
    }

    #[test]
    fn rename_moves_value_and_comments() {
        let mut doc = Document::parse(SAMPLE).unwrap();
        assert!(doc.rename("server.port", "listen.port").unwrap());
        assert!(!doc.contains("server.port"));
        assert_eq!(doc.get("listen.port"), Some(Value::Integer(8080)));
        assert_eq!(doc.comments("listen.port"), vec!["Port to listen on"]);
        assert!(!doc.rename("absent", "elsewhere").unwrap());
    }

    #[test]
    fn comments_on_sections_use_the_header() {
        let mut doc = Document::parse(SAMPLE).unwrap();
        assert!(doc.set_comments("server", &["Network settings".to_string()]));
        assert!(doc.to_string().contains("# Network settings\n[server]"));
        assert_eq!(doc.comments("server"), vec!["Network settings"]);
    }

    #[test]
    fn set_comments_on_missing_path_is_rejected() {
        let mut doc = Document::new();
        assert!(!doc.set_comments("ghost", &["x".to_string()]));
        assert!(doc.comments("ghost").is_empty());
    }

    #[test]
    fn empty_comment_list_clears() {
        let mut doc = Document::parse(SAMPLE).unwrap();
        doc.set_comments("Version", &[]);
        assert!(doc.comments("Version").is_empty());
        assert!(doc.to_string().starts_with("Version"));
    }

    #[test]
    fn section_reads_standard_and_inline_tables() {
        let doc = Document::parse("inline = { a = 1 }\n[block]\nb = 2\n").unwrap();
        assert_eq!(doc.section("inline").unwrap()["a"], Value::Integer(1));
        assert_eq!(doc.section("block").unwrap()["b"], Value::Integer(2));
        assert!(doc.section("block.b").is_none());
    }

    #[test]
    fn lists_of_tables_become_arrays_of_tables() {
        let mut doc = Document::new();
        let mut first = toml::Table::new();
        first.insert("id".into(), Value::Integer(1));
        doc.set("items", Value::Array(vec![Value::Table(first)]))
            .unwrap();
        assert!(doc.to_string().contains("[[items]]"));
        assert_eq!(doc.get("items").unwrap().as_array().unwrap().len(), 1);
    }

    #[test]
    fn table_round_trip() {
        let doc = Document::parse(SAMPLE).unwrap();
        let rebuilt = Document::from_table(&doc.to_table());
        assert_eq!(rebuilt.to_table(), doc.to_table());
    }

    #[test]
    fn save_and_load_preserve_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/dir/settings.toml");
        let doc = Document::parse(SAMPLE).unwrap();
        doc.save(&path).unwrap();
        let loaded = Document::load(&path).unwrap().unwrap();
        assert_eq!(loaded.to_string(), SAMPLE);
    }

    #[test]
    fn load_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(Document::load(&dir.path().join("absent.toml")).unwrap().is_none());
    }

    #[test]
    fn load_invalid_file_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();
        let err = Document::load(&path).unwrap_err();
        assert!(matches!(err, BindError::ParseError { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }
}
