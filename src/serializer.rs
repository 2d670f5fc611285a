//! Serializers for types the binder does not walk member by member.
//!
//! Two ways to make an opaque type bindable:
//!
//! - Register an [`ExternalSerializer<T>`] with the registry builder. The
//!   registry keeps one per `TypeId` in a [`SerializerTable`], resolved when
//!   a member of that type is bound.
//! - Implement [`SelfSerializing`] on the type itself and declare the member
//!   with [`Schema::serializable`](crate::Schema::serializable).
//!
//! [`SerdeSerializer`] adapts any serde type to the first form.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use toml::{Table, Value};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SerializerError(pub String);

impl SerializerError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Converts `T` to and from a document section.
pub trait ExternalSerializer<T>: Send + Sync + 'static {
    fn serialize(&self, value: &T) -> Result<Table, SerializerError>;

    fn deserialize(&self, section: &Table) -> Result<T, SerializerError>;

    /// An instance to bind when neither the member nor the document has one.
    fn default_instance(&self) -> Option<T> {
        None
    }
}

/// A type that knows its own document section form.
pub trait SelfSerializing: Sized + Send + 'static {
    fn to_section(&self) -> Result<Table, SerializerError>;

    fn from_section(section: &Table) -> Result<Self, SerializerError>;
}

/// Bridges a [`SelfSerializing`] type to [`ExternalSerializer`].
pub(crate) struct SelfCodec<T>(PhantomData<fn() -> T>);

impl<T> SelfCodec<T> {
    pub(crate) fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: SelfSerializing> ExternalSerializer<T> for SelfCodec<T> {
    fn serialize(&self, value: &T) -> Result<Table, SerializerError> {
        value.to_section()
    }

    fn deserialize(&self, section: &Table) -> Result<T, SerializerError> {
        T::from_section(section)
    }
}

/// Serializes any serde type through `toml::Value`.
///
/// The default instance is `T::default()`.
pub struct SerdeSerializer<T>(PhantomData<fn() -> T>);

impl<T> SerdeSerializer<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for SerdeSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ExternalSerializer<T> for SerdeSerializer<T>
where
    T: Serialize + DeserializeOwned + Default + 'static,
{
    fn serialize(&self, value: &T) -> Result<Table, SerializerError> {
        match Value::try_from(value) {
            Ok(Value::Table(table)) => Ok(table),
            Ok(other) => Err(SerializerError::new(format!(
                "expected a table, got {}",
                crate::coerce::kind_of(&other)
            ))),
            Err(e) => Err(SerializerError::new(e.to_string())),
        }
    }

    fn deserialize(&self, section: &Table) -> Result<T, SerializerError> {
        Value::Table(section.clone())
            .try_into()
            .map_err(|e: toml::de::Error| SerializerError::new(e.to_string()))
    }

    fn default_instance(&self) -> Option<T> {
        Some(T::default())
    }
}

/// Registered external serializers, one per type.
#[derive(Default)]
pub struct SerializerTable {
    entries: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl SerializerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `serializer` for `T`, replacing any earlier one.
    pub fn insert<T: 'static>(&mut self, serializer: impl ExternalSerializer<T>) {
        let shared: Arc<dyn ExternalSerializer<T>> = Arc::new(serializer);
        self.entries.insert(TypeId::of::<T>(), Box::new(shared));
    }

    pub fn get<T: 'static>(&self) -> Option<Arc<dyn ExternalSerializer<T>>> {
        self.entries
            .get(&TypeId::of::<T>())?
            .downcast_ref::<Arc<dyn ExternalSerializer<T>>>()
            .cloned()
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    struct Endpoint {
        host: String,
        port: u16,
    }

    struct Upper;

    impl ExternalSerializer<String> for Upper {
        fn serialize(&self, value: &String) -> Result<Table, SerializerError> {
            let mut table = Table::new();
            table.insert("text".into(), Value::String(value.to_uppercase()));
            Ok(table)
        }

        fn deserialize(&self, section: &Table) -> Result<String, SerializerError> {
            section
                .get("text")
                .and_then(Value::as_str)
                .map(str::to_lowercase)
                .ok_or_else(|| SerializerError::new("missing text"))
        }
    }

    #[test]
    fn serde_serializer_round_trips() {
        let codec = SerdeSerializer::<Endpoint>::new();
        let value = Endpoint {
            host: "db.local".into(),
            port: 5432,
        };
        let table = codec.serialize(&value).unwrap();
        assert_eq!(table["port"], Value::Integer(5432));
        assert_eq!(codec.deserialize(&table).unwrap(), value);
        assert_eq!(codec.default_instance(), Some(Endpoint::default()));
    }

    #[test]
    fn serde_serializer_reports_bad_sections() {
        let codec = SerdeSerializer::<Endpoint>::new();
        let mut table = Table::new();
        table.insert("port".into(), Value::String("nope".into()));
        assert!(codec.deserialize(&table).is_err());
    }

    #[test]
    fn table_resolves_by_type() {
        let mut table = SerializerTable::new();
        table.insert::<String>(Upper);
        assert!(table.contains::<String>());
        assert!(table.get::<u32>().is_none());

        let codec = table.get::<String>().unwrap();
        let section = codec.serialize(&"hi".to_string()).unwrap();
        assert_eq!(section["text"], Value::String("HI".into()));
        assert_eq!(codec.deserialize(&section).unwrap(), "hi");
        assert!(codec.default_instance().is_none());
    }

    #[test]
    fn later_registration_replaces() {
        let mut table = SerializerTable::new();
        table.insert::<Endpoint>(SerdeSerializer::new());
        table.insert::<Endpoint>(SerdeSerializer::new());
        assert_eq!(table.len(), 1);
    }
}
