//! Conversion between document values and typed member values.
//!
//! [`Scalar`] covers the primitive types a document can hold directly.
//! [`Leaf`] is what a member bound with [`Schema::value`](crate::Schema::value)
//! must implement: every scalar, lists of scalars, fixed-size arrays of
//! scalars, and `Option` of any leaf.
//!
//! Override strings (from the environment or properties) go through
//! [`Leaf::parse_override`]: scalars parse the whole string, lists and arrays
//! split it on commas.

use std::num::IntErrorKind;

use toml::Value;
use tracing::warn;

use crate::error::CoercionError;

/// Human-readable kind of a document value, used in error messages.
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "string",
        Value::Integer(_) => "integer",
        Value::Float(_) => "float",
        Value::Boolean(_) => "boolean",
        Value::Datetime(_) => "datetime",
        Value::Array(_) => "array",
        Value::Table(_) => "table",
    }
}

/// A primitive value stored as a single document scalar.
pub trait Scalar: Clone + PartialEq + Default + Send + 'static {
    const NAME: &'static str;

    fn to_value(&self) -> Value;

    fn from_value(value: &Value) -> Result<Self, CoercionError>;

    fn parse(raw: &str) -> Result<Self, CoercionError>;
}

/// The layout of a leaf member, as reported in descriptors and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafShape {
    Scalar(&'static str),
    List(&'static str),
    Array(&'static str, usize),
}

impl LeafShape {
    pub fn is_sequence(&self) -> bool {
        !matches!(self, LeafShape::Scalar(_))
    }

    pub fn element(&self) -> &'static str {
        match self {
            LeafShape::Scalar(name) | LeafShape::List(name) | LeafShape::Array(name, _) => name,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            LeafShape::Scalar(name) => (*name).to_string(),
            LeafShape::List(name) => format!("list of {name}"),
            LeafShape::Array(name, len) => format!("array of {len} {name}"),
        }
    }
}

/// A member value the binder reads and writes without recursion.
pub trait Leaf: Clone + PartialEq + Send + 'static {
    fn shape() -> LeafShape;

    /// The document form of this value. `None` means the key is absent.
    fn to_value(&self) -> Option<Value>;

    fn from_value(value: &Value) -> Result<Self, CoercionError>;

    fn parse_override(raw: &str) -> Result<Self, CoercionError>;

    fn is_absent(&self) -> bool {
        false
    }

    /// Replace an absent value with the type's default.
    fn fill_default(&mut self) {}
}

fn type_error(expected: &'static str, value: &Value) -> CoercionError {
    CoercionError::Type {
        expected,
        found: kind_of(value),
    }
}

macro_rules! scalar_leaf {
    ($ty:ty) => {
        impl Leaf for $ty {
            fn shape() -> LeafShape {
                LeafShape::Scalar(<$ty as Scalar>::NAME)
            }

            fn to_value(&self) -> Option<Value> {
                Some(Scalar::to_value(self))
            }

            fn from_value(value: &Value) -> Result<Self, CoercionError> {
                <$ty as Scalar>::from_value(value)
            }

            fn parse_override(raw: &str) -> Result<Self, CoercionError> {
                <$ty as Scalar>::parse(raw)
            }
        }
    };
}

macro_rules! integer_scalar {
    ($($ty:ty),* $(,)?) => {$(
        impl Scalar for $ty {
            const NAME: &'static str = stringify!($ty);

            fn to_value(&self) -> Value {
                match i64::try_from(*self) {
                    Ok(i) => Value::Integer(i),
                    // Beyond i64: the document has no wider integer.
                    Err(_) => Value::String(self.to_string()),
                }
            }

            fn from_value(value: &Value) -> Result<Self, CoercionError> {
                match value {
                    Value::Integer(i) => <$ty>::try_from(*i).map_err(|_| CoercionError::Overflow {
                        expected: Self::NAME,
                        value: i.to_string(),
                    }),
                    Value::String(s) => Self::parse(s),
                    other => Err(type_error(Self::NAME, other)),
                }
            }

            fn parse(raw: &str) -> Result<Self, CoercionError> {
                raw.trim().parse::<$ty>().map_err(|e| match e.kind() {
                    IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
                        CoercionError::Overflow {
                            expected: Self::NAME,
                            value: raw.to_string(),
                        }
                    }
                    _ => CoercionError::Parse {
                        expected: Self::NAME,
                        raw: raw.to_string(),
                    },
                })
            }
        }

        scalar_leaf!($ty);
    )*};
}

integer_scalar!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl Scalar for f64 {
    const NAME: &'static str = "f64";

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn from_value(value: &Value) -> Result<Self, CoercionError> {
        match value {
            Value::Float(f) => Ok(*f),
            Value::Integer(i) => Ok(*i as f64),
            Value::String(s) => Self::parse(s),
            other => Err(type_error(Self::NAME, other)),
        }
    }

    fn parse(raw: &str) -> Result<Self, CoercionError> {
        raw.trim().parse().map_err(|_| CoercionError::Parse {
            expected: Self::NAME,
            raw: raw.to_string(),
        })
    }
}

impl Scalar for f32 {
    const NAME: &'static str = "f32";

    fn to_value(&self) -> Value {
        // Widen through the shortest decimal form so 0.1f32 is stored as 0.1.
        let widened = self.to_string().parse::<f64>().unwrap_or(f64::from(*self));
        Value::Float(widened)
    }

    fn from_value(value: &Value) -> Result<Self, CoercionError> {
        let wide = <f64 as Scalar>::from_value(value).map_err(|e| match e {
            CoercionError::Type { found, .. } => CoercionError::Type {
                expected: Self::NAME,
                found,
            },
            CoercionError::Parse { raw, .. } => CoercionError::Parse {
                expected: Self::NAME,
                raw,
            },
            other => other,
        })?;
        narrow(wide)
    }

    fn parse(raw: &str) -> Result<Self, CoercionError> {
        let wide = raw.trim().parse::<f64>().map_err(|_| CoercionError::Parse {
            expected: Self::NAME,
            raw: raw.to_string(),
        })?;
        narrow(wide)
    }
}

fn narrow(wide: f64) -> Result<f32, CoercionError> {
    let narrowed = wide as f32;
    if narrowed.is_infinite() && wide.is_finite() {
        return Err(CoercionError::Overflow {
            expected: "f32",
            value: wide.to_string(),
        });
    }
    Ok(narrowed)
}

impl Scalar for bool {
    const NAME: &'static str = "bool";

    fn to_value(&self) -> Value {
        Value::Boolean(*self)
    }

    fn from_value(value: &Value) -> Result<Self, CoercionError> {
        match value {
            Value::Boolean(b) => Ok(*b),
            Value::String(s) => Self::parse(s),
            other => Err(type_error(Self::NAME, other)),
        }
    }

    fn parse(raw: &str) -> Result<Self, CoercionError> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("true") {
            Ok(true)
        } else if trimmed.eq_ignore_ascii_case("false") {
            Ok(false)
        } else {
            Err(CoercionError::Parse {
                expected: Self::NAME,
                raw: raw.to_string(),
            })
        }
    }
}

impl Scalar for char {
    const NAME: &'static str = "char";

    fn to_value(&self) -> Value {
        if *self == '\0' {
            Value::String(String::new())
        } else {
            Value::String(self.to_string())
        }
    }

    fn from_value(value: &Value) -> Result<Self, CoercionError> {
        match value {
            Value::String(s) => Self::parse(s),
            other => Err(type_error(Self::NAME, other)),
        }
    }

    /// First character of `raw`; the empty string is `'\0'`.
    fn parse(raw: &str) -> Result<Self, CoercionError> {
        Ok(raw.chars().next().unwrap_or('\0'))
    }
}

impl Scalar for String {
    const NAME: &'static str = "string";

    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_value(value: &Value) -> Result<Self, CoercionError> {
        match value {
            Value::String(s) => Ok(s.clone()),
            other => Err(type_error(Self::NAME, other)),
        }
    }

    fn parse(raw: &str) -> Result<Self, CoercionError> {
        Ok(raw.to_string())
    }
}

scalar_leaf!(f32);
scalar_leaf!(f64);
scalar_leaf!(bool);
scalar_leaf!(char);
scalar_leaf!(String);

fn elements<T: Scalar>(value: &Value) -> Result<Vec<T>, CoercionError> {
    let Value::Array(items) = value else {
        return Err(CoercionError::NotSequence {
            found: kind_of(value),
        });
    };
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            T::from_value(item).map_err(|e| CoercionError::Element {
                index,
                source: Box::new(e),
            })
        })
        .collect()
}

fn split_override<T: Scalar>(raw: &str) -> Result<Vec<T>, CoercionError> {
    if raw.trim().is_empty() {
        return Err(CoercionError::Parse {
            expected: T::NAME,
            raw: raw.to_string(),
        });
    }
    raw.split(',').map(|part| T::parse(part.trim())).collect()
}

impl<T: Scalar> Leaf for Vec<T> {
    fn shape() -> LeafShape {
        LeafShape::List(T::NAME)
    }

    fn to_value(&self) -> Option<Value> {
        Some(Value::Array(self.iter().map(Scalar::to_value).collect()))
    }

    fn from_value(value: &Value) -> Result<Self, CoercionError> {
        elements(value)
    }

    fn parse_override(raw: &str) -> Result<Self, CoercionError> {
        split_override(raw)
    }
}

/// Fit a loaded sequence into `N` slots: pad with defaults, truncate extras.
fn fill_array<T: Scalar, const N: usize>(items: Vec<T>) -> [T; N] {
    if items.len() > N {
        warn!(
            expected = N,
            found = items.len(),
            "truncating sequence to fixed array length"
        );
    }
    let mut items = items.into_iter();
    std::array::from_fn(|_| items.next().unwrap_or_default())
}

impl<T: Scalar, const N: usize> Leaf for [T; N] {
    fn shape() -> LeafShape {
        LeafShape::Array(T::NAME, N)
    }

    fn to_value(&self) -> Option<Value> {
        Some(Value::Array(self.iter().map(Scalar::to_value).collect()))
    }

    fn from_value(value: &Value) -> Result<Self, CoercionError> {
        elements(value).map(fill_array)
    }

    fn parse_override(raw: &str) -> Result<Self, CoercionError> {
        split_override(raw).map(fill_array)
    }
}

impl<T: Leaf + Default> Leaf for Option<T> {
    fn shape() -> LeafShape {
        T::shape()
    }

    fn to_value(&self) -> Option<Value> {
        self.as_ref().and_then(Leaf::to_value)
    }

    fn from_value(value: &Value) -> Result<Self, CoercionError> {
        T::from_value(value).map(Some)
    }

    fn parse_override(raw: &str) -> Result<Self, CoercionError> {
        T::parse_override(raw).map(Some)
    }

    fn is_absent(&self) -> bool {
        self.is_none()
    }

    fn fill_default(&mut self) {
        if self.is_none() {
            *self = Some(T::default());
        }
    }
}
