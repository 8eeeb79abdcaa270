//! Dynamically typed values carried in message bodies.

use super::signature::{ObjectPath, Signature, Type};
use crate::error::DecodingError;

/// One value matching a complete [`Type`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `y`
    Byte(u8),
    /// `b`
    Boolean(bool),
    /// `n`
    Int16(i16),
    /// `q`
    UInt16(u16),
    /// `i`
    Int32(i32),
    /// `u`
    UInt32(u32),
    /// `x`
    Int64(i64),
    /// `t`
    UInt64(u64),
    /// `s`
    String(String),
    /// `o`
    ObjectPath(ObjectPath),
    /// `g`
    Signature(Signature),
    /// `h`
    UnixFd(u32),
    /// `a..`
    Array(Array),
    /// `(..)`
    Struct(Vec<Value>),
    /// `{..}`
    DictEntry(Box<Value>, Box<Value>),
    /// `v`
    Variant(Box<Value>),
}

impl Value {
    /// Boxes `inner` in a variant.
    #[must_use]
    pub fn variant(inner: impl Into<Self>) -> Self {
        Self::Variant(Box::new(inner.into()))
    }

    /// Builds a dict entry from a key and a value.
    #[must_use]
    pub fn dict_entry(key: impl Into<Self>, value: impl Into<Self>) -> Self {
        Self::DictEntry(Box::new(key.into()), Box::new(value.into()))
    }

    /// Returns the complete type this value carries.
    #[must_use]
    pub fn value_type(&self) -> Type {
        match self {
            Self::Byte(_) => Type::Byte,
            Self::Boolean(_) => Type::Boolean,
            Self::Int16(_) => Type::Int16,
            Self::UInt16(_) => Type::UInt16,
            Self::Int32(_) => Type::Int32,
            Self::UInt32(_) => Type::UInt32,
            Self::Int64(_) => Type::Int64,
            Self::UInt64(_) => Type::UInt64,
            Self::String(_) => Type::String,
            Self::ObjectPath(_) => Type::ObjectPath,
            Self::Signature(_) => Type::Signature,
            Self::UnixFd(_) => Type::UnixFd,
            Self::Array(array) => Type::Array(Box::new(array.element.clone())),
            Self::Struct(fields) => Type::Struct(fields.iter().map(Self::value_type).collect()),
            Self::DictEntry(key, value) => {
                Type::DictEntry(Box::new(key.value_type()), Box::new(value.value_type()))
            }
            Self::Variant(_) => Type::Variant,
        }
    }

    /// Returns `true` when the value, recursively, has exactly type `ty`.
    #[must_use]
    pub fn conforms_to(&self, ty: &Type) -> bool {
        match (self, ty) {
            (Self::Array(array), Type::Array(element)) => {
                array.element == **element && array.items.iter().all(|item| item.conforms_to(element))
            }
            (Self::Struct(fields), Type::Struct(types)) => {
                fields.len() == types.len()
                    && fields.iter().zip(types).all(|(field, field_type)| field.conforms_to(field_type))
            }
            (Self::DictEntry(key, value), Type::DictEntry(key_type, value_type)) => {
                key.conforms_to(key_type) && value.conforms_to(value_type)
            }
            (Self::Variant(inner), Type::Variant) => {
                let inner_type = inner.value_type();
                !inner_type.is_dict_entry() && inner.conforms_to(&inner_type)
            }
            (Self::Array(_) | Self::Struct(_) | Self::DictEntry(..) | Self::Variant(_), _) => false,
            (scalar, _) => scalar.value_type() == *ty,
        }
    }

    /// Returns the string payload of an `s` value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the payload of an `o` value.
    #[must_use]
    pub const fn as_object_path(&self) -> Option<&ObjectPath> {
        match self {
            Self::ObjectPath(path) => Some(path),
            _ => None,
        }
    }

    /// Returns the payload of a `u` value.
    #[must_use]
    pub const fn as_u32(&self) -> Option<u32> {
        match self {
            Self::UInt32(number) => Some(*number),
            _ => None,
        }
    }

    /// Returns the boxed value of a variant.
    #[must_use]
    pub fn as_variant(&self) -> Option<&Self> {
        match self {
            Self::Variant(inner) => Some(inner),
            _ => None,
        }
    }
}

/// Array value together with its element type, so empty arrays stay typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Array {
    element: Type,
    items: Vec<Value>,
}

impl Array {
    /// Creates an empty array of `element`.
    #[must_use]
    pub const fn new(element: Type) -> Self {
        Self {
            element,
            items: Vec::new(),
        }
    }

    /// Creates an array of `element` holding `items`.
    ///
    /// Items are checked against `element` when the array is appended to a
    /// message, not here.
    #[must_use]
    pub const fn with_items(element: Type, items: Vec<Value>) -> Self {
        Self { element, items }
    }

    /// Adds an item.
    pub fn push(&mut self, item: impl Into<Value>) {
        self.items.push(item.into());
    }

    /// Returns the element type.
    #[must_use]
    pub const fn element(&self) -> &Type {
        &self.element
    }

    /// Returns the items.
    #[must_use]
    pub fn items(&self) -> &[Value] {
        &self.items
    }

    /// Consumes the array and returns its items.
    #[must_use]
    pub fn into_items(self) -> Vec<Value> {
        self.items
    }

    /// Returns the number of items.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` when the array has no items.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

macro_rules! scalar_conversions {
    ($($rust:ty => $variant:ident, $code:literal;)*) => {
        $(
            impl From<$rust> for Value {
                fn from(value: $rust) -> Self {
                    Self::$variant(value)
                }
            }

            impl TryFrom<Value> for $rust {
                type Error = DecodingError;

                fn try_from(value: Value) -> Result<Self, Self::Error> {
                    match value {
                        Value::$variant(inner) => Ok(inner),
                        other => Err(DecodingError::TypeMismatch {
                            expected: $code.to_owned(),
                            found: other.value_type().to_string(),
                        }),
                    }
                }
            }
        )*
    };
}

scalar_conversions! {
    u8 => Byte, "y";
    bool => Boolean, "b";
    i16 => Int16, "n";
    u16 => UInt16, "q";
    i32 => Int32, "i";
    u32 => UInt32, "u";
    i64 => Int64, "x";
    u64 => UInt64, "t";
    String => String, "s";
    ObjectPath => ObjectPath, "o";
    Signature => Signature, "g";
    Array => Array, "a";
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Self::String(value.clone())
    }
}

impl From<Vec<Self>> for Value {
    fn from(fields: Vec<Self>) -> Self {
        Self::Struct(fields)
    }
}
