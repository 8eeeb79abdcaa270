//! Type signatures and the object-path/signature string newtypes.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Longest signature the wire format can carry.
pub const MAX_SIGNATURE_LEN: usize = 255;
/// Deepest permitted array nesting inside one signature.
pub const MAX_ARRAY_DEPTH: usize = 32;
/// Deepest permitted struct and dict-entry nesting inside one signature.
pub const MAX_STRUCT_DEPTH: usize = 32;

/// Kind of container a message cursor can open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// Homogeneous sequence, type code `a`.
    Array,
    /// Fixed tuple, type code `r`.
    Struct,
    /// Self-describing boxed value, type code `v`.
    Variant,
    /// Key/value pair inside an array, type code `e`.
    DictEntry,
}

impl ContainerKind {
    /// Returns the single-character type code used to name the container.
    #[must_use]
    pub const fn code(self) -> char {
        match self {
            Self::Array => 'a',
            Self::Struct => 'r',
            Self::Variant => 'v',
            Self::DictEntry => 'e',
        }
    }

    /// Builds the complete type of a container holding `contents`.
    ///
    /// # Errors
    ///
    /// Returns a [`SignatureError`] when `contents` cannot live in this kind
    /// of container: arrays and variants take exactly one type, dict entries
    /// take a basic key and a value, and structs take at least one field.
    pub fn container_type(self, contents: &[Type]) -> Result<Type, SignatureError> {
        match self {
            Self::Array => match contents {
                [element] => Ok(Type::Array(Box::new(element.clone()))),
                _ => Err(SignatureError::NotSingleType(join_types(contents))),
            },
            Self::Variant => match contents {
                [inner] if !inner.is_dict_entry() => Ok(Type::Variant),
                _ => Err(SignatureError::NotSingleType(join_types(contents))),
            },
            Self::Struct => {
                if contents.is_empty() {
                    return Err(SignatureError::EmptyStruct);
                }
                reject_bare_dict_entries(contents)?;
                Ok(Type::Struct(contents.to_vec()))
            }
            Self::DictEntry => match contents {
                [key, value] if key.is_basic() => {
                    reject_bare_dict_entries(contents)?;
                    Ok(Type::DictEntry(Box::new(key.clone()), Box::new(value.clone())))
                }
                [_, _] => Err(SignatureError::NonBasicDictKey),
                _ => Err(SignatureError::DictEntryArity),
            },
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Array => "array",
            Self::Struct => "struct",
            Self::Variant => "variant",
            Self::DictEntry => "dict entry",
        };
        formatter.write_str(name)
    }
}

impl TryFrom<char> for ContainerKind {
    type Error = SignatureError;

    fn try_from(code: char) -> Result<Self, Self::Error> {
        match code {
            'a' => Ok(Self::Array),
            'r' | '(' => Ok(Self::Struct),
            'v' => Ok(Self::Variant),
            'e' | '{' => Ok(Self::DictEntry),
            other => Err(SignatureError::UnknownContainer(other)),
        }
    }
}

fn reject_bare_dict_entries(types: &[Type]) -> Result<(), SignatureError> {
    if types.iter().any(Type::is_dict_entry) {
        return Err(SignatureError::DictEntryOutsideArray);
    }
    Ok(())
}

fn join_types(types: &[Type]) -> String {
    types.iter().map(ToString::to_string).collect()
}

/// One complete type from the signature alphabet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// `y`
    Byte,
    /// `b`
    Boolean,
    /// `n`
    Int16,
    /// `q`
    UInt16,
    /// `i`
    Int32,
    /// `u`
    UInt32,
    /// `x`
    Int64,
    /// `t`
    UInt64,
    /// `s`
    String,
    /// `o`
    ObjectPath,
    /// `g`
    Signature,
    /// `h`, an index into the out-of-band descriptor table.
    UnixFd,
    /// `v`
    Variant,
    /// `a` followed by the element type.
    Array(Box<Type>),
    /// `(` fields `)`
    Struct(Vec<Type>),
    /// `{` key value `}`, only valid as an array element.
    DictEntry(Box<Type>, Box<Type>),
}

impl Type {
    /// Parses a signature holding exactly one complete type.
    ///
    /// # Errors
    ///
    /// Returns a [`SignatureError`] when the text is not exactly one valid
    /// complete type.
    pub fn parse(signature: &str) -> Result<Self, SignatureError> {
        let mut types = Self::parse_many(signature)?;
        match types.pop() {
            Some(single) if types.is_empty() => Ok(single),
            _ => Err(SignatureError::NotSingleType(signature.to_owned())),
        }
    }

    /// Parses a signature holding any number of complete types.
    ///
    /// # Errors
    ///
    /// Returns a [`SignatureError`] when the text is too long, uses an
    /// unknown code, nests too deeply, or leaves a container unterminated.
    pub fn parse_many(signature: &str) -> Result<Vec<Self>, SignatureError> {
        Parser::new(signature, false).parse_all()
    }

    /// Parses a signature fragment naming the next slots of an open container.
    ///
    /// Unlike [`Type::parse_many`] a bare dict entry is accepted, since the
    /// element slot of an `a{..}` array is exactly that.
    pub(crate) fn parse_fragment(signature: &str) -> Result<Vec<Self>, SignatureError> {
        Parser::new(signature, true).parse_all()
    }

    /// Returns `true` for the fixed-size and string-like types usable as dict keys.
    #[must_use]
    pub const fn is_basic(&self) -> bool {
        !matches!(
            self,
            Self::Variant | Self::Array(_) | Self::Struct(_) | Self::DictEntry(..)
        )
    }

    /// Returns `true` when the type is a dict entry.
    #[must_use]
    pub const fn is_dict_entry(&self) -> bool {
        matches!(self, Self::DictEntry(..))
    }

    /// Byte boundary at which values of this type start on the wire.
    #[must_use]
    pub const fn alignment(&self) -> usize {
        match self {
            Self::Byte | Self::Signature | Self::Variant => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Boolean
            | Self::Int32
            | Self::UInt32
            | Self::UnixFd
            | Self::String
            | Self::ObjectPath
            | Self::Array(_) => 4,
            Self::Int64 | Self::UInt64 | Self::Struct(_) | Self::DictEntry(..) => 8,
        }
    }

    /// Returns the container kind when the type is a container.
    #[must_use]
    pub const fn container_kind(&self) -> Option<ContainerKind> {
        match self {
            Self::Array(_) => Some(ContainerKind::Array),
            Self::Struct(_) => Some(ContainerKind::Struct),
            Self::Variant => Some(ContainerKind::Variant),
            Self::DictEntry(..) => Some(ContainerKind::DictEntry),
            _ => None,
        }
    }

    pub(crate) fn write_signature(&self, out: &mut String) {
        match self {
            Self::Array(element) => {
                out.push('a');
                element.write_signature(out);
            }
            Self::Struct(fields) => {
                out.push('(');
                for field in fields {
                    field.write_signature(out);
                }
                out.push(')');
            }
            Self::DictEntry(key, value) => {
                out.push('{');
                key.write_signature(out);
                value.write_signature(out);
                out.push('}');
            }
            basic => out.push(basic.code()),
        }
    }

    const fn code(&self) -> char {
        match self {
            Self::Byte => 'y',
            Self::Boolean => 'b',
            Self::Int16 => 'n',
            Self::UInt16 => 'q',
            Self::Int32 => 'i',
            Self::UInt32 => 'u',
            Self::Int64 => 'x',
            Self::UInt64 => 't',
            Self::String => 's',
            Self::ObjectPath => 'o',
            Self::Signature => 'g',
            Self::UnixFd => 'h',
            Self::Variant => 'v',
            Self::Array(_) => 'a',
            Self::Struct(_) => 'r',
            Self::DictEntry(..) => 'e',
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut text = String::new();
        self.write_signature(&mut text);
        formatter.write_str(&text)
    }
}

impl FromStr for Type {
    type Err = SignatureError;

    fn from_str(signature: &str) -> Result<Self, Self::Err> {
        Self::parse(signature)
    }
}

struct Parser<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
    array_depth: usize,
    struct_depth: usize,
    allow_bare_dict_entry: bool,
}

impl<'a> Parser<'a> {
    const fn new(text: &'a str, allow_bare_dict_entry: bool) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            pos: 0,
            array_depth: 0,
            struct_depth: 0,
            allow_bare_dict_entry,
        }
    }

    fn parse_all(mut self) -> Result<Vec<Type>, SignatureError> {
        if self.bytes.len() > MAX_SIGNATURE_LEN {
            return Err(SignatureError::TooLong(self.bytes.len()));
        }
        let mut types = Vec::new();
        while self.pos < self.bytes.len() {
            let allow = self.allow_bare_dict_entry;
            types.push(self.parse_complete(allow)?);
        }
        Ok(types)
    }

    fn next_byte(&mut self) -> Result<u8, SignatureError> {
        let byte = self
            .bytes
            .get(self.pos)
            .copied()
            .ok_or_else(|| SignatureError::Incomplete(self.text.to_owned()))?;
        self.pos += 1;
        Ok(byte)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn parse_complete(&mut self, dict_entry_allowed: bool) -> Result<Type, SignatureError> {
        let code = self.next_byte()?;
        let parsed = match code {
            b'y' => Type::Byte,
            b'b' => Type::Boolean,
            b'n' => Type::Int16,
            b'q' => Type::UInt16,
            b'i' => Type::Int32,
            b'u' => Type::UInt32,
            b'x' => Type::Int64,
            b't' => Type::UInt64,
            b's' => Type::String,
            b'o' => Type::ObjectPath,
            b'g' => Type::Signature,
            b'h' => Type::UnixFd,
            b'v' => Type::Variant,
            b'a' => self.parse_array()?,
            b'(' => self.parse_struct()?,
            b'{' if dict_entry_allowed => self.parse_dict_entry()?,
            b'{' => return Err(SignatureError::DictEntryOutsideArray),
            other => return Err(SignatureError::UnknownCode(char::from(other))),
        };
        Ok(parsed)
    }

    fn parse_array(&mut self) -> Result<Type, SignatureError> {
        self.array_depth += 1;
        if self.array_depth > MAX_ARRAY_DEPTH {
            return Err(SignatureError::TooDeep(self.text.to_owned()));
        }
        let element = self.parse_complete(true)?;
        self.array_depth -= 1;
        Ok(Type::Array(Box::new(element)))
    }

    fn parse_struct(&mut self) -> Result<Type, SignatureError> {
        self.enter_struct()?;
        let mut fields = Vec::new();
        loop {
            match self.peek() {
                Some(b')') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => fields.push(self.parse_complete(false)?),
                None => return Err(SignatureError::Incomplete(self.text.to_owned())),
            }
        }
        if fields.is_empty() {
            return Err(SignatureError::EmptyStruct);
        }
        self.struct_depth -= 1;
        Ok(Type::Struct(fields))
    }

    fn parse_dict_entry(&mut self) -> Result<Type, SignatureError> {
        self.enter_struct()?;
        let key = self.parse_complete(false)?;
        if !key.is_basic() {
            return Err(SignatureError::NonBasicDictKey);
        }
        let value = self.parse_complete(false)?;
        if self.next_byte()? != b'}' {
            return Err(SignatureError::DictEntryArity);
        }
        self.struct_depth -= 1;
        Ok(Type::DictEntry(Box::new(key), Box::new(value)))
    }

    fn enter_struct(&mut self) -> Result<(), SignatureError> {
        self.struct_depth += 1;
        if self.struct_depth > MAX_STRUCT_DEPTH {
            return Err(SignatureError::TooDeep(self.text.to_owned()));
        }
        Ok(())
    }
}

/// Reasons a signature string is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// The signature exceeds [`MAX_SIGNATURE_LEN`] bytes.
    #[error("signature of {0} bytes exceeds the 255 byte limit")]
    TooLong(usize),
    /// The signature ends inside a container.
    #[error("signature '{0}' ends before its last type is complete")]
    Incomplete(String),
    /// A character outside the type alphabet was found.
    #[error("unknown type code '{0}'")]
    UnknownCode(char),
    /// A container kind code outside `a`, `r`, `v`, `e` was requested.
    #[error("unknown container code '{0}'")]
    UnknownContainer(char),
    /// A struct had no fields.
    #[error("structs must have at least one field")]
    EmptyStruct,
    /// Array or struct nesting exceeds 32 levels.
    #[error("signature '{0}' nests containers too deeply")]
    TooDeep(String),
    /// A dict entry appeared somewhere other than as an array element.
    #[error("dict entries may only appear as array elements")]
    DictEntryOutsideArray,
    /// A dict entry key was a container or variant.
    #[error("dict entry keys must be basic types")]
    NonBasicDictKey,
    /// A dict entry did not hold exactly a key and a value.
    #[error("dict entries must hold exactly one key and one value")]
    DictEntryArity,
    /// Exactly one complete type was required.
    #[error("'{0}' is not a single complete type")]
    NotSingleType(String),
}

/// Validated wire signature string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Signature(String);

impl Signature {
    /// Validates and wraps a signature string.
    ///
    /// # Errors
    ///
    /// Returns a [`SignatureError`] when the text is not a valid signature.
    pub fn new(text: impl Into<String>) -> Result<Self, SignatureError> {
        let signature = text.into();
        Type::parse_many(&signature)?;
        Ok(Self(signature))
    }

    /// Builds the signature describing `types` in order.
    #[must_use]
    pub fn from_types(types: &[Type]) -> Self {
        let mut text = String::new();
        for ty in types {
            ty.write_signature(&mut text);
        }
        Self(text)
    }

    /// Returns the signature text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the complete types the signature lists.
    #[must_use]
    pub fn types(&self) -> Vec<Type> {
        Type::parse_many(&self.0).unwrap_or_default()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl FromStr for Signature {
    type Err = SignatureError;

    fn from_str(signature: &str) -> Result<Self, Self::Err> {
        Self::new(signature)
    }
}

impl TryFrom<&str> for Signature {
    type Error = SignatureError;

    fn try_from(signature: &str) -> Result<Self, Self::Error> {
        Self::new(signature)
    }
}

/// Validated object path such as `/org/freedesktop/systemd1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectPath(String);

impl ObjectPath {
    /// Validates and wraps an object path.
    ///
    /// A path is `/` or a sequence of non-empty `/`-prefixed elements drawn
    /// from `[A-Za-z0-9_]`, without a trailing slash.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectPathError`] when the text breaks those rules.
    pub fn new(text: impl Into<String>) -> Result<Self, ObjectPathError> {
        let path = text.into();
        if is_valid_object_path(&path) {
            Ok(Self(path))
        } else {
            Err(ObjectPathError(path))
        }
    }

    /// Returns the path text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_valid_object_path(path: &str) -> bool {
    let Some(rest) = path.strip_prefix('/') else {
        return false;
    };
    if rest.is_empty() {
        return true;
    }
    rest.split('/').all(|element| {
        !element.is_empty()
            && element
                .bytes()
                .all(|byte| byte.is_ascii_alphanumeric() || byte == b'_')
    })
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl FromStr for ObjectPath {
    type Err = ObjectPathError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        Self::new(path)
    }
}

impl TryFrom<&str> for ObjectPath {
    type Error = ObjectPathError;

    fn try_from(path: &str) -> Result<Self, Self::Error> {
        Self::new(path)
    }
}

/// The text is not a valid object path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid object path '{0}'")]
pub struct ObjectPathError(pub String);
