//! Aligned encoding and decoding of [`Value`]s.
//!
//! Outbound data is always little-endian; inbound data is decoded in
//! whichever byte order the sender declared.

use super::signature::{MAX_ARRAY_DEPTH, MAX_STRUCT_DEPTH, ObjectPath, Signature, Type};
use super::value::{Array, Value};
use crate::error::{DecodingError, EncodingError};

/// Largest array payload the wire format permits.
pub(crate) const MAX_ARRAY_LEN: usize = 64 * 1024 * 1024;

/// Deepest variant nesting accepted while decoding.
const MAX_VARIANT_DEPTH: usize = MAX_ARRAY_DEPTH + MAX_STRUCT_DEPTH;

/// Byte order of a serialized message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endian {
    Little,
    Big,
}

impl Endian {
    pub(crate) const fn code(self) -> u8 {
        match self {
            Self::Little => b'l',
            Self::Big => b'B',
        }
    }

    pub(crate) fn from_code(code: u8) -> Result<Self, DecodingError> {
        match code {
            b'l' => Ok(Self::Little),
            b'B' => Ok(Self::Big),
            other => Err(DecodingError::malformed(format!(
                "unknown byte order marker 0x{other:02x}"
            ))),
        }
    }
}

/// Position of an array length prefix awaiting its final value.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ArrayMark {
    length_at: usize,
    data_start: usize,
}

/// Appends aligned little-endian data to a buffer.
///
/// Alignment is computed from the start of `buf`, which must therefore be
/// the start of the message body or of the whole message.
pub(crate) struct Writer<'a> {
    buf: &'a mut Vec<u8>,
}

#[expect(
    clippy::little_endian_bytes,
    reason = "outbound messages are always marshalled little-endian"
)]
impl<'a> Writer<'a> {
    pub(crate) const fn new(buf: &'a mut Vec<u8>) -> Self {
        Self { buf }
    }

    pub(crate) fn pad(&mut self, alignment: usize) {
        let target = self.buf.len().next_multiple_of(alignment);
        self.buf.resize(target, 0);
    }

    pub(crate) fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn put_u16(&mut self, value: u16) {
        self.pad(2);
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn put_u32(&mut self, value: u32) {
        self.pad(4);
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn put_u64(&mut self, value: u64) {
        self.pad(8);
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn put_string(&mut self, text: &str) -> Result<(), EncodingError> {
        if text.contains('\0') {
            return Err(EncodingError::EmbeddedNul);
        }
        let length = u32::try_from(text.len()).map_err(|_| EncodingError::TooLarge {
            what: "string",
            size: text.len(),
        })?;
        self.put_u32(length);
        self.buf.extend_from_slice(text.as_bytes());
        self.buf.push(0);
        Ok(())
    }

    pub(crate) fn put_signature(&mut self, signature: &str) -> Result<(), EncodingError> {
        let length = u8::try_from(signature.len()).map_err(|_| EncodingError::TooLarge {
            what: "signature",
            size: signature.len(),
        })?;
        self.put_u8(length);
        self.buf.extend_from_slice(signature.as_bytes());
        self.buf.push(0);
        Ok(())
    }

    pub(crate) fn begin_array(&mut self, element: &Type) -> ArrayMark {
        self.pad(4);
        let length_at = self.buf.len();
        self.buf.extend_from_slice(&0_u32.to_le_bytes());
        self.pad(element.alignment());
        ArrayMark {
            length_at,
            data_start: self.buf.len(),
        }
    }

    pub(crate) fn finish_array(&mut self, mark: ArrayMark) -> Result<(), EncodingError> {
        let size = self.buf.len().saturating_sub(mark.data_start);
        let too_large = || EncodingError::TooLarge { what: "array", size };
        if size > MAX_ARRAY_LEN {
            return Err(too_large());
        }
        let length = u32::try_from(size).map_err(|_| too_large())?;
        if let Some(slot) = self.buf.get_mut(mark.length_at..mark.length_at + 4) {
            slot.copy_from_slice(&length.to_le_bytes());
        }
        Ok(())
    }

    pub(crate) fn put_value(&mut self, value: &Value) -> Result<(), EncodingError> {
        match value {
            Value::Byte(byte) => self.put_u8(*byte),
            Value::Boolean(flag) => self.put_u32(u32::from(*flag)),
            Value::Int16(number) => self.put_u16(number.cast_unsigned()),
            Value::UInt16(number) => self.put_u16(*number),
            Value::Int32(number) => self.put_u32(number.cast_unsigned()),
            Value::UInt32(number) | Value::UnixFd(number) => self.put_u32(*number),
            Value::Int64(number) => self.put_u64(number.cast_unsigned()),
            Value::UInt64(number) => self.put_u64(*number),
            Value::String(text) => self.put_string(text)?,
            Value::ObjectPath(path) => self.put_string(path.as_str())?,
            Value::Signature(signature) => self.put_signature(signature.as_str())?,
            Value::Array(array) => self.put_array(array)?,
            Value::Struct(fields) => {
                self.pad(8);
                for field in fields {
                    self.put_value(field)?;
                }
            }
            Value::DictEntry(key, entry) => {
                self.pad(8);
                self.put_value(key)?;
                self.put_value(entry)?;
            }
            Value::Variant(inner) => {
                let signature = Signature::new(inner.value_type().to_string())?;
                self.put_signature(signature.as_str())?;
                self.put_value(inner)?;
            }
        }
        Ok(())
    }

    fn put_array(&mut self, array: &Array) -> Result<(), EncodingError> {
        let mark = self.begin_array(array.element());
        for item in array.items() {
            self.put_value(item)?;
        }
        self.finish_array(mark)
    }
}

/// Reads aligned data in the byte order the sender declared.
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    endian: Endian,
}

#[expect(
    clippy::little_endian_bytes,
    clippy::big_endian_bytes,
    reason = "inbound messages declare their own byte order"
)]
impl<'a> Reader<'a> {
    pub(crate) const fn new(data: &'a [u8], pos: usize, endian: Endian) -> Self {
        Self { data, pos, endian }
    }

    pub(crate) const fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn align(&mut self, alignment: usize) -> Result<(), DecodingError> {
        let target = self.pos.next_multiple_of(alignment);
        if target > self.data.len() {
            return Err(DecodingError::Truncated);
        }
        self.pos = target;
        Ok(())
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], DecodingError> {
        let end = self.pos.checked_add(count).ok_or(DecodingError::Truncated)?;
        let bytes = self.data.get(self.pos..end).ok_or(DecodingError::Truncated)?;
        self.pos = end;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], DecodingError> {
        let bytes = self.take(N)?;
        <[u8; N]>::try_from(bytes).map_err(|_| DecodingError::Truncated)
    }

    pub(crate) fn get_u8(&mut self) -> Result<u8, DecodingError> {
        let [byte] = self.take_array::<1>()?;
        Ok(byte)
    }

    fn get_u16(&mut self) -> Result<u16, DecodingError> {
        self.align(2)?;
        let bytes = self.take_array::<2>()?;
        Ok(match self.endian {
            Endian::Little => u16::from_le_bytes(bytes),
            Endian::Big => u16::from_be_bytes(bytes),
        })
    }

    pub(crate) fn get_u32(&mut self) -> Result<u32, DecodingError> {
        self.align(4)?;
        let bytes = self.take_array::<4>()?;
        Ok(match self.endian {
            Endian::Little => u32::from_le_bytes(bytes),
            Endian::Big => u32::from_be_bytes(bytes),
        })
    }

    fn get_u64(&mut self) -> Result<u64, DecodingError> {
        self.align(8)?;
        let bytes = self.take_array::<8>()?;
        Ok(match self.endian {
            Endian::Little => u64::from_le_bytes(bytes),
            Endian::Big => u64::from_be_bytes(bytes),
        })
    }

    fn get_len(&mut self) -> Result<usize, DecodingError> {
        let length = self.get_u32()?;
        usize::try_from(length).map_err(|_| DecodingError::Truncated)
    }

    fn get_text(&mut self, length: usize) -> Result<String, DecodingError> {
        let bytes = self.take(length)?;
        if self.get_u8()? != 0 {
            return Err(DecodingError::malformed("string is not NUL terminated"));
        }
        if bytes.contains(&0) {
            return Err(DecodingError::malformed("string contains a NUL byte"));
        }
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodingError::InvalidUtf8)
    }

    pub(crate) fn get_string(&mut self) -> Result<String, DecodingError> {
        let length = self.get_len()?;
        self.get_text(length)
    }

    pub(crate) fn get_signature(&mut self) -> Result<String, DecodingError> {
        let length = usize::from(self.get_u8()?);
        self.get_text(length)
    }

    /// Reads an array length prefix and returns the offset the array ends at.
    pub(crate) fn begin_array(&mut self, element: &Type) -> Result<usize, DecodingError> {
        let length = self.get_len()?;
        if length > MAX_ARRAY_LEN {
            return Err(DecodingError::malformed(format!(
                "array of {length} bytes exceeds the size limit"
            )));
        }
        self.align(element.alignment())?;
        let end = self.pos.checked_add(length).ok_or(DecodingError::Truncated)?;
        if end > self.data.len() {
            return Err(DecodingError::Truncated);
        }
        Ok(end)
    }

    pub(crate) fn get_value(&mut self, ty: &Type) -> Result<Value, DecodingError> {
        self.get_nested(ty, 0)
    }

    fn get_nested(&mut self, ty: &Type, variant_depth: usize) -> Result<Value, DecodingError> {
        let value = match ty {
            Type::Byte => Value::Byte(self.get_u8()?),
            Type::Boolean => match self.get_u32()? {
                0 => Value::Boolean(false),
                1 => Value::Boolean(true),
                other => {
                    return Err(DecodingError::malformed(format!(
                        "boolean holds {other}"
                    )));
                }
            },
            Type::Int16 => Value::Int16(self.get_u16()?.cast_signed()),
            Type::UInt16 => Value::UInt16(self.get_u16()?),
            Type::Int32 => Value::Int32(self.get_u32()?.cast_signed()),
            Type::UInt32 => Value::UInt32(self.get_u32()?),
            Type::Int64 => Value::Int64(self.get_u64()?.cast_signed()),
            Type::UInt64 => Value::UInt64(self.get_u64()?),
            Type::UnixFd => Value::UnixFd(self.get_u32()?),
            Type::String => Value::String(self.get_string()?),
            Type::ObjectPath => {
                let text = self.get_string()?;
                let path = ObjectPath::new(text)
                    .map_err(|error| DecodingError::malformed(error.to_string()))?;
                Value::ObjectPath(path)
            }
            Type::Signature => Value::Signature(Signature::new(self.get_signature()?)?),
            Type::Array(element) => {
                let end = self.begin_array(element)?;
                let mut items = Vec::new();
                while self.pos < end {
                    items.push(self.get_nested(element, variant_depth)?);
                }
                if self.pos != end {
                    return Err(DecodingError::malformed(
                        "array contents overrun the declared length",
                    ));
                }
                Value::Array(Array::with_items((**element).clone(), items))
            }
            Type::Struct(fields) => {
                self.align(8)?;
                let mut values = Vec::with_capacity(fields.len());
                for field in fields {
                    values.push(self.get_nested(field, variant_depth)?);
                }
                Value::Struct(values)
            }
            Type::DictEntry(key, entry) => {
                self.align(8)?;
                let key = self.get_nested(key, variant_depth)?;
                let entry = self.get_nested(entry, variant_depth)?;
                Value::DictEntry(Box::new(key), Box::new(entry))
            }
            Type::Variant => {
                if variant_depth >= MAX_VARIANT_DEPTH {
                    return Err(DecodingError::malformed("variants nest too deeply"));
                }
                let inner_type = Type::parse(&self.get_signature()?)?;
                let inner = self.get_nested(&inner_type, variant_depth + 1)?;
                Value::Variant(Box::new(inner))
            }
        };
        Ok(value)
    }
}
