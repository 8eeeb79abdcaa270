//! Message framing: the fixed header, header fields, and frame length.

use super::MessageKind;
use super::marshal::{Endian, Reader, Writer};
use super::signature::{ObjectPath, Signature, Type};
use super::value::{Array, Value};
use crate::error::{DecodingError, EncodingError};

/// Largest whole message the wire format permits.
pub const MAX_MESSAGE_LEN: usize = 128 * 1024 * 1024;

/// Length of the fixed part of every header, up to the field array length.
pub(crate) const FIXED_HEADER_LEN: usize = 16;

const PROTOCOL_VERSION: u8 = 1;

const FIELD_PATH: u8 = 1;
const FIELD_INTERFACE: u8 = 2;
const FIELD_MEMBER: u8 = 3;
const FIELD_ERROR_NAME: u8 = 4;
const FIELD_REPLY_SERIAL: u8 = 5;
const FIELD_DESTINATION: u8 = 6;
const FIELD_SENDER: u8 = 7;
const FIELD_SIGNATURE: u8 = 8;
const FIELD_UNIX_FDS: u8 = 9;

/// Optional routing fields carried in a message header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct HeaderFields {
    pub(crate) path: Option<ObjectPath>,
    pub(crate) interface: Option<String>,
    pub(crate) member: Option<String>,
    pub(crate) error_name: Option<String>,
    pub(crate) reply_serial: Option<u32>,
    pub(crate) destination: Option<String>,
    pub(crate) sender: Option<String>,
    pub(crate) unix_fds: Option<u32>,
}

/// Everything recovered from one inbound frame.
#[derive(Debug)]
pub(crate) struct DecodedFrame {
    pub(crate) endian: Endian,
    pub(crate) kind: MessageKind,
    pub(crate) flags: u8,
    pub(crate) serial: u32,
    pub(crate) fields: HeaderFields,
    pub(crate) signature: String,
    pub(crate) body: Vec<u8>,
}

/// Outbound message parts ready for framing.
pub(crate) struct FrameParts<'a> {
    pub(crate) kind: MessageKind,
    pub(crate) flags: u8,
    pub(crate) serial: u32,
    pub(crate) fields: &'a HeaderFields,
    pub(crate) signature: &'a str,
    pub(crate) body: &'a [u8],
}

fn field_entry_type() -> Type {
    Type::Struct(vec![Type::Byte, Type::Variant])
}

fn field(code: u8, value: Value) -> Value {
    Value::Struct(vec![Value::Byte(code), Value::variant(value)])
}

fn encode_fields(fields: &HeaderFields, signature: &str) -> Result<Array, EncodingError> {
    let mut entries = Vec::new();
    if let Some(path) = &fields.path {
        entries.push(field(FIELD_PATH, Value::ObjectPath(path.clone())));
    }
    let strings = [
        (FIELD_INTERFACE, &fields.interface),
        (FIELD_MEMBER, &fields.member),
        (FIELD_ERROR_NAME, &fields.error_name),
        (FIELD_DESTINATION, &fields.destination),
        (FIELD_SENDER, &fields.sender),
    ];
    for (code, field_value) in strings {
        if let Some(text) = field_value {
            entries.push(field(code, Value::from(text)));
        }
    }
    if let Some(serial) = fields.reply_serial {
        entries.push(field(FIELD_REPLY_SERIAL, Value::UInt32(serial)));
    }
    if !signature.is_empty() {
        entries.push(field(FIELD_SIGNATURE, Value::Signature(Signature::new(signature)?)));
    }
    if let Some(count) = fields.unix_fds {
        entries.push(field(FIELD_UNIX_FDS, Value::UInt32(count)));
    }
    Ok(Array::with_items(field_entry_type(), entries))
}

/// Serializes a complete little-endian frame.
pub(crate) fn encode(parts: &FrameParts<'_>) -> Result<Vec<u8>, EncodingError> {
    let body_len = u32::try_from(parts.body.len()).map_err(|_| EncodingError::TooLarge {
        what: "message body",
        size: parts.body.len(),
    })?;
    let mut frame = Vec::with_capacity(FIXED_HEADER_LEN + 64 + parts.body.len());
    let mut writer = Writer::new(&mut frame);
    writer.put_u8(Endian::Little.code());
    writer.put_u8(parts.kind.code());
    writer.put_u8(parts.flags);
    writer.put_u8(PROTOCOL_VERSION);
    writer.put_u32(body_len);
    writer.put_u32(parts.serial);
    writer.put_value(&Value::Array(encode_fields(parts.fields, parts.signature)?))?;
    writer.pad(8);
    frame.extend_from_slice(parts.body);
    if frame.len() > MAX_MESSAGE_LEN {
        return Err(EncodingError::TooLarge {
            what: "message",
            size: frame.len(),
        });
    }
    Ok(frame)
}

/// Determines the total length of the frame that starts `prefix`.
///
/// Returns `Ok(None)` until the fixed header is complete.
///
/// # Errors
///
/// Returns a [`DecodingError`] when the fixed header is invalid or declares a
/// message larger than [`MAX_MESSAGE_LEN`].
pub fn frame_length(prefix: &[u8]) -> Result<Option<usize>, DecodingError> {
    let Some(fixed) = prefix.get(..FIXED_HEADER_LEN) else {
        return Ok(None);
    };
    let endian = Endian::from_code(fixed.first().copied().unwrap_or_default())?;
    let mut reader = Reader::new(fixed, 4, endian);
    let body_len = u64::from(reader.get_u32()?);
    reader.get_u32()?;
    let fields_len = u64::from(reader.get_u32()?);
    let header_len = (fields_len + 16).next_multiple_of(8);
    let total = header_len + body_len;
    match usize::try_from(total) {
        Ok(len) if len <= MAX_MESSAGE_LEN => Ok(Some(len)),
        _ => Err(DecodingError::malformed(format!(
            "message of {total} bytes exceeds the size limit"
        ))),
    }
}

/// Parses one complete frame.
pub(crate) fn decode(frame: &[u8]) -> Result<DecodedFrame, DecodingError> {
    let Some(total) = frame_length(frame)? else {
        return Err(DecodingError::Truncated);
    };
    if total != frame.len() {
        return Err(DecodingError::malformed(format!(
            "frame holds {} bytes but its header declares {total}",
            frame.len()
        )));
    }
    let endian = Endian::from_code(frame.first().copied().unwrap_or_default())?;
    let mut reader = Reader::new(frame, 1, endian);
    let kind_code = reader.get_u8()?;
    let kind = MessageKind::from_code(kind_code).ok_or_else(|| {
        DecodingError::malformed(format!("unknown message type {kind_code}"))
    })?;
    let flags = reader.get_u8()?;
    let version = reader.get_u8()?;
    if version != PROTOCOL_VERSION {
        return Err(DecodingError::malformed(format!(
            "unsupported protocol version {version}"
        )));
    }
    reader.get_u32()?;
    let serial = reader.get_u32()?;
    if serial == 0 {
        return Err(DecodingError::malformed("message serial is zero"));
    }
    let entries = reader.get_value(&Type::Array(Box::new(field_entry_type())))?;
    reader.align(8)?;
    let body = frame.get(reader.position()..).unwrap_or_default().to_vec();

    let (fields, signature) = decode_fields(entries)?;
    check_required(kind, &fields)?;
    Ok(DecodedFrame {
        endian,
        kind,
        flags,
        serial,
        fields,
        signature,
        body,
    })
}

fn decode_fields(raw: Value) -> Result<(HeaderFields, String), DecodingError> {
    let Value::Array(entries) = raw else {
        return Err(DecodingError::malformed("header fields are not an array"));
    };
    let mut fields = HeaderFields::default();
    let mut signature = String::new();
    for entry in entries.into_items() {
        let Value::Struct(parts) = entry else {
            return Err(DecodingError::malformed("header field is not a struct"));
        };
        let [Value::Byte(code), Value::Variant(value)] = <[Value; 2]>::try_from(parts)
            .map_err(|_| DecodingError::malformed("header field is not a (yv) pair"))?
        else {
            return Err(DecodingError::malformed("header field is not a (yv) pair"));
        };
        match (code, *value) {
            (FIELD_PATH, Value::ObjectPath(path)) => fields.path = Some(path),
            (FIELD_INTERFACE, Value::String(text)) => fields.interface = Some(text),
            (FIELD_MEMBER, Value::String(text)) => fields.member = Some(text),
            (FIELD_ERROR_NAME, Value::String(text)) => fields.error_name = Some(text),
            (FIELD_REPLY_SERIAL, Value::UInt32(serial)) => fields.reply_serial = Some(serial),
            (FIELD_DESTINATION, Value::String(text)) => fields.destination = Some(text),
            (FIELD_SENDER, Value::String(text)) => fields.sender = Some(text),
            (FIELD_SIGNATURE, Value::Signature(text)) => signature = text.as_str().to_owned(),
            (FIELD_UNIX_FDS, Value::UInt32(count)) => fields.unix_fds = Some(count),
            (FIELD_PATH..=FIELD_UNIX_FDS, other) => {
                return Err(DecodingError::malformed(format!(
                    "header field {code} has unexpected type '{}'",
                    other.value_type()
                )));
            }
            _ => {}
        }
    }
    Ok((fields, signature))
}

fn check_required(kind: MessageKind, fields: &HeaderFields) -> Result<(), DecodingError> {
    let missing = match kind {
        MessageKind::MethodCall if fields.path.is_none() => Some("path"),
        MessageKind::MethodCall | MessageKind::Signal if fields.member.is_none() => {
            Some("member")
        }
        MessageKind::Signal if fields.path.is_none() => Some("path"),
        MessageKind::Signal if fields.interface.is_none() => Some("interface"),
        MessageKind::Error if fields.error_name.is_none() => Some("error name"),
        MessageKind::MethodReturn | MessageKind::Error if fields.reply_serial.is_none() => {
            Some("reply serial")
        }
        _ => None,
    };
    match missing {
        Some(field) => Err(DecodingError::malformed(format!(
            "{kind} is missing its {field} header field"
        ))),
        None => Ok(()),
    }
}
