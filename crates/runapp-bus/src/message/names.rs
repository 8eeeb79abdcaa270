//! Validation of bus, interface, member and error names.

use crate::error::EncodingError;

const MAX_NAME_LEN: usize = 255;

fn invalid(kind: &'static str, value: &str) -> EncodingError {
    EncodingError::InvalidName {
        kind,
        value: value.to_owned(),
    }
}

fn is_element(element: &str, allow_hyphen: bool, allow_leading_digit: bool) -> bool {
    let mut bytes = element.bytes();
    let Some(first) = bytes.next() else {
        return false;
    };
    let valid = |byte: u8| byte.is_ascii_alphanumeric() || byte == b'_' || (allow_hyphen && byte == b'-');
    valid(first) && (allow_leading_digit || !first.is_ascii_digit()) && bytes.all(valid)
}

pub(crate) fn member(name: &str) -> Result<String, EncodingError> {
    if name.len() <= MAX_NAME_LEN && is_element(name, false, false) {
        Ok(name.to_owned())
    } else {
        Err(invalid("member name", name))
    }
}

pub(crate) fn interface(name: &str) -> Result<String, EncodingError> {
    let mut elements = 0_usize;
    let valid = name.len() <= MAX_NAME_LEN
        && name.split('.').all(|element| {
            elements += 1;
            is_element(element, false, false)
        });
    if valid && elements >= 2 {
        Ok(name.to_owned())
    } else {
        Err(invalid("interface name", name))
    }
}

pub(crate) fn bus_name(name: &str) -> Result<String, EncodingError> {
    let (body, unique) = match name.strip_prefix(':') {
        Some(rest) => (rest, true),
        None => (name, false),
    };
    let mut elements = 0_usize;
    let valid = name.len() <= MAX_NAME_LEN
        && body.split('.').all(|element| {
            elements += 1;
            is_element(element, true, unique)
        });
    if valid && elements >= 2 {
        Ok(name.to_owned())
    } else {
        Err(invalid("bus name", name))
    }
}
