use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bytes the D-Bus address grammar allows without escaping.
const ADDRESS_ESCAPES: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'/')
    .remove(b'.')
    .remove(b'\\')
    .remove(b'*');

/// Declarative description of where the message bus listens.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum BusAddress {
    /// Unix domain socket bound to a filesystem path.
    Unix {
        /// Socket path on disk.
        path: Utf8PathBuf,
    },
    /// Linux abstract-namespace Unix socket.
    Abstract {
        /// Socket name without the leading NUL byte.
        name: String,
    },
}

impl BusAddress {
    /// Builds a filesystem Unix socket address.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// Builds an abstract-namespace Unix socket address.
    #[must_use]
    pub fn abstract_name(name: impl Into<String>) -> Self {
        Self::Abstract { name: name.into() }
    }

    /// Returns the socket path when the address names a filesystem socket.
    #[must_use]
    pub fn unix_path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Unix { path } => Some(path.as_ref()),
            Self::Abstract { .. } => None,
        }
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { path } => write!(
                formatter,
                "unix:path={}",
                utf8_percent_encode(path.as_str(), ADDRESS_ESCAPES)
            ),
            Self::Abstract { name } => write!(
                formatter,
                "unix:abstract={}",
                utf8_percent_encode(name, ADDRESS_ESCAPES)
            ),
        }
    }
}

impl FromStr for BusAddress {
    type Err = AddressParseError;

    /// Parses a D-Bus server address.
    ///
    /// Alternatives separated by `;` are tried in order and the first one
    /// this client can dial wins. Keys other than `path` and `abstract`
    /// (for example `guid`) are accepted and ignored.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut first_unsupported = None;
        for entry in input.split(';').filter(|entry| !entry.is_empty()) {
            match parse_entry(entry) {
                Ok(address) => return Ok(address),
                Err(AddressParseError::UnsupportedTransport(transport)) => {
                    first_unsupported.get_or_insert(transport);
                }
                Err(error) => return Err(error),
            }
        }
        Err(first_unsupported.map_or(
            AddressParseError::Empty,
            AddressParseError::UnsupportedTransport,
        ))
    }
}

fn parse_entry(entry: &str) -> Result<BusAddress, AddressParseError> {
    let Some((transport, pairs)) = entry.split_once(':') else {
        return Err(AddressParseError::MissingTransport(entry.to_owned()));
    };
    if transport != "unix" {
        return Err(AddressParseError::UnsupportedTransport(transport.to_owned()));
    }

    let mut address = None;
    for pair in pairs.split(',').filter(|pair| !pair.is_empty()) {
        let Some((key, raw_value)) = pair.split_once('=') else {
            return Err(AddressParseError::InvalidPair(pair.to_owned()));
        };
        let value = unescape(raw_value)?;
        match key {
            "path" => address = Some(BusAddress::unix(value)),
            "abstract" => address = Some(BusAddress::abstract_name(value)),
            _ => {}
        }
    }

    address.ok_or_else(|| AddressParseError::MissingKey(entry.to_owned()))
}

fn unescape(raw: &str) -> Result<String, AddressParseError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|value| value.into_owned())
        .map_err(|_| AddressParseError::InvalidEscape(raw.to_owned()))
}

/// Errors encountered while parsing a [`BusAddress`] from text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressParseError {
    /// The address string held no entries.
    #[error("bus address is empty")]
    Empty,
    /// An entry lacked the `transport:` prefix.
    #[error("missing transport in bus address entry '{0}'")]
    MissingTransport(String),
    /// No entry used a transport this client can dial.
    #[error("unsupported bus transport '{0}'")]
    UnsupportedTransport(String),
    /// A `unix:` entry named neither `path` nor `abstract`.
    #[error("bus address entry '{0}' names neither path nor abstract socket")]
    MissingKey(String),
    /// A key/value pair had no `=`.
    #[error("malformed key/value pair '{0}' in bus address")]
    InvalidPair(String),
    /// Percent escapes did not decode to UTF-8.
    #[error("invalid escape sequence in bus address value '{0}'")]
    InvalidEscape(String),
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn display_unix_address() {
        let address = BusAddress::unix("/run/user/1000/bus");
        assert_eq!(address.to_string(), "unix:path=/run/user/1000/bus");
    }

    #[test]
    fn display_escapes_reserved_bytes() {
        let address = BusAddress::unix("/tmp/my bus");
        assert_eq!(address.to_string(), "unix:path=/tmp/my%20bus");
    }

    #[rstest]
    #[case("unix:path=/run/user/1000/bus", BusAddress::unix("/run/user/1000/bus"))]
    #[case(
        "unix:path=/tmp/dbus-x,guid=0123456789abcdef",
        BusAddress::unix("/tmp/dbus-x")
    )]
    #[case("unix:abstract=/tmp/dbus-abc", BusAddress::abstract_name("/tmp/dbus-abc"))]
    #[case("tcp:host=localhost,port=1;unix:path=/bus", BusAddress::unix("/bus"))]
    #[case("unix:path=/tmp/my%20bus", BusAddress::unix("/tmp/my bus"))]
    fn parses_supported_addresses(#[case] input: &str, #[case] expected: BusAddress) {
        let parsed: BusAddress = input.parse().expect("address should parse");
        assert_eq!(parsed, expected);
    }

    #[rstest]
    #[case("", AddressParseError::Empty)]
    #[case("tcp:host=localhost,port=1", AddressParseError::UnsupportedTransport("tcp".into()))]
    #[case("unix", AddressParseError::MissingTransport("unix".into()))]
    #[case("unix:guid=abc", AddressParseError::MissingKey("unix:guid=abc".into()))]
    #[case("unix:path", AddressParseError::InvalidPair("path".into()))]
    fn rejects_malformed_addresses(#[case] input: &str, #[case] expected: AddressParseError) {
        let error = input.parse::<BusAddress>().expect_err("address must fail");
        assert_eq!(error, expected);
    }

    #[test]
    fn display_round_trips_through_parse() {
        let address = BusAddress::abstract_name("/tmp/dbus-Q 1");
        let reparsed: BusAddress = address.to_string().parse().expect("reparse");
        assert_eq!(reparsed, address);
    }
}
