use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Output formats for the launcher's diagnostic log on stderr.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One human-readable line per event.
    #[default]
    Compact,
    /// Structured JSON, one object per event.
    Json,
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;
