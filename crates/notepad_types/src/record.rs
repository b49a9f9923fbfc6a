//! Record types and kinds
//!
//! A definition names an EPICS-style record type (`ai`, `bo`, `waveform`, ...).
//! The serving layer only hosts output-capable records, so input flavors are
//! normalized onto their output equivalent before a variable is built.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::StorageType;

/// Error returned when a record type string is not recognized
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown record type: {0:?}")]
pub struct RecordKindError(pub String);

/// Record type as it appears in the configuration source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Ai,
    Ao,
    Bi,
    Bo,
    Longin,
    Longout,
    Mbbi,
    Mbbo,
    Stringin,
    Stringout,
    Waveform,
}

impl RecordType {
    /// Every record type, in declaration order
    pub const ALL: [RecordType; 11] = [
        RecordType::Ai,
        RecordType::Ao,
        RecordType::Bi,
        RecordType::Bo,
        RecordType::Longin,
        RecordType::Longout,
        RecordType::Mbbi,
        RecordType::Mbbo,
        RecordType::Stringin,
        RecordType::Stringout,
        RecordType::Waveform,
    ];

    /// Map a record type onto the one the server actually hosts.
    ///
    /// Note that strings go the other way: `stringout` becomes `stringin`.
    pub fn normalized(self) -> Self {
        match self {
            RecordType::Ai | RecordType::Ao => RecordType::Ao,
            RecordType::Bi | RecordType::Bo => RecordType::Bo,
            RecordType::Longin | RecordType::Longout => RecordType::Longout,
            RecordType::Mbbi | RecordType::Mbbo => RecordType::Mbbo,
            RecordType::Stringin | RecordType::Stringout => RecordType::Stringin,
            RecordType::Waveform => RecordType::Waveform,
        }
    }

    /// The data kind this record holds
    pub fn kind(self) -> RecordKind {
        match self {
            RecordType::Ai | RecordType::Ao => RecordKind::Analog,
            RecordType::Bi | RecordType::Bo => RecordKind::Binary,
            RecordType::Longin | RecordType::Longout => RecordKind::Integer,
            RecordType::Mbbi | RecordType::Mbbo => RecordKind::Enum,
            RecordType::Stringin | RecordType::Stringout => RecordKind::String,
            RecordType::Waveform => RecordKind::Array,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::Ai => "ai",
            RecordType::Ao => "ao",
            RecordType::Bi => "bi",
            RecordType::Bo => "bo",
            RecordType::Longin => "longin",
            RecordType::Longout => "longout",
            RecordType::Mbbi => "mbbi",
            RecordType::Mbbo => "mbbo",
            RecordType::Stringin => "stringin",
            RecordType::Stringout => "stringout",
            RecordType::Waveform => "waveform",
        }
    }
}

impl Default for RecordType {
    fn default() -> Self {
        RecordType::Ai
    }
}

impl FromStr for RecordType {
    type Err = RecordKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordType::ALL
            .into_iter()
            .find(|rt| rt.as_str() == s)
            .ok_or_else(|| RecordKindError(s.to_string()))
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data kind of a process variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Analog,
    Binary,
    Integer,
    Enum,
    String,
    Array,
}

impl RecordKind {
    /// Storage type backing values of this kind
    pub fn storage(self) -> StorageType {
        match self {
            RecordKind::Analog => StorageType::Float,
            RecordKind::Binary | RecordKind::Integer | RecordKind::Enum => StorageType::Int,
            RecordKind::String => StorageType::String,
            RecordKind::Array => StorageType::Array,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordKind::Analog => "analog",
            RecordKind::Binary => "binary",
            RecordKind::Integer => "integer",
            RecordKind::Enum => "enum",
            RecordKind::String => "string",
            RecordKind::Array => "array",
        };
        f.write_str(s)
    }
}
