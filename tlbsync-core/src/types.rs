//! Domain types shared by the synchronizer, the edit session and the CLI.
//!
//! All types are serializable via serde so the CLI session protocol and the
//! YAML config can carry them verbatim.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Structured text shown when the binary field is empty.
pub const EMPTY_STRUCTURED: &str = "{}";

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Textual encoding used to display a bag-of-cells payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    Hex,
    #[default]
    Base64,
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataFormat::Hex => write!(f, "hex"),
            DataFormat::Base64 => write!(f, "base64"),
        }
    }
}

impl FromStr for DataFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hex" => Ok(DataFormat::Hex),
            "base64" | "b64" => Ok(DataFormat::Base64),
            other => Err(format!(
                "unknown binary format '{other}'; expected: hex, base64"
            )),
        }
    }
}

/// Which sibling field is authoritative when the schema changes.
///
/// `PreferBinary` re-decodes the current binary against the new schema;
/// `PreferStructured` re-encodes the current structured text instead. The two
/// can give different outcomes for the same edit, so callers choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ResolutionPolicy {
    #[default]
    #[serde(rename = "binary")]
    PreferBinary,
    #[serde(rename = "structured")]
    PreferStructured,
}

impl fmt::Display for ResolutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionPolicy::PreferBinary => write!(f, "binary"),
            ResolutionPolicy::PreferStructured => write!(f, "structured"),
        }
    }
}

impl FromStr for ResolutionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binary" | "boc" => Ok(ResolutionPolicy::PreferBinary),
            "structured" | "data" | "json" => Ok(ResolutionPolicy::PreferStructured),
            other => Err(format!(
                "unknown resolution policy '{other}'; expected: binary, structured"
            )),
        }
    }
}

/// One of the three synchronized fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Schema,
    Binary,
    Structured,
}

impl Field {
    /// All fields in display order.
    pub fn all() -> &'static [Field] {
        &[Field::Schema, Field::Binary, Field::Structured]
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Schema => write!(f, "schema"),
            Field::Binary => write!(f, "binary"),
            Field::Structured => write!(f, "structured"),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Externally visible state of a synchronizer.
///
/// Always handed out by value; mutating a snapshot never reaches back into the
/// synchronizer that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub schema: String,
    pub binary: String,
    pub binary_format: DataFormat,
    pub structured: String,
}

impl SyncState {
    /// Text currently held by `field`.
    pub fn field(&self, field: Field) -> &str {
        match field {
            Field::Schema => &self.schema,
            Field::Binary => &self.binary,
            Field::Structured => &self.structured,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_format_parses_case_insensitively() {
        assert_eq!("HEX".parse::<DataFormat>().unwrap(), DataFormat::Hex);
        assert_eq!("b64".parse::<DataFormat>().unwrap(), DataFormat::Base64);
        assert!("base32".parse::<DataFormat>().is_err());
    }

    #[test]
    fn policy_accepts_legacy_focus_names() {
        assert_eq!("boc".parse::<ResolutionPolicy>().unwrap(), ResolutionPolicy::PreferBinary);
        assert_eq!("data".parse::<ResolutionPolicy>().unwrap(), ResolutionPolicy::PreferStructured);
    }

    #[test]
    fn defaults_match_the_editor() {
        assert_eq!(DataFormat::default(), DataFormat::Base64);
        assert_eq!(ResolutionPolicy::default(), ResolutionPolicy::PreferBinary);
    }

    #[test]
    fn state_field_accessor() {
        let state = SyncState {
            schema: "_ x:# = Foo;".to_string(),
            binary: String::new(),
            binary_format: DataFormat::Hex,
            structured: EMPTY_STRUCTURED.to_string(),
        };
        assert_eq!(state.field(Field::Schema), "_ x:# = Foo;");
        assert_eq!(state.field(Field::Structured), "{}");
    }

    #[test]
    fn state_serde_uses_lowercase_format() {
        let state = SyncState {
            schema: "s".to_string(),
            binary: "b".to_string(),
            binary_format: DataFormat::Hex,
            structured: "{}".to_string(),
        };
        let yaml = serde_yaml::to_string(&state).expect("serialize");
        assert!(yaml.contains("binary_format: hex"), "got: {yaml}");
    }
}
