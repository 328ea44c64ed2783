//! Schema canonicalization.
//!
//! Source files declare the feature catalogue they follow in free text
//! ("ET-EDGV 2.1.3", "edgv_3_0", "EDGV versão 3.0 ..."). Every imported row
//! carries exactly one of the canonical labels below.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Label used when no version marker is found anywhere.
pub const SCHEMA_DEFAULT_LABEL: &str = "EDGV";

/// Closed set of schema labels written to the consolidated table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaLabel {
    #[serde(rename = "EDGV 2.1.3")]
    Edgv213,
    #[serde(rename = "EDGV 3.0")]
    Edgv30,
    #[serde(rename = "EDGV")]
    Edgv,
}

impl SchemaLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Edgv213 => "EDGV 2.1.3",
            Self::Edgv30 => "EDGV 3.0",
            Self::Edgv => SCHEMA_DEFAULT_LABEL,
        }
    }

    /// Parse a stored label. Returns `None` for anything outside the set.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "EDGV 2.1.3" => Some(Self::Edgv213),
            "EDGV 3.0" => Some(Self::Edgv30),
            SCHEMA_DEFAULT_LABEL => Some(Self::Edgv),
            _ => None,
        }
    }

    pub const ALL: &'static [&'static str] = &["EDGV 2.1.3", "EDGV 3.0", SCHEMA_DEFAULT_LABEL];
}

impl std::fmt::Display for SchemaLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Version markers
// ---------------------------------------------------------------------------

// Digits must not be glued to other digits, so dates such as "2013-03-01"
// or scales such as "1:13000" never read as a version.
fn three_part_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|[^0-9])2\s*[._\-]\s*1\s*[._\-]\s*3(?:$|[^0-9])")
            .expect("static regex is valid")
    })
}

fn two_part_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|[^0-9])3\s*[._\-]\s*0(?:$|[^0-9])")
            .expect("static regex is valid")
    })
}

/// Version marker in one text source, if any.
pub fn find_version(text: &str) -> Option<SchemaLabel> {
    let lowered = text.to_lowercase();
    if three_part_marker().is_match(&lowered) {
        Some(SchemaLabel::Edgv213)
    } else if two_part_marker().is_match(&lowered) {
        Some(SchemaLabel::Edgv30)
    } else {
        None
    }
}

/// Canonicalize the schema of a product.
///
/// The metadata text is consulted first, then the file path (directory and
/// file names). Falls back to the bare [`SchemaLabel::Edgv`].
pub fn classify_schema(metadata_text: &str, file_path: &Path) -> SchemaLabel {
    find_version(metadata_text)
        .or_else(|| find_version(&file_path.to_string_lossy()))
        .unwrap_or(SchemaLabel::Edgv)
}
