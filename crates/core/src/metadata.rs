//! Product metadata values and the pure parts of metadata discovery.
//!
//! Every field degrades independently: a missing scale, date or identifier
//! never prevents an import. The caller substitutes the file base name for
//! an unspecified identifier (see [`ProductMetadata::effective_product_id`]).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::schema::SCHEMA_DEFAULT_LABEL;
use crate::types::ProductDate;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Marker stored when the metadata declares no scale.
pub const SCALE_UNSPECIFIED: &str = "Não informada";

/// Marker returned when the metadata declares no file identifier.
pub const IDENTIFIER_UNSPECIFIED: &str = "Não informado";

/// Lowercased substrings that make an archive member look like the product's
/// metadata document rather than some other XML (styles, GDAL sidecars).
pub const METADATA_NAME_HINTS: &[&str] = &[
    "metadata",
    "metadado",
    "identification",
    "identificacao",
    "identificação",
    "schema",
    "esquema",
    "catalog",
    "catalogo",
    "catálogo",
    "edgv",
];

/// XML files GDAL writes next to datasets; never product metadata.
const IGNORED_XML_SUFFIXES: &[&str] = &[".aux.xml", ".ovr.xml"];

// ---------------------------------------------------------------------------
// Extracted metadata
// ---------------------------------------------------------------------------

/// Metadata extracted from an ISO 19115/19139 document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductMetadata {
    /// Scale formatted as `1:<denominator>`, or [`SCALE_UNSPECIFIED`].
    pub scale: String,
    pub product_date: Option<ProductDate>,
    /// Raw schema citation text, before canonicalization.
    pub schema_text: String,
    /// File identifier, or [`IDENTIFIER_UNSPECIFIED`].
    pub identifier: String,
}

impl Default for ProductMetadata {
    fn default() -> Self {
        Self {
            scale: SCALE_UNSPECIFIED.to_string(),
            product_date: None,
            schema_text: SCHEMA_DEFAULT_LABEL.to_string(),
            identifier: IDENTIFIER_UNSPECIFIED.to_string(),
        }
    }
}

impl ProductMetadata {
    pub fn has_identifier(&self) -> bool {
        let id = self.identifier.trim();
        !id.is_empty() && id != IDENTIFIER_UNSPECIFIED
    }

    /// The replace-key for the product: the declared identifier, or the
    /// file's base name when none was declared.
    pub fn effective_product_id(&self, file_path: &Path) -> String {
        if self.has_identifier() {
            self.identifier.trim().to_string()
        } else {
            file_base_name(file_path)
        }
    }
}

/// Format a scale denominator as `1:<n>`. Blank input yields `None`.
pub fn format_scale(denominator: &str) -> Option<String> {
    let trimmed = denominator.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(format!("1:{trimmed}"))
    }
}

/// File name including its extension (e.g. `carta_2345.zip`).
pub fn file_base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

// ---------------------------------------------------------------------------
// Archive member selection
// ---------------------------------------------------------------------------

/// Returns `true` if an archive entry could be a metadata document.
pub fn is_metadata_candidate(member_name: &str) -> bool {
    let lowered = member_name.to_lowercase();
    lowered.ends_with(".xml")
        && !lowered.ends_with('/')
        && !lowered.starts_with("__macosx/")
        && !IGNORED_XML_SUFFIXES.iter().any(|s| lowered.ends_with(s))
}

/// Returns `true` if the member name contains one of [`METADATA_NAME_HINTS`].
pub fn has_metadata_hint(member_name: &str) -> bool {
    let lowered = member_name.to_lowercase();
    METADATA_NAME_HINTS.iter().any(|hint| lowered.contains(hint))
}

/// Pick the archive member most likely to hold the product metadata.
///
/// Candidates carrying a name hint beat those without; ties go to the
/// shortest name, then to lexical order.
pub fn select_metadata_member<'a, I>(member_names: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    member_names
        .into_iter()
        .filter(|name| is_metadata_candidate(name))
        .min_by_key(|name| (!has_metadata_hint(name), name.chars().count(), *name))
}
