//! Graphic-representation taxonomy and class resolution.
//!
//! Every feature class maps to one coarse representation group used for
//! downstream styling. Resolution against the mapping table runs in three
//! stages:
//!
//! 1. exact (schema, class) match, both sides trimmed and case-folded;
//! 2. class-only match across all schemas, smallest group code wins when
//!    schemas disagree;
//! 3. the [`UNCLASSIFIED`] sentinel.
//!
//! The database post-pass implements the same rules in SQL; this module is
//! the in-process form.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Sentinel assigned when no mapping matches.
pub const UNCLASSIFIED: &str = "unclassified";

// ---------------------------------------------------------------------------
// Representation groups
// ---------------------------------------------------------------------------

/// The fixed set of representation groups a mapping may point to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepresentationGroup {
    Railway,
    Roadway,
    Drainage,
    Building,
    AdministrativeBoundary,
    Vegetation,
    WaterBody,
    Bridge,
    Airport,
    PowerTransmission,
    Sanitation,
    Other,
}

impl RepresentationGroup {
    /// Code stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Railway => "railway",
            Self::Roadway => "roadway",
            Self::Drainage => "drainage",
            Self::Building => "building",
            Self::AdministrativeBoundary => "administrative_boundary",
            Self::Vegetation => "vegetation",
            Self::WaterBody => "water_body",
            Self::Bridge => "bridge",
            Self::Airport => "airport",
            Self::PowerTransmission => "power_transmission",
            Self::Sanitation => "sanitation",
            Self::Other => "other",
        }
    }

    /// Portuguese display label, as shown in the mapping spreadsheets.
    pub fn display_label(&self) -> &'static str {
        match self {
            Self::Railway => "Ferrovia",
            Self::Roadway => "Rodovia",
            Self::Drainage => "Drenagem",
            Self::Building => "Edificação",
            Self::AdministrativeBoundary => "Limite Administrativo",
            Self::Vegetation => "Vegetação",
            Self::WaterBody => "Massa d'Água",
            Self::Bridge => "Ponte",
            Self::Airport => "Aeroporto",
            Self::PowerTransmission => "Energia",
            Self::Sanitation => "Saneamento",
            Self::Other => "Outro",
        }
    }

    pub const ALL: &'static [RepresentationGroup] = &[
        Self::Railway,
        Self::Roadway,
        Self::Drainage,
        Self::Building,
        Self::AdministrativeBoundary,
        Self::Vegetation,
        Self::WaterBody,
        Self::Bridge,
        Self::Airport,
        Self::PowerTransmission,
        Self::Sanitation,
        Self::Other,
    ];

    /// Parse either the stored code or the display label (case-insensitive).
    pub fn from_label(label: &str) -> Option<Self> {
        let wanted = label.trim().to_lowercase();
        Self::ALL.iter().copied().find(|group| {
            group.as_str() == wanted || group.display_label().to_lowercase() == wanted
        })
    }

    /// Like [`Self::from_label`] but reports unknown labels as a validation error.
    pub fn parse(label: &str) -> Result<Self, CoreError> {
        Self::from_label(label).ok_or_else(|| {
            CoreError::Validation(format!("Unknown representation group '{}'", label.trim()))
        })
    }
}

impl std::fmt::Display for RepresentationGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Mapping table
// ---------------------------------------------------------------------------

/// Trim and case-fold a schema or class name for comparison.
pub fn normalize_key(value: &str) -> String {
    value.trim().to_lowercase()
}

/// In-memory snapshot of the representation mapping entity.
///
/// Keys are normalized on insert, so lookups are insensitive to case and
/// surrounding whitespace.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    by_pair: HashMap<(String, String), String>,
    by_class: HashMap<String, BTreeSet<String>>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one `(schema, class) -> group` entry.
    ///
    /// A later entry for the same normalized pair replaces the earlier one.
    pub fn insert(&mut self, schema: &str, class_name: &str, group: &str) {
        let schema_key = normalize_key(schema);
        let class_key = normalize_key(class_name);
        let group = group.trim().to_string();

        if let Some(previous) = self
            .by_pair
            .insert((schema_key.clone(), class_key.clone()), group.clone())
        {
            self.forget_class_group(&class_key, &schema_key, &previous);
        }
        self.by_class.entry(class_key).or_default().insert(group);
    }

    // Drop `group` from the class index unless another schema still uses it.
    fn forget_class_group(&mut self, class_key: &str, schema_key: &str, group: &str) {
        let still_used = self
            .by_pair
            .iter()
            .any(|((s, c), g)| c == class_key && s != schema_key && g == group);
        if !still_used {
            if let Some(groups) = self.by_class.get_mut(class_key) {
                groups.remove(group);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_pair.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_pair.is_empty()
    }

    /// Resolve the representation group of a class under a schema.
    pub fn resolve(&self, schema: &str, class_name: &str) -> &str {
        let class_key = normalize_key(class_name);
        if class_key.is_empty() {
            return UNCLASSIFIED;
        }

        if let Some(group) = self.by_pair.get(&(normalize_key(schema), class_key.clone())) {
            return group;
        }

        self.by_class
            .get(&class_key)
            .and_then(|groups| groups.iter().next())
            .map(String::as_str)
            .unwrap_or(UNCLASSIFIED)
    }
}

impl<S, C, G> FromIterator<(S, C, G)> for MappingTable
where
    S: AsRef<str>,
    C: AsRef<str>,
    G: AsRef<str>,
{
    fn from_iter<I: IntoIterator<Item = (S, C, G)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (schema, class_name, group) in iter {
            table.insert(schema.as_ref(), class_name.as_ref(), group.as_ref());
        }
        table
    }
}
