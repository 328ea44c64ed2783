//! Representation mapping models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use geoimport_core::representation::MappingTable;
use geoimport_core::types::{DbId, Timestamp};

/// A row from the `representation_mappings` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RepresentationMapping {
    pub id: DbId,
    pub schema_label: String,
    pub class_name: String,
    pub representation_group: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for inserting or replacing a mapping keyed by (schema, class).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpsertRepresentationMapping {
    pub schema_label: String,
    pub class_name: String,
    pub representation_group: String,
}

/// Build the in-process lookup table from stored rows.
pub fn mapping_table(rows: &[RepresentationMapping]) -> MappingTable {
    rows.iter()
        .map(|r| (&r.schema_label, &r.class_name, &r.representation_group))
        .collect()
}
