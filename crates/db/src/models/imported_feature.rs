//! Consolidated feature table models.
//!
//! The table name is configurable, so every query goes through a validated
//! [`FeatureTable`] handle instead of a string.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use geoimport_core::error::CoreError;
use geoimport_core::naming::validate_table_name;
use geoimport_core::types::{DbId, ProductDate};

/// Validated name + SRID of the consolidated feature table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureTable {
    name: String,
    srid: i32,
}

impl FeatureTable {
    pub fn new(name: &str, srid: i32) -> Result<Self, CoreError> {
        validate_table_name(name)?;
        if srid <= 0 {
            return Err(CoreError::Validation(format!("Invalid SRID {srid}")));
        }
        Ok(Self {
            name: name.to_string(),
            srid,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn srid(&self) -> i32 {
        self.srid
    }
}

/// A row from the consolidated feature table, geometry rendered as WKT.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ImportedFeature {
    pub id: DbId,
    pub geom_wkt: String,
    pub geom_type: String,
    pub attributes: serde_json::Value,
    pub class_name: String,
    pub product_id: String,
    pub scale: String,
    pub product_date: Option<ProductDate>,
    pub schema_label: String,
    pub representation_group: String,
}

/// DTO for inserting one normalized feature.
#[derive(Debug, Clone, Deserialize)]
pub struct NewImportedFeature {
    /// Geometry as WKB, already in the table's SRID.
    pub geometry_wkb: Vec<u8>,
    pub attributes: serde_json::Value,
    pub class_name: String,
    pub product_id: String,
    pub scale: String,
    pub product_date: Option<ProductDate>,
    pub schema_label: String,
    pub representation_group: String,
}

/// Per-product row count.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProductSummary {
    pub product_id: String,
    pub schema_label: String,
    pub scale: String,
    pub product_date: Option<ProductDate>,
    pub feature_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_feature_table_validates_name() {
        let table = FeatureTable::new("imported_features", 3857).unwrap();
        assert_eq!(table.name(), "imported_features");
        assert_eq!(table.srid(), 3857);

        assert_matches!(
            FeatureTable::new("x; DROP TABLE y", 3857),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn test_feature_table_rejects_bad_srid() {
        assert_matches!(FeatureTable::new("features", 0), Err(CoreError::Validation(_)));
    }
}
