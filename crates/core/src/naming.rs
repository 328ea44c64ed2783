//! SQL identifier allow-list.
//!
//! The consolidated table name comes from configuration and is interpolated
//! into DDL/DML, so it is checked once at startup. Everything else reaching
//! SQL is bound as a parameter.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::CoreError;

/// Default name of the consolidated feature table.
pub const DEFAULT_FEATURE_TABLE: &str = "imported_features";

/// Tables owned by migrations or PostGIS that must never be used as the
/// feature table.
pub const RESERVED_TABLES: &[&str] = &[
    "representation_mappings",
    "import_events",
    "_sqlx_migrations",
    "spatial_ref_sys",
    "geometry_columns",
    "geography_columns",
];

/// Longest accepted table name. Index names derived from it
/// (`idx_<name>_product_id`) must still fit Postgres' 63-byte identifiers.
pub const MAX_TABLE_NAME_LEN: usize = 48;

fn identifier_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]{0,47}$").expect("static regex is valid"))
}

/// Validate a table name for interpolation into SQL.
pub fn validate_table_name(name: &str) -> Result<(), CoreError> {
    if !identifier_pattern().is_match(name) {
        return Err(CoreError::Validation(format!(
            "Invalid table name '{name}'. Must match ^[a-z_][a-z0-9_]{{0,47}}$"
        )));
    }
    if RESERVED_TABLES.contains(&name) {
        return Err(CoreError::Validation(format!(
            "Table name '{name}' is reserved"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_valid_names() {
        for name in [DEFAULT_FEATURE_TABLE, "importacao_geometrias", "_t1"] {
            assert!(validate_table_name(name).is_ok(), "name: {name}");
        }
    }

    #[test]
    fn test_rejects_injection_and_case() {
        for name in [
            "",
            "features; DROP TABLE x",
            "Features",
            "1features",
            "public.features",
            "feat\"ures",
        ] {
            assert_matches!(validate_table_name(name), Err(CoreError::Validation(_)), "name: {name}");
        }
    }

    #[test]
    fn test_rejects_overlong_name() {
        assert!(validate_table_name(&"a".repeat(MAX_TABLE_NAME_LEN + 1)).is_err());
        assert!(validate_table_name(&"a".repeat(MAX_TABLE_NAME_LEN)).is_ok());
    }

    #[test]
    fn test_rejects_reserved_tables() {
        assert_matches!(
            validate_table_name("import_events"),
            Err(CoreError::Validation(msg)) if msg.contains("reserved")
        );
    }
}
