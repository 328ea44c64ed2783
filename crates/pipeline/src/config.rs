use std::path::PathBuf;

use geoimport_core::error::CoreError;
use geoimport_core::naming::{validate_table_name, DEFAULT_FEATURE_TABLE};
use geoimport_db::models::imported_feature::FeatureTable;

/// Import configuration loaded from environment variables.
///
/// Built once at process start and passed by reference; nothing in the
/// pipeline reads the environment on its own.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Postgres/PostGIS connection string.
    pub database_url: String,
    /// Directory tree scanned by batch runs.
    pub import_root: PathBuf,
    /// Consolidated table name, validated against the identifier allow-list.
    pub feature_table: String,
    /// EPSG code every geometry is reprojected to.
    pub target_epsg: u32,
    /// Rows buffered per multi-row INSERT.
    pub insert_batch_size: usize,
    /// Actor recorded on import history events.
    pub actor: String,
    /// Connection pool size.
    pub db_max_connections: u32,
}

impl ImportConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var              | Default             |
    /// |----------------------|---------------------|
    /// | `DATABASE_URL`       | required            |
    /// | `IMPORT_ROOT`        | `./data`            |
    /// | `FEATURE_TABLE`      | `imported_features` |
    /// | `TARGET_EPSG`        | `3857`              |
    /// | `INSERT_BATCH_SIZE`  | `500`               |
    /// | `IMPORT_ACTOR`       | `system`            |
    /// | `DB_MAX_CONNECTIONS` | `5`                 |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| CoreError::Validation("DATABASE_URL must be set".into()))?;

        let import_root = PathBuf::from(lookup("IMPORT_ROOT").unwrap_or_else(|| "./data".into()));

        let feature_table =
            lookup("FEATURE_TABLE").unwrap_or_else(|| DEFAULT_FEATURE_TABLE.into());
        validate_table_name(&feature_table)?;

        let target_epsg: u32 = parse_var(&lookup, "TARGET_EPSG", 3857)?;
        if target_epsg == 0 {
            return Err(CoreError::Validation("TARGET_EPSG must be positive".into()));
        }

        let insert_batch_size: usize = parse_var(&lookup, "INSERT_BATCH_SIZE", 500)?;
        if insert_batch_size == 0 {
            return Err(CoreError::Validation(
                "INSERT_BATCH_SIZE must be at least 1".into(),
            ));
        }

        let actor = lookup("IMPORT_ACTOR")
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| "system".into());

        let db_max_connections: u32 = parse_var(&lookup, "DB_MAX_CONNECTIONS", 5)?;

        Ok(Self {
            database_url,
            import_root,
            feature_table,
            target_epsg,
            insert_batch_size,
            actor,
            db_max_connections,
        })
    }

    /// The validated table handle used by repositories.
    pub fn table(&self) -> Result<FeatureTable, CoreError> {
        let srid = i32::try_from(self.target_epsg).map_err(|_| {
            CoreError::Validation(format!("TARGET_EPSG {} out of range", self.target_epsg))
        })?;
        FeatureTable::new(&self.feature_table, srid)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, CoreError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CoreError::Validation(format!("{key} has invalid value '{raw}'"))),
    }
}
