//! Repository for the `representation_mappings` table.

use sqlx::PgPool;

use crate::models::representation_mapping::{RepresentationMapping, UpsertRepresentationMapping};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str =
    "id, schema_label, class_name, representation_group, created_at, updated_at";

/// Provides lookup and upsert operations for representation mappings.
pub struct RepresentationMappingRepo;

impl RepresentationMappingRepo {
    /// List every mapping, ordered by schema then class.
    pub async fn list_all(pool: &PgPool) -> Result<Vec<RepresentationMapping>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM representation_mappings ORDER BY schema_label, class_name"
        );
        sqlx::query_as::<_, RepresentationMapping>(&query)
            .fetch_all(pool)
            .await
    }

    /// Find the mapping of an exact (schema, class) pair.
    pub async fn find(
        pool: &PgPool,
        schema_label: &str,
        class_name: &str,
    ) -> Result<Option<RepresentationMapping>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM representation_mappings \
             WHERE schema_label = $1 AND class_name = $2"
        );
        sqlx::query_as::<_, RepresentationMapping>(&query)
            .bind(schema_label)
            .bind(class_name)
            .fetch_optional(pool)
            .await
    }

    /// Insert a mapping or replace the group of an existing pair.
    pub async fn upsert(
        pool: &PgPool,
        input: &UpsertRepresentationMapping,
    ) -> Result<RepresentationMapping, sqlx::Error> {
        let query = upsert_sql();
        sqlx::query_as::<_, RepresentationMapping>(&query)
            .bind(&input.schema_label)
            .bind(&input.class_name)
            .bind(&input.representation_group)
            .fetch_one(pool)
            .await
    }

    /// Upsert many mappings in one transaction. Returns the number of rows
    /// written. Any failure rolls back the whole set.
    pub async fn bulk_upsert(
        pool: &PgPool,
        inputs: &[UpsertRepresentationMapping],
    ) -> Result<u64, sqlx::Error> {
        let query = upsert_sql();
        let mut tx = pool.begin().await?;
        let mut written = 0;
        for input in inputs {
            sqlx::query(&query)
                .bind(&input.schema_label)
                .bind(&input.class_name)
                .bind(&input.representation_group)
                .execute(&mut *tx)
                .await?;
            written += 1;
        }
        tx.commit().await?;
        Ok(written)
    }

    /// Delete a mapping. Returns `true` if a row was removed.
    pub async fn delete(
        pool: &PgPool,
        schema_label: &str,
        class_name: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM representation_mappings WHERE schema_label = $1 AND class_name = $2",
        )
        .bind(schema_label)
        .bind(class_name)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn upsert_sql() -> String {
    format!(
        "INSERT INTO representation_mappings (schema_label, class_name, representation_group) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (schema_label, class_name) \
         DO UPDATE SET representation_group = EXCLUDED.representation_group \
         RETURNING {COLUMNS}"
    )
}
