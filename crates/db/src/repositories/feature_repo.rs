//! Repository for the consolidated feature table.
//!
//! Write paths take `&mut PgConnection` so callers can run a whole product
//! replace (delete + inserts) inside one transaction.

use sqlx::{PgConnection, PgPool};

use crate::models::imported_feature::{
    FeatureTable, ImportedFeature, NewImportedFeature, ProductSummary,
};

/// Bound parameters per inserted row.
const PARAMS_PER_ROW: usize = 8;

/// Upper bound on rows per INSERT statement (Postgres allows 65535 binds).
pub const MAX_ROWS_PER_STATEMENT: usize = 1000;

/// Provides DDL, replace and reclassification operations for feature rows.
pub struct FeatureRepo;

impl FeatureRepo {
    /// Whether the table exists in the current search path.
    pub async fn table_exists(pool: &PgPool, table: &FeatureTable) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT to_regclass($1) IS NOT NULL")
            .bind(table.name())
            .fetch_one(pool)
            .await
    }

    /// Create the table and its indexes if absent. Returns `true` if the
    /// table did not exist before the call.
    pub async fn ensure_table(pool: &PgPool, table: &FeatureTable) -> Result<bool, sqlx::Error> {
        let existed = Self::table_exists(pool, table).await?;
        let name = table.name();
        let srid = table.srid();

        let mut tx = pool.begin().await?;
        let statements = [
            format!(
                "CREATE TABLE IF NOT EXISTS {name} ( \
                    id BIGSERIAL PRIMARY KEY, \
                    geom geometry(Geometry, {srid}) NOT NULL, \
                    attributes JSONB NOT NULL DEFAULT '{{}}'::jsonb, \
                    class_name TEXT NOT NULL, \
                    product_id TEXT NOT NULL, \
                    scale TEXT NOT NULL, \
                    product_date DATE, \
                    schema_label TEXT NOT NULL, \
                    representation_group TEXT NOT NULL DEFAULT 'unclassified' \
                 )"
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {name} (class_name)",
                index_name(table, "class_name")
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {name} (product_id)",
                index_name(table, "product_id")
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {name} USING GIST (geom)",
                index_name(table, "geom")
            ),
        ];
        for sql in &statements {
            sqlx::query(sql).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        if !existed {
            tracing::info!(table = name, srid, "Created consolidated feature table");
        }
        Ok(!existed)
    }

    /// Whether any row carries `product_id`.
    pub async fn product_exists(
        conn: &mut PgConnection,
        table: &FeatureTable,
        product_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE product_id = $1)",
            table.name()
        );
        sqlx::query_scalar::<_, bool>(&sql)
            .bind(product_id)
            .fetch_one(conn)
            .await
    }

    /// Delete every row of a product, optionally restricted to one class.
    pub async fn delete_product(
        conn: &mut PgConnection,
        table: &FeatureTable,
        product_id: &str,
        class_filter: Option<&str>,
    ) -> Result<u64, sqlx::Error> {
        let result = match class_filter {
            Some(class_name) => {
                let sql = format!(
                    "DELETE FROM {} WHERE product_id = $1 AND class_name = $2",
                    table.name()
                );
                sqlx::query(&sql)
                    .bind(product_id)
                    .bind(class_name)
                    .execute(conn)
                    .await?
            }
            None => {
                let sql = format!("DELETE FROM {} WHERE product_id = $1", table.name());
                sqlx::query(&sql).bind(product_id).execute(conn).await?
            }
        };
        Ok(result.rows_affected())
    }

    /// Insert rows with multi-row INSERT statements.
    ///
    /// Geometries are tagged with the table SRID and flattened to 2D. The
    /// caller supplies a provisional representation group; [`Self::reclassify`]
    /// is authoritative.
    pub async fn batch_insert(
        conn: &mut PgConnection,
        table: &FeatureTable,
        rows: &[NewImportedFeature],
    ) -> Result<u64, sqlx::Error> {
        let mut inserted = 0;
        for chunk in rows.chunks(MAX_ROWS_PER_STATEMENT) {
            let sql = build_insert_sql(table, chunk.len());
            let mut query = sqlx::query(&sql);
            for row in chunk {
                query = query
                    .bind(&row.geometry_wkb)
                    .bind(&row.attributes)
                    .bind(&row.class_name)
                    .bind(&row.product_id)
                    .bind(&row.scale)
                    .bind(row.product_date)
                    .bind(&row.schema_label)
                    .bind(&row.representation_group);
            }
            let result = query.execute(&mut *conn).await?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    /// Recompute `representation_group` for every row from
    /// `representation_mappings`.
    ///
    /// Resolution order: exact normalized (schema, class) pair, then the
    /// smallest group mapped to the class under any schema, then
    /// `'unclassified'`. Only rows whose group changes are written, and the
    /// whole pass runs in one transaction.
    pub async fn reclassify(pool: &PgPool, table: &FeatureTable) -> Result<u64, sqlx::Error> {
        let name = table.name();
        let sql = format!(
            "WITH resolved AS ( \
                SELECT f.id, COALESCE(exact.grp, fallback.grp, 'unclassified') AS grp \
                FROM {name} f \
                LEFT JOIN LATERAL ( \
                    SELECT m.representation_group AS grp \
                    FROM representation_mappings m \
                    WHERE lower(btrim(m.schema_label)) = lower(btrim(f.schema_label)) \
                      AND lower(btrim(m.class_name)) = lower(btrim(f.class_name)) \
                    ORDER BY m.representation_group \
                    LIMIT 1 \
                ) exact ON true \
                LEFT JOIN LATERAL ( \
                    SELECT min(m.representation_group) AS grp \
                    FROM representation_mappings m \
                    WHERE lower(btrim(m.class_name)) = lower(btrim(f.class_name)) \
                ) fallback ON true \
             ) \
             UPDATE {name} AS f SET representation_group = r.grp \
             FROM resolved r \
             WHERE f.id = r.id AND f.representation_group IS DISTINCT FROM r.grp"
        );

        let mut tx = pool.begin().await?;
        let result = sqlx::query(&sql).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    /// Number of rows carrying `product_id`.
    pub async fn count_for_product(
        pool: &PgPool,
        table: &FeatureTable,
        product_id: &str,
    ) -> Result<i64, sqlx::Error> {
        let sql = format!(
            "SELECT COUNT(*)::BIGINT FROM {} WHERE product_id = $1",
            table.name()
        );
        sqlx::query_scalar::<_, i64>(&sql)
            .bind(product_id)
            .fetch_one(pool)
            .await
    }

    /// All rows of a product, ordered by insertion.
    pub async fn list_for_product(
        pool: &PgPool,
        table: &FeatureTable,
        product_id: &str,
    ) -> Result<Vec<ImportedFeature>, sqlx::Error> {
        let sql = format!(
            "SELECT id, ST_AsText(geom) AS geom_wkt, GeometryType(geom) AS geom_type, \
                    attributes, class_name, product_id, scale, product_date, \
                    schema_label, representation_group \
             FROM {} WHERE product_id = $1 ORDER BY id",
            table.name()
        );
        sqlx::query_as::<_, ImportedFeature>(&sql)
            .bind(product_id)
            .fetch_all(pool)
            .await
    }

    /// One summary row per product, ordered by identifier.
    pub async fn list_products(
        pool: &PgPool,
        table: &FeatureTable,
    ) -> Result<Vec<ProductSummary>, sqlx::Error> {
        let sql = format!(
            "SELECT product_id, min(schema_label) AS schema_label, min(scale) AS scale, \
                    min(product_date) AS product_date, COUNT(*)::BIGINT AS feature_count \
             FROM {} GROUP BY product_id ORDER BY product_id",
            table.name()
        );
        sqlx::query_as::<_, ProductSummary>(&sql).fetch_all(pool).await
    }
}

fn index_name(table: &FeatureTable, column: &str) -> String {
    format!("idx_{}_{column}", table.name())
}

/// Build `INSERT ... VALUES (...), (...)` for `row_count` rows.
fn build_insert_sql(table: &FeatureTable, row_count: usize) -> String {
    let mut sql = format!(
        "INSERT INTO {} (geom, attributes, class_name, product_id, scale, \
         product_date, schema_label, representation_group) VALUES ",
        table.name()
    );
    let srid = table.srid();
    for row in 0..row_count {
        if row > 0 {
            sql.push_str(", ");
        }
        let p = row * PARAMS_PER_ROW;
        sql.push_str(&format!(
            "(ST_Force2D(ST_SetSRID(ST_GeomFromWKB(${}), {srid})), ${}, ${}, ${}, ${}, ${}, ${}, ${})",
            p + 1,
            p + 2,
            p + 3,
            p + 4,
            p + 5,
            p + 6,
            p + 7,
            p + 8,
        ));
    }
    sql
}
