//! Repository for the append-only `import_events` table.

use sqlx::{PgConnection, PgPool};

use crate::models::import_event::{CreateImportEvent, ImportEvent};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, product_id, class_filter, action, occurred_at, actor, details";

/// Provides append and history queries for import events.
pub struct ImportEventRepo;

impl ImportEventRepo {
    /// Append an event on the given connection, so it can share the
    /// transaction of the change it records.
    pub async fn create(
        conn: &mut PgConnection,
        input: &CreateImportEvent,
    ) -> Result<ImportEvent, sqlx::Error> {
        let query = format!(
            "INSERT INTO import_events (product_id, class_filter, action, actor, details) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ImportEvent>(&query)
            .bind(&input.product_id)
            .bind(&input.class_filter)
            .bind(&input.action)
            .bind(&input.actor)
            .bind(&input.details)
            .fetch_one(conn)
            .await
    }

    /// Most recent events first.
    pub async fn list_recent(pool: &PgPool, limit: i64) -> Result<Vec<ImportEvent>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM import_events ORDER BY occurred_at DESC, id DESC LIMIT $1"
        );
        sqlx::query_as::<_, ImportEvent>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Full history of one product, oldest first.
    pub async fn list_for_product(
        pool: &PgPool,
        product_id: &str,
    ) -> Result<Vec<ImportEvent>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM import_events WHERE product_id = $1 ORDER BY occurred_at, id"
        );
        sqlx::query_as::<_, ImportEvent>(&query)
            .bind(product_id)
            .fetch_all(pool)
            .await
    }
}
