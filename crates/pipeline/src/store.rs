//! Storage seam between the orchestrator and the consolidated table.
//!
//! [`FeatureStore`] is implemented over Postgres by [`PgFeatureStore`] and
//! by an in-memory double in the integration tests.

use async_trait::async_trait;
use geoimport_core::error::CoreError;
use geoimport_core::representation::MappingTable;
use geoimport_db::models::import_event::CreateImportEvent;
use geoimport_db::models::imported_feature::{FeatureTable, NewImportedFeature, ProductSummary};
use geoimport_db::models::representation_mapping::mapping_table;
use geoimport_db::repositories::{FeatureRepo, ImportEventRepo, RepresentationMappingRepo};
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::ImportError;

/// Write and maintenance access to the consolidated feature table.
#[async_trait]
pub trait FeatureStore: Send + Sync {
    /// Create the table if absent. Returns `true` if it was created.
    async fn ensure_table(&self) -> Result<bool, ImportError>;

    /// Snapshot of the representation mapping entity.
    async fn fetch_mapping_table(&self) -> Result<MappingTable, ImportError>;

    /// Start replacing every row of `product_id`.
    ///
    /// Prior rows are removed atomically with the new ones: nothing is
    /// visible to readers until [`FeatureSink::commit`], and dropping the
    /// sink leaves the previous version in place.
    async fn begin_replace(&self, product_id: &str) -> Result<Box<dyn FeatureSink>, ImportError>;

    /// Recompute representation groups for the whole table. Returns the
    /// number of rows whose group changed.
    async fn reclassify(&self) -> Result<u64, ImportError>;

    /// Delete a product (optionally one class of it) and record a
    /// `removed` event. Returns the number of rows deleted.
    async fn remove_product(
        &self,
        product_id: &str,
        class_filter: Option<&str>,
        actor: &str,
    ) -> Result<u64, ImportError>;

    /// One summary per stored product.
    async fn list_products(&self) -> Result<Vec<ProductSummary>, ImportError>;
}

/// Pending replacement of one product.
#[async_trait]
pub trait FeatureSink: Send {
    /// Rows of the previous version that the commit will replace.
    fn replaced(&self) -> u64;

    /// Buffer rows into the replacement. Returns rows written.
    async fn write(&mut self, rows: &[NewImportedFeature]) -> Result<u64, ImportError>;

    /// Publish the replacement and append `event` to the history.
    async fn commit(self: Box<Self>, event: CreateImportEvent) -> Result<(), ImportError>;
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

/// [`FeatureStore`] backed by PostGIS.
#[derive(Debug, Clone)]
pub struct PgFeatureStore {
    pool: PgPool,
    table: FeatureTable,
}

impl PgFeatureStore {
    pub fn new(pool: PgPool, table: FeatureTable) -> Self {
        Self { pool, table }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn table(&self) -> &FeatureTable {
        &self.table
    }
}

#[async_trait]
impl FeatureStore for PgFeatureStore {
    async fn ensure_table(&self) -> Result<bool, ImportError> {
        Ok(FeatureRepo::ensure_table(&self.pool, &self.table).await?)
    }

    async fn fetch_mapping_table(&self) -> Result<MappingTable, ImportError> {
        let rows = RepresentationMappingRepo::list_all(&self.pool).await?;
        Ok(mapping_table(&rows))
    }

    async fn begin_replace(&self, product_id: &str) -> Result<Box<dyn FeatureSink>, ImportError> {
        let mut tx = self.pool.begin().await?;
        let mut replaced = 0;
        if FeatureRepo::product_exists(&mut *tx, &self.table, product_id).await? {
            replaced = FeatureRepo::delete_product(&mut *tx, &self.table, product_id, None).await?;
            tracing::info!(product_id, replaced, "Replacing previous import");
        }
        Ok(Box::new(PgFeatureSink {
            tx,
            table: self.table.clone(),
            replaced,
        }))
    }

    async fn reclassify(&self) -> Result<u64, ImportError> {
        Ok(FeatureRepo::reclassify(&self.pool, &self.table).await?)
    }

    async fn remove_product(
        &self,
        product_id: &str,
        class_filter: Option<&str>,
        actor: &str,
    ) -> Result<u64, ImportError> {
        let mut tx = self.pool.begin().await?;
        let removed =
            FeatureRepo::delete_product(&mut *tx, &self.table, product_id, class_filter).await?;
        if removed == 0 {
            return Err(CoreError::NotFound {
                entity: "product",
                key: product_id.to_string(),
            }
            .into());
        }
        let event = CreateImportEvent::removed(
            product_id,
            class_filter,
            actor,
            format!("{removed} feições removidas"),
        );
        ImportEventRepo::create(&mut *tx, &event).await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn list_products(&self) -> Result<Vec<ProductSummary>, ImportError> {
        Ok(FeatureRepo::list_products(&self.pool, &self.table).await?)
    }
}

/// Open transaction holding one product replacement.
struct PgFeatureSink {
    tx: Transaction<'static, Postgres>,
    table: FeatureTable,
    replaced: u64,
}

#[async_trait]
impl FeatureSink for PgFeatureSink {
    fn replaced(&self) -> u64 {
        self.replaced
    }

    async fn write(&mut self, rows: &[NewImportedFeature]) -> Result<u64, ImportError> {
        Ok(FeatureRepo::batch_insert(&mut *self.tx, &self.table, rows).await?)
    }

    async fn commit(self: Box<Self>, event: CreateImportEvent) -> Result<(), ImportError> {
        let mut sink = *self;
        ImportEventRepo::create(&mut *sink.tx, &event).await?;
        sink.tx.commit().await?;
        Ok(())
    }
}
