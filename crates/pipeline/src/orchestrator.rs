//! The per-file import loop.
//!
//! Every file walks Located -> MetadataResolved -> DatasourcesOpened ->
//! Importing -> Completed, or ends early in Skipped or Failed. A file's
//! failure never stops the batch. After the last file the representation
//! groups of the whole table are recomputed once.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use gdal::vector::LayerAccess;
use geoimport_core::import_status::{BatchReport, FileOutcome, FileResult, ImportState};
use geoimport_core::metadata::{file_base_name, ProductMetadata};
use geoimport_core::representation::MappingTable;
use geoimport_core::schema::classify_schema;
use geoimport_db::models::import_event::CreateImportEvent;
use geoimport_db::models::imported_feature::{NewImportedFeature, ProductSummary};

use crate::config::ImportConfig;
use crate::datasource::{collect_import_files, open_datasources, OpenedDatasource};
use crate::error::ImportError;
use crate::metadata::{extract_metadata, locate_metadata, MetadataLocator};
use crate::store::{FeatureSink, FeatureStore};
use crate::transform::{feature_attributes, target_srs, LayerTransform};

/// Reason reported for files without any readable vector datasource.
pub const NO_DATASOURCES_REASON: &str = "Nenhum dado vetorial suportado encontrado";

/// Product-level values stamped on every row of one import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductContext {
    pub product_id: String,
    pub schema_label: String,
    pub metadata: ProductMetadata,
}

impl ProductContext {
    /// Resolve identifier and schema label for `path`.
    pub fn resolve(path: &Path, metadata: ProductMetadata) -> Self {
        let product_id = metadata.effective_product_id(path);
        let schema_label = classify_schema(&metadata.schema_text, path).as_str().to_string();
        Self {
            product_id,
            schema_label,
            metadata,
        }
    }

    fn row(
        &self,
        class_name: &str,
        group: &str,
        wkb: Vec<u8>,
        attributes: serde_json::Value,
    ) -> NewImportedFeature {
        NewImportedFeature {
            geometry_wkb: wkb,
            attributes,
            class_name: class_name.to_string(),
            product_id: self.product_id.clone(),
            scale: self.metadata.scale.clone(),
            product_date: self.metadata.product_date,
            schema_label: self.schema_label.clone(),
            representation_group: group.to_string(),
        }
    }
}

/// Tracks and logs the state of the file being imported.
struct FileProgress<'a> {
    path: &'a Path,
    state: ImportState,
}

impl<'a> FileProgress<'a> {
    fn new(path: &'a Path) -> Self {
        tracing::info!(path = %path.display(), "Importing file");
        Self {
            path,
            state: ImportState::Located,
        }
    }

    fn advance(&mut self, next: ImportState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(path = %self.path.display(), from = %self.state, to = %next, "File state changed");
        self.state = next;
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct WriteCounts {
    written: u64,
    skipped_features: u64,
    replaced: u64,
}

/// Runs imports against a [`FeatureStore`].
pub struct Importer<'a> {
    store: &'a dyn FeatureStore,
    config: &'a ImportConfig,
}

impl<'a> Importer<'a> {
    pub fn new(store: &'a dyn FeatureStore, config: &'a ImportConfig) -> Self {
        Self { store, config }
    }

    // -----------------------------------------------------------------------
    // Batch
    // -----------------------------------------------------------------------

    /// Import every recognized file under the configured root.
    pub async fn run_directory(&self) -> BatchReport {
        let files = collect_import_files(&self.config.import_root);
        tracing::info!(
            root = %self.config.import_root.display(),
            files = files.len(),
            "Collected import files"
        );
        self.run_batch(&files).await
    }

    /// Import `files` in order, then reclassify the whole table.
    pub async fn run_batch(&self, files: &[PathBuf]) -> BatchReport {
        let mappings = self.load_mappings().await;
        let mut report = BatchReport::default();

        for path in files {
            let locator = locate_metadata(path);
            let outcome = self.import_file(path, locator.as_ref(), &mappings).await;
            report.push(outcome);
        }

        report.reclassified = match self.store.reclassify().await {
            Ok(changed) => {
                tracing::info!(changed, "Representation groups recomputed");
                Some(changed)
            }
            Err(e) => {
                tracing::error!(error = %e, "Reclassification failed");
                None
            }
        };

        tracing::info!(
            files = report.files.len(),
            written = report.total_written(),
            "Batch finished"
        );
        report
    }

    /// Mapping snapshot used to tag rows as they are written. An unreadable
    /// mapping table only delays classification to the post-pass.
    pub async fn load_mappings(&self) -> MappingTable {
        match self.store.fetch_mapping_table().await {
            Ok(table) => {
                tracing::debug!(entries = table.len(), "Loaded representation mappings");
                table
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot load representation mappings, rows stay unclassified until reclassification");
                MappingTable::new()
            }
        }
    }

    // -----------------------------------------------------------------------
    // Single file
    // -----------------------------------------------------------------------

    /// Import one file given its metadata locator.
    ///
    /// Never fails: problems end up in the returned outcome.
    pub async fn import_file(
        &self,
        path: &Path,
        locator: Option<&MetadataLocator>,
        mappings: &MappingTable,
    ) -> FileOutcome {
        let file_name = file_base_name(path);
        let mut progress = FileProgress::new(path);

        let context = ProductContext::resolve(path, extract_metadata(locator));
        progress.advance(ImportState::MetadataResolved);
        tracing::info!(
            path = %path.display(),
            product_id = %context.product_id,
            schema = %context.schema_label,
            scale = %context.metadata.scale,
            "Metadata resolved"
        );

        let datasources = open_datasources(path);
        if datasources.is_empty() {
            progress.advance(ImportState::Skipped);
            tracing::warn!(path = %path.display(), "No supported vector data, skipping file");
            return FileOutcome {
                file_name,
                product_id: Some(context.product_id),
                result: FileResult::Skipped {
                    reason: NO_DATASOURCES_REASON.to_string(),
                },
            };
        }
        progress.advance(ImportState::DatasourcesOpened);

        let result = match self
            .write_product(&datasources, &context, mappings, &mut progress)
            .await
        {
            Ok(counts) => {
                progress.advance(ImportState::Completed);
                tracing::info!(
                    path = %path.display(),
                    product_id = %context.product_id,
                    written = counts.written,
                    skipped = counts.skipped_features,
                    replaced = counts.replaced,
                    "File imported"
                );
                FileResult::Completed {
                    written: counts.written,
                    skipped_features: counts.skipped_features,
                    replaced: counts.replaced,
                }
            }
            Err(e) => {
                progress.advance(ImportState::Failed);
                tracing::error!(path = %path.display(), product_id = %context.product_id, error = %e, "Import failed");
                FileResult::Failed {
                    error: e.to_string(),
                }
            }
        };

        FileOutcome {
            file_name,
            product_id: Some(context.product_id),
            result,
        }
    }

    /// Replace the product's rows with every feature of `datasources`.
    async fn write_product(
        &self,
        datasources: &[OpenedDatasource],
        context: &ProductContext,
        mappings: &MappingTable,
        progress: &mut FileProgress<'_>,
    ) -> Result<WriteCounts, ImportError> {
        let target = target_srs(self.config.target_epsg)?;
        let batch_size = self.config.insert_batch_size.max(1);

        let mut sink = self.store.begin_replace(&context.product_id).await?;
        progress.advance(ImportState::Importing);

        let mut counts = WriteCounts {
            replaced: sink.replaced(),
            ..WriteCounts::default()
        };
        let mut batch: Vec<NewImportedFeature> = Vec::with_capacity(batch_size);

        for source in datasources {
            for mut layer in source.dataset.layers() {
                let class_name = layer.name();
                let transform = LayerTransform::for_layer(layer.spatial_ref(), &target, &class_name);
                let group = mappings.resolve(&context.schema_label, &class_name).to_string();
                tracing::debug!(datasource = %source.handle, layer = %class_name, group = %group, "Reading layer");

                for feature in layer.features() {
                    let Some(geometry) = feature.geometry() else {
                        counts.skipped_features += 1;
                        tracing::debug!(layer = %class_name, fid = ?feature.fid(), "Feature without geometry, skipping");
                        continue;
                    };

                    let wkb = match transform.apply(geometry).and_then(|g| g.wkb().map_err(ImportError::from)) {
                        Ok(wkb) => wkb,
                        Err(e) => {
                            counts.skipped_features += 1;
                            tracing::warn!(layer = %class_name, fid = ?feature.fid(), error = %e, "Cannot transform feature, skipping");
                            continue;
                        }
                    };

                    batch.push(context.row(&class_name, &group, wkb, feature_attributes(&feature)));
                    if batch.len() >= batch_size {
                        counts.written += flush(sink.as_mut(), &mut batch).await?;
                    }
                }
            }
        }
        counts.written += flush(sink.as_mut(), &mut batch).await?;

        let event = CreateImportEvent::added(
            &context.product_id,
            &self.config.actor,
            format!(
                "{} feições importadas de {}",
                counts.written,
                datasources
                    .iter()
                    .map(|s| s.handle.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        );
        sink.commit(event).await?;
        Ok(counts)
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Recompute representation groups for the whole table.
    pub async fn reclassify(&self) -> Result<u64, ImportError> {
        self.store.reclassify().await
    }

    /// Delete a product (or one of its classes) and record the removal.
    pub async fn remove_product(
        &self,
        product_id: &str,
        class_filter: Option<&str>,
    ) -> Result<u64, ImportError> {
        let removed = self
            .store
            .remove_product(product_id, class_filter, &self.config.actor)
            .await?;
        tracing::info!(product_id, class = ?class_filter, removed, "Product removed");
        Ok(removed)
    }

    pub async fn list_products(&self) -> Result<Vec<ProductSummary>, ImportError> {
        self.store.list_products().await
    }
}

async fn flush(
    sink: &mut dyn FeatureSink,
    batch: &mut Vec<NewImportedFeature>,
) -> Result<u64, ImportError> {
    if batch.is_empty() {
        return Ok(0);
    }
    let written = sink.write(batch).await?;
    batch.clear();
    Ok(written)
}

/// Product identifiers of every import file under `root`, in path order,
/// without duplicates. Reads metadata only; no datasource is opened.
pub fn product_ids_in_tree(root: &Path) -> Vec<String> {
    let mut seen = HashSet::new();
    collect_import_files(root)
        .into_iter()
        .map(|path| {
            let metadata = extract_metadata(locate_metadata(&path).as_ref());
            metadata.effective_product_id(&path)
        })
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use geoimport_core::metadata::IDENTIFIER_UNSPECIFIED;

    use super::*;

    #[test]
    fn test_context_falls_back_to_file_name_and_path_schema() {
        let metadata = ProductMetadata::default();
        assert_eq!(metadata.identifier, IDENTIFIER_UNSPECIFIED);

        let context = ProductContext::resolve(Path::new("/cartas/edgv_3_0/folha_sf23.gpkg"), metadata);
        assert_eq!(context.product_id, "folha_sf23.gpkg");
        assert_eq!(context.schema_label, "EDGV 3.0");
    }

    #[test]
    fn test_context_prefers_declared_values() {
        let metadata = ProductMetadata {
            identifier: "a1b2".into(),
            schema_text: "EDGV 2.1.3".into(),
            scale: "1:25000".into(),
            product_date: None,
        };
        let context = ProductContext::resolve(Path::new("/cartas/edgv_3_0/x.zip"), metadata);
        assert_eq!(context.product_id, "a1b2");
        assert_eq!(context.schema_label, "EDGV 2.1.3");

        let row = context.row("HID_Trecho_Drenagem_L", "drainage", vec![1], serde_json::json!({}));
        assert_eq!(row.product_id, "a1b2");
        assert_eq!(row.scale, "1:25000");
        assert_eq!(row.representation_group, "drainage");
    }

    #[test]
    fn test_product_ids_in_tree_dedupes() {
        let dir = tempfile::tempdir().unwrap();
        let md = r#"<gmd:MD_Metadata xmlns:gmd="http://www.isotc211.org/2005/gmd" xmlns:gco="http://www.isotc211.org/2005/gco"><gmd:fileIdentifier><gco:CharacterString>shared</gco:CharacterString></gmd:fileIdentifier></gmd:MD_Metadata>"#;
        for name in ["a", "b"] {
            std::fs::write(dir.path().join(format!("{name}.gpkg")), b"").unwrap();
            std::fs::write(dir.path().join(format!("{name}.xml")), md).unwrap();
        }
        std::fs::write(dir.path().join("c.gpkg"), b"").unwrap();

        assert_eq!(product_ids_in_tree(dir.path()), vec!["shared", "c.gpkg"]);
    }
}
