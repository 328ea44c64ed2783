//! Shared helpers: an in-memory [`FeatureStore`] and GDAL-written fixtures.
#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gdal::spatial_ref::SpatialRef;
use gdal::vector::{FieldValue, Geometry, LayerAccess, LayerOptions, OGRFieldType, OGRwkbGeometryType};
use gdal::vector::sql::Dialect;
use gdal::{Dataset, DatasetOptions, DriverManager, GdalOpenFlags};
use geoimport_core::error::CoreError;
use geoimport_core::representation::MappingTable;
use geoimport_db::models::import_event::CreateImportEvent;
use geoimport_db::models::imported_feature::{NewImportedFeature, ProductSummary};
use geoimport_pipeline::{FeatureSink, FeatureStore, ImportConfig, ImportError};
use zip::write::SimpleFileOptions;

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryState {
    pub rows: Vec<NewImportedFeature>,
    pub events: Vec<CreateImportEvent>,
    pub mappings: Vec<(String, String, String)>,
    /// Products whose writes fail, to exercise per-file isolation.
    pub failing_products: Vec<String>,
    pub reclassify_calls: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn with_mappings(mappings: &[(&str, &str, &str)]) -> Self {
        let store = Self::default();
        store.state.lock().unwrap().mappings = mappings
            .iter()
            .map(|(s, c, g)| (s.to_string(), c.to_string(), g.to_string()))
            .collect();
        store
    }

    pub fn fail_writes_for(&self, product_id: &str) {
        self.state.lock().unwrap().failing_products.push(product_id.to_string());
    }

    pub fn rows_for(&self, product_id: &str) -> Vec<NewImportedFeature> {
        self.state
            .lock()
            .unwrap()
            .rows
            .iter()
            .filter(|r| r.product_id == product_id)
            .cloned()
            .collect()
    }

    pub fn row_count(&self) -> usize {
        self.state.lock().unwrap().rows.len()
    }

    fn mapping_table(&self) -> MappingTable {
        self.state
            .lock()
            .unwrap()
            .mappings
            .iter()
            .map(|(schema, class_name, group)| (schema, class_name, group))
            .collect()
    }
}

#[async_trait]
impl FeatureStore for MemoryStore {
    async fn ensure_table(&self) -> Result<bool, ImportError> {
        Ok(false)
    }

    async fn fetch_mapping_table(&self) -> Result<MappingTable, ImportError> {
        Ok(self.mapping_table())
    }

    async fn begin_replace(&self, product_id: &str) -> Result<Box<dyn FeatureSink>, ImportError> {
        let replaced = self.rows_for(product_id).len() as u64;
        Ok(Box::new(MemorySink {
            store: self.clone(),
            product_id: product_id.to_string(),
            pending: Vec::new(),
            replaced,
        }))
    }

    async fn reclassify(&self) -> Result<u64, ImportError> {
        let table = self.mapping_table();
        let mut state = self.state.lock().unwrap();
        state.reclassify_calls += 1;
        let mut changed = 0;
        for row in &mut state.rows {
            let group = table.resolve(&row.schema_label, &row.class_name).to_string();
            if row.representation_group != group {
                row.representation_group = group;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn remove_product(
        &self,
        product_id: &str,
        class_filter: Option<&str>,
        actor: &str,
    ) -> Result<u64, ImportError> {
        let mut state = self.state.lock().unwrap();
        let before = state.rows.len();
        state.rows.retain(|r| {
            r.product_id != product_id || class_filter.is_some_and(|c| c != r.class_name)
        });
        let removed = (before - state.rows.len()) as u64;
        if removed == 0 {
            return Err(CoreError::NotFound {
                entity: "product",
                key: product_id.to_string(),
            }
            .into());
        }
        state.events.push(CreateImportEvent::removed(
            product_id,
            class_filter,
            actor,
            String::new(),
        ));
        Ok(removed)
    }

    async fn list_products(&self) -> Result<Vec<ProductSummary>, ImportError> {
        let state = self.state.lock().unwrap();
        let mut ids: Vec<&str> = state.rows.iter().map(|r| r.product_id.as_str()).collect();
        ids.sort();
        ids.dedup();
        Ok(ids
            .into_iter()
            .map(|id| {
                let first = state.rows.iter().find(|r| r.product_id == id).unwrap();
                ProductSummary {
                    product_id: id.to_string(),
                    schema_label: first.schema_label.clone(),
                    scale: first.scale.clone(),
                    product_date: first.product_date,
                    feature_count: state.rows.iter().filter(|r| r.product_id == id).count() as i64,
                }
            })
            .collect())
    }
}

/// Buffers rows until commit, then swaps the product in one step.
struct MemorySink {
    store: MemoryStore,
    product_id: String,
    pending: Vec<NewImportedFeature>,
    replaced: u64,
}

#[async_trait]
impl FeatureSink for MemorySink {
    fn replaced(&self) -> u64 {
        self.replaced
    }

    async fn write(&mut self, rows: &[NewImportedFeature]) -> Result<u64, ImportError> {
        let failing = self
            .store
            .state
            .lock()
            .unwrap()
            .failing_products
            .contains(&self.product_id);
        if failing {
            return Err(ImportError::Database(sqlx::Error::PoolTimedOut));
        }
        self.pending.extend_from_slice(rows);
        Ok(rows.len() as u64)
    }

    async fn commit(self: Box<Self>, event: CreateImportEvent) -> Result<(), ImportError> {
        let sink = *self;
        let mut state = sink.store.state.lock().unwrap();
        state.rows.retain(|r| r.product_id != sink.product_id);
        state.rows.extend(sink.pending);
        state.events.push(event);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub fn test_config(root: &Path) -> ImportConfig {
    ImportConfig {
        database_url: "postgres://unused".into(),
        import_root: root.to_path_buf(),
        feature_table: "imported_features".into(),
        target_epsg: 3857,
        insert_batch_size: 2,
        actor: "teste".into(),
        db_max_connections: 1,
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// One layer to write: name, geometry type, and `(wkt, nome)` features.
pub struct LayerSpec<'a> {
    pub name: &'a str,
    pub geometry_type: OGRwkbGeometryType::Type,
    pub features: &'a [(&'a str, &'a str)],
}

fn write_layers(driver_name: &str, path: &Path, layers: &[LayerSpec<'_>]) {
    let driver = DriverManager::get_driver_by_name(driver_name).unwrap();
    let mut dataset = driver.create_vector_only(path).unwrap();
    let srs = SpatialRef::from_epsg(4326).unwrap();
    for def in layers {
        let mut layer = dataset
            .create_layer(LayerOptions {
                name: def.name,
                srs: Some(&srs),
                ty: def.geometry_type,
                ..Default::default()
            })
            .unwrap();
        layer
            .create_defn_fields(&[("nome", OGRFieldType::OFTString)])
            .unwrap();
        for (wkt, nome) in def.features {
            layer
                .create_feature_fields(
                    Geometry::from_wkt(wkt).unwrap(),
                    &["nome"],
                    &[FieldValue::StringValue(nome.to_string())],
                )
                .unwrap();
        }
    }
}

/// Write a GeoPackage with the given layers.
pub fn write_geopackage(path: &Path, layers: &[LayerSpec<'_>]) {
    write_layers("GPKG", path, layers);
}

/// Overwrite `column` of every row of `table` with raw bytes (hex), going
/// straight to SQLite so GDAL never validates the encoding.
pub fn overwrite_text_bytes(gpkg: &Path, table: &str, column: &str, hex: &str) {
    let options = DatasetOptions {
        open_flags: GdalOpenFlags::GDAL_OF_UPDATE | GdalOpenFlags::GDAL_OF_VECTOR,
        ..Default::default()
    };
    let dataset = Dataset::open_ex(gpkg, options).unwrap();
    dataset
        .execute_sql(
            format!(r#"UPDATE "{table}" SET "{column}" = CAST(X'{hex}' AS TEXT)"#),
            None,
            Dialect::DEFAULT,
        )
        .unwrap();
}

/// Write a shapefile set `<dir>/<name>.shp` (+ .shx, .dbf, .prj) and return
/// its component files.
pub fn write_shapefile(dir: &Path, layer: LayerSpec<'_>) -> Vec<PathBuf> {
    let shp = dir.join(format!("{}.shp", layer.name));
    write_layers("ESRI Shapefile", &shp, &[layer]);
    let stem = shp.file_stem().unwrap().to_owned();
    let mut parts: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.file_stem() == Some(stem.as_os_str()))
        .collect();
    parts.sort();
    parts
}

/// Zip `files` (stored under `prefix/`) plus raw extra members.
pub fn write_zip(path: &Path, prefix: &str, files: &[PathBuf], extra: &[(&str, &[u8])]) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    for file in files {
        let name = format!("{prefix}/{}", file.file_name().unwrap().to_string_lossy());
        zip.start_file(name, SimpleFileOptions::default()).unwrap();
        zip.write_all(&std::fs::read(file).unwrap()).unwrap();
    }
    for (name, bytes) in extra {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

/// ISO 19139 document with the given identifier and schema edition.
pub fn metadata_xml(identifier: &str, edition: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<gmd:MD_Metadata xmlns:gmd="http://www.isotc211.org/2005/gmd" xmlns:gco="http://www.isotc211.org/2005/gco">
  <gmd:fileIdentifier><gco:CharacterString>{identifier}</gco:CharacterString></gmd:fileIdentifier>
  <gmd:identificationInfo><gmd:MD_DataIdentification>
    <gmd:citation><gmd:CI_Citation><gmd:date><gmd:CI_Date>
      <gmd:date><gco:Date>2018-06-30</gco:Date></gmd:date>
    </gmd:CI_Date></gmd:date></gmd:CI_Citation></gmd:citation>
    <gmd:spatialResolution><gmd:MD_Resolution><gmd:equivalentScale><gmd:MD_RepresentativeFraction>
      <gmd:denominator><gco:Integer>25000</gco:Integer></gmd:denominator>
    </gmd:MD_RepresentativeFraction></gmd:equivalentScale></gmd:MD_Resolution></gmd:spatialResolution>
  </gmd:MD_DataIdentification></gmd:identificationInfo>
  <gmd:contentInfo><gmd:MD_FeatureCatalogueDescription><gmd:featureCatalogueCitation><gmd:CI_Citation>
    <gmd:title><gco:CharacterString>EDGV</gco:CharacterString></gmd:title>
    <gmd:edition><gco:CharacterString>{edition}</gco:CharacterString></gmd:edition>
  </gmd:CI_Citation></gmd:featureCatalogueCitation></gmd:MD_FeatureCatalogueDescription></gmd:contentInfo>
</gmd:MD_Metadata>"#
    )
}

pub const DRAINAGE: LayerSpec<'static> = LayerSpec {
    name: "HID_Trecho_Drenagem_L",
    geometry_type: OGRwkbGeometryType::wkbLineString,
    features: &[
        ("LINESTRING (-47.9 -15.8,-47.8 -15.7)", "Córrego Fundo"),
        ("LINESTRING (-47.7 -15.6,-47.6 -15.5)", "Ribeirão Preto"),
        ("LINESTRING (-47.5 -15.4,-47.4 -15.3)", "Rio Claro"),
    ],
};

pub const BUILDINGS: LayerSpec<'static> = LayerSpec {
    name: "EDU_Edificacao_Ensino_P",
    geometry_type: OGRwkbGeometryType::wkbPoint,
    features: &[("POINT (-47.9 -15.8)", "Escola Municipal")],
};
