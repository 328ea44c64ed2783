//! Import pipeline: metadata discovery, datasource opening, feature
//! normalization and the per-file orchestration loop.
//!
//! GDAL handles are not `Send`; every import runs on the caller's task.

pub mod config;
pub mod datasource;
pub mod error;
pub mod metadata;
pub mod orchestrator;
pub mod seed;
pub mod store;
pub mod transform;

pub use config::ImportConfig;
pub use error::ImportError;
pub use orchestrator::Importer;
pub use store::{FeatureSink, FeatureStore, PgFeatureStore};
