//! Pure domain logic for the geospatial product importer.
//!
//! Nothing in this crate touches the filesystem, the network, or the
//! database. The I/O half of the pipeline lives in `geoimport-pipeline`.

pub mod error;
pub mod import_status;
pub mod metadata;
pub mod naming;
pub mod representation;
pub mod schema;
pub mod types;
