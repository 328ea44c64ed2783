//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` (or a connection for transactional writes) as the
//! first argument.

pub mod feature_repo;
pub mod import_event_repo;
pub mod representation_mapping_repo;

pub use feature_repo::FeatureRepo;
pub use import_event_repo::ImportEventRepo;
pub use representation_mapping_repo::RepresentationMappingRepo;
