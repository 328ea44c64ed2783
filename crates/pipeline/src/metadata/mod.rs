//! Metadata discovery and ISO 19115/19139 extraction.

pub mod extractor;
pub mod locator;
pub mod xml;

pub use extractor::{extract_metadata, extract_from_bytes};
pub use locator::{locate_metadata, MetadataLocator};
