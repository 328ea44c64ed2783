//! Opening vector datasources from import files, and finding import files.
//!
//! A `.zip` is a container of shapefile sets: each `.shp` member becomes its
//! own datasource, read in place through GDAL's archive support. Any other
//! path is opened directly. Unreadable datasources are skipped with a
//! warning, so an empty result means "nothing to import", not an error.

use std::path::{Path, PathBuf};

use gdal::Dataset;
use walkdir::WalkDir;

use crate::metadata::locator::{archive_member_names, has_extension};

/// Extensions picked up by directory scans.
pub const IMPORT_EXTENSIONS: &[&str] = &["zip", "gpkg"];

/// A datasource location, either on disk or inside an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasourceHandle {
    Path(PathBuf),
    ArchiveMember { archive: PathBuf, member: String },
}

impl DatasourceHandle {
    /// Path understood by GDAL; archive members go through `/vsizip/`.
    pub fn gdal_path(&self) -> PathBuf {
        match self {
            Self::Path(path) => path.clone(),
            Self::ArchiveMember { archive, member } => {
                let archive = absolute(archive).to_string_lossy().replace('\\', "/");
                PathBuf::from(format!("/vsizip/{archive}/{member}"))
            }
        }
    }
}

impl std::fmt::Display for DatasourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::ArchiveMember { archive, member } => {
                write!(f, "{}!{}", archive.display(), member)
            }
        }
    }
}

/// An open dataset with at least one layer.
pub struct OpenedDatasource {
    pub handle: DatasourceHandle,
    pub dataset: Dataset,
}

impl std::fmt::Debug for OpenedDatasource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedDatasource")
            .field("handle", &self.handle)
            .field("layers", &self.dataset.layer_count())
            .finish()
    }
}

/// Datasource handles inside `path`, without opening them.
pub fn datasource_handles(path: &Path) -> Vec<DatasourceHandle> {
    if !has_extension(path, "zip") {
        return vec![DatasourceHandle::Path(path.to_path_buf())];
    }

    match archive_member_names(path) {
        Ok(names) => {
            let handles: Vec<_> = names
                .into_iter()
                .filter(|name| name.to_lowercase().ends_with(".shp"))
                .map(|member| DatasourceHandle::ArchiveMember {
                    archive: path.to_path_buf(),
                    member,
                })
                .collect();
            if handles.is_empty() {
                tracing::warn!(path = %path.display(), "Archive contains no shapefile");
            }
            handles
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Cannot read archive");
            Vec::new()
        }
    }
}

/// Open every datasource in `path` that has at least one layer.
pub fn open_datasources(path: &Path) -> Vec<OpenedDatasource> {
    datasource_handles(path)
        .into_iter()
        .filter_map(|handle| match Dataset::open(handle.gdal_path()) {
            Ok(dataset) if dataset.layer_count() > 0 => {
                tracing::debug!(datasource = %handle, layers = dataset.layer_count(), "Opened datasource");
                Some(OpenedDatasource { handle, dataset })
            }
            Ok(_) => {
                tracing::warn!(datasource = %handle, "Datasource has no layers, skipping");
                None
            }
            Err(e) => {
                tracing::warn!(datasource = %handle, error = %e, "Cannot open datasource, skipping");
                None
            }
        })
        .collect()
}

/// Import files under `root`, sorted by path.
pub fn collect_import_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        match entry {
            Ok(entry) => {
                let path = entry.path();
                if entry.file_type().is_file()
                    && IMPORT_EXTENSIONS.iter().any(|ext| has_extension(path, ext))
                {
                    files.push(path.to_path_buf());
                }
            }
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "Error accessing entry");
            }
        }
    }
    files.sort();
    files
}

fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
