//! Finds the XML metadata document that belongs to a data file.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use geoimport_core::metadata::select_metadata_member;

use crate::error::ImportError;

/// Largest metadata document read from an archive.
pub const MAX_METADATA_BYTES: u64 = 16 * 1024 * 1024;

/// Where a product's metadata document lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataLocator {
    /// A standalone XML file on disk.
    File(PathBuf),
    /// A member of a zip archive.
    ArchiveMember { archive: PathBuf, member: String },
}

impl MetadataLocator {
    /// Read the whole document into memory.
    pub fn read_bytes(&self) -> Result<Vec<u8>, ImportError> {
        match self {
            Self::File(path) => Ok(std::fs::read(path)?),
            Self::ArchiveMember { archive, member } => {
                let mut zip = zip::ZipArchive::new(File::open(archive)?)?;
                let entry = zip.by_name(member)?;
                let declared = entry.size();
                Ok(read_limited(entry, declared, MAX_METADATA_BYTES)?)
            }
        }
    }
}

/// Read at most `limit` bytes. The declared size only sizes the initial
/// buffer and is never trusted beyond `limit`.
fn read_limited<R: Read>(reader: R, declared: u64, limit: u64) -> std::io::Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(declared.min(limit) as usize);
    reader.take(limit + 1).read_to_end(&mut bytes)?;
    if bytes.len() as u64 > limit {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("metadata document larger than {limit} bytes"),
        ));
    }
    Ok(bytes)
}

impl std::fmt::Display for MetadataLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::ArchiveMember { archive, member } => {
                write!(f, "{}!{}", archive.display(), member)
            }
        }
    }
}

/// Locate the metadata document for `path`.
///
/// Checked in order: the path itself when it is an XML file, an XML file
/// with the same base name beside it, then the best-scoring XML member when
/// the path is a zip archive. `None` is a normal outcome.
pub fn locate_metadata(path: &Path) -> Option<MetadataLocator> {
    if has_extension(path, "xml") && path.is_file() {
        return Some(MetadataLocator::File(path.to_path_buf()));
    }

    for ext in ["xml", "XML"] {
        let sidecar = path.with_extension(ext);
        if sidecar != path && sidecar.is_file() {
            tracing::debug!(path = %path.display(), xml = %sidecar.display(), "Found sidecar metadata");
            return Some(MetadataLocator::File(sidecar));
        }
    }

    if has_extension(path, "zip") {
        match archive_member_names(path) {
            Ok(names) => {
                if let Some(member) = select_metadata_member(names.iter().map(String::as_str)) {
                    tracing::debug!(path = %path.display(), member, "Found metadata inside archive");
                    return Some(MetadataLocator::ArchiveMember {
                        archive: path.to_path_buf(),
                        member: member.to_string(),
                    });
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cannot list archive members");
            }
        }
    }

    tracing::warn!(path = %path.display(), "No metadata document found");
    None
}

/// Names of every entry in a zip archive, in archive order.
pub fn archive_member_names(path: &Path) -> Result<Vec<String>, ImportError> {
    let zip = zip::ZipArchive::new(File::open(path)?)?;
    Ok(zip.file_names().map(str::to_string).collect())
}

pub(crate) fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}
