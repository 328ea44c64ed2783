use geoimport_core::error::CoreError;

/// Error type for the I/O half of the pipeline.
///
/// Most of these never escape a batch: the orchestrator turns them into a
/// per-file [`FileResult`](geoimport_core::import_status::FileResult).
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}
