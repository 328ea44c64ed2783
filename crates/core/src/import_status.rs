//! Per-file import states and the result entries handed back to callers.
//!
//! A batch never fails as a whole: each file ends in [`ImportState::Completed`],
//! [`ImportState::Skipped`] or [`ImportState::Failed`], and the batch report
//! carries one [`FileOutcome`] per attempted file.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Lifecycle of one file inside a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportState {
    Located,
    MetadataResolved,
    DatasourcesOpened,
    Importing,
    Completed,
    Skipped,
    Failed,
}

impl ImportState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Located => "located",
            Self::MetadataResolved => "metadata_resolved",
            Self::DatasourcesOpened => "datasources_opened",
            Self::Importing => "importing",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped | Self::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    ///
    /// `Skipped` is only reachable once datasources have been looked at;
    /// `Failed` is reachable from any non-terminal state.
    pub fn can_transition_to(&self, next: ImportState) -> bool {
        use ImportState::*;
        match (*self, next) {
            (Located, MetadataResolved) => true,
            (MetadataResolved, DatasourcesOpened | Skipped) => true,
            (DatasourcesOpened, Importing) => true,
            (Importing, Completed) => true,
            (current, Failed) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for ImportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Caller-facing status
// ---------------------------------------------------------------------------

/// Status of a per-file result entry, in the wire vocabulary of the upload API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Sucesso,
    Aviso,
    Erro,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sucesso => "sucesso",
            Self::Aviso => "aviso",
            Self::Erro => "erro",
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of importing one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum FileResult {
    Completed {
        written: u64,
        skipped_features: u64,
        replaced: u64,
    },
    Skipped {
        reason: String,
    },
    Failed {
        error: String,
    },
}

impl FileResult {
    pub fn state(&self) -> ImportState {
        match self {
            Self::Completed { .. } => ImportState::Completed,
            Self::Skipped { .. } => ImportState::Skipped,
            Self::Failed { .. } => ImportState::Failed,
        }
    }

    /// Completed imports that dropped features are reported as warnings.
    pub fn status(&self) -> FileStatus {
        match self {
            Self::Completed {
                skipped_features: 0,
                ..
            } => FileStatus::Sucesso,
            Self::Completed { .. } | Self::Skipped { .. } => FileStatus::Aviso,
            Self::Failed { .. } => FileStatus::Erro,
        }
    }

    pub fn written(&self) -> u64 {
        match self {
            Self::Completed { written, .. } => *written,
            _ => 0,
        }
    }

    pub fn detail(&self) -> String {
        match self {
            Self::Completed {
                written,
                skipped_features,
                replaced,
            } => {
                let mut detail = format!("{written} feições importadas");
                if *replaced > 0 {
                    detail.push_str(&format!(", {replaced} substituídas"));
                }
                if *skipped_features > 0 {
                    detail.push_str(&format!(", {skipped_features} ignoradas"));
                }
                detail
            }
            Self::Skipped { reason } => reason.clone(),
            Self::Failed { error } => error.clone(),
        }
    }
}

/// One entry of a batch report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub file_name: String,
    /// `None` when the file failed before its identifier was resolved.
    pub product_id: Option<String>,
    pub result: FileResult,
}

impl FileOutcome {
    pub fn status(&self) -> FileStatus {
        self.result.status()
    }
}

/// Aggregated result of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub files: Vec<FileOutcome>,
    /// Rows touched by the post-pass reclassification, if it ran.
    pub reclassified: Option<u64>,
}

impl BatchReport {
    pub fn push(&mut self, outcome: FileOutcome) {
        self.files.push(outcome);
    }

    pub fn total_written(&self) -> u64 {
        self.files.iter().map(|f| f.result.written()).sum()
    }

    pub fn count_by_status(&self, status: FileStatus) -> usize {
        self.files.iter().filter(|f| f.status() == status).count()
    }
}
