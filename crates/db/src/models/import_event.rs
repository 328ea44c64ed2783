//! Import history models.
//!
//! Events are append-only: no `updated_at`, no update DTO.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use geoimport_core::types::{DbId, Timestamp};

pub const ACTION_ADDED: &str = "added";
pub const ACTION_REMOVED: &str = "removed";

/// A row from the `import_events` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ImportEvent {
    pub id: DbId,
    pub product_id: String,
    pub class_filter: Option<String>,
    pub action: String,
    pub occurred_at: Timestamp,
    pub actor: String,
    pub details: String,
}

/// DTO for appending an event.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateImportEvent {
    pub product_id: String,
    pub class_filter: Option<String>,
    pub action: String,
    pub actor: String,
    pub details: String,
}

impl CreateImportEvent {
    pub fn added(product_id: &str, actor: &str, details: String) -> Self {
        Self {
            product_id: product_id.to_string(),
            class_filter: None,
            action: ACTION_ADDED.to_string(),
            actor: actor.to_string(),
            details,
        }
    }

    pub fn removed(product_id: &str, class_filter: Option<&str>, actor: &str, details: String) -> Self {
        Self {
            product_id: product_id.to_string(),
            class_filter: class_filter.map(str::to_string),
            action: ACTION_REMOVED.to_string(),
            actor: actor.to_string(),
            details,
        }
    }
}
