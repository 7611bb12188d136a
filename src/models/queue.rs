//! Extraction queue entry: a form awaiting its first full extraction.

use serde::{Deserialize, Serialize};

use super::enums::QueueStatus;

/// One queued first-time extraction job.
///
/// At most one entry with a non-terminal status may exist per
/// (form_number, carrier) pair; duplicate discovery reuses the open entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionQueueEntry {
    pub id: String,
    pub form_number: String,
    pub carrier: Option<String>,
    /// Document the form was first seen in.
    pub source_document_id: Option<String>,
    pub page_start: Option<u32>,
    pub page_end: Option<u32>,
    /// Lower = more urgent.
    pub priority: i64,
    pub status: QueueStatus,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub error_message: Option<String>,
    /// Catalog row produced by this job, set on completion.
    pub catalog_entry_id: Option<String>,
}
