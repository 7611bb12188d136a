//! The extraction pipeline: strategy routing, key-page detection, form
//! matching against the catalog, and the orchestrator that drives phased
//! extraction per document.

pub mod key_pages;
pub mod matcher;
pub mod orchestrator;
pub mod reporting;
pub mod router;
pub mod traits;
pub mod types;
pub mod worker;

use thiserror::Error;

use crate::db::DatabaseError;

/// Errors surfaced by pipeline operations.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// An external OCR/vision collaborator call failed outright.
    #[error("collaborator failure: {0}")]
    Collaborator(String),

    /// A fill-in value or declarations field cited a page or bbox outside
    /// the document.
    #[error("provenance violation: {0}")]
    Provenance(String),
}
