//! Collaborator interfaces. The orchestrator takes these at construction,
//! so tests substitute fakes and production wires real OCR/vision clients.

use crate::pipeline::types::FormsOutput;
use crate::pipeline::ExtractionError;

/// Feature flags for a forms-extraction call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractFeatures {
    pub forms: bool,
    pub tables: bool,
}

impl ExtractFeatures {
    pub fn forms() -> Self {
        Self {
            forms: true,
            tables: false,
        }
    }

    pub fn tables() -> Self {
        Self {
            forms: false,
            tables: true,
        }
    }
}

/// The OCR/forms collaborator. `file_ref` is opaque to this crate (a path,
/// an object key, whatever the surrounding pipeline uses).
pub trait FormsExtractor {
    /// Number of pages in the document.
    fn page_count(&self, file_ref: &str) -> Result<u32, ExtractionError>;

    /// Cheap text-only scan. `pages` empty = whole document.
    fn cheap_scan(&self, file_ref: &str, pages: &[u32]) -> Result<FormsOutput, ExtractionError>;

    /// Full extraction with key-value pairs and checkboxes. A failure on
    /// one page must not abort the rest; unreadable pages are reported in
    /// `FormsOutput::failed_pages`.
    fn extract(
        &self,
        file_ref: &str,
        pages: &[u32],
        features: ExtractFeatures,
    ) -> Result<FormsOutput, ExtractionError>;
}

/// The coverage-tag normalization collaborator. Maps provision
/// {name, description} pairs onto a controlled vocabulary.
pub trait CoverageNormalizer {
    /// One tag set per input pair, same order. Errors here are absorbed by
    /// the caller with a default tag, never propagated.
    fn normalize(
        &self,
        provisions: &[(String, String)],
    ) -> Result<Vec<Vec<String>>, ExtractionError>;
}
