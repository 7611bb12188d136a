//! Value types exchanged between the orchestrator and its collaborators.

use serde::{Deserialize, Serialize};

use crate::models::BoundingBox;

/// Raw text of one page, as returned by a scan or extraction call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageText {
    /// 1-based page number.
    pub page: u32,
    pub text: String,
}

impl PageText {
    pub fn new(page: u32, text: impl Into<String>) -> Self {
        Self {
            page,
            text: text.into(),
        }
    }
}

/// A labeled value the forms collaborator pulled off a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyValuePair {
    pub key: String,
    pub value: String,
    pub page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    pub confidence: f32,
}

/// A checkbox mark with its selection state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckboxMark {
    pub label: String,
    pub selected: bool,
    pub page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

/// Everything a forms-extraction call produced. Pages the collaborator
/// could not read appear in `failed_pages`; their siblings still count.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormsOutput {
    pub pages: Vec<PageText>,
    pub key_values: Vec<KeyValuePair>,
    pub checkboxes: Vec<CheckboxMark>,
    pub failed_pages: Vec<u32>,
}

/// Outcome of one plan phase, inspected rather than thrown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Success,
    /// Some pages or values were lost but processing continued.
    Partial,
    Failed,
}

/// What one phase of a plan actually did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseReport {
    pub name: String,
    pub status: PhaseStatus,
    pub pages_processed: u32,
    pub cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Aggregate result of `extract_document`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentExtractionResult {
    pub document_id: String,
    pub strategy: String,
    pub total_pages: u32,
    pub estimated_cost: f64,
    pub actual_cost: f64,
    pub pages_processed: u32,
    pub duration_ms: u64,
    pub phases: Vec<PhaseReport>,
    pub key_value_count: u32,
    pub checkbox_count: u32,
    pub forms_found: u32,
    pub forms_matched: u32,
    pub forms_queued: u32,
    /// Set when the router fell through to the vision strategy; the vision
    /// collaborator runs outside this core.
    pub needs_vision: bool,
    pub log_id: String,
}

/// Structured boilerplate extracted from one queued form, handed to
/// `process_extracted_form` once a worker has run the full extraction.
#[derive(Debug, Clone, Default)]
pub struct ProcessedForm {
    pub edition_date: Option<chrono::NaiveDate>,
    pub form_type: Option<crate::models::FormType>,
    pub coverage_grants: Vec<crate::models::ProvisionRecord>,
    pub exclusions: Vec<crate::models::ProvisionRecord>,
    pub definitions: Vec<crate::models::ProvisionRecord>,
    pub conditions: Vec<crate::models::ProvisionRecord>,
    pub key_provisions: Vec<crate::models::ProvisionRecord>,
    pub sublimit_fields: Vec<String>,
}
