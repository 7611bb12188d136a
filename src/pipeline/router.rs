//! Strategy router: maps (document type, page count) to an extraction plan
//! with per-phase cost estimates. Pure and deterministic — routing the same
//! inputs always yields the same plan.

use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_DECLARATION_PAGES, MAX_ENDORSEMENT_FILL_IN_PAGES};

/// Per-page dollar rates for the base strategies.
const RATE_OCR_ONLY: f64 = 0.0015;
const RATE_TABLE: f64 = 0.015;
const RATE_FORMS_CHECKBOX: f64 = 0.05;
const RATE_VISION: f64 = 0.01;

/// How a document (or a phase of one) gets extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    OcrOnly,
    Table,
    FormsCheckbox,
    Vision,
    /// Composite: cheap scan, then targeted forms extraction, then catalog.
    TieredPolicy,
    /// Composite: full extraction for short quotes, tiered-style split for
    /// long ones.
    AdaptiveQuote,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OcrOnly => "ocr_only",
            Self::Table => "table",
            Self::FormsCheckbox => "forms_checkbox",
            Self::Vision => "vision",
            Self::TieredPolicy => "tiered_policy",
            Self::AdaptiveQuote => "adaptive_quote",
        }
    }

    /// Nominal $/page rate. Composite strategies average their
    /// sub-strategies; their plans carry exact per-phase costs instead.
    pub fn rate(&self) -> f64 {
        match self {
            Self::OcrOnly => RATE_OCR_ONLY,
            Self::Table => RATE_TABLE,
            Self::FormsCheckbox => RATE_FORMS_CHECKBOX,
            Self::Vision => RATE_VISION,
            Self::TieredPolicy => (RATE_OCR_ONLY + RATE_FORMS_CHECKBOX) / 2.0,
            Self::AdaptiveQuote => (RATE_FORMS_CHECKBOX + RATE_OCR_ONLY) / 2.0,
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One phase of a plan. `pages` None means the phase decides its own pages
/// at run time (from earlier phases' output); `estimated_pages` is what the
/// cost estimate assumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhasePlan {
    pub name: String,
    pub strategy: Strategy,
    pub pages: Option<Vec<u32>>,
    pub estimated_pages: u32,
    pub purpose: String,
    pub cost: f64,
}

/// The router's output: strategy, ordered phases, and a cost estimate.
/// Produced fresh per routing call, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionPlan {
    pub strategy: Strategy,
    pub estimated_cost: f64,
    /// None = all pages.
    pub pages_to_extract: Option<Vec<u32>>,
    pub phases: Vec<PhasePlan>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentFamily {
    Application,
    Tabular,
    Quote,
    Policy,
    Narrative,
    Unknown,
}

/// Route a document to an extraction plan.
///
/// `document_type` is the classifier's label; `filename` is consulted only
/// when the type alone does not identify a family. `has_checkboxes` is a
/// cheap-scan hint that pulls otherwise-unclassified documents toward the
/// forms strategy.
pub fn route(
    document_type: &str,
    page_count: u32,
    filename: Option<&str>,
    has_checkboxes: bool,
) -> ExtractionPlan {
    let family = classify(document_type, filename);
    tracing::debug!(document_type, page_count, family = ?family, "routing document");

    match family {
        DocumentFamily::Application => {
            single_phase_plan(Strategy::FormsCheckbox, page_count, Vec::new())
        }
        DocumentFamily::Tabular => single_phase_plan(Strategy::Table, page_count, Vec::new()),
        DocumentFamily::Quote => adaptive_quote_plan(page_count),
        DocumentFamily::Policy => tiered_policy_plan(page_count, Vec::new()),
        DocumentFamily::Narrative => single_phase_plan(Strategy::Vision, page_count, Vec::new()),
        DocumentFamily::Unknown => {
            if has_checkboxes {
                single_phase_plan(
                    Strategy::FormsCheckbox,
                    page_count,
                    vec!["unclassified document with checkbox marks".to_string()],
                )
            } else if page_count > 20 {
                tiered_policy_plan(
                    page_count,
                    vec![format!(
                        "unclassified {page_count}-page document assumed policy-like"
                    )],
                )
            } else {
                single_phase_plan(
                    Strategy::Vision,
                    page_count,
                    vec![format!("no routing rule matched '{document_type}', vision fallback")],
                )
            }
        }
    }
}

fn classify(document_type: &str, filename: Option<&str>) -> DocumentFamily {
    let from_type = classify_label(&document_type.to_lowercase());
    if from_type != DocumentFamily::Unknown {
        return from_type;
    }
    match filename {
        Some(name) => classify_label(&name.to_lowercase()),
        None => DocumentFamily::Unknown,
    }
}

fn classify_label(label: &str) -> DocumentFamily {
    const APPLICATION: &[&str] = &["application", "acord", "supplemental", "questionnaire"];
    const TABULAR: &[&str] = &[
        "loss_run",
        "loss run",
        "financial",
        "schedule",
        "statement of values",
        "sov",
    ];
    const QUOTE: &[&str] = &["quote", "binder", "certificate"];
    const POLICY: &[&str] = &["policy", "endorsement", "form"];
    const NARRATIVE: &[&str] = &["email", "narrative", "cover_letter", "cover letter", "letter"];

    let contains_any = |keys: &[&str]| keys.iter().any(|k| label.contains(k));

    if contains_any(APPLICATION) {
        DocumentFamily::Application
    } else if contains_any(TABULAR) {
        DocumentFamily::Tabular
    } else if contains_any(QUOTE) {
        DocumentFamily::Quote
    } else if contains_any(POLICY) {
        DocumentFamily::Policy
    } else if contains_any(NARRATIVE) {
        DocumentFamily::Narrative
    } else {
        DocumentFamily::Unknown
    }
}

fn single_phase_plan(strategy: Strategy, page_count: u32, notes: Vec<String>) -> ExtractionPlan {
    let cost = f64::from(page_count) * strategy.rate();
    ExtractionPlan {
        strategy,
        estimated_cost: cost,
        pages_to_extract: None,
        phases: vec![PhasePlan {
            name: "full_extraction".to_string(),
            strategy,
            pages: None,
            estimated_pages: page_count,
            purpose: "extract every page in one pass".to_string(),
            cost,
        }],
        notes,
    }
}

/// Quotes up to 5 pages get one full pass; longer quotes are assumed to
/// carry an attached policy form, so the declarations pages get the forms
/// rate and the remainder only a cheap fill-in/form-number scan.
fn adaptive_quote_plan(page_count: u32) -> ExtractionPlan {
    if page_count <= 5 {
        let cost = f64::from(page_count) * RATE_FORMS_CHECKBOX;
        return ExtractionPlan {
            strategy: Strategy::AdaptiveQuote,
            estimated_cost: cost,
            pages_to_extract: None,
            phases: vec![PhasePlan {
                name: "full_extraction".to_string(),
                strategy: Strategy::FormsCheckbox,
                pages: None,
                estimated_pages: page_count,
                purpose: "short quote, extract everything".to_string(),
                cost,
            }],
            notes: Vec::new(),
        };
    }

    let dec_pages: Vec<u32> = DEFAULT_DECLARATION_PAGES.to_vec();
    let dec_cost = dec_pages.len() as f64 * RATE_FORMS_CHECKBOX;
    let remaining = page_count - dec_pages.len() as u32;
    let scan_cost = f64::from(remaining) * RATE_OCR_ONLY;

    ExtractionPlan {
        strategy: Strategy::AdaptiveQuote,
        estimated_cost: dec_cost + scan_cost,
        pages_to_extract: None,
        phases: vec![
            PhasePlan {
                name: "declarations_extraction".to_string(),
                strategy: Strategy::FormsCheckbox,
                estimated_pages: dec_pages.len() as u32,
                pages: Some(dec_pages),
                purpose: "quote terms live on the first pages".to_string(),
                cost: dec_cost,
            },
            PhasePlan {
                name: "fill_in_scan".to_string(),
                strategy: Strategy::OcrOnly,
                pages: None,
                estimated_pages: remaining,
                purpose: "locate fill-in values and form numbers in the attached form".to_string(),
                cost: scan_cost,
            },
        ],
        notes: Vec::new(),
    }
}

/// Four phases: cheap full scan, declarations extraction, endorsement
/// fill-in extraction, free catalog lookup. Estimated cost sums phases 1-3.
fn tiered_policy_plan(page_count: u32, mut notes: Vec<String>) -> ExtractionPlan {
    let scan_cost = f64::from(page_count) * RATE_OCR_ONLY;

    let dec_estimate = DEFAULT_DECLARATION_PAGES.len() as u32;
    let dec_cost = f64::from(dec_estimate) * RATE_FORMS_CHECKBOX;

    let fill_in_estimate = MAX_ENDORSEMENT_FILL_IN_PAGES.min(page_count / 5);
    let fill_in_cost = f64::from(fill_in_estimate) * RATE_FORMS_CHECKBOX;

    notes.push(format!(
        "fill-in estimate capped at {fill_in_estimate} pages"
    ));

    ExtractionPlan {
        strategy: Strategy::TieredPolicy,
        estimated_cost: scan_cost + dec_cost + fill_in_cost,
        pages_to_extract: None,
        phases: vec![
            PhasePlan {
                name: "cheap_scan".to_string(),
                strategy: Strategy::OcrOnly,
                pages: None,
                estimated_pages: page_count,
                purpose: "locate key pages and form numbers".to_string(),
                cost: scan_cost,
            },
            PhasePlan {
                name: "declarations_extraction".to_string(),
                strategy: Strategy::FormsCheckbox,
                pages: None,
                estimated_pages: dec_estimate,
                purpose: "full extraction of detected declaration pages".to_string(),
                cost: dec_cost,
            },
            PhasePlan {
                name: "endorsement_fill_ins".to_string(),
                strategy: Strategy::FormsCheckbox,
                pages: None,
                estimated_pages: fill_in_estimate,
                purpose: "full extraction of detected endorsement fill-in pages".to_string(),
                cost: fill_in_cost,
            },
            PhasePlan {
                name: "catalog_lookup".to_string(),
                strategy: Strategy::OcrOnly,
                pages: None,
                estimated_pages: 0,
                purpose: "match detected form numbers against the catalog".to_string(),
                cost: 0.0,
            },
        ],
        notes,
    }
}
