//! Key-page detection over cheap-scan text: which pages carry the
//! declarations, the schedule of forms, and endorsement fill-ins, plus
//! form-number detection with a false-positive filter.
//!
//! The scoring thresholds here are heuristics, tuned rather than
//! contractual.

use std::sync::OnceLock;

use regex::Regex;

use crate::config::DEFAULT_DECLARATION_PAGES;
use crate::pipeline::types::PageText;

const DECLARATION_MARKERS: [&str; 5] = [
    "declarations",
    "policy number",
    "named insured",
    "policy period",
    "limits of",
];

const SCHEDULE_MARKERS: [&str; 2] = ["schedule of forms", "forms and endorsements"];

const FILL_IN_MARKERS: [&str; 6] = ["$", "sublimit", "retention", "deductible", "limit:", "amount:"];

/// A page qualifies as a declarations page at this score or above.
const DECLARATION_SCORE_MIN: usize = 2;

/// Pages worth spending full extraction on, 1-based.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPages {
    pub declaration_pages: Vec<u32>,
    pub schedule_pages: Vec<u32>,
    pub endorsement_fill_in_pages: Vec<u32>,
    /// True when no declarations page scored high enough and the default
    /// leading pages were assumed instead.
    pub defaulted: bool,
}

/// A form number found in scan text, with the page it appeared on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedFormNumber {
    pub form_number: String,
    pub page: u32,
}

/// Score each page's text for declarations, schedule, and endorsement
/// fill-in markers.
pub fn find_key_pages(pages: &[PageText]) -> KeyPages {
    let mut result = KeyPages::default();

    for page in pages {
        let text = page.text.to_lowercase();

        let score = DECLARATION_MARKERS
            .iter()
            .filter(|m| text.contains(*m))
            .count();
        if score >= DECLARATION_SCORE_MIN {
            result.declaration_pages.push(page.page);
        }

        if SCHEDULE_MARKERS.iter().any(|m| text.contains(m)) {
            result.schedule_pages.push(page.page);
        }

        if text.contains("endorsement") && FILL_IN_MARKERS.iter().any(|m| text.contains(m)) {
            result.endorsement_fill_in_pages.push(page.page);
        }
    }

    if result.declaration_pages.is_empty() {
        let last = pages.iter().map(|p| p.page).max().unwrap_or(0);
        result.declaration_pages = DEFAULT_DECLARATION_PAGES
            .iter()
            .copied()
            .filter(|p| *p <= last)
            .collect();
        result.defaulted = true;
        tracing::debug!(
            pages = ?result.declaration_pages,
            "no declarations page scored, defaulting to leading pages"
        );
    }

    result
}

fn iso_form_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // ISO style: "CG 00 01 04 13" (two/three letters, four digit pairs).
        Regex::new(r"\b([A-Z]{2,3} \d{2} \d{2} \d{2} \d{2})\b").expect("static regex")
    })
}

fn carrier_form_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Carrier style: "UM-GL-100-0417".
        Regex::new(r"\b([A-Z]{2}-[A-Z]{2,4}-\d{2,4}-\d{2,4})\b").expect("static regex")
    })
}

fn labeled_form_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Explicit "Form: XYZ 123" / "Edition: 04 13" references.
        Regex::new(r"(?i)\b(?:form|edition)\s*(?:no\.?|number|#)?\s*[:#]\s*([A-Z0-9][A-Z0-9 /\-]{2,24}[A-Z0-9])")
            .expect("static regex")
    })
}

/// Scan page text for form numbers. Matches are dedup'd on the normalized
/// number, keeping the first page each appeared on.
pub fn detect_form_numbers(pages: &[PageText]) -> Vec<DetectedFormNumber> {
    let mut found: Vec<DetectedFormNumber> = Vec::new();

    let mut push = |raw: &str, page: u32| {
        let normalized = normalize_form_number(raw);
        if !accept_form_number(&normalized) {
            return;
        }
        if found.iter().any(|f| f.form_number == normalized) {
            return;
        }
        found.push(DetectedFormNumber {
            form_number: normalized,
            page,
        });
    };

    for page in pages {
        for re in [iso_form_re(), carrier_form_re()] {
            for cap in re.captures_iter(&page.text) {
                if let Some(m) = cap.get(1) {
                    push(m.as_str(), page.page);
                }
            }
        }
        for cap in labeled_form_re().captures_iter(&page.text) {
            if let Some(m) = cap.get(1) {
                push(m.as_str(), page.page);
            }
        }
    }

    found
}

/// Collapse runs of whitespace and uppercase.
pub fn normalize_form_number(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

fn false_positive_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:page\b|\d{4}$|p\.?\s*\d)|(?:\bact\b|\bsection\b|\bchapter\b)")
            .expect("static regex")
    })
}

/// Reject page-number artifacts, bare years, legal-act references, and
/// sentence fragments that leaked through the capture groups.
fn accept_form_number(candidate: &str) -> bool {
    if candidate.len() < 4 || candidate.contains('\n') {
        return false;
    }
    if false_positive_re().is_match(candidate) {
        return false;
    }
    // Sentence fragments: labeled captures can grab trailing prose. A real
    // form number is mostly digits, short letter groups, and separators.
    let words: Vec<&str> = candidate.split(' ').collect();
    let prose_words = words
        .iter()
        .filter(|w| w.len() > 4 && w.chars().all(|c| c.is_ascii_alphabetic()))
        .count();
    prose_words == 0 && words.len() <= 6
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: u32, text: &str) -> PageText {
        PageText::new(n, text)
    }

    #[test]
    fn declarations_need_two_markers() {
        let pages = vec![
            page(1, "COMMERCIAL GENERAL LIABILITY DECLARATIONS\nPolicy Number: GL-1"),
            page(2, "just mentions declarations once"),
            page(3, "body text"),
        ];
        let key = find_key_pages(&pages);
        assert_eq!(key.declaration_pages, vec![1]);
        assert!(!key.defaulted);
    }

    #[test]
    fn no_declarations_defaults_to_leading_pages() {
        let pages: Vec<PageText> = (1..=8).map(|n| page(n, "boilerplate")).collect();
        let key = find_key_pages(&pages);
        assert_eq!(key.declaration_pages, vec![1, 2, 3]);
        assert!(key.defaulted);
    }

    #[test]
    fn default_never_exceeds_document_length() {
        let pages = vec![page(1, "short doc"), page(2, "second page")];
        let key = find_key_pages(&pages);
        assert_eq!(key.declaration_pages, vec![1, 2]);
    }

    #[test]
    fn schedule_and_fill_in_pages_detected() {
        let pages = vec![
            page(4, "SCHEDULE OF FORMS AND ENDORSEMENTS"),
            page(9, "THIS ENDORSEMENT CHANGES THE POLICY. Retention: $25,000"),
            page(10, "endorsement text with no amounts"),
        ];
        let key = find_key_pages(&pages);
        assert_eq!(key.schedule_pages, vec![4]);
        assert_eq!(key.endorsement_fill_in_pages, vec![9]);
    }

    #[test]
    fn iso_and_carrier_numbers_detected() {
        let pages = vec![page(
            4,
            "CG 00 01 04 13  Commercial General Liability\nUM-GL-100-0417 Umbrella Following Form",
        )];
        let found = detect_form_numbers(&pages);
        let numbers: Vec<&str> = found.iter().map(|f| f.form_number.as_str()).collect();
        assert!(numbers.contains(&"CG 00 01 04 13"));
        assert!(numbers.contains(&"UM-GL-100-0417"));
    }

    #[test]
    fn labeled_reference_detected() {
        let pages = vec![page(2, "Form #: IL 00 17 11 98 applies to this policy")];
        let found = detect_form_numbers(&pages);
        assert_eq!(found.len(), 1);
        assert!(found[0].form_number.starts_with("IL 00 17"));
    }

    #[test]
    fn duplicates_keep_first_page() {
        let pages = vec![
            page(4, "CG 00 01 04 13 listed on the schedule"),
            page(17, "CG 00 01 04 13 appears again in the body"),
        ];
        let found = detect_form_numbers(&pages);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].page, 4);
    }

    #[test]
    fn false_positives_rejected() {
        assert!(!accept_form_number("PAGE 3 OF 12"));
        assert!(!accept_form_number("1998"));
        assert!(!accept_form_number("TERRORISM RISK INSURANCE ACT"));
        assert!(!accept_form_number("THE FOLLOWING PROVISIONS APPLY"));
        assert!(accept_form_number("CG 00 01 04 13"));
        assert!(accept_form_number("UM-GL-100-0417"));
    }

    #[test]
    fn normalization_collapses_whitespace() {
        assert_eq!(normalize_form_number("cg  00 01\t04 13"), "CG 00 01 04 13");
    }
}
