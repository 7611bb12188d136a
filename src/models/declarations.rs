//! Per-policy variable data: fill-in values and the declarations record.
//!
//! Everything here carries page/bbox provenance so a downstream viewer can
//! highlight exactly where a value came from.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::enums::FieldCategory;

/// Normalized page rectangle. All components in [0, 1]; (left, top) is the
/// upper-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// All four components within [0, 1].
    pub fn is_normalized(&self) -> bool {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        in_unit(self.left) && in_unit(self.top) && in_unit(self.width) && in_unit(self.height)
    }
}

/// A single variable value discovered on a policy document
/// (a limit, a retention, an edition date, a named insured).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillInValue {
    pub field_category: FieldCategory,
    pub field_name: String,
    pub field_value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_value_numeric: Option<f64>,
    /// 1-based page number within the source document.
    pub page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    /// Form this value fills in, when the association is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_number: Option<String>,
    pub confidence: f32,
    /// Which extraction strategy produced this value.
    pub extractor: String,
}

/// Where a declarations field was found on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldLocation {
    pub field: String,
    pub page: u32,
    pub bbox: BoundingBox,
}

/// Structured summary of a policy's core terms, one logical record per
/// document. Persisted with merge-upsert semantics: a later save only
/// replaces fields it actually supplies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Declarations {
    pub document_id: String,
    pub policy_number: Option<String>,
    pub carrier: Option<String>,
    pub named_insured: Option<String>,
    pub insured_address: Option<String>,
    pub effective_date: Option<chrono::NaiveDate>,
    pub expiration_date: Option<chrono::NaiveDate>,
    /// Coverage label → limit text as printed (e.g. "$1,000,000").
    pub limits: BTreeMap<String, String>,
    /// Coverage label → retention/deductible text as printed.
    pub retentions: BTreeMap<String, String>,
    pub premium_total: Option<f64>,
    pub premium_by_coverage: BTreeMap<String, f64>,
    /// Form numbers listed on the schedule of forms.
    pub form_schedule: Vec<String>,
    /// Pages the declarations data was read from.
    pub source_pages: Vec<u32>,
    pub field_locations: Vec<FieldLocation>,
    pub extractor: Option<String>,
    pub confidence: Option<f32>,
}

impl Declarations {
    pub fn new(document_id: &str) -> Self {
        Self {
            document_id: document_id.to_string(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_normalized_bounds() {
        assert!(BoundingBox::new(0.0, 0.0, 1.0, 1.0).is_normalized());
        assert!(BoundingBox::new(0.1, 0.9, 0.3, 0.05).is_normalized());
        assert!(!BoundingBox::new(-0.1, 0.0, 0.5, 0.5).is_normalized());
        assert!(!BoundingBox::new(0.0, 0.0, 1.5, 0.5).is_normalized());
    }

    #[test]
    fn declarations_new_is_empty() {
        let d = Declarations::new("doc-1");
        assert_eq!(d.document_id, "doc-1");
        assert!(d.policy_number.is_none());
        assert!(d.limits.is_empty());
        assert!(d.form_schedule.is_empty());
    }

    #[test]
    fn fill_in_value_serde_skips_nulls() {
        let v = FillInValue {
            field_category: FieldCategory::Limit,
            field_name: "Each Occurrence".into(),
            field_value: "$1,000,000".into(),
            field_value_numeric: Some(1_000_000.0),
            page: 2,
            bbox: None,
            form_number: None,
            confidence: 0.92,
            extractor: "forms_checkbox".into(),
        };
        let json = serde_json::to_string(&v).unwrap();
        assert!(json.contains("\"limit\""));
        assert!(!json.contains("bbox"));
        assert!(!json.contains("form_number"));
    }

    #[test]
    fn declarations_roundtrips_through_json() {
        let mut d = Declarations::new("doc-7");
        d.policy_number = Some("GL-2024-0042".into());
        d.limits
            .insert("Each Occurrence".into(), "$1,000,000".into());
        d.premium_by_coverage.insert("General Liability".into(), 12_500.0);
        d.form_schedule.push("CG 00 01 04 13".into());

        let json = serde_json::to_string(&d).unwrap();
        let back: Declarations = serde_json::from_str(&json).unwrap();
        assert_eq!(back.policy_number.as_deref(), Some("GL-2024-0042"));
        assert_eq!(back.limits.len(), 1);
        assert_eq!(back.form_schedule, vec!["CG 00 01 04 13".to_string()]);
    }
}
