//! Catalog row types: policy forms, their structured provisions, and the
//! result of matching a detected form number against the catalog.

use serde::{Deserialize, Serialize};

use super::enums::FormType;

/// One structured record inside a form's analyzed content
/// (a coverage grant, an exclusion, a definition, a condition).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionRecord {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Section/paragraph reference within the form text, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl ProvisionRecord {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            reference: None,
        }
    }
}

/// A cataloged policy form. The boilerplate analysis is extracted exactly
/// once; later documents referencing the same form only bump
/// `times_referenced`.
///
/// Identity: (form_number, carrier, edition_date). A NULL carrier means the
/// form is carrier-agnostic (e.g. an ISO standard form).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyForm {
    pub id: String,
    pub form_number: String,
    pub carrier: Option<String>,
    pub edition_date: Option<chrono::NaiveDate>,
    pub form_type: FormType,
    pub coverage_grants: Vec<ProvisionRecord>,
    pub exclusions: Vec<ProvisionRecord>,
    pub definitions: Vec<ProvisionRecord>,
    pub conditions: Vec<ProvisionRecord>,
    pub key_provisions: Vec<ProvisionRecord>,
    /// Names of fields on this form that carry per-policy sublimits.
    pub sublimit_fields: Vec<String>,
    /// How many documents have referenced this form. Monotone.
    pub times_referenced: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Input to the catalog upsert. Every analyzed field is optional: a None
/// never overwrites an existing value (merge-insert, not overwrite-insert).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyFormInput {
    pub form_number: String,
    pub carrier: Option<String>,
    pub edition_date: Option<chrono::NaiveDate>,
    pub form_type: Option<FormType>,
    pub coverage_grants: Option<Vec<ProvisionRecord>>,
    pub exclusions: Option<Vec<ProvisionRecord>>,
    pub definitions: Option<Vec<ProvisionRecord>>,
    pub conditions: Option<Vec<ProvisionRecord>>,
    pub key_provisions: Option<Vec<ProvisionRecord>>,
    pub sublimit_fields: Option<Vec<String>>,
}

impl PolicyFormInput {
    pub fn new(form_number: &str) -> Self {
        Self {
            form_number: form_number.to_string(),
            ..Default::default()
        }
    }
}

/// Result of matching a detected form number against the catalog and queue.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FormMatch {
    /// Cataloged already — reference count was bumped.
    Matched { entry: PolicyForm },
    /// An extraction job for this form already exists; reused it.
    Queued { queue_id: String },
    /// First sighting — a new extraction job was created.
    QueuedNew { queue_id: String },
    /// Form number was empty or rejected by normalization.
    NotFound,
}

impl FormMatch {
    pub fn status_str(&self) -> &'static str {
        match self {
            Self::Matched { .. } => "matched",
            Self::Queued { .. } => "queued",
            Self::QueuedNew { .. } => "queued_new",
            Self::NotFound => "not_found",
        }
    }

    /// Queue id for either queued variant.
    pub fn queue_id(&self) -> Option<&str> {
        match self {
            Self::Queued { queue_id } | Self::QueuedNew { queue_id } => Some(queue_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_match_status_strings() {
        assert_eq!(
            FormMatch::Queued {
                queue_id: "q1".into()
            }
            .status_str(),
            "queued"
        );
        assert_eq!(
            FormMatch::QueuedNew {
                queue_id: "q2".into()
            }
            .status_str(),
            "queued_new"
        );
        assert_eq!(FormMatch::NotFound.status_str(), "not_found");
    }

    #[test]
    fn form_match_queue_id_accessor() {
        let m = FormMatch::Queued {
            queue_id: "q-9".into(),
        };
        assert_eq!(m.queue_id(), Some("q-9"));
        assert_eq!(FormMatch::NotFound.queue_id(), None);
    }

    #[test]
    fn form_match_serializes_with_status_tag() {
        let json = serde_json::to_string(&FormMatch::QueuedNew {
            queue_id: "abc".into(),
        })
        .unwrap();
        assert!(json.contains("\"status\":\"queued_new\""));
        assert!(json.contains("\"queue_id\":\"abc\""));
    }

    #[test]
    fn provision_record_skips_null_fields() {
        let json = serde_json::to_string(&ProvisionRecord::named("Bodily Injury")).unwrap();
        assert!(json.contains("Bodily Injury"));
        assert!(!json.contains("description"));
    }

    #[test]
    fn input_defaults_are_all_none() {
        let input = PolicyFormInput::new("CG 00 01 04 13");
        assert_eq!(input.form_number, "CG 00 01 04 13");
        assert!(input.carrier.is_none());
        assert!(input.coverage_grants.is_none());
        assert!(input.form_type.is_none());
    }
}
