//! Tagged enumerations shared across the catalog, queue, and store layers.
//!
//! Every status that used to be a bare string in the source system is an
//! exhaustive enum here, with `as_str`/`from_str` for the TEXT columns.

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════
// Form type
// ═══════════════════════════════════════════

/// What kind of policy form a catalog entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormType {
    BasePolicy,
    Endorsement,
    Schedule,
}

impl FormType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BasePolicy => "base_policy",
            Self::Endorsement => "endorsement",
            Self::Schedule => "schedule",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "base_policy" => Some(Self::BasePolicy),
            "endorsement" => Some(Self::Endorsement),
            "schedule" => Some(Self::Schedule),
            _ => None,
        }
    }
}

impl std::fmt::Display for FormType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ═══════════════════════════════════════════
// Queue status
// ═══════════════════════════════════════════

/// Lifecycle of a first-time extraction job.
///
/// Legal transitions: pending→processing (conditional claim),
/// processing→completed, processing→failed, failed→pending (explicit retry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Completed and failed entries never block re-queueing of a form.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ═══════════════════════════════════════════
// Fill-in field category
// ═══════════════════════════════════════════

/// Category of a per-policy variable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCategory {
    Limit,
    Sublimit,
    Retention,
    Date,
    Name,
    ScheduleItem,
}

impl FieldCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Limit => "limit",
            Self::Sublimit => "sublimit",
            Self::Retention => "retention",
            Self::Date => "date",
            Self::Name => "name",
            Self::ScheduleItem => "schedule_item",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "limit" => Some(Self::Limit),
            "sublimit" => Some(Self::Sublimit),
            "retention" => Some(Self::Retention),
            "date" => Some(Self::Date),
            "name" => Some(Self::Name),
            "schedule_item" => Some(Self::ScheduleItem),
            _ => None,
        }
    }
}

impl std::fmt::Display for FieldCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ═══════════════════════════════════════════
// Extraction log status
// ═══════════════════════════════════════════

/// Status of an extraction log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Started,
    Completed,
    Failed,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "started" => Some(Self::Started),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_type_roundtrip() {
        for ft in [FormType::BasePolicy, FormType::Endorsement, FormType::Schedule] {
            assert_eq!(FormType::from_str(ft.as_str()), Some(ft));
        }
    }

    #[test]
    fn queue_status_roundtrip() {
        for st in [
            QueueStatus::Pending,
            QueueStatus::Processing,
            QueueStatus::Completed,
            QueueStatus::Failed,
        ] {
            assert_eq!(QueueStatus::from_str(st.as_str()), Some(st));
        }
    }

    #[test]
    fn queue_status_terminality() {
        assert!(!QueueStatus::Pending.is_terminal());
        assert!(!QueueStatus::Processing.is_terminal());
        assert!(QueueStatus::Completed.is_terminal());
        assert!(QueueStatus::Failed.is_terminal());
    }

    #[test]
    fn field_category_roundtrip() {
        for cat in [
            FieldCategory::Limit,
            FieldCategory::Sublimit,
            FieldCategory::Retention,
            FieldCategory::Date,
            FieldCategory::Name,
            FieldCategory::ScheduleItem,
        ] {
            assert_eq!(FieldCategory::from_str(cat.as_str()), Some(cat));
        }
    }

    #[test]
    fn from_invalid_returns_none() {
        assert_eq!(FormType::from_str("unknown"), None);
        assert_eq!(QueueStatus::from_str(""), None);
        assert_eq!(FieldCategory::from_str("premium"), None);
        assert_eq!(LogStatus::from_str("running"), None);
    }

    #[test]
    fn serde_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&FormType::BasePolicy).unwrap(),
            "\"base_policy\""
        );
        assert_eq!(
            serde_json::to_string(&FieldCategory::ScheduleItem).unwrap(),
            "\"schedule_item\""
        );
        assert_eq!(
            serde_json::to_string(&QueueStatus::Processing).unwrap(),
            "\"processing\""
        );
    }
}
