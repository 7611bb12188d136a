pub mod catalog;
pub mod declarations;
pub mod extraction_log;
pub mod fill_in;
pub mod queue;

pub use catalog::*;
pub use declarations::*;
pub use extraction_log::*;
pub use fill_in::*;
pub use queue::*;

use chrono::Utc;

/// Timestamp format used for every TEXT time column. Lexicographic order
/// matches chronological order, so cutoff comparisons are plain `<`.
pub(crate) fn now_utc() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// A timestamp `minutes` in the past, in the same format as `now_utc`.
pub(crate) fn utc_minutes_ago(minutes: i64) -> String {
    (Utc::now() - chrono::Duration::minutes(minutes))
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

/// A timestamp `days` in the past, in the same format as `now_utc`.
pub(crate) fn utc_days_ago(days: i64) -> String {
    (Utc::now() - chrono::Duration::days(days))
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}
