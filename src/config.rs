//! Library-level constants and tunable defaults.

pub const LIB_NAME: &str = "formvault";
pub const LIB_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default number of queue entries a worker pulls per drain pass.
pub const DEFAULT_QUEUE_BATCH_SIZE: u32 = 10;

/// Default priority for newly enqueued forms (lower = more urgent).
pub const DEFAULT_QUEUE_PRIORITY: i64 = 5;

/// A processing entry older than this is considered stalled (worker crash
/// mid-extraction) and eligible for `reap_stalled`.
pub const DEFAULT_REAPER_THRESHOLD_MINUTES: i64 = 30;

/// Error messages persisted to the queue and extraction log are truncated
/// to this many bytes.
pub const ERROR_MESSAGE_MAX_LEN: usize = 500;

/// Declaration pages assumed when the cheap scan finds none.
pub const DEFAULT_DECLARATION_PAGES: [u32; 3] = [1, 2, 3];

/// Cap on endorsement fill-in pages included in a tiered cost estimate.
pub const MAX_ENDORSEMENT_FILL_IN_PAGES: u32 = 10;

/// Tag applied when the coverage normalizer is missing or unavailable.
pub const DEFAULT_COVERAGE_TAG: &str = "uncategorized";

/// Suggested tracing filter for binaries embedding this library.
pub fn default_log_filter() -> &'static str {
    "formvault=info"
}

/// Truncate an error message for persistence, respecting UTF-8 boundaries.
pub fn truncate_error(msg: &str) -> String {
    if msg.len() <= ERROR_MESSAGE_MAX_LEN {
        return msg.to_string();
    }
    let mut end = ERROR_MESSAGE_MAX_LEN;
    while !msg.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &msg[..end])
}
