//! Queue drain loop. Safe to run from any number of concurrent workers:
//! each entry is taken with a conditional claim, and a lost claim is
//! skipped silently.

use rusqlite::Connection;

use crate::db::repository::{fail_extraction, get_pending_extractions, start_extraction};
use crate::models::ExtractionQueueEntry;
use crate::pipeline::orchestrator::DocumentOrchestrator;
use crate::pipeline::types::ProcessedForm;
use crate::pipeline::ExtractionError;

/// The expensive part a worker supplies: fully extract one claimed form.
pub trait QueuedFormExtractor {
    fn extract_form(&self, entry: &ExtractionQueueEntry)
        -> Result<ProcessedForm, ExtractionError>;
}

/// What one drain pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub claimed: u32,
    pub completed: u32,
    pub failed: u32,
    /// Entries another worker claimed first.
    pub skipped: u32,
}

/// Drain up to `batch_size` pending entries: claim, extract, catalog.
///
/// Extraction errors fail the entry and the pass continues with the next
/// one. No ordering is guaranteed beyond the priority/creation-time poll
/// order.
pub fn drain_queue(
    conn: &Connection,
    orchestrator: &DocumentOrchestrator,
    extractor: &dyn QueuedFormExtractor,
    batch_size: u32,
) -> Result<DrainReport, ExtractionError> {
    let mut report = DrainReport::default();

    for entry in get_pending_extractions(conn, batch_size)? {
        if !start_extraction(conn, &entry.id)? {
            report.skipped += 1;
            continue;
        }
        report.claimed += 1;

        match extractor.extract_form(&entry) {
            Ok(processed) => {
                orchestrator.process_extracted_form(
                    conn,
                    &entry.id,
                    &entry.form_number,
                    entry.carrier.as_deref(),
                    &processed,
                )?;
                report.completed += 1;
            }
            Err(e) => {
                tracing::warn!(
                    queue_id = %entry.id,
                    form_number = %entry.form_number,
                    error = %e,
                    "form extraction failed"
                );
                fail_extraction(conn, &entry.id, &e.to_string())?;
                report.failed += 1;
            }
        }
    }

    if report.claimed > 0 || report.skipped > 0 {
        tracing::info!(
            claimed = report.claimed,
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped,
            "queue drain pass finished"
        );
    }
    Ok(report)
}
