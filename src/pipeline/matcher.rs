//! Form matching: the "extract once, reuse forever" entry point. A detected
//! form number either hits the catalog (reference bump), reuses an open
//! queue entry, or creates a new one.

use rusqlite::Connection;

use crate::db::repository::{
    enqueue_extraction, find_open_entry, get_form, increment_reference, lookup_form, NewQueueEntry,
};
use crate::models::FormMatch;
use crate::pipeline::key_pages::normalize_form_number;
use crate::pipeline::ExtractionError;

/// Optional linkage from a match back to the document it was seen in.
#[derive(Debug, Clone, Default)]
pub struct MatchContext<'a> {
    pub source_document_id: Option<&'a str>,
    pub page_start: Option<u32>,
    pub page_end: Option<u32>,
}

/// Match one form number against the catalog and queue.
///
/// Calling this twice for the same uncataloged form returns the same queue
/// id both times; a second entry is never created while one is open.
pub fn match_form(
    conn: &Connection,
    form_number: &str,
    carrier: Option<&str>,
    ctx: &MatchContext,
) -> Result<FormMatch, ExtractionError> {
    let normalized = normalize_form_number(form_number);
    if normalized.is_empty() {
        return Ok(FormMatch::NotFound);
    }

    if let Some(hit) = lookup_form(conn, &normalized, carrier)? {
        increment_reference(conn, &hit.id)?;
        // Return the post-increment row so callers see the real count.
        let entry = get_form(conn, &hit.id)?.unwrap_or(hit);
        tracing::debug!(
            form_number = %normalized,
            times_referenced = entry.times_referenced,
            "catalog hit"
        );
        return Ok(FormMatch::Matched { entry });
    }

    if let Some(open) = find_open_entry(conn, &normalized, carrier)? {
        return Ok(FormMatch::Queued { queue_id: open.id });
    }

    let mut new = NewQueueEntry::for_form(&normalized, carrier);
    new.source_document_id = ctx.source_document_id.map(str::to_string);
    new.page_start = ctx.page_start;
    new.page_end = ctx.page_end;

    let (queue_id, created) = enqueue_extraction(conn, &new)?;
    if created {
        tracing::info!(form_number = %normalized, queue_id = %queue_id, "queued new form");
        Ok(FormMatch::QueuedNew { queue_id })
    } else {
        // Lost an insert race to a concurrent matcher; same outcome as
        // finding the entry up front.
        Ok(FormMatch::Queued { queue_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{add_form_to_catalog, count_open_entries, get_form};
    use crate::db::sqlite::open_memory_database;
    use crate::models::PolicyFormInput;

    const CGL: &str = "CG 00 01 04 13";

    #[test]
    fn empty_form_number_is_not_found() {
        let conn = open_memory_database().unwrap();
        let m = match_form(&conn, "   ", None, &MatchContext::default()).unwrap();
        assert!(matches!(m, FormMatch::NotFound));
    }

    #[test]
    fn unknown_form_queues_then_reuses_then_matches() {
        let conn = open_memory_database().unwrap();

        // First sighting creates a job.
        let first = match_form(&conn, CGL, None, &MatchContext::default()).unwrap();
        let queue_id = match &first {
            FormMatch::QueuedNew { queue_id } => queue_id.clone(),
            other => panic!("expected queued_new, got {}", other.status_str()),
        };

        // Second sighting before extraction reuses it.
        let second = match_form(&conn, CGL, None, &MatchContext::default()).unwrap();
        assert_eq!(second.queue_id(), Some(queue_id.as_str()));
        assert!(matches!(second, FormMatch::Queued { .. }));
        assert_eq!(count_open_entries(&conn, CGL, None).unwrap(), 1);

        // Once extracted and cataloged, the third sighting matches.
        add_form_to_catalog(&conn, &PolicyFormInput::new(CGL)).unwrap();
        let third = match_form(&conn, CGL, None, &MatchContext::default()).unwrap();
        match third {
            FormMatch::Matched { entry } => {
                let fresh = get_form(&conn, &entry.id).unwrap().unwrap();
                assert_eq!(fresh.times_referenced, 1);
            }
            other => panic!("expected matched, got {}", other.status_str()),
        }
    }

    #[test]
    fn each_match_bumps_reference_count_once() {
        let conn = open_memory_database().unwrap();
        let form = add_form_to_catalog(&conn, &PolicyFormInput::new(CGL)).unwrap();

        for _ in 0..5 {
            match_form(&conn, CGL, None, &MatchContext::default()).unwrap();
        }
        let fresh = get_form(&conn, &form.id).unwrap().unwrap();
        assert_eq!(fresh.times_referenced, 5);
    }

    #[test]
    fn carrier_specific_and_agnostic_queue_separately() {
        let conn = open_memory_database().unwrap();
        let a = match_form(&conn, CGL, Some("Acme Mutual"), &MatchContext::default()).unwrap();
        let b = match_form(&conn, CGL, None, &MatchContext::default()).unwrap();
        assert!(matches!(a, FormMatch::QueuedNew { .. }));
        assert!(matches!(b, FormMatch::QueuedNew { .. }));
        assert_ne!(a.queue_id(), b.queue_id());
    }

    #[test]
    fn match_context_lands_on_the_queue_entry() {
        let conn = open_memory_database().unwrap();
        let ctx = MatchContext {
            source_document_id: Some("doc-7"),
            page_start: Some(14),
            page_end: Some(16),
        };
        let m = match_form(&conn, CGL, None, &ctx).unwrap();
        let entry = crate::db::repository::get_queue_entry(&conn, m.queue_id().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(entry.source_document_id.as_deref(), Some("doc-7"));
        assert_eq!(entry.page_start, Some(14));
        assert_eq!(entry.page_end, Some(16));
    }

    #[test]
    fn normalization_unifies_spacing_variants() {
        let conn = open_memory_database().unwrap();
        match_form(&conn, "cg 00 01  04 13", None, &MatchContext::default()).unwrap();
        let m = match_form(&conn, "CG 00 01 04 13", None, &MatchContext::default()).unwrap();
        assert!(matches!(m, FormMatch::Queued { .. }));
        assert_eq!(count_open_entries(&conn, CGL, None).unwrap(), 1);
    }
}
