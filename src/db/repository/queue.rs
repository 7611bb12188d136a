//! Extraction queue persistence: a small job-queue state machine.
//!
//! The concurrency-safety primitive is the conditional claim in
//! `start_extraction` — a single UPDATE whose affected-row count tells the
//! caller whether it won. Losing the race is a normal outcome, never an
//! error. The schema's partial unique index keeps at most one open entry
//! per (form_number, carrier).

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{now_utc, utc_minutes_ago};
use crate::db::DatabaseError;
use crate::models::{ExtractionQueueEntry, QueueStatus};

/// Parameters for a new queue entry.
#[derive(Debug, Clone, Default)]
pub struct NewQueueEntry {
    pub form_number: String,
    pub carrier: Option<String>,
    pub source_document_id: Option<String>,
    pub page_start: Option<u32>,
    pub page_end: Option<u32>,
    pub priority: i64,
}

impl NewQueueEntry {
    pub fn for_form(form_number: &str, carrier: Option<&str>) -> Self {
        Self {
            form_number: form_number.to_string(),
            carrier: carrier.map(str::to_string),
            priority: crate::config::DEFAULT_QUEUE_PRIORITY,
            ..Default::default()
        }
    }
}

/// Enqueue a form for first-time extraction, reusing any open entry for the
/// same (form_number, carrier).
///
/// Returns (queue_id, created): created=false means an existing open entry
/// was reused. Duplicate discovery must never produce a second open entry.
pub fn enqueue_extraction(
    conn: &Connection,
    new: &NewQueueEntry,
) -> Result<(String, bool), DatabaseError> {
    if let Some(existing) = find_open_entry(conn, &new.form_number, new.carrier.as_deref())? {
        return Ok((existing.id, false));
    }

    let id = Uuid::new_v4().to_string();
    let insert = conn.execute(
        "INSERT INTO extraction_queue
         (id, form_number, carrier, source_document_id, page_start, page_end,
          priority, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8)",
        params![
            id,
            new.form_number,
            new.carrier,
            new.source_document_id,
            new.page_start,
            new.page_end,
            new.priority,
            now_utc(),
        ],
    );

    match insert {
        Ok(_) => Ok((id, true)),
        // Lost an insert race: another caller created the open entry between
        // our SELECT and INSERT. The partial unique index rejects ours, so
        // reuse theirs.
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            let existing = find_open_entry(conn, &new.form_number, new.carrier.as_deref())?
                .ok_or_else(|| {
                    DatabaseError::ConstraintViolation(format!(
                        "open queue entry for {} vanished during insert race",
                        new.form_number
                    ))
                })?;
            Ok((existing.id, false))
        }
        Err(e) => Err(e.into()),
    }
}

/// Find the open (pending or processing) entry for a form, if any.
pub fn find_open_entry(
    conn: &Connection,
    form_number: &str,
    carrier: Option<&str>,
) -> Result<Option<ExtractionQueueEntry>, DatabaseError> {
    let result = conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM extraction_queue
             WHERE form_number = ?1 AND carrier IS ?2
               AND status IN ('pending', 'processing')"
        ),
        params![form_number, carrier],
        map_row,
    );

    match result {
        Ok(row) => Ok(Some(entry_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Pending entries, most urgent first (priority ASC, then oldest first).
pub fn get_pending_extractions(
    conn: &Connection,
    limit: u32,
) -> Result<Vec<ExtractionQueueEntry>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM extraction_queue
         WHERE status = 'pending'
         ORDER BY priority ASC, created_at ASC
         LIMIT ?1"
    ))?;

    let rows = stmt.query_map(params![limit], map_row)?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(entry_from_row(row?)?);
    }
    Ok(entries)
}

/// Fetch a queue entry by id.
pub fn get_queue_entry(
    conn: &Connection,
    queue_id: &str,
) -> Result<Option<ExtractionQueueEntry>, DatabaseError> {
    let result = conn.query_row(
        &format!("SELECT {COLUMNS} FROM extraction_queue WHERE id = ?1"),
        params![queue_id],
        map_row,
    );

    match result {
        Ok(row) => Ok(Some(entry_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Conditionally claim a pending entry (pending → processing).
///
/// Returns whether this caller won the claim. A false return means another
/// worker already owns the entry (or it is no longer pending) — callers
/// must treat that as a silent skip.
pub fn start_extraction(conn: &Connection, queue_id: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE extraction_queue
         SET status = 'processing', started_at = ?2
         WHERE id = ?1 AND status = 'pending'",
        params![queue_id, now_utc()],
    )?;
    Ok(changed == 1)
}

/// Mark a claimed entry completed, recording the catalog row it produced.
/// The entry must currently be non-terminal.
pub fn complete_extraction(
    conn: &Connection,
    queue_id: &str,
    catalog_entry_id: &str,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE extraction_queue
         SET status = 'completed', completed_at = ?2, catalog_entry_id = ?3,
             error_message = NULL
         WHERE id = ?1 AND status IN ('pending', 'processing')",
        params![queue_id, now_utc(), catalog_entry_id],
    )?;
    if changed == 0 {
        return Err(transition_error(conn, queue_id, "completed"));
    }
    Ok(())
}

/// Mark a claimed entry failed with a truncated error message.
/// The entry must currently be non-terminal.
pub fn fail_extraction(
    conn: &Connection,
    queue_id: &str,
    error_message: &str,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE extraction_queue
         SET status = 'failed', completed_at = ?2, error_message = ?3
         WHERE id = ?1 AND status IN ('pending', 'processing')",
        params![
            queue_id,
            now_utc(),
            crate::config::truncate_error(error_message),
        ],
    )?;
    if changed == 0 {
        return Err(transition_error(conn, queue_id, "failed"));
    }
    Ok(())
}

/// Explicit retry: failed → pending, clearing timestamps and error.
pub fn retry_failed_extraction(conn: &Connection, queue_id: &str) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE extraction_queue
         SET status = 'pending', started_at = NULL, completed_at = NULL,
             error_message = NULL
         WHERE id = ?1 AND status = 'failed'",
        params![queue_id],
    )?;
    if changed == 0 {
        return Err(transition_error(conn, queue_id, "pending"));
    }
    Ok(())
}

/// Reset processing entries whose claim is older than `older_than_minutes`
/// back to pending (worker crashed mid-extraction). Returns how many were
/// reaped. Callers schedule this explicitly; it never runs implicitly.
pub fn reap_stalled(conn: &Connection, older_than_minutes: i64) -> Result<u32, DatabaseError> {
    let cutoff = utc_minutes_ago(older_than_minutes);
    let changed = conn.execute(
        "UPDATE extraction_queue
         SET status = 'pending', started_at = NULL
         WHERE status = 'processing' AND started_at < ?1",
        params![cutoff],
    )?;
    if changed > 0 {
        tracing::warn!(reaped = changed, "Reset stalled processing queue entries");
    }
    Ok(changed as u32)
}

/// Count open entries for a form (used by the queue-invariant tests).
pub fn count_open_entries(
    conn: &Connection,
    form_number: &str,
    carrier: Option<&str>,
) -> Result<u32, DatabaseError> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM extraction_queue
         WHERE form_number = ?1 AND carrier IS ?2
           AND status IN ('pending', 'processing')",
        params![form_number, carrier],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ═══════════════════════════════════════════
// Internal row mapping
// ═══════════════════════════════════════════

const COLUMNS: &str = "id, form_number, carrier, source_document_id, page_start, page_end, \
                       priority, status, created_at, started_at, completed_at, error_message, \
                       catalog_entry_id";

struct QueueRow {
    id: String,
    form_number: String,
    carrier: Option<String>,
    source_document_id: Option<String>,
    page_start: Option<u32>,
    page_end: Option<u32>,
    priority: i64,
    status: String,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    error_message: Option<String>,
    catalog_entry_id: Option<String>,
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueueRow> {
    Ok(QueueRow {
        id: row.get(0)?,
        form_number: row.get(1)?,
        carrier: row.get(2)?,
        source_document_id: row.get(3)?,
        page_start: row.get(4)?,
        page_end: row.get(5)?,
        priority: row.get(6)?,
        status: row.get(7)?,
        created_at: row.get(8)?,
        started_at: row.get(9)?,
        completed_at: row.get(10)?,
        error_message: row.get(11)?,
        catalog_entry_id: row.get(12)?,
    })
}

fn entry_from_row(row: QueueRow) -> Result<ExtractionQueueEntry, DatabaseError> {
    let status = QueueStatus::from_str(&row.status).ok_or_else(|| DatabaseError::InvalidEnum {
        field: "status".to_string(),
        value: row.status.clone(),
    })?;

    Ok(ExtractionQueueEntry {
        id: row.id,
        form_number: row.form_number,
        carrier: row.carrier,
        source_document_id: row.source_document_id,
        page_start: row.page_start,
        page_end: row.page_end,
        priority: row.priority,
        status,
        created_at: row.created_at,
        started_at: row.started_at,
        completed_at: row.completed_at,
        error_message: row.error_message,
        catalog_entry_id: row.catalog_entry_id,
    })
}

fn transition_error(conn: &Connection, queue_id: &str, attempted: &str) -> DatabaseError {
    match get_queue_entry(conn, queue_id) {
        Ok(Some(entry)) => DatabaseError::InvalidTransition {
            id: queue_id.to_string(),
            status: entry.status.as_str().to_string(),
            attempted: attempted.to_string(),
        },
        _ => DatabaseError::NotFound {
            entity_type: "extraction_queue".to_string(),
            id: queue_id.to_string(),
        },
    }
}
