//! Extraction log: one row per document run, recording the chosen strategy,
//! estimated vs. actual cost, duration, and outcome counts.

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::now_utc;
use crate::config::truncate_error;
use crate::db::DatabaseError;
use crate::models::LogStatus;

/// Identifying details recorded when a run starts.
#[derive(Debug, Clone)]
pub struct LogStart<'a> {
    pub document_id: &'a str,
    pub filename: Option<&'a str>,
    pub submission_id: Option<&'a str>,
    pub strategy: &'a str,
    pub total_pages: u32,
    pub estimated_cost: f64,
}

/// Counts recorded when a run completes.
#[derive(Debug, Clone, Default)]
pub struct LogOutcome {
    pub actual_cost: f64,
    pub pages_processed: u32,
    pub duration_ms: u64,
    pub key_value_count: u32,
    pub checkbox_count: u32,
    pub forms_found: u32,
    pub forms_matched: u32,
    pub forms_queued: u32,
}

/// A persisted log row, as read back for reporting.
#[derive(Debug, Clone)]
pub struct ExtractionLogEntry {
    pub id: String,
    pub document_id: String,
    pub filename: Option<String>,
    pub strategy: String,
    pub total_pages: u32,
    pub estimated_cost: f64,
    pub actual_cost: Option<f64>,
    pub pages_processed: Option<u32>,
    pub duration_ms: Option<u64>,
    pub status: LogStatus,
    pub error_message: Option<String>,
    pub started_at: String,
    pub completed_at: Option<String>,
}

/// Open a log row in `started` state. Returns the new row id.
pub fn open_log(conn: &Connection, start: &LogStart) -> Result<String, DatabaseError> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO extraction_log
         (id, document_id, filename, submission_id, strategy, total_pages,
          estimated_cost, status, started_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'started', ?8)",
        params![
            id,
            start.document_id,
            start.filename,
            start.submission_id,
            start.strategy,
            start.total_pages,
            start.estimated_cost,
            now_utc(),
        ],
    )?;
    Ok(id)
}

/// Mark a run completed and record its outcome counts.
pub fn close_log_success(
    conn: &Connection,
    log_id: &str,
    outcome: &LogOutcome,
) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "UPDATE extraction_log SET
             status = 'completed',
             actual_cost = ?2,
             pages_processed = ?3,
             duration_ms = ?4,
             key_value_count = ?5,
             checkbox_count = ?6,
             forms_found = ?7,
             forms_matched = ?8,
             forms_queued = ?9,
             completed_at = ?10
         WHERE id = ?1 AND status = 'started'",
        params![
            log_id,
            outcome.actual_cost,
            outcome.pages_processed,
            outcome.duration_ms,
            outcome.key_value_count,
            outcome.checkbox_count,
            outcome.forms_found,
            outcome.forms_matched,
            outcome.forms_queued,
            now_utc(),
        ],
    )?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "extraction_log".to_string(),
            id: log_id.to_string(),
        });
    }
    Ok(())
}

/// Mark a run failed. The error text is truncated to a storable length.
pub fn close_log_failed(
    conn: &Connection,
    log_id: &str,
    error: &str,
) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "UPDATE extraction_log SET
             status = 'failed',
             error_message = ?2,
             completed_at = ?3
         WHERE id = ?1 AND status = 'started'",
        params![log_id, truncate_error(error), now_utc()],
    )?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "extraction_log".to_string(),
            id: log_id.to_string(),
        });
    }
    Ok(())
}

/// Log rows started on or after `since` (same TEXT format as `now_utc`),
/// newest first.
pub fn logs_since(conn: &Connection, since: &str) -> Result<Vec<ExtractionLogEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, document_id, filename, strategy, total_pages, estimated_cost,
                actual_cost, pages_processed, duration_ms, status, error_message,
                started_at, completed_at
         FROM extraction_log
         WHERE started_at >= ?1
         ORDER BY started_at DESC",
    )?;

    let rows = stmt.query_map(params![since], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, u32>(4)?,
            row.get::<_, f64>(5)?,
            row.get::<_, Option<f64>>(6)?,
            row.get::<_, Option<u32>>(7)?,
            row.get::<_, Option<u64>>(8)?,
            row.get::<_, String>(9)?,
            row.get::<_, Option<String>>(10)?,
            row.get::<_, String>(11)?,
            row.get::<_, Option<String>>(12)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (
            id,
            document_id,
            filename,
            strategy,
            total_pages,
            estimated_cost,
            actual_cost,
            pages_processed,
            duration_ms,
            status,
            error_message,
            started_at,
            completed_at,
        ) = row?;
        let status = LogStatus::from_str(&status).ok_or_else(|| DatabaseError::InvalidEnum {
            field: "status".to_string(),
            value: status,
        })?;
        entries.push(ExtractionLogEntry {
            id,
            document_id,
            filename,
            strategy,
            total_pages,
            estimated_cost,
            actual_cost,
            pages_processed,
            duration_ms,
            status,
            error_message,
            started_at,
            completed_at,
        });
    }
    Ok(entries)
}

/// (strategy, run count, total actual cost, total pages processed) for runs
/// started on or after `since`, completed runs only.
pub fn cost_by_strategy_since(
    conn: &Connection,
    since: &str,
) -> Result<Vec<(String, u32, f64, u32)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT strategy, COUNT(*),
                COALESCE(SUM(actual_cost), 0.0),
                COALESCE(SUM(pages_processed), 0)
         FROM extraction_log
         WHERE started_at >= ?1 AND status = 'completed'
         GROUP BY strategy
         ORDER BY strategy",
    )?;
    let rows = stmt.query_map(params![since], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, u32>(1)?,
            row.get::<_, f64>(2)?,
            row.get::<_, u32>(3)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
