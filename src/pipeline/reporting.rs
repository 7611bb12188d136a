//! Read-only operational stats over the extraction log.

use rusqlite::Connection;
use serde::Serialize;

use crate::db::repository::{cost_by_strategy_since, logs_since, utc_days_ago, ExtractionLogEntry};
use crate::models::LogStatus;
use crate::pipeline::ExtractionError;

/// Per-strategy rollup of completed runs.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyStats {
    pub strategy: String,
    pub documents: u32,
    pub total_cost: f64,
    pub total_pages: u32,
}

/// Everything an operator dashboard needs for one time window.
#[derive(Debug, Clone)]
pub struct ExtractionStats {
    pub window_days: i64,
    pub total_documents: u32,
    pub completed: u32,
    pub failed: u32,
    pub in_flight: u32,
    pub total_estimated_cost: f64,
    pub total_actual_cost: f64,
    pub by_strategy: Vec<StrategyStats>,
    pub recent: Vec<ExtractionLogEntry>,
}

/// Summarize extraction activity over the last `window_days` days.
pub fn extraction_stats(
    conn: &Connection,
    window_days: i64,
) -> Result<ExtractionStats, ExtractionError> {
    let since = utc_days_ago(window_days);
    let entries = logs_since(conn, &since)?;

    let mut stats = ExtractionStats {
        window_days,
        total_documents: entries.len() as u32,
        completed: 0,
        failed: 0,
        in_flight: 0,
        total_estimated_cost: 0.0,
        total_actual_cost: 0.0,
        by_strategy: Vec::new(),
        recent: Vec::new(),
    };

    for entry in &entries {
        stats.total_estimated_cost += entry.estimated_cost;
        stats.total_actual_cost += entry.actual_cost.unwrap_or(0.0);
        match entry.status {
            LogStatus::Completed => stats.completed += 1,
            LogStatus::Failed => stats.failed += 1,
            LogStatus::Started => stats.in_flight += 1,
        }
    }

    stats.by_strategy = cost_by_strategy_since(conn, &since)?
        .into_iter()
        .map(|(strategy, documents, total_cost, total_pages)| StrategyStats {
            strategy,
            documents,
            total_cost,
            total_pages,
        })
        .collect();

    // logs_since is already newest-first.
    stats.recent = entries.into_iter().take(20).collect();

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{close_log_failed, close_log_success, open_log, LogOutcome, LogStart};
    use crate::db::sqlite::open_memory_database;

    fn run(conn: &Connection, doc: &str, strategy: &str, cost: f64, ok: bool) {
        let id = open_log(
            conn,
            &LogStart {
                document_id: doc,
                filename: None,
                submission_id: None,
                strategy,
                total_pages: 10,
                estimated_cost: cost * 1.1,
            },
        )
        .unwrap();
        if ok {
            close_log_success(
                conn,
                &id,
                &LogOutcome {
                    actual_cost: cost,
                    pages_processed: 10,
                    ..LogOutcome::default()
                },
            )
            .unwrap();
        } else {
            close_log_failed(conn, &id, "boom").unwrap();
        }
    }

    #[test]
    fn stats_roll_up_counts_and_costs() {
        let conn = open_memory_database().unwrap();
        run(&conn, "doc-1", "tiered_policy", 0.40, true);
        run(&conn, "doc-2", "tiered_policy", 0.35, true);
        run(&conn, "doc-3", "adaptive_quote", 0.15, true);
        run(&conn, "doc-4", "forms_checkbox", 0.50, false);

        let stats = extraction_stats(&conn, 7).unwrap();
        assert_eq!(stats.total_documents, 4);
        assert_eq!(stats.completed, 3);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.in_flight, 0);
        assert!((stats.total_actual_cost - 0.90).abs() < 1e-9);

        assert_eq!(stats.by_strategy.len(), 2);
        let tiered = stats
            .by_strategy
            .iter()
            .find(|s| s.strategy == "tiered_policy")
            .unwrap();
        assert_eq!(tiered.documents, 2);
        assert!((tiered.total_cost - 0.75).abs() < 1e-9);
        assert_eq!(tiered.total_pages, 20);

        assert_eq!(stats.recent.len(), 4);
    }

    #[test]
    fn empty_window_is_all_zeroes() {
        let conn = open_memory_database().unwrap();
        let stats = extraction_stats(&conn, 30).unwrap();
        assert_eq!(stats.total_documents, 0);
        assert!(stats.by_strategy.is_empty());
        assert!(stats.recent.is_empty());
    }
}
