//! The orchestrator drives a routed plan phase by phase: cheap scan, form
//! matching, declarations extraction, fill-in persistence, and the
//! extraction log around all of it.

use std::time::Instant;

use rusqlite::Connection;

use crate::config::DEFAULT_COVERAGE_TAG;
use crate::db::DatabaseError;
use crate::db::repository::{
    add_form_to_catalog, close_log_failed, close_log_success, complete_extraction,
    insert_fill_in_values, open_log, save_declarations, LogOutcome, LogStart,
};
use crate::models::{
    BoundingBox, Declarations, FieldCategory, FieldLocation, FillInValue, FormMatch, PolicyForm,
    PolicyFormInput,
};
use crate::pipeline::key_pages::{
    detect_form_numbers, find_key_pages, DetectedFormNumber, KeyPages,
};
use crate::pipeline::matcher::{match_form, MatchContext};
use crate::pipeline::router::{route, Strategy};
use crate::pipeline::traits::{CoverageNormalizer, ExtractFeatures, FormsExtractor};
use crate::pipeline::types::{
    DocumentExtractionResult, FormsOutput, KeyValuePair, PhaseReport, PhaseStatus, ProcessedForm,
};
use crate::pipeline::ExtractionError;

/// Drives extraction for one document at a time. Collaborators are injected
/// at construction; tests substitute fakes.
pub struct DocumentOrchestrator {
    forms: Box<dyn FormsExtractor>,
    normalizer: Option<Box<dyn CoverageNormalizer>>,
}

impl DocumentOrchestrator {
    pub fn new(
        forms: Box<dyn FormsExtractor>,
        normalizer: Option<Box<dyn CoverageNormalizer>>,
    ) -> Self {
        Self { forms, normalizer }
    }

    /// Route, log, and run extraction for one document.
    ///
    /// The log row is closed (completed or failed) before this returns; a
    /// failed run leaves catalog and queue state untouched, so re-invoking
    /// for the same document is always safe.
    pub fn extract_document(
        &self,
        conn: &Connection,
        document_id: &str,
        file_ref: &str,
        document_type: &str,
        carrier: Option<&str>,
        submission_id: Option<&str>,
    ) -> Result<DocumentExtractionResult, ExtractionError> {
        let started = Instant::now();
        let page_count = self.forms.page_count(file_ref)?;
        let plan = route(document_type, page_count, Some(file_ref), false);

        tracing::info!(
            document_id,
            document_type,
            page_count,
            strategy = %plan.strategy,
            estimated_cost = plan.estimated_cost,
            "extraction started"
        );

        let log_id = open_log(
            conn,
            &LogStart {
                document_id,
                filename: Some(file_ref),
                submission_id,
                strategy: plan.strategy.as_str(),
                total_pages: page_count,
                estimated_cost: plan.estimated_cost,
            },
        )?;

        let run = match plan.strategy {
            Strategy::FormsCheckbox => {
                self.run_single_call(file_ref, page_count, ExtractFeatures::forms(), Strategy::FormsCheckbox)
            }
            Strategy::Table => {
                self.run_single_call(file_ref, page_count, ExtractFeatures::tables(), Strategy::Table)
            }
            Strategy::TieredPolicy => {
                self.run_tiered(conn, document_id, file_ref, page_count, carrier)
            }
            Strategy::AdaptiveQuote => {
                if page_count <= 5 {
                    self.run_single_call(
                        file_ref,
                        page_count,
                        ExtractFeatures::forms(),
                        Strategy::FormsCheckbox,
                    )
                } else {
                    self.run_tiered(conn, document_id, file_ref, page_count, carrier)
                }
            }
            Strategy::Vision | Strategy::OcrOnly => Ok(vision_placeholder()),
        };

        match run {
            Ok(outcome) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                close_log_success(
                    conn,
                    &log_id,
                    &LogOutcome {
                        actual_cost: outcome.actual_cost,
                        pages_processed: outcome.pages_processed,
                        duration_ms,
                        key_value_count: outcome.key_value_count,
                        checkbox_count: outcome.checkbox_count,
                        forms_found: outcome.forms_found,
                        forms_matched: outcome.forms_matched,
                        forms_queued: outcome.forms_queued,
                    },
                )?;
                tracing::info!(
                    document_id,
                    actual_cost = outcome.actual_cost,
                    duration_ms,
                    forms_found = outcome.forms_found,
                    "extraction completed"
                );
                Ok(DocumentExtractionResult {
                    document_id: document_id.to_string(),
                    strategy: plan.strategy.as_str().to_string(),
                    total_pages: page_count,
                    estimated_cost: plan.estimated_cost,
                    actual_cost: outcome.actual_cost,
                    pages_processed: outcome.pages_processed,
                    duration_ms,
                    phases: outcome.phases,
                    key_value_count: outcome.key_value_count,
                    checkbox_count: outcome.checkbox_count,
                    forms_found: outcome.forms_found,
                    forms_matched: outcome.forms_matched,
                    forms_queued: outcome.forms_queued,
                    needs_vision: outcome.needs_vision,
                    log_id,
                })
            }
            Err(e) => {
                tracing::error!(document_id, error = %e, "extraction failed");
                close_log_failed(conn, &log_id, &e.to_string())?;
                Err(e)
            }
        }
    }

    /// One collaborator call, wrapped into a single-phase outcome.
    fn run_single_call(
        &self,
        file_ref: &str,
        page_count: u32,
        features: ExtractFeatures,
        strategy: Strategy,
    ) -> Result<RunOutcome, ExtractionError> {
        let output = self.forms.extract(file_ref, &[], features)?;
        let processed = page_count.saturating_sub(output.failed_pages.len() as u32);
        let cost = f64::from(processed) * strategy.rate();
        let status = if output.failed_pages.is_empty() {
            PhaseStatus::Success
        } else {
            PhaseStatus::Partial
        };

        Ok(RunOutcome {
            actual_cost: cost,
            pages_processed: processed,
            phases: vec![PhaseReport {
                name: "full_extraction".to_string(),
                status,
                pages_processed: processed,
                cost,
                detail: failed_pages_detail(&output.failed_pages),
            }],
            key_value_count: output.key_values.len() as u32,
            checkbox_count: output.checkboxes.len() as u32,
            ..RunOutcome::default()
        })
    }

    /// The four-phase tiered path. Phase 1 feeds everything after it, so
    /// its failure is fatal; phase 3 failures degrade to a partial result.
    fn run_tiered(
        &self,
        conn: &Connection,
        document_id: &str,
        file_ref: &str,
        page_count: u32,
        carrier: Option<&str>,
    ) -> Result<RunOutcome, ExtractionError> {
        let mut outcome = RunOutcome::default();

        // Phase 1: cheap scan of every page.
        let scan = self.forms.cheap_scan(file_ref, &[])?;
        let key_pages = find_key_pages(&scan.pages);
        let detected = detect_form_numbers(&scan.pages);
        let scan_cost = scan.pages.len() as f64 * Strategy::OcrOnly.rate();
        outcome.actual_cost += scan_cost;
        outcome.pages_processed += scan.pages.len() as u32;
        outcome.phases.push(PhaseReport {
            name: "cheap_scan".to_string(),
            status: PhaseStatus::Success,
            pages_processed: scan.pages.len() as u32,
            cost: scan_cost,
            detail: Some(format!(
                "{} declaration pages, {} form numbers",
                key_pages.declaration_pages.len(),
                detected.len()
            )),
        });

        // Phase 2: match every detected form number against the catalog.
        outcome.forms_found = detected.len() as u32;
        for d in &detected {
            let ctx = MatchContext {
                source_document_id: Some(document_id),
                page_start: Some(d.page),
                page_end: Some(d.page),
            };
            match match_form(conn, &d.form_number, carrier, &ctx)? {
                FormMatch::Matched { .. } => outcome.forms_matched += 1,
                FormMatch::Queued { .. } | FormMatch::QueuedNew { .. } => {
                    outcome.forms_queued += 1
                }
                FormMatch::NotFound => {}
            }
        }
        outcome.phases.push(PhaseReport {
            name: "catalog_matching".to_string(),
            status: PhaseStatus::Success,
            pages_processed: 0,
            cost: 0.0,
            detail: Some(format!(
                "{} matched, {} queued",
                outcome.forms_matched, outcome.forms_queued
            )),
        });

        // Phase 3: full extraction of the declaration pages. Losing this
        // phase loses data but not the document.
        match self.forms.extract(
            file_ref,
            &key_pages.declaration_pages,
            ExtractFeatures::forms(),
        ) {
            Ok(output) => {
                let attempted = key_pages.declaration_pages.len() as u32;
                let pages = attempted.saturating_sub(output.failed_pages.len() as u32);
                let cost = f64::from(pages) * Strategy::FormsCheckbox.rate();
                outcome.actual_cost += cost;
                outcome.pages_processed += pages;
                outcome.key_value_count = output.key_values.len() as u32;
                outcome.checkbox_count = output.checkboxes.len() as u32;

                let (decls, fill_ins) =
                    parse_declarations(document_id, carrier, &output, &key_pages, &detected);
                save_declarations(conn, &decls)?;
                insert_fill_in_values(conn, document_id, page_count, &fill_ins).map_err(
                    |e| match e {
                        DatabaseError::ConstraintViolation(msg) => ExtractionError::Provenance(msg),
                        other => ExtractionError::Database(other),
                    },
                )?;

                outcome.phases.push(PhaseReport {
                    name: "declarations_extraction".to_string(),
                    status: if output.failed_pages.is_empty() {
                        PhaseStatus::Success
                    } else {
                        PhaseStatus::Partial
                    },
                    pages_processed: pages,
                    cost,
                    detail: Some(format!("{} fill-in values", fill_ins.len())),
                });
            }
            Err(e) => {
                tracing::warn!(document_id, error = %e, "declarations phase failed, continuing");
                outcome.phases.push(PhaseReport {
                    name: "declarations_extraction".to_string(),
                    status: PhaseStatus::Failed,
                    pages_processed: 0,
                    cost: 0.0,
                    detail: Some(e.to_string()),
                });
            }
        }

        // Phase 4: queued forms get their fill-in pages extracted by a
        // follow-on worker, not inline. Only the cost estimate is recorded.
        if outcome.forms_queued > 0 {
            let estimate = key_pages.endorsement_fill_in_pages.len() as f64
                * Strategy::FormsCheckbox.rate();
            outcome.phases.push(PhaseReport {
                name: "follow_on_estimate".to_string(),
                status: PhaseStatus::Success,
                pages_processed: 0,
                cost: 0.0,
                detail: Some(format!(
                    "{} queued forms, ~${estimate:.4} follow-on extraction",
                    outcome.forms_queued
                )),
            });
        }

        Ok(outcome)
    }

    /// Catalog a fully extracted form and close its queue entry. Called by
    /// workers draining the queue.
    ///
    /// Coverage-tag normalization runs only when grants and a carrier are
    /// present; an unavailable normalizer degrades to a default tag rather
    /// than failing the caller.
    pub fn process_extracted_form(
        &self,
        conn: &Connection,
        queue_id: &str,
        form_number: &str,
        carrier: Option<&str>,
        processed: &ProcessedForm,
    ) -> Result<PolicyForm, ExtractionError> {
        let input = PolicyFormInput {
            form_number: form_number.to_string(),
            carrier: carrier.map(str::to_string),
            edition_date: processed.edition_date,
            form_type: processed.form_type,
            coverage_grants: non_empty(&processed.coverage_grants),
            exclusions: non_empty(&processed.exclusions),
            definitions: non_empty(&processed.definitions),
            conditions: non_empty(&processed.conditions),
            key_provisions: non_empty(&processed.key_provisions),
            sublimit_fields: non_empty(&processed.sublimit_fields),
        };

        let form = add_form_to_catalog(conn, &input)?;
        complete_extraction(conn, queue_id, &form.id)?;

        if !processed.coverage_grants.is_empty() && carrier.is_some() {
            let pairs: Vec<(String, String)> = processed
                .coverage_grants
                .iter()
                .map(|g| (g.name.clone(), g.description.clone().unwrap_or_default()))
                .collect();
            let tags = match self.normalizer.as_ref() {
                Some(n) => match n.normalize(&pairs) {
                    Ok(tags) => tags,
                    Err(e) => {
                        tracing::warn!(form_number, error = %e, "normalizer unavailable, default tag");
                        vec![vec![DEFAULT_COVERAGE_TAG.to_string()]; pairs.len()]
                    }
                },
                None => vec![vec![DEFAULT_COVERAGE_TAG.to_string()]; pairs.len()],
            };
            tracing::info!(
                form_number,
                grants = pairs.len(),
                tag_sets = tags.len(),
                "coverage tags synchronized"
            );
        }

        Ok(form)
    }
}

/// Internal accumulator for one run.
#[derive(Debug, Default)]
struct RunOutcome {
    actual_cost: f64,
    pages_processed: u32,
    phases: Vec<PhaseReport>,
    key_value_count: u32,
    checkbox_count: u32,
    forms_found: u32,
    forms_matched: u32,
    forms_queued: u32,
    needs_vision: bool,
}

fn vision_placeholder() -> RunOutcome {
    RunOutcome {
        needs_vision: true,
        phases: vec![PhaseReport {
            name: "vision_handoff".to_string(),
            status: PhaseStatus::Success,
            pages_processed: 0,
            cost: 0.0,
            detail: Some("vision collaborator runs outside this core".to_string()),
        }],
        ..RunOutcome::default()
    }
}

fn failed_pages_detail(failed: &[u32]) -> Option<String> {
    if failed.is_empty() {
        None
    } else {
        Some(format!("failed pages: {failed:?}"))
    }
}

fn non_empty<T: Clone>(v: &[T]) -> Option<Vec<T>> {
    if v.is_empty() {
        None
    } else {
        Some(v.to_vec())
    }
}

// ═══════════════════════════════════════════
// Declarations parsing
// ═══════════════════════════════════════════

/// Map collaborator key-value output into a `Declarations` record plus
/// classified fill-in values, preserving page/bbox provenance throughout.
/// The schedule of forms is the form numbers detected by the cheap scan.
pub fn parse_declarations(
    document_id: &str,
    carrier_hint: Option<&str>,
    output: &FormsOutput,
    key_pages: &KeyPages,
    detected: &[DetectedFormNumber],
) -> (Declarations, Vec<FillInValue>) {
    let mut decls = Declarations::new(document_id);
    decls.carrier = carrier_hint.map(str::to_string);
    decls.source_pages = key_pages.declaration_pages.clone();
    decls
        .source_pages
        .extend(key_pages.schedule_pages.iter().copied());
    decls.source_pages.sort_unstable();
    decls.source_pages.dedup();
    decls.form_schedule = detected.iter().map(|d| d.form_number.clone()).collect();
    decls.extractor = Some(Strategy::FormsCheckbox.as_str().to_string());

    let mut fill_ins = Vec::new();
    let mut confidences = Vec::new();

    for kv in &output.key_values {
        let key = kv.key.to_lowercase();
        let value = kv.value.trim();
        if value.is_empty() {
            continue;
        }
        confidences.push(kv.confidence);

        if key.contains("policy number") || key.contains("policy no") {
            set_field(&mut decls.policy_number, value, "policy_number", kv, &mut decls.field_locations);
        } else if key.contains("named insured") {
            set_field(&mut decls.named_insured, value, "named_insured", kv, &mut decls.field_locations);
        } else if key.contains("address") {
            set_field(&mut decls.insured_address, value, "insured_address", kv, &mut decls.field_locations);
        } else if key.contains("carrier") || key.contains("insurance company") || key.contains("insurer") {
            if decls.carrier.is_none() {
                decls.carrier = Some(value.to_string());
            }
        } else if key.contains("effective") || key.contains("period from") {
            decls.effective_date = decls.effective_date.or_else(|| parse_date_value(value));
            push_fill_in(&mut fill_ins, FieldCategory::Date, kv, value, None);
        } else if key.contains("expiration") || key.contains("expires") {
            decls.expiration_date = decls.expiration_date.or_else(|| parse_date_value(value));
            push_fill_in(&mut fill_ins, FieldCategory::Date, kv, value, None);
        } else if key.contains("premium") {
            if let Some(amount) = parse_money(value) {
                if key.trim() == "premium" || key.contains("total") {
                    decls.premium_total = Some(amount);
                } else {
                    decls
                        .premium_by_coverage
                        .insert(kv.key.clone(), amount);
                }
            }
        } else if key.contains("sublimit") {
            push_fill_in(&mut fill_ins, FieldCategory::Sublimit, kv, value, parse_money(value));
        } else if key.contains("retention") || key.contains("deductible") {
            decls.retentions.insert(kv.key.clone(), value.to_string());
            push_fill_in(&mut fill_ins, FieldCategory::Retention, kv, value, parse_money(value));
        } else if key.contains("limit") || key.contains("aggregate")
            || key.contains("each occurrence")
        {
            decls.limits.insert(kv.key.clone(), value.to_string());
            push_fill_in(&mut fill_ins, FieldCategory::Limit, kv, value, parse_money(value));
        } else if let Some(amount) = parse_money(value) {
            // Unlabeled money is still worth keeping as a fill-in.
            push_fill_in(&mut fill_ins, FieldCategory::Limit, kv, value, Some(amount));
        }
    }

    if !confidences.is_empty() {
        decls.confidence = Some(confidences.iter().sum::<f32>() / confidences.len() as f32);
    }

    (decls, fill_ins)
}

fn set_field(
    slot: &mut Option<String>,
    value: &str,
    field: &str,
    kv: &KeyValuePair,
    locations: &mut Vec<FieldLocation>,
) {
    if slot.is_some() {
        return;
    }
    *slot = Some(value.to_string());
    if let Some(bbox) = kv.bbox {
        locations.push(FieldLocation {
            field: field.to_string(),
            page: kv.page,
            bbox,
        });
    }
}

fn push_fill_in(
    fill_ins: &mut Vec<FillInValue>,
    category: FieldCategory,
    kv: &KeyValuePair,
    value: &str,
    numeric: Option<f64>,
) {
    fill_ins.push(FillInValue {
        field_category: category,
        field_name: kv.key.clone(),
        field_value: value.to_string(),
        field_value_numeric: numeric,
        page: kv.page,
        bbox: kv.bbox.filter(BoundingBox::is_normalized),
        form_number: None,
        confidence: kv.confidence,
        extractor: Strategy::FormsCheckbox.as_str().to_string(),
    });
}

/// "$1,000,000" → 1_000_000.0. Returns None for non-monetary text.
pub fn parse_money(value: &str) -> Option<f64> {
    let cleaned: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let has_money_shape = value.contains('$') || value.contains(',')
        || cleaned.chars().filter(|c| c.is_ascii_digit()).count() >= 3;
    if !has_money_shape {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// Dates as printed on declarations pages: "06/01/2024", "6/1/24",
/// "2024-06-01".
pub fn parse_date_value(value: &str) -> Option<chrono::NaiveDate> {
    let trimmed = value.trim();
    for fmt in ["%m/%d/%Y", "%m/%d/%y", "%Y-%m-%d"] {
        if let Ok(d) = chrono::NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(d);
        }
    }
    None
}
