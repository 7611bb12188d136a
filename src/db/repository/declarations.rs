//! Declarations persistence: one logical record per document, saved with
//! the same non-null-merge rule as the catalog. Empty maps and lists are
//! stored as NULL so a sparse later save never clobbers earlier data.

use std::collections::BTreeMap;

use rusqlite::{params, Connection};

use super::now_utc;
use crate::db::DatabaseError;
use crate::models::{Declarations, FieldLocation};

/// Upsert the declarations record for a document. Fields the incoming
/// record leaves as None (or empty, for collections) preserve whatever is
/// already stored.
pub fn save_declarations(conn: &Connection, decls: &Declarations) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let now = now_utc();

    let exists: bool = tx
        .query_row(
            "SELECT 1 FROM declarations WHERE document_id = ?1",
            params![decls.document_id],
            |_| Ok(true),
        )
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(false),
            other => Err(other),
        })?;

    let limits = map_json(&decls.limits)?;
    let retentions = map_json(&decls.retentions)?;
    let premiums = num_map_json(&decls.premium_by_coverage)?;
    let schedule = list_json(&decls.form_schedule)?;
    let pages = list_json(&decls.source_pages)?;
    let locations = list_json(&decls.field_locations)?;

    if exists {
        tx.execute(
            "UPDATE declarations SET
                 policy_number       = COALESCE(?2, policy_number),
                 carrier             = COALESCE(?3, carrier),
                 named_insured       = COALESCE(?4, named_insured),
                 insured_address     = COALESCE(?5, insured_address),
                 effective_date      = COALESCE(?6, effective_date),
                 expiration_date     = COALESCE(?7, expiration_date),
                 limits              = COALESCE(?8, limits),
                 retentions          = COALESCE(?9, retentions),
                 premium_total       = COALESCE(?10, premium_total),
                 premium_by_coverage = COALESCE(?11, premium_by_coverage),
                 form_schedule       = COALESCE(?12, form_schedule),
                 source_pages        = COALESCE(?13, source_pages),
                 field_locations     = COALESCE(?14, field_locations),
                 extractor           = COALESCE(?15, extractor),
                 confidence          = COALESCE(?16, confidence),
                 updated_at          = ?17
             WHERE document_id = ?1",
            params![
                decls.document_id,
                decls.policy_number,
                decls.carrier,
                decls.named_insured,
                decls.insured_address,
                decls.effective_date.map(|d| d.to_string()),
                decls.expiration_date.map(|d| d.to_string()),
                limits,
                retentions,
                decls.premium_total,
                premiums,
                schedule,
                pages,
                locations,
                decls.extractor,
                decls.confidence,
                now,
            ],
        )?;
    } else {
        tx.execute(
            "INSERT INTO declarations
             (document_id, policy_number, carrier, named_insured, insured_address,
              effective_date, expiration_date, limits, retentions, premium_total,
              premium_by_coverage, form_schedule, source_pages, field_locations,
              extractor, confidence, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                     ?15, ?16, ?17, ?17)",
            params![
                decls.document_id,
                decls.policy_number,
                decls.carrier,
                decls.named_insured,
                decls.insured_address,
                decls.effective_date.map(|d| d.to_string()),
                decls.expiration_date.map(|d| d.to_string()),
                limits,
                retentions,
                decls.premium_total,
                premiums,
                schedule,
                pages,
                locations,
                decls.extractor,
                decls.confidence,
                now,
            ],
        )?;
    }

    tx.commit()?;
    Ok(())
}

/// Fetch the declarations record for a document.
pub fn get_declarations(
    conn: &Connection,
    document_id: &str,
) -> Result<Option<Declarations>, DatabaseError> {
    let result = conn.query_row(
        "SELECT document_id, policy_number, carrier, named_insured, insured_address,
                effective_date, expiration_date, limits, retentions, premium_total,
                premium_by_coverage, form_schedule, source_pages, field_locations,
                extractor, confidence
         FROM declarations WHERE document_id = ?1",
        params![document_id],
        |row| {
            Ok(DeclarationsRow {
                document_id: row.get(0)?,
                policy_number: row.get(1)?,
                carrier: row.get(2)?,
                named_insured: row.get(3)?,
                insured_address: row.get(4)?,
                effective_date: row.get(5)?,
                expiration_date: row.get(6)?,
                limits: row.get(7)?,
                retentions: row.get(8)?,
                premium_total: row.get(9)?,
                premium_by_coverage: row.get(10)?,
                form_schedule: row.get(11)?,
                source_pages: row.get(12)?,
                field_locations: row.get(13)?,
                extractor: row.get(14)?,
                confidence: row.get(15)?,
            })
        },
    );

    match result {
        Ok(row) => Ok(Some(declarations_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ═══════════════════════════════════════════
// Internal row mapping
// ═══════════════════════════════════════════

struct DeclarationsRow {
    document_id: String,
    policy_number: Option<String>,
    carrier: Option<String>,
    named_insured: Option<String>,
    insured_address: Option<String>,
    effective_date: Option<String>,
    expiration_date: Option<String>,
    limits: Option<String>,
    retentions: Option<String>,
    premium_total: Option<f64>,
    premium_by_coverage: Option<String>,
    form_schedule: Option<String>,
    source_pages: Option<String>,
    field_locations: Option<String>,
    extractor: Option<String>,
    confidence: Option<f32>,
}

fn declarations_from_row(row: DeclarationsRow) -> Result<Declarations, DatabaseError> {
    Ok(Declarations {
        document_id: row.document_id,
        policy_number: row.policy_number,
        carrier: row.carrier,
        named_insured: row.named_insured,
        insured_address: row.insured_address,
        effective_date: parse_date(row.effective_date)?,
        expiration_date: parse_date(row.expiration_date)?,
        limits: map_from_json(row.limits)?,
        retentions: map_from_json(row.retentions)?,
        premium_total: row.premium_total,
        premium_by_coverage: num_map_from_json(row.premium_by_coverage)?,
        form_schedule: list_from_json(row.form_schedule)?,
        source_pages: list_from_json(row.source_pages)?,
        field_locations: list_from_json::<FieldLocation>(row.field_locations)?,
        extractor: row.extractor,
        confidence: row.confidence,
    })
}

fn parse_date(s: Option<String>) -> Result<Option<chrono::NaiveDate>, DatabaseError> {
    s.as_deref()
        .map(|d| {
            d.parse::<chrono::NaiveDate>()
                .map_err(|_| DatabaseError::InvalidEnum {
                    field: "date".to_string(),
                    value: d.to_string(),
                })
        })
        .transpose()
}

fn map_json(map: &BTreeMap<String, String>) -> Result<Option<String>, DatabaseError> {
    if map.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(map)?))
}

fn num_map_json(map: &BTreeMap<String, f64>) -> Result<Option<String>, DatabaseError> {
    if map.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(map)?))
}

fn list_json<T: serde::Serialize>(list: &[T]) -> Result<Option<String>, DatabaseError> {
    if list.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(list)?))
}

fn map_from_json(json: Option<String>) -> Result<BTreeMap<String, String>, DatabaseError> {
    match json {
        Some(s) => Ok(serde_json::from_str(&s)?),
        None => Ok(BTreeMap::new()),
    }
}

fn num_map_from_json(json: Option<String>) -> Result<BTreeMap<String, f64>, DatabaseError> {
    match json {
        Some(s) => Ok(serde_json::from_str(&s)?),
        None => Ok(BTreeMap::new()),
    }
}

fn list_from_json<T: serde::de::DeserializeOwned>(
    json: Option<String>,
) -> Result<Vec<T>, DatabaseError> {
    match json {
        Some(s) => Ok(serde_json::from_str(&s)?),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::BoundingBox;

    #[test]
    fn save_and_fetch_roundtrip() {
        let conn = open_memory_database().unwrap();
        let mut decls = Declarations::new("doc-1");
        decls.policy_number = Some("GL-2024-0042".into());
        decls.named_insured = Some("Northwind Manufacturing LLC".into());
        decls.effective_date = chrono::NaiveDate::from_ymd_opt(2024, 6, 1);
        decls.limits
            .insert("Each Occurrence".into(), "$1,000,000".into());
        decls.premium_total = Some(48_250.0);
        decls.form_schedule.push("CG 00 01 04 13".into());
        decls.source_pages = vec![1, 2];
        decls.field_locations.push(FieldLocation {
            field: "policy_number".into(),
            page: 1,
            bbox: BoundingBox::new(0.6, 0.1, 0.2, 0.02),
        });
        decls.extractor = Some("forms_checkbox".into());
        decls.confidence = Some(0.93);

        save_declarations(&conn, &decls).unwrap();

        let back = get_declarations(&conn, "doc-1").unwrap().unwrap();
        assert_eq!(back.policy_number.as_deref(), Some("GL-2024-0042"));
        assert_eq!(back.limits.len(), 1);
        assert_eq!(back.source_pages, vec![1, 2]);
        assert_eq!(back.field_locations[0].page, 1);
        assert_eq!(back.premium_total, Some(48_250.0));
    }

    #[test]
    fn sparse_resave_preserves_existing_fields() {
        let conn = open_memory_database().unwrap();
        let mut first = Declarations::new("doc-1");
        first.policy_number = Some("GL-2024-0042".into());
        first.limits
            .insert("Each Occurrence".into(), "$1,000,000".into());
        save_declarations(&conn, &first).unwrap();

        // Later phase only learned the carrier; everything else empty.
        let mut second = Declarations::new("doc-1");
        second.carrier = Some("Acme Mutual".into());
        save_declarations(&conn, &second).unwrap();

        let back = get_declarations(&conn, "doc-1").unwrap().unwrap();
        assert_eq!(back.policy_number.as_deref(), Some("GL-2024-0042"));
        assert_eq!(back.carrier.as_deref(), Some("Acme Mutual"));
        assert_eq!(back.limits.len(), 1);
    }

    #[test]
    fn explicit_resave_replaces_fields() {
        let conn = open_memory_database().unwrap();
        let mut first = Declarations::new("doc-1");
        first.premium_total = Some(10_000.0);
        save_declarations(&conn, &first).unwrap();

        let mut second = Declarations::new("doc-1");
        second.premium_total = Some(12_500.0);
        save_declarations(&conn, &second).unwrap();

        let back = get_declarations(&conn, "doc-1").unwrap().unwrap();
        assert_eq!(back.premium_total, Some(12_500.0));
    }

    #[test]
    fn missing_document_returns_none() {
        let conn = open_memory_database().unwrap();
        assert!(get_declarations(&conn, "nope").unwrap().is_none());
    }
}
