//! Form catalog persistence: merge-upsert, carrier-preferring lookup, and
//! atomic reference counting.
//!
//! Catalog rows are never deleted. An upsert only replaces a column when the
//! caller actually supplies a value for it; reference counts only grow.

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::now_utc;
use crate::db::DatabaseError;
use crate::models::{FormType, PolicyForm, PolicyFormInput, ProvisionRecord};

/// Insert or merge a form into the catalog, keyed on
/// (form_number, carrier, edition_date).
///
/// On conflict each field is replaced only if the incoming value is Some;
/// a None preserves whatever is already stored. Returns the row as stored.
pub fn add_form_to_catalog(
    conn: &Connection,
    input: &PolicyFormInput,
) -> Result<PolicyForm, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let now = now_utc();
    let edition = input.edition_date.map(|d| d.to_string());

    let id = match find_identity_row(&tx, input, edition.as_deref())? {
        Some(id) => {
            merge_existing(&tx, &id, input, &now)?;
            id
        }
        None => insert_new(&tx, input, edition.as_deref(), &now)?,
    };

    tx.commit()?;

    get_form(conn, &id)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "policy_forms".to_string(),
        id,
    })
}

fn find_identity_row(
    conn: &Connection,
    input: &PolicyFormInput,
    edition: Option<&str>,
) -> Result<Option<String>, DatabaseError> {
    conn.query_row(
        "SELECT id FROM policy_forms
         WHERE form_number = ?1 AND carrier IS ?2 AND edition_date IS ?3",
        params![input.form_number, input.carrier, edition],
        |row| row.get(0),
    )
    .map(Some)
    .or_else(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(other.into()),
    })
}

fn merge_existing(
    conn: &Connection,
    id: &str,
    input: &PolicyFormInput,
    now: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE policy_forms SET
             form_type       = COALESCE(?2, form_type),
             coverage_grants = COALESCE(?3, coverage_grants),
             exclusions      = COALESCE(?4, exclusions),
             definitions     = COALESCE(?5, definitions),
             conditions      = COALESCE(?6, conditions),
             key_provisions  = COALESCE(?7, key_provisions),
             sublimit_fields = COALESCE(?8, sublimit_fields),
             updated_at      = ?9
         WHERE id = ?1",
        params![
            id,
            input.form_type.map(|t| t.as_str()),
            provisions_json(&input.coverage_grants)?,
            provisions_json(&input.exclusions)?,
            provisions_json(&input.definitions)?,
            provisions_json(&input.conditions)?,
            provisions_json(&input.key_provisions)?,
            strings_json(&input.sublimit_fields)?,
            now,
        ],
    )?;
    Ok(())
}

/// Insert a fresh identity row. If another writer inserted the same identity
/// between our select and this insert, the unique index fires; recover by
/// merging into the row that won.
fn insert_new(
    conn: &Connection,
    input: &PolicyFormInput,
    edition: Option<&str>,
    now: &str,
) -> Result<String, DatabaseError> {
    let id = Uuid::new_v4().to_string();
    let insert = conn.execute(
        "INSERT INTO policy_forms
         (id, form_number, carrier, edition_date, form_type,
          coverage_grants, exclusions, definitions, conditions,
          key_provisions, sublimit_fields, times_referenced,
          created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0, ?12, ?12)",
        params![
            id,
            input.form_number,
            input.carrier,
            edition,
            input.form_type.unwrap_or(FormType::BasePolicy).as_str(),
            provisions_json(&input.coverage_grants)?,
            provisions_json(&input.exclusions)?,
            provisions_json(&input.definitions)?,
            provisions_json(&input.conditions)?,
            provisions_json(&input.key_provisions)?,
            strings_json(&input.sublimit_fields)?,
            now,
        ],
    );

    match insert {
        Ok(_) => Ok(id),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            let winner = find_identity_row(conn, input, edition)?.ok_or_else(|| {
                DatabaseError::ConstraintViolation(format!(
                    "catalog row for {} vanished during insert race",
                    input.form_number
                ))
            })?;
            merge_existing(conn, &winner, input, now)?;
            Ok(winner)
        }
        Err(e) => Err(e.into()),
    }
}

/// Look up a form by number, preferring a carrier-specific row over a
/// carrier-agnostic one when a carrier is supplied. Without a carrier the
/// agnostic row wins, falling back to any carrier's row.
pub fn lookup_form(
    conn: &Connection,
    form_number: &str,
    carrier: Option<&str>,
) -> Result<Option<PolicyForm>, DatabaseError> {
    let result = match carrier {
        Some(c) => conn.query_row(
            "SELECT id FROM policy_forms
             WHERE form_number = ?1 AND (carrier = ?2 OR carrier IS NULL)
             ORDER BY (carrier IS NOT NULL) DESC, updated_at DESC
             LIMIT 1",
            params![form_number, c],
            |row| row.get::<_, String>(0),
        ),
        None => conn.query_row(
            "SELECT id FROM policy_forms
             WHERE form_number = ?1
             ORDER BY (carrier IS NULL) DESC, updated_at DESC
             LIMIT 1",
            params![form_number],
            |row| row.get::<_, String>(0),
        ),
    };

    let id: Option<String> = result.map(Some).or_else(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(other),
    })?;

    match id {
        Some(id) => get_form(conn, &id),
        None => Ok(None),
    }
}

/// Fetch a catalog row by id.
pub fn get_form(conn: &Connection, id: &str) -> Result<Option<PolicyForm>, DatabaseError> {
    let result = conn.query_row(
        "SELECT id, form_number, carrier, edition_date, form_type,
                coverage_grants, exclusions, definitions, conditions,
                key_provisions, sublimit_fields, times_referenced,
                created_at, updated_at
         FROM policy_forms WHERE id = ?1",
        params![id],
        |row| {
            Ok(FormRow {
                id: row.get(0)?,
                form_number: row.get(1)?,
                carrier: row.get(2)?,
                edition_date: row.get(3)?,
                form_type: row.get(4)?,
                coverage_grants: row.get(5)?,
                exclusions: row.get(6)?,
                definitions: row.get(7)?,
                conditions: row.get(8)?,
                key_provisions: row.get(9)?,
                sublimit_fields: row.get(10)?,
                times_referenced: row.get(11)?,
                created_at: row.get(12)?,
                updated_at: row.get(13)?,
            })
        },
    );

    match result {
        Ok(row) => Ok(Some(form_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Bump the reference count in a single statement. Never a read-then-write.
pub fn increment_reference(conn: &Connection, id: &str) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE policy_forms
         SET times_referenced = times_referenced + 1, updated_at = ?2
         WHERE id = ?1",
        params![id, now_utc()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "policy_forms".to_string(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Number of cataloged forms (for reporting and tests).
pub fn catalog_size(conn: &Connection) -> Result<u32, DatabaseError> {
    let count: u32 = conn.query_row("SELECT COUNT(*) FROM policy_forms", [], |row| row.get(0))?;
    Ok(count)
}

// ═══════════════════════════════════════════
// Internal row mapping
// ═══════════════════════════════════════════

struct FormRow {
    id: String,
    form_number: String,
    carrier: Option<String>,
    edition_date: Option<String>,
    form_type: String,
    coverage_grants: Option<String>,
    exclusions: Option<String>,
    definitions: Option<String>,
    conditions: Option<String>,
    key_provisions: Option<String>,
    sublimit_fields: Option<String>,
    times_referenced: i64,
    created_at: String,
    updated_at: String,
}

fn form_from_row(row: FormRow) -> Result<PolicyForm, DatabaseError> {
    let form_type =
        FormType::from_str(&row.form_type).ok_or_else(|| DatabaseError::InvalidEnum {
            field: "form_type".to_string(),
            value: row.form_type.clone(),
        })?;

    let edition_date = row
        .edition_date
        .as_deref()
        .map(|d| {
            d.parse::<chrono::NaiveDate>()
                .map_err(|_| DatabaseError::InvalidEnum {
                    field: "edition_date".to_string(),
                    value: d.to_string(),
                })
        })
        .transpose()?;

    Ok(PolicyForm {
        id: row.id,
        form_number: row.form_number,
        carrier: row.carrier,
        edition_date,
        form_type,
        coverage_grants: provisions_from_json(row.coverage_grants)?,
        exclusions: provisions_from_json(row.exclusions)?,
        definitions: provisions_from_json(row.definitions)?,
        conditions: provisions_from_json(row.conditions)?,
        key_provisions: provisions_from_json(row.key_provisions)?,
        sublimit_fields: strings_from_json(row.sublimit_fields)?,
        times_referenced: row.times_referenced,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn provisions_json(
    records: &Option<Vec<ProvisionRecord>>,
) -> Result<Option<String>, DatabaseError> {
    records
        .as_ref()
        .map(|r| serde_json::to_string(r).map_err(DatabaseError::from))
        .transpose()
}

fn provisions_from_json(json: Option<String>) -> Result<Vec<ProvisionRecord>, DatabaseError> {
    match json {
        Some(s) => Ok(serde_json::from_str(&s)?),
        None => Ok(Vec::new()),
    }
}

fn strings_json(list: &Option<Vec<String>>) -> Result<Option<String>, DatabaseError> {
    list.as_ref()
        .map(|l| serde_json::to_string(l).map_err(DatabaseError::from))
        .transpose()
}

fn strings_from_json(json: Option<String>) -> Result<Vec<String>, DatabaseError> {
    match json {
        Some(s) => Ok(serde_json::from_str(&s)?),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn grant(name: &str) -> ProvisionRecord {
        ProvisionRecord::named(name)
    }

    #[test]
    fn insert_and_lookup_agnostic_form() {
        let conn = open_memory_database().unwrap();
        let input = PolicyFormInput {
            form_number: "CG 00 01 04 13".into(),
            form_type: Some(FormType::BasePolicy),
            coverage_grants: Some(vec![grant("Bodily Injury and Property Damage")]),
            ..PolicyFormInput::new("CG 00 01 04 13")
        };
        let stored = add_form_to_catalog(&conn, &input).unwrap();
        assert_eq!(stored.times_referenced, 0);
        assert_eq!(stored.coverage_grants.len(), 1);

        let found = lookup_form(&conn, "CG 00 01 04 13", None).unwrap().unwrap();
        assert_eq!(found.id, stored.id);
    }

    #[test]
    fn upsert_merge_never_destroys_existing_fields() {
        let conn = open_memory_database().unwrap();

        let first = PolicyFormInput {
            coverage_grants: Some(vec![grant("Each Occurrence")]),
            ..PolicyFormInput::new("CG 20 10 04 13")
        };
        add_form_to_catalog(&conn, &first).unwrap();

        // Second call supplies only exclusions; grants must survive.
        let second = PolicyFormInput {
            exclusions: Some(vec![grant("Expected or Intended Injury")]),
            ..PolicyFormInput::new("CG 20 10 04 13")
        };
        let merged = add_form_to_catalog(&conn, &second).unwrap();

        assert_eq!(merged.coverage_grants.len(), 1);
        assert_eq!(merged.exclusions.len(), 1);
        assert_eq!(merged.coverage_grants[0].name, "Each Occurrence");
    }

    #[test]
    fn upsert_with_explicit_value_replaces() {
        let conn = open_memory_database().unwrap();

        let first = PolicyFormInput {
            coverage_grants: Some(vec![grant("Old Grant")]),
            ..PolicyFormInput::new("XS 00 99 01 20")
        };
        add_form_to_catalog(&conn, &first).unwrap();

        let second = PolicyFormInput {
            coverage_grants: Some(vec![grant("New Grant"), grant("Second Grant")]),
            ..PolicyFormInput::new("XS 00 99 01 20")
        };
        let merged = add_form_to_catalog(&conn, &second).unwrap();

        assert_eq!(merged.coverage_grants.len(), 2);
        assert_eq!(merged.coverage_grants[0].name, "New Grant");
    }

    #[test]
    fn upsert_does_not_duplicate_identity() {
        let conn = open_memory_database().unwrap();
        let input = PolicyFormInput::new("CG 00 01 04 13");
        add_form_to_catalog(&conn, &input).unwrap();
        add_form_to_catalog(&conn, &input).unwrap();
        assert_eq!(catalog_size(&conn).unwrap(), 1);
    }

    #[test]
    fn insert_race_merges_into_winner_row() {
        let conn = open_memory_database().unwrap();
        let first = PolicyFormInput {
            coverage_grants: Some(vec![grant("Each Occurrence")]),
            ..PolicyFormInput::new("CG 00 01 04 13")
        };
        let winner = add_form_to_catalog(&conn, &first).unwrap();

        // A second writer whose identity select ran before the winner's
        // insert landed: its own insert hits the unique index and must
        // merge into the winner's row instead of surfacing the conflict.
        let late = PolicyFormInput {
            exclusions: Some(vec![grant("Expected or Intended Injury")]),
            ..PolicyFormInput::new("CG 00 01 04 13")
        };
        let id = insert_new(&conn, &late, None, &now_utc()).unwrap();
        assert_eq!(id, winner.id);

        let merged = get_form(&conn, &id).unwrap().unwrap();
        assert_eq!(merged.coverage_grants[0].name, "Each Occurrence");
        assert_eq!(merged.exclusions.len(), 1);
        assert_eq!(catalog_size(&conn).unwrap(), 1);
    }

    #[test]
    fn distinct_editions_are_distinct_rows() {
        let conn = open_memory_database().unwrap();
        let old = PolicyFormInput {
            edition_date: Some(chrono::NaiveDate::from_ymd_opt(2007, 12, 1).unwrap()),
            ..PolicyFormInput::new("CG 00 01 12 07")
        };
        let new = PolicyFormInput {
            edition_date: Some(chrono::NaiveDate::from_ymd_opt(2013, 4, 1).unwrap()),
            ..PolicyFormInput::new("CG 00 01 12 07")
        };
        add_form_to_catalog(&conn, &old).unwrap();
        add_form_to_catalog(&conn, &new).unwrap();
        assert_eq!(catalog_size(&conn).unwrap(), 2);
    }

    #[test]
    fn carrier_specific_preferred_over_agnostic() {
        let conn = open_memory_database().unwrap();
        add_form_to_catalog(&conn, &PolicyFormInput::new("CG 00 01 04 13")).unwrap();
        let specific = PolicyFormInput {
            carrier: Some("Acme Mutual".into()),
            ..PolicyFormInput::new("CG 00 01 04 13")
        };
        add_form_to_catalog(&conn, &specific).unwrap();

        let hit = lookup_form(&conn, "CG 00 01 04 13", Some("Acme Mutual"))
            .unwrap()
            .unwrap();
        assert_eq!(hit.carrier.as_deref(), Some("Acme Mutual"));
    }

    #[test]
    fn agnostic_row_matches_when_no_specific_exists() {
        let conn = open_memory_database().unwrap();
        add_form_to_catalog(&conn, &PolicyFormInput::new("CG 21 47 12 07")).unwrap();

        let hit = lookup_form(&conn, "CG 21 47 12 07", Some("Acme Mutual"))
            .unwrap()
            .unwrap();
        assert!(hit.carrier.is_none());
    }

    #[test]
    fn lookup_without_carrier_prefers_agnostic() {
        let conn = open_memory_database().unwrap();
        let specific = PolicyFormInput {
            carrier: Some("Acme Mutual".into()),
            ..PolicyFormInput::new("AM 05 17 01 22")
        };
        add_form_to_catalog(&conn, &specific).unwrap();
        add_form_to_catalog(&conn, &PolicyFormInput::new("AM 05 17 01 22")).unwrap();

        let hit = lookup_form(&conn, "AM 05 17 01 22", None).unwrap().unwrap();
        assert!(hit.carrier.is_none());
    }

    #[test]
    fn lookup_without_carrier_falls_back_to_specific() {
        let conn = open_memory_database().unwrap();
        let specific = PolicyFormInput {
            carrier: Some("Acme Mutual".into()),
            ..PolicyFormInput::new("AM 99 00 01 22")
        };
        add_form_to_catalog(&conn, &specific).unwrap();

        let hit = lookup_form(&conn, "AM 99 00 01 22", None).unwrap().unwrap();
        assert_eq!(hit.carrier.as_deref(), Some("Acme Mutual"));
    }

    #[test]
    fn lookup_miss_returns_none() {
        let conn = open_memory_database().unwrap();
        assert!(lookup_form(&conn, "ZZ 00 00 00 00", None).unwrap().is_none());
    }

    #[test]
    fn reference_count_increments_atomically() {
        let conn = open_memory_database().unwrap();
        let stored = add_form_to_catalog(&conn, &PolicyFormInput::new("CG 00 01 04 13")).unwrap();

        for _ in 0..5 {
            increment_reference(&conn, &stored.id).unwrap();
        }
        let after = get_form(&conn, &stored.id).unwrap().unwrap();
        assert_eq!(after.times_referenced, 5);
    }

    #[test]
    fn increment_unknown_id_is_not_found() {
        let conn = open_memory_database().unwrap();
        let err = increment_reference(&conn, "nope").unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }
}
