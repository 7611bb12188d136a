//! Fill-in value persistence. Every row keeps enough page/bbox metadata to
//! let a viewer highlight where the value came from, so provenance is
//! validated before anything is written.

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::now_utc;
use crate::db::DatabaseError;
use crate::models::{BoundingBox, FieldCategory, FillInValue};

/// Insert a batch of fill-in values for a document in one transaction.
///
/// Rejects the whole batch if any value has a page outside
/// [1, document_page_count] or a bbox component outside [0, 1].
pub fn insert_fill_in_values(
    conn: &Connection,
    document_id: &str,
    document_page_count: u32,
    values: &[FillInValue],
) -> Result<u32, DatabaseError> {
    for value in values {
        validate_provenance(value, document_page_count)?;
    }

    let tx = conn.unchecked_transaction()?;
    let now = now_utc();

    for value in values {
        tx.execute(
            "INSERT INTO fill_in_values
             (id, document_id, field_category, field_name, field_value,
              field_value_numeric, page, bbox_left, bbox_top, bbox_width,
              bbox_height, form_number, confidence, extractor, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                Uuid::new_v4().to_string(),
                document_id,
                value.field_category.as_str(),
                value.field_name,
                value.field_value,
                value.field_value_numeric,
                value.page,
                value.bbox.map(|b| b.left),
                value.bbox.map(|b| b.top),
                value.bbox.map(|b| b.width),
                value.bbox.map(|b| b.height),
                value.form_number,
                value.confidence,
                value.extractor,
                now,
            ],
        )?;
    }

    tx.commit()?;
    Ok(values.len() as u32)
}

/// All fill-in values recorded for a document, insertion order.
pub fn get_fill_in_values(
    conn: &Connection,
    document_id: &str,
) -> Result<Vec<FillInValue>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT field_category, field_name, field_value, field_value_numeric,
                page, bbox_left, bbox_top, bbox_width, bbox_height,
                form_number, confidence, extractor
         FROM fill_in_values
         WHERE document_id = ?1
         ORDER BY created_at ASC, rowid ASC",
    )?;

    let rows = stmt.query_map(params![document_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<f64>>(3)?,
            row.get::<_, u32>(4)?,
            row.get::<_, Option<f64>>(5)?,
            row.get::<_, Option<f64>>(6)?,
            row.get::<_, Option<f64>>(7)?,
            row.get::<_, Option<f64>>(8)?,
            row.get::<_, Option<String>>(9)?,
            row.get::<_, f32>(10)?,
            row.get::<_, String>(11)?,
        ))
    })?;

    let mut values = Vec::new();
    for row in rows {
        let (category, name, value, numeric, page, left, top, width, height, form, conf, ext) =
            row?;
        let field_category =
            FieldCategory::from_str(&category).ok_or_else(|| DatabaseError::InvalidEnum {
                field: "field_category".to_string(),
                value: category,
            })?;
        let bbox = match (left, top, width, height) {
            (Some(l), Some(t), Some(w), Some(h)) => Some(BoundingBox::new(l, t, w, h)),
            _ => None,
        };
        values.push(FillInValue {
            field_category,
            field_name: name,
            field_value: value,
            field_value_numeric: numeric,
            page,
            bbox,
            form_number: form,
            confidence: conf,
            extractor: ext,
        });
    }
    Ok(values)
}

fn validate_provenance(value: &FillInValue, page_count: u32) -> Result<(), DatabaseError> {
    if value.page < 1 || value.page > page_count {
        return Err(DatabaseError::ConstraintViolation(format!(
            "fill-in '{}' cites page {} of a {}-page document",
            value.field_name, value.page, page_count
        )));
    }
    if let Some(bbox) = &value.bbox {
        if !bbox.is_normalized() {
            return Err(DatabaseError::ConstraintViolation(format!(
                "fill-in '{}' has a bbox outside the unit square",
                value.field_name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn limit_value(name: &str, page: u32) -> FillInValue {
        FillInValue {
            field_category: FieldCategory::Limit,
            field_name: name.into(),
            field_value: "$1,000,000".into(),
            field_value_numeric: Some(1_000_000.0),
            page,
            bbox: Some(BoundingBox::new(0.1, 0.2, 0.3, 0.05)),
            form_number: None,
            confidence: 0.9,
            extractor: "forms_checkbox".into(),
        }
    }

    #[test]
    fn insert_and_read_back() {
        let conn = open_memory_database().unwrap();
        let values = vec![limit_value("Each Occurrence", 2), limit_value("Aggregate", 2)];
        let inserted = insert_fill_in_values(&conn, "doc-1", 10, &values).unwrap();
        assert_eq!(inserted, 2);

        let back = get_fill_in_values(&conn, "doc-1").unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].field_name, "Each Occurrence");
        assert_eq!(back[0].field_value_numeric, Some(1_000_000.0));
        assert!(back[0].bbox.unwrap().is_normalized());
    }

    #[test]
    fn page_out_of_range_rejected() {
        let conn = open_memory_database().unwrap();
        let values = vec![limit_value("Each Occurrence", 11)];
        let err = insert_fill_in_values(&conn, "doc-1", 10, &values).unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
        assert!(get_fill_in_values(&conn, "doc-1").unwrap().is_empty());
    }

    #[test]
    fn page_zero_rejected() {
        let conn = open_memory_database().unwrap();
        let values = vec![limit_value("Each Occurrence", 0)];
        assert!(insert_fill_in_values(&conn, "doc-1", 10, &values).is_err());
    }

    #[test]
    fn denormalized_bbox_rejected() {
        let conn = open_memory_database().unwrap();
        let mut value = limit_value("Each Occurrence", 1);
        value.bbox = Some(BoundingBox::new(0.9, 0.9, 0.5, 0.5)); // components fine
        insert_fill_in_values(&conn, "doc-ok", 10, &[value.clone()]).unwrap();

        value.bbox = Some(BoundingBox::new(1.2, 0.0, 0.1, 0.1));
        let err = insert_fill_in_values(&conn, "doc-bad", 10, &[value]).unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
    }

    #[test]
    fn bbox_is_optional() {
        let conn = open_memory_database().unwrap();
        let mut value = limit_value("Retention", 3);
        value.bbox = None;
        insert_fill_in_values(&conn, "doc-1", 5, &[value]).unwrap();

        let back = get_fill_in_values(&conn, "doc-1").unwrap();
        assert!(back[0].bbox.is_none());
    }

    #[test]
    fn batch_is_atomic_on_validation_failure() {
        let conn = open_memory_database().unwrap();
        let values = vec![limit_value("Good", 1), limit_value("Bad", 99)];
        assert!(insert_fill_in_values(&conn, "doc-1", 10, &values).is_err());
        assert!(get_fill_in_values(&conn, "doc-1").unwrap().is_empty());
    }
}
