// ABOUTME: Renders reconciliation payloads into SQL literal value lists
// ABOUTME: Owns NULL handling, quoting, escaping, and the empty-marker contract

use crate::error::{Result, SyncError};
use crate::reconcile::{InsertBatch, Scalar, UpdateKeySet};

/// Render the insert batch as comma-separated parenthesized value tuples,
/// one per row, in the fixed destination column order.
///
/// Returns `None` as the empty marker when the batch has no rows; flow
/// control treats the marker as "skip the insert step". An empty batch is
/// never rendered as `()`.
pub fn render_insert_payload(batch: &InsertBatch) -> Result<Option<String>> {
    if batch.is_empty() {
        return Ok(None);
    }

    let mut tuples = Vec::with_capacity(batch.len());
    for row in &batch.rows {
        let mut values = Vec::with_capacity(15);
        for scalar in row.literals() {
            values.push(render_scalar(&scalar)?);
        }
        tuples.push(format!("({})", values.join(", ")));
    }

    Ok(Some(tuples.join(", ")))
}

/// Render the update key set as single-quoted literals joined by `, `,
/// ready for an `IN (...)` predicate. The empty string is the empty
/// marker: flow control treats it as "skip the update step".
pub fn render_update_keys(keys: &UpdateKeySet) -> Result<String> {
    let mut rendered = Vec::with_capacity(keys.len());
    for key in &keys.keys {
        rendered.push(quote(key)?);
    }
    Ok(rendered.join(", "))
}

fn render_scalar(value: &Scalar) -> Result<String> {
    match value {
        Scalar::Null => Ok("NULL".to_string()),
        Scalar::Text(text) => quote(text),
        Scalar::Date(date) => Ok(format!("'{}'", date.format("%Y-%m-%d"))),
    }
}

/// Single-quote a string literal, doubling embedded quotes.
///
/// A NUL byte cannot appear inside a SQL literal at all, so it fails the
/// render rather than being silently dropped or mangled.
fn quote(text: &str) -> Result<String> {
    if text.contains('\0') {
        return Err(SyncError::Render(format!(
            "value contains a NUL byte: {:?}",
            text
        )));
    }
    Ok(format!("'{}'", text.replace('\'', "''")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{DimensionRow, DIMENSION_COLUMNS};
    use chrono::NaiveDate;

    fn row(id: &str) -> DimensionRow {
        DimensionRow {
            employee_name: Some("Jane Doe".into()),
            employee_id: id.to_string(),
            employee_email: Some("jane@corp.example".into()),
            job: Some("Analyst".into()),
            supervisor_name: Some("Alice".into()),
            company: Some("Acme".into()),
            org_level_1: Some("Corp".into()),
            org_level_2: Some("Finance".into()),
            org_level_3: Some("FP&A".into()),
            org_level_4: Some("Reporting".into()),
            last_hire_date: NaiveDate::from_ymd_opt(2022, 3, 14),
            termination_date: None,
            effective_start_date: NaiveDate::from_ymd_opt(2024, 8, 30).unwrap(),
            effective_end_date: None,
            is_active: true,
        }
    }

    fn batch(rows: Vec<DimensionRow>) -> InsertBatch {
        let new_rows = rows.len();
        InsertBatch {
            rows,
            new_rows,
            changed_rows: 0,
        }
    }

    #[test]
    fn test_empty_batch_renders_as_marker_not_parens() {
        assert_eq!(render_insert_payload(&InsertBatch::default()).unwrap(), None);
    }

    #[test]
    fn test_empty_keys_render_as_empty_string() {
        assert_eq!(render_update_keys(&UpdateKeySet::default()).unwrap(), "");
    }

    #[test]
    fn test_missing_termination_date_renders_unquoted_null() {
        let rendered = render_insert_payload(&batch(vec![row("E001")]))
            .unwrap()
            .unwrap();
        let fields: Vec<&str> = rendered
            .trim_start_matches('(')
            .trim_end_matches(')')
            .split(", ")
            .collect();
        assert_eq!(fields.len(), DIMENSION_COLUMNS.len());
        // termination_date is column 12 (0-based 11), effective_end_date 14 (0-based 13).
        assert_eq!(fields[11], "NULL");
        assert_eq!(fields[13], "NULL");
        assert!(!rendered.contains("'None'"));
        assert!(!rendered.contains("'null'"));
    }

    #[test]
    fn test_rendered_tuple_positions_match_destination_schema() {
        let rendered = render_insert_payload(&batch(vec![row("E001")]))
            .unwrap()
            .unwrap();
        let fields: Vec<&str> = rendered
            .trim_start_matches('(')
            .trim_end_matches(')')
            .split(", ")
            .collect();
        assert_eq!(fields[0], "'Jane Doe'"); // employee_name
        assert_eq!(fields[1], "'E001'"); // employee_id
        assert_eq!(fields[6], "'FP&A'"); // org_level_3 comes first
        assert_eq!(fields[8], "'Corp'"); // org_level_1 third
        assert_eq!(fields[10], "'2022-03-14'"); // last_hire_date
        assert_eq!(fields[12], "'2024-08-30'"); // effective_start_date
        assert_eq!(fields[14], "'Y'"); // is_active
    }

    #[test]
    fn test_multiple_rows_join_with_comma() {
        let rendered = render_insert_payload(&batch(vec![row("E001"), row("E002")]))
            .unwrap()
            .unwrap();
        assert!(rendered.starts_with('('));
        assert!(rendered.contains("), ("));
        assert!(rendered.contains("'E001'"));
        assert!(rendered.contains("'E002'"));
    }

    #[test]
    fn test_embedded_quote_is_doubled() {
        let mut r = row("E001");
        r.employee_name = Some("Miles O'Brien".into());
        let rendered = render_insert_payload(&batch(vec![r])).unwrap().unwrap();
        assert!(rendered.contains("'Miles O''Brien'"));
    }

    #[test]
    fn test_nul_byte_fails_render() {
        let mut r = row("E001");
        r.job = Some("Ana\0lyst".into());
        let err = render_insert_payload(&batch(vec![r])).unwrap_err();
        assert!(matches!(err, SyncError::Render(_)));
    }

    #[test]
    fn test_update_keys_render_quoted_in_order() {
        let keys = UpdateKeySet {
            keys: vec!["E002".into(), "E001".into()],
        };
        assert_eq!(render_update_keys(&keys).unwrap(), "'E002', 'E001'");
    }

    #[test]
    fn test_update_key_with_quote_is_escaped() {
        let keys = UpdateKeySet {
            keys: vec!["E'1".into()],
        };
        assert_eq!(render_update_keys(&keys).unwrap(), "'E''1'");
    }
}
