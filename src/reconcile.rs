// ABOUTME: Core SCD Type 2 reconciliation - classifies source rows against warehouse state
// ABOUTME: Produces the insert batch and the key set of rows to close out

use chrono::NaiveDate;
use std::collections::HashMap;

use crate::error::{Result, SyncError};
use crate::snapshot::SourceRecord;
use crate::warehouse::WarehouseRecord;

/// Destination column order of the employee dimension insert statement.
/// Rendered tuples and bound parameter lists must both follow this order
/// exactly; the org levels appear as 3, 2, 1, 4 in the destination table.
pub const DIMENSION_COLUMNS: [&str; 15] = [
    "employee_name",
    "employee_id",
    "employee_email",
    "job",
    "supervisor_name",
    "company",
    "org_level_3",
    "org_level_2",
    "org_level_1",
    "org_level_4",
    "last_hire_date",
    "termination_date",
    "effective_start_date",
    "effective_end_date",
    "is_active",
];

/// A single typed value destined for one dimension column.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Text(String),
    Date(NaiveDate),
}

impl Scalar {
    fn text(value: &Option<String>) -> Self {
        match value {
            Some(v) => Scalar::Text(v.clone()),
            None => Scalar::Null,
        }
    }

    fn date(value: Option<NaiveDate>) -> Self {
        match value {
            Some(d) => Scalar::Date(d),
            None => Scalar::Null,
        }
    }
}

/// One row of the insert payload: source columns plus the computed
/// effective-dating columns for a newly active dimension version.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionRow {
    pub employee_name: Option<String>,
    pub employee_id: String,
    pub employee_email: Option<String>,
    pub job: Option<String>,
    pub supervisor_name: Option<String>,
    pub company: Option<String>,
    pub org_level_1: Option<String>,
    pub org_level_2: Option<String>,
    pub org_level_3: Option<String>,
    pub org_level_4: Option<String>,
    pub last_hire_date: Option<NaiveDate>,
    pub termination_date: Option<NaiveDate>,
    pub effective_start_date: NaiveDate,
    pub effective_end_date: Option<NaiveDate>,
    pub is_active: bool,
}

impl DimensionRow {
    /// Build a new active dimension version from a source record.
    pub fn from_source(record: &SourceRecord, effective_date: NaiveDate) -> Self {
        Self {
            employee_name: record.employee_name.clone(),
            employee_id: record.employee_id.clone(),
            employee_email: record.employee_email.clone(),
            job: record.job.clone(),
            supervisor_name: record.supervisor_name.clone(),
            company: record.company.clone(),
            org_level_1: record.org_level_1.clone(),
            org_level_2: record.org_level_2.clone(),
            org_level_3: record.org_level_3.clone(),
            org_level_4: record.org_level_4.clone(),
            last_hire_date: record.last_hire_date,
            termination_date: record.termination_date,
            effective_start_date: effective_date,
            effective_end_date: None,
            is_active: true,
        }
    }

    /// Typed values in [`DIMENSION_COLUMNS`] order.
    pub fn literals(&self) -> [Scalar; 15] {
        [
            Scalar::text(&self.employee_name),
            Scalar::Text(self.employee_id.clone()),
            Scalar::text(&self.employee_email),
            Scalar::text(&self.job),
            Scalar::text(&self.supervisor_name),
            Scalar::text(&self.company),
            Scalar::text(&self.org_level_3),
            Scalar::text(&self.org_level_2),
            Scalar::text(&self.org_level_1),
            Scalar::text(&self.org_level_4),
            Scalar::date(self.last_hire_date),
            Scalar::date(self.termination_date),
            Scalar::Date(self.effective_start_date),
            Scalar::date(self.effective_end_date),
            Scalar::Text(if self.is_active { "Y" } else { "N" }.to_string()),
        ]
    }
}

/// Ordered insert payload: all new rows first, then all changed rows,
/// input order preserved within each class.
#[derive(Debug, Clone, Default)]
pub struct InsertBatch {
    pub rows: Vec<DimensionRow>,
    pub new_rows: usize,
    pub changed_rows: usize,
}

impl InsertBatch {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Keys of changed employees whose active warehouse row must be closed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateKeySet {
    pub keys: Vec<String>,
}

impl UpdateKeySet {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    pub insert_batch: InsertBatch,
    pub update_keys: UpdateKeySet,
    pub unchanged: usize,
}

/// Compare a source snapshot against current warehouse state and produce
/// the mutation payloads.
///
/// Left outer join on `employee_id`: every source record is classified as
/// new (no warehouse match), changed (match with a different
/// `supervisor_name`), or unchanged. Supervisor comparison is exact -
/// case-sensitive, no trimming - and is the only change predicate; drift
/// in any other business field goes undetected.
///
/// Pure over its inputs: identical inputs yield identical payloads, and
/// nothing is mutated.
///
/// # Errors
///
/// Returns [`SyncError::EmptyExtract`] when `source` is empty. An empty
/// snapshot almost always means a broken extract, and proceeding would
/// classify nothing instead of signalling the caller to halt.
pub fn reconcile(
    source: &[SourceRecord],
    warehouse: &[WarehouseRecord],
    effective_date: NaiveDate,
) -> Result<ReconcileOutcome> {
    if source.is_empty() {
        return Err(SyncError::EmptyExtract);
    }

    let current = index_warehouse(warehouse);

    let mut new_rows = Vec::new();
    let mut changed_rows = Vec::new();
    let mut update_keys = Vec::new();
    let mut unchanged = 0usize;

    for record in source {
        match current.get(record.employee_id.as_str()) {
            None => {
                new_rows.push(DimensionRow::from_source(record, effective_date));
            }
            Some(existing) => {
                if existing.supervisor_name == record.supervisor_name {
                    unchanged += 1;
                } else {
                    changed_rows.push(DimensionRow::from_source(record, effective_date));
                    update_keys.push(record.employee_id.clone());
                }
            }
        }
    }

    tracing::info!(
        "Reconciled {} source rows against {} warehouse rows: {} new, {} changed, {} unchanged",
        source.len(),
        warehouse.len(),
        new_rows.len(),
        changed_rows.len(),
        unchanged
    );

    let new_count = new_rows.len();
    let changed_count = changed_rows.len();
    let mut rows = new_rows;
    rows.extend(changed_rows);

    Ok(ReconcileOutcome {
        insert_batch: InsertBatch {
            rows,
            new_rows: new_count,
            changed_rows: changed_count,
        },
        update_keys: UpdateKeySet { keys: update_keys },
        unchanged,
    })
}

/// Index warehouse rows by employee_id, guarding against duplicate keys.
///
/// The dimension read is an unfiltered full-table select, so closed
/// historical rows can collide with the active row for the same employee.
/// The active row wins; a collision between two active rows violates the
/// single-active-row invariant and is logged.
fn index_warehouse(warehouse: &[WarehouseRecord]) -> HashMap<&str, &WarehouseRecord> {
    let mut current: HashMap<&str, &WarehouseRecord> = HashMap::new();

    for row in warehouse {
        match current.get(row.employee_id.as_str()) {
            None => {
                current.insert(row.employee_id.as_str(), row);
            }
            Some(existing) => {
                if existing.is_active && row.is_active {
                    tracing::warn!(
                        "Multiple active dimension rows for employee_id {} - keeping the first",
                        row.employee_id
                    );
                } else if row.is_active {
                    current.insert(row.employee_id.as_str(), row);
                }
            }
        }
    }

    current
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(id: &str, supervisor: Option<&str>) -> SourceRecord {
        SourceRecord {
            employee_id: id.to_string(),
            employee_name: Some(format!("Employee {}", id)),
            employee_email: Some(format!("{}@corp.example", id.to_lowercase())),
            job: Some("Analyst".into()),
            supervisor_name: supervisor.map(str::to_string),
            company: Some("Acme".into()),
            org_level_1: Some("Corp".into()),
            org_level_2: Some("Finance".into()),
            org_level_3: Some("FP&A".into()),
            org_level_4: Some("Reporting".into()),
            last_hire_date: NaiveDate::from_ymd_opt(2022, 3, 14),
            termination_date: None,
        }
    }

    fn warehouse(id: &str, supervisor: Option<&str>, active: bool) -> WarehouseRecord {
        WarehouseRecord {
            employee_id: id.to_string(),
            employee_name: Some(format!("Employee {}", id)),
            employee_email: None,
            job: Some("Analyst".into()),
            supervisor_name: supervisor.map(str::to_string),
            company: Some("Acme".into()),
            org_level_1: Some("Corp".into()),
            org_level_2: Some("Finance".into()),
            org_level_3: Some("FP&A".into()),
            org_level_4: Some("Reporting".into()),
            last_hire_date: NaiveDate::from_ymd_opt(2022, 3, 14),
            termination_date: None,
            effective_start_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            effective_end_date: if active {
                None
            } else {
                NaiveDate::from_ymd_opt(2024, 6, 1)
            },
            is_active: active,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 8, 30).unwrap()
    }

    #[test]
    fn test_new_employee_goes_to_insert_only() {
        let outcome = reconcile(&[source("E001", Some("Alice"))], &[], today()).unwrap();
        assert_eq!(outcome.insert_batch.len(), 1);
        assert_eq!(outcome.insert_batch.new_rows, 1);
        assert_eq!(outcome.insert_batch.changed_rows, 0);
        assert!(outcome.update_keys.is_empty());
        assert_eq!(outcome.unchanged, 0);
    }

    #[test]
    fn test_supervisor_change_lands_in_both_payloads() {
        let outcome = reconcile(
            &[source("E001", Some("Bob"))],
            &[warehouse("E001", Some("Alice"), true)],
            today(),
        )
        .unwrap();
        assert_eq!(outcome.update_keys.keys, vec!["E001".to_string()]);
        assert_eq!(outcome.insert_batch.len(), 1);
        assert_eq!(outcome.insert_batch.changed_rows, 1);
        assert_eq!(outcome.insert_batch.rows[0].supervisor_name.as_deref(), Some("Bob"));
    }

    #[test]
    fn test_unchanged_employee_produces_nothing() {
        let outcome = reconcile(
            &[source("E001", Some("Alice"))],
            &[warehouse("E001", Some("Alice"), true)],
            today(),
        )
        .unwrap();
        assert!(outcome.insert_batch.is_empty());
        assert!(outcome.update_keys.is_empty());
        assert_eq!(outcome.unchanged, 1);
    }

    #[test]
    fn test_supervisor_comparison_is_case_sensitive() {
        let outcome = reconcile(
            &[source("E001", Some("alice"))],
            &[warehouse("E001", Some("Alice"), true)],
            today(),
        )
        .unwrap();
        assert_eq!(outcome.update_keys.len(), 1);
    }

    #[test]
    fn test_missing_supervisor_on_both_sides_is_unchanged() {
        let outcome = reconcile(
            &[source("E001", None)],
            &[warehouse("E001", None, true)],
            today(),
        )
        .unwrap();
        assert_eq!(outcome.unchanged, 1);
        assert!(outcome.update_keys.is_empty());
    }

    #[test]
    fn test_empty_source_is_an_error_not_a_noop() {
        let err = reconcile(&[], &[warehouse("E001", Some("Alice"), true)], today()).unwrap_err();
        assert!(matches!(err, SyncError::EmptyExtract));
    }

    #[test]
    fn test_each_key_lands_in_exactly_one_class() {
        let src = vec![
            source("E001", Some("Alice")), // unchanged
            source("E002", Some("Bob")),   // changed
            source("E003", Some("Carol")), // new
        ];
        let wh = vec![
            warehouse("E001", Some("Alice"), true),
            warehouse("E002", Some("Alice"), true),
        ];
        let outcome = reconcile(&src, &wh, today()).unwrap();

        let new_ids: Vec<_> = outcome.insert_batch.rows[..outcome.insert_batch.new_rows]
            .iter()
            .map(|r| r.employee_id.as_str())
            .collect();
        let changed_ids: Vec<_> = outcome.insert_batch.rows[outcome.insert_batch.new_rows..]
            .iter()
            .map(|r| r.employee_id.as_str())
            .collect();

        assert_eq!(new_ids, vec!["E003"]);
        assert_eq!(changed_ids, vec!["E002"]);
        assert_eq!(outcome.update_keys.keys, vec!["E002".to_string()]);
        assert_eq!(outcome.unchanged, 1);
        for id in new_ids {
            assert!(!changed_ids.contains(&id));
        }
    }

    #[test]
    fn test_insert_batch_orders_new_before_changed() {
        let src = vec![
            source("E010", Some("Bob")),   // changed
            source("E011", Some("Carol")), // new
            source("E012", Some("Dave")),  // changed
            source("E013", Some("Erin")),  // new
        ];
        let wh = vec![
            warehouse("E010", Some("Alice"), true),
            warehouse("E012", Some("Alice"), true),
        ];
        let outcome = reconcile(&src, &wh, today()).unwrap();
        let ids: Vec<_> = outcome
            .insert_batch
            .rows
            .iter()
            .map(|r| r.employee_id.as_str())
            .collect();
        // New rows first in input order, then changed rows in input order.
        assert_eq!(ids, vec!["E011", "E013", "E010", "E012"]);
    }

    #[test]
    fn test_reconcile_is_deterministic() {
        let src = vec![source("E001", Some("Bob")), source("E002", Some("Carol"))];
        let wh = vec![warehouse("E001", Some("Alice"), true)];

        let first = reconcile(&src, &wh, today()).unwrap();
        let second = reconcile(&src, &wh, today()).unwrap();

        assert_eq!(first.insert_batch.rows, second.insert_batch.rows);
        assert_eq!(first.update_keys, second.update_keys);
        assert_eq!(first.unchanged, second.unchanged);
    }

    #[test]
    fn test_stamped_columns_on_inserted_rows() {
        let outcome = reconcile(&[source("E001", Some("Alice"))], &[], today()).unwrap();
        let row = &outcome.insert_batch.rows[0];
        assert_eq!(row.effective_start_date, today());
        assert_eq!(row.effective_end_date, None);
        assert!(row.is_active);
    }

    #[test]
    fn test_closed_historical_row_does_not_shadow_active_row() {
        // Full-table read returns both the closed and the active version;
        // classification must run against the active one.
        let wh = vec![
            warehouse("E001", Some("Old Boss"), false),
            warehouse("E001", Some("Alice"), true),
        ];
        let outcome = reconcile(&[source("E001", Some("Alice"))], &wh, today()).unwrap();
        assert_eq!(outcome.unchanged, 1);
        assert!(outcome.update_keys.is_empty());
    }

    #[test]
    fn test_rehired_employee_with_only_closed_row_is_matched_not_reinserted() {
        // Inherited behavior: the unfiltered read means a terminated-then-
        // rehired employee still matches their closed row and is never
        // re-inserted or reactivated.
        let wh = vec![warehouse("E001", Some("Alice"), false)];
        let outcome = reconcile(&[source("E001", Some("Alice"))], &wh, today()).unwrap();
        assert!(outcome.insert_batch.is_empty());
        assert_eq!(outcome.unchanged, 1);
    }

    #[test]
    fn test_dimension_column_order_fixture() {
        assert_eq!(
            DIMENSION_COLUMNS,
            [
                "employee_name",
                "employee_id",
                "employee_email",
                "job",
                "supervisor_name",
                "company",
                "org_level_3",
                "org_level_2",
                "org_level_1",
                "org_level_4",
                "last_hire_date",
                "termination_date",
                "effective_start_date",
                "effective_end_date",
                "is_active",
            ]
        );
    }

    #[test]
    fn test_literals_follow_destination_column_order() {
        let mut record = source("E001", Some("Alice"));
        record.org_level_1 = Some("L1".into());
        record.org_level_2 = Some("L2".into());
        record.org_level_3 = Some("L3".into());
        record.org_level_4 = Some("L4".into());
        let row = DimensionRow::from_source(&record, today());
        let values = row.literals();

        assert_eq!(values.len(), DIMENSION_COLUMNS.len());
        // Destination interleaves the org levels as 3, 2, 1, 4.
        assert_eq!(values[6], Scalar::Text("L3".into()));
        assert_eq!(values[7], Scalar::Text("L2".into()));
        assert_eq!(values[8], Scalar::Text("L1".into()));
        assert_eq!(values[9], Scalar::Text("L4".into()));
        assert_eq!(values[12], Scalar::Date(today()));
        assert_eq!(values[13], Scalar::Null);
        assert_eq!(values[14], Scalar::Text("Y".into()));
    }
}
