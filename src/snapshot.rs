// ABOUTME: Snapshot model for the HR source extract
// ABOUTME: CSV encode/parse with header validation and source-to-dimension renames

use chrono::NaiveDate;
use std::io::{Read, Write};

use crate::error::{Result, SyncError};

/// Column set of the staged snapshot CSV, in source naming. The extractor
/// writes these headers; the reader resolves them by name, so a leading
/// synthetic index column in the staged file is tolerated and ignored.
pub const SNAPSHOT_COLUMNS: [&str; 13] = [
    "employee_name",
    "employee_number",
    "employee_email",
    "job",
    "supervisor_name",
    "company",
    "org_level_1",
    "org_level_2",
    "org_level_3",
    "org_level_4",
    "last_hire_date",
    "termination_date",
    "employment_status",
];

/// Snapshot columns the dimension actually consumes. `employment_status`
/// is not part of the employee dimension and is dropped at parse time.
const REQUIRED_COLUMNS: [&str; 12] = [
    "employee_name",
    "employee_number",
    "employee_email",
    "job",
    "supervisor_name",
    "company",
    "org_level_1",
    "org_level_2",
    "org_level_3",
    "org_level_4",
    "last_hire_date",
    "termination_date",
];

/// One raw row of the HR employee detail table, as extracted from the
/// source database. Field naming follows the source schema.
#[derive(Debug, Clone)]
pub struct EmployeeDetail {
    pub employee_name: Option<String>,
    pub employee_number: String,
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
    pub employment_status: Option<String>,
}

/// One source row after snapshot normalization: `employee_number` renamed
/// to `employee_id`, `employment_status` dropped. Immutable within a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub employee_id: String,
    pub employee_name: Option<String>,
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
}

/// Write extracted source rows as a headered snapshot CSV.
pub fn write_snapshot<W: Write>(writer: W, rows: &[EmployeeDetail]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(SNAPSHOT_COLUMNS)
        .map_err(|e| SyncError::Extract(format!("Failed to write snapshot header: {}", e)))?;

    for row in rows {
        let last_hire = format_date(row.last_hire_date);
        let termination = format_date(row.termination_date);
        let record = [
            row.employee_name.as_deref().unwrap_or(""),
            row.employee_number.as_str(),
            row.employee_email.as_deref().unwrap_or(""),
            row.job.as_deref().unwrap_or(""),
            row.supervisor_name.as_deref().unwrap_or(""),
            row.company.as_deref().unwrap_or(""),
            row.org_level_1.as_deref().unwrap_or(""),
            row.org_level_2.as_deref().unwrap_or(""),
            row.org_level_3.as_deref().unwrap_or(""),
            row.org_level_4.as_deref().unwrap_or(""),
            last_hire.as_str(),
            termination.as_str(),
            row.employment_status.as_deref().unwrap_or(""),
        ];
        csv.write_record(record)
            .map_err(|e| SyncError::Extract(format!("Failed to write snapshot row: {}", e)))?;
    }

    csv.flush()
        .map_err(|e| SyncError::Extract(format!("Failed to flush snapshot: {}", e)))?;
    Ok(())
}

/// Parse a staged snapshot CSV into source records.
///
/// Columns are resolved by header name, so column order does not matter and
/// extra columns (the synthetic row index some stagers prepend, and the
/// `employment_status` column) are ignored. Missing required columns fail
/// with a schema mismatch.
pub fn parse_snapshot<R: Read>(reader: R) -> Result<Vec<SourceRecord>> {
    let mut csv = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(reader);

    let headers = csv
        .headers()
        .map_err(|e| SyncError::Extract(format!("Failed to read snapshot header: {}", e)))?
        .clone();

    let schema = SnapshotSchema::resolve(&headers)?;

    let mut records = Vec::new();
    for (line, row) in csv.records().enumerate() {
        let row =
            row.map_err(|e| SyncError::Extract(format!("Failed to read snapshot row: {}", e)))?;
        records.push(schema.record(&row, line + 2)?);
    }

    Ok(records)
}

/// Resolved header positions for the required snapshot columns.
struct SnapshotSchema {
    positions: [usize; 12],
}

impl SnapshotSchema {
    fn resolve(headers: &csv::StringRecord) -> Result<Self> {
        let mut positions = [0usize; 12];
        let mut missing = Vec::new();

        for (slot, name) in REQUIRED_COLUMNS.iter().enumerate() {
            match headers.iter().position(|h| h == *name) {
                Some(idx) => positions[slot] = idx,
                None => missing.push(name.to_string()),
            }
        }

        if !missing.is_empty() {
            return Err(SyncError::schema_mismatch("source snapshot", missing));
        }

        Ok(Self { positions })
    }

    fn record(&self, row: &csv::StringRecord, line: usize) -> Result<SourceRecord> {
        let field = |slot: usize| -> Option<String> {
            row.get(self.positions[slot])
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let employee_id = field(1).ok_or_else(|| {
            SyncError::Extract(format!("Snapshot line {}: empty employee_number", line))
        })?;

        Ok(SourceRecord {
            employee_name: field(0),
            employee_id,
            employee_email: field(2),
            job: field(3),
            supervisor_name: field(4),
            company: field(5),
            org_level_1: field(6),
            org_level_2: field(7),
            org_level_3: field(8),
            org_level_4: field(9),
            last_hire_date: parse_date(field(10), line)?,
            termination_date: parse_date(field(11), line)?,
        })
    }
}

fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

fn parse_date(value: Option<String>, line: usize) -> Result<Option<NaiveDate>> {
    match value {
        None => Ok(None),
        Some(v) => NaiveDate::parse_from_str(&v, "%Y-%m-%d")
            .map(Some)
            .map_err(|e| {
                SyncError::Extract(format!("Snapshot line {}: bad date '{}': {}", line, v, e))
            }),
    }
}
