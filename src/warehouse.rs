// ABOUTME: Warehouse side - current-state reader and mutation executors
// ABOUTME: Mutations use bound parameters, chunked under the postgres param limit

use chrono::NaiveDate;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Row};

use crate::error::{Result, SyncError};
use crate::reconcile::{DimensionRow, InsertBatch, UpdateKeySet, DIMENSION_COLUMNS};

/// One currently-stored row of the employee dimension.
#[derive(Debug, Clone)]
pub struct WarehouseRecord {
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
    pub effective_start_date: Option<NaiveDate>,
    pub effective_end_date: Option<NaiveDate>,
    pub is_active: bool,
}

/// Reads the current contents of the employee dimension.
pub struct DimensionReader<'a> {
    client: &'a Client,
    table: &'a str,
}

impl<'a> DimensionReader<'a> {
    pub fn new(client: &'a Client, table: &'a str) -> Self {
        Self { client, table }
    }

    /// Full-table read of the dimension.
    ///
    /// Deliberately unfiltered: closed historical rows come back too, and
    /// the reconciler decides what to do with them. Missing expected
    /// columns fail with a schema mismatch before any row is converted.
    pub async fn read_current(&self) -> Result<Vec<WarehouseRecord>> {
        let query = format!("SELECT * FROM {}", self.table);
        let statement = self.client.prepare(&query).await?;
        validate_columns(statement.columns())?;

        let rows = self.client.query(&statement, &[]).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(warehouse_record(row)?);
        }

        tracing::info!("Read {} dimension rows from {}", records.len(), self.table);
        Ok(records)
    }
}

fn validate_columns(columns: &[tokio_postgres::Column]) -> Result<()> {
    let missing: Vec<String> = DIMENSION_COLUMNS
        .iter()
        .filter(|name| !columns.iter().any(|c| c.name() == **name))
        .map(|name| name.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(SyncError::schema_mismatch("warehouse dimension", missing))
    }
}

fn warehouse_record(row: &Row) -> Result<WarehouseRecord> {
    let is_active: Option<String> = row.try_get("is_active")?;
    Ok(WarehouseRecord {
        employee_id: row.try_get("employee_id")?,
        employee_name: row.try_get("employee_name")?,
        employee_email: row.try_get("employee_email")?,
        job: row.try_get("job")?,
        supervisor_name: row.try_get("supervisor_name")?,
        company: row.try_get("company")?,
        org_level_1: row.try_get("org_level_1")?,
        org_level_2: row.try_get("org_level_2")?,
        org_level_3: row.try_get("org_level_3")?,
        org_level_4: row.try_get("org_level_4")?,
        last_hire_date: row.try_get("last_hire_date")?,
        termination_date: row.try_get("termination_date")?,
        effective_start_date: row.try_get("effective_start_date")?,
        effective_end_date: row.try_get("effective_end_date")?,
        is_active: is_active.as_deref() == Some("Y"),
    })
}

/// Applies the reconciler's payloads to the warehouse.
pub struct MutationExecutor<'a> {
    client: &'a Client,
    table: &'a str,
}

impl<'a> MutationExecutor<'a> {
    pub fn new(client: &'a Client, table: &'a str) -> Self {
        Self { client, table }
    }

    /// Insert the batch of new dimension versions.
    ///
    /// Chunked to stay under PostgreSQL's ~65535 parameter limit. Not
    /// idempotent: re-running a committed batch duplicates rows, which is
    /// why the pipeline fences this step with the insert-pending marker.
    pub async fn insert_rows(&self, batch: &InsertBatch) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        let params_per_row = DIMENSION_COLUMNS.len();
        let chunk_rows = std::cmp::max(1, 65000 / params_per_row);

        let mut total = 0u64;
        for chunk in batch.rows.chunks(chunk_rows) {
            let query = build_insert_statement(self.table, chunk.len());

            let values: Vec<Vec<Box<dyn ToSql + Sync + Send>>> =
                chunk.iter().map(row_params).collect();
            let params: Vec<&(dyn ToSql + Sync)> = values
                .iter()
                .flat_map(|row| row.iter().map(|v| v.as_ref() as &(dyn ToSql + Sync)))
                .collect();

            total += self.client.execute(&query, &params).await?;
        }

        tracing::info!("Inserted {} rows into {}", total, self.table);
        Ok(total)
    }

    /// Close out the currently-active rows for the changed keys.
    ///
    /// Only rows still marked active are touched, so a rerun is a no-op.
    pub async fn close_rows(&self, keys: &UpdateKeySet, end_date: NaiveDate) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let query = format!(
            "UPDATE {} SET effective_end_date = $1, is_active = 'N' \
             WHERE employee_id = ANY($2) AND is_active = 'Y'",
            self.table
        );
        let affected = self
            .client
            .execute(&query, &[&end_date, &keys.keys])
            .await?;

        tracing::info!(
            "Closed {} active rows in {} ({} keys requested)",
            affected,
            self.table,
            keys.len()
        );
        Ok(affected)
    }
}

/// Build a multi-row insert statement with numbered placeholders.
fn build_insert_statement(table: &str, row_count: usize) -> String {
    let columns = DIMENSION_COLUMNS.join(", ");
    let width = DIMENSION_COLUMNS.len();

    let tuples: Vec<String> = (0..row_count)
        .map(|row| {
            let placeholders: Vec<String> = (1..=width)
                .map(|col| format!("${}", row * width + col))
                .collect();
            format!("({})", placeholders.join(", "))
        })
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES {}",
        table,
        columns,
        tuples.join(", ")
    )
}

/// Bound values for one row, in [`DIMENSION_COLUMNS`] order.
fn row_params(row: &DimensionRow) -> Vec<Box<dyn ToSql + Sync + Send>> {
    vec![
        Box::new(row.employee_name.clone()),
        Box::new(row.employee_id.clone()),
        Box::new(row.employee_email.clone()),
        Box::new(row.job.clone()),
        Box::new(row.supervisor_name.clone()),
        Box::new(row.company.clone()),
        Box::new(row.org_level_3.clone()),
        Box::new(row.org_level_2.clone()),
        Box::new(row.org_level_1.clone()),
        Box::new(row.org_level_4.clone()),
        Box::new(row.last_hire_date),
        Box::new(row.termination_date),
        Box::new(row.effective_start_date),
        Box::new(row.effective_end_date),
        Box::new(if row.is_active { "Y" } else { "N" }.to_string()),
    ]
}
