// ABOUTME: Snapshot extractor - pulls the full HR employee detail set
// ABOUTME: Encodes it as CSV and stages it through object storage

use tokio_postgres::Row;

use crate::config::SourceConfig;
use crate::error::{Result, SyncError};
use crate::snapshot::{self, EmployeeDetail, SourceRecord, SNAPSHOT_COLUMNS};
use crate::storage::SnapshotStore;
use crate::utils::sanitize_url;

/// Extracts the current full source-of-truth employee set and stages it.
pub struct SnapshotExtractor<'a> {
    config: &'a SourceConfig,
    store: &'a SnapshotStore,
}

impl<'a> SnapshotExtractor<'a> {
    pub fn new(config: &'a SourceConfig, store: &'a SnapshotStore) -> Self {
        Self { config, store }
    }

    /// Query the HR source and stage the snapshot CSV in object storage.
    ///
    /// Returns the number of rows extracted. Every failure in this step is
    /// an extract error and therefore retryable.
    pub async fn extract_and_stage(&self) -> Result<usize> {
        let client = crate::postgres::connect_with_retry(&self.config.url)
            .await
            .map_err(|e| {
                SyncError::Extract(format!(
                    "Failed to connect to source {}: {:#}",
                    sanitize_url(&self.config.url),
                    e
                ))
            })?;

        let query = format!(
            "SELECT {} FROM {}",
            SNAPSHOT_COLUMNS.join(", "),
            self.config.table
        );
        let rows = client
            .query(&query, &[])
            .await
            .map_err(|e| SyncError::Extract(format!("Source snapshot query failed: {}", e)))?;

        let mut details = Vec::with_capacity(rows.len());
        for row in &rows {
            details.push(employee_detail(row)?);
        }

        tracing::info!(
            "Extracted {} rows from {}",
            details.len(),
            self.config.table
        );

        let mut buf = Vec::new();
        snapshot::write_snapshot(&mut buf, &details)?;
        self.store.put(buf).await?;

        Ok(details.len())
    }

    /// Fetch the staged snapshot back and parse it into source records.
    pub async fn fetch(&self) -> Result<Vec<SourceRecord>> {
        let bytes = self.store.get().await?;
        let records = snapshot::parse_snapshot(bytes.as_slice())?;
        tracing::info!("Read {} source records from staged snapshot", records.len());
        Ok(records)
    }
}

fn employee_detail(row: &Row) -> Result<EmployeeDetail> {
    let text = |name: &str| -> Result<Option<String>> {
        row.try_get(name)
            .map_err(|e| SyncError::Extract(format!("Bad source column {}: {}", name, e)))
    };
    let date = |name: &str| -> Result<Option<chrono::NaiveDate>> {
        row.try_get(name)
            .map_err(|e| SyncError::Extract(format!("Bad source column {}: {}", name, e)))
    };

    Ok(EmployeeDetail {
        employee_name: text("employee_name")?,
        employee_number: row
            .try_get("employee_number")
            .map_err(|e| SyncError::Extract(format!("Bad source column employee_number: {}", e)))?,
        employee_email: text("employee_email")?,
        job: text("job")?,
        supervisor_name: text("supervisor_name")?,
        company: text("company")?,
        org_level_1: text("org_level_1")?,
        org_level_2: text("org_level_2")?,
        org_level_3: text("org_level_3")?,
        org_level_4: text("org_level_4")?,
        last_hire_date: date("last_hire_date")?,
        termination_date: date("termination_date")?,
        employment_status: text("employment_status")?,
    })
}
