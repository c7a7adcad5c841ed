//! Bulk export: one query job per table, streamed into a CSV artifact.
//!
//! Each table is exported by submitting a bulk query job, polling it to
//! completion under a wall-clock bound, and streaming the results into
//! `<artifact_dir>/<Table>.csv`. The artifact starts with the header row;
//! a failed export deletes its partial artifact so the import phase only
//! ever sees complete files.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::error::{MigrateError, Result};
use crate::schema::TableSpec;
use crate::source::{QueryJobState, SourceApi};

/// Exports table data into per-table CSV artifacts.
pub struct ExportPipeline {
    source: Arc<dyn SourceApi>,
    artifact_dir: PathBuf,
    poll_interval: Duration,
    poll_timeout: Duration,
    concurrency: usize,
}

impl ExportPipeline {
    pub fn new(
        source: Arc<dyn SourceApi>,
        artifact_dir: PathBuf,
        poll_interval: Duration,
        poll_timeout: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            source,
            artifact_dir,
            poll_interval,
            poll_timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Export every table with bounded parallelism. Returns the total
    /// number of data rows written across all artifacts.
    pub async fn run_all(&self, tables: &[TableSpec]) -> Result<u64> {
        tokio::fs::create_dir_all(&self.artifact_dir).await?;

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let exports = tables.iter().map(|table| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire_owned().await.unwrap();
                self.export_table(table).await
            }
        });

        let counts = try_join_all(exports).await?;
        let total = counts.iter().sum();
        info!(
            "Exported {} rows across {} artifacts into {}",
            total,
            tables.len(),
            self.artifact_dir.display()
        );
        Ok(total)
    }

    /// Export one table. Returns the number of data rows written.
    pub async fn export_table(&self, table: &TableSpec) -> Result<u64> {
        let soql = build_soql(table);
        debug!("Submitting bulk query for {}: {}", table.name, soql);

        let job_id = self.source.submit_query_job(&soql).await?;
        self.wait_for_job(&table.name, &job_id).await?;

        let path = self.artifact_path(&table.name);
        match self.write_artifact(&table.name, &job_id, &path).await {
            Ok(rows) => {
                info!("Exported {} rows for {} to {}", rows, table.name, path.display());
                Ok(rows)
            }
            Err(e) => {
                // Never leave a partial artifact behind.
                tokio::fs::remove_file(&path).await.ok();
                Err(e)
            }
        }
    }

    /// Artifact location for one table.
    pub fn artifact_path(&self, table: &str) -> PathBuf {
        self.artifact_dir.join(format!("{table}.csv"))
    }

    /// Poll the job until it completes, fails, or the wait bound expires.
    async fn wait_for_job(&self, table: &str, job_id: &str) -> Result<()> {
        let mut waited = Duration::ZERO;

        loop {
            match self.source.query_job_state(job_id).await? {
                QueryJobState::Complete => return Ok(()),
                QueryJobState::Failed(message) => {
                    return Err(MigrateError::export(table, message));
                }
                QueryJobState::Aborted => {
                    return Err(MigrateError::export(table, "bulk query job was aborted"));
                }
                state => {
                    debug!("Job {} for {} is {:?}, waiting", job_id, table, state);
                }
            }

            if waited >= self.poll_timeout {
                return Err(MigrateError::ExportTimeout {
                    table: table.to_string(),
                    waited,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
            waited += self.poll_interval;
        }
    }

    /// Stream job results into the artifact file.
    async fn write_artifact(&self, table: &str, job_id: &str, path: &Path) -> Result<u64> {
        let mut stream = self.source.open_results(job_id).await?;
        let table = table.to_string();
        let path = path.to_path_buf();

        tokio::task::spawn_blocking(move || -> Result<u64> {
            let file = std::fs::File::create(&path)?;
            let mut writer = csv::Writer::from_writer(std::io::BufWriter::new(file));
            writer.write_record(&stream.columns)?;

            let mut rows = 0u64;
            while let Some(row) = stream.rows.blocking_recv() {
                let row = row.map_err(|e| MigrateError::export(&table, e))?;
                writer.write_record(&row)?;
                rows += 1;
            }
            writer.flush()?;
            Ok(rows)
        })
        .await
        .map_err(|e| {
            MigrateError::Io(std::io::Error::other(format!(
                "artifact writer task failed: {e}"
            )))
        })?
    }
}

/// Build the projection query for one table. Only synthesized columns are
/// selected, so dropped fields never appear in the artifact.
pub fn build_soql(table: &TableSpec) -> String {
    format!(
        "SELECT {} FROM {}",
        table.column_names().join(", "),
        table.name
    )
}
