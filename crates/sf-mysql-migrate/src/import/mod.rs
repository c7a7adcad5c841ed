//! Artifact import: replay CSV artifacts into the target, row by row.
//!
//! Artifacts are discovered from the artifact directory, one table per
//! file. Within a file rows are strictly sequential: the blocking CSV
//! reader hands over one record and then waits for an acknowledgement
//! before reading the next, so at most one record is in flight per table.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use chrono::{Datelike, NaiveDateTime, Timelike};
use futures::future::try_join_all;
use regex::Regex;
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};

use crate::error::{MigrateError, Result};
use crate::target::TargetStore;

/// Exported timestamp shape, e.g. "2023-07-04T10:15:30.000Z". Only values
/// matching this exactly are rewritten; anything else passes through.
static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{3}Z$").unwrap()
});

/// Imports CSV artifacts into target tables.
pub struct ImportPipeline {
    target: Arc<dyn TargetStore>,
    artifact_dir: PathBuf,
    concurrency: usize,
}

impl ImportPipeline {
    pub fn new(target: Arc<dyn TargetStore>, artifact_dir: PathBuf, concurrency: usize) -> Self {
        Self {
            target,
            artifact_dir,
            concurrency: concurrency.max(1),
        }
    }

    /// Import every artifact in the directory with bounded parallelism.
    /// Returns the total number of rows inserted.
    ///
    /// Artifacts are processed in file-name order. Insertion order across
    /// tables does not matter because referential checks are suspended
    /// for the duration of the import.
    pub async fn run_all(&self) -> Result<u64> {
        let artifacts = self.list_artifacts().await?;
        if artifacts.is_empty() {
            warn!("No artifacts found in {}", self.artifact_dir.display());
            return Ok(0);
        }

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let imports = artifacts.iter().map(|(table, path)| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire_owned().await.unwrap();
                self.import_file(table, path).await
            }
        });

        let counts = try_join_all(imports).await?;
        let total = counts.iter().sum();
        info!(
            "Imported {} rows across {} artifacts",
            total,
            artifacts.len()
        );
        Ok(total)
    }

    /// Enumerate `*.csv` artifacts as (table, path) pairs, sorted by name.
    async fn list_artifacts(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut artifacts = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.artifact_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                artifacts.push((stem.to_string(), path.clone()));
            }
        }

        artifacts.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(artifacts)
    }

    /// Import one artifact. Returns the number of rows inserted.
    pub async fn import_file(&self, table: &str, path: &Path) -> Result<u64> {
        let (row_tx, mut row_rx) =
            mpsc::channel::<std::result::Result<Vec<String>, csv::Error>>(1);
        let (ack_tx, mut ack_rx) = mpsc::channel::<()>(1);

        let reader_path = path.to_path_buf();
        let reader = tokio::task::spawn_blocking(move || {
            let mut rdr = match csv::ReaderBuilder::new()
                .has_headers(false)
                .from_path(&reader_path)
            {
                Ok(rdr) => rdr,
                Err(e) => {
                    let _ = row_tx.blocking_send(Err(e));
                    return;
                }
            };

            for record in rdr.records() {
                let record = record.map(|r| r.iter().map(str::to_string).collect());
                if row_tx.blocking_send(record).is_err() {
                    return;
                }
                // One record in flight: wait until the insert completed.
                if ack_rx.blocking_recv().is_none() {
                    return;
                }
            }
        });

        let result = self
            .insert_rows(table, &mut row_rx, &ack_tx)
            .await;

        // Unblock and retire the reader whatever happened.
        row_rx.close();
        drop(ack_tx);
        reader.await.map_err(|e| {
            MigrateError::Io(std::io::Error::other(format!(
                "artifact reader task failed: {e}"
            )))
        })?;

        let rows = result?;
        info!("Imported {} rows into {}", rows, table);
        Ok(rows)
    }

    async fn insert_rows(
        &self,
        table: &str,
        row_rx: &mut mpsc::Receiver<std::result::Result<Vec<String>, csv::Error>>,
        ack_tx: &mpsc::Sender<()>,
    ) -> Result<u64> {
        let Some(header) = row_rx.recv().await else {
            warn!("Artifact for {} is empty, nothing to import", table);
            return Ok(0);
        };
        let columns = header.map_err(|e| MigrateError::import_parse(table, 0, e))?;
        let _ = ack_tx.send(()).await;

        let mut rows = 0u64;
        while let Some(record) = row_rx.recv().await {
            let row_index = rows + 1;
            let record =
                record.map_err(|e| MigrateError::import_parse(table, row_index, e))?;
            if record.len() != columns.len() {
                return Err(MigrateError::import_parse(
                    table,
                    row_index,
                    format!(
                        "expected {} values, found {}",
                        columns.len(),
                        record.len()
                    ),
                ));
            }

            let values: Vec<Option<String>> =
                record.iter().map(|v| normalize_value(v)).collect();

            self.target
                .insert_row(table, &columns, values)
                .await
                .map_err(|e| MigrateError::import_write(table, row_index, e))?;

            rows += 1;
            let _ = ack_tx.send(()).await;
        }

        Ok(rows)
    }
}

/// Normalize one exported value for insertion.
///
/// Empty strings become NULL. Exported UTC timestamps are rewritten to
/// the target's datetime literal, without zero padding. A value that
/// matches the timestamp shape but carries out-of-range components is
/// passed through unchanged and left for the insert to reject.
pub fn normalize_value(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }

    if TIMESTAMP_RE.is_match(raw) {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.3fZ") {
            return Some(format!(
                "{}-{}-{} {}:{}:{}",
                dt.year(),
                dt.month(),
                dt.day(),
                dt.hour(),
                dt.minute(),
                dt.second()
            ));
        }
    }

    Some(raw.to_string())
}
