//! Migration orchestration.
//!
//! Drives the pipeline through its phases: metadata, schema synthesis,
//! two-phase DDL, bulk export, artifact import. Phases only ever move
//! forward; any fatal error leaves the run in the absorbing failed state.
//! Referential checks are suspended strictly for the import window and
//! restored on every exit path out of it.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::ddl::DdlExecutor;
use crate::error::Result;
use crate::export::ExportPipeline;
use crate::import::ImportPipeline;
use crate::schema::{synthesize_table, TableSpec};
use crate::source::SourceApi;
use crate::target::TargetStore;

/// Pipeline phase. Transitions are forward-only; `Failed` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    SchemaBuilt,
    TablesCreated,
    ConstraintsApplied,
    Exported,
    Imported,
    Done,
    Failed,
}

impl Phase {
    fn rank(self) -> u8 {
        match self {
            Phase::Init => 0,
            Phase::SchemaBuilt => 1,
            Phase::TablesCreated => 2,
            Phase::ConstraintsApplied => 3,
            Phase::Exported => 4,
            Phase::Imported => 5,
            Phase::Done => 6,
            Phase::Failed => 7,
        }
    }

    /// Move to `next` if it is strictly ahead. Backward transitions and
    /// transitions out of `Failed` are ignored.
    pub fn advance(&mut self, next: Phase) {
        if *self == Phase::Failed {
            return;
        }
        if next.rank() > self.rank() {
            *self = next;
        }
    }

    /// Enter the absorbing failed state.
    pub fn fail(&mut self) {
        *self = Phase::Failed;
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::SchemaBuilt => "schema_built",
            Phase::TablesCreated => "tables_created",
            Phase::ConstraintsApplied => "constraints_applied",
            Phase::Exported => "exported",
            Phase::Imported => "imported",
            Phase::Done => "done",
            Phase::Failed => "failed",
        }
    }
}

/// Summary of a completed migration run.
#[derive(Debug, Serialize)]
pub struct MigrationResult {
    pub run_id: String,
    pub status: String,
    pub phase: Phase,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub tables_total: usize,
    pub rows_exported: u64,
    pub rows_imported: u64,
}

impl MigrationResult {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Restores referential checking when the import window closes.
///
/// The guard must be retired with [`restore`](Self::restore); dropping it
/// unrestored means the target was left with checks disabled, which is
/// logged loudly since a drop handler cannot issue the statement itself.
struct IntegrityGuard {
    target: Arc<dyn TargetStore>,
    restored: bool,
}

impl IntegrityGuard {
    async fn disable(target: Arc<dyn TargetStore>) -> Result<Self> {
        target.set_foreign_key_checks(false).await?;
        Ok(Self {
            target,
            restored: false,
        })
    }

    async fn restore(&mut self) -> Result<()> {
        if self.restored {
            return Ok(());
        }
        self.target.set_foreign_key_checks(true).await?;
        self.restored = true;
        Ok(())
    }
}

impl Drop for IntegrityGuard {
    fn drop(&mut self) {
        if !self.restored {
            warn!("Foreign key checks were not re-enabled on the target");
        }
    }
}

/// Runs the full migration pipeline.
pub struct Orchestrator {
    config: Config,
    source: Arc<dyn SourceApi>,
    target: Arc<dyn TargetStore>,
}

impl Orchestrator {
    pub fn new(config: Config, source: Arc<dyn SourceApi>, target: Arc<dyn TargetStore>) -> Self {
        Self {
            config,
            source,
            target,
        }
    }

    /// Run the pipeline to completion. The target pool is closed on both
    /// success and failure.
    pub async fn run(&self) -> Result<MigrationResult> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let start = Instant::now();
        let mut phase = Phase::Init;

        info!("Starting migration run {}", run_id);

        let outcome = self.execute(&mut phase).await;
        self.target.close().await;

        match outcome {
            Ok(counters) => {
                let completed_at = Utc::now();
                let result = MigrationResult {
                    run_id,
                    status: "completed".to_string(),
                    phase,
                    started_at,
                    completed_at,
                    duration_seconds: start.elapsed().as_secs_f64(),
                    tables_total: counters.tables_total,
                    rows_exported: counters.rows_exported,
                    rows_imported: counters.rows_imported,
                };
                let rate = if result.duration_seconds > 0.0 {
                    result.rows_imported as f64 / result.duration_seconds
                } else {
                    0.0
                };
                info!(
                    "Migration run {} completed in {:.1}s: {} tables, {} rows ({:.0} rows/sec)",
                    result.run_id,
                    result.duration_seconds,
                    result.tables_total,
                    result.rows_imported,
                    rate
                );
                Ok(result)
            }
            Err(e) => {
                phase.fail();
                Err(e)
            }
        }
    }

    async fn execute(&self, phase: &mut Phase) -> Result<RunCounters> {
        let migration = &self.config.migration;

        let catalog = Catalog::new(
            self.source.clone(),
            migration.include_objects.clone(),
            migration.get_metadata_concurrency(),
        );
        let objects = catalog.load_metadata().await?;

        let tables: Vec<TableSpec> = objects
            .iter()
            .map(|o| synthesize_table(&o.name, &o.fields))
            .collect();
        phase.advance(Phase::SchemaBuilt);
        info!("Synthesized {} table specifications", tables.len());

        let ddl = DdlExecutor::new(self.target.clone(), migration.get_ddl_concurrency());
        let created = ddl.create_tables(&tables).await?;
        phase.advance(Phase::TablesCreated);

        ddl.apply_constraints(&tables, &created).await?;
        phase.advance(Phase::ConstraintsApplied);

        let exporter = ExportPipeline::new(
            self.source.clone(),
            migration.artifact_dir.clone(),
            migration.get_poll_interval(),
            migration.get_poll_timeout(),
            migration.get_export_concurrency(),
        );
        let rows_exported = exporter.run_all(&tables).await?;
        phase.advance(Phase::Exported);

        let importer = ImportPipeline::new(
            self.target.clone(),
            migration.artifact_dir.clone(),
            migration.get_import_concurrency(),
        );

        let mut guard = IntegrityGuard::disable(self.target.clone()).await?;
        let import_outcome = importer.run_all().await;
        let restore_outcome = guard.restore().await;

        let rows_imported = import_outcome?;
        restore_outcome?;
        phase.advance(Phase::Imported);

        phase.advance(Phase::Done);
        Ok(RunCounters {
            tables_total: tables.len(),
            rows_exported,
            rows_imported,
        })
    }
}

struct RunCounters {
    tables_total: usize,
    rows_exported: u64,
    rows_imported: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_moves_forward_only() {
        let mut phase = Phase::Init;
        phase.advance(Phase::TablesCreated);
        assert_eq!(phase, Phase::TablesCreated);

        phase.advance(Phase::SchemaBuilt);
        assert_eq!(phase, Phase::TablesCreated);
    }

    #[test]
    fn test_failed_is_absorbing() {
        let mut phase = Phase::Exported;
        phase.fail();
        phase.advance(Phase::Done);
        assert_eq!(phase, Phase::Failed);
    }

    #[test]
    fn test_result_serializes_phase_as_snake_case() {
        let result = MigrationResult {
            run_id: "r".to_string(),
            status: "completed".to_string(),
            phase: Phase::Done,
            started_at: Utc::now(),
            completed_at: Utc::now(),
            duration_seconds: 1.5,
            tables_total: 2,
            rows_exported: 10,
            rows_imported: 10,
        };
        let json = result.to_json().unwrap();
        assert!(json.contains("\"phase\": \"done\""));
        assert!(json.contains("\"rows_imported\": 10"));
    }
}
