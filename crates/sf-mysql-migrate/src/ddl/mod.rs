//! Two-phase DDL execution.
//!
//! Phase one drops and recreates every table with its non-reference
//! columns, in parallel. Phase two runs after all tables exist: reference
//! columns are added in one batched alter per table, then named
//! foreign-key constraints are attached one by one. A constraint is only
//! attached when its referenced table was created in phase one; lookups
//! into objects outside the migration are kept as plain columns.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::try_join_all;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{MigrateError, Result};
use crate::schema::TableSpec;
use crate::target::TargetStore;

/// Counters from the constraint phase.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConstraintStats {
    /// Foreign-key constraints attached.
    pub added: u64,

    /// Reference columns left unconstrained because their target table
    /// is not part of the migration.
    pub skipped: u64,
}

/// Executes schema DDL against the target in two phases.
pub struct DdlExecutor {
    target: Arc<dyn TargetStore>,
    concurrency: usize,
}

impl DdlExecutor {
    pub fn new(target: Arc<dyn TargetStore>, concurrency: usize) -> Self {
        Self {
            target,
            concurrency: concurrency.max(1),
        }
    }

    /// Phase one: drop and recreate every table with its non-reference
    /// columns. Tables are independent at this point, so creation runs
    /// with bounded parallelism. Any DDL failure aborts the run.
    ///
    /// Returns the set of created table names; phase two consults it to
    /// decide which constraints are attachable.
    pub async fn create_tables(&self, tables: &[TableSpec]) -> Result<HashSet<String>> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        let creates = tables.iter().map(|table| {
            let target = self.target.clone();
            let semaphore = semaphore.clone();
            let name = table.name.clone();
            let columns: Vec<_> = table.non_fk_columns().cloned().collect();
            async move {
                let _permit = semaphore.acquire_owned().await.unwrap();
                target.drop_table(&name).await?;
                target.create_table(&name, &columns).await?;
                info!("Created table {} with {} columns", name, columns.len());
                Ok::<String, MigrateError>(name)
            }
        });

        let created: HashSet<String> = try_join_all(creates).await?.into_iter().collect();
        Ok(created)
    }

    /// Phase two: add reference columns and foreign-key constraints.
    ///
    /// Each table gets one batched alter for all of its reference columns,
    /// then one constraint per column whose target exists. Tables are
    /// independent here, so they run in parallel; within a table the
    /// constraints go on sequentially. Runs after the phase-one barrier so
    /// every attachable constraint has its referenced table in place.
    pub async fn apply_constraints(
        &self,
        tables: &[TableSpec],
        created: &HashSet<String>,
    ) -> Result<ConstraintStats> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        let alters = tables
            .iter()
            .filter(|t| t.fk_columns().next().is_some())
            .map(|table| {
                let target = self.target.clone();
                let semaphore = semaphore.clone();
                async move {
                    let _permit = semaphore.acquire_owned().await.unwrap();
                    let fk_columns: Vec<_> = table.fk_columns().cloned().collect();
                    target.add_columns(&table.name, &fk_columns).await?;

                    let mut stats = ConstraintStats::default();
                    for column in &fk_columns {
                        let Some(ref_table) = column.lookup_target.as_deref() else {
                            continue;
                        };
                        if !created.contains(ref_table) {
                            warn!(
                                "Skipping constraint on {}.{}: referenced table {} is not migrated",
                                table.name, column.name, ref_table
                            );
                            stats.skipped += 1;
                            continue;
                        }

                        let constraint = constraint_name();
                        target
                            .add_foreign_key(&table.name, &column.name, ref_table, &constraint)
                            .await?;
                        stats.added += 1;
                    }
                    Ok::<ConstraintStats, MigrateError>(stats)
                }
            });

        let stats = try_join_all(alters)
            .await?
            .into_iter()
            .fold(ConstraintStats::default(), |acc, s| ConstraintStats {
                added: acc.added + s.added,
                skipped: acc.skipped + s.skipped,
            });

        info!(
            "Applied {} foreign-key constraints ({} skipped)",
            stats.added, stats.skipped
        );
        Ok(stats)
    }
}

/// Generate a unique constraint name. MySQL constraint names are scoped
/// per schema, so every constraint gets a fresh token.
fn constraint_name() -> String {
    format!("{}_fk", Uuid::new_v4().simple())
}
