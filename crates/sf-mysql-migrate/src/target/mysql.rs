//! MySQL target store implementation.
//!
//! Uses mysql_async for connection pooling. Tables are created as InnoDB
//! with utf8mb4 so foreign-key constraints are actually enforced.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, Params, Pool, PoolConstraints, PoolOpts, Value};
use tracing::{debug, info};

use crate::config::TargetConfig;
use crate::error::{MigrateError, Result};
use crate::schema::ColumnSpec;

use super::TargetStore;

/// MySQL target store backed by a connection pool.
pub struct MysqlTarget {
    pool: Pool,
    fk_checks_disabled: AtomicBool,
}

impl MysqlTarget {
    /// Connect to MySQL and verify the connection.
    pub async fn connect(config: &TargetConfig) -> Result<Self> {
        let constraints =
            PoolConstraints::new(1, config.max_connections.max(1)).unwrap_or_default();
        let pool_opts = PoolOpts::new().with_constraints(constraints);
        let opts = mysql_async::OptsBuilder::from_opts(config.opts())
            .pool_opts(pool_opts)
            .into();

        let pool = Pool::new::<mysql_async::Opts>(opts);

        let mut conn = pool.get_conn().await?;
        conn.query_drop("SELECT 1").await?;
        drop(conn);

        info!(
            "Connected to MySQL target: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self {
            pool,
            fk_checks_disabled: AtomicBool::new(false),
        })
    }

    async fn conn(&self) -> Result<Conn> {
        let mut conn = self.pool.get_conn().await?;
        // FOREIGN_KEY_CHECKS is session-scoped; every pooled connection
        // has to be told while the disabled window is open.
        if self.fk_checks_disabled.load(Ordering::SeqCst) {
            conn.query_drop("SET FOREIGN_KEY_CHECKS = 0").await?;
        }
        Ok(conn)
    }

    async fn run_ddl(&self, table: &str, statement: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.query_drop(statement)
            .await
            .map_err(|e| MigrateError::ddl(table, statement, e))?;
        Ok(())
    }
}

/// Quote a MySQL identifier.
fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Render one column definition.
fn render_column(col: &ColumnSpec) -> String {
    let null_clause = if col.nullable { "NULL" } else { "NOT NULL" };
    let pk_clause = if col.name == "Id" { " PRIMARY KEY" } else { "" };
    format!(
        "{} {} {}{}",
        quote_ident(&col.name),
        col.sql_type,
        null_clause,
        pk_clause
    )
}

/// Build the CREATE TABLE statement.
fn build_create_table(table: &str, columns: &[ColumnSpec]) -> String {
    let col_defs: Vec<String> = columns.iter().map(render_column).collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({}) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 \
         COLLATE=utf8mb4_unicode_ci ROW_FORMAT=DYNAMIC",
        quote_ident(table),
        col_defs.join(", ")
    )
}

/// Build the batched ALTER TABLE ... ADD COLUMN statement.
fn build_add_columns(table: &str, columns: &[ColumnSpec]) -> String {
    let col_defs: Vec<String> = columns.iter().map(render_column).collect();
    format!(
        "ALTER TABLE {} ADD COLUMN ({})",
        quote_ident(table),
        col_defs.join(", ")
    )
}

/// Build the named foreign-key constraint statement.
fn build_add_foreign_key(table: &str, column: &str, ref_table: &str, constraint: &str) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} (Id)",
        quote_ident(table),
        quote_ident(constraint),
        quote_ident(column),
        quote_ident(ref_table)
    )
}

#[async_trait]
impl TargetStore for MysqlTarget {
    async fn drop_table(&self, table: &str) -> Result<()> {
        let statement = format!("DROP TABLE IF EXISTS {}", quote_ident(table));
        self.run_ddl(table, &statement).await?;
        debug!("Dropped table {}", table);
        Ok(())
    }

    async fn create_table(&self, table: &str, columns: &[ColumnSpec]) -> Result<()> {
        let statement = build_create_table(table, columns);
        self.run_ddl(table, &statement).await?;
        debug!("Created table {}", table);
        Ok(())
    }

    async fn add_columns(&self, table: &str, columns: &[ColumnSpec]) -> Result<()> {
        if columns.is_empty() {
            return Ok(());
        }
        let statement = build_add_columns(table, columns);
        self.run_ddl(table, &statement).await?;
        debug!("Added {} columns to {}", columns.len(), table);
        Ok(())
    }

    async fn add_foreign_key(
        &self,
        table: &str,
        column: &str,
        ref_table: &str,
        constraint: &str,
    ) -> Result<()> {
        let statement = build_add_foreign_key(table, column, ref_table, constraint);
        self.run_ddl(table, &statement).await?;
        debug!(
            "Added constraint {} on {}.{} referencing {}",
            constraint, table, column, ref_table
        );
        Ok(())
    }

    async fn set_foreign_key_checks(&self, enabled: bool) -> Result<()> {
        info!(
            "Setting foreign key checks to {}",
            if enabled { 1 } else { 0 }
        );
        self.fk_checks_disabled
            .store(!enabled, Ordering::SeqCst);

        let mut conn = self.pool.get_conn().await?;
        let statement = format!("SET FOREIGN_KEY_CHECKS = {}", if enabled { 1 } else { 0 });
        conn.query_drop(&statement).await?;
        Ok(())
    }

    async fn insert_row(
        &self,
        table: &str,
        columns: &[String],
        values: Vec<Option<String>>,
    ) -> Result<()> {
        let col_list: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let statement = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            col_list.join(", "),
            placeholders
        );

        let params: Vec<Value> = values.into_iter().map(Value::from).collect();

        let mut conn = self.conn().await?;
        conn.exec_drop(&statement, Params::Positional(params))
            .await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.clone().disconnect().await.ok();
    }
}
