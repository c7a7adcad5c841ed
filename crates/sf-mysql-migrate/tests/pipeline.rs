//! End-to-end pipeline tests against in-process fakes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use sf_mysql_migrate::error::MigrateError;
use sf_mysql_migrate::export::ExportPipeline;
use sf_mysql_migrate::import::ImportPipeline;
use sf_mysql_migrate::schema::{synthesize_table, ColumnSpec};
use sf_mysql_migrate::source::{
    FieldDescriptor, QueryJobState, ResultStream, SObjectInfo, SourceApi,
};
use sf_mysql_migrate::{
    Catalog, Config, MigrationConfig, Orchestrator, Phase, Result, SourceConfig, TargetConfig,
    TargetStore,
};

// ---------------------------------------------------------------------
// Fakes

struct FakeSource {
    objects: Vec<(String, Vec<FieldDescriptor>)>,
    /// Per-table result sets: header plus data rows.
    data: HashMap<String, (Vec<String>, Vec<Vec<String>>)>,
    /// When set, query jobs never leave InProgress.
    stall_jobs: bool,
    /// When set, this table's result stream errors after its data rows.
    fail_stream_for: Option<String>,
}

impl FakeSource {
    fn new(objects: Vec<(String, Vec<FieldDescriptor>)>) -> Self {
        Self {
            objects,
            data: HashMap::new(),
            stall_jobs: false,
            fail_stream_for: None,
        }
    }

    fn with_data(mut self, table: &str, header: &[&str], rows: &[&[&str]]) -> Self {
        let header = header.iter().map(|s| s.to_string()).collect();
        let rows = rows
            .iter()
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect();
        self.data.insert(table.to_string(), (header, rows));
        self
    }

    fn with_stream_failure(mut self, table: &str) -> Self {
        self.fail_stream_for = Some(table.to_string());
        self
    }
}

#[async_trait]
impl SourceApi for FakeSource {
    async fn describe_global(&self) -> Result<Vec<SObjectInfo>> {
        Ok(self
            .objects
            .iter()
            .map(|(name, _)| SObjectInfo {
                name: name.clone(),
                queryable: true,
                retrieveable: true,
            })
            .collect())
    }

    async fn describe_object(&self, object: &str) -> Result<Vec<FieldDescriptor>> {
        self.objects
            .iter()
            .find(|(name, _)| name == object)
            .map(|(_, fields)| fields.clone())
            .ok_or_else(|| MigrateError::metadata_fetch(object, "unknown object"))
    }

    async fn submit_query_job(&self, soql: &str) -> Result<String> {
        let table = soql
            .rsplit(" FROM ")
            .next()
            .expect("query without FROM clause");
        Ok(format!("job-{table}"))
    }

    async fn query_job_state(&self, _job_id: &str) -> Result<QueryJobState> {
        if self.stall_jobs {
            Ok(QueryJobState::InProgress)
        } else {
            Ok(QueryJobState::Complete)
        }
    }

    async fn open_results(&self, job_id: &str) -> Result<ResultStream> {
        let table = job_id.strip_prefix("job-").unwrap_or(job_id);
        let (header, rows) = self
            .data
            .get(table)
            .cloned()
            .unwrap_or_else(|| (vec!["Id".to_string()], Vec::new()));

        let (tx, rx) = mpsc::channel(rows.len() + 1);
        for row in rows {
            tx.send(Ok(row)).await.unwrap();
        }
        if self.fail_stream_for.as_deref() == Some(table) {
            tx.send(Err(MigrateError::Io(std::io::Error::other(
                "stream interrupted",
            ))))
            .await
            .unwrap();
        }
        Ok(ResultStream {
            columns: header,
            rows: rx,
        })
    }
}

#[derive(Default)]
struct TargetState {
    dropped: Vec<String>,
    created: Vec<(String, Vec<String>)>,
    altered: Vec<(String, Vec<String>)>,
    constraints: Vec<(String, String, String, String)>,
    fk_toggles: Vec<bool>,
    rows: HashMap<String, Vec<(Vec<String>, Vec<Option<String>>)>>,
}

#[derive(Default)]
struct FakeTarget {
    state: Mutex<TargetState>,
    fail_insert_table: Option<String>,
}

impl FakeTarget {
    fn failing_inserts_into(table: &str) -> Self {
        Self {
            fail_insert_table: Some(table.to_string()),
            ..Self::default()
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, TargetState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl TargetStore for FakeTarget {
    async fn drop_table(&self, table: &str) -> Result<()> {
        self.state().dropped.push(table.to_string());
        Ok(())
    }

    async fn create_table(&self, table: &str, columns: &[ColumnSpec]) -> Result<()> {
        let names = columns.iter().map(|c| c.name.clone()).collect();
        self.state().created.push((table.to_string(), names));
        Ok(())
    }

    async fn add_columns(&self, table: &str, columns: &[ColumnSpec]) -> Result<()> {
        let names = columns.iter().map(|c| c.name.clone()).collect();
        self.state().altered.push((table.to_string(), names));
        Ok(())
    }

    async fn add_foreign_key(
        &self,
        table: &str,
        column: &str,
        ref_table: &str,
        constraint: &str,
    ) -> Result<()> {
        self.state().constraints.push((
            table.to_string(),
            column.to_string(),
            ref_table.to_string(),
            constraint.to_string(),
        ));
        Ok(())
    }

    async fn set_foreign_key_checks(&self, enabled: bool) -> Result<()> {
        self.state().fk_toggles.push(enabled);
        Ok(())
    }

    async fn insert_row(
        &self,
        table: &str,
        columns: &[String],
        values: Vec<Option<String>>,
    ) -> Result<()> {
        if self.fail_insert_table.as_deref() == Some(table) {
            return Err(MigrateError::Io(std::io::Error::other("insert rejected")));
        }
        self.state()
            .rows
            .entry(table.to_string())
            .or_default()
            .push((columns.to_vec(), values));
        Ok(())
    }

    async fn close(&self) {}
}

// ---------------------------------------------------------------------
// Helpers

fn field(name: &str, field_type: &str) -> FieldDescriptor {
    FieldDescriptor {
        name: name.to_string(),
        field_type: field_type.to_string(),
        length: 80,
        precision: 0,
        scale: 0,
        nillable: true,
        reference_to: Vec::new(),
        relationship_name: None,
        polymorphic_foreign_key: false,
    }
}

fn reference(name: &str, targets: &[&str], polymorphic: bool) -> FieldDescriptor {
    let mut f = field(name, "reference");
    f.length = 18;
    f.reference_to = targets.iter().map(|t| t.to_string()).collect();
    f.relationship_name = Some(name.trim_end_matches("Id").to_string());
    f.polymorphic_foreign_key = polymorphic;
    f
}

fn account_fields() -> Vec<FieldDescriptor> {
    vec![
        field("Id", "id"),
        field("Name", "string"),
        reference("OwnerId", &["User", "Group"], true),
    ]
}

fn contact_fields() -> Vec<FieldDescriptor> {
    vec![
        field("Id", "id"),
        field("LastName", "string"),
        reference("AccountId", &["Account"], false),
        field("CreatedDate", "datetime"),
    ]
}

fn test_config(artifact_dir: &std::path::Path, objects: &[&str]) -> Config {
    Config {
        source: SourceConfig {
            login_url: "https://login.example.com".to_string(),
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            username: "user@example.com".to_string(),
            password: "pw".to_string(),
            api_version: "59.0".to_string(),
        },
        target: TargetConfig {
            host: "localhost".to_string(),
            port: 3306,
            database: "test".to_string(),
            user: "root".to_string(),
            password: "root".to_string(),
            max_connections: 4,
        },
        migration: MigrationConfig {
            include_objects: objects.iter().map(|o| o.to_string()).collect(),
            artifact_dir: artifact_dir.to_path_buf(),
            poll_interval_secs: Some(1),
            poll_timeout_secs: Some(30),
            metadata_concurrency: Some(2),
            ddl_concurrency: Some(2),
            export_concurrency: Some(2),
            import_concurrency: Some(1),
        },
    }
}

// ---------------------------------------------------------------------
// Tests

#[tokio::test]
async fn full_pipeline_migrates_two_tables() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), &["Account", "Contact"]);

    let source = FakeSource::new(vec![
        ("Account".to_string(), account_fields()),
        ("Contact".to_string(), contact_fields()),
    ])
    .with_data(
        "Account",
        &["Id", "Name", "OwnerId"],
        &[
            &["001A", "Acme", "005X"],
            &["001B", "Globex", "005Y"],
        ],
    )
    .with_data(
        "Contact",
        &["Id", "LastName", "AccountId", "CreatedDate"],
        &[
            &["003A", "Smith", "001A", "2023-07-04T10:15:30.000Z"],
            &["003B", "Jones", "", "2023-12-31T23:59:59.999Z"],
        ],
    );

    let target = Arc::new(FakeTarget::default());
    let orchestrator = Orchestrator::new(config, Arc::new(source), target.clone());
    let result = orchestrator.run().await.unwrap();

    assert_eq!(result.phase, Phase::Done);
    assert_eq!(result.status, "completed");
    assert_eq!(result.tables_total, 2);
    assert_eq!(result.rows_exported, 4);
    assert_eq!(result.rows_imported, 4);

    let state = target.state();

    // Phase one creates both tables; the polymorphic OwnerId stays a
    // plain column and lands with the table.
    assert_eq!(state.created.len(), 2);
    let account = state.created.iter().find(|(t, _)| t == "Account").unwrap();
    assert_eq!(account.1, vec!["Id", "Name", "OwnerId"]);
    let contact = state.created.iter().find(|(t, _)| t == "Contact").unwrap();
    assert_eq!(contact.1, vec!["Id", "LastName", "CreatedDate"]);

    // Phase two adds the lookup column and exactly one constraint.
    assert_eq!(state.altered, vec![("Contact".to_string(), vec!["AccountId".to_string()])]);
    assert_eq!(state.constraints.len(), 1);
    let (table, column, ref_table, constraint) = &state.constraints[0];
    assert_eq!(table, "Contact");
    assert_eq!(column, "AccountId");
    assert_eq!(ref_table, "Account");
    assert!(constraint.ends_with("_fk"));

    // Referential checks were off exactly for the import window.
    assert_eq!(state.fk_toggles, vec![false, true]);

    // Rows arrive in artifact order with values normalized.
    let contacts = &state.rows["Contact"];
    assert_eq!(contacts.len(), 2);
    assert_eq!(
        contacts[0].0,
        vec!["Id", "LastName", "AccountId", "CreatedDate"]
    );
    assert_eq!(
        contacts[0].1,
        vec![
            Some("003A".to_string()),
            Some("Smith".to_string()),
            Some("001A".to_string()),
            Some("2023-7-4 10:15:30".to_string()),
        ]
    );
    // Empty lookup becomes NULL.
    assert_eq!(contacts[1].1[2], None);
    assert_eq!(contacts[1].1[3], Some("2023-12-31 23:59:59".to_string()));

    let accounts = &state.rows["Account"];
    let ids: Vec<_> = accounts.iter().map(|(_, v)| v[0].clone()).collect();
    assert_eq!(ids, vec![Some("001A".to_string()), Some("001B".to_string())]);
}

#[tokio::test]
async fn lookup_outside_migration_keeps_plain_column() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), &["Contact"]);

    let source = FakeSource::new(vec![("Contact".to_string(), contact_fields())]).with_data(
        "Contact",
        &["Id", "LastName", "AccountId", "CreatedDate"],
        &[&["003A", "Smith", "001A", ""]],
    );

    let target = Arc::new(FakeTarget::default());
    let result = Orchestrator::new(config, Arc::new(source), target.clone())
        .run()
        .await
        .unwrap();
    assert_eq!(result.phase, Phase::Done);

    let state = target.state();
    // The lookup column is still added, but Account was not migrated so
    // no constraint is attached.
    assert_eq!(state.altered.len(), 1);
    assert!(state.constraints.is_empty());
}

#[tokio::test(start_paused = true)]
async fn stalled_export_job_times_out() {
    let dir = tempfile::tempdir().unwrap();

    let mut source = FakeSource::new(vec![("Account".to_string(), account_fields())]);
    source.stall_jobs = true;

    let table = synthesize_table("Account", &account_fields());
    let exporter = ExportPipeline::new(
        Arc::new(source),
        dir.path().to_path_buf(),
        Duration::from_secs(1),
        Duration::from_secs(3),
        1,
    );

    let err = exporter.run_all(&[table]).await.unwrap_err();
    match err {
        MigrateError::ExportTimeout { table, waited } => {
            assert_eq!(table, "Account");
            assert!(waited >= Duration::from_secs(3));
        }
        other => panic!("expected timeout, got {other}"),
    }
}

#[tokio::test]
async fn failed_import_still_restores_foreign_key_checks() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), &["Account"]);

    let source = FakeSource::new(vec![("Account".to_string(), account_fields())]).with_data(
        "Account",
        &["Id", "Name", "OwnerId"],
        &[&["001A", "Acme", "005X"]],
    );

    let target = Arc::new(FakeTarget::failing_inserts_into("Account"));
    let err = Orchestrator::new(config, Arc::new(source), target.clone())
        .run()
        .await
        .unwrap_err();

    match err {
        MigrateError::ImportWrite { table, row, .. } => {
            assert_eq!(table, "Account");
            assert_eq!(row, 1);
        }
        other => panic!("expected import write failure, got {other}"),
    }

    // Checks go back on even when the import aborts.
    assert_eq!(target.state().fk_toggles, vec![false, true]);
}

#[tokio::test]
async fn mid_stream_export_failure_removes_partial_artifact() {
    let dir = tempfile::tempdir().unwrap();

    let source = FakeSource::new(vec![("Account".to_string(), account_fields())])
        .with_data(
            "Account",
            &["Id", "Name", "OwnerId"],
            &[&["001A", "Acme", "005X"]],
        )
        .with_stream_failure("Account");

    let table = synthesize_table("Account", &account_fields());
    let exporter = ExportPipeline::new(
        Arc::new(source),
        dir.path().to_path_buf(),
        Duration::from_secs(1),
        Duration::from_secs(30),
        1,
    );

    let err = exporter.run_all(&[table]).await.unwrap_err();
    match err {
        MigrateError::Export { table, .. } => assert_eq!(table, "Account"),
        other => panic!("expected export failure, got {other}"),
    }
    // The partial artifact must not survive the failure.
    assert!(!dir.path().join("Account.csv").exists());
}

#[tokio::test]
async fn ragged_artifact_row_aborts_with_its_row_index() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("Account.csv"),
        "Id,Name\n001A,Acme\n001B,Globex,extra\n",
    )
    .unwrap();

    let target = Arc::new(FakeTarget::default());
    let importer = ImportPipeline::new(target.clone(), dir.path().to_path_buf(), 1);

    let err = importer.run_all().await.unwrap_err();
    match err {
        MigrateError::ImportParse { table, row, .. } => {
            assert_eq!(table, "Account");
            assert_eq!(row, 2);
        }
        other => panic!("expected parse failure, got {other}"),
    }
    // The well-formed first row was inserted before the bad one aborted.
    assert_eq!(target.state().rows["Account"].len(), 1);
}

#[tokio::test]
async fn describe_failure_names_the_object() {
    let source = FakeSource::new(vec![("Account".to_string(), account_fields())]);
    let catalog = Catalog::new(Arc::new(source), vec!["Account".to_string()], 2);

    let err = catalog.describe_fields("Ghost").await.unwrap_err();
    match err {
        MigrateError::MetadataFetch { object, .. } => assert_eq!(object, "Ghost"),
        other => panic!("expected metadata failure, got {other}"),
    }
}

#[tokio::test]
async fn empty_export_produces_empty_import() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), &["Account"]);

    let source = FakeSource::new(vec![("Account".to_string(), account_fields())]).with_data(
        "Account",
        &["Id", "Name", "OwnerId"],
        &[],
    );

    let target = Arc::new(FakeTarget::default());
    let result = Orchestrator::new(config, Arc::new(source), target.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(result.rows_exported, 0);
    assert_eq!(result.rows_imported, 0);
    assert_eq!(result.phase, Phase::Done);
    assert!(target.state().rows.is_empty());
}
