//! Service database: recreated empty, then migrated

use super::external;
use crate::error::BootstrapError;
use crate::runner::CommandRunner;
use anyhow::Result;
use cloudkit::Database;
use declarative::{ApplyContext, ApplyResult, Resource, ResourceState};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Drops and recreates the database, then runs `manila-manage db sync`.
///
/// There is no "already synced" check: a bootstrap always starts the
/// service from an empty schema, so this step always applies.
#[derive(Debug)]
pub struct DatabaseSync {
    name: String,
    manage_binary: PathBuf,
    config_file: PathBuf,
    database: Arc<dyn Database>,
    runner: Arc<dyn CommandRunner>,
}

impl DatabaseSync {
    pub fn new(
        name: impl Into<String>,
        manage_binary: impl AsRef<Path>,
        config_file: impl AsRef<Path>,
        database: Arc<dyn Database>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            name: name.into(),
            manage_binary: manage_binary.as_ref().to_path_buf(),
            config_file: config_file.as_ref().to_path_buf(),
            database,
            runner,
        }
    }
}

impl Resource for DatabaseSync {
    fn id(&self) -> String {
        format!("database:{}", self.name)
    }

    fn description(&self) -> String {
        format!(
            "Recreate {} database {} and sync its schema",
            self.database.kind(),
            self.name
        )
    }

    fn resource_type(&self) -> &'static str {
        "database"
    }

    fn current_state(&self) -> Result<ResourceState> {
        Ok(ResourceState::Unknown)
    }

    fn desired_state(&self) -> ResourceState {
        ResourceState::present_with("empty schema, migrated")
    }

    fn needs_apply(&self) -> Result<bool> {
        Ok(true)
    }

    fn apply(&self, _ctx: &mut ApplyContext) -> Result<ApplyResult> {
        log::info!("Recreating {} database {}", self.database.kind(), self.name);
        self.database
            .recreate(&self.name)
            .map_err(|e| external("database", &e))?;

        let binary = self.manage_binary.to_string_lossy();
        let config = self.config_file.to_string_lossy();
        log::info!("Migrating schema with {binary}");
        self.runner
            .run_checked(&binary, &["--config-file", &config, "db", "sync"])
            .map_err(|e| BootstrapError::ExternalService {
                service: "database".to_string(),
                message: format!("schema migration of {} failed: {e:#}", self.name),
            })?;

        Ok(ApplyResult::Created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BootstrapError;
    use crate::runner::testing::RecordingRunner;
    use crate::testing::FakeDatabase;
    use cloudkit::DatabaseKind;
    use declarative::CommandOutput;

    fn sync(db: &Arc<FakeDatabase>, runner: &Arc<RecordingRunner>) -> DatabaseSync {
        DatabaseSync::new(
            "manila",
            "/usr/local/bin/manila-manage",
            "/etc/manila/manila.conf",
            db.clone(),
            runner.clone(),
        )
    }

    #[test]
    fn recreates_then_migrates() {
        let db = Arc::new(FakeDatabase::new(DatabaseKind::Mysql));
        let runner = Arc::new(RecordingRunner::succeeding());
        let resource = sync(&db, &runner);

        assert!(resource.needs_apply().unwrap());
        assert_eq!(
            resource.apply(&mut ApplyContext::new(false)).unwrap(),
            ApplyResult::Created
        );
        assert_eq!(db.recreated(), vec!["manila"]);
        assert_eq!(
            runner.calls(),
            vec!["/usr/local/bin/manila-manage --config-file /etc/manila/manila.conf db sync"]
        );
    }

    #[test]
    fn unreachable_server_skips_migration() {
        let db = Arc::new(FakeDatabase::failing(DatabaseKind::Postgresql));
        let runner = Arc::new(RecordingRunner::succeeding());

        let err = sync(&db, &runner)
            .apply(&mut ApplyContext::new(false))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BootstrapError>(),
            Some(BootstrapError::ExternalService { .. })
        ));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn failed_migration_aborts() {
        let db = Arc::new(FakeDatabase::new(DatabaseKind::Mysql));
        let runner = Arc::new(RecordingRunner::with_handler(|_, _| {
            Ok(CommandOutput {
                stdout: Vec::new(),
                stderr: b"OperationalError".to_vec(),
                success: false,
            })
        }));

        let err = sync(&db, &runner)
            .apply(&mut ApplyContext::new(false))
            .unwrap_err();
        match err.downcast_ref::<BootstrapError>() {
            Some(BootstrapError::ExternalService { service, message }) => {
                assert_eq!(service, "database");
                assert!(message.contains("OperationalError"), "{message}");
            }
            other => panic!("expected external error, got {other:?}"),
        }
    }
}
