//! The provisioning pipeline
//!
//! Stage order is fixed: directories, network, keys, rootwrap, sudo,
//! account, config, database. The config artifact lands before the
//! database stage because the schema migration reads it.

use crate::artifact::ConfigArtifact;
use crate::backends::BackendRegistry;
use crate::resource::{
    CatalogEntry, ConfigFile, DatabaseSync, Directory, KeyPair, RoleBinding, RootwrapFilters,
    SecurityGroupResource, ServiceUser, SudoGrant,
};
use crate::runner::{CommandRunner, SystemRunner};
use crate::settings::Settings;
use crate::template;
use anyhow::Result;
use cloudkit::{
    CatalogService, CliAuth, Database, DatabaseCli, Identity, Network, NewUser, OpenStackCli,
};
use declarative::{BoxedResource, Pipeline, WaitConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const STAGES: [&str; 8] = [
    "directories",
    "network",
    "keys",
    "rootwrap",
    "sudo",
    "account",
    "config",
    "database",
];

/// Role bound to the service user in its tenant
const SERVICE_ROLE: &str = "admin";

/// External services the pipeline talks to
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub network: Arc<dyn Network>,
    pub identity: Arc<dyn Identity>,
    pub database: Arc<dyn Database>,
    pub runner: Arc<dyn CommandRunner>,
}

impl Collaborators {
    /// The command-line clients, authenticated as the identity admin
    pub fn from_settings(settings: &Settings) -> Self {
        let id = &settings.identity;
        let cli = Arc::new(OpenStackCli::new(CliAuth {
            auth_url: id.auth_url(),
            username: id.admin_user.clone(),
            password: id.admin_password.clone(),
            project_name: id.admin_project.clone(),
            user_domain: id.user_domain.clone(),
            project_domain: id.project_domain.clone(),
        }));
        let db = &settings.database;
        Self {
            network: cli.clone(),
            identity: cli,
            database: Arc::new(
                DatabaseCli::new(db.backend, &db.host, &db.user, &db.password).with_port(db.port),
            ),
            runner: Arc::new(SystemRunner),
        }
    }
}

/// Render the artifact for the current settings
pub fn artifact(settings: &Settings, registry: &BackendRegistry) -> Result<ConfigArtifact> {
    Ok(ConfigArtifact::from_assignments(&template::render(
        settings, registry,
    ))?)
}

fn directories(settings: &Settings) -> Vec<BoxedResource> {
    let p = &settings.paths;
    let mut seen: Vec<PathBuf> = Vec::new();
    for dir in [
        p.conf_dir(),
        p.state_path(),
        p.lock_path(),
        p.auth_cache_dir(),
        p.run_dir(),
        p.log_dir(),
    ] {
        if !seen.contains(&dir) {
            seen.push(dir);
        }
    }
    seen.into_iter()
        .map(|dir| Box::new(Directory::new(dir, &settings.stack_user)) as BoxedResource)
        .collect()
}

/// Build the full pipeline. Steps gated off by settings are left out.
pub fn build_pipeline(
    settings: &Settings,
    registry: &BackendRegistry,
    collab: &Collaborators,
) -> Result<Pipeline> {
    let p = &settings.paths;
    let mut pipeline = Pipeline::new().stage("directories", directories(settings));

    let wait = WaitConfig::new(
        Duration::from_secs(settings.network.visibility_timeout_secs),
        Duration::from_secs(settings.network.poll_interval_secs),
    );
    pipeline.push(
        "network",
        Box::new(SecurityGroupResource::new(
            &settings.network.security_group,
            collab.network.clone(),
            wait,
        )),
    );

    for (private, public) in registry.private_keys() {
        pipeline.push(
            "keys",
            Box::new(KeyPair::new(private, public, collab.runner.clone())),
        );
    }

    let source = p.rootwrap_source_dir();
    let rootwrap = source.is_dir();
    if rootwrap {
        pipeline.push(
            "rootwrap",
            Box::new(RootwrapFilters::new(
                &source,
                p.rootwrap_filters_dir(),
                p.rootwrap_config(),
                &p.bin_dir,
            )),
        );
    } else {
        log::info!("No rootwrap filters at {}, skipping", source.display());
    }

    pipeline.push(
        "sudo",
        Box::new(SudoGrant::new(
            &settings.stack_user,
            p.rootwrap_binary(),
            rootwrap.then(|| p.rootwrap_config()),
            p.sudoers_file(),
        )),
    );

    if settings.api_enabled() {
        let svc = &settings.service;
        pipeline.push(
            "account",
            Box::new(ServiceUser::new(
                NewUser {
                    name: svc.user.clone(),
                    password: svc.password.clone(),
                    project: svc.tenant.clone(),
                    email: format!("{}@{}", svc.user, svc.email_domain),
                },
                collab.identity.clone(),
            )
            .with_wait(wait)),
        );
        pipeline.push(
            "account",
            Box::new(RoleBinding::new(
                &svc.user,
                &svc.tenant,
                SERVICE_ROLE,
                collab.identity.clone(),
            )
            .with_wait(wait)),
        );
        if settings.identity.uses_sql_catalog() {
            pipeline.push(
                "account",
                Box::new(CatalogEntry::new(
                    CatalogService {
                        name: "manila".to_string(),
                        kind: "share".to_string(),
                        description: "Manila Shared Filesystem Service".to_string(),
                    },
                    svc.endpoint_url(),
                    &svc.region,
                    collab.identity.clone(),
                )
                .with_wait(wait)),
            );
        } else {
            log::info!(
                "Identity catalog backend is '{}', not registering endpoints",
                settings.identity.catalog_backend
            );
        }
    } else {
        log::info!("API service disabled, skipping service account");
    }

    pipeline.push(
        "config",
        Box::new(ConfigFile::new(
            p.config_file(),
            artifact(settings, registry)?,
        )),
    );

    if settings.database_enabled() {
        pipeline.push(
            "database",
            Box::new(DatabaseSync::new(
                &settings.database.name,
                p.binary("manila-manage"),
                p.config_file(),
                collab.database.clone(),
                collab.runner.clone(),
            )),
        );
    } else {
        log::info!(
            "{} not enabled, skipping database",
            settings.database.backend
        );
    }

    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::RecordingRunner;
    use crate::settings::API;
    use crate::sudo::testing::RecordingSudo;
    use crate::testing::{FakeDatabase, FakeIdentity, FakeNetwork};
    use cloudkit::DatabaseKind;
    use declarative::{AutoConfirm, CommandOutput, ExecuteOptions, NoProgress, execute};
    use std::fs;
    use tempfile::TempDir;

    struct Harness {
        dir: TempDir,
        settings: Settings,
        network: Arc<FakeNetwork>,
        identity: Arc<FakeIdentity>,
        database: Arc<FakeDatabase>,
        runner: Arc<RecordingRunner>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_identity(FakeIdentity::default())
        }

        fn with_identity(identity: FakeIdentity) -> Self {
            let dir = TempDir::new().unwrap();
            let root = dir.path().to_string_lossy().into_owned();
            let mut settings = Settings::default();
            settings.paths.conf_dir = format!("{root}/etc/manila");
            settings.paths.state_path = format!("{root}/data/manila");
            settings.paths.source_dir = format!("{root}/src/manila");
            settings.paths.auth_cache_dir = format!("{root}/cache/manila");
            settings.paths.bin_dir = format!("{root}/bin");
            settings.paths.sudoers_dir = format!("{root}/sudoers.d");
            settings.backends.private_key = format!("{root}/ssh/id_rsa");
            settings.backends.public_key = format!("{root}/ssh/id_rsa.pub");
            settings.network.visibility_timeout_secs = 0;

            // ssh-keygen -f writes both halves; everything else succeeds
            let runner = Arc::new(RecordingRunner::with_handler(|cmd, args| {
                if cmd == "ssh-keygen" && args.contains(&"-f") && !args.contains(&"-y") {
                    let path = args[args.len() - 1];
                    fs::create_dir_all(std::path::Path::new(path).parent().unwrap()).unwrap();
                    fs::write(path, "PRIVATE").unwrap();
                    fs::write(format!("{path}.pub"), "ssh-rsa AAAA\n").unwrap();
                }
                Ok(CommandOutput::ok(Vec::new()))
            }));

            Self {
                dir,
                settings,
                network: Arc::new(FakeNetwork::default()),
                identity: Arc::new(identity),
                database: Arc::new(FakeDatabase::new(DatabaseKind::Mysql)),
                runner,
            }
        }

        fn collaborators(&self) -> Collaborators {
            Collaborators {
                network: self.network.clone(),
                identity: self.identity.clone(),
                database: self.database.clone(),
                runner: self.runner.clone(),
            }
        }

        fn pipeline(&self) -> Pipeline {
            let registry = BackendRegistry::from_settings(&self.settings).unwrap();
            build_pipeline(&self.settings, &registry, &self.collaborators()).unwrap()
        }

        fn run(&self) -> Result<declarative::RunSummary> {
            let sudo = RecordingSudo::succeeding();
            execute(
                &self.pipeline(),
                &ExecuteOptions::default(),
                || Ok(sudo),
                &mut NoProgress,
                &mut AutoConfirm,
            )
        }
    }

    #[test]
    fn stages_run_in_fixed_order() {
        let h = Harness::new();
        assert_eq!(
            h.pipeline().stage_names(),
            vec!["directories", "network", "keys", "sudo", "account", "config", "database"]
        );
    }

    #[test]
    fn rootwrap_stage_appears_with_source_filters() {
        let h = Harness::new();
        fs::create_dir_all(h.settings.paths.rootwrap_source_dir()).unwrap();
        assert_eq!(h.pipeline().stage_names(), STAGES.to_vec());
    }

    #[test]
    fn lock_path_defaulting_to_state_path_is_created_once() {
        let h = Harness::new();
        let pipeline = h.pipeline();
        let dirs: Vec<_> = pipeline
            .resources()
            .filter(|(stage, _)| *stage == "directories")
            .map(|(_, r)| r.id())
            .collect();
        assert_eq!(dirs.len(), 5);
    }

    #[test]
    fn full_run_provisions_everything() {
        let h = Harness::new();
        let summary = h.run().unwrap();

        let applied = &summary.applied;
        let position = |prefix: &str| applied.iter().position(|id| id.starts_with(prefix)).unwrap();
        assert!(position("dir:") < position("secgroup:"));
        assert!(position("secgroup:") < position("keypair:"));
        assert!(position("keypair:") < position("sudoers:"));
        assert!(position("sudoers:") < position("user:"));
        assert!(position("catalog:") < position("config:"));
        assert!(position("config:") < position("database:"));

        assert_eq!(h.network.rules("manila-service").len(), 8);
        assert_eq!(h.database.recreated(), vec!["manila"]);
        let conf = fs::read_to_string(h.settings.paths.config_file()).unwrap();
        assert!(conf.contains("[london]"));
        assert!(h.dir.path().join("ssh/id_rsa").exists());
    }

    #[test]
    fn account_is_skipped_without_the_api() {
        let mut h = Harness::new();
        h.settings.set_service_enabled(API, false);
        assert!(!h.pipeline().stage_names().contains(&"account"));

        h.run().unwrap();
        assert!(h.identity.calls().is_empty());
    }

    #[test]
    fn catalog_is_skipped_for_non_sql_backends() {
        let mut h = Harness::new();
        h.settings.identity.catalog_backend = "templated".into();
        h.run().unwrap();

        let calls = h.identity.calls();
        assert_eq!(
            calls,
            vec!["create_user manila", "grant_role manila service admin"]
        );
    }

    #[test]
    fn database_is_skipped_when_not_enabled() {
        let mut h = Harness::new();
        h.settings.enabled_services.retain(|s| s != "mysql");
        assert!(!h.pipeline().stage_names().contains(&"database"));
    }

    #[test]
    fn first_failure_aborts_the_run() {
        let h = Harness::with_identity(FakeIdentity::failing());
        let err = h.run().unwrap_err();

        assert!(format!("{err:#}").contains("user:manila"));
        assert!(!h.settings.paths.config_file().exists());
        assert!(h.database.recreated().is_empty());
    }

    #[test]
    fn second_run_changes_nothing_but_the_database() {
        let h = Harness::new();
        h.run().unwrap();
        let network_creates = h.network.rule_creates();

        let summary = h.run().unwrap();
        assert_eq!(h.network.rule_creates(), network_creates);
        // the sudoers fake never reports the installed fragment, so it is
        // reinstalled along with the always-fresh database
        assert_eq!(summary.total_changes(), 2);
        assert_eq!(h.identity.calls().len(), 6);
    }

    #[test]
    fn database_url_override_changes_the_recreate_target() {
        let mut settings = Settings::default();
        settings
            .apply_overrides(|key| {
                (key == "DATABASE_URL")
                    .then(|| "postgresql://svc:pw@db.example.com:5433/manila2".to_string())
            })
            .unwrap();
        settings.set_service_enabled("postgresql", true);

        let collab = Collaborators::from_settings(&settings);
        let client = format!("{:?}", collab.database);
        assert_eq!(collab.database.kind(), DatabaseKind::Postgresql);
        assert!(client.contains("host: \"db.example.com\""), "{client}");
        assert!(client.contains("port: Some(5433)"), "{client}");
        assert!(client.contains("user: \"svc\""), "{client}");
        assert!(settings.database_enabled());

        let registry = BackendRegistry::from_settings(&settings).unwrap();
        let rendered = artifact(&settings, &registry).unwrap().render();
        assert!(rendered.contains("sql_connection = postgresql://svc:pw@db.example.com:5433/manila2"));
    }
}
