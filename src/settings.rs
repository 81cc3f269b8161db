//! Deployment settings
//!
//! One immutable [`Settings`] value is built in `main` from an optional TOML
//! file plus `SHARESTACK_*` overrides and passed explicitly to every
//! component. Nothing below `main` reads the process environment.

use crate::backends::BackendRegistry;
use crate::error::BootstrapError;
use crate::paths;
use anyhow::{Context, Result};
use cloudkit::DatabaseKind;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Service names recognised in `enabled_services`
pub const API: &str = "m-api";
pub const SCHEDULER: &str = "m-sch";
pub const SHARE: &str = "m-shr";
pub const TLS_PROXY: &str = "tls-proxy";

/// Prefix of every environment override
pub const ENV_PREFIX: &str = "SHARESTACK_";

/// `scheme[+driver]://[user[:password]@]host[:port]/name[?options]`
static DATABASE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<scheme>[a-z]+)(?:\+[a-z0-9_]+)?://(?:(?P<user>[^:@/]+)(?::(?P<password>[^@/]*))?@)?(?P<host>[^:@/?]+)(?::(?P<port>[0-9]+))?/(?P<name>[^/?]+)(?:\?.*)?$",
    )
    .expect("valid regex")
});

// ============================================================================
// Schema
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Unprivileged account the services run as
    pub stack_user: String,

    /// Enabled service names (`m-api`, `m-sch`, `m-shr`, `tls-proxy`, `mysql`, ...)
    pub enabled_services: Vec<String>,

    pub service: ServiceSettings,
    pub identity: IdentitySettings,
    pub database: DatabaseSettings,
    pub paths: PathSettings,
    pub backends: BackendSettings,
    pub logging: LoggingSettings,
    pub network: NetworkSettings,
    pub tls: TlsSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            stack_user: "stack".to_string(),
            enabled_services: [API, SCHEDULER, SHARE, "mysql"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            service: ServiceSettings::default(),
            identity: IdentitySettings::default(),
            database: DatabaseSettings::default(),
            paths: PathSettings::default(),
            backends: BackendSettings::default(),
            logging: LoggingSettings::default(),
            network: NetworkSettings::default(),
            tls: TlsSettings::default(),
        }
    }
}

/// The share service's own endpoint and account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub host: String,
    /// Public API port
    pub port: u16,
    /// Port the API binds to when the TLS proxy owns the public port
    pub internal_port: u16,
    pub protocol: String,
    pub tenant: String,
    pub user: String,
    /// Service account password; also used for the compute, block and
    /// network admin passwords in the artifact
    pub password: String,
    pub region: String,
    pub email_domain: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8786,
            internal_port: 18776,
            protocol: "http".to_string(),
            tenant: "service".to_string(),
            user: "manila".to_string(),
            password: String::new(),
            region: "RegionOne".to_string(),
            email_domain: "example.com".to_string(),
        }
    }
}

impl ServiceSettings {
    /// Catalog URL, identical for the public, admin and internal interfaces
    pub fn endpoint_url(&self) -> String {
        format!(
            "{}://{}:{}/v1/$(tenant_id)s",
            self.protocol, self.host, self.port
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    pub host: String,
    pub port: u16,
    pub protocol: String,
    /// Catalog backend; endpoints are registered only for `sql`
    pub catalog_backend: String,
    pub admin_user: String,
    pub admin_password: String,
    pub admin_project: String,
    pub user_domain: String,
    pub project_domain: String,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 35357,
            protocol: "http".to_string(),
            catalog_backend: "sql".to_string(),
            admin_user: "admin".to_string(),
            admin_password: String::new(),
            admin_project: "admin".to_string(),
            user_domain: "Default".to_string(),
            project_domain: "Default".to_string(),
        }
    }
}

impl IdentitySettings {
    pub fn auth_url(&self) -> String {
        format!("{}://{}:{}/v3", self.protocol, self.host, self.port)
    }

    pub fn uses_sql_catalog(&self) -> bool {
        self.catalog_backend == "sql"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub backend: DatabaseKind,
    pub host: String,
    pub port: Option<u16>,
    pub user: String,
    pub password: String,
    pub name: String,
    /// Full connection URL. When set it is split into the fields above,
    /// so the recreated database is the one the service connects to.
    pub url: Option<String>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            backend: DatabaseKind::Mysql,
            host: "127.0.0.1".to_string(),
            port: None,
            user: "root".to_string(),
            password: String::new(),
            name: "manila".to_string(),
            url: None,
        }
    }
}

impl DatabaseSettings {
    /// Split `url` into flavor, server, credentials and name.
    ///
    /// A no-op without a URL. A URL that can't be split, or whose scheme is
    /// neither MySQL nor PostgreSQL, is a configuration error.
    pub fn adopt_url(&mut self) -> Result<(), BootstrapError> {
        let Some(url) = &self.url else {
            return Ok(());
        };
        let invalid = |why: &str| {
            BootstrapError::configuration(format!("database url '{url}' {why}"))
        };
        let caps = DATABASE_URL
            .captures(url)
            .ok_or_else(|| invalid("is not scheme://[user[:password]@]host[:port]/name"))?;

        let backend = match &caps["scheme"] {
            "mysql" => DatabaseKind::Mysql,
            "postgresql" | "postgres" => DatabaseKind::Postgresql,
            _ => return Err(invalid("names an unsupported database")),
        };
        let port = caps
            .name("port")
            .map(|p| p.as_str().parse::<u16>())
            .transpose()
            .map_err(|_| invalid("has an invalid port"))?;

        let field = |name: &str| caps.name(name).map(|m| m.as_str().to_string());
        self.backend = backend;
        self.host = caps["host"].to_string();
        self.port = port;
        self.name = caps["name"].to_string();
        if let Some(user) = field("user") {
            self.user = user;
        }
        self.password = field("password").unwrap_or_default();
        Ok(())
    }

    /// `sql_connection` value
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let encoding = match self.backend {
            DatabaseKind::Mysql => "charset=utf8",
            DatabaseKind::Postgresql => "client_encoding=utf8",
        };
        let host = match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        };
        format!(
            "{}://{}:{}@{}/{}?{}",
            self.backend.scheme(),
            self.user,
            self.password,
            host,
            self.name,
            encoding
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub conf_dir: String,
    pub state_path: String,
    /// Defaults to `state_path`
    pub lock_path: Option<String>,
    pub bin_dir: String,
    /// Checkout of the service sources
    pub source_dir: String,
    pub auth_cache_dir: String,
    /// Defaults to `<state_path>/run`
    pub run_dir: Option<String>,
    /// Defaults to `<state_path>/logs`
    pub log_dir: Option<String>,
    pub sudoers_dir: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            conf_dir: "/etc/manila".to_string(),
            state_path: "/opt/stack/data/manila".to_string(),
            lock_path: None,
            bin_dir: "/usr/local/bin".to_string(),
            source_dir: "/opt/stack/manila".to_string(),
            auth_cache_dir: "/var/cache/manila".to_string(),
            run_dir: None,
            log_dir: None,
            sudoers_dir: "/etc/sudoers.d".to_string(),
        }
    }
}

impl PathSettings {
    pub fn conf_dir(&self) -> PathBuf {
        PathBuf::from(&self.conf_dir)
    }

    pub fn state_path(&self) -> PathBuf {
        PathBuf::from(&self.state_path)
    }

    pub fn lock_path(&self) -> PathBuf {
        PathBuf::from(self.lock_path.as_deref().unwrap_or(&self.state_path))
    }

    pub fn run_dir(&self) -> PathBuf {
        match &self.run_dir {
            Some(dir) => PathBuf::from(dir),
            None => self.state_path().join("run"),
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        match &self.log_dir {
            Some(dir) => PathBuf::from(dir),
            None => self.state_path().join("logs"),
        }
    }

    pub fn auth_cache_dir(&self) -> PathBuf {
        PathBuf::from(&self.auth_cache_dir)
    }

    /// The generated artifact
    pub fn config_file(&self) -> PathBuf {
        self.conf_dir().join("manila.conf")
    }

    pub fn api_paste_config(&self) -> PathBuf {
        self.conf_dir().join("api-paste.ini")
    }

    pub fn rootwrap_config(&self) -> PathBuf {
        self.conf_dir().join("rootwrap.conf")
    }

    /// Installed rootwrap filter directory
    pub fn rootwrap_filters_dir(&self) -> PathBuf {
        self.conf_dir().join("rootwrap.d")
    }

    /// Filter definitions shipped in the source tree
    pub fn rootwrap_source_dir(&self) -> PathBuf {
        PathBuf::from(&self.source_dir)
            .join("etc")
            .join("manila")
            .join("rootwrap.d")
    }

    pub fn rootwrap_binary(&self) -> PathBuf {
        PathBuf::from(&self.bin_dir).join("manila-rootwrap")
    }

    pub fn sudoers_file(&self) -> PathBuf {
        PathBuf::from(&self.sudoers_dir).join("manila-rootwrap")
    }

    pub fn binary(&self, name: &str) -> PathBuf {
        PathBuf::from(&self.bin_dir).join(name)
    }
}

/// One backend slot; unset fields fall back to the shared values
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSlot {
    pub group: String,
    pub name: String,
    pub share_driver: Option<String>,
    pub image_name: Option<String>,
    pub instance_user: Option<String>,
    pub instance_password: Option<String>,
    pub public_key: Option<String>,
    pub private_key: Option<String>,
}

impl BackendSlot {
    fn named(group: &str, name: &str) -> Self {
        Self {
            group: group.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub multi_backend: bool,
    pub backend1: BackendSlot,
    pub backend2: BackendSlot,
    pub share_driver: Option<String>,
    pub image_name: Option<String>,
    pub instance_user: Option<String>,
    pub instance_password: Option<String>,
    pub public_key: String,
    pub private_key: String,
    pub share_name_prefix: String,
    pub scheduler_driver: String,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            multi_backend: false,
            backend1: BackendSlot::named("london", "LONDON"),
            backend2: BackendSlot::named("paris", "PARIS"),
            share_driver: None,
            image_name: None,
            instance_user: None,
            instance_password: None,
            public_key: "~/.ssh/id_rsa.pub".to_string(),
            private_key: "~/.ssh/id_rsa".to_string(),
            share_name_prefix: "share-".to_string(),
            scheduler_driver: "manila.scheduler.filter_scheduler.FilterScheduler".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub syslog: bool,
    pub color: bool,
    pub debug: bool,
    pub verbose: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            syslog: false,
            color: true,
            debug: true,
            verbose: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub security_group: String,
    pub visibility_timeout_secs: u64,
    pub poll_interval_secs: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            security_group: "manila-service".to_string(),
            visibility_timeout_secs: 30,
            poll_interval_secs: 1,
        }
    }
}

/// TLS-terminating proxy in front of the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsSettings {
    pub proxy_binary: String,
    pub certificate: String,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            proxy_binary: "stud".to_string(),
            certificate: "/opt/stack/data/CA/int-ca/private/devstack-cert.pem".to_string(),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl Settings {
    /// Load settings from a TOML file.
    ///
    /// A missing file at the default location yields the defaults; a
    /// missing file the user named explicitly is an error.
    pub fn load(path: &Path, explicit: bool) -> Result<Self> {
        if !path.exists() {
            if explicit {
                return Err(BootstrapError::configuration(format!(
                    "settings file not found: {}",
                    path.display()
                ))
                .into());
            }
            log::debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read settings file: {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid settings in {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self, BootstrapError> {
        toml::from_str(content).map_err(|e| BootstrapError::configuration(e.to_string()))
    }

    /// Load, apply overrides, expand paths and validate, in that order
    pub fn resolve<F>(path: &Path, explicit: bool, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::load(path, explicit)?;
        settings.database.adopt_url()?;
        settings.apply_overrides(lookup)?;
        settings.expand_paths();
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `SHARESTACK_*` overrides from `lookup`, which receives the
    /// variable name without the prefix.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), BootstrapError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(value) = get("ENABLED_SERVICES") {
            self.enabled_services = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(value) = get("MULTI_BACKEND") {
            self.backends.multi_backend = parse_bool("MULTI_BACKEND", &value)?;
        }
        if let Some(value) = get("BACKEND1_GROUP") {
            self.backends.backend1.group = value;
        }
        if let Some(value) = get("BACKEND1_NAME") {
            self.backends.backend1.name = value;
        }
        if let Some(value) = get("BACKEND2_GROUP") {
            self.backends.backend2.group = value;
        }
        if let Some(value) = get("BACKEND2_NAME") {
            self.backends.backend2.name = value;
        }
        if let Some(value) = get("TLS_PROXY") {
            let enabled = parse_bool("TLS_PROXY", &value)?;
            self.set_service_enabled(TLS_PROXY, enabled);
        }
        if let Some(value) = get("SYSLOG") {
            self.logging.syslog = parse_bool("SYSLOG", &value)?;
        }
        if let Some(value) = get("LOG_COLOR") {
            self.logging.color = parse_bool("LOG_COLOR", &value)?;
        }
        if let Some(value) = get("SERVICE_HOST") {
            self.service.host = value;
        }
        if let Some(value) = get("SERVICE_PASSWORD") {
            self.service.password = value;
        }
        if let Some(value) = get("IDENTITY_HOST") {
            self.identity.host = value;
        }
        if let Some(value) = get("IDENTITY_PORT") {
            self.identity.port = value.parse().map_err(|_| {
                BootstrapError::configuration(format!(
                    "{ENV_PREFIX}IDENTITY_PORT is not a port number: '{value}'"
                ))
            })?;
        }
        if let Some(value) = get("IDENTITY_PROTOCOL") {
            self.identity.protocol = value;
        }
        if let Some(value) = get("DATABASE_URL") {
            self.database.url = Some(value);
            self.database.adopt_url()?;
        }
        Ok(())
    }

    /// Expand `~` and `$VAR` in every path setting
    pub fn expand_paths(&mut self) {
        let p = &mut self.paths;
        for path in [
            &mut p.conf_dir,
            &mut p.state_path,
            &mut p.bin_dir,
            &mut p.source_dir,
            &mut p.auth_cache_dir,
            &mut p.sudoers_dir,
        ] {
            paths::expand_in_place(path);
        }
        for path in [&mut p.lock_path, &mut p.run_dir, &mut p.log_dir]
            .into_iter()
            .flatten()
        {
            paths::expand_in_place(path);
        }

        let b = &mut self.backends;
        paths::expand_in_place(&mut b.public_key);
        paths::expand_in_place(&mut b.private_key);
        for slot in [&mut b.backend1, &mut b.backend2] {
            for path in [&mut slot.public_key, &mut slot.private_key]
                .into_iter()
                .flatten()
            {
                paths::expand_in_place(path);
            }
        }

        paths::expand_in_place(&mut self.tls.certificate);
    }

    /// Reject inputs that would produce a broken deployment
    pub fn validate(&self) -> Result<(), BootstrapError> {
        BackendRegistry::from_settings(self)?;

        if self.stack_user.trim().is_empty() {
            return Err(BootstrapError::configuration("stack_user must not be empty"));
        }
        if self.service.port == self.service.internal_port {
            return Err(BootstrapError::configuration(format!(
                "service port and internal port must differ (both {})",
                self.service.port
            )));
        }
        if self.network.security_group.trim().is_empty() {
            return Err(BootstrapError::configuration(
                "network.security_group must not be empty",
            ));
        }
        if self.network.poll_interval_secs == 0 {
            return Err(BootstrapError::configuration(
                "network.poll_interval_secs must be at least 1",
            ));
        }
        cloudkit::types::validate_database_name(&self.database.name)
            .map_err(|e| BootstrapError::configuration(e.to_string()))?;
        Ok(())
    }

    pub fn is_service_enabled(&self, name: &str) -> bool {
        self.enabled_services.iter().any(|s| s == name)
    }

    pub fn set_service_enabled(&mut self, name: &str, enabled: bool) {
        let present = self.is_service_enabled(name);
        if enabled && !present {
            self.enabled_services.push(name.to_string());
        } else if !enabled {
            self.enabled_services.retain(|s| s != name);
        }
    }

    pub fn api_enabled(&self) -> bool {
        self.is_service_enabled(API)
    }

    pub fn tls_proxy_enabled(&self) -> bool {
        self.is_service_enabled(TLS_PROXY)
    }

    /// Whether the configured database flavor is among the enabled services
    pub fn database_enabled(&self) -> bool {
        self.is_service_enabled(self.database.backend.service_name())
    }
}

/// Accepts true/false/yes/no/1/0 in any case
pub fn parse_bool(key: &str, value: &str) -> Result<bool, BootstrapError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(BootstrapError::configuration(format!(
            "{ENV_PREFIX}{key} is not a boolean: '{value}'"
        ))),
    }
}
