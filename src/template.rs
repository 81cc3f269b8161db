//! Configuration key/value derivation
//!
//! Pure functions from settings and backends to ordered assignments. The
//! writer in [`crate::artifact`] turns them into the INI artifact.

use crate::backends::{Backend, BackendRegistry};
use crate::settings::Settings;

pub const DEFAULT_SECTION: &str = "DEFAULT";

pub const DEFAULT_DRIVER: &str = "manila.share.drivers.generic.GenericShareDriver";
pub const DEFAULT_IMAGE: &str = "ubuntu_1204_nfs_cifs";
pub const DEFAULT_INSTANCE_USER: &str = "ubuntu";
pub const DEFAULT_INSTANCE_PASSWORD: &str = "ubuntu";
pub const DEFAULT_PUBLIC_KEY: &str = "~/.ssh/id_rsa.pub";
pub const DEFAULT_PRIVATE_KEY: &str = "~/.ssh/id_rsa";

/// Colored log formats, written only for color output without syslog
const COLOR_FORMATS: [(&str, &str); 4] = [
    (
        "logging_context_format_string",
        "%(asctime)s.%(msecs)03d %(color)s%(levelname)s %(name)s [\x1b[01;36m%(request_id)s \x1b[00;36m%(user_id)s %(project_id)s%(color)s] \x1b[01;35m%(instance)s%(color)s%(message)s\x1b[00m",
    ),
    (
        "logging_default_format_string",
        "%(asctime)s.%(msecs)03d %(color)s%(levelname)s %(name)s [\x1b[00;36m-%(color)s] \x1b[01;35m%(instance)s%(color)s%(message)s\x1b[00m",
    ),
    (
        "logging_debug_format_suffix",
        "\x1b[00;33mfrom (pid=%(process)d) %(funcName)s %(pathname)s:%(lineno)d\x1b[00m",
    ),
    (
        "logging_exception_prefix",
        "%(color)s%(asctime)s.%(msecs)03d TRACE %(name)s \x1b[01;35m%(instance)s\x1b[00m",
    ),
];

/// One `(section, key) = value` triple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub section: String,
    pub key: String,
    pub value: String,
}

impl Assignment {
    pub fn new(section: &str, key: &str, value: impl Into<String>) -> Self {
        Self {
            section: section.to_string(),
            key: key.to_string(),
            value: value.into(),
        }
    }
}

fn py_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

/// Keys of one backend section, in fixed order
pub fn render_backend(backend: &Backend) -> Vec<Assignment> {
    let section = backend.group_name.as_str();
    let creds = &backend.credentials;
    let entry = |key: &str, value: &str| Assignment::new(section, key, value);

    vec![
        entry(
            "share_driver",
            backend.driver_class.as_deref().unwrap_or(DEFAULT_DRIVER),
        ),
        entry("share_backend_name", &backend.display_name),
        entry(
            "path_to_public_key",
            creds.public_key_path.as_deref().unwrap_or(DEFAULT_PUBLIC_KEY),
        ),
        entry(
            "path_to_private_key",
            creds
                .private_key_path
                .as_deref()
                .unwrap_or(DEFAULT_PRIVATE_KEY),
        ),
        entry(
            "service_image_name",
            backend.image_name.as_deref().unwrap_or(DEFAULT_IMAGE),
        ),
        entry(
            "service_instance_user",
            creds.instance_user.as_deref().unwrap_or(DEFAULT_INSTANCE_USER),
        ),
        entry(
            "service_instance_password",
            creds
                .instance_password
                .as_deref()
                .unwrap_or(DEFAULT_INSTANCE_PASSWORD),
        ),
    ]
}

/// Keys of the DEFAULT section
pub fn render_defaults(settings: &Settings, registry: &BackendRegistry) -> Vec<Assignment> {
    let paths = &settings.paths;
    let password = settings.service.password.as_str();
    let path_value = |p: std::path::PathBuf| p.to_string_lossy().into_owned();
    let entry = |key: &str, value: String| Assignment::new(DEFAULT_SECTION, key, value);

    let mut out = vec![
        entry("auth_strategy", "keystone".to_string()),
        entry("debug", py_bool(settings.logging.debug).to_string()),
        entry("verbose", py_bool(settings.logging.verbose).to_string()),
        entry(
            "scheduler_driver",
            settings.backends.scheduler_driver.clone(),
        ),
        entry(
            "share_name_template",
            format!("{}%s", settings.backends.share_name_prefix),
        ),
        entry("sql_connection", settings.database.connection_url()),
        entry("api_paste_config", path_value(paths.api_paste_config())),
        entry("rootwrap_config", path_value(paths.rootwrap_config())),
        entry("state_path", paths.state_path.clone()),
        entry("nova_admin_password", password.to_string()),
        entry("cinder_admin_password", password.to_string()),
        entry("neutron_admin_password", password.to_string()),
        entry("lock_path", path_value(paths.lock_path())),
        entry("enabled_share_backends", registry.enabled_backends_value()),
    ];

    if settings.tls_proxy_enabled() {
        out.push(entry(
            "osapi_share_listen_port",
            settings.service.internal_port.to_string(),
        ));
    }

    if settings.logging.syslog {
        out.push(entry("use_syslog", py_bool(true).to_string()));
    }

    if settings.logging.color && !settings.logging.syslog {
        out.extend(
            COLOR_FORMATS
                .iter()
                .map(|&(key, value)| entry(key, value.to_string())),
        );
    }

    out
}

/// DEFAULT followed by each enabled backend
pub fn render(settings: &Settings, registry: &BackendRegistry) -> Vec<Assignment> {
    let mut out = render_defaults(settings, registry);
    for backend in registry.enabled() {
        out.extend(render_backend(backend));
    }
    out
}
