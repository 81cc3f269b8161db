//! Network and identity backends driving the `openstack` command-line client.

use crate::backend::{Identity, Network};
use crate::error::{Error, Result};
use crate::types::{
    CatalogService, Endpoint, Interface, NewUser, PortRange, Protocol, SecurityGroup,
    SecurityRule,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::process::{Command, Output};

/// Admin credentials passed to the client through `OS_*` variables
#[derive(Debug, Clone)]
pub struct CliAuth {
    pub auth_url: String,
    pub username: String,
    pub password: String,
    pub project_name: String,
    pub user_domain: String,
    pub project_domain: String,
}

impl CliAuth {
    fn env(&self) -> [(&'static str, &str); 7] {
        [
            ("OS_AUTH_URL", self.auth_url.as_str()),
            ("OS_USERNAME", self.username.as_str()),
            ("OS_PASSWORD", self.password.as_str()),
            ("OS_PROJECT_NAME", self.project_name.as_str()),
            ("OS_USER_DOMAIN_NAME", self.user_domain.as_str()),
            ("OS_PROJECT_DOMAIN_NAME", self.project_domain.as_str()),
            ("OS_IDENTITY_API_VERSION", "3"),
        ]
    }
}

/// Backend that executes `openstack` commands.
#[derive(Debug, Clone)]
pub struct OpenStackCli {
    program: String,
    auth: CliAuth,
}

impl OpenStackCli {
    pub fn new(auth: CliAuth) -> Self {
        Self {
            program: "openstack".to_string(),
            auth,
        }
    }

    /// Use a different client binary
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn describe(&self, args: &[&str]) -> String {
        let verb: Vec<&str> = args.iter().take(3).copied().collect();
        format!("{} {}", self.program, verb.join(" "))
    }

    fn output(&self, args: &[&str]) -> Result<Output> {
        log::debug!("running {}", self.describe(args));
        Command::new(&self.program)
            .args(args)
            .envs(self.auth.env())
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => Error::ToolMissing {
                    tool: self.program.clone(),
                },
                _ => Error::Io(e),
            })
    }

    fn run_checked(&self, args: &[&str]) -> Result<Vec<u8>> {
        let output = self.output(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::from_cli_output(&self.describe(args), &stderr));
        }
        Ok(output.stdout)
    }

    fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T> {
        let mut full: Vec<&str> = args.to_vec();
        full.extend(["-f", "json"]);
        let stdout = self.run_checked(&full)?;
        serde_json::from_slice(&stdout).map_err(|source| Error::Parse {
            command: self.describe(args),
            source,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ListedRow {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ShownRow {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RuleRow {
    #[serde(rename = "IP Protocol")]
    protocol: Option<String>,
    #[serde(rename = "IP Range")]
    ip_range: Option<String>,
    #[serde(rename = "Port Range")]
    port_range: Option<String>,
    #[serde(rename = "Direction", default)]
    direction: Option<String>,
    #[serde(rename = "Ethertype", default)]
    ethertype: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoleRow {
    #[serde(rename = "Role")]
    role: String,
}

#[derive(Debug, Deserialize)]
struct EndpointRow {
    #[serde(rename = "Interface")]
    interface: String,
    #[serde(rename = "URL")]
    url: String,
}

/// Convert rule listing rows into IPv4 ingress rules.
///
/// Rows without a protocol (allow-all rules between group members) and
/// IPv6 or egress rows are not part of any policy we manage and are dropped.
fn rules_from_rows(rows: Vec<RuleRow>) -> Result<Vec<SecurityRule>> {
    let mut rules = Vec::new();
    for row in rows {
        if row
            .direction
            .as_deref()
            .is_some_and(|d| !d.eq_ignore_ascii_case("ingress"))
        {
            continue;
        }
        if row
            .ethertype
            .as_deref()
            .is_some_and(|e| !e.eq_ignore_ascii_case("ipv4"))
        {
            continue;
        }
        let Some(protocol) = row.protocol.as_deref().filter(|p| !p.is_empty()) else {
            continue;
        };
        rules.push(SecurityRule::new(
            protocol.parse::<Protocol>()?,
            PortRange::parse(row.port_range.as_deref())?,
            row.ip_range.unwrap_or_default(),
        ));
    }
    Ok(rules)
}

fn parse_interface(raw: &str) -> Option<Interface> {
    Interface::ALL
        .into_iter()
        .find(|i| i.as_str().eq_ignore_ascii_case(raw.trim()))
}

/// `--names` prints roles as `admin` or `admin@Default`
fn role_matches(listed: &str, role: &str) -> bool {
    listed.split('@').next().unwrap_or(listed) == role
}

impl Network for OpenStackCli {
    fn find_security_group(&self, name: &str) -> Result<Option<SecurityGroup>> {
        let rows: Vec<ListedRow> = self.run_json(&["security", "group", "list"])?;
        Ok(rows
            .into_iter()
            .find(|row| row.name == name)
            .map(|row| SecurityGroup {
                id: row.id,
                name: row.name,
            }))
    }

    fn create_security_group(&self, name: &str, description: &str) -> Result<SecurityGroup> {
        let row: ShownRow = self.run_json(&[
            "security",
            "group",
            "create",
            "--description",
            description,
            name,
        ])?;
        Ok(SecurityGroup {
            id: row.id,
            name: row.name,
        })
    }

    fn list_ingress_rules(&self, group: &SecurityGroup) -> Result<Vec<SecurityRule>> {
        let rows: Vec<RuleRow> =
            self.run_json(&["security", "group", "rule", "list", "--ingress", &group.id])?;
        rules_from_rows(rows)
    }

    fn create_ingress_rule(&self, group: &SecurityGroup, rule: &SecurityRule) -> Result<()> {
        let ports = rule.ports.to_arg();
        let mut args = vec![
            "security",
            "group",
            "rule",
            "create",
            "--ingress",
            "--ethertype",
            "IPv4",
            "--protocol",
            rule.protocol.as_str(),
            "--remote-ip",
            rule.source.as_str(),
        ];
        if let Some(ports) = ports.as_deref() {
            args.extend(["--dst-port", ports]);
        }
        args.push(&group.id);
        self.run_checked(&args)?;
        Ok(())
    }
}

impl Identity for OpenStackCli {
    fn user_exists(&self, name: &str) -> Result<bool> {
        let rows: Vec<ListedRow> = self.run_json(&["user", "list"])?;
        Ok(rows.iter().any(|row| row.name == name))
    }

    fn create_user(&self, user: &NewUser) -> Result<()> {
        self.run_checked(&[
            "user",
            "create",
            "--project",
            &user.project,
            "--password",
            &user.password,
            "--email",
            &user.email,
            &user.name,
        ])?;
        Ok(())
    }

    fn has_role(&self, user: &str, project: &str, role: &str) -> Result<bool> {
        let rows: Vec<RoleRow> = self.run_json(&[
            "role",
            "assignment",
            "list",
            "--user",
            user,
            "--project",
            project,
            "--names",
        ])?;
        Ok(rows.iter().any(|row| role_matches(&row.role, role)))
    }

    fn grant_role(&self, user: &str, project: &str, role: &str) -> Result<()> {
        self.run_checked(&["role", "add", "--project", project, "--user", user, role])?;
        Ok(())
    }

    fn service_exists(&self, name: &str) -> Result<bool> {
        let rows: Vec<ListedRow> = self.run_json(&["service", "list"])?;
        Ok(rows.iter().any(|row| row.name == name))
    }

    fn create_service(&self, service: &CatalogService) -> Result<()> {
        self.run_checked(&[
            "service",
            "create",
            "--name",
            &service.name,
            "--description",
            &service.description,
            &service.kind,
        ])?;
        Ok(())
    }

    fn list_endpoints(&self, service: &str) -> Result<Vec<Endpoint>> {
        let rows: Vec<EndpointRow> = self.run_json(&["endpoint", "list", "--service", service])?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                parse_interface(&row.interface).map(|interface| Endpoint {
                    interface,
                    url: row.url,
                })
            })
            .collect())
    }

    fn create_endpoint(&self, service: &str, endpoint: &Endpoint, region: &str) -> Result<()> {
        self.run_checked(&[
            "endpoint",
            "create",
            "--region",
            region,
            service,
            endpoint.interface.as_str(),
            &endpoint.url,
        ])?;
        Ok(())
    }
}
