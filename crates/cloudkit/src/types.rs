//! Value types exchanged with the cloud services.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Source used when a rule does not name one
pub const ANY_IPV4: &str = "0.0.0.0/0";

/// IP protocol of a security group rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Icmp,
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Icmp => "icmp",
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "icmp" | "1" => Ok(Self::Icmp),
            "tcp" | "6" => Ok(Self::Tcp),
            "udp" | "17" => Ok(Self::Udp),
            other => Err(Error::Invalid(format!("unsupported protocol '{other}'"))),
        }
    }
}

/// Port range of a rule. ICMP rules use `Any`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortRange {
    Any,
    Range { start: u16, end: u16 },
}

impl PortRange {
    pub fn single(port: u16) -> Self {
        Self::Range {
            start: port,
            end: port,
        }
    }

    pub fn range(start: u16, end: u16) -> Self {
        Self::Range { start, end }
    }

    /// Parse the `Port Range` column: `"22:22"`, `"137:139"`, or empty/`-1`
    /// forms meaning any port.
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        let raw = raw.map(str::trim).unwrap_or_default();
        if raw.is_empty() || raw == "-1:-1" || raw == "-1" || raw.eq_ignore_ascii_case("none")
        {
            return Ok(Self::Any);
        }

        let (start, end) = raw.split_once(':').unwrap_or((raw, raw));
        let parse = |s: &str| {
            s.trim()
                .parse::<u16>()
                .map_err(|_| Error::Invalid(format!("bad port range '{raw}'")))
        };
        Ok(Self::Range {
            start: parse(start)?,
            end: parse(end)?,
        })
    }

    /// Value for `--dst-port`, None for any
    pub fn to_arg(&self) -> Option<String> {
        match self {
            Self::Any => None,
            Self::Range { start, end } => Some(format!("{start}:{end}")),
        }
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Range { start, end } if start == end => write!(f, "{start}"),
            Self::Range { start, end } => write!(f, "{start}-{end}"),
        }
    }
}

/// An inbound security group rule, compared by value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecurityRule {
    pub protocol: Protocol,
    pub ports: PortRange,
    pub source: String,
}

impl SecurityRule {
    pub fn new(protocol: Protocol, ports: PortRange, source: impl Into<String>) -> Self {
        Self {
            protocol,
            ports,
            source: source.into(),
        }
    }

    /// Whether two rules grant the same access.
    ///
    /// Rules are equivalent when protocol, port range and source match; an
    /// ICMP rule ignores ports and an empty source means any IPv4 address.
    pub fn is_equivalent(&self, other: &SecurityRule) -> bool {
        let ports_match = self.protocol == Protocol::Icmp || self.ports == other.ports;
        self.protocol == other.protocol
            && ports_match
            && normalize_source(&self.source) == normalize_source(&other.source)
    }
}

impl fmt::Display for SecurityRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} from {}", self.protocol, self.ports, self.source)
    }
}

fn normalize_source(source: &str) -> &str {
    let trimmed = source.trim();
    if trimmed.is_empty() { ANY_IPV4 } else { trimmed }
}

/// A security group as seen by the network service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub id: String,
    pub name: String,
}

/// Endpoint interface in the service catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interface {
    Public,
    Admin,
    Internal,
}

impl Interface {
    pub const ALL: [Interface; 3] = [Interface::Public, Interface::Admin, Interface::Internal];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Admin => "admin",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A catalog endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub interface: Interface,
    pub url: String,
}

/// A service catalog record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogService {
    pub name: String,
    pub kind: String,
    pub description: String,
}

/// A user to create in a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub password: String,
    pub project: String,
    pub email: String,
}

/// Relational database flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    Mysql,
    Postgresql,
}

impl DatabaseKind {
    /// Service name enabling this flavor
    pub fn service_name(&self) -> &'static str {
        match self {
            Self::Mysql => "mysql",
            Self::Postgresql => "postgresql",
        }
    }

    /// URL scheme used in connection strings
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Mysql => "mysql",
            Self::Postgresql => "postgresql",
        }
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_name())
    }
}

/// Reject database names that would need quoting
pub fn validate_database_name(name: &str) -> Result<()> {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(Error::Invalid(format!("invalid database name '{name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_port_ranges() {
        assert_eq!(PortRange::parse(Some("22:22")).unwrap(), PortRange::single(22));
        assert_eq!(
            PortRange::parse(Some("137:139")).unwrap(),
            PortRange::range(137, 139)
        );
        assert_eq!(PortRange::parse(Some("")).unwrap(), PortRange::Any);
        assert_eq!(PortRange::parse(None).unwrap(), PortRange::Any);
        assert_eq!(PortRange::parse(Some("-1:-1")).unwrap(), PortRange::Any);
        assert!(PortRange::parse(Some("abc")).is_err());
    }

    #[test]
    fn rule_equivalence_ignores_icmp_ports_and_blank_source() {
        let wanted = SecurityRule::new(Protocol::Icmp, PortRange::Any, ANY_IPV4);
        let seen = SecurityRule::new(Protocol::Icmp, PortRange::range(0, 0), "");
        assert!(wanted.is_equivalent(&seen));

        let tcp = SecurityRule::new(Protocol::Tcp, PortRange::single(445), ANY_IPV4);
        let udp = SecurityRule::new(Protocol::Udp, PortRange::single(445), ANY_IPV4);
        assert!(!tcp.is_equivalent(&udp));

        let narrower = SecurityRule::new(Protocol::Tcp, PortRange::single(445), "10.0.0.0/8");
        assert!(!tcp.is_equivalent(&narrower));
    }

    #[test]
    fn protocol_accepts_names_and_numbers() {
        assert_eq!("TCP".parse::<Protocol>().unwrap(), Protocol::Tcp);
        assert_eq!("17".parse::<Protocol>().unwrap(), Protocol::Udp);
        assert!("gre".parse::<Protocol>().is_err());
    }

    #[test]
    fn database_names_are_restricted() {
        assert!(validate_database_name("manila").is_ok());
        assert!(validate_database_name("manila; DROP").is_err());
        assert!(validate_database_name("").is_err());
    }
}
