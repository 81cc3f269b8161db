//! Narrow interfaces to the external services.
//!
//! Each trait exposes only the read-only queries and the create calls the
//! provisioning steps need, so the steps can be tested against in-memory
//! fakes and driven in production by the command-line clients.

pub mod database;
pub mod openstack;

use crate::error::Result;
use crate::types::{
    CatalogService, DatabaseKind, Endpoint, NewUser, SecurityGroup, SecurityRule,
};
use std::fmt;

/// Security groups and their inbound rules
pub trait Network: Send + Sync + fmt::Debug {
    /// Look up a group by name
    fn find_security_group(&self, name: &str) -> Result<Option<SecurityGroup>>;

    /// Create a group. Fails with a conflict if it already exists.
    fn create_security_group(&self, name: &str, description: &str) -> Result<SecurityGroup>;

    /// List the group's ingress rules
    fn list_ingress_rules(&self, group: &SecurityGroup) -> Result<Vec<SecurityRule>>;

    /// Add one ingress rule
    fn create_ingress_rule(&self, group: &SecurityGroup, rule: &SecurityRule) -> Result<()>;
}

/// Users, role bindings and the service catalog
pub trait Identity: Send + Sync + fmt::Debug {
    fn user_exists(&self, name: &str) -> Result<bool>;

    fn create_user(&self, user: &NewUser) -> Result<()>;

    fn has_role(&self, user: &str, project: &str, role: &str) -> Result<bool>;

    fn grant_role(&self, user: &str, project: &str, role: &str) -> Result<()>;

    fn service_exists(&self, name: &str) -> Result<bool>;

    fn create_service(&self, service: &CatalogService) -> Result<()>;

    /// Endpoints registered for a catalog service
    fn list_endpoints(&self, service: &str) -> Result<Vec<Endpoint>>;

    fn create_endpoint(&self, service: &str, endpoint: &Endpoint, region: &str) -> Result<()>;
}

/// The relational database server
pub trait Database: Send + Sync + fmt::Debug {
    fn kind(&self) -> DatabaseKind;

    /// Drop the named database if present and create it empty, UTF-8 encoded
    fn recreate(&self, name: &str) -> Result<()>;
}
