//! # cloudkit
//!
//! Narrow command interfaces to the services a storage deployment depends
//! on: the network service (security groups), the identity service (users,
//! roles, catalog) and the database server.
//!
//! The traits in [`backend`] carry only existence queries and create calls,
//! which is all an idempotent provisioner needs. The shipped backends drive
//! the `openstack`, `mysql` and PostgreSQL command-line clients; tests
//! substitute in-memory fakes.
//!
//! ## Example
//!
//! ```no_run
//! use cloudkit::backend::Network;
//! use cloudkit::backend::openstack::{CliAuth, OpenStackCli};
//!
//! let cli = OpenStackCli::new(CliAuth {
//!     auth_url: "http://127.0.0.1:35357/v3".into(),
//!     username: "admin".into(),
//!     password: "secret".into(),
//!     project_name: "admin".into(),
//!     user_domain: "Default".into(),
//!     project_domain: "Default".into(),
//! });
//!
//! if cli.find_security_group("manila-service").unwrap().is_none() {
//!     cli.create_security_group("manila-service", "share service").unwrap();
//! }
//! ```

#![warn(clippy::all)]

pub mod backend;
pub mod error;
pub mod types;

pub use backend::database::DatabaseCli;
pub use backend::openstack::{CliAuth, OpenStackCli};
pub use backend::{Database, Identity, Network};
pub use error::{Error, ErrorCategory, Result};
pub use types::{
    ANY_IPV4, CatalogService, DatabaseKind, Endpoint, Interface, NewUser, PortRange, Protocol,
    SecurityGroup, SecurityRule,
};
