//! Provisioning resources
//!
//! Every provisioning step is a [`declarative::Resource`]:
//! - `current_state` is a read-only query
//! - `apply` re-checks and acts only on what is missing
//! - collaborator failures surface as [`crate::error::BootstrapError`]

pub mod account;
pub mod config_file;
pub mod database;
pub mod directory;
pub mod keypair;
pub mod rootwrap;
pub mod security_group;
pub mod sudo_grant;

pub use account::{CatalogEntry, RoleBinding, ServiceUser};
pub use config_file::ConfigFile;
pub use database::DatabaseSync;
pub use directory::Directory;
pub use keypair::KeyPair;
pub use rootwrap::RootwrapFilters;
pub use security_group::SecurityGroupResource;
pub use sudo_grant::SudoGrant;

use crate::error::BootstrapError;

/// Map a collaborator failure into the run's typed error
pub(crate) fn external(service: &str, error: &cloudkit::Error) -> anyhow::Error {
    BootstrapError::external(service, error).into()
}
