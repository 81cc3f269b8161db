//! Resource trait for check-then-act provisioning
//!
//! A Resource is something outside the process (a security group, a file,
//! an identity record) that must exist in a given shape. Detection is
//! read-only; `apply` acts only when detection says the resource is absent
//! or different.

use crate::context::ApplyContext;
use crate::types::{ApplyResult, ResourceState, SudoRequirement};
use anyhow::Result;
use std::fmt;

/// Core trait for provisioned resources
///
/// # Example
///
/// ```ignore
/// use declarative::{ApplyContext, ApplyResult, Resource, ResourceState};
///
/// #[derive(Debug)]
/// struct Marker { path: std::path::PathBuf }
///
/// impl Resource for Marker {
///     fn id(&self) -> String { self.path.display().to_string() }
///     fn description(&self) -> String { format!("Marker file {}", self.path.display()) }
///     fn resource_type(&self) -> &'static str { "file" }
///
///     fn current_state(&self) -> anyhow::Result<ResourceState> {
///         Ok(if self.path.exists() { ResourceState::present() } else { ResourceState::Absent })
///     }
///
///     fn desired_state(&self) -> ResourceState { ResourceState::present() }
///
///     fn apply(&self, _ctx: &mut ApplyContext) -> anyhow::Result<ApplyResult> {
///         if self.path.exists() {
///             return Ok(ApplyResult::NoChange);
///         }
///         std::fs::write(&self.path, "")?;
///         Ok(ApplyResult::Created)
///     }
/// }
/// ```
pub trait Resource: Send + Sync + fmt::Debug {
    /// Stable identifier, unique within its type (e.g. "secgroup:manila-service")
    fn id(&self) -> String;

    /// Human-readable description of what this resource ensures
    fn description(&self) -> String;

    /// Resource type category, used for grouping and `--only` filtering
    fn resource_type(&self) -> &'static str;

    /// Whether this resource requires elevated privileges to apply
    fn sudo_requirement(&self) -> SudoRequirement {
        SudoRequirement::None
    }

    /// Read-only query of the current state
    fn current_state(&self) -> Result<ResourceState>;

    /// The state `apply` converges to
    fn desired_state(&self) -> ResourceState;

    /// Check if the resource needs changes to reach desired state
    fn needs_apply(&self) -> Result<bool> {
        let current = self.current_state()?;
        Ok(current != self.desired_state())
    }

    /// Converge to the desired state.
    ///
    /// Must be safe to call repeatedly: re-check and return
    /// `ApplyResult::NoChange` when nothing needs doing.
    fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult>;
}

/// A boxed resource for type-erased storage
pub type BoxedResource = Box<dyn Resource>;

/// Extension trait for working with resources
pub trait ResourceExt {
    /// Whether the resource declares a sudo requirement
    fn requires_sudo(&self) -> bool;
}

impl<R: Resource + ?Sized> ResourceExt for R {
    fn requires_sudo(&self) -> bool {
        matches!(self.sudo_requirement(), SudoRequirement::Required { .. })
    }
}
