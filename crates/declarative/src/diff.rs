//! Dry-run preview of a pipeline

use crate::pipeline::Pipeline;
use crate::resource::{Resource, ResourceExt};
use crate::types::ResourceState;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// A pending change for one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDiff {
    pub stage: String,
    pub resource_id: String,
    pub resource_type: String,
    pub description: String,
    pub current: ResourceState,
    pub desired: ResourceState,
    pub requires_sudo: bool,
}

impl ResourceDiff {
    /// Create a diff from a resource, returning None if no changes needed
    pub fn from_resource(stage: &str, resource: &dyn Resource) -> Result<Option<Self>> {
        let current = resource
            .current_state()
            .with_context(|| format!("Failed to inspect {}", resource.id()))?;
        let desired = resource.desired_state();

        if current == desired {
            return Ok(None);
        }

        Ok(Some(Self {
            stage: stage.to_string(),
            resource_id: resource.id(),
            resource_type: resource.resource_type().to_string(),
            description: resource.description(),
            current,
            desired,
            requires_sudo: resource.requires_sudo(),
        }))
    }

    pub fn is_addition(&self) -> bool {
        matches!(
            (&self.current, &self.desired),
            (ResourceState::Absent, ResourceState::Present { .. })
        )
    }

    /// Current state could not be read; apply will decide
    pub fn is_undetermined(&self) -> bool {
        matches!(self.current, ResourceState::Unknown)
    }
}

/// Inspect every resource in run order and collect the ones that would change.
///
/// Inspection errors are returned, not skipped: a preview that silently
/// drops an unreachable collaborator would report "no changes" for a run
/// that is going to fail.
pub fn preview(pipeline: &Pipeline) -> Result<Vec<ResourceDiff>> {
    let mut diffs = Vec::new();
    for (stage, resource) in pipeline.resources() {
        if let Some(diff) = ResourceDiff::from_resource(stage, resource)? {
            diffs.push(diff);
        }
    }
    Ok(diffs)
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub additions: usize,
    pub modifications: usize,
    pub undetermined: usize,
    pub sudo_required: usize,
}

impl DiffSummary {
    pub fn from_diffs(diffs: &[ResourceDiff]) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            if diff.is_addition() {
                summary.additions += 1;
            } else if diff.is_undetermined() {
                summary.undetermined += 1;
            } else {
                summary.modifications += 1;
            }
            if diff.requires_sudo {
                summary.sudo_required += 1;
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.additions + self.modifications + self.undetermined
    }

    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}
