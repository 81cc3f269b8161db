//! Ordered provisioning pipeline
//!
//! Stages run in insertion order and resources within a stage run in
//! insertion order. Later stages may depend on earlier ones, so nothing is
//! reordered or grouped by privilege.

use crate::resource::{BoxedResource, Resource, ResourceExt};

/// A named group of resources applied together
#[derive(Debug)]
pub struct Stage {
    pub name: String,
    pub resources: Vec<BoxedResource>,
}

impl Stage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: Vec::new(),
        }
    }
}

/// An ordered list of stages
#[derive(Debug, Default)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage with the given resources
    pub fn stage(mut self, name: impl Into<String>, resources: Vec<BoxedResource>) -> Self {
        self.stages.push(Stage {
            name: name.into(),
            resources,
        });
        self
    }

    /// Append a resource to the named stage, creating the stage at the end
    /// if it does not exist yet
    pub fn push(&mut self, stage: &str, resource: BoxedResource) {
        if let Some(existing) = self.stages.iter_mut().find(|s| s.name == stage) {
            existing.resources.push(resource);
        } else {
            let mut new_stage = Stage::new(stage);
            new_stage.resources.push(resource);
            self.stages.push(new_stage);
        }
    }

    /// Keep only the named stages (all stages when `only` is None)
    pub fn only(self, only: Option<&str>) -> Self {
        match only {
            None => self,
            Some(names) => {
                let wanted: Vec<&str> = names.split(',').map(str::trim).collect();
                Self {
                    stages: self
                        .stages
                        .into_iter()
                        .filter(|s| wanted.contains(&s.name.as_str()))
                        .collect(),
                }
            }
        }
    }

    /// Iterate over all resources in run order
    pub fn resources(&self) -> impl Iterator<Item = (&str, &dyn Resource)> {
        self.stages.iter().flat_map(|stage| {
            stage
                .resources
                .iter()
                .map(move |r| (stage.name.as_str(), r.as_ref()))
        })
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Total number of resources in the pipeline
    pub fn total_resources(&self) -> usize {
        self.stages.iter().map(|s| s.resources.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_resources() == 0
    }

    /// Whether any resource needs elevated privileges
    pub fn has_privileged(&self) -> bool {
        self.resources().any(|(_, r)| r.requires_sudo())
    }
}
