//! # Declarative
//!
//! Check-then-act provisioning: describe the resources an environment needs,
//! detect what is already there, and create only what is missing.
//!
//! ## Core Concepts
//!
//! - **Resource**: something outside the process with observable state
//!   (a security group, a key file, an identity record)
//! - **ResourceState**: the observed or desired state of a resource
//! - **Pipeline**: named stages applied strictly in order
//! - **Executor**: applies a pipeline, aborting on the first failure and
//!   acquiring privileges lazily, once
//! - **wait**: bounded polling for resources that appear asynchronously
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{ExecuteOptions, Pipeline, execute_simple};
//!
//! let pipeline = Pipeline::new()
//!     .stage("network", vec![Box::new(security_group)])
//!     .stage("keys", vec![Box::new(keypair)]);
//!
//! let summary = execute_simple(&pipeline, &ExecuteOptions::default(), || {
//!     anyhow::bail!("No sudo needed")
//! })?;
//! ```
//!
//! ## Provider Traits
//!
//! - [`SudoProvider`]: runs commands with elevated privileges
//! - [`ProgressCallback`]: receives progress updates
//! - [`ConfirmCallback`]: handles user confirmations

pub mod context;
pub mod diff;
pub mod executor;
pub mod pipeline;
pub mod resource;
pub mod types;
pub mod wait;

pub use context::{
    ApplyContext, AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback,
    SudoProvider,
};
pub use diff::{DiffSummary, ResourceDiff, preview};
pub use executor::{execute, execute_simple};
pub use pipeline::{Pipeline, Stage};
pub use resource::{BoxedResource, Resource, ResourceExt};
pub use types::{
    ApplyResult, CommandOutput, ExecuteOptions, ResourceState, RunSummary, SudoRequirement,
};
pub use wait::{WaitConfig, WaitOutcome, poll_until};
