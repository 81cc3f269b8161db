//! Execution engine - applies a pipeline in order, aborting on first failure

use crate::context::{ApplyContext, ConfirmCallback, ProgressCallback, SudoProvider};
use crate::pipeline::Pipeline;
use crate::resource::ResourceExt;
use crate::types::{ExecuteOptions, RunSummary};
use anyhow::{Result, bail};

/// Execute a pipeline with the given options and callbacks
///
/// Resources are applied strictly in pipeline order. The first failing
/// resource aborts the run: its error is returned with the resource id as
/// context and nothing after it is attempted.
///
/// `sudo_provider` is called at most once, right before the first
/// privileged resource, after `confirm` agreed to cross the privilege
/// boundary. Runs without privileged resources never call it.
pub fn execute<S, P, C>(
    pipeline: &Pipeline,
    opts: &ExecuteOptions,
    sudo_provider: impl FnOnce() -> Result<S>,
    progress: &mut P,
    confirm: &mut C,
) -> Result<RunSummary>
where
    S: SudoProvider,
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let mut summary = RunSummary::default();

    if opts.dry_run || pipeline.is_empty() {
        return Ok(summary);
    }

    let mut acquire = Some(sudo_provider);
    let mut sudo: Option<S> = None;

    for stage in &pipeline.stages {
        progress.on_stage_start(&stage.name, stage.resources.len());

        for resource in &stage.resources {
            let id = resource.id();

            if resource.requires_sudo() && sudo.is_none() {
                let prompt = format!("{} requires sudo. Continue?", resource.description());
                if !confirm.confirm(&prompt)? {
                    bail!("Aborted before privileged step {id}");
                }
                let Some(acquire) = acquire.take() else {
                    bail!("Sudo provider already consumed");
                };
                sudo = Some(acquire()?);
            }

            progress.on_resource_start(&id, &resource.description());

            let mut ctx = match sudo.as_ref() {
                Some(s) => ApplyContext::with_sudo(opts.verbose, s as &dyn SudoProvider),
                None => ApplyContext::new(opts.verbose),
            };

            match resource.apply(&mut ctx) {
                Ok(result) => {
                    progress.on_resource_complete(&id, &result);
                    summary.record(&id, &result);
                }
                Err(error) => {
                    progress.on_resource_failed(&id, &error);
                    return Err(error.context(format!("{} ({}) failed", id, stage.name)));
                }
            }
        }
    }

    Ok(summary)
}

/// Execute without progress reporting, confirming every prompt
pub fn execute_simple<S: SudoProvider>(
    pipeline: &Pipeline,
    opts: &ExecuteOptions,
    sudo_provider: impl FnOnce() -> Result<S>,
) -> Result<RunSummary> {
    use crate::context::{AutoConfirm, NoProgress};

    execute(pipeline, opts, sudo_provider, &mut NoProgress, &mut AutoConfirm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AutoConfirm, AutoDecline, NoProgress};
    use crate::resource::Resource;
    use crate::types::{ApplyResult, CommandOutput, ResourceState, SudoRequirement};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockSudo;

    impl SudoProvider for MockSudo {
        fn run(&self, _cmd: &str, _args: &[&str]) -> Result<CommandOutput> {
            Ok(CommandOutput::ok(Vec::new()))
        }
    }

    #[derive(Debug)]
    struct TestResource {
        id: &'static str,
        fail: bool,
        privileged: bool,
        applied: Arc<AtomicUsize>,
    }

    impl TestResource {
        fn new(id: &'static str, applied: &Arc<AtomicUsize>) -> Self {
            Self {
                id,
                fail: false,
                privileged: false,
                applied: Arc::clone(applied),
            }
        }
    }

    impl Resource for TestResource {
        fn id(&self) -> String {
            self.id.to_string()
        }

        fn description(&self) -> String {
            format!("Test resource {}", self.id)
        }

        fn resource_type(&self) -> &'static str {
            "test"
        }

        fn sudo_requirement(&self) -> SudoRequirement {
            if self.privileged {
                SudoRequirement::Required {
                    reason: "test".into(),
                }
            } else {
                SudoRequirement::None
            }
        }

        fn current_state(&self) -> Result<ResourceState> {
            Ok(ResourceState::Absent)
        }

        fn desired_state(&self) -> ResourceState {
            ResourceState::present()
        }

        fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
            if self.privileged {
                ctx.require_sudo()?;
            }
            if self.fail {
                bail!("boom");
            }
            self.applied.fetch_add(1, Ordering::SeqCst);
            Ok(ApplyResult::Created)
        }
    }

    #[test]
    fn empty_pipeline_does_nothing() {
        let summary = execute_simple(&Pipeline::new(), &ExecuteOptions::default(), || {
            Ok(MockSudo)
        })
        .unwrap();
        assert_eq!(summary.total(), 0);
    }

    #[test]
    fn applies_in_order() {
        let applied = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new()
            .stage("first", vec![Box::new(TestResource::new("a", &applied))])
            .stage("second", vec![Box::new(TestResource::new("b", &applied))]);

        let summary =
            execute_simple(&pipeline, &ExecuteOptions::default(), || Ok(MockSudo)).unwrap();

        assert_eq!(summary.created, 2);
        assert_eq!(summary.applied, vec!["a", "b"]);
    }

    #[test]
    fn first_failure_aborts_remaining_steps() {
        let applied = Arc::new(AtomicUsize::new(0));
        let mut failing = TestResource::new("broken", &applied);
        failing.fail = true;

        let pipeline = Pipeline::new().stage(
            "only",
            vec![
                Box::new(TestResource::new("a", &applied)),
                Box::new(failing),
                Box::new(TestResource::new("c", &applied)),
            ],
        );

        let err = execute_simple(&pipeline, &ExecuteOptions::default(), || Ok(MockSudo))
            .unwrap_err();

        assert!(err.to_string().contains("broken"));
        assert_eq!(applied.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sudo_is_not_acquired_without_privileged_resources() {
        let applied = Arc::new(AtomicUsize::new(0));
        let pipeline =
            Pipeline::new().stage("x", vec![Box::new(TestResource::new("a", &applied))]);

        let never = || -> Result<MockSudo> { panic!("sudo must not be requested") };
        let summary = execute_simple(&pipeline, &ExecuteOptions::default(), never).unwrap();
        assert_eq!(summary.created, 1);
    }

    #[test]
    fn sudo_is_acquired_once_for_privileged_resources() {
        let applied = Arc::new(AtomicUsize::new(0));
        let mut first = TestResource::new("p1", &applied);
        first.privileged = true;
        let mut second = TestResource::new("p2", &applied);
        second.privileged = true;
        let pipeline = Pipeline::new().stage("x", vec![Box::new(first), Box::new(second)]);

        let acquisitions = AtomicUsize::new(0);
        let summary = execute(
            &pipeline,
            &ExecuteOptions::default(),
            || {
                acquisitions.fetch_add(1, Ordering::SeqCst);
                Ok(MockSudo)
            },
            &mut NoProgress,
            &mut AutoConfirm,
        )
        .unwrap();

        assert_eq!(summary.created, 2);
        assert_eq!(acquisitions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn declining_privilege_boundary_aborts() {
        let applied = Arc::new(AtomicUsize::new(0));
        let mut privileged = TestResource::new("p", &applied);
        privileged.privileged = true;
        let pipeline = Pipeline::new().stage(
            "x",
            vec![
                Box::new(TestResource::new("a", &applied)),
                Box::new(privileged),
            ],
        );

        let result = execute(
            &pipeline,
            &ExecuteOptions::default(),
            || Ok(MockSudo),
            &mut NoProgress,
            &mut AutoDecline,
        );

        assert!(result.is_err());
        assert_eq!(applied.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dry_run_applies_nothing() {
        let applied = Arc::new(AtomicUsize::new(0));
        let pipeline =
            Pipeline::new().stage("x", vec![Box::new(TestResource::new("a", &applied))]);
        let opts = ExecuteOptions {
            dry_run: true,
            verbose: false,
        };

        let summary = execute_simple(&pipeline, &opts, || Ok(MockSudo)).unwrap();
        assert_eq!(summary.total(), 0);
        assert_eq!(applied.load(Ordering::SeqCst), 0);
    }
}
