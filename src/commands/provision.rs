//! `sharestack provision`

use crate::Context;
use crate::backends::BackendRegistry;
use crate::cli::ProvisionArgs;
use crate::error::BootstrapError;
use crate::progress::SpinnerProgress;
use crate::provision::{self, Collaborators, STAGES};
use crate::runner::command_exists;
use crate::sudo::SudoContext;
use crate::ui;
use anyhow::Result;
use declarative::{ConfirmCallback, ExecuteOptions};
use dialoguer::Confirm;

const REQUIRED_TOOLS: [&str; 3] = ["openstack", "ssh-keygen", "visudo"];

/// Asks on the terminal unless `--yes` was given
struct PromptConfirm {
    assume_yes: bool,
}

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        if self.assume_yes {
            return Ok(true);
        }
        Ok(Confirm::new().with_prompt(prompt).default(true).interact()?)
    }
}

fn check_stages(only: Option<&str>) -> Result<(), BootstrapError> {
    let Some(only) = only else {
        return Ok(());
    };
    for name in only.split(',').map(str::trim) {
        if !STAGES.contains(&name) {
            return Err(BootstrapError::configuration(format!(
                "unknown stage '{name}' (expected one of: {})",
                STAGES.join(", ")
            )));
        }
    }
    Ok(())
}

pub fn run(ctx: &Context, args: ProvisionArgs) -> Result<()> {
    check_stages(args.only.as_deref())?;

    for tool in REQUIRED_TOOLS {
        if !command_exists(tool) {
            ui::warn(&format!("{tool} not found on PATH; steps using it will fail"));
        }
    }

    let settings = &ctx.settings;
    let registry = BackendRegistry::from_settings(settings)?;
    let collab = Collaborators::from_settings(settings);
    let pipeline =
        provision::build_pipeline(settings, &registry, &collab)?.only(args.only.as_deref());

    if pipeline.is_empty() {
        ui::warn("No stages selected");
        return Ok(());
    }
    if !ctx.quiet {
        ui::header(&format!(
            "Provisioning {} ({} steps)",
            settings.service.user,
            pipeline.total_resources()
        ));
    }

    let opts = ExecuteOptions {
        dry_run: false,
        verbose: ctx.verbose > 0,
    };
    let summary = declarative::execute(
        &pipeline,
        &opts,
        || SudoContext::acquire("install root-owned files for the share service"),
        &mut SpinnerProgress::new(ctx.quiet),
        &mut PromptConfirm {
            assume_yes: args.yes,
        },
    )?;

    if !ctx.quiet {
        ui::run_summary(&summary);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_stages_pass() {
        assert!(check_stages(None).is_ok());
        assert!(check_stages(Some("network, keys")).is_ok());
    }

    #[test]
    fn unknown_stage_is_a_configuration_error() {
        let err = check_stages(Some("network,dns")).unwrap_err();
        assert!(err.to_string().contains("unknown stage 'dns'"));
    }

    #[test]
    fn assume_yes_never_prompts() {
        let mut confirm = PromptConfirm { assume_yes: true };
        assert!(confirm.confirm("Continue?").unwrap());
    }
}
