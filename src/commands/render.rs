//! `sharestack render`

use crate::Context;
use crate::backends::BackendRegistry;
use crate::provision;
use anyhow::Result;

pub fn run(ctx: &Context) -> Result<()> {
    let registry = BackendRegistry::from_settings(&ctx.settings)?;
    let artifact = provision::artifact(&ctx.settings, &registry)?;
    print!("{}", artifact.render());
    Ok(())
}
