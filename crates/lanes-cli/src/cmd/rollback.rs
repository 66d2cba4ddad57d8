use clap::Args;
use lanes_core::Emitter;
use lanes_core::rollback::rollback;

use crate::cmd::CommandContext;
use crate::cmd::transition::render_event;
use crate::output::{CliError, fail};

/// Arguments for `lanes rollback`.
#[derive(Args, Debug)]
pub struct RollbackArgs {
    /// Work package ID (e.g. WP01).
    pub wp_id: String,

    /// Why the last transition is being undone.
    #[arg(long)]
    pub reason: String,
}

/// `lanes rollback`: append a forced event restoring the previous lane.
pub fn run_rollback(ctx: &CommandContext, args: &RollbackArgs) -> anyhow::Result<()> {
    let (slug, feature_dir) = ctx.feature()?;
    let actor = ctx.actor()?;

    let emitter = Emitter::from_config(&ctx.config, &ctx.repo_root);
    let event = rollback(&emitter, &feature_dir, &slug, &args.wp_id, &actor, &args.reason)
        .map_err(|err| fail(ctx.output, &CliError::from(&err)))?;

    render_event(ctx.output, &event)
}
