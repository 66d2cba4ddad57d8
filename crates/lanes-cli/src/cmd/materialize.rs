use std::io::Write;

use lanes_core::reducer::{self, Snapshot};

use crate::cmd::CommandContext;
use crate::output::{CliError, fail, pretty_kv, render_mode};

/// `lanes materialize`: rebuild status.json from the event log.
pub fn run_materialize(ctx: &CommandContext) -> anyhow::Result<()> {
    let (_, feature_dir) = ctx.feature()?;
    let snapshot = reducer::materialize(&feature_dir)
        .map_err(|err| fail(ctx.output, &CliError::from(&err)))?;

    render_mode(
        ctx.output,
        &snapshot,
        |s: &Snapshot, w| {
            writeln!(
                w,
                "materialized {} events into {} work packages",
                s.event_count,
                s.work_packages.len()
            )
        },
        |s: &Snapshot, w| {
            writeln!(w, "✓ status.json rebuilt")?;
            pretty_kv(w, "Events", s.event_count.to_string())?;
            pretty_kv(w, "WPs", s.work_packages.len().to_string())?;
            pretty_kv(
                w,
                "Last event",
                s.last_event_id.as_ref().map_or("-", |id| id.as_str()),
            )
        },
    )
}
