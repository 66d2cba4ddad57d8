use std::io::Write;

use clap::Args;
use lanes_core::Event;
use lanes_core::store;

use crate::cmd::CommandContext;
use crate::output::{CliError, fail, pretty_section, render_mode};

/// Arguments for `lanes history`.
#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Work package ID (e.g. WP01).
    pub wp_id: String,
}

/// Events in replay order: by event id, regardless of line order.
fn in_replay_order(mut events: Vec<Event>) -> Vec<Event> {
    events.sort_by(|a, b| a.event_id.cmp(&b.event_id));
    events
}

/// `lanes history`: every transition of one work package.
pub fn run_history(ctx: &CommandContext, args: &HistoryArgs) -> anyhow::Result<()> {
    let (_, feature_dir) = ctx.feature()?;
    let events = store::read_for_wp(&feature_dir, &args.wp_id)
        .map_err(|err| fail(ctx.output, &CliError::from(&err)))?;
    let events = in_replay_order(events);

    render_mode(
        ctx.output,
        &events,
        |events, w| {
            for event in events {
                writeln!(w, "{event}")?;
            }
            Ok(())
        },
        |events, w| {
            pretty_section(w, &format!("History of {}", args.wp_id))?;
            if events.is_empty() {
                writeln!(w, "(no transitions)")?;
            }
            for event in events {
                writeln!(
                    w,
                    "{}  {:<10} -> {:<10} {}{}",
                    event.at.format("%Y-%m-%d %H:%M"),
                    event.from_lane,
                    event.to_lane,
                    event.actor,
                    if event.force { "  (forced)" } else { "" }
                )?;
                if let Some(reason) = &event.reason {
                    writeln!(w, "    reason: {reason}")?;
                }
            }
            Ok(())
        },
    )
}
