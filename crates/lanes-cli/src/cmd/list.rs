use std::io::Write;
use std::path::Path;

use clap::Args;
use lanes_core::lane::Lane;
use lanes_core::reducer::{self, Snapshot, SnapshotError};
use serde::Serialize;

use crate::cmd::CommandContext;
use crate::output::{CliError, fail, pretty_section, render_mode};

/// Arguments for `lanes list`.
#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Only show work packages in this lane (aliases accepted).
    #[arg(long)]
    pub lane: Option<String>,
}

#[derive(Debug, Serialize)]
struct ListRow<'a> {
    wp_id: &'a str,
    lane: Lane,
    actor: &'a str,
    last_transition_at: String,
    force_count: usize,
}

#[derive(Debug, Serialize)]
struct ListOutput<'a> {
    feature_slug: &'a str,
    work_packages: Vec<ListRow<'a>>,
    summary: &'a std::collections::BTreeMap<String, usize>,
}

fn rows<'a>(snapshot: &'a Snapshot, lane: Option<Lane>) -> Vec<ListRow<'a>> {
    snapshot
        .work_packages
        .iter()
        .filter(|(_, wp)| lane.is_none_or(|l| wp.lane == l))
        .map(|(wp_id, wp)| ListRow {
            wp_id: wp_id.as_str(),
            lane: wp.lane,
            actor: &wp.actor,
            last_transition_at: wp.last_transition_at.to_rfc3339(),
            force_count: wp.force_count,
        })
        .collect()
}

/// The cached snapshot, or a replay of the log when there is no usable cache.
fn load_snapshot(feature_dir: &Path) -> Result<Snapshot, SnapshotError> {
    match reducer::read_snapshot(feature_dir) {
        Ok(Some(snapshot)) => return Ok(snapshot),
        Ok(None) => {}
        Err(err) => tracing::warn!(error = %err, "status.json unusable; replaying the log"),
    }
    reducer::rebuild_in_memory(feature_dir)
}

/// `lanes list`: current lane of every work package.
pub fn run_list(ctx: &CommandContext, args: &ListArgs) -> anyhow::Result<()> {
    let lane = match args.lane.as_deref().map(str::parse::<Lane>) {
        None => None,
        Some(Ok(lane)) => Some(lane),
        Some(Err(err)) => {
            return Err(fail(
                ctx.output,
                &CliError::from_code(err.to_string(), lanes_core::error::ErrorCode::InvalidLane),
            ));
        }
    };

    let (slug, feature_dir) = ctx.feature()?;
    let snapshot = load_snapshot(&feature_dir)
        .map_err(|err| fail(ctx.output, &CliError::from(&err)))?;

    let output = ListOutput {
        feature_slug: &slug,
        work_packages: rows(&snapshot, lane),
        summary: &snapshot.summary,
    };

    render_mode(
        ctx.output,
        &output,
        |out, w| {
            for row in &out.work_packages {
                writeln!(w, "{}\t{}\t{}", row.wp_id, row.lane, row.actor)?;
            }
            Ok(())
        },
        |out, w| {
            pretty_section(w, &format!("Feature {}", out.feature_slug))?;
            if out.work_packages.is_empty() {
                writeln!(w, "(no work packages)")?;
            }
            for row in &out.work_packages {
                writeln!(
                    w,
                    "{:<8} {:<12} {:<16} {}",
                    row.wp_id, row.lane, row.actor, row.last_transition_at
                )?;
            }
            writeln!(w)?;
            let counts: Vec<String> = out
                .summary
                .iter()
                .filter(|(_, count)| **count > 0)
                .map(|(lane, count)| format!("{lane}={count}"))
                .collect();
            writeln!(w, "{}", counts.join("  "))
        },
    )
}
