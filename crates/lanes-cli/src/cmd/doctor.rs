use std::io::Write;

use clap::Args;
use lanes_core::doctor::{Doctor, DoctorReport, Severity, SnapshotDriftValidator};

use crate::cmd::CommandContext;
use crate::output::{CliError, fail, pretty_kv, pretty_section, render_mode};

/// Arguments for `lanes doctor`.
#[derive(Args, Debug, Default)]
pub struct DoctorArgs {
    /// Skip comparing status.json against a fresh replay of the log.
    #[arg(long)]
    pub skip_drift: bool,
}

fn severity_tag(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "info",
        Severity::Warning => "warn",
        Severity::Error => "error",
    }
}

/// `lanes doctor`: stale claims, orphaned workspaces, and drift.
///
/// Returns whether the feature is healthy; the caller maps that to the
/// process exit code.
pub fn run_doctor(ctx: &CommandContext, args: &DoctorArgs) -> anyhow::Result<bool> {
    let (slug, feature_dir) = ctx.feature()?;

    let mut doctor = Doctor::new(&ctx.repo_root, ctx.config.doctor.thresholds())
        .with_workspace_root(ctx.config.workspace_root(&ctx.repo_root));
    if !args.skip_drift {
        doctor = doctor.with_drift_validator(Box::new(SnapshotDriftValidator));
    }

    let report = doctor
        .run(&feature_dir, &slug)
        .map_err(|err| fail(ctx.output, &CliError::from(&err)))?;

    render_mode(
        ctx.output,
        &report,
        |report, w| {
            for finding in &report.findings {
                writeln!(
                    w,
                    "{}\t{}\t{}",
                    severity_tag(finding.severity),
                    finding.wp_id.as_deref().unwrap_or("-"),
                    finding.message
                )?;
            }
            Ok(())
        },
        |report: &DoctorReport, w| {
            pretty_section(w, &format!("Doctor: {}", report.feature_slug))?;
            pretty_kv(w, "Checked", report.checked_at.to_rfc3339())?;
            if report.is_healthy() {
                writeln!(w, "✓ no problems found")?;
                return Ok(());
            }
            for finding in &report.findings {
                writeln!(w, "[{}] {}", severity_tag(finding.severity), finding.message)?;
                writeln!(w, "    fix: {}", finding.recommended_action)?;
            }
            Ok(())
        },
    )?;

    Ok(report.is_healthy())
}
