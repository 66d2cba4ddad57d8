//! Lane-changing commands: `claim`, `start`, `review`, `complete`, `reject`,
//! and the general `move`.
//!
//! Each one builds an [`EmitRequest`] and hands it to the configured
//! [`Emitter`]; guard rejections come back as structured errors with the
//! core error code and remediation hint.

use std::io::Write;

use clap::Args;
use lanes_core::event::{DoneEvidence, RepoEvidence, ReviewApproval, VerificationResult};
use lanes_core::lane::Lane;
use lanes_core::{EmitRequest, Emitter, Event};

use crate::cmd::CommandContext;
use crate::output::{CliError, OutputMode, fail, pretty_kv, render_mode};

/// Flags shared by every transition.
#[derive(Args, Debug, Default)]
pub struct TransitionFlags {
    /// Bypass the adjacency table and claim checks (requires --reason).
    #[arg(long)]
    pub force: bool,

    /// Why this transition is happening. Required with --force.
    #[arg(long)]
    pub reason: Option<String>,

    /// Execution mode recorded on the event (defaults to project config).
    #[arg(long, value_name = "MODE")]
    pub execution_mode: Option<String>,
}

/// Arguments for `claim`, `start`, and `review`.
#[derive(Args, Debug)]
pub struct WpArgs {
    /// Work package ID (e.g. WP01).
    pub wp_id: String,

    #[command(flatten)]
    pub flags: TransitionFlags,
}

/// Arguments for `lanes complete`.
#[derive(Args, Debug)]
pub struct CompleteArgs {
    /// Work package ID (e.g. WP01).
    pub wp_id: String,

    /// Who approved the work.
    #[arg(long)]
    pub reviewer: Option<String>,

    /// Review verdict.
    #[arg(long, default_value = "approved")]
    pub verdict: String,

    /// Link or ID of the approving review.
    #[arg(long)]
    pub reference: Option<String>,

    /// Delivered code, as repo@branch:commit. Repeatable.
    #[arg(long = "repo", value_name = "REPO@BRANCH:COMMIT", value_parser = parse_repo)]
    pub repos: Vec<RepoEvidence>,

    /// A verification run, as command|result|summary. Repeatable.
    #[arg(long = "verify", value_name = "COMMAND|RESULT|SUMMARY", value_parser = parse_verification)]
    pub verifications: Vec<VerificationResult>,

    #[command(flatten)]
    pub flags: TransitionFlags,
}

/// Arguments for `lanes reject`.
#[derive(Args, Debug)]
pub struct RejectArgs {
    /// Work package ID (e.g. WP01).
    pub wp_id: String,

    /// The review that requested changes.
    #[arg(long)]
    pub review_ref: Option<String>,

    /// Send the work package back to planned instead of in_progress.
    #[arg(long)]
    pub replan: bool,

    #[command(flatten)]
    pub flags: TransitionFlags,
}

/// Arguments for `lanes move`.
#[derive(Args, Debug)]
pub struct MoveArgs {
    /// Work package ID (e.g. WP01).
    pub wp_id: String,

    /// Target lane: planned, claimed, in_progress (doing), for_review,
    /// done, blocked, canceled.
    pub lane: String,

    /// Review reference, required when leaving for_review backwards.
    #[arg(long)]
    pub review_ref: Option<String>,

    #[command(flatten)]
    pub flags: TransitionFlags,
}

fn parse_repo(raw: &str) -> Result<RepoEvidence, String> {
    let invalid = || format!("expected repo@branch:commit, got '{raw}'");
    let (repo, rest) = raw.split_once('@').ok_or_else(invalid)?;
    let (branch, commit) = rest.rsplit_once(':').ok_or_else(invalid)?;
    if [repo, branch, commit].iter().any(|part| part.trim().is_empty()) {
        return Err(invalid());
    }
    Ok(RepoEvidence {
        repo: repo.to_string(),
        branch: branch.to_string(),
        commit: commit.to_string(),
    })
}

fn parse_verification(raw: &str) -> Result<VerificationResult, String> {
    let mut parts = raw.splitn(3, '|');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(command), Some(result), Some(summary)) if !command.trim().is_empty() => {
            Ok(VerificationResult {
                command: command.to_string(),
                result: result.to_string(),
                summary: summary.to_string(),
            })
        }
        _ => Err(format!("expected command|result|summary, got '{raw}'")),
    }
}

/// Evidence as given on the command line. Missing review fields are left
/// empty so the guard names them.
fn evidence_from(args: &CompleteArgs) -> Option<DoneEvidence> {
    if args.reviewer.is_none() && args.reference.is_none() {
        return None;
    }
    Some(DoneEvidence {
        review: ReviewApproval {
            reviewer: args.reviewer.clone().unwrap_or_default(),
            verdict: args.verdict.clone(),
            reference: args.reference.clone().unwrap_or_default(),
        },
        repos: args.repos.clone(),
        verification: args.verifications.clone(),
    })
}

fn request_for(
    ctx: &CommandContext,
    slug: &str,
    wp_id: &str,
    to_lane: &str,
    actor: &str,
    flags: &TransitionFlags,
) -> EmitRequest {
    let mode = flags
        .execution_mode
        .clone()
        .unwrap_or_else(|| ctx.config.emit.execution_mode.clone());
    let mut request = EmitRequest::new(slug, wp_id, to_lane, actor)
        .with_force(flags.force)
        .with_execution_mode(mode);
    if let Some(reason) = &flags.reason {
        request = request.with_reason(reason.clone());
    }
    request
}

fn emit(ctx: &CommandContext, request_fn: impl FnOnce(&str, &str) -> EmitRequest) -> anyhow::Result<()> {
    let (slug, feature_dir) = ctx.feature()?;
    let actor = ctx.actor()?;
    let request = request_fn(&slug, &actor);

    let emitter = Emitter::from_config(&ctx.config, &ctx.repo_root);
    let event = emitter
        .emit(&feature_dir, &request)
        .map_err(|err| fail(ctx.output, &CliError::from(&err)))?;

    render_event(ctx.output, &event)
}

/// Render a recorded transition.
pub fn render_event(output: OutputMode, event: &Event) -> anyhow::Result<()> {
    render_mode(
        output,
        event,
        |event, w| writeln!(w, "{event}"),
        |event, w| {
            let mark = if event.force { "!" } else { "✓" };
            writeln!(
                w,
                "{mark} {}: {} -> {}",
                event.wp_id, event.from_lane, event.to_lane
            )?;
            pretty_kv(w, "Event", event.event_id.as_str())?;
            pretty_kv(w, "Actor", &event.actor)?;
            if let Some(reason) = &event.reason {
                pretty_kv(w, "Reason", reason)?;
            }
            if let Some(review_ref) = &event.review_ref {
                pretty_kv(w, "Review", review_ref)?;
            }
            Ok(())
        },
    )
}

/// `lanes claim`: planned -> claimed.
pub fn run_claim(ctx: &CommandContext, args: &WpArgs) -> anyhow::Result<()> {
    emit(ctx, |slug, actor| {
        request_for(ctx, slug, &args.wp_id, Lane::Claimed.as_str(), actor, &args.flags)
    })
}

/// `lanes start`: claimed -> in_progress.
pub fn run_start(ctx: &CommandContext, args: &WpArgs) -> anyhow::Result<()> {
    emit(ctx, |slug, actor| {
        request_for(ctx, slug, &args.wp_id, Lane::InProgress.as_str(), actor, &args.flags)
    })
}

/// `lanes review`: in_progress -> for_review.
pub fn run_review(ctx: &CommandContext, args: &WpArgs) -> anyhow::Result<()> {
    emit(ctx, |slug, actor| {
        request_for(ctx, slug, &args.wp_id, Lane::ForReview.as_str(), actor, &args.flags)
    })
}

/// `lanes complete`: for_review -> done, with evidence.
pub fn run_complete(ctx: &CommandContext, args: &CompleteArgs) -> anyhow::Result<()> {
    emit(ctx, |slug, actor| {
        let request = request_for(ctx, slug, &args.wp_id, Lane::Done.as_str(), actor, &args.flags);
        match evidence_from(args) {
            Some(evidence) => request.with_evidence(evidence),
            None => request,
        }
    })
}

/// `lanes reject`: for_review -> in_progress (or planned with `--replan`).
pub fn run_reject(ctx: &CommandContext, args: &RejectArgs) -> anyhow::Result<()> {
    let target = if args.replan {
        Lane::Planned
    } else {
        Lane::InProgress
    };
    emit(ctx, |slug, actor| {
        let request = request_for(ctx, slug, &args.wp_id, target.as_str(), actor, &args.flags);
        match &args.review_ref {
            Some(review_ref) => request.with_review_ref(review_ref.clone()),
            None => request,
        }
    })
}

/// `lanes move`: any target lane, validated by the guard.
pub fn run_move(ctx: &CommandContext, args: &MoveArgs) -> anyhow::Result<()> {
    emit(ctx, |slug, actor| {
        let request = request_for(ctx, slug, &args.wp_id, &args.lane, actor, &args.flags);
        match &args.review_ref {
            Some(review_ref) => request.with_review_ref(review_ref.clone()),
            None => request,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct CompleteWrapper {
        #[command(flatten)]
        args: CompleteArgs,
    }

    #[derive(Parser)]
    struct MoveWrapper {
        #[command(flatten)]
        args: MoveArgs,
    }

    #[test]
    fn repo_evidence_parses() {
        let repo = parse_repo("api@feat/login:abc123").expect("parse");
        assert_eq!(repo.repo, "api");
        assert_eq!(repo.branch, "feat/login");
        assert_eq!(repo.commit, "abc123");

        assert!(parse_repo("api:abc123").is_err());
        assert!(parse_repo("api@main").is_err());
        assert!(parse_repo("@main:abc").is_err());
    }

    #[test]
    fn verification_keeps_pipes_in_summary() {
        let v = parse_verification("cargo test|pass|12 passed | 0 failed").expect("parse");
        assert_eq!(v.command, "cargo test");
        assert_eq!(v.result, "pass");
        assert_eq!(v.summary, "12 passed | 0 failed");
        assert!(parse_verification("cargo test|pass").is_err());
    }

    #[test]
    fn complete_parses_full_evidence() {
        let w = CompleteWrapper::parse_from([
            "test",
            "WP01",
            "--reviewer",
            "r1",
            "--reference",
            "PR#12",
            "--repo",
            "api@main:abc",
            "--verify",
            "make test|pass|ok",
        ]);
        let evidence = evidence_from(&w.args).expect("evidence");
        assert_eq!(evidence.review.reviewer, "r1");
        assert_eq!(evidence.review.verdict, "approved");
        assert_eq!(evidence.repos.len(), 1);
        assert_eq!(evidence.verification.len(), 1);
        assert!(evidence.validate().is_ok());
    }

    #[test]
    fn complete_without_review_fields_has_no_evidence() {
        let w = CompleteWrapper::parse_from(["test", "WP01", "--force", "--reason", "legacy"]);
        assert!(evidence_from(&w.args).is_none());
        assert!(w.args.flags.force);
    }

    #[test]
    fn partial_evidence_names_the_missing_field() {
        let w = CompleteWrapper::parse_from(["test", "WP01", "--reviewer", "r1"]);
        let evidence = evidence_from(&w.args).expect("evidence");
        assert_eq!(
            evidence.validate().map_err(|e| e.field),
            Err("review.reference")
        );
    }

    #[test]
    fn move_parses_lane_and_flags() {
        let w = MoveWrapper::parse_from([
            "test",
            "WP02",
            "doing",
            "--force",
            "--reason",
            "takeover",
            "--execution-mode",
            "direct",
        ]);
        assert_eq!(w.args.wp_id, "WP02");
        assert_eq!(w.args.lane, "doing");
        assert!(w.args.flags.force);
        assert_eq!(w.args.flags.reason.as_deref(), Some("takeover"));
        assert_eq!(w.args.flags.execution_mode.as_deref(), Some("direct"));
    }
}
