#![forbid(unsafe_code)]

mod actor;
mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use cmd::CommandContext;
use lanes_core::config;
use lanes_core::error::ErrorCode;
use output::{CliError, OutputMode, Reported};
use std::env;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "lanes: event-sourced work package lanes for parallel worktrees",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Override actor identity (skips env resolution).
    #[arg(long, global = true)]
    actor: Option<String>,

    /// Feature slug, e.g. 001-auth.
    #[arg(long, short = 'f', global = true)]
    feature: Option<String>,

    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Output mode to use before config has been loaded.
    fn fallback_output(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Text
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Lifecycle",
        about = "Claim a work package",
        long_about = "Move a work package from planned to claimed under your actor identity.",
        after_help = "EXAMPLES:\n    # Claim WP01\n    lanes --feature 001-auth claim WP01\n\n    # Take over a WP someone else holds\n    lanes -f 001-auth claim WP01 --force --reason \"original owner is out\""
    )]
    Claim(cmd::transition::WpArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Start work on a claimed work package",
        long_about = "Move a work package from claimed to in_progress.",
        after_help = "EXAMPLES:\n    # Start WP01\n    lanes -f 001-auth start WP01"
    )]
    Start(cmd::transition::WpArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Submit a work package for review",
        long_about = "Move a work package from in_progress to for_review.",
        after_help = "EXAMPLES:\n    # Hand WP01 to a reviewer\n    lanes -f 001-auth review WP01"
    )]
    Review(cmd::transition::WpArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Mark a reviewed work package done",
        long_about = "Move a work package from for_review to done. Requires review evidence\nunless --force is given with --reason.",
        after_help = "EXAMPLES:\n    # Complete with evidence\n    lanes -f 001-auth complete WP01 --reviewer r1 --reference PR#12 \\\n        --repo api@feat/login:abc123 --verify \"cargo test|pass|42 passed\"\n\n    # Emit machine-readable output\n    lanes -f 001-auth complete WP01 --reviewer r1 --reference PR#12 --json"
    )]
    Complete(cmd::transition::CompleteArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Send a work package back from review",
        long_about = "Move a work package from for_review back to in_progress (or planned\nwith --replan). Requires --review-ref.",
        after_help = "EXAMPLES:\n    # Request changes\n    lanes -f 001-auth reject WP01 --review-ref PR#12-changes"
    )]
    Reject(cmd::transition::RejectArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Move a work package to any lane",
        long_about = "Record a transition to the given lane. Non-adjacent moves need --force\nand --reason.",
        after_help = "EXAMPLES:\n    # Block a WP\n    lanes -f 001-auth move WP02 blocked --force --reason \"waiting on schema\"\n\n    # The alias doing is stored as in_progress\n    lanes -f 001-auth move WP02 doing"
    )]
    Move(cmd::transition::MoveArgs),

    #[command(
        next_help_heading = "Recovery",
        about = "Undo the latest transition of a work package",
        long_about = "Append a forced event that restores the lane the work package held\nbefore its latest transition. The log is never rewritten.",
        after_help = "EXAMPLES:\n    # Undo an accidental completion\n    lanes -f 001-auth rollback WP01 --reason \"completed the wrong WP\""
    )]
    Rollback(cmd::rollback::RollbackArgs),

    #[command(
        next_help_heading = "Read",
        about = "List work packages and their lanes",
        long_about = "Replay the event log and list the current lane of every work package.",
        after_help = "EXAMPLES:\n    # Everything\n    lanes -f 001-auth list\n\n    # Only work in progress\n    lanes -f 001-auth list --lane doing --json"
    )]
    List(cmd::list::ListArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show the transitions of one work package",
        after_help = "EXAMPLES:\n    lanes -f 001-auth history WP01"
    )]
    History(cmd::history::HistoryArgs),

    #[command(
        next_help_heading = "Maintenance",
        about = "Check a feature for stale claims, orphans, and drift",
        long_about = "Diagnose a feature. Exits 1 when any finding is reported.",
        after_help = "EXAMPLES:\n    lanes -f 001-auth doctor\n    lanes -f 001-auth doctor --json"
    )]
    Doctor(cmd::doctor::DoctorArgs),

    #[command(
        next_help_heading = "Maintenance",
        about = "Rebuild status.json from the event log"
    )]
    Materialize,

    #[command(
        next_help_heading = "Maintenance",
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n    lanes completions bash > ~/.local/share/bash-completion/completions/lanes"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_env("LANES_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if quiet {
            "error"
        } else if verbose || env::var("DEBUG").is_ok() {
            "lanes=debug,info"
        } else {
            "lanes=info,warn"
        })
    });

    let format = env::var("LANES_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn context(cli: &Cli) -> anyhow::Result<CommandContext> {
    let repo_root = cmd::find_repo_root(&env::current_dir()?);
    let effective = config::resolve_config(&repo_root, cli.json).map_err(|err| {
        output::fail(
            cli.fallback_output(),
            &CliError::from_code(format!("{err:#}"), ErrorCode::ConfigParseError),
        )
    })?;

    Ok(CommandContext {
        repo_root,
        output: OutputMode::from_resolved(&effective.resolved_output),
        config: effective.project,
        actor_flag: cli.actor.clone(),
        configured_actor: effective.user.actor,
        feature: cli.feature.clone(),
    })
}

fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    if let Commands::Completions(args) = &cli.command {
        cmd::completions::run_completions(args, &mut Cli::command())?;
        return Ok(ExitCode::SUCCESS);
    }

    let ctx = context(cli)?;
    tracing::debug!(repo_root = %ctx.repo_root.display(), feature = ?ctx.feature, "resolved context");

    match &cli.command {
        Commands::Claim(args) => cmd::transition::run_claim(&ctx, args)?,
        Commands::Start(args) => cmd::transition::run_start(&ctx, args)?,
        Commands::Review(args) => cmd::transition::run_review(&ctx, args)?,
        Commands::Complete(args) => cmd::transition::run_complete(&ctx, args)?,
        Commands::Reject(args) => cmd::transition::run_reject(&ctx, args)?,
        Commands::Move(args) => cmd::transition::run_move(&ctx, args)?,
        Commands::Rollback(args) => cmd::rollback::run_rollback(&ctx, args)?,
        Commands::List(args) => cmd::list::run_list(&ctx, args)?,
        Commands::History(args) => cmd::history::run_history(&ctx, args)?,
        Commands::Doctor(args) => {
            if !cmd::doctor::run_doctor(&ctx, args)? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Materialize => cmd::materialize::run_materialize(&ctx)?,
        Commands::Completions(_) => {}
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            if err.downcast_ref::<Reported>().is_none() {
                let _ = output::render_error(cli.fallback_output(), &CliError::new(format!("{err:#}")));
            }
            ExitCode::FAILURE
        }
    }
}
