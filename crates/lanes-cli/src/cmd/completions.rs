use anyhow::Result;
use clap::Args;
use clap_complete::{Shell, generate};

/// Arguments for `lanes completions`.
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for.
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Write the completion script for `shell` to stdout.
pub fn run_completions(args: &CompletionsArgs, command: &mut clap::Command) -> Result<()> {
    generate(args.shell, command, "lanes", &mut std::io::stdout());
    Ok(())
}
