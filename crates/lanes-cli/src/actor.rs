//! Actor identity resolution for CLI commands.
//!
//! The resolution chain: `--actor` flag > `LANES_ACTOR` env > `AGENT` env >
//! user config `actor` > `USER` env (TTY only). Transitions require an actor;
//! read-only commands work without one.

use std::env;

/// Errors from actor resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorResolutionError {
    pub message: String,
    pub code: &'static str,
}

impl std::fmt::Display for ActorResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ActorResolutionError {}

/// Environment reader trait for dependency injection in tests.
trait EnvReader {
    fn get(&self, key: &str) -> Option<String>;
    fn is_tty(&self) -> bool;
}

struct RealEnv;

impl EnvReader for RealEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.trim().is_empty())
    }

    fn is_tty(&self) -> bool {
        use std::io::IsTerminal;
        std::io::stdin().is_terminal()
    }
}

fn resolve_actor_with(
    cli_flag: Option<&str>,
    configured: Option<&str>,
    env: &dyn EnvReader,
) -> Option<String> {
    let non_blank = |v: &&str| !v.trim().is_empty();

    if let Some(actor) = cli_flag.filter(non_blank) {
        return Some(actor.to_string());
    }
    if let Some(val) = env.get("LANES_ACTOR") {
        return Some(val);
    }
    if let Some(val) = env.get("AGENT") {
        return Some(val);
    }
    if let Some(actor) = configured.filter(non_blank) {
        return Some(actor.to_string());
    }
    if env.is_tty() {
        return env.get("USER");
    }
    None
}

/// Resolve the actor identity, or `None` if no source provides one.
pub fn resolve_actor(cli_flag: Option<&str>, configured: Option<&str>) -> Option<String> {
    resolve_actor_with(cli_flag, configured, &RealEnv)
}

/// Resolve the actor identity for a command that records events.
pub fn require_actor(
    cli_flag: Option<&str>,
    configured: Option<&str>,
) -> Result<String, ActorResolutionError> {
    resolve_actor(cli_flag, configured).ok_or_else(|| ActorResolutionError {
        message: "Actor identity required to record a transition.".to_string(),
        code: "missing_actor",
    })
}
