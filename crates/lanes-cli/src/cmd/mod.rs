pub mod completions;
pub mod doctor;
pub mod history;
pub mod list;
pub mod materialize;
pub mod rollback;
pub mod transition;

use std::path::{Path, PathBuf};

use lanes_core::config::ProjectConfig;
use lanes_core::error::ErrorCode;

use crate::actor;
use crate::output::{CliError, OutputMode, fail};

/// Resolved state shared by every subcommand.
#[derive(Debug)]
pub struct CommandContext {
    pub repo_root: PathBuf,
    pub config: ProjectConfig,
    pub output: OutputMode,
    pub actor_flag: Option<String>,
    pub configured_actor: Option<String>,
    pub feature: Option<String>,
}

impl CommandContext {
    /// The selected feature's slug and directory.
    ///
    /// # Errors
    ///
    /// Fails (already rendered) when `--feature` is absent or names a
    /// directory that does not exist.
    pub fn feature(&self) -> anyhow::Result<(String, PathBuf)> {
        let Some(slug) = self.feature.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            return Err(fail(
                self.output,
                &CliError::with_details(
                    "no feature selected",
                    "Pass --feature <slug>, e.g. --feature 001-auth",
                    "missing_feature",
                ),
            ));
        };

        let dir = self.config.feature_dir(&self.repo_root, slug);
        if !dir.is_dir() {
            return Err(fail(
                self.output,
                &CliError::from_code(
                    format!("feature directory not found: {}", dir.display()),
                    ErrorCode::FeatureNotFound,
                ),
            ));
        }
        Ok((slug.to_string(), dir))
    }

    /// The actor recorded on new events.
    ///
    /// # Errors
    ///
    /// Fails (already rendered) when no identity source is set.
    pub fn actor(&self) -> anyhow::Result<String> {
        actor::require_actor(self.actor_flag.as_deref(), self.configured_actor.as_deref()).map_err(
            |err| {
                fail(
                    self.output,
                    &CliError::with_details(
                        err.message,
                        "Pass --actor, or set LANES_ACTOR or AGENT",
                        err.code,
                    ),
                )
            },
        )
    }
}

/// Walk up from `start` to the directory holding `.lanes/` or `.git`.
///
/// Falls back to `start` itself so commands work in a bare directory.
pub fn find_repo_root(start: &Path) -> PathBuf {
    start
        .ancestors()
        .find(|dir| dir.join(".lanes").is_dir() || dir.join(".git").exists())
        .unwrap_or(start)
        .to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn context(root: &Path, feature: Option<&str>) -> CommandContext {
        CommandContext {
            repo_root: root.to_path_buf(),
            config: ProjectConfig::default(),
            output: OutputMode::Text,
            actor_flag: Some("a1".into()),
            configured_actor: None,
            feature: feature.map(str::to_string),
        }
    }

    #[test]
    fn repo_root_is_found_from_a_nested_directory() {
        let tmp = TempDir::new().expect("tempdir");
        fs::create_dir_all(tmp.path().join(".lanes")).expect("mkdir");
        let nested = tmp.path().join("specs/001-auth/tasks");
        fs::create_dir_all(&nested).expect("mkdir");
        assert_eq!(find_repo_root(&nested), tmp.path());
    }

    #[test]
    fn bare_directory_is_its_own_root() {
        let tmp = TempDir::new().expect("tempdir");
        assert_eq!(find_repo_root(tmp.path()), tmp.path());
    }

    #[test]
    fn feature_resolves_under_features_dir() {
        let tmp = TempDir::new().expect("tempdir");
        fs::create_dir_all(tmp.path().join("specs/001-auth")).expect("mkdir");
        let (slug, dir) = context(tmp.path(), Some("001-auth")).feature().expect("feature");
        assert_eq!(slug, "001-auth");
        assert_eq!(dir, tmp.path().join("specs/001-auth"));
    }

    #[test]
    fn missing_feature_is_rejected() {
        let tmp = TempDir::new().expect("tempdir");
        assert!(context(tmp.path(), None).feature().is_err());
        assert!(context(tmp.path(), Some("404-nope")).feature().is_err());
    }

    #[test]
    fn actor_flag_wins() {
        let tmp = TempDir::new().expect("tempdir");
        assert_eq!(context(tmp.path(), None).actor().expect("actor"), "a1");
    }
}
