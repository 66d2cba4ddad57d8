use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use crate::doctor::StaleThresholds;

/// Project config location, relative to the repository root.
pub const PROJECT_CONFIG_PATH: &str = ".lanes/config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub doctor: DoctorConfig,
    #[serde(default)]
    pub emit: EmitConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSection {
    /// Directory under the repository root holding one directory per feature.
    #[serde(default = "default_features_dir")]
    pub features_dir: PathBuf,
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            features_dir: default_features_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorConfig {
    #[serde(default = "default_claimed_stale_days")]
    pub claimed_stale_days: u32,
    #[serde(default = "default_in_progress_stale_days")]
    pub in_progress_stale_days: u32,
    /// Where per-WP worktrees live, relative to the repository root.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
}

impl Default for DoctorConfig {
    fn default() -> Self {
        Self {
            claimed_stale_days: default_claimed_stale_days(),
            in_progress_stale_days: default_in_progress_stale_days(),
            workspace_root: default_workspace_root(),
        }
    }
}

impl DoctorConfig {
    #[must_use]
    pub fn thresholds(&self) -> StaleThresholds {
        StaleThresholds::from_days(self.claimed_stale_days, self.in_progress_stale_days)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitConfig {
    #[serde(default = "default_execution_mode")]
    pub execution_mode: String,
    /// Hold `.status.lock` across read-guard-append.
    #[serde(default = "default_true")]
    pub claim_lock: bool,
    /// Mirror lanes into task-file front matter.
    #[serde(default = "default_true")]
    pub legacy_frontmatter: bool,
}

impl Default for EmitConfig {
    fn default() -> Self {
        Self {
            execution_mode: default_execution_mode(),
            claim_lock: default_true(),
            legacy_frontmatter: default_true(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub outbox: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

impl ProjectConfig {
    /// `{repo_root}/{features_dir}`.
    #[must_use]
    pub fn features_root(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.project.features_dir)
    }

    /// `{repo_root}/{features_dir}/{feature_slug}`.
    #[must_use]
    pub fn feature_dir(&self, repo_root: &Path, feature_slug: &str) -> PathBuf {
        self.features_root(repo_root).join(feature_slug)
    }

    #[must_use]
    pub fn workspace_root(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.doctor.workspace_root)
    }
}

/// Load `.lanes/config.toml`, falling back to defaults when it is absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(repo_root: &Path) -> Result<ProjectConfig> {
    let path = repo_root.join(PROJECT_CONFIG_PATH);
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Load `{config_dir}/lanes/config.toml`, falling back to defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("lanes/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Project config, user config, and the resolved output mode.
///
/// # Errors
///
/// Returns an error if either config file is unreadable or malformed.
pub fn resolve_config(repo_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(repo_root)?;
    let user = load_user_config()?;

    let env_format = env::var("FORMAT").ok();
    let resolved_output = resolve_output(cli_json, user.output.as_deref(), env_format.as_deref());

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
    })
}

/// `--json` > `FORMAT` > user config > TTY detection.
#[must_use]
pub fn resolve_output(
    cli_json: bool,
    user_output: Option<&str>,
    env_format: Option<&str>,
) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "plain" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

const fn default_true() -> bool {
    true
}

fn default_features_dir() -> PathBuf {
    PathBuf::from("specs")
}

const fn default_claimed_stale_days() -> u32 {
    7
}

const fn default_in_progress_stale_days() -> u32 {
    14
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(".worktrees")
}

fn default_execution_mode() -> String {
    crate::event::DEFAULT_EXECUTION_MODE.to_string()
}
