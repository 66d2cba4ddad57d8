//! Read-only health diagnostics for one feature.
//!
//! The doctor never writes. It prefers the cached `status.json`, falls back
//! to replaying `status.events.jsonl` in memory when the cache is missing or
//! malformed, and treats a feature with neither as healthy. Checks are
//! independent and additive:
//!
//! - **stale claims**: `claimed`/`in_progress` WPs untouched for longer than
//!   the lane's threshold
//! - **orphan workspaces**: `{feature_slug}-{wp_id}` worktree directories
//!   left behind once every WP is `done` or `canceled`. A WP known only from
//!   its workspace or its task file has no events and counts as `planned`.
//! - **drift**: delegated to an optional [`DriftValidator`]; a missing or
//!   failing validator contributes zero findings

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::error::ErrorCode;
use crate::lane::Lane;
use crate::reducer::{self, Snapshot};
use crate::store;
use crate::view;

/// Default worktree root, relative to the repository root.
pub const DEFAULT_WORKSPACE_ROOT: &str = ".worktrees";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    StaleClaim,
    OrphanWorkspace,
    Drift,
    EventLogUnreadable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub category: Category,
    pub wp_id: Option<String>,
    pub message: String,
    pub recommended_action: String,
}

/// How long a WP may sit in an actively-held lane before it is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleThresholds {
    pub claimed: TimeDelta,
    pub in_progress: TimeDelta,
}

impl Default for StaleThresholds {
    fn default() -> Self {
        Self::from_days(7, 14)
    }
}

impl StaleThresholds {
    #[must_use]
    pub fn from_days(claimed: u32, in_progress: u32) -> Self {
        Self {
            claimed: TimeDelta::days(i64::from(claimed)),
            in_progress: TimeDelta::days(i64::from(in_progress)),
        }
    }

    /// Threshold for `lane`, or `None` for lanes that are never stale.
    #[must_use]
    pub const fn for_lane(&self, lane: Lane) -> Option<TimeDelta> {
        match lane {
            Lane::Claimed => Some(self.claimed),
            Lane::InProgress => Some(self.in_progress),
            Lane::Planned | Lane::ForReview | Lane::Done | Lane::Blocked | Lane::Canceled => None,
        }
    }
}

/// Where the doctor's view of the feature came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    Cached,
    Rebuilt,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DoctorReport {
    pub feature_slug: String,
    pub checked_at: DateTime<Utc>,
    pub snapshot_source: SnapshotSource,
    pub findings: Vec<Finding>,
}

impl DoctorReport {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.findings.is_empty()
    }

    #[must_use]
    pub fn has_warnings(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Warning)
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Error)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DoctorError {
    #[error("feature directory not found: {}", path.display())]
    FeatureNotFound { path: PathBuf },
}

impl DoctorError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::FeatureNotFound { .. } => ErrorCode::FeatureNotFound,
        }
    }
}

/// An optional, pluggable drift check.
pub trait DriftValidator: Send + Sync {
    /// # Errors
    ///
    /// Any failure; the doctor logs it and reports no drift findings.
    fn check(&self, feature_dir: &Path, feature_slug: &str) -> anyhow::Result<Vec<Finding>>;
}

/// Flags WPs whose cached lane disagrees with a fresh replay of the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotDriftValidator;

impl DriftValidator for SnapshotDriftValidator {
    fn check(&self, feature_dir: &Path, feature_slug: &str) -> anyhow::Result<Vec<Finding>> {
        let Ok(Some(cached)) = reducer::read_snapshot(feature_dir) else {
            return Ok(Vec::new());
        };
        let Ok(events) = store::read_all(feature_dir) else {
            return Ok(Vec::new());
        };
        let replayed = reducer::reduce(feature_slug, &events, Utc::now());

        let mut wp_ids: Vec<&String> = cached
            .work_packages
            .keys()
            .chain(replayed.work_packages.keys())
            .collect();
        wp_ids.sort();
        wp_ids.dedup();

        Ok(wp_ids
            .into_iter()
            .filter_map(|wp_id| {
                let cached_lane = cached.lane_of(wp_id);
                let log_lane = replayed.lane_of(wp_id);
                (cached_lane != log_lane).then(|| Finding {
                    severity: Severity::Warning,
                    category: Category::Drift,
                    wp_id: Some(wp_id.clone()),
                    message: format!(
                        "{wp_id}: status.json says {cached_lane}, event log says {log_lane}"
                    ),
                    recommended_action: "Run `lanes materialize` to rebuild status.json."
                        .to_string(),
                })
            })
            .collect())
    }
}

/// Configured diagnostics runner.
pub struct Doctor {
    thresholds: StaleThresholds,
    workspace_root: PathBuf,
    drift: Option<Box<dyn DriftValidator>>,
    now: Option<DateTime<Utc>>,
}

impl Doctor {
    /// Doctor with worktrees under `{repo_root}/.worktrees` and no drift check.
    #[must_use]
    pub fn new(repo_root: &Path, thresholds: StaleThresholds) -> Self {
        Self {
            thresholds,
            workspace_root: repo_root.join(DEFAULT_WORKSPACE_ROOT),
            drift: None,
            now: None,
        }
    }

    #[must_use]
    pub fn with_workspace_root(mut self, workspace_root: impl Into<PathBuf>) -> Self {
        self.workspace_root = workspace_root.into();
        self
    }

    #[must_use]
    pub fn with_drift_validator(mut self, validator: Box<dyn DriftValidator>) -> Self {
        self.drift = Some(validator);
        self
    }

    /// Pin the clock, for deterministic staleness.
    #[must_use]
    pub const fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Diagnose one feature.
    ///
    /// # Errors
    ///
    /// Only [`DoctorError::FeatureNotFound`]; every other problem becomes a
    /// finding or is logged.
    pub fn run(&self, feature_dir: &Path, feature_slug: &str) -> Result<DoctorReport, DoctorError> {
        if !feature_dir.is_dir() {
            return Err(DoctorError::FeatureNotFound {
                path: feature_dir.to_path_buf(),
            });
        }

        let now = self.now.unwrap_or_else(Utc::now);
        let mut findings = Vec::new();
        let (snapshot, snapshot_source) = load_state(feature_dir, feature_slug, now, &mut findings);

        if let Some(snapshot) = &snapshot {
            findings.extend(self.stale_claims(snapshot, now));
            findings.extend(self.orphan_workspaces(snapshot, feature_dir, feature_slug));
        }
        findings.extend(self.drift(feature_dir, feature_slug));

        tracing::debug!(
            feature = feature_slug,
            source = ?snapshot_source,
            findings = findings.len(),
            "doctor finished"
        );

        Ok(DoctorReport {
            feature_slug: feature_slug.to_string(),
            checked_at: now,
            snapshot_source,
            findings,
        })
    }

    fn stale_claims(&self, snapshot: &Snapshot, now: DateTime<Utc>) -> Vec<Finding> {
        snapshot
            .work_packages
            .iter()
            .filter_map(|(wp_id, wp)| {
                let threshold = self.thresholds.for_lane(wp.lane)?;
                let elapsed = now - wp.last_transition_at;
                (elapsed > threshold).then(|| Finding {
                    severity: Severity::Warning,
                    category: Category::StaleClaim,
                    wp_id: Some(wp_id.clone()),
                    message: format!(
                        "{wp_id} has been {} by {} for {} (threshold {})",
                        wp.lane,
                        wp.actor,
                        format_elapsed(elapsed),
                        format_elapsed(threshold)
                    ),
                    recommended_action: format!(
                        "Check in with {}, or release {wp_id} with `lanes move {wp_id} planned --force --reason ...`.",
                        wp.actor
                    ),
                })
            })
            .collect()
    }

    fn orphan_workspaces(
        &self,
        snapshot: &Snapshot,
        feature_dir: &Path,
        feature_slug: &str,
    ) -> Vec<Finding> {
        let workspaces = self.feature_workspaces(feature_slug);
        let task_wps = view::task_wp_ids(feature_dir);

        let all_terminal = {
            let mut wp_ids: BTreeSet<&str> =
                snapshot.work_packages.keys().map(String::as_str).collect();
            wp_ids.extend(workspaces.keys().map(String::as_str));
            wp_ids.extend(task_wps.iter().map(String::as_str));
            !wp_ids.is_empty() && wp_ids.iter().all(|wp_id| snapshot.lane_of(wp_id).is_terminal())
        };
        if !all_terminal {
            return Vec::new();
        }

        workspaces
            .into_iter()
            .map(|(wp_id, workspace)| Finding {
                severity: Severity::Warning,
                category: Category::OrphanWorkspace,
                message: format!(
                    "workspace {} still exists but every work package is done or canceled",
                    workspace.display()
                ),
                recommended_action: format!(
                    "Remove it with `git worktree remove {}`.",
                    workspace.display()
                ),
                wp_id: Some(wp_id),
            })
            .collect()
    }

    /// `{feature_slug}-{wp_id}` directories under the workspace root, by WP id.
    fn feature_workspaces(&self, feature_slug: &str) -> BTreeMap<String, PathBuf> {
        let prefix = format!("{feature_slug}-");
        let Ok(entries) = fs::read_dir(&self.workspace_root) else {
            return BTreeMap::new();
        };
        entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let wp_id = name.strip_prefix(&prefix)?;
                (!wp_id.is_empty()).then(|| (wp_id.to_string(), entry.path()))
            })
            .collect()
    }

    fn drift(&self, feature_dir: &Path, feature_slug: &str) -> Vec<Finding> {
        let Some(validator) = &self.drift else {
            return Vec::new();
        };
        validator
            .check(feature_dir, feature_slug)
            .unwrap_or_else(|err| {
                tracing::warn!(error = %format!("{err:#}"), "drift validator failed; skipping");
                Vec::new()
            })
    }
}

impl std::fmt::Debug for Doctor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Doctor")
            .field("thresholds", &self.thresholds)
            .field("workspace_root", &self.workspace_root)
            .field("drift", &self.drift.is_some())
            .field("now", &self.now)
            .finish()
    }
}

/// Diagnose with the current clock, the default workspace root, and no
/// drift validator.
///
/// # Errors
///
/// Only [`DoctorError::FeatureNotFound`].
pub fn run_doctor(
    feature_dir: &Path,
    feature_slug: &str,
    repo_root: &Path,
    thresholds: StaleThresholds,
) -> Result<DoctorReport, DoctorError> {
    Doctor::new(repo_root, thresholds).run(feature_dir, feature_slug)
}

fn load_state(
    feature_dir: &Path,
    feature_slug: &str,
    now: DateTime<Utc>,
    findings: &mut Vec<Finding>,
) -> (Option<Snapshot>, SnapshotSource) {
    match reducer::read_snapshot(feature_dir) {
        Ok(Some(snapshot)) => return (Some(snapshot), SnapshotSource::Cached),
        Ok(None) => {}
        Err(err) => tracing::warn!(error = %err, "cached snapshot unusable; rebuilding from log"),
    }

    if !store::events_path(feature_dir).exists() {
        return (None, SnapshotSource::None);
    }

    match store::read_all(feature_dir) {
        Ok(events) => (
            Some(reducer::reduce(feature_slug, &events, now)),
            SnapshotSource::Rebuilt,
        ),
        Err(err) => {
            tracing::warn!(error = %err, "event log unreadable");
            findings.push(Finding {
                severity: Severity::Error,
                category: Category::EventLogUnreadable,
                wp_id: None,
                message: err.to_string(),
                recommended_action: err
                    .code()
                    .hint()
                    .unwrap_or("Inspect status.events.jsonl.")
                    .to_string(),
            });
            (None, SnapshotSource::None)
        }
    }
}

fn format_elapsed(delta: TimeDelta) -> String {
    let days = delta.num_days();
    let hours = delta.num_hours() - days * 24;
    if hours == 0 {
        format!("{days}d")
    } else {
        format!("{days}d {hours}h")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::{EmitRequest, Emitter};
    use std::fs;
    use tempfile::TempDir;

    fn feature(tmp: &TempDir) -> PathBuf {
        let dir = tmp.path().join("specs/001-auth");
        fs::create_dir_all(&dir).expect("mkdir");
        dir
    }

    #[test]
    fn missing_feature_dir_is_the_only_error() {
        let tmp = TempDir::new().expect("tempdir");
        let err = run_doctor(
            &tmp.path().join("specs/nope"),
            "nope",
            tmp.path(),
            StaleThresholds::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::FeatureNotFound);
    }

    #[test]
    fn empty_feature_is_healthy() {
        let tmp = TempDir::new().expect("tempdir");
        let dir = feature(&tmp);
        let report = run_doctor(&dir, "001-auth", tmp.path(), StaleThresholds::default())
            .expect("doctor");
        assert!(report.is_healthy());
        assert_eq!(report.snapshot_source, SnapshotSource::None);
    }

    #[test]
    fn malformed_cache_falls_back_to_replay() {
        let tmp = TempDir::new().expect("tempdir");
        let dir = feature(&tmp);
        Emitter::new()
            .emit(&dir, &EmitRequest::new("001-auth", "WP01", "claimed", "a1"))
            .expect("emit");
        fs::write(reducer::snapshot_path(&dir), "{ not json").expect("clobber");

        let report = run_doctor(&dir, "001-auth", tmp.path(), StaleThresholds::default())
            .expect("doctor");
        assert_eq!(report.snapshot_source, SnapshotSource::Rebuilt);
        assert!(report.is_healthy());
    }

    #[test]
    fn corrupt_log_without_cache_is_an_error_finding() {
        let tmp = TempDir::new().expect("tempdir");
        let dir = feature(&tmp);
        fs::write(store::events_path(&dir), "garbage\n").expect("write");

        let report = run_doctor(&dir, "001-auth", tmp.path(), StaleThresholds::default())
            .expect("doctor");
        assert!(report.has_errors());
        assert_eq!(report.findings[0].category, Category::EventLogUnreadable);
    }

    #[test]
    fn blocked_and_for_review_are_never_stale() {
        let thresholds = StaleThresholds::default();
        for lane in [Lane::ForReview, Lane::Blocked, Lane::Done, Lane::Canceled, Lane::Planned] {
            assert!(thresholds.for_lane(lane).is_none(), "{lane}");
        }
        assert_eq!(thresholds.for_lane(Lane::Claimed), Some(TimeDelta::days(7)));
        assert_eq!(thresholds.for_lane(Lane::InProgress), Some(TimeDelta::days(14)));
    }

    struct BrokenValidator;

    impl DriftValidator for BrokenValidator {
        fn check(&self, _: &Path, _: &str) -> anyhow::Result<Vec<Finding>> {
            anyhow::bail!("engine not installed")
        }
    }

    #[test]
    fn broken_drift_validator_contributes_nothing() {
        let tmp = TempDir::new().expect("tempdir");
        let dir = feature(&tmp);
        let report = Doctor::new(tmp.path(), StaleThresholds::default())
            .with_drift_validator(Box::new(BrokenValidator))
            .run(&dir, "001-auth")
            .expect("doctor");
        assert!(report.is_healthy());
    }

    #[test]
    fn snapshot_drift_is_reported_per_wp() {
        let tmp = TempDir::new().expect("tempdir");
        let dir = feature(&tmp);
        let emitter = Emitter::new();
        emitter
            .emit(&dir, &EmitRequest::new("001-auth", "WP01", "claimed", "a1"))
            .expect("claim");
        let stale_cache = fs::read(reducer::snapshot_path(&dir)).expect("read cache");
        emitter
            .emit(&dir, &EmitRequest::new("001-auth", "WP01", "in_progress", "a1"))
            .expect("start");
        fs::write(reducer::snapshot_path(&dir), stale_cache).expect("restore stale cache");

        let findings = SnapshotDriftValidator
            .check(&dir, "001-auth")
            .expect("check");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category, Category::Drift);
        assert_eq!(findings[0].wp_id.as_deref(), Some("WP01"));
        assert!(findings[0].recommended_action.contains("lanes materialize"));
    }

    #[test]
    fn workspaces_are_matched_by_feature_prefix() {
        let tmp = TempDir::new().expect("tempdir");
        let root = tmp.path().join(DEFAULT_WORKSPACE_ROOT);
        fs::create_dir_all(root.join("001-auth-WP01")).expect("mkdir");
        fs::create_dir_all(root.join("002-billing-WP01")).expect("mkdir");
        fs::write(root.join("001-auth-WP02"), "not a dir").expect("write");

        let found = Doctor::new(tmp.path(), StaleThresholds::default()).feature_workspaces("001-auth");
        assert_eq!(found.keys().collect::<Vec<_>>(), vec!["WP01"]);
        assert_eq!(found["WP01"], root.join("001-auth-WP01"));
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(TimeDelta::days(8)), "8d");
        assert_eq!(format_elapsed(TimeDelta::hours(30)), "1d 6h");
    }
}
