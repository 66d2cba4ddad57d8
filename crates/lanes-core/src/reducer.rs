//! Snapshot reducer and materializer.
//!
//! The log's physical line order is not trustworthy: independent worktrees
//! append to their own copy and git later interleaves those appends in
//! whatever order the merge produces. The reducer therefore never looks at
//! line position. A work package's lane is the `to_lane` of its event with
//! the greatest [`EventId`], and every aggregate is computed with
//! order-insensitive folds, so any permutation of the log yields the same
//! [`Snapshot`].
//!
//! `status.json` is a disposable cache of that reduction. It can be deleted
//! at any time and is rebuilt in full by [`materialize`].

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::event::{Event, EventId};
use crate::lane::Lane;
use crate::store::{self, StoreError};

/// File name of the materialized snapshot inside a feature directory.
pub const SNAPSHOT_FILE: &str = "status.json";

/// Derived state of one feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub feature_slug: String,
    pub materialized_at: DateTime<Utc>,
    pub event_count: usize,
    /// Greatest event id in the log, not the id on the last line.
    pub last_event_id: Option<EventId>,
    pub work_packages: BTreeMap<String, WpState>,
    /// Count of work packages per lane; every lane is always present.
    pub summary: BTreeMap<String, usize>,
}

/// Derived state of one work package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WpState {
    pub lane: Lane,
    /// Actor of the winning event.
    pub actor: String,
    pub last_transition_at: DateTime<Utc>,
    pub last_event_id: EventId,
    pub force_count: usize,
}

impl Snapshot {
    /// Lane of `wp_id`, defaulting to `planned` when it has no events.
    #[must_use]
    pub fn lane_of(&self, wp_id: &str) -> Lane {
        self.work_packages
            .get(wp_id)
            .map_or(Lane::Planned, |wp| wp.lane)
    }

    /// Copy with `materialized_at` cleared, for equality modulo rebuild time.
    #[must_use]
    pub fn without_timestamp(&self) -> Self {
        Self {
            materialized_at: DateTime::<Utc>::default(),
            ..self.clone()
        }
    }
}

/// Errors raised while materializing or reading the snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("snapshot I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed snapshot at {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl SnapshotError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Store(e) => e.code(),
            Self::Io { .. } => ErrorCode::EventLogWriteFailed,
            Self::Malformed { .. } => ErrorCode::CorruptSnapshot,
            Self::Serialize(_) => ErrorCode::InternalUnexpected,
        }
    }
}

/// Path of the snapshot for `feature_dir`.
#[must_use]
pub fn snapshot_path(feature_dir: &Path) -> PathBuf {
    feature_dir.join(SNAPSHOT_FILE)
}

/// The event with the greatest id, if any.
pub fn latest_event<'a>(events: impl IntoIterator<Item = &'a Event>) -> Option<&'a Event> {
    events.into_iter().max_by(|a, b| a.event_id.cmp(&b.event_id))
}

/// Current lane of a single work package's events.
///
/// The caller passes only that work package's events. No events means
/// `planned`.
#[must_use]
pub fn reduce_one(events: &[Event]) -> Lane {
    latest_event(events).map_or(Lane::Planned, |event| event.to_lane)
}

/// Current lane of `wp_id` within a whole-feature event list.
#[must_use]
pub fn current_lane(events: &[Event], wp_id: &str) -> Lane {
    latest_event(events.iter().filter(|e| e.wp_id == wp_id)).map_or(Lane::Planned, |e| e.to_lane)
}

/// Reduce a full event list into a snapshot.
#[must_use]
pub fn reduce(feature_slug: &str, events: &[Event], materialized_at: DateTime<Utc>) -> Snapshot {
    let mut by_wp: BTreeMap<&str, Vec<&Event>> = BTreeMap::new();
    for event in events {
        by_wp.entry(event.wp_id.as_str()).or_default().push(event);
    }

    let mut work_packages = BTreeMap::new();
    for (wp_id, wp_events) in by_wp {
        let Some(winner) = latest_event(wp_events.iter().copied()) else {
            continue;
        };
        work_packages.insert(
            wp_id.to_string(),
            WpState {
                lane: winner.to_lane,
                actor: winner.actor.clone(),
                last_transition_at: winner.at,
                last_event_id: winner.event_id.clone(),
                force_count: wp_events.iter().filter(|e| e.force).count(),
            },
        );
    }

    let mut summary: BTreeMap<String, usize> = Lane::ALL
        .iter()
        .map(|lane| (lane.as_str().to_string(), 0))
        .collect();
    for wp in work_packages.values() {
        *summary.entry(wp.lane.as_str().to_string()).or_default() += 1;
    }

    Snapshot {
        feature_slug: feature_slug.to_string(),
        materialized_at,
        event_count: events.len(),
        last_event_id: latest_event(events).map(|e| e.event_id.clone()),
        work_packages,
        summary,
    }
}

/// Feature slug implied by a feature directory's name.
#[must_use]
pub fn feature_slug_of(feature_dir: &Path) -> String {
    feature_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Slug recorded on the latest event, or the directory name for an empty log.
fn recorded_slug(feature_dir: &Path, events: &[Event]) -> String {
    latest_event(events).map_or_else(|| feature_slug_of(feature_dir), |e| e.feature_slug.clone())
}

/// Replay the log and rewrite `status.json`, stamped with the current time.
///
/// # Errors
///
/// Returns an error if the log cannot be read or the snapshot cannot be
/// written. The log itself is never modified.
pub fn materialize(feature_dir: &Path) -> Result<Snapshot, SnapshotError> {
    materialize_at(feature_dir, Utc::now())
}

/// [`materialize`] with an explicit `materialized_at`.
///
/// # Errors
///
/// Same as [`materialize`].
pub fn materialize_at(
    feature_dir: &Path,
    materialized_at: DateTime<Utc>,
) -> Result<Snapshot, SnapshotError> {
    let events = store::read_all(feature_dir)?;
    let snapshot = reduce(&recorded_slug(feature_dir, &events), &events, materialized_at);
    write_snapshot(feature_dir, &snapshot)?;
    tracing::debug!(
        feature = %snapshot.feature_slug,
        events = snapshot.event_count,
        work_packages = snapshot.work_packages.len(),
        "materialized snapshot"
    );
    Ok(snapshot)
}

/// Replay the log in memory without touching `status.json`.
///
/// # Errors
///
/// Returns an error if the log cannot be read.
pub fn rebuild_in_memory(feature_dir: &Path) -> Result<Snapshot, SnapshotError> {
    let events = store::read_all(feature_dir)?;
    Ok(reduce(&recorded_slug(feature_dir, &events), &events, Utc::now()))
}

/// Per-process temp file, so concurrent writers never share one.
fn snapshot_tmp_path(feature_dir: &Path) -> PathBuf {
    feature_dir.join(format!(".{SNAPSHOT_FILE}.{}.tmp", std::process::id()))
}

/// Atomically replace `status.json` (temp file + rename).
///
/// # Errors
///
/// Returns an error if serialization or any filesystem step fails.
pub fn write_snapshot(feature_dir: &Path, snapshot: &Snapshot) -> Result<(), SnapshotError> {
    let path = snapshot_path(feature_dir);
    let tmp = snapshot_tmp_path(feature_dir);
    let mut body = serde_json::to_string_pretty(snapshot)?;
    body.push('\n');

    let mut file = fs::File::create(&tmp).map_err(|source| SnapshotError::Io {
        path: tmp.clone(),
        source,
    })?;
    file.write_all(body.as_bytes())
        .and_then(|()| file.sync_all())
        .map_err(|source| SnapshotError::Io {
            path: tmp.clone(),
            source,
        })?;
    fs::rename(&tmp, &path).map_err(|source| SnapshotError::Io { path, source })?;
    Ok(())
}

/// Read the cached snapshot.
///
/// Returns `Ok(None)` when no snapshot exists.
///
/// # Errors
///
/// Returns [`SnapshotError::Malformed`] when the file does not parse.
pub fn read_snapshot(feature_dir: &Path) -> Result<Option<Snapshot>, SnapshotError> {
    let path = snapshot_path(feature_dir);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(SnapshotError::Io { path, source }),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| SnapshotError::Malformed { path, source })
}
