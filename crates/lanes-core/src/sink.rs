//! Optional downstream sync/telemetry sink.
//!
//! The emitter calls a sink at most once per committed transition, after the
//! event is durable. Sinks speak their own, usually coarser, lane vocabulary;
//! when both sides of a transition map to the same external lane, or either
//! side has no external lane at all, the call is skipped entirely.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::lane::Lane;

/// File name of the outbox written by [`OutboxSink`].
pub const OUTBOX_FILE: &str = "sync.outbox.jsonl";

/// What a sink is told about one committed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkNotification {
    pub feature_slug: String,
    pub wp_id: String,
    pub previous_lane: Lane,
    pub new_lane: Lane,
    pub actor: String,
}

/// A best-effort receiver of lane changes.
pub trait SyncSink: Send + Sync {
    /// The sink's own name for `lane`, or `None` if it has no equivalent.
    fn map_lane(&self, lane: Lane) -> Option<&'static str>;

    /// Deliver one notification. Errors are logged by the caller, never
    /// surfaced to the user.
    ///
    /// # Errors
    ///
    /// Any delivery failure.
    fn notify(&self, notification: &SinkNotification) -> Result<()>;

    /// Whether this transition is visible in the sink's vocabulary.
    fn is_relevant(&self, previous: Lane, new: Lane) -> bool {
        match (self.map_lane(previous), self.map_lane(new)) {
            (Some(previous), Some(new)) => previous != new,
            _ => false,
        }
    }
}

/// Appends notifications to `{features_root}/{feature_slug}/sync.outbox.jsonl`
/// for a separate process to ship.
///
/// Its vocabulary is that of a typical tracker board: `claimed` and
/// `in_progress` are both "in_progress", so a `start` after a `claim` is
/// never written.
#[derive(Debug, Clone)]
pub struct OutboxSink {
    features_root: PathBuf,
}

#[derive(Serialize)]
struct OutboxRecord<'a> {
    queued_at: DateTime<Utc>,
    feature_slug: &'a str,
    wp_id: &'a str,
    from: &'static str,
    to: &'static str,
    actor: &'a str,
}

impl OutboxSink {
    #[must_use]
    pub fn new(features_root: impl Into<PathBuf>) -> Self {
        Self {
            features_root: features_root.into(),
        }
    }

    #[must_use]
    pub fn outbox_path(&self, feature_slug: &str) -> PathBuf {
        self.features_root.join(feature_slug).join(OUTBOX_FILE)
    }
}

impl SyncSink for OutboxSink {
    fn map_lane(&self, lane: Lane) -> Option<&'static str> {
        match lane {
            Lane::Planned => Some("todo"),
            Lane::Claimed | Lane::InProgress => Some("in_progress"),
            Lane::ForReview => Some("in_review"),
            Lane::Done => Some("done"),
            Lane::Blocked => Some("blocked"),
            Lane::Canceled => Some("canceled"),
        }
    }

    fn notify(&self, notification: &SinkNotification) -> Result<()> {
        let path = self.outbox_path(&notification.feature_slug);
        let (Some(from), Some(to)) = (
            self.map_lane(notification.previous_lane),
            self.map_lane(notification.new_lane),
        ) else {
            anyhow::bail!(
                "no outbox lane for {} -> {}",
                notification.previous_lane,
                notification.new_lane
            );
        };
        let record = OutboxRecord {
            queued_at: Utc::now(),
            feature_slug: &notification.feature_slug,
            wp_id: &notification.wp_id,
            from,
            to,
            actor: &notification.actor,
        };
        let mut line = serde_json::to_string(&record).context("serialize outbox record")?;
        line.push('\n');

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        append_line(&path, &line).with_context(|| format!("append to {}", path.display()))?;

        tracing::debug!(
            wp_id = %notification.wp_id,
            outbox = %path.display(),
            "queued sync notification"
        );
        Ok(())
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    file.flush()
}
