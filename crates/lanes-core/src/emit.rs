//! Emission orchestrator: the only code path that writes lane events.
//!
//! Pipeline for one request:
//!
//! 1. take the feature's emit lock (when enabled)
//! 2. reduce the WP's existing events to find `from_lane`
//! 3. run the guard, then the claim-conflict check
//! 4. build the event with a fresh id and the current UTC time
//! 5. durably append it; this is the commit point
//! 6. run each [`PostCommit`] effect in order, logging failures
//!
//! Steps 1 through 4 write nothing, so any rejection leaves the log
//! byte-for-byte unchanged. After step 5 the transition is final and
//! [`Emitter::emit`] returns `Ok` whatever the effects do. The lock is
//! released only after step 6, so effects from two local writers never
//! interleave.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;

use crate::config::ProjectConfig;
use crate::error::ErrorCode;
use crate::event::{DEFAULT_EXECUTION_MODE, DoneEvidence, Event, EventId};
use crate::guard::{self, TransitionError, TransitionRequest};
use crate::lane::Lane;
use crate::lock::{EmitLock, LockError};
use crate::reducer::{self, latest_event};
use crate::sink::{OutboxSink, SinkNotification, SyncSink};
use crate::store::{self, StoreError};
use crate::view::{FrontmatterLaneView, LegacyView};

/// How long `emit` waits for another local writer before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Parameters of one transition request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitRequest {
    pub feature_slug: String,
    pub wp_id: String,
    /// Raw target lane; aliases such as `doing` are accepted.
    pub to_lane: String,
    pub actor: String,
    pub force: bool,
    pub reason: Option<String>,
    pub evidence: Option<DoneEvidence>,
    pub review_ref: Option<String>,
    pub execution_mode: String,
    /// Reject unless the WP's latest event is still this one.
    pub expected_latest: Option<EventId>,
}

impl EmitRequest {
    pub fn new(
        feature_slug: impl Into<String>,
        wp_id: impl Into<String>,
        to_lane: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            feature_slug: feature_slug.into(),
            wp_id: wp_id.into(),
            to_lane: to_lane.into(),
            actor: actor.into(),
            force: false,
            reason: None,
            evidence: None,
            review_ref: None,
            execution_mode: DEFAULT_EXECUTION_MODE.to_string(),
            expected_latest: None,
        }
    }

    #[must_use]
    pub const fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[must_use]
    pub fn with_evidence(mut self, evidence: DoneEvidence) -> Self {
        self.evidence = Some(evidence);
        self
    }

    #[must_use]
    pub fn with_review_ref(mut self, review_ref: impl Into<String>) -> Self {
        self.review_ref = Some(review_ref.into());
        self
    }

    #[must_use]
    pub fn with_execution_mode(mut self, mode: impl Into<String>) -> Self {
        self.execution_mode = mode.into();
        self
    }

    /// Only record the transition if `event_id` is still the WP's latest
    /// event when the log is read under the lock.
    #[must_use]
    pub fn expecting_latest(mut self, event_id: EventId) -> Self {
        self.expected_latest = Some(event_id);
        self
    }
}

/// Why `emit` did not record a transition.
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("{wp_id} is held by '{holder}'")]
    ClaimConflict { wp_id: String, holder: String },

    #[error("{wp_id} changed since {expected} was read (latest is now {})", found.as_ref().map_or("none", EventId::as_str))]
    HistoryChanged {
        wp_id: String,
        expected: EventId,
        found: Option<EventId>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lock(#[from] LockError),
}

impl EmitError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Transition(e) => e.code(),
            Self::ClaimConflict { .. } => ErrorCode::ClaimConflict,
            Self::HistoryChanged { .. } => ErrorCode::HistoryChanged,
            Self::Store(e) => e.code(),
            Self::Lock(e) => e.code(),
        }
    }

    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

/// Best-effort work that runs after the append, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostCommit {
    Materialize,
    SyncSink,
    LegacyView,
}

impl PostCommit {
    pub const ALL: [Self; 3] = [Self::Materialize, Self::SyncSink, Self::LegacyView];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Materialize => "materialize",
            Self::SyncSink => "sync_sink",
            Self::LegacyView => "legacy_view",
        }
    }
}

/// The single writer of lane events, configured once with its optional
/// capabilities.
pub struct Emitter {
    sink: Option<Box<dyn SyncSink>>,
    legacy_view: Option<Box<dyn LegacyView>>,
    lock_timeout: Option<Duration>,
    effects: Vec<PostCommit>,
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("sink", &self.sink.is_some())
            .field("legacy_view", &self.legacy_view.is_some())
            .field("lock_timeout", &self.lock_timeout)
            .field("effects", &self.effects)
            .finish()
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Emitter {
    /// Emitter with the local lock on, no sink, and no legacy view.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sink: None,
            legacy_view: None,
            lock_timeout: Some(DEFAULT_LOCK_TIMEOUT),
            effects: PostCommit::ALL.to_vec(),
        }
    }

    /// Emitter wired from project configuration.
    #[must_use]
    pub fn from_config(config: &ProjectConfig, repo_root: &Path) -> Self {
        let mut emitter = Self::new();
        if !config.emit.claim_lock {
            emitter = emitter.without_lock();
        }
        if config.sync.outbox {
            emitter = emitter.with_sink(Box::new(OutboxSink::new(config.features_root(repo_root))));
        }
        if config.emit.legacy_frontmatter {
            emitter = emitter.with_legacy_view(Box::new(FrontmatterLaneView));
        }
        emitter
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn SyncSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn with_legacy_view(mut self, view: Box<dyn LegacyView>) -> Self {
        self.legacy_view = Some(view);
        self
    }

    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn without_lock(mut self) -> Self {
        self.lock_timeout = None;
        self
    }

    /// Replace the post-commit effect list.
    #[must_use]
    pub fn with_effects(mut self, effects: impl IntoIterator<Item = PostCommit>) -> Self {
        self.effects = effects.into_iter().collect();
        self
    }

    #[must_use]
    pub fn effects(&self) -> &[PostCommit] {
        &self.effects
    }

    /// Validate and record one transition.
    ///
    /// # Errors
    ///
    /// - [`EmitError::Transition`] if a guard rejects the request
    /// - [`EmitError::ClaimConflict`] if another actor holds the WP
    /// - [`EmitError::HistoryChanged`] if `expected_latest` is set and stale
    /// - [`EmitError::Lock`] if the emit lock is contended past its timeout
    /// - [`EmitError::Store`] if the log cannot be read or the append fails
    ///
    /// In every error case the event log is left untouched.
    pub fn emit(&self, feature_dir: &Path, request: &EmitRequest) -> Result<Event, EmitError> {
        let lock = self
            .lock_timeout
            .map(|timeout| EmitLock::acquire(feature_dir, timeout))
            .transpose()?;

        let history = store::read_for_wp(feature_dir, &request.wp_id)?;
        let latest = latest_event(&history);
        if let Some(expected) = &request.expected_latest {
            let found = latest.map(|event| &event.event_id);
            if found != Some(expected) {
                tracing::debug!(wp_id = %request.wp_id, %expected, "history changed before emit");
                return Err(EmitError::HistoryChanged {
                    wp_id: request.wp_id.clone(),
                    expected: expected.clone(),
                    found: found.cloned(),
                });
            }
        }
        let from_lane = latest.map_or(Lane::Planned, |event| event.to_lane);

        let to_lane = guard::validate(&TransitionRequest {
            current: from_lane,
            requested: &request.to_lane,
            force: request.force,
            actor: &request.actor,
            reason: request.reason.as_deref(),
            evidence: request.evidence.as_ref(),
            review_ref: request.review_ref.as_deref(),
        })
        .inspect_err(|err| {
            tracing::debug!(wp_id = %request.wp_id, %from_lane, error = %err, "transition rejected");
        })?;

        if let Some(holder) = conflicting_holder(latest, to_lane, request) {
            tracing::debug!(wp_id = %request.wp_id, %holder, "claim conflict");
            return Err(EmitError::ClaimConflict {
                wp_id: request.wp_id.clone(),
                holder: holder.to_string(),
            });
        }

        let event = Event {
            event_id: EventId::generate_after(latest.map(|event| &event.event_id)),
            feature_slug: request.feature_slug.clone(),
            wp_id: request.wp_id.clone(),
            from_lane,
            to_lane,
            at: Utc::now(),
            actor: request.actor.clone(),
            force: request.force,
            execution_mode: request.execution_mode.clone(),
            reason: request.reason.clone(),
            review_ref: request.review_ref.clone(),
            evidence: request.evidence.clone(),
        };

        store::append(feature_dir, &event)?;

        tracing::info!(
            wp_id = %event.wp_id,
            event_id = %event.event_id,
            from = %event.from_lane,
            to = %event.to_lane,
            actor = %event.actor,
            force = event.force,
            "transition recorded"
        );

        for effect in &self.effects {
            if let Err(err) = self.run_effect(*effect, feature_dir, &event) {
                tracing::warn!(
                    effect = effect.name(),
                    wp_id = %event.wp_id,
                    event_id = %event.event_id,
                    error = %format!("{err:#}"),
                    "post-commit effect failed; continuing"
                );
            }
        }
        drop(lock);

        Ok(event)
    }

    fn run_effect(&self, effect: PostCommit, feature_dir: &Path, event: &Event) -> anyhow::Result<()> {
        match effect {
            PostCommit::Materialize => {
                reducer::materialize(feature_dir).context("materialize status.json")?;
            }
            PostCommit::SyncSink => {
                let Some(sink) = &self.sink else {
                    return Ok(());
                };
                if !sink.is_relevant(event.from_lane, event.to_lane) {
                    tracing::trace!(wp_id = %event.wp_id, "transition invisible to sink; skipping");
                    return Ok(());
                }
                sink.notify(&SinkNotification {
                    feature_slug: event.feature_slug.clone(),
                    wp_id: event.wp_id.clone(),
                    previous_lane: event.from_lane,
                    new_lane: event.to_lane,
                    actor: event.actor.clone(),
                })?;
            }
            PostCommit::LegacyView => {
                if let Some(view) = &self.legacy_view {
                    view.update(feature_dir, event)?;
                }
            }
        }
        Ok(())
    }
}

/// The other actor actively holding the WP, if this request would take it
/// over without `force`.
fn conflicting_holder<'a>(
    latest: Option<&'a Event>,
    to_lane: Lane,
    request: &EmitRequest,
) -> Option<&'a str> {
    let latest = latest?;
    let contested = !request.force
        && to_lane.is_actively_held()
        && latest.to_lane.is_actively_held()
        && latest.actor != request.actor;
    contested.then_some(latest.actor.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducer::read_snapshot;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingSink {
        seen: Arc<Mutex<Vec<SinkNotification>>>,
    }

    impl SyncSink for RecordingSink {
        fn map_lane(&self, lane: Lane) -> Option<&'static str> {
            OutboxSink::new("/unused").map_lane(lane)
        }

        fn notify(&self, notification: &SinkNotification) -> anyhow::Result<()> {
            self.seen
                .lock()
                .map_err(|_| anyhow::anyhow!("poisoned"))?
                .push(notification.clone());
            Ok(())
        }
    }

    struct FailingSink;

    impl SyncSink for FailingSink {
        fn map_lane(&self, lane: Lane) -> Option<&'static str> {
            Some(lane.as_str())
        }

        fn notify(&self, _: &SinkNotification) -> anyhow::Result<()> {
            anyhow::bail!("sink offline")
        }
    }

    struct FailingView;

    impl LegacyView for FailingView {
        fn update(&self, _: &Path, _: &Event) -> anyhow::Result<()> {
            anyhow::bail!("task file is read-only")
        }
    }

    /// Records whether the emit lock was free while the view ran.
    #[derive(Default)]
    struct LockCheckingView {
        lock_was_free: Arc<Mutex<Option<bool>>>,
    }

    impl LegacyView for LockCheckingView {
        fn update(&self, feature_dir: &Path, _: &Event) -> anyhow::Result<()> {
            let free = EmitLock::acquire(feature_dir, Duration::from_millis(10)).is_ok();
            *self
                .lock_was_free
                .lock()
                .map_err(|_| anyhow::anyhow!("poisoned"))? = Some(free);
            Ok(())
        }
    }

    fn request(to: &str, actor: &str) -> EmitRequest {
        EmitRequest::new("001-auth", "WP01", to, actor)
    }

    #[test]
    fn first_event_starts_from_planned() {
        let tmp = TempDir::new().expect("tempdir");
        let event = Emitter::new()
            .emit(tmp.path(), &request("claimed", "a1"))
            .expect("emit");
        assert_eq!(event.from_lane, Lane::Planned);
        assert_eq!(event.to_lane, Lane::Claimed);
        assert_eq!(event.execution_mode, "worktree");
        assert!(!event.force);
    }

    #[test]
    fn rejection_leaves_log_absent() {
        let tmp = TempDir::new().expect("tempdir");
        let err = Emitter::new()
            .emit(tmp.path(), &request("done", "a1"))
            .unwrap_err();
        assert!(matches!(
            err,
            EmitError::Transition(TransitionError::IllegalTransition { .. })
        ));
        assert!(!store::events_path(tmp.path()).exists());
    }

    #[test]
    fn snapshot_follows_each_commit() {
        let tmp = TempDir::new().expect("tempdir");
        let emitter = Emitter::new();
        emitter.emit(tmp.path(), &request("claimed", "a1")).expect("claim");
        emitter.emit(tmp.path(), &request("doing", "a1")).expect("start");

        let snapshot = read_snapshot(tmp.path()).expect("read").expect("present");
        assert_eq!(snapshot.lane_of("WP01"), Lane::InProgress);
        assert_eq!(snapshot.event_count, 2);
    }

    #[test]
    fn other_actor_cannot_take_a_held_wp() {
        let tmp = TempDir::new().expect("tempdir");
        let emitter = Emitter::new();
        emitter.emit(tmp.path(), &request("claimed", "a1")).expect("claim");
        let before = fs::read(store::events_path(tmp.path())).expect("read");

        let err = emitter
            .emit(tmp.path(), &request("in_progress", "a2"))
            .unwrap_err();
        assert!(matches!(
            &err,
            EmitError::ClaimConflict { holder, .. } if holder == "a1"
        ));
        assert_eq!(err.code(), ErrorCode::ClaimConflict);
        assert_eq!(fs::read(store::events_path(tmp.path())).expect("read"), before);

        let forced = emitter
            .emit(
                tmp.path(),
                &request("in_progress", "a2")
                    .with_force(true)
                    .with_reason("a1 went dark"),
            )
            .expect("forced takeover");
        assert!(forced.force);
        assert_eq!(forced.actor, "a2");
    }

    #[test]
    fn sink_failure_does_not_fail_the_emit() {
        let tmp = TempDir::new().expect("tempdir");
        let emitter = Emitter::new().with_sink(Box::new(FailingSink));
        let event = emitter.emit(tmp.path(), &request("claimed", "a1")).expect("emit");
        assert_eq!(store::read_all(tmp.path()).expect("read"), vec![event]);
    }

    #[test]
    fn legacy_view_failure_does_not_fail_the_emit() {
        let tmp = TempDir::new().expect("tempdir");
        let emitter = Emitter::new().with_legacy_view(Box::new(FailingView));
        let event = emitter.emit(tmp.path(), &request("claimed", "a1")).expect("emit");
        assert_eq!(store::read_all(tmp.path()).expect("read"), vec![event]);
        let snapshot = read_snapshot(tmp.path()).expect("read").expect("present");
        assert_eq!(snapshot.lane_of("WP01"), Lane::Claimed);
    }

    #[test]
    fn effects_run_under_the_emit_lock() {
        let tmp = TempDir::new().expect("tempdir");
        let lock_was_free = Arc::new(Mutex::new(None));
        let emitter = Emitter::new().with_legacy_view(Box::new(LockCheckingView {
            lock_was_free: Arc::clone(&lock_was_free),
        }));

        emitter.emit(tmp.path(), &request("claimed", "a1")).expect("emit");
        assert_eq!(*lock_was_free.lock().expect("lock"), Some(false));
        EmitLock::acquire(tmp.path(), Duration::from_millis(10)).expect("released after emit");
    }

    #[test]
    fn stale_expected_latest_is_rejected_before_writing() {
        let tmp = TempDir::new().expect("tempdir");
        let emitter = Emitter::new();
        let claimed = emitter.emit(tmp.path(), &request("claimed", "a1")).expect("claim");

        let err = emitter
            .emit(
                tmp.path(),
                &request("in_progress", "a1").expecting_latest(EventId::from_parts(1, 0)),
            )
            .unwrap_err();
        assert!(matches!(
            &err,
            EmitError::HistoryChanged { found: Some(found), .. } if *found == claimed.event_id
        ));
        assert_eq!(store::read_all(tmp.path()).expect("read").len(), 1);

        emitter
            .emit(
                tmp.path(),
                &request("in_progress", "a1").expecting_latest(claimed.event_id),
            )
            .expect("matching expectation");
    }

    #[test]
    fn sink_is_skipped_for_invisible_transitions() {
        let tmp = TempDir::new().expect("tempdir");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let emitter = Emitter::new().with_sink(Box::new(RecordingSink {
            seen: Arc::clone(&seen),
        }));

        emitter.emit(tmp.path(), &request("claimed", "a1")).expect("claim");
        emitter.emit(tmp.path(), &request("in_progress", "a1")).expect("start");
        emitter.emit(tmp.path(), &request("for_review", "a1")).expect("review");

        let seen = seen.lock().expect("lock");
        let lanes: Vec<(Lane, Lane)> = seen
            .iter()
            .map(|n| (n.previous_lane, n.new_lane))
            .collect();
        assert_eq!(
            lanes,
            vec![
                (Lane::Planned, Lane::Claimed),
                (Lane::InProgress, Lane::ForReview)
            ]
        );
    }

    #[test]
    fn materialize_failure_is_swallowed() {
        let tmp = TempDir::new().expect("tempdir");
        // A directory where status.json should go makes the rename fail.
        fs::create_dir_all(reducer::snapshot_path(tmp.path())).expect("mkdir");

        let event = Emitter::new()
            .emit(tmp.path(), &request("claimed", "a1"))
            .expect("emit still succeeds");
        assert_eq!(store::read_all(tmp.path()).expect("read"), vec![event]);
    }

    #[test]
    fn held_lock_rejects_before_writing() {
        let tmp = TempDir::new().expect("tempdir");
        let _held = EmitLock::acquire(tmp.path(), Duration::from_millis(50)).expect("lock");

        let err = Emitter::new()
            .with_lock_timeout(Duration::from_millis(20))
            .emit(tmp.path(), &request("claimed", "a1"))
            .unwrap_err();
        assert!(matches!(err, EmitError::Lock(LockError::Timeout { .. })));
        assert!(!store::events_path(tmp.path()).exists());
    }

    #[test]
    fn config_wires_capabilities() {
        let tmp = TempDir::new().expect("tempdir");
        let mut config = ProjectConfig::default();
        config.sync.outbox = true;
        config.emit.claim_lock = false;

        let emitter = Emitter::from_config(&config, tmp.path());
        let feature_dir = config.feature_dir(tmp.path(), "001-auth");
        emitter.emit(&feature_dir, &request("claimed", "a1")).expect("emit");

        assert!(feature_dir.join(crate::sink::OUTBOX_FILE).exists());
        assert!(!feature_dir.join(crate::lock::LOCK_FILE).exists());
    }
}
