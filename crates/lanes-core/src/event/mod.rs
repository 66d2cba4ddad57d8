//! Event data model for the lane event log.
//!
//! Each line of `status.events.jsonl` is one [`Event`]: an immutable record
//! of a single lane transition for one work package. Events are never edited
//! or deleted; a work package's current lane is derived by replaying them
//! (see [`crate::reducer`]).
//!
//! # Line format
//!
//! ```text
//! {"event_id":"01J...","feature_slug":"...","wp_id":"WP01","from_lane":"planned",
//!  "to_lane":"claimed","at":"2026-...Z","actor":"a1","force":false,
//!  "execution_mode":"worktree"}
//! ```
//!
//! `reason`, `review_ref` and `evidence` are omitted when absent.

pub mod evidence;
pub mod id;

pub use evidence::{DoneEvidence, EvidenceError, RepoEvidence, ReviewApproval, VerificationResult};
pub use id::{EVENT_ID_LEN, EventId, InvalidEventId};

use crate::lane::Lane;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default execution mode recorded on events.
pub const DEFAULT_EXECUTION_MODE: &str = "worktree";

/// A single lane transition in the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Time-sortable identity; the sole ordering key for replay.
    pub event_id: EventId,

    pub feature_slug: String,

    pub wp_id: String,

    /// Lane the work package was in when the transition was accepted.
    pub from_lane: Lane,

    pub to_lane: Lane,

    /// UTC wall-clock time of the transition.
    pub at: DateTime<Utc>,

    pub actor: String,

    /// True when adjacency and field guards were bypassed.
    pub force: bool,

    /// Free-form, e.g. `worktree` or `direct_repo`.
    pub execution_mode: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_ref: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<DoneEvidence>,
}

impl Event {
    /// Serialize to one JSON line, newline-terminated.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}\t{}\t{} -> {}\t{}{}",
            self.event_id,
            self.wp_id,
            self.from_lane,
            self.to_lane,
            self.actor,
            if self.force { "\t(forced)" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_event() -> Event {
        Event {
            event_id: EventId::from_parts(1_760_000_000_000, 1),
            feature_slug: "001-auth".into(),
            wp_id: "WP01".into(),
            from_lane: Lane::Planned,
            to_lane: Lane::Claimed,
            at: Utc
                .with_ymd_and_hms(2026, 10, 1, 12, 0, 0)
                .single()
                .expect("valid timestamp"),
            actor: "claude-abc".into(),
            force: false,
            execution_mode: DEFAULT_EXECUTION_MODE.into(),
            reason: None,
            review_ref: None,
            evidence: None,
        }
    }

    #[test]
    fn json_line_is_single_line_and_newline_terminated() {
        let line = sample_event().to_json_line().expect("serialize");
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn absent_optionals_are_omitted() {
        let line = sample_event().to_json_line().expect("serialize");
        assert!(!line.contains("reason"));
        assert!(!line.contains("review_ref"));
        assert!(!line.contains("evidence"));
        assert!(line.contains("\"from_lane\":\"planned\""));
        assert!(line.contains("\"at\":\"2026-10-01T12:00:00Z\""));
    }

    #[test]
    fn persisted_doing_alias_reads_as_in_progress() {
        let json = r#"{"event_id":"01HV0000000000000000000001","feature_slug":"f","wp_id":"WP01",
            "from_lane":"claimed","to_lane":"doing","at":"2026-10-01T12:00:00Z",
            "actor":"a1","force":false,"execution_mode":"worktree"}"#;
        let event: Event = serde_json::from_str(json).expect("deserialize");
        assert_eq!(event.to_lane, Lane::InProgress);
        assert!(event.evidence.is_none());
    }

    #[test]
    fn evidence_roundtrips_exactly() {
        let mut event = sample_event();
        event.to_lane = Lane::Done;
        event.evidence = Some(
            DoneEvidence::new("r1", "approved", "PR#1")
                .expect("valid")
                .with_repo("core", "main", "abc123"),
        );
        let line = event.to_json_line().expect("serialize");
        let back: Event = serde_json::from_str(line.trim_end()).expect("deserialize");
        assert_eq!(back, event);
    }

    #[test]
    fn display_marks_forced_events() {
        let mut event = sample_event();
        assert!(!event.to_string().contains("forced"));
        event.force = true;
        assert!(event.to_string().contains("(forced)"));
    }
}
