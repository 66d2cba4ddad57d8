//! Guard engine: decides whether a proposed lane transition is legal.
//!
//! [`validate`] is a pure function. It performs no I/O and has no side
//! effects, so the orchestrator can run it strictly before the first write.
//!
//! Non-forced transitions must follow the adjacency table:
//!
//! ```text
//! planned    -> claimed
//! claimed    -> in_progress
//! in_progress-> for_review
//! for_review -> in_progress   (needs review_ref)
//! for_review -> planned       (needs review_ref)
//! for_review -> done          (needs evidence)
//! X          -> X             (no-op)
//! ```
//!
//! Field guards sit on top of adjacency: `done` needs well-formed evidence,
//! the two review-origin edges need a `review_ref`, and
//! `in_progress -> planned` needs a reason. `force` bypasses both layers but
//! always demands a non-empty actor and reason so the override is audited in
//! the log itself.

use crate::error::ErrorCode;
use crate::event::DoneEvidence;
use crate::lane::{Lane, normalize_lane};

/// A proposed transition, borrowed from the caller.
#[derive(Debug, Clone, Copy)]
pub struct TransitionRequest<'a> {
    pub current: Lane,
    /// Raw requested lane; aliases are normalized before any check.
    pub requested: &'a str,
    pub force: bool,
    pub actor: &'a str,
    pub reason: Option<&'a str>,
    pub evidence: Option<&'a DoneEvidence>,
    pub review_ref: Option<&'a str>,
}

/// Why a transition was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("unknown lane '{raw}'")]
    InvalidLane { raw: String },

    #[error("transition {from} -> {to} is not allowed without --force")]
    IllegalTransition { from: Lane, to: Lane },

    #[error("moving to done requires evidence: missing `{field}`")]
    MissingEvidence { field: &'static str },

    #[error("transition {from} -> {to} requires a review reference")]
    MissingReviewRef { from: Lane, to: Lane },

    #[error("transition {from} -> {to} requires a reason")]
    MissingReason { from: Lane, to: Lane },

    #[error("forced transitions require a non-empty actor and reason")]
    ForceRequiresActorAndReason,
}

impl TransitionError {
    /// Machine-readable code associated with this rejection.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidLane { .. } => ErrorCode::InvalidLane,
            Self::IllegalTransition { .. } => ErrorCode::IllegalTransition,
            Self::MissingEvidence { .. } => ErrorCode::MissingEvidence,
            Self::MissingReviewRef { .. } => ErrorCode::MissingReviewRef,
            Self::MissingReason { .. } => ErrorCode::MissingReason,
            Self::ForceRequiresActorAndReason => ErrorCode::ForceRequiresActorAndReason,
        }
    }

    /// Concrete remediation for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

/// Whether `from -> to` is on the non-forced adjacency table.
#[must_use]
pub const fn is_adjacent(from: Lane, to: Lane) -> bool {
    matches!(
        (from, to),
        (Lane::Planned, Lane::Claimed)
            | (Lane::Claimed, Lane::InProgress)
            | (Lane::InProgress, Lane::ForReview)
            | (Lane::ForReview, Lane::InProgress | Lane::Planned | Lane::Done)
            | (Lane::Planned, Lane::Planned)
            | (Lane::Claimed, Lane::Claimed)
            | (Lane::InProgress, Lane::InProgress)
            | (Lane::ForReview, Lane::ForReview)
            | (Lane::Done, Lane::Done)
            | (Lane::Blocked, Lane::Blocked)
            | (Lane::Canceled, Lane::Canceled)
    )
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

/// Validate a proposed transition.
///
/// Returns the normalized target lane on success.
///
/// # Errors
///
/// Returns the [`TransitionError`] for the first guard that fails.
pub fn validate(request: &TransitionRequest<'_>) -> Result<Lane, TransitionError> {
    let target: Lane =
        normalize_lane(request.requested)
            .parse()
            .map_err(|_| TransitionError::InvalidLane {
                raw: request.requested.to_string(),
            })?;
    let from = request.current;

    if request.force {
        if request.actor.trim().is_empty() || is_blank(request.reason) {
            return Err(TransitionError::ForceRequiresActorAndReason);
        }
        return Ok(target);
    }

    if !is_adjacent(from, target) {
        return Err(TransitionError::IllegalTransition { from, to: target });
    }

    if target == Lane::Done {
        let evidence = request
            .evidence
            .ok_or(TransitionError::MissingEvidence { field: "evidence" })?;
        evidence
            .validate()
            .map_err(|e| TransitionError::MissingEvidence { field: e.field })?;
    }

    if from == Lane::ForReview
        && matches!(target, Lane::InProgress | Lane::Planned)
        && is_blank(request.review_ref)
    {
        return Err(TransitionError::MissingReviewRef { from, to: target });
    }

    if from == Lane::InProgress && target == Lane::Planned && is_blank(request.reason) {
        return Err(TransitionError::MissingReason { from, to: target });
    }

    Ok(target)
}
