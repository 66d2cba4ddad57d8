//! Compensating transitions.
//!
//! The log is never edited, so undoing a transition means appending a new,
//! forced event that moves the WP back to the lane its latest event came
//! from. The emit is pinned to that latest event, so a transition appended
//! by another writer in between fails the rollback instead of being undone
//! under the wrong name.

use std::path::Path;

use crate::emit::{EmitError, EmitRequest, Emitter};
use crate::error::ErrorCode;
use crate::event::Event;
use crate::guard::TransitionError;
use crate::reducer::latest_event;
use crate::store::{self, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum RollbackError {
    #[error("{wp_id} has no transitions to roll back")]
    NothingToRollBack { wp_id: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Emit(#[from] EmitError),
}

impl RollbackError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NothingToRollBack { .. } => ErrorCode::NothingToRollBack,
            Self::Store(e) => e.code(),
            Self::Emit(e) => e.code(),
        }
    }
}

/// Append a forced event returning `wp_id` to the `from_lane` of its latest
/// event. The new event's reason is `rollback of {event_id}: {reason}`.
///
/// # Errors
///
/// [`RollbackError::NothingToRollBack`] when the WP has no events, an audit
/// failure when `actor` or `reason` is blank, [`EmitError::HistoryChanged`]
/// when another transition lands first, and any other [`EmitError`] from the
/// append itself.
pub fn rollback(
    emitter: &Emitter,
    feature_dir: &Path,
    feature_slug: &str,
    wp_id: &str,
    actor: &str,
    reason: &str,
) -> Result<Event, RollbackError> {
    if actor.trim().is_empty() || reason.trim().is_empty() {
        return Err(EmitError::Transition(TransitionError::ForceRequiresActorAndReason).into());
    }

    let history = store::read_for_wp(feature_dir, wp_id)?;
    let Some(latest) = latest_event(&history) else {
        return Err(RollbackError::NothingToRollBack {
            wp_id: wp_id.to_string(),
        });
    };

    tracing::info!(
        %wp_id,
        undoing = %latest.event_id,
        back_to = %latest.from_lane,
        "rolling back"
    );

    let request = EmitRequest::new(feature_slug, wp_id, latest.from_lane.as_str(), actor)
        .with_force(true)
        .with_reason(format!("rollback of {}: {reason}", latest.event_id))
        .with_execution_mode(latest.execution_mode.clone())
        .expecting_latest(latest.event_id.clone());
    Ok(emitter.emit(feature_dir, &request)?)
}
