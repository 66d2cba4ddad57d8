//! The closed set of work-package lanes.
//!
//! `doing` is accepted everywhere as an alias for `in_progress`: on input,
//! when reading persisted events, and in comparisons. It is never written
//! back out; the canonical spelling is always used for persistence.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A work package's position in its lifecycle state machine.
///
/// Declaration order is the canonical display order used for summaries.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    #[default]
    Planned,
    Claimed,
    #[serde(alias = "doing")]
    InProgress,
    ForReview,
    Done,
    Blocked,
    Canceled,
}

impl Lane {
    /// All lanes in canonical order.
    pub const ALL: [Self; 7] = [
        Self::Planned,
        Self::Claimed,
        Self::InProgress,
        Self::ForReview,
        Self::Done,
        Self::Blocked,
        Self::Canceled,
    ];

    /// Canonical persisted spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Claimed => "claimed",
            Self::InProgress => "in_progress",
            Self::ForReview => "for_review",
            Self::Done => "done",
            Self::Blocked => "blocked",
            Self::Canceled => "canceled",
        }
    }

    /// Lanes a work package never leaves without a forced transition.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Canceled)
    }

    /// Lanes in which an actor is actively holding the work package.
    #[must_use]
    pub const fn is_actively_held(self) -> bool {
        matches!(self, Self::Claimed | Self::InProgress)
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a lane name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLane {
    pub raw: String,
}

impl fmt::Display for UnknownLane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown lane '{}': expected one of planned, claimed, in_progress (doing), \
             for_review, done, blocked, canceled",
            self.raw
        )
    }
}

impl std::error::Error for UnknownLane {}

/// Map lane aliases onto their canonical spelling.
///
/// Unknown input is returned trimmed and lowercased so the caller can report it.
#[must_use]
pub fn normalize_lane(input: &str) -> String {
    let lowered = input.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "doing" => Lane::InProgress.as_str().to_string(),
        _ => lowered,
    }
}

impl FromStr for Lane {
    type Err = UnknownLane;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_lane(s).as_str() {
            "planned" => Ok(Self::Planned),
            "claimed" => Ok(Self::Claimed),
            "in_progress" => Ok(Self::InProgress),
            "for_review" => Ok(Self::ForReview),
            "done" => Ok(Self::Done),
            "blocked" => Ok(Self::Blocked),
            "canceled" => Ok(Self::Canceled),
            _ => Err(UnknownLane { raw: s.to_string() }),
        }
    }
}
