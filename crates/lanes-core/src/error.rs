use std::fmt;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    FeatureNotFound,
    InvalidLane,
    IllegalTransition,
    MissingEvidence,
    MissingReviewRef,
    MissingReason,
    ForceRequiresActorAndReason,
    ClaimConflict,
    NothingToRollBack,
    HistoryChanged,
    CorruptEventLog,
    CorruptSnapshot,
    EventLogWriteFailed,
    LockContention,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::FeatureNotFound => "E1002",
            Self::InvalidLane => "E2001",
            Self::IllegalTransition => "E2002",
            Self::MissingEvidence => "E2003",
            Self::MissingReviewRef => "E2004",
            Self::MissingReason => "E2005",
            Self::ForceRequiresActorAndReason => "E2006",
            Self::ClaimConflict => "E2007",
            Self::NothingToRollBack => "E2008",
            Self::HistoryChanged => "E2009",
            Self::CorruptEventLog => "E3001",
            Self::CorruptSnapshot => "E3002",
            Self::EventLogWriteFailed => "E5001",
            Self::LockContention => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::FeatureNotFound => "Feature directory not found",
            Self::InvalidLane => "Unknown lane",
            Self::IllegalTransition => "Illegal lane transition",
            Self::MissingEvidence => "Done evidence missing or incomplete",
            Self::MissingReviewRef => "Review reference required",
            Self::MissingReason => "Reason required",
            Self::ForceRequiresActorAndReason => "Forced transition requires actor and reason",
            Self::ClaimConflict => "Work package claimed by another actor",
            Self::NothingToRollBack => "No transition to roll back",
            Self::HistoryChanged => "Work package changed by another writer",
            Self::CorruptEventLog => "Corrupt event log line",
            Self::CorruptSnapshot => "Corrupt status snapshot",
            Self::EventLogWriteFailed => "Event log write failed",
            Self::LockContention => "Lock contention",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .lanes/config.toml and retry."),
            Self::FeatureNotFound => Some("Check `--feature` and the configured features_dir."),
            Self::InvalidLane => Some(
                "Use one of: planned, claimed, in_progress (doing), for_review, done, blocked, canceled.",
            ),
            Self::IllegalTransition => Some(
                "Follow planned -> claimed -> in_progress -> for_review -> done, \
                 or pass `--force` with `--reason`.",
            ),
            Self::MissingEvidence => {
                Some("Supply `--reviewer`, `--verdict` and `--reference`, or `--force` with `--reason`.")
            }
            Self::MissingReviewRef => Some("Supply `--review-ref`, or `--force` with `--reason`."),
            Self::MissingReason => Some("Supply `--reason`, or `--force` with `--reason`."),
            Self::ForceRequiresActorAndReason => {
                Some("Forcing is audited: set `--actor` and a non-empty `--reason`.")
            }
            Self::ClaimConflict => Some(
                "Coordinate with the current holder, or pass `--force` with `--reason` to take over.",
            ),
            Self::NothingToRollBack => None,
            Self::HistoryChanged => Some("Check `lanes history` and retry."),
            Self::CorruptEventLog => {
                Some("Inspect the reported line; the log is append-only, fix it by hand and commit.")
            }
            Self::CorruptSnapshot => Some("Run `lanes materialize` to regenerate status.json."),
            Self::EventLogWriteFailed => Some("Check disk space and write permissions."),
            Self::LockContention => Some("Retry after the other `lanes` process releases its lock."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
