//! Rendering for command results and errors.
//!
//! Handlers hand a serializable value plus human renderers to
//! [`render_mode`]; the resolved [`OutputMode`] picks which one runs.
//! Results go to stdout, errors to stderr, both in the same mode.
//!
//! The mode itself is resolved by `lanes_core::config::resolve_output`
//! (`--json` > `FORMAT` > user config > TTY detection).

use serde::Serialize;
use std::io::{self, Write};

use lanes_core::doctor::DoctorError;
use lanes_core::emit::EmitError;
use lanes_core::reducer::SnapshotError;
use lanes_core::rollback::RollbackError;
use lanes_core::store::StoreError;

const RULE: &str = "------------------------------------------------------------------------";

/// Heading line plus a rule underneath it.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}\n{RULE}")
}

/// `Key:        value` with the key padded to a fixed column.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    let label = format!("{key}:");
    writeln!(w, "{label:<12} {}", value.as_ref())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Sections and alignment for a terminal.
    Pretty,
    /// One record per line, tab separated.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputMode {
    /// Map a resolved mode name; unknown names fall back to text.
    pub fn from_resolved(name: &str) -> Self {
        match name {
            "json" => Self::Json,
            "pretty" => Self::Pretty,
            _ => Self::Text,
        }
    }
}

/// Write `value` to stdout: as JSON, or through the matching human renderer.
pub fn render_mode<T: Serialize>(
    mode: OutputMode,
    value: &T,
    text: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
    pretty: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    match mode {
        OutputMode::Json => writeln!(out, "{}", serde_json::to_string_pretty(value)?)?,
        OutputMode::Text => text(value, &mut out)?,
        OutputMode::Pretty => pretty(value, &mut out)?,
    }
    Ok(())
}

/// What a failed command reports: message, remediation, and a stable code.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Machine-readable error code (e.g. "E2004", "missing_actor").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CliError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            error_code: None,
        }
    }

    pub fn with_details(
        message: impl Into<String>,
        suggestion: impl Into<String>,
        error_code: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            suggestion: Some(suggestion.into()),
            error_code: Some(error_code.into()),
        }
    }

    /// Error carrying a core error code and its remediation hint.
    pub fn from_code(message: impl Into<String>, code: lanes_core::error::ErrorCode) -> Self {
        Self {
            message: message.into(),
            suggestion: code.hint().map(str::to_string),
            error_code: Some(code.code().to_string()),
        }
    }
}

impl From<&EmitError> for CliError {
    fn from(err: &EmitError) -> Self {
        Self::from_code(err.to_string(), err.code())
    }
}

impl From<&RollbackError> for CliError {
    fn from(err: &RollbackError) -> Self {
        Self::from_code(err.to_string(), err.code())
    }
}

impl From<&SnapshotError> for CliError {
    fn from(err: &SnapshotError) -> Self {
        Self::from_code(err.to_string(), err.code())
    }
}

impl From<&StoreError> for CliError {
    fn from(err: &StoreError) -> Self {
        Self::from_code(err.to_string(), err.code())
    }
}

impl From<&DoctorError> for CliError {
    fn from(err: &DoctorError) -> Self {
        Self::from_code(err.to_string(), err.code())
    }
}

/// Write `error` to stderr in `mode`. JSON is wrapped as `{"error": ...}`.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let mut out = io::stderr().lock();
    if mode == OutputMode::Json {
        let body = serde_json::to_string_pretty(&serde_json::json!({ "error": error }))?;
        writeln!(out, "{body}")?;
        return Ok(());
    }

    let code = error
        .error_code
        .as_deref()
        .map(|code| format!("[{code}]"))
        .unwrap_or_default();
    writeln!(out, "error{code}: {}", error.message)?;
    if let Some(suggestion) = &error.suggestion {
        writeln!(out, "  suggestion: {suggestion}")?;
    }
    Ok(())
}

/// Marker for an error that has already been shown to the user.
#[derive(Debug)]
pub struct Reported(pub String);

impl std::fmt::Display for Reported {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Reported {}

/// Render `error` to stderr and return it as an already-reported failure.
pub fn fail(mode: OutputMode, error: &CliError) -> anyhow::Error {
    if let Err(render_err) = render_error(mode, error) {
        tracing::debug!(error = %render_err, "could not render error");
    }
    anyhow::Error::new(Reported(error.message.clone()))
}
