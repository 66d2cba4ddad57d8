//! Append-only event store for one feature's `status.events.jsonl`.
//!
//! Guarantees:
//!
//! - Existing bytes are never truncated or rewritten.
//! - Each event is one JSON line, written with a single `write_all` on a file
//!   opened with `O_APPEND`, then flushed and synced. A returned `Ok` means
//!   the line is durable.
//! - Physical line order is preserved on read but carries no meaning for
//!   current state; see [`crate::reducer`].

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::ErrorCode;
use crate::event::Event;

/// File name of the event log inside a feature directory.
pub const EVENTS_FILE: &str = "status.events.jsonl";

/// Errors raised by the event store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("event log I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("serialized event contains a literal newline; one-line invariant violated")]
    NewlineInPayload,

    #[error("corrupt event at {}:{line}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Io { .. } => ErrorCode::EventLogWriteFailed,
            Self::Serialize(_) | Self::NewlineInPayload => ErrorCode::InternalUnexpected,
            Self::Corrupt { .. } => ErrorCode::CorruptEventLog,
        }
    }
}

/// Path of the event log for `feature_dir`.
#[must_use]
pub fn events_path(feature_dir: &Path) -> PathBuf {
    feature_dir.join(EVENTS_FILE)
}

/// Append one event as a JSON line, creating the log if absent.
///
/// If the existing file does not end in a newline (an interrupted writer, or
/// a merge that dropped the final newline) a separator is written first so
/// the new event never fuses with the previous line.
///
/// # Errors
///
/// Returns [`StoreError::Io`] if any filesystem step fails. The caller must
/// treat that as the transition not having happened.
pub fn append(feature_dir: &Path, event: &Event) -> Result<(), StoreError> {
    let line = event.to_json_line()?;
    if line[..line.len() - 1].contains('\n') {
        return Err(StoreError::NewlineInPayload);
    }

    let path = events_path(feature_dir);
    fs::create_dir_all(feature_dir).map_err(|e| StoreError::io(feature_dir, e))?;

    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(&path)
        .map_err(|e| StoreError::io(&path, e))?;

    let mut payload = String::with_capacity(line.len() + 1);
    if needs_separator(&mut file).map_err(|e| StoreError::io(&path, e))? {
        tracing::warn!(path = %path.display(), "event log lacked trailing newline; separating");
        payload.push('\n');
    }
    payload.push_str(&line);

    file.write_all(payload.as_bytes())
        .and_then(|()| file.flush())
        .and_then(|()| file.sync_data())
        .map_err(|e| StoreError::io(&path, e))?;

    tracing::debug!(
        event_id = %event.event_id,
        wp_id = %event.wp_id,
        to_lane = %event.to_lane,
        "appended event"
    );
    Ok(())
}

fn needs_separator(file: &mut fs::File) -> io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0_u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// Read every event in physical file order.
///
/// A missing log reads as empty. Blank lines are skipped. The returned order
/// is for display and audit only.
///
/// # Errors
///
/// Returns [`StoreError::Io`] if the file cannot be read and
/// [`StoreError::Corrupt`] for the first line that is not a valid event.
pub fn read_all(feature_dir: &Path) -> Result<Vec<Event>, StoreError> {
    let path = events_path(feature_dir);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(&path, e)),
    };
    parse_lines(&path, &content)
}

/// Read the events of one work package, in physical file order.
///
/// # Errors
///
/// Same as [`read_all`].
pub fn read_for_wp(feature_dir: &Path, wp_id: &str) -> Result<Vec<Event>, StoreError> {
    Ok(read_all(feature_dir)?
        .into_iter()
        .filter(|event| event.wp_id == wp_id)
        .collect())
}

fn parse_lines(path: &Path, content: &str) -> Result<Vec<Event>, StoreError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|source| StoreError::Corrupt {
                path: path.to_path_buf(),
                line: idx + 1,
                source,
            })
        })
        .collect()
}
