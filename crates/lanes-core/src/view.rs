//! Legacy read-view: the `lane:` key in task-file front matter.
//!
//! Older tooling reads a work package's lane from the YAML front matter of
//! `tasks/WP01-*.md`. The event log is authoritative; this view is only
//! rewritten after a successful append so those readers keep working.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::event::Event;

/// Directory of task files inside a feature directory.
pub const TASKS_DIR: &str = "tasks";

/// A derived view refreshed after each committed transition.
pub trait LegacyView: Send + Sync {
    /// # Errors
    ///
    /// Any failure to update the view. Callers log and continue.
    fn update(&self, feature_dir: &Path, event: &Event) -> Result<()>;
}

/// Rewrites `lane:` in the leading `---` block of the WP's task file.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrontmatterLaneView;

impl LegacyView for FrontmatterLaneView {
    fn update(&self, feature_dir: &Path, event: &Event) -> Result<()> {
        let Some(path) = find_task_file(&feature_dir.join(TASKS_DIR), &event.wp_id)? else {
            tracing::trace!(wp_id = %event.wp_id, "no task file; skipping front matter");
            return Ok(());
        };

        let content =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        let Some(updated) = set_frontmatter_lane(&content, event.to_lane.as_str()) else {
            tracing::debug!(path = %path.display(), "task file has no lane key");
            return Ok(());
        };
        if updated == content {
            return Ok(());
        }

        let tmp = path.with_extension("md.tmp");
        fs::write(&tmp, &updated).with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;

        tracing::debug!(path = %path.display(), lane = %event.to_lane, "updated front matter");
        Ok(())
    }
}

/// `tasks/{wp_id}.md`, else the first `tasks/{wp_id}-*.md` by name.
fn find_task_file(tasks_dir: &Path, wp_id: &str) -> Result<Option<PathBuf>> {
    let exact = tasks_dir.join(format!("{wp_id}.md"));
    if exact.is_file() {
        return Ok(Some(exact));
    }
    if !tasks_dir.is_dir() {
        return Ok(None);
    }

    let prefix = format!("{wp_id}-");
    let mut candidates: Vec<PathBuf> = fs::read_dir(tasks_dir)
        .with_context(|| format!("list {}", tasks_dir.display()))?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path.extension().is_some_and(|ext| ext == "md")
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(&prefix))
        })
        .collect();
    candidates.sort();
    Ok(candidates.into_iter().next())
}

/// Work package ids named by the task files of a feature. `WP01.md` and
/// `WP01-login-form.md` both name `WP01`.
#[must_use]
pub fn task_wp_ids(feature_dir: &Path) -> BTreeSet<String> {
    let tasks_dir = feature_dir.join(TASKS_DIR);
    let Ok(entries) = fs::read_dir(&tasks_dir) else {
        return BTreeSet::new();
    };
    entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "md"))
        .filter_map(|path| {
            let stem = path.file_stem()?.to_str()?;
            let wp_id = stem.split_once('-').map_or(stem, |(wp_id, _)| wp_id);
            (!wp_id.is_empty()).then(|| wp_id.to_string())
        })
        .collect()
}

/// Replace the value of the first top-level `lane:` key inside the leading
/// front-matter block. `None` when there is no block or no such key.
fn set_frontmatter_lane(content: &str, lane: &str) -> Option<String> {
    let mut lines = content.split_inclusive('\n');
    let opening = lines.next()?;
    if opening.trim_end() != "---" {
        return None;
    }

    let mut out = String::with_capacity(content.len() + lane.len());
    out.push_str(opening);
    let mut replaced = false;
    let mut closed = false;

    for line in lines.by_ref() {
        let body = line.trim_end_matches(['\r', '\n']);
        if body == "---" {
            if !replaced {
                return None;
            }
            out.push_str(line);
            closed = true;
            break;
        }
        if !replaced && body.starts_with("lane:") {
            let ending = &line[body.len()..];
            out.push_str("lane: \"");
            out.push_str(lane);
            out.push('"');
            out.push_str(ending);
            replaced = true;
        } else {
            out.push_str(line);
        }
    }

    if !closed {
        return None;
    }
    for rest in lines {
        out.push_str(rest);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{DEFAULT_EXECUTION_MODE, EventId};
    use crate::lane::Lane;
    use chrono::Utc;
    use tempfile::TempDir;

    fn event(wp_id: &str, to: Lane) -> Event {
        Event {
            event_id: EventId::generate(),
            feature_slug: "001-auth".into(),
            wp_id: wp_id.into(),
            from_lane: Lane::Planned,
            to_lane: to,
            at: Utc::now(),
            actor: "a1".into(),
            force: false,
            execution_mode: DEFAULT_EXECUTION_MODE.into(),
            reason: None,
            review_ref: None,
            evidence: None,
        }
    }

    #[test]
    fn rewrites_only_the_frontmatter_lane() {
        let content = "---\ntitle: Login\nlane: \"planned\"\n---\n\nlane: body text\n";
        let updated = set_frontmatter_lane(content, "claimed").expect("has lane");
        assert_eq!(
            updated,
            "---\ntitle: Login\nlane: \"claimed\"\n---\n\nlane: body text\n"
        );
    }

    #[test]
    fn preserves_crlf_line_endings() {
        let content = "---\r\nlane: planned\r\n---\r\n";
        let updated = set_frontmatter_lane(content, "done").expect("has lane");
        assert_eq!(updated, "---\r\nlane: \"done\"\r\n---\r\n");
    }

    #[test]
    fn no_frontmatter_or_no_lane_key_is_untouched() {
        assert!(set_frontmatter_lane("# Title\nlane: x\n", "done").is_none());
        assert!(set_frontmatter_lane("---\ntitle: x\n---\nlane: y\n", "done").is_none());
    }

    #[test]
    fn update_finds_prefixed_task_file() {
        let tmp = TempDir::new().expect("tempdir");
        let tasks = tmp.path().join(TASKS_DIR);
        fs::create_dir_all(&tasks).expect("mkdir");
        let task = tasks.join("WP01-login-form.md");
        fs::write(&task, "---\nwork_package_id: WP01\nlane: planned\n---\nBody\n").expect("write");
        fs::write(tasks.join("WP010-other.md"), "---\nlane: planned\n---\n").expect("write");

        FrontmatterLaneView
            .update(tmp.path(), &event("WP01", Lane::InProgress))
            .expect("update");

        let content = fs::read_to_string(&task).expect("read");
        assert!(content.contains("lane: \"in_progress\""));
        let other = fs::read_to_string(tasks.join("WP010-other.md")).expect("read");
        assert!(other.contains("lane: planned"));
    }

    #[test]
    fn task_files_name_their_work_packages() {
        let tmp = TempDir::new().expect("tempdir");
        let tasks = tmp.path().join(TASKS_DIR);
        fs::create_dir_all(&tasks).expect("mkdir");
        fs::write(tasks.join("WP01.md"), "").expect("write");
        fs::write(tasks.join("WP02-api.md"), "").expect("write");
        fs::write(tasks.join("notes.txt"), "").expect("write");

        let ids: Vec<String> = task_wp_ids(tmp.path()).into_iter().collect();
        assert_eq!(ids, vec!["WP01", "WP02"]);
        assert!(task_wp_ids(&tmp.path().join("missing")).is_empty());
    }

    #[test]
    fn missing_task_file_is_a_noop() {
        let tmp = TempDir::new().expect("tempdir");
        FrontmatterLaneView
            .update(tmp.path(), &event("WP09", Lane::Claimed))
            .expect("no-op");
    }
}
