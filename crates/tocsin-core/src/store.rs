use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::filter::Filter;
use crate::task::{Task, TaskDraft, TaskPatch};

pub const TASKS_FILE: &str = "tasks.json";

/// Completed-versus-total counts reported to the UI after every mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub percent: u32,
}

#[derive(Debug)]
pub struct TaskStore {
    path: PathBuf,
    tasks: Vec<Task>,
}

impl TaskStore {
    /// Opens the store under `data_dir`, loading whatever state survives.
    /// A missing file is an empty list; a corrupt payload is discarded and
    /// replaced with an empty list rather than surfaced as an error.
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;
        let path = data_dir.join(TASKS_FILE);
        let tasks = load_tasks(&path);

        info!(
            file = %path.display(),
            count = tasks.len(),
            "opened task store"
        );
        Ok(Self { path, tasks })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// Ids come from the clock in epoch milliseconds, bumped past the
    /// current maximum so two creations in the same millisecond (or a
    /// clock step backwards) still yield unique, increasing ids.
    pub fn next_id(&self, now: DateTime<Utc>) -> u64 {
        let stamp = now.timestamp_millis().max(0) as u64;
        let ceiling = self.tasks.iter().map(|task| task.id).max().unwrap_or(0);
        stamp.max(ceiling + 1)
    }

    #[tracing::instrument(skip(self, draft), fields(text = %draft.text))]
    pub fn add(&mut self, draft: TaskDraft, now: DateTime<Utc>) -> u64 {
        let id = self.next_id(now);
        self.tasks.push(Task::new(id, draft));
        debug!(id, count = self.tasks.len(), "task added");
        id
    }

    /// Applies a partial update. Changing the due date clears
    /// `due_reminder_sent` so the new date earns its own alert.
    pub fn update(&mut self, id: u64, patch: TaskPatch) -> Option<&Task> {
        let task = self.tasks.iter_mut().find(|task| task.id == id)?;

        if let Some(text) = patch.text {
            task.text = text;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(due_date) = patch.due_date {
            if task.due_date != due_date {
                task.due_reminder_sent = false;
            }
            task.due_date = due_date;
        }
        if let Some(notes) = patch.notes {
            task.notes = notes;
        }

        Some(&*task)
    }

    pub fn remove(&mut self, id: u64) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.id != id);
        before != self.tasks.len()
    }

    /// Flips completion. Reactivating clears `due_reminder_sent` so the
    /// reminder can be re-armed for the unchanged due date.
    pub fn toggle_complete(&mut self, id: u64) -> Option<&Task> {
        let task = self.tasks.iter_mut().find(|task| task.id == id)?;
        task.completed = !task.completed;
        if !task.completed {
            task.due_reminder_sent = false;
        }
        Some(&*task)
    }

    pub fn mark_reminder_sent(&mut self, id: u64) -> bool {
        match self.tasks.iter_mut().find(|task| task.id == id) {
            Some(task) => {
                task.due_reminder_sent = true;
                true
            }
            None => false,
        }
    }

    /// Removes every completed task, returning the removed ids so the
    /// caller can drop any scheduler state keyed by them.
    pub fn clear_completed(&mut self) -> Vec<u64> {
        let removed: Vec<u64> = self
            .tasks
            .iter()
            .filter(|task| task.completed)
            .map(|task| task.id)
            .collect();
        self.tasks.retain(|task| !task.completed);
        debug!(removed = removed.len(), "cleared completed tasks");
        removed
    }

    /// Filtering never mutates stored tasks or their insertion order.
    pub fn list(&self, filter: Filter) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|task| filter.matches(task))
            .collect()
    }

    pub fn progress(&self) -> Progress {
        let total = self.tasks.len();
        let completed = self.tasks.iter().filter(|task| task.completed).count();
        let percent = if total == 0 {
            0
        } else {
            ((completed as f64 / total as f64) * 100.0).round() as u32
        };
        Progress {
            completed,
            total,
            percent,
        }
    }

    /// Synchronous write of the whole collection. Callers treat a failure
    /// as non-fatal: it is logged and the in-memory state stays live.
    #[tracing::instrument(skip(self))]
    pub fn save(&self) -> anyhow::Result<()> {
        save_atomic(&self.path, &self.tasks)
            .with_context(|| format!("failed to save {}", self.path.display()))
    }
}

fn load_tasks(path: &Path) -> Vec<Task> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(file = %path.display(), "no saved tasks");
            return Vec::new();
        }
        Err(err) => {
            warn!(file = %path.display(), error = %err, "failed reading tasks; starting empty");
            return Vec::new();
        }
    };

    if raw.trim().is_empty() {
        return Vec::new();
    }

    let mut tasks = match serde_json::from_str::<Vec<Task>>(&raw) {
        Ok(tasks) => tasks,
        Err(err) => {
            warn!(
                file = %path.display(),
                error = %err,
                "discarding corrupt task payload"
            );
            return Vec::new();
        }
    };

    // Id uniqueness must hold across the whole list; keep first occurrence.
    let mut seen = HashSet::new();
    tasks.retain(|task| {
        let fresh = seen.insert(task.id);
        if !fresh {
            warn!(id = task.id, "dropping task with duplicate id");
        }
        fresh
    });

    tasks
}

fn save_atomic(path: &Path, tasks: &[Task]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = tasks.len(), "saving tasks");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    let payload = serde_json::to_string(tasks)?;
    temp.write_all(payload.as_bytes())?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use tempfile::tempdir;

    use super::TaskStore;
    use crate::filter::Filter;
    use crate::task::{Priority, TaskDraft, TaskPatch};

    fn fixed_now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0)
            .single()
            .expect("valid now")
    }

    fn draft(text: &str) -> TaskDraft {
        TaskDraft {
            text: text.to_string(),
            ..TaskDraft::default()
        }
    }

    #[test]
    fn add_assigns_unique_increasing_ids_even_in_one_millisecond() {
        let temp = tempdir().expect("tempdir");
        let mut store = TaskStore::open(temp.path()).expect("open store");
        let now = fixed_now();

        let first = store.add(draft("one"), now);
        let second = store.add(draft("two"), now);
        assert!(second > first);
    }

    #[test]
    fn corrupt_payload_resets_to_empty_list() {
        let temp = tempdir().expect("tempdir");
        std::fs::write(temp.path().join(super::TASKS_FILE), "{not json!").expect("write");

        let store = TaskStore::open(temp.path()).expect("open store");
        assert!(store.tasks().is_empty());
    }

    #[test]
    fn missing_reminder_flag_backfills_false_without_touching_other_fields() {
        let temp = tempdir().expect("tempdir");
        let payload = r#"[{"id":7,"text":"water the plants","completed":false,"priority":"high","due_date":"2026-04-01","notes":"balcony"}]"#;
        std::fs::write(temp.path().join(super::TASKS_FILE), payload).expect("write");

        let store = TaskStore::open(temp.path()).expect("open store");
        let task = store.get(7).expect("task present");
        assert!(!task.due_reminder_sent);
        assert_eq!(task.text, "water the plants");
        assert_eq!(task.priority, Priority::High);
        assert_eq!(
            task.due_date,
            NaiveDate::from_ymd_opt(2026, 4, 1)
        );
        assert_eq!(task.notes, "balcony");
    }

    #[test]
    fn duplicate_ids_in_payload_keep_first_occurrence() {
        let temp = tempdir().expect("tempdir");
        let payload = r#"[{"id":1,"text":"first"},{"id":1,"text":"second"}]"#;
        std::fs::write(temp.path().join(super::TASKS_FILE), payload).expect("write");

        let store = TaskStore::open(temp.path()).expect("open store");
        assert_eq!(store.tasks().len(), 1);
        assert_eq!(store.get(1).expect("task").text, "first");
    }

    #[test]
    fn due_date_change_resets_reminder_flag() {
        let temp = tempdir().expect("tempdir");
        let mut store = TaskStore::open(temp.path()).expect("open store");
        let now = fixed_now();

        let id = store.add(
            TaskDraft {
                text: "file taxes".to_string(),
                due_date: NaiveDate::from_ymd_opt(2026, 4, 1),
                ..TaskDraft::default()
            },
            now,
        );
        assert!(store.mark_reminder_sent(id));

        store.update(
            id,
            TaskPatch {
                due_date: Some(NaiveDate::from_ymd_opt(2026, 4, 2)),
                ..TaskPatch::default()
            },
        );
        assert!(!store.get(id).expect("task").due_reminder_sent);
    }

    #[test]
    fn unchanged_due_date_keeps_reminder_flag() {
        let temp = tempdir().expect("tempdir");
        let mut store = TaskStore::open(temp.path()).expect("open store");
        let now = fixed_now();

        let id = store.add(
            TaskDraft {
                text: "renew passport".to_string(),
                due_date: NaiveDate::from_ymd_opt(2026, 4, 1),
                ..TaskDraft::default()
            },
            now,
        );
        store.mark_reminder_sent(id);

        store.update(
            id,
            TaskPatch {
                text: Some("renew passport soon".to_string()),
                due_date: Some(NaiveDate::from_ymd_opt(2026, 4, 1)),
                ..TaskPatch::default()
            },
        );
        assert!(store.get(id).expect("task").due_reminder_sent);
    }

    #[test]
    fn reactivation_resets_reminder_flag() {
        let temp = tempdir().expect("tempdir");
        let mut store = TaskStore::open(temp.path()).expect("open store");
        let now = fixed_now();

        let id = store.add(draft("ship release"), now);
        store.mark_reminder_sent(id);

        store.toggle_complete(id);
        assert!(store.get(id).expect("task").due_reminder_sent);

        store.toggle_complete(id);
        assert!(!store.get(id).expect("task").due_reminder_sent);
    }

    #[test]
    fn filters_split_by_completion_and_keep_order() {
        let temp = tempdir().expect("tempdir");
        let mut store = TaskStore::open(temp.path()).expect("open store");
        let now = fixed_now();

        let a = store.add(draft("a"), now);
        let b = store.add(draft("b"), now);
        let c = store.add(draft("c"), now);
        store.toggle_complete(b);

        let all: Vec<u64> = store.list(Filter::All).iter().map(|t| t.id).collect();
        assert_eq!(all, vec![a, b, c]);

        let active: Vec<u64> = store.list(Filter::Active).iter().map(|t| t.id).collect();
        assert_eq!(active, vec![a, c]);

        let done: Vec<u64> = store.list(Filter::Completed).iter().map(|t| t.id).collect();
        assert_eq!(done, vec![b]);
    }

    #[test]
    fn clear_completed_returns_removed_ids() {
        let temp = tempdir().expect("tempdir");
        let mut store = TaskStore::open(temp.path()).expect("open store");
        let now = fixed_now();

        let a = store.add(draft("a"), now);
        let b = store.add(draft("b"), now);
        store.toggle_complete(a);

        let removed = store.clear_completed();
        assert_eq!(removed, vec![a]);
        assert!(store.get(a).is_none());
        assert!(store.get(b).is_some());
    }

    #[test]
    fn save_and_reopen_round_trips_canonical_dates() {
        let temp = tempdir().expect("tempdir");
        let now = fixed_now();
        let id;
        {
            let mut store = TaskStore::open(temp.path()).expect("open store");
            id = store.add(
                TaskDraft {
                    text: "pay rent".to_string(),
                    due_date: NaiveDate::from_ymd_opt(2026, 4, 1),
                    ..TaskDraft::default()
                },
                now,
            );
            store.save().expect("save");
        }

        let raw = std::fs::read_to_string(temp.path().join(super::TASKS_FILE)).expect("read");
        assert!(raw.contains("\"2026-04-01\""));

        let store = TaskStore::open(temp.path()).expect("reopen store");
        assert_eq!(
            store.get(id).expect("task").due_date,
            NaiveDate::from_ymd_opt(2026, 4, 1)
        );
    }

    #[test]
    fn progress_counts_and_rounds() {
        let temp = tempdir().expect("tempdir");
        let mut store = TaskStore::open(temp.path()).expect("open store");
        let now = fixed_now();

        assert_eq!(store.progress().percent, 0);

        let a = store.add(draft("a"), now);
        store.add(draft("b"), now);
        store.add(draft("c"), now);
        store.toggle_complete(a);

        let progress = store.progress();
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.total, 3);
        assert_eq!(progress.percent, 33);
    }
}
