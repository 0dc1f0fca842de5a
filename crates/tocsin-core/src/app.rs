use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::datetime;
use crate::filter::Filter;
use crate::notify::Notify;
use crate::reminder::{ReminderPlan, Scheduler};
use crate::render::Renderer;
use crate::store::{Progress, TaskStore};
use crate::task::{Priority, TaskDraft, TaskPatch};

const DUE_SOON_TITLE: &str = "Task due soon";
const COMPLETED_TITLE: &str = "Task completed";

/// Fields of an edit as they arrive from the outside, due date still raw.
#[derive(Debug, Clone, Default)]
pub struct EditRequest {
    pub text: Option<String>,
    pub priority: Option<Priority>,
    pub due: Option<String>,
    pub notes: Option<String>,
}

/// Owns the task list, the reminder timers, and the collaborators, and
/// runs every operation to completion before the next one starts. All
/// entry points take `now` explicitly; production callers pass
/// `Utc::now()`.
pub struct App {
    store: TaskStore,
    scheduler: Scheduler,
    notifier: Box<dyn Notify>,
    renderer: Renderer,
    filter: Filter,
}

impl App {
    /// Loads are already done by the store; this arms a full scheduling
    /// pass so reminders survive a restart, including immediate delivery
    /// for windows the process slept through.
    pub fn initialize(
        store: TaskStore,
        scheduler: Scheduler,
        notifier: Box<dyn Notify>,
        renderer: Renderer,
        now: DateTime<Utc>,
    ) -> Self {
        let mut app = Self {
            store,
            scheduler,
            notifier,
            renderer,
            filter: Filter::All,
        };
        info!(count = app.store.tasks().len(), "initializing controller");
        app.sweep_all(now);
        app
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn progress(&self) -> Progress {
        self.store.progress()
    }

    #[tracing::instrument(skip(self, text, notes, now))]
    pub fn add(
        &mut self,
        text: &str,
        priority: Priority,
        due_raw: &str,
        notes: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let text = text.trim();
        if text.is_empty() {
            return Err(anyhow!("task text cannot be empty"));
        }

        let due_date = datetime::normalize_due_date(due_raw, datetime::to_project_date(now));
        let id = self.store.add(
            TaskDraft {
                text: text.to_string(),
                priority,
                due_date,
                notes: notes.trim().to_string(),
            },
            now,
        );

        self.schedule_reminder(id, now);
        self.persist();
        self.refresh(now)?;
        Ok(id)
    }

    /// Applies the requested field changes. An unknown id is a silent
    /// no-op. Returns whether a task was touched.
    #[tracing::instrument(skip(self, request, now))]
    pub fn edit(&mut self, id: u64, request: EditRequest, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let text = match request.text {
            Some(text) => {
                let trimmed = text.trim().to_string();
                if trimmed.is_empty() {
                    return Err(anyhow!("task text cannot be empty"));
                }
                Some(trimmed)
            }
            None => None,
        };

        let due_date = request
            .due
            .map(|raw| datetime::normalize_due_date(&raw, datetime::to_project_date(now)));

        let patch = TaskPatch {
            text,
            priority: request.priority,
            due_date,
            notes: request.notes.map(|notes| notes.trim().to_string()),
        };

        if self.store.update(id, patch).is_none() {
            debug!(id, "edit for unknown task ignored");
            return Ok(false);
        }

        self.schedule_reminder(id, now);
        self.persist();
        self.refresh(now)?;
        Ok(true)
    }

    /// Flips completion. Completing cancels the timer before anything is
    /// persisted and announces the finish; reactivating re-arms.
    #[tracing::instrument(skip(self, now))]
    pub fn toggle_complete(&mut self, id: u64, now: DateTime<Utc>) -> anyhow::Result<Option<bool>> {
        if self.store.get(id).is_none() {
            debug!(id, "toggle for unknown task ignored");
            return Ok(None);
        }

        self.scheduler.unschedule(id);

        let (completed, text) = match self.store.toggle_complete(id) {
            Some(task) => (task.completed, task.text.clone()),
            None => return Ok(None),
        };

        if completed {
            let body = format!("Well done! You finished \"{text}\"");
            self.notifier.deliver(COMPLETED_TITLE, &body);
        } else {
            self.schedule_reminder(id, now);
        }

        self.persist();
        self.refresh(now)?;
        Ok(Some(completed))
    }

    /// Removes the task, cancelling its timer before the mutation is
    /// persisted so no stale timer can fire for it. Unknown ids are a
    /// silent no-op.
    #[tracing::instrument(skip(self, now))]
    pub fn delete(&mut self, id: u64, now: DateTime<Utc>) -> anyhow::Result<bool> {
        self.scheduler.unschedule(id);

        if !self.store.remove(id) {
            debug!(id, "delete for unknown task ignored");
            return Ok(false);
        }

        self.persist();
        self.refresh(now)?;
        Ok(true)
    }

    #[tracing::instrument(skip(self, now))]
    pub fn clear_completed(&mut self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let removed = self.store.clear_completed();
        for id in &removed {
            self.scheduler.unschedule(*id);
        }

        self.persist();
        self.refresh(now)?;
        Ok(removed.len())
    }

    pub fn set_filter(&mut self, filter: Filter, now: DateTime<Utc>) -> anyhow::Result<()> {
        self.filter = filter;
        self.refresh(now)
    }

    /// Re-evaluates every task. Runs at startup and then on the sweep
    /// interval; this is what picks up deferred long delays and any
    /// arming a previous pass missed.
    #[tracing::instrument(skip(self, now))]
    pub fn sweep_all(&mut self, now: DateTime<Utc>) {
        let ids: Vec<u64> = self.store.tasks().iter().map(|task| task.id).collect();
        debug!(count = ids.len(), "sweeping reminders");
        for id in ids {
            self.schedule_reminder(id, now);
        }
    }

    /// A timer fired (or the immediate branch hit). Liveness is
    /// re-checked here: the task may have been deleted, completed, or
    /// already notified since the timer was armed.
    #[tracing::instrument(skip(self, now))]
    pub fn deliver_due_reminder(&mut self, id: u64, now: DateTime<Utc>) {
        self.scheduler.unschedule(id);

        let body = match self.store.get(id) {
            None => {
                debug!(id, "reminder fired for missing task");
                return;
            }
            Some(task) => {
                if task.completed || task.due_reminder_sent || task.due_date.is_none() {
                    debug!(id, "reminder no longer applicable");
                    return;
                }
                format!(
                    "\"{}\" is due tomorrow (priority {})",
                    task.text,
                    task.priority.label().to_uppercase()
                )
            }
        };

        self.notifier.deliver(DUE_SOON_TITLE, &body);
        self.store.mark_reminder_sent(id);
        // Persist right away so a reload cannot re-deliver.
        self.persist();
        info!(id, "delivered due-soon reminder");
    }

    pub fn refresh(&mut self, now: DateTime<Utc>) -> anyhow::Result<()> {
        let rows = self.store.list(self.filter);
        self.renderer.print_task_table(&rows, now)?;
        self.renderer.print_progress(self.store.progress())?;
        Ok(())
    }

    /// Cancels every outstanding timer; the store needs no teardown.
    pub fn teardown(&mut self) {
        info!("tearing down controller");
        self.scheduler.clear();
    }

    fn schedule_reminder(&mut self, id: u64, now: DateTime<Utc>) {
        let plan = match self.store.get(id) {
            Some(task) => self.scheduler.schedule(task, now),
            None => {
                self.scheduler.unschedule(id);
                return;
            }
        };

        if plan == ReminderPlan::Immediate {
            self.deliver_due_reminder(id, now);
        }
    }

    fn persist(&self) {
        if let Err(err) = self.store.save() {
            // Fire-and-forget: the in-memory list stays authoritative.
            warn!(error = %err, "failed saving tasks");
        }
    }
}
