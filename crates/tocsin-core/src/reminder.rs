use std::collections::HashMap;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::datetime;
use crate::task::Task;

/// How often the re-arming sweep re-evaluates every task. The sweep is
/// what recovers delays too long to arm directly and heals any arming
/// the direct path missed.
pub const SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(60);

/// Longest delay armed as a single one-shot timer. Anything beyond it is
/// left to the sweep until the remaining delay becomes representable.
pub const MAX_ARM_DELAY_MS: i64 = i32::MAX as i64;

/// Hours before due-date midnight at which the alert fires.
const REMINDER_LEAD_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderPlan {
    /// `now` is inside the 24-hour window before due midnight: deliver now.
    Immediate,
    /// Arm a one-shot timer for this many milliseconds from `now`.
    Arm(i64),
    /// Delay exceeds the single-timer ceiling; the sweep will retry.
    Deferred,
    Skip(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoDueDate,
    Completed,
    AlreadySent,
    AlreadyDue,
    /// Midnight of the due date does not exist in the configured zone.
    BadDueDate,
}

/// Pure scheduling decision for one task at one instant. Guard order
/// mirrors delivery bookkeeping: a missing due date, a completed task,
/// and an already-sent alert all beat the time arithmetic.
pub fn plan(task: &Task, now: DateTime<Utc>, max_arm_delay_ms: i64) -> ReminderPlan {
    let Some(due) = task.due_date else {
        return ReminderPlan::Skip(SkipReason::NoDueDate);
    };
    if task.completed {
        return ReminderPlan::Skip(SkipReason::Completed);
    }
    if task.due_reminder_sent {
        return ReminderPlan::Skip(SkipReason::AlreadySent);
    }

    let due_midnight = match datetime::due_midnight_utc(due) {
        Ok(instant) => instant,
        Err(err) => {
            warn!(id = task.id, due = %due, error = %err, "cannot place due midnight");
            return ReminderPlan::Skip(SkipReason::BadDueDate);
        }
    };
    if now >= due_midnight {
        return ReminderPlan::Skip(SkipReason::AlreadyDue);
    }

    let reminder_instant = due_midnight - Duration::hours(REMINDER_LEAD_HOURS);
    if now >= reminder_instant {
        return ReminderPlan::Immediate;
    }

    let delay_ms = (reminder_instant - now).num_milliseconds();
    if delay_ms <= max_arm_delay_ms {
        ReminderPlan::Arm(delay_ms)
    } else {
        ReminderPlan::Deferred
    }
}

/// Per-task one-shot timers, at most one live per id. Timers do not touch
/// task state themselves: a fired timer reports its id on the channel and
/// the controller re-checks liveness before delivering.
#[derive(Debug)]
pub struct Scheduler {
    timers: HashMap<u64, JoinHandle<()>>,
    fired: UnboundedSender<u64>,
    max_arm_delay_ms: i64,
}

impl Scheduler {
    pub fn new(fired: UnboundedSender<u64>) -> Self {
        Self::with_max_arm_delay(fired, MAX_ARM_DELAY_MS)
    }

    pub fn with_max_arm_delay(fired: UnboundedSender<u64>, max_arm_delay_ms: i64) -> Self {
        Self {
            timers: HashMap::new(),
            fired,
            max_arm_delay_ms,
        }
    }

    /// Evaluates the task and arms a timer when one is owed. Any prior
    /// timer for the id is cancelled first, so no two timers are ever
    /// live for the same task.
    pub fn schedule(&mut self, task: &Task, now: DateTime<Utc>) -> ReminderPlan {
        self.unschedule(task.id);

        let plan = plan(task, now, self.max_arm_delay_ms);
        if let ReminderPlan::Arm(delay_ms) = plan {
            let id = task.id;
            let fired = self.fired.clone();
            let handle = tokio::spawn(async move {
                tokio::time::sleep(StdDuration::from_millis(delay_ms as u64)).await;
                if fired.send(id).is_err() {
                    debug!(id, "reminder fired with no listener");
                }
            });
            self.timers.insert(id, handle);
            debug!(id, delay_ms, "armed reminder timer");
        }

        plan
    }

    /// Cancels and removes any armed timer for the id; idempotent.
    pub fn unschedule(&mut self, id: u64) {
        if let Some(handle) = self.timers.remove(&id) {
            handle.abort();
            debug!(id, "cancelled reminder timer");
        }
    }

    /// Best-effort teardown: cancels every outstanding timer.
    pub fn clear(&mut self) {
        let count = self.timers.len();
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
        if count > 0 {
            debug!(count, "cancelled all reminder timers");
        }
    }

    pub fn armed(&self) -> usize {
        self.timers.len()
    }

    pub fn is_armed(&self, id: u64) -> bool {
        self.timers.contains_key(&id)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.clear();
    }
}
