//! Due-date reminders.
//!
//! A check walks the incomplete tasks that have a due date, classifies the
//! time left until 23:59:59 local on that date, and notifies at most once
//! per threshold crossing. Overdue tasks repeat at most once a day.

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::datetime::Clock;
use crate::error::GarageError;
use crate::notify::{Notifier, PermissionState};
use crate::store::TaskStore;
use crate::task::{Task, TaskId};

pub const OVERDUE_MESSAGES: [&str; 6] = [
    "Your task has gone rogue. Better catch it before it causes more chaos! 😈",
    "This task is now overdue. Let's get back on track! 📅",
    "Wake up, sleepyhead! A task is waiting for you. ⏰",
    "The deadline has passed, but it's not too late to conquer this task! 🚀",
    "This task is patiently waiting for your attention. Or maybe it's not so patient anymore. 🤔",
    "Looks like this task is a bit behind. Time to give it a boost! ✨",
];

pub const DUE_TODAY_MESSAGES: [&str; 6] = [
    "Tick-tock, your task is on the clock! ⏰",
    "Just a friendly reminder: your task is due today! 🎯",
    "This is it! Time to get your task done. 💪",
    "Your task is having its big moment today! Don't miss it! ✨",
    "The final countdown is on for this task! 🏁",
    "Today's the day! Let's get this task checked off. ✅",
];

pub const DUE_SOON_MESSAGES: [&str; 6] = [
    "Heads up! Your task is nearing its finish line. Don't quit now! 🏃",
    "This task is coming up quick! Are you ready? 🤔",
    "Almost there! Just a little more to go on this task. 💪",
    "Your task is tapping its foot impatiently. Better get to it! ⏳",
    "This task is right around the corner! Get ready to tackle it. 💡",
    "A future you will thank you for starting this task now. 😉",
];

pub const CLEAR_ALL_TITLE: &str = "You're a Task Master! 🎉";

pub const CLEAR_ALL_MESSAGES: [&str; 6] = [
    "You're a Task Master! 🎉 All tasks have been cleared. Time for a well-deserved break!",
    "Mission accomplished! The task list is empty. Take a moment to celebrate. 🥳",
    "Done and done! Your to-do list is spotless. Enjoy the freedom! 😎",
    "Success! The task list is now pristine. What's next on your adventure? 🗺️",
    "Zero tasks, zero problems. You've cleared the way! 🤩",
    "Your task list has been wiped clean. Go forth and be productive (or not)! ✨",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderKind {
    Overdue,
    DueToday,
    DueSoon,
}

impl ReminderKind {
    pub fn title_prefix(self) -> &'static str {
        match self {
            Self::Overdue => "Task is Overdue: ",
            Self::DueToday => "Task Due Today: ",
            Self::DueSoon => "Task Due Soon: ",
        }
    }

    pub fn messages(self) -> &'static [&'static str] {
        match self {
            Self::Overdue => &OVERDUE_MESSAGES,
            Self::DueToday => &DUE_TODAY_MESSAGES,
            Self::DueSoon => &DUE_SOON_MESSAGES,
        }
    }
}

/// Which reminder, if any, `task` is owed at `now`.
pub fn evaluate(task: &Task, now: DateTime<Utc>, clock: &Clock) -> Option<ReminderKind> {
    if task.completed {
        return None;
    }
    let deadline = clock.end_of_day(task.due?)?;
    let remaining = deadline - now;
    let day = Duration::hours(24);

    if remaining <= Duration::zero() {
        let stale = task
            .last_notified
            .map(|last| now - last >= day)
            .unwrap_or(true);
        return stale.then_some(ReminderKind::Overdue);
    }

    if task.last_notified.is_some() {
        return None;
    }
    if remaining <= day {
        Some(ReminderKind::DueToday)
    } else if remaining <= day * 3 {
        Some(ReminderKind::DueSoon)
    } else {
        None
    }
}

/// Chooses flavour text from a message pool.
pub trait MessagePicker: std::fmt::Debug {
    fn pick(&mut self, pool: &[&'static str]) -> &'static str;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomPicker;

impl MessagePicker for RandomPicker {
    fn pick(&mut self, pool: &[&'static str]) -> &'static str {
        pool.choose(&mut rand::thread_rng()).copied().unwrap_or_default()
    }
}

/// Walks each pool in order; deterministic output for tests and scripts.
#[derive(Debug, Clone, Copy, Default)]
pub struct RotatingPicker {
    next: usize,
}

impl MessagePicker for RotatingPicker {
    fn pick(&mut self, pool: &[&'static str]) -> &'static str {
        if pool.is_empty() {
            return "";
        }
        let message = pool[self.next % pool.len()];
        self.next = self.next.wrapping_add(1);
        message
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub task_id: TaskId,
    pub kind: ReminderKind,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Default)]
pub struct CheckOutcome {
    pub sent: Vec<Reminder>,
    /// Send or save failures; the check carries on past each one.
    pub failures: Vec<GarageError>,
}

#[derive(Debug)]
pub struct ReminderScheduler {
    clock: Clock,
    picker: Box<dyn MessagePicker>,
}

impl ReminderScheduler {
    pub fn new(clock: Clock) -> Self {
        Self::with_picker(clock, Box::new(RandomPicker))
    }

    pub fn with_picker(clock: Clock, picker: Box<dyn MessagePicker>) -> Self {
        Self { clock, picker }
    }

    pub fn pick_message(&mut self, pool: &[&'static str]) -> &'static str {
        self.picker.pick(pool)
    }

    /// One pass over the store. A no-op unless permission is granted.
    #[tracing::instrument(level = "debug", skip(self, store, notifier, now))]
    pub fn check(&mut self, store: &mut TaskStore, notifier: &mut dyn Notifier, now: DateTime<Utc>) -> CheckOutcome {
        let mut outcome = CheckOutcome::default();
        if notifier.permission() != PermissionState::Granted {
            debug!(permission = ?notifier.permission(), "reminders inactive");
            return outcome;
        }

        let owed: Vec<(TaskId, String, ReminderKind)> = store
            .tasks()
            .iter()
            .filter_map(|task| evaluate(task, now, &self.clock).map(|kind| (task.id.clone(), task.title.clone(), kind)))
            .collect();

        for (task_id, task_title, kind) in owed {
            let title = format!("{}{}", kind.title_prefix(), task_title);
            let body = self.picker.pick(kind.messages()).to_string();

            if let Err(err) = notifier.send(&title, &body) {
                warn!(id = %task_id, error = %err, "reminder not delivered; will retry next check");
                outcome.failures.push(err);
                continue;
            }

            if let Err(err) = store.mark_notified(&task_id, now) {
                warn!(id = %task_id, error = %err, "reminder sent but not persisted");
                outcome.failures.push(err);
            }

            info!(id = %task_id, kind = ?kind, "reminder sent");
            outcome.sent.push(Reminder {
                task_id,
                kind,
                title,
                body,
            });
        }

        outcome
    }
}
