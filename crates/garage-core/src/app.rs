//! Application state container.
//!
//! [`App`] owns the task store, preferences, edit modal, form draft, view
//! state, and notification surface, and re-renders after every change. The
//! command-line and shell front ends only translate input into calls here.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::datetime::Clock;
use crate::error::{GarageError, Result};
use crate::modal::{EditModal, ModalKey};
use crate::notify::{Notifier, PermissionState};
use crate::prefs::{Presentation, PreferencesController, Theme};
use crate::reminder::{CLEAR_ALL_MESSAGES, CLEAR_ALL_TITLE, CheckOutcome, ReminderScheduler};
use crate::render::Renderer;
use crate::storage::StorageAdapter;
use crate::store::TaskStore;
use crate::task::{DraftField, Task, TaskDraft, TaskId};
use crate::vdom::VNode;
use crate::view::{self, SortOrder, StatusFilter, ViewContext, ViewState};

pub const REMOVE_PROMPT: &str = "Delete this task?";
pub const CLEAR_ALL_PROMPT: &str = "Are you sure you want to delete ALL tasks? This cannot be undone.";
pub const PERMISSION_GRANTED_TITLE: &str = "Notifications Enabled!";
pub const PERMISSION_GRANTED_BODY: &str = "You will now receive task reminders.";

/// Answers a yes/no question before a destructive action.
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> bool;
}

impl<F: FnMut(&str) -> bool> Confirm for F {
    fn confirm(&mut self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Confirms everything without asking.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&mut self, _prompt: &str) -> bool {
        true
    }
}

#[derive(Debug)]
pub struct App<N: Notifier = Box<dyn Notifier>> {
    store: TaskStore,
    prefs: PreferencesController,
    modal: EditModal,
    form: TaskDraft,
    view: ViewState,
    notifier: N,
    scheduler: ReminderScheduler,
    renderer: Renderer,
    clock: Clock,
}

impl<N: Notifier> App<N> {
    /// Loads persisted state through `storage`. Nothing is painted until the
    /// first [`App::render`].
    pub fn new(storage: StorageAdapter, notifier: N, renderer: Renderer, clock: Clock) -> Self {
        let (tasks, prefs) = storage.load_at(clock.now());
        Self {
            store: TaskStore::new(tasks, storage.clone()),
            prefs: PreferencesController::new(prefs, storage),
            modal: EditModal::new(),
            form: TaskDraft::default(),
            view: ViewState::default(),
            notifier,
            scheduler: ReminderScheduler::new(clock),
            renderer,
            clock,
        }
    }

    pub fn with_scheduler(mut self, scheduler: ReminderScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn tasks(&self) -> &[Task] {
        self.store.tasks()
    }

    pub fn modal(&self) -> &EditModal {
        &self.modal
    }

    pub fn form(&self) -> &TaskDraft {
        &self.form
    }

    pub fn view_state(&self) -> &ViewState {
        &self.view
    }

    pub fn presentation(&self) -> Presentation {
        self.prefs.presentation()
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn build_tree(&self) -> VNode {
        let now = self.clock.now();
        let ctx = ViewContext {
            clock: &self.clock,
            today: self.clock.today(now),
            presentation: self.prefs.presentation(),
            modal: &self.modal,
        };
        view::build_view(self.store.tasks(), &self.view, ctx)
    }

    /// Rebuilds the view and applies it; returns whether anything was
    /// painted.
    pub fn render(&mut self) -> Result<bool> {
        let tree = self.build_tree();
        self.renderer.apply(tree)
    }

    /// Paints the current view even if nothing changed.
    pub fn repaint(&mut self) -> Result<()> {
        self.renderer.invalidate();
        self.render().map(|_| ())
    }

    /// Ids in display order, as currently filtered and sorted.
    pub fn visible_ids(&self) -> Vec<TaskId> {
        let today = self.clock.today(self.clock.now());
        view::derive(self.store.tasks(), &self.view, today)
            .into_iter()
            .map(|task| task.id.clone())
            .collect()
    }

    /// Accepts a 1-based position in the displayed list, a full id, or an
    /// unambiguous id prefix.
    pub fn resolve(&self, token: &str) -> Result<TaskId> {
        let token = token.trim();
        if let Ok(position) = token.parse::<usize>()
            && position >= 1
            && let Some(id) = self.visible_ids().into_iter().nth(position - 1)
        {
            return Ok(id);
        }

        let exact = TaskId::from(token);
        if self.store.get(&exact).is_some() {
            return Ok(exact);
        }

        let mut matches = self
            .store
            .tasks()
            .iter()
            .filter(|task| !token.is_empty() && task.id.as_str().starts_with(token));
        match (matches.next(), matches.next()) {
            (Some(task), None) => Ok(task.id.clone()),
            _ => Err(GarageError::not_found(token)),
        }
    }

    /// Re-reads the task list from storage and repaints if it changed.
    pub fn reload(&mut self) -> Result<bool> {
        self.store.reload(self.clock.now());
        self.render()
    }

    pub fn set_form_field(&mut self, field: DraftField, value: impl Into<String>) {
        self.form.set(field, value);
    }

    /// Creates a task from the form draft and clears the form. Invalid
    /// drafts are left untouched for correction.
    #[tracing::instrument(skip(self))]
    pub fn submit_form(&mut self) -> Result<TaskId> {
        let input = self.form.parse()?;
        let outcome = self.store.create_at(input, self.clock.now());
        if outcome.is_ok() || outcome.as_ref().is_err_and(GarageError::is_storage) {
            self.form = TaskDraft::default();
        }
        self.settle(outcome)
    }

    pub fn reset_form(&mut self) {
        debug!("form reset");
        self.form = TaskDraft::default();
    }

    pub fn toggle(&mut self, id: &TaskId) -> Result<bool> {
        let outcome = self.store.toggle_complete(id);
        self.settle(outcome)
    }

    /// Returns the removed task, or `None` when the user declined.
    #[tracing::instrument(skip(self, confirm), fields(id = %id))]
    pub fn remove(&mut self, id: &TaskId, confirm: &mut dyn Confirm) -> Result<Option<Task>> {
        if self.store.get(id).is_none() {
            return Err(GarageError::not_found(id.as_str()));
        }
        if !confirm.confirm(REMOVE_PROMPT) {
            debug!("removal declined");
            return Ok(None);
        }
        let outcome = self.store.remove(id).map(Some);
        self.settle(outcome)
    }

    /// Empties the list after confirmation. An empty list asks nothing and
    /// writes nothing.
    #[tracing::instrument(skip(self, confirm))]
    pub fn clear_all(&mut self, confirm: &mut dyn Confirm) -> Result<usize> {
        let before = self.store.len();
        if before == 0 {
            return Ok(0);
        }
        if !confirm.confirm(CLEAR_ALL_PROMPT) {
            debug!("clear declined");
            return Ok(0);
        }

        let outcome = self.store.clear_all();
        if self.store.is_empty() && self.notifier.permission() == PermissionState::Granted {
            let body = self.scheduler.pick_message(&CLEAR_ALL_MESSAGES);
            if let Err(err) = self.notifier.send(CLEAR_ALL_TITLE, body) {
                warn!(error = %err, "celebration notification failed");
            }
        }
        self.settle(outcome)
    }

    pub fn open_edit(&mut self, id: &TaskId) -> Result<()> {
        self.modal.open(&self.store, id)?;
        self.render().map(|_| ())
    }

    /// Returns `false` when no edit is in progress.
    pub fn edit_set(&mut self, field: DraftField, value: impl Into<String>) -> Result<bool> {
        if !self.modal.set_field(field, value) {
            return Ok(false);
        }
        self.render()?;
        Ok(true)
    }

    pub fn save_edit(&mut self) -> Result<Option<TaskId>> {
        let outcome = self.modal.save(&mut self.store);
        match &outcome {
            Err(err) if err.is_validation() => outcome,
            _ => self.settle_always(outcome),
        }
    }

    pub fn cancel_edit(&mut self) -> Result<()> {
        self.modal.cancel();
        self.render().map(|_| ())
    }

    pub fn backdrop_click(&mut self) -> Result<()> {
        self.modal.backdrop_click();
        self.render().map(|_| ())
    }

    /// Returns whether the key closed the dialog.
    pub fn key_press(&mut self, key: ModalKey) -> Result<bool> {
        let closed = self.modal.key_press(key);
        if closed {
            self.render()?;
        }
        Ok(closed)
    }

    pub fn set_search(&mut self, query: impl Into<String>) -> Result<()> {
        self.view.search = query.into();
        debug!(query = %self.view.search, "search updated");
        self.render().map(|_| ())
    }

    pub fn set_filter(&mut self, filter: StatusFilter) -> Result<()> {
        self.view.filter = filter;
        self.render().map(|_| ())
    }

    pub fn set_sort(&mut self, sort: SortOrder) -> Result<()> {
        self.view.sort = sort;
        self.render().map(|_| ())
    }

    /// Replaces search, filter, and sort together with one render.
    pub fn set_view(&mut self, view: ViewState) -> Result<()> {
        debug!(?view, "view replaced");
        self.view = view;
        self.render().map(|_| ())
    }

    pub fn set_theme(&mut self, theme: Theme) -> Result<Presentation> {
        let outcome = self.prefs.set_theme(theme);
        self.settle_always(outcome)
    }

    pub fn set_compact(&mut self, compact: bool) -> Result<Presentation> {
        let outcome = self.prefs.set_compact(compact);
        self.settle_always(outcome)
    }

    /// Asks the surface for permission and confirms a grant with a
    /// notification.
    #[tracing::instrument(skip(self))]
    pub fn request_notifications(&mut self) -> Result<PermissionState> {
        let state = self.notifier.request_permission()?;
        match state {
            PermissionState::Granted => {
                if let Err(err) = self.notifier.send(PERMISSION_GRANTED_TITLE, PERMISSION_GRANTED_BODY) {
                    warn!(error = %err, "permission confirmation not delivered");
                }
            }
            PermissionState::Unsupported => {
                return Err(GarageError::Notification {
                    message: "notifications are not supported".to_string(),
                });
            }
            PermissionState::Default | PermissionState::Denied => {
                info!(permission = ?state, "notification permission not granted");
            }
        }
        Ok(state)
    }

    pub fn revoke_notifications(&mut self) -> Result<PermissionState> {
        self.notifier.revoke()
    }

    pub fn reminders_active(&self) -> bool {
        self.notifier.permission() == PermissionState::Granted
    }

    pub fn check_reminders(&mut self) -> CheckOutcome {
        let now = self.clock.now();
        self.check_reminders_at(now)
    }

    pub fn check_reminders_at(&mut self, now: DateTime<Utc>) -> CheckOutcome {
        self.scheduler.check(&mut self.store, &mut self.notifier, now)
    }

    /// Re-renders after a mutation that reached memory: any success, or a
    /// storage failure that kept the in-memory change.
    fn settle<T>(&mut self, outcome: Result<T>) -> Result<T> {
        match &outcome {
            Ok(_) => {}
            Err(err) if err.is_storage() => {}
            Err(_) => return outcome,
        }
        self.settle_always(outcome)
    }

    fn settle_always<T>(&mut self, outcome: Result<T>) -> Result<T> {
        match (self.render(), outcome) {
            (Ok(_), outcome) => outcome,
            (Err(render), Ok(_)) => Err(render),
            (Err(render), Err(err)) => {
                warn!(error = %render, "render failed after an earlier error");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone};

    use super::*;
    use crate::error::TITLE_REQUIRED;
    use crate::notify::RecordingNotifier;
    use crate::reminder::RotatingPicker;
    use crate::render::RecordingSurface;
    use crate::storage::{MemoryKvStore, TASKS_KEY};
    use crate::vdom::Element;

    struct Harness {
        app: App<RecordingNotifier>,
        kv: MemoryKvStore,
        surface: RecordingSurface,
    }

    fn harness_with(kv: MemoryKvStore, notifier: RecordingNotifier) -> Harness {
        let surface = RecordingSurface::new();
        let clock = Clock::with_zone(chrono_tz::UTC);
        let app = App::new(
            StorageAdapter::new(kv.clone()),
            notifier,
            Renderer::new(Box::new(surface.clone())),
            clock,
        )
        .with_scheduler(ReminderScheduler::with_picker(clock, Box::new(RotatingPicker::default())));
        Harness { app, kv, surface }
    }

    fn harness() -> Harness {
        harness_with(MemoryKvStore::new(), RecordingNotifier::default())
    }

    fn add(app: &mut App<RecordingNotifier>, title: &str) -> TaskId {
        app.set_form_field(DraftField::Title, title);
        app.submit_form().expect("submit")
    }

    fn root(surface: &RecordingSurface) -> Element {
        match surface.last().expect("painted") {
            VNode::Element(el) => el,
            VNode::Text(_) => panic!("text root"),
        }
    }

    #[test]
    fn submit_creates_renders_and_resets_form() {
        let mut h = harness();
        h.app.set_form_field(DraftField::Title, "  Buy milk ");
        h.app.set_form_field(DraftField::Progress, "150");
        let id = h.app.submit_form().expect("submit");

        let task = h.app.store().get(&id).expect("created");
        assert_eq!(task.title, "Buy milk");
        assert_eq!(task.progress, 100);
        assert!(!task.completed);
        assert_eq!(h.app.form(), &TaskDraft::default());
        assert_eq!(h.surface.frame_count(), 1);
        assert_eq!(h.kv.writes(), 1);
    }

    #[test]
    fn invalid_submit_keeps_draft_and_state() {
        let mut h = harness();
        h.app.set_form_field(DraftField::Title, "   ");
        let err = h.app.submit_form().expect_err("blank");
        assert_eq!(err.to_string(), TITLE_REQUIRED);
        assert_eq!(h.app.form().title, "   ");
        assert!(h.app.tasks().is_empty());
        assert_eq!(h.surface.frame_count(), 0);
    }

    #[test]
    fn storage_failure_keeps_task_visible() {
        let mut h = harness();
        h.kv.reject_writes(true);
        h.app.set_form_field(DraftField::Title, "Offline");
        let err = h.app.submit_form().expect_err("storage");
        assert!(err.is_storage());
        assert_eq!(h.app.tasks().len(), 1);

        let mut cards = Vec::new();
        let tree = root(&h.surface);
        tree.find_all_class("task", &mut cards);
        assert_eq!(cards.len(), 1);
    }

    #[test]
    fn declined_removal_changes_nothing() {
        let mut h = harness();
        let id = add(&mut h.app, "Keep me");
        let writes = h.kv.writes();

        let mut prompts = Vec::new();
        let removed = h
            .app
            .remove(&id, &mut |prompt: &str| {
                prompts.push(prompt.to_string());
                false
            })
            .expect("remove");
        assert!(removed.is_none());
        assert_eq!(prompts, [REMOVE_PROMPT]);
        assert_eq!(h.kv.writes(), writes);
        assert_eq!(h.app.tasks().len(), 1);
    }

    #[test]
    fn clear_all_celebrates_when_granted() {
        let mut h = harness_with(MemoryKvStore::new(), RecordingNotifier::granted());
        add(&mut h.app, "one");
        add(&mut h.app, "two");

        let removed = h.app.clear_all(&mut AssumeYes).expect("clear");
        assert_eq!(removed, 2);
        assert_eq!(h.app.notifier().titles(), [CLEAR_ALL_TITLE]);
        assert_eq!(h.app.notifier().sent[0].body, CLEAR_ALL_MESSAGES[0]);

        let overall = root(&h.surface).find_class("overall-progress").cloned().expect("overall");
        assert!(overall.hidden);
    }

    #[test]
    fn clear_all_on_empty_list_does_not_prompt() {
        let mut h = harness();
        let mut asked = false;
        let removed = h
            .app
            .clear_all(&mut |_: &str| {
                asked = true;
                true
            })
            .expect("clear");
        assert_eq!(removed, 0);
        assert!(!asked);
        assert_eq!(h.kv.writes(), 0);
    }

    #[test]
    fn edit_flow_updates_task_through_modal() {
        let mut h = harness();
        let id = add(&mut h.app, "Draft");
        h.app.open_edit(&id).expect("open");
        let dialog = root(&h.surface).find_class("modal").cloned().expect("dialog");
        assert_eq!(dialog.attr_value("aria-hidden"), Some("false"));

        assert!(h.app.edit_set(DraftField::Title, "Final").expect("set"));
        assert_eq!(h.app.save_edit().expect("save"), Some(id.clone()));
        assert_eq!(h.app.store().get(&id).expect("present").title, "Final");
        let dialog = root(&h.surface).find_class("modal").cloned().expect("dialog");
        assert_eq!(dialog.attr_value("aria-hidden"), Some("true"));
    }

    #[test]
    fn escape_closes_only_open_dialog() {
        let mut h = harness();
        let id = add(&mut h.app, "Task");
        assert!(!h.app.key_press(ModalKey::Escape).expect("closed"));
        h.app.open_edit(&id).expect("open");
        assert!(h.app.key_press(ModalKey::Escape).expect("esc"));
        assert!(!h.app.modal().is_open());
    }

    #[test]
    fn resolve_accepts_positions_and_prefixes() {
        let mut h = harness();
        let first = add(&mut h.app, "first");
        let second = add(&mut h.app, "second");

        // Newest first by default.
        assert_eq!(h.app.resolve("1").expect("pos"), second);
        assert_eq!(h.app.resolve(first.as_str()).expect("exact"), first);
        assert!(h.app.resolve("nope").expect_err("unknown").is_not_found());
    }

    #[test]
    fn theme_change_updates_root_attributes() {
        let mut h = harness();
        let presentation = h.app.set_theme(Theme::Dark).expect("theme");
        assert_eq!(presentation.theme, Theme::Dark);
        assert_eq!(root(&h.surface).attr_value("data-theme"), Some("dark"));
        assert!(h.kv.raw(crate::storage::PREFS_KEY).expect("prefs").contains("dark"));
    }

    #[test]
    fn permission_grant_sends_confirmation() {
        let mut h = harness();
        assert!(!h.app.reminders_active());
        assert_eq!(h.app.request_notifications().expect("grant"), PermissionState::Granted);
        assert!(h.app.reminders_active());
        assert_eq!(h.app.notifier().titles(), [PERMISSION_GRANTED_TITLE]);
    }

    #[test]
    fn reminders_run_against_loaded_tasks() {
        let stored = r#"[{"id":"late","title":"Taxes","due":"2026-10-01","createdAt":"2026-09-01T00:00:00.000Z"}]"#;
        let kv = MemoryKvStore::new().with_entry(TASKS_KEY, stored);
        let mut h = harness_with(kv, RecordingNotifier::granted());

        let now = Utc
            .with_ymd_and_hms(2026, 10, 18, 9, 0, 0)
            .single()
            .expect("valid now");
        let outcome = h.app.check_reminders_at(now);
        assert_eq!(outcome.sent.len(), 1);
        assert_eq!(h.app.notifier().titles(), ["Task is Overdue: Taxes"]);

        assert!(h.app.check_reminders_at(now + Duration::hours(2)).sent.is_empty());
        assert_eq!(h.app.check_reminders_at(now + Duration::hours(25)).sent.len(), 1);

        let task = &h.app.tasks()[0];
        assert_eq!(task.due, NaiveDate::from_ymd_opt(2026, 10, 1));
        assert_eq!(task.last_notified, Some(now + Duration::hours(25)));
    }
}
