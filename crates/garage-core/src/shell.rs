//! Interactive session.
//!
//! One line is one command. Input, the reminder timer, and the search
//! debouncer all feed a single `select!` loop on a current-thread runtime,
//! so every state change happens on one task.

use std::io::{self, Write};
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::{App, AssumeYes, CLEAR_ALL_PROMPT, REMOVE_PROMPT};
use crate::commands::is_yes;
use crate::error::GarageError;
use crate::modal::ModalKey;
use crate::notify::{Notifier, PermissionState};
use crate::prefs::Theme;
use crate::reminder::CheckOutcome;
use crate::runtime::{self, Debouncer, ReminderTimer};
use crate::task::{DraftField, TaskId};
use crate::view::{SortOrder, StatusFilter};

const HELP: &str = "\
commands:
  add <title>              quick add with default fields
  form <field> <value>     fill the new-task form (title notes due priority progress)
  submit | reset           create from the form | clear the form
  toggle <n|id>            flip completion
  rm <n|id> | clear        delete one | delete all
  open <n|id>              edit a task; then set <field> <value>, save, cancel, backdrop, esc
  search [text]            filter by text (blank clears)
  filter <all|active|completed|overdue>
  sort <newest|oldest|due_asc|due_desc|priority>
  theme <light|dark> | compact <on|off>
  notify [revoke] | remind
  list | help | quit";

#[derive(Debug, Clone, Copy)]
pub struct ShellSettings {
    pub assume_yes: bool,
    pub reminder_interval: Duration,
    pub search_debounce: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pending {
    Remove(TaskId),
    ClearAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Line interpreter over an [`App`]. Also owns the reminder timer and the
/// search debouncer that the session loop polls.
#[derive(Debug)]
pub struct Shell<N: Notifier> {
    app: App<N>,
    assume_yes: bool,
    pending: Option<Pending>,
    timer: ReminderTimer,
    search: Debouncer<String>,
    messages: Vec<String>,
}

impl<N: Notifier> Shell<N> {
    pub fn new(app: App<N>, settings: ShellSettings) -> Self {
        Self {
            app,
            assume_yes: settings.assume_yes,
            pending: None,
            timer: ReminderTimer::new(settings.reminder_interval),
            search: Debouncer::new(settings.search_debounce),
            messages: Vec::new(),
        }
    }

    pub fn app(&self) -> &App<N> {
        &self.app
    }

    pub fn timer(&self) -> &ReminderTimer {
        &self.timer
    }

    pub fn search_pending(&self) -> bool {
        self.search.is_pending()
    }

    /// Messages produced since the last call.
    pub fn drain_messages(&mut self) -> Vec<String> {
        std::mem::take(&mut self.messages)
    }

    /// First paint, and the reminder timer if permission already exists.
    pub fn start(&mut self) {
        if let Err(err) = self.app.render() {
            self.report(&err);
        }
        if self.app.reminders_active() {
            self.timer.start();
            self.check_reminders();
        }
    }

    pub fn check_reminders(&mut self) {
        let outcome = self.app.check_reminders();
        self.note_outcome(&outcome);
    }

    pub fn apply_search(&mut self, query: String) {
        if let Err(err) = self.app.set_search(query) {
            self.report(&err);
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn handle_line(&mut self, line: &str) -> Flow {
        let line = line.trim();

        if let Some(pending) = self.pending.take() {
            if is_yes(line) {
                self.run_pending(pending);
            } else {
                self.say("Cancelled.");
            }
            return Flow::Continue;
        }

        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };
        debug!(command, "shell command");

        let outcome = match command {
            "" => Ok(()),
            "quit" | "exit" | "q" => return Flow::Quit,
            "help" | "?" => {
                self.say(HELP);
                Ok(())
            }
            "list" | "ls" => self.app.repaint(),
            "add" => self.quick_add(rest),
            "form" => self.form(rest),
            "submit" => self.app.submit_form().map(|id| self.say(&format!("Created task {id}."))),
            "reset" => {
                self.app.reset_form();
                self.say("Form cleared.");
                Ok(())
            }
            "toggle" => self.app.resolve(rest).and_then(|id| self.app.toggle(&id)).map(|_| ()),
            "rm" | "remove" | "delete" => self.app.resolve(rest).map(|id| self.ask(Pending::Remove(id))),
            "clear" => {
                if self.app.store().is_empty() {
                    self.say("Nothing to clear.");
                } else {
                    self.ask(Pending::ClearAll);
                }
                Ok(())
            }
            "open" | "edit" => self.app.resolve(rest).and_then(|id| self.app.open_edit(&id)),
            "set" => self.edit_set(rest),
            "save" => self.app.save_edit().map(|saved| {
                if saved.is_none() {
                    self.say("No task is being edited.");
                }
            }),
            "cancel" => self.app.cancel_edit(),
            "backdrop" => self.app.backdrop_click(),
            "esc" | "escape" => self.app.key_press(ModalKey::Escape).map(|_| ()),
            "search" => {
                self.search.push(rest.to_string());
                Ok(())
            }
            "filter" => rest.parse::<StatusFilter>().and_then(|filter| self.app.set_filter(filter)),
            "sort" => rest.parse::<SortOrder>().and_then(|sort| self.app.set_sort(sort)),
            "theme" => rest.parse::<Theme>().and_then(|theme| self.app.set_theme(theme)).map(|_| ()),
            "compact" => self.compact(rest),
            "notify" => self.notify(rest),
            "remind" => {
                self.check_reminders();
                Ok(())
            }
            other => {
                self.say(&format!("Unknown command `{other}`. Type `help` for a list."));
                Ok(())
            }
        };

        if let Err(err) = outcome {
            self.report(&err);
        }
        Flow::Continue
    }

    fn quick_add(&mut self, title: &str) -> crate::error::Result<()> {
        self.app.reset_form();
        self.app.set_form_field(DraftField::Title, title);
        let id = self.app.submit_form()?;
        self.say(&format!("Created task {id}."));
        Ok(())
    }

    fn form(&mut self, rest: &str) -> crate::error::Result<()> {
        let (field, value) = split_field(rest)?;
        self.app.set_form_field(field, value);
        Ok(())
    }

    fn edit_set(&mut self, rest: &str) -> crate::error::Result<()> {
        let (field, value) = split_field(rest)?;
        if !self.app.edit_set(field, value)? {
            self.say("No task is being edited. Use `open <n|id>` first.");
        }
        Ok(())
    }

    fn compact(&mut self, rest: &str) -> crate::error::Result<()> {
        let enabled = crate::cli::parse_switch(rest).map_err(|message| GarageError::validation("compact", message))?;
        self.app.set_compact(enabled).map(|_| ())
    }

    fn notify(&mut self, rest: &str) -> crate::error::Result<()> {
        if rest == "revoke" {
            self.app.revoke_notifications()?;
            self.timer.stop();
            self.say("Reminders disabled.");
            return Ok(());
        }

        let state = self.app.request_notifications()?;
        self.say(&format!("{}.", state.as_label()));
        if state == PermissionState::Granted {
            self.timer.start();
            self.check_reminders();
        }
        Ok(())
    }

    fn ask(&mut self, pending: Pending) {
        if self.assume_yes {
            self.run_pending(pending);
            return;
        }
        let prompt = match &pending {
            Pending::Remove(_) => REMOVE_PROMPT,
            Pending::ClearAll => CLEAR_ALL_PROMPT,
        };
        self.say(&format!("{prompt} [y/N]"));
        self.pending = Some(pending);
    }

    fn run_pending(&mut self, pending: Pending) {
        let outcome = match pending {
            Pending::Remove(id) => self.app.remove(&id, &mut AssumeYes).map(|removed| {
                if let Some(task) = removed {
                    self.say(&format!("Deleted task {}.", task.title));
                }
            }),
            Pending::ClearAll => self
                .app
                .clear_all(&mut AssumeYes)
                .map(|removed| self.say(&format!("Cleared {removed} task(s)."))),
        };
        if let Err(err) = outcome {
            self.report(&err);
        }
    }

    fn note_outcome(&mut self, outcome: &CheckOutcome) {
        for failure in &outcome.failures {
            if failure.is_storage() {
                self.report(failure);
            } else {
                warn!(error = %failure, "reminder not delivered");
            }
        }
    }

    fn report(&mut self, err: &GarageError) {
        warn!(error = %err, "command failed");
        self.messages.push(format!("error: {err}"));
    }

    fn say(&mut self, message: &str) {
        self.messages.push(message.to_string());
    }
}

fn split_field(rest: &str) -> crate::error::Result<(DraftField, String)> {
    let (field, value) = match rest.split_once(char::is_whitespace) {
        Some((field, value)) => (field, value.trim()),
        None => (rest, ""),
    };
    Ok((field.parse()?, value.to_string()))
}

/// Runs the session until `quit`, end of input, or a shutdown signal.
pub fn run<N: Notifier>(app: App<N>, settings: ShellSettings) -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    rt.block_on(async move {
        let token = CancellationToken::new();
        runtime::cancel_on_shutdown_signal(token.clone());
        session(Shell::new(app, settings), token).await
    })
}

async fn session<N: Notifier>(mut shell: Shell<N>, token: CancellationToken) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    shell.start();
    flush_messages(&mut shell)?;
    info!("shell started");

    loop {
        prompt()?;
        tokio::select! {
            _ = token.cancelled() => break,
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read input")? else {
                    break;
                };
                if shell.handle_line(&line) == Flow::Quit {
                    break;
                }
            }
            _ = shell.timer.tick() => shell.check_reminders(),
            query = shell.search.ready() => shell.apply_search(query),
        }
        flush_messages(&mut shell)?;
    }

    token.cancel();
    info!("shell finished");
    Ok(())
}

fn prompt() -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    write!(out, "› ")?;
    out.flush()?;
    Ok(())
}

fn flush_messages<N: Notifier>(shell: &mut Shell<N>) -> anyhow::Result<()> {
    let messages = shell.drain_messages();
    if messages.is_empty() {
        return Ok(());
    }
    let mut out = io::stdout().lock();
    for message in messages {
        writeln!(out, "{message}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datetime::Clock;
    use crate::notify::RecordingNotifier;
    use crate::render::{RecordingSurface, Renderer};
    use crate::storage::{MemoryKvStore, StorageAdapter};

    fn settings(assume_yes: bool) -> ShellSettings {
        ShellSettings {
            assume_yes,
            reminder_interval: Duration::from_secs(1),
            search_debounce: Duration::from_millis(90),
        }
    }

    fn shell(assume_yes: bool) -> (Shell<RecordingNotifier>, RecordingSurface) {
        let surface = RecordingSurface::new();
        let app = App::new(
            StorageAdapter::new(MemoryKvStore::new()),
            RecordingNotifier::default(),
            Renderer::new(Box::new(surface.clone())),
            Clock::with_zone(chrono_tz::UTC),
        );
        (Shell::new(app, settings(assume_yes)), surface)
    }

    #[test]
    fn form_and_submit_create_task() {
        let (mut shell, _) = shell(true);
        shell.handle_line("form title Water plants");
        shell.handle_line("form priority high");
        shell.handle_line("submit");

        let tasks = shell.app().tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Water plants");
        assert_eq!(tasks[0].priority.as_str(), "high");
        assert!(shell.drain_messages()[0].starts_with("Created task"));
    }

    #[test]
    fn removal_waits_for_confirmation() {
        let (mut shell, _) = shell(false);
        shell.handle_line("add Keep");
        shell.drain_messages();

        shell.handle_line("rm 1");
        assert_eq!(shell.drain_messages(), [format!("{REMOVE_PROMPT} [y/N]")]);
        shell.handle_line("n");
        assert_eq!(shell.app().tasks().len(), 1);

        shell.handle_line("rm 1");
        shell.handle_line("y");
        assert!(shell.app().tasks().is_empty());
    }

    #[test]
    fn edit_commands_drive_the_modal() {
        let (mut shell, _) = shell(true);
        shell.handle_line("add Draft");
        shell.handle_line("open 1");
        assert!(shell.app().modal().is_open());
        shell.handle_line("set progress abc");
        shell.handle_line("save");
        assert!(shell.app().modal().is_open());
        assert!(shell.drain_messages().iter().any(|m| m.contains("Progress must be a number")));

        shell.handle_line("set progress 100");
        shell.handle_line("save");
        assert!(!shell.app().modal().is_open());
        assert!(shell.app().tasks()[0].completed);
    }

    #[test]
    fn errors_are_reported_not_fatal() {
        let (mut shell, _) = shell(true);
        assert_eq!(shell.handle_line("toggle 9"), Flow::Continue);
        assert_eq!(shell.handle_line("filter nope"), Flow::Continue);
        let messages = shell.drain_messages();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.starts_with("error:")));
        assert_eq!(shell.handle_line("quit"), Flow::Quit);
    }

    #[tokio::test]
    async fn notify_starts_reminder_timer() {
        let (mut shell, _) = shell(true);
        assert!(!shell.timer().is_running());

        shell.handle_line("notify");
        assert!(shell.timer().is_running());
        assert_eq!(shell.app().notifier().titles(), ["Notifications Enabled!"]);

        shell.handle_line("notify revoke");
        assert!(!shell.timer().is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn search_is_debounced() {
        let (mut shell, surface) = shell(true);
        shell.handle_line("add Buy milk");
        shell.handle_line("add Call mom");
        let frames = surface.frame_count();

        shell.handle_line("search mi");
        shell.handle_line("search milk");
        assert!(shell.search_pending());
        assert_eq!(surface.frame_count(), frames);

        let query = shell.search.ready().await;
        shell.apply_search(query);
        assert_eq!(shell.app().view_state().search, "milk");
        assert_eq!(surface.frame_count(), frames + 1);
    }
}
