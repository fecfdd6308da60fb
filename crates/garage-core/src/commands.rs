use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{Context, anyhow};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::app::{App, AssumeYes, Confirm};
use crate::cli::{AddArgs, Command, EditArgs, ListArgs};
use crate::config::Config;
use crate::datetime::Clock;
use crate::notify::{Notifier, NullNotifier, PermissionState, TerminalNotifier};
use crate::reminder::CheckOutcome;
use crate::render::{NullSurface, Renderer, Surface, TerminalSurface};
use crate::runtime::{self, ReminderTimer};
use crate::shell::{self, ShellSettings};
use crate::storage::{FileKvStore, StorageAdapter};
use crate::task::DraftField;
use crate::view::ViewState;

/// Everything a command needs besides its own arguments.
#[derive(Debug, Clone)]
pub struct Session<'a> {
    pub cfg: &'a Config,
    pub data_dir: &'a Path,
    pub assume_yes: bool,
}

impl Session<'_> {
    fn color(&self) -> anyhow::Result<bool> {
        self.cfg.color()
    }

    /// Prompts on the terminal unless `--yes` was given or `confirm` is
    /// off.
    fn confirmer(&self) -> Box<dyn Confirm> {
        if self.assume_yes || !self.cfg.confirm() {
            Box::new(AssumeYes)
        } else {
            Box::new(StdinConfirm)
        }
    }
}

/// Reads a y/n answer from standard input.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&mut self, prompt: &str) -> bool {
        let mut err = io::stderr().lock();
        if write!(err, "{prompt} [y/N] ").and_then(|()| err.flush()).is_err() {
            return false;
        }
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        is_yes(&answer)
    }
}

pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Opens the on-disk store and wires the configured notifier.
pub fn build_app(session: &Session<'_>, surface: Box<dyn Surface>) -> anyhow::Result<App> {
    let kv = FileKvStore::open(session.data_dir)
        .with_context(|| format!("failed to open data directory {}", session.data_dir.display()))?;
    let storage = StorageAdapter::new(kv);
    let color = session.color()?;

    let notifier: Box<dyn Notifier> = if session.cfg.notifications() {
        Box::new(TerminalNotifier::stderr(storage.clone(), color))
    } else {
        Box::new(NullNotifier)
    };

    let clock = Clock::from_setting(session.cfg.timezone().as_deref());
    Ok(App::new(storage, notifier, Renderer::new(surface), clock))
}

#[instrument(skip(session, command))]
pub fn dispatch(session: &Session<'_>, command: Command) -> anyhow::Result<()> {
    debug!(?command, "dispatching command");

    match command {
        Command::Add(args) => cmd_add(session, args),
        Command::Edit(args) => cmd_edit(session, args),
        Command::Toggle { id } => cmd_toggle(session, &id),
        Command::Rm { id } => cmd_rm(session, &id),
        Command::Clear => cmd_clear(session),
        Command::List(args) => cmd_list(session, args),
        Command::Theme { theme } => {
            let mut app = build_app(session, Box::new(NullSurface))?;
            app.set_theme(theme)?;
            say(format_args!("Theme set to {theme}."))
        }
        Command::Compact { enabled } => {
            let mut app = build_app(session, Box::new(NullSurface))?;
            app.set_compact(enabled)?;
            say(format_args!("Compact layout {}.", if enabled { "on" } else { "off" }))
        }
        Command::Notify { revoke } => cmd_notify(session, revoke),
        Command::Remind { watch } => cmd_remind(session, watch),
        Command::Shell => {
            let app = build_app(session, Box::new(TerminalSurface::stdout(session.color()?)))?;
            shell::run(
                app,
                ShellSettings {
                    assume_yes: session.assume_yes || !session.cfg.confirm(),
                    reminder_interval: session.cfg.reminder_interval()?,
                    search_debounce: session.cfg.search_debounce()?,
                },
            )
        }
    }
}

#[instrument(skip(session, args))]
fn cmd_add(session: &Session<'_>, args: AddArgs) -> anyhow::Result<()> {
    info!("command add");
    let mut app = build_app(session, Box::new(NullSurface))?;

    app.set_form_field(DraftField::Title, args.title);
    app.set_form_field(DraftField::Notes, args.notes);
    app.set_form_field(DraftField::Due, args.due);
    app.set_form_field(DraftField::Priority, args.priority);
    app.set_form_field(DraftField::Progress, args.progress);

    let id = app.submit_form()?;
    say(format_args!("Created task {id}."))
}

#[instrument(skip(session, args), fields(id = %args.id))]
fn cmd_edit(session: &Session<'_>, args: EditArgs) -> anyhow::Result<()> {
    info!("command edit");
    let mut app = build_app(session, Box::new(NullSurface))?;
    let id = app.resolve(&args.id)?;
    app.open_edit(&id)?;

    let due = if args.no_due { Some(String::new()) } else { args.due };
    let changes = [
        (DraftField::Title, args.title),
        (DraftField::Notes, args.notes),
        (DraftField::Due, due),
        (DraftField::Priority, args.priority),
        (DraftField::Progress, args.progress),
    ];
    for (field, value) in changes {
        if let Some(value) = value {
            app.edit_set(field, value)?;
        }
    }

    match app.save_edit()? {
        Some(saved) => say(format_args!("Updated task {saved}.")),
        None => Err(anyhow!("edit dialog closed before saving")),
    }
}

fn cmd_toggle(session: &Session<'_>, token: &str) -> anyhow::Result<()> {
    let mut app = build_app(session, Box::new(NullSurface))?;
    let id = app.resolve(token)?;
    let completed = app.toggle(&id)?;
    say(format_args!(
        "Task {id} marked {}.",
        if completed { "complete" } else { "incomplete" }
    ))
}

fn cmd_rm(session: &Session<'_>, token: &str) -> anyhow::Result<()> {
    let mut app = build_app(session, Box::new(NullSurface))?;
    let id = app.resolve(token)?;
    let mut confirm = session.confirmer();
    match app.remove(&id, confirm.as_mut())? {
        Some(task) => say(format_args!("Deleted task {} ({}).", task.id, task.title)),
        None => say(format_args!("Kept task {id}.")),
    }
}

fn cmd_clear(session: &Session<'_>) -> anyhow::Result<()> {
    let mut app = build_app(session, Box::new(NullSurface))?;
    if app.store().is_empty() {
        return say(format_args!("Nothing to clear."));
    }
    let mut confirm = session.confirmer();
    match app.clear_all(confirm.as_mut())? {
        0 => say(format_args!("Nothing cleared.")),
        removed => say(format_args!("Cleared {removed} task(s).")),
    }
}

fn cmd_list(session: &Session<'_>, args: ListArgs) -> anyhow::Result<()> {
    let surface = TerminalSurface::stdout(session.color()?);
    let mut app = build_app(session, Box::new(surface))?;
    show_list(&mut app, args)?;
    Ok(())
}

/// Applies every list option before the single paint.
fn show_list<N: Notifier>(app: &mut App<N>, args: ListArgs) -> crate::error::Result<()> {
    app.set_view(ViewState {
        search: args.search,
        filter: args.filter,
        sort: args.sort,
    })
}

fn cmd_notify(session: &Session<'_>, revoke: bool) -> anyhow::Result<()> {
    let mut app = build_app(session, Box::new(NullSurface))?;
    if revoke {
        app.revoke_notifications()?;
        return say(format_args!("Reminders disabled."));
    }

    let state = app.request_notifications()?;
    say(format_args!("{}.", state.as_label()))
}

fn cmd_remind(session: &Session<'_>, watch: bool) -> anyhow::Result<()> {
    let mut app = build_app(session, Box::new(NullSurface))?;
    if app.notifier().permission() != PermissionState::Granted {
        return Err(anyhow!("notification permission not granted; run `garage notify` first"));
    }

    if !watch {
        let outcome = app.check_reminders();
        report_outcome(&outcome);
        return say(format_args!("{} reminder(s) sent.", outcome.sent.len()));
    }

    let interval = session.cfg.reminder_interval()?;
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    rt.block_on(async move {
        let token = CancellationToken::new();
        runtime::cancel_on_shutdown_signal(token.clone());
        watch_reminders(&mut app, interval, token).await;
    });
    say(format_args!("Stopped watching reminders."))
}

/// Checks on every tick until `token` is cancelled.
pub async fn watch_reminders<N: Notifier>(app: &mut App<N>, interval: std::time::Duration, token: CancellationToken) {
    let mut timer = ReminderTimer::new(interval);
    timer.start();
    check_latest(app);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = timer.tick() => {
                if !app.reminders_active() {
                    warn!("notification permission withdrawn; stopping reminders");
                    timer.stop();
                    break;
                }
                check_latest(app);
            }
        }
    }
}

/// Re-reads the stored list, then checks it.
fn check_latest<N: Notifier>(app: &mut App<N>) {
    if let Err(err) = app.reload() {
        warn!(error = %err, "repaint after reload failed");
    }
    report_outcome(&app.check_reminders());
}

fn report_outcome(outcome: &CheckOutcome) {
    for failure in &outcome.failures {
        warn!(error = %failure, "reminder check failure");
    }
    if !outcome.sent.is_empty() {
        info!(sent = outcome.sent.len(), "reminders sent");
    }
}

fn say(message: std::fmt::Arguments<'_>) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    writeln!(out, "{message}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::view::SortOrder;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn yes_answers() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("no"));
    }

    #[test]
    fn commands_round_trip_through_data_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = Config::default();
        cfg.apply_overrides(vec![("notifications".to_string(), "off".to_string())]);
        let session = Session {
            cfg: &cfg,
            data_dir: dir.path(),
            assume_yes: true,
        };

        dispatch(
            &session,
            Command::Add(AddArgs {
                title: "Pay rent".into(),
                priority: "high".into(),
                progress: "20".into(),
                ..AddArgs::default()
            }),
        )
        .expect("add");

        let app = build_app(&session, Box::new(NullSurface)).expect("reopen");
        assert_eq!(app.tasks().len(), 1);
        let id = app.tasks()[0].id.to_string();

        dispatch(
            &session,
            Command::Edit(EditArgs {
                id: id.clone(),
                progress: Some("100".into()),
                ..EditArgs::default()
            }),
        )
        .expect("edit");
        let app = build_app(&session, Box::new(NullSurface)).expect("reopen");
        assert!(app.tasks()[0].completed);

        dispatch(&session, Command::Rm { id }).expect("rm");
        let app = build_app(&session, Box::new(NullSurface)).expect("reopen");
        assert!(app.tasks().is_empty());
    }

    #[test]
    fn list_options_paint_a_single_frame() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = Config::default();
        cfg.apply_overrides(vec![("notifications".to_string(), "off".to_string())]);
        let session = Session {
            cfg: &cfg,
            data_dir: dir.path(),
            assume_yes: true,
        };
        for title in ["Buy milk", "Call mom"] {
            dispatch(
                &session,
                Command::Add(AddArgs {
                    title: title.into(),
                    progress: "0".into(),
                    ..AddArgs::default()
                }),
            )
            .expect("add");
        }

        let buf = SharedBuf::default();
        let mut app = build_app(&session, Box::new(TerminalSurface::new(buf.clone(), false))).expect("open");
        show_list(
            &mut app,
            ListArgs {
                search: "milk".into(),
                sort: SortOrder::DueAsc,
                ..ListArgs::default()
            },
        )
        .expect("list");

        let text = String::from_utf8_lossy(&buf.0.lock()).into_owned();
        assert_eq!(text.matches("taskgarage  filter:").count(), 1);
        assert!(text.contains("sort: due_asc"));
        assert!(text.contains("Buy milk"));
        assert!(!text.contains("Call mom"));
    }

    #[test]
    fn invalid_add_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = Config::default();
        let session = Session {
            cfg: &cfg,
            data_dir: dir.path(),
            assume_yes: true,
        };
        let err = dispatch(
            &session,
            Command::Add(AddArgs {
                title: "x".into(),
                progress: "-1".into(),
                ..AddArgs::default()
            }),
        )
        .expect_err("negative progress");
        assert!(err.to_string().contains("Progress must be a number"));
    }

    #[test]
    fn remind_requires_permission() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = Config::default();
        let session = Session {
            cfg: &cfg,
            data_dir: dir.path(),
            assume_yes: true,
        };
        assert!(dispatch(&session, Command::Remind { watch: false }).is_err());
    }
}
