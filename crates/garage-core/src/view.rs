//! Display derivation: search, status filter, sort, and the view tree.
//!
//! Everything here is a pure function of the task snapshot and the current
//! [`ViewState`]; the store is never mutated.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::datetime::{self, Clock};
use crate::error::GarageError;
use crate::modal::{EditModal, ModalState};
use crate::prefs::Presentation;
use crate::task::{Task, TaskDraft};
use crate::vdom::{Element, VNode};

pub const EMPTY_STATE_TEXT: &str = "No tasks to show. Add one above to get started.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Completed,
    Overdue,
}

impl StatusFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Overdue => "overdue",
        }
    }

    pub fn admits(self, task: &Task, today: NaiveDate) -> bool {
        match self {
            Self::All => true,
            Self::Active => !task.completed,
            Self::Completed => task.completed,
            Self::Overdue => task.is_overdue(today),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = GarageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "overdue" => Ok(Self::Overdue),
            other => Err(GarageError::validation(
                "filter",
                format!("unknown filter `{other}` (expected all, active, completed, overdue)"),
            )),
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
    DueAsc,
    DueDesc,
    Priority,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Newest => "newest",
            Self::Oldest => "oldest",
            Self::DueAsc => "due_asc",
            Self::DueDesc => "due_desc",
            Self::Priority => "priority",
        }
    }

    /// Stable; tasks without a due date trail both due orders.
    pub fn compare(self, a: &Task, b: &Task) -> Ordering {
        match self {
            Self::Newest => b.created_at.cmp(&a.created_at),
            Self::Oldest => a.created_at.cmp(&b.created_at),
            Self::DueAsc => due_absent_last(a.due, b.due, |x, y| x.cmp(&y)),
            Self::DueDesc => due_absent_last(a.due, b.due, |x, y| y.cmp(&x)),
            Self::Priority => a.priority.rank().cmp(&b.priority.rank()),
        }
    }
}

fn due_absent_last(
    a: Option<NaiveDate>,
    b: Option<NaiveDate>,
    present: impl Fn(NaiveDate, NaiveDate) -> Ordering,
) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => present(x, y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl FromStr for SortOrder {
    type Err = GarageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest" => Ok(Self::Newest),
            "oldest" => Ok(Self::Oldest),
            "due_asc" => Ok(Self::DueAsc),
            "due_desc" => Ok(Self::DueDesc),
            "priority" => Ok(Self::Priority),
            other => Err(GarageError::validation(
                "sort",
                format!("unknown sort `{other}` (expected newest, oldest, due_asc, due_desc, priority)"),
            )),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    pub search: String,
    pub filter: StatusFilter,
    pub sort: SortOrder,
}

/// Case-insensitive substring match on title, notes, or the ISO due date.
/// A blank query matches everything.
pub fn matches_search(task: &Task, query: &str) -> bool {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    task.title.to_lowercase().contains(&needle)
        || task.notes.to_lowercase().contains(&needle)
        || task.due_iso().map(|due| due.contains(&needle)).unwrap_or(false)
}

#[tracing::instrument(level = "debug", skip(tasks, state), fields(total = tasks.len(), filter = %state.filter, sort = %state.sort))]
pub fn derive<'a>(tasks: &'a [Task], state: &ViewState, today: NaiveDate) -> Vec<&'a Task> {
    let mut list: Vec<&Task> = tasks
        .iter()
        .filter(|task| matches_search(task, &state.search))
        .filter(|task| state.filter.admits(task, today))
        .collect();
    list.sort_by(|a, b| state.sort.compare(a, b));
    tracing::debug!(shown = list.len(), "derived display list");
    list
}

/// Mean of per-task progress over every task, completed ones counting as
/// 100. `None` for an empty list.
pub fn aggregate_progress(tasks: &[Task]) -> Option<f64> {
    if tasks.is_empty() {
        return None;
    }
    let total: u32 = tasks.iter().map(|task| u32::from(task.effective_progress())).sum();
    Some(f64::from(total) / tasks.len() as f64)
}

/// Inputs the tree builder needs besides the tasks themselves.
#[derive(Debug, Clone, Copy)]
pub struct ViewContext<'a> {
    pub clock: &'a Clock,
    pub today: NaiveDate,
    pub presentation: Presentation,
    pub modal: &'a EditModal,
}

/// Builds the full screen: presentation root, aggregate progress, the
/// task cards (or the empty placeholder), and the edit dialog.
pub fn build_view(tasks: &[Task], state: &ViewState, ctx: ViewContext<'_>) -> VNode {
    let list = derive(tasks, state, ctx.today);
    let empty = list.is_empty();

    let aggregate = aggregate_progress(tasks).unwrap_or(0.0);
    let overall = Element::new("div")
        .class("overall-progress")
        .hidden(empty)
        .child(
            Element::new("div")
                .class("overall-progress-fill")
                .attr("style", format!("width: {aggregate}%"))
                .attr("data-value", format!("{aggregate}")),
        )
        .child(
            Element::new("span")
                .class("overall-progress-label")
                .text(format!("{}% Overall Progress", aggregate.round())),
        );

    let container = Element::new("section")
        .class("task-list")
        .children(list.iter().map(|task| task_card(task, ctx.clock)));

    let placeholder = Element::new("p")
        .class("empty-state")
        .hidden(!empty)
        .text(EMPTY_STATE_TEXT);

    let presentation = ctx.presentation;
    Element::new("main")
        .class("app")
        .attr("data-theme", presentation.theme_attr())
        .attr("data-compact", presentation.compact_attr())
        .attr("style", format!("--radius: {}", presentation.radius()))
        .attr("data-filter", state.filter.as_str())
        .attr("data-sort", state.sort.as_str())
        .child(overall)
        .child(container)
        .child(placeholder)
        .child(edit_dialog(ctx.modal))
        .into()
}

fn task_card(task: &Task, clock: &Clock) -> Element {
    let mut title = Element::new("span").class("title").text(task.title.clone());
    if task.completed {
        title = title
            .class("strike")
            .attr("style", "text-decoration: line-through; opacity: 0.7");
    }

    let heading = Element::new("h3")
        .child(
            Element::new("input")
                .class("checkbox")
                .attr("type", "checkbox")
                .attr("checked", task.completed.to_string())
                .attr("aria-label", "Mark complete")
                .attr("data-action", "toggle"),
        )
        .child(title);

    let left = Element::new("div")
        .class("left")
        .child(heading)
        .child(Element::new("p").class("notes").text(task.notes.clone()));

    let progress = Element::new("div")
        .class("progress-wrapper")
        .child(
            Element::new("div")
                .class("progress-bar")
                .attr("style", format!("width: {}%", task.progress))
                .attr("data-value", task.progress.to_string()),
        )
        .child(
            Element::new("span")
                .class("progress-label")
                .text(format!("{}% Complete", task.progress)),
        );

    let mut meta = Element::new("div")
        .class("meta")
        .child(pill("priority", task.priority.label()));
    if let Some(due) = task.due {
        meta = meta.child(pill("due", format!("Due: {}", datetime::format_due_label(due))));
    }
    meta = meta.child(pill("created", format!("Added: {}", clock.format_datetime(task.created_at))));
    if task.completed {
        meta = meta.child(pill("done", "Completed"));
    }

    let actions = Element::new("div")
        .class("actions")
        .child(icon_button("edit", "Edit task"))
        .child(icon_button("delete", "Delete task"));

    Element::new("article")
        .key(task.id.as_str())
        .class("task")
        .class(format!("priority-{}", task.priority.as_str()))
        .class_if(task.completed, "completed")
        .attr("data-id", task.id.as_str())
        .child(left)
        .child(progress)
        .child(meta)
        .child(actions)
}

fn pill(kind: &str, text: impl Into<String>) -> Element {
    Element::new("span").class("pill").class(kind).text(text)
}

fn icon_button(action: &str, title: &str) -> Element {
    Element::new("button")
        .class("icon-btn")
        .class(action)
        .attr("type", "button")
        .attr("title", title)
        .attr("data-action", action)
        .text(action)
}

fn edit_dialog(modal: &EditModal) -> Element {
    let dialog = Element::new("div").class("modal").attr("id", "editModal");
    match modal.state() {
        ModalState::Closed => dialog.attr("aria-hidden", "true").hidden(true),
        ModalState::Open { task_id, draft } => dialog
            .class("open")
            .attr("aria-hidden", "false")
            .attr("data-id", task_id.as_str())
            .child(Element::new("h2").text("Edit task"))
            .children(draft_fields(draft)),
    }
}

fn draft_fields(draft: &TaskDraft) -> Vec<Element> {
    [
        ("title", draft.title.as_str()),
        ("notes", draft.notes.as_str()),
        ("due", draft.due.as_str()),
        ("priority", draft.priority.as_str()),
        ("progress", draft.progress.as_str()),
    ]
    .into_iter()
    .map(|(name, value)| {
        Element::new("label")
            .class("field")
            .attr("name", name)
            .attr("value", value)
            .text(format!("{name}: {value}"))
    })
    .collect()
}
