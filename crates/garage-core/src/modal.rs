use tracing::{debug, info, warn};

use crate::error::{GarageError, Result};
use crate::store::TaskStore;
use crate::task::{DraftField, TaskDraft, TaskId};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ModalState {
    #[default]
    Closed,
    Open { task_id: TaskId, draft: TaskDraft },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalKey {
    Escape,
    Other,
}

/// Edit dialog bound to at most one task.
#[derive(Debug, Clone, Default)]
pub struct EditModal {
    state: ModalState,
}

impl EditModal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ModalState {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, ModalState::Open { .. })
    }

    pub fn editing(&self) -> Option<&TaskId> {
        match &self.state {
            ModalState::Open { task_id, .. } => Some(task_id),
            ModalState::Closed => None,
        }
    }

    pub fn draft(&self) -> Option<&TaskDraft> {
        match &self.state {
            ModalState::Open { draft, .. } => Some(draft),
            ModalState::Closed => None,
        }
    }

    /// Fills the draft from the task. Unknown ids leave the modal as it was.
    #[tracing::instrument(skip(self, store), fields(id = %id))]
    pub fn open(&mut self, store: &TaskStore, id: &TaskId) -> Result<()> {
        let task = store.get(id).ok_or_else(|| {
            warn!("task to edit not found");
            GarageError::not_found(id.as_str())
        })?;

        self.state = ModalState::Open {
            task_id: id.clone(),
            draft: TaskDraft::from_task(task),
        };
        debug!("edit modal opened");
        Ok(())
    }

    /// Returns `false` when no task is being edited.
    pub fn set_field(&mut self, field: DraftField, value: impl Into<String>) -> bool {
        match &mut self.state {
            ModalState::Open { draft, .. } => {
                draft.set(field, value);
                true
            }
            ModalState::Closed => false,
        }
    }

    /// Commits the draft through [`TaskStore::update`].
    ///
    /// Returns the committed id, or `None` when the modal was already
    /// closed. Validation and storage failures keep the dialog open with the
    /// draft intact; a task that vanished meanwhile closes it.
    #[tracing::instrument(skip(self, store))]
    pub fn save(&mut self, store: &mut TaskStore) -> Result<Option<TaskId>> {
        let ModalState::Open { task_id, draft } = &self.state else {
            return Ok(None);
        };
        let task_id = task_id.clone();

        let input = draft.parse()?;
        match store.update(&task_id, input) {
            Ok(()) => {
                info!(id = %task_id, "edit saved");
                self.close();
                Ok(Some(task_id))
            }
            Err(err @ GarageError::NotFound { .. }) => {
                self.close();
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    pub fn cancel(&mut self) {
        self.close();
    }

    pub fn backdrop_click(&mut self) {
        self.close();
    }

    /// Escape closes an open dialog; returns whether it did.
    pub fn key_press(&mut self, key: ModalKey) -> bool {
        if key == ModalKey::Escape && self.is_open() {
            self.close();
            return true;
        }
        false
    }

    fn close(&mut self) {
        if self.is_open() {
            debug!("edit modal closed");
        }
        self.state = ModalState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TITLE_REQUIRED;
    use crate::storage::{MemoryKvStore, StorageAdapter};
    use crate::task::TaskInput;

    fn store_with_task() -> (TaskStore, TaskId) {
        let mut store = TaskStore::new(Vec::new(), StorageAdapter::new(MemoryKvStore::new()));
        let id = store
            .create(TaskInput {
                notes: "Q3 numbers".into(),
                progress: 30,
                ..TaskInput::titled("Write report")
            })
            .expect("create");
        (store, id)
    }

    #[test]
    fn open_populates_draft_from_task() {
        let (store, id) = store_with_task();
        let mut modal = EditModal::new();
        modal.open(&store, &id).expect("open");

        let draft = modal.draft().expect("open draft");
        assert_eq!(draft.title, "Write report");
        assert_eq!(draft.notes, "Q3 numbers");
        assert_eq!(draft.progress, "30");
        assert_eq!(draft.priority, "medium");
        assert_eq!(draft.due, "");
    }

    #[test]
    fn open_unknown_id_stays_closed() {
        let (store, _) = store_with_task();
        let mut modal = EditModal::new();
        let err = modal.open(&store, &TaskId::from("t_nope")).expect_err("unknown");
        assert!(err.is_not_found());
        assert!(!modal.is_open());
    }

    #[test]
    fn save_commits_and_closes() {
        let (mut store, id) = store_with_task();
        let mut modal = EditModal::new();
        modal.open(&store, &id).expect("open");
        assert!(modal.set_field(DraftField::Progress, "100"));

        let saved = modal.save(&mut store).expect("save");
        assert_eq!(saved, Some(id.clone()));
        assert!(!modal.is_open());
        assert!(store.get(&id).expect("present").completed);
    }

    #[test]
    fn invalid_draft_keeps_modal_open() {
        let (mut store, id) = store_with_task();
        let mut modal = EditModal::new();
        modal.open(&store, &id).expect("open");
        modal.set_field(DraftField::Title, "  ");

        let err = modal.save(&mut store).expect_err("blank title");
        assert_eq!(err.to_string(), TITLE_REQUIRED);
        assert!(modal.is_open());
        assert_eq!(store.get(&id).expect("present").title, "Write report");
    }

    #[test]
    fn cancel_backdrop_and_escape_discard_edits() {
        let (store, id) = store_with_task();
        let mut modal = EditModal::new();

        modal.open(&store, &id).expect("open");
        modal.set_field(DraftField::Title, "changed");
        modal.cancel();
        assert!(!modal.is_open());

        modal.open(&store, &id).expect("open");
        modal.backdrop_click();
        assert!(!modal.is_open());

        modal.open(&store, &id).expect("open");
        assert!(!modal.key_press(ModalKey::Other));
        assert!(modal.key_press(ModalKey::Escape));
        assert!(!modal.key_press(ModalKey::Escape));
        assert_eq!(store.get(&id).expect("present").title, "Write report");
    }
}
