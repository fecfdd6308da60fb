//! In-memory task list with write-through persistence.
//!
//! The store is the only owner of task records. Every mutation updates the
//! list, bumps the revision counter observed by the view layer, and saves
//! before returning. When the save fails the mutation is kept in memory and
//! the caller receives [`GarageError::Storage`].

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{GarageError, PROGRESS_INVALID, Result, TITLE_REQUIRED};
use crate::storage::StorageAdapter;
use crate::task::{Task, TaskId, TaskInput};

#[derive(Debug, Clone)]
pub struct TaskStore {
    tasks: Vec<Task>,
    storage: StorageAdapter,
    revision: u64,
}

impl TaskStore {
    pub fn new(tasks: Vec<Task>, storage: StorageAdapter) -> Self {
        Self {
            tasks,
            storage,
            revision: 0,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| &task.id == id)
    }

    /// Bumped by every mutation, including ones whose save failed.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn create(&mut self, input: TaskInput) -> Result<TaskId> {
        self.create_at(input, Utc::now())
    }

    #[tracing::instrument(skip(self, input, now))]
    pub fn create_at(&mut self, input: TaskInput, now: DateTime<Utc>) -> Result<TaskId> {
        let progress = validate(&input)?;
        let task = Task::new(input, progress, now);
        let id = task.id.clone();

        self.tasks.push(task);
        info!(id = %id, count = self.tasks.len(), "task created");
        self.persist()?;
        Ok(id)
    }

    /// Replaces the editable fields. Completion follows progress and any
    /// earlier reminder state is forgotten.
    #[tracing::instrument(skip(self, input), fields(id = %id))]
    pub fn update(&mut self, id: &TaskId, input: TaskInput) -> Result<()> {
        let idx = self.index_of(id)?;
        let progress = validate(&input)?;

        let task = &mut self.tasks[idx];
        task.title = input.title.trim().to_string();
        task.notes = input.notes.trim().to_string();
        task.due = input.due;
        task.priority = input.priority;
        task.progress = progress;
        task.completed = progress == 100;
        task.last_notified = None;

        info!(completed = task.completed, progress, "task updated");
        self.persist()
    }

    /// Completing sets progress to 100; reopening resets it to 0, so partial
    /// progress does not survive a round trip.
    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn toggle_complete(&mut self, id: &TaskId) -> Result<bool> {
        let idx = self.index_of(id)?;
        let task = &mut self.tasks[idx];
        task.completed = !task.completed;
        task.progress = if task.completed { 100 } else { 0 };
        let completed = task.completed;

        info!(completed, "task toggled");
        self.persist()?;
        Ok(completed)
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn remove(&mut self, id: &TaskId) -> Result<Task> {
        let idx = self.index_of(id)?;
        let removed = self.tasks.remove(idx);

        info!(count = self.tasks.len(), "task removed");
        self.persist()?;
        Ok(removed)
    }

    /// Returns how many tasks were dropped. An empty store is left alone
    /// and nothing is written.
    #[tracing::instrument(skip(self))]
    pub fn clear_all(&mut self) -> Result<usize> {
        if self.tasks.is_empty() {
            debug!("clear requested on empty list; nothing to do");
            return Ok(0);
        }

        let removed = self.tasks.len();
        self.tasks.clear();
        info!(removed, "all tasks cleared");
        self.persist()?;
        Ok(removed)
    }

    /// Records a reminder without touching any user-visible field.
    #[tracing::instrument(skip(self, at), fields(id = %id))]
    pub fn mark_notified(&mut self, id: &TaskId, at: DateTime<Utc>) -> Result<()> {
        let idx = self.index_of(id)?;
        self.tasks[idx].last_notified = Some(at);
        debug!("reminder recorded");
        self.persist()
    }

    /// Replaces the list with what storage holds now, picking up writes
    /// made by other processes sharing the same data directory.
    #[tracing::instrument(skip(self, now))]
    pub fn reload(&mut self, now: DateTime<Utc>) {
        let (tasks, _) = self.storage.load_at(now);
        debug!(count = tasks.len(), "task list reloaded");
        self.tasks = tasks;
        self.revision += 1;
    }

    fn index_of(&self, id: &TaskId) -> Result<usize> {
        self.tasks
            .iter()
            .position(|task| &task.id == id)
            .ok_or_else(|| GarageError::not_found(id.as_str()))
    }

    fn persist(&mut self) -> Result<()> {
        self.revision += 1;
        if let Err(err) = self.storage.save_tasks(&self.tasks) {
            warn!(error = %err, revision = self.revision, "save failed; keeping in-memory state");
            return Err(err);
        }
        Ok(())
    }
}

/// Title must be non-blank. Negative progress is rejected while anything
/// above 100 is clamped.
fn validate(input: &TaskInput) -> Result<u8> {
    if input.title.trim().is_empty() {
        return Err(GarageError::validation("title", TITLE_REQUIRED));
    }
    if input.progress < 0 {
        return Err(GarageError::validation("progress", PROGRESS_INVALID));
    }
    Ok(input.progress.min(100) as u8)
}
