#![forbid(unsafe_code)]

use time::OffsetDateTime;

use crate::task::model::{Counts, Filter, Task};
use crate::task::storage::Persistence;

#[derive(Debug, Clone, PartialEq, Eq)]
struct EditState {
    id: u64,
    draft: String,
}

/// Owns the task list, the active filter and the edit in progress.
///
/// Every mutation that changes `tasks` writes a full snapshot through the
/// storage before returning. Filter and edit state are never persisted.
/// Write failures are logged and otherwise ignored; they never roll back or
/// corrupt in-memory state.
#[derive(Debug)]
pub struct TaskStore<P> {
    storage: P,
    tasks: Vec<Task>,
    filter: Filter,
    editing: Option<EditState>,
    last_id: u64,
}

impl<P: Persistence> TaskStore<P> {
    /// Hydrates the store from `storage`. A missing, unreadable or malformed
    /// snapshot starts the session with an empty list.
    pub fn open(storage: P) -> Self {
        let tasks = match storage.load() {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<Task>>(&raw) {
                Ok(tasks) => tasks,
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring malformed task snapshot");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to load task snapshot");
                Vec::new()
            }
        };
        let last_id = tasks.iter().map(|t| t.id).max().unwrap_or(0);
        tracing::debug!(count = tasks.len(), "task store opened");

        Self {
            storage,
            tasks,
            filter: Filter::All,
            editing: None,
            last_id,
        }
    }

    #[must_use]
    pub fn storage(&self) -> &P {
        &self.storage
    }

    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    #[must_use]
    pub fn get(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    #[must_use]
    pub fn filter(&self) -> Filter {
        self.filter
    }

    #[must_use]
    pub fn editing_id(&self) -> Option<u64> {
        self.editing.as_ref().map(|e| e.id)
    }

    #[must_use]
    pub fn edit_draft(&self) -> Option<&str> {
        self.editing.as_ref().map(|e| e.draft.as_str())
    }

    /// Appends a task built from the trimmed `raw_text`. Blank input is
    /// ignored and returns `None`.
    pub fn add_task(&mut self, raw_text: &str) -> Option<u64> {
        let text = raw_text.trim();
        if text.is_empty() {
            return None;
        }

        let now = now_millis_precision();
        let id = self.fresh_id(now);
        self.tasks.push(Task::new(id, text, now));
        tracing::debug!(id, "task added");
        self.persist();
        Some(id)
    }

    /// Flips `completed` on every task carrying `id`. Lists saved by the
    /// browser build can hold duplicate ids, and all of them move together.
    pub fn toggle_complete(&mut self, id: u64) -> bool {
        let mut hit = false;
        for task in self.tasks.iter_mut().filter(|t| t.id == id) {
            task.completed = !task.completed;
            hit = true;
        }
        if !hit {
            return false;
        }
        tracing::debug!(id, "task toggled");
        self.persist();
        true
    }

    /// Removes every task carrying `id`.
    pub fn delete_task(&mut self, id: u64) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        if self.tasks.len() == before {
            return false;
        }
        if self.editing_id() == Some(id) {
            self.editing = None;
        }
        tracing::debug!(id, removed = before - self.tasks.len(), "task deleted");
        self.persist();
        true
    }

    /// Opens `id` for editing with its current text as the draft. Unknown ids
    /// leave the edit state untouched.
    pub fn start_edit(&mut self, id: u64) -> bool {
        let Some(draft) = self.get(id).map(|t| t.text.clone()) else {
            return false;
        };
        self.editing = Some(EditState { id, draft });
        true
    }

    pub fn update_draft(&mut self, text: impl Into<String>) {
        if let Some(edit) = self.editing.as_mut() {
            edit.draft = text.into();
        }
    }

    /// Commits the trimmed draft. A blank draft is refused and the edit stays
    /// open.
    pub fn save_edit(&mut self) -> bool {
        let Some(edit) = self.editing.as_ref() else {
            return false;
        };
        let text = edit.draft.trim();
        if text.is_empty() {
            return false;
        }
        let id = edit.id;
        let text = text.to_owned();

        self.editing = None;
        let mut hit = false;
        for task in self.tasks.iter_mut().filter(|t| t.id == id) {
            task.text.clone_from(&text);
            hit = true;
        }
        if !hit {
            return false;
        }
        tracing::debug!(id, "task edited");
        self.persist();
        true
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
    }

    pub fn set_filter(&mut self, filter: Filter) {
        self.filter = filter;
    }

    /// Tasks matching the active filter, in insertion order.
    #[must_use]
    pub fn visible_tasks(&self) -> Vec<&Task> {
        self.tasks.iter().filter(|t| self.filter.matches(t)).collect()
    }

    #[must_use]
    pub fn counts(&self) -> Counts {
        Counts::of(&self.tasks)
    }

    fn fresh_id(&mut self, now: OffsetDateTime) -> u64 {
        let millis = u64::try_from(now.unix_timestamp_nanos() / 1_000_000).unwrap_or(0);
        if let Some(next) = self.last_id.checked_add(1) {
            let id = millis.max(next);
            self.last_id = id;
            return id;
        }
        // The id space above the largest id is exhausted; take the lowest gap.
        let lowest = (0..=u64::MAX)
            .find(|candidate| !self.tasks.iter().any(|t| t.id == *candidate))
            .unwrap_or(0);
        tracing::warn!(id = lowest, "task ids exhausted, reusing lowest free id");
        lowest
    }

    fn persist(&self) {
        let blob = match serde_json::to_string(&self.tasks) {
            Ok(blob) => blob,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize tasks");
                return;
            }
        };
        if let Err(e) = self.storage.save(&blob) {
            tracing::warn!(error = %e, "failed to persist tasks");
        }
    }
}

fn now_millis_precision() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_millisecond(now.millisecond()).unwrap_or(now)
}
