//! In-place editing of a single task field, and the multi-field form.

use std::fmt;
use std::str::FromStr;

use chrono::Local;
use tracing::{debug, info, instrument};

use crate::cache::{PendingUpdate, Settled, TaskCache, UpdateError};
use crate::sync::{SyncError, TaskStore, push_update};
use crate::task::{FieldError, Task, TaskId, is_date_field, is_read_only_field};

pub const NO_TAGS_LABEL: &str = "[no tags]";

/// Fields a task card lets the user edit in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditableField {
    Title,
    Tags,
    Pending,
    Estimation,
}

impl EditableField {
    pub fn name(self) -> &'static str {
        match self {
            EditableField::Title => "title",
            EditableField::Tags => "tags",
            EditableField::Pending => "pending",
            EditableField::Estimation => "estimation",
        }
    }

    /// Whether a blank or whitespace-only value may be saved.
    pub fn admits_blank(self) -> bool {
        matches!(self, EditableField::Tags)
    }

    fn is_hours(self) -> bool {
        matches!(self, EditableField::Pending | EditableField::Estimation)
    }

    fn unchanged(self, cached: &str, input: &str) -> bool {
        if cached == input {
            return true;
        }
        if self.is_hours()
            && let (Ok(a), Ok(b)) = (cached.trim().parse::<f64>(), input.trim().parse::<f64>())
        {
            return a == b;
        }
        false
    }
}

impl FromStr for EditableField {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "title" => Ok(EditableField::Title),
            "tags" => Ok(EditableField::Tags),
            "pending" => Ok(EditableField::Pending),
            "estimation" => Ok(EditableField::Estimation),
            other if is_read_only_field(other) => Err(FieldError::ReadOnly(other.to_string())),
            other => Err(FieldError::NotEditable(other.to_string())),
        }
    }
}

impl fmt::Display for EditableField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Card label for a field.
pub fn label(task: &Task, field: EditableField) -> String {
    let value = task.field_value(field.name()).unwrap_or_default();
    if field == EditableField::Tags && value.trim().is_empty() {
        NO_TAGS_LABEL.to_string()
    } else {
        value
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditState {
    Idle,
    Editing { buffer: String },
    Committing,
    Confirmed(Task),
    RolledBack,
    Failed(String),
}

#[derive(Debug)]
pub enum Exit {
    /// The session already left `Editing`; nothing happened.
    AlreadyExited,
    /// Back to the label, no request made.
    Reverted,
    /// The value is in the cache; send the update.
    Commit(PendingUpdate),
}

/// Editing one field of one task directly on its card.
#[derive(Debug, Clone)]
pub struct EditSession {
    task_id: TaskId,
    field: EditableField,
    state: EditState,
}

impl EditSession {
    pub fn new(task_id: TaskId, field: EditableField) -> Self {
        Self {
            task_id,
            field,
            state: EditState::Idle,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn field(&self) -> EditableField {
        self.field
    }

    pub fn state(&self) -> &EditState {
        &self.state
    }

    /// Replaces the label with a text box holding the cached value.
    pub fn activate(&mut self, cache: &TaskCache) -> Result<String, UpdateError> {
        let task = cache
            .find(&self.task_id)
            .ok_or_else(|| UpdateError::NotFound(self.task_id.clone()))?;
        let buffer = task.field_value(self.field.name()).unwrap_or_default();
        self.state = EditState::Editing {
            buffer: buffer.clone(),
        };
        Ok(buffer)
    }

    pub fn input(&mut self, text: &str) {
        if let EditState::Editing { buffer } = &mut self.state {
            *buffer = text.to_string();
        }
    }

    /// The text box lost focus.
    pub fn focus_out(&mut self, cache: &mut TaskCache) -> Exit {
        self.exit(cache)
    }

    /// The commit keystroke; same exit path as losing focus.
    pub fn submit(&mut self, cache: &mut TaskCache) -> Exit {
        self.exit(cache)
    }

    #[instrument(skip(self, cache), fields(id = %self.task_id, field = %self.field))]
    fn exit(&mut self, cache: &mut TaskCache) -> Exit {
        // Only the first exit out of Editing counts.
        let buffer = match std::mem::replace(&mut self.state, EditState::RolledBack) {
            EditState::Editing { buffer } => buffer,
            other => {
                self.state = other;
                return Exit::AlreadyExited;
            }
        };

        let Some(cached) = cache
            .find(&self.task_id)
            .and_then(|task| task.field_value(self.field.name()))
        else {
            debug!("task left the cache during the edit");
            return Exit::Reverted;
        };

        if self.field.unchanged(&cached, &buffer) {
            debug!("value unchanged");
            return Exit::Reverted;
        }
        if !self.field.admits_blank() && buffer.trim().is_empty() {
            debug!("blank value rejected");
            return Exit::Reverted;
        }

        let name = self.field.name();
        match cache.begin_update(&self.task_id, |task| task.set_field(name, &buffer)) {
            Ok(pending) => {
                self.state = EditState::Committing;
                Exit::Commit(pending)
            }
            Err(err) => {
                debug!(error = %err, "edit rejected");
                Exit::Reverted
            }
        }
    }

    /// Settles the store response for the update returned by an exit.
    pub fn settle(
        &mut self,
        cache: &mut TaskCache,
        pending: PendingUpdate,
        result: Result<Task, SyncError>,
    ) -> &EditState {
        let settled = cache.settle(pending, result);
        self.record(cache, settled)
    }

    fn record(&mut self, cache: &TaskCache, settled: Settled) -> &EditState {
        self.state = match settled {
            Settled::Applied(task) => EditState::Confirmed(task),
            Settled::Stale => match cache.find(&self.task_id) {
                Some(task) => EditState::Confirmed(task.clone()),
                None => EditState::RolledBack,
            },
            Settled::Orphaned => EditState::RolledBack,
            Settled::Failed { error, .. } => EditState::Failed(error.to_string()),
        };
        &self.state
    }

    /// Commit keystroke plus the remote round trip.
    pub async fn commit<S: TaskStore>(&mut self, cache: &mut TaskCache, store: &S) -> &EditState {
        if let Exit::Commit(pending) = self.submit(cache) {
            let settled = push_update(cache, store, pending).await;
            self.record(cache, settled);
        }
        &self.state
    }

    /// A confirmed title edit refreshes an open form on the same task.
    pub fn refresh_form(&self, form: &mut FormEditor) -> bool {
        match &self.state {
            EditState::Confirmed(task) if self.field == EditableField::Title => form.follow(task),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormRow {
    pub key: String,
    pub value: String,
    pub read_only: bool,
    pub date: bool,
}

/// Every field of one task as an editable table, sorted by key.
#[derive(Debug, Clone)]
pub struct FormEditor {
    bound: Task,
    rows: Vec<FormRow>,
}

impl FormEditor {
    pub fn open(task: &Task) -> Self {
        Self {
            bound: task.clone(),
            rows: form_rows(task),
        }
    }

    pub fn task(&self) -> &Task {
        &self.bound
    }

    pub fn rows(&self) -> &[FormRow] {
        &self.rows
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), FieldError> {
        let row = self
            .rows
            .iter_mut()
            .find(|row| row.key == key)
            .ok_or_else(|| FieldError::NotEditable(key.to_string()))?;
        if row.read_only {
            return Err(FieldError::ReadOnly(key.to_string()));
        }
        row.value = value.to_string();
        Ok(())
    }

    /// Writes every edited row onto `task`.
    fn apply(&self, task: &mut Task) -> Result<(), FieldError> {
        for row in self.rows.iter().filter(|row| !row.read_only) {
            if self.bound.field_value(&row.key).as_deref() == Some(row.value.as_str()) {
                continue;
            }
            task.set_field(&row.key, &row.value)?;
        }
        Ok(())
    }

    /// Optimistic write of all editable rows at once.
    pub fn begin_save(&self, cache: &mut TaskCache) -> Result<PendingUpdate, UpdateError> {
        let id = self
            .bound
            .id
            .clone()
            .ok_or_else(|| UpdateError::Field(FieldError::NotEditable("id".to_string())))?;
        cache.begin_update(&id, |task| self.apply(task))
    }

    /// Saves and stays open on the refreshed entity.
    #[instrument(skip_all, fields(id = ?self.bound.id))]
    pub async fn save<S: TaskStore>(&mut self, cache: &mut TaskCache, store: &S) -> Result<&Task, UpdateError> {
        let pending = self.begin_save(cache)?;
        let id = pending.id().clone();
        match push_update(cache, store, pending).await {
            Settled::Applied(task) => {
                info!("form saved");
                self.rebind(&task);
            }
            Settled::Stale => {
                if let Some(task) = cache.find(&id).cloned() {
                    self.rebind(&task);
                }
            }
            Settled::Orphaned => return Err(UpdateError::NotFound(id)),
            Settled::Failed { error, .. } => return Err(UpdateError::Sync(error)),
        }
        Ok(&self.bound)
    }

    /// Rebinds to `task` if it is the one this form shows.
    pub fn follow(&mut self, task: &Task) -> bool {
        if self.bound.id.is_some() && self.bound.id == task.id {
            self.rebind(task);
            true
        } else {
            false
        }
    }

    fn rebind(&mut self, task: &Task) {
        self.bound = task.clone();
        self.rows = form_rows(task);
    }
}

fn form_rows(task: &Task) -> Vec<FormRow> {
    task.field_names()
        .into_iter()
        .map(|key| {
            let date = is_date_field(&key);
            let value = if date {
                let at = match key.as_str() {
                    "createdAt" => task.created_at,
                    _ => task.updated_at,
                };
                at.map(|at| at.with_timezone(&Local).format("%a %b %d %Y %H:%M:%S %z").to_string())
                    .unwrap_or_default()
            } else {
                task.field_value(&key).unwrap_or_default()
            };
            FormRow {
                read_only: is_read_only_field(&key),
                date,
                key,
                value,
            }
        })
        .collect()
}
