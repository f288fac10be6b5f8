use tracing::{debug, info, instrument};

use crate::cache::{PendingUpdate, Settled, TaskCache, UpdateError};
use crate::filter::Filter;
use crate::sync::{TaskStore, push_update};
use crate::task::{Task, TaskId, TaskStatus};

#[derive(Debug, Clone)]
pub struct Column<'a> {
    pub status: TaskStatus,
    pub tasks: Vec<&'a Task>,
}

/// Visible tasks per status, one column per status in board order.
///
/// Tasks with a status outside the fixed set belong to no column and are not
/// displayed.
pub fn partition<'a>(cache: &'a TaskCache, filter: &Filter) -> Vec<Column<'a>> {
    let columns: Vec<Column<'a>> = TaskStatus::COLUMNS
        .iter()
        .map(|status| Column {
            status: status.clone(),
            tasks: cache
                .tasks()
                .iter()
                .filter(|task| task.status == *status && filter.matches(task))
                .collect(),
        })
        .collect();

    let hidden = undisplayed(cache);
    if hidden > 0 {
        debug!(hidden, "tasks with unknown status left off the board");
    }
    columns
}

/// Number of cached tasks no column accepts.
pub fn undisplayed(cache: &TaskCache) -> usize {
    cache.tasks().iter().filter(|task| !task.status.is_known()).count()
}

/// Ids of the visible tasks, in the order the board shows them.
pub fn visible_ids(cache: &TaskCache, filter: &Filter) -> Vec<TaskId> {
    partition(cache, filter)
        .into_iter()
        .flat_map(|column| column.tasks)
        .filter_map(|task| task.id.clone())
        .collect()
}

/// One drag interaction: the dragged task and where it was picked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragSession {
    task_id: TaskId,
    origin: TaskStatus,
}

impl DragSession {
    /// `None` when the task is not on the board.
    pub fn start(cache: &TaskCache, id: &TaskId) -> Option<Self> {
        let task = cache.find(id)?;
        if !task.status.is_known() {
            return None;
        }
        Some(Self {
            task_id: id.clone(),
            origin: task.status.clone(),
        })
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn origin(&self) -> &TaskStatus {
        &self.origin
    }
}

#[derive(Debug)]
pub enum DropOutcome {
    /// Dropped back on the column it already sits in.
    Unchanged,
    Moved(PendingUpdate),
}

/// Moves the dragged task into `target` optimistically. The returned update
/// still has to be sent.
#[instrument(skip_all, fields(id = %session.task_id, target = %target))]
pub fn handle_drop(
    cache: &mut TaskCache,
    session: DragSession,
    target: TaskStatus,
) -> Result<DropOutcome, UpdateError> {
    if !target.is_known() {
        return Err(UpdateError::NoSuchColumn(target.to_string()));
    }

    let current = cache
        .find(&session.task_id)
        .map(|task| task.status.clone())
        .ok_or_else(|| UpdateError::NotFound(session.task_id.clone()))?;
    // Dropping back where the card was picked up cancels the drag, even if
    // the task changed column in the meantime.
    if session.origin == target || current == target {
        debug!(origin = %session.origin, current = %current, "dropped on its own column");
        return Ok(DropOutcome::Unchanged);
    }

    let pending = cache.begin_update(&session.task_id, |task| {
        task.status = target.clone();
        Ok(())
    })?;
    info!(from = %current, "task moved");
    Ok(DropOutcome::Moved(pending))
}

/// [`handle_drop`] followed by the remote update. `None` when nothing moved.
pub async fn drop_task<S: TaskStore>(
    cache: &mut TaskCache,
    store: &S,
    session: DragSession,
    target: TaskStatus,
) -> Result<Option<Settled>, UpdateError> {
    match handle_drop(cache, session, target)? {
        DropOutcome::Unchanged => Ok(None),
        DropOutcome::Moved(pending) => Ok(Some(push_update(cache, store, pending).await)),
    }
}
