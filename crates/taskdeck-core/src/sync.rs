//! Exchanges with the remote task store and the operations built on them.
//!
//! Every mutation follows the same protocol: write optimistically into the
//! [`TaskCache`], send the full task, then settle the response. Failures are
//! never applied to the cache.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::cache::{PendingUpdate, Settled, TaskCache, UpdateError};
use crate::git_status::StagingAction;
use crate::task::{Task, TaskId};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{msg}")]
    Status { status: u16, msg: String },
    #[error("{0}")]
    Rejected(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoMeta {
    #[serde(default)]
    pub branch: String,
}

impl RepoMeta {
    pub fn display_branch(&self) -> &str {
        if self.branch.trim().is_empty() {
            "[None]"
        } else {
            &self.branch
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Listing {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub meta: RepoMeta,
}

/// The remote authority for tasks.
pub trait TaskStore {
    /// Creates `draft` and returns it with its store-assigned id.
    fn create(&self, draft: &Task) -> impl Future<Output = Result<Task, SyncError>>;

    /// Sends the full field state and returns the canonical entity.
    fn update(&self, task: &Task) -> impl Future<Output = Result<Task, SyncError>>;

    /// Returns the store's message, if any.
    fn remove(&self, id: &TaskId) -> impl Future<Output = Result<Option<String>, SyncError>>;

    fn list(&self) -> impl Future<Output = Result<Listing, SyncError>>;

    fn commit_all(&self, message: &str) -> impl Future<Output = Result<(), SyncError>>;
}

/// Sends an optimistic write and settles the response into the cache.
#[instrument(skip_all, fields(id = %pending.id(), revision = pending.ticket().revision))]
pub async fn push_update<S>(cache: &mut TaskCache, store: &S, pending: PendingUpdate) -> Settled
where
    S: TaskStore,
{
    let result = store.update(pending.task()).await;
    if let Err(err) = result.as_ref() {
        error!(error = %err, "update failed");
    }
    cache.settle(pending, result)
}

#[instrument(skip_all)]
pub async fn load_board<S: TaskStore>(cache: &mut TaskCache, store: &S) -> Result<(), SyncError> {
    let listing = store.list().await?;
    info!(count = listing.tasks.len(), branch = %listing.meta.branch, "listing loaded");
    cache.load(listing);
    Ok(())
}

/// Creates a default task and caches the store's copy.
#[instrument(skip_all)]
pub async fn create_task<S: TaskStore>(cache: &mut TaskCache, store: &S) -> Result<Task, SyncError> {
    let created = store.create(&Task::draft()).await?;
    if created.id.is_none() {
        return Err(SyncError::Decode("created task has no id".to_string()));
    }
    cache.add(created.clone(), None);
    info!(id = ?created.id, "task created");
    Ok(created)
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    Deleted(Task),
    Declined,
}

/// Deletes a task once `confirm` agrees. Declining makes no call.
#[instrument(skip(cache, store, confirm), fields(id = %id))]
pub async fn delete_task<S, F>(
    cache: &mut TaskCache,
    store: &S,
    id: &TaskId,
    confirm: F,
) -> Result<DeleteOutcome, UpdateError>
where
    S: TaskStore,
    F: FnOnce(&Task) -> bool,
{
    let task = cache
        .find(id)
        .ok_or_else(|| UpdateError::NotFound(id.clone()))?;
    if !confirm(task) {
        info!("delete declined");
        return Ok(DeleteOutcome::Declined);
    }

    store.remove(id).await?;
    let removed = cache
        .remove(id)
        .ok_or_else(|| UpdateError::NotFound(id.clone()))?;
    info!("task deleted");
    Ok(DeleteOutcome::Deleted(removed))
}

/// Forces the git status for `action` and pushes the task.
#[instrument(skip(cache, store), fields(id = %id))]
pub async fn apply_staging<S: TaskStore>(
    cache: &mut TaskCache,
    store: &S,
    id: &TaskId,
    action: StagingAction,
) -> Result<Option<Task>, UpdateError> {
    let pending = cache.begin_update(id, |task| {
        task.git_status = action.target();
        Ok(())
    })?;
    Ok(push_update(cache, store, pending).await.into_result()?)
}

#[derive(Debug)]
pub enum CommitOutcome {
    /// No message; nothing was sent.
    Cancelled,
    /// The store committed. `reload` is the listing refresh that follows,
    /// which can fail on its own.
    Committed { reload: Result<(), SyncError> },
}

/// Commits staged tasks and reloads the listing. A blank or missing message
/// sends nothing.
#[instrument(skip_all)]
pub async fn commit_staged<S: TaskStore>(
    cache: &mut TaskCache,
    store: &S,
    message: Option<&str>,
) -> Result<CommitOutcome, SyncError> {
    let Some(message) = message.map(str::trim).filter(|msg| !msg.is_empty()) else {
        info!("commit cancelled");
        return Ok(CommitOutcome::Cancelled);
    };
    store.commit_all(message).await?;
    info!("tasks committed");

    let reload = load_board(cache, store).await;
    if let Err(err) = reload.as_ref() {
        error!(error = %err, "reload after commit failed");
    }
    Ok(CommitOutcome::Committed { reload })
}
