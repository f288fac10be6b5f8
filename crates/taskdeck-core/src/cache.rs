use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, instrument, warn};

use crate::sync::{Listing, RepoMeta, SyncError};
use crate::task::{FieldError, Task, TaskId, TaskStatus};

const EVENT_CAPACITY: usize = 64;

/// Change notifications for whatever renders the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Reset { count: usize },
    Inserted { id: TaskId, status: TaskStatus },
    Replaced { id: TaskId },
    Moved { id: TaskId, from: TaskStatus, to: TaskStatus },
    Removed { id: TaskId },
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("task {0} is not loaded")]
    NotFound(TaskId),
    #[error("no column for status {0:?}")]
    NoSuchColumn(String),
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Revision issued for one optimistic write. Revisions grow per task id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub id: TaskId,
    pub revision: u64,
}

/// An optimistic write already applied to the cache, waiting for the store.
#[derive(Debug, Clone)]
pub struct PendingUpdate {
    ticket: Ticket,
    snapshot: Task,
    outgoing: Task,
}

impl PendingUpdate {
    pub fn id(&self) -> &TaskId {
        &self.ticket.id
    }

    pub fn ticket(&self) -> &Ticket {
        &self.ticket
    }

    /// Field state to send to the store.
    pub fn task(&self) -> &Task {
        &self.outgoing
    }

    /// Cached state before the optimistic write.
    pub fn snapshot(&self) -> &Task {
        &self.snapshot
    }
}

#[derive(Debug)]
pub enum Settled {
    /// The canonical entity was accepted. It is shown unless a newer write
    /// is still pending.
    Applied(Task),
    /// A response to a newer revision was accepted first.
    Stale,
    /// The task left the cache, or was reloaded, while the request was in
    /// flight.
    Orphaned,
    Failed { error: SyncError, rolled_back: bool },
}

impl Settled {
    pub fn into_result(self) -> Result<Option<Task>, SyncError> {
        match self {
            Settled::Applied(task) => Ok(Some(task)),
            Settled::Stale | Settled::Orphaned => Ok(None),
            Settled::Failed { error, .. } => Err(error),
        }
    }
}

/// Optimistic-write bookkeeping for one task id.
#[derive(Debug, Default)]
struct Revisions {
    issued: u64,
    accepted: u64,
    in_flight: usize,
    /// Last confirmed entity, held while writes are in flight.
    base: Option<Task>,
}

/// Local mirror of the remote task list, in display order.
#[derive(Debug)]
pub struct TaskCache {
    tasks: Vec<Task>,
    meta: RepoMeta,
    revisions: HashMap<TaskId, Revisions>,
    events: broadcast::Sender<CacheEvent>,
}

impl Default for TaskCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskCache {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            tasks: Vec::new(),
            meta: RepoMeta::default(),
            revisions: HashMap::new(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
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

    pub fn meta(&self) -> &RepoMeta {
        &self.meta
    }

    pub fn find(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.has_id(id))
    }

    fn position(&self, id: &TaskId) -> Option<usize> {
        self.tasks.iter().position(|task| task.has_id(id))
    }

    /// Replaces the whole contents with a fresh listing, most recently
    /// updated first.
    #[instrument(skip(self, listing), fields(count = listing.tasks.len()))]
    pub fn load(&mut self, listing: Listing) {
        let Listing { mut tasks, meta } = listing;
        let before = tasks.len();
        tasks.retain(|task| task.id.is_some());
        if tasks.len() != before {
            warn!(dropped = before - tasks.len(), "listing contained tasks without an id");
        }
        tasks.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        let mut seen = std::collections::HashSet::new();
        tasks.retain(|task| task.id.as_ref().is_some_and(|id| seen.insert(id.clone())));

        self.tasks = tasks;
        self.meta = meta;
        self.revisions.clear();
        debug!(count = self.tasks.len(), branch = %self.meta.branch, "cache loaded");
        self.publish(CacheEvent::Reset {
            count: self.tasks.len(),
        });
    }

    /// Inserts `task`, or replaces the entry named by `replacing`.
    ///
    /// A replacement whose status still matches stays in place; one that
    /// changed status is removed and appended so it lands last in its new
    /// column. Tasks without an id cannot be addressed and are dropped.
    pub fn add(&mut self, mut task: Task, replacing: Option<&TaskId>) -> Option<CacheEvent> {
        if task.id.is_none() {
            match replacing {
                Some(id) => task.id = Some(id.clone()),
                None => {
                    warn!(title = %task.title, "refusing to cache a task without an id");
                    return None;
                }
            }
        }
        let id = task.id.clone()?;

        if let Some(old_id) = replacing
            && *old_id != id
            && let Some(dup) = self.position(&id)
        {
            self.tasks.remove(dup);
        }

        let slot = replacing
            .and_then(|old_id| self.position(old_id))
            .or_else(|| self.position(&id));

        let event = match slot {
            Some(idx) if self.tasks[idx].status == task.status => {
                self.tasks[idx] = task;
                CacheEvent::Replaced { id }
            }
            Some(idx) => {
                let old = self.tasks.remove(idx);
                let to = task.status.clone();
                self.tasks.push(task);
                CacheEvent::Moved {
                    id,
                    from: old.status,
                    to,
                }
            }
            None => {
                let status = task.status.clone();
                self.tasks.push(task);
                CacheEvent::Inserted { id, status }
            }
        };

        self.publish(event.clone());
        Some(event)
    }

    pub fn remove(&mut self, id: &TaskId) -> Option<Task> {
        let idx = self.position(id)?;
        let task = self.tasks.remove(idx);
        self.revisions.remove(id);
        self.publish(CacheEvent::Removed { id: id.clone() });
        Some(task)
    }

    /// Applies `mutate` to the cached task right away and issues a ticket for
    /// the remote round trip. Nothing is written when `mutate` fails.
    #[instrument(skip(self, mutate), fields(id = %id))]
    pub fn begin_update<F>(&mut self, id: &TaskId, mutate: F) -> Result<PendingUpdate, UpdateError>
    where
        F: FnOnce(&mut Task) -> Result<(), FieldError>,
    {
        let snapshot = self
            .find(id)
            .cloned()
            .ok_or_else(|| UpdateError::NotFound(id.clone()))?;

        let mut outgoing = snapshot.clone();
        mutate(&mut outgoing)?;
        self.add(outgoing.clone(), Some(id));

        let revisions = self.revisions.entry(id.clone()).or_default();
        if revisions.in_flight == 0 {
            revisions.base = Some(snapshot.clone());
        }
        revisions.in_flight += 1;
        revisions.issued += 1;
        let ticket = Ticket {
            id: id.clone(),
            revision: revisions.issued,
        };
        debug!(revision = ticket.revision, "optimistic write applied");

        Ok(PendingUpdate {
            ticket,
            snapshot,
            outgoing,
        })
    }

    /// Reconciles a store response with the optimistic write it answers.
    ///
    /// The display only changes when no newer write is pending for the task,
    /// and a failure restores the last confirmed entity rather than the
    /// state the failed write was built on.
    #[instrument(skip(self, pending, result), fields(id = %pending.ticket.id, revision = pending.ticket.revision))]
    pub fn settle(&mut self, pending: PendingUpdate, result: Result<Task, SyncError>) -> Settled {
        let PendingUpdate {
            ticket, snapshot, ..
        } = pending;

        if self.position(&ticket.id).is_none() {
            warn!("response for a task that is no longer cached; dropping");
            return Settled::Orphaned;
        }
        let Some(revisions) = self.revisions.get_mut(&ticket.id) else {
            warn!("response predates the last reload; dropping");
            return Settled::Orphaned;
        };

        revisions.in_flight = revisions.in_flight.saturating_sub(1);
        let settled_all = revisions.in_flight == 0;
        let newest = ticket.revision >= revisions.issued;

        match result {
            Ok(canonical) => {
                if ticket.revision < revisions.accepted {
                    debug!(accepted = revisions.accepted, "stale response dropped");
                    if settled_all {
                        revisions.base = None;
                    }
                    return Settled::Stale;
                }
                revisions.accepted = ticket.revision;
                revisions.base = (!settled_all).then(|| canonical.clone());

                if newest || settled_all {
                    self.add(canonical.clone(), Some(&ticket.id));
                } else {
                    debug!(latest = revisions.issued, "newer write pending; display kept");
                }
                Settled::Applied(canonical)
            }
            Err(error) => {
                let latest = revisions.issued;
                let base = if settled_all {
                    revisions.base.take()
                } else {
                    revisions.base.clone()
                };

                let rolled_back = newest || settled_all;
                if rolled_back {
                    self.add(base.unwrap_or(snapshot), Some(&ticket.id));
                    debug!(error = %error, "update failed; confirmed state restored");
                } else {
                    warn!(latest, error = %error, "update failed behind a newer write; keeping newer state");
                }
                Settled::Failed { error, rolled_back }
            }
        }
    }

    fn publish(&self, event: CacheEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
