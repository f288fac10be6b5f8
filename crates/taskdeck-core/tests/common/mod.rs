#![allow(dead_code)]

use std::collections::HashMap;

use chrono::{Duration, TimeZone, Utc};
use parking_lot::Mutex;
use taskdeck_core::git_status::GitStatus;
use taskdeck_core::sync::{Listing, RepoMeta, SyncError, TaskStore};
use taskdeck_core::task::{Task, TaskId, TaskStatus};

/// Calls seen by [`FakeStore`], in order per kind.
#[derive(Debug, Clone, Default)]
pub struct Calls {
    pub list: usize,
    pub created: Vec<Task>,
    pub updated: Vec<Task>,
    pub removed: Vec<TaskId>,
    pub commits: Vec<String>,
}

#[derive(Debug, Default)]
struct State {
    tasks: Vec<Task>,
    branch: String,
    next_id: u64,
    clock: i64,
    failing: HashMap<TaskId, String>,
    listing_failure: Option<String>,
    listing_failure_after_commit: Option<String>,
    calls: Calls,
}

/// In-memory task store that records every call.
#[derive(Debug, Default)]
pub struct FakeStore {
    state: Mutex<State>,
}

impl FakeStore {
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let next_id = tasks.len() as u64 + 1;
        Self {
            state: Mutex::new(State {
                tasks,
                branch: "main".to_string(),
                next_id,
                ..State::default()
            }),
        }
    }

    pub fn set_branch(&self, branch: &str) {
        self.state.lock().branch = branch.to_string();
    }

    /// Every update of `id` fails with `msg` until cleared.
    pub fn fail_updates(&self, id: &str, msg: &str) {
        self.state.lock().failing.insert(TaskId::new(id), msg.to_string());
    }

    /// Every listing after the next commit fails with `msg`.
    pub fn fail_listing_after_commit(&self, msg: &str) {
        self.state.lock().listing_failure_after_commit = Some(msg.to_string());
    }

    pub fn calls(&self) -> Calls {
        self.state.lock().calls.clone()
    }

    pub fn stored(&self, id: &str) -> Option<Task> {
        let id = TaskId::new(id);
        self.state.lock().tasks.iter().find(|task| task.has_id(&id)).cloned()
    }

    fn tick(state: &mut State) -> chrono::DateTime<Utc> {
        state.clock += 1;
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().expect("valid date") + Duration::seconds(state.clock)
    }
}

impl TaskStore for FakeStore {
    async fn create(&self, draft: &Task) -> Result<Task, SyncError> {
        let mut state = self.state.lock();
        state.calls.created.push(draft.clone());
        let mut task = draft.clone();
        task.id = Some(TaskId::new(state.next_id.to_string()));
        state.next_id += 1;
        let now = Self::tick(&mut state);
        task.created_at = Some(now);
        task.updated_at = Some(now);
        state.tasks.push(task.clone());
        Ok(task)
    }

    async fn update(&self, task: &Task) -> Result<Task, SyncError> {
        let mut state = self.state.lock();
        state.calls.updated.push(task.clone());
        let id = task
            .id
            .clone()
            .ok_or_else(|| SyncError::Rejected("missing id".to_string()))?;
        if let Some(msg) = state.failing.get(&id) {
            return Err(SyncError::Status {
                status: 500,
                msg: msg.clone(),
            });
        }

        let mut canonical = task.clone();
        canonical.updated_at = Some(Self::tick(&mut state));
        match state.tasks.iter_mut().find(|stored| stored.has_id(&id)) {
            Some(stored) => *stored = canonical.clone(),
            None => return Err(SyncError::Rejected(format!("no task {id}"))),
        }
        Ok(canonical)
    }

    async fn remove(&self, id: &TaskId) -> Result<Option<String>, SyncError> {
        let mut state = self.state.lock();
        state.calls.removed.push(id.clone());
        state.tasks.retain(|task| !task.has_id(id));
        Ok(Some("Task deleted".to_string()))
    }

    async fn list(&self) -> Result<Listing, SyncError> {
        let mut state = self.state.lock();
        state.calls.list += 1;
        if let Some(msg) = &state.listing_failure {
            return Err(SyncError::Status {
                status: 503,
                msg: msg.clone(),
            });
        }
        Ok(Listing {
            tasks: state.tasks.clone(),
            meta: RepoMeta {
                branch: state.branch.clone(),
            },
        })
    }

    async fn commit_all(&self, message: &str) -> Result<(), SyncError> {
        let mut state = self.state.lock();
        state.calls.commits.push(message.to_string());
        if let Some(msg) = state.listing_failure_after_commit.take() {
            state.listing_failure = Some(msg);
        }
        for task in &mut state.tasks {
            if task.git_status == GitStatus::Added {
                task.git_status = GitStatus::Unknown(String::new());
            }
        }
        Ok(())
    }
}

pub fn task(id: &str, title: &str, status: TaskStatus) -> Task {
    Task {
        id: Some(TaskId::new(id)),
        title: title.to_string(),
        status,
        ..Task::draft()
    }
}
