mod common;

use common::{FakeStore, task};
use taskdeck_core::board::{DragSession, drop_task, partition};
use taskdeck_core::cache::{Settled, TaskCache, UpdateError};
use taskdeck_core::edit::{EditSession, EditState, EditableField, FormEditor};
use taskdeck_core::filter::Filter;
use taskdeck_core::git_status::{GitStatus, StagingAction};
use taskdeck_core::sync::{
    CommitOutcome, DeleteOutcome, apply_staging, commit_staged, create_task, delete_task, load_board, push_update,
};
use taskdeck_core::tags::{apply_deltas, parse_deltas};
use taskdeck_core::task::{TaskId, TaskStatus};

async fn loaded(store: &FakeStore) -> TaskCache {
    let mut cache = TaskCache::new();
    load_board(&mut cache, store).await.expect("listing should load");
    cache
}

fn column(cache: &TaskCache, status: TaskStatus) -> Vec<String> {
    partition(cache, &Filter::default())
        .into_iter()
        .find(|column| column.status == status)
        .map(|column| {
            column
                .tasks
                .iter()
                .filter_map(|task| task.id.as_ref().map(ToString::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn drag_within_a_column_sends_nothing() {
    let store = FakeStore::with_tasks(vec![task("1", "Write docs", TaskStatus::Open)]);
    let mut cache = loaded(&store).await;
    let before = cache.tasks().to_vec();

    let session = DragSession::start(&cache, &TaskId::new("1")).expect("draggable");
    let outcome = drop_task(&mut cache, &store, session, TaskStatus::Open)
        .await
        .expect("drop");

    assert!(outcome.is_none());
    assert!(store.calls().updated.is_empty());
    assert_eq!(cache.tasks(), before.as_slice());
}

#[tokio::test]
async fn drag_to_done_moves_before_confirmation() {
    let store = FakeStore::with_tasks(vec![
        task("1", "Write docs", TaskStatus::Open),
        task("2", "Ship", TaskStatus::Done),
    ]);
    let mut cache = loaded(&store).await;

    let session = DragSession::start(&cache, &TaskId::new("1")).expect("draggable");
    let outcome = taskdeck_core::board::handle_drop(&mut cache, session, TaskStatus::Done).expect("drop");
    let taskdeck_core::board::DropOutcome::Moved(pending) = outcome else {
        panic!("expected a move");
    };
    assert!(column(&cache, TaskStatus::Open).is_empty());
    assert_eq!(column(&cache, TaskStatus::Done), vec!["2", "1"]);
    assert!(store.calls().updated.is_empty());

    let settled = push_update(&mut cache, &store, pending).await;
    assert!(matches!(settled, Settled::Applied(_)));
    let updates = store.calls().updated;
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].status, TaskStatus::Done);
    assert_eq!(store.stored("1").expect("stored").status, TaskStatus::Done);
}

#[tokio::test]
async fn failed_drag_restores_the_origin_column() {
    let store = FakeStore::with_tasks(vec![task("1", "Write docs", TaskStatus::Open)]);
    store.fail_updates("1", "Task could not be saved");
    let mut cache = loaded(&store).await;

    let session = DragSession::start(&cache, &TaskId::new("1")).expect("draggable");
    let settled = drop_task(&mut cache, &store, session, TaskStatus::InProgress)
        .await
        .expect("drop")
        .expect("moved");

    let Settled::Failed { error, rolled_back } = settled else {
        panic!("expected a failure");
    };
    assert!(rolled_back);
    assert_eq!(error.to_string(), "Task could not be saved");
    assert_eq!(column(&cache, TaskStatus::Open), vec!["1"]);
    assert!(column(&cache, TaskStatus::InProgress).is_empty());
}

#[tokio::test]
async fn drop_on_unknown_column_is_rejected() {
    let store = FakeStore::with_tasks(vec![task("1", "Write docs", TaskStatus::Open)]);
    let mut cache = loaded(&store).await;
    let session = DragSession::start(&cache, &TaskId::new("1")).expect("draggable");

    let err = drop_task(&mut cache, &store, session, TaskStatus::from("blocked".to_string()))
        .await
        .expect_err("no such column");
    assert!(matches!(err, UpdateError::NoSuchColumn(_)));
    assert!(store.calls().updated.is_empty());
}

#[tokio::test]
async fn urgent_tag_lands_on_untagged_task() {
    let mut staged = task("1", "Write docs", TaskStatus::Open);
    staged.git_status = GitStatus::Added;
    staged.tags = String::new();
    let store = FakeStore::with_tasks(vec![staged]);
    let mut cache = loaded(&store).await;

    let outcomes = apply_deltas(&mut cache, &store, &Filter::default(), &parse_deltas("urgent")).await;

    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].result.is_ok());
    let updates = store.calls().updated;
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].id, Some(TaskId::new("1")));
    assert_eq!(cache.find(&TaskId::new("1")).expect("cached").tags, "urgent");
}

#[tokio::test]
async fn tag_deltas_skip_hidden_tasks_and_isolate_failures() {
    let store = FakeStore::with_tasks(vec![
        task("1", "Write docs", TaskStatus::Open),
        task("2", "Write tests", TaskStatus::InProgress),
        task("3", "Ship release", TaskStatus::Done),
    ]);
    store.fail_updates("2", "locked");
    let mut cache = loaded(&store).await;

    let outcomes = apply_deltas(&mut cache, &store, &Filter::parse("Write"), &parse_deltas("v2")).await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(store.calls().updated.len(), 2);
    assert_eq!(cache.find(&TaskId::new("1")).expect("cached").tags, "v2");
    assert_eq!(cache.find(&TaskId::new("2")).expect("cached").tags, "");
    assert_eq!(cache.find(&TaskId::new("3")).expect("cached").tags, "");
}

#[tokio::test]
async fn delete_after_confirmation_leaves_the_board() {
    let store = FakeStore::with_tasks(vec![
        task("1", "Write docs", TaskStatus::Open),
        task("2", "Drop me", TaskStatus::Open),
    ]);
    let mut cache = loaded(&store).await;

    let mut asked = None;
    let outcome = delete_task(&mut cache, &store, &TaskId::new("2"), |task| {
        asked = Some(task.title.clone());
        true
    })
    .await
    .expect("delete");

    assert!(matches!(outcome, DeleteOutcome::Deleted(_)));
    assert_eq!(asked.as_deref(), Some("Drop me"));
    assert_eq!(store.calls().removed, vec![TaskId::new("2")]);
    assert!(cache.find(&TaskId::new("2")).is_none());
    assert_eq!(column(&cache, TaskStatus::Open), vec!["1"]);
}

#[tokio::test]
async fn declined_delete_sends_nothing() {
    let store = FakeStore::with_tasks(vec![task("2", "Keep me", TaskStatus::Open)]);
    let mut cache = loaded(&store).await;
    let before = cache.tasks().to_vec();

    let outcome = delete_task(&mut cache, &store, &TaskId::new("2"), |_| false)
        .await
        .expect("delete");

    assert_eq!(outcome, DeleteOutcome::Declined);
    assert!(store.calls().removed.is_empty());
    assert_eq!(cache.tasks(), before.as_slice());
}

#[tokio::test]
async fn unchanged_inline_edit_makes_no_call() {
    let store = FakeStore::with_tasks(vec![task("1", "Write docs", TaskStatus::Open)]);
    let mut cache = loaded(&store).await;

    let mut session = EditSession::new(TaskId::new("1"), EditableField::Title);
    let buffer = session.activate(&cache).expect("activate");
    session.input(&buffer);
    session.commit(&mut cache, &store).await;

    assert!(store.calls().updated.is_empty());

    let mut hours = EditSession::new(TaskId::new("1"), EditableField::Pending);
    hours.activate(&cache).expect("activate");
    hours.input("1.0");
    hours.commit(&mut cache, &store).await;
    assert!(store.calls().updated.is_empty());
}

#[tokio::test]
async fn inline_edit_confirms_and_refreshes_open_form() {
    let store = FakeStore::with_tasks(vec![task("1", "Write docs", TaskStatus::Open)]);
    let mut cache = loaded(&store).await;
    let mut form = FormEditor::open(cache.find(&TaskId::new("1")).expect("cached"));

    let mut session = EditSession::new(TaskId::new("1"), EditableField::Title);
    session.activate(&cache).expect("activate");
    session.input("Write better docs");
    let state = session.commit(&mut cache, &store).await.clone();

    assert!(matches!(state, EditState::Confirmed(ref task) if task.title == "Write better docs"));
    assert_eq!(store.calls().updated.len(), 1);
    assert!(session.refresh_form(&mut form));
    assert_eq!(form.task().title, "Write better docs");
}

#[tokio::test]
async fn failed_inline_edit_restores_snapshot() {
    let store = FakeStore::with_tasks(vec![task("1", "Write docs", TaskStatus::Open)]);
    store.fail_updates("1", "Task could not be saved");
    let mut cache = loaded(&store).await;

    let mut session = EditSession::new(TaskId::new("1"), EditableField::Tags);
    session.activate(&cache).expect("activate");
    session.input("docs");
    let state = session.commit(&mut cache, &store).await.clone();

    assert_eq!(state, EditState::Failed("Task could not be saved".to_string()));
    assert_eq!(cache.find(&TaskId::new("1")).expect("cached").tags, "");
}

#[tokio::test]
async fn form_save_writes_every_changed_field() {
    let store = FakeStore::with_tasks(vec![task("1", "Write docs", TaskStatus::Open)]);
    let mut cache = loaded(&store).await;

    let mut form = FormEditor::open(cache.find(&TaskId::new("1")).expect("cached"));
    assert!(form.set("status", "done").is_err());
    form.set("title", "Write docs v2").expect("title");
    form.set("estimation", "3.5").expect("estimation");
    form.save(&mut cache, &store).await.expect("save");

    let updates = store.calls().updated;
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].title, "Write docs v2");
    assert_eq!(updates[0].estimation, 3.5);
    assert_eq!(updates[0].status, TaskStatus::Open);
    assert!(form.task().updated_at.is_some());
}

#[tokio::test]
async fn out_of_order_responses_keep_the_newest_write() {
    let store = FakeStore::with_tasks(vec![task("1", "Write docs", TaskStatus::Open)]);
    let mut cache = loaded(&store).await;
    let id = TaskId::new("1");

    let first = cache
        .begin_update(&id, |task| task.set_field("title", "first"))
        .expect("first");
    let second = cache
        .begin_update(&id, |task| task.set_field("title", "second"))
        .expect("second");
    let first_reply = first.task().clone();
    let second_reply = second.task().clone();

    assert!(matches!(cache.settle(second, Ok(second_reply)), Settled::Applied(_)));
    assert!(matches!(cache.settle(first, Ok(first_reply)), Settled::Stale));
    assert_eq!(cache.find(&id).expect("cached").title, "second");
}

#[tokio::test]
async fn staging_follows_the_context_menu() {
    let mut untracked = task("1", "Write docs", TaskStatus::Open);
    untracked.git_status = GitStatus::Untracked;
    let store = FakeStore::with_tasks(vec![untracked]);
    let mut cache = loaded(&store).await;
    let id = TaskId::new("1");

    let menu = cache.find(&id).expect("cached").git_status.menu().expect("menu");
    assert!(menu.include && !menu.exclude && !menu.discard);

    apply_staging(&mut cache, &store, &id, StagingAction::Stage)
        .await
        .expect("stage");
    assert_eq!(cache.find(&id).expect("cached").git_status, GitStatus::Added);
    assert_eq!(store.calls().updated[0].git_status, GitStatus::Added);
}

#[tokio::test]
async fn created_task_joins_the_open_column() {
    let store = FakeStore::with_tasks(vec![]);
    let mut cache = loaded(&store).await;

    let created = create_task(&mut cache, &store).await.expect("create");

    assert_eq!(created.title, "New task");
    assert_eq!(store.calls().created.len(), 1);
    assert_eq!(store.calls().created[0].id, None);
    let id = created.id.expect("assigned id");
    assert_eq!(column(&cache, TaskStatus::Open), vec![id.to_string()]);
}

#[tokio::test]
async fn commit_reports_a_failed_reload_separately() {
    let mut staged = task("1", "Write docs", TaskStatus::Open);
    staged.git_status = GitStatus::Added;
    let store = FakeStore::with_tasks(vec![staged]);
    let mut cache = loaded(&store).await;
    store.fail_listing_after_commit("store restarting");

    let outcome = commit_staged(&mut cache, &store, Some("  Add docs  "))
        .await
        .expect("commit went through");

    let CommitOutcome::Committed { reload } = outcome else {
        panic!("expected a commit, got {outcome:?}");
    };
    let err = reload.expect_err("reload fails");
    assert!(err.to_string().contains("store restarting"), "{err}");
    assert_eq!(store.calls().commits, vec!["Add docs".to_string()]);
}

#[tokio::test]
async fn blank_commit_message_sends_nothing() {
    let store = FakeStore::with_tasks(vec![]);
    let mut cache = loaded(&store).await;

    let outcome = commit_staged(&mut cache, &store, Some("   ")).await.expect("cancel");

    assert!(matches!(outcome, CommitOutcome::Cancelled));
    assert!(store.calls().commits.is_empty());
    assert_eq!(store.calls().list, 1);
}
