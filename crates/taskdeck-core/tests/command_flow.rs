mod common;

use common::{FakeStore, task};
use taskdeck_core::cache::TaskCache;
use taskdeck_core::cli::Invocation;
use taskdeck_core::commands::dispatch;
use taskdeck_core::git_status::GitStatus;
use taskdeck_core::render::Renderer;
use taskdeck_core::task::{TaskId, TaskStatus};

fn invocation(command: &str, args: &[&str]) -> Invocation {
    Invocation {
        command: command.to_string(),
        args: args.iter().map(ToString::to_string).collect(),
    }
}

async fn run(store: &FakeStore, cache: &mut TaskCache, command: &str, args: &[&str]) -> anyhow::Result<()> {
    dispatch(store, cache, &Renderer::plain(), invocation(command, args)).await
}

#[tokio::test]
async fn every_command_loads_the_listing_first() {
    let store = FakeStore::with_tasks(vec![task("1", "Write docs", TaskStatus::Open)]);
    store.set_branch("");
    let mut cache = TaskCache::new();

    run(&store, &mut cache, "board", &[]).await.expect("board");
    run(&store, &mut cache, "menu", &["1"]).await.expect("menu");

    assert_eq!(store.calls().list, 2);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.meta().display_branch(), "[None]");
}

#[tokio::test]
async fn move_command_updates_status() {
    let store = FakeStore::with_tasks(vec![task("1", "Write docs", TaskStatus::Open)]);
    let mut cache = TaskCache::new();

    run(&store, &mut cache, "move", &["1", "done"]).await.expect("move");
    run(&store, &mut cache, "move", &["1", "done"]).await.expect("second move is a no-op");

    assert_eq!(store.calls().updated.len(), 1);
    assert_eq!(store.stored("1").expect("stored").status, TaskStatus::Done);
}

#[tokio::test]
async fn edit_command_rejects_read_only_fields() {
    let store = FakeStore::with_tasks(vec![task("1", "Write docs", TaskStatus::Open)]);
    let mut cache = TaskCache::new();

    let err = run(&store, &mut cache, "edit", &["1", "gitStatus", "M "])
        .await
        .expect_err("read-only");
    assert!(err.to_string().contains("read-only"), "{err}");

    run(&store, &mut cache, "edit", &["1", "title", "Write", "more", "docs"])
        .await
        .expect("edit");
    assert_eq!(store.stored("1").expect("stored").title, "Write more docs");
}

#[tokio::test]
async fn form_command_saves_pairs() {
    let store = FakeStore::with_tasks(vec![task("1", "Write docs", TaskStatus::Open)]);
    let mut cache = TaskCache::new();

    run(&store, &mut cache, "form", &["1", "tags=docs,v2", "pending=0.5"])
        .await
        .expect("form");

    let stored = store.stored("1").expect("stored");
    assert_eq!(stored.tags, "docs,v2");
    assert_eq!(stored.pending, 0.5);
    assert_eq!(store.calls().updated.len(), 1);
}

#[tokio::test]
async fn tag_command_reports_failures() {
    let store = FakeStore::with_tasks(vec![
        task("1", "Write docs", TaskStatus::Open),
        task("2", "Write tests", TaskStatus::Done),
    ]);
    store.fail_updates("2", "locked");
    let mut cache = TaskCache::new();

    let err = run(&store, &mut cache, "tag", &["urgent"])
        .await
        .expect_err("one failure");
    assert!(err.to_string().contains("1 of 2"), "{err}");
    assert_eq!(store.stored("1").expect("stored").tags, "urgent");
}

#[tokio::test]
async fn staging_commands_respect_the_menu() {
    let mut modified = task("1", "Write docs", TaskStatus::Open);
    modified.git_status = GitStatus::Modified;
    let store = FakeStore::with_tasks(vec![modified]);
    let mut cache = TaskCache::new();

    assert!(run(&store, &mut cache, "stage", &["1"]).await.is_err());
    assert!(store.calls().updated.is_empty());

    run(&store, &mut cache, "discard", &["1"]).await.expect("discard");
    assert_eq!(store.stored("1").expect("stored").git_status, GitStatus::Discard);
}

#[tokio::test]
async fn delete_with_yes_skips_the_prompt() {
    let store = FakeStore::with_tasks(vec![task("2", "Drop me", TaskStatus::Open)]);
    let mut cache = TaskCache::new();

    run(&store, &mut cache, "delete", &["2", "--yes"]).await.expect("delete");

    assert_eq!(store.calls().removed, vec![TaskId::new("2")]);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn commit_sends_message_and_reloads() {
    let mut staged = task("1", "Write docs", TaskStatus::Open);
    staged.git_status = GitStatus::Added;
    let store = FakeStore::with_tasks(vec![staged]);
    let mut cache = TaskCache::new();

    run(&store, &mut cache, "commit", &["-m", "Add", "docs", "task"])
        .await
        .expect("commit");

    let calls = store.calls();
    assert_eq!(calls.commits, vec!["Add docs task".to_string()]);
    assert_eq!(calls.list, 2);
    assert!(!cache.find(&TaskId::new("1")).expect("cached").git_status.is_known());
}

#[tokio::test]
async fn commit_succeeds_even_when_the_reload_fails() {
    let mut staged = task("1", "Write docs", TaskStatus::Open);
    staged.git_status = GitStatus::Added;
    let store = FakeStore::with_tasks(vec![staged]);
    store.fail_listing_after_commit("store restarting");
    let mut cache = TaskCache::new();

    run(&store, &mut cache, "commit", &["-m", "Add docs"])
        .await
        .expect("commit went through");

    let calls = store.calls();
    assert_eq!(calls.commits, vec!["Add docs".to_string()]);
    assert_eq!(calls.list, 2);
    assert_eq!(cache.find(&TaskId::new("1")).expect("cached").git_status, GitStatus::Added);
}

#[tokio::test]
async fn new_command_creates_a_default_task() {
    let store = FakeStore::with_tasks(vec![]);
    let mut cache = TaskCache::new();

    run(&store, &mut cache, "new", &[]).await.expect("new");

    assert_eq!(store.calls().created.len(), 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.tasks()[0].git_status, GitStatus::Added);
}
