use std::io::{self, BufRead, Write};

use anyhow::{Context, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::board::{DragSession, drop_task, partition, undisplayed};
use crate::cache::TaskCache;
use crate::cli::{Invocation, KeyVal};
use crate::edit::{EditSession, EditState, EditableField, FormEditor};
use crate::filter::Filter;
use crate::git_status::StagingAction;
use crate::render::Renderer;
use crate::sync::{CommitOutcome, DeleteOutcome, TaskStore, apply_staging, commit_staged, create_task, delete_task, load_board};
use crate::tags::{apply_deltas, parse_deltas};
use crate::task::{TaskId, TaskStatus};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "board", "new", "move", "edit", "form", "tag", "menu", "stage", "unstage", "discard", "delete", "commit",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(store, cache, renderer, inv), fields(command = %inv.command))]
pub async fn dispatch<S: TaskStore>(
    store: &S,
    cache: &mut TaskCache,
    renderer: &Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    load_board(cache, store)
        .await
        .context("failed to load tasks from the store")?;

    debug!(args = ?inv.args, tasks = cache.len(), "dispatching command");

    let args = inv.args.as_slice();
    match inv.command.as_str() {
        "board" => cmd_board(cache, renderer, args),
        "new" => cmd_new(store, cache, renderer).await,
        "move" => cmd_move(store, cache, renderer, args).await,
        "edit" => cmd_edit(store, cache, renderer, args).await,
        "form" => cmd_form(store, cache, renderer, args).await,
        "tag" => cmd_tag(store, cache, renderer, args).await,
        "menu" => cmd_menu(cache, renderer, args),
        "stage" => cmd_staging(store, cache, renderer, args, StagingAction::Stage).await,
        "unstage" => cmd_staging(store, cache, renderer, args, StagingAction::Unstage).await,
        "discard" => cmd_staging(store, cache, renderer, args, StagingAction::Discard).await,
        "delete" => cmd_delete(store, cache, renderer, args).await,
        "commit" => cmd_commit(store, cache, renderer, args).await,
        other => Err(anyhow!("unknown command: {other}")),
    }
}

fn cmd_board(cache: &TaskCache, renderer: &Renderer, args: &[String]) -> anyhow::Result<()> {
    info!("command board");

    let filter = Filter::parse(&args.join(" "));
    let columns = partition(cache, &filter);
    let hidden = undisplayed(cache);
    if hidden > 0 {
        warn!(hidden, "some tasks have a status outside the board columns");
    }
    renderer.print_board(cache.meta(), &columns, hidden)
}

async fn cmd_new<S: TaskStore>(store: &S, cache: &mut TaskCache, renderer: &Renderer) -> anyhow::Result<()> {
    info!("command new");

    let created = create_task(cache, store)
        .await
        .context("failed to create task")?;
    let id = created.id.as_ref().map(ToString::to_string).unwrap_or_default();

    renderer.print_form(FormEditor::open(&created).rows())?;
    println!("Created task {id}. Set its title with: taskdeck edit {id} title <TITLE>");
    Ok(())
}

async fn cmd_move<S: TaskStore>(
    store: &S,
    cache: &mut TaskCache,
    renderer: &Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command move");

    let [id, status] = args else {
        return Err(anyhow!("usage: move <ID> <STATUS>"));
    };
    let id = parse_id(id)?;
    let target = TaskStatus::from(status.trim().to_string());

    let session =
        DragSession::start(cache, &id).ok_or_else(|| anyhow!("task {id} is not on the board"))?;
    match drop_task(cache, store, session, target).await? {
        None => println!("Task {id} is already in that column."),
        Some(settled) => {
            settled.into_result()?;
            renderer.success("Task updated.");
        }
    }
    Ok(())
}

async fn cmd_edit<S: TaskStore>(
    store: &S,
    cache: &mut TaskCache,
    renderer: &Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command edit");

    let [id, field, value @ ..] = args else {
        return Err(anyhow!("usage: edit <ID> <FIELD> <VALUE>"));
    };
    let id = parse_id(id)?;
    let field: EditableField = field.parse()?;

    let mut session = EditSession::new(id, field);
    let before = session.activate(cache)?;
    session.input(&value.join(" "));
    debug!(before = %before, "edit session active");

    match session.commit(cache, store).await {
        EditState::Confirmed(_) => {
            renderer.success("Task updated.");
            Ok(())
        }
        EditState::Failed(msg) => Err(anyhow!("{msg}")),
        _ => {
            println!("Nothing to update.");
            Ok(())
        }
    }
}

async fn cmd_form<S: TaskStore>(
    store: &S,
    cache: &mut TaskCache,
    renderer: &Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command form");

    let [id, pairs @ ..] = args else {
        return Err(anyhow!("usage: form <ID> [KEY=VALUE]..."));
    };
    let id = parse_id(id)?;
    let task = cache.find(&id).ok_or_else(|| anyhow!("no task with id {id}"))?;

    let mut form = FormEditor::open(task);
    for pair in pairs {
        let KeyVal { key, value } = pair.parse()?;
        form.set(&key, &value)?;
    }

    if !pairs.is_empty() {
        form.save(cache, store).await?;
        renderer.success("Task updated.");
    }
    renderer.print_form(form.rows())
}

async fn cmd_tag<S: TaskStore>(
    store: &S,
    cache: &mut TaskCache,
    renderer: &Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command tag");

    let (raw_deltas, filter_text) = split_tag_args(args)?;
    let deltas = parse_deltas(&raw_deltas);
    if deltas.is_empty() {
        return Err(anyhow!("usage: tag <DELTAS> [--filter TEXT]"));
    }

    let filter = Filter::parse(&filter_text);
    let outcomes = apply_deltas(cache, store, &filter, &deltas).await;

    let mut failed = 0_usize;
    for outcome in &outcomes {
        if let Err(err) = &outcome.result {
            failed += 1;
            renderer.failure(&format!("task {}: {err}", outcome.id));
        }
    }

    let updated = outcomes.len() - failed;
    if updated > 0 {
        renderer.success(&format!("Task updated. ({updated} task(s))"));
    }
    if failed > 0 {
        return Err(anyhow!("{failed} of {} tag update(s) failed", outcomes.len()));
    }
    if outcomes.is_empty() {
        println!("No visible tasks.");
    }
    Ok(())
}

fn cmd_menu(cache: &TaskCache, renderer: &Renderer, args: &[String]) -> anyhow::Result<()> {
    info!("command menu");

    let [id] = args else {
        return Err(anyhow!("usage: menu <ID>"));
    };
    let id = parse_id(id)?;
    let task = cache.find(&id).ok_or_else(|| anyhow!("no task with id {id}"))?;
    renderer.print_menu(task, task.git_status.menu())
}

async fn cmd_staging<S: TaskStore>(
    store: &S,
    cache: &mut TaskCache,
    renderer: &Renderer,
    args: &[String],
    action: StagingAction,
) -> anyhow::Result<()> {
    info!(?action, "command staging");

    let [id] = args else {
        return Err(anyhow!("usage: {} <ID>", staging_name(action)));
    };
    let id = parse_id(id)?;
    let task = cache.find(&id).ok_or_else(|| anyhow!("no task with id {id}"))?;

    let allowed = task.git_status.menu().is_some_and(|menu| match action {
        StagingAction::Stage => menu.include,
        StagingAction::Unstage => menu.exclude,
        StagingAction::Discard => menu.discard,
    });
    if !allowed {
        return Err(anyhow!(
            "{} is not available for git status {}",
            staging_name(action),
            task.git_status
        ));
    }

    apply_staging(cache, store, &id, action).await?;
    renderer.success("Task updated.");
    Ok(())
}

async fn cmd_delete<S: TaskStore>(
    store: &S,
    cache: &mut TaskCache,
    renderer: &Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command delete");

    let yes = args.iter().any(|arg| arg == "--yes" || arg == "-y");
    let positional: Vec<&String> = args.iter().filter(|arg| !arg.starts_with('-')).collect();
    let [id] = positional.as_slice() else {
        return Err(anyhow!("usage: delete <ID> [--yes]"));
    };
    let id = parse_id(id)?;
    let title = cache
        .find(&id)
        .map(|task| task.title.clone())
        .ok_or_else(|| anyhow!("no task with id {id}"))?;

    let confirmed = yes || confirm(&format!("Are you sure you want to delete task \"{title}\" ?"))?;
    match delete_task(cache, store, &id, |_| confirmed).await? {
        DeleteOutcome::Deleted(_) => renderer.success("Task deleted."),
        DeleteOutcome::Declined => println!("Nothing deleted."),
    }
    Ok(())
}

async fn cmd_commit<S: TaskStore>(
    store: &S,
    cache: &mut TaskCache,
    renderer: &Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command commit");

    let message = match args {
        [] => prompt("Commit message: ")?,
        [flag, rest @ ..] if flag == "-m" || flag == "--message" => {
            if rest.is_empty() {
                return Err(anyhow!("{flag} requires a message"));
            }
            Some(rest.join(" "))
        }
        _ => return Err(anyhow!("usage: commit [-m MSG]")),
    };

    match commit_staged(cache, store, message.as_deref()).await? {
        CommitOutcome::Cancelled => println!("Commit cancelled."),
        CommitOutcome::Committed { reload } => {
            renderer.success("Tasks committed.");
            if let Err(err) = reload {
                renderer.failure(&format!("Could not reload tasks: {err}"));
            }
        }
    }
    Ok(())
}

fn parse_id(raw: &str) -> anyhow::Result<TaskId> {
    let id: TaskId = raw.parse()?;
    if id.as_str().is_empty() {
        return Err(anyhow!("task id cannot be empty"));
    }
    Ok(id)
}

fn staging_name(action: StagingAction) -> &'static str {
    match action {
        StagingAction::Stage => "stage",
        StagingAction::Unstage => "unstage",
        StagingAction::Discard => "discard",
    }
}

/// Splits `tag` arguments into the delta list and the `--filter` text.
fn split_tag_args(args: &[String]) -> anyhow::Result<(String, String)> {
    let mut deltas = Vec::new();
    let mut filter = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--filter" {
            let text = iter.next().ok_or_else(|| anyhow!("--filter requires a value"))?;
            filter.push(text.clone());
        } else if let Some(text) = arg.strip_prefix("--filter=") {
            filter.push(text.to_string());
        } else {
            deltas.push(arg.clone());
        }
    }

    Ok((deltas.join(","), filter.join(" ")))
}

/// `None` on end of input or a blank answer.
fn prompt(question: &str) -> anyhow::Result<Option<String>> {
    let mut out = io::stdout().lock();
    write!(out, "{question}")?;
    out.flush()?;

    let mut line = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed reading stdin")?;
    if read == 0 {
        return Ok(None);
    }
    let answer = line.trim();
    Ok((!answer.is_empty()).then(|| answer.to_string()))
}

fn confirm(question: &str) -> anyhow::Result<bool> {
    let answer = prompt(&format!("{question} (yes/no) "))?;
    Ok(answer.is_some_and(|answer| matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes")))
}
