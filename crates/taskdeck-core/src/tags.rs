use tracing::{info, instrument, warn};

use crate::board::visible_ids;
use crate::cache::{TaskCache, UpdateError};
use crate::filter::Filter;
use crate::sync::{TaskStore, push_update};
use crate::task::{Task, TaskId};

const NEGATION: char = '-';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagDelta {
    Add(String),
    Remove(String),
}

/// Splits raw comma-separated input into deltas, in order.
pub fn parse_deltas(input: &str) -> Vec<TagDelta> {
    input
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| match token.strip_prefix(NEGATION) {
            Some(tag) => TagDelta::Remove(tag.to_string()),
            None => TagDelta::Add(token.to_string()),
        })
        .collect()
}

/// Applies `deltas` to a comma-separated tag string.
pub fn apply_to_tags(tags: &str, deltas: &[TagDelta]) -> String {
    let mut current: Vec<String> = tags
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(ToString::to_string)
        .collect();

    for delta in deltas {
        match delta {
            TagDelta::Remove(tag) => current.retain(|existing| existing != tag),
            TagDelta::Add(tag) => {
                if !current.contains(tag) {
                    current.push(tag.clone());
                }
            }
        }
    }

    current.join(",")
}

/// Result of a delta batch for one task.
#[derive(Debug)]
pub struct TagOutcome {
    pub id: TaskId,
    pub result: Result<Option<Task>, UpdateError>,
}

/// Applies `deltas` to every task the filter leaves visible, one update per
/// task. Tasks fail or succeed independently.
#[instrument(skip(cache, store, filter), fields(deltas = deltas.len()))]
pub async fn apply_deltas<S: TaskStore>(
    cache: &mut TaskCache,
    store: &S,
    filter: &Filter,
    deltas: &[TagDelta],
) -> Vec<TagOutcome> {
    if deltas.is_empty() {
        return Vec::new();
    }

    let targets = visible_ids(cache, filter);
    let mut outcomes = Vec::with_capacity(targets.len());
    for id in targets {
        let begun = cache.begin_update(&id, |task| {
            task.tags = apply_to_tags(&task.tags, deltas);
            Ok(())
        });
        let result = match begun {
            Ok(pending) => push_update(cache, store, pending)
                .await
                .into_result()
                .map_err(UpdateError::Sync),
            Err(err) => Err(err),
        };
        if let Err(err) = result.as_ref() {
            warn!(id = %id, error = %err, "tag update failed");
        }
        outcomes.push(TagOutcome { id, result });
    }

    let failed = outcomes.iter().filter(|outcome| outcome.result.is_err()).count();
    info!(tasks = outcomes.len(), failed, "tag deltas applied");
    outcomes
}
