use tracing::trace;

use crate::task::Task;

/// Free-text visibility filter. A task is visible when its JSON text contains
/// any of the terms; no terms means everything is visible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
  terms: Vec<String>
}

impl Filter {
  pub fn parse(text: &str) -> Self {
    let terms = text
      .split_whitespace()
      .map(ToString::to_string)
      .collect::<Vec<_>>();
    trace!(?terms, "parsed filter");
    Self { terms }
  }

  pub fn is_empty(&self) -> bool {
    self.terms.is_empty()
  }

  pub fn matches(
    &self,
    task: &Task
  ) -> bool {
    if self.terms.is_empty() {
      return true;
    }

    let text =
      match serde_json::to_string(task) {
        | Ok(text) => text,
        | Err(err) => {
          trace!(error = %err, "task not serializable; treating as hidden");
          return false;
        }
      };

    self
      .terms
      .iter()
      .any(|term| text.contains(term.as_str()))
  }
}
