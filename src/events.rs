//! Mutation notifications. The core only announces that a mutation
//! succeeded; callers decide what to refetch.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 256;

/// Which slice of data a mutation touched.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Scope {
  Colleges,
  Courses,
  KnowledgePoints,
  Exercises,
  Rules {
    #[serde(rename = "ownerId")]
    owner_id: String,
  },
  Paper {
    #[serde(rename = "paperId")]
    paper_id: String,
  },
  Bookmarks {
    #[serde(rename = "userId")]
    user_id: String,
  },
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct MutationEvent {
  #[serde(flatten)]
  pub scope: Scope,
}

#[derive(Clone)]
pub struct Notifier {
  tx: broadcast::Sender<MutationEvent>,
}

impl Default for Notifier {
  fn default() -> Self {
    Self::new()
  }
}

impl Notifier {
  pub fn new() -> Self {
    let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
    Self { tx }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<MutationEvent> {
    self.tx.subscribe()
  }

  /// Fire and forget; no subscribers is fine.
  pub fn publish(&self, scope: Scope) {
    let receivers = self.tx.send(MutationEvent { scope: scope.clone() }).unwrap_or(0);
    debug!(target: "exercise_bank", ?scope, receivers, "Mutation event published");
  }
}
