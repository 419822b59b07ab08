use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use bw_durable::{Context, QueryError, Signal, Workflow};
use bw_events::{Action, Event, EventId, PullRequestLabel};

use crate::states::sequencer::Sequencer;
use crate::types::FullRepo;

pub const MERGE_LABEL: &str = "quantm-merge";
pub const PRIORITY_LABEL: &str = "quantm-priority";

#[derive(Debug)]
pub enum TrunkSignal {
    Label(Event<PullRequestLabel>),
}

impl Signal for TrunkSignal {
    fn name(&self) -> &'static str {
        match self {
            Self::Label(_) => "label",
        }
    }
}

#[derive(Debug)]
pub enum TrunkQuery {
    Peek,
    Position(i64),
    Length,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrunkReply {
    Peek(Option<QueueItem>),
    Position(Option<usize>),
    Length(usize),
    All(Vec<QueueItem>),
}

/// A pull request waiting to merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub number: i64,
    pub branch: String,
    /// Label event that queued it.
    pub event: EventId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrunkState {
    pub repo: FullRepo,
    pub queue: Sequencer<i64, QueueItem>,
}

impl TrunkState {
    /// Merge label queues the PR, priority label moves it to the front, and
    /// any action other than `created` takes it out.
    pub fn apply_label(&mut self, event: &Event<PullRequestLabel>) {
        let label = &event.payload;
        let item = QueueItem {
            number: label.number,
            branch: label.branch.clone(),
            event: event.id.clone(),
        };
        match (event.context.action, label.name.as_str()) {
            (Action::Created, MERGE_LABEL) => self.queue.push(label.number, item),
            (Action::Created, PRIORITY_LABEL) => self.queue.priority(label.number, item),
            (Action::Created, _) => {}
            _ => {
                self.queue.remove(&label.number);
            }
        }
    }
}

/// Per-repository process owning the merge queue.
pub struct TrunkWorkflow {
    state: TrunkState,
}

impl TrunkWorkflow {
    pub fn new(repo: FullRepo) -> Self {
        Self {
            state: TrunkState {
                repo,
                queue: Sequencer::new(),
            },
        }
    }
}

#[async_trait]
impl Workflow for TrunkWorkflow {
    const NAME: &'static str = "trunk";
    type Signal = TrunkSignal;
    type Query = TrunkQuery;
    type Reply = TrunkReply;
    type Snapshot = TrunkState;

    async fn on_signal(&mut self, ctx: &mut Context, signal: TrunkSignal) {
        match signal {
            TrunkSignal::Label(event) => {
                self.state.apply_label(&event);
                tracing::info!(
                    workflow = %ctx.identity(),
                    number = event.payload.number,
                    label = %event.payload.name,
                    action = %event.context.action,
                    queued = self.state.queue.len(),
                    "label: applied"
                );
            }
        }
    }

    fn on_query(&self, query: TrunkQuery) -> Result<TrunkReply, QueryError> {
        let queue = &self.state.queue;
        Ok(match query {
            TrunkQuery::Peek => TrunkReply::Peek(queue.peek().map(|(_, item)| item.clone())),
            TrunkQuery::Position(number) => TrunkReply::Position(queue.position(&number)),
            TrunkQuery::Length => TrunkReply::Length(queue.len()),
            TrunkQuery::All => TrunkReply::All(queue.iter().map(|(_, item)| item.clone()).collect()),
        })
    }

    fn snapshot(&self) -> TrunkState {
        self.state.clone()
    }

    fn restore(&mut self, snapshot: TrunkState) {
        self.state = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{full_repo, label_event};

    fn numbers(state: &TrunkState) -> Vec<i64> {
        state.queue.iter().map(|(number, _)| *number).collect()
    }

    #[test]
    fn labels_drive_the_queue() {
        let repo = full_repo("widgets", "/srv/git/widgets", 10);
        let mut state = TrunkWorkflow::new(repo.clone()).state;

        state.apply_label(&label_event(&repo, Action::Created, MERGE_LABEL, 1, "a"));
        state.apply_label(&label_event(&repo, Action::Created, MERGE_LABEL, 2, "b"));
        state.apply_label(&label_event(&repo, Action::Created, PRIORITY_LABEL, 3, "c"));
        assert_eq!(numbers(&state), vec![3, 1, 2]);

        state.apply_label(&label_event(&repo, Action::Removed, MERGE_LABEL, 1, "a"));
        assert_eq!(numbers(&state), vec![3, 2]);
    }

    #[test]
    fn unrelated_labels_are_ignored() {
        let repo = full_repo("widgets", "/srv/git/widgets", 10);
        let mut state = TrunkWorkflow::new(repo.clone()).state;
        state.apply_label(&label_event(&repo, Action::Created, "bug", 1, "a"));
        state.apply_label(&label_event(&repo, Action::Created, "merge", 2, "b"));
        state.apply_label(&label_event(&repo, Action::Created, "priority", 3, "c"));
        assert!(state.queue.is_empty());
    }

    #[test]
    fn requeue_keeps_position_and_refreshes_event() {
        let repo = full_repo("widgets", "/srv/git/widgets", 10);
        let mut state = TrunkWorkflow::new(repo.clone()).state;
        state.apply_label(&label_event(&repo, Action::Created, MERGE_LABEL, 1, "a"));
        state.apply_label(&label_event(&repo, Action::Created, MERGE_LABEL, 2, "b"));
        let again = label_event(&repo, Action::Created, MERGE_LABEL, 1, "a");
        state.apply_label(&again);
        assert_eq!(numbers(&state), vec![1, 2]);
        assert_eq!(state.queue.peek().unwrap().1.event, again.id);
    }
}
