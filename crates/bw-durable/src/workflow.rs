use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::activity::{self, ActivityOptions};
use crate::error::{ActivityError, QueryError, SessionError};
use crate::history::{Entry, History};
use crate::identity::Identity;
use crate::registry::Runtime;
use crate::session::{Session, SessionOptions};

/// A message delivered to a workflow's signal channel.
pub trait Signal: fmt::Debug + Send + 'static {
    fn name(&self) -> &'static str;
}

/// A long-running, single-threaded state machine addressed by an
/// [`Identity`]. Signals are applied one at a time, in arrival order;
/// queries are answered between signals and never mutate state.
#[async_trait]
pub trait Workflow: Send + 'static {
    const NAME: &'static str;

    type Signal: Signal;
    type Query: fmt::Debug + Send + 'static;
    type Reply: Send + 'static;
    /// Fields carried across continue-as-new.
    type Snapshot: Serialize + DeserializeOwned + Send + 'static;

    async fn on_signal(&mut self, ctx: &mut Context, signal: Self::Signal);

    fn on_query(&self, query: Self::Query) -> Result<Self::Reply, QueryError>;

    fn snapshot(&self) -> Self::Snapshot;

    /// Replaces the carried state with `snapshot`.
    fn restore(&mut self, snapshot: Self::Snapshot);
}

/// Per-incarnation handle a workflow uses to reach the runtime.
pub struct Context {
    identity: Identity,
    history: History,
    incarnation: u32,
    runtime: Arc<Runtime>,
}

impl Context {
    pub(crate) fn new(identity: Identity, incarnation: u32, runtime: Arc<Runtime>) -> Self {
        Self {
            identity,
            history: History::default(),
            incarnation,
            runtime,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub(crate) fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub(crate) fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    pub fn incarnation(&self) -> u32 {
        self.incarnation
    }

    pub(crate) fn next_incarnation(&mut self) {
        self.incarnation += 1;
        self.history.reset();
    }

    /// True once the history is long enough that the instance should
    /// externalize its state and restart empty.
    pub fn continue_as_new_suggested(&self) -> bool {
        self.history.len() >= self.runtime.config().max_history
    }

    /// Runs a non-deterministic computation once and records its result.
    pub fn side_effect<T, F>(&mut self, compute: F) -> T
    where
        T: Serialize,
        F: FnOnce() -> T,
    {
        let value = compute();
        let recorded = serde_json::to_value(&value).unwrap_or(serde_json::Value::Null);
        self.history.record(Entry::SideEffect { value: recorded });
        value
    }

    pub fn session_options(&self) -> &SessionOptions {
        &self.runtime.config().session
    }

    pub fn activity_options(&self) -> &ActivityOptions {
        &self.runtime.config().activity
    }

    /// Leases a worker slot with the runtime's session options.
    pub async fn create_session(&self) -> Result<Session, SessionError> {
        self.runtime
            .sessions()
            .create(&self.identity, &self.runtime.config().session)
            .await
    }

    /// Runs an activity with the runtime's timeout and retry policy.
    pub async fn execute_activity<T, F, Fut>(
        &mut self,
        name: &'static str,
        attempt: F,
    ) -> Result<T, ActivityError>
    where
        T: Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, ActivityError>> + Send,
    {
        let options = self.runtime.config().activity.clone();
        self.execute_activity_with(name, &options, attempt).await
    }

    pub async fn execute_activity_with<T, F, Fut>(
        &mut self,
        name: &'static str,
        options: &ActivityOptions,
        attempt: F,
    ) -> Result<T, ActivityError>
    where
        T: Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, ActivityError>> + Send,
    {
        tracing::info!(workflow = %self.identity, "dispatch({name}): init");
        let outcome = activity::run_with_retry(name, options, attempt).await;
        self.history.record(Entry::Activity {
            name: name.to_string(),
            attempts: outcome.attempts,
            ok: outcome.result.is_ok(),
        });
        match &outcome.result {
            Ok(_) => tracing::info!(workflow = %self.identity, attempts = outcome.attempts, "dispatch({name}): success"),
            Err(err) => tracing::warn!(workflow = %self.identity, attempts = outcome.attempts, error = %err, "dispatch({name}): error"),
        }
        outcome.result
    }
}
