use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::RuntimeConfig;
use crate::error::{DurableError, QueryError, SnapshotError};
use crate::history::Entry;
use crate::identity::Identity;
use crate::session::SessionPool;
use crate::snapshot::{SnapshotRecord, SnapshotStore};
use crate::workflow::{Context, Signal, Workflow};

/// Shared by every instance: configuration, the session pool and the
/// snapshot store.
pub struct Runtime {
    config: RuntimeConfig,
    sessions: SessionPool,
    snapshots: Arc<dyn SnapshotStore>,
}

impl Runtime {
    pub fn new(config: RuntimeConfig, snapshots: Arc<dyn SnapshotStore>) -> Arc<Self> {
        let sessions = SessionPool::new(config.session_slots);
        Arc::new(Self {
            config,
            sessions,
            snapshots,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionPool {
        &self.sessions
    }

    pub fn snapshots(&self) -> &dyn SnapshotStore {
        self.snapshots.as_ref()
    }
}

type Reply<W> = Result<<W as Workflow>::Reply, QueryError>;
type QueryEnvelope<W> = (<W as Workflow>::Query, oneshot::Sender<Reply<W>>);

struct Handle<W: Workflow> {
    signals: mpsc::Sender<W::Signal>,
    queries: mpsc::Sender<QueryEnvelope<W>>,
    task: JoinHandle<()>,
}

/// Running instances of one workflow type, keyed by identity.
pub struct Registry<W: Workflow> {
    runtime: Arc<Runtime>,
    instances: Arc<Mutex<HashMap<Identity, Handle<W>>>>,
}

impl<W: Workflow> Clone for Registry<W> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            instances: self.instances.clone(),
        }
    }
}

impl<W: Workflow> Registry<W> {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self {
            runtime,
            instances: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Delivers `signal` to the instance at `identity`, starting it with
    /// `init` first when it is not running. A started instance is rehydrated
    /// from its latest snapshot if one exists.
    ///
    /// The snapshot is read off the executor with the registry unlocked; when
    /// two callers race to start the same identity the first to relock wins.
    pub async fn signal_with_start<F>(
        &self,
        identity: &Identity,
        signal: W::Signal,
        init: F,
    ) -> Result<(), DurableError>
    where
        F: FnOnce() -> W,
    {
        let running = {
            let instances = self.instances.lock().await;
            instances
                .get(identity)
                .filter(|handle| !handle.signals.is_closed())
                .map(|handle| handle.signals.clone())
        };
        let sender = match running {
            Some(sender) => sender,
            None => {
                let record = self.load_snapshot(identity).await?;
                let mut instances = self.instances.lock().await;
                let running = instances
                    .get(identity)
                    .is_some_and(|handle| !handle.signals.is_closed());
                if !running {
                    let handle = self.start(identity, init(), record);
                    instances.insert(identity.clone(), handle);
                }
                instances
                    .get(identity)
                    .map(|handle| handle.signals.clone())
                    .ok_or_else(|| DurableError::NotRunning(identity.clone()))?
            }
        };
        sender
            .send(signal)
            .await
            .map_err(|_| DurableError::MailboxClosed(identity.clone()))
    }

    /// Delivers `signal` to an already running instance.
    pub async fn signal(&self, identity: &Identity, signal: W::Signal) -> Result<(), DurableError> {
        let sender = {
            let instances = self.instances.lock().await;
            instances.get(identity).map(|handle| handle.signals.clone())
        }
        .ok_or_else(|| DurableError::NotRunning(identity.clone()))?;
        sender
            .send(signal)
            .await
            .map_err(|_| DurableError::MailboxClosed(identity.clone()))
    }

    /// Asks a running instance a question. The reply is produced after every
    /// signal already in its mailbox has been applied.
    pub async fn query(&self, identity: &Identity, query: W::Query) -> Result<W::Reply, QueryError> {
        let sender = {
            let instances = self.instances.lock().await;
            instances.get(identity).map(|handle| handle.queries.clone())
        }
        .ok_or_else(|| QueryError::NotRunning(identity.clone()))?;
        let (reply_tx, reply_rx) = oneshot::channel();
        sender
            .send((query, reply_tx))
            .await
            .map_err(|_| QueryError::NotRunning(identity.clone()))?;
        reply_rx.await.map_err(|_| QueryError::Dropped)?
    }

    pub async fn contains(&self, identity: &Identity) -> bool {
        self.instances.lock().await.contains_key(identity)
    }

    pub async fn len(&self) -> usize {
        self.instances.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.instances.lock().await.is_empty()
    }

    /// Closes every mailbox and waits for the instances to persist their
    /// final snapshots.
    pub async fn shutdown(&self) {
        let handles: Vec<Handle<W>> = {
            let mut instances = self.instances.lock().await;
            instances.drain().map(|(_, handle)| handle).collect()
        };
        let tasks = handles.into_iter().map(|handle| {
            let Handle {
                signals,
                queries,
                task,
            } = handle;
            drop(signals);
            drop(queries);
            task
        });
        for result in futures::future::join_all(tasks).await {
            if let Err(err) = result {
                tracing::error!(workflow = W::NAME, error = %err, "instance task failed");
            }
        }
    }

    async fn load_snapshot(&self, identity: &Identity) -> Result<Option<SnapshotRecord>, DurableError> {
        let runtime = self.runtime.clone();
        let key = identity.clone();
        let record = tokio::task::spawn_blocking(move || runtime.snapshots().load(&key))
            .await
            .map_err(SnapshotError::from)??;
        Ok(record)
    }

    fn start(&self, identity: &Identity, mut workflow: W, record: Option<SnapshotRecord>) -> Handle<W> {
        let mut incarnation = 0;
        if let Some(record) = record {
            match serde_json::from_value::<W::Snapshot>(record.state) {
                Ok(snapshot) => {
                    workflow.restore(snapshot);
                    incarnation = record.incarnation;
                    tracing::info!(workflow = %identity, incarnation, "rehydrated from snapshot");
                }
                Err(err) => {
                    tracing::warn!(workflow = %identity, error = %err, "ignoring unreadable snapshot");
                }
            }
        }

        let capacity = self.runtime.config().mailbox_capacity.max(1);
        let (signal_tx, signal_rx) = mpsc::channel(capacity);
        let (query_tx, query_rx) = mpsc::channel(capacity);
        let ctx = Context::new(identity.clone(), incarnation, self.runtime.clone());
        let task = tokio::spawn(run_instance(workflow, ctx, signal_rx, query_rx));
        Handle {
            signals: signal_tx,
            queries: query_tx,
            task,
        }
    }
}

async fn run_instance<W: Workflow>(
    mut workflow: W,
    mut ctx: Context,
    mut signals: mpsc::Receiver<W::Signal>,
    mut queries: mpsc::Receiver<QueryEnvelope<W>>,
) {
    tracing::info!(workflow = %ctx.identity(), kind = W::NAME, incarnation = ctx.incarnation(), "started");
    loop {
        tokio::select! {
            biased;
            signal = signals.recv() => {
                let Some(signal) = signal else { break };
                let name = signal.name();
                tracing::info!(workflow = %ctx.identity(), "rx: {name}");
                ctx.history_mut().record(Entry::Signal { name: name.to_string() });
                workflow.on_signal(&mut ctx, signal).await;
                if ctx.continue_as_new_suggested() {
                    continue_as_new(&mut workflow, &mut ctx);
                }
            }
            query = queries.recv() => {
                let Some((query, reply)) = query else { break };
                let _ = reply.send(workflow.on_query(query));
            }
        }
    }
    if let Err(err) = persist(&workflow, &ctx, ctx.incarnation()) {
        tracing::warn!(workflow = %ctx.identity(), error = %err, "failed to persist final snapshot");
    }
    tracing::info!(workflow = %ctx.identity(), "stopped");
}

/// Externalizes the carried fields, restarts the instance from them and
/// clears its history.
fn continue_as_new<W: Workflow>(workflow: &mut W, ctx: &mut Context) {
    let next = ctx.incarnation() + 1;
    match persist(workflow, ctx, next) {
        Ok(state) => match serde_json::from_value::<W::Snapshot>(state) {
            Ok(snapshot) => workflow.restore(snapshot),
            Err(err) => tracing::warn!(workflow = %ctx.identity(), error = %err, "snapshot did not round-trip"),
        },
        Err(err) => {
            tracing::warn!(workflow = %ctx.identity(), error = %err, "failed to persist snapshot");
        }
    }
    ctx.next_incarnation();
    tracing::info!(workflow = %ctx.identity(), incarnation = ctx.incarnation(), "continued as new");
}

fn persist<W: Workflow>(
    workflow: &W,
    ctx: &Context,
    incarnation: u32,
) -> Result<serde_json::Value, SnapshotError> {
    let state = serde_json::to_value(workflow.snapshot())?;
    ctx.runtime().snapshots().save(&SnapshotRecord {
        identity: ctx.identity().clone(),
        workflow: W::NAME.to_string(),
        incarnation,
        state: state.clone(),
        at: Utc::now(),
    })?;
    Ok(state)
}
