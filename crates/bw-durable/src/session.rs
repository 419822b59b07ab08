use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::error::SessionError;
use crate::identity::Identity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// How long to wait for a free worker slot.
    pub creation_timeout: Duration,
    /// Upper bound on the whole session, from creation to close.
    pub execution_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            creation_timeout: Duration::from_secs(30),
            execution_timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Worker slots that sessions lease. A session holds its slot until it is
/// dropped.
#[derive(Clone)]
pub struct SessionPool {
    slots: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    next_id: Arc<AtomicU64>,
}

impl SessionPool {
    pub fn new(slots: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(slots.max(1))),
            active: Arc::new(AtomicUsize::new(0)),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    pub async fn create(
        &self,
        owner: &Identity,
        options: &SessionOptions,
    ) -> Result<Session, SessionError> {
        let permit = tokio::time::timeout(
            options.creation_timeout,
            self.slots.clone().acquire_owned(),
        )
        .await
        .map_err(|_| SessionError::CreationTimeout(options.creation_timeout))?
        .map_err(|_| SessionError::Closed)?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);
        tracing::info!(workflow = %owner, session = id, "session: init");
        Ok(Session {
            id,
            owner: owner.clone(),
            deadline: Instant::now() + options.execution_timeout,
            execution_timeout: options.execution_timeout,
            active: self.active.clone(),
            _permit: permit,
        })
    }
}

/// A leased worker slot. Dropping the session releases the slot.
#[derive(Debug)]
pub struct Session {
    id: u64,
    owner: Identity,
    deadline: Instant,
    execution_timeout: Duration,
    active: Arc<AtomicUsize>,
    _permit: OwnedSemaphorePermit,
}

impl Session {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Runs `work` bounded by what is left of the execution timeout.
    pub async fn run<T, F>(&self, work: F) -> Result<T, SessionError>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout_at(self.deadline, work)
            .await
            .map_err(|_| SessionError::ExecutionTimeout(self.execution_timeout))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        tracing::info!(workflow = %self.owner, session = self.id, "session: completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Identity {
        Identity::repo("bw", "acme", "widgets", 1).branch("feature")
    }

    #[tokio::test]
    async fn dropping_a_session_releases_its_slot() {
        let pool = SessionPool::new(1);
        let options = SessionOptions::default();
        {
            let session = pool.create(&owner(), &options).await.unwrap();
            assert_eq!(pool.active(), 1);
            assert_eq!(pool.available(), 0);
            assert!(session.remaining() > Duration::ZERO);
        }
        assert_eq!(pool.active(), 0);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn creation_times_out_when_slots_are_taken() {
        let pool = SessionPool::new(1);
        let options = SessionOptions {
            creation_timeout: Duration::from_millis(20),
            execution_timeout: Duration::from_secs(5),
        };
        let _held = pool.create(&owner(), &options).await.unwrap();
        let err = pool.create(&owner(), &options).await.unwrap_err();
        assert_eq!(err, SessionError::CreationTimeout(Duration::from_millis(20)));
        assert_eq!(pool.active(), 1);
    }

    #[tokio::test]
    async fn work_past_the_deadline_is_cut_off() {
        let pool = SessionPool::new(1);
        let options = SessionOptions {
            creation_timeout: Duration::from_secs(1),
            execution_timeout: Duration::from_millis(20),
        };
        let session = pool.create(&owner(), &options).await.unwrap();
        let result = session
            .run(tokio::time::sleep(Duration::from_secs(5)))
            .await;
        assert!(matches!(result, Err(SessionError::ExecutionTimeout(_))));
        assert_eq!(session.remaining(), Duration::ZERO);
    }
}
