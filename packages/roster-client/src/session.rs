//! Async driver around the reconciler.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use roster_core::{FieldPatch, FieldValue, Person, PersonDraft, PersonField, PersonId};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::pending::{MutationId, MutationState};
use crate::reconciler::{FetchTicket, Notice, Reconciler};
use crate::snapshot::CacheSnapshot;
use crate::subscription::FeedSubscription;
use crate::transport::{ChangeSource, PersonApi};

/// Owns the reconciler and performs the network calls it asks for.
///
/// Cheap to clone; clones share state. Must be used inside a tokio runtime.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

struct Inner {
    api: Arc<dyn PersonApi>,
    /// Never held across an await
    core: Mutex<Reconciler>,
    /// Latest spawned fetch and its generation. Locked after `core`, never before.
    fetch_task: Mutex<Option<(u64, JoinHandle<()>)>>,
    idle: Notify,
    revision_tx: watch::Sender<u64>,
}

/// Outcome of a dispatched create or update.
#[derive(Debug)]
pub struct MutationHandle {
    mutation: MutationId,
    task: JoinHandle<Result<Person>>,
}

impl MutationHandle {
    pub fn id(&self) -> MutationId {
        self.mutation
    }

    /// Waits for the server's answer. The snapshot has already been
    /// confirmed or rolled back when this returns.
    pub async fn outcome(self) -> Result<Person> {
        self.task
            .await
            .map_err(|e| ClientError::Transport(format!("mutation task failed: {}", e)))?
    }
}

impl Session {
    pub fn new(api: Arc<dyn PersonApi>, config: &ClientConfig) -> Self {
        let (revision_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                api,
                core: Mutex::new(Reconciler::new(config.reapply_pending_on_refetch)),
                fetch_task: Mutex::new(None),
                idle: Notify::new(),
                revision_tx,
            }),
        }
    }

    /// Starts a fetch of the whole table.
    pub fn load(&self) {
        let ticket = self.inner.core.lock().invalidate();
        if let Some(ticket) = ticket {
            self.spawn_fetch(ticket);
        }
        self.notify();
    }

    /// Fetches and waits until nothing is in flight.
    pub async fn refresh(&self) -> CacheSnapshot {
        self.load();
        self.wait_idle().await;
        self.snapshot()
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        self.inner.core.lock().snapshot().clone()
    }

    pub fn revision(&self) -> u64 {
        self.inner.core.lock().revision()
    }

    pub fn create_state(&self) -> MutationState {
        self.inner.core.lock().create_state()
    }

    pub fn take_notices(&self) -> Vec<Notice> {
        self.inner.core.lock().take_notices()
    }

    /// Receiver that sees the snapshot revision after every state change.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.inner.revision_tx.subscribe()
    }

    /// Runs `f` with the reconciler locked. `f` must not block.
    pub fn with_core<R>(&self, f: impl FnOnce(&mut Reconciler) -> R) -> R {
        let mut core = self.inner.core.lock();
        f(&mut core)
    }

    /// Appends `draft` optimistically and dispatches the create.
    pub fn submit_create(&self, draft: PersonDraft) -> MutationHandle {
        let ticket = {
            let mut core = self.inner.core.lock();
            let ticket = core.begin_create(draft);
            self.abort_superseded_fetch(&core);
            ticket
        };
        self.notify();

        let session = self.clone();
        let task = tokio::spawn(async move {
            let outcome = session.inner.api.create(ticket.draft).await;
            session.settle(ticket.mutation, outcome.clone());
            outcome
        });
        MutationHandle {
            mutation: ticket.mutation,
            task,
        }
    }

    /// Validates and dispatches a single-field update.
    ///
    /// Type mismatches, placeholder ids and unknown ids fail here without
    /// any network call.
    pub fn submit_field_update(
        &self,
        id: &PersonId,
        field: PersonField,
        value: FieldValue,
    ) -> Result<MutationHandle> {
        let patch = FieldPatch::new(field, value)?;
        self.submit_patch(id, patch)
    }

    pub fn submit_patch(&self, id: &PersonId, patch: FieldPatch) -> Result<MutationHandle> {
        let ticket = {
            let mut core = self.inner.core.lock();
            let ticket = core.begin_field_update(id, patch)?;
            self.abort_superseded_fetch(&core);
            ticket
        };
        self.notify();

        let session = self.clone();
        let task = tokio::spawn(async move {
            let outcome = session.inner.api.update(&ticket.id, ticket.patch).await;
            session.settle(ticket.mutation, outcome.clone());
            outcome
        });
        Ok(MutationHandle {
            mutation: ticket.mutation,
            task,
        })
    }

    /// Invalidates the snapshot after an out-of-band change.
    pub fn on_external_change(&self) {
        let ticket = self.inner.core.lock().on_external_change();
        if let Some(ticket) = ticket {
            self.spawn_fetch(ticket);
        }
        self.notify();
    }

    /// Resolves once no mutation or fetch is in flight or queued.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.core.lock().is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Starts listening to `source`. Dropping the subscription stops it.
    pub fn subscribe(&self, source: Arc<dyn ChangeSource>, config: &ClientConfig) -> FeedSubscription {
        FeedSubscription::spawn(self.clone(), source, config.feed_wait(), config.retry_delay())
    }

    fn settle(&self, mutation: MutationId, outcome: Result<Person>) {
        let ticket = self.inner.core.lock().settle(mutation, outcome);
        if let Some(ticket) = ticket {
            self.spawn_fetch(ticket);
        }
        self.notify();
    }

    fn spawn_fetch(&self, ticket: FetchTicket) {
        tracing::debug!("Fetching people (generation {})", ticket.generation);
        let session = self.clone();
        let mut slot = self.inner.fetch_task.lock();
        let generation = ticket.generation;
        let task = tokio::spawn(async move {
            let result = session.inner.api.get_all().await;
            let next = session
                .inner
                .core
                .lock()
                .complete_fetch(ticket.generation, result);
            if let Some(next) = next {
                session.spawn_fetch(next);
            }
            session.notify();
        });
        // A late spawn of an older generation must not displace a newer task.
        match &*slot {
            Some((current, _)) if *current > generation => {}
            _ => *slot = Some((generation, task)),
        }
    }

    /// Aborts the stored fetch task unless `core` is still waiting on it.
    ///
    /// Called with the core lock held, so no fetch can be started between
    /// the cancellation and this check.
    fn abort_superseded_fetch(&self, core: &Reconciler) {
        let mut slot = self.inner.fetch_task.lock();
        let superseded = match &*slot {
            Some((generation, _)) => core.in_flight_generation() != Some(*generation),
            None => false,
        };
        if superseded {
            if let Some((generation, task)) = slot.take() {
                tracing::debug!("Aborting superseded fetch {}", generation);
                task.abort();
            }
        }
    }

    fn notify(&self) {
        let revision = self.revision();
        self.inner.revision_tx.send_replace(revision);
        self.inner.idle.notify_waiters();
    }
}
