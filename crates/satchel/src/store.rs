//! The session store: gated operations plus background flush and sweep.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::collection::SessionCollection;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::gate::{ReadyGate, StoreState};
use crate::snapshot;

/// Storage capability expected by a session middleware.
///
/// Absence is success: `get` returns `Ok(None)` for a missing or expired
/// id, and `destroy`/`touch` on an absent id are no-ops. The only error
/// surfaced to callers is the store being unavailable after a failed
/// startup.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Fetch the content for `id`, if present and unexpired.
    async fn get(&self, id: &str) -> Result<Option<Value>>;

    /// Insert or replace the content for `id`.
    async fn set(&self, id: &str, content: Value) -> Result<()>;

    /// Remove the record for `id`. Removing an absent id succeeds.
    async fn destroy(&self, id: &str) -> Result<()>;

    /// Remove every record.
    async fn clear(&self) -> Result<()>;

    /// Number of unexpired records.
    async fn count(&self) -> Result<usize>;

    /// Extend the effective lifetime of `id` without altering content.
    /// Touching an absent id succeeds.
    async fn touch(&self, id: &str) -> Result<()>;
}

struct Shared {
    collection: RwLock<SessionCollection>,
    gate: ReadyGate,
    config: StoreConfig,

    /// Set by mutations, cleared by flushes.
    dirty: AtomicBool,

    /// Flush generation counter, bumped after every durable write.
    flush_tx: watch::Sender<u64>,

    /// Background task handles, aborted on close/drop.
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Shared {
    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    fn report(&self, err: &StoreError) {
        warn!(error = %err, "session store error");
        if let Some(hook) = &self.config.error_hook {
            hook(err);
        }
    }

    /// Gate check every operation goes through. Suspends while the store
    /// is still loading; errors once it has failed.
    async fn ensure_ready(&self) -> Result<()> {
        match self.gate.wait().await {
            StoreState::Ready => Ok(()),
            StoreState::Failed(reason) => Err(StoreError::Unavailable(reason)),
            StoreState::Initializing => Err(StoreError::Unavailable("store closed".to_string())),
        }
    }

    /// Write the current state to disk.
    ///
    /// The record set is cloned under the read lock so the flush observes
    /// a consistent snapshot, then written off the async thread.
    async fn flush(&self) -> Result<()> {
        let records = self.collection.read().await.snapshot_records();
        let path = self.config.path.clone();

        tokio::task::spawn_blocking(move || snapshot::write(&path, records))
            .await
            .map_err(|e| StoreError::Flush {
                path: self.config.path.clone(),
                source: std::io::Error::other(e),
            })??;

        self.flush_tx.send_modify(|generation| *generation += 1);
        Ok(())
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }
}

/// Embedded session store.
///
/// Owns its collection and snapshot location outright; two stores opened
/// against different paths are fully independent. Cloning is cheap and
/// shares the same underlying store.
///
/// [`open`](Self::open) returns immediately: the snapshot loads in a
/// background task and the readiness gate resolves once it finishes.
/// Operations issued before then suspend and run in submission order (per
/// caller task) once the store is ready; after a failed load they resolve
/// to [`StoreError::Unavailable`].
pub struct SessionStore {
    shared: Arc<Shared>,
}

impl SessionStore {
    /// Open a store against the configured snapshot location.
    ///
    /// Must be called within a tokio runtime. If a snapshot already exists
    /// it is reused, preserving records and their `updated_at` values;
    /// otherwise the store starts empty.
    pub fn open(config: StoreConfig) -> Self {
        let store = Self::suspended(config);
        store.spawn_loader();
        store.spawn_autosave();
        store.spawn_sweeper();
        store
    }

    /// Build a store with an unresolved gate and no background tasks.
    fn suspended(config: StoreConfig) -> Self {
        let shared = Arc::new(Shared {
            collection: RwLock::new(SessionCollection::new(config.ttl)),
            gate: ReadyGate::new(),
            dirty: AtomicBool::new(false),
            flush_tx: watch::channel(0).0,
            tasks: Mutex::new(Vec::new()),
            config,
        });
        Self { shared }
    }

    fn spawn_loader(&self) {
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            let path = shared.config.path.clone();
            let load = tokio::task::spawn_blocking(move || snapshot::load(&path));

            let joined = match shared.config.load_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, load).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        let err = StoreError::LoadTimeout(timeout);
                        shared.report(&err);
                        shared.gate.fail(err.to_string());
                        return;
                    }
                },
                None => load.await,
            };

            match joined {
                Ok(Ok(Some(records))) => {
                    let count = records.len();
                    let mut collection = shared.collection.write().await;
                    *collection = SessionCollection::from_records(records, shared.config.ttl);
                    drop(collection);
                    shared.gate.open();
                    debug!(records = count, "session store ready");
                }
                Ok(Ok(None)) => {
                    shared.gate.open();
                    debug!("no existing snapshot, session store starting empty");
                }
                Ok(Err(err)) => {
                    shared.report(&err);
                    shared.gate.fail(err.to_string());
                }
                Err(e) => {
                    let err = StoreError::Unavailable(format!("snapshot load task failed: {e}"));
                    shared.report(&err);
                    shared.gate.fail(err.to_string());
                }
            }
        });
        self.shared.tasks.lock().push(handle);
    }

    // Timer tasks hold only a weak reference between ticks so dropping the
    // last store handle tears them down even without an explicit close().

    fn spawn_autosave(&self) {
        if !self.shared.config.autosave {
            return;
        }

        let weak = Arc::downgrade(&self.shared);
        let interval = self.shared.config.autosave_interval;
        let handle = tokio::spawn(async move {
            {
                let Some(shared) = weak.upgrade() else { return };
                if shared.gate.wait().await != StoreState::Ready {
                    return;
                }
            }

            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tick.tick().await; // first tick is immediate
            loop {
                tick.tick().await;
                let Some(shared) = weak.upgrade() else { return };
                if shared.dirty.swap(false, Ordering::AcqRel)
                    && let Err(err) = shared.flush().await
                {
                    // Keep the state dirty so the next tick retries.
                    shared.mark_dirty();
                    shared.report(&err);
                }
            }
        });
        self.shared.tasks.lock().push(handle);
    }

    fn spawn_sweeper(&self) {
        let Some(interval) = self.shared.config.effective_sweep_interval() else {
            return;
        };

        let weak = Arc::downgrade(&self.shared);
        let handle = tokio::spawn(async move {
            {
                let Some(shared) = weak.upgrade() else { return };
                if shared.gate.wait().await != StoreState::Ready {
                    return;
                }
            }

            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tick.tick().await;
            loop {
                tick.tick().await;
                let Some(shared) = weak.upgrade() else { return };
                let swept = shared.collection.write().await.sweep();
                if swept > 0 {
                    debug!(swept, "ttl sweep removed expired sessions");
                    shared.mark_dirty();
                }
            }
        });
        self.shared.tasks.lock().push(handle);
    }

    /// The configuration this store was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StoreState {
        self.shared.gate.state()
    }

    /// Subscribe to lifecycle transitions (the `connect`/`disconnect`
    /// signals of the storage contract).
    pub fn subscribe(&self) -> watch::Receiver<StoreState> {
        self.shared.gate.subscribe()
    }

    /// Wait for the store to come up. Errors if the load failed.
    pub async fn wait_ready(&self) -> Result<()> {
        self.shared.ensure_ready().await
    }

    /// Subscribe to the flush generation counter. The value increments
    /// after every successful durable write; callers needing a durability
    /// barrier can await a change here instead of tying flushes to
    /// individual operations.
    pub fn flush_events(&self) -> watch::Receiver<u64> {
        self.shared.flush_tx.subscribe()
    }

    /// Fetch the content for `id`, if present and unexpired.
    pub async fn get(&self, id: &str) -> Result<Option<Value>> {
        self.shared.ensure_ready().await?;
        let collection = self.shared.collection.read().await;
        Ok(collection.get(id).map(|rec| rec.content.clone()))
    }

    /// Insert or replace the content for `id`, advancing its freshness
    /// timestamp. Completion means the in-memory mutation is applied;
    /// durability follows via autosave or [`flush`](Self::flush).
    pub async fn set(&self, id: &str, content: Value) -> Result<()> {
        self.shared.ensure_ready().await?;
        self.shared.collection.write().await.upsert(id, content);
        self.shared.mark_dirty();
        Ok(())
    }

    /// Remove the record for `id`. Removing an absent id is a no-op.
    pub async fn destroy(&self, id: &str) -> Result<()> {
        self.shared.ensure_ready().await?;
        let removed = self.shared.collection.write().await.remove(id);
        if removed.is_some() {
            self.shared.mark_dirty();
        }
        Ok(())
    }

    /// Remove every record.
    pub async fn clear(&self) -> Result<()> {
        self.shared.ensure_ready().await?;
        self.shared.collection.write().await.clear();
        self.shared.mark_dirty();
        Ok(())
    }

    /// Number of unexpired records.
    pub async fn count(&self) -> Result<usize> {
        self.shared.ensure_ready().await?;
        Ok(self.shared.collection.read().await.len())
    }

    /// Advance the freshness timestamp for `id` without altering content.
    /// Touching an absent or expired id is a no-op.
    pub async fn touch(&self, id: &str) -> Result<()> {
        self.shared.ensure_ready().await?;
        let touched = self.shared.collection.write().await.touch(id);
        if touched {
            self.shared.mark_dirty();
        }
        Ok(())
    }

    /// Write the current state to disk immediately.
    pub async fn flush(&self) -> Result<()> {
        self.shared.ensure_ready().await?;
        self.shared.dirty.store(false, Ordering::Release);
        if let Err(err) = self.shared.flush().await {
            self.shared.mark_dirty();
            self.shared.report(&err);
            return Err(err);
        }
        Ok(())
    }

    /// Stop background tasks and flush unsaved state.
    ///
    /// Idempotent. A store closed while still loading transitions to the
    /// failed state so pending operations resolve instead of hanging.
    pub async fn close(&self) -> Result<()> {
        let handles: Vec<JoinHandle<()>> = self.shared.tasks.lock().drain(..).collect();
        for handle in &handles {
            handle.abort();
        }

        if self.shared.gate.state() == StoreState::Initializing {
            self.shared.gate.fail("store closed");
        }

        if self.shared.gate.state() == StoreState::Ready
            && self.shared.dirty.swap(false, Ordering::AcqRel)
        {
            self.shared.flush().await?;
        }
        Ok(())
    }
}

impl Clone for SessionStore {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("path", &self.shared.config.path)
            .field("state", &self.shared.gate.state())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SessionStorage for SessionStore {
    async fn get(&self, id: &str) -> Result<Option<Value>> {
        SessionStore::get(self, id).await
    }

    async fn set(&self, id: &str, content: Value) -> Result<()> {
        SessionStore::set(self, id, content).await
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        SessionStore::destroy(self, id).await
    }

    async fn clear(&self) -> Result<()> {
        SessionStore::clear(self).await
    }

    async fn count(&self) -> Result<usize> {
        SessionStore::count(self).await
    }

    async fn touch(&self, id: &str) -> Result<()> {
        SessionStore::touch(self, id).await
    }
}
