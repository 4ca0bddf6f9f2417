//! Startup readiness gating.
//!
//! The gate is a one-shot lifecycle: `Initializing → Ready` or
//! `Initializing → Failed`. The first terminal transition wins; later
//! transitions are no-ops. Operations issued while the gate is still
//! initializing suspend on a watch channel and resume in submission order
//! (for a single caller task) once the gate resolves.

use tokio::sync::watch;

/// Lifecycle state of a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreState {
    /// Snapshot load in progress; operations wait.
    Initializing,
    /// Load finished; operations run immediately.
    Ready,
    /// Load failed; operations report the store as unavailable.
    Failed(String),
}

impl StoreState {
    /// Whether this state is terminal (`Ready` or `Failed`).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StoreState::Initializing)
    }
}

/// One-shot readiness gate.
#[derive(Debug)]
pub struct ReadyGate {
    tx: watch::Sender<StoreState>,
}

impl ReadyGate {
    /// Create a gate in the `Initializing` state.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(StoreState::Initializing);
        Self { tx }
    }

    /// Subscribe to lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<StoreState> {
        self.tx.subscribe()
    }

    /// Current state.
    pub fn state(&self) -> StoreState {
        self.tx.borrow().clone()
    }

    /// Transition to `Ready`. No-op if already terminal.
    pub fn open(&self) {
        self.transition(StoreState::Ready);
    }

    /// Transition to `Failed`. No-op if already terminal.
    pub fn fail(&self, reason: impl Into<String>) {
        self.transition(StoreState::Failed(reason.into()));
    }

    fn transition(&self, next: StoreState) {
        self.tx.send_if_modified(|state| {
            if state.is_terminal() {
                return false;
            }
            *state = next.clone();
            true
        });
    }

    /// Wait until the gate resolves, returning the terminal state.
    ///
    /// Resolves immediately once the gate is terminal, so post-ready
    /// callers pay only a watch borrow.
    pub async fn wait(&self) -> StoreState {
        let mut rx = self.tx.subscribe();
        loop {
            let state = rx.borrow_and_update().clone();
            if state.is_terminal() {
                return state;
            }
            if rx.changed().await.is_err() {
                return self.state();
            }
        }
    }
}

impl Default for ReadyGate {
    fn default() -> Self {
        Self::new()
    }
}
