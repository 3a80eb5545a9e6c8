//! Serializes pipeline runs over a shared workspace.
//!
//! Each call to [`RunGate::begin`] supersedes the previous run: its
//! cancellation token fires, the generation counter moves on, and the new
//! run queues behind the old one on an async mutex before it may touch the
//! workspace.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Default)]
pub struct RunGate {
    generation: Arc<AtomicU64>,
    active: Mutex<Option<CancellationToken>>,
    workspace_lock: Arc<AsyncMutex<()>>,
}

/// Permission to start one run.
#[derive(Debug)]
pub struct RunTicket {
    pub generation: u64,
    pub cancel: CancellationToken,
    workspace_lock: Arc<AsyncMutex<()>>,
}

impl RunTicket {
    /// Wait until no other run holds the workspace.
    ///
    /// A superseded run that gets the lock late finds its token already
    /// cancelled and stops before touching anything.
    pub async fn acquire(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.workspace_lock).lock_owned().await
    }
}

/// Read-only view of the current generation, for event consumers.
#[derive(Debug, Clone)]
pub struct GenerationWatch(Arc<AtomicU64>);

impl GenerationWatch {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}

impl RunGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Supersede whatever is running and issue the next ticket.
    pub fn begin(&self) -> RunTicket {
        let cancel = CancellationToken::new();
        let mut active = match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = active.replace(cancel.clone()) {
            previous.cancel();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation, "Run gate issued ticket");

        RunTicket {
            generation,
            cancel,
            workspace_lock: Arc::clone(&self.workspace_lock),
        }
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn watch(&self) -> GenerationWatch {
        GenerationWatch(Arc::clone(&self.generation))
    }

    /// Cancel the in-flight run without starting a new one.
    pub fn cancel_current(&self) {
        let active = match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(token) = active.as_ref() {
            token.cancel();
        }
    }
}
