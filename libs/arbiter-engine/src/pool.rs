/// Worker slots, admission and cancellation
///
/// A `WorkerPool` is a counting semaphore. Holding a `Lease` is the only way
/// to run a sandboxed unit, and the lease returns its slot when dropped, on
/// every path: success, fault, timeout, cancellation or panic unwinding.
/// The same type bounds concurrent submissions at the grader's front door.
use std::sync::Arc;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};

#[derive(Debug, thiserror::Error)]
#[error("worker pool is closed")]
pub struct PoolClosed;

#[derive(Debug, Clone)]
pub struct WorkerPool {
    slots: Arc<Semaphore>,
    size: usize,
}

/// Scoped ownership of one slot
#[derive(Debug)]
pub struct Lease {
    _permit: OwnedSemaphorePermit,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            slots: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Wait for a free slot. Waiters are served in FIFO order.
    pub async fn lease(&self) -> Result<Lease, PoolClosed> {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolClosed)?;
        Ok(Lease { _permit: permit })
    }

    pub fn try_lease(&self) -> Option<Lease> {
        self.slots
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| Lease { _permit: permit })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn in_use(&self) -> usize {
        self.size - self.available()
    }
}

/// Cooperative cancellation shared by every case of one submission
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once `cancel` has been called on any clone.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // the sender lives as long as any clone of this token
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}
