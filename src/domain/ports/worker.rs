//! Worker agent port - interface for external task executors.

use async_trait::async_trait;
use tokio::sync::watch;
use uuid::Uuid;

use crate::domain::errors::CoreResult;

/// Cooperative cancellation signal handed to worker agents.
///
/// Kill commands and attempt timeouts flip the signal; a cooperating
/// worker observes it at its next suspension point and returns early.
/// Non-cooperating workers are abandoned and their eventual result is
/// discarded by the orchestrator.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
    // Keeps the channel open for signals created without a handle.
    _keepalive: Option<std::sync::Arc<watch::Sender<bool>>>,
}

impl CancelSignal {
    /// A signal that never fires. Useful for direct invocations.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Some(std::sync::Arc::new(tx)),
        }
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until cancellation is requested (or the handle is dropped).
    pub async fn cancelled(&mut self) {
        // A closed channel means the handle is gone; treat as cancelled.
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Sender half held by the orchestrator; dropping it closes the signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Create a connected handle/signal pair.
    pub fn new() -> (Self, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (
            Self { tx },
            CancelSignal {
                rx,
                _keepalive: None,
            },
        )
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// External executor that turns a task prompt into a result.
///
/// This is the only expected long-running operation in the core; the
/// coordinator bounds it with the per-kind deadline from the policy
/// table.
#[async_trait]
pub trait WorkerAgent: Send + Sync {
    /// Run one attempt. Returns an opaque result payload or an error
    /// string that the coordinator wraps as `CoreError::Worker`.
    async fn run(
        &self,
        prompt: &str,
        goal_id: Uuid,
        task_id: Uuid,
        cancel: CancelSignal,
    ) -> CoreResult<serde_json::Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_signal_fires() {
        let (handle, signal) = CancelHandle::new();
        assert!(!signal.is_cancelled());
        handle.cancel();
        assert!(signal.is_cancelled());

        let mut signal = signal;
        // Must return immediately once cancelled.
        signal.cancelled().await;
    }

    #[tokio::test]
    async fn test_never_signal_stays_quiet() {
        let signal = CancelSignal::never();
        assert!(!signal.is_cancelled());
    }
}
