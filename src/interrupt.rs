//! User interrupt handling for a running task.
//!
//! The OS-level SIGINT handler never terminates the client. It only raises an
//! event on an [`InterruptContext`], which the stream engine waits on alongside
//! the task stream and translates into a remote signal request.
//!
//! The context also carries the reject gate: while a forwarded signal is in
//! flight, further interrupts are logged and dropped rather than queued, so at
//! most one signal request is outstanding at a time.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct GateState {
    pending: bool,
    rejecting: bool,
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<GateState>,
    notify: Notify,
}

/// Cancellation context shared between the interrupt handler and the engine.
#[derive(Debug, Clone, Default)]
pub struct InterruptContext {
    inner: Arc<Inner>,
}

impl InterruptContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a user interrupt. Returns `false` when it was dropped because a
    /// forwarded signal is still in flight.
    pub fn raise(&self) -> bool {
        {
            let mut state = self.lock();
            if state.rejecting {
                tracing::debug!("Ctrl+C has been pressed, signal already in flight. Ignoring it");
                return false;
            }
            state.pending = true;
        }
        tracing::debug!("Ctrl+C pressed");
        self.inner.notify.notify_one();
        true
    }

    /// Wait for the next interrupt and consume it.
    ///
    /// Cancel safe: an interrupt is only consumed when this future completes.
    pub async fn interrupted(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.take() {
                return;
            }
            notified.await;
        }
    }

    fn take(&self) -> bool {
        std::mem::take(&mut self.lock().pending)
    }

    /// Drop an interrupt that has not been consumed yet. Returns whether one
    /// was pending.
    pub fn discard(&self) -> bool {
        self.take()
    }

    pub fn is_pending(&self) -> bool {
        self.lock().pending
    }

    /// Close the gate while a signal request is outstanding. Any interrupt that
    /// slipped in since the last one was consumed is dropped.
    pub fn begin_forward(&self) {
        let mut state = self.lock();
        state.rejecting = true;
        state.pending = false;
    }

    /// Re-open the gate once the daemon confirms the task is running again.
    pub fn end_forward(&self) {
        self.lock().rejecting = false;
    }

    pub fn is_rejecting(&self) -> bool {
        self.lock().rejecting
    }

    /// Clear all state before a new task run.
    pub fn reset(&self) {
        *self.lock() = GateState::default();
    }
}

/// Route SIGINT into `ctx` for the lifetime of the process.
///
/// Once installed, SIGINT no longer terminates the process.
pub fn install_interrupt_handler(ctx: InterruptContext) -> std::io::Result<JoinHandle<()>> {
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(tokio::spawn(async move {
        while sigint.recv().await.is_some() {
            ctx.raise();
        }
    }))
}
