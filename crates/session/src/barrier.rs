//! Countdown barrier that releases waiters once every expected frame is stored.

use tokio::sync::watch;

/// Observable state of a [`CompletionBarrier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierState {
    /// Signals still outstanding.
    Pending(u32),
    /// Count reached zero.
    Released,
    /// The owning session was evicted before completion.
    Cancelled,
}

/// Why a wait ended without release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BarrierError {
    #[error("completion barrier cancelled")]
    Cancelled,
}

/// Per-session countdown initialized to the expected frame count.
///
/// Any number of tasks may `signal` concurrently. `wait` suspends until the
/// count reaches zero or the barrier is cancelled; all waiters are released
/// together.
#[derive(Debug)]
pub struct CompletionBarrier {
    state: watch::Sender<BarrierState>,
}

impl CompletionBarrier {
    pub fn new(count: u32) -> Self {
        let initial = if count == 0 {
            BarrierState::Released
        } else {
            BarrierState::Pending(count)
        };
        let (state, _) = watch::channel(initial);
        Self { state }
    }

    /// Current state.
    pub fn state(&self) -> BarrierState {
        *self.state.borrow()
    }

    /// Outstanding signals (zero once released or cancelled).
    pub fn remaining(&self) -> u32 {
        match self.state() {
            BarrierState::Pending(n) => n,
            BarrierState::Released | BarrierState::Cancelled => 0,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == BarrierState::Cancelled
    }

    /// Decrement the count by one. Signals after cancellation are ignored.
    ///
    /// # Panics
    ///
    /// Panics when signalled after release: every distinct frame signals
    /// exactly once, so an extra signal means the dedup ledger is broken.
    pub fn signal(&self) {
        let mut overrun = false;
        self.state.send_if_modified(|state| match *state {
            BarrierState::Pending(n) if n > 1 => {
                *state = BarrierState::Pending(n - 1);
                true
            }
            BarrierState::Pending(_) => {
                *state = BarrierState::Released;
                true
            }
            BarrierState::Released => {
                overrun = true;
                false
            }
            BarrierState::Cancelled => false,
        });
        assert!(!overrun, "completion barrier signalled past zero");
    }

    /// Release every current and future waiter with [`BarrierError::Cancelled`].
    ///
    /// Returns false if the barrier had already released.
    pub fn cancel(&self) -> bool {
        let mut cancelled = false;
        self.state.send_if_modified(|state| match *state {
            BarrierState::Pending(_) => {
                *state = BarrierState::Cancelled;
                cancelled = true;
                true
            }
            BarrierState::Cancelled => {
                cancelled = true;
                false
            }
            BarrierState::Released => false,
        });
        cancelled
    }

    /// Suspend until the count reaches zero.
    pub async fn wait(&self) -> Result<(), BarrierError> {
        let mut rx = self.state.subscribe();
        let outcome = rx
            .wait_for(|state| !matches!(state, BarrierState::Pending(_)))
            .await
            .map(|state| *state)
            .unwrap_or(BarrierState::Cancelled);

        match outcome {
            BarrierState::Released => Ok(()),
            _ => Err(BarrierError::Cancelled),
        }
    }
}
