//! Turn-state machine.
//!
//! One value of [`TurnState`] per connection makes the concurrency rules
//! unrepresentable rather than checked: a main turn and an aside can never
//! be active at the same time because there is only one slot to occupy.
//! Transitions happen under a synchronous lock, before any await point, so
//! two frames racing into the same handler cannot both claim the slot.

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use parley_core::errors::ErrorCode;

/// What the connection is currently doing.
#[derive(Clone, Debug, Default)]
pub enum TurnState {
    /// Nothing in flight; main turns and asides may start.
    #[default]
    Idle,
    /// A main turn cycle (partner + coach) is streaming.
    MainProcessing,
    /// An aside question is streaming on the given thread.
    AsideProcessing {
        /// Active aside thread.
        thread_id: String,
        /// Cancels the in-flight provider stream.
        cancel: CancellationToken,
    },
}

impl TurnState {
    /// Whether new work may start.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// Shared, lock-guarded turn state with transition methods.
#[derive(Default)]
pub struct TurnSlot {
    state: Mutex<TurnState>,
}

impl TurnSlot {
    /// Fresh idle slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn current(&self) -> TurnState {
        self.state.lock().clone()
    }

    /// Claim the slot for a main turn.
    ///
    /// Fails with `RATE_LIMITED` while anything is in flight — a second
    /// main submit or a concurrent aside both land here.
    pub fn begin_main(&self) -> Result<(), ErrorCode> {
        let mut state = self.state.lock();
        if state.is_idle() {
            *state = TurnState::MainProcessing;
            Ok(())
        } else {
            Err(ErrorCode::RateLimited)
        }
    }

    /// Claim the slot for an aside, returning the cancellation token the
    /// stream must observe. Fails with `ASIDE_BUSY` while anything is in
    /// flight.
    pub fn begin_aside(&self, thread_id: &str) -> Result<CancellationToken, ErrorCode> {
        let mut state = self.state.lock();
        if state.is_idle() {
            let cancel = CancellationToken::new();
            *state = TurnState::AsideProcessing {
                thread_id: thread_id.to_owned(),
                cancel: cancel.clone(),
            };
            Ok(cancel)
        } else {
            Err(ErrorCode::AsideBusy)
        }
    }

    /// Release the slot after a main turn, however it ended.
    pub fn finish_main(&self) {
        let mut state = self.state.lock();
        if matches!(*state, TurnState::MainProcessing) {
            *state = TurnState::Idle;
        }
    }

    /// Release the slot after an aside, if that thread still holds it.
    ///
    /// A no-op when cancellation already cleared the slot (or another
    /// thread claimed it since).
    pub fn finish_aside(&self, thread_id: &str) {
        let mut state = self.state.lock();
        if matches!(&*state, TurnState::AsideProcessing { thread_id: active, .. } if active == thread_id)
        {
            *state = TurnState::Idle;
        }
    }

    /// Cancel the active aside if `thread_id` matches.
    ///
    /// Fires the token and clears the slot immediately so a wedged provider
    /// stream can never keep the connection stuck in the aside state; the
    /// running task observes the token and winds down on its own.
    /// Returns the fired token, or `None` if the thread was not active.
    pub fn cancel_aside(&self, thread_id: &str) -> Option<CancellationToken> {
        let mut state = self.state.lock();
        match &*state {
            TurnState::AsideProcessing { thread_id: active, cancel } if active == thread_id => {
                let token = cancel.clone();
                token.cancel();
                *state = TurnState::Idle;
                Some(token)
            }
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
