//! The proof-of-work search and its cancellation handshake.
//!
//! The search is the only cancellable operation of the node. A validator
//! about to apply a competing block requests cancellation and waits for
//! the acknowledgement; the search answers within a bounded number of
//! attempts. State moves `Idle -> Searching -> (Idle | Cancelling -> Idle)`.

use crate::{error::Error, keyblock::Keyblock};
use chrono::Utc;
use fidem::Identity;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};
use tokio::sync::Notify;

// attempts between two looks at the cancellation flag
const CANCEL_CHECK_INTERVAL: u32 = 50;

/// The state of the proof-of-work search.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SearchState {
    /// No search is running.
    Idle,
    /// A search is running.
    Searching,
    /// A cancellation was requested and not yet acknowledged.
    Cancelling,
}

/// The proof-of-work engine.
#[derive(Debug)]
pub struct PowEngine {
    state: Mutex<SearchState>,
    cancel_requested: AtomicBool,
    cancel_ack: Notify,
    resumed: Notify,
}

impl Default for PowEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PowEngine {
    /// Create an idle engine.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SearchState::Idle),
            cancel_requested: AtomicBool::new(false),
            cancel_ack: Notify::new(),
            resumed: Notify::new(),
        }
    }

    /// The current search state.
    pub fn state(&self) -> SearchState {
        *self.state.lock().unwrap()
    }

    /// Search a timestamp, nonce and signature sealing `block` with a hash
    /// of at least `zeros` leading zero hex digits.
    ///
    /// Returns `PowCancelled` and leaves the block unsigned when a
    /// cancellation request arrives first.
    pub async fn prove(
        &self,
        mut block: Keyblock,
        identity: &Identity,
        zeros: u32,
    ) -> Result<Keyblock, Error> {
        *self.state.lock().unwrap() = SearchState::Searching;
        log::debug!(
            "Searching a proof with {} zeros for block {}.",
            zeros,
            block.number
        );

        let mut attempts = 0;
        loop {
            attempts += 1;
            if attempts % CANCEL_CHECK_INTERVAL == 0 && self.acknowledge_cancel() {
                log::debug!("Proof search for block {} cancelled.", block.number);
                return Err(Error::PowCancelled);
            }

            let now = Utc::now().timestamp();
            if now > block.timestamp {
                block.timestamp = now;
                block.nonce = 0;
            } else {
                block.nonce += 1;
            }

            let signature = identity.sign_data(block.raw().as_bytes());
            if block.hash_with(&signature).leading_zeros() >= zeros {
                block.seal(signature);
                *self.state.lock().unwrap() = SearchState::Idle;
                log::info!(
                    "Sealed block {} after {} attempts: {}",
                    block.number,
                    attempts,
                    block.hash.unwrap()
                );
                return Ok(block);
            }

            tokio::task::yield_now().await;
        }
    }

    /// Request cancellation of a running search and wait until the search
    /// acknowledged it. Returns immediately if no search is running.
    pub async fn interrupt(&self) {
        let searching = {
            let mut state = self.state.lock().unwrap();
            if *state == SearchState::Searching {
                *state = SearchState::Cancelling;
                true
            } else {
                false
            }
        };
        if searching {
            self.cancel_requested.store(true, Ordering::SeqCst);
            self.cancel_ack.notified().await;
        }
    }

    /// Signal that the chain moved on and a fresh candidate is worth
    /// searching for.
    pub fn resume(&self) {
        self.resumed.notify_one();
    }

    /// Wait for the next `resume` signal.
    pub async fn wait_resume(&self) {
        self.resumed.notified().await;
    }

    // consume a pending cancellation request, acknowledging it
    fn acknowledge_cancel(&self) -> bool {
        if self.cancel_requested.swap(false, Ordering::SeqCst) {
            *self.state.lock().unwrap() = SearchState::Idle;
            self.cancel_ack.notify_one();
            true
        } else {
            false
        }
    }
}
