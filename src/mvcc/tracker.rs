use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use super::token::Token;

/// Tracks tokens issued before a cutoff serial number. Constructed with that
/// cutoff and a snapshot of how many tokens were in flight at that instant;
/// every completion report with a serial below the cutoff decrements the
/// count, and once it reaches zero the tracker is done. No set of individual
/// serials is ever stored — the snapshot count at creation time is already
/// enough, since every token outstanding then necessarily has serial <
/// cutoff by construction.
struct TrackerState {
    cutoff: u64,
    remaining: Mutex<u64>,
    condvar: Condvar,
}

impl TrackerState {
    /// Reports a token's completion. Ignores (returns `false` with no
    /// change) any serial at or past this tracker's cutoff — that token
    /// wasn't counted in `remaining` and isn't this tracker's concern, even
    /// though it may still arrive out of order relative to older tokens.
    /// Returns `true` once this report brings `remaining` to zero.
    fn on_token_complete(&self, serial: u64) -> bool {
        if serial >= self.cutoff {
            return false;
        }
        let mut remaining = self.remaining.lock();
        *remaining = remaining.checked_sub(1).expect("tracker remaining-count underflow");
        if *remaining == 0 {
            self.condvar.notify_all();
            true
        } else {
            false
        }
    }

    fn is_complete(&self) -> bool {
        *self.remaining.lock() == 0
    }

    fn wait(&self) {
        let mut remaining = self.remaining.lock();
        while *remaining != 0 {
            self.condvar.wait(&mut remaining);
        }
    }
}

/// A future-like handle that resolves once every `Token` with serial less
/// than the tracker's cutoff has been dropped — i.e. once every reader that
/// was in flight at tracker-creation time has finished. The recycler uses
/// this to know when it is safe to reclaim a sealed slice's backing memory.
#[derive(Clone)]
pub struct TokenTracker {
    state: Arc<TrackerState>,
}

impl TokenTracker {
    pub fn is_complete(&self) -> bool {
        self.state.is_complete()
    }

    /// Blocks the calling thread until completion. Intended for the
    /// recycler's background thread, never for request-handling threads.
    pub fn wait(&self) {
        self.state.wait();
    }
}

/// The tuple `(next_serial, tokens_in_flight)` must be read and written in
/// tandem, and the tracker FIFO must be consulted under the same view of
/// that tuple — a tracker built from a `next_serial` that doesn't yet
/// reflect a concurrently in-flight `issue_token` call would under-count
/// `tokens_in_flight` and resolve early. One mutex guards all three so
/// issuing a token and creating a tracker can never interleave.
struct TokenManagerState {
    next_serial: u64,
    tokens_in_flight: u64,
    shutting_down: bool,
    trackers: VecDeque<Arc<TrackerState>>,
}

pub(super) struct TokenManagerInner {
    state: Mutex<TokenManagerState>,
    shutdown_condvar: Condvar,
}

impl TokenManagerInner {
    pub(super) fn complete(&self, serial: u64) {
        let mut state = self.state.lock();
        assert!(state.tokens_in_flight > 0, "token completed with <= 0 tokens in flight");
        state.tokens_in_flight -= 1;

        // m_trackers is a sequence of zero or more already-complete trackers
        // followed by trackers that have not completed. Pop the completed
        // prefix off the front as this completion resolves it...
        while let Some(front) = state.trackers.front().cloned() {
            if front.on_token_complete(serial) {
                state.trackers.pop_front();
            } else {
                break;
            }
        }
        // ...then just notify the rest (front, if still present, was
        // already notified by the loop above): an older tracker is only
        // allowed to finish no later than a younger one, since cutoffs are
        // non-decreasing along the FIFO.
        for tracker in state.trackers.iter().skip(1) {
            assert!(!tracker.on_token_complete(serial), "a tracker completed before an older tracker did");
        }

        let quiesced = state.tokens_in_flight == 0 && state.shutting_down;
        drop(state);
        if quiesced {
            self.shutdown_condvar.notify_all();
        }
    }
}

/// Issues `Token`s with strictly increasing serial numbers and resolves
/// `TokenTracker`s in the order they were created.
pub struct TokenManager {
    inner: Arc<TokenManagerInner>,
}

impl TokenManager {
    pub fn new() -> Self {
        TokenManager {
            inner: Arc::new(TokenManagerInner {
                state: Mutex::new(TokenManagerState {
                    next_serial: 0,
                    tokens_in_flight: 0,
                    shutting_down: false,
                    trackers: VecDeque::new(),
                }),
                shutdown_condvar: Condvar::new(),
            }),
        }
    }

    pub fn issue_token(&self) -> Token {
        let mut state = self.inner.state.lock();
        assert!(!state.shutting_down, "requested a token while shutting down");
        let serial = state.next_serial;
        state.next_serial += 1;
        state.tokens_in_flight += 1;
        Token { serial, manager: Arc::clone(&self.inner) }
    }

    /// Creates a tracker whose cutoff is the next serial to be issued and
    /// whose starting count is the current in-flight count, both read under
    /// one lock acquisition so no token can be issued or completed between
    /// the two reads.
    pub fn create_tracker(&self) -> TokenTracker {
        let mut state = self.inner.state.lock();
        let cutoff = state.next_serial;
        let remaining = state.tokens_in_flight;
        let tracker_state = Arc::new(TrackerState { cutoff, remaining: Mutex::new(remaining), condvar: Condvar::new() });

        // If nothing is in flight the tracker is already complete; there is
        // no point enqueueing it where `complete` would have to skip over
        // it forever.
        if remaining > 0 {
            state.trackers.push_back(Arc::clone(&tracker_state));
        }
        TokenTracker { state: tracker_state }
    }

    /// Marks the manager as shutting down and blocks until every
    /// outstanding token has been dropped. Fatal if called twice, or if
    /// `issue_token` is called after shutdown has started.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        assert!(!state.shutting_down, "multiple shutdowns seen");
        state.shutting_down = true;
        while state.tokens_in_flight > 0 {
            self.inner.shutdown_condvar.wait(&mut state);
        }
    }

    pub fn outstanding_count(&self) -> usize {
        self.inner.state.lock().tokens_in_flight as usize
    }
}

impl Default for TokenManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_resolves_immediately_with_no_outstanding_tokens() {
        let manager = TokenManager::new();
        let tracker = manager.create_tracker();
        assert!(tracker.is_complete());
    }

    #[test]
    fn tracker_waits_for_tokens_issued_before_it() {
        let manager = TokenManager::new();
        let token = manager.issue_token();
        let tracker = manager.create_tracker();
        assert!(!tracker.is_complete());
        drop(token);
        assert!(tracker.is_complete());
    }

    #[test]
    fn tracker_ignores_tokens_issued_after_it() {
        let manager = TokenManager::new();
        let tracker = manager.create_tracker();
        let later = manager.issue_token();
        assert!(tracker.is_complete());
        drop(later);
    }

    #[test]
    fn trackers_resolve_in_fifo_order() {
        let manager = TokenManager::new();
        let t1 = manager.issue_token();
        let tracker_a = manager.create_tracker();
        let t2 = manager.issue_token();
        let tracker_b = manager.create_tracker();

        drop(t2);
        assert!(!tracker_a.is_complete(), "tracker_a still waits on t1");
        assert!(!tracker_b.is_complete());

        drop(t1);
        assert!(tracker_a.is_complete());
        assert!(tracker_b.is_complete());
    }

    #[test]
    fn moved_token_does_not_double_report() {
        let manager = TokenManager::new();
        let token = manager.issue_token();
        assert_eq!(manager.outstanding_count(), 1);
        let moved = token;
        drop(moved);
        assert_eq!(manager.outstanding_count(), 0);
    }

    #[test]
    fn a_token_completing_out_of_order_does_not_resolve_an_older_tracker() {
        // t2 is issued after tracker_a's cutoff, so dropping it must not
        // count toward tracker_a even though it completes first.
        let manager = TokenManager::new();
        let t1 = manager.issue_token();
        let tracker_a = manager.create_tracker();
        let t2 = manager.issue_token();

        drop(t2);
        assert!(!tracker_a.is_complete());
        drop(t1);
        assert!(tracker_a.is_complete());
    }

    #[test]
    fn shutdown_blocks_until_in_flight_tokens_drain() {
        let manager = Arc::new(TokenManager::new());
        let token = manager.issue_token();

        let waiter = Arc::clone(&manager);
        let handle = std::thread::spawn(move || waiter.shutdown());

        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(!handle.is_finished(), "shutdown must not return while a token is outstanding");

        drop(token);
        handle.join().unwrap();
    }

    #[test]
    #[should_panic(expected = "multiple shutdowns seen")]
    fn shutdown_twice_is_fatal() {
        let manager = TokenManager::new();
        manager.shutdown();
        manager.shutdown();
    }

    #[test]
    #[should_panic(expected = "requested a token while shutting down")]
    fn issuing_a_token_after_shutdown_is_fatal() {
        let manager = TokenManager::new();
        manager.shutdown();
        manager.issue_token();
    }
}
