use std::sync::Arc;

use super::tracker::TokenManagerInner;

/// An epoch marker held by a reader for the duration of one query. Not
/// `Clone`: a reader that needs to keep reading past a handoff must ask the
/// manager for a new token rather than duplicate this one, so the manager
/// always knows the exact set of serials currently in flight.
///
/// Dropping a `Token` (including as the tail end of a move) reports its
/// serial complete. Because Rust never runs `Drop` on a moved-from binding,
/// a moved `Token` simply never reports twice — there is no separate
/// tombstone state to maintain.
pub struct Token {
    pub(super) serial: u64,
    pub(super) manager: Arc<TokenManagerInner>,
}

impl Token {
    pub fn serial(&self) -> u64 {
        self.serial
    }
}

impl Drop for Token {
    fn drop(&mut self) {
        self.manager.complete(self.serial);
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token").field("serial", &self.serial).finish()
    }
}
