//! Per-event idempotency marker
//!
//! Every projectile carries exactly one `EventToken`. Any number of impact
//! detectors may observe the same projectile (the struck player, a duplicate
//! collision callback, a second player the ball grazed in the same frame), but
//! only one of them may turn that observation into a counted hit.

use std::sync::atomic::{AtomicBool, Ordering};

/// One-way `Live -> Consumed` marker for a single event instance
///
/// Consumption is a single compare-and-swap, so concurrent callers are
/// linearized: exactly one `try_consume` returns true for the lifetime
/// of the token.
#[derive(Debug, Default)]
pub struct EventToken {
    consumed: AtomicBool,
}

impl EventToken {
    pub fn new() -> Self {
        Self {
            consumed: AtomicBool::new(false),
        }
    }

    /// Attempts the `Live -> Consumed` transition
    ///
    /// Returns true for the single winning caller. Every later or losing
    /// concurrent call gets false, which is a defined outcome rather than
    /// an error.
    pub fn try_consume(&self) -> bool {
        self.consumed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed.load(Ordering::Acquire)
    }
}
