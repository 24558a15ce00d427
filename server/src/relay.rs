//! Two-hop relay for player-initiated actions
//!
//! A participant proposes an action to the authority; the authority checks it
//! and rebroadcasts it to every participant, the proposer included. The
//! broadcast carries the proposer's id, never the authority's, so each
//! receiver can tell its own echoed action from someone else's. Sequence
//! numbers are handed out here, which gives all participants one total order
//! of actions no matter how proposals raced on the way in.

use crate::error::RelayRejection;
use crate::session::SessionAuthority;
use log::debug;
use shared::{PlayerAction, PlayerId, RelayedAction};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct ActionRelay {
    authority: Arc<SessionAuthority>,
    max_action_len: usize,
    next_sequence: AtomicU64,
}

impl ActionRelay {
    pub fn new(authority: Arc<SessionAuthority>, max_action_len: usize) -> Self {
        Self {
            authority,
            max_action_len,
            next_sequence: AtomicU64::new(1),
        }
    }

    /// Validates a proposal from `origin` and stamps it for broadcast
    pub fn relay(
        &self,
        origin: PlayerId,
        action: PlayerAction,
    ) -> Result<RelayedAction, RelayRejection> {
        if !self.authority.is_registered(origin) {
            return Err(RelayRejection::UnknownOrigin(origin));
        }
        if action.is_empty() {
            return Err(RelayRejection::EmptyPayload);
        }
        let len = action.payload_len();
        if len > self.max_action_len {
            return Err(RelayRejection::PayloadTooLarge {
                len,
                max: self.max_action_len,
            });
        }

        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        debug!("Relaying action #{} from player {}", sequence, origin);

        Ok(RelayedAction {
            origin,
            sequence,
            action,
        })
    }
}
