//! Per-player impact detection
//!
//! One `ImpactDetector` exists per registered player. The physics
//! collaborator calls `on_impact` whenever a projectile touches that player,
//! possibly several times for one projectile and possibly from several
//! threads at once. The projectile's token decides which single call counts.

use crate::projectile::Projectile;
use crate::session::{HitOutcome, SessionAuthority};
use log::debug;
use shared::PlayerId;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Impact {
    /// This detector consumed the projectile and the authority saw the hit
    Counted(HitOutcome),
    /// Another observer consumed the projectile first; nothing happened
    AlreadyConsumed,
}

#[derive(Clone)]
pub struct ImpactDetector {
    player_id: PlayerId,
    authority: Arc<SessionAuthority>,
    removal_grace: Duration,
}

impl ImpactDetector {
    pub fn new(
        player_id: PlayerId,
        authority: Arc<SessionAuthority>,
        removal_grace: Duration,
    ) -> Self {
        Self {
            player_id,
            authority,
            removal_grace,
        }
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    /// Handles a collision between this detector's player and `projectile`
    ///
    /// Consuming the token is the commit point: once it succeeds the hit is
    /// forwarded to the authority and cannot be withdrawn.
    pub fn on_impact(&self, projectile: &Projectile) -> Impact {
        if !projectile.consume(self.removal_grace) {
            debug!(
                "Projectile {} already consumed, ignoring impact on player {}",
                projectile.id(),
                self.player_id
            );
            return Impact::AlreadyConsumed;
        }

        Impact::Counted(self.authority.register_hit(self.player_id))
    }
}
