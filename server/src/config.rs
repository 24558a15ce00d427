//! Session tunables shared by the authority, the arena and the network loop

use crate::error::ConfigError;
use shared::{DEFAULT_HIT_THRESHOLD, MAX_PACKET_SIZE};
use std::time::Duration;

/// Action payloads must fit in one datagram alongside the packet framing.
const MAX_ACTION_LEN_LIMIT: usize = MAX_PACKET_SIZE / 2;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Hits that end the session for players without their own threshold
    pub default_hit_threshold: u32,
    /// Delay between consuming a projectile and removing it from the arena
    pub removal_grace: Duration,
    /// Minimum time between two projectiles fired by the same player
    pub fire_cooldown: Duration,
    /// Unconsumed projectiles are dropped after this long
    pub projectile_lifetime: Duration,
    /// Silence after which a client counts as having left
    pub client_timeout: Duration,
    pub max_clients: usize,
    pub max_action_len: usize,
    pub tick_duration: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_hit_threshold: DEFAULT_HIT_THRESHOLD,
            removal_grace: Duration::from_millis(50),
            fire_cooldown: Duration::from_millis(500),
            projectile_lifetime: Duration::from_secs(5),
            client_timeout: Duration::from_secs(5),
            max_clients: 16,
            max_action_len: 256,
            tick_duration: Duration::from_millis(33),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_hit_threshold == 0 {
            return Err(ConfigError::ZeroHitThreshold);
        }
        if self.max_clients == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.tick_duration.is_zero() {
            return Err(ConfigError::ZeroTickRate);
        }
        if self.max_action_len == 0 || self.max_action_len > MAX_ACTION_LEN_LIMIT {
            return Err(ConfigError::ActionLength {
                got: self.max_action_len,
                max: MAX_ACTION_LEN_LIMIT,
            });
        }
        Ok(())
    }
}
