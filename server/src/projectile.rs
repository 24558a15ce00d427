//! Projectiles: the physical event instances that carry an `EventToken`
//!
//! A `Projectile` is built with both of its capabilities up front: it is
//! consumable (it owns a token) and it is physical (it owns a handle to the
//! body the physics collaborator simulates). Detectors never have to ask an
//! arbitrary collider what it can do.
//!
//! The `Arena` is the server's registry of live projectiles. It spawns them,
//! removes consumed ones once their grace delay has passed, expires ones that
//! never hit anything, and consumes everything still in flight when the
//! session ends.

use crate::token::EventToken;
use log::debug;
use shared::{projectile_velocity, PlayerId, ProjectileId, ProjectileKind};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Physics/render side of a projectile
///
/// Called exactly once per projectile, by whichever detector consumed it.
pub trait PhysicsBody: Send + Sync {
    /// Stop producing collision callbacks for this body
    fn disable_collisions(&self);
    /// Zero all motion and make the body non-interactive
    fn come_to_rest(&self);
    /// Remove the body after `delay`
    fn schedule_removal(&self, delay: Duration);
}

pub struct Projectile {
    id: ProjectileId,
    owner: PlayerId,
    kind: ProjectileKind,
    token: EventToken,
    body: Arc<dyn PhysicsBody>,
}

impl Projectile {
    pub fn new(
        id: ProjectileId,
        owner: PlayerId,
        kind: ProjectileKind,
        body: Arc<dyn PhysicsBody>,
    ) -> Self {
        Self {
            id,
            owner,
            kind,
            token: EventToken::new(),
            body,
        }
    }

    pub fn id(&self) -> ProjectileId {
        self.id
    }

    pub fn owner(&self) -> PlayerId {
        self.owner
    }

    pub fn kind(&self) -> ProjectileKind {
        self.kind
    }

    pub fn is_consumed(&self) -> bool {
        self.token.is_consumed()
    }

    /// Consumes the token and, for the single winner, deactivates the body
    ///
    /// Returns false without touching the body if someone else already
    /// consumed this projectile.
    pub fn consume(&self, removal_grace: Duration) -> bool {
        if !self.token.try_consume() {
            return false;
        }

        self.body.disable_collisions();
        self.body.come_to_rest();
        self.body.schedule_removal(removal_grace);
        true
    }
}

impl std::fmt::Debug for Projectile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Projectile")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("kind", &self.kind)
            .field("consumed", &self.token.is_consumed())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub interactive: bool,
    pub kinematic: bool,
    pub velocity: (f32, f32),
    pub spawned_at: Instant,
    pub remove_at: Option<Instant>,
}

/// The server's record of a projectile body
#[derive(Debug)]
pub struct ArenaBody {
    state: Mutex<BodyState>,
}

impl ArenaBody {
    pub fn new(velocity: (f32, f32), spawned_at: Instant) -> Self {
        Self {
            state: Mutex::new(BodyState {
                interactive: true,
                kinematic: false,
                velocity,
                spawned_at,
                remove_at: None,
            }),
        }
    }

    pub fn snapshot(&self) -> BodyState {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, BodyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PhysicsBody for ArenaBody {
    fn disable_collisions(&self) {
        self.lock().interactive = false;
    }

    fn come_to_rest(&self) {
        let mut state = self.lock();
        state.velocity = (0.0, 0.0);
        state.kinematic = true;
    }

    fn schedule_removal(&self, delay: Duration) {
        self.lock().remove_at = Some(Instant::now() + delay);
    }
}

struct ArenaEntry {
    projectile: Arc<Projectile>,
    body: Arc<ArenaBody>,
}

/// Registry of live projectiles owned by the server loop
pub struct Arena {
    projectiles: HashMap<ProjectileId, ArenaEntry>,
    next_projectile_id: ProjectileId,
    lifetime: Duration,
    removal_grace: Duration,
}

impl Arena {
    pub fn new(lifetime: Duration, removal_grace: Duration) -> Self {
        Self {
            projectiles: HashMap::new(),
            next_projectile_id: 1,
            lifetime,
            removal_grace,
        }
    }

    /// Spawns a projectile fired by `owner` and returns it with its launch velocity
    pub fn spawn(
        &mut self,
        owner: PlayerId,
        kind: ProjectileKind,
        direction: (f32, f32),
    ) -> (Arc<Projectile>, (f32, f32)) {
        let id = self.next_projectile_id;
        self.next_projectile_id = self.next_projectile_id.wrapping_add(1).max(1);

        let velocity = projectile_velocity(kind, direction);
        let body = Arc::new(ArenaBody::new(velocity, Instant::now()));
        let projectile = Arc::new(Projectile::new(id, owner, kind, body.clone()));

        debug!("Spawned {:?} projectile {} for player {}", kind, id, owner);
        self.projectiles.insert(
            id,
            ArenaEntry {
                projectile: Arc::clone(&projectile),
                body,
            },
        );

        (projectile, velocity)
    }

    pub fn get(&self, id: ProjectileId) -> Option<Arc<Projectile>> {
        self.projectiles
            .get(&id)
            .map(|entry| Arc::clone(&entry.projectile))
    }

    pub fn body_state(&self, id: ProjectileId) -> Option<BodyState> {
        self.projectiles.get(&id).map(|entry| entry.body.snapshot())
    }

    /// Removes projectiles whose removal time has come or whose lifetime ran out
    ///
    /// Expired projectiles have their token consumed first so a late impact
    /// report on a stale handle cannot count.
    pub fn sweep(&mut self, now: Instant) -> Vec<ProjectileId> {
        let lifetime = self.lifetime;
        let mut removed: Vec<ProjectileId> = self
            .projectiles
            .iter()
            .filter(|(_, entry)| {
                let state = entry.body.snapshot();
                match state.remove_at {
                    Some(remove_at) => remove_at <= now,
                    None => now.saturating_duration_since(state.spawned_at) >= lifetime,
                }
            })
            .map(|(id, _)| *id)
            .collect();
        removed.sort_unstable();

        for id in &removed {
            if let Some(entry) = self.projectiles.remove(id) {
                if entry.projectile.consume(Duration::ZERO) {
                    debug!("Projectile {} expired without a hit", id);
                }
            }
        }

        removed
    }

    /// Consumes every projectile still in flight; returns how many were live
    pub fn consume_all(&self) -> usize {
        self.projectiles
            .values()
            .filter(|entry| entry.projectile.consume(self.removal_grace))
            .count()
    }

    pub fn clear(&mut self) {
        self.projectiles.clear();
    }

    pub fn len(&self) -> usize {
        self.projectiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projectiles.is_empty()
    }
}
