//! Authoritative session state: registrations, hit counters and game-over
//!
//! The `SessionAuthority` is the single owner of everything that decides who
//! lost. Impact detectors on any thread report hits here; the transport layer
//! reports joins and leaves here. All of it funnels through one mutex, so an
//! increment and its threshold comparison can never interleave with another
//! hit, a registration or an unregistration.
//!
//! ## State machine
//!
//! ```text
//! Active --[a player reaches their threshold]--> GameOver --[reset]--> Active
//! ```
//!
//! Once the session is over, hit notifications are discarded rather than
//! queued. Hits that were in flight when another player lost do not count.
//!
//! ## Display numbers
//!
//! Each registration holds a small ordinal (1, 2, 3, ...). Numbers released by
//! unregistration are reused oldest-first before any never-used number is
//! handed out. Handing out a number that is still assigned means the
//! serialization above was broken, and the authority panics rather than
//! continue with a corrupt roster.

use crate::config::SessionConfig;
use log::{debug, error, info, warn};
use shared::{DisplayNumber, GameOverReport, HitReport, PlayerId};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    GameOver,
}

/// One registered participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub player_id: PlayerId,
    pub display_number: DisplayNumber,
    pub hit_count: u32,
    /// Per-player override; `None` (or zero) falls back to the session default
    pub hit_threshold: Option<u32>,
}

impl Registration {
    fn new(player_id: PlayerId, display_number: DisplayNumber, hit_threshold: Option<u32>) -> Self {
        Self {
            player_id,
            display_number,
            hit_count: 0,
            hit_threshold,
        }
    }

    pub fn effective_threshold(&self, default_threshold: u32) -> u32 {
        match self.hit_threshold {
            Some(threshold) if threshold > 0 => threshold,
            _ => default_threshold,
        }
    }
}

/// Result of one `register_hit` call
///
/// `game_over` is set only on the hit that ended the session. Hits discarded
/// because the session was already over report `accepted = false` and the
/// player's frozen count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitOutcome {
    pub accepted: bool,
    pub new_count: u32,
    pub game_over: bool,
}

/// Notifications delivered to observers in the authority's own order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Hit(HitReport),
    GameOver(GameOverReport),
    Reset,
}

/// Receives session events (UI, cleanup, network broadcast)
///
/// Observers are called while the authority is locked. They must return
/// quickly and must not call back into the authority.
pub trait SessionObserver: Send + Sync {
    fn notify(&self, event: &SessionEvent);
}

impl SessionObserver for mpsc::UnboundedSender<SessionEvent> {
    fn notify(&self, event: &SessionEvent) {
        if self.send(event.clone()).is_err() {
            debug!("Session observer channel closed, dropping {:?}", event);
        }
    }
}

/// Recyclable display number allocator
#[derive(Debug)]
struct NumberPool {
    recycled: VecDeque<DisplayNumber>,
    next: DisplayNumber,
    assigned: HashSet<DisplayNumber>,
}

impl NumberPool {
    fn new() -> Self {
        Self {
            recycled: VecDeque::new(),
            next: 1,
            assigned: HashSet::new(),
        }
    }

    fn allocate(&mut self) -> DisplayNumber {
        let number = match self.recycled.pop_front() {
            Some(number) => number,
            None => {
                let number = self.next;
                self.next += 1;
                number
            }
        };

        if !self.assigned.insert(number) {
            error!(
                "Display number {} handed out while still assigned; roster is corrupt",
                number
            );
            panic!("display number {} assigned twice", number);
        }

        number
    }

    fn release(&mut self, number: DisplayNumber) {
        if !self.assigned.remove(&number) {
            error!("Released display number {} that was never assigned", number);
            panic!("display number {} released twice", number);
        }
        self.recycled.push_back(number);
    }
}

#[derive(Debug)]
struct SessionInner {
    players: HashMap<PlayerId, Registration>,
    numbers: NumberPool,
    state: SessionState,
    game_over: Option<GameOverReport>,
}

impl SessionInner {
    fn new() -> Self {
        Self {
            players: HashMap::new(),
            numbers: NumberPool::new(),
            state: SessionState::Active,
            game_over: None,
        }
    }
}

pub struct SessionAuthority {
    default_hit_threshold: u32,
    inner: Mutex<SessionInner>,
    observers: RwLock<Vec<Box<dyn SessionObserver>>>,
}

impl SessionAuthority {
    /// Creates an empty, active session
    ///
    /// A zero default is treated as 1 so the termination predicate stays
    /// meaningful; `SessionConfig::validate` rejects zero before this point.
    pub fn new(default_hit_threshold: u32) -> Self {
        Self {
            default_hit_threshold: default_hit_threshold.max(1),
            inner: Mutex::new(SessionInner::new()),
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.default_hit_threshold)
    }

    pub fn add_observer(&self, observer: Box<dyn SessionObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub fn default_hit_threshold(&self) -> u32 {
        self.default_hit_threshold
    }

    /// Registers `candidate` using the session's default threshold
    pub fn register(&self, candidate: PlayerId) -> DisplayNumber {
        self.register_with_threshold(candidate, None)
    }

    /// Registers `candidate`, returning its display number
    ///
    /// Re-registering a known candidate (a reconnect) returns the number it
    /// already holds and keeps its hit count. A supplied threshold replaces
    /// the candidate's override either way.
    pub fn register_with_threshold(
        &self,
        candidate: PlayerId,
        hit_threshold: Option<u32>,
    ) -> DisplayNumber {
        let mut inner = self.lock();
        let SessionInner {
            players, numbers, ..
        } = &mut *inner;

        match players.entry(candidate) {
            Entry::Occupied(entry) => {
                let registration = entry.into_mut();
                if hit_threshold.is_some() {
                    registration.hit_threshold = hit_threshold;
                }
                debug!(
                    "Player {} re-registered as Player {}",
                    candidate, registration.display_number
                );
                registration.display_number
            }
            Entry::Vacant(entry) => {
                let number = numbers.allocate();
                entry.insert(Registration::new(candidate, number, hit_threshold));
                info!("Registered player {} as Player {}", candidate, number);
                number
            }
        }
    }

    /// Removes `candidate` and recycles its display number
    ///
    /// Returns the released number, or `None` if the candidate was unknown.
    pub fn unregister(&self, candidate: PlayerId) -> Option<DisplayNumber> {
        let mut inner = self.lock();
        let registration = inner.players.remove(&candidate)?;
        inner.numbers.release(registration.display_number);
        info!(
            "Unregistered player {} (Player {}, {} hits)",
            candidate, registration.display_number, registration.hit_count
        );
        Some(registration.display_number)
    }

    /// Replaces a registered player's threshold override
    pub fn set_hit_threshold(&self, candidate: PlayerId, hit_threshold: Option<u32>) -> bool {
        let mut inner = self.lock();
        match inner.players.get_mut(&candidate) {
            Some(registration) => {
                registration.hit_threshold = hit_threshold;
                true
            }
            None => false,
        }
    }

    /// Counts one hit against `player_id` and evaluates the termination predicate
    ///
    /// Unknown players are registered on the spot so a hit that overtakes its
    /// player's join still counts. After game over every call is discarded.
    pub fn register_hit(&self, player_id: PlayerId) -> HitOutcome {
        let mut inner = self.lock();

        if inner.state == SessionState::GameOver {
            let frozen = inner
                .players
                .get(&player_id)
                .map_or(0, |registration| registration.hit_count);
            debug!(
                "Discarding hit on player {} after game over (count stays {})",
                player_id, frozen
            );
            return HitOutcome {
                accepted: false,
                new_count: frozen,
                game_over: false,
            };
        }

        let default_threshold = self.default_hit_threshold;
        let SessionInner {
            players, numbers, ..
        } = &mut *inner;

        let registration = players.entry(player_id).or_insert_with(|| {
            let number = numbers.allocate();
            warn!(
                "Hit for unregistered player {}, registering as Player {}",
                player_id, number
            );
            Registration::new(player_id, number, None)
        });

        registration.hit_count += 1;
        let report = HitReport {
            player_id,
            display_number: registration.display_number,
            hit_count: registration.hit_count,
            hit_threshold: registration.effective_threshold(default_threshold),
        };

        debug!(
            "Player {} hit ({}/{})",
            report.display_number, report.hit_count, report.hit_threshold
        );
        self.notify(&SessionEvent::Hit(report));

        let tripped = report.hit_count >= report.hit_threshold;
        if tripped {
            let game_over = GameOverReport {
                losing_player: player_id,
                display_number: report.display_number,
                final_count: report.hit_count,
                hit_threshold: report.hit_threshold,
            };
            inner.state = SessionState::GameOver;
            inner.game_over = Some(game_over);

            info!("Game over: {}", game_over.message());
            self.notify(&SessionEvent::GameOver(game_over));
        }

        HitOutcome {
            accepted: true,
            new_count: report.hit_count,
            game_over: tripped,
        }
    }

    /// Clears every registration, counter and recycled number and reactivates the session
    pub fn reset(&self) {
        let mut inner = self.lock();
        *inner = SessionInner::new();
        info!("Session reset");
        self.notify(&SessionEvent::Reset);
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn is_game_over(&self) -> bool {
        self.state() == SessionState::GameOver
    }

    /// The losing player's report, once the session is over
    pub fn game_over_report(&self) -> Option<GameOverReport> {
        self.lock().game_over
    }

    pub fn registration(&self, player_id: PlayerId) -> Option<Registration> {
        self.lock().players.get(&player_id).cloned()
    }

    pub fn is_registered(&self, player_id: PlayerId) -> bool {
        self.lock().players.contains_key(&player_id)
    }

    pub fn effective_threshold(&self, player_id: PlayerId) -> u32 {
        self.lock()
            .players
            .get(&player_id)
            .map_or(self.default_hit_threshold, |registration| {
                registration.effective_threshold(self.default_hit_threshold)
            })
    }

    /// Snapshot of all registrations ordered by display number
    pub fn roster(&self) -> Vec<Registration> {
        let mut roster: Vec<Registration> = self.lock().players.values().cloned().collect();
        roster.sort_by_key(|registration| registration.display_number);
        roster
    }

    pub fn len(&self) -> usize {
        self.lock().players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().players.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: &SessionEvent) {
        let observers = self.observers.read().unwrap_or_else(PoisonError::into_inner);
        for observer in observers.iter() {
            observer.notify(event);
        }
    }
}
