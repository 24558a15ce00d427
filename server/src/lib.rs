//! # Session Authority Server
//!
//! This library provides the authoritative side of a small dodgeball-style
//! multiplayer session. Projectiles strike players; every strike must be
//! counted exactly once, attributed to the right player, and used to decide
//! a single "who lost" answer that every participant sees.
//!
//! ## Core Responsibilities
//!
//! ### Exactly-Once Hit Counting
//! Each projectile carries an `EventToken`. However many collision reports
//! arrive for a projectile, from however many participants, only the first
//! successful consumption of its token turns into a hit.
//!
//! ### Authoritative Session State
//! The `SessionAuthority` owns the roster, the hit counters, the pool of
//! recyclable display numbers and the `Active`/`GameOver` state. Every
//! mutation goes through one lock, so increment-then-compare is atomic.
//!
//! ### Relayed Player Actions
//! Actions such as chat go participant -> authority -> everyone, keeping the
//! original sender's identity and a single total order.
//!
//! ## Module Organization
//!
//! ### Token Module (`token`)
//! The one-way `Live -> Consumed` marker.
//!
//! ### Projectile Module (`projectile`)
//! Projectiles, the physics body collaborator interface and the arena of
//! live projectiles (spawn, deferred removal, expiry, game-over cleanup).
//!
//! ### Detector Module (`detector`)
//! Per-player impact detectors that consume tokens and report hits.
//!
//! ### Session Module (`session`)
//! Registration, hit registration, termination and reset.
//!
//! ### Relay Module (`relay`)
//! Validation and sequencing of player-initiated actions.
//!
//! ### Client Manager Module (`client_manager`)
//! Transport-side connection table: addresses, liveness, fire cooldown.
//!
//! ### Network Module (`network`)
//! UDP socket handling, packet dispatch and broadcasting.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::SessionConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig {
//!         default_hit_threshold: 3,
//!         ..SessionConfig::default()
//!     };
//!
//!     let mut server = Server::new("127.0.0.1:8080", config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The core types also work without any networking:
//!
//! ```rust
//! use server::detector::{Impact, ImpactDetector};
//! use server::projectile::Arena;
//! use server::session::SessionAuthority;
//! use shared::ProjectileKind;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let authority = Arc::new(SessionAuthority::new(3));
//! authority.register(1);
//!
//! let mut arena = Arena::new(Duration::from_secs(5), Duration::from_millis(50));
//! let (ball, _) = arena.spawn(2, ProjectileKind::Kinematic, (1.0, 0.0));
//!
//! let detector = ImpactDetector::new(1, Arc::clone(&authority), Duration::from_millis(50));
//! assert!(matches!(detector.on_impact(&ball), Impact::Counted(_)));
//! assert_eq!(detector.on_impact(&ball), Impact::AlreadyConsumed);
//! ```

pub mod client_manager;
pub mod config;
pub mod detector;
pub mod error;
pub mod network;
pub mod projectile;
pub mod relay;
pub mod session;
pub mod token;
