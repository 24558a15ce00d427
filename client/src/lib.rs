//! # Session Client Library
//!
//! Headless participant for the dodgeball session server. It connects over
//! UDP, turns typed commands into packets and keeps a local mirror of what
//! the authority broadcasts.
//!
//! The client never decides anything about the session. Hit counts, the
//! losing player and the order of chat messages all come from the server;
//! the client only renders them.
//!
//! ## Module Organization
//!
//! ### Input Module (`input`)
//! Parses command lines (`fire`, `lob`, `hit`, `say`, `reset`, `quit`) and
//! remembers the last facing direction for shots without one.
//!
//! ### Game Module (`game`)
//! `SessionView`, the local mirror of roster, hit counts, live projectiles,
//! relayed messages and the game-over banner. Relayed actions are worded
//! differently for the player's own echo ("You said: ...") and for others.
//!
//! ### Network Module (`network`)
//! Socket handling, the handshake with bounded retries, heartbeats and the
//! main receive loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ConnectPolicy};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new("127.0.0.1:8080", 0, None).await?;
//!     client.run(ConnectPolicy::default()).await?;
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
