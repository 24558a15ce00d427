//! Connected participants as seen by the transport
//!
//! This module handles the server-side bookkeeping for UDP participants:
//! - Connection lifecycle (connect, disconnect, timeout)
//! - Mapping datagram source addresses to player ids
//! - Per-player fire cooldown
//! - The `ImpactDetector` bound to each player
//!
//! Player ids handed out here are opaque transport handles. The display
//! numbers players see come from the `SessionAuthority`, not from here.

use crate::detector::ImpactDetector;
use crate::session::SessionAuthority;
use log::info;
use rand::Rng;
use shared::PlayerId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A connected participant
pub struct Client {
    /// Transport handle assigned by the server
    pub id: PlayerId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Hue in degrees, picked at random on join
    pub hue: u16,
    /// Threshold override requested in the handshake, reapplied after a reset
    pub requested_threshold: Option<u32>,
    last_fire: Option<Instant>,
    detector: ImpactDetector,
}

impl Client {
    pub fn new(
        id: PlayerId,
        addr: SocketAddr,
        hue: u16,
        requested_threshold: Option<u32>,
        detector: ImpactDetector,
    ) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            hue,
            requested_threshold,
            last_fire: None,
            detector,
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Checks if the client has exceeded the connection timeout
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }

    /// Records a shot if the cooldown since the previous one has passed
    pub fn try_fire(&mut self, cooldown: Duration, now: Instant) -> bool {
        let ready = self
            .last_fire
            .map_or(true, |last| now.saturating_duration_since(last) >= cooldown);
        if ready {
            self.last_fire = Some(now);
        }
        ready
    }

    pub fn detector(&self) -> &ImpactDetector {
        &self.detector
    }
}

/// Manages all connected clients
pub struct ClientManager {
    clients: HashMap<PlayerId, Client>,
    next_client_id: PlayerId,
    max_clients: usize,
    timeout: Duration,
    authority: Arc<SessionAuthority>,
    removal_grace: Duration,
}

impl ClientManager {
    /// Creates an empty client table
    ///
    /// Every client added later gets an `ImpactDetector` wired to `authority`.
    pub fn new(
        max_clients: usize,
        timeout: Duration,
        authority: Arc<SessionAuthority>,
        removal_grace: Duration,
    ) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout,
            authority,
            removal_grace,
        }
    }

    /// Attempts to add a new client connection
    ///
    /// Returns Some(client_id) if successful, None if the server is at capacity.
    pub fn add_client(
        &mut self,
        addr: SocketAddr,
        requested_threshold: Option<u32>,
    ) -> Option<PlayerId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        let hue = rand::thread_rng().gen_range(0..360);
        let detector =
            ImpactDetector::new(client_id, Arc::clone(&self.authority), self.removal_grace);
        let client = Client::new(client_id, addr, hue, requested_threshold, detector);

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, client);

        Some(client_id)
    }

    /// Removes a client, returning true if it was present
    pub fn remove_client(&mut self, client_id: &PlayerId) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    /// Finds a client ID by their network address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn get(&self, client_id: PlayerId) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    pub fn get_mut(&mut self, client_id: PlayerId) -> Option<&mut Client> {
        self.clients.get_mut(&client_id)
    }

    /// Marks the client as alive; returns false for unknown ids
    pub fn touch(&mut self, client_id: PlayerId) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.touch();
                true
            }
            None => false,
        }
    }

    /// Checks for and removes timed-out clients
    ///
    /// Returns the removed ids so the caller can unregister them from the
    /// session.
    pub fn check_timeouts(&mut self) -> Vec<PlayerId> {
        let timeout = self.timeout;
        let mut timed_out: Vec<PlayerId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();
        timed_out.sort_unstable();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }

        timed_out
    }

    /// Gets all client IDs and their network addresses
    pub fn get_client_addrs(&self) -> Vec<(PlayerId, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    /// Connected ids in ascending order (join order)
    pub fn ids(&self) -> Vec<PlayerId> {
        let mut ids: Vec<PlayerId> = self.clients.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
