//! Server network layer handling UDP communications and session coordination

use crate::client_manager::ClientManager;
use crate::config::SessionConfig;
use crate::detector::Impact;
use crate::error::ServerError;
use crate::projectile::Arena;
use crate::relay::ActionRelay;
use crate::session::{Registration, SessionAuthority, SessionEvent};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{
    Packet, PlayerAction, PlayerId, PlayerInfo, ProjectileId, ProjectileKind, MAX_PACKET_SIZE,
    PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: PlayerId },
    Shutdown,
}

/// Messages sent from the main loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<PlayerId>,
    },
}

/// Stops a running `Server` from another task
#[derive(Clone)]
pub struct ServerHandle {
    server_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ServerHandle {
    pub fn shutdown(&self) {
        if self.server_tx.send(ServerMessage::Shutdown).is_err() {
            debug!("Server already stopped");
        }
    }
}

/// Authority process: owns the session, the arena and the relay
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    authority: Arc<SessionAuthority>,
    arena: Arena,
    relay: ActionRelay,
    config: SessionConfig,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
    session_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Server {
    pub async fn new(addr: &str, config: SessionConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();
        let (session_tx, session_rx) = mpsc::unbounded_channel();

        let authority = Arc::new(SessionAuthority::from_config(&config));
        authority.add_observer(Box::new(session_tx));

        let clients = ClientManager::new(
            config.max_clients,
            config.client_timeout,
            Arc::clone(&authority),
            config.removal_grace,
        );

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(clients)),
            relay: ActionRelay::new(Arc::clone(&authority), config.max_action_len),
            arena: Arena::new(config.projectile_lifetime, config.removal_grace),
            authority,
            config,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
            session_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            server_tx: self.server_tx.clone(),
        }
    }

    pub fn authority(&self) -> Arc<SessionAuthority> {
        Arc::clone(&self.authority)
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }

                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), ServerError> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet, exclude: Option<PlayerId>) {
        if let Err(e) = self
            .game_tx
            .send(GameMessage::BroadcastPacket { packet, exclude })
        {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Resolves the sender of a packet and refreshes its liveness
    async fn sender_id(&self, addr: SocketAddr) -> Option<PlayerId> {
        let mut clients = self.clients.write().await;
        let client_id = clients.find_client_by_addr(addr)?;
        clients.touch(client_id);
        Some(client_id)
    }

    /// Processes one incoming packet
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect {
                client_version,
                hit_threshold,
            } => self.handle_connect(addr, client_version, hit_threshold).await,

            Packet::Heartbeat => {
                if self.sender_id(addr).await.is_none() {
                    debug!("Heartbeat from unknown address {}", addr);
                }
            }

            Packet::Fire { kind, direction } => {
                if let Some(client_id) = self.sender_id(addr).await {
                    self.handle_fire(client_id, kind, direction).await;
                }
            }

            Packet::Impact { projectile_id } => {
                if let Some(client_id) = self.sender_id(addr).await {
                    self.handle_impact(client_id, projectile_id).await;
                }
            }

            Packet::ProposeAction { action } => {
                if let Some(client_id) = self.sender_id(addr).await {
                    self.handle_action(client_id, action);
                }
            }

            Packet::RequestReset => {
                if let Some(client_id) = self.sender_id(addr).await {
                    info!("Player {} requested a session reset", client_id);
                    self.reset_session().await;
                }
            }

            Packet::Disconnect => {
                let client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(client_id) = client_id {
                    self.on_leave(client_id).await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    async fn handle_connect(
        &mut self,
        addr: SocketAddr,
        client_version: u32,
        hit_threshold: Option<u32>,
    ) {
        info!(
            "Client connecting from {} (version: {})",
            addr, client_version
        );

        if client_version != PROTOCOL_VERSION {
            let reason = "Protocol version mismatch".to_string();
            self.send_packet(Packet::Disconnected { reason }, addr);
            return;
        }

        // A repeated handshake from a known address is a reconnect
        if let Some(existing_id) = self.sender_id(addr).await {
            {
                let mut clients = self.clients.write().await;
                if let Some(client) = clients.get_mut(existing_id) {
                    if hit_threshold.is_some() {
                        client.requested_threshold = hit_threshold;
                    }
                }
            }
            let display_number = self
                .authority
                .register_with_threshold(existing_id, hit_threshold);
            let response = Packet::Connected {
                player_id: existing_id,
                display_number,
                hit_threshold: self.authority.effective_threshold(existing_id),
            };
            self.send_packet(response, addr);
            return;
        }

        let client_id = {
            let mut clients = self.clients.write().await;
            clients.add_client(addr, hit_threshold)
        };

        match client_id {
            Some(client_id) => self.on_join(client_id, addr, hit_threshold).await,
            None => {
                let reason = "Server full".to_string();
                self.send_packet(Packet::Disconnected { reason }, addr);
            }
        }
    }

    /// Transport join: registers the player and announces it
    async fn on_join(
        &mut self,
        client_id: PlayerId,
        addr: SocketAddr,
        hit_threshold: Option<u32>,
    ) {
        let display_number = self
            .authority
            .register_with_threshold(client_id, hit_threshold);

        self.send_packet(
            Packet::Connected {
                player_id: client_id,
                display_number,
                hit_threshold: self.authority.effective_threshold(client_id),
            },
            addr,
        );

        // Existing roster for the newcomer, the newcomer for everyone
        let roster = self.roster_info().await;
        for player in roster.iter().filter(|p| p.player_id != client_id) {
            self.send_packet(
                Packet::PlayerJoined {
                    player: player.clone(),
                },
                addr,
            );
        }
        if let Some(player) = roster.into_iter().find(|p| p.player_id == client_id) {
            self.broadcast_packet(Packet::PlayerJoined { player }, None);
        }
    }

    /// Transport leave: drops the connection and recycles the display number
    async fn on_leave(&mut self, client_id: PlayerId) {
        {
            let mut clients = self.clients.write().await;
            clients.remove_client(&client_id);
        }

        if let Some(display_number) = self.authority.unregister(client_id) {
            self.broadcast_packet(
                Packet::PlayerLeft {
                    player_id: client_id,
                    display_number,
                },
                None,
            );
        }
    }

    async fn handle_fire(
        &mut self,
        client_id: PlayerId,
        kind: ProjectileKind,
        direction: (f32, f32),
    ) {
        if self.authority.is_game_over() {
            debug!("Ignoring fire from player {} after game over", client_id);
            return;
        }

        let cooldown = self.config.fire_cooldown;
        let ready = {
            let mut clients = self.clients.write().await;
            clients
                .get_mut(client_id)
                .map_or(false, |client| client.try_fire(cooldown, Instant::now()))
        };
        if !ready {
            debug!("Player {} fired during cooldown", client_id);
            return;
        }

        let (projectile, velocity) = self.arena.spawn(client_id, kind, direction);
        self.broadcast_packet(
            Packet::ProjectileSpawned {
                projectile_id: projectile.id(),
                owner: client_id,
                kind,
                velocity,
            },
            None,
        );
    }

    /// Routes a reported collision to the struck player's detector
    async fn handle_impact(&mut self, client_id: PlayerId, projectile_id: ProjectileId) {
        let Some(projectile) = self.arena.get(projectile_id) else {
            debug!(
                "Impact from player {} on unknown projectile {}",
                client_id, projectile_id
            );
            return;
        };

        let detector = {
            let clients = self.clients.read().await;
            clients.get(client_id).map(|client| client.detector().clone())
        };

        match detector.map(|detector| detector.on_impact(&projectile)) {
            Some(Impact::Counted(outcome)) => debug!(
                "Projectile {} hit player {}: {:?}",
                projectile_id, client_id, outcome
            ),
            Some(Impact::AlreadyConsumed) => {}
            None => debug!("No detector for player {}", client_id),
        }
    }

    fn handle_action(&self, client_id: PlayerId, action: PlayerAction) {
        match self.relay.relay(client_id, action) {
            Ok(relayed) => self.broadcast_packet(Packet::ActionRelayed(relayed), None),
            Err(rejection) => warn!("Dropped action from player {}: {}", client_id, rejection),
        }
    }

    /// Restarts the session in place for everyone still connected
    ///
    /// `SessionReset` itself goes out from the `Reset` event, behind any
    /// hit or game over the authority reported before the reset.
    async fn reset_session(&mut self) {
        self.pump_session_events().await;

        self.authority.reset();
        self.arena.clear();

        let connected: Vec<(PlayerId, Option<u32>)> = {
            let clients = self.clients.read().await;
            clients
                .ids()
                .into_iter()
                .filter_map(|id| clients.get(id).map(|c| (id, c.requested_threshold)))
                .collect()
        };
        for (client_id, hit_threshold) in connected {
            self.authority.register_with_threshold(client_id, hit_threshold);
        }

        self.pump_session_events().await;
    }

    /// Broadcasts every pending authority event in the order it was produced
    async fn pump_session_events(&mut self) {
        while let Ok(event) = self.session_rx.try_recv() {
            self.handle_session_event(event).await;
        }
    }

    /// Turns authority notifications into broadcasts
    async fn handle_session_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::Hit(report) => {
                self.broadcast_packet(Packet::HitRegistered(report), None);
            }
            SessionEvent::GameOver(report) => {
                let stopped = self.arena.consume_all();
                debug!("Game over cleanup consumed {} projectiles", stopped);
                self.broadcast_packet(Packet::GameOver(report), None);
            }
            SessionEvent::Reset => {
                let players = self.roster_info().await;
                info!("Session reset with {} players", players.len());
                self.broadcast_packet(Packet::SessionReset { players }, None);
            }
        }
    }

    /// Removes projectiles whose grace delay or lifetime has run out
    fn sweep_projectiles(&mut self) {
        for projectile_id in self.arena.sweep(Instant::now()) {
            self.broadcast_packet(Packet::ProjectileRemoved { projectile_id }, None);
        }
    }

    async fn roster_info(&self) -> Vec<PlayerInfo> {
        let roster = self.authority.roster();
        let clients = self.clients.read().await;
        roster
            .iter()
            .map(|registration| {
                let hue = clients.get(registration.player_id).map_or(0, |c| c.hue);
                self.player_info(registration, hue)
            })
            .collect()
    }

    fn player_info(&self, registration: &Registration, hue: u16) -> PlayerInfo {
        PlayerInfo {
            player_id: registration.player_id,
            display_number: registration.display_number,
            hit_count: registration.hit_count,
            hit_threshold: registration
                .effective_threshold(self.authority.default_hit_threshold()),
            hue,
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), ServerError> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.config.tick_duration);
        let mut ticks: u64 = 0;

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                            self.pump_session_events().await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Client {} timed out", client_id);
                            self.on_leave(client_id).await;
                            self.pump_session_events().await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    self.sweep_projectiles();
                    ticks += 1;

                    if ticks % 300 == 0 {
                        debug!(
                            "Tick {}: {} players, {} projectiles, {:?}",
                            ticks,
                            self.authority.len(),
                            self.arena.len(),
                            self.authority.state()
                        );
                    }
                },
            }
        }

        Ok(())
    }
}
