use crate::game::SessionView;
use crate::input::{Command, InputManager};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep, timeout, Instant};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("no answer from server after {attempts} attempts")]
    TimedOut { attempts: u32 },

    #[error("server refused connection: {reason}")]
    Rejected { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Codec(#[from] bincode::Error),
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid server address: {0}")]
    Address(#[from] std::net::AddrParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Connect(#[from] ConnectError),
}

/// How persistently to knock before giving up on the server
#[derive(Debug, Clone, Copy)]
pub struct ConnectPolicy {
    pub attempts: u32,
    pub attempt_timeout: Duration,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            attempt_timeout: Duration::from_millis(500),
        }
    }
}

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    hit_threshold: Option<u32>,
    fake_ping_ms: u64,

    view: SessionView,
    input_manager: InputManager,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        fake_ping_ms: u64,
        hit_threshold: Option<u32>,
    ) -> Result<Self, ClientError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            hit_threshold,
            fake_ping_ms,
            view: SessionView::new(),
            input_manager: InputManager::new(),
        })
    }

    pub fn view(&self) -> &SessionView {
        &self.view
    }

    /// Performs the handshake, resending `Connect` until answered
    ///
    /// Packets other than the handshake reply are applied to the view so
    /// nothing the server sends in between is lost.
    pub async fn connect(&mut self, policy: ConnectPolicy) -> Result<(), ConnectError> {
        let attempts = policy.attempts.max(1);
        let mut buffer = [0u8; MAX_PACKET_SIZE];

        for attempt in 1..=attempts {
            info!(
                "Connecting to {} (attempt {}/{})",
                self.server_addr, attempt, attempts
            );

            let packet = Packet::Connect {
                client_version: PROTOCOL_VERSION,
                hit_threshold: self.hit_threshold,
            };
            self.send_packet(&packet).await?;

            let deadline = Instant::now() + policy.attempt_timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                let received = match timeout(remaining, self.socket.recv_from(&mut buffer)).await {
                    Ok(result) => result?,
                    Err(_) => break,
                };

                let (len, from) = received;
                if from != self.server_addr {
                    continue;
                }

                match deserialize::<Packet>(&buffer[..len]) {
                    Ok(Packet::Disconnected { reason }) => {
                        return Err(ConnectError::Rejected { reason });
                    }
                    Ok(packet) => {
                        let handshake_done = matches!(packet, Packet::Connected { .. });
                        let lines = self.view.apply(packet);
                        self.show(lines);
                        if handshake_done {
                            return Ok(());
                        }
                    }
                    Err(e) => warn!("Ignoring malformed packet: {}", e),
                }
            }
        }

        Err(ConnectError::TimedOut { attempts })
    }

    fn show(&self, lines: Vec<String>) {
        for line in lines {
            println!("{}", line);
        }
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), ConnectError> {
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }

        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    /// Turns a command into a packet, or handles it locally
    ///
    /// Returns false once the player asked to quit.
    async fn handle_command(&mut self, command: Command) -> Result<bool, ConnectError> {
        let packet = match command {
            Command::Fire { kind, direction } => Packet::Fire { kind, direction },
            Command::Hit { projectile_id } => Packet::Impact { projectile_id },
            Command::Act(action) => Packet::ProposeAction { action },
            Command::Reset => Packet::RequestReset,
            Command::Roster => {
                for player in self.view.roster() {
                    println!(
                        "{}: {}/{} hits",
                        player.name(),
                        player.hit_count,
                        player.hit_threshold
                    );
                }
                if let Some(text) = self.view.game_over_text() {
                    println!("{}", text);
                }
                return Ok(true);
            }
            Command::Quit => return Ok(false),
        };

        self.send_packet(&packet).await?;
        Ok(true)
    }

    /// Connects, then pumps server packets, typed commands and heartbeats
    pub async fn run(&mut self, policy: ConnectPolicy) -> Result<(), ClientError> {
        self.connect(policy).await?;

        let mut heartbeat = interval(HEARTBEAT_INTERVAL);
        let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();
        let mut buffer = [0u8; MAX_PACKET_SIZE];

        while self.view.is_connected() {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, from)) if from == self.server_addr => {
                            if self.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
                            }

                            match deserialize::<Packet>(&buffer[..len]) {
                                Ok(packet) => {
                                    let lines = self.view.apply(packet);
                                    self.show(lines);
                                }
                                Err(e) => warn!("Ignoring malformed packet: {}", e),
                            }
                        }
                        Ok((_, from)) => debug!("Ignoring packet from {}", from),
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                line = stdin_lines.next_line() => {
                    let Some(line) = line? else {
                        break;
                    };

                    match self.input_manager.parse(&line) {
                        Ok(Some(command)) => {
                            if !self.handle_command(command).await? {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => println!("{}", e),
                    }
                },

                _ = heartbeat.tick() => {
                    if let Err(e) = self.send_packet(&Packet::Heartbeat).await {
                        error!("Error sending heartbeat: {}", e);
                    }
                },
            }
        }

        if self.view.is_connected() {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        Ok(())
    }
}
