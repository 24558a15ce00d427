//! Integration tests for the session server over real UDP sockets
//!
//! Each test starts a server on an ephemeral port and drives it with plain
//! sockets speaking the shared packet protocol.

use bincode::{deserialize, serialize};
use client::network::{Client, ConnectError, ConnectPolicy};
use server::config::SessionConfig;
use server::network::Server;
use shared::{
    Packet, PlayerAction, PlayerId, ProjectileId, ProjectileKind, MAX_PACKET_SIZE,
    PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout, Instant};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

fn test_config() -> SessionConfig {
    SessionConfig {
        fire_cooldown: Duration::ZERO,
        ..SessionConfig::default()
    }
}

async fn start_server(config: SessionConfig) -> SocketAddr {
    let mut server = Server::new("127.0.0.1:0", config).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

struct TestPlayer {
    socket: UdpSocket,
    server: SocketAddr,
    player_id: PlayerId,
    display_number: u32,
}

impl TestPlayer {
    async fn join(server: SocketAddr) -> Self {
        Self::join_with_threshold(server, None).await
    }

    async fn join_with_threshold(server: SocketAddr, hit_threshold: Option<u32>) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut player = TestPlayer {
            socket,
            server,
            player_id: 0,
            display_number: 0,
        };

        player
            .send(Packet::Connect {
                client_version: PROTOCOL_VERSION,
                hit_threshold,
            })
            .await;

        match player
            .recv_until(|p| matches!(p, Packet::Connected { .. }))
            .await
        {
            Packet::Connected {
                player_id,
                display_number,
                ..
            } => {
                player.player_id = player_id;
                player.display_number = display_number;
            }
            other => panic!("expected Connected, got {:?}", other),
        }

        player
    }

    async fn send(&self, packet: Packet) {
        let data = serialize(&packet).unwrap();
        self.socket.send_to(&data, self.server).await.unwrap();
    }

    async fn recv(&self) -> Packet {
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let (len, _) = timeout(RECV_TIMEOUT, self.socket.recv_from(&mut buffer))
            .await
            .expect("timed out waiting for packet")
            .unwrap();
        deserialize(&buffer[..len]).unwrap()
    }

    async fn recv_until<F>(&self, predicate: F) -> Packet
    where
        F: Fn(&Packet) -> bool,
    {
        loop {
            let packet = self.recv().await;
            if predicate(&packet) {
                return packet;
            }
        }
    }

    /// Collects everything that arrives within `window`
    async fn drain(&self, window: Duration) -> Vec<Packet> {
        let deadline = Instant::now() + window;
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let mut packets = Vec::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, self.socket.recv_from(&mut buffer)).await {
                Ok(Ok((len, _))) => packets.push(deserialize(&buffer[..len]).unwrap()),
                _ => return packets,
            }
        }
    }

    async fn fire(&self) -> ProjectileId {
        self.send(Packet::Fire {
            kind: ProjectileKind::Kinematic,
            direction: (1.0, 0.0),
        })
        .await;

        let owner = self.player_id;
        match self
            .recv_until(|p| {
                matches!(p, Packet::ProjectileSpawned { owner: o, .. } if *o == owner)
            })
            .await
        {
            Packet::ProjectileSpawned { projectile_id, .. } => projectile_id,
            other => panic!("expected ProjectileSpawned, got {:?}", other),
        }
    }
}

fn hits_in(packets: &[Packet]) -> Vec<(PlayerId, u32)> {
    packets
        .iter()
        .filter_map(|p| match p {
            Packet::HitRegistered(report) => Some((report.player_id, report.hit_count)),
            _ => None,
        })
        .collect()
}

fn game_overs_in(packets: &[Packet]) -> usize {
    packets
        .iter()
        .filter(|p| matches!(p, Packet::GameOver(_)))
        .count()
}

/// SESSION MEMBERSHIP TESTS
mod membership_tests {
    use super::*;

    #[tokio::test]
    async fn players_get_sequential_display_numbers() {
        let server = start_server(test_config()).await;

        let first = TestPlayer::join(server).await;
        let second = TestPlayer::join(server).await;
        let third = TestPlayer::join(server).await;

        assert_eq!(first.display_number, 1);
        assert_eq!(second.display_number, 2);
        assert_eq!(third.display_number, 3);
    }

    #[tokio::test]
    async fn newcomer_learns_roster_and_others_see_join() {
        let server = start_server(test_config()).await;

        let first = TestPlayer::join(server).await;
        let second = TestPlayer::join(server).await;

        let second_id = second.player_id;
        let joined = first
            .recv_until(|p| {
                matches!(p, Packet::PlayerJoined { player } if player.player_id == second_id)
            })
            .await;
        match joined {
            Packet::PlayerJoined { player } => {
                assert_eq!(player.display_number, 2);
                assert!(player.hue < 360);
            }
            other => panic!("unexpected {:?}", other),
        }

        let first_id = first.player_id;
        let existing = second
            .recv_until(|p| {
                matches!(p, Packet::PlayerJoined { player } if player.player_id == first_id)
            })
            .await;
        match existing {
            Packet::PlayerJoined { player } => assert_eq!(player.display_number, 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn departed_display_number_is_reused() {
        let server = start_server(test_config()).await;

        let first = TestPlayer::join(server).await;
        let second = TestPlayer::join(server).await;

        first.send(Packet::Disconnect).await;
        let left = second
            .recv_until(|p| matches!(p, Packet::PlayerLeft { .. }))
            .await;
        assert!(matches!(
            left,
            Packet::PlayerLeft {
                display_number: 1,
                ..
            }
        ));

        let third = TestPlayer::join(server).await;
        assert_eq!(third.display_number, 1);
        assert_ne!(third.player_id, first.player_id);
    }

    #[tokio::test]
    async fn full_server_rejects_newcomer() {
        let server = start_server(SessionConfig {
            max_clients: 1,
            ..test_config()
        })
        .await;

        let _first = TestPlayer::join(server).await;

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let data = serialize(&Packet::Connect {
            client_version: PROTOCOL_VERSION,
            hit_threshold: None,
        })
        .unwrap();
        socket.send_to(&data, server).await.unwrap();

        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let (len, _) = timeout(RECV_TIMEOUT, socket.recv_from(&mut buffer))
            .await
            .unwrap()
            .unwrap();
        match deserialize::<Packet>(&buffer[..len]).unwrap() {
            Packet::Disconnected { reason } => assert_eq!(reason, "Server full"),
            other => panic!("unexpected {:?}", other),
        }
    }
}

/// HIT COUNTING TESTS
mod hit_tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_impacts_count_once() {
        let server = start_server(test_config()).await;

        let target = TestPlayer::join(server).await;
        let shooter = TestPlayer::join(server).await;
        let bystander = TestPlayer::join(server).await;

        let projectile_id = shooter.fire().await;

        // Several reports of the same collision from different participants
        target.send(Packet::Impact { projectile_id }).await;
        target.send(Packet::Impact { projectile_id }).await;
        bystander.send(Packet::Impact { projectile_id }).await;

        let hit = bystander
            .recv_until(|p| matches!(p, Packet::HitRegistered(_)))
            .await;
        match hit {
            Packet::HitRegistered(report) => {
                assert_eq!(report.player_id, target.player_id);
                assert_eq!(report.hit_count, 1);
            }
            other => panic!("unexpected {:?}", other),
        }

        let rest = bystander.drain(Duration::from_millis(300)).await;
        assert!(hits_in(&rest).is_empty());
        let removed = rest.iter().any(|p| {
            matches!(p, Packet::ProjectileRemoved { projectile_id: id } if *id == projectile_id)
        });
        assert!(removed);
    }

    #[tokio::test]
    async fn game_over_is_broadcast_once() {
        let server = start_server(SessionConfig {
            default_hit_threshold: 2,
            ..test_config()
        })
        .await;

        let target = TestPlayer::join(server).await;
        let shooter = TestPlayer::join(server).await;

        let mut projectiles = Vec::new();
        for _ in 0..2 {
            let projectile_id = shooter.fire().await;
            target.send(Packet::Impact { projectile_id }).await;
            projectiles.push(projectile_id);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        // Neither a late report nor a new shot changes anything after the end
        target
            .send(Packet::Impact {
                projectile_id: projectiles[0],
            })
            .await;
        shooter
            .send(Packet::Fire {
                kind: ProjectileKind::Physics,
                direction: (0.0, 1.0),
            })
            .await;

        let packets = target.drain(Duration::from_millis(400)).await;
        assert_eq!(
            hits_in(&packets),
            vec![(target.player_id, 1), (target.player_id, 2)]
        );
        assert_eq!(game_overs_in(&packets), 1);

        let spawned = packets
            .iter()
            .filter(|p| matches!(p, Packet::ProjectileSpawned { .. }))
            .count();
        assert_eq!(spawned, 2);

        let report = packets
            .iter()
            .find_map(|p| match p {
                Packet::GameOver(report) => Some(*report),
                _ => None,
            })
            .unwrap();
        assert_eq!(report.losing_player, target.player_id);
        assert_eq!(report.final_count, 2);
        assert_eq!(report.message(), "Player 1 reached 2 hits!");
    }

    #[tokio::test]
    async fn personal_threshold_is_honoured() {
        let server = start_server(test_config()).await;

        let target = TestPlayer::join_with_threshold(server, Some(1)).await;
        let shooter = TestPlayer::join(server).await;

        let projectile_id = shooter.fire().await;
        target.send(Packet::Impact { projectile_id }).await;

        let over = shooter
            .recv_until(|p| matches!(p, Packet::GameOver(_)))
            .await;
        match over {
            Packet::GameOver(report) => {
                assert_eq!(report.losing_player, target.player_id);
                assert_eq!(report.hit_threshold, 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn reset_starts_a_fresh_session() {
        let server = start_server(SessionConfig {
            default_hit_threshold: 1,
            ..test_config()
        })
        .await;

        let target = TestPlayer::join(server).await;
        let shooter = TestPlayer::join(server).await;

        let projectile_id = shooter.fire().await;
        target.send(Packet::Impact { projectile_id }).await;
        shooter
            .recv_until(|p| matches!(p, Packet::GameOver(_)))
            .await;

        shooter.send(Packet::RequestReset).await;
        let reset = target
            .recv_until(|p| matches!(p, Packet::SessionReset { .. }))
            .await;
        match reset {
            Packet::SessionReset { players } => {
                let summary: Vec<(PlayerId, u32, u32)> = players
                    .iter()
                    .map(|p| (p.player_id, p.display_number, p.hit_count))
                    .collect();
                assert_eq!(
                    summary,
                    vec![(target.player_id, 1, 0), (shooter.player_id, 2, 0)]
                );
            }
            other => panic!("unexpected {:?}", other),
        }

        // Firing works again after the reset
        let projectile_id = shooter.fire().await;
        target.send(Packet::Impact { projectile_id }).await;
        let over = shooter
            .recv_until(|p| matches!(p, Packet::GameOver(_)))
            .await;
        match over {
            Packet::GameOver(report) => assert_eq!(report.losing_player, target.player_id),
            other => panic!("unexpected {:?}", other),
        }
    }
}

/// ACTION RELAY TESTS
mod relay_tests {
    use super::*;

    fn chat(text: &str) -> Packet {
        Packet::ProposeAction {
            action: PlayerAction::Chat {
                text: text.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn relayed_action_keeps_origin() {
        let server = start_server(test_config()).await;

        let speaker = TestPlayer::join(server).await;
        let listener = TestPlayer::join(server).await;

        speaker.send(chat("Hey Mate!")).await;

        for player in [&speaker, &listener] {
            let relayed = player
                .recv_until(|p| matches!(p, Packet::ActionRelayed(_)))
                .await;
            match relayed {
                Packet::ActionRelayed(relayed) => {
                    assert_eq!(relayed.origin, speaker.player_id);
                    assert_eq!(
                        relayed.action,
                        PlayerAction::Chat {
                            text: "Hey Mate!".to_string()
                        }
                    );
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn empty_action_is_not_relayed() {
        let server = start_server(test_config()).await;

        let speaker = TestPlayer::join(server).await;
        speaker.send(chat("   ")).await;

        let packets = speaker.drain(Duration::from_millis(200)).await;
        assert!(!packets
            .iter()
            .any(|p| matches!(p, Packet::ActionRelayed(_))));
    }
}

/// HEADLESS CLIENT TESTS
mod client_tests {
    use super::*;

    #[tokio::test]
    async fn client_handshake_against_server() {
        let server = start_server(test_config()).await;
        let _first = TestPlayer::join(server).await;

        let mut client = Client::new(&server.to_string(), 0, Some(4)).await.unwrap();
        client.connect(ConnectPolicy::default()).await.unwrap();

        let local = client.view().local().unwrap();
        assert_eq!(local.display_number, 2);
        assert_eq!(local.hit_threshold, 4);
    }

    #[tokio::test]
    async fn client_gives_up_without_server() {
        // Bound but never answered
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = silent.local_addr().unwrap();

        let mut client = Client::new(&addr.to_string(), 0, None).await.unwrap();
        let result = client
            .connect(ConnectPolicy {
                attempts: 2,
                attempt_timeout: Duration::from_millis(50),
            })
            .await;

        assert!(matches!(result, Err(ConnectError::TimedOut { attempts: 2 })));
    }
}
