//! Local mirror of the session, built only from authority broadcasts
//!
//! The view never counts hits or decides the session outcome itself. It
//! applies `HitRegistered`, `GameOver` and friends as they arrive and turns
//! them into lines for the player to read.

use log::{debug, info, warn};
use shared::{
    player_name, DisplayNumber, Echo, GameOverReport, HitReport, Packet, PlayerAction, PlayerId,
    PlayerInfo, ProjectileId, ProjectileKind, RelayedAction,
};
use std::collections::{BTreeMap, HashMap};

/// Identity the authority assigned to this participant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalPlayer {
    pub player_id: PlayerId,
    pub display_number: DisplayNumber,
    pub hit_threshold: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectileView {
    pub owner: PlayerId,
    pub kind: ProjectileKind,
    pub velocity: (f32, f32),
}

pub struct SessionView {
    local: Option<LocalPlayer>,
    players: BTreeMap<PlayerId, PlayerInfo>,
    projectiles: HashMap<ProjectileId, ProjectileView>,
    messages: Vec<String>,
    game_over: Option<GameOverReport>,
    last_action_sequence: u64,
}

impl SessionView {
    pub fn new() -> Self {
        Self {
            local: None,
            players: BTreeMap::new(),
            projectiles: HashMap::new(),
            messages: Vec::new(),
            game_over: None,
            last_action_sequence: 0,
        }
    }

    pub fn local(&self) -> Option<LocalPlayer> {
        self.local
    }

    pub fn is_connected(&self) -> bool {
        self.local.is_some()
    }

    pub fn player(&self, player_id: PlayerId) -> Option<&PlayerInfo> {
        self.players.get(&player_id)
    }

    /// Known players ordered by display number
    pub fn roster(&self) -> Vec<&PlayerInfo> {
        let mut roster: Vec<&PlayerInfo> = self.players.values().collect();
        roster.sort_by_key(|player| player.display_number);
        roster
    }

    pub fn projectile(&self, projectile_id: ProjectileId) -> Option<&ProjectileView> {
        self.projectiles.get(&projectile_id)
    }

    pub fn projectile_count(&self) -> usize {
        self.projectiles.len()
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn game_over(&self) -> Option<&GameOverReport> {
        self.game_over.as_ref()
    }

    /// Game-over banner, if the session has ended
    pub fn game_over_text(&self) -> Option<String> {
        self.game_over.as_ref().map(GameOverReport::message)
    }

    /// Applies one packet from the authority
    ///
    /// Returns the lines worth showing to the player, in order.
    pub fn apply(&mut self, packet: Packet) -> Vec<String> {
        let mut lines = Vec::new();

        match packet {
            Packet::Connected {
                player_id,
                display_number,
                hit_threshold,
            } => {
                info!(
                    "Connected as {} (id {}, {} hits to lose)",
                    player_name(display_number),
                    player_id,
                    hit_threshold
                );
                self.local = Some(LocalPlayer {
                    player_id,
                    display_number,
                    hit_threshold,
                });
                lines.push(format!("You are {}", player_name(display_number)));
            }

            Packet::PlayerJoined { player } => {
                if self.is_local(player.player_id) {
                    self.refresh_local(&player);
                } else {
                    lines.push(format!("{} joined", player.name()));
                }
                self.players.insert(player.player_id, player);
            }

            Packet::PlayerLeft {
                player_id,
                display_number,
            } => {
                self.players.remove(&player_id);
                lines.push(format!("{} left", player_name(display_number)));
            }

            Packet::ProjectileSpawned {
                projectile_id,
                owner,
                kind,
                velocity,
            } => {
                debug!("Projectile {} spawned by {}", projectile_id, owner);
                self.projectiles.insert(
                    projectile_id,
                    ProjectileView {
                        owner,
                        kind,
                        velocity,
                    },
                );
            }

            Packet::ProjectileRemoved { projectile_id } => {
                self.projectiles.remove(&projectile_id);
            }

            Packet::HitRegistered(report) => {
                lines.push(self.apply_hit(report));
            }

            Packet::GameOver(report) => {
                if self.game_over.is_none() {
                    self.projectiles.clear();
                    self.game_over = Some(report);
                    lines.push(report.message());
                }
            }

            Packet::ActionRelayed(relayed) => {
                if let Some(line) = self.apply_action(relayed) {
                    lines.push(line.clone());
                    self.messages.push(line);
                }
            }

            Packet::SessionReset { players } => {
                self.game_over = None;
                self.projectiles.clear();
                self.players.clear();
                for player in players {
                    if self.is_local(player.player_id) {
                        self.refresh_local(&player);
                    }
                    self.players.insert(player.player_id, player);
                }
                lines.push("Session reset".to_string());
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.local = None;
                lines.push(format!("Disconnected: {}", reason));
            }

            other => {
                warn!("Unexpected packet from server: {:?}", other);
            }
        }

        lines
    }

    fn is_local(&self, player_id: PlayerId) -> bool {
        self.local.map_or(false, |local| local.player_id == player_id)
    }

    fn refresh_local(&mut self, player: &PlayerInfo) {
        self.local = Some(LocalPlayer {
            player_id: player.player_id,
            display_number: player.display_number,
            hit_threshold: player.hit_threshold,
        });
    }

    fn apply_hit(&mut self, report: HitReport) -> String {
        let player = self
            .players
            .entry(report.player_id)
            .or_insert_with(|| PlayerInfo {
                player_id: report.player_id,
                display_number: report.display_number,
                hit_count: 0,
                hit_threshold: report.hit_threshold,
                hue: 0,
            });
        player.display_number = report.display_number;
        player.hit_count = report.hit_count;
        player.hit_threshold = report.hit_threshold;

        if self.is_local(report.player_id) {
            format!("You were hit ({}/{})", report.hit_count, report.hit_threshold)
        } else {
            format!(
                "{} was hit ({}/{})",
                player_name(report.display_number),
                report.hit_count,
                report.hit_threshold
            )
        }
    }

    fn apply_action(&mut self, relayed: RelayedAction) -> Option<String> {
        if relayed.sequence <= self.last_action_sequence {
            debug!("Dropping repeated action {}", relayed.sequence);
            return None;
        }
        self.last_action_sequence = relayed.sequence;

        let PlayerAction::Chat { text } = &relayed.action;
        let local_id = self.local.map(|local| local.player_id);

        let line = match local_id.map(|id| relayed.echo_for(id)) {
            Some(Echo::Own) => format!("You said: {}", text),
            _ => match self.players.get(&relayed.origin) {
                Some(player) => format!("{} said: {}", player.name(), text),
                None => format!("Player #{} said: {}", relayed.origin, text),
            },
        };

        Some(line)
    }
}

impl Default for SessionView {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(player_id: PlayerId, display_number: DisplayNumber) -> PlayerInfo {
        PlayerInfo {
            player_id,
            display_number,
            hit_count: 0,
            hit_threshold: 3,
            hue: 120,
        }
    }

    fn connected_view() -> SessionView {
        let mut view = SessionView::new();
        view.apply(Packet::Connected {
            player_id: 10,
            display_number: 2,
            hit_threshold: 3,
        });
        view.apply(Packet::PlayerJoined {
            player: info(4, 1),
        });
        view.apply(Packet::PlayerJoined {
            player: info(10, 2),
        });
        view
    }

    fn chat(origin: PlayerId, sequence: u64, text: &str) -> Packet {
        Packet::ActionRelayed(RelayedAction {
            origin,
            sequence,
            action: PlayerAction::Chat {
                text: text.to_string(),
            },
        })
    }

    #[test]
    fn test_connect_sets_local_player() {
        let view = connected_view();

        assert!(view.is_connected());
        assert_eq!(
            view.local(),
            Some(LocalPlayer {
                player_id: 10,
                display_number: 2,
                hit_threshold: 3
            })
        );
        let numbers: Vec<DisplayNumber> =
            view.roster().iter().map(|p| p.display_number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn test_hit_updates_count_and_wording() {
        let mut view = connected_view();

        let lines = view.apply(Packet::HitRegistered(HitReport {
            player_id: 4,
            display_number: 1,
            hit_count: 1,
            hit_threshold: 3,
        }));
        assert_eq!(lines, vec!["Player 1 was hit (1/3)".to_string()]);
        assert_eq!(view.player(4).unwrap().hit_count, 1);

        let lines = view.apply(Packet::HitRegistered(HitReport {
            player_id: 10,
            display_number: 2,
            hit_count: 2,
            hit_threshold: 3,
        }));
        assert_eq!(lines, vec!["You were hit (2/3)".to_string()]);
    }

    #[test]
    fn test_hit_for_unseen_player_adds_entry() {
        let mut view = connected_view();
        view.apply(Packet::HitRegistered(HitReport {
            player_id: 99,
            display_number: 3,
            hit_count: 1,
            hit_threshold: 5,
        }));

        let player = view.player(99).unwrap();
        assert_eq!(player.display_number, 3);
        assert_eq!(player.hit_threshold, 5);
    }

    #[test]
    fn test_own_echo_and_other_speaker() {
        let mut view = connected_view();

        assert_eq!(
            view.apply(chat(10, 1, "Hey Mate!")),
            vec!["You said: Hey Mate!".to_string()]
        );
        assert_eq!(
            view.apply(chat(4, 2, "hello")),
            vec!["Player 1 said: hello".to_string()]
        );
        assert_eq!(view.messages().len(), 2);
    }

    #[test]
    fn test_repeated_action_is_dropped() {
        let mut view = connected_view();

        assert_eq!(view.apply(chat(4, 1, "once")).len(), 1);
        assert!(view.apply(chat(4, 1, "once")).is_empty());
        assert_eq!(view.messages(), &["Player 1 said: once".to_string()]);
    }

    #[test]
    fn test_game_over_shown_once_and_clears_projectiles() {
        let mut view = connected_view();
        view.apply(Packet::ProjectileSpawned {
            projectile_id: 1,
            owner: 4,
            kind: ProjectileKind::Kinematic,
            velocity: (5.0, 0.0),
        });
        assert_eq!(view.projectile_count(), 1);

        let report = GameOverReport {
            losing_player: 10,
            display_number: 2,
            final_count: 3,
            hit_threshold: 3,
        };
        assert_eq!(
            view.apply(Packet::GameOver(report)),
            vec!["Player 2 reached 3 hits!".to_string()]
        );
        assert!(view.apply(Packet::GameOver(report)).is_empty());
        assert_eq!(view.projectile_count(), 0);
        assert_eq!(view.game_over_text().as_deref(), Some("Player 2 reached 3 hits!"));
    }

    #[test]
    fn test_session_reset_restores_roster() {
        let mut view = connected_view();
        view.apply(Packet::GameOver(GameOverReport {
            losing_player: 4,
            display_number: 1,
            final_count: 3,
            hit_threshold: 3,
        }));

        view.apply(Packet::SessionReset {
            players: vec![info(10, 1), info(4, 2)],
        });

        assert!(view.game_over().is_none());
        assert_eq!(view.local().unwrap().display_number, 1);
        assert_eq!(view.player(4).unwrap().display_number, 2);
    }

    #[test]
    fn test_player_left_and_disconnect() {
        let mut view = connected_view();

        assert_eq!(
            view.apply(Packet::PlayerLeft {
                player_id: 4,
                display_number: 1
            }),
            vec!["Player 1 left".to_string()]
        );
        assert!(view.player(4).is_none());

        view.apply(Packet::Disconnected {
            reason: "Server full".to_string(),
        });
        assert!(!view.is_connected());
    }
}
