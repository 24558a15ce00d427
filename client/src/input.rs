//! Text command input for the headless client

use shared::{normalize_direction, PlayerAction, ProjectileId, ProjectileKind};
use thiserror::Error;

/// Default chat line sent by the quick-message command
pub const QUICK_MESSAGE: &str = "Hey Mate!";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Fire {
        kind: ProjectileKind,
        direction: (f32, f32),
    },
    Hit {
        projectile_id: ProjectileId,
    },
    Act(PlayerAction),
    Reset,
    Roster,
    Quit,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("unknown command '{0}'")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}

/// Turns typed lines into commands, remembering the last facing direction
pub struct InputManager {
    facing: (f32, f32),
}

impl InputManager {
    pub fn new() -> Self {
        Self { facing: (0.0, 1.0) }
    }

    pub fn facing(&self) -> (f32, f32) {
        self.facing
    }

    /// Parses one input line
    ///
    /// Returns `Ok(None)` for blank lines.
    pub fn parse(&mut self, line: &str) -> Result<Option<Command>, InputError> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "" => return Ok(None),
            "fire" | "f" => self.fire(ProjectileKind::Kinematic, rest)?,
            "lob" | "l" => self.fire(ProjectileKind::Physics, rest)?,
            "hit" | "h" => {
                let projectile_id = rest
                    .parse()
                    .map_err(|_| InputError::Usage("hit <projectile id>"))?;
                Command::Hit { projectile_id }
            }
            "say" | "s" => {
                if rest.is_empty() {
                    return Err(InputError::Usage("say <text>"));
                }
                Command::Act(PlayerAction::Chat {
                    text: rest.to_string(),
                })
            }
            "r" => Command::Act(PlayerAction::Chat {
                text: QUICK_MESSAGE.to_string(),
            }),
            "reset" => Command::Reset,
            "roster" | "who" => Command::Roster,
            "quit" | "q" | "exit" => Command::Quit,
            other => return Err(InputError::Unknown(other.to_string())),
        };

        Ok(Some(command))
    }

    fn fire(&mut self, kind: ProjectileKind, args: &str) -> Result<Command, InputError> {
        const USAGE: &str = "fire|lob [x y]";

        if !args.is_empty() {
            let parts: Vec<&str> = args.split_whitespace().collect();
            let [x, y] = parts.as_slice() else {
                return Err(InputError::Usage(USAGE));
            };
            let x: f32 = x.parse().map_err(|_| InputError::Usage(USAGE))?;
            let y: f32 = y.parse().map_err(|_| InputError::Usage(USAGE))?;

            let direction = normalize_direction((x, y));
            if direction != (0.0, 0.0) {
                self.facing = direction;
            }
        }

        Ok(Command::Fire {
            kind,
            direction: self.facing,
        })
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}
