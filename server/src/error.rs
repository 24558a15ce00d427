use shared::PlayerId;
use thiserror::Error;

/// Rejected `SessionConfig` values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("default hit threshold must be greater than zero")]
    ZeroHitThreshold,

    #[error("max clients must be greater than zero")]
    ZeroCapacity,

    #[error("tick rate must be greater than zero")]
    ZeroTickRate,

    #[error("max action length must be between 1 and {max} bytes, got {got}")]
    ActionLength { got: usize, max: usize },
}

/// Why the relay refused to broadcast a proposed action
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayRejection {
    #[error("player {0} is not registered with the session")]
    UnknownOrigin(PlayerId),

    #[error("action payload is empty")]
    EmptyPayload,

    #[error("action payload is {len} bytes, limit is {max}")]
    PayloadTooLarge { len: usize, max: usize },
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("packet codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}
