use thiserror::Error;

use crate::core::types::TeamId;

#[derive(Error, Debug)]
pub enum ArenaError {
    /// `decide` was scheduled for a team whose agent never became ready.
    /// This is an engine bug, not an agent fault.
    #[error("Agent for team {0:?} is not prepared")]
    AgentNotReady(TeamId),

    #[error("Team not found: {0:?}")]
    TeamNotFound(TeamId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid match request: {0}")]
    InvalidRequest(String),

    #[error("Map error: {0}")]
    MapError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ArenaError>;
