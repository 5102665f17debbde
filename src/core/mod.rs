pub mod config;
pub mod error;
pub mod types;

pub use config::{BulletConfig, MatchConfig, SandboxConfig, UnitConfig};
pub use error::{ArenaError, Result};
pub use types::{BulletId, MatchId, Point, TeamId, Tick};
