//! Battle system - tick-driven arena matches between scripted teams
//!
//! Each tick runs the same pipeline:
//! - snapshot the world and hand it to every ready agent
//! - validate the orders they staged and apply them to units
//! - move units and bullets, then resolve hits and the match result

pub mod actions;
pub mod bullet;
pub mod constants;
pub mod driver;
pub mod execution;
pub mod grid;
pub mod pathfinding;
pub mod record;
pub mod setup;
pub mod snapshot;
pub mod units;

// Re-exports for convenient access
pub use actions::{ActionBatch, ActionKind, ActionParam, DeclaredAction, UnitAction};
pub use bullet::Bullet;
pub use constants::*;
pub use driver::{Callbacks, FrameRecorder, MatchDriver, MatchObserver, Replay, TickFrame};
pub use execution::{check_finished, EnginePhase, MatchResult, MatchState, TickEngine};
pub use grid::{Cell, CollisionGrid, MapDocument};
pub use pathfinding::{find_path, search_path, PathSearch};
pub use record::{MatchRecord, TeamRecord};
pub use setup::{MatchRequest, MatchSetup};
pub use snapshot::{
    BulletFrame, BulletView, GameFrame, GameState, TeamFrame, TeamView, UnitFrame, UnitView,
};
pub use units::{Shot, Team, Unit};
