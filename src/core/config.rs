//! Match configuration with documented defaults
//!
//! Everything that used to be ambient process state (tick budget, agent
//! time budgets, combat numbers) is collected here and handed to the engine
//! at construction.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::battle::constants::{
    DEFAULT_BULLET_DAMAGE, DEFAULT_BULLET_RADIUS, DEFAULT_BULLET_SPEED, DEFAULT_DECIDE_TIMEOUT_MS,
    DEFAULT_FIRE_COOLDOWN_TICKS, DEFAULT_PREPARE_TIMEOUT_MS, DEFAULT_TICK_BUDGET,
    DEFAULT_UNITS_PER_TEAM, DEFAULT_UNIT_HEALTH, DEFAULT_UNIT_RADIUS, DEFAULT_UNIT_SPEED,
    MAX_UNITS_PER_TEAM,
};
use crate::core::error::{ArenaError, Result};

/// Per-unit combat and movement numbers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitConfig {
    /// Collision radius in world units
    pub radius: f32,
    /// Starting (and maximum) health
    pub health: f32,
    /// Distance covered per tick while following waypoints
    pub speed: f32,
    /// Ticks a unit must wait between two shots
    ///
    /// Zero lets a unit fire every tick.
    pub fire_cooldown_ticks: u32,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            radius: DEFAULT_UNIT_RADIUS,
            health: DEFAULT_UNIT_HEALTH,
            speed: DEFAULT_UNIT_SPEED,
            fire_cooldown_ticks: DEFAULT_FIRE_COOLDOWN_TICKS,
        }
    }
}

/// Numbers stamped on every bullet a unit fires
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BulletConfig {
    pub radius: f32,
    pub speed: f32,
    pub damage: f32,
}

impl Default for BulletConfig {
    fn default() -> Self {
        Self {
            radius: DEFAULT_BULLET_RADIUS,
            speed: DEFAULT_BULLET_SPEED,
            damage: DEFAULT_BULLET_DAMAGE,
        }
    }
}

/// Limits applied to every agent script
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Wall-clock budget for one `tick` call (milliseconds)
    pub decide_timeout_ms: u64,

    /// Wall-clock budget for loading the script and running `init`
    ///
    /// Longer than the per-tick budget: agents get time to study the map
    /// before the first tick.
    pub prepare_timeout_ms: u64,

    /// Hard cap on interpreter operations per call (0 = unlimited)
    pub max_operations: u64,

    /// Maximum script function call depth
    pub max_call_levels: usize,

    /// Maximum length of any script string
    pub max_string_size: usize,

    /// Maximum length of any script array or object map
    pub max_collection_size: usize,

    /// Maximum number of characters retained in an agent log
    pub max_log_chars: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            decide_timeout_ms: DEFAULT_DECIDE_TIMEOUT_MS,
            prepare_timeout_ms: DEFAULT_PREPARE_TIMEOUT_MS,
            max_operations: 0,
            max_call_levels: 64,
            max_string_size: 64 * 1024,
            max_collection_size: 16 * 1024,
            max_log_chars: 256 * 1024,
        }
    }
}

impl SandboxConfig {
    pub fn decide_timeout(&self) -> Duration {
        Duration::from_millis(self.decide_timeout_ms)
    }

    pub fn prepare_timeout(&self) -> Duration {
        Duration::from_millis(self.prepare_timeout_ms)
    }
}

/// Configuration for a single match
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    // === TERMINATION ===
    /// Number of ticks after which a match with several survivors is a draw
    pub tick_budget: u64,

    // === TEAMS ===
    /// Units spawned for every team
    pub units_per_team: usize,

    /// Seed for unit placement
    pub seed: u64,

    // === ENTITIES ===
    pub unit: UnitConfig,
    pub bullet: BulletConfig,

    // === AGENTS ===
    pub sandbox: SandboxConfig,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            tick_budget: DEFAULT_TICK_BUDGET,
            units_per_team: DEFAULT_UNITS_PER_TEAM,
            seed: 0,
            unit: UnitConfig::default(),
            bullet: BulletConfig::default(),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl MatchConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from TOML text; missing keys keep their defaults
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: MatchConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.tick_budget == 0 {
            return Err(ArenaError::InvalidConfig(
                "tick_budget must be at least 1".into(),
            ));
        }

        if self.units_per_team == 0 || self.units_per_team > MAX_UNITS_PER_TEAM {
            return Err(ArenaError::InvalidConfig(format!(
                "units_per_team ({}) must be within 1..={}",
                self.units_per_team, MAX_UNITS_PER_TEAM
            )));
        }

        let numbers = [
            ("unit.radius", self.unit.radius),
            ("unit.health", self.unit.health),
            ("unit.speed", self.unit.speed),
            ("bullet.radius", self.bullet.radius),
            ("bullet.speed", self.bullet.speed),
            ("bullet.damage", self.bullet.damage),
        ];
        if let Some((name, value)) = numbers.iter().find(|(_, value)| !value.is_finite()) {
            return Err(ArenaError::InvalidConfig(format!(
                "{} must be a finite number, got {}",
                name, value
            )));
        }

        if self.unit.radius <= 0.0 || self.bullet.radius <= 0.0 {
            return Err(ArenaError::InvalidConfig("radii must be positive".into()));
        }

        if self.unit.health <= 0.0 {
            return Err(ArenaError::InvalidConfig(
                "unit health must be positive".into(),
            ));
        }

        if self.bullet.speed <= 0.0 {
            return Err(ArenaError::InvalidConfig(
                "bullet speed must be positive".into(),
            ));
        }

        if self.unit.speed < 0.0 || self.bullet.damage < 0.0 {
            return Err(ArenaError::InvalidConfig(
                "unit speed and bullet damage cannot be negative".into(),
            ));
        }

        // The per-tick budget must stay below the startup budget
        if self.sandbox.decide_timeout_ms == 0
            || self.sandbox.decide_timeout_ms > self.sandbox.prepare_timeout_ms
        {
            return Err(ArenaError::InvalidConfig(format!(
                "decide_timeout_ms ({}) must be positive and <= prepare_timeout_ms ({})",
                self.sandbox.decide_timeout_ms, self.sandbox.prepare_timeout_ms
            )));
        }

        Ok(())
    }
}
