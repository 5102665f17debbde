//! Arena constants - all tunable defaults in one place
//!
//! `MatchConfig` starts from these values; a config file overrides them.

// Map scale
pub const DEFAULT_CELL_SIZE: f32 = 1.0;

// Time
pub const DEFAULT_TICK_BUDGET: u64 = 7200;
pub const DEFAULT_DECIDE_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_PREPARE_TIMEOUT_MS: u64 = 2000;

// Teams
pub const MIN_TEAMS_PER_MATCH: usize = 2;
pub const DEFAULT_UNITS_PER_TEAM: usize = 5;
pub const MAX_UNITS_PER_TEAM: usize = 10;

// Units (world units, world units per tick)
pub const DEFAULT_UNIT_RADIUS: f32 = 0.4;
pub const DEFAULT_UNIT_HEALTH: f32 = 100.0;
pub const DEFAULT_UNIT_SPEED: f32 = 0.25;
pub const DEFAULT_FIRE_COOLDOWN_TICKS: u32 = 5;

// Bullets
pub const DEFAULT_BULLET_RADIUS: f32 = 0.1;
pub const DEFAULT_BULLET_SPEED: f32 = 0.8;
pub const DEFAULT_BULLET_DAMAGE: f32 = 10.0;

// Waypoints closer than this count as reached
pub const WAYPOINT_EPSILON: f32 = 1e-3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decide_budget_shorter_than_startup_budget() {
        assert!(DEFAULT_DECIDE_TIMEOUT_MS < DEFAULT_PREPARE_TIMEOUT_MS);
    }

    #[test]
    fn test_bullets_outrun_units() {
        assert!(DEFAULT_BULLET_SPEED > DEFAULT_UNIT_SPEED);
    }

    #[test]
    fn test_default_units_within_limit() {
        assert!(DEFAULT_UNITS_PER_TEAM >= 1 && DEFAULT_UNITS_PER_TEAM <= MAX_UNITS_PER_TEAM);
    }
}
