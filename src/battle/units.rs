//! Units and teams
//!
//! Units are never removed from their team: agents address them by index,
//! so a dead unit keeps its slot with `alive = false`.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::agent::AgentBinding;
use crate::battle::actions::UnitAction;
use crate::battle::constants::WAYPOINT_EPSILON;
use crate::battle::grid::CollisionGrid;
use crate::core::config::{SandboxConfig, UnitConfig};
use crate::core::types::{heading_to, TeamId};

/// Display colors handed out in registration order
const TEAM_COLORS: [&str; 8] = [
    "#e6194b", "#3cb44b", "#4363d8", "#f58231", "#911eb4", "#42d4f4", "#f032e6", "#bfef45",
];

/// A bullet the unit wants to fire this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shot {
    pub origin: Vec2,
    pub angle: f32,
}

/// Single combatant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    /// Index within the owning team
    pub index: usize,
    pub team_id: TeamId,
    pub position: Vec2,
    pub radius: f32,
    pub health: f32,
    pub max_health: f32,
    pub alive: bool,
    pub speed: f32,

    // Orders
    pub move_to: VecDeque<Vec2>,
    pub attack_to: Option<Vec2>,

    // Weapon
    pub fire_cooldown_ticks: u32,
    pub cooldown: u32,
}

impl Unit {
    pub fn new(index: usize, team_id: TeamId, position: Vec2, config: &UnitConfig) -> Self {
        Self {
            index,
            team_id,
            position,
            radius: config.radius,
            health: config.health,
            max_health: config.health,
            alive: true,
            speed: config.speed,
            move_to: VecDeque::new(),
            attack_to: None,
            fire_cooldown_ticks: config.fire_cooldown_ticks,
            cooldown: 0,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Can the weapon fire this tick?
    pub fn weapon_ready(&self) -> bool {
        self.cooldown == 0
    }

    /// Forget last tick's attack target; waypoints carry over
    pub fn begin_tick(&mut self) {
        self.attack_to = None;
    }

    /// Apply one parsed action. Dead units ignore everything.
    ///
    /// Returns the shot to spawn when an attack fires.
    pub fn apply_action(&mut self, action: UnitAction) -> Option<Shot> {
        if !self.alive {
            return None;
        }

        match action {
            UnitAction::MoveTo { target } => {
                self.move_to.clear();
                self.move_to.push_back(target);
                None
            }
            UnitAction::MoveAlong { waypoints } => {
                self.move_to = waypoints.into();
                None
            }
            UnitAction::AttackTo { target } => {
                self.attack_to = Some(target);
                if !self.weapon_ready() {
                    return None;
                }
                self.cooldown = self.fire_cooldown_ticks;
                Some(Shot {
                    origin: self.position,
                    angle: heading_to(self.position, target),
                })
            }
        }
    }

    /// Advance toward the head waypoint by at most `speed`
    ///
    /// Moving into terrain (or off the map) stops the unit and drops its
    /// remaining waypoints.
    pub fn integrate(&mut self, grid: &CollisionGrid) {
        if !self.alive {
            return;
        }

        self.cooldown = self.cooldown.saturating_sub(1);

        let mut budget = self.speed;
        while budget > 0.0 {
            let Some(&target) = self.move_to.front() else {
                break;
            };

            let delta = target - self.position;
            let distance = delta.length();
            if distance <= WAYPOINT_EPSILON {
                self.move_to.pop_front();
                continue;
            }

            let step = distance.min(budget);
            let next = self.position + delta / distance * step;
            if grid.is_on_collision(next) {
                self.move_to.clear();
                break;
            }

            self.position = next;
            budget -= step;
            if step >= distance {
                self.move_to.pop_front();
            }
        }
    }

    /// Take damage. Health clamps at zero and the unit dies there.
    pub fn hurt(&mut self, amount: f32) {
        if !self.alive {
            return;
        }
        self.health = (self.health - amount).max(0.0);
        if self.health <= 0.0 {
            self.alive = false;
            self.move_to.clear();
            self.attack_to = None;
        }
    }
}

/// A side in the match: its units and the agent controlling them
#[derive(Debug)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub color: String,
    pub units: Vec<Unit>,
    /// Sum of unit health; recomputed every tick
    pub health: f32,
    pub alive: bool,
    pub agent: AgentBinding,
}

impl Team {
    /// Team with no agent attached; it never issues orders
    pub fn new(id: TeamId, name: impl Into<String>) -> Self {
        Self::with_agent(id, name, "", SandboxConfig::default())
    }

    pub fn with_agent(
        id: TeamId,
        name: impl Into<String>,
        agent_id: impl Into<String>,
        sandbox: SandboxConfig,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            color: TEAM_COLORS[id.index() % TEAM_COLORS.len()].to_string(),
            units: Vec::new(),
            health: 0.0,
            alive: false,
            agent: AgentBinding::new(id, agent_id, sandbox),
        }
    }

    /// Add a unit and return its index
    pub fn spawn_unit(&mut self, position: Vec2, config: &UnitConfig) -> usize {
        let index = self.units.len();
        self.units.push(Unit::new(index, self.id, position, config));
        self.update_health();
        index
    }

    pub fn unit(&self, index: usize) -> Option<&Unit> {
        self.units.get(index)
    }

    pub fn unit_mut(&mut self, index: usize) -> Option<&mut Unit> {
        self.units.get_mut(index)
    }

    pub fn alive_units(&self) -> impl Iterator<Item = &Unit> {
        self.units.iter().filter(|unit| unit.alive)
    }

    /// Recompute aggregate health and liveness from the units
    pub fn update_health(&mut self) {
        self.health = self.units.iter().map(|unit| unit.health).sum();
        self.alive = self.units.iter().any(|unit| unit.alive);
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }
}
