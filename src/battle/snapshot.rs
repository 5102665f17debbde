//! Read-only projections of match state
//!
//! [`GameState`] is what agents see each tick. [`GameFrame`] is the richer
//! export handed to observers and replay files. Both are plain copies built
//! from the live state; nothing in them refers back into it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::battle::bullet::Bullet;
use crate::battle::units::{Team, Unit};
use crate::core::types::{BulletId, Point, TeamId, Tick};

// === AGENT VIEW ===

/// Public state of one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitView {
    pub id: usize,
    pub health: f32,
    pub alive: bool,
    pub position: Point,
    pub radius: f32,
}

impl From<&Unit> for UnitView {
    fn from(unit: &Unit) -> Self {
        Self {
            id: unit.index,
            health: unit.health,
            alive: unit.alive,
            position: unit.position.into(),
            radius: unit.radius,
        }
    }
}

/// Public state of one team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamView {
    pub id: TeamId,
    pub name: String,
    pub color: String,
    pub units: Vec<UnitView>,
}

impl From<&Team> for TeamView {
    fn from(team: &Team) -> Self {
        Self {
            id: team.id,
            name: team.name.clone(),
            color: team.color.clone(),
            units: team.units.iter().map(UnitView::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulletView {
    pub id: BulletId,
    pub team_id: TeamId,
    pub position: Point,
    pub angle: f32,
    pub radius: f32,
}

impl From<&Bullet> for BulletView {
    fn from(bullet: &Bullet) -> Self {
        Self {
            id: bullet.id,
            team_id: bullet.team_id,
            position: bullet.position.into(),
            angle: bullet.angle,
            radius: bullet.radius,
        }
    }
}

/// Snapshot handed to every agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub tick: Tick,
    pub teams: Vec<TeamView>,
    pub bullets: Vec<BulletView>,
}

impl GameState {
    pub fn capture(tick: Tick, teams: &[Team], bullets: &[Bullet]) -> Self {
        Self {
            tick,
            teams: teams.iter().map(TeamView::from).collect(),
            bullets: bullets.iter().map(BulletView::from).collect(),
        }
    }

    pub fn team(&self, id: TeamId) -> Option<&TeamView> {
        self.teams.iter().find(|team| team.id == id)
    }
}

// === FRAME EXPORT ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitFrame {
    pub health: f32,
    pub alive: bool,
    pub position: Point,
    pub radius: f32,
    /// Remaining waypoints
    pub move_to: Vec<Point>,
    pub attack_to: Option<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamFrame {
    pub id: TeamId,
    pub name: String,
    pub color: String,
    pub health: f32,
    pub units: Vec<UnitFrame>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulletFrame {
    pub id: BulletId,
    pub team_id: TeamId,
    pub position: Point,
    pub radius: f32,
    pub angle: f32,
    pub speed: f32,
}

/// Serializable projection of the whole match at one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameFrame {
    pub teams: BTreeMap<u32, TeamFrame>,
    pub bullets: BTreeMap<u32, BulletFrame>,
}

impl GameFrame {
    pub fn capture(teams: &[Team], bullets: &[Bullet]) -> Self {
        let teams = teams
            .iter()
            .map(|team| {
                let units = team
                    .units
                    .iter()
                    .map(|unit| UnitFrame {
                        health: unit.health,
                        alive: unit.alive,
                        position: unit.position.into(),
                        radius: unit.radius,
                        move_to: unit.move_to.iter().map(|p| Point::from(*p)).collect(),
                        attack_to: unit.attack_to.map(Point::from),
                    })
                    .collect();
                let frame = TeamFrame {
                    id: team.id,
                    name: team.name.clone(),
                    color: team.color.clone(),
                    health: team.health,
                    units,
                };
                (team.id.0, frame)
            })
            .collect();

        let bullets = bullets
            .iter()
            .map(|bullet| {
                let frame = BulletFrame {
                    id: bullet.id,
                    team_id: bullet.team_id,
                    position: bullet.position.into(),
                    radius: bullet.radius,
                    angle: bullet.angle,
                    speed: bullet.speed,
                };
                (bullet.id.0, frame)
            })
            .collect();

        Self { teams, bullets }
    }

    pub fn alive_unit_count(&self) -> usize {
        self.teams
            .values()
            .flat_map(|team| team.units.iter())
            .filter(|unit| unit.alive)
            .count()
    }
}
