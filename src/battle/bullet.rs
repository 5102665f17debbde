//! Projectiles

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::battle::grid::CollisionGrid;
use crate::battle::units::Unit;
use crate::core::config::BulletConfig;
use crate::core::types::{heading_vector, BulletId, TeamId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bullet {
    pub id: BulletId,
    pub team_id: TeamId,
    pub position: Vec2,
    /// Heading in radians
    pub angle: f32,
    pub speed: f32,
    pub radius: f32,
    pub damage: f32,
}

impl Bullet {
    pub fn new(
        id: BulletId,
        team_id: TeamId,
        position: Vec2,
        angle: f32,
        config: &BulletConfig,
    ) -> Self {
        Self {
            id,
            team_id,
            position,
            angle,
            speed: config.speed,
            radius: config.radius,
            damage: config.damage,
        }
    }

    /// Move forward along the heading
    pub fn integrate(&mut self) {
        self.position += heading_vector(self.angle) * self.speed;
    }

    /// Centers within the sum of radii
    pub fn overlaps(&self, unit: &Unit) -> bool {
        self.position.distance(unit.position) <= self.radius + unit.radius
    }

    /// Terrain hit, or left the map
    pub fn hits_terrain(&self, grid: &CollisionGrid) -> bool {
        grid.is_on_collision(self.position)
    }
}
