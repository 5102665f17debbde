//! Core type definitions used throughout the codebase

use glam::Vec2;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Simulation tick counter
pub type Tick = u64;

/// Team identifier, assigned in registration order starting at zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TeamId(pub u32);

impl TeamId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Bullet identifier, unique for the lifetime of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BulletId(pub u32);

/// Identifier stamped on every match record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchId(pub Uuid);

impl MatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MatchId {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain `{x, y}` point used in snapshots and frames
///
/// `glam::Vec2` serializes as a tuple; agents and replay consumers expect
/// named fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl From<Vec2> for Point {
    fn from(v: Vec2) -> Self {
        Self { x: v.x, y: v.y }
    }
}

impl From<Point> for Vec2 {
    fn from(p: Point) -> Self {
        Vec2::new(p.x, p.y)
    }
}

/// Heading (radians) pointing from `from` toward `to`
pub fn heading_to(from: Vec2, to: Vec2) -> f32 {
    let delta = to - from;
    delta.y.atan2(delta.x)
}

/// Unit vector for a heading in radians
pub fn heading_vector(angle: f32) -> Vec2 {
    Vec2::from_angle(angle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_id_ordering() {
        assert!(TeamId(0) < TeamId(1));
        assert_eq!(TeamId::new(3).index(), 3);
    }

    #[test]
    fn test_point_round_trip_through_vec2() {
        let p = Point { x: 1.5, y: -2.0 };
        let v: Vec2 = p.into();
        assert_eq!(Point::from(v), p);
    }

    #[test]
    fn test_heading_to_cardinal_directions() {
        let origin = Vec2::ZERO;
        assert!((heading_to(origin, Vec2::new(1.0, 0.0)) - 0.0).abs() < 1e-6);
        assert!(
            (heading_to(origin, Vec2::new(0.0, 1.0)) - std::f32::consts::FRAC_PI_2).abs() < 1e-6
        );
    }

    #[test]
    fn test_heading_vector_is_unit_length() {
        let v = heading_vector(0.7);
        assert!((v.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_match_ids_are_unique() {
        assert_ne!(MatchId::new(), MatchId::new());
    }
}
