//! Agent-declared actions
//!
//! Agents declare actions by name (`"move_to"`, `"attack_to"`, ...). The
//! engine parses each declaration into a [`UnitAction`] before dispatching
//! it to the unit; declarations whose kind or parameter does not parse are
//! skipped.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameter attached to a declared action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionParam {
    None,
    Point(Vec2),
    Path(Vec<Vec2>),
}

/// One named action as written by an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredAction {
    pub kind: String,
    pub param: ActionParam,
}

impl DeclaredAction {
    pub fn new(kind: impl Into<String>, param: ActionParam) -> Self {
        Self {
            kind: kind.into(),
            param,
        }
    }

    pub fn move_to(target: Vec2) -> Self {
        Self::new(ActionKind::MoveTo.name(), ActionParam::Point(target))
    }

    pub fn attack_to(target: Vec2) -> Self {
        Self::new(ActionKind::AttackTo.name(), ActionParam::Point(target))
    }

    pub fn move_along(waypoints: Vec<Vec2>) -> Self {
        Self::new(ActionKind::MoveAlong.name(), ActionParam::Path(waypoints))
    }
}

/// Recognised action kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionKind {
    MoveTo,
    MoveAlong,
    AttackTo,
}

impl ActionKind {
    /// Canonical script-facing name
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::MoveTo => "move_to",
            ActionKind::MoveAlong => "move_along",
            ActionKind::AttackTo => "attack_to",
        }
    }

    /// Parse a kind name; camelCase spellings are accepted too
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "move_to" | "moveTo" => Some(ActionKind::MoveTo),
            "move_along" | "moveAlong" => Some(ActionKind::MoveAlong),
            "attack_to" | "attackTo" => Some(ActionKind::AttackTo),
            _ => None,
        }
    }

    /// Staging slot. Both movement kinds replace the waypoint queue, so they
    /// share one slot.
    pub fn slot(&self) -> &'static str {
        match self {
            ActionKind::MoveTo | ActionKind::MoveAlong => "movement",
            ActionKind::AttackTo => "attack",
        }
    }
}

/// Slot a declaration occupies in a batch; unknown kinds keep their raw name
fn slot_of(kind: &str) -> &str {
    ActionKind::parse(kind).map_or(kind, |kind| kind.slot())
}

/// Validated action ready for a unit handler
#[derive(Debug, Clone, PartialEq)]
pub enum UnitAction {
    /// Replace the waypoint queue with a single target
    MoveTo { target: Vec2 },
    /// Replace the waypoint queue with a path
    MoveAlong { waypoints: Vec<Vec2> },
    /// Aim at a point; fires when the weapon is ready
    AttackTo { target: Vec2 },
}

impl UnitAction {
    /// Parse a declaration. Returns `None` for unknown kinds, mismatched
    /// parameters, or non-finite coordinates.
    pub fn from_declared(declared: &DeclaredAction) -> Option<Self> {
        let kind = ActionKind::parse(&declared.kind)?;
        match (kind, &declared.param) {
            (ActionKind::MoveTo, ActionParam::Point(target)) if target.is_finite() => {
                Some(UnitAction::MoveTo { target: *target })
            }
            (ActionKind::AttackTo, ActionParam::Point(target)) if target.is_finite() => {
                Some(UnitAction::AttackTo { target: *target })
            }
            (ActionKind::MoveAlong, ActionParam::Path(waypoints))
                if waypoints.iter().all(|p| p.is_finite()) =>
            {
                Some(UnitAction::MoveAlong {
                    waypoints: waypoints.clone(),
                })
            }
            _ => None,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            UnitAction::MoveTo { .. } => ActionKind::MoveTo,
            UnitAction::MoveAlong { .. } => ActionKind::MoveAlong,
            UnitAction::AttackTo { .. } => ActionKind::AttackTo,
        }
    }
}

/// Everything one agent declared during one tick, keyed by unit index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionBatch {
    units: BTreeMap<usize, Vec<DeclaredAction>>,
}

impl ActionBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a declaration for a unit
    ///
    /// Known kinds are stored under their canonical name. A later
    /// declaration for the same slot (movement, attack, or an unknown kind's
    /// raw name) replaces the earlier one in place.
    pub fn stage(&mut self, unit_index: usize, mut action: DeclaredAction) {
        if let Some(kind) = ActionKind::parse(&action.kind) {
            action.kind = kind.name().to_string();
        }
        let actions = self.units.entry(unit_index).or_default();
        let slot = slot_of(&action.kind);
        match actions.iter_mut().find(|a| slot_of(&a.kind) == slot) {
            Some(existing) => *existing = action,
            None => actions.push(action),
        }
    }

    /// Iterate units in ascending index order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[DeclaredAction])> {
        self.units
            .iter()
            .map(|(idx, actions)| (*idx, actions.as_slice()))
    }

    pub fn actions_for(&self, unit_index: usize) -> &[DeclaredAction] {
        self.units
            .get(&unit_index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.units.values().all(Vec::is_empty)
    }

    /// Total number of declarations across all units
    pub fn len(&self) -> usize {
        self.units.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_last_write_wins_per_kind() {
        let mut batch = ActionBatch::new();
        batch.stage(0, DeclaredAction::move_to(Vec2::new(1.0, 1.0)));
        batch.stage(0, DeclaredAction::attack_to(Vec2::new(5.0, 5.0)));
        batch.stage(0, DeclaredAction::move_to(Vec2::new(2.0, 2.0)));

        let actions = batch.actions_for(0);
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0], DeclaredAction::move_to(Vec2::new(2.0, 2.0)));
        assert_eq!(actions[1].kind, "attack_to");
    }

    #[test]
    fn test_stage_aliased_kinds_share_a_slot() {
        let mut batch = ActionBatch::new();
        let first = Vec2::new(1.5, 1.5);
        let last = Vec2::new(3.5, 3.5);
        batch.stage(0, DeclaredAction::new("moveTo", ActionParam::Point(first)));
        batch.stage(0, DeclaredAction::move_to(Vec2::new(9.5, 9.5)));
        batch.stage(0, DeclaredAction::new("moveTo", ActionParam::Point(last)));

        assert_eq!(batch.actions_for(0), &[DeclaredAction::move_to(last)]);
    }

    #[test]
    fn test_stage_movement_kinds_replace_each_other() {
        let mut batch = ActionBatch::new();
        batch.stage(0, DeclaredAction::move_along(vec![Vec2::ONE, Vec2::new(2.0, 2.0)]));
        batch.stage(0, DeclaredAction::attack_to(Vec2::ZERO));
        batch.stage(0, DeclaredAction::move_to(Vec2::new(4.0, 4.0)));

        let actions = batch.actions_for(0);
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0], DeclaredAction::move_to(Vec2::new(4.0, 4.0)));

        batch.stage(0, DeclaredAction::new("moveAlong", ActionParam::Path(vec![Vec2::ONE])));
        assert_eq!(batch.actions_for(0)[0], DeclaredAction::move_along(vec![Vec2::ONE]));
    }

    #[test]
    fn test_stage_unknown_kinds_keep_raw_name() {
        let mut batch = ActionBatch::new();
        batch.stage(0, DeclaredAction::new("teleport", ActionParam::Point(Vec2::ONE)));
        batch.stage(0, DeclaredAction::new("Teleport", ActionParam::None));
        batch.stage(0, DeclaredAction::new("teleport", ActionParam::Point(Vec2::ZERO)));

        let kinds: Vec<&str> = batch.actions_for(0).iter().map(|a| a.kind.as_str()).collect();
        assert_eq!(kinds, vec!["teleport", "Teleport"]);
        assert_eq!(batch.actions_for(0)[0].param, ActionParam::Point(Vec2::ZERO));
    }

    #[test]
    fn test_batch_iterates_units_in_index_order() {
        let mut batch = ActionBatch::new();
        batch.stage(3, DeclaredAction::move_to(Vec2::ZERO));
        batch.stage(1, DeclaredAction::move_to(Vec2::ZERO));

        let order: Vec<usize> = batch.iter().map(|(idx, _)| idx).collect();
        assert_eq!(order, vec![1, 3]);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_empty_batch() {
        let batch = ActionBatch::new();
        assert!(batch.is_empty());
        assert!(batch.actions_for(0).is_empty());
    }

    #[test]
    fn test_parse_known_kinds_and_camel_case() {
        assert_eq!(ActionKind::parse("move_to"), Some(ActionKind::MoveTo));
        assert_eq!(ActionKind::parse("attackTo"), Some(ActionKind::AttackTo));
        assert_eq!(ActionKind::parse("moveAlong"), Some(ActionKind::MoveAlong));
        assert_eq!(ActionKind::parse("selfDestruct"), None);
    }

    #[test]
    fn test_unknown_kind_does_not_parse() {
        let declared = DeclaredAction::new("teleport", ActionParam::Point(Vec2::ONE));
        assert!(UnitAction::from_declared(&declared).is_none());
    }

    #[test]
    fn test_mismatched_param_does_not_parse() {
        let declared = DeclaredAction::new("move_to", ActionParam::None);
        assert!(UnitAction::from_declared(&declared).is_none());
    }

    #[test]
    fn test_non_finite_target_does_not_parse() {
        let declared = DeclaredAction::attack_to(Vec2::new(f32::INFINITY, 0.0));
        assert!(UnitAction::from_declared(&declared).is_none());
    }

    #[test]
    fn test_move_along_parses() {
        let path = vec![Vec2::new(1.0, 0.0), Vec2::new(2.0, 0.0)];
        let action = UnitAction::from_declared(&DeclaredAction::move_along(path.clone())).unwrap();
        assert_eq!(action, UnitAction::MoveAlong { waypoints: path });
        assert_eq!(action.kind(), ActionKind::MoveAlong);
    }
}
