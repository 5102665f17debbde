//! Match execution loop
//!
//! Each tick: collect actions -> apply actions -> physics -> combat ->
//! liveness -> termination
//!
//! Only action collection runs in parallel (one task per ready team, each
//! against the same immutable snapshot). Everything after it mutates
//! `MatchState` sequentially on the caller's thread.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::agent::{AgentSource, PrepareFailure};
use crate::battle::actions::{ActionBatch, UnitAction};
use crate::battle::bullet::Bullet;
use crate::battle::grid::CollisionGrid;
use crate::battle::snapshot::{GameFrame, GameState};
use crate::battle::units::{Shot, Team};
use crate::core::config::{BulletConfig, MatchConfig, SandboxConfig};
use crate::core::error::{ArenaError, Result};
use crate::core::types::{BulletId, TeamId, Tick};

/// Outcome of evaluating the termination rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "team")]
pub enum MatchResult {
    Ongoing,
    TeamWins(TeamId),
    /// Every team died on the same tick
    NoSurvivors,
    /// Tick budget reached with more than one team alive
    Draw,
}

impl MatchResult {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MatchResult::Ongoing)
    }

    pub fn winner(&self) -> Option<TeamId> {
        match self {
            MatchResult::TeamWins(team) => Some(*team),
            _ => None,
        }
    }
}

/// Engine lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EnginePhase {
    /// Between steps (or before the first)
    #[default]
    Idle,
    Stepping,
    /// Terminal; further steps return the stored result
    Resolved(MatchResult),
}

/// Everything the simulation mutates
#[derive(Debug)]
pub struct MatchState {
    pub grid: Arc<CollisionGrid>,
    pub teams: Vec<Team>,
    pub bullets: Vec<Bullet>,
    pub tick: Tick,
    pub tick_budget: Tick,
    next_bullet_id: u32,
}

impl MatchState {
    pub fn new(grid: Arc<CollisionGrid>, tick_budget: Tick) -> Self {
        Self {
            grid,
            teams: Vec::new(),
            bullets: Vec::new(),
            tick: 0,
            tick_budget,
            next_bullet_id: 0,
        }
    }

    /// Register a team; ids follow registration order
    pub fn add_team(
        &mut self,
        name: impl Into<String>,
        agent_id: impl Into<String>,
        sandbox: SandboxConfig,
    ) -> TeamId {
        let id = TeamId::new(self.teams.len() as u32);
        self.teams.push(Team::with_agent(id, name, agent_id, sandbox));
        id
    }

    pub fn team(&self, id: TeamId) -> Result<&Team> {
        self.teams
            .get(id.index())
            .ok_or(ArenaError::TeamNotFound(id))
    }

    pub fn team_mut(&mut self, id: TeamId) -> Result<&mut Team> {
        self.teams
            .get_mut(id.index())
            .ok_or(ArenaError::TeamNotFound(id))
    }

    pub fn spawn_bullet(
        &mut self,
        team_id: TeamId,
        shot: Shot,
        config: &BulletConfig,
    ) -> BulletId {
        let id = BulletId(self.next_bullet_id);
        self.next_bullet_id += 1;
        self.bullets
            .push(Bullet::new(id, team_id, shot.origin, shot.angle, config));
        id
    }

    /// Copy of everything agents may see
    pub fn snapshot(&self) -> GameState {
        GameState::capture(self.tick, &self.teams, &self.bullets)
    }

    pub fn frame(&self) -> GameFrame {
        GameFrame::capture(&self.teams, &self.bullets)
    }

    pub fn alive_teams(&self) -> Vec<TeamId> {
        self.teams
            .iter()
            .filter(|team| team.is_alive())
            .map(|team| team.id)
            .collect()
    }

    pub fn total_bullets_fired(&self) -> u32 {
        self.next_bullet_id
    }
}

/// Termination rules, as a pure function of the state
///
/// A sole survivor (or none) ends the match before the tick budget is
/// consulted, even when both hold on the same tick.
pub fn check_finished(state: &MatchState) -> MatchResult {
    let alive = state.alive_teams();
    match alive.as_slice() {
        [] => MatchResult::NoSurvivors,
        [winner] => MatchResult::TeamWins(*winner),
        _ if state.tick >= state.tick_budget => MatchResult::Draw,
        _ => MatchResult::Ongoing,
    }
}

/// Owns the match state and advances it one tick at a time
#[derive(Debug)]
pub struct TickEngine {
    state: MatchState,
    config: MatchConfig,
    phase: EnginePhase,
}

impl TickEngine {
    pub fn new(state: MatchState, config: MatchConfig) -> Self {
        Self {
            state,
            config,
            phase: EnginePhase::Idle,
        }
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    /// Direct access for setup and tests; not for use mid-step
    pub fn state_mut(&mut self) -> &mut MatchState {
        &mut self.state
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn tick(&self) -> Tick {
        self.state.tick
    }

    pub fn into_state(self) -> MatchState {
        self.state
    }

    /// Prepare every team's agent in parallel
    ///
    /// Failures are recorded on the binding; the team still plays.
    pub fn prepare_agents(
        &mut self,
        source: &dyn AgentSource,
    ) -> Vec<(TeamId, std::result::Result<(), PrepareFailure>)> {
        let world = self.state.snapshot();
        let grid = Arc::clone(&self.state.grid);

        let results: Vec<_> = self
            .state
            .teams
            .par_iter_mut()
            .map(|team| {
                let result = team.agent.prepare(source, &world, Arc::clone(&grid));
                (team.id, result)
            })
            .collect();

        let ready = results.iter().filter(|(_, result)| result.is_ok()).count();
        tracing::info!(
            "Prepared {}/{} agents",
            ready,
            self.state.teams.len()
        );
        results
    }

    /// Run one full tick
    pub fn step(&mut self) -> Result<MatchResult> {
        if let EnginePhase::Resolved(result) = self.phase {
            return Ok(result);
        }

        self.phase = EnginePhase::Stepping;
        self.state.tick += 1;
        let tick = self.state.tick;
        tracing::debug!(tick, "Starting tick");

        // ===== PHASE 1: COLLECT ACTIONS =====
        tracing::debug!(tick, "Loading unit actions");
        let batches = match self.collect_actions() {
            Ok(batches) => batches,
            Err(err) => {
                self.state.tick -= 1;
                self.phase = EnginePhase::Idle;
                return Err(err);
            }
        };

        // ===== PHASE 2: APPLY ACTIONS =====
        self.apply_actions(batches);

        // ===== PHASE 3: PHYSICS =====
        tracing::debug!(tick, "Units moving");
        self.advance_physics();

        // ===== PHASE 4: COMBAT =====
        tracing::debug!(tick, "Resolving bullets");
        self.resolve_combat();

        // ===== PHASE 5: LIVENESS =====
        for team in &mut self.state.teams {
            team.update_health();
        }

        // ===== PHASE 6: TERMINATION =====
        let result = check_finished(&self.state);
        self.phase = if result.is_terminal() {
            EnginePhase::Resolved(result)
        } else {
            EnginePhase::Idle
        };
        tracing::debug!(tick, ?result, "Tick ended");
        Ok(result)
    }

    /// One batch per ready team, in registration order
    fn collect_actions(&mut self) -> Result<Vec<(usize, ActionBatch)>> {
        let world = self.state.snapshot();

        let results: Vec<Result<Option<ActionBatch>>> = self
            .state
            .teams
            .par_iter_mut()
            .map(|team| {
                if !team.agent.is_ready() {
                    return Ok(None);
                }
                team.agent.decide(&world).map(Some)
            })
            .collect();

        let mut batches = Vec::with_capacity(results.len());
        for (team_idx, result) in results.into_iter().enumerate() {
            if let Some(batch) = result? {
                batches.push((team_idx, batch));
            }
        }
        Ok(batches)
    }

    fn apply_actions(&mut self, batches: Vec<(usize, ActionBatch)>) {
        let tick = self.state.tick;
        for team in &mut self.state.teams {
            for unit in &mut team.units {
                unit.begin_tick();
            }
        }

        let mut shots: Vec<(TeamId, Shot)> = Vec::new();
        for (team_idx, batch) in batches {
            let team = &mut self.state.teams[team_idx];
            for (unit_idx, declared) in batch.iter() {
                if unit_idx >= team.units.len() {
                    tracing::debug!(team = team.id.0, unit_idx, "Order for unknown unit ignored");
                    team.agent
                        .note(tick, format!("no unit with index {}; orders ignored", unit_idx));
                    continue;
                }

                for action in declared {
                    let Some(parsed) = UnitAction::from_declared(action) else {
                        tracing::debug!(team = team.id.0, kind = %action.kind, "Unknown action ignored");
                        team.agent
                            .note(tick, format!("action '{}' ignored", action.kind));
                        continue;
                    };
                    if let Some(shot) = team.units[unit_idx].apply_action(parsed) {
                        shots.push((team.id, shot));
                    }
                }
            }
        }

        let bullet_config = self.config.bullet.clone();
        for (team_id, shot) in shots {
            self.state.spawn_bullet(team_id, shot, &bullet_config);
        }
    }

    fn advance_physics(&mut self) {
        let grid = Arc::clone(&self.state.grid);
        for team in &mut self.state.teams {
            for unit in team.units.iter_mut().filter(|unit| unit.alive) {
                unit.integrate(&grid);
            }
        }
        for bullet in &mut self.state.bullets {
            bullet.integrate();
        }
    }

    fn resolve_combat(&mut self) {
        let state = &mut self.state;

        // Targets are fixed at the start of the pass
        let targetable: Vec<Vec<bool>> = state
            .teams
            .iter()
            .map(|team| team.units.iter().map(|unit| unit.alive).collect())
            .collect();

        let mut hits: Vec<(usize, usize, f32)> = Vec::new();
        let mut spent = vec![false; state.bullets.len()];

        for (bullet_idx, bullet) in state.bullets.iter().enumerate() {
            for (team_idx, team) in state.teams.iter().enumerate() {
                if team.id == bullet.team_id {
                    continue;
                }
                for (unit_idx, unit) in team.units.iter().enumerate() {
                    if targetable[team_idx][unit_idx] && bullet.overlaps(unit) {
                        hits.push((team_idx, unit_idx, bullet.damage));
                        spent[bullet_idx] = true;
                    }
                }
            }
            if bullet.hits_terrain(&state.grid) {
                spent[bullet_idx] = true;
            }
        }

        for (team_idx, unit_idx, damage) in hits {
            state.teams[team_idx].units[unit_idx].hurt(damage);
        }

        let mut spent = spent.into_iter();
        state
            .bullets
            .retain(|_| !spent.next().unwrap_or(false));
    }
}
