//! Match setup: request validation, team creation, unit placement

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::agent::AgentSource;
use crate::battle::constants::{DEFAULT_UNITS_PER_TEAM, MAX_UNITS_PER_TEAM, MIN_TEAMS_PER_MATCH};
use crate::battle::driver::MatchDriver;
use crate::battle::execution::{MatchState, TickEngine};
use crate::battle::grid::CollisionGrid;
use crate::core::config::MatchConfig;
use crate::core::error::{ArenaError, Result};

/// A queued match as submitted by a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRequest {
    pub agents: Vec<String>,
    /// Requested units per team; out-of-range values fall back to the default
    #[serde(default)]
    pub units: Option<i64>,
}

impl MatchRequest {
    pub fn new(agents: Vec<String>, units: Option<i64>) -> Self {
        Self { agents, units }
    }

    /// Reject requests with fewer than two agents; clamp the unit count
    ///
    /// Returns the unit count to use.
    pub fn validate(&self) -> Result<usize> {
        if self.agents.len() < MIN_TEAMS_PER_MATCH {
            return Err(ArenaError::InvalidRequest(format!(
                "a match needs at least {} agents, got {}",
                MIN_TEAMS_PER_MATCH,
                self.agents.len()
            )));
        }

        let units = match self.units {
            Some(n) if n >= 1 && n <= MAX_UNITS_PER_TEAM as i64 => n as usize,
            _ => DEFAULT_UNITS_PER_TEAM,
        };
        Ok(units)
    }
}

/// Builder for a ready-to-run match
#[derive(Debug, Clone)]
pub struct MatchSetup {
    grid: Arc<CollisionGrid>,
    config: MatchConfig,
    agents: Vec<String>,
}

impl MatchSetup {
    pub fn new(grid: CollisionGrid, config: MatchConfig) -> Self {
        Self {
            grid: Arc::new(grid),
            config,
            agents: Vec::new(),
        }
    }

    /// Setup from a validated request; the request's unit count wins over
    /// the config's
    pub fn from_request(
        request: &MatchRequest,
        grid: CollisionGrid,
        mut config: MatchConfig,
    ) -> Result<Self> {
        config.units_per_team = request.validate()?;
        let mut setup = Self::new(grid, config);
        for agent in &request.agents {
            setup = setup.with_agent(agent.clone());
        }
        Ok(setup)
    }

    /// Add a team played by `agent_id`; teams are registered in call order
    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agents.push(agent_id.into());
        self
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Create teams and place units on free cells
    ///
    /// Placement is drawn from a `ChaCha8Rng` seeded with `config.seed`, so
    /// the same setup always produces the same starting positions. Cells are
    /// distinct while enough free cells exist.
    pub fn build(self) -> Result<TickEngine> {
        self.config.validate()?;
        if self.agents.len() < MIN_TEAMS_PER_MATCH {
            return Err(ArenaError::InvalidRequest(format!(
                "a match needs at least {} teams, got {}",
                MIN_TEAMS_PER_MATCH,
                self.agents.len()
            )));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let total = self.agents.len() * self.config.units_per_team;
        let cells = self.grid.spawn_cells(total, &mut rng).ok_or_else(|| {
            ArenaError::MapError(format!(
                "map '{}' has no free cell to spawn on",
                self.grid.name
            ))
        })?;

        let mut state = MatchState::new(Arc::clone(&self.grid), self.config.tick_budget);
        let mut cells = cells.into_iter();
        for agent_id in &self.agents {
            let team_id =
                state.add_team(agent_id.clone(), agent_id.clone(), self.config.sandbox.clone());
            let team = state.team_mut(team_id)?;
            for cell in cells.by_ref().take(self.config.units_per_team) {
                team.spawn_unit(self.grid.cell_center(cell), &self.config.unit);
            }
        }

        tracing::info!(
            map = %self.grid.name,
            teams = state.teams.len(),
            units_per_team = self.config.units_per_team,
            "Match set up"
        );
        Ok(TickEngine::new(state, self.config))
    }

    /// Build, prepare every agent, and wrap the engine in a driver
    pub fn launch(self, source: &dyn AgentSource) -> Result<MatchDriver> {
        let mut engine = self.build()?;
        engine.prepare_agents(source);
        Ok(MatchDriver::new(engine))
    }
}
