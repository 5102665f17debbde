//! Post-match record
//!
//! What gets handed to persistence once a match resolves: the result, the
//! agent versions that played, and every team's diagnostic log.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::agent::AgentLog;
use crate::battle::execution::{MatchResult, MatchState};
use crate::core::types::{MatchId, TeamId, Tick};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRecord {
    pub team_id: TeamId,
    pub name: String,
    pub color: String,
    pub agent_id: String,
    pub version_id: Option<String>,
    pub prepared: bool,
    pub alive: bool,
    pub health: f32,
    pub units_alive: usize,
    pub decision_failures: u32,
    pub log: AgentLog,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: MatchId,
    pub map: String,
    pub result: MatchResult,
    pub ticks: Tick,
    pub bullets_fired: u32,
    pub teams: Vec<TeamRecord>,
}

impl MatchRecord {
    pub fn capture(match_id: MatchId, state: &MatchState, result: MatchResult) -> Self {
        let teams = state
            .teams
            .iter()
            .map(|team| TeamRecord {
                team_id: team.id,
                name: team.name.clone(),
                color: team.color.clone(),
                agent_id: team.agent.agent_id().to_string(),
                version_id: team.agent.version_id().map(str::to_string),
                prepared: team.agent.is_ready(),
                alive: team.alive,
                health: team.health,
                units_alive: team.alive_units().count(),
                decision_failures: team.agent.decision_failures(),
                log: team.agent.log().clone(),
            })
            .collect();

        Self {
            match_id,
            map: state.grid.name.clone(),
            result,
            ticks: state.tick,
            bullets_fired: state.total_bullets_fired(),
            teams,
        }
    }

    pub fn winner(&self) -> Option<&TeamRecord> {
        let id = self.result.winner()?;
        self.teams.iter().find(|team| team.team_id == id)
    }

    pub fn to_json_pretty(&self) -> crate::core::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable summary for the command line
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let outcome = match (self.result, self.winner()) {
            (MatchResult::TeamWins(_), Some(team)) => format!("{} wins", team.name),
            (MatchResult::NoSurvivors, _) => "no survivors".to_string(),
            (MatchResult::Draw, _) => "draw".to_string(),
            (other, _) => format!("{:?}", other),
        };
        let _ = writeln!(
            out,
            "Match {} on '{}': {} after {} ticks ({} bullets fired)",
            self.match_id.0, self.map, outcome, self.ticks, self.bullets_fired
        );
        for team in &self.teams {
            let _ = writeln!(
                out,
                "  [{}] {:<12} agent={:<12} prepared={:<5} units={} health={:.1} failures={}",
                team.team_id.0,
                team.name,
                team.agent_id,
                team.prepared,
                team.units_alive,
                team.health,
                team.decision_failures
            );
        }
        out
    }
}
