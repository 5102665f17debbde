//! Agent binding: one sandboxed script per team
//!
//! A binding is prepared once before the first tick and then asked for an
//! action batch every tick. Each binding owns a private `rhai::Engine`; no
//! engine, AST, or script state is ever shared between teams.
//!
//! Failure policy:
//! - preparation failures leave the binding permanently not ready
//! - decision failures are logged and the partial batch is returned
//! - asking a not-ready binding to decide is an engine bug and is reported
//!   as [`ArenaError::AgentNotReady`]

use rhai::module_resolvers::DummyModuleResolver;
use rhai::{CallFnOptions, Dynamic, Engine, EvalAltResult, Map, Scope, AST};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::agent::api::{register_api, ActionCollector, MapView, ScriptChannel};
use crate::agent::log::AgentLog;
use crate::agent::source::{AgentSource, SourceError};
use crate::battle::actions::ActionBatch;
use crate::battle::grid::CollisionGrid;
use crate::battle::snapshot::GameState;
use crate::core::config::SandboxConfig;
use crate::core::error::{ArenaError, Result};
use crate::core::types::{TeamId, Tick};

/// Name of the required per-tick entry point
pub const TICK_FN: &str = "tick";
/// Name of the optional one-time entry point
pub const INIT_FN: &str = "init";

#[derive(Debug, Clone, Error)]
pub enum PrepareFailure {
    #[error("could not fetch agent version: {0}")]
    Fetch(String),

    #[error("agent '{0}' has no published version")]
    NotFound(String),

    #[error("compile error: {0}")]
    Compile(String),

    #[error("script has no `tick(game, me, output)` function")]
    MissingEntryPoint,

    #[error("init failed: {0}")]
    InitException(String),

    #[error("init exceeded its {0:?} budget")]
    InitTimeout(Duration),
}

impl From<SourceError> for PrepareFailure {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::NotFound(id) => PrepareFailure::NotFound(id),
            other => PrepareFailure::Fetch(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum DecisionFailure {
    #[error("tick failed: {0}")]
    Runtime(String),

    #[error("tick exceeded its {0:?} budget")]
    Timeout(Duration),
}

/// Compiled script plus everything needed to call into it
struct ScriptRuntime {
    engine: Engine,
    ast: AST,
    /// Bound as `this` in `init` and `tick`; persists across ticks
    memory: Dynamic,
    map: MapView,
}

/// Per-team link between the engine and an agent script
pub struct AgentBinding {
    team_id: TeamId,
    agent_id: String,
    version_id: Option<String>,
    sandbox: SandboxConfig,
    channel: ScriptChannel,
    runtime: Option<ScriptRuntime>,
    ready: bool,
    log: AgentLog,
    decision_failures: u32,
    last_failure: Option<DecisionFailure>,
}

impl fmt::Debug for AgentBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentBinding")
            .field("team_id", &self.team_id)
            .field("agent_id", &self.agent_id)
            .field("version_id", &self.version_id)
            .field("ready", &self.ready)
            .field("decision_failures", &self.decision_failures)
            .finish_non_exhaustive()
    }
}

impl AgentBinding {
    pub fn new(team_id: TeamId, agent_id: impl Into<String>, sandbox: SandboxConfig) -> Self {
        let log = AgentLog::new(sandbox.max_log_chars);
        Self {
            team_id,
            agent_id: agent_id.into(),
            version_id: None,
            sandbox,
            channel: ScriptChannel::new(),
            runtime: None,
            ready: false,
            log,
            decision_failures: 0,
            last_failure: None,
        }
    }

    pub fn team_id(&self) -> TeamId {
        self.team_id
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn version_id(&self) -> Option<&str> {
        self.version_id.as_deref()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn log(&self) -> &AgentLog {
        &self.log
    }

    pub fn decision_failures(&self) -> u32 {
        self.decision_failures
    }

    /// Failure of the most recent `decide` call, if it failed
    pub fn last_failure(&self) -> Option<&DecisionFailure> {
        self.last_failure.as_ref()
    }

    /// Fetch, compile, and initialise the agent under the startup budget
    ///
    /// On failure the binding stays not ready and the failure is logged;
    /// the team keeps playing without actions.
    pub fn prepare(
        &mut self,
        source: &dyn AgentSource,
        world: &GameState,
        grid: Arc<CollisionGrid>,
    ) -> std::result::Result<(), PrepareFailure> {
        self.ready = false;
        self.runtime = None;
        self.channel.reset();

        let result = self.load(source, world, grid);
        self.drain_script_lines(0);

        match &result {
            Ok(()) => {
                self.ready = true;
                self.log.info(
                    0,
                    format!(
                        "agent {} ready (version {})",
                        self.agent_id,
                        self.version_id.as_deref().unwrap_or("?")
                    ),
                );
                tracing::info!(
                    team = self.team_id.0,
                    agent = %self.agent_id,
                    "Agent prepared"
                );
            }
            Err(failure) => {
                self.log.error(0, format!("prepare failed: {}", failure));
                tracing::warn!(
                    team = self.team_id.0,
                    agent = %self.agent_id,
                    "Agent preparation failed: {}",
                    failure
                );
            }
        }
        result
    }

    fn load(
        &mut self,
        source: &dyn AgentSource,
        world: &GameState,
        grid: Arc<CollisionGrid>,
    ) -> std::result::Result<(), PrepareFailure> {
        let version = source.fetch_latest_agent_version(&self.agent_id)?;
        self.version_id = Some(version.version_id.clone());

        let mut engine = build_engine(&self.sandbox, &self.channel);
        let ast = engine
            .compile(&version.code)
            .map_err(|err| PrepareFailure::Compile(err.to_string()))?;

        if !has_function(&ast, TICK_FN, 3) {
            return Err(PrepareFailure::MissingEntryPoint);
        }

        let budget = self.sandbox.prepare_timeout();
        let classify = |err: Box<EvalAltResult>| {
            if is_timeout(&err) {
                PrepareFailure::InitTimeout(budget)
            } else {
                PrepareFailure::InitException(err.to_string())
            }
        };

        // Top-level statements and `init` share the startup budget
        arm_deadline(&mut engine, &self.channel, budget);
        let mut scope = Scope::new();
        engine.run_ast_with_scope(&mut scope, &ast).map_err(classify)?;

        let map = MapView::new(grid, self.channel.clone());
        let mut memory = Dynamic::from_map(Map::new());

        if has_function(&ast, INIT_FN, 2) {
            let (game, me) = script_args(world, self.team_id, &map)
                .map_err(PrepareFailure::InitException)?;
            let options = CallFnOptions::new()
                .eval_ast(false)
                .bind_this_ptr(&mut memory);
            engine
                .call_fn_with_options::<Dynamic>(options, &mut scope, &ast, INIT_FN, (game, me))
                .map(|_| ())
                .map_err(classify)?;
        }

        self.runtime = Some(ScriptRuntime {
            engine,
            ast,
            memory,
            map,
        });
        Ok(())
    }

    /// Ask the agent for this tick's actions
    ///
    /// Script errors and timeouts never surface here: they are logged and
    /// whatever the script staged before failing is returned.
    pub fn decide(&mut self, world: &GameState) -> Result<ActionBatch> {
        if !self.ready {
            return Err(ArenaError::AgentNotReady(self.team_id));
        }
        let runtime = self
            .runtime
            .as_mut()
            .ok_or(ArenaError::AgentNotReady(self.team_id))?;

        self.channel.reset();
        let tick = world.tick;
        let budget = self.sandbox.decide_timeout();
        let outcome = call_tick(runtime, &self.channel, world, self.team_id, budget);

        let batch = self.channel.take_batch();
        self.drain_script_lines(tick);

        match outcome {
            Ok(()) => self.last_failure = None,
            Err(failure) => {
                tracing::warn!(
                    team = self.team_id.0,
                    tick,
                    "Agent decision failed: {}",
                    failure
                );
                self.log.error(tick, failure.to_string());
                self.decision_failures += 1;
                self.last_failure = Some(failure);
            }
        }
        Ok(batch)
    }

    /// Mark the binding ready without a loaded script
    #[cfg(test)]
    pub(crate) fn force_ready(&mut self) {
        self.ready = true;
    }

    /// Note an engine-side remark (ignored action, bad unit index)
    pub fn note(&mut self, tick: Tick, message: impl Into<String>) {
        self.log.info(tick, message);
    }

    fn drain_script_lines(&mut self, tick: Tick) {
        for (level, line) in self.channel.take_lines() {
            self.log.push(tick, level, line);
        }
    }
}

fn call_tick(
    runtime: &mut ScriptRuntime,
    channel: &ScriptChannel,
    world: &GameState,
    team_id: TeamId,
    budget: Duration,
) -> std::result::Result<(), DecisionFailure> {
    let ScriptRuntime {
        engine,
        ast,
        memory,
        map,
    } = runtime;

    let (game, me) = script_args(world, team_id, map).map_err(DecisionFailure::Runtime)?;
    let output = Dynamic::from(ActionCollector::new(channel.clone()));

    arm_deadline(engine, channel, budget);
    let mut scope = Scope::new();
    let options = CallFnOptions::new().eval_ast(false).bind_this_ptr(memory);
    engine
        .call_fn_with_options::<Dynamic>(options, &mut scope, ast, TICK_FN, (game, me, output))
        .map(|_| ())
        .map_err(|err| {
            if is_timeout(&err) {
                DecisionFailure::Timeout(budget)
            } else {
                DecisionFailure::Runtime(err.to_string())
            }
        })
}

/// Fresh engine with the sandbox limits and the agent API installed
fn build_engine(config: &SandboxConfig, channel: &ScriptChannel) -> Engine {
    let mut engine = Engine::new();
    engine.set_max_operations(config.max_operations);
    engine.set_max_call_levels(config.max_call_levels);
    engine.set_max_string_size(config.max_string_size);
    engine.set_max_array_size(config.max_collection_size);
    engine.set_max_map_size(config.max_collection_size);
    engine.set_module_resolver(DummyModuleResolver::new());
    engine.disable_symbol("eval");
    register_api(&mut engine, channel);
    engine
}

/// Terminate the next script call once `budget` has elapsed
///
/// The clock is read on every operation; native calls that can run long
/// (`find_path`) read the same deadline from the channel.
fn arm_deadline(engine: &mut Engine, channel: &ScriptChannel, budget: Duration) {
    let deadline = Instant::now() + budget;
    channel.set_deadline(deadline);
    engine.on_progress(move |_| (Instant::now() >= deadline).then_some(Dynamic::UNIT));
}

fn has_function(ast: &AST, name: &str, arity: usize) -> bool {
    ast.iter_functions()
        .any(|f| f.name == name && f.params.len() == arity)
}

fn is_timeout(err: &EvalAltResult) -> bool {
    match err {
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => is_timeout(inner),
        EvalAltResult::ErrorTerminated(..) | EvalAltResult::ErrorTooManyOperations(..) => true,
        _ => false,
    }
}

/// Convert the snapshot into fresh script values: `game` (with `game.map`)
/// and `me`, the caller's own team
fn script_args(
    world: &GameState,
    team_id: TeamId,
    map: &MapView,
) -> std::result::Result<(Dynamic, Dynamic), String> {
    let mut game = rhai::serde::to_dynamic(world).map_err(|err| err.to_string())?;
    if let Some(mut fields) = game.write_lock::<Map>() {
        fields.insert("map".into(), Dynamic::from(map.clone()));
    }

    let me = match world.team(team_id) {
        Some(team) => rhai::serde::to_dynamic(team).map_err(|err| err.to_string())?,
        None => Dynamic::UNIT,
    };
    Ok((game, me))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::source::InMemoryAgentSource;
    use crate::battle::actions::{ActionParam, DeclaredAction};
    use crate::battle::snapshot::{TeamView, UnitView};
    use crate::core::types::Point;
    use glam::Vec2;

    fn world() -> GameState {
        let team = |id: u32, x: f32| TeamView {
            id: TeamId(id),
            name: format!("team-{}", id),
            color: "#ffffff".into(),
            units: vec![UnitView {
                id: 0,
                health: 100.0,
                alive: true,
                position: Point { x, y: 1.0 },
                radius: 0.4,
            }],
        };
        GameState {
            tick: 1,
            teams: vec![team(0, 1.0), team(1, 8.0)],
            bullets: Vec::new(),
        }
    }

    fn grid() -> Arc<CollisionGrid> {
        Arc::new(CollisionGrid::new(10, 10, 1.0))
    }

    fn fast_sandbox() -> SandboxConfig {
        SandboxConfig {
            decide_timeout_ms: 50,
            prepare_timeout_ms: 100,
            ..SandboxConfig::default()
        }
    }

    fn prepared(code: &str) -> (AgentBinding, std::result::Result<(), PrepareFailure>) {
        let source = InMemoryAgentSource::new().with_agent("a", code);
        let mut binding = AgentBinding::new(TeamId(0), "a", fast_sandbox());
        let result = binding.prepare(&source, &world(), grid());
        (binding, result)
    }

    #[test]
    fn test_prepare_and_decide() {
        let (mut binding, result) = prepared(
            r#"
            fn tick(game, me, output) {
                let enemy = game.teams[1].units[0].position;
                output.unit(0).move_to(enemy);
                output.unit(0).attack_to(enemy.x, enemy.y);
            }
            "#,
        );
        assert!(result.is_ok());
        assert!(binding.is_ready());
        assert!(binding.version_id().is_some());

        let batch = binding.decide(&world()).unwrap();
        assert_eq!(
            batch.actions_for(0)[0],
            DeclaredAction::move_to(Vec2::new(8.0, 1.0))
        );
        assert_eq!(batch.actions_for(0)[1].kind, "attack_to");
        assert!(binding.last_failure().is_none());
    }

    #[test]
    fn test_memory_persists_through_this() {
        let (mut binding, result) = prepared(
            r#"
            fn init(game, me) { this.calls = 0; this.team = me.id; }
            fn tick(game, me, output) {
                this.calls += 1;
                output.unit(0).move_to(this.calls, this.team);
            }
            "#,
        );
        assert!(result.is_ok());

        binding.decide(&world()).unwrap();
        let batch = binding.decide(&world()).unwrap();
        assert_eq!(
            batch.actions_for(0)[0].param,
            ActionParam::Point(Vec2::new(2.0, 0.0))
        );
    }

    #[test]
    fn test_missing_agent_is_not_found() {
        let source = InMemoryAgentSource::new();
        let mut binding = AgentBinding::new(TeamId(0), "ghost", fast_sandbox());
        let result = binding.prepare(&source, &world(), grid());
        assert!(matches!(result, Err(PrepareFailure::NotFound(_))));
        assert!(!binding.is_ready());
        assert_eq!(binding.log().error_count(), 1);
    }

    #[test]
    fn test_compile_error_fails_prepare() {
        let (binding, result) = prepared("fn tick(game, me, output) {");
        assert!(matches!(result, Err(PrepareFailure::Compile(_))));
        assert!(!binding.is_ready());
    }

    #[test]
    fn test_missing_tick_fails_prepare() {
        let (_, result) = prepared("fn init(game, me) {}");
        assert!(matches!(result, Err(PrepareFailure::MissingEntryPoint)));
    }

    #[test]
    fn test_init_exception_fails_prepare() {
        let (_, result) = prepared(
            r#"
            fn init(game, me) { throw "no"; }
            fn tick(game, me, output) {}
            "#,
        );
        assert!(matches!(result, Err(PrepareFailure::InitException(_))));
    }

    #[test]
    fn test_init_timeout_fails_prepare() {
        let (binding, result) = prepared(
            r#"
            fn init(game, me) { let n = 0; loop { n += 1; } }
            fn tick(game, me, output) {}
            "#,
        );
        assert!(matches!(result, Err(PrepareFailure::InitTimeout(_))));
        assert!(!binding.is_ready());
    }

    #[test]
    fn test_decide_on_unready_binding_is_invariant_violation() {
        let mut binding = AgentBinding::new(TeamId(4), "a", fast_sandbox());
        assert!(matches!(
            binding.decide(&world()),
            Err(ArenaError::AgentNotReady(TeamId(4)))
        ));
    }

    #[test]
    fn test_decide_timeout_returns_empty_batch() {
        let (mut binding, result) = prepared("fn tick(game, me, output) { let n = 0; loop { n += 1; } }");
        assert!(result.is_ok());

        let started = Instant::now();
        let batch = binding.decide(&world()).unwrap();
        assert!(batch.is_empty());
        assert!(matches!(
            binding.last_failure(),
            Some(DecisionFailure::Timeout(_))
        ));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(binding.decision_failures(), 1);
    }

    #[test]
    fn test_decide_exception_keeps_partial_batch() {
        let (mut binding, _) = prepared(
            r#"
            fn tick(game, me, output) {
                output.unit(0).move_to(2, 2);
                throw "after staging";
            }
            "#,
        );

        let batch = binding.decide(&world()).unwrap();
        assert_eq!(batch.len(), 1);
        assert!(matches!(
            binding.last_failure(),
            Some(DecisionFailure::Runtime(_))
        ));
        assert!(binding.log().to_text().contains("after staging"));
    }

    #[test]
    fn test_failure_is_recoverable_next_tick() {
        let (mut binding, _) = prepared(
            r#"
            fn init(game, me) { this.n = 0; }
            fn tick(game, me, output) {
                this.n += 1;
                if this.n == 1 { throw "first tick"; }
                output.unit(0).move_to(1, 1);
            }
            "#,
        );

        assert!(binding.decide(&world()).unwrap().is_empty());
        assert_eq!(binding.decide(&world()).unwrap().len(), 1);
        assert!(binding.last_failure().is_none());
    }

    #[test]
    fn test_script_cannot_mutate_snapshot() {
        let (mut binding, _) = prepared(
            r#"
            fn tick(game, me, output) {
                game.teams[1].units[0].health = 0;
                me.units.clear();
            }
            "#,
        );
        let snapshot = world();
        binding.decide(&snapshot).unwrap();
        assert_eq!(snapshot, world());
    }

    #[test]
    fn test_eval_is_disabled() {
        let (mut binding, result) = prepared(r#"fn tick(game, me, output) { eval("1"); }"#);
        match result {
            Err(failure) => assert!(matches!(failure, PrepareFailure::Compile(_))),
            Ok(()) => {
                binding.decide(&world()).unwrap();
                assert!(matches!(
                    binding.last_failure(),
                    Some(DecisionFailure::Runtime(_))
                ));
            }
        }
    }

    #[test]
    fn test_map_available_to_agents() {
        let (mut binding, _) = prepared(
            r#"
            fn tick(game, me, output) {
                let path = game.map.find_path(vec2(0.5, 0.5), vec2(3.5, 0.5));
                output.unit(0).move_along(path);
            }
            "#,
        );
        let batch = binding.decide(&world()).unwrap();
        match &batch.actions_for(0)[0].param {
            ActionParam::Path(points) => assert_eq!(points.len(), 4),
            other => panic!("expected path, got {:?}", other),
        }
    }

    #[test]
    fn test_long_path_searches_respect_decide_budget() {
        let source = InMemoryAgentSource::new().with_agent(
            "a",
            r#"
            fn tick(game, me, output) {
                let far = vec2(game.map.width - 0.5, game.map.height - 0.5);
                loop { game.map.find_path(vec2(0.5, 0.5), far); }
            }
            "#,
        );
        let mut binding = AgentBinding::new(TeamId(0), "a", fast_sandbox());
        let grid = Arc::new(CollisionGrid::new(400, 400, 1.0));
        assert!(binding.prepare(&source, &world(), grid).is_ok());

        let budget = binding.sandbox.decide_timeout();
        let started = Instant::now();
        let batch = binding.decide(&world()).unwrap();
        let elapsed = started.elapsed();

        assert!(batch.is_empty());
        assert!(matches!(
            binding.last_failure(),
            Some(DecisionFailure::Timeout(_))
        ));
        assert!(
            elapsed < budget + Duration::from_millis(100),
            "decide took {:?} on a {:?} budget",
            elapsed,
            budget
        );
    }

    #[test]
    fn test_print_goes_to_log() {
        let (mut binding, _) = prepared(r#"fn tick(game, me, output) { print("hi"); }"#);
        binding.decide(&world()).unwrap();
        assert!(binding
            .log()
            .entries()
            .iter()
            .any(|entry| entry.tick == 1 && entry.message == "hi"));
    }
}
