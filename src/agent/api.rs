//! Script-facing API
//!
//! Everything an agent can touch besides its own snapshot lives here:
//! - `output`: write-only action collector (`output.unit(i).move_to(x, y)`)
//! - `game.map`: read-only collision grid with `find_path` and `is_blocked`
//! - vector helpers over `#{x, y}` maps
//! - `log`, `print` and `debug`, all routed to the team's log
//!
//! Script positions are object maps with `x` and `y` fields (ints or
//! floats); two-element arrays are accepted too.

use glam::Vec2;
use rhai::{Array, Dynamic, Engine, EvalAltResult, ImmutableString, Map, Position, FLOAT, INT};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::agent::log::LogLevel;
use crate::battle::actions::{ActionBatch, ActionParam, DeclaredAction};
use crate::battle::grid::CollisionGrid;
use crate::battle::pathfinding::{search_path, PathSearch};
use crate::core::types::heading_to;

pub type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

// === SHARED CHANNEL ===

#[derive(Debug, Default)]
struct ChannelState {
    batch: ActionBatch,
    lines: Vec<(LogLevel, String)>,
    /// End of the current call's budget
    deadline: Option<Instant>,
}

/// State shared between one team's engine callbacks and its binding
///
/// Calls into a team's engine are sequential, so the lock is never
/// contended; it exists because engine callbacks must be `Send + Sync`.
#[derive(Debug, Clone, Default)]
pub struct ScriptChannel {
    state: Arc<Mutex<ChannelState>>,
}

impl ScriptChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stage(&self, unit_index: usize, action: DeclaredAction) {
        self.lock().batch.stage(unit_index, action);
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.lock().lines.push((level, message.into()));
    }

    /// Clear staged actions and pending lines before a call
    pub fn reset(&self) {
        let mut state = self.lock();
        state.batch = ActionBatch::new();
        state.lines.clear();
    }

    pub fn take_batch(&self) -> ActionBatch {
        std::mem::take(&mut self.lock().batch)
    }

    pub fn take_lines(&self) -> Vec<(LogLevel, String)> {
        std::mem::take(&mut self.lock().lines)
    }

    pub fn set_deadline(&self, deadline: Instant) {
        self.lock().deadline = Some(deadline);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.lock().deadline
    }
}

// === OUTPUT ===

/// The `output` object handed to `tick`
#[derive(Debug, Clone)]
pub struct ActionCollector {
    channel: ScriptChannel,
}

impl ActionCollector {
    pub fn new(channel: ScriptChannel) -> Self {
        Self { channel }
    }

    fn unit(&mut self, index: INT) -> UnitOrders {
        UnitOrders {
            channel: self.channel.clone(),
            index: usize::try_from(index).ok(),
        }
    }
}

/// Orders for a single unit, returned by `output.unit(i)`
///
/// Negative indices are accepted and silently dropped; out-of-range indices
/// reach the engine, which ignores them.
#[derive(Debug, Clone)]
pub struct UnitOrders {
    channel: ScriptChannel,
    index: Option<usize>,
}

impl UnitOrders {
    fn stage(&self, action: DeclaredAction) -> UnitOrders {
        if let Some(index) = self.index {
            self.channel.stage(index, action);
        }
        self.clone()
    }

    fn point_param(pos: &Dynamic) -> ActionParam {
        point_from_dynamic(pos).map_or(ActionParam::None, ActionParam::Point)
    }

    fn xy_param(x: &Dynamic, y: &Dynamic) -> ActionParam {
        match (number(x), number(y)) {
            (Some(x), Some(y)) => ActionParam::Point(Vec2::new(x, y)),
            _ => ActionParam::None,
        }
    }

    fn move_to(&mut self, pos: Dynamic) -> UnitOrders {
        self.stage(DeclaredAction::new("move_to", Self::point_param(&pos)))
    }

    fn move_to_xy(&mut self, x: Dynamic, y: Dynamic) -> UnitOrders {
        self.stage(DeclaredAction::new("move_to", Self::xy_param(&x, &y)))
    }

    fn attack_to(&mut self, pos: Dynamic) -> UnitOrders {
        self.stage(DeclaredAction::new("attack_to", Self::point_param(&pos)))
    }

    fn attack_to_xy(&mut self, x: Dynamic, y: Dynamic) -> UnitOrders {
        self.stage(DeclaredAction::new("attack_to", Self::xy_param(&x, &y)))
    }

    fn move_along(&mut self, path: Dynamic) -> UnitOrders {
        let param = path_from_dynamic(&path).map_or(ActionParam::None, ActionParam::Path);
        self.stage(DeclaredAction::new("move_along", param))
    }

    /// Generic form; the kind is passed through untouched so the engine can
    /// decide whether it knows it
    fn add_action(&mut self, kind: ImmutableString, param: Dynamic) -> UnitOrders {
        let param = match point_from_dynamic(&param) {
            Some(point) => ActionParam::Point(point),
            None => path_from_dynamic(&param).map_or(ActionParam::None, ActionParam::Path),
        };
        self.stage(DeclaredAction::new(kind.as_str(), param))
    }
}

// === MAP ===

/// Read-only map handle exposed as `game.map`
///
/// Searches run under the owning team's call deadline.
#[derive(Debug, Clone)]
pub struct MapView {
    grid: Arc<CollisionGrid>,
    channel: ScriptChannel,
}

impl MapView {
    pub fn new(grid: Arc<CollisionGrid>, channel: ScriptChannel) -> Self {
        Self { grid, channel }
    }

    /// Cell-center waypoints from `from` to `to`; empty when unreachable
    ///
    /// Terminates the script if the deadline passes mid-search.
    fn find_path(&mut self, from: Dynamic, to: Dynamic) -> ScriptResult<Array> {
        let from = require_point(&from, "find_path")?;
        let to = require_point(&to, "find_path")?;
        let start = self.grid.world_to_cell(from);
        let goal = self.grid.world_to_cell(to);

        let path = match search_path(&self.grid, start, goal, self.channel.deadline()) {
            PathSearch::Found(path) => path,
            PathSearch::Unreachable => Vec::new(),
            PathSearch::Expired => {
                return Err(EvalAltResult::ErrorTerminated(Dynamic::UNIT, Position::NONE).into())
            }
        };
        Ok(path
            .into_iter()
            .map(|cell| Dynamic::from_map(point_map(self.grid.cell_center(cell))))
            .collect())
    }

    fn is_blocked(&mut self, pos: Dynamic) -> ScriptResult<bool> {
        Ok(self.grid.is_on_collision(require_point(&pos, "is_blocked")?))
    }
}

// === CONVERSIONS ===

fn number(value: &Dynamic) -> Option<f32> {
    if let Ok(float) = value.as_float() {
        return Some(float as f32);
    }
    value.as_int().ok().map(|int| int as f32)
}

/// Read a position from `#{x, y}` or `[x, y]`
pub fn point_from_dynamic(value: &Dynamic) -> Option<Vec2> {
    if let Some(map) = value.read_lock::<Map>() {
        let x = map.get("x").and_then(number)?;
        let y = map.get("y").and_then(number)?;
        return Some(Vec2::new(x, y));
    }
    if let Some(array) = value.read_lock::<Array>() {
        if let [x, y] = array.as_slice() {
            return Some(Vec2::new(number(x)?, number(y)?));
        }
    }
    None
}

/// Read a list of positions
pub fn path_from_dynamic(value: &Dynamic) -> Option<Vec<Vec2>> {
    let array = value.read_lock::<Array>()?;
    array.iter().map(point_from_dynamic).collect()
}

pub fn point_map(point: Vec2) -> Map {
    let mut map = Map::new();
    map.insert("x".into(), Dynamic::from_float(point.x as FLOAT));
    map.insert("y".into(), Dynamic::from_float(point.y as FLOAT));
    map
}

fn require_point(value: &Dynamic, func: &str) -> ScriptResult<Vec2> {
    point_from_dynamic(value)
        .ok_or_else(|| format!("{}: expected a position, got {}", func, value.type_name()).into())
}

// === REGISTRATION ===

/// Install the agent API on a team's engine
pub fn register_api(engine: &mut Engine, channel: &ScriptChannel) {
    engine.register_type_with_name::<ActionCollector>("Output");
    engine.register_fn("unit", ActionCollector::unit);

    engine.register_type_with_name::<UnitOrders>("UnitOrders");
    engine.register_fn("move_to", UnitOrders::move_to);
    engine.register_fn("move_to", UnitOrders::move_to_xy);
    engine.register_fn("attack_to", UnitOrders::attack_to);
    engine.register_fn("attack_to", UnitOrders::attack_to_xy);
    engine.register_fn("move_along", UnitOrders::move_along);
    engine.register_fn("add_action", UnitOrders::add_action);

    engine.register_type_with_name::<MapView>("GameMap");
    engine.register_fn("find_path", MapView::find_path);
    engine.register_fn("is_blocked", MapView::is_blocked);
    engine.register_get("width", |view: &mut MapView| {
        view.grid.world_width() as FLOAT
    });
    engine.register_get("height", |view: &mut MapView| {
        view.grid.world_height() as FLOAT
    });
    engine.register_get("cell_size", |view: &mut MapView| view.grid.cell_size as FLOAT);

    engine.register_fn("vec2", |x: Dynamic, y: Dynamic| -> ScriptResult<Map> {
        match (number(&x), number(&y)) {
            (Some(x), Some(y)) => Ok(point_map(Vec2::new(x, y))),
            _ => Err("vec2: expected two numbers".into()),
        }
    });
    engine.register_fn("distance", |a: Dynamic, b: Dynamic| -> ScriptResult<FLOAT> {
        let a = require_point(&a, "distance")?;
        let b = require_point(&b, "distance")?;
        Ok(a.distance(b) as FLOAT)
    });
    engine.register_fn("length", |v: Dynamic| -> ScriptResult<FLOAT> {
        Ok(require_point(&v, "length")?.length() as FLOAT)
    });
    engine.register_fn("normalize", |v: Dynamic| -> ScriptResult<Map> {
        Ok(point_map(require_point(&v, "normalize")?.normalize_or_zero()))
    });
    engine.register_fn("angle_to", |from: Dynamic, to: Dynamic| -> ScriptResult<FLOAT> {
        let from = require_point(&from, "angle_to")?;
        let to = require_point(&to, "angle_to")?;
        Ok(heading_to(from, to) as FLOAT)
    });

    let log_channel = channel.clone();
    engine.register_fn("log", move |message: ImmutableString| {
        log_channel.log(LogLevel::Info, message.as_str());
    });

    let print_channel = channel.clone();
    engine.on_print(move |text| print_channel.log(LogLevel::Info, text));

    let debug_channel = channel.clone();
    engine.on_debug(move |text, _source, pos| {
        debug_channel.log(LogLevel::Debug, format!("{:?} {}", pos, text));
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with_api() -> (Engine, ScriptChannel) {
        let mut engine = Engine::new();
        let channel = ScriptChannel::new();
        register_api(&mut engine, &channel);
        (engine, channel)
    }

    fn run_with_output(engine: &Engine, channel: &ScriptChannel, script: &str) {
        let mut scope = rhai::Scope::new();
        scope.push("output", ActionCollector::new(channel.clone()));
        engine.run_with_scope(&mut scope, script).unwrap();
    }

    #[test]
    fn test_orders_stage_into_channel() {
        let (engine, channel) = engine_with_api();
        run_with_output(
            &engine,
            &channel,
            r#"
                output.unit(0).move_to(3, 4);
                output.unit(1).attack_to(#{x: 1.5, y: 2.5});
                output.unit(1).move_along([#{x: 1, y: 1}, [2, 2]]);
            "#,
        );

        let batch = channel.take_batch();
        assert_eq!(
            batch.actions_for(0),
            &[DeclaredAction::move_to(Vec2::new(3.0, 4.0))]
        );
        assert_eq!(batch.actions_for(1).len(), 2);
        assert_eq!(
            batch.actions_for(1)[1],
            DeclaredAction::move_along(vec![Vec2::new(1.0, 1.0), Vec2::new(2.0, 2.0)])
        );
        assert!(channel.take_batch().is_empty());
    }

    #[test]
    fn test_chained_orders_and_camel_case_kind() {
        let (engine, channel) = engine_with_api();
        run_with_output(
            &engine,
            &channel,
            r#"output.unit(2).add_action("moveTo", [5, 5]).attack_to(1, 1);"#,
        );

        let batch = channel.take_batch();
        let actions = batch.actions_for(2);
        assert_eq!(actions[0].kind, "move_to");
        assert_eq!(actions[0].param, ActionParam::Point(Vec2::new(5.0, 5.0)));
        assert_eq!(actions[1].kind, "attack_to");
    }

    #[test]
    fn test_negative_unit_index_is_dropped() {
        let (engine, channel) = engine_with_api();
        run_with_output(&engine, &channel, "output.unit(-1).move_to(1, 1);");
        assert!(channel.take_batch().is_empty());
    }

    #[test]
    fn test_bad_coordinates_stage_empty_param() {
        let (engine, channel) = engine_with_api();
        run_with_output(&engine, &channel, r#"output.unit(0).move_to("north");"#);
        let batch = channel.take_batch();
        assert_eq!(batch.actions_for(0)[0].param, ActionParam::None);
    }

    #[test]
    fn test_vector_helpers() {
        let (engine, _channel) = engine_with_api();
        let d: FLOAT = engine.eval("distance(vec2(0, 0), vec2(3, 4))").unwrap();
        assert!((d - 5.0).abs() < 1e-6);

        let len: FLOAT = engine.eval("length(normalize(#{x: 10.0, y: 0}))").unwrap();
        assert!((len - 1.0).abs() < 1e-6);

        let angle: FLOAT = engine.eval("angle_to(vec2(0, 0), vec2(0, 1))").unwrap();
        assert!((angle - std::f64::consts::FRAC_PI_2 as FLOAT).abs() < 1e-5);
    }

    #[test]
    fn test_helper_type_error_raises() {
        let (engine, _channel) = engine_with_api();
        assert!(engine.eval::<FLOAT>(r#"distance("a", 1)"#).is_err());
    }

    #[test]
    fn test_log_print_and_debug_routed() {
        let (engine, channel) = engine_with_api();
        engine
            .run(r#"log("hello"); print("world"); debug("dbg");"#)
            .unwrap();

        let lines = channel.take_lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], (LogLevel::Info, "hello".to_string()));
        assert_eq!(lines[1], (LogLevel::Info, "world".to_string()));
        assert_eq!(lines[2].0, LogLevel::Debug);
    }

    #[test]
    fn test_map_view_queries() {
        let (engine, channel) = engine_with_api();
        let grid = CollisionGrid::from_text("...\n.#.\n...", 1.0).unwrap();
        let mut scope = rhai::Scope::new();
        scope.push("map", MapView::new(Arc::new(grid), channel));

        let blocked: bool = engine
            .eval_with_scope(&mut scope, "map.is_blocked(#{x: 1.5, y: 1.5})")
            .unwrap();
        assert!(blocked);

        let steps: INT = engine
            .eval_with_scope(&mut scope, "map.find_path(vec2(0.5, 0.5), vec2(2.5, 2.5)).len()")
            .unwrap();
        assert_eq!(steps, 5);

        let unreachable: INT = engine
            .eval_with_scope(&mut scope, "map.find_path(vec2(0.5, 0.5), vec2(1.5, 1.5)).len()")
            .unwrap();
        assert_eq!(unreachable, 0);

        let width: FLOAT = engine.eval_with_scope(&mut scope, "map.width").unwrap();
        assert_eq!(width, 3.0);
    }

    #[test]
    fn test_find_path_past_deadline_terminates() {
        let (engine, channel) = engine_with_api();
        channel.set_deadline(Instant::now());
        let mut scope = rhai::Scope::new();
        scope.push("map", MapView::new(Arc::new(CollisionGrid::new(40, 40, 1.0)), channel));

        let err = engine
            .eval_with_scope::<INT>(&mut scope, "map.find_path(vec2(0.5, 0.5), vec2(39.5, 39.5)).len()")
            .unwrap_err();
        assert!(matches!(*err, EvalAltResult::ErrorTerminated(..)));
    }
}
