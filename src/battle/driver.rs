//! Match driver: tick loop cadence and lifecycle notifications

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::battle::execution::{MatchResult, TickEngine};
use crate::battle::record::MatchRecord;
use crate::battle::snapshot::GameFrame;
use crate::core::error::Result;
use crate::core::types::{MatchId, Tick};

/// Lifecycle hooks; every method defaults to a no-op
pub trait MatchObserver {
    fn on_start(&mut self) {}

    /// Called after every completed step
    fn on_tick(&mut self, _tick: Tick, _frame: &GameFrame) {}

    fn on_end(&mut self, _result: MatchResult, _total_ticks: Tick) {}
}

/// The empty observer
impl MatchObserver for () {}

impl<O: MatchObserver + ?Sized> MatchObserver for &mut O {
    fn on_start(&mut self) {
        (**self).on_start();
    }

    fn on_tick(&mut self, tick: Tick, frame: &GameFrame) {
        (**self).on_tick(tick, frame);
    }

    fn on_end(&mut self, result: MatchResult, total_ticks: Tick) {
        (**self).on_end(result, total_ticks);
    }
}

type StartFn<'a> = Box<dyn FnMut() + 'a>;
type TickFn<'a> = Box<dyn FnMut(Tick, &GameFrame) + 'a>;
type EndFn<'a> = Box<dyn FnMut(MatchResult, Tick) + 'a>;

/// Observer built from optional closures
#[derive(Default)]
pub struct Callbacks<'a> {
    on_start: Option<StartFn<'a>>,
    on_tick: Option<TickFn<'a>>,
    on_end: Option<EndFn<'a>>,
}

impl<'a> Callbacks<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start(mut self, f: impl FnMut() + 'a) -> Self {
        self.on_start = Some(Box::new(f));
        self
    }

    pub fn on_tick(mut self, f: impl FnMut(Tick, &GameFrame) + 'a) -> Self {
        self.on_tick = Some(Box::new(f));
        self
    }

    pub fn on_end(mut self, f: impl FnMut(MatchResult, Tick) + 'a) -> Self {
        self.on_end = Some(Box::new(f));
        self
    }
}

impl MatchObserver for Callbacks<'_> {
    fn on_start(&mut self) {
        if let Some(f) = self.on_start.as_mut() {
            f();
        }
    }

    fn on_tick(&mut self, tick: Tick, frame: &GameFrame) {
        if let Some(f) = self.on_tick.as_mut() {
            f(tick, frame);
        }
    }

    fn on_end(&mut self, result: MatchResult, total_ticks: Tick) {
        if let Some(f) = self.on_end.as_mut() {
            f(result, total_ticks);
        }
    }
}

/// One recorded frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickFrame {
    pub tick: Tick,
    pub frame: GameFrame,
}

/// Replay document written by [`FrameRecorder`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Replay {
    pub result: Option<MatchResult>,
    pub total_ticks: Tick,
    pub frames: Vec<TickFrame>,
}

/// Observer that keeps every `interval`-th frame for replay export
#[derive(Debug, Clone)]
pub struct FrameRecorder {
    interval: Tick,
    replay: Replay,
    last: Option<TickFrame>,
}

impl FrameRecorder {
    /// Record every frame
    pub fn new() -> Self {
        Self::every(1)
    }

    /// Record one frame in `interval` ticks; the final frame is always kept
    pub fn every(interval: Tick) -> Self {
        Self {
            interval: interval.max(1),
            replay: Replay::default(),
            last: None,
        }
    }

    pub fn frames(&self) -> &[TickFrame] {
        &self.replay.frames
    }

    pub fn replay(&self) -> &Replay {
        &self.replay
    }

    pub fn into_replay(self) -> Replay {
        self.replay
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string(&self.replay)?;
        fs::write(path, json)?;
        Ok(())
    }
}

impl Default for FrameRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchObserver for FrameRecorder {
    fn on_tick(&mut self, tick: Tick, frame: &GameFrame) {
        let entry = TickFrame {
            tick,
            frame: frame.clone(),
        };
        if tick % self.interval == 0 {
            self.replay.frames.push(entry);
            self.last = None;
        } else {
            self.last = Some(entry);
        }
    }

    fn on_end(&mut self, result: MatchResult, total_ticks: Tick) {
        if let Some(last) = self.last.take() {
            self.replay.frames.push(last);
        }
        self.replay.result = Some(result);
        self.replay.total_ticks = total_ticks;
    }
}

/// Runs a prepared engine to completion
#[derive(Debug)]
pub struct MatchDriver {
    match_id: MatchId,
    engine: TickEngine,
    result: Option<MatchResult>,
}

impl MatchDriver {
    pub fn new(engine: TickEngine) -> Self {
        Self {
            match_id: MatchId::new(),
            engine,
            result: None,
        }
    }

    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    pub fn engine(&self) -> &TickEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut TickEngine {
        &mut self.engine
    }

    pub fn result(&self) -> Option<MatchResult> {
        self.result
    }

    /// Step until the match resolves
    ///
    /// At least one tick always runs, even when the state was already
    /// terminal before the first step.
    pub fn run<O: MatchObserver>(&mut self, mut observer: O) -> Result<MatchResult> {
        tracing::info!(
            match_id = %self.match_id.0,
            teams = self.engine.state().teams.len(),
            budget = self.engine.state().tick_budget,
            "Match starting"
        );
        observer.on_start();

        let result = loop {
            let result = self.engine.step()?;
            let tick = self.engine.tick();
            let frame = self.engine.state().frame();
            tracing::trace!(tick, units_alive = frame.alive_unit_count(), "Frame ready");
            observer.on_tick(tick, &frame);
            if result.is_terminal() {
                break result;
            }
        };

        let total_ticks = self.engine.tick();
        self.result = Some(result);
        tracing::info!(
            match_id = %self.match_id.0,
            ?result,
            total_ticks,
            "Match finished"
        );
        observer.on_end(result, total_ticks);
        Ok(result)
    }

    /// Post-match record; `None` until [`run`](Self::run) has finished
    pub fn record(&self) -> Option<MatchRecord> {
        self.result
            .map(|result| MatchRecord::capture(self.match_id, self.engine.state(), result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::execution::MatchState;
    use crate::battle::grid::CollisionGrid;
    use crate::core::config::{MatchConfig, SandboxConfig, UnitConfig};
    use glam::Vec2;
    use std::sync::Arc;

    fn idle_match(budget: Tick) -> MatchDriver {
        let mut state = MatchState::new(Arc::new(CollisionGrid::new(10, 10, 1.0)), budget);
        for name in ["red", "blue"] {
            let id = state.add_team(name, "", SandboxConfig::default());
            let position = Vec2::new(2.0 + id.0 as f32 * 5.0, 2.0);
            state.teams[id.index()].spawn_unit(position, &UnitConfig::default());
        }
        MatchDriver::new(TickEngine::new(state, MatchConfig::default()))
    }

    #[derive(Default)]
    struct Counting {
        starts: u32,
        ticks: Vec<Tick>,
        end: Option<(MatchResult, Tick)>,
    }

    impl MatchObserver for Counting {
        fn on_start(&mut self) {
            self.starts += 1;
        }

        fn on_tick(&mut self, tick: Tick, _frame: &GameFrame) {
            self.ticks.push(tick);
        }

        fn on_end(&mut self, result: MatchResult, total_ticks: Tick) {
            self.end = Some((result, total_ticks));
        }
    }

    #[test]
    fn test_run_notifies_in_order() {
        let mut driver = idle_match(3);
        let mut observer = Counting::default();

        let result = driver.run(&mut observer).unwrap();
        assert_eq!(result, MatchResult::Draw);
        assert_eq!(observer.starts, 1);
        assert_eq!(observer.ticks, vec![1, 2, 3]);
        assert_eq!(observer.end, Some((MatchResult::Draw, 3)));
        assert_eq!(driver.result(), Some(MatchResult::Draw));
    }

    #[test]
    fn test_run_with_empty_observer() {
        let mut driver = idle_match(1);
        assert_eq!(driver.run(()).unwrap(), MatchResult::Draw);
        assert!(driver.record().is_some());
    }

    #[test]
    fn test_run_executes_one_tick_when_already_drawn() {
        let mut driver = idle_match(0);
        let mut observer = Counting::default();
        driver.run(&mut observer).unwrap();
        assert_eq!(observer.ticks, vec![1]);
        assert_eq!(observer.end, Some((MatchResult::Draw, 1)));
    }

    #[test]
    fn test_callbacks_are_optional() {
        let mut ends = 0;
        {
            let callbacks = Callbacks::new().on_end(|_, _| ends += 1);
            idle_match(2).run(callbacks).unwrap();
        }
        assert_eq!(ends, 1);
    }

    #[test]
    fn test_recorder_keeps_interval_and_final_frame() {
        let mut driver = idle_match(5);
        let mut recorder = FrameRecorder::every(2);
        driver.run(&mut recorder).unwrap();

        let ticks: Vec<Tick> = recorder.frames().iter().map(|f| f.tick).collect();
        assert_eq!(ticks, vec![2, 4, 5]);
        assert_eq!(recorder.replay().result, Some(MatchResult::Draw));
        assert_eq!(recorder.replay().total_ticks, 5);
    }

    #[test]
    fn test_recorder_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replay.json");
        let mut recorder = FrameRecorder::new();
        idle_match(1).run(&mut recorder).unwrap();
        recorder.write_json(&path).unwrap();

        let replay: Replay = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(replay.frames.len(), 1);
        assert_eq!(replay.frames[0].frame.teams.len(), 2);
    }
}
