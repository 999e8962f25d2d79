//! Boundary to an external chart-timing engine.
//!
//! The engine itself (chart parsing, note timing, judgement) lives outside
//! this workspace behind [`ChartEngine`]. What lives here is the typed view of
//! its JSON state and a [`GameSession`] that feeds it audio time and queued
//! player actions.
//!
//! # Invariants
//! - A session releases its engine handle exactly once, explicitly or on drop.
//! - Each `update` consumes at most one queued action, oldest first.
//! - Parse and init failures reach the caller; nothing is swallowed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;

#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    #[error("chart parse failed: {0}")]
    Parse(String),

    #[error("engine init failed: {0}")]
    Init(String),

    #[error("engine update failed: {0}")]
    Advance(String),

    #[error("malformed engine state: {0}")]
    State(#[from] serde_json::Error),

    #[error("session already released")]
    Released,
}

/// A parsed chart as the engine reports it. Only the header offset is read
/// here; everything else is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    #[serde(default)]
    pub header: ChartHeader,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartHeader {
    /// Seconds added to the audio clock before it reaches the engine.
    #[serde(default)]
    pub offset: f64,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl Chart {
    pub fn from_json(json: &str) -> Result<Self, ChartError> {
        serde_json::from_str(json).map_err(|e| ChartError::Parse(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, ChartError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Engine state after one update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub current_combo: u32,
    pub display: Vec<DisplayNote>,
    pub finished: bool,
    pub gauge: f64,
    /// Engine-defined; passed through as-is.
    pub judgement: Value,
    pub max_combo: u32,
    pub score: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayNote {
    pub idx: i64,
    pub inner: NoteInner,
    pub visible_start: f64,
    pub visible_end: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteInner {
    pub duration: f64,
    pub speed: f64,
    pub start: f64,
    #[serde(rename = "type")]
    pub kind: String,
    pub variant: String,
    pub volume: f64,
}

/// The external engine. Implementations wrap whatever runtime hosts it.
pub trait ChartEngine {
    type Handle;

    fn parse_chart(&mut self, text: &str) -> Result<Chart, ChartError>;

    fn init(&mut self, chart: &Chart, difficulty: u32) -> Result<Self::Handle, ChartError>;

    /// Step to `time` seconds, optionally applying one action. Returns the
    /// state as JSON.
    fn advance(&mut self, handle: &mut Self::Handle, time: f64, action: Option<u32>) -> Result<String, ChartError>;

    fn release(&mut self, handle: Self::Handle);
}

/// One play-through of a chart.
pub struct GameSession<E: ChartEngine> {
    engine: E,
    handle: Option<E::Handle>,
    actions: VecDeque<u32>,
    offset: f64,
}

impl<E: ChartEngine> GameSession<E> {
    pub fn start(mut engine: E, chart: &Chart, difficulty: u32) -> Result<Self, ChartError> {
        let handle = engine.init(chart, difficulty)?;
        tracing::debug!(difficulty, offset = chart.header.offset, "game session started");
        Ok(Self {
            engine,
            handle: Some(handle),
            actions: VecDeque::new(),
            offset: chart.header.offset,
        })
    }

    /// Parse `text` with `engine` and start at `difficulty`.
    pub fn load(mut engine: E, text: &str, difficulty: u32) -> Result<Self, ChartError> {
        let chart = engine.parse_chart(text)?;
        Self::start(engine, &chart, difficulty)
    }

    pub fn push_action(&mut self, code: u32) {
        self.actions.push_back(code);
    }

    pub fn pending_actions(&self) -> usize {
        self.actions.len()
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn is_released(&self) -> bool {
        self.handle.is_none()
    }

    /// Advance to `audio_time` (seconds), applying the oldest queued action.
    pub fn update(&mut self, audio_time: f64) -> Result<GameState, ChartError> {
        let handle = self.handle.as_mut().ok_or(ChartError::Released)?;
        let time = audio_time + self.offset;
        let action = self.actions.pop_front();
        let json = self.engine.advance(handle, time, action)?;
        let state: GameState = serde_json::from_str(&json)?;
        if let Some(action) = action {
            tracing::debug!(time, action, score = state.score, combo = state.current_combo, "action applied");
        }
        Ok(state)
    }

    /// Hand the engine handle back. Later calls do nothing.
    pub fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.engine.release(handle);
            tracing::debug!("game session released");
        }
    }
}

impl<E: ChartEngine> Drop for GameSession<E> {
    fn drop(&mut self) {
        self.release();
    }
}

pub fn crate_info() -> &'static str {
    "kiln-chart v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("chart"));
    }

    #[derive(Default)]
    struct FakeEngine {
        releases: Rc<Cell<u32>>,
        fail_init: bool,
    }

    impl ChartEngine for FakeEngine {
        type Handle = u32;

        fn parse_chart(&mut self, text: &str) -> Result<Chart, ChartError> {
            Chart::from_json(text)
        }

        fn init(&mut self, _chart: &Chart, difficulty: u32) -> Result<u32, ChartError> {
            if self.fail_init {
                return Err(ChartError::Init("no such course".into()));
            }
            Ok(difficulty)
        }

        fn advance(&mut self, _handle: &mut u32, time: f64, action: Option<u32>) -> Result<String, ChartError> {
            Ok(json!({
                "current_combo": action.map_or(0, |_| 1),
                "display": [{
                    "idx": 0,
                    "inner": {
                        "duration": 0.0, "speed": 1.0, "start": 2.0,
                        "type": "don", "variant": "small", "volume": 1.0
                    },
                    "visible_start": 1.0,
                    "visible_end": 2.5
                }],
                "finished": false,
                "gauge": 0.5,
                "judgement": { "time": time, "action": action },
                "max_combo": 1,
                "score": 100
            })
            .to_string())
        }

        fn release(&mut self, _handle: u32) {
            self.releases.set(self.releases.get() + 1);
        }
    }

    const CHART: &str = r#"{"header":{"offset":0.25,"title":"x"},"courses":[]}"#;

    #[test]
    fn chart_keeps_unknown_fields() {
        let chart = Chart::from_json(CHART).unwrap();
        assert_eq!(chart.header.offset, 0.25);
        assert_eq!(chart.header.rest["title"], "x");
        assert!(chart.rest.contains_key("courses"));
        let back: Value = serde_json::from_str(&chart.to_json().unwrap()).unwrap();
        assert_eq!(back, serde_json::from_str::<Value>(CHART).unwrap());
    }

    #[test]
    fn missing_header_means_zero_offset() {
        let chart = Chart::from_json("{}").unwrap();
        assert_eq!(chart.header.offset, 0.0);
    }

    #[test]
    fn state_shape_round_trips() {
        let mut engine = FakeEngine::default();
        let json = engine.advance(&mut 0, 1.0, Some(2)).unwrap();
        let state: GameState = serde_json::from_str(&json).unwrap();
        assert_eq!(state.display[0].inner.kind, "don");
        let back = serde_json::to_value(&state).unwrap();
        assert_eq!(back, serde_json::from_str::<Value>(&json).unwrap());
    }

    #[test]
    fn one_action_per_update_with_offset() {
        let mut session = GameSession::load(FakeEngine::default(), CHART, 3).unwrap();
        session.push_action(1);
        session.push_action(2);

        let first = session.update(1.0).unwrap();
        assert_eq!(first.judgement, json!({ "time": 1.25, "action": 1 }));
        assert_eq!(session.pending_actions(), 1);

        let second = session.update(2.0).unwrap();
        assert_eq!(second.judgement["action"], 2);
        let third = session.update(3.0).unwrap();
        assert_eq!(third.judgement["action"], Value::Null);
        assert_eq!(third.current_combo, 0);
    }

    #[test]
    fn released_exactly_once() {
        let engine = FakeEngine::default();
        let releases = Rc::clone(&engine.releases);
        let mut session = GameSession::load(engine, CHART, 0).unwrap();
        session.release();
        session.release();
        assert!(session.is_released());
        assert!(matches!(session.update(0.0), Err(ChartError::Released)));
        drop(session);
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn drop_releases() {
        let engine = FakeEngine::default();
        let releases = Rc::clone(&engine.releases);
        drop(GameSession::load(engine, CHART, 0).unwrap());
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn failures_reach_the_caller() {
        let parse = GameSession::load(FakeEngine::default(), "not json", 0);
        assert!(matches!(parse, Err(ChartError::Parse(_))));

        let engine = FakeEngine {
            fail_init: true,
            ..FakeEngine::default()
        };
        let releases = Rc::clone(&engine.releases);
        assert!(matches!(GameSession::load(engine, CHART, 0), Err(ChartError::Init(_))));
        assert_eq!(releases.get(), 0);
    }
}
