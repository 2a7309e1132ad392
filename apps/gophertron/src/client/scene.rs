//! Keeps the drawing surface in step with the server.
//!
//! Every inbound payload is either a control token, which only raises a
//! notification, or a snapshot, which replaces the whole picture. Arrow keys
//! become move intents once the connection is open.

use crate::client::canvas::Canvas;
use crate::client::input;
use crate::client::notify::{Notifier, Severity};
use crate::protocol::{self, ControlToken, Direction, Inbound, Intent, Snapshot, WireError};
use crate::telemetry::PerfGuard;
use crate::transport::IntentSink;
use crossterm::event::KeyEvent;
use tracing::{debug, trace, warn};

pub const LINE_WIDTH: f64 = 10.0;
/// Server grid units to surface pixels.
pub const SCALE: f64 = 10.0;

pub const PLACEHOLDER_TEXT: &str = "Waiting for players";
pub const PLACEHOLDER_POSITION: (f64, f64) = (10.0, 50.0);

pub const COUNTDOWN_MESSAGE: &str = "Game starting in 5 seconds";
pub const VICTORY_MESSAGE: &str = "You won!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Disconnected,
    ConnectedIdle,
    ConnectedActive,
    PhaseTransition,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceneStats {
    pub snapshots: u64,
    pub control_tokens: u64,
    pub malformed: u64,
    pub intents_sent: u64,
    pub intents_dropped: u64,
}

/// What became of one inbound payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Notified(ControlToken),
    Rendered { entities: usize },
    Malformed,
    Ignored,
}

pub struct SceneSynchronizer<C, N> {
    canvas: C,
    notifier: N,
    state: SyncState,
    keys_armed: bool,
    stats: SceneStats,
}

impl<C: Canvas, N: Notifier> SceneSynchronizer<C, N> {
    pub fn new(canvas: C, notifier: N) -> Self {
        let mut scene = Self {
            canvas,
            notifier,
            state: SyncState::Disconnected,
            keys_armed: false,
            stats: SceneStats::default(),
        };
        scene.draw_placeholder();
        scene
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn stats(&self) -> SceneStats {
        self.stats
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    pub fn canvas_mut(&mut self) -> &mut C {
        &mut self.canvas
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut N {
        &mut self.notifier
    }

    fn draw_placeholder(&mut self) {
        let (x, y) = PLACEHOLDER_POSITION;
        self.canvas.clear();
        self.canvas.fill_text(PLACEHOLDER_TEXT, x, y);
    }

    /// The connection reached the open state: start listening and arm keys.
    pub fn on_open(&mut self) {
        if self.state == SyncState::Disconnected {
            self.state = SyncState::ConnectedIdle;
        }
        self.keys_armed = true;
        debug!(target: "gophertron::scene", "connection open; keyboard armed");
    }

    pub fn handle_message(&mut self, payload: &str) -> MessageOutcome {
        if self.state == SyncState::Disconnected {
            trace!(target: "gophertron::scene", bytes = payload.len(), "payload before open ignored");
            return MessageOutcome::Ignored;
        }

        match protocol::classify(payload) {
            Ok(Inbound::Control(token)) => {
                self.handle_control(token);
                MessageOutcome::Notified(token)
            }
            Ok(Inbound::Snapshot(snapshot)) => {
                self.render(&snapshot);
                self.state = SyncState::ConnectedActive;
                MessageOutcome::Rendered {
                    entities: snapshot.len(),
                }
            }
            Err(err) => {
                self.stats.malformed += 1;
                log_malformed(&err, payload);
                MessageOutcome::Malformed
            }
        }
    }

    fn handle_control(&mut self, token: ControlToken) {
        let resume = self.state;
        self.state = SyncState::PhaseTransition;
        self.stats.control_tokens += 1;
        debug!(target: "gophertron::scene", token = token.as_str(), "control token");
        match token {
            ControlToken::Countdown => self.notifier.notify(Severity::Info, COUNTDOWN_MESSAGE),
            ControlToken::Victory => self.notifier.notify(Severity::Success, VICTORY_MESSAGE),
        }
        self.state = resume;
    }

    /// Replace the picture with `snapshot`.
    pub fn render(&mut self, snapshot: &Snapshot) {
        let _guard = PerfGuard::new("scene_render");
        self.canvas.clear();
        self.canvas.begin_path();
        self.canvas.set_line_width(LINE_WIDTH);
        for (id, entity) in snapshot.iter() {
            let Some(origin) = entity.origin() else {
                trace!(target: "gophertron::scene", id, "entity without trail skipped");
                continue;
            };
            self.canvas.move_to(origin.x * SCALE, origin.y * SCALE);
            // Without a color the previous stroke color carries over.
            if let Some(color) = entity.color.as_deref() {
                self.canvas.set_stroke_color(color);
            }
            for point in &entity.coordinate {
                self.canvas.line_to(point.x * SCALE, point.y * SCALE);
            }
            self.canvas.stroke();
        }
        self.stats.snapshots += 1;
        trace!(target: "gophertron::scene", entities = snapshot.len(), "snapshot rendered");
    }

    /// Map an arrow key to a move intent. Any other key is ignored.
    pub fn handle_key(&mut self, key: &KeyEvent, sink: &dyn IntentSink) -> bool {
        match input::direction_for_key(key) {
            Some(direction) => self.handle_direction(direction, sink),
            None => false,
        }
    }

    /// Send a move intent for `direction` if the keyboard is armed.
    /// Returns whether an intent was handed to the connection.
    pub fn handle_direction(&mut self, direction: Direction, sink: &dyn IntentSink) -> bool {
        if !self.keys_armed {
            trace!(target: "gophertron::scene", %direction, "key before open ignored");
            return false;
        }
        match sink.send_intent(&Intent::move_to(direction)) {
            Ok(()) => {
                self.stats.intents_sent += 1;
                true
            }
            Err(err) => {
                self.stats.intents_dropped += 1;
                debug!(target: "gophertron::scene", %direction, error = %err, "intent dropped");
                false
            }
        }
    }
}

fn log_malformed(err: &WireError, payload: &str) {
    const PREVIEW: usize = 64;
    let preview: String = payload.chars().take(PREVIEW).collect();
    warn!(target: "gophertron::scene", error = %err, payload = %preview, "malformed payload skipped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::canvas::{DrawOp, RecordingCanvas};
    use crate::client::surface::TerminalSurface;
    use crate::transport::SendError;
    use crate::transport::websocket::ConnectionState;
    use ratatui::style::Color;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingNotifier {
        seen: Vec<(Severity, String)>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&mut self, severity: Severity, message: &str) {
            self.seen.push((severity, message.to_string()));
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        open: bool,
        sent: RefCell<Vec<Intent>>,
    }

    impl IntentSink for RecordingSink {
        fn send_intent(&self, intent: &Intent) -> Result<(), SendError> {
            if !self.open {
                return Err(SendError::NotOpen(ConnectionState::Connecting));
            }
            self.sent.borrow_mut().push(*intent);
            Ok(())
        }
    }

    fn open_scene() -> SceneSynchronizer<RecordingCanvas, RecordingNotifier> {
        let mut scene = SceneSynchronizer::new(RecordingCanvas::new(), RecordingNotifier::default());
        scene.on_open();
        scene.canvas_mut().take_ops();
        scene
    }

    fn is_clear(op: &DrawOp) -> bool {
        matches!(op, DrawOp::Clear)
    }

    #[test_timeout::timeout]
    fn starts_with_placeholder() {
        let scene = SceneSynchronizer::new(RecordingCanvas::new(), RecordingNotifier::default());
        assert_eq!(scene.state(), SyncState::Disconnected);
        assert_eq!(
            scene.canvas().ops(),
            &[
                DrawOp::Clear,
                DrawOp::FillText {
                    text: PLACEHOLDER_TEXT.into(),
                    x: 10.0,
                    y: 50.0,
                },
            ]
        );
    }

    #[test_timeout::timeout]
    fn single_entity_draw_sequence() {
        let mut scene = open_scene();
        let outcome = scene.handle_message(
            r#"{"p1":{"coordinate":[{"X":1,"Y":1},{"X":2,"Y":2}],"color":"red"}}"#,
        );
        assert_eq!(outcome, MessageOutcome::Rendered { entities: 1 });
        assert_eq!(
            scene.canvas().ops(),
            &[
                DrawOp::Clear,
                DrawOp::BeginPath,
                DrawOp::LineWidth(10.0),
                DrawOp::MoveTo { x: 10.0, y: 10.0 },
                DrawOp::StrokeColor("red".into()),
                DrawOp::LineTo { x: 10.0, y: 10.0 },
                DrawOp::LineTo { x: 20.0, y: 20.0 },
                DrawOp::Stroke,
            ]
        );
        assert_eq!(scene.state(), SyncState::ConnectedActive);
    }

    #[test_timeout::timeout]
    fn every_entity_gets_its_own_stroke() {
        let mut scene = open_scene();
        scene.handle_message(
            r##"{"0":{"coordinate":[{"X":25,"Y":0},{"X":25,"Y":1},{"X":25,"Y":2}],"color":"#b71c1c"},
                 "1":{"coordinate":[{"X":0,"Y":25}],"color":"#880E4F"},
                 "2":{"coordinate":null,"color":"#4A148C"}}"##,
        );
        let canvas = scene.canvas();
        assert_eq!(canvas.count(is_clear), 1);
        assert_eq!(canvas.count(|op| matches!(op, DrawOp::MoveTo { .. })), 2);
        assert_eq!(canvas.count(|op| matches!(op, DrawOp::LineTo { .. })), 4);
        assert_eq!(canvas.count(|op| matches!(op, DrawOp::Stroke)), 2);
        let colors: Vec<&str> = canvas
            .ops()
            .iter()
            .filter_map(|op| match op {
                DrawOp::StrokeColor(color) => Some(color.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(colors, vec!["#b71c1c", "#880E4F"]);
    }

    #[test_timeout::timeout]
    fn same_snapshot_draws_identically() {
        let payload = r#"{"a":{"coordinate":[{"X":3,"Y":4},{"X":3,"Y":5}],"color":"blue"},
                          "b":{"coordinate":[{"X":9,"Y":9}],"color":"green"}}"#;
        let mut scene = open_scene();
        scene.handle_message(payload);
        let first = scene.canvas_mut().take_ops();
        scene.handle_message(payload);
        let second = scene.canvas_mut().take_ops();
        assert_eq!(first, second);
        assert_eq!(scene.stats().snapshots, 2);
    }

    #[test_timeout::timeout]
    fn control_tokens_notify_without_redraw() {
        let mut scene = open_scene();
        assert_eq!(
            scene.handle_message("countdown"),
            MessageOutcome::Notified(ControlToken::Countdown)
        );
        assert_eq!(
            scene.handle_message("victory"),
            MessageOutcome::Notified(ControlToken::Victory)
        );
        assert!(scene.canvas().ops().is_empty());
        assert_eq!(
            scene.notifier().seen,
            vec![
                (Severity::Info, COUNTDOWN_MESSAGE.to_string()),
                (Severity::Success, VICTORY_MESSAGE.to_string()),
            ]
        );
        assert_eq!(scene.state(), SyncState::ConnectedIdle);
        assert_eq!(scene.stats().control_tokens, 2);
    }

    #[test_timeout::timeout]
    fn control_token_keeps_active_state() {
        let mut scene = open_scene();
        scene.handle_message(r#"{}"#);
        scene.handle_message("countdown");
        assert_eq!(scene.state(), SyncState::ConnectedActive);
    }

    #[test_timeout::timeout]
    fn malformed_payload_is_skipped() {
        let mut scene = open_scene();
        assert_eq!(
            scene.handle_message(r#"{"p1":{"coordinate":[{"X":1"#),
            MessageOutcome::Malformed
        );
        assert!(scene.canvas().ops().is_empty());
        assert!(scene.notifier().seen.is_empty());

        let outcome = scene.handle_message(
            r#"{"p1":{"coordinate":[{"X":1,"Y":1}],"color":"red"}}"#,
        );
        assert_eq!(outcome, MessageOutcome::Rendered { entities: 1 });
        assert_eq!(scene.canvas().count(is_clear), 1);
        assert_eq!(scene.stats().malformed, 1);
        assert_eq!(scene.stats().snapshots, 1);
    }

    #[test_timeout::timeout]
    fn bad_entity_does_not_hide_good_ones() {
        let mut scene = open_scene();
        let outcome = scene.handle_message(
            r#"{"a":{"coordinate":[{"X":1,"Y":1},{"X":2,"Y":2}],"color":"red"},
                "b":{"coordinate":[{"X":"x","Y":1}],"color":"blue"}}"#,
        );
        assert_eq!(outcome, MessageOutcome::Rendered { entities: 2 });
        assert_eq!(scene.stats().malformed, 0);

        let ops = scene.canvas().ops();
        assert_eq!(
            &ops[..8],
            &[
                DrawOp::Clear,
                DrawOp::BeginPath,
                DrawOp::LineWidth(10.0),
                DrawOp::MoveTo { x: 10.0, y: 10.0 },
                DrawOp::StrokeColor("red".into()),
                DrawOp::LineTo { x: 10.0, y: 10.0 },
                DrawOp::LineTo { x: 20.0, y: 20.0 },
                DrawOp::Stroke,
            ]
        );
        // The unreadable X still reaches the surface, as NaN.
        assert!(matches!(ops[8], DrawOp::MoveTo { x, y } if x.is_nan() && y == 10.0));
        assert_eq!(ops[9], DrawOp::StrokeColor("blue".into()));
        assert!(matches!(ops[10], DrawOp::LineTo { x, .. } if x.is_nan()));
        assert_eq!(ops[11], DrawOp::Stroke);
    }

    #[test_timeout::timeout]
    fn bad_points_draw_nothing_on_the_terminal_surface() {
        let mut scene = SceneSynchronizer::new(TerminalSurface::default(), RecordingNotifier::default());
        scene.on_open();
        scene.handle_message(
            r#"{"a":{"coordinate":[{"X":1,"Y":1},{"X":2,"Y":2}],"color":"red"},
                "b":{"coordinate":[{"X":"x","Y":1},{"Y":3}],"color":"blue"}}"#,
        );
        let segments = scene.canvas().segments();
        assert_eq!(segments.len(), 2);
        assert!(segments.iter().all(|s| s.color == Color::Red));
        assert_eq!(segments[1].to, (20.0, 20.0));
        assert!(scene.canvas().labels().is_empty());
    }

    #[test_timeout::timeout]
    fn missing_color_keeps_the_previous_stroke_color() {
        let mut scene = open_scene();
        let outcome = scene.handle_message(r#"{"a":{"coordinate":[{"X":1,"Y":1}]}}"#);
        assert_eq!(outcome, MessageOutcome::Rendered { entities: 1 });
        assert_eq!(
            scene.canvas().ops(),
            &[
                DrawOp::Clear,
                DrawOp::BeginPath,
                DrawOp::LineWidth(10.0),
                DrawOp::MoveTo { x: 10.0, y: 10.0 },
                DrawOp::LineTo { x: 10.0, y: 10.0 },
                DrawOp::Stroke,
            ]
        );

        let mut scene = SceneSynchronizer::new(TerminalSurface::default(), RecordingNotifier::default());
        scene.on_open();
        scene.handle_message(
            r#"{"a":{"coordinate":[{"X":1,"Y":1},{"X":1,"Y":2}],"color":"green"},
                "b":{"coordinate":[{"X":5,"Y":5},{"X":6,"Y":5}]}}"#,
        );
        let colors: Vec<Color> = scene.canvas().segments().iter().map(|s| s.color).collect();
        assert_eq!(colors, vec![Color::Green; 4]);
    }

    #[test_timeout::timeout]
    fn empty_snapshot_only_clears() {
        let mut scene = open_scene();
        scene.handle_message("{}");
        assert_eq!(
            scene.canvas().ops(),
            &[DrawOp::Clear, DrawOp::BeginPath, DrawOp::LineWidth(10.0)]
        );
    }

    #[test_timeout::timeout]
    fn nothing_is_processed_before_open() {
        let mut scene = SceneSynchronizer::new(RecordingCanvas::new(), RecordingNotifier::default());
        scene.canvas_mut().take_ops();
        assert_eq!(scene.handle_message("countdown"), MessageOutcome::Ignored);
        assert!(scene.notifier().seen.is_empty());

        let sink = RecordingSink {
            open: true,
            ..RecordingSink::default()
        };
        assert!(!scene.handle_direction(Direction::Up, &sink));
        assert!(sink.sent.borrow().is_empty());
        assert!(scene.canvas().ops().is_empty());
    }

    #[test_timeout::timeout]
    fn each_arrow_sends_one_intent() {
        let mut scene = open_scene();
        let sink = RecordingSink {
            open: true,
            ..RecordingSink::default()
        };
        for direction in [
            Direction::Up,
            Direction::Down,
            Direction::Left,
            Direction::Right,
            Direction::Up,
        ] {
            assert!(scene.handle_direction(direction, &sink));
        }
        let params: Vec<Direction> = sink.sent.borrow().iter().map(|i| i.param).collect();
        assert_eq!(
            params,
            vec![
                Direction::Up,
                Direction::Down,
                Direction::Left,
                Direction::Right,
                Direction::Up,
            ]
        );
        assert_eq!(scene.stats().intents_sent, 5);
    }

    #[test_timeout::timeout]
    fn unmapped_keys_send_nothing() {
        use crossterm::event::{KeyCode, KeyModifiers};

        let mut scene = open_scene();
        let sink = RecordingSink {
            open: true,
            ..RecordingSink::default()
        };
        for code in [KeyCode::Char('w'), KeyCode::Enter, KeyCode::Tab, KeyCode::Home] {
            assert!(!scene.handle_key(&KeyEvent::new(code, KeyModifiers::NONE), &sink));
        }
        assert!(sink.sent.borrow().is_empty());

        assert!(scene.handle_key(&KeyEvent::new(KeyCode::Right, KeyModifiers::NONE), &sink));
        assert_eq!(*sink.sent.borrow(), vec![Intent::move_to(Direction::Right)]);
    }

    #[test_timeout::timeout]
    fn refused_sends_are_counted_not_raised() {
        let mut scene = open_scene();
        let sink = RecordingSink::default();
        assert!(!scene.handle_direction(Direction::Left, &sink));
        assert_eq!(scene.stats().intents_dropped, 1);
    }
}
