use crate::protocol::Direction;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Arrow keys steer; everything else is ignored by the game.
pub fn direction_for_key(key: &KeyEvent) -> Option<Direction> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    match key.code {
        KeyCode::Up => Some(Direction::Up),
        KeyCode::Down => Some(Direction::Down),
        KeyCode::Left => Some(Direction::Left),
        KeyCode::Right => Some(Direction::Right),
        _ => None,
    }
}

/// Esc or Ctrl+C leaves the client.
pub fn is_quit_key(key: &KeyEvent) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    match key.code {
        KeyCode::Esc => true,
        KeyCode::Char('c') | KeyCode::Char('C') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

/// Background thread that forwards terminal events into the async loop.
///
/// crossterm's reader blocks, so it runs on its own OS thread and polls with a
/// short timeout to notice shutdown.
pub struct KeyboardReader {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl KeyboardReader {
    pub fn spawn() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let handle = match thread::Builder::new()
            .name("gophertron-input".into())
            .spawn(move || read_events(flag, tx))
        {
            Ok(handle) => Some(handle),
            Err(err) => {
                debug!(target: "gophertron::input", error = %err, "input thread failed to start");
                None
            }
        };
        (Self { shutdown, handle }, rx)
    }

    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for KeyboardReader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_events(shutdown: Arc<AtomicBool>, tx: mpsc::UnboundedSender<Event>) {
    while !shutdown.load(Ordering::SeqCst) {
        match event::poll(POLL_INTERVAL) {
            Ok(true) => match event::read() {
                Ok(event) => {
                    trace!(target: "gophertron::input", ?event, "terminal event");
                    if tx.send(event).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    debug!(target: "gophertron::input", error = %err, "input read error");
                    break;
                }
            },
            Ok(false) => {}
            Err(err) => {
                debug!(target: "gophertron::input", error = %err, "input poll error");
                break;
            }
        }
    }
}
