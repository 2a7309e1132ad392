use crate::client::input::{self, KeyboardReader};
use crate::client::notify::ToastQueue;
use crate::client::scene::SceneSynchronizer;
use crate::client::surface::TerminalSurface;
use crate::telemetry::PerfGuard;
use crate::transport::{Connection, ConnectionEvent, IntentSender, Subscription};
use crossterm::event::Event;
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use std::io::{self, Stdout};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

const REDRAW_INTERVAL: Duration = Duration::from_millis(33);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("terminal error: {0}")]
    Terminal(#[from] io::Error),
}

pub type GameScene = SceneSynchronizer<TerminalSurface, ToastQueue>;

/// Drives one game session: connection lifecycle, inbound payloads, keyboard
/// and redraws, all handled one at a time on a single task.
pub struct GameClient {
    connection: Connection,
    sender: IntentSender,
    subscription: Option<Subscription>,
    scene: GameScene,
    render_enabled: bool,
    tui: Option<Terminal<CrosstermBackend<Stdout>>>,
    input_rx: Option<UnboundedReceiver<Event>>,
    keyboard: Option<KeyboardReader>,
    force_render: bool,
    connection_finished: bool,
}

impl GameClient {
    pub fn new(connection: Connection, surface: TerminalSurface, toasts: ToastQueue) -> Self {
        let sender = connection.sender();
        Self {
            connection,
            sender,
            subscription: None,
            scene: SceneSynchronizer::new(surface, toasts),
            render_enabled: true,
            tui: None,
            input_rx: None,
            keyboard: None,
            force_render: true,
            connection_finished: false,
        }
    }

    pub fn with_render(mut self, enabled: bool) -> Self {
        self.render_enabled = enabled;
        self
    }

    /// Feed terminal events from `rx` instead of reading the keyboard.
    pub fn with_input(mut self, rx: UnboundedReceiver<Event>) -> Self {
        self.input_rx = Some(rx);
        self
    }

    pub fn scene(&self) -> &GameScene {
        &self.scene
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Run until the user quits. Without a terminal UI the loop also ends
    /// once the connection is gone and every received payload was handled.
    pub async fn run(&mut self) -> Result<(), ClientError> {
        self.setup_tui()?;
        debug!(target: "gophertron::loop", render = self.render_enabled, "client loop started");

        let run_result = self.event_loop().await;

        let teardown_result = self.teardown_tui();
        debug!(target: "gophertron::loop", stats = ?self.scene.stats(), "client loop stopped");

        match (run_result, teardown_result) {
            (Err(err), _) => Err(err),
            (Ok(()), Err(err)) => Err(err),
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    async fn event_loop(&mut self) -> Result<(), ClientError> {
        let mut redraw = tokio::time::interval(REDRAW_INTERVAL);
        redraw.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut events_open = true;

        loop {
            if !self.render_enabled && self.connection_finished && self.subscription.is_none() {
                return Ok(());
            }

            tokio::select! {
                biased;
                event = self.connection.next_event(), if events_open => match event {
                    Some(event) => self.handle_connection_event(event),
                    None => {
                        events_open = false;
                        self.connection_finished = true;
                    }
                },
                payload = next_payload(&mut self.subscription), if self.subscription.is_some() => {
                    match payload {
                        Some(payload) => {
                            let outcome = self.scene.handle_message(&payload);
                            trace!(target: "gophertron::loop", ?outcome, "payload handled");
                        }
                        None => {
                            debug!(target: "gophertron::loop", "message stream ended");
                            self.subscription = None;
                        }
                    }
                },
                event = next_input(&mut self.input_rx), if self.input_rx.is_some() => match event {
                    Some(event) => {
                        if self.handle_input(event) {
                            return Ok(());
                        }
                    }
                    None => self.input_rx = None,
                },
                _ = redraw.tick(), if self.render_enabled => self.maybe_render()?,
                _ = &mut ctrl_c => {
                    debug!(target: "gophertron::loop", "interrupt received");
                    return Ok(());
                }
            }
        }
    }

    fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Opened => {
                match self.connection.subscribe() {
                    Ok(subscription) => self.subscription = Some(subscription),
                    Err(err) => {
                        warn!(target: "gophertron::loop", error = %err, "subscription refused")
                    }
                }
                self.scene.on_open();
                self.force_render = true;
            }
            ConnectionEvent::Closed { code, reason } => {
                info!(target: "gophertron::loop", ?code, %reason, "server closed the game connection");
                self.connection_finished = true;
            }
            ConnectionEvent::Errored(error) => {
                warn!(target: "gophertron::loop", %error, "game connection failed");
                self.connection_finished = true;
            }
        }
    }

    /// Returns true when the user asked to quit.
    fn handle_input(&mut self, event: Event) -> bool {
        match event {
            Event::Key(key) => {
                if input::is_quit_key(&key) {
                    debug!(target: "gophertron::input", "quit requested");
                    return true;
                }
                self.scene.handle_key(&key, &self.sender);
            }
            Event::Resize(cols, rows) => {
                trace!(target: "gophertron::input", cols, rows, "terminal resized");
                self.force_render = true;
            }
            _ => {}
        }
        false
    }

    fn maybe_render(&mut self) -> Result<(), ClientError> {
        let now = Instant::now();
        let dirty = self.scene.canvas_mut().take_dirty();
        let toasts_changed = self.scene.notifier_mut().prune(now);
        let toasts_live = !self.scene.notifier().is_empty();
        if self.force_render || dirty || toasts_changed || toasts_live {
            self.force_render = false;
            self.render(now)?;
        }
        Ok(())
    }

    fn render(&mut self, now: Instant) -> Result<(), ClientError> {
        let Some(tui) = self.tui.as_mut() else {
            return Ok(());
        };
        let _guard = PerfGuard::new("client_render_tui");
        let scene = &self.scene;
        tui.draw(|frame| {
            let area = frame.area();
            frame.render_widget(scene.canvas(), area);
            let inner = Rect::new(
                area.x + 1,
                area.y + 1,
                area.width.saturating_sub(2),
                area.height.saturating_sub(2),
            );
            scene.notifier().render(frame, inner, now);
        })?;
        Ok(())
    }

    fn setup_tui(&mut self) -> Result<(), ClientError> {
        if !self.render_enabled {
            return Ok(());
        }
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.hide_cursor().ok();
        terminal.clear()?;
        self.tui = Some(terminal);
        if self.input_rx.is_none() {
            let (reader, rx) = KeyboardReader::spawn();
            self.keyboard = Some(reader);
            self.input_rx = Some(rx);
        }
        self.force_render = true;
        Ok(())
    }

    fn teardown_tui(&mut self) -> Result<(), ClientError> {
        if let Some(mut reader) = self.keyboard.take() {
            reader.stop();
        }
        if !self.render_enabled {
            return Ok(());
        }
        if let Some(mut terminal) = self.tui.take() {
            terminal.show_cursor().ok();
            terminal.clear()?;
        }
        disable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, LeaveAlternateScreen)?;
        Ok(())
    }
}

async fn next_payload(subscription: &mut Option<Subscription>) -> Option<String> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_input(rx: &mut Option<UnboundedReceiver<Event>>) -> Option<Event> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
