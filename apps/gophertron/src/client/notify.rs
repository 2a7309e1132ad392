//! Transient toast notifications.
//!
//! A toast fades in over `show_duration`, stays for `timeout`, then fades
//! out over `hide_duration`. Timing is cosmetic; nothing in the client waits
//! on it.

use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::info;

const TOAST_WIDTH: u16 = 36;
const TOAST_HEIGHT: u16 = 3;
const HISTORY_LIMIT: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }

    fn color(self) -> Color {
        match self {
            Severity::Info => Color::Cyan,
            Severity::Success => Color::Green,
            Severity::Warning => Color::Yellow,
            Severity::Error => Color::Red,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait Notifier {
    fn notify(&mut self, severity: Severity, message: &str);
}

#[derive(Debug, Clone)]
pub struct ToastOptions {
    pub show_duration: Duration,
    pub hide_duration: Duration,
    pub timeout: Duration,
    pub newest_on_top: bool,
    pub prevent_duplicates: bool,
    pub max_visible: usize,
    /// Print every notification to stdout (used when no terminal UI runs).
    pub echo_stdout: bool,
}

impl Default for ToastOptions {
    fn default() -> Self {
        Self {
            show_duration: Duration::from_millis(300),
            hide_duration: Duration::from_millis(1000),
            timeout: Duration::from_millis(5000),
            newest_on_top: false,
            prevent_duplicates: false,
            max_visible: 4,
            echo_stdout: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastPhase {
    FadingIn,
    Visible,
    FadingOut,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub severity: Severity,
    pub message: String,
    pub created_at: Instant,
}

impl Toast {
    pub fn phase(&self, options: &ToastOptions, now: Instant) -> ToastPhase {
        let age = now.saturating_duration_since(self.created_at);
        let shown = options.show_duration;
        let visible_until = shown + options.timeout;
        let gone_at = visible_until + options.hide_duration;
        if age < shown {
            ToastPhase::FadingIn
        } else if age < visible_until {
            ToastPhase::Visible
        } else if age < gone_at {
            ToastPhase::FadingOut
        } else {
            ToastPhase::Expired
        }
    }
}

/// Notifier that keeps toasts on screen until they expire.
#[derive(Debug)]
pub struct ToastQueue {
    options: ToastOptions,
    toasts: VecDeque<Toast>,
    history: Vec<(Severity, String)>,
}

impl ToastQueue {
    pub fn new(options: ToastOptions) -> Self {
        Self {
            options,
            toasts: VecDeque::new(),
            history: Vec::new(),
        }
    }

    /// The most recent notifications accepted, oldest first.
    pub fn history(&self) -> &[(Severity, String)] {
        &self.history
    }

    pub fn notify_at(&mut self, severity: Severity, message: &str, now: Instant) {
        self.prune(now);
        if self.options.prevent_duplicates
            && self
                .toasts
                .iter()
                .any(|toast| toast.severity == severity && toast.message == message)
        {
            return;
        }

        info!(target: "gophertron::toast", %severity, message, "notification");
        if self.options.echo_stdout {
            println!("[{severity}] {message}");
        }

        let toast = Toast {
            severity,
            message: message.to_string(),
            created_at: now,
        };
        if self.history.len() == HISTORY_LIMIT {
            self.history.remove(0);
        }
        self.history.push((severity, toast.message.clone()));
        self.toasts.push_back(toast);
        while self.toasts.len() > self.options.max_visible.max(1) {
            self.toasts.pop_front();
        }
    }

    /// Drop expired toasts. Returns whether anything was removed.
    pub fn prune(&mut self, now: Instant) -> bool {
        let before = self.toasts.len();
        let options = &self.options;
        self.toasts
            .retain(|toast| toast.phase(options, now) != ToastPhase::Expired);
        before != self.toasts.len()
    }

    /// Live toasts in display order.
    pub fn visible(&self, now: Instant) -> Vec<(&Toast, ToastPhase)> {
        let mut visible: Vec<_> = self
            .toasts
            .iter()
            .map(|toast| (toast, toast.phase(&self.options, now)))
            .filter(|(_, phase)| *phase != ToastPhase::Expired)
            .collect();
        if self.options.newest_on_top {
            visible.reverse();
        }
        visible
    }

    pub fn is_empty(&self) -> bool {
        self.toasts.is_empty()
    }

    /// Stack live toasts in the top-right corner of `area`.
    pub fn render(&self, frame: &mut Frame<'_>, area: Rect, now: Instant) {
        let width = TOAST_WIDTH.min(area.width);
        if width == 0 {
            return;
        }
        let x = area.right().saturating_sub(width);
        let mut y = area.top();
        for (toast, phase) in self.visible(now) {
            if y + TOAST_HEIGHT > area.bottom() {
                break;
            }
            let mut style = Style::default().fg(toast.severity.color());
            if matches!(phase, ToastPhase::FadingIn | ToastPhase::FadingOut) {
                style = style.add_modifier(Modifier::DIM);
            }
            let slot = Rect::new(x, y, width, TOAST_HEIGHT);
            let body = Paragraph::new(Line::from(toast.message.as_str())).style(style).block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(style)
                    .title(toast.severity.as_str()),
            );
            frame.render_widget(Clear, slot);
            frame.render_widget(body, slot);
            y += TOAST_HEIGHT;
        }
    }
}

impl Default for ToastQueue {
    fn default() -> Self {
        Self::new(ToastOptions::default())
    }
}

impl Notifier for ToastQueue {
    fn notify(&mut self, severity: Severity, message: &str) {
        self.notify_at(severity, message, Instant::now());
    }
}
