use clap::{Args, Parser};
use std::path::PathBuf;
use std::time::Duration;

use crate::client::notify::ToastOptions;
use crate::config::{ORIGIN_ENV, SURFACE_HEIGHT_ENV, SURFACE_WIDTH_ENV};
use crate::telemetry::logging::{LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "gophertron",
    about = "Play gophertron light-cycle matches from the terminal",
    version = concat!(env!("CARGO_PKG_VERSION"), "-", env!("BUILD_TIMESTAMP"))
)]
pub struct Cli {
    #[arg(
        long,
        value_name = "URL",
        env = ORIGIN_ENV,
        help = "Origin the game is served from [default: http://localhost:8080]"
    )]
    pub origin: Option<String>,

    #[arg(
        long = "surface-width",
        value_name = "PX",
        env = SURFACE_WIDTH_ENV,
        help = "Width of the drawing surface in game pixels [default: 500]"
    )]
    pub surface_width: Option<f64>,

    #[arg(
        long = "surface-height",
        value_name = "PX",
        env = SURFACE_HEIGHT_ENV,
        help = "Height of the drawing surface in game pixels [default: 500]"
    )]
    pub surface_height: Option<f64>,

    #[arg(
        long,
        help = "Run without the terminal UI; notifications are printed and logged"
    )]
    pub headless: bool,

    #[command(flatten)]
    pub toasts: ToastArgs,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ToastArgs {
    #[arg(
        long = "toast-show-ms",
        value_name = "MS",
        default_value_t = 300,
        help = "Fade-in time for notifications"
    )]
    pub show_ms: u64,

    #[arg(
        long = "toast-hide-ms",
        value_name = "MS",
        default_value_t = 1000,
        help = "Fade-out time for notifications"
    )]
    pub hide_ms: u64,

    #[arg(
        long = "toast-timeout-ms",
        value_name = "MS",
        default_value_t = 5000,
        help = "How long a notification stays fully visible"
    )]
    pub timeout_ms: u64,

    #[arg(long = "toast-newest-on-top", help = "Stack the newest notification first")]
    pub newest_on_top: bool,

    #[arg(
        long = "toast-prevent-duplicates",
        help = "Skip a notification identical to one still on screen"
    )]
    pub prevent_duplicates: bool,
}

impl ToastArgs {
    pub fn to_options(&self, echo_stdout: bool) -> ToastOptions {
        ToastOptions {
            show_duration: Duration::from_millis(self.show_ms),
            hide_duration: Duration::from_millis(self.hide_ms),
            timeout: Duration::from_millis(self.timeout_ms),
            newest_on_top: self.newest_on_top,
            prevent_duplicates: self.prevent_duplicates,
            echo_stdout,
            ..ToastOptions::default()
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        env = "GOPHERTRON_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        env = "GOPHERTRON_LOG_FILE",
        help = "Write structured logs to the specified file"
    )]
    pub file: Option<PathBuf>,
}

impl LoggingArgs {
    pub fn to_config(&self, quiet_stderr: bool) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
            quiet_stderr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ENV_MUTEX;

    fn clear_env() {
        unsafe {
            std::env::remove_var(ORIGIN_ENV);
            std::env::remove_var(SURFACE_WIDTH_ENV);
            std::env::remove_var(SURFACE_HEIGHT_ENV);
        }
    }

    #[test_timeout::timeout]
    fn defaults_match_the_web_client() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        let cli = Cli::try_parse_from(["gophertron"]).unwrap();
        assert_eq!(cli.origin, None);
        assert!(!cli.headless);
        let options = cli.toasts.to_options(false);
        assert_eq!(options.show_duration, Duration::from_millis(300));
        assert_eq!(options.hide_duration, Duration::from_millis(1000));
        assert_eq!(options.timeout, Duration::from_millis(5000));
        assert!(!options.newest_on_top);
        assert!(!options.prevent_duplicates);
    }

    #[test_timeout::timeout]
    fn parses_overrides() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let cli = Cli::try_parse_from([
            "gophertron",
            "--origin",
            "http://arena.local:9000",
            "--surface-width",
            "800",
            "--headless",
            "--toast-timeout-ms",
            "1500",
            "--toast-newest-on-top",
            "--toast-prevent-duplicates",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.origin.as_deref(), Some("http://arena.local:9000"));
        assert_eq!(cli.surface_width, Some(800.0));
        assert_eq!(cli.surface_height, None);
        assert!(cli.headless);
        let options = cli.toasts.to_options(true);
        assert_eq!(options.timeout, Duration::from_millis(1500));
        assert!(options.newest_on_top);
        assert!(options.prevent_duplicates);
        assert!(options.echo_stdout);
        assert_eq!(cli.logging.level, LogLevel::Debug);
        assert!(cli.logging.to_config(true).quiet_stderr);
    }

    #[test_timeout::timeout]
    fn origin_and_surface_fall_back_to_environment() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe {
            std::env::set_var(ORIGIN_ENV, "http://tron.example.org:9000");
            std::env::set_var(SURFACE_HEIGHT_ENV, "320");
        }
        let from_env = Cli::try_parse_from(["gophertron"]);
        let flag_wins = Cli::try_parse_from(["gophertron", "--origin", "http://flag.local:1"]);
        clear_env();

        let cli = from_env.unwrap();
        assert_eq!(cli.origin.as_deref(), Some("http://tron.example.org:9000"));
        assert_eq!(cli.surface_width, None);
        assert_eq!(cli.surface_height, Some(320.0));
        assert_eq!(flag_wins.unwrap().origin.as_deref(), Some("http://flag.local:1"));
    }

    #[test_timeout::timeout]
    fn rejects_unknown_log_level() {
        assert!(Cli::try_parse_from(["gophertron", "--log-level", "loud"]).is_err());
    }
}
