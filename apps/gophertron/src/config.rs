use crate::client::surface::{DEFAULT_SURFACE_HEIGHT, DEFAULT_SURFACE_WIDTH};
use std::env;

pub const ORIGIN_ENV: &str = "GOPHERTRON_ORIGIN";
pub const SURFACE_WIDTH_ENV: &str = "GOPHERTRON_SURFACE_WIDTH";
pub const SURFACE_HEIGHT_ENV: &str = "GOPHERTRON_SURFACE_HEIGHT";
pub const DEFAULT_ORIGIN: &str = "http://localhost:8080";

/// Client settings that can come from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Origin the game is served from; the socket endpoint is derived from it.
    pub origin: String,
    pub surface_width: f64,
    pub surface_height: f64,
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let origin = env::var(ORIGIN_ENV)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or(defaults.origin);
        Self {
            origin,
            surface_width: dimension_from_env(SURFACE_WIDTH_ENV).unwrap_or(defaults.surface_width),
            surface_height: dimension_from_env(SURFACE_HEIGHT_ENV)
                .unwrap_or(defaults.surface_height),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            surface_width: DEFAULT_SURFACE_WIDTH,
            surface_height: DEFAULT_SURFACE_HEIGHT,
        }
    }
}

fn dimension_from_env(var: &str) -> Option<f64> {
    env::var(var)
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value > 0.0)
}

// Environment variables are process-wide; tests that touch them serialize here.
#[cfg(test)]
pub(crate) static ENV_MUTEX: std::sync::LazyLock<std::sync::Mutex<()>> =
    std::sync::LazyLock::new(|| std::sync::Mutex::new(()));

#[cfg(test)]
mod tests {
    use super::*;

    fn clear_env() {
        unsafe {
            env::remove_var(ORIGIN_ENV);
            env::remove_var(SURFACE_WIDTH_ENV);
            env::remove_var(SURFACE_HEIGHT_ENV);
        }
    }

    #[test_timeout::timeout]
    fn defaults_when_unset() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        let config = Config::from_env();
        assert_eq!(config, Config::default());
        assert_eq!(config.origin, "http://localhost:8080");
        assert_eq!(config.surface_width, 500.0);
    }

    #[test_timeout::timeout]
    fn reads_overrides() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe {
            env::set_var(ORIGIN_ENV, " http://arena.example.com:9090 ");
            env::set_var(SURFACE_WIDTH_ENV, "640");
            env::set_var(SURFACE_HEIGHT_ENV, "480");
        }
        let config = Config::from_env();
        clear_env();
        assert_eq!(config.origin, "http://arena.example.com:9090");
        assert_eq!(config.surface_width, 640.0);
        assert_eq!(config.surface_height, 480.0);
    }

    #[test_timeout::timeout]
    fn ignores_unusable_dimensions() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe {
            env::set_var(SURFACE_WIDTH_ENV, "wide");
            env::set_var(SURFACE_HEIGHT_ENV, "-10");
        }
        let config = Config::from_env();
        clear_env();
        assert_eq!(config.surface_width, DEFAULT_SURFACE_WIDTH);
        assert_eq!(config.surface_height, DEFAULT_SURFACE_HEIGHT);
    }
}
