use super::ConnectionError;
use url::Url;

/// Fixed path the game server serves its socket on.
pub const WEBSOCKET_PATH: &str = "/websocket";

/// Where the single game connection points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: normalize_host(host.into()),
            port,
        }
    }

    /// Derive the endpoint from the origin the game is served from, e.g.
    /// `http://localhost:8080`. A bare `host:port` is accepted as well.
    pub fn from_origin(origin: &str) -> Result<Self, ConnectionError> {
        let trimmed = origin.trim();
        let candidate = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        };
        let url = Url::parse(&candidate).map_err(|err| ConnectionError::InvalidOrigin {
            origin: origin.to_string(),
            reason: err.to_string(),
        })?;
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| ConnectionError::InvalidOrigin {
                origin: origin.to_string(),
                reason: "missing host".into(),
            })?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ConnectionError::InvalidOrigin {
                origin: origin.to_string(),
                reason: format!("no port for scheme '{}'", url.scheme()),
            })?;
        Ok(Self::new(host, port))
    }

    pub fn url(&self) -> String {
        format!("ws://{}:{}{}", self.host, self.port, WEBSOCKET_PATH)
    }
}

// Resolve localhost to IPv4 so the socket doesn't prefer ::1 when the server
// only listens on 127.0.0.1.
fn normalize_host(host: String) -> String {
    if host.eq_ignore_ascii_case("localhost") {
        "127.0.0.1".to_string()
    } else {
        host
    }
}
