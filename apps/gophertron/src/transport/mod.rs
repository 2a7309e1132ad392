use crate::protocol::Intent;

pub mod websocket;

pub use websocket::{
    Connection, ConnectionError, ConnectionEvent, ConnectionState, Endpoint, IntentSender,
    SendError, Subscription, connect,
};

/// Outbound half of the game connection, as seen by the scene.
pub trait IntentSink {
    fn send_intent(&self, intent: &Intent) -> Result<(), SendError>;
}
