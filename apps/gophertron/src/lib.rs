pub mod client;
pub mod config;
pub mod protocol;
pub mod telemetry;
pub mod terminal;
pub mod transport;
