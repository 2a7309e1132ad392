use crate::client::terminal::ClientError;
use crate::telemetry::logging::InitError;
use crate::transport::ConnectionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Connection(#[from] ConnectionError),
    #[error("terminal runtime error: {0}")]
    Client(#[from] ClientError),
    #[error("logging initialization failed: {0}")]
    Logging(#[from] InitError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
