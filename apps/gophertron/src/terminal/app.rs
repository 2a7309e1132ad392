use crate::client::notify::ToastQueue;
use crate::client::surface::TerminalSurface;
use crate::client::terminal::GameClient;
use crate::config::Config;
use crate::telemetry::logging as logctl;
use crate::terminal::cli::Cli;
use crate::terminal::error::CliError;
use crate::transport::{Connection, Endpoint};
use std::io::{self, IsTerminal};
use tracing::info;

pub async fn run(cli: Cli) -> Result<(), CliError> {
    let headless = cli.headless || !io::stdout().is_terminal();
    logctl::init(&cli.logging.to_config(!headless))?;

    let config = resolve_config(&cli, Config::from_env())?;
    let endpoint = Endpoint::from_origin(&config.origin)?;
    info!(
        target: "gophertron::app",
        origin = %config.origin,
        url = %endpoint.url(),
        headless,
        "starting client"
    );

    let connection = Connection::connect(endpoint);
    let surface = TerminalSurface::new(config.surface_width, config.surface_height);
    let toasts = ToastQueue::new(cli.toasts.to_options(headless));
    let mut client = GameClient::new(connection, surface, toasts).with_render(!headless);
    client.run().await?;
    Ok(())
}

/// Command-line values win over the environment.
fn resolve_config(cli: &Cli, mut config: Config) -> Result<Config, CliError> {
    if let Some(origin) = cli.origin.as_ref() {
        config.origin = origin.clone();
    }
    if let Some(width) = cli.surface_width {
        config.surface_width = positive("--surface-width", width)?;
    }
    if let Some(height) = cli.surface_height {
        config.surface_height = positive("--surface-height", height)?;
    }
    Ok(config)
}

fn positive(flag: &str, value: f64) -> Result<f64, CliError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(CliError::InvalidArgument(format!(
            "{flag} must be a positive number, got {value}"
        )))
    }
}
