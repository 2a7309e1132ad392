use clap::Parser;
use gophertron_client_core::terminal::{app, cli::Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = app::run(cli).await {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
}
