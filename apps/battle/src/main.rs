use anyhow::Context;
use battle_client_core::terminal::{app, cli::Cli};
use clap::Parser;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("❌ {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            return Err(err).context("failed to load .env");
        }
    }
    let cli = Cli::parse();
    app::run(cli).await?;
    Ok(())
}
