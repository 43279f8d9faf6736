mod analysis;
mod auth;
mod cli;
mod config;
mod error;
mod fetch;
mod insights;
mod model;
mod output;
mod providers;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting bkinsights");
    cli.execute().await?;

    Ok(())
}
