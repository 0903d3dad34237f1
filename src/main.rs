mod catalog;
mod cli;
mod cli_cmds;
mod config;
mod engine;
mod history;
mod ratio;
mod selector;
mod server;
mod utils;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
