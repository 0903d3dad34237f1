use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use super::{Cli, Commands};
use crate::cli_cmds::*;
use crate::config::Config;
use crate::server;

pub(crate) async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.dir {
        config.catalog.directory = dir;
    }

    match cli.command {
        None | Some(Commands::Serve) => {
            server::serve(config).await?;
        }
        Some(Commands::Scan { json }) => {
            cmd_scan(&config.catalog.directory, json).await?;
        }
        Some(Commands::Pick {
            width,
            height,
            aspect,
            category,
            user_agent,
            client,
        }) => {
            let request = PickRequest {
                width,
                height,
                aspect,
                category,
                user_agent,
                client,
            };
            cmd_pick(&config, &request).await?;
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
