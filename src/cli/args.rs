use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "wallpaper-api")]
#[command(author = "MrMattias")]
#[command(version)]
#[command(about = "Aspect-aware wallpaper picker served over HTTP")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Option<Commands>,

    /// Wallpaper directory (overrides config and WALLPAPERS_DIR)
    #[arg(short, long)]
    pub(crate) dir: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long)]
    pub(crate) config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the HTTP server (default)
    Serve,
    /// Index the wallpaper directory and print a summary
    Scan {
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Pick one wallpaper the way the API would and print it as JSON
    Pick {
        /// Screen width in pixels
        #[arg(long)]
        width: Option<String>,
        /// Screen height in pixels
        #[arg(long)]
        height: Option<String>,
        /// Aspect ratio, e.g. "16:9" or "1.78"
        #[arg(long)]
        aspect: Option<String>,
        /// Restrict to one category
        #[arg(long)]
        category: Option<String>,
        /// User-Agent used for device hints
        #[arg(long, default_value = "")]
        user_agent: String,
        /// Dedup key (client id)
        #[arg(long)]
        client: Option<String>,
    },
}
