mod api;
mod config;
mod fetch;
mod openapi;
mod range;
mod ratelimit;
mod resolver;
mod startup;
mod state;
#[cfg(test)]
mod testing;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "insights-audio-server", version = env!("BUILD_VERSION"))]
struct Args {
    /// HTTP bind address, e.g. 0.0.0.0:8080
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Optional server config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve one share URL, print the result and exit.
    Resolve {
        /// Google Drive file link or any web page URL
        share_url: String,
    },
}

#[actix_web::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,actix_web=info,insights_audio_server=info")
        }))
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Some(Command::Resolve { share_url }) => startup::resolve_once(args.config, &share_url).await,
        None => startup::run(args.bind, args.config).await,
    }
}
