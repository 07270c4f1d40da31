use clap::Parser;
use config::ConfigLoadSaveError;
use serenity::model::id::GuildId;
use std::{path::PathBuf, process};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

mod archived_message;
mod archiver;
mod config;
mod util;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        process::exit(1);
    }
}

#[derive(Debug, Error)]
pub enum MainError {
    #[error(transparent)]
    Serenity(#[from] serenity::Error),

    #[error("Failed to load the config: {0}")]
    Config(#[from] ConfigLoadSaveError),

    #[error("Archive failed: {0}")]
    Archive(#[from] archiver::ArchiveError),

    #[error("The client stopped before the archive pass finished")]
    NoPass,
}

#[derive(Debug, clap::Parser)]
#[command(about = "Archive a Discord guild's history to a local folder")]
struct Args {
    #[arg(value_enum)]
    pub mode: Mode,

    /// Guild to archive, asked for after login when omitted
    #[arg(long)]
    pub guild_id: Option<u64>,

    #[arg(long, default_value = "./config.toml")]
    pub config: PathBuf,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
enum Mode {
    ArchiveGuild,
}

async fn run() -> Result<(), MainError> {
    let args = Args::parse();

    let config = Config::load_or_create(&args.config).await?;

    match args.mode {
        Mode::ArchiveGuild => archiver::run(config, args.guild_id.map(GuildId)).await,
    }
}
