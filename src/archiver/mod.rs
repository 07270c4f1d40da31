use serenity::{model::id::GuildId, prelude::GatewayIntents};
use std::io;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

use crate::{archiver::archiver::Archiver, config::Config, MainError};

mod archiver;
mod channels;
mod history;
mod manifest;
mod snapshot;
#[cfg(test)]
mod testing;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("bot is not in guild {0} or the guild id is invalid")]
    NotInGuild(GuildId),

    #[error("{0:?} is not a guild id")]
    InvalidGuildId(String),

    #[error(transparent)]
    Serenity(#[from] serenity::Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("could not open an http session: {0}")]
    Http(#[from] reqwest::Error),
}

fn intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_EMOJIS_AND_STICKERS
}

/// Result of the archive pass as seen from `main`. `None` means the client
/// stopped before a pass finished.
fn pass_outcome(outcome: Option<Result<(), ArchiveError>>) -> Result<(), MainError> {
    match outcome {
        Some(result) => Ok(result?),
        None => Err(MainError::NoPass),
    }
}

pub async fn run(config: Config, guild_id: Option<GuildId>) -> Result<(), MainError> {
    let (finished_tx, mut finished_rx) = mpsc::channel(1);
    let token = config.discord_token.clone();

    let handler = Archiver::new(config, guild_id, Uuid::new_v4(), finished_tx);

    let mut client = serenity::Client::builder(&token, intents())
        .event_handler(handler)
        .await?;

    let shard_manager = client.shard_manager.clone();
    let shutdown = tokio::spawn(async move {
        let outcome = finished_rx.recv().await;
        if outcome.is_some() {
            info!("Archive pass finished, disconnecting");
            shard_manager.lock().await.shutdown_all().await;
        }
        outcome
    });

    info!("Starting client");

    let started = client.start().await;
    // Dropping the client drops the handler, which closes the result channel
    drop(client);
    if let Err(why) = started {
        error!("Client error: {why:?}");
        shutdown.abort();
        return Err(why.into());
    }

    match shutdown.await {
        Ok(outcome) => pass_outcome(outcome),
        Err(err) => {
            error!(%err, "Shutdown task failed");
            Err(MainError::NoPass)
        }
    }
}
