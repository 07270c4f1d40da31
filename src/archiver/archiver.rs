use async_trait::async_trait;
use chrono::Utc;
use serenity::{
    client::{Context, EventHandler},
    http::Http,
    model::{gateway::Ready, guild::PartialGuild, id::GuildId},
};
use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::mpsc,
};
use tracing::{error, info};
use uuid::Uuid;

use super::{
    channels::{archive_channels, ChannelArchiveWriter},
    history::RemoteHistory,
    manifest::ArchiveManifest,
    snapshot::{snapshot_guild, AssetDownloader, GuildLayout},
    ArchiveError,
};
use crate::{archived_message::ChannelEntry, config::Config};

/// Lets exactly one archive pass happen per instance
#[derive(Debug, Default)]
pub struct RunOnce {
    claimed: AtomicBool,
}

impl RunOnce {
    /// `true` for the first caller only
    pub fn claim(&self) -> bool {
        !self.claimed.swap(true, Ordering::SeqCst)
    }

    /// Run `pass` if nothing has claimed this guard yet
    pub async fn run<F, Fut>(&self, pass: F) -> Option<Fut::Output>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        if !self.claim() {
            return None;
        }
        Some(pass().await)
    }
}

pub struct Archiver {
    pub config: Config,
    pub guild_id: Option<GuildId>,
    pub session_id: Uuid,
    pub run_once: RunOnce,
    /// Receives the result of the archive pass once it is over
    pub finished: mpsc::Sender<Result<(), ArchiveError>>,
}

impl Archiver {
    pub fn new(
        config: Config,
        guild_id: Option<GuildId>,
        session_id: Uuid,
        finished: mpsc::Sender<Result<(), ArchiveError>>,
    ) -> Self {
        Self {
            config,
            guild_id,
            session_id,
            run_once: RunOnce::default(),
            finished,
        }
    }

    async fn archive(&self, ctx: &Context, ready: &Ready) -> Result<(), ArchiveError> {
        let guild_id = match self.guild_id {
            Some(guild_id) => guild_id,
            None => prompt_guild_id().await?,
        };

        if !ready.guilds.iter().any(|guild| guild.id == guild_id) {
            return Err(ArchiveError::NotInGuild(guild_id));
        }
        let guild = ctx.http.get_guild_with_counts(guild_id.0).await?;
        info!(name = %guild.name, id = guild.id.0, "Found guild");

        let manifest = archive_guild(&ctx.http, &guild, &self.config, self.session_id).await?;
        info!(
            channels = manifest.channels.len(),
            dir = %self.config.output_dir.join(guild.id.0.to_string()).display(),
            "Guild archived"
        );
        Ok(())
    }
}

/// One full pass over a guild: folders, resource snapshot, every channel and
/// finally the manifest. The asset session lives exactly as long as the pass.
pub async fn archive_guild(
    http: &Arc<Http>,
    guild: &PartialGuild,
    config: &Config,
    session_id: Uuid,
) -> Result<ArchiveManifest, ArchiveError> {
    let started_at = Utc::now();
    let downloader = AssetDownloader::new()?;

    let layout = GuildLayout::new(&config.output_dir, guild.id);
    layout.create().await?;

    snapshot_guild(http, guild, &layout, &downloader).await?;

    let channels: Vec<ChannelEntry> = guild
        .id
        .channels(http)
        .await?
        .values()
        .map(ChannelEntry::from_gateway)
        .collect();

    let source = RemoteHistory { http: http.clone() };
    let writer = ChannelArchiveWriter::new(&layout.channels);
    let reports = archive_channels(
        &source,
        &writer,
        channels,
        config.page_size(),
        config.channel_cooldown(),
    )
    .await;

    let manifest = ArchiveManifest {
        session_id,
        guild_id: guild.id.0,
        guild_name: guild.name.clone(),
        started_at,
        finished_at: Utc::now(),
        channels: reports,
    };
    manifest.write(&layout.root).await?;
    Ok(manifest)
}

pub fn parse_guild_id(input: &str) -> Result<GuildId, ArchiveError> {
    let input = input.trim();
    match input.parse::<u64>() {
        Ok(id) if id != 0 => Ok(GuildId(id)),
        _ => Err(ArchiveError::InvalidGuildId(input.to_string())),
    }
}

async fn prompt_guild_id() -> Result<GuildId, ArchiveError> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"Enter the Guild ID: ").await?;
    stdout.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    parse_guild_id(&line)
}

#[async_trait]
impl EventHandler for Archiver {
    async fn ready(&self, ctx: Context, ready: Ready) {
        let (ctx, ready) = (&ctx, &ready);
        let pass = self
            .run_once
            .run(move || async move {
                info!(user = %ready.user.name, "Logged in");
                let result = self.archive(ctx, ready).await;
                if let Err(err) = &result {
                    error!(%err, "Guild processing failed");
                }
                if self.finished.send(result).await.is_err() {
                    error!("Nothing is waiting for the archive result");
                }
            })
            .await;

        if pass.is_none() {
            info!("Skipping extraction: already completed once");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn second_ready_does_not_start_another_pass() {
        let guard = RunOnce::default();
        let passes = AtomicUsize::new(0);
        let counter = &passes;

        for _ in 0..2 {
            guard
                .run(move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .await;
        }

        assert_eq!(passes.load(Ordering::SeqCst), 1);
        assert!(!guard.claim());
    }

    #[test]
    fn guild_id_input_is_trimmed_and_validated() {
        assert_eq!(
            parse_guild_id(" 81384788765712384\n").unwrap(),
            GuildId(81384788765712384)
        );
        assert!(matches!(
            parse_guild_id("general"),
            Err(ArchiveError::InvalidGuildId(input)) if input == "general"
        ));
        assert!(parse_guild_id("0").is_err());
    }
}
