use serde::Serialize;
use std::{io, path::PathBuf, time::Duration};
use tracing::{error, info};

use super::history::{self, MessageSource};
use crate::{
    archived_message::{ChannelEntry, ChannelKind},
    util::safe_filename,
};

/// Writes one text file per channel into a single folder
pub struct ChannelArchiveWriter {
    dir: PathBuf,
}

impl ChannelArchiveWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, channel_name: &str) -> PathBuf {
        self.dir.join(format!("{}.txt", safe_filename(channel_name)))
    }

    pub async fn write(&self, channel_name: &str, content: &str) -> io::Result<PathBuf> {
        let path = self.path_for(channel_name);
        tokio::fs::write(&path, content).await?;
        Ok(path)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChannelOutcome {
    Saved { messages: usize },
    /// The walk failed part way, the messages gathered before that were saved
    Partial { messages: usize, error: String },
    Placeholder,
    WriteFailed { error: String },
}

#[derive(Clone, Debug, Serialize)]
pub struct ChannelReport {
    pub id: u64,
    pub name: String,
    pub kind: ChannelKind,
    #[serde(flatten)]
    pub outcome: ChannelOutcome,
}

/// Channels in the order they are listed in the guild
pub fn sort_channels(channels: &mut [ChannelEntry]) {
    channels.sort_by_key(|channel| (channel.position, channel.id));
}

/// Archive every channel in turn. Failures stay with the channel they
/// happened in, the remaining channels are still archived.
pub async fn archive_channels<S>(
    source: &S,
    writer: &ChannelArchiveWriter,
    mut channels: Vec<ChannelEntry>,
    page_size: u8,
    cooldown: Duration,
) -> Vec<ChannelReport>
where
    S: MessageSource + ?Sized,
{
    sort_channels(&mut channels);

    let mut reports = Vec::with_capacity(channels.len());
    for channel in channels {
        let outcome = match channel.placeholder() {
            Some(placeholder) => write_placeholder(writer, &channel, &placeholder).await,
            None => {
                let outcome = archive_text_channel(source, writer, &channel, page_size).await;
                tokio::time::sleep(cooldown).await;
                outcome
            }
        };
        reports.push(ChannelReport {
            id: channel.id.0,
            name: channel.name,
            kind: channel.kind,
            outcome,
        });
    }
    reports
}

async fn archive_text_channel<S>(
    source: &S,
    writer: &ChannelArchiveWriter,
    channel: &ChannelEntry,
    page_size: u8,
) -> ChannelOutcome
where
    S: MessageSource + ?Sized,
{
    info!(channel = %channel.name, "Accessing text channel");

    let history = history::extract(source, channel, page_size).await;
    let messages = history.log.len();

    if let Err(err) = writer.write(&channel.name, &history.log.render()).await {
        error!(channel = %channel.name, %err, "Could not write channel archive");
        return ChannelOutcome::WriteFailed {
            error: err.to_string(),
        };
    }

    match history.error {
        None => {
            info!(channel = %channel.name, messages, fetches = history.fetches, "Saved messages");
            ChannelOutcome::Saved { messages }
        }
        Some(err) => {
            error!(
                channel = %channel.name,
                messages,
                %err,
                "Could not read the whole channel, saved what was fetched"
            );
            ChannelOutcome::Partial {
                messages,
                error: err.to_string(),
            }
        }
    }
}

async fn write_placeholder(
    writer: &ChannelArchiveWriter,
    channel: &ChannelEntry,
    placeholder: &str,
) -> ChannelOutcome {
    match writer.write(&channel.name, placeholder).await {
        Ok(_) => {
            info!(channel = %channel.name, kind = ?channel.kind, "Noted channel");
            ChannelOutcome::Placeholder
        }
        Err(err) => {
            error!(channel = %channel.name, %err, "Could not write channel placeholder");
            ChannelOutcome::WriteFailed {
                error: err.to_string(),
            }
        }
    }
}
