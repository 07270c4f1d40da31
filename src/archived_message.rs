use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serenity::model::{
    channel::{ChannelType, GuildChannel, Message},
    id::{ChannelId, MessageId},
    timestamp::Timestamp as SerenityTimestamp,
};

pub type Timestamp = DateTime<Utc>;

/// Format used for every archived message line
pub const LINE_TIMESTAMP_FORMAT: &str = "%H:%M %d/%m/%Y";

pub fn convert_ts(ts: SerenityTimestamp) -> Timestamp {
    Utc.timestamp_opt(ts.unix_timestamp(), 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// A message as captured during one archive run, immutable once fetched
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchivedMessage {
    pub id: MessageId,
    pub author_name: String,
    pub content: String,
    pub timestamp: Timestamp,
}

impl ArchivedMessage {
    pub fn from_gateway(message: Message) -> Self {
        Self {
            id: message.id,
            author_name: message.author.name,
            content: message.content,
            timestamp: convert_ts(message.timestamp),
        }
    }

    /// `HH:MM DD/MM/YYYY | author: content`, content kept verbatim
    pub fn to_line(&self) -> String {
        format!(
            "{} | {}: {}",
            self.timestamp.format(LINE_TIMESTAMP_FORMAT),
            self.author_name,
            self.content
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Text,
    Voice,
    Other(String),
}

impl From<ChannelType> for ChannelKind {
    fn from(value: ChannelType) -> Self {
        match value {
            ChannelType::Text | ChannelType::News => Self::Text,
            ChannelType::Voice | ChannelType::Stage => Self::Voice,
            other => Self::Other(other.name().to_uppercase()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelEntry {
    pub id: ChannelId,
    pub name: String,
    pub position: i64,
    pub kind: ChannelKind,
}

impl ChannelEntry {
    pub fn from_gateway(channel: &GuildChannel) -> Self {
        Self {
            id: channel.id,
            name: channel.name.clone(),
            position: channel.position,
            kind: channel.kind.into(),
        }
    }

    /// The one-line record written for channels without message history
    pub fn placeholder(&self) -> Option<String> {
        match &self.kind {
            ChannelKind::Text => None,
            ChannelKind::Voice => Some(format!("# {} (VOICE CHANNEL)\n", self.name)),
            ChannelKind::Other(label) => Some(format!("# {} ({label})\n", self.name)),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_message(id: u64, author: &str, content: &str, unix: i64) -> ArchivedMessage {
    ArchivedMessage {
        id: MessageId(id),
        author_name: author.to_string(),
        content: content.to_string(),
        timestamp: Utc.timestamp_opt(unix, 0).unwrap(),
    }
}
