use chrono::serde::ts_milliseconds;
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::{channels::ChannelReport, ArchiveError};
use crate::archived_message::Timestamp;

pub const MANIFEST_FILE: &str = "archive.json";

/// Summary of one archive pass, written next to the guild's other records
#[derive(Debug, Serialize)]
pub struct ArchiveManifest {
    /// Identifies the pass that produced the files in this folder
    pub session_id: Uuid,
    pub guild_id: u64,
    pub guild_name: String,
    #[serde(with = "ts_milliseconds")]
    pub started_at: Timestamp,
    #[serde(with = "ts_milliseconds")]
    pub finished_at: Timestamp,
    pub channels: Vec<ChannelReport>,
}

impl ArchiveManifest {
    pub async fn write(&self, dir: &Path) -> Result<PathBuf, ArchiveError> {
        let path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{archived_message::ChannelKind, archiver::channels::ChannelOutcome};
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn manifest_records_channel_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = ArchiveManifest {
            session_id: Uuid::nil(),
            guild_id: 7,
            guild_name: "Rustaceans".to_string(),
            started_at: Utc.timestamp_millis_opt(1_000).unwrap(),
            finished_at: Utc.timestamp_millis_opt(5_000).unwrap(),
            channels: vec![
                ChannelReport {
                    id: 1,
                    name: "general".to_string(),
                    kind: ChannelKind::Text,
                    outcome: ChannelOutcome::Partial {
                        messages: 5,
                        error: "timed out".to_string(),
                    },
                },
                ChannelReport {
                    id: 2,
                    name: "stage".to_string(),
                    kind: ChannelKind::Voice,
                    outcome: ChannelOutcome::Placeholder,
                },
            ],
        };

        let path = manifest.write(dir.path()).await.unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["started_at"], 1_000);
        assert_eq!(value["finished_at"], 5_000);
        assert_eq!(value["channels"][0]["status"], "partial");
        assert_eq!(value["channels"][0]["messages"], 5);
        assert_eq!(value["channels"][0]["kind"], "text");
        assert_eq!(value["channels"][1]["status"], "placeholder");
    }
}
