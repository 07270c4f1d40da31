use async_trait::async_trait;
use serenity::model::id::{ChannelId, MessageId};
use std::sync::Mutex;
use thiserror::Error;

use super::history::MessageSource;
use crate::archived_message::{test_message, ArchivedMessage};

#[derive(Debug, Error)]
#[error("connection reset while fetching page {0}")]
pub struct ScriptedError(pub usize);

/// Messages `first..=last`, newest first, one minute apart
pub fn numbered(first: u64, count: u64) -> Vec<ArchivedMessage> {
    (first..first + count)
        .rev()
        .map(|id| test_message(id, "tester", &format!("m{id}"), 1_600_000_000 + id as i64 * 60))
        .collect()
}

/// In-memory history served in pages, one script per channel id (1-based)
pub struct ScriptedSource {
    channels: Vec<Vec<ArchivedMessage>>,
    inclusive_cursor: bool,
    ignore_cursor: bool,
    fail_on: Option<(u64, usize)>,
    fetches: Mutex<usize>,
    channel_fetches: Mutex<Vec<usize>>,
}

impl ScriptedSource {
    pub fn new(channels: Vec<Vec<ArchivedMessage>>) -> Self {
        let channel_fetches = vec![0; channels.len()];
        Self {
            channels,
            inclusive_cursor: false,
            ignore_cursor: false,
            fail_on: None,
            fetches: Mutex::new(0),
            channel_fetches: Mutex::new(channel_fetches),
        }
    }

    /// Pages start at the cursor message instead of just after it
    pub fn inclusive_cursor(mut self) -> Self {
        self.inclusive_cursor = true;
        self
    }

    /// Every fetch returns the newest page
    pub fn ignore_cursor(mut self) -> Self {
        self.ignore_cursor = true;
        self
    }

    /// The nth fetch (1-based) of the first channel fails
    pub fn fail_on_fetch(self, nth: usize) -> Self {
        self.fail_channel_on_fetch(1, nth)
    }

    pub fn fail_channel_on_fetch(mut self, channel: u64, nth: usize) -> Self {
        self.fail_on = Some((channel, nth));
        self
    }

    pub fn fetches(&self) -> usize {
        *self.fetches.lock().unwrap()
    }
}

#[async_trait]
impl MessageSource for ScriptedSource {
    type Error = ScriptedError;

    async fn fetch_page(
        &self,
        channel: ChannelId,
        before: Option<MessageId>,
        limit: u8,
    ) -> Result<Vec<ArchivedMessage>, Self::Error> {
        *self.fetches.lock().unwrap() += 1;
        let index = channel.0 as usize - 1;
        let nth = {
            let mut per_channel = self.channel_fetches.lock().unwrap();
            per_channel[index] += 1;
            per_channel[index]
        };
        if self.fail_on == Some((channel.0, nth)) {
            return Err(ScriptedError(nth));
        }

        let history = &self.channels[index];
        let start = match before {
            Some(cursor) if !self.ignore_cursor => {
                match history.iter().position(|message| message.id == cursor) {
                    Some(position) if self.inclusive_cursor => position,
                    Some(position) => position + 1,
                    None => history.len(),
                }
            }
            _ => 0,
        };
        Ok(history
            .iter()
            .skip(start)
            .take(usize::from(limit))
            .cloned()
            .collect())
    }
}
