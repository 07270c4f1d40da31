//! Backward walk over a channel's message history.
//!
//! Pages arrive newest-first and move from the newest message towards the
//! oldest one. Every message accepted by the [`Accumulator`] is therefore the
//! oldest seen so far, which lets [`ChronologicalLog`] build oldest-first
//! output by pushing to the front instead of sorting.

use async_trait::async_trait;
use serenity::{
    http::Http,
    model::id::{ChannelId, MessageId},
};
use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
};
use tracing::debug;

use crate::archived_message::{ArchivedMessage, ChannelEntry};

/// How often the accumulator reports progress, in accepted messages
const PROGRESS_EVERY: usize = 50;

/// Cursor-based access to a channel's history
#[async_trait]
pub trait MessageSource: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Up to `limit` messages strictly older than `before` (or the newest
    /// messages when `before` is `None`), newest first. An empty page means
    /// there is nothing older left.
    async fn fetch_page(
        &self,
        channel: ChannelId,
        before: Option<MessageId>,
        limit: u8,
    ) -> Result<Vec<ArchivedMessage>, Self::Error>;
}

/// The REST history endpoint
pub struct RemoteHistory {
    pub http: Arc<Http>,
}

#[async_trait]
impl MessageSource for RemoteHistory {
    type Error = serenity::Error;

    async fn fetch_page(
        &self,
        channel: ChannelId,
        before: Option<MessageId>,
        limit: u8,
    ) -> Result<Vec<ArchivedMessage>, Self::Error> {
        let messages = channel
            .messages(&self.http, |retriever| {
                if let Some(before) = before {
                    retriever.before(before);
                }
                retriever.limit(u64::from(limit))
            })
            .await?;
        Ok(messages
            .into_iter()
            .map(ArchivedMessage::from_gateway)
            .collect())
    }
}

/// Message ids already accumulated for the channel being walked
#[derive(Debug, Default)]
pub struct SeenSet(HashSet<MessageId>);

impl SeenSet {
    pub fn contains(&self, id: MessageId) -> bool {
        self.0.contains(&id)
    }

    /// `false` if the id was already present
    pub fn insert(&mut self, id: MessageId) -> bool {
        self.0.insert(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Formatted message lines, oldest first
#[derive(Debug, Default)]
pub struct ChronologicalLog {
    lines: VecDeque<String>,
}

impl ChronologicalLog {
    /// `message` must be older than everything inserted before it
    pub fn insert(&mut self, message: &ArchivedMessage) {
        self.lines.push_front(message.to_line());
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// File content, one line per message without a trailing newline
    pub fn render(&self) -> String {
        self.lines().collect::<Vec<_>>().join("\n")
    }
}

/// Rejects messages whose id was seen before and forwards the rest to the log
#[derive(Debug, Default)]
pub struct Accumulator {
    seen: SeenSet,
    log: ChronologicalLog,
}

impl Accumulator {
    pub fn offer(&mut self, message: ArchivedMessage) -> bool {
        if !self.seen.insert(message.id) {
            return false;
        }
        self.log.insert(&message);
        true
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    pub fn into_log(self) -> ChronologicalLog {
        self.log
    }
}

/// Drives a [`MessageSource`] backward through one channel, a page at a time
pub struct PageWalker<'a, S: ?Sized> {
    source: &'a S,
    channel: ChannelId,
    page_size: u8,
    cursor: Option<MessageId>,
    exhausted: bool,
    fetches: usize,
}

impl<'a, S> PageWalker<'a, S>
where
    S: MessageSource + ?Sized,
{
    pub fn new(source: &'a S, channel: ChannelId, page_size: u8) -> Self {
        Self {
            source,
            channel,
            page_size: page_size.max(1),
            cursor: None,
            exhausted: false,
            fetches: 0,
        }
    }

    /// Fetch the next page, or `None` once the history is exhausted.
    ///
    /// A page that holds no id missing from `seen` ends the walk, whether it
    /// was empty or a repeat of messages already accumulated. A short page
    /// that did bring new messages is returned and ends the walk afterwards.
    /// A failed fetch also ends the walk.
    pub async fn next_page(
        &mut self,
        seen: &SeenSet,
    ) -> Result<Option<Vec<ArchivedMessage>>, S::Error> {
        if self.exhausted {
            return Ok(None);
        }

        self.fetches += 1;
        let page = match self
            .source
            .fetch_page(self.channel, self.cursor, self.page_size)
            .await
        {
            Ok(page) => page,
            Err(err) => {
                self.exhausted = true;
                return Err(err);
            }
        };

        let fetched_any = page.iter().any(|message| !seen.contains(message.id));
        if let Some(oldest) = page.last() {
            self.cursor = Some(oldest.id);
        }

        if !fetched_any {
            self.exhausted = true;
            return Ok(None);
        }
        if page.len() < usize::from(self.page_size) {
            self.exhausted = true;
        }
        Ok(Some(page))
    }

    pub fn fetches(&self) -> usize {
        self.fetches
    }

    pub fn cursor(&self) -> Option<MessageId> {
        self.cursor
    }
}

/// Everything accumulated for one channel, plus the error that cut the walk
/// short if there was one
#[derive(Debug)]
pub struct ChannelHistory<E> {
    pub log: ChronologicalLog,
    pub fetches: usize,
    pub error: Option<E>,
}

/// Walk the full history of `channel`, keeping whatever was gathered before a
/// failed fetch
pub async fn extract<S>(
    source: &S,
    channel: &ChannelEntry,
    page_size: u8,
) -> ChannelHistory<S::Error>
where
    S: MessageSource + ?Sized,
{
    let mut walker = PageWalker::new(source, channel.id, page_size);
    let mut accumulator = Accumulator::default();

    let error = loop {
        match walker.next_page(accumulator.seen()).await {
            Ok(Some(page)) => {
                for message in page {
                    if accumulator.offer(message) && accumulator.seen().len() % PROGRESS_EVERY == 0
                    {
                        debug!(
                            channel = %channel.name,
                            count = accumulator.seen().len(),
                            "Retrieved messages so far"
                        );
                    }
                }
            }
            Ok(None) => break None,
            Err(err) => {
                debug!(
                    channel = %channel.name,
                    cursor = ?walker.cursor(),
                    count = accumulator.seen().len(),
                    "Walk stopped by a failed fetch"
                );
                break Some(err);
            }
        }
    };

    ChannelHistory {
        log: accumulator.into_log(),
        fetches: walker.fetches(),
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        archived_message::{test_message, ChannelKind},
        archiver::testing::{numbered, ScriptedSource},
    };

    fn text_channel(id: u64) -> ChannelEntry {
        ChannelEntry {
            id: ChannelId(id),
            name: format!("channel-{id}"),
            position: 0,
            kind: ChannelKind::Text,
        }
    }

    #[tokio::test]
    async fn fetch_count_matches_page_math() {
        // (messages, page size, expected fetches)
        let cases = [(250, 100, 3), (200, 100, 3), (0, 100, 1), (7, 3, 3), (9, 3, 4)];

        for (total, page_size, expected) in cases {
            let source = ScriptedSource::new(vec![numbered(1, total)]);
            let history = extract(&source, &text_channel(1), page_size).await;

            assert!(history.error.is_none());
            assert_eq!(history.log.len(), total as usize, "{total} messages / {page_size}");
            assert_eq!(history.fetches, expected, "{total} messages / {page_size}");
            assert_eq!(source.fetches(), expected);
        }
    }

    #[tokio::test]
    async fn output_is_oldest_first_across_pages() {
        let a = test_message(1, "a", "first", 100);
        let b = test_message(2, "b", "second", 200);
        let c = test_message(3, "c", "third", 300);
        let source = ScriptedSource::new(vec![vec![c.clone(), b.clone(), a.clone()]]);

        let history = extract(&source, &text_channel(1), 1).await;

        let expected = vec![a.to_line(), b.to_line(), c.to_line()];
        assert_eq!(history.log.lines().collect::<Vec<_>>(), expected);
    }

    #[tokio::test]
    async fn overlapping_cursor_does_not_duplicate() {
        let source = ScriptedSource::new(vec![numbered(1, 5)]).inclusive_cursor();

        let history = extract(&source, &text_channel(1), 2).await;

        assert!(history.error.is_none());
        assert_eq!(history.log.len(), 5);
        let ids: Vec<_> = history
            .log
            .lines()
            .map(|line| line.rsplit(' ').next().unwrap().to_string())
            .collect();
        assert_eq!(ids, ["m1", "m2", "m3", "m4", "m5"]);
    }

    #[tokio::test]
    async fn repeated_full_page_stops_the_walk() {
        let source = ScriptedSource::new(vec![numbered(1, 3)]).ignore_cursor();

        let history = extract(&source, &text_channel(1), 3).await;

        assert!(history.error.is_none());
        assert_eq!(history.log.len(), 3);
        assert_eq!(history.fetches, 2);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_accumulated_messages() {
        let source = ScriptedSource::new(vec![numbered(1, 20)]).fail_on_fetch(2);

        let history = extract(&source, &text_channel(1), 5).await;

        assert!(history.error.is_some());
        assert_eq!(history.log.len(), 5);
        assert_eq!(history.fetches, 2);
    }

    #[tokio::test]
    async fn walker_advances_cursor_to_oldest_in_page() {
        let source = ScriptedSource::new(vec![numbered(1, 10)]);
        let seen = SeenSet::default();
        let mut walker = PageWalker::new(&source, ChannelId(1), 4);

        let page = walker.next_page(&seen).await.unwrap().unwrap();
        assert_eq!(page.len(), 4);
        assert_eq!(walker.cursor(), Some(MessageId(7)));
    }

    #[test]
    fn duplicate_offer_is_ignored() {
        let mut accumulator = Accumulator::default();

        assert!(accumulator.offer(test_message(42, "a", "hi", 0)));
        assert!(!accumulator.offer(test_message(42, "a", "hi", 0)));

        assert_eq!(accumulator.seen().len(), 1);
        assert_eq!(accumulator.into_log().len(), 1);
    }

    #[test]
    fn empty_log_renders_empty_content() {
        let log = ChronologicalLog::default();
        assert_eq!(log.len(), 0);
        assert_eq!(log.render(), "");
    }
}
