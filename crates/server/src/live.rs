//! Turns the admin message list into a stream of insert events for one
//! browser. The feed owns its list controller, so closing the stream
//! releases the backend subscription.
//!
//! A browser's position is a [`Watermark`]. The page hands it to the stream
//! and every event carries the next one as its SSE id, so a stream opened
//! after the page, or reopened after a drop, resumes where the browser's
//! view ends.

use std::collections::BTreeSet;

use chrono::{DateTime, SecondsFormat, Utc};
use futures::{stream, Stream, StreamExt};
use shared::{
    domain::{ContactMessage, Session},
    protocol::LiveEvent,
};
use site_core::{ListState, MessageListController, SiteContext};
use tokio_stream::wrappers::WatchStream;

/// The newest `created_at` a browser holds and the ids it holds at exactly
/// that instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Watermark {
    at: Option<DateTime<Utc>>,
    ids: BTreeSet<String>,
}

impl Watermark {
    pub(crate) fn covering(messages: &[ContactMessage]) -> Self {
        let mut mark = Self::default();
        for message in messages {
            mark.advance(message);
        }
        mark
    }

    /// Whether `message` lies beyond this mark.
    pub(crate) fn admits(&self, message: &ContactMessage) -> bool {
        match self.at {
            None => true,
            Some(at) => {
                message.created_at > at
                    || (message.created_at == at && !self.ids.contains(&message.id.to_string()))
            }
        }
    }

    pub(crate) fn advance(&mut self, message: &ContactMessage) {
        match self.at {
            Some(at) if message.created_at < at => {}
            Some(at) if message.created_at == at => {
                self.ids.insert(message.id.to_string());
            }
            _ => {
                self.at = Some(message.created_at);
                self.ids = BTreeSet::from([message.id.to_string()]);
            }
        }
    }

    /// `<rfc3339>~<id>,<id>`; empty when nothing has been seen.
    pub(crate) fn encode(&self) -> String {
        match self.at {
            None => String::new(),
            Some(at) => format!(
                "{}~{}",
                at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                self.ids.iter().map(String::as_str).collect::<Vec<_>>().join(",")
            ),
        }
    }

    pub(crate) fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Some(Self::default());
        }
        let (at, ids) = raw.split_once('~')?;
        let at = DateTime::parse_from_rfc3339(at).ok()?.with_timezone(&Utc);
        Some(Self {
            at: Some(at),
            ids: ids
                .split(',')
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect(),
        })
    }
}

/// One message for the browser plus the position it reaches once shown.
#[derive(Debug)]
pub(crate) struct Update {
    pub(crate) event: LiveEvent,
    pub(crate) resume: Watermark,
}

pub(crate) struct LiveFeed {
    controller: MessageListController,
    mark: Watermark,
}

impl LiveFeed {
    /// Streams everything after `resume`, or after the current snapshot when
    /// the browser did not say where it is.
    pub(crate) async fn open(
        site: &SiteContext,
        session: &Session,
        resume: Option<Watermark>,
    ) -> Self {
        let controller = site.open_messages(session);
        let list = controller.ready().await;
        let mark = resume.unwrap_or_else(|| Watermark::covering(list.items()));
        Self { controller, mark }
    }

    /// Messages in `state` past the mark, oldest first. The mark moves past them.
    pub(crate) fn fresh(&mut self, state: &ListState) -> Vec<ContactMessage> {
        let mut fresh: Vec<ContactMessage> = state
            .messages()
            .iter()
            .filter(|message| self.mark.admits(message))
            .cloned()
            .collect();
        fresh.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        for message in &fresh {
            self.mark.advance(message);
        }
        fresh
    }

    pub(crate) fn into_events(self) -> impl Stream<Item = Update> + Send + 'static {
        let updates = WatchStream::new(self.controller.subscribe());
        let mut feed = self;
        updates.flat_map(move |state| {
            let mut resume = feed.mark.clone();
            let batch: Vec<Update> = feed
                .fresh(&state)
                .into_iter()
                .map(|message| {
                    resume.advance(&message);
                    Update {
                        event: LiveEvent::MessageInserted { message },
                        resume: resume.clone(),
                    }
                })
                .collect();
            stream::iter(batch)
        })
    }
}

#[cfg(test)]
#[path = "tests/live_tests.rs"]
mod tests;
