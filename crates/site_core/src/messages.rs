//! The admin's view of contact submissions: a snapshot merged with live inserts.
//!
//! The controller subscribes before it fetches. Inserts that land while the
//! snapshot is in flight wait in the subscription and are applied afterwards,
//! deduplicated by id, so a message is never shown twice and none is lost.
//! Both the snapshot and the feed run with the admin's access token.

use std::{collections::HashSet, sync::Arc};

use backend::{Backend, InsertSubscription, RowQuery, SortOrder};
use serde_json::Value;
use shared::domain::{ContactMessage, MessageId, CONTACT_TABLE};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, warn};

/// Newest first, unique by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageList {
    items: Vec<ContactMessage>,
}

impl MessageList {
    pub fn from_snapshot(mut rows: Vec<ContactMessage>) -> Self {
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let mut seen = HashSet::new();
        rows.retain(|message| seen.insert(message.id.clone()));
        Self { items: rows }
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.items.iter().any(|message| &message.id == id)
    }

    /// Puts a live insert at the front. Returns false if the id is already listed.
    pub fn prepend(&mut self, message: ContactMessage) -> bool {
        if self.contains(&message.id) {
            return false;
        }
        self.items.insert(0, message);
        true
    }

    pub fn items(&self) -> &[ContactMessage] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListState {
    Loading,
    Ready(MessageList),
}

impl ListState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn messages(&self) -> &[ContactMessage] {
        match self {
            Self::Loading => &[],
            Self::Ready(list) => list.items(),
        }
    }
}

/// Owns the background task that loads and then tracks the list. Dropping
/// the controller aborts that task, which releases the live subscription.
pub struct MessageListController {
    state: watch::Receiver<ListState>,
    task: JoinHandle<()>,
}

impl MessageListController {
    pub fn start(backend: Arc<dyn Backend>, access_token: Option<String>) -> Self {
        let (state_tx, state_rx) = watch::channel(ListState::Loading);
        let task = tokio::spawn(run(backend, access_token, state_tx));
        Self {
            state: state_rx,
            task,
        }
    }

    pub fn state(&self) -> ListState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ListState> {
        self.state.clone()
    }

    /// Waits until the snapshot has been applied.
    pub async fn ready(&self) -> MessageList {
        let mut state = self.state.clone();
        // Bound first so the watch guard is released before `state` drops.
        let list = match state.wait_for(ListState::is_ready).await {
            Ok(current) => match &*current {
                ListState::Ready(list) => list.clone(),
                ListState::Loading => MessageList::default(),
            },
            Err(_) => MessageList::default(),
        };
        list
    }
}

impl Drop for MessageListController {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    backend: Arc<dyn Backend>,
    access_token: Option<String>,
    state: watch::Sender<ListState>,
) {
    let mut subscription = match backend
        .subscribe_inserts(CONTACT_TABLE, access_token.as_deref())
        .await
    {
        Ok(subscription) => Some(subscription),
        Err(err) => {
            warn!(error = %err, "live message updates unavailable");
            None
        }
    };

    let mut list =
        MessageList::from_snapshot(fetch_snapshot(backend.as_ref(), access_token).await);
    if let Some(subscription) = subscription.as_mut() {
        while let Some(row) = subscription.try_next() {
            if let Some(message) = decode(row) {
                list.prepend(message);
            }
        }
    }
    debug!(count = list.len(), "message list ready");
    state.send_replace(ListState::Ready(list));

    if let Some(subscription) = subscription {
        pump(subscription, state).await;
    }
}

async fn fetch_snapshot(
    backend: &dyn Backend,
    access_token: Option<String>,
) -> Vec<ContactMessage> {
    let mut query = RowQuery::new().order_by("created_at", SortOrder::Descending);
    if let Some(token) = access_token {
        query = query.bearer(token);
    }
    match backend.select(CONTACT_TABLE, &query).await {
        Ok(rows) => rows.into_iter().filter_map(decode).collect(),
        Err(err) => {
            warn!(error = %err, "failed to fetch contact messages");
            Vec::new()
        }
    }
}

async fn pump(mut subscription: InsertSubscription, state: watch::Sender<ListState>) {
    while let Some(row) = subscription.next().await {
        let Some(message) = decode(row) else {
            continue;
        };
        state.send_if_modified(|current| match current {
            ListState::Ready(list) => list.prepend(message),
            ListState::Loading => false,
        });
    }
    debug!("live message feed ended");
}

fn decode(row: Value) -> Option<ContactMessage> {
    match serde_json::from_value(row) {
        Ok(message) => Some(message),
        Err(err) => {
            warn!(error = %err, "skipping undecodable contact message");
            None
        }
    }
}

#[cfg(test)]
#[path = "tests/messages_tests.rs"]
mod tests;
