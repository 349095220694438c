//! Insert notifications over the backend's Phoenix-style realtime socket.
//!
//! All subscriptions share one WebSocket. A background task owns the socket;
//! subscribers talk to it through a command channel and each get their own
//! stream of inserted rows. A subscription is only handed out once the
//! server has acknowledged the join, so every insert committed after
//! `subscribe` returns reaches it.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot, Mutex},
    time::{interval_at, timeout, Instant},
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::{BackendError, InsertSubscription};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);
const PROTOCOL_VERSION: &str = "1.0.0";

type JoinAck = oneshot::Sender<Result<(), BackendError>>;

enum Command {
    Join {
        topic: String,
        table: String,
        access_token: String,
        rows: mpsc::UnboundedSender<Value>,
        joined: JoinAck,
    },
    Leave {
        topic: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PhoenixFrame {
    pub(crate) topic: String,
    pub(crate) event: String,
    #[serde(default)]
    pub(crate) payload: Value,
    #[serde(rename = "ref", default)]
    pub(crate) reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) join_ref: Option<String>,
}

#[derive(Clone)]
pub struct RealtimeHub {
    socket_url: Url,
    access_token: String,
    connection: Arc<Mutex<Option<mpsc::UnboundedSender<Command>>>>,
    next_channel: Arc<AtomicU64>,
    join_timeout: Duration,
}

impl RealtimeHub {
    pub fn new(base_url: &Url, access_token: &str) -> Result<Self, BackendError> {
        Ok(Self {
            socket_url: socket_url(base_url, access_token)?,
            access_token: access_token.to_string(),
            connection: Arc::new(Mutex::new(None)),
            next_channel: Arc::new(AtomicU64::new(1)),
            join_timeout: JOIN_TIMEOUT,
        })
    }

    pub fn with_join_timeout(mut self, join_timeout: Duration) -> Self {
        self.join_timeout = join_timeout;
        self
    }

    pub fn socket_url(&self) -> &Url {
        &self.socket_url
    }

    /// Joins a channel for `table` and waits for the server to accept it.
    /// `access_token` is the signed-in user's JWT; without one the channel
    /// is joined with the anon key.
    pub async fn subscribe(
        &self,
        table: &str,
        access_token: Option<&str>,
    ) -> Result<InsertSubscription, BackendError> {
        let commands = self.connect().await?;
        let channel = self.next_channel.fetch_add(1, Ordering::Relaxed);
        let topic = format!("realtime:{table}-{channel}");

        let (rows_tx, rows_rx) = mpsc::unbounded_channel();
        let (joined_tx, joined_rx) = oneshot::channel();
        commands
            .send(Command::Join {
                topic: topic.clone(),
                table: table.to_string(),
                access_token: access_token.unwrap_or(&self.access_token).to_string(),
                rows: rows_tx,
                joined: joined_tx,
            })
            .map_err(|_| BackendError::Closed)?;

        match timeout(self.join_timeout, joined_rx).await {
            Ok(Ok(Ok(()))) => debug!(%topic, "realtime join acknowledged"),
            Ok(Ok(Err(err))) => return Err(err),
            Ok(Err(_)) => return Err(BackendError::Closed),
            Err(_) => {
                let _ = commands.send(Command::Leave { topic });
                return Err(BackendError::Network(format!(
                    "realtime join for {table} was not acknowledged within {:?}",
                    self.join_timeout
                )));
            }
        }

        Ok(InsertSubscription::new(table, rows_rx, move || {
            let _ = commands.send(Command::Leave { topic });
        }))
    }

    /// Returns the live connection, dialing a new one if the last socket died.
    async fn connect(&self) -> Result<mpsc::UnboundedSender<Command>, BackendError> {
        let mut guard = self.connection.lock().await;
        if let Some(commands) = guard.as_ref() {
            if !commands.is_closed() {
                return Ok(commands.clone());
            }
        }

        let (socket, _) = connect_async(self.socket_url.as_str())
            .await
            .map_err(|err| BackendError::Network(format!("realtime connect failed: {err}")))?;
        info!(url = %redacted(&self.socket_url), "realtime socket connected");

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_connection(socket, commands_rx));
        *guard = Some(commands_tx.clone());
        Ok(commands_tx)
    }
}

fn socket_url(base_url: &Url, access_token: &str) -> Result<Url, BackendError> {
    let mut url = base_url
        .join("realtime/v1/websocket")
        .map_err(|err| BackendError::Decode(format!("invalid realtime url: {err}")))?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(BackendError::Decode(format!(
                "backend url must be http(s), got '{other}'"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| BackendError::Decode("cannot switch backend url to websocket".to_string()))?;
    url.query_pairs_mut()
        .append_pair("apikey", access_token)
        .append_pair("vsn", PROTOCOL_VERSION);
    Ok(url)
}

fn redacted(url: &Url) -> String {
    format!("{}://{}{}", url.scheme(), url.host_str().unwrap_or_default(), url.path())
}

pub(crate) fn join_frame(topic: &str, table: &str, access_token: &str, reference: &str) -> PhoenixFrame {
    PhoenixFrame {
        topic: topic.to_string(),
        event: "phx_join".to_string(),
        payload: json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [
                    { "event": "INSERT", "schema": "public", "table": table }
                ],
            },
            "access_token": access_token,
        }),
        reference: Some(reference.to_string()),
        join_ref: Some(reference.to_string()),
    }
}

fn control_frame(topic: &str, event: &str, reference: &str) -> PhoenixFrame {
    PhoenixFrame {
        topic: topic.to_string(),
        event: event.to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
        join_ref: None,
    }
}

/// What an incoming frame means for the subscriber on its topic.
#[derive(Debug, PartialEq)]
pub(crate) enum Inbound {
    Insert { topic: String, record: Value },
    Reply {
        topic: String,
        reference: Option<String>,
        outcome: Result<(), String>,
    },
    Closed { topic: String, reason: String },
    Ignored,
}

pub(crate) fn classify(text: &str) -> Inbound {
    let Ok(frame) = serde_json::from_str::<PhoenixFrame>(text) else {
        return Inbound::Ignored;
    };

    match frame.event.as_str() {
        "postgres_changes" => {
            let data = &frame.payload["data"];
            let is_insert = data["type"].as_str() == Some("INSERT")
                || data["eventType"].as_str() == Some("INSERT");
            match data.get("record") {
                Some(record) if is_insert && record.is_object() => Inbound::Insert {
                    topic: frame.topic,
                    record: record.clone(),
                },
                _ => Inbound::Ignored,
            }
        }
        "phx_reply" => Inbound::Reply {
            topic: frame.topic,
            reference: frame.reference,
            outcome: match frame.payload["status"].as_str() {
                Some("ok") => Ok(()),
                _ => Err(reply_reason(&frame.payload["response"])),
            },
        },
        "phx_error" | "phx_close" => Inbound::Closed {
            topic: frame.topic,
            reason: frame.event,
        },
        _ => Inbound::Ignored,
    }
}

fn reply_reason(response: &Value) -> String {
    response["reason"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| response.to_string())
}

async fn run_connection(
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let (mut sink, mut stream) = socket.split();
    let mut subscribers: HashMap<String, mpsc::UnboundedSender<Value>> = HashMap::new();
    // Join acks waiting on a reply, keyed by the join's ref.
    let mut pending: HashMap<String, (String, JoinAck)> = HashMap::new();
    let mut heartbeat = interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);
    let mut next_ref: u64 = 0;

    loop {
        let outgoing = tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Join { topic, table, access_token, rows, joined }) => {
                    next_ref += 1;
                    let reference = next_ref.to_string();
                    debug!(%topic, %table, "realtime join");
                    subscribers.insert(topic.clone(), rows);
                    pending.insert(reference.clone(), (topic.clone(), joined));
                    Some(join_frame(&topic, &table, &access_token, &reference))
                }
                Some(Command::Leave { topic }) => {
                    pending.retain(|_, (waiting, _)| *waiting != topic);
                    if subscribers.remove(&topic).is_some() {
                        next_ref += 1;
                        debug!(%topic, "realtime leave");
                        Some(control_frame(&topic, "phx_leave", &next_ref.to_string()))
                    } else {
                        None
                    }
                }
                None => break,
            },
            _ = heartbeat.tick() => {
                next_ref += 1;
                Some(control_frame("phoenix", "heartbeat", &next_ref.to_string()))
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match classify(&text) {
                        Inbound::Insert { topic, record } => {
                            let delivered = subscribers
                                .get(&topic)
                                .map(|rows| rows.send(record).is_ok());
                            if delivered == Some(false) {
                                subscribers.remove(&topic);
                            }
                        }
                        Inbound::Reply { topic, reference, outcome } => {
                            let waiting = reference
                                .and_then(|reference| pending.remove(&reference))
                                .filter(|(waiting, _)| *waiting == topic);
                            match (waiting, outcome) {
                                (Some((_, joined)), Ok(())) => {
                                    let _ = joined.send(Ok(()));
                                }
                                (Some((_, joined)), Err(reason)) => {
                                    subscribers.remove(&topic);
                                    warn!(%topic, %reason, "realtime join rejected");
                                    let _ = joined.send(Err(BackendError::Rejected {
                                        status: 400,
                                        message: reason,
                                    }));
                                }
                                (None, Err(reason)) => {
                                    if subscribers.remove(&topic).is_some() {
                                        warn!(%topic, %reason, "realtime channel closed by server");
                                    }
                                }
                                (None, Ok(())) => {}
                            }
                        }
                        Inbound::Closed { topic, reason } => {
                            if subscribers.remove(&topic).is_some() {
                                warn!(%topic, %reason, "realtime channel closed by server");
                            }
                        }
                        Inbound::Ignored => {}
                    }
                    None
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => None,
                Some(Err(err)) => {
                    warn!(error = %err, "realtime socket receive failed");
                    break;
                }
            },
        };

        if let Some(frame) = outgoing {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(_) => continue,
            };
            if let Err(err) = sink.send(Message::Text(text)).await {
                warn!(error = %err, "realtime socket send failed");
                break;
            }
        }
    }

    info!(open_channels = subscribers.len(), "realtime socket closed");
}

#[cfg(test)]
#[path = "tests/realtime_tests.rs"]
mod tests;
