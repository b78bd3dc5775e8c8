use std::error::Error as StdError;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::NodeError;

pub type HandlerError = Box<dyn StdError + Send + Sync>;

/// Invoked serially, in delivery order, for every event on the stream.
pub type EventCallback = Arc<dyn Fn(&NodeEvent) -> Result<(), HandlerError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    StateMutation {
        context_id: String,
        new_root: String,
    },
    ExecutionEvent {
        context_id: String,
        events: Vec<ExecutionEventPayload>,
    },
}

impl NodeEvent {
    pub fn context_id(&self) -> &str {
        match self {
            NodeEvent::StateMutation { context_id, .. }
            | NodeEvent::ExecutionEvent { context_id, .. } => context_id,
        }
    }
}

/// One application event. `data` holds the raw bytes the application emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionEventPayload {
    pub kind: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Frame {
    Event(NodeEvent),
    Ack { id: u64 },
    Error { id: Option<u64>, error: Value },
    Ignored,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    #[serde(default)]
    context_id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

pub(crate) fn parse_frame(text: &str) -> Frame {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return Frame::Ignored;
    };
    let id = value.get("id").and_then(Value::as_u64);
    if let Some(error) = value.get("error").filter(|error| !error.is_null()) {
        return Frame::Error {
            id,
            error: error.clone(),
        };
    }
    let body = match value.get("result") {
        Some(result) if result.get("type").is_some() => result.clone(),
        Some(_) => {
            return match id {
                Some(id) => Frame::Ack { id },
                None => Frame::Ignored,
            };
        }
        None => value,
    };
    let Ok(raw) = serde_json::from_value::<RawEvent>(body) else {
        return Frame::Ignored;
    };
    match raw.kind.as_str() {
        "StateMutation" => {
            let new_root = raw
                .data
                .get("newRoot")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Frame::Event(NodeEvent::StateMutation {
                context_id: raw.context_id,
                new_root,
            })
        }
        "ExecutionEvent" => {
            let events = raw
                .data
                .get("events")
                .and_then(Value::as_array)
                .map(|events| events.iter().map(decode_payload).collect())
                .unwrap_or_default();
            Frame::Event(NodeEvent::ExecutionEvent {
                context_id: raw.context_id,
                events,
            })
        }
        _ => Frame::Ignored,
    }
}

/// `data` arrives as a byte array from the node; strings and inline JSON are
/// tolerated and normalised to bytes.
fn decode_payload(raw: &Value) -> ExecutionEventPayload {
    let kind = raw.get("kind").and_then(Value::as_str).map(str::to_string);
    let data = match raw.get("data") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_u64().and_then(|byte| u8::try_from(byte).ok()))
            .collect(),
        Some(Value::String(text)) => text.as_bytes().to_vec(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => other.to_string().into_bytes(),
    };
    ExecutionEventPayload { kind, data }
}

struct Connection {
    outbound: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// WebSocket subscription to a node's event feed. Dropping the client
/// tears the connection down.
pub struct EventStreamClient {
    url: Url,
    callbacks: Arc<RwLock<Vec<EventCallback>>>,
    connection: Mutex<Option<Connection>>,
    epoch: AtomicU64,
    next_id: AtomicU64,
}

impl EventStreamClient {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            callbacks: Arc::new(RwLock::new(Vec::new())),
            connection: Mutex::new(None),
            epoch: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .as_ref()
            .is_some_and(|conn| !conn.reader.is_finished())
    }

    pub fn add_callback(&self, callback: EventCallback) {
        self.callbacks.write().push(callback);
    }

    pub async fn connect(&self) -> Result<(), NodeError> {
        if self.is_connected() {
            return Ok(());
        }
        let epoch = self.epoch.load(Ordering::SeqCst);
        let (stream, _) = connect_async(self.url.as_str()).await?;

        let mut slot = self.connection.lock();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!(target: "battle::events", url = %self.url, "disconnect requested while connecting");
            return Err(NodeError::NotConnected);
        }

        let (mut sink, mut source) = stream.split();
        let (outbound, mut queued) = mpsc::unbounded_channel::<Message>();

        let writer = tokio::spawn(async move {
            while let Some(message) = queued.recv().await {
                let closing = matches!(message, Message::Close(_));
                if sink.send(message).await.is_err() || closing {
                    break;
                }
            }
        });

        let callbacks = Arc::clone(&self.callbacks);
        let url = self.url.clone();
        let reader = tokio::spawn(async move {
            while let Some(message) = source.next().await {
                let text = match message {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(_) => continue,
                    },
                    Ok(Message::Close(frame)) => {
                        debug!(target: "battle::events", ?frame, "event stream closed by node");
                        break;
                    }
                    Ok(_) => continue,
                    Err(err) => {
                        warn!(target: "battle::events", error = %err, "event stream read failed");
                        break;
                    }
                };
                match parse_frame(&text) {
                    Frame::Event(event) => dispatch(&callbacks, &event),
                    Frame::Ack { id } => trace!(target: "battle::events", id, "subscription acknowledged"),
                    Frame::Error { id, error } => {
                        warn!(target: "battle::events", ?id, %error, "node reported a stream error")
                    }
                    Frame::Ignored => trace!(target: "battle::events", frame = %text, "ignored frame"),
                }
            }
            info!(target: "battle::events", url = %url, "event stream reader stopped");
        });

        *slot = Some(Connection {
            outbound,
            reader,
            writer,
        });
        info!(target: "battle::events", url = %self.url, "event stream connected");
        Ok(())
    }

    pub fn subscribe(&self, context_ids: &[String]) -> Result<(), NodeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = json!({
            "id": id,
            "method": "subscribe",
            "params": { "contextIds": context_ids },
        });
        let slot = self.connection.lock();
        let conn = slot.as_ref().ok_or(NodeError::NotConnected)?;
        conn.outbound
            .send(Message::Text(frame.to_string()))
            .map_err(|_| NodeError::NotConnected)?;
        debug!(target: "battle::events", id, contexts = context_ids.len(), "subscribe sent");
        Ok(())
    }

    /// Safe to call at any point, including before or during `connect`.
    pub fn disconnect(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let Some(conn) = self.connection.lock().take() else {
            return;
        };
        let _ = conn.outbound.send(Message::Close(None));
        conn.reader.abort();
        drop(conn.outbound);
        // The writer exits once it has flushed the close frame.
        let writer = conn.writer;
        if tokio::runtime::Handle::try_current().is_ok() {
            tokio::spawn(async move {
                let abort = writer.abort_handle();
                if tokio::time::timeout(std::time::Duration::from_secs(1), writer)
                    .await
                    .is_err()
                {
                    abort.abort();
                }
            });
        } else {
            writer.abort();
        }
        info!(target: "battle::events", url = %self.url, "event stream disconnected");
    }
}

impl Drop for EventStreamClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn dispatch(callbacks: &RwLock<Vec<EventCallback>>, event: &NodeEvent) {
    let snapshot: Vec<EventCallback> = callbacks.read().clone();
    for callback in snapshot {
        if let Err(err) = callback(event) {
            warn!(
                target: "battle::events",
                context_id = %event.context_id(),
                error = %err,
                "event handler failed"
            );
        }
    }
}
