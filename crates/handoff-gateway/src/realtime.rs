use crate::error::{GatewayError, Result};
use futures_util::{SinkExt, StreamExt};
use handoff_core::domain::{ChangeEvent, RawMessageRow, SessionId, SessionStatePatch};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};
use url::Url;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
pub const DEFAULT_TOPIC: &str = "realtime:handoff-dashboard";
const JOIN_REF: &str = "1";
const HISTORY_TABLE: &str = "n8n_chat_histories";
const STATE_TABLE: &str = "chat_sessions_state";

#[derive(Clone)]
pub struct RealtimeConfig {
    pub socket_url: Url,
    pub access_token: String,
    pub topic: String,
    pub heartbeat: Duration,
}

impl RealtimeConfig {
    /// `https://x.supabase.co` becomes `wss://x.supabase.co/realtime/v1/websocket?apikey=…&vsn=1.0.0`.
    pub fn new(base_url: &Url, anon_key: &str, access_token: &str) -> Result<Self> {
        let mut socket_url = base_url.join("realtime/v1/websocket")?;
        let scheme = match base_url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => {
                return Err(GatewayError::Config(format!(
                    "unsupported backend url scheme: {other}"
                )))
            }
        };
        socket_url
            .set_scheme(scheme)
            .map_err(|_| GatewayError::Config("cannot build realtime url".to_string()))?;
        socket_url
            .query_pairs_mut()
            .clear()
            .append_pair("apikey", anon_key)
            .append_pair("vsn", "1.0.0");
        Ok(Self {
            socket_url,
            access_token: access_token.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            heartbeat: HEARTBEAT_INTERVAL,
        })
    }
}

impl std::fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut url = self.socket_url.clone();
        url.set_query(None);
        f.debug_struct("RealtimeConfig")
            .field("socket_url", &url.as_str())
            .field("topic", &self.topic)
            .field("heartbeat", &self.heartbeat)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeEvent {
    Subscribed,
    Change(ChangeEvent),
    ChannelError(String),
    Closed(Option<String>),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(default, rename = "ref")]
    reference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChangeData {
    #[serde(rename = "type")]
    kind: String,
    table: String,
    #[serde(default)]
    record: Value,
    #[serde(default)]
    old_record: Value,
}

pub fn join_frame(topic: &str, access_token: &str) -> String {
    json!({
        "topic": topic,
        "event": "phx_join",
        "ref": JOIN_REF,
        "join_ref": JOIN_REF,
        "payload": {
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [
                    { "event": "INSERT", "schema": "public", "table": HISTORY_TABLE },
                    { "event": "*", "schema": "public", "table": STATE_TABLE },
                ],
            },
            "access_token": access_token,
        },
    })
    .to_string()
}

pub fn heartbeat_frame(reference: u64) -> String {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": reference.to_string(),
    })
    .to_string()
}

/// Hands a refreshed JWT to a joined channel so the backend keeps it open.
pub fn access_token_frame(topic: &str, access_token: &str, reference: u64) -> String {
    json!({
        "topic": topic,
        "event": "access_token",
        "payload": { "access_token": access_token },
        "ref": reference.to_string(),
        "join_ref": JOIN_REF,
    })
    .to_string()
}

pub fn leave_frame(topic: &str, reference: u64) -> String {
    json!({
        "topic": topic,
        "event": "phx_leave",
        "payload": {},
        "ref": reference.to_string(),
        "join_ref": JOIN_REF,
    })
    .to_string()
}

/// Decodes one socket frame for `topic`. Frames that carry nothing for the dashboard
/// (heartbeat replies, presence, other topics) yield `None`.
pub fn parse_frame(topic: &str, text: &str) -> Result<Option<RealtimeEvent>> {
    let envelope: Envelope = serde_json::from_str(text)?;
    if envelope.topic != topic {
        return Ok(None);
    }

    match envelope.event.as_str() {
        "phx_reply" if envelope.reference.as_deref() == Some(JOIN_REF) => {
            let status = envelope.payload.get("status").and_then(Value::as_str);
            if status == Some("ok") {
                Ok(Some(RealtimeEvent::Subscribed))
            } else {
                let reason = envelope
                    .payload
                    .pointer("/response/reason")
                    .and_then(Value::as_str)
                    .unwrap_or("join refused");
                Ok(Some(RealtimeEvent::ChannelError(reason.to_string())))
            }
        }
        "system" => {
            let status = envelope.payload.get("status").and_then(Value::as_str);
            if status == Some("error") {
                let message = envelope
                    .payload
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("realtime system error");
                Ok(Some(RealtimeEvent::ChannelError(message.to_string())))
            } else {
                Ok(None)
            }
        }
        "phx_error" => Ok(Some(RealtimeEvent::ChannelError(
            "realtime channel crashed".to_string(),
        ))),
        "phx_close" => Ok(Some(RealtimeEvent::Closed(None))),
        "postgres_changes" => {
            let Some(data) = envelope.payload.get("data") else {
                return Ok(None);
            };
            let data: ChangeData = serde_json::from_value(data.clone())?;
            parse_change(data).map(|change| change.map(RealtimeEvent::Change))
        }
        _ => Ok(None),
    }
}

fn parse_change(data: ChangeData) -> Result<Option<ChangeEvent>> {
    match (data.table.as_str(), data.kind.as_str()) {
        (HISTORY_TABLE, "INSERT") => {
            let row: RawMessageRow = serde_json::from_value(data.record)?;
            Ok(Some(ChangeEvent::MessageInserted(row)))
        }
        (STATE_TABLE, "INSERT" | "UPDATE") => {
            let patch: SessionStatePatch = serde_json::from_value(data.record)?;
            Ok(Some(ChangeEvent::SessionStateUpserted(patch)))
        }
        (STATE_TABLE, "DELETE") => {
            let session_id = data
                .old_record
                .get("session_id")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    GatewayError::UnexpectedResponse("delete without session_id".to_string())
                })?;
            Ok(Some(ChangeEvent::SessionStateDeleted(SessionId::new(
                session_id,
            )?)))
        }
        _ => Ok(None),
    }
}

/// A joined change-feed channel. Dropping it leaves the channel and stops the socket tasks.
pub struct RealtimeSubscription {
    topic: String,
    outbound: mpsc::Sender<WsMessage>,
    refs: Arc<AtomicU64>,
    reader: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
}

impl RealtimeSubscription {
    pub async fn connect(config: RealtimeConfig, events: mpsc::Sender<RealtimeEvent>) -> Result<Self> {
        info!(?config, "connecting to realtime");
        let (socket, _) = connect_async(config.socket_url.as_str()).await?;
        let (mut write, mut read) = socket.split();

        write
            .send(WsMessage::Text(
                join_frame(&config.topic, &config.access_token).into(),
            ))
            .await?;

        let (outbound, mut outbound_rx) = mpsc::channel::<WsMessage>(32);
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if write.send(frame).await.is_err() {
                    return;
                }
            }
            let _ = write.send(WsMessage::Close(None)).await;
        });

        let refs = Arc::new(AtomicU64::new(2));
        let heartbeat = {
            let outbound = outbound.clone();
            let refs = refs.clone();
            let period = config.heartbeat;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let reference = refs.fetch_add(1, Ordering::Relaxed);
                    let frame = WsMessage::Text(heartbeat_frame(reference).into());
                    if outbound.send(frame).await.is_err() {
                        break;
                    }
                }
            })
        };

        let topic = config.topic.clone();
        let reader = tokio::spawn(async move {
            let reason = loop {
                match read.next().await {
                    Some(Ok(WsMessage::Text(text))) => match parse_frame(&topic, text.as_str()) {
                        Ok(Some(event)) => {
                            if events.send(event).await.is_err() {
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(err) => warn!(error = %err, "ignoring undecodable realtime frame"),
                    },
                    Some(Ok(WsMessage::Close(frame))) => {
                        break frame.map(|frame| frame.reason.to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => break Some(err.to_string()),
                    None => break None,
                }
            };
            debug!(?reason, "realtime socket closed");
            let _ = events.send(RealtimeEvent::Closed(reason)).await;
        });

        Ok(Self {
            topic: config.topic,
            outbound,
            refs,
            reader,
            heartbeat,
        })
    }

    pub fn set_access_token(&self, access_token: &str) -> Result<()> {
        let reference = self.refs.fetch_add(1, Ordering::Relaxed);
        let frame = WsMessage::Text(access_token_frame(&self.topic, access_token, reference).into());
        self.outbound
            .try_send(frame)
            .map_err(|_| GatewayError::ChannelClosed)?;
        debug!(topic = %self.topic, "sent refreshed access token to realtime");
        Ok(())
    }
}

impl Drop for RealtimeSubscription {
    fn drop(&mut self) {
        self.heartbeat.abort();
        self.reader.abort();
        let reference = self.refs.fetch_add(1, Ordering::Relaxed);
        let leave = WsMessage::Text(leave_frame(&self.topic, reference).into());
        if self.outbound.try_send(leave).is_err() {
            debug!("realtime writer already gone; skipping leave");
        }
    }
}
