use std::time::Duration;

use async_trait::async_trait;
use blog_feed::DomainError;
use blog_feed::data::change_feed::{ChangeFeed, ChangeNotification, Subscription, Table};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::error::{BackendError, BackendResult};
use crate::{BackendClient, BackendConfig};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const JOIN_REF: &str = "1";
const PROTOCOL_VERSION: &str = "1.0.0";

#[derive(Debug, Deserialize)]
struct PhoenixMessage {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChangeData {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    record: Option<Value>,
    #[serde(default)]
    old_record: Option<Value>,
}

/// Что пришло по сокету для конкретной подписки.
#[derive(Debug, PartialEq)]
enum Inbound {
    Change(ChangeNotification),
    Joined,
    JoinRefused(String),
    Closed(String),
    Ignored,
}

#[derive(Debug, Clone)]
/// Клиент realtime-канала изменений таблиц (Phoenix websocket).
pub(crate) struct RealtimeClient {
    socket_url: String,
    heartbeat: Duration,
    join_timeout: Duration,
}

impl RealtimeClient {
    pub(crate) fn new(config: &BackendConfig) -> Self {
        Self {
            socket_url: socket_url(&config.base_url, &config.anon_key),
            heartbeat: config.heartbeat,
            join_timeout: config.request_timeout,
        }
    }

    /// Открывает соединение, подписывается на таблицу и запускает задачу,
    /// которая пересылает уведомления в [`Subscription`].
    pub(crate) async fn subscribe(
        &self,
        table: Table,
        access_token: Option<String>,
    ) -> BackendResult<Subscription> {
        let (mut socket, _) = connect_async(self.socket_url.as_str()).await?;

        let join = join_message(table, access_token.as_deref());
        socket.send(Message::Text(join.to_string().into())).await?;
        timeout(self.join_timeout, wait_for_join(&mut socket, table))
            .await
            .map_err(|_| BackendError::Protocol(format!("join {table} timed out")))??;
        info!(%table, "realtime subscription joined");

        let (tx, rx) = mpsc::unbounded_channel();
        let (release_tx, release_rx) = oneshot::channel();
        tokio::spawn(pump(socket, table, tx, release_rx, self.heartbeat));

        Ok(Subscription::new(table, rx, move || {
            let _ = release_tx.send(());
        }))
    }
}

#[async_trait]
impl ChangeFeed for BackendClient {
    async fn subscribe(&self, table: Table) -> Result<Subscription, DomainError> {
        let token = self.access_token();
        Ok(self.realtime.subscribe(table, token).await?)
    }
}

async fn wait_for_join(socket: &mut Socket, table: Table) -> BackendResult<()> {
    while let Some(message) = socket.next().await {
        match message? {
            Message::Text(text) => match classify(table, text.as_str()) {
                Inbound::Joined => return Ok(()),
                Inbound::JoinRefused(reason) | Inbound::Closed(reason) => {
                    return Err(BackendError::Protocol(format!("join {table} refused: {reason}")));
                }
                Inbound::Change(_) | Inbound::Ignored => {}
            },
            Message::Close(frame) => {
                return Err(BackendError::Protocol(format!(
                    "socket closed during join: {frame:?}"
                )));
            }
            _ => {}
        }
    }
    Err(BackendError::Protocol("socket ended during join".to_string()))
}

async fn pump(
    mut socket: Socket,
    table: Table,
    tx: mpsc::UnboundedSender<ChangeNotification>,
    mut release: oneshot::Receiver<()>,
    heartbeat: Duration,
) {
    let mut ticker = interval(heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    let mut reference: u64 = 1;

    loop {
        tokio::select! {
            _ = &mut release => {
                reference += 1;
                let leave = leave_message(table, reference);
                if let Err(err) = socket.send(Message::Text(leave.to_string().into())).await {
                    debug!(%table, error = %err, "failed to send leave");
                }
                let _ = socket.close(None).await;
                debug!(%table, "realtime subscription released");
                break;
            }
            _ = ticker.tick() => {
                reference += 1;
                let beat = heartbeat_message(reference);
                if let Err(err) = socket.send(Message::Text(beat.to_string().into())).await {
                    warn!(%table, error = %err, "realtime heartbeat failed");
                    break;
                }
            }
            message = socket.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => match classify(table, text.as_str()) {
                        Inbound::Change(notification) => {
                            if tx.send(notification).is_err() {
                                break;
                            }
                        }
                        Inbound::Closed(reason) => {
                            warn!(%table, %reason, "realtime channel closed by server");
                            break;
                        }
                        Inbound::Joined | Inbound::JoinRefused(_) | Inbound::Ignored => {}
                    },
                    Some(Ok(Message::Close(frame))) => {
                        info!(%table, ?frame, "realtime socket closed");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(%table, error = %err, "realtime socket error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }
}

/// `http(s)://host` → `ws(s)://host/realtime/v1/websocket?...`.
pub(crate) fn socket_url(base_url: &str, anon_key: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{base}/realtime/v1/websocket?apikey={anon_key}&vsn={PROTOCOL_VERSION}")
}

fn topic(table: Table) -> String {
    format!("realtime:public:{table}")
}

fn join_message(table: Table, access_token: Option<&str>) -> Value {
    let mut payload = json!({
        "config": {
            "broadcast": { "self": false },
            "presence": { "key": "" },
            "postgres_changes": [
                { "event": "*", "schema": "public", "table": table.name() }
            ]
        }
    });
    if let Some(token) = access_token {
        payload["access_token"] = Value::String(token.to_string());
    }
    json!({
        "topic": topic(table),
        "event": "phx_join",
        "payload": payload,
        "ref": JOIN_REF,
        "join_ref": JOIN_REF,
    })
}

fn leave_message(table: Table, reference: u64) -> Value {
    json!({
        "topic": topic(table),
        "event": "phx_leave",
        "payload": {},
        "ref": reference.to_string(),
        "join_ref": JOIN_REF,
    })
}

fn heartbeat_message(reference: u64) -> Value {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": reference.to_string(),
    })
}

fn classify(table: Table, text: &str) -> Inbound {
    let message = match serde_json::from_str::<PhoenixMessage>(text) {
        Ok(message) => message,
        Err(err) => {
            debug!(%table, error = %err, "dropping unparseable realtime frame");
            return Inbound::Ignored;
        }
    };
    if message.topic != topic(table) {
        return Inbound::Ignored;
    }

    match message.event.as_str() {
        "phx_reply" if message.reference.as_deref() == Some(JOIN_REF) => {
            match message.payload.get("status").and_then(Value::as_str) {
                Some("ok") => Inbound::Joined,
                _ => Inbound::JoinRefused(message.payload["response"].to_string()),
            }
        }
        "postgres_changes" => {
            match serde_json::from_value::<ChangeData>(message.payload["data"].clone()) {
                Ok(data) => Inbound::Change(ChangeNotification {
                    table,
                    kind: data.kind,
                    before: data.old_record,
                    after: data.record,
                }),
                Err(err) => {
                    debug!(%table, error = %err, "dropping malformed change payload");
                    Inbound::Ignored
                }
            }
        }
        "phx_error" | "phx_close" => Inbound::Closed(message.event),
        _ => Inbound::Ignored,
    }
}
