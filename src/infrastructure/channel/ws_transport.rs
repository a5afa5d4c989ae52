use crate::application::ports::{NotificationTransport, TransportEvent};
use crate::domain::entities::NotificationPayload;
use crate::domain::value_objects::UserSession;
use crate::shared::config::ChannelConfig;
use crate::shared::error::{is_rate_limit_signal, AppError};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;
type PendingInvokes = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, AppError>>>>>;

/// Frames the server sends over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ServerFrame {
    Notification {
        payload: NotificationPayload,
    },
    Result {
        id: u64,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<String>,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientFrame<'a> {
    Invoke {
        id: u64,
        method: &'a str,
        args: Value,
    },
}

struct ActiveLink {
    writer: mpsc::Sender<Message>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

/// WebSocket transport for the notification hub. One socket per session,
/// invoke correlation by frame id, pushes fanned out over a broadcast
/// channel.
pub struct WsTransport {
    url: String,
    invoke_timeout: Duration,
    link: Mutex<Option<ActiveLink>>,
    pending: PendingInvokes,
    next_invoke_id: AtomicU64,
    events_tx: broadcast::Sender<TransportEvent>,
}

impl WsTransport {
    pub fn new(config: &ChannelConfig) -> Self {
        let (events_tx, _) = broadcast::channel(64);
        Self {
            url: config.url.clone(),
            invoke_timeout: Duration::from_millis(config.invoke_timeout_ms),
            link: Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_invoke_id: AtomicU64::new(1),
            events_tx,
        }
    }

    fn endpoint(&self, session: &UserSession) -> Result<Url, AppError> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| AppError::Configuration(format!("Invalid channel URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("connectionId", &Uuid::new_v4().to_string())
            .append_pair("userId", &session.user_id);
        Ok(url)
    }

    fn spawn_writer(mut sink: WsSink, mut outbox: mpsc::Receiver<Message>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(message) = outbox.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        })
    }

    fn spawn_reader(
        mut source: WsSource,
        pending: PendingInvokes,
        events_tx: broadcast::Sender<TransportEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let reason = loop {
                match source.next().await {
                    Some(Ok(Message::Text(text))) => {
                        Self::handle_frame(&text, &pending, &events_tx).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map(|f| f.reason.to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => break Some(err.to_string()),
                    None => break None,
                }
            };

            Self::fail_pending(&pending, "Channel closed").await;
            let _ = events_tx.send(TransportEvent::Closed { reason });
        })
    }

    async fn handle_frame(
        text: &str,
        pending: &PendingInvokes,
        events_tx: &broadcast::Sender<TransportEvent>,
    ) {
        let frame: ServerFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(err) => {
                warn!("Dropping unparseable channel frame: {err}");
                return;
            }
        };

        match frame {
            ServerFrame::Notification { payload } => {
                let _ = events_tx.send(TransportEvent::Notification(payload));
            }
            ServerFrame::Result { id, result, error } => {
                let Some(waiter) = pending.lock().await.remove(&id) else {
                    debug!("Invoke result {id} arrived after its waiter left");
                    return;
                };
                let outcome = match error {
                    Some(message) if is_rate_limit_signal(&message) => {
                        Err(AppError::RateLimited(message))
                    }
                    Some(message) => Err(AppError::Channel(message)),
                    None => Ok(result.unwrap_or(Value::Null)),
                };
                let _ = waiter.send(outcome);
            }
        }
    }

    async fn fail_pending(pending: &PendingInvokes, reason: &str) {
        let mut pending = pending.lock().await;
        for (_, waiter) in pending.drain() {
            let _ = waiter.send(Err(AppError::Channel(reason.to_string())));
        }
    }
}

#[async_trait]
impl NotificationTransport for WsTransport {
    async fn connect(&self, session: &UserSession) -> Result<(), AppError> {
        self.disconnect().await;

        let endpoint = self.endpoint(session)?;
        debug!("Opening notification channel to {}", endpoint.host_str().unwrap_or("?"));
        let (stream, _) = connect_async(endpoint.as_str()).await?;
        let (sink, source) = stream.split();

        let (writer, outbox) = mpsc::channel(32);
        let writer_task = Self::spawn_writer(sink, outbox);
        let reader_task = Self::spawn_reader(source, self.pending.clone(), self.events_tx.clone());

        let mut link = self.link.lock().await;
        *link = Some(ActiveLink {
            writer,
            reader_task,
            writer_task,
        });
        Ok(())
    }

    async fn disconnect(&self) {
        let Some(link) = self.link.lock().await.take() else {
            return;
        };
        let _ = link.writer.send(Message::Close(None)).await;
        // Dropping the writer side lets the writer task flush and close.
        drop(link.writer);
        link.reader_task.abort();
        let _ = link.writer_task.await;
        Self::fail_pending(&self.pending, "Channel disconnected").await;
    }

    async fn invoke(&self, method: &str, args: Value) -> Result<Value, AppError> {
        let writer = {
            let link = self.link.lock().await;
            match link.as_ref() {
                Some(active) => active.writer.clone(),
                None => return Err(AppError::Channel("Channel is not connected".to_string())),
            }
        };

        let id = self.next_invoke_id.fetch_add(1, Ordering::SeqCst);
        let frame = serde_json::to_string(&ClientFrame::Invoke { id, method, args })?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if writer.send(Message::Text(frame)).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(AppError::Channel("Channel write failed".to_string()));
        }

        match tokio::time::timeout(self.invoke_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(AppError::Channel("Channel closed mid-invoke".to_string())),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(AppError::Timeout(format!("Invoke {method} timed out")))
            }
        }
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_frames_parse() {
        let text = r#"{
            "type": "notification",
            "payload": {
                "id": "n1",
                "title": "New lesson",
                "message": "Chapter 3 is up",
                "courseId": "c1",
                "createdById": "t1",
                "createdByName": "Prof. Ada",
                "createdAt": "2025-06-01T10:00:00Z",
                "type": "lesson"
            }
        }"#;

        let frame: ServerFrame = serde_json::from_str(text).unwrap();
        match frame {
            ServerFrame::Notification { payload } => {
                assert_eq!(payload.id, "n1");
                assert_eq!(payload.course_id, "c1");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn result_frames_parse_with_and_without_error() {
        let ok: ServerFrame =
            serde_json::from_str(r#"{"type": "result", "id": 7, "result": [1, 2]}"#).unwrap();
        match ok {
            ServerFrame::Result { id, result, error } => {
                assert_eq!(id, 7);
                assert!(result.is_some());
                assert!(error.is_none());
            }
            other => panic!("unexpected frame: {other:?}"),
        }

        let err: ServerFrame = serde_json::from_str(
            r#"{"type": "result", "id": 8, "error": "Too many requests"}"#,
        )
        .unwrap();
        match err {
            ServerFrame::Result { error, .. } => {
                assert!(is_rate_limit_signal(&error.unwrap()));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn invoke_frames_serialize_with_a_tag() {
        let frame = ClientFrame::Invoke {
            id: 3,
            method: "JoinCourseGroup",
            args: serde_json::json!(["c1"]),
        };
        let value: Value = serde_json::from_str(&serde_json::to_string(&frame).unwrap()).unwrap();
        assert_eq!(value["type"], "invoke");
        assert_eq!(value["id"], 3);
        assert_eq!(value["method"], "JoinCourseGroup");
    }

    #[test]
    fn endpoint_carries_a_connection_id() {
        let config = ChannelConfig {
            url: "wss://example.test/hubs/notifications".to_string(),
            base_reconnect_delay_ms: 1000,
            max_reconnect_delay_ms: 30_000,
            max_reconnect_attempts: 8,
            min_attempt_spacing_ms: 2000,
            rate_limit_base_delay_ms: 30_000,
            health_interval_ms: 30_000,
            invoke_timeout_ms: 5000,
        };
        let transport = WsTransport::new(&config);

        let session = UserSession::new("user-1", crate::domain::value_objects::UserRole::Student);
        let endpoint = transport.endpoint(&session).unwrap();
        let query: HashMap<_, _> = endpoint.query_pairs().into_owned().collect();
        assert!(query.contains_key("connectionId"));
        assert_eq!(query.get("userId").map(String::as_str), Some("user-1"));
    }
}
