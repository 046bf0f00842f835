use std::time::Duration;

use async_trait::async_trait;
use futures::{stream::BoxStream, SinkExt, StreamExt};
use iris_types::{
    config::TransportConfig,
    protocol::{ClientMessage, ServerMessage},
    Result,
};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::BroadcastStream;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};

use crate::{transport_error, SessionTransport};

const OUTBOUND_QUEUE: usize = 64;
const INBOUND_FANOUT: usize = 64;

/// WebSocket client transport with JSON message framing.
///
/// `connect` splits the socket into a writer task draining an outbound queue
/// and a reader task fanning decoded messages out over a broadcast channel.
/// There is no reconnect or backoff: a dropped connection simply stops both
/// tasks and later sends fail.
pub struct WebSocketTransport {
    url: String,
    connect_timeout: Duration,
    outbound: Option<mpsc::Sender<ClientMessage>>,
    inbound: broadcast::Sender<ServerMessage>,
}

impl WebSocketTransport {
    pub fn new(config: &TransportConfig) -> Self {
        let (inbound, _) = broadcast::channel(INBOUND_FANOUT);
        Self {
            url: config.server_url.clone(),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            outbound: None,
            inbound,
        }
    }
}

#[async_trait]
impl SessionTransport for WebSocketTransport {
    async fn connect(&mut self) -> Result<()> {
        let (ws_stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(&self.url))
            .await
            .map_err(|_| transport_error(format!("connection to {} timed out", self.url)))?
            .map_err(|err| transport_error(format!("websocket connection failed: {err}")))?;

        let (mut sink, mut stream) = ws_stream.split();
        let (tx, mut rx) = mpsc::channel::<ClientMessage>(OUTBOUND_QUEUE);
        self.outbound = Some(tx);

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!("failed to serialize outbound message: {err}");
                        continue;
                    }
                };
                if let Err(err) = sink.send(Message::Text(text)).await {
                    warn!("websocket send failed: {err}");
                    break;
                }
            }
        });

        let inbound = self.inbound.clone();
        tokio::spawn(async move {
            while let Some(next) = stream.next().await {
                match next {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(message) => {
                            let _ = inbound.send(message);
                        }
                        Err(err) => warn!("ignoring undecodable server message: {err}"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!("websocket read failed: {err}");
                        break;
                    }
                }
            }
        });

        info!("Connected to {}", self.url);
        let _ = self.inbound.send(ServerMessage::Connect);
        Ok(())
    }

    async fn send(&self, message: ClientMessage) -> Result<()> {
        let outbound = self
            .outbound
            .as_ref()
            .ok_or_else(|| transport_error("send attempted before connect"))?;
        outbound
            .try_send(message)
            .map_err(|err| transport_error(format!("outbound queue rejected message: {err}")))
    }

    fn incoming(&self) -> BoxStream<'static, ServerMessage> {
        let live = BroadcastStream::new(self.inbound.subscribe())
            .filter_map(|message| async move { message.ok() });
        // The socket is connected before the controller subscribes; replay
        // the connect signal so it is not lost to the broadcast channel.
        if self.outbound.is_some() {
            futures::stream::once(async { ServerMessage::Connect })
                .chain(live)
                .boxed()
        } else {
            live.boxed()
        }
    }
}
