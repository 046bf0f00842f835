//! Session transport: the persistent message channel to the enrollment server.

mod websocket;

pub use websocket::WebSocketTransport;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use iris_types::{
    protocol::{ClientMessage, ServerMessage},
    IrisError, Result,
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

/// Bidirectional message channel carrying outbound frame/save/discard events
/// and inbound status events. Sends are fire-and-forget.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    async fn connect(&mut self) -> Result<()>;
    async fn send(&self, message: ClientMessage) -> Result<()>;
    fn incoming(&self) -> BoxStream<'static, ServerMessage>;
}

/// In-process loopback transport backed by a broadcast channel.
///
/// Records every outbound message and lets callers inject server messages,
/// which makes it the transport of choice for tests and offline demos.
#[derive(Clone)]
pub struct ChannelTransport {
    inbound: broadcast::Sender<ServerMessage>,
    sent: Arc<Mutex<Vec<ClientMessage>>>,
    connected: Arc<AtomicBool>,
}

impl ChannelTransport {
    pub fn new(capacity: usize) -> Self {
        let (inbound, _) = broadcast::channel(capacity);
        Self {
            inbound,
            sent: Arc::new(Mutex::new(Vec::new())),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Inject a message as if the server had sent it.
    pub fn push_server(&self, message: ServerMessage) {
        let _ = self.inbound.send(message);
    }

    /// Everything sent through this transport so far, in send order.
    pub fn sent(&self) -> Vec<ClientMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SessionTransport for ChannelTransport {
    async fn connect(&mut self) -> Result<()> {
        info!("Starting in-process loopback transport");
        self.connected.store(true, Ordering::SeqCst);
        let _ = self.inbound.send(ServerMessage::Connect);
        Ok(())
    }

    async fn send(&self, message: ClientMessage) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| transport_error("failed to lock sent-message log"))?
            .push(message);
        Ok(())
    }

    fn incoming(&self) -> BoxStream<'static, ServerMessage> {
        let live = BroadcastStream::new(self.inbound.subscribe())
            .filter_map(|message| async move { message.ok() });
        // Subscribers that attach after connect still see the connect signal.
        if self.connected.load(Ordering::SeqCst) {
            futures::stream::once(async { ServerMessage::Connect })
                .chain(live)
                .boxed()
        } else {
            live.boxed()
        }
    }
}

pub fn transport_error(message: impl Into<String>) -> IrisError {
    IrisError::Transport(message.into())
}
