use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::api::ApiClient;
use crate::api::events::{HubEvent, JOIN_CONVERSATION, SEND_MESSAGE};
use crate::api::models::ConversationId;
use crate::error::{Error, Result};
use crate::hub::protocol::{self, HubFrame};
use crate::hub::{ChannelFactory, ChannelState, MessageHandler, ReadHandler, RealtimeChannel, ReconnectPolicy};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, WsMessage>;
type WsReader = SplitStream<WsStream>;

pub type EventHandler = Box<dyn Fn(HubEvent) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub connect_timeout: Duration,
    /// How often a ping is sent so the server does not drop an idle client.
    pub keep_alive_interval: Duration,
    /// Silence from the server longer than this counts as a lost connection.
    pub server_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            keep_alive_interval: Duration::from_secs(15),
            server_timeout: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

#[derive(Default)]
struct Handlers {
    messages: RwLock<Vec<MessageHandler>>,
    reads: RwLock<Vec<ReadHandler>>,
    events: RwLock<Vec<EventHandler>>,
}

impl Handlers {
    fn dispatch(&self, event: HubEvent) {
        for handler in self.events.read().unwrap_or_else(|e| e.into_inner()).iter() {
            handler(event.clone());
        }
        match event {
            HubEvent::ReceiveMessage(message) => {
                for handler in self.messages.read().unwrap_or_else(|e| e.into_inner()).iter() {
                    handler(message.clone());
                }
            }
            HubEvent::MessagesRead(ids) => {
                for handler in self.reads.read().unwrap_or_else(|e| e.into_inner()).iter() {
                    handler(ids.clone());
                }
            }
            _ => {}
        }
    }
}

/// Why the read loop stopped.
struct ReadEnd {
    allow_reconnect: bool,
    reason: String,
}

impl ReadEnd {
    fn lost(reason: impl Into<String>) -> Self {
        Self { allow_reconnect: true, reason: reason.into() }
    }
}

type Pending = HashMap<String, oneshot::Sender<Result<Value>>>;

struct Shared {
    url: Url,
    config: HubConfig,
    state: watch::Sender<ChannelState>,
    writer: Mutex<Option<WsWriter>>,
    pending: StdMutex<Pending>,
    groups: StdMutex<Vec<ConversationId>>,
    handlers: Handlers,
    next_invocation: AtomicU64,
    stopping: AtomicBool,
}

impl Shared {
    fn set_state(&self, state: ChannelState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            log::debug!("hub {}: {:?} -> {:?}", self.url.path(), previous, state);
        }
    }

    fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    fn stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Open the socket and run the protocol handshake. Returns the reader and
    /// any records that arrived together with the handshake reply.
    async fn open(&self) -> Result<(WsReader, String)> {
        let limit = self.config.connect_timeout;
        let (stream, _response) = timeout(limit, connect_async(self.url.as_str()))
            .await
            .map_err(|_| Error::Timeout(format!("hub connection after {limit:?}")))??;
        let (mut writer, mut reader) = stream.split();

        writer.send(WsMessage::Text(protocol::handshake_request())).await?;
        let reply = timeout(limit, next_text(&mut reader))
            .await
            .map_err(|_| Error::Timeout(format!("hub handshake after {limit:?}")))??;
        let rest = protocol::handshake_response(&reply)?.to_string();

        *self.writer.lock().await = Some(writer);
        Ok((reader, rest))
    }

    async fn send_frame(&self, frame: &HubFrame) -> Result<()> {
        let text = frame.encode()?;
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(Error::NotConnected)?;
        writer.send(WsMessage::Text(text)).await?;
        Ok(())
    }

    async fn invoke(&self, target: &str, arguments: Vec<Value>) -> Result<Value> {
        if !self.state().can_send() {
            return Err(Error::NotConnected);
        }
        let id = self.next_invocation.fetch_add(1, Ordering::SeqCst).to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).insert(id.clone(), tx);

        if let Err(e) = self.send_frame(&HubFrame::invocation(Some(id.clone()), target, arguments)).await {
            self.pending.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
            return Err(e);
        }
        rx.await.unwrap_or(Err(Error::NotConnected))
    }

    fn complete(&self, invocation_id: &str, result: Option<Value>, error: Option<String>) {
        let sender = self.pending.lock().unwrap_or_else(|e| e.into_inner()).remove(invocation_id);
        let Some(sender) = sender else {
            log::debug!("completion for unknown invocation {invocation_id}");
            return;
        };
        let outcome = match error {
            Some(e) => Err(Error::Invocation(e)),
            None => Ok(result.unwrap_or(Value::Null)),
        };
        let _ = sender.send(outcome);
    }

    fn fail_pending(&self, reason: &str) {
        let drained: Vec<_> = self.pending.lock().unwrap_or_else(|e| e.into_inner()).drain().collect();
        for (_, sender) in drained {
            let _ = sender.send(Err(Error::WebSocket(reason.to_string())));
        }
    }

    /// Handle every record of one text frame. Returns `Some` when the server
    /// asked to close.
    fn dispatch_text(&self, text: &str) -> Option<ReadEnd> {
        for frame in protocol::decode(text) {
            match frame {
                Ok(HubFrame::Invocation { target, arguments, .. }) => {
                    match HubEvent::from_invocation(&target, &arguments) {
                        Ok(Some(event)) => self.handlers.dispatch(event),
                        Ok(None) => log::debug!("no handler for hub method {target}"),
                        Err(e) => log::warn!("dropping {target}: {e}"),
                    }
                }
                Ok(HubFrame::Completion { invocation_id, result, error }) => {
                    self.complete(&invocation_id, result, error)
                }
                Ok(HubFrame::Ping) => {}
                Ok(HubFrame::Close { error, allow_reconnect }) => {
                    return Some(ReadEnd {
                        allow_reconnect,
                        reason: error.unwrap_or_else(|| "server closed the connection".into()),
                    });
                }
                Ok(HubFrame::Unsupported(kind)) => log::debug!("ignoring hub message type {kind}"),
                Err(e) => log::warn!("unreadable hub record: {e}"),
            }
        }
        None
    }

    async fn read_until_closed(&self, reader: &mut WsReader) -> ReadEnd {
        let mut keep_alive = tokio::time::interval(self.config.keep_alive_interval);
        keep_alive.tick().await;
        let mut deadline = Instant::now() + self.config.server_timeout;

        loop {
            tokio::select! {
                frame = reader.next() => {
                    deadline = Instant::now() + self.config.server_timeout;
                    match frame {
                        Some(Ok(WsMessage::Text(text))) => {
                            if let Some(end) = self.dispatch_text(&text) {
                                return end;
                            }
                        }
                        Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes) {
                            Ok(text) => {
                                if let Some(end) = self.dispatch_text(&text) {
                                    return end;
                                }
                            }
                            Err(_) => log::warn!("ignoring non-utf8 binary frame"),
                        },
                        Some(Ok(WsMessage::Close(_))) => return ReadEnd::lost("socket closed"),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return ReadEnd::lost(e.to_string()),
                        None => return ReadEnd::lost("stream ended"),
                    }
                }
                _ = keep_alive.tick() => {
                    if let Err(e) = self.send_frame(&HubFrame::Ping).await {
                        log::debug!("keep-alive ping failed: {e}");
                    }
                }
                _ = sleep_until(deadline) => {
                    return ReadEnd::lost(format!("no message from server in {:?}", self.config.server_timeout));
                }
            }
        }
    }

    /// Groups are per connection on the server, so a fresh socket has none.
    async fn rejoin(&self) {
        let groups = self.groups.lock().unwrap_or_else(|e| e.into_inner()).clone();
        for id in groups {
            let frame = HubFrame::invocation(None, JOIN_CONVERSATION, vec![json!(id)]);
            if let Err(e) = self.send_frame(&frame).await {
                log::warn!("rejoining conversation {id} failed: {e}");
            }
        }
    }

    async fn run(self: Arc<Self>, mut reader: WsReader, leftover: String) {
        if let Some(end) = self.dispatch_text(&leftover) {
            log::warn!("hub closed right after handshake: {}", end.reason);
            self.set_state(ChannelState::Disconnected);
            return;
        }

        loop {
            let end = self.read_until_closed(&mut reader).await;
            self.writer.lock().await.take();
            self.fail_pending(&end.reason);
            if self.stopping() {
                return;
            }
            self.set_state(ChannelState::Disconnected);
            log::warn!("hub connection lost: {}", end.reason);
            if !end.allow_reconnect {
                return;
            }

            let mut previous_retries = 0u32;
            reader = loop {
                self.set_state(ChannelState::Reconnecting);
                sleep(self.config.reconnect.next_delay(previous_retries)).await;
                if self.stopping() {
                    return;
                }
                match self.open().await {
                    Ok((fresh, rest)) => {
                        log::info!("hub reconnected after {} retries", previous_retries);
                        self.set_state(ChannelState::Connected);
                        self.rejoin().await;
                        if let Some(end) = self.dispatch_text(&rest) {
                            log::warn!("hub closed right after reconnect: {}", end.reason);
                        }
                        break fresh;
                    }
                    Err(e) => {
                        log::warn!("hub reconnect attempt {} failed: {}", previous_retries + 1, e);
                        previous_retries = previous_retries.saturating_add(1);
                    }
                }
            };
        }
    }
}

async fn next_text(reader: &mut WsReader) -> Result<String> {
    while let Some(frame) = reader.next().await {
        match frame? {
            WsMessage::Text(text) => return Ok(text),
            WsMessage::Binary(bytes) => {
                return String::from_utf8(bytes).map_err(|e| Error::Handshake(e.to_string()));
            }
            WsMessage::Close(_) => return Err(Error::Handshake("closed during handshake".into())),
            _ => {}
        }
    }
    Err(Error::Handshake("stream ended during handshake".into()))
}

/// A WebSocket-only hub connection (no negotiate round trip) with automatic
/// reconnection.
pub struct HubConnection {
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl HubConnection {
    pub fn new(url: Url, config: HubConfig) -> Result<Self> {
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(Error::InvalidUrl(format!(
                "hub url must use ws:// or wss://, got {}",
                url.scheme()
            )));
        }
        let (state, _) = watch::channel(ChannelState::Idle);
        Ok(Self {
            shared: Arc::new(Shared {
                url,
                config,
                state,
                writer: Mutex::new(None),
                pending: StdMutex::new(HashMap::new()),
                groups: StdMutex::new(Vec::new()),
                handlers: Handlers::default(),
                next_invocation: AtomicU64::new(0),
                stopping: AtomicBool::new(false),
            }),
            task: None,
        })
    }

    /// Handler for every decoded hub event, including app-wide notifications.
    pub fn on_event(&self, handler: EventHandler) {
        self.shared.handlers.events.write().unwrap_or_else(|e| e.into_inner()).push(handler);
    }

    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.shared.state.subscribe()
    }
}

#[async_trait]
impl RealtimeChannel for HubConnection {
    async fn connect(&mut self) -> Result<()> {
        if self.task.is_some() || self.shared.state() == ChannelState::Stopped {
            return Err(Error::WebSocket("connection was already started".into()));
        }
        self.shared.set_state(ChannelState::Connecting);
        let (reader, rest) = match self.shared.open().await {
            Ok(opened) => opened,
            Err(e) => {
                self.shared.set_state(ChannelState::Disconnected);
                return Err(e);
            }
        };
        self.shared.set_state(ChannelState::Connected);
        log::info!("hub connected: {}", self.shared.url.path());
        self.task = Some(tokio::spawn(self.shared.clone().run(reader, rest)));
        Ok(())
    }

    async fn join(&self, conversation_id: ConversationId) -> Result<()> {
        self.shared.invoke(JOIN_CONVERSATION, vec![json!(conversation_id)]).await?;
        let mut groups = self.shared.groups.lock().unwrap_or_else(|e| e.into_inner());
        if !groups.contains(&conversation_id) {
            groups.push(conversation_id);
        }
        Ok(())
    }

    async fn send(&self, conversation_id: ConversationId, text: &str) -> Result<()> {
        self.shared
            .invoke(SEND_MESSAGE, vec![json!(conversation_id), json!(text)])
            .await
            .map(|_| ())
    }

    fn on_message(&self, handler: MessageHandler) {
        self.shared.handlers.messages.write().unwrap_or_else(|e| e.into_inner()).push(handler);
    }

    fn on_read(&self, handler: ReadHandler) {
        self.shared.handlers.reads.write().unwrap_or_else(|e| e.into_inner()).push(handler);
    }

    fn state(&self) -> ChannelState {
        self.shared.state()
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.shared.stopping.store(true, Ordering::SeqCst);
        if let Some(mut writer) = self.shared.writer.lock().await.take() {
            if let Err(e) = writer.send(WsMessage::Close(None)).await {
                log::debug!("close frame not delivered: {e}");
            }
        }
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        self.shared.fail_pending("connection stopped");
        self.shared.set_state(ChannelState::Stopped);
        Ok(())
    }
}

impl Drop for HubConnection {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Creates hub connections for the configured server.
#[derive(Clone)]
pub struct HubFactory {
    api: ApiClient,
    config: HubConfig,
}

impl HubFactory {
    pub fn new(api: ApiClient, config: HubConfig) -> Self {
        Self { api, config }
    }
}

impl ChannelFactory for HubFactory {
    type Channel = HubConnection;

    fn create(&self, token: &str) -> Result<HubConnection> {
        HubConnection::new(self.api.hub_url(token)?, self.config.clone())
    }
}
