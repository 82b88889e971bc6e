//! Real-time channel to the chat hub.

pub mod connection;
pub mod protocol;
pub mod retry;

use async_trait::async_trait;

use crate::api::models::{ConversationId, Message, MessageId};
use crate::error::Result;

pub use connection::{HubConfig, HubConnection, HubFactory};
pub use retry::ReconnectPolicy;

/// Lifecycle of one channel instance.
///
/// `Idle → Connecting → Connected → (Disconnected → Reconnecting → Connected) | Stopped`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Reconnecting,
    /// Explicitly torn down. Terminal for this instance.
    Stopped,
}

impl ChannelState {
    pub fn can_send(self) -> bool {
        self == ChannelState::Connected
    }
}

pub type MessageHandler = Box<dyn Fn(Message) + Send + Sync>;
pub type ReadHandler = Box<dyn Fn(Vec<MessageId>) + Send + Sync>;

#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// Open the connection. Fails without retrying; reconnection only
    /// applies to a connection that was established once.
    async fn connect(&mut self) -> Result<()>;

    /// Join the server-side group of a conversation. Re-joined after reconnects.
    async fn join(&self, conversation_id: ConversationId) -> Result<()>;

    async fn send(&self, conversation_id: ConversationId, text: &str) -> Result<()>;

    fn on_message(&self, handler: MessageHandler);

    fn on_read(&self, handler: ReadHandler);

    fn state(&self) -> ChannelState;

    /// Stop the connection and wait for its background work to end.
    async fn disconnect(&mut self) -> Result<()>;
}

/// Builds one channel per conversation selection.
pub trait ChannelFactory: Send + Sync {
    type Channel: RealtimeChannel;

    fn create(&self, token: &str) -> Result<Self::Channel>;
}
