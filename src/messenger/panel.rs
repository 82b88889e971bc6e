use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::api::ChatApi;
use crate::api::models::{Conversation, ConversationId, Message, MessageId, Participant};
use crate::error::{Error, Result};
use crate::hub::{ChannelFactory, ChannelState, RealtimeChannel};
use crate::messenger::composer::Composer;
use crate::messenger::conversations::{ConversationList, LOAD_FAILED};
use crate::messenger::store::MessageStore;
use crate::session::Session;

/// How long a channel may take to join its conversation group.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

type Bound<C> = (C, mpsc::UnboundedReceiver<Inbound>);

/// A push from the channel, tagged with the conversation it was bound to.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message { conversation: ConversationId, message: Message },
    Read { conversation: ConversationId, ids: Vec<MessageId> },
}

/// What applying an [`Inbound`] changed in the open view.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Appended(MessageId),
    Duplicate(MessageId),
    MarkedRead(usize),
    /// The push belonged to a conversation that is not open.
    Stale(ConversationId),
}

/// The messenger panel: conversation list, the open conversation's messages
/// and the one live channel bound to it.
pub struct Messenger<A, F: ChannelFactory> {
    api: A,
    factory: F,
    session: Session,
    list: ConversationList,
    store: MessageStore,
    peer: Option<Participant>,
    open: Option<ConversationId>,
    channel: Option<F::Channel>,
    inbound: Option<mpsc::UnboundedReceiver<Inbound>>,
    /// State to report while no channel object exists (e.g. after a failed start).
    idle_state: ChannelState,
    join_timeout: Duration,
    error: Option<String>,
}

impl<A: ChatApi, F: ChannelFactory> Messenger<A, F> {
    pub fn new(api: A, factory: F, session: Session) -> Self {
        Self {
            api,
            factory,
            session,
            list: ConversationList::new(),
            store: MessageStore::new(),
            peer: None,
            open: None,
            channel: None,
            inbound: None,
            idle_state: ChannelState::Idle,
            join_timeout: JOIN_TIMEOUT,
            error: None,
        }
    }

    pub fn with_join_timeout(mut self, join_timeout: Duration) -> Self {
        self.join_timeout = join_timeout;
        self
    }

    /// Fetch the conversation list. Selects the first conversation when none
    /// is selected yet; it does not open it.
    ///
    /// The open conversation stays selected; if the server no longer lists
    /// it, it is closed and the first entry is selected instead.
    ///
    /// A 401 closes the open conversation and ends the session. Other
    /// failures leave a static error string.
    pub async fn load_conversations(&mut self) -> Result<Option<ConversationId>> {
        let token = self.session.require_token()?;
        match self.api.list_conversations(&token).await {
            Ok(items) => {
                self.error = None;
                self.list.set(items);
                if let Some(open) = self.open {
                    if self.list.get(open).is_some() {
                        self.list.select(open);
                        self.list.mark_opened(open);
                    } else {
                        log::info!("conversation {open} is gone, closing it");
                        self.leave().await;
                    }
                }
                Ok(self.list.selected())
            }
            Err(Error::Unauthorized) => {
                self.close().await;
                self.session.sign_out()?;
                Err(Error::Unauthorized)
            }
            Err(e) => {
                log::warn!("loading conversations failed: {e}");
                self.error = Some(LOAD_FAILED.to_string());
                Err(e)
            }
        }
    }

    /// Seed the list from a cache before the network answers.
    pub fn show_cached(&mut self, cached: Vec<Conversation>) {
        if self.list.is_empty() && !cached.is_empty() {
            self.list.set(cached);
        }
    }

    /// Open whatever is selected, if anything.
    pub async fn open_selected(&mut self) -> Result<()> {
        match self.list.selected() {
            Some(id) if self.open != Some(id) => self.select(id).await,
            _ => Ok(()),
        }
    }

    /// Open a conversation. The previous channel is stopped and awaited
    /// before the new one starts, so at most one is ever live. The history
    /// fetch runs alongside connect and join; pushes queued meanwhile are
    /// merged after the history is in place.
    pub async fn select(&mut self, id: ConversationId) -> Result<()> {
        let token = self.session.require_token()?;
        self.teardown().await;

        self.list.select(id);
        self.open = Some(id);
        self.store.clear();
        let me = self.session.current_user().map(|u| u.id);
        self.peer = self.list.get(id).and_then(|c| c.peer(me.as_deref())).cloned();
        let cleared = self.list.mark_opened(id);
        if cleared > 0 {
            log::debug!("conversation {id}: cleared {cleared} unread");
        }

        self.idle_state = ChannelState::Connecting;
        let (bound, history) = tokio::join!(
            Self::bind_channel(&self.factory, &token, id, self.join_timeout),
            self.api.conversation_messages(&token, id),
        );
        match bound {
            Some((channel, inbound)) => {
                self.channel = Some(channel);
                self.inbound = Some(inbound);
            }
            None => self.idle_state = ChannelState::Disconnected,
        }

        match history {
            Ok(history) => {
                self.store.replace(history);
                Ok(())
            }
            Err(Error::Unauthorized) => {
                self.teardown().await;
                self.session.sign_out()?;
                Err(Error::Unauthorized)
            }
            Err(e) => {
                log::warn!("loading messages of conversation {id} failed: {e}");
                Err(e)
            }
        }
    }

    /// Create, connect and join a channel for `id`. A channel that cannot
    /// join its group is stopped again: it would never receive the echo of
    /// what it sends.
    async fn bind_channel(
        factory: &F,
        token: &str,
        id: ConversationId,
        join_timeout: Duration,
    ) -> Option<Bound<F::Channel>> {
        let mut channel = match factory.create(token) {
            Ok(channel) => channel,
            Err(e) => {
                log::warn!("cannot create channel for conversation {id}: {e}");
                return None;
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let message_tx = tx.clone();
        channel.on_message(Box::new(move |message| {
            let _ = message_tx.send(Inbound::Message { conversation: id, message });
        }));
        channel.on_read(Box::new(move |ids| {
            let _ = tx.send(Inbound::Read { conversation: id, ids });
        }));

        if let Err(e) = channel.connect().await {
            log::warn!("connecting to conversation {id} failed: {e}");
            return None;
        }
        let joined = match timeout(join_timeout, channel.join(id)).await {
            Ok(joined) => joined,
            Err(_) => Err(Error::Timeout(format!("joining conversation {id} after {join_timeout:?}"))),
        };
        if let Err(e) = joined {
            log::warn!("joining conversation {id} failed: {e}");
            if let Err(e) = channel.disconnect().await {
                log::debug!("stopping unjoined channel failed: {e}");
            }
            return None;
        }
        Some((channel, rx))
    }

    async fn teardown(&mut self) {
        // Dropping the receiver first means nothing the old channel still
        // emits can reach the next view.
        self.inbound = None;
        if let Some(mut channel) = self.channel.take() {
            if let Err(e) = channel.disconnect().await {
                log::warn!("stopping channel failed: {e}");
            }
        }
        self.idle_state = ChannelState::Idle;
    }

    /// Leave the open conversation (the view is closed or unmounted).
    pub async fn close(&mut self) {
        self.leave().await;
        self.list.clear_selection();
    }

    async fn leave(&mut self) {
        self.teardown().await;
        self.open = None;
        self.peer = None;
        self.store.clear();
    }

    /// Reload the list after a read receipt so the unread total follows the
    /// server. Only a lost session is reported; other failures are logged.
    pub async fn refresh_unread(&mut self) -> Result<()> {
        match self.load_conversations().await {
            Ok(_) => Ok(()),
            Err(e @ (Error::Unauthorized | Error::NotSignedIn)) => Err(e),
            Err(e) => {
                log::warn!("refreshing unread counts failed: {e}");
                Ok(())
            }
        }
    }

    /// Send a draft over the channel. Nothing is appended locally; the
    /// message shows up when the server echoes it back.
    pub async fn send(&mut self, draft: &str) -> Result<()> {
        let text = Composer::prepare(draft)?;
        let id = self.open.ok_or(Error::NotConnected)?;
        let channel = self
            .channel
            .as_ref()
            .filter(|c| c.state().can_send())
            .ok_or(Error::NotConnected)?;
        channel.send(id, text).await.inspect_err(|e| {
            log::warn!("sending to conversation {id} failed: {e}");
        })
    }

    pub fn has_channel(&self) -> bool {
        self.inbound.is_some()
    }

    /// Wait for the next push from the live channel and apply it. `None`
    /// when no channel is bound or it went away.
    pub async fn next_event(&mut self) -> Option<Update> {
        let inbound = self.inbound.as_mut()?.recv().await?;
        Some(self.apply(inbound))
    }

    pub fn apply(&mut self, inbound: Inbound) -> Update {
        match inbound {
            Inbound::Message { conversation, message } => {
                let target = message.conversation_id.unwrap_or(conversation);
                if Some(target) != self.open || target != conversation {
                    log::debug!("dropping message {} for conversation {}", message.id, target);
                    return Update::Stale(target);
                }
                let id = message.id;
                if self.store.merge(message) { Update::Appended(id) } else { Update::Duplicate(id) }
            }
            Inbound::Read { conversation, ids } => {
                if Some(conversation) != self.open {
                    return Update::Stale(conversation);
                }
                Update::MarkedRead(self.store.mark_read(&ids))
            }
        }
    }

    pub fn conversations(&self) -> &ConversationList {
        &self.list
    }

    pub fn open_conversation(&self) -> Option<ConversationId> {
        self.open
    }

    pub fn messages(&self) -> &[Message] {
        self.store.messages()
    }

    pub fn peer(&self) -> Option<&Participant> {
        self.peer.as_ref()
    }

    pub fn channel_state(&self) -> ChannelState {
        match &self.channel {
            Some(channel) => channel.state(),
            None => self.idle_state,
        }
    }

    pub fn can_send(&self) -> bool {
        self.channel_state().can_send()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}
