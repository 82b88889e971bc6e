use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;

use artua::api::ChatApi;
use artua::api::models::{Conversation, ConversationId, Message, MessageId, Participant};
use artua::app::AppState;
use artua::error::{Error, Result};
use artua::hub::{ChannelFactory, ChannelState, MessageHandler, ReadHandler, RealtimeChannel};
use artua::messenger::conversations::LOAD_FAILED;
use artua::messenger::{Inbound, Messenger, Update};
use artua::session::Session;

fn message(id: MessageId, conversation: Option<ConversationId>) -> Message {
    Message {
        id,
        content: format!("message {id}"),
        sender_id: "peer".into(),
        sent_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, id as u32 % 60, 0).unwrap(),
        is_read: false,
        conversation_id: conversation,
    }
}

fn conversation(id: ConversationId, unread: u32) -> Conversation {
    Conversation {
        id,
        participants: vec![Participant { id: format!("user-{id}"), name: format!("User {id}"), avatar: None }],
        last_message: None,
        unread_count: unread,
    }
}

#[derive(Default)]
struct ApiState {
    conversations: Mutex<Vec<Conversation>>,
    history: Mutex<HashMap<ConversationId, Vec<Message>>>,
    unauthorized: AtomicBool,
    broken: AtomicBool,
    list_calls: AtomicUsize,
}

#[derive(Clone, Default)]
struct FakeApi(Arc<ApiState>);

#[async_trait]
impl ChatApi for FakeApi {
    async fn list_conversations(&self, _token: &str) -> Result<Vec<Conversation>> {
        self.0.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.0.unauthorized.load(Ordering::SeqCst) {
            return Err(Error::Unauthorized);
        }
        if self.0.broken.load(Ordering::SeqCst) {
            return Err(Error::Http(StatusCode::INTERNAL_SERVER_ERROR));
        }
        Ok(self.0.conversations.lock().unwrap().clone())
    }

    async fn conversation_messages(&self, _token: &str, id: ConversationId) -> Result<Vec<Message>> {
        if self.0.unauthorized.load(Ordering::SeqCst) {
            return Err(Error::Unauthorized);
        }
        Ok(self.0.history.lock().unwrap().get(&id).cloned().unwrap_or_default())
    }
}

/// One created channel. Handlers stay registered after disconnect so tests
/// can emulate pushes that arrive late.
#[derive(Default)]
struct Slot {
    state: Mutex<ChannelState>,
    joined: Mutex<Vec<ConversationId>>,
    messages: Mutex<Vec<MessageHandler>>,
    reads: Mutex<Vec<ReadHandler>>,
}

impl Slot {
    fn push_message(&self, m: Message) {
        for handler in self.messages.lock().unwrap().iter() {
            handler(m.clone());
        }
    }

    fn push_read(&self, ids: Vec<MessageId>) {
        for handler in self.reads.lock().unwrap().iter() {
            handler(ids.clone());
        }
    }

    fn state(&self) -> ChannelState {
        *self.state.lock().unwrap()
    }
}

/// How the fake server answers `JoinConversation`.
#[derive(Clone, Copy, Default)]
enum JoinReply {
    #[default]
    Accept,
    Reject,
    Never,
}

#[derive(Default)]
struct HubState {
    slots: Mutex<Vec<Arc<Slot>>>,
    join_reply: Mutex<JoinReply>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    refuse: AtomicBool,
    sent: Mutex<Vec<(ConversationId, String)>>,
    /// Active connection count seen by each `connect`, in order.
    active_at_connect: Mutex<Vec<usize>>,
}

impl HubState {
    fn slot(&self, index: usize) -> Arc<Slot> {
        self.slots.lock().unwrap()[index].clone()
    }

    fn created(&self) -> usize {
        self.slots.lock().unwrap().len()
    }
}

#[derive(Clone, Default)]
struct FakeFactory(Arc<HubState>);

struct FakeChannel {
    slot: Arc<Slot>,
    hub: Arc<HubState>,
}

impl ChannelFactory for FakeFactory {
    type Channel = FakeChannel;

    fn create(&self, _token: &str) -> Result<FakeChannel> {
        let slot = Arc::new(Slot::default());
        self.0.slots.lock().unwrap().push(slot.clone());
        Ok(FakeChannel { slot, hub: self.0.clone() })
    }
}

#[async_trait]
impl RealtimeChannel for FakeChannel {
    async fn connect(&mut self) -> Result<()> {
        let active = self.hub.active.load(Ordering::SeqCst);
        self.hub.active_at_connect.lock().unwrap().push(active);
        if self.hub.refuse.load(Ordering::SeqCst) {
            *self.slot.state.lock().unwrap() = ChannelState::Disconnected;
            return Err(Error::WebSocket("connection refused".into()));
        }
        *self.slot.state.lock().unwrap() = ChannelState::Connected;
        let now = self.hub.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.hub.max_active.fetch_max(now, Ordering::SeqCst);
        Ok(())
    }

    async fn join(&self, id: ConversationId) -> Result<()> {
        let reply = *self.hub.join_reply.lock().unwrap();
        match reply {
            JoinReply::Accept => {
                self.slot.joined.lock().unwrap().push(id);
                Ok(())
            }
            JoinReply::Reject => Err(Error::Invocation("not a participant".into())),
            JoinReply::Never => std::future::pending::<Result<()>>().await,
        }
    }

    async fn send(&self, id: ConversationId, text: &str) -> Result<()> {
        if !self.slot.state().can_send() {
            return Err(Error::NotConnected);
        }
        self.hub.sent.lock().unwrap().push((id, text.to_string()));
        Ok(())
    }

    fn on_message(&self, handler: MessageHandler) {
        self.slot.messages.lock().unwrap().push(handler);
    }

    fn on_read(&self, handler: ReadHandler) {
        self.slot.reads.lock().unwrap().push(handler);
    }

    fn state(&self) -> ChannelState {
        self.slot.state()
    }

    async fn disconnect(&mut self) -> Result<()> {
        let mut state = self.slot.state.lock().unwrap();
        if *state == ChannelState::Connected {
            self.hub.active.fetch_sub(1, Ordering::SeqCst);
        }
        *state = ChannelState::Stopped;
        Ok(())
    }
}

struct Fixture {
    api: FakeApi,
    hub: FakeFactory,
    messenger: Messenger<FakeApi, FakeFactory>,
}

fn fixture(conversations: Vec<Conversation>) -> Fixture {
    let api = FakeApi::default();
    *api.0.conversations.lock().unwrap() = conversations;
    let hub = FakeFactory::default();
    let session = Session::in_memory(AppState { base_url: "https://artua.test".into(), token: Some("token".into()) });
    let messenger = Messenger::new(api.clone(), hub.clone(), session);
    Fixture { api, hub, messenger }
}

fn ids(messenger: &Messenger<FakeApi, FakeFactory>) -> Vec<MessageId> {
    messenger.messages().iter().map(|m| m.id).collect()
}

#[tokio::test]
async fn first_conversation_is_selected_and_opened_with_unread_reset() {
    let mut f = fixture(vec![conversation(1, 3), conversation(2, 2)]);
    f.api.0.history.lock().unwrap().insert(1, vec![message(10, None), message(11, None)]);

    assert_eq!(f.messenger.load_conversations().await.unwrap(), Some(1));
    assert_eq!(f.messenger.conversations().total_unread(), 5);
    assert_eq!(f.hub.0.created(), 0, "selecting must not open a channel");

    f.messenger.open_selected().await.unwrap();
    assert_eq!(f.messenger.open_conversation(), Some(1));
    assert_eq!(f.messenger.conversations().get(1).unwrap().unread_count, 0);
    assert_eq!(f.messenger.conversations().total_unread(), 2);
    assert_eq!(f.api.0.list_calls.load(Ordering::SeqCst), 1);
    assert_eq!(ids(&f.messenger), vec![10, 11]);
    assert_eq!(f.messenger.peer().unwrap().name, "User 1");
    assert_eq!(f.hub.0.slot(0).joined.lock().unwrap().clone(), vec![1]);
    assert!(f.messenger.can_send());
}

#[tokio::test]
async fn empty_list_selects_nothing() {
    let mut f = fixture(vec![]);
    assert_eq!(f.messenger.load_conversations().await.unwrap(), None);
    f.messenger.open_selected().await.unwrap();
    assert_eq!(f.messenger.open_conversation(), None);
    assert_eq!(f.hub.0.created(), 0);
    assert_eq!(f.messenger.channel_state(), ChannelState::Idle);
}

#[tokio::test]
async fn refresh_keeps_open_conversation_read() {
    let mut f = fixture(vec![conversation(1, 4)]);
    f.messenger.load_conversations().await.unwrap();
    f.messenger.open_selected().await.unwrap();

    // The server still reports the stale count on the next refresh.
    f.messenger.load_conversations().await.unwrap();
    assert_eq!(f.messenger.conversations().get(1).unwrap().unread_count, 0);
}

#[tokio::test]
async fn unauthorized_list_signs_out() {
    let mut f = fixture(vec![conversation(1, 0)]);
    f.api.0.unauthorized.store(true, Ordering::SeqCst);

    assert!(matches!(f.messenger.load_conversations().await, Err(Error::Unauthorized)));
    assert!(!f.messenger.session().is_signed_in());
    assert!(matches!(f.messenger.load_conversations().await, Err(Error::NotSignedIn)));
}

#[tokio::test]
async fn other_list_failures_leave_a_static_error() {
    let mut f = fixture(vec![conversation(1, 0)]);
    f.api.0.broken.store(true, Ordering::SeqCst);

    assert!(f.messenger.load_conversations().await.is_err());
    assert_eq!(f.messenger.error(), Some(LOAD_FAILED));
    assert!(f.messenger.session().is_signed_in());

    f.api.0.broken.store(false, Ordering::SeqCst);
    f.messenger.load_conversations().await.unwrap();
    assert_eq!(f.messenger.error(), None);
}

#[tokio::test]
async fn pushed_messages_are_deduplicated() {
    let mut f = fixture(vec![conversation(1, 0)]);
    f.api.0.history.lock().unwrap().insert(1, vec![message(1, None), message(2, None)]);
    f.messenger.load_conversations().await.unwrap();
    f.messenger.open_selected().await.unwrap();

    let slot = f.hub.0.slot(0);
    slot.push_message(message(2, None));
    slot.push_message(message(3, Some(1)));
    slot.push_message(message(3, Some(1)));

    assert_eq!(f.messenger.next_event().await, Some(Update::Duplicate(2)));
    assert_eq!(f.messenger.next_event().await, Some(Update::Appended(3)));
    assert_eq!(f.messenger.next_event().await, Some(Update::Duplicate(3)));
    assert_eq!(ids(&f.messenger), vec![1, 2, 3]);
}

#[tokio::test]
async fn read_receipts_mark_only_listed_messages() {
    let mut f = fixture(vec![conversation(1, 0)]);
    f.api.0.history.lock().unwrap().insert(1, vec![message(1, None), message(2, None), message(3, None)]);
    f.messenger.load_conversations().await.unwrap();
    f.messenger.open_selected().await.unwrap();

    f.hub.0.slot(0).push_read(vec![1, 3, 99]);
    assert_eq!(f.messenger.next_event().await, Some(Update::MarkedRead(2)));

    let read: Vec<bool> = f.messenger.messages().iter().map(|m| m.is_read).collect();
    assert_eq!(read, vec![true, false, true]);
}

#[tokio::test]
async fn switching_keeps_a_single_live_channel() {
    let mut f = fixture(vec![conversation(1, 0), conversation(2, 0), conversation(3, 0)]);
    f.messenger.load_conversations().await.unwrap();

    f.messenger.select(1).await.unwrap();
    f.messenger.select(2).await.unwrap();
    f.messenger.select(3).await.unwrap();

    assert_eq!(f.hub.0.created(), 3);
    assert_eq!(f.hub.0.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(f.hub.0.active_at_connect.lock().unwrap().clone(), vec![0, 0, 0]);
    assert_eq!(f.hub.0.slot(0).state(), ChannelState::Stopped);
    assert_eq!(f.hub.0.slot(1).state(), ChannelState::Stopped);
    assert_eq!(f.hub.0.slot(2).state(), ChannelState::Connected);
    assert_eq!(f.hub.0.slot(2).joined.lock().unwrap().clone(), vec![3]);
}

#[tokio::test]
async fn late_pushes_from_a_previous_channel_are_ignored() {
    let mut f = fixture(vec![conversation(1, 0), conversation(2, 0)]);
    f.api.0.history.lock().unwrap().insert(2, vec![message(20, None)]);
    f.messenger.load_conversations().await.unwrap();
    f.messenger.select(1).await.unwrap();
    f.messenger.select(2).await.unwrap();

    f.hub.0.slot(0).push_message(message(5, Some(1)));
    f.hub.0.slot(0).push_read(vec![20]);
    f.hub.0.slot(1).push_message(message(21, None));

    // Only the live channel's push is delivered.
    assert_eq!(f.messenger.next_event().await, Some(Update::Appended(21)));
    assert_eq!(ids(&f.messenger), vec![20, 21]);
    assert!(!f.messenger.messages()[0].is_read);
}

#[tokio::test]
async fn pushes_tagged_for_another_conversation_are_stale() {
    let mut f = fixture(vec![conversation(1, 0), conversation(2, 0)]);
    f.messenger.load_conversations().await.unwrap();
    f.messenger.select(2).await.unwrap();

    let update = f.messenger.apply(Inbound::Message { conversation: 1, message: message(7, None) });
    assert_eq!(update, Update::Stale(1));
    let update = f.messenger.apply(Inbound::Message { conversation: 2, message: message(8, Some(1)) });
    assert_eq!(update, Update::Stale(1));
    let update = f.messenger.apply(Inbound::Read { conversation: 1, ids: vec![8] });
    assert_eq!(update, Update::Stale(1));
    assert!(f.messenger.messages().is_empty());
}

#[tokio::test]
async fn composer_sends_text_as_typed_without_local_echo() {
    let mut f = fixture(vec![conversation(1, 0)]);
    f.messenger.load_conversations().await.unwrap();
    f.messenger.open_selected().await.unwrap();

    assert!(matches!(f.messenger.send("   \n\t").await, Err(Error::EmptyMessage)));
    assert!(f.hub.0.sent.lock().unwrap().is_empty());

    f.messenger.send("  hello there ").await.unwrap();
    assert_eq!(f.hub.0.sent.lock().unwrap().clone(), vec![(1, "  hello there ".to_string())]);
    assert!(f.messenger.messages().is_empty());
}

#[tokio::test]
async fn failed_connect_still_loads_history_but_cannot_send() {
    let mut f = fixture(vec![conversation(1, 0)]);
    f.api.0.history.lock().unwrap().insert(1, vec![message(1, None)]);
    f.hub.0.refuse.store(true, Ordering::SeqCst);

    f.messenger.load_conversations().await.unwrap();
    f.messenger.open_selected().await.unwrap();

    assert_eq!(ids(&f.messenger), vec![1]);
    assert_eq!(f.messenger.channel_state(), ChannelState::Disconnected);
    assert!(!f.messenger.can_send());
    assert!(!f.messenger.has_channel());
    assert!(matches!(f.messenger.send("hi").await, Err(Error::NotConnected)));
    assert!(f.hub.0.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn closing_stops_the_channel_and_clears_the_view() {
    let mut f = fixture(vec![conversation(1, 0)]);
    f.api.0.history.lock().unwrap().insert(1, vec![message(1, None)]);
    f.messenger.load_conversations().await.unwrap();
    f.messenger.open_selected().await.unwrap();

    f.messenger.close().await;
    assert_eq!(f.hub.0.slot(0).state(), ChannelState::Stopped);
    assert_eq!(f.hub.0.active.load(Ordering::SeqCst), 0);
    assert_eq!(f.messenger.open_conversation(), None);
    assert!(f.messenger.messages().is_empty());
    assert_eq!(f.messenger.next_event().await, None);
}

#[tokio::test]
async fn unauthorized_history_tears_down_and_signs_out() {
    let mut f = fixture(vec![conversation(1, 0)]);
    f.messenger.load_conversations().await.unwrap();
    f.api.0.unauthorized.store(true, Ordering::SeqCst);

    assert!(matches!(f.messenger.select(1).await, Err(Error::Unauthorized)));
    assert_eq!(f.hub.0.slot(0).state(), ChannelState::Stopped);
    assert!(!f.messenger.session().is_signed_in());
}

#[tokio::test]
async fn rejected_join_stops_the_channel_and_disables_sending() {
    let mut f = fixture(vec![conversation(1, 0)]);
    f.api.0.history.lock().unwrap().insert(1, vec![message(1, None)]);
    *f.hub.0.join_reply.lock().unwrap() = JoinReply::Reject;

    f.messenger.load_conversations().await.unwrap();
    f.messenger.open_selected().await.unwrap();

    assert_eq!(ids(&f.messenger), vec![1]);
    assert_eq!(f.hub.0.slot(0).state(), ChannelState::Stopped);
    assert_eq!(f.hub.0.active.load(Ordering::SeqCst), 0);
    assert_eq!(f.messenger.channel_state(), ChannelState::Disconnected);
    assert!(!f.messenger.can_send());
    assert!(!f.messenger.has_channel());

    assert!(matches!(f.messenger.send("hello").await, Err(Error::NotConnected)));
    assert!(f.hub.0.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn history_loads_while_the_join_never_completes() {
    let mut f = fixture(vec![conversation(1, 0)]);
    f.messenger = f.messenger.with_join_timeout(Duration::from_millis(100));
    f.api.0.history.lock().unwrap().insert(1, vec![message(1, None), message(2, None)]);
    *f.hub.0.join_reply.lock().unwrap() = JoinReply::Never;

    f.messenger.load_conversations().await.unwrap();
    timeout(Duration::from_secs(2), f.messenger.select(1))
        .await
        .expect("select waited on the join")
        .unwrap();

    assert_eq!(ids(&f.messenger), vec![1, 2]);
    assert_eq!(f.messenger.channel_state(), ChannelState::Disconnected);
    assert_eq!(f.hub.0.slot(0).state(), ChannelState::Stopped);
}

#[tokio::test]
async fn refresh_keeps_the_open_conversation_selected() {
    let mut f = fixture(vec![conversation(1, 0), conversation(2, 0)]);
    f.messenger.load_conversations().await.unwrap();
    f.messenger.select(2).await.unwrap();

    assert_eq!(f.messenger.load_conversations().await.unwrap(), Some(2));
    assert_eq!(f.messenger.open_conversation(), Some(2));
}

#[tokio::test]
async fn refresh_closes_a_conversation_the_server_dropped() {
    let mut f = fixture(vec![conversation(1, 0), conversation(2, 0)]);
    f.api.0.history.lock().unwrap().insert(2, vec![message(5, None)]);
    f.messenger.load_conversations().await.unwrap();
    f.messenger.select(2).await.unwrap();

    *f.api.0.conversations.lock().unwrap() = vec![conversation(1, 0), conversation(3, 0)];
    assert_eq!(f.messenger.load_conversations().await.unwrap(), Some(1));

    assert_eq!(f.messenger.open_conversation(), None);
    assert_eq!(f.messenger.conversations().selected(), Some(1));
    assert!(f.messenger.messages().is_empty());
    assert_eq!(f.hub.0.slot(0).state(), ChannelState::Stopped);
    assert!(!f.messenger.has_channel());
}

#[tokio::test]
async fn unread_refresh_ends_on_a_lost_session() {
    let mut f = fixture(vec![conversation(1, 0)]);
    f.messenger.load_conversations().await.unwrap();
    f.messenger.open_selected().await.unwrap();

    f.api.0.broken.store(true, Ordering::SeqCst);
    f.messenger.refresh_unread().await.unwrap();
    assert!(f.messenger.has_channel());

    f.api.0.broken.store(false, Ordering::SeqCst);
    f.api.0.unauthorized.store(true, Ordering::SeqCst);
    assert!(matches!(f.messenger.refresh_unread().await, Err(Error::Unauthorized)));
    assert!(!f.messenger.session().is_signed_in());
    assert!(!f.messenger.has_channel());
    assert_eq!(f.hub.0.slot(0).state(), ChannelState::Stopped);
}
