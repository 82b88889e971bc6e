use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{Duration, interval};

use artua::api::ApiClient;
use artua::api::models::ConversationId;
use artua::error::{Error, Result};
use artua::api::events::HubEvent;
use artua::hub::{ChannelFactory, ChannelState, HubFactory, RealtimeChannel};
use artua::messenger::{Messenger, Update};
use artua::storage::Cache;

use crate::ui::chat_view::ChatView;
use crate::ui::sidebar::Sidebar;

pub type AppMessenger = Messenger<ApiClient, HubFactory>;

const HELP: &str = "Commands: /list, /open <id>, /refresh, /quit. Anything else is sent.";

/// Refresh the list, from cache first and then from the server.
pub async fn load_list(messenger: &mut AppMessenger, cache: Option<&mut Cache>) -> Result<()> {
    let me = messenger.session().current_user().map(|u| u.id);
    let mut cache = cache;
    if let Some(cache) = cache.as_deref() {
        match cache.conversations(Some(200)) {
            Ok(cached) if !cached.is_empty() && messenger.conversations().is_empty() => {
                messenger.show_cached(cached);
                print!("{}", Sidebar::render(messenger.conversations(), me.as_deref()));
            }
            Ok(_) => {}
            Err(e) => log::debug!("conversation cache unavailable: {e}"),
        }
    }

    if let Err(e) = messenger.load_conversations().await {
        if let Some(message) = messenger.error() {
            println!("{message}");
        }
        return Err(e);
    }
    if let Some(cache) = cache.as_deref_mut() {
        if let Err(e) = cache.replace_conversations(messenger.conversations().items()) {
            log::warn!("could not update conversation cache: {e}");
        }
    }
    print!("{}", Sidebar::render(messenger.conversations(), me.as_deref()));
    Ok(())
}

async fn open(messenger: &mut AppMessenger, id: ConversationId) -> Result<()> {
    let result = messenger.select(id).await;
    let me = messenger.session().current_user().map(|u| u.id);
    print!(
        "{}",
        ChatView::render(messenger.peer(), messenger.channel_state(), messenger.messages(), me.as_deref())
    );
    match result {
        Err(Error::Unauthorized) => Err(Error::Unauthorized),
        Err(e) => {
            println!("could not load messages: {e}");
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}

/// Interactive messenger: the list, the open conversation and a composer on stdin.
pub async fn run(mut messenger: AppMessenger, mut cache: Option<Cache>, initial: Option<ConversationId>) -> Result<()> {
    load_list(&mut messenger, cache.as_mut()).await?;
    if let Some(id) = initial.or(messenger.conversations().selected()) {
        open(&mut messenger, id).await?;
    }
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut state_tick = interval(Duration::from_millis(500));
    let mut shown_state = messenger.channel_state();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim_end();
                match line.split_once(' ').map_or((line, ""), |(c, rest)| (c, rest.trim())) {
                    ("/quit", _) => break,
                    ("/list", _) => {
                        let me = messenger.session().current_user().map(|u| u.id);
                        print!("{}", Sidebar::render(messenger.conversations(), me.as_deref()));
                    }
                    ("/refresh", _) => {
                        let was_open = messenger.open_conversation();
                        load_list(&mut messenger, cache.as_mut()).await?;
                        if let Some(id) = was_open.filter(|_| messenger.open_conversation().is_none()) {
                            println!("conversation {id} is no longer available");
                        }
                    }
                    ("/open", arg) => match arg.parse::<ConversationId>() {
                        Ok(id) => open(&mut messenger, id).await?,
                        Err(_) => println!("usage: /open <conversation id>"),
                    },
                    _ if line.starts_with('/') => println!("{HELP}"),
                    _ => match messenger.send(line).await {
                        Ok(()) | Err(Error::EmptyMessage) => {}
                        Err(Error::NotConnected) => println!("(offline, message not sent)"),
                        Err(_) => {}
                    },
                }
            }
            update = messenger.next_event(), if messenger.has_channel() => {
                let me = messenger.session().current_user().map(|u| u.id);
                match update {
                    Some(Update::Appended(_)) => {
                        if let Some(m) = messenger.messages().last() {
                            println!("{}", ChatView::message(m, me.as_deref()));
                        }
                    }
                    Some(Update::MarkedRead(n)) if n > 0 => {
                        println!("── {n} message(s) read");
                        messenger.refresh_unread().await?;
                    }
                    _ => {}
                }
            }
            _ = state_tick.tick() => {
                let state = messenger.channel_state();
                if state != shown_state {
                    shown_state = state;
                    match state {
                        ChannelState::Connected => println!("● online"),
                        ChannelState::Reconnecting | ChannelState::Disconnected => println!("○ offline, reconnecting…"),
                        _ => {}
                    }
                }
            }
        }
    }

    messenger.close().await;
    Ok(())
}

/// Listen on the hub without joining a conversation; only app-wide
/// notifications arrive there.
pub async fn notifications(factory: HubFactory, token: &str) -> Result<()> {
    let mut hub = factory.create(token)?;
    hub.on_event(Box::new(|event| match event {
        HubEvent::NewMessageNotification(id) => println!("✉ new message in conversation {id}"),
        HubEvent::LikeUpdate { product_id, is_liked } => {
            println!("{} product {product_id}", if is_liked { "♥ liked" } else { "♡ unliked" })
        }
        _ => {}
    }));
    hub.connect().await?;
    println!("Listening for notifications, Ctrl-C to stop.");

    let mut states = hub.watch_state();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                match state {
                    ChannelState::Connected => println!("● online"),
                    ChannelState::Reconnecting => println!("○ offline, reconnecting…"),
                    ChannelState::Disconnected => println!("○ offline"),
                    _ => {}
                }
            }
        }
    }
    hub.disconnect().await
}
