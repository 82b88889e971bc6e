use artua::api::models::{Message, Participant};
use artua::hub::ChannelState;
use artua::utils::short_time;

pub struct ChatView;

impl ChatView {
    pub fn header(peer: Option<&Participant>, state: ChannelState) -> String {
        let dot = if state.can_send() { '●' } else { '○' };
        let name = peer.map(|p| p.name.as_str()).unwrap_or("Conversation");
        format!("{dot} {name}")
    }

    pub fn message(message: &Message, me: Option<&str>) -> String {
        let status = if message.is_read { "read" } else { "sent" };
        let time = short_time(&message.sent_at);
        if Some(message.sender_id.as_str()) == me {
            format!("{:>12} {time} {status} | {}", "you", message.content)
        } else {
            format!("{:<12} {time} {status} | {}", "them", message.content)
        }
    }

    pub fn render(peer: Option<&Participant>, state: ChannelState, messages: &[Message], me: Option<&str>) -> String {
        let mut out = Self::header(peer, state);
        out.push('\n');
        if messages.is_empty() {
            out.push_str("  (no messages yet)\n");
        }
        for m in messages {
            out.push_str(&Self::message(m, me));
            out.push('\n');
        }
        out
    }
}
