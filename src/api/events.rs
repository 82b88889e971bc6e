use serde_json::Value;

use crate::api::models::{ConversationId, Message, MessageId, ProductId};
use crate::error::{Error, Result};

pub const RECEIVE_MESSAGE: &str = "ReceiveMessage";
pub const MESSAGES_READ: &str = "MessagesRead";
pub const NEW_MESSAGE_NOTIFICATION: &str = "NewMessageNotification";
pub const LIKE_UPDATE_NOTIFICATION: &str = "LikeUpdateNotification";

pub const JOIN_CONVERSATION: &str = "JoinConversation";
pub const SEND_MESSAGE: &str = "SendMessage";

/// Server-pushed hub events the client understands.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    ReceiveMessage(Message),
    MessagesRead(Vec<MessageId>),
    NewMessageNotification(ConversationId),
    LikeUpdate { product_id: ProductId, is_liked: bool },
}

impl HubEvent {
    /// Decode a server invocation. Unknown targets yield `Ok(None)`.
    pub fn from_invocation(target: &str, arguments: &[Value]) -> Result<Option<Self>> {
        let event = match target {
            RECEIVE_MESSAGE => HubEvent::ReceiveMessage(decode_arg(target, arguments, 0)?),
            MESSAGES_READ => HubEvent::MessagesRead(decode_arg(target, arguments, 0)?),
            NEW_MESSAGE_NOTIFICATION => {
                HubEvent::NewMessageNotification(decode_arg(target, arguments, 0)?)
            }
            LIKE_UPDATE_NOTIFICATION => HubEvent::LikeUpdate {
                product_id: decode_arg(target, arguments, 0)?,
                is_liked: decode_arg(target, arguments, 1)?,
            },
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

fn decode_arg<T: serde::de::DeserializeOwned>(target: &str, arguments: &[Value], index: usize) -> Result<T> {
    let value = arguments
        .get(index)
        .ok_or_else(|| Error::Protocol(format!("{target}: missing argument {index}")))?;
    serde_json::from_value(value.clone())
        .map_err(|e| Error::Protocol(format!("{target}: argument {index}: {e}")))
}
