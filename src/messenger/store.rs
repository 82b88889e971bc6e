use std::collections::HashSet;

use crate::api::models::{Message, MessageId};

/// Messages of the open conversation, in arrival order, unique by id.
#[derive(Debug, Default, Clone)]
pub struct MessageStore {
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset from a history fetch. Later duplicates of an id are dropped.
    pub fn replace(&mut self, history: Vec<Message>) {
        self.clear();
        for message in history {
            self.merge(message);
        }
    }

    /// Append unless the id is already present. Returns whether it was appended.
    pub fn merge(&mut self, message: Message) -> bool {
        if !self.ids.insert(message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Flag every listed message that is present as read. Unknown ids are
    /// ignored. Returns how many messages changed.
    pub fn mark_read(&mut self, ids: &[MessageId]) -> usize {
        let wanted: HashSet<MessageId> = ids.iter().copied().collect();
        let mut changed = 0;
        for message in self.messages.iter_mut().filter(|m| wanted.contains(&m.id)) {
            if !message.is_read {
                message.is_read = true;
                changed += 1;
            }
        }
        changed
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
