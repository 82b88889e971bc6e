use crate::api::models::{Conversation, ConversationId};

/// Shown in place of the list when the fetch fails.
pub const LOAD_FAILED: &str = "failed to load conversations";

#[derive(Debug, Default, Clone)]
pub struct ConversationList {
    items: Vec<Conversation>,
    selected: Option<ConversationId>,
}

impl ConversationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a freshly fetched list. With nothing selected (or the selection
    /// gone from the list) the first entry becomes selected; an empty list
    /// selects nothing. Returns the resulting selection.
    pub fn set(&mut self, items: Vec<Conversation>) -> Option<ConversationId> {
        self.items = items;
        let still_there = self.selected.is_some_and(|id| self.get(id).is_some());
        if !still_there {
            self.selected = self.items.first().map(|c| c.id);
        }
        self.selected
    }

    pub fn select(&mut self, id: ConversationId) {
        self.selected = Some(id);
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Zero the unread badge of a conversation the user just opened.
    /// Returns the count that was cleared.
    pub fn mark_opened(&mut self, id: ConversationId) -> u32 {
        self.items
            .iter_mut()
            .find(|c| c.id == id)
            .map(|c| std::mem::take(&mut c.unread_count))
            .unwrap_or(0)
    }

    pub fn total_unread(&self) -> u32 {
        self.items.iter().map(|c| c.unread_count).sum()
    }

    pub fn get(&self, id: ConversationId) -> Option<&Conversation> {
        self.items.iter().find(|c| c.id == id)
    }

    pub fn items(&self) -> &[Conversation] {
        &self.items
    }

    pub fn selected(&self) -> Option<ConversationId> {
        self.selected
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
