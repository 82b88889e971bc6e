use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ConversationId = i64;
pub type MessageId = i64;
pub type ProductId = i64;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub content: String,
    pub sender_id: String,
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
    /// Only present on some server payloads; used to reject pushes meant for another conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub last_message: Option<Message>,
    #[serde(default)]
    pub unread_count: u32,
}

impl Conversation {
    /// The participant to show for this conversation: the first one that is not `me`.
    pub fn peer(&self, me: Option<&str>) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| Some(p.id.as_str()) != me)
            .or_else(|| self.participants.first())
    }

    pub fn title(&self, me: Option<&str>) -> String {
        self.peer(me)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| format!("Conversation {}", self.id))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub my_country: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    /// PNG bytes uploaded as the `Avatar` form part.
    pub avatar: Option<Vec<u8>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub technique: Option<String>,
    #[serde(default)]
    pub artistic_direction: Option<String>,
    #[serde(default)]
    pub year_created: Option<i32>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub likes_count: u32,
    #[serde(default)]
    pub views_count: u32,
    #[serde(default)]
    pub is_liked_by_current_user: bool,
    #[serde(default)]
    pub created_by_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub total_items: u32,
    #[serde(default = "one")]
    pub total_pages: u32,
    #[serde(default = "one")]
    pub current_page: u32,
    #[serde(default)]
    pub page_size: u32,
}

fn one() -> u32 {
    1
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self { items: Vec::new(), total_items: 0, total_pages: 1, current_page: 1, page_size: 0 }
    }
}

/// Query string for `/api/Products/filtered`.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub page: u32,
    pub page_size: u32,
    pub category: Option<String>,
    pub sort_by: Option<String>,
    pub author_id: Option<String>,
    pub price_from: Option<f64>,
    pub price_to: Option<f64>,
    pub techniques: Vec<String>,
}

impl ProductFilter {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("page", self.page.max(1).to_string()),
            ("pageSize", self.page_size.max(1).to_string()),
        ];
        if let Some(c) = &self.category {
            pairs.push(("category", c.clone()));
        }
        if let Some(s) = &self.sort_by {
            pairs.push(("sortBy", s.clone()));
        }
        if let Some(a) = &self.author_id {
            pairs.push(("authorId", a.clone()));
        }
        if let Some(p) = self.price_from {
            pairs.push(("priceFrom", p.to_string()));
        }
        if let Some(p) = self.price_to {
            pairs.push(("priceTo", p.to_string()));
        }
        for t in &self.techniques {
            pairs.push(("techniques", t.clone()));
        }
        pairs
    }
}
