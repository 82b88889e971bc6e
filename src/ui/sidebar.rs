use artua::api::models::Conversation;
use artua::messenger::ConversationList;

const PREVIEW_WIDTH: usize = 40;

pub struct Sidebar;

impl Sidebar {
    pub fn render(list: &ConversationList, me: Option<&str>) -> String {
        if list.is_empty() {
            return "No conversations yet.\n".to_string();
        }
        let mut out = format!("Conversations ({} unread)\n", list.total_unread());
        for conv in list.items() {
            out.push_str(&Self::row(conv, list.selected() == Some(conv.id), me));
            out.push('\n');
        }
        out
    }

    fn row(conv: &Conversation, selected: bool, me: Option<&str>) -> String {
        let marker = if selected { '>' } else { ' ' };
        let mut row = format!("{marker} [{}] {}", conv.id, conv.title(me));
        if conv.unread_count > 0 {
            row.push_str(&format!(" ({})", conv.unread_count));
        }
        match &conv.last_message {
            Some(last) => {
                let date = last.sent_at.format("%d.%m.%Y");
                row.push_str(&format!("  {} · {}", preview(&last.content), date));
            }
            None => row.push_str("  no messages"),
        }
        row
    }
}

fn preview(content: &str) -> String {
    let single_line = content.replace('\n', " ");
    if single_line.chars().count() <= PREVIEW_WIDTH {
        return single_line;
    }
    let cut: String = single_line.chars().take(PREVIEW_WIDTH - 1).collect();
    format!("{cut}…")
}
