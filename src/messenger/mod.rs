pub mod composer;
pub mod conversations;
pub mod panel;
pub mod store;

pub use composer::Composer;
pub use conversations::ConversationList;
pub use panel::{Inbound, Messenger, Update};
pub use store::MessageStore;
