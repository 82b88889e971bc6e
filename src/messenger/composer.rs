use crate::error::{Error, Result};

pub struct Composer;

impl Composer {
    /// Validate a draft before anything goes on the wire. The text is sent as
    /// typed; only blank drafts are refused.
    pub fn prepare(draft: &str) -> Result<&str> {
        if draft.trim().is_empty() {
            return Err(Error::EmptyMessage);
        }
        Ok(draft)
    }
}
