use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata row for a stored chat, as returned by
/// [`ChatStore::list_recent`](super::ChatStore::list_recent)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSummary {
    /// Unique identifier of the chat
    pub id: String,
    /// Title derived from the first user message
    pub title: String,
    /// When the chat was created
    pub created_at: DateTime<Utc>,
    /// Number of messages in the chat
    pub message_count: usize,
}

/// Opaque continuation cursor for [`ChatStore::list_recent`](super::ChatStore::list_recent)
///
/// A copy of the last-seen index key (creation-time string plus id
/// tiebreak). Passing it back resumes the scan after that key instead of
/// re-scanning from the start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub(crate) created_at: String,
    pub(crate) id: String,
}
