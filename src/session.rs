//! Chat session model
//!
//! In-memory representation of one conversation: ordered user/assistant
//! message turns plus per-session search state. Everything here is pure data
//! manipulation with value semantics; no I/O. The UI layer manipulates a
//! [`ChatRecord`] through these functions and flushes it to the
//! [`ChatStore`](crate::storage::ChatStore) after each completed turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::search::SearchResult;

/// Maximum number of characters carried into a derived chat title.
pub const TITLE_MAX_CHARS: usize = 50;

/// Role of a message sender
///
/// Fixed at creation, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A message typed by the user
    User,
    /// A message produced by the summarizer (or its fallback)
    Assistant,
}

/// One message turn within a chat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Unique within the chat
    pub id: String,
    /// Sender role, fixed at creation
    pub role: Role,
    /// Message text (possibly markdown)
    pub content: String,
    /// Creation time, used for ordering and display
    pub timestamp: DateTime<Utc>,
}

impl MessageRecord {
    /// Creates a new user message
    ///
    /// # Examples
    ///
    /// ```
    /// use ideascope::session::{MessageRecord, Role};
    ///
    /// let msg = MessageRecord::user("machine learning");
    /// assert_eq!(msg.role, Role::User);
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Creates a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// One persisted conversation
///
/// `results` is session-only state: it is never serialized, and a record
/// reconstructed from storage always starts with an empty result list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRecord {
    /// Opaque unique identifier, assigned at creation, immutable
    pub id: String,
    /// Derived once from the first user message, immutable after creation
    pub title: String,
    /// Creation time; sort and retention key
    pub created_at: DateTime<Utc>,
    /// Ordered messages, append-only during a session
    pub messages: Vec<MessageRecord>,
    /// Last computed narrative summary, overwritten per search
    #[serde(default)]
    pub summary: Option<String>,
    /// Ranked results for the current session only; cleared on chat switch
    #[serde(skip)]
    pub results: Vec<SearchResult>,
}

impl ChatRecord {
    /// Creates a new chat seeded with its first user message
    ///
    /// The title is derived from the message text and never changes
    /// afterwards.
    ///
    /// # Examples
    ///
    /// ```
    /// use ideascope::session::ChatRecord;
    ///
    /// let chat = ChatRecord::new("rust compilers");
    /// assert_eq!(chat.title, "rust compilers");
    /// assert_eq!(chat.messages.len(), 1);
    /// assert!(chat.results.is_empty());
    /// ```
    pub fn new(first_user_text: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: derive_title(first_user_text),
            created_at: Utc::now(),
            messages: vec![MessageRecord::user(first_user_text)],
            summary: None,
            results: Vec::new(),
        }
    }

    /// First eight characters of the chat id, for display and prefix lookup
    pub fn short_id(&self) -> &str {
        &self.id[..8.min(self.id.len())]
    }
}

/// Returns a copy of `chat` with `message` appended
///
/// Never mutates the input in place, so the active chat and any history
/// listing holding the same record cannot alias each other's updates.
pub fn append_message(chat: &ChatRecord, message: MessageRecord) -> ChatRecord {
    let mut updated = chat.clone();
    updated.messages.push(message);
    updated
}

/// Derives a chat title from its first user message
///
/// First [`TITLE_MAX_CHARS`] characters of the trimmed text, with an
/// ellipsis suffix if truncated. Character-aware: never splits a UTF-8
/// scalar.
///
/// # Examples
///
/// ```
/// use ideascope::session::derive_title;
///
/// assert_eq!(derive_title("short"), "short");
/// assert!(derive_title(&"x".repeat(80)).ends_with('…'));
/// ```
pub fn derive_title(text: &str) -> String {
    let trimmed = text.trim();
    let mut chars = trimmed.chars();
    let title: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{title}…")
    } else {
        title
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_chat_seeds_first_user_message() {
        let chat = ChatRecord::new("find me compiler projects");
        assert_eq!(chat.messages.len(), 1);
        assert_eq!(chat.messages[0].role, Role::User);
        assert_eq!(chat.messages[0].content, "find me compiler projects");
        assert!(chat.summary.is_none());
        assert!(chat.results.is_empty());
    }

    #[test]
    fn test_new_chats_get_distinct_ids() {
        let a = ChatRecord::new("one");
        let b = ChatRecord::new("one");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_append_message_does_not_mutate_input() {
        let chat = ChatRecord::new("hello");
        let updated = append_message(&chat, MessageRecord::assistant("hi"));
        assert_eq!(chat.messages.len(), 1);
        assert_eq!(updated.messages.len(), 2);
        assert_eq!(updated.messages[1].role, Role::Assistant);
    }

    #[test]
    fn test_derive_title_passes_short_text_through() {
        assert_eq!(derive_title("web scraping"), "web scraping");
    }

    #[test]
    fn test_derive_title_trims_whitespace() {
        assert_eq!(derive_title("  padded  "), "padded");
    }

    #[test]
    fn test_derive_title_truncates_with_ellipsis() {
        let long = "a".repeat(60);
        let title = derive_title(&long);
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 1);
        assert!(title.ends_with('…'));
    }

    #[test]
    fn test_derive_title_is_char_aware() {
        // 60 multibyte scalars; byte-based slicing would panic or split one.
        let long = "é".repeat(60);
        let title = derive_title(&long);
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 1);
    }

    #[test]
    fn test_derive_title_exact_boundary_has_no_ellipsis() {
        let exact = "b".repeat(TITLE_MAX_CHARS);
        assert_eq!(derive_title(&exact), exact);
    }

    #[test]
    fn test_results_are_not_serialized() {
        let mut chat = ChatRecord::new("volatile");
        chat.results.push(SearchResult {
            document: "idea text".to_string(),
            metadata: Default::default(),
            similarity_score: 0.9,
        });
        let json = serde_json::to_string(&chat).unwrap();
        let back: ChatRecord = serde_json::from_str(&json).unwrap();
        assert!(back.results.is_empty());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn test_short_id_is_prefix() {
        let chat = ChatRecord::new("prefix");
        assert_eq!(chat.short_id(), &chat.id[..8]);
    }
}
