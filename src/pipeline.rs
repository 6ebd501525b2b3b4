//! Query pipeline
//!
//! Orchestrates one user turn: optional query enhancement, ranked-result
//! retrieval, and a progressively streamed summary, with deterministic
//! fallbacks instead of retries. The turn is a small state machine
//! ([`TurnPhase`]); an enhancement failure silently degrades to the raw
//! query, a summarizer failure degrades to a synthesized summary built from
//! the result set, and only a search failure fails the turn.

use std::collections::HashSet;
use std::fmt;

use bytes::Bytes;
use colored::Colorize;
use futures::{Stream, StreamExt};

use crate::assistant::AssistantClient;
use crate::error::{IdeascopeError, Result};
use crate::search::{SearchClient, SearchResult};
use crate::session::{self, ChatRecord, MessageRecord};
use crate::storage::ChatStore;

/// Fixed assistant content when a search comes back empty
pub const NO_RESULTS_NOTICE: &str =
    "No matching project ideas were found. Try rephrasing your query or requesting more results.";

/// Heading line of the synthesized fallback summary
pub const FALLBACK_HEADING: &str = "# GSoC Project Ideas";

const FALLBACK_NOTICE: &str =
    "*The AI summarizer is currently unavailable, so here are the ranked results directly.*";

/// Phase of one user turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// No turn in progress
    Idle,
    /// Rewriting the query through the enhancement endpoint
    Enhancing,
    /// Fetching ranked results
    Searching,
    /// Streaming the summary
    Summarizing,
    /// Turn finished with an assistant message
    Done,
    /// Turn failed; only reachable from the search leg in practice
    Failed,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Enhancing => write!(f, "ENHANCING"),
            Self::Searching => write!(f, "SEARCHING"),
            Self::Summarizing => write!(f, "SUMMARIZING"),
            Self::Done => write!(f, "DONE"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Query handling mode for a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Send the user text to the search service as-is
    Raw,
    /// Rewrite the query through the enhancement endpoint first
    Enhanced,
}

impl QueryMode {
    /// Parse a query mode from a string
    ///
    /// # Examples
    ///
    /// ```
    /// use ideascope::pipeline::QueryMode;
    ///
    /// let mode = QueryMode::parse_str("enhanced").unwrap();
    /// assert_eq!(mode, QueryMode::Enhanced);
    /// ```
    pub fn parse_str(s: &str) -> std::result::Result<Self, String> {
        match s.to_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "enhanced" => Ok(Self::Enhanced),
            other => Err(format!("Unknown query mode: {}", other)),
        }
    }

    /// Colored tag representation for the chat prompt
    pub fn colored_tag(&self) -> String {
        match self {
            Self::Raw => format!("[{}]", "RAW".cyan()),
            Self::Enhanced => format!("[{}]", "ENHANCED".purple()),
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => write!(f, "RAW"),
            Self::Enhanced => write!(f, "ENHANCED"),
        }
    }
}

/// Per-turn options supplied by the controller
#[derive(Debug, Clone, Copy)]
pub struct TurnOptions {
    /// Query handling mode
    pub mode: QueryMode,
    /// How many ranked results to request; must be positive
    pub result_count: u32,
}

/// Listener for progressive turn updates
///
/// After each chunk, `so_far` equals the full concatenation of every chunk
/// received so far, in arrival order.
pub trait SummaryObserver {
    /// Called on every phase transition
    fn phase(&mut self, _phase: TurnPhase) {}

    /// Called after each summary increment is applied
    fn chunk(&mut self, _delta: &str, _so_far: &str) {}
}

/// Observer that ignores all updates
pub struct NullObserver;

impl SummaryObserver for NullObserver {}

/// Outcome of one pipeline turn
#[derive(Debug)]
pub enum TurnOutcome {
    /// Empty or whitespace-only query: nothing happened
    Skipped,
    /// Turn completed with an assistant message appended
    Completed {
        /// The updated chat, including the new user and assistant messages
        chat: ChatRecord,
        /// Whether the summary came from the stream (false: fallback or
        /// no-results notice)
        summary_streamed: bool,
    },
}

/// Session-scoped UI state: the active chat plus the turn lock
///
/// Replaces the source design's global mutable search state with an
/// explicit object owned by the controller. The lock flag enforces at most
/// one in-flight turn per chat: new-chat creation and chat switching are
/// rejected while a turn runs.
#[derive(Debug, Default)]
pub struct SessionState {
    chat: Option<ChatRecord>,
    turn_in_flight: bool,
}

impl SessionState {
    /// Fresh state with no active chat
    pub fn new() -> Self {
        Self::default()
    }

    /// The active chat, if any
    pub fn chat(&self) -> Option<&ChatRecord> {
        self.chat.as_ref()
    }

    /// Whether a turn is currently running
    pub fn is_turn_in_flight(&self) -> bool {
        self.turn_in_flight
    }

    /// Switch to (or create) a chat; rejected while a turn is in flight
    pub fn set_chat(&mut self, mut chat: ChatRecord) -> Result<()> {
        self.ensure_idle()?;
        // Session-only state never crosses a chat switch.
        chat.results.clear();
        self.chat = Some(chat);
        Ok(())
    }

    /// Drop the active chat; rejected while a turn is in flight
    pub fn clear_chat(&mut self) -> Result<()> {
        self.ensure_idle()?;
        self.chat = None;
        Ok(())
    }

    /// Acquire the turn lock
    pub fn begin_turn(&mut self) -> Result<()> {
        self.ensure_idle()?;
        self.turn_in_flight = true;
        Ok(())
    }

    /// Release the turn lock
    pub fn end_turn(&mut self) {
        self.turn_in_flight = false;
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.turn_in_flight {
            return Err(
                IdeascopeError::Validation("a turn is already in flight for this chat".into())
                    .into(),
            );
        }
        Ok(())
    }
}

/// Orchestrator for user turns
pub struct QueryPipeline {
    search: SearchClient,
    assistant: AssistantClient,
    store: ChatStore,
}

impl QueryPipeline {
    /// Build a pipeline over its three collaborators
    pub fn new(search: SearchClient, assistant: AssistantClient, store: ChatStore) -> Self {
        Self {
            search,
            assistant,
            store,
        }
    }

    /// Run one user turn against `chat`
    ///
    /// `chat` must already contain the turn's user message (the controller
    /// appends it); the input is never mutated. On success the returned
    /// outcome carries the updated chat, already persisted best-effort.
    ///
    /// # Errors
    ///
    /// Fails only when the ranked-result request fails (or the result count
    /// is not positive); enhancement and summarization failures degrade to
    /// deterministic fallbacks. No request is ever retried.
    pub async fn run_turn(
        &self,
        chat: &ChatRecord,
        query: &str,
        opts: &TurnOptions,
        observer: &mut dyn SummaryObserver,
    ) -> Result<TurnOutcome> {
        let raw = query.trim();
        if raw.is_empty() {
            return Ok(TurnOutcome::Skipped);
        }
        if opts.result_count == 0 {
            return Err(
                IdeascopeError::Validation("result count must be a positive integer".into()).into(),
            );
        }

        let mut chat = chat.clone();
        chat.results.clear();

        let effective_query = match opts.mode {
            QueryMode::Enhanced => {
                observer.phase(TurnPhase::Enhancing);
                match self.assistant.enhance(raw).await {
                    Ok(enhanced) if !enhanced.trim().is_empty() => enhanced,
                    Ok(_) => raw.to_string(),
                    Err(e) => {
                        // Recoverable: search with the user's own words.
                        tracing::debug!("query enhancement unavailable, using raw query: {}", e);
                        raw.to_string()
                    }
                }
            }
            QueryMode::Raw => raw.to_string(),
        };

        observer.phase(TurnPhase::Searching);
        let results = match self
            .search
            .query(&effective_query, opts.result_count)
            .await
        {
            Ok(results) => results,
            Err(e) => {
                observer.phase(TurnPhase::Failed);
                return Err(e);
            }
        };

        let (content, summary_streamed) = if results.is_empty() {
            (NO_RESULTS_NOTICE.to_string(), false)
        } else {
            chat.results = results.clone();
            observer.phase(TurnPhase::Summarizing);

            let streamed = self.stream_summary(&results, &mut chat, observer).await;
            match streamed {
                Ok(text) if !text.trim().is_empty() => (text, true),
                Ok(_) => {
                    tracing::warn!("summarizer returned an empty stream, using fallback summary");
                    (fallback_summary(&results), false)
                }
                Err(e) => {
                    tracing::warn!("summarizer failed, using fallback summary: {}", e);
                    (fallback_summary(&results), false)
                }
            }
        };

        if !results.is_empty() {
            chat.summary = Some(content.clone());
        }

        let chat = session::append_message(&chat, MessageRecord::assistant(&content));
        observer.phase(TurnPhase::Done);

        self.persist_turn(&chat);

        Ok(TurnOutcome::Completed {
            chat,
            summary_streamed,
        })
    }

    /// Stream the summary, publishing each increment to `chat.summary` and
    /// the observer
    ///
    /// The final text is either the full stream concatenation or an error;
    /// a partial fragment never escapes this function.
    async fn stream_summary(
        &self,
        results: &[SearchResult],
        chat: &mut ChatRecord,
        observer: &mut dyn SummaryObserver,
    ) -> Result<String> {
        let stream = self.assistant.summarize(results).await?;

        let summary_cell = &mut chat.summary;
        let text = drain_text_stream(stream, |delta, so_far| {
            *summary_cell = Some(so_far.to_string());
            observer.chunk(delta, so_far);
        })
        .await?;

        Ok(text)
    }

    /// Best-effort end-of-turn save
    ///
    /// Re-fetches the authoritative record by id immediately before the
    /// write, so a delayed save can never clobber the stored copy with
    /// stale closure-captured data. A storage failure is logged and
    /// reported nowhere else: the in-memory chat survives.
    fn persist_turn(&self, chat: &ChatRecord) {
        let record = match self.store.get(&chat.id) {
            Ok(Some(stored)) => merge_turn(stored, chat),
            Ok(None) => chat.clone(),
            Err(e) => {
                tracing::warn!("pre-save read failed for chat {}: {}", chat.id, e);
                chat.clone()
            }
        };

        if let Err(e) = self.store.upsert(&record) {
            tracing::error!("failed to persist chat {}: {}", chat.id, e);
        }
    }
}

/// Apply a turn's new messages and summary onto the stored record
fn merge_turn(stored: ChatRecord, live: &ChatRecord) -> ChatRecord {
    let mut merged = stored;
    let known: HashSet<String> = merged.messages.iter().map(|m| m.id.clone()).collect();
    for message in &live.messages {
        if !known.contains(&message.id) {
            merged.messages.push(message.clone());
        }
    }
    merged.summary = live.summary.clone();
    merged
}

/// Deterministic summary synthesized directly from the ranked results
///
/// Used whenever the summarizer is unavailable or dies mid-stream: an
/// ordered listing of each result's organization, idea count, links, and
/// body text, under a fixed heading with an unavailability notice.
pub fn fallback_summary(results: &[SearchResult]) -> String {
    let mut out = String::from(FALLBACK_HEADING);
    out.push_str("\n\n");
    out.push_str(FALLBACK_NOTICE);
    out.push('\n');

    for (i, result) in results.iter().enumerate() {
        out.push('\n');
        let organization = if result.metadata.organization_name.is_empty() {
            "Unknown organization"
        } else {
            &result.metadata.organization_name
        };
        out.push_str(&format!("## {}. {}\n\n", i + 1, organization));

        if let Some(count) = result.metadata.no_of_ideas {
            out.push_str(&format!("- Ideas listed: {count}\n"));
        }
        if let Some(url) = &result.metadata.gsocorganization_dev_url {
            out.push_str(&format!("- Organization page: {url}\n"));
        }
        if let Some(url) = &result.metadata.idea_list_url {
            out.push_str(&format!("- Idea list: {url}\n"));
        }
        out.push_str(&format!(
            "- Relevance: {:.0}%\n",
            result.similarity_score * 100.0
        ));

        out.push('\n');
        out.push_str(result.document.trim());
        out.push('\n');
    }

    out
}

/// Consume a byte stream as UTF-8 text, invoking `on_chunk(delta, so_far)`
/// per decoded increment
///
/// Chunk boundaries are arbitrary, so a multi-byte scalar split across two
/// chunks is held back until its remaining bytes arrive. Hard-invalid bytes
/// decode to U+FFFD.
pub(crate) async fn drain_text_stream<S, E>(
    stream: S,
    mut on_chunk: impl FnMut(&str, &str),
) -> std::result::Result<String, IdeascopeError>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: fmt::Display,
{
    tokio::pin!(stream);

    let mut text = String::new();
    let mut pending: Vec<u8> = Vec::new();

    while let Some(item) = stream.next().await {
        let chunk = item.map_err(|e| {
            IdeascopeError::Assistant(format!(
                "summary stream failed after {} bytes: {e}",
                text.len()
            ))
        })?;

        pending.extend_from_slice(&chunk);
        let decoded = take_valid_utf8(&mut pending);
        if !decoded.is_empty() {
            text.push_str(&decoded);
            on_chunk(&decoded, &text);
        }
    }

    if !pending.is_empty() {
        // The stream ended inside a scalar; decode what is left lossily.
        let decoded = String::from_utf8_lossy(&pending).into_owned();
        pending.clear();
        text.push_str(&decoded);
        on_chunk(&decoded, &text);
    }

    Ok(text)
}

/// Split the decodable prefix out of `pending`, leaving any incomplete
/// trailing scalar in place
fn take_valid_utf8(pending: &mut Vec<u8>) -> String {
    let mut out = String::new();

    loop {
        match std::str::from_utf8(pending) {
            Ok(s) => {
                out.push_str(s);
                pending.clear();
                return out;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                out.push_str(std::str::from_utf8(&pending[..valid]).unwrap_or_default());
                match e.error_len() {
                    Some(bad) => {
                        out.push('\u{FFFD}');
                        pending.drain(..valid + bad);
                    }
                    None => {
                        pending.drain(..valid);
                        return out;
                    }
                }
            }
        }
    }
}
