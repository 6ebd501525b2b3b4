//! Integration tests for the query pipeline against mock collaborators:
//! exact wire shapes, enhancement fallback, fatal search failures, the
//! no-results notice, streamed summaries, and the deterministic fallback on
//! summarizer failure (including death mid-stream).

use std::time::Duration;

use serde_json::json;
use tempfile::tempdir;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ideascope::assistant::AssistantClient;
use ideascope::pipeline::{
    fallback_summary, NullObserver, QueryMode, QueryPipeline, SummaryObserver, TurnOptions,
    TurnOutcome, FALLBACK_HEADING, NO_RESULTS_NOTICE,
};
use ideascope::search::{SearchClient, SearchResult};
use ideascope::session::{self, ChatRecord, MessageRecord, Role};
use ideascope::storage::ChatStore;

fn test_store() -> (ChatStore, tempfile::TempDir) {
    let dir = tempdir().expect("tempdir");
    let store = ChatStore::new_with_path(dir.path().join("history.db")).expect("store");
    (store, dir)
}

/// Pipeline whose search and assistant clients point at separate base URLs.
fn pipeline_for(search_uri: &str, assistant_uri: &str, store: &ChatStore) -> QueryPipeline {
    let timeout = Duration::from_secs(5);
    let search = SearchClient::new(search_uri, timeout).expect("search client");
    let assistant = AssistantClient::new(assistant_uri, timeout).expect("assistant client");
    QueryPipeline::new(search, assistant, store.clone())
}

fn raw_opts(result_count: u32) -> TurnOptions {
    TurnOptions {
        mode: QueryMode::Raw,
        result_count,
    }
}

/// `n` ranked results in the search service's wire format.
fn results_body(n: usize) -> serde_json::Value {
    let results: Vec<_> = (1..=n)
        .map(|i| {
            json!({
                "document": format!("Idea text number {i}"),
                "metadata": {
                    "organization_name": format!("Org {i}"),
                    "organization_id": i,
                    "no_of_ideas": i,
                    "gsocorganization_dev_url": format!("https://gsocorganizations.dev/org-{i}"),
                    "idea_list_url": format!("https://org-{i}.example/ideas")
                },
                "similarity_score": 1.0 - (i as f64) * 0.1
            })
        })
        .collect();
    json!({ "results": results })
}

#[derive(Default)]
struct RecordingObserver {
    deltas: Vec<String>,
    so_far: Vec<String>,
}

impl SummaryObserver for RecordingObserver {
    fn chunk(&mut self, delta: &str, so_far: &str) {
        self.deltas.push(delta.to_string());
        self.so_far.push(so_far.to_string());
    }
}

#[tokio::test]
async fn test_raw_mode_sends_exact_search_body_and_falls_back_without_summarizer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .and(body_json(json!({"query": "machine learning", "n_results": 5})))
        .respond_with(ResponseTemplate::new(200).set_body_json(results_body(3)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/summarize"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"error": "summary generation failed"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (store, _dir) = test_store();
    let pipeline = pipeline_for(&server.uri(), &server.uri(), &store);
    let chat = ChatRecord::new("machine learning");

    let outcome = pipeline
        .run_turn(&chat, "machine learning", &raw_opts(5), &mut NullObserver)
        .await
        .expect("turn failed");

    let TurnOutcome::Completed {
        chat: updated,
        summary_streamed,
    } = outcome
    else {
        panic!("expected a completed turn");
    };
    assert!(!summary_streamed);

    let content = &updated.messages.last().expect("assistant message").content;
    assert!(content.starts_with(FALLBACK_HEADING));
    assert_eq!(content.matches("## ").count(), 3);
    assert!(content.contains("## 1. Org 1"));
    assert!(content.contains("## 2. Org 2"));
    assert!(content.contains("## 3. Org 3"));
}

#[tokio::test]
async fn test_enhancement_failure_searches_with_raw_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/enhance-query"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "not configured"})))
        .expect(1)
        .mount(&server)
        .await;
    // The search must receive the user's original words, unmodified.
    Mock::given(method("POST"))
        .and(path("/query"))
        .and(body_json(json!({"query": "rust web frameworks", "n_results": 5})))
        .respond_with(ResponseTemplate::new(200).set_body_json(results_body(1)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/summarize"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("A fine summary.".as_bytes().to_vec(), "text/markdown"),
        )
        .mount(&server)
        .await;

    let (store, _dir) = test_store();
    let pipeline = pipeline_for(&server.uri(), &server.uri(), &store);
    let chat = ChatRecord::new("rust web frameworks");
    let opts = TurnOptions {
        mode: QueryMode::Enhanced,
        result_count: 5,
    };

    let outcome = pipeline
        .run_turn(&chat, "rust web frameworks", &opts, &mut NullObserver)
        .await
        .expect("turn failed");
    assert!(matches!(outcome, TurnOutcome::Completed { .. }));
}

#[tokio::test]
async fn test_enhanced_mode_searches_with_rewritten_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/enhance-query"))
        .and(body_json(json!({"query": "ml"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"enhancedQuery": "machine learning artificial intelligence"}),
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .and(body_json(
            json!({"query": "machine learning artificial intelligence", "n_results": 10}),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(results_body(1)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/summarize"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("Summary text.".as_bytes().to_vec(), "text/markdown"),
        )
        .mount(&server)
        .await;

    let (store, _dir) = test_store();
    let pipeline = pipeline_for(&server.uri(), &server.uri(), &store);
    let chat = ChatRecord::new("ml");
    let opts = TurnOptions {
        mode: QueryMode::Enhanced,
        result_count: 10,
    };

    pipeline
        .run_turn(&chat, "ml", &opts, &mut NullObserver)
        .await
        .expect("turn failed");
}

#[tokio::test]
async fn test_search_failure_fails_the_turn_and_persists_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(503).set_body_string("catalog down"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/summarize"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (store, _dir) = test_store();
    let pipeline = pipeline_for(&server.uri(), &server.uri(), &store);
    let chat = ChatRecord::new("anything");

    let outcome = pipeline
        .run_turn(&chat, "anything", &raw_opts(5), &mut NullObserver)
        .await;
    assert!(outcome.is_err());

    // The failed turn produced no assistant message and no stored record.
    assert!(store.get(&chat.id).expect("get").is_none());
}

#[tokio::test]
async fn test_empty_result_set_skips_summarizer_and_posts_notice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/summarize"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (store, _dir) = test_store();
    let pipeline = pipeline_for(&server.uri(), &server.uri(), &store);
    let chat = ChatRecord::new("quantum basket weaving");

    let outcome = pipeline
        .run_turn(&chat, "quantum basket weaving", &raw_opts(5), &mut NullObserver)
        .await
        .expect("turn failed");

    let TurnOutcome::Completed { chat: updated, .. } = outcome else {
        panic!("expected a completed turn");
    };
    assert_eq!(
        updated.messages.last().expect("assistant message").content,
        NO_RESULTS_NOTICE
    );
}

#[tokio::test]
async fn test_streamed_summary_is_persisted_with_the_chat() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(results_body(2)))
        .mount(&server)
        .await;
    let summary_text = "## Great matches\nTwo organizations fit your query well.";
    Mock::given(method("POST"))
        .and(path("/api/summarize"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(summary_text.as_bytes().to_vec(), "text/markdown"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (store, _dir) = test_store();
    let pipeline = pipeline_for(&server.uri(), &server.uri(), &store);
    let chat = ChatRecord::new("two matches");

    let mut observer = RecordingObserver::default();
    let outcome = pipeline
        .run_turn(&chat, "two matches", &raw_opts(5), &mut observer)
        .await
        .expect("turn failed");

    let TurnOutcome::Completed {
        chat: updated,
        summary_streamed,
    } = outcome
    else {
        panic!("expected a completed turn");
    };
    assert!(summary_streamed);
    assert_eq!(updated.summary.as_deref(), Some(summary_text));
    assert_eq!(
        updated.messages.last().expect("assistant message").content,
        summary_text
    );
    // The turn's results stay on the in-memory session copy.
    assert_eq!(updated.results.len(), 2);

    // Progressive rendering: the deltas concatenate to the final text and
    // each so_far snapshot is a strict prefix extension.
    assert_eq!(observer.deltas.concat(), summary_text);
    assert_eq!(observer.so_far.last().map(String::as_str), Some(summary_text));

    // Persisted copy: messages and summary survive, results do not.
    let stored = store.get(&chat.id).expect("get").expect("stored chat");
    assert_eq!(stored.messages.len(), 2);
    assert_eq!(stored.messages[0].role, Role::User);
    assert_eq!(stored.messages[1].role, Role::Assistant);
    assert_eq!(stored.summary.as_deref(), Some(summary_text));
    assert!(stored.results.is_empty());
}

#[tokio::test]
async fn test_second_turn_appends_to_stored_chat() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(results_body(1)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/summarize"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("Round summary.".as_bytes().to_vec(), "text/markdown"),
        )
        .mount(&server)
        .await;

    let (store, _dir) = test_store();
    let pipeline = pipeline_for(&server.uri(), &server.uri(), &store);

    let chat = ChatRecord::new("first question");
    let outcome = pipeline
        .run_turn(&chat, "first question", &raw_opts(5), &mut NullObserver)
        .await
        .expect("first turn failed");
    let TurnOutcome::Completed { chat: after_first, .. } = outcome else {
        panic!("expected completed turn");
    };

    let with_followup =
        session::append_message(&after_first, MessageRecord::user("second question"));
    pipeline
        .run_turn(&with_followup, "second question", &raw_opts(5), &mut NullObserver)
        .await
        .expect("second turn failed");

    let stored = store.get(&chat.id).expect("get").expect("stored chat");
    assert_eq!(stored.messages.len(), 4);
    assert_eq!(stored.messages[2].content, "second question");
}

#[tokio::test]
async fn test_whitespace_query_is_a_noop() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(0)
        .mount(&server)
        .await;

    let (store, _dir) = test_store();
    let pipeline = pipeline_for(&server.uri(), &server.uri(), &store);
    let chat = ChatRecord::new("placeholder");

    let outcome = pipeline
        .run_turn(&chat, "   \t  ", &raw_opts(5), &mut NullObserver)
        .await
        .expect("noop turn errored");
    assert!(matches!(outcome, TurnOutcome::Skipped));
    assert!(store.get(&chat.id).expect("get").is_none());
}

#[tokio::test]
async fn test_zero_result_count_is_rejected() {
    let server = MockServer::start().await;
    let (store, _dir) = test_store();
    let pipeline = pipeline_for(&server.uri(), &server.uri(), &store);
    let chat = ChatRecord::new("bad count");

    let outcome = pipeline
        .run_turn(&chat, "bad count", &raw_opts(0), &mut NullObserver)
        .await;
    assert!(outcome.is_err());
}

/// Serves one summarize request with a chunked body that dies before the
/// terminating chunk, so the client sees a mid-stream failure.
async fn flaky_summarizer() -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = vec![0u8; 65536];
            let mut total = 0;
            loop {
                match socket.read(&mut buf[total..]).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        total += n;
                        if buf[..total].windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }
                }
            }
            // 0x10 == 16 bytes: "partial summary ". No terminating chunk.
            let response = "HTTP/1.1 200 OK\r\ncontent-type: text/markdown\r\ntransfer-encoding: chunked\r\n\r\n10\r\npartial summary \r\n";
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.flush().await;
        }
    });

    format!("http://{addr}")
}

#[tokio::test]
async fn test_mid_stream_failure_persists_fallback_not_partial() {
    let search_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(results_body(2)))
        .mount(&search_server)
        .await;
    let assistant_uri = flaky_summarizer().await;

    let (store, _dir) = test_store();
    let pipeline = pipeline_for(&search_server.uri(), &assistant_uri, &store);
    let chat = ChatRecord::new("doomed stream");

    let outcome = pipeline
        .run_turn(&chat, "doomed stream", &raw_opts(5), &mut NullObserver)
        .await
        .expect("mid-stream failure must not fail the turn");

    let TurnOutcome::Completed {
        chat: updated,
        summary_streamed,
    } = outcome
    else {
        panic!("expected a completed turn");
    };
    assert!(!summary_streamed);

    // The expected fallback is fully deterministic from the result set.
    let results: Vec<SearchResult> =
        serde_json::from_value(results_body(2)["results"].clone()).expect("results");
    let expected = fallback_summary(&results);

    let content = &updated.messages.last().expect("assistant message").content;
    assert_eq!(content, &expected);
    assert!(!content.contains("partial summary"));

    let stored = store.get(&chat.id).expect("get").expect("stored chat");
    assert_eq!(
        stored.messages.last().expect("assistant message").content,
        expected
    );
    assert_eq!(stored.summary.as_deref(), Some(expected.as_str()));
}

#[tokio::test]
async fn test_empty_summary_stream_degrades_to_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(results_body(1)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/summarize"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(Vec::new(), "text/markdown"))
        .mount(&server)
        .await;

    let (store, _dir) = test_store();
    let pipeline = pipeline_for(&server.uri(), &server.uri(), &store);
    let chat = ChatRecord::new("empty stream");

    let outcome = pipeline
        .run_turn(&chat, "empty stream", &raw_opts(5), &mut NullObserver)
        .await
        .expect("turn failed");
    let TurnOutcome::Completed { chat: updated, .. } = outcome else {
        panic!("expected a completed turn");
    };
    assert!(updated
        .messages
        .last()
        .expect("assistant message")
        .content
        .starts_with(FALLBACK_HEADING));
}
