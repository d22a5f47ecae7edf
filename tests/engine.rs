//! Dialogue engine behavior over a scripted backend

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{MockBackend, broken_round, text_round, tool_round};
use parley::agent::{
    ChatBackend, ConversationStore, DialogueEngine, InMemoryStore, MessageRole, ResponseToken,
    StaticContextRetriever, TokenStream, ToolRegistry,
};
use parley::Error;

fn engine_over(backend: MockBackend, store: Arc<InMemoryStore>) -> Arc<DialogueEngine> {
    Arc::new(DialogueEngine::new(
        Arc::new(backend),
        store,
        Arc::new(StaticContextRetriever::default()),
        Arc::new(ToolRegistry::with_builtins()),
    ))
}

/// Drain a token stream into (reply text, all tokens, terminal error)
async fn collect(mut tokens: TokenStream) -> (String, Vec<ResponseToken>, Option<Error>) {
    let mut text = String::new();
    let mut all = Vec::new();
    let mut error = None;

    while let Some(item) = tokens.next_token().await {
        match item {
            Ok(token) => {
                if !token.is_tool_call {
                    text.push_str(&token.text);
                }
                all.push(token);
            }
            Err(e) => {
                error = Some(e);
                break;
            }
        }
    }

    (text, all, error)
}

#[tokio::test]
async fn streams_reply_and_persists_turn() {
    let store = Arc::new(InMemoryStore::new());
    let backend = MockBackend::new(vec![text_round(&["Hello ", "from ", "the agent."])]);
    let engine = engine_over(backend, Arc::clone(&store));

    let (text, tokens, error) = collect(engine.run_turn("s1", "hi there")).await;

    assert!(error.is_none());
    assert_eq!(text, "Hello from the agent.");
    assert!(tokens.iter().all(|t| t.session_id == "s1"));

    let state = store.get("s1").await;
    assert_eq!(state.messages.len(), 2);
    assert_eq!(state.messages[0].role, MessageRole::User);
    assert_eq!(state.messages[0].content, "hi there");
    assert_eq!(state.messages[1].role, MessageRole::Assistant);
    assert_eq!(state.messages[1].content, "Hello from the agent.");
}

#[tokio::test]
async fn weather_tool_round_trip() {
    let store = Arc::new(InMemoryStore::new());
    let backend = MockBackend::new(vec![
        tool_round("call_1", "get_weather", &[r#"{"city":"#, r#""New York"}"#]),
        text_round(&["It is sunny in New York."]),
    ]);
    let engine = engine_over(backend, Arc::clone(&store));

    let (text, tokens, error) = collect(engine.run_turn("s1", "What's the weather in New York?")).await;

    assert!(error.is_none());
    assert_eq!(text, "It is sunny in New York.");

    let markers: Vec<&ResponseToken> = tokens.iter().filter(|t| t.is_tool_call).collect();
    assert_eq!(markers.len(), 1);
    assert_eq!(markers[0].text, "get_weather");

    // user, assistant tool request, tool result, final assistant
    let state = store.get("s1").await;
    assert_eq!(state.messages.len(), 4);
    assert_eq!(state.messages[1].role, MessageRole::Assistant);
    assert!(state.messages[1].tool_calls.is_some());
    assert_eq!(state.messages[2].role, MessageRole::Tool);
    assert_eq!(state.messages[2].tool_call_id.as_deref(), Some("call_1"));
    assert!(state.messages[2].content.contains("sunny in New York"));
    assert_eq!(state.messages[3].role, MessageRole::Assistant);
}

#[tokio::test]
async fn backend_failure_rolls_back_to_user_message() {
    let store = Arc::new(InMemoryStore::new());
    let backend = MockBackend::new(vec![broken_round(&["partial rep"])]);
    let engine = engine_over(backend, Arc::clone(&store));

    let (text, _, error) = collect(engine.run_turn("s1", "hello?")).await;

    assert_eq!(text, "partial rep");
    assert!(matches!(error, Some(Error::Dialogue(_))));

    // Only the user message survives the failed turn
    let state = store.get("s1").await;
    assert_eq!(state.messages.len(), 1);
    assert_eq!(state.messages[0].role, MessageRole::User);
}

#[tokio::test]
async fn unreachable_backend_keeps_user_message() {
    let store = Arc::new(InMemoryStore::new());
    let engine = engine_over(MockBackend::unreachable(), Arc::clone(&store));

    let (_, _, error) = collect(engine.run_turn("s1", "anyone home?")).await;

    assert!(matches!(error, Some(Error::Dialogue(_))));
    assert_eq!(store.get("s1").await.messages.len(), 1);
}

#[tokio::test]
async fn unknown_tool_aborts_the_turn() {
    let store = Arc::new(InMemoryStore::new());
    let backend = MockBackend::new(vec![tool_round("call_1", "launch_rocket", &["{}"])]);
    let engine = engine_over(backend, Arc::clone(&store));

    let (_, _, error) = collect(engine.run_turn("s1", "fire!")).await;

    assert!(matches!(error, Some(Error::Dialogue(_))));
    assert_eq!(store.get("s1").await.messages.len(), 1);
}

#[tokio::test]
async fn tool_round_limit_is_enforced() {
    let store = Arc::new(InMemoryStore::new());
    let rounds = (0..5)
        .map(|i| {
            tool_round(
                &format!("call_{i}"),
                "get_weather",
                &[r#"{"city":"Loopville"}"#],
            )
        })
        .collect();
    let backend = MockBackend::new(rounds);
    let engine = Arc::new(
        DialogueEngine::new(
            Arc::new(backend),
            Arc::clone(&store) as Arc<dyn ConversationStore>,
            Arc::new(StaticContextRetriever::default()),
            Arc::new(ToolRegistry::with_builtins()),
        )
        .with_max_tool_rounds(2),
    );

    let (_, tokens, error) = collect(engine.run_turn("s1", "loop forever")).await;

    let Some(Error::Dialogue(message)) = error else {
        panic!("expected a dialogue error");
    };
    assert!(message.contains("round limit"));

    // Two rounds were allowed before the bound tripped
    assert_eq!(tokens.iter().filter(|t| t.is_tool_call).count(), 2);
    assert_eq!(store.get("s1").await.messages.len(), 1);
}

#[tokio::test]
async fn dropped_stream_abandons_a_tool_turn() {
    let store = Arc::new(InMemoryStore::new());
    let backend = Arc::new(MockBackend::new(vec![
        tool_round("call_1", "get_weather", &[r#"{"city":"Nowhere"}"#]),
        text_round(&["never generated"]),
    ]));
    let engine = Arc::new(DialogueEngine::new(
        Arc::clone(&backend) as Arc<dyn ChatBackend>,
        Arc::clone(&store) as Arc<dyn ConversationStore>,
        Arc::new(StaticContextRetriever::default()),
        Arc::new(ToolRegistry::with_builtins()),
    ));

    drop(engine.run_turn("s1", "what's the weather?"));
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The follow-up generation round never ran and nothing beyond the
    // user message was persisted
    assert_eq!(backend.calls(), 1);
    let state = store.get("s1").await;
    assert_eq!(state.messages.len(), 1);
    assert_eq!(state.messages[0].role, MessageRole::User);
}

#[tokio::test]
async fn history_accumulates_across_turns() {
    let store = Arc::new(InMemoryStore::new());
    let backend = MockBackend::new(vec![
        text_round(&["First reply."]),
        text_round(&["Second reply."]),
    ]);
    let engine = engine_over(backend, Arc::clone(&store));

    let (first, _, _) = collect(engine.run_turn("s1", "one")).await;
    let (second, _, _) = collect(engine.run_turn("s1", "two")).await;

    assert_eq!(first, "First reply.");
    assert_eq!(second, "Second reply.");

    let state = store.get("s1").await;
    let contents: Vec<&str> = state.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["one", "First reply.", "two", "Second reply."]);
}

#[tokio::test]
async fn sessions_do_not_share_history() {
    let store = Arc::new(InMemoryStore::new());
    let backend = MockBackend::new(vec![text_round(&["reply a"]), text_round(&["reply b"])]);
    let engine = engine_over(backend, Arc::clone(&store));

    collect(engine.run_turn("a", "for a")).await;
    collect(engine.run_turn("b", "for b")).await;

    assert_eq!(store.get("a").await.messages.len(), 2);
    assert_eq!(store.get("b").await.messages.len(), 2);
    assert_eq!(store.get("a").await.messages[0].content, "for a");
}
