mod common;

use futures::StreamExt;

use claude_exec::error::{ProcessError, SdkError};
use claude_exec::message::{ContentBlock, Message};
use claude_exec::query::{collect_all, query, query_text, DynTransport};

use common::MockTransport;

const USER_LINE: &str = r#"{"type":"user","content":"Hello"}"#;
const ASSISTANT_LINE: &str =
    r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Hi"}]}}"#;
const RESULT_LINE: &str = r#"{"type":"result","subtype":"ok","duration_ms":10,"duration_api_ms":5,"is_error":false,"num_turns":1,"session_id":"s1"}"#;

#[tokio::test]
async fn pipeline_yields_typed_messages_in_line_order() {
    let transport = MockTransport::with_output(&[USER_LINE, ASSISTANT_LINE, RESULT_LINE]);
    let transport_arc: DynTransport = transport.clone();

    let stream = query("What is 2+2?", None, Some(transport_arc))
        .await
        .expect("query should start");
    let messages = collect_all(stream).await.expect("stream should complete");

    assert_eq!(messages.len(), 3);
    assert!(matches!(&messages[0], Message::User(user) if user.content == "Hello"));
    match &messages[1] {
        Message::Assistant(assistant) => match &assistant.content[0] {
            ContentBlock::Text(block) => assert_eq!(block.text, "Hi"),
            other => panic!("expected text block, got {other:?}"),
        },
        other => panic!("expected assistant message, got {other:?}"),
    }
    match &messages[2] {
        Message::Result(result) => {
            assert_eq!(result.subtype, "ok");
            assert_eq!(result.session_id, "s1");
            assert_eq!(result.num_turns, 1);
            assert!(!result.is_error);
        }
        other => panic!("expected result message, got {other:?}"),
    }

    assert_eq!(transport.connect_calls().await, 1);
    assert_eq!(transport.close_calls().await, 1);
}

#[tokio::test]
async fn undecodable_and_unmodeled_lines_are_skipped() {
    let transport = MockTransport::with_output(&[
        "",
        "this is not json",
        USER_LINE,
        r#"{"type":"telemetry","queue_depth":4}"#,
        "   ",
        ASSISTANT_LINE,
        "{\"truncated\": ",
        RESULT_LINE,
    ]);
    let transport_arc: DynTransport = transport.clone();

    let stream = query("hi", None, Some(transport_arc))
        .await
        .expect("query should start");
    let messages = collect_all(stream).await.expect("bad lines must not abort");

    assert_eq!(messages.len(), 3);
    assert!(matches!(messages[0], Message::User(_)));
    assert!(matches!(messages[1], Message::Assistant(_)));
    assert!(matches!(messages[2], Message::Result(_)));
}

#[tokio::test]
async fn terminal_failure_is_surfaced_exactly_once() {
    let failure = ProcessError::new(Some(2), "boom", vec!["claude".into(), "--print".into()]);
    let transport = MockTransport::with_lines(vec![
        Ok(Some(USER_LINE.to_string())),
        Err(SdkError::from(failure)),
    ]);
    let transport_arc: DynTransport = transport.clone();

    let stream = query("hi", None, Some(transport_arc))
        .await
        .expect("query should start");
    let items = stream.collect::<Vec<_>>().await;

    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    match &items[1] {
        Err(SdkError::Process(err)) => {
            assert_eq!(err.exit_code(), Some(2));
            assert_eq!(err.stderr(), "boom");
        }
        other => panic!("expected process failure, got {other:?}"),
    }

    assert_eq!(transport.close_calls().await, 1);
}

#[tokio::test]
async fn collect_all_propagates_the_failure() {
    let failure = ProcessError::new(Some(1), "", vec!["claude".into()]);
    let transport = MockTransport::with_lines(vec![
        Ok(Some(ASSISTANT_LINE.to_string())),
        Err(SdkError::from(failure)),
    ]);
    let transport_arc: DynTransport = transport.clone();

    let stream = query("hi", None, Some(transport_arc))
        .await
        .expect("query should start");
    let outcome = collect_all(stream).await;

    assert!(matches!(outcome, Err(SdkError::Process(_))));
}

#[tokio::test]
async fn query_text_extracts_the_first_answer() {
    let transport: DynTransport =
        MockTransport::with_output(&[USER_LINE, ASSISTANT_LINE, RESULT_LINE]);
    let answer = query_text("What is 2+2?", None, Some(transport))
        .await
        .expect("query should complete");
    assert_eq!(answer, "Hi");
}

#[tokio::test]
async fn query_text_is_empty_when_no_assistant_text_exists() {
    let transport: DynTransport = MockTransport::with_output(&[USER_LINE, RESULT_LINE]);
    let answer = query_text("hi", None, Some(transport))
        .await
        .expect("query should complete");
    assert_eq!(answer, "");
}

#[tokio::test]
async fn early_stop_by_consumer_is_not_a_failure() {
    let transport = MockTransport::with_output(&[USER_LINE, ASSISTANT_LINE, RESULT_LINE]);
    let transport_arc: DynTransport = transport.clone();

    let stream = query("hi", None, Some(transport_arc))
        .await
        .expect("query should start");
    let mut stream = Box::pin(stream);

    let first = stream.next().await.expect("stream should yield");
    assert!(matches!(first, Ok(Message::User(_))));
    drop(stream);

    // Stopping after one message is a success path, not an error; the
    // remaining scripted lines are simply never pulled.
    assert_eq!(transport.connect_calls().await, 1);
}
